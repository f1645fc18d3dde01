//! Reconstruction of traced values as guest instructions.
//!
//! When tracing falls back to interpretation, every live symbolic value must be
//! rebuilt on the guest's operand stack. The instructions needed for containers
//! form a small fixed vocabulary ([`Instr`]); an [`Emitter`] receives them in
//! stack order, and [`InstrStream`] simply records them.
use smallvec::SmallVec;

use crate::{
    containers::HostClass,
    tracer::Tracer,
    utils::TraceResult,
    value::{BuiltinFn, Literal, SymbolicValue, ValueId},
};

/// A constant the emitter can load directly.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstOperand {
    Literal(Literal),
    Class(HostClass),
    Builtin(BuiltinFn),
    /// An imported module, by name.
    Module(String),
}

impl std::fmt::Display for ConstOperand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstOperand::Literal(literal) => write!(f, "{}", literal),
            ConstOperand::Class(class) => write!(f, "<class {}>", class),
            ConstOperand::Builtin(builtin) => write!(f, "<builtin {}>", builtin),
            ConstOperand::Module(name) => write!(f, "<module {}>", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    LoadConst(ConstOperand),

    /// Load a value that lives outside the reconstructed object (a graph output
    /// or a frame input).
    LoadValue(ValueId),

    /// Pop `2 * n` operands (key, value, key, value, ...) and push a map.
    BuildMap(usize),

    /// Pop `n` operands and push a set.
    BuildSet(usize),

    /// Pop `argc` arguments and a callable, push the call result.
    CallFunction(usize),

    /// Pop one argument per keyword name and a callable, push the call result.
    CallKeyword(SmallVec<String, 4>),

    LoadAttr(String),

    /// Pop `argc` arguments and a receiver, push `receiver.name(*args)`.
    CallMethod { name: String, argc: usize },
}

impl std::fmt::Display for Instr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instr::LoadConst(operand) => write!(f, "LOAD_CONST {}", operand),
            Instr::LoadValue(id) => write!(f, "LOAD_VALUE {:?}", id),
            Instr::BuildMap(n) => write!(f, "BUILD_MAP {}", n),
            Instr::BuildSet(n) => write!(f, "BUILD_SET {}", n),
            Instr::CallFunction(argc) => write!(f, "CALL_FUNCTION {}", argc),
            Instr::CallKeyword(names) => write!(f, "CALL_FUNCTION_KW ({})", names.join(", ")),
            Instr::LoadAttr(name) => write!(f, "LOAD_ATTR {}", name),
            Instr::CallMethod { name, argc } => write!(f, "CALL_METHOD {} {}", name, argc),
        }
    }
}

/// Sink of reconstruction instructions.
pub trait Emitter {
    fn emit(&mut self, instr: Instr);

    fn emit_load_constant(&mut self, operand: ConstOperand) {
        self.emit(Instr::LoadConst(operand));
    }

    fn emit_load_value(&mut self, value: ValueId) {
        self.emit(Instr::LoadValue(value));
    }

    fn emit_build_map(&mut self, n: usize) {
        self.emit(Instr::BuildMap(n));
    }

    fn emit_build_set(&mut self, n: usize) {
        self.emit(Instr::BuildSet(n));
    }

    fn emit_call_function(&mut self, argc: usize) {
        self.emit(Instr::CallFunction(argc));
    }

    fn emit_call_keyword(&mut self, names: SmallVec<String, 4>) {
        self.emit(Instr::CallKeyword(names));
    }

    fn emit_load_attr(&mut self, name: &str) {
        self.emit(Instr::LoadAttr(name.to_string()));
    }

    /// Load the method `name` on the receiver already on the stack and call it
    /// with the `argc` operands pushed after it.
    fn emit_load_method_call(&mut self, name: &str, argc: usize) {
        self.emit(Instr::CallMethod {
            name: name.to_string(),
            argc,
        });
    }
}

/// An in-memory instruction sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstrStream {
    instrs: Vec<Instr>,
}

impl InstrStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<Instr> {
        self.instrs
    }
}

impl std::ops::Deref for InstrStream {
    type Target = [Instr];

    fn deref(&self) -> &Self::Target {
        &self.instrs
    }
}

impl Emitter for InstrStream {
    fn emit(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }
}

impl std::fmt::Display for InstrStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for instr in &self.instrs {
            writeln!(f, "{}", instr)?;
        }
        Ok(())
    }
}

impl Tracer {
    /// Emit instructions that push an equivalent of `value`.
    pub fn reconstruct(&self, value: ValueId, out: &mut dyn Emitter) -> TraceResult<()> {
        match self.get(value)? {
            SymbolicValue::Constant(literal) => {
                out.emit_load_constant(ConstOperand::Literal(literal.clone()));
            }
            SymbolicValue::Builtin(builtin) => {
                out.emit_load_constant(ConstOperand::Builtin(*builtin));
            }
            SymbolicValue::Class(class) => {
                out.emit_load_constant(ConstOperand::Class(class.clone()));
            }
            SymbolicValue::Module(module) => {
                out.emit_load_constant(ConstOperand::Module(module.name.clone()));
            }
            SymbolicValue::Tuple(items) => match self.literal_tuple(items) {
                Some(literal) => out.emit_load_constant(ConstOperand::Literal(literal)),
                None => out.emit_load_value(value),
            },
            SymbolicValue::Container(cid) => self.reconstruct_container(*cid, out)?,
            SymbolicValue::View(view) => self.reconstruct_view(view, out)?,
            SymbolicValue::SysModules => self.reconstruct_sys_modules(out),
            _ => out.emit_load_value(value),
        }
        Ok(())
    }

    fn literal_tuple(&self, items: &[ValueId]) -> Option<Literal> {
        items
            .iter()
            .map(|item| match self.get(*item).ok()? {
                SymbolicValue::Constant(literal) => Some(literal.clone()),
                SymbolicValue::Tuple(nested) => self.literal_tuple(nested),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Literal::Tuple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_map_is_rebuilt_through_its_class() {
        let mut tx = Tracer::default();
        let (k, v) = (tx.constant("a"), tx.constant(1i64));
        let d = tx.make_associative([(k, v)], HostClass::OrderedDict).unwrap();

        let mut out = InstrStream::new();
        tx.reconstruct(d, &mut out).unwrap();
        assert_eq!(
            &*out,
            &[
                Instr::LoadConst(ConstOperand::Class(HostClass::OrderedDict)),
                Instr::LoadConst(ConstOperand::Literal(Literal::from("a"))),
                Instr::LoadConst(ConstOperand::Literal(Literal::Int(1))),
                Instr::BuildMap(1),
                Instr::CallFunction(1),
            ]
        );
    }

    #[test]
    fn constant_tuples_fold_into_one_load() {
        let mut tx = Tracer::default();
        let (a, b) = (tx.constant(1i64), tx.constant("x"));
        let t = tx.alloc(SymbolicValue::Tuple(vec![a, b]));
        let mut out = InstrStream::new();
        tx.reconstruct(t, &mut out).unwrap();
        assert_eq!(out.to_string(), "LOAD_CONST (1, \"x\")\n");
    }
}
