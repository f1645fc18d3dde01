//! Fixtures shared by the unit and integration tests.
use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::{
    codegen::{ConstOperand, Instr},
    containers::HostClass,
    records::{DataRecordType, FieldDecl, RecordClassRef},
    tracer::{RoutineInliner, StaticModuleRegistry, Tracer},
    utils::{Error, TraceResult},
    value::{BuiltinFn, HostValue, Literal, ModuleObject, SymbolicValue, ValueId},
};

/// Register `Output(logits, hidden=None, steps=0)`.
pub fn output_record(tx: &mut Tracer) -> RecordClassRef {
    tx.records_mut().register(DataRecordType::new(
        "Output",
        vec![
            FieldDecl::required("logits"),
            FieldDecl::with_default("hidden", Literal::None),
            FieldDecl::with_default("steps", 0i64),
        ],
    ))
}

pub fn sample_modules() -> StaticModuleRegistry {
    StaticModuleRegistry::new([
        ModuleObject::new("os"),
        ModuleObject::new("sys"),
        ModuleObject::new("torch"),
    ])
}

/// One inlined call: the routine name and its positional arguments.
pub type InlinedCall = (String, Vec<ValueId>);

/// Inliner that records every call and returns the routine's name as a string
/// constant.
#[derive(Debug, Default, Clone)]
pub struct RecordingInliner {
    calls: Rc<RefCell<Vec<InlinedCall>>>,
}

impl RecordingInliner {
    pub fn calls(&self) -> Vec<InlinedCall> {
        self.calls.borrow().clone()
    }
}

impl RoutineInliner for RecordingInliner {
    fn inline_call(
        &self,
        tx: &mut Tracer,
        func: ValueId,
        args: &[ValueId],
        _kwargs: &IndexMap<String, ValueId>,
    ) -> TraceResult<ValueId> {
        let name = match tx.get(func)? {
            SymbolicValue::UserFunction(f) => f.qualname.clone(),
            _ => return Err(Error::unsupported("inliner", "non-routine callee")),
        };
        self.calls.borrow_mut().push((name.clone(), args.to_vec()));
        Ok(tx.constant(name))
    }
}

fn stack_error(reason: impl Into<String>) -> Error {
    Error::unsupported("instruction stream", reason)
}

fn pop(stack: &mut Vec<HostValue>) -> TraceResult<HostValue> {
    stack.pop().ok_or_else(|| stack_error("stack underflow"))
}

fn pop_n(stack: &mut Vec<HostValue>, n: usize) -> TraceResult<Vec<HostValue>> {
    if stack.len() < n {
        return Err(stack_error("stack underflow"));
    }
    Ok(stack.split_off(stack.len() - n))
}

fn map_entries(value: HostValue) -> TraceResult<Vec<(HostValue, HostValue)>> {
    match value {
        HostValue::Map { entries, .. } => Ok(entries),
        other => Err(stack_error(format!("expected a map, found {:?}", other))),
    }
}

/// Run a reconstruction stream and return the single value it leaves on the
/// stack. Values loaded with `LoadValue` are lowered through `tx`.
pub fn execute(tx: &Tracer, stream: &[Instr]) -> TraceResult<HostValue> {
    let mut stack: Vec<HostValue> = Vec::new();
    for instr in stream {
        match instr {
            Instr::LoadConst(ConstOperand::Literal(literal)) => {
                stack.push(HostValue::Literal(literal.clone()))
            }
            Instr::LoadConst(ConstOperand::Class(class)) => stack.push(HostValue::Class(class.clone())),
            Instr::LoadConst(ConstOperand::Builtin(builtin)) => stack.push(HostValue::Builtin(*builtin)),
            Instr::LoadConst(ConstOperand::Module(name)) => {
                stack.push(HostValue::Module(ModuleObject::new(name.as_str())))
            }
            Instr::LoadValue(id) => stack.push(tx.as_constant(*id)?),
            Instr::BuildMap(n) => {
                let flat = pop_n(&mut stack, 2 * n)?;
                let mut entries = Vec::with_capacity(*n);
                let mut flat = flat.into_iter();
                while let (Some(k), Some(v)) = (flat.next(), flat.next()) {
                    entries.push((k, v));
                }
                stack.push(HostValue::Map {
                    class: HostClass::Dict,
                    entries,
                });
            }
            Instr::BuildSet(n) => {
                let elements = pop_n(&mut stack, *n)?;
                stack.push(HostValue::Set(elements));
            }
            Instr::CallFunction(argc) => {
                let mut args = pop_n(&mut stack, *argc)?;
                let callee = pop(&mut stack)?;
                let result = match (callee, args.len()) {
                    (HostValue::Class(HostClass::OrderedDict), 1) => HostValue::Map {
                        class: HostClass::OrderedDict,
                        entries: map_entries(args.remove(0))?,
                    },
                    (HostValue::Class(HostClass::DefaultDict), 2) => {
                        let entries = map_entries(args.remove(1))?;
                        let factory = match args.remove(0) {
                            HostValue::Literal(Literal::None) => None,
                            factory => Some(Box::new(factory)),
                        };
                        HostValue::DefaultMap { factory, entries }
                    }
                    (HostValue::Builtin(BuiltinFn::List), 0) => HostValue::List(Vec::new()),
                    (HostValue::Builtin(BuiltinFn::Tuple), 0) => HostValue::Tuple(Vec::new()),
                    (callee, argc) => {
                        return Err(stack_error(format!("cannot call {:?} with {} arguments", callee, argc)));
                    }
                };
                stack.push(result);
            }
            Instr::CallKeyword(names) => {
                let values = pop_n(&mut stack, names.len())?;
                let class = match pop(&mut stack)? {
                    HostValue::Class(HostClass::Record(class)) => class,
                    other => return Err(stack_error(format!("cannot keyword-call {:?}", other))),
                };
                stack.push(HostValue::Record {
                    class,
                    fields: names.iter().cloned().zip(values.into_iter().map(Some)).collect(),
                });
            }
            Instr::LoadAttr(name) => match (pop(&mut stack)?, name.as_str()) {
                (HostValue::Module(module), "modules") if module.name == "sys" => {
                    stack.push(HostValue::SysModules)
                }
                (other, _) => return Err(stack_error(format!("no attribute `{}` on {:?}", name, other))),
            },
            Instr::CallMethod { name, argc } => {
                let _args = pop_n(&mut stack, *argc)?;
                let receiver = pop(&mut stack)?;
                let entries = map_entries(receiver)?;
                let result = match name.as_str() {
                    "keys" => HostValue::List(entries.into_iter().map(|(k, _)| k).collect()),
                    "values" => HostValue::List(entries.into_iter().map(|(_, v)| v).collect()),
                    other => return Err(stack_error(format!("unknown method `{}`", other))),
                };
                stack.push(result);
            }
        }
    }
    match (stack.pop(), stack.is_empty()) {
        (Some(value), true) => Ok(value),
        _ => Err(stack_error("expected exactly one value on the stack")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::InstrStream;

    #[test]
    fn executes_a_plain_map_reconstruction() {
        let mut tx = Tracer::default();
        let (k, v) = (tx.constant("a"), tx.constant(1i64));
        let d = tx.make_associative([(k, v)], HostClass::Dict).unwrap();
        let mut out = InstrStream::new();
        tx.reconstruct(d, &mut out).unwrap();
        assert_eq!(execute(&tx, &out).unwrap(), HostValue::dict([("a", 1i64)]));
    }

    #[test]
    fn rejects_unbalanced_streams() {
        let tx = Tracer::default();
        assert!(execute(&tx, &[Instr::BuildMap(1)]).is_err());
        assert!(execute(&tx, &[]).is_err());
    }
}
