//! Symbolic values tracked by the tracer.
//!
//! A [`SymbolicValue`] stands for a value of the guest program while it is
//! being traced. Values live in the tracer's arena and are referred to by
//! [`ValueId`]; only the container-relevant part of the value hierarchy is
//! modelled here:
//!
//! - constants (`Constant`, `Enum`, `Builtin`, `MethodWrapper`) that can be
//!   lowered to concrete host objects;
//! - tensors and symbolic integers, which only have an example backing;
//! - sequences (`Tuple`, `List`) of other values;
//! - containers, which are handles into the snapshot arena (see
//!   [`crate::containers`]), and views over them;
//! - a few host objects (`Module`, `Class`, `SysModules`) the container
//!   adapters need to refer to.
use bitflags::bitflags;
use strum::{EnumDiscriminants, EnumIs, EnumTryAs};

use crate::containers::{ContainerId, HostClass, view::DictView};

pub mod host;
pub mod literal;

pub use host::{BuiltinFn, EnumConst, FakeTensor, HostValue, MethodWrapper, ModuleObject, UserFunction};
pub use literal::Literal;

slotmap::new_key_type! {
    /// Stable reference to a value stored in a [`crate::tracer::Tracer`].
    pub struct ValueId;
}

bitflags! {
    /// Capability queries answered by every symbolic value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// The value can be lowered to a concrete host object.
        const CONSTANT = 1 << 0;

        /// The value is (or wraps) a tensor.
        const TENSOR_LIKE = 1 << 1;

        /// The value is a finite ordered sequence (tuples, lists, views).
        const SEQUENCE_LIKE = 1 << 2;

        /// The value is an associative container or behaves like one.
        const CONTAINER_LIKE = 1 << 3;

        /// The value can be called.
        const CALLABLE = 1 << 4;
    }
}

/// A traced tensor. Only its example backing matters to containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorValue {
    /// The fake tensor recorded when the value was created, if any.
    pub example: Option<FakeTensor>,
}

/// A symbolic integer together with the concrete hint it had at trace time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymInt {
    pub expr: String,
    pub hint: i64,
}

/// A traced value.
#[derive(Debug, Clone, PartialEq, EnumIs, EnumTryAs, EnumDiscriminants)]
#[strum_discriminants(name(ValueKind), derive(Hash, strum::Display))]
pub enum SymbolicValue {
    Constant(Literal),
    Enum(EnumConst),
    Tensor(TensorValue),
    SymInt(SymInt),
    Builtin(BuiltinFn),
    MethodWrapper(MethodWrapper),
    Tuple(Vec<ValueId>),
    List(Vec<ValueId>),
    UserFunction(UserFunction),

    /// Handle to a logical container. The current snapshot is resolved through
    /// the tracer's handle table.
    Container(ContainerId),
    View(DictView),
    Module(ModuleObject),
    Class(HostClass),

    /// The process module table.
    SysModules,
    Opaque(String),
}

impl SymbolicValue {
    /// Whether this is the `None` constant.
    pub fn is_none_literal(&self) -> bool {
        matches!(self, SymbolicValue::Constant(Literal::None))
    }
}

macro_rules! define_symbolic_from {
    ($typ:ty, $variant:ident) => {
        impl From<$typ> for SymbolicValue {
            fn from(value: $typ) -> Self {
                SymbolicValue::$variant(value)
            }
        }
    };
}

define_symbolic_from!(Literal, Constant);
define_symbolic_from!(EnumConst, Enum);
define_symbolic_from!(TensorValue, Tensor);
define_symbolic_from!(SymInt, SymInt);
define_symbolic_from!(BuiltinFn, Builtin);
define_symbolic_from!(MethodWrapper, MethodWrapper);
define_symbolic_from!(UserFunction, UserFunction);
define_symbolic_from!(ContainerId, Container);
define_symbolic_from!(DictView, View);
define_symbolic_from!(ModuleObject, Module);
define_symbolic_from!(HostClass, Class);

/// An argument observed at a call site.
///
/// Call sites may pass already traced values, raw literals the interpreter has
/// not wrapped yet, or objects the tracer has no model for.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArg {
    Value(ValueId),
    Literal(Literal),
    Opaque(String),
}

impl From<ValueId> for CallArg {
    fn from(value: ValueId) -> Self {
        CallArg::Value(value)
    }
}

impl From<Literal> for CallArg {
    fn from(value: Literal) -> Self {
        CallArg::Literal(value)
    }
}
