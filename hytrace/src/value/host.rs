//! Concrete host objects.
//!
//! These are the objects the tracer observes in untraced state (frame locals,
//! globals, the module registry) and the objects that constant lowering and
//! reconstruction produce. They carry no symbolic information.
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIs, EnumString, IntoStaticStr};

use crate::{containers::HostClass, records::RecordClassRef, value::literal::Literal};

/// Example backing of a traced tensor.
///
/// The `id` is the identity of the fake tensor object; two fake tensors with
/// identical shape and dtype are still different objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FakeTensor {
    pub id: u64,
    pub shape: Vec<usize>,
    pub dtype: String,
}

/// Member of a host enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumConst {
    pub class: String,
    pub member: String,
}

/// A bound slot wrapper of a builtin type (e.g. `object.__init__` bound to an
/// instance). Compared by the identity of the wrapper object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodWrapper {
    pub object_id: u64,
    pub name: String,
}

/// A module object of the host process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleObject {
    pub name: String,
    pub file: Option<String>,
}

impl ModuleObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: None,
        }
    }
}

/// Builtin callables the tracer knows by name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIs,
    EnumString,
    IntoStaticStr,
    Display,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum BuiltinFn {
    List,
    Tuple,
    Dict,
    Set,
    Len,
    Str,
    Int,
}

/// A user-defined routine, identified by its qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserFunction {
    pub qualname: String,
}

impl UserFunction {
    pub fn new(qualname: impl Into<String>) -> Self {
        Self {
            qualname: qualname.into(),
        }
    }
}

/// A concrete host object.
#[derive(Debug, Clone, PartialEq, EnumIs, Serialize, Deserialize)]
pub enum HostValue {
    Literal(Literal),
    Enum(EnumConst),
    Tensor(FakeTensor),
    Builtin(BuiltinFn),
    MethodWrapper(MethodWrapper),
    Tuple(Vec<HostValue>),
    List(Vec<HostValue>),

    /// A map-like object. `class` is one of the map host classes (plain,
    /// ordered, or a record class behaving as a map).
    Map {
        class: HostClass,
        entries: Vec<(HostValue, HostValue)>,
    },

    /// A default map; `factory` is `None` when no default factory is set.
    DefaultMap {
        factory: Option<Box<HostValue>>,
        entries: Vec<(HostValue, HostValue)>,
    },

    Set(Vec<HostValue>),

    /// An instance of a registered record class. A field whose attribute has
    /// not been assigned yet is `None`.
    Record {
        class: RecordClassRef,
        fields: Vec<(String, Option<HostValue>)>,
    },

    Function(UserFunction),
    Class(HostClass),
    Module(ModuleObject),

    /// The live module registry of the host process.
    SysModules,

    /// Anything the tracer has no model for.
    Opaque(String),
}

impl HostValue {
    pub fn none() -> Self {
        HostValue::Literal(Literal::None)
    }

    /// Shorthand for a plain map built from literal pairs.
    pub fn dict<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Literal>,
        V: Into<Literal>,
    {
        HostValue::Map {
            class: HostClass::Dict,
            entries: entries
                .into_iter()
                .map(|(k, v)| (HostValue::Literal(k.into()), HostValue::Literal(v.into())))
                .collect(),
        }
    }
}

macro_rules! define_host_from_literal {
    ($($typ:ty),* $(,)?) => {
        $(
            impl From<$typ> for HostValue {
                fn from(value: $typ) -> Self {
                    HostValue::Literal(value.into())
                }
            }
        )*
    };
}

define_host_from_literal!(Literal, bool, i64, f64, &str, String);
