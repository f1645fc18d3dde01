//! Hashable wrapper for symbolic container keys.
//!
//! Symbolic values are proxies, not concrete objects, so they cannot be hashed
//! directly. A [`HashableKey`] pairs a key value with its *projection*: a
//! concrete, comparable representation of the underlying host object. Keys
//! compare and hash through their projection only.
//!
//! | value                           | projection                       |
//! |---------------------------------|----------------------------------|
//! | literal constant                | the literal (floats by bits)     |
//! | enum constant                   | `(class, member)`                |
//! | tensor with an example backing  | identity of the fake tensor      |
//! | method wrapper                  | identity of the wrapper object   |
//! | builtin callable                | the builtin                      |
//! | symbolic integer                | its hint (guarded)               |
//! | tuple of the above              | tuple of projections             |
//!
//! Anything else is rejected with [`Error::UnhashableValue`].
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::{
    guards::GuardPredicate,
    tracer::Tracer,
    utils::{Error, TraceResult},
    value::{BuiltinFn, Literal, SymbolicValue, TensorValue, ValueId, ValueKind},
};

/// Concrete comparable representation of a key.
///
/// The variant is the dynamic kind of the underlying object: an integer and a
/// boolean never compare equal, even if the host would coerce them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Projection {
    None,
    Bool(bool),
    Int(i64),
    /// Bit pattern of the float, with `-0.0` folded into `0.0` and a single NaN.
    Float(u64),
    Str(String),
    Enum { class: String, member: String },
    /// Identity of the example tensor.
    Tensor(u64),
    Builtin(BuiltinFn),
    /// Identity of an object compared by reference.
    Identity(u64),
    Tuple(Vec<Projection>),
}

impl Projection {
    pub fn from_literal(literal: &Literal) -> Self {
        match literal {
            Literal::None => Projection::None,
            Literal::Bool(b) => Projection::Bool(*b),
            Literal::Int(i) => Projection::Int(*i),
            Literal::Float(x) => Projection::Float(Self::float_bits(*x)),
            Literal::Str(s) => Projection::Str(s.clone()),
            Literal::Tuple(items) => {
                Projection::Tuple(items.iter().map(Projection::from_literal).collect())
            }
        }
    }

    fn float_bits(x: f64) -> u64 {
        if x == 0.0 {
            0.0f64.to_bits()
        } else if x.is_nan() {
            f64::NAN.to_bits()
        } else {
            x.to_bits()
        }
    }

    /// The literal this projection stands for, when it is one.
    pub fn to_literal(&self) -> Option<Literal> {
        Some(match self {
            Projection::None => Literal::None,
            Projection::Bool(b) => Literal::Bool(*b),
            Projection::Int(i) => Literal::Int(*i),
            Projection::Float(bits) => Literal::Float(f64::from_bits(*bits)),
            Projection::Str(s) => Literal::Str(s.clone()),
            Projection::Tuple(items) => Literal::Tuple(
                items
                    .iter()
                    .map(Projection::to_literal)
                    .collect::<Option<Vec<_>>>()?,
            ),
            Projection::Enum { .. }
            | Projection::Tensor(_)
            | Projection::Builtin(_)
            | Projection::Identity(_) => return None,
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Projection::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Projection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Projection::Enum { class, member } => write!(f, "{}.{}", class, member),
            Projection::Tensor(id) => write!(f, "<tensor #{}>", id),
            Projection::Builtin(b) => write!(f, "<builtin {}>", b),
            Projection::Identity(id) => write!(f, "<object #{}>", id),
            Projection::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            // Scalar projections print like the literal they stand for.
            other => match other.to_literal() {
                Some(literal) => write!(f, "{}", literal),
                None => write!(f, "<?>"),
            },
        }
    }
}

/// A container key.
///
/// The only way to build one is [`HashableKey::wrap`], which enforces that the
/// value is hashable-compatible.
#[derive(Debug, Clone)]
pub struct HashableKey {
    value: ValueId,
    projection: Projection,
}

impl HashableKey {
    /// Wrap `value` as a key.
    ///
    /// A symbolic integer is specialized to its hint: the returned key refers to
    /// a fresh constant and a guard pins the integer to that hint.
    pub fn wrap(tx: &mut Tracer, value: ValueId) -> TraceResult<Self> {
        let projection = Self::project(tx, value)?;
        let specialized = tx.get(value)?.is_sym_int();
        let value = match &projection {
            Projection::Int(hint) if specialized => {
                let source = tx.source(value).cloned();
                tx.alloc_with_source(Literal::Int(*hint), source)
            }
            _ => value,
        };
        Ok(Self { value, projection })
    }

    /// Whether `value` could be wrapped, without recording anything.
    pub fn is_hashable(tx: &Tracer, value: ValueId) -> bool {
        match tx.get(value) {
            Ok(SymbolicValue::Constant(_))
            | Ok(SymbolicValue::Enum(_))
            | Ok(SymbolicValue::Builtin(_))
            | Ok(SymbolicValue::MethodWrapper(_)) => true,
            Ok(SymbolicValue::Tensor(TensorValue { example })) => example.is_some(),
            Ok(SymbolicValue::SymInt(_)) => tx.config().specialize_symnodes,
            Ok(SymbolicValue::Tuple(items)) => items.iter().all(|item| Self::is_hashable(tx, *item)),
            _ => false,
        }
    }

    fn project(tx: &mut Tracer, value: ValueId) -> TraceResult<Projection> {
        let symbolic = tx.get(value)?.clone();
        let kind = ValueKind::from(&symbolic);
        match symbolic {
            SymbolicValue::Constant(literal) => Ok(Projection::from_literal(&literal)),
            SymbolicValue::Enum(e) => Ok(Projection::Enum {
                class: e.class,
                member: e.member,
            }),
            SymbolicValue::Tensor(TensorValue { example: Some(fake) }) => {
                Ok(Projection::Tensor(fake.id))
            }
            SymbolicValue::Tensor(TensorValue { example: None }) => Err(Error::UnhashableValue {
                kind,
                reason: "the tensor has no example value".to_string(),
            }),
            SymbolicValue::Builtin(b) => Ok(Projection::Builtin(b)),
            SymbolicValue::MethodWrapper(wrapper) => Ok(Projection::Identity(wrapper.object_id)),
            SymbolicValue::SymInt(sym) => {
                if !tx.config().specialize_symnodes {
                    return Err(Error::UnhashableValue {
                        kind,
                        reason: format!("symbolic integer `{}` is not specialized", sym.expr),
                    });
                }
                let source = tx.source(value).cloned();
                tx.add_guard(
                    source,
                    GuardPredicate::ConstantMatch {
                        value: Projection::Int(sym.hint),
                    },
                );
                Ok(Projection::Int(sym.hint))
            }
            SymbolicValue::Tuple(items) => items
                .into_iter()
                .map(|item| Self::project(tx, item))
                .collect::<TraceResult<Vec<_>>>()
                .map(Projection::Tuple),
            _ => Err(Error::UnhashableValue {
                kind,
                reason: "values of this kind have no stable projection".to_string(),
            }),
        }
    }

    /// The symbolic value this key wraps.
    pub fn value(&self) -> ValueId {
        self.value
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }
}

impl PartialEq for HashableKey {
    fn eq(&self, other: &Self) -> bool {
        self.projection == other.projection
    }
}

impl Eq for HashableKey {}

impl Hash for HashableKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.projection.hash(state);
    }
}
