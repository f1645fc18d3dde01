use strum::{EnumIs, EnumTryAs};
use thiserror::Error;

use crate::value::ValueKind;

#[derive(Debug, Clone, PartialEq, Eq, EnumIs, EnumTryAs, Error)]
pub enum Error {
    /// A value without a stable projection was used as a container key.
    #[error("A value of kind `{kind}` cannot be used as a container key: {reason}.")]
    UnhashableValue { kind: ValueKind, reason: String },

    /// Lookup or pop of an absent key without a default.
    #[error("Key {key} is not present in the container.")]
    KeyNotPresent { key: String },

    /// Mutation of a container bound in a scope considered immutable (e.g. a
    /// captured free variable).
    #[error(
        "Operation `{operation}` would mutate a container bound in an immutable scope. Mutating closed-over containers is not traced."
    )]
    ImmutableContainer { operation: String },

    /// The operation has no symbolic semantics for the receiver.
    #[error("Operation `{operation}` is not supported on {receiver}.")]
    UnsupportedOperation { receiver: String, operation: String },

    /// A construction call shape that the adapters do not recognize.
    #[error("Cannot trace the construction of `{class}`: {reason}.")]
    UnsupportedConstruct { class: String, reason: String },

    /// Lowering a value that is not statically known.
    #[error("A value of kind `{kind}` is not statically known and cannot be lowered to a constant.")]
    NotConstant { kind: ValueKind },

    /// An id that does not refer to a live entry of the tracer's arenas.
    #[error("The handle `{0}` does not refer to a live entry of this tracer.")]
    InvalidHandle(String),
}

impl Error {
    /// Whether the interpreter may recover from this error by abandoning the
    /// current traced region and re-interpreting the instruction directly.
    ///
    /// Stale handles indicate a bug in the interpreter itself and abort the trace.
    pub fn is_recoverable(&self) -> bool {
        !self.is_invalid_handle()
    }

    pub(crate) fn unsupported(receiver: impl Into<String>, operation: impl Into<String>) -> Self {
        Error::UnsupportedOperation {
            receiver: receiver.into(),
            operation: operation.into(),
        }
    }

    pub(crate) fn construct(class: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::UnsupportedConstruct {
            class: class.into(),
            reason: reason.into(),
        }
    }
}

pub type TraceResult<T> = Result<T, Error>;
