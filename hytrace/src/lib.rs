//! Symbolic container values for a tracing front-end interpreter.
//!
//! While the interpreter symbolically executes a guest program, map-like,
//! set-like and record-like objects are modelled here as symbolic containers.
//! The crate emulates their host semantics (insertion order, hashing, default
//! factories, views), records the guards a cached trace depends on, and can
//! re-materialize every container as a short construction sequence when
//! tracing falls back to interpretation.
//!
//! The entry point is [`tracer::Tracer`], which owns all state. Containers are
//! created with the `make_*` constructors or by wrapping host objects, and are
//! driven through typed operations or [`tracer::Tracer::call_method`]:
//!
//! ```rust
//! use hytrace::prelude::*;
//!
//! let mut tx = Tracer::default();
//! let (a, one) = (tx.constant("a"), tx.constant(1i64));
//! let d = tx.make_associative([(a, one)], HostClass::Dict).unwrap();
//!
//! let b = tx.constant("b");
//! let two = tx.constant(2i64);
//! tx.set_item(d, b, two).unwrap();
//! assert_eq!(tx.length(d).unwrap(), 2);
//!
//! let mut out = InstrStream::new();
//! tx.reconstruct(d, &mut out).unwrap();
//! assert_eq!(out.last(), Some(&Instr::BuildMap(2)));
//! ```

pub mod builder;
pub mod codegen;
pub mod config;
pub mod containers;
pub mod guards;
pub mod records;
pub mod source;
#[cfg(any(test, feature = "test-utils"))]
pub mod tests_utils;
pub mod tracer;
pub mod utils;
pub mod value;

pub mod prelude {
    pub use crate::codegen::{ConstOperand, Emitter, Instr, InstrStream};
    pub use crate::config::TracerConfig;
    pub use crate::containers::{HostClass, key::HashableKey, view::ViewKind};
    pub use crate::guards::{Guard, GuardPredicate};
    pub use crate::records::{CustomRecordType, DataRecordType, FieldDecl, HostRecordLike};
    pub use crate::source::Source;
    pub use crate::tracer::{RoutineInliner, StaticModuleRegistry, Tracer};
    pub use crate::utils::{Error, TraceResult};
    pub use crate::value::{CallArg, HostValue, Literal, SymbolicValue, ValueId};
}
