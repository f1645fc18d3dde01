//! Symbolic associative containers.
//!
//! Every map-like, set-like and record-like object observed while tracing is a
//! logical container: a [`ContainerId`] handle in the tracer's handle table
//! pointing to an immutable [`ContainerValue`] snapshot. The snapshot holds the
//! ordered entries and the [`ContainerKind`], which selects the policy layered
//! over the common associative behaviour:
//!
//! | kind         | module          | host classes                  |
//! |--------------|-----------------|-------------------------------|
//! | `Plain`      | [`dict`]        | `dict`, `OrderedDict`         |
//! | `Defaulting` | [`default`]     | `defaultdict`                 |
//! | `Set`        | [`set`]         | `set`                         |
//! | `Record`     | [`record`]      | registered record classes     |
//!
//! Views ([`view`]) and the module-table adapter ([`sys_modules`]) are not
//! containers themselves but dispatch into them.
//!
//! Host method names are parsed into closed enums at [`Tracer::call_method`];
//! anything that does not parse is an [`Error::UnsupportedOperation`].
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{EnumIs, EnumString, IntoStaticStr};

use crate::{
    codegen::Emitter,
    records::RecordClassRef,
    tracer::Tracer,
    utils::{Error, TraceResult},
    value::{BuiltinFn, SymbolicValue, ValueId, ValueKind},
};

pub mod default;
pub mod dict;
pub mod key;
pub mod record;
pub mod set;
pub mod sys_modules;
pub mod view;

use key::HashableKey;
use view::DictView;

slotmap::new_key_type! {
    /// A logical container. Stable across mutations.
    pub struct ContainerId;

    /// One immutable state of a logical container.
    pub struct SnapshotId;
}

/// Host class of a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumIs, Serialize, Deserialize)]
pub enum HostClass {
    Dict,
    OrderedDict,
    DefaultDict,
    Set,
    Record(RecordClassRef),
}

impl std::fmt::Display for HostClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostClass::Dict => write!(f, "dict"),
            HostClass::OrderedDict => write!(f, "collections.OrderedDict"),
            HostClass::DefaultDict => write!(f, "collections.defaultdict"),
            HostClass::Set => write!(f, "set"),
            HostClass::Record(class) => write!(f, "{}", class),
        }
    }
}

/// Lifecycle state of a logical container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIs)]
pub enum Mutability {
    Mutable,

    /// Bound in a scope whose containers must not be mutated by the trace,
    /// such as a closed-over variable.
    Immutable,
}

/// Primitive constructors accepted as default factories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactoryIntent {
    EmptyList,
    EmptyTuple,
    EmptyMap,
}

impl FactoryIntent {
    pub fn from_builtin(builtin: BuiltinFn) -> Option<Self> {
        match builtin {
            BuiltinFn::List => Some(FactoryIntent::EmptyList),
            BuiltinFn::Tuple => Some(FactoryIntent::EmptyTuple),
            BuiltinFn::Dict => Some(FactoryIntent::EmptyMap),
            _ => None,
        }
    }

    pub fn builtin(self) -> BuiltinFn {
        match self {
            FactoryIntent::EmptyList => BuiltinFn::List,
            FactoryIntent::EmptyTuple => BuiltinFn::Tuple,
            FactoryIntent::EmptyMap => BuiltinFn::Dict,
        }
    }
}

/// Default factory of a defaulting container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIs)]
pub enum DefaultFactory {
    Intent(FactoryIntent),

    /// A user-defined zero-argument routine.
    Routine(ValueId),
}

/// Which record adapter models a record container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIs)]
pub enum RecordFlavor {
    /// Structured output records; fields holding `None` are not stored.
    PlainData,

    /// User subclasses of the ordered map.
    Customized,
}

impl RecordFlavor {
    /// Whether fields bound to the `None` sentinel are kept as entries.
    pub fn include_none(self) -> bool {
        matches!(self, RecordFlavor::Customized)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, EnumIs)]
pub enum ContainerKind {
    Plain,
    Defaulting { factory: Option<DefaultFactory> },

    /// Every value slot holds the `None` sentinel.
    Set,
    Record { flavor: RecordFlavor },
}

/// One immutable state of a logical container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerValue {
    pub entries: IndexMap<HashableKey, ValueId>,
    pub host_class: HostClass,
    pub kind: ContainerKind,
}

impl ContainerValue {
    pub fn new(host_class: HostClass, kind: ContainerKind) -> Self {
        Self {
            entries: IndexMap::new(),
            host_class,
            kind,
        }
    }

    pub fn with_entries(mut self, entries: IndexMap<HashableKey, ValueId>) -> Self {
        self.entries = entries;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored value of a field of a record container.
    pub fn field(&self, name: &str) -> Option<ValueId> {
        self.entries
            .iter()
            .find(|(key, _)| key.projection().as_str() == Some(name))
            .map(|(_, value)| *value)
    }
}

/// Map methods with symbolic semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
pub enum DictMethod {
    #[strum(serialize = "__getitem__")]
    GetItem,
    #[strum(serialize = "__setitem__")]
    SetItem,
    #[strum(serialize = "__delitem__")]
    DelItem,
    #[strum(serialize = "__contains__")]
    Contains,
    #[strum(serialize = "__len__")]
    Len,
    #[strum(serialize = "__iter__")]
    Iter,
    #[strum(serialize = "get")]
    Get,
    #[strum(serialize = "pop")]
    Pop,
    #[strum(serialize = "update")]
    Update,
    #[strum(serialize = "keys")]
    Keys,
    #[strum(serialize = "values")]
    Values,
    #[strum(serialize = "items")]
    Items,
    #[strum(serialize = "copy")]
    Copy,
    #[strum(serialize = "clear")]
    Clear,
    #[strum(serialize = "setdefault")]
    SetDefault,
}

/// Set methods with symbolic semantics. Indexed access is deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
pub enum SetMethod {
    #[strum(serialize = "add")]
    Add,
    #[strum(serialize = "pop")]
    Pop,
    #[strum(serialize = "remove")]
    Remove,
    #[strum(serialize = "discard")]
    Discard,
    #[strum(serialize = "__contains__")]
    Contains,
    #[strum(serialize = "__len__")]
    Len,
    #[strum(serialize = "__iter__")]
    Iter,
    #[strum(serialize = "copy")]
    Copy,
    #[strum(serialize = "clear")]
    Clear,
}

/// Methods of key and value views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
pub enum ViewMethod {
    #[strum(serialize = "__len__")]
    Len,
    #[strum(serialize = "__iter__")]
    Iter,
    #[strum(serialize = "__contains__")]
    Contains,
}

/// Record protocol methods of plain-data records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
pub enum RecordMethod {
    #[strum(serialize = "__getitem__")]
    GetItem,
    #[strum(serialize = "__setattr__")]
    SetAttr,
    #[strum(serialize = "to_tuple")]
    ToTuple,
}

pub(crate) fn expect_args(
    receiver: &str,
    method: &str,
    args: &[ValueId],
    min: usize,
    max: usize,
) -> TraceResult<()> {
    if args.len() < min || args.len() > max {
        return Err(Error::unsupported(
            receiver,
            format!("{} with {} positional arguments", method, args.len()),
        ));
    }
    Ok(())
}

pub(crate) fn expect_no_kwargs(
    receiver: &str,
    method: &str,
    kwargs: &IndexMap<String, ValueId>,
) -> TraceResult<()> {
    if !kwargs.is_empty() {
        return Err(Error::unsupported(receiver, format!("{} with keyword arguments", method)));
    }
    Ok(())
}

impl Tracer {
    /// Call the host method `name` on `receiver`.
    ///
    /// This is the single entry point used by the interpreter for container
    /// methods. The receiver may be a container, a view or the module table.
    pub fn call_method(
        &mut self,
        receiver: ValueId,
        name: &str,
        args: &[ValueId],
        kwargs: &IndexMap<String, ValueId>,
    ) -> TraceResult<ValueId> {
        match self.get(receiver)?.clone() {
            SymbolicValue::Container(cid) => match self.snapshot(cid)?.kind.clone() {
                ContainerKind::Set => self.call_set_method(receiver, name, args, kwargs),
                ContainerKind::Record { flavor } => {
                    self.call_record_class_method(receiver, flavor, name, args, kwargs)
                }
                ContainerKind::Plain | ContainerKind::Defaulting { .. } => {
                    self.call_dict_method(receiver, name, args, kwargs)
                }
            },
            SymbolicValue::View(view) => self.call_view_method(view, name, args, kwargs),
            SymbolicValue::SysModules => self.call_sys_modules_method(receiver, name, args, kwargs),
            other => Err(Error::unsupported(ValueKind::from(&other).to_string(), name)),
        }
    }

    /// Read the attribute `name` of a record container.
    pub fn get_attr(&mut self, receiver: ValueId, name: &str) -> TraceResult<ValueId> {
        let cid = self.container_of(receiver)?;
        let snapshot = self.snapshot(cid)?;
        match snapshot.kind {
            ContainerKind::Record { flavor } => self.record_get_attr(receiver, flavor, name),
            _ => Err(Error::unsupported(
                snapshot.host_class.to_string(),
                format!("attribute `{}`", name),
            )),
        }
    }

    /// Emit the construction sequence of a logical container.
    pub(crate) fn reconstruct_container(
        &self,
        cid: ContainerId,
        out: &mut dyn Emitter,
    ) -> TraceResult<()> {
        match self.snapshot(cid)?.kind {
            ContainerKind::Plain => self.reconstruct_dict(cid, out),
            ContainerKind::Defaulting { .. } => self.reconstruct_defaulting(cid, out),
            ContainerKind::Set => self.reconstruct_set(cid, out),
            ContainerKind::Record { .. } => self.reconstruct_record(cid, out),
        }
    }

    pub(crate) fn keys_of(&self, cid: ContainerId) -> TraceResult<Vec<ValueId>> {
        Ok(self.snapshot(cid)?.entries.keys().map(HashableKey::value).collect())
    }

    pub(crate) fn values_of(&self, cid: ContainerId) -> TraceResult<Vec<ValueId>> {
        Ok(self.snapshot(cid)?.entries.values().copied().collect())
    }

    /// Allocate a view over the container behind `owner`.
    pub fn view(&mut self, owner: ValueId, kind: view::ViewKind) -> TraceResult<ValueId> {
        let owner = self.container_of(owner)?;
        Ok(self.alloc(DictView { owner, kind }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_method_names_parse_into_closed_sets() {
        assert_eq!("__getitem__".parse::<DictMethod>(), Ok(DictMethod::GetItem));
        assert_eq!("setdefault".parse::<DictMethod>(), Ok(DictMethod::SetDefault));
        assert!("__getitem__".parse::<SetMethod>().is_err());
        assert!("append".parse::<DictMethod>().is_err());
        let name: &'static str = RecordMethod::ToTuple.into();
        assert_eq!(name, "to_tuple");
    }

    #[test]
    fn only_customized_records_keep_none_fields() {
        assert!(RecordFlavor::Customized.include_none());
        assert!(!RecordFlavor::PlainData.include_none());
    }
}
