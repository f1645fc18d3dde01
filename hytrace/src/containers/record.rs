//! Record adapters.
//!
//! Host records are modelled as associative containers keyed by field name.
//! Two adapters exist, selected by [`RecordFlavor`]:
//!
//! - plain-data records store only the fields that hold a value; a field bound
//!   to `None` or left at its declared default is omitted, and reading it back
//!   as an attribute yields the declared default;
//! - customized records are user subclasses of the ordered map. Their
//!   unoverridden map methods behave like the base map, and overridden methods
//!   are traced through the user-routine inliner.
//!
//! Both rebuild as a keyword call of the record class.
use either::Either;
use indexmap::IndexMap;
use log::trace;
use smallvec::SmallVec;

use crate::{
    codegen::{ConstOperand, Emitter},
    containers::{
        ContainerId, ContainerKind, ContainerValue, HostClass, RecordFlavor, RecordMethod,
        expect_args, expect_no_kwargs,
    },
    guards::GuardPredicate,
    records::{HostRecordLike, MethodResolution, RecordClassRef},
    source::Source,
    tracer::Tracer,
    utils::{Error, TraceResult},
    value::{CallArg, Capabilities, HostValue, Literal, SymbolicValue, ValueId},
};

impl Tracer {
    /// Create a plain-data record from field bindings.
    ///
    /// Entries are stored in declaration order. Fields bound to `None` are
    /// omitted; unknown field names are rejected.
    pub fn make_record_adapter(
        &mut self,
        class: &RecordClassRef,
        entries: impl IntoIterator<Item = (String, ValueId)>,
    ) -> TraceResult<ValueId> {
        self.new_record(class, entries, None)
    }

    fn new_record(
        &mut self,
        class: &RecordClassRef,
        entries: impl IntoIterator<Item = (String, ValueId)>,
        source: Option<Source>,
    ) -> TraceResult<ValueId> {
        let record = self.records().get(class)?;
        if record.flavor() != RecordFlavor::PlainData {
            return Err(Error::construct(record.name(), "not a plain-data record class"));
        }

        let mut given: IndexMap<String, ValueId> = IndexMap::new();
        for (name, value) in entries {
            if !record.fields().iter().any(|f| f.name == name) {
                return Err(Error::construct(
                    record.name(),
                    format!("`{}` is not a declared field", name),
                ));
            }
            given.insert(name, value);
        }

        let mut stored = IndexMap::new();
        for field in record.fields() {
            let Some(value) = given.get(&field.name).copied() else {
                continue;
            };
            if self.get(value)?.is_none_literal() {
                continue;
            }
            stored.insert(self.literal_key(&field.name)?, value);
        }

        let value = ContainerValue::new(
            HostClass::Record(class.clone()),
            ContainerKind::Record {
                flavor: RecordFlavor::PlainData,
            },
        )
        .with_entries(stored);
        Ok(self.new_container(value, source))
    }

    /// Create a customized record from arbitrary entries, kept in order.
    pub fn make_customized_record_adapter(
        &mut self,
        class: &RecordClassRef,
        entries: impl IntoIterator<Item = (ValueId, ValueId)>,
    ) -> TraceResult<ValueId> {
        let record = self.records().get(class)?;
        if record.flavor() != RecordFlavor::Customized {
            return Err(Error::construct(record.name(), "not a customized record class"));
        }
        let entries = self.collect_entries(entries)?;
        let value = ContainerValue::new(
            HostClass::Record(class.clone()),
            ContainerKind::Record {
                flavor: RecordFlavor::Customized,
            },
        )
        .with_entries(entries);
        Ok(self.new_container(value, None))
    }

    fn call_arg_value(&mut self, record: &dyn HostRecordLike, arg: &CallArg) -> TraceResult<ValueId> {
        match arg {
            CallArg::Value(value) => Ok(*value),
            CallArg::Literal(Literal::None) => Ok(self.none()),
            CallArg::Literal(literal) => Ok(self.constant(literal.clone())),
            CallArg::Opaque(description) => Err(Error::construct(
                record.name(),
                format!("argument `{}` is neither traced nor a literal", description),
            )),
        }
    }

    /// Trace `Class(*args, **kwargs)` for a plain-data record class.
    pub fn create_record_from_call(
        &mut self,
        class: &RecordClassRef,
        args: &[CallArg],
        kwargs: &IndexMap<String, CallArg>,
    ) -> TraceResult<ValueId> {
        let record = self.records().get(class)?;
        let bound = record.bind(args, kwargs)?;

        let mut entries = Vec::with_capacity(bound.len());
        for (name, arg) in &bound {
            // Raw declared defaults are not stored; reads fall back to them.
            let Either::Left(arg) = arg else {
                continue;
            };
            let value = self.call_arg_value(&*record, arg)?;
            if !self.get(value)?.is_none_literal() {
                entries.push((name.clone(), value));
            }
        }

        // A lone scalar field would make iterating the record ambiguous.
        if let [(name, value)] = entries.as_slice() {
            if self.config().record_single_field_check
                && !self
                    .capabilities(*value)?
                    .intersects(Capabilities::TENSOR_LIKE | Capabilities::CONTAINER_LIKE)
            {
                return Err(Error::construct(
                    record.name(),
                    format!("only field `{}` is set and it is not container-like", name),
                ));
            }
        }
        self.make_record_adapter(class, entries)
    }

    /// Trace `Class(*args, **kwargs)` for a customized record class.
    ///
    /// Accepted shapes: a structured class bound against its fields, keyword
    /// arguments only, or a single map to copy.
    pub fn create_customized_from_call(
        &mut self,
        class: &RecordClassRef,
        args: &[CallArg],
        kwargs: &IndexMap<String, CallArg>,
    ) -> TraceResult<ValueId> {
        let record = self.records().get(class)?;

        let entries: Vec<(ValueId, ValueId)> = if record.is_structured() {
            let mut entries = Vec::new();
            for (name, arg) in record.bind(args, kwargs)? {
                let value = match arg {
                    Either::Left(arg) => self.call_arg_value(&*record, &arg)?,
                    Either::Right(default) => self.constant(default),
                };
                entries.push((self.constant(name), value));
            }
            entries
        } else if args.is_empty() {
            let mut entries = Vec::new();
            for (name, arg) in kwargs {
                let value = self.call_arg_value(&*record, arg)?;
                entries.push((self.constant(name.as_str()), value));
            }
            entries
        } else if let Some(other) = self.single_map_argument(args, kwargs)? {
            self.snapshot(other)?
                .entries
                .iter()
                .map(|(k, v)| (k.value(), *v))
                .collect()
        } else {
            return Err(Error::construct(record.name(), "unrecognized constructor arguments"));
        };

        self.make_customized_record_adapter(class, entries)
    }

    /// The container passed as the only argument of a call, if that is the
    /// shape of the call.
    fn single_map_argument(
        &self,
        args: &[CallArg],
        kwargs: &IndexMap<String, CallArg>,
    ) -> TraceResult<Option<ContainerId>> {
        let [CallArg::Value(other)] = args else {
            return Ok(None);
        };
        if !kwargs.is_empty() {
            return Ok(None);
        }
        match self.get(*other)? {
            SymbolicValue::Container(cid) if !self.snapshot(*cid)?.kind.is_set() => Ok(Some(*cid)),
            _ => Ok(None),
        }
    }

    /// Wrap a host record instance observed in untraced state.
    pub(crate) fn wrap_record_instance(
        &mut self,
        class: &RecordClassRef,
        fields: &[(String, Option<HostValue>)],
        source: Option<Source>,
    ) -> TraceResult<ValueId> {
        let record = self.records().get(class)?;
        if record.flavor() != RecordFlavor::PlainData {
            return Err(Error::construct(
                record.name(),
                "instances of customized records cannot be wrapped",
            ));
        }
        if source.is_some() {
            self.add_guard(
                source.clone(),
                GuardPredicate::ClassIs {
                    class: HostClass::Record(class.clone()),
                },
            );
        }

        let mut entries = Vec::new();
        for (name, value) in fields {
            match value {
                None | Some(HostValue::Literal(Literal::None)) => {}
                Some(value) => {
                    let field_source = source.as_ref().map(|s| s.attr(name.as_str()));
                    let value = self.build_host(value, field_source)?;
                    entries.push((name.clone(), value));
                }
            }
        }
        self.new_record(class, entries, source)
    }

    fn record_class_of(&self, cid: ContainerId) -> TraceResult<RecordClassRef> {
        match &self.snapshot(cid)?.host_class {
            HostClass::Record(class) => Ok(class.clone()),
            other => Err(Error::unsupported(other.to_string(), "record protocol")),
        }
    }

    /// Stored values of a record, in order, as a tuple.
    pub fn to_tuple(&mut self, receiver: ValueId) -> TraceResult<ValueId> {
        let cid = self.container_of(receiver)?;
        let values = self.values_of(cid)?;
        Ok(self.alloc(SymbolicValue::Tuple(values)))
    }

    pub(crate) fn call_record_method(
        &mut self,
        receiver: ValueId,
        method: RecordMethod,
        args: &[ValueId],
        kwargs: &IndexMap<String, ValueId>,
    ) -> TraceResult<ValueId> {
        let cid = self.container_of(receiver)?;
        let class = self.record_class_of(cid)?;
        let name: &'static str = method.into();
        expect_no_kwargs(class.name(), name, kwargs)?;

        match method {
            RecordMethod::GetItem => {
                expect_args(class.name(), name, args, 1, 1)?;
                let index = match self.get(args[0])? {
                    SymbolicValue::Constant(Literal::Int(index)) => Some(*index),
                    _ => None,
                };
                let Some(index) = index else {
                    return self.lookup(receiver, args[0]);
                };
                let values = self.values_of(cid)?;
                let at = if index < 0 { index + values.len() as i64 } else { index };
                usize::try_from(at)
                    .ok()
                    .and_then(|at| values.get(at).copied())
                    .ok_or_else(|| Error::KeyNotPresent {
                        key: index.to_string(),
                    })
            }
            RecordMethod::SetAttr => {
                expect_args(class.name(), name, args, 2, 2)?;
                self.set_item(receiver, args[0], args[1])?;
                Ok(self.none())
            }
            RecordMethod::ToTuple => {
                expect_args(class.name(), name, args, 0, 0)?;
                self.to_tuple(receiver)
            }
        }
    }

    /// Dispatch a method call on a record through its class: overridden methods
    /// are inlined, inherited ones run the record protocol or the base map.
    pub(crate) fn call_record_class_method(
        &mut self,
        receiver: ValueId,
        flavor: RecordFlavor,
        name: &str,
        args: &[ValueId],
        kwargs: &IndexMap<String, ValueId>,
    ) -> TraceResult<ValueId> {
        let cid = self.container_of(receiver)?;
        let class = self.record_class_of(cid)?;
        let record = self.records().get(&class)?;

        match record.resolve_method(name) {
            MethodResolution::Base => match (flavor, name.parse::<RecordMethod>()) {
                (RecordFlavor::PlainData, Ok(method)) => {
                    self.call_record_method(receiver, method, args, kwargs)
                }
                _ => self.call_dict_method(receiver, name, args, kwargs),
            },
            MethodResolution::Overridden(routine) => {
                let source = self.container_source(cid).cloned();
                self.add_guard(
                    source.clone(),
                    GuardPredicate::ClassIs {
                        class: HostClass::Record(class),
                    },
                );
                let routine_source = source.map(|s| s.attr("__class__").attr(name));
                let func = self.alloc_with_source(routine, routine_source);
                let call_args: Vec<_> = std::iter::once(receiver).chain(args.iter().copied()).collect();
                self.inline_call(func, &call_args, kwargs)
            }
            MethodResolution::Missing => Err(Error::unsupported(record.name(), name)),
        }
    }

    pub(crate) fn record_get_attr(
        &mut self,
        receiver: ValueId,
        flavor: RecordFlavor,
        name: &str,
    ) -> TraceResult<ValueId> {
        let cid = self.container_of(receiver)?;
        if self.snapshot(cid)?.field(name).is_some() {
            trace!("Attribute `{}` of record {:?} read through `__getitem__`.", name, cid);
            let key = self.constant(name);
            return self.call_method(receiver, "__getitem__", &[key], &IndexMap::new());
        }

        let class = self.record_class_of(cid)?;
        let record = self.records().get(&class)?;
        match (flavor, record.default_of(name)) {
            (RecordFlavor::PlainData, Some(default)) => Ok(self.constant(default.clone())),
            _ => Err(Error::unsupported(record.name(), format!("attribute `{}`", name))),
        }
    }

    /// `Class(field=value, ...)` in entry order.
    pub(crate) fn reconstruct_record(&self, cid: ContainerId, out: &mut dyn Emitter) -> TraceResult<()> {
        let class = self.record_class_of(cid)?;
        out.emit_load_constant(ConstOperand::Class(HostClass::Record(class.clone())));

        let mut names: SmallVec<String, 4> = SmallVec::new();
        for (key, value) in &self.snapshot(cid)?.entries {
            let name = key.projection().as_str().ok_or_else(|| {
                Error::unsupported(
                    class.name(),
                    format!("reconstruction with the non-string key {}", key.projection()),
                )
            })?;
            self.reconstruct(*value, out)?;
            names.push(name.to_string());
        }
        out.emit_call_keyword(names);
        Ok(())
    }
}
