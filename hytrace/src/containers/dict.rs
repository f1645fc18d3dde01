//! The associative container value.
//!
//! These operations implement the host map protocol over container snapshots.
//! They are shared by every container kind; the defaulting, set and record
//! adapters only override the few operations where their semantics differ.
//!
//! Reads never allocate a snapshot. Every mutator checks the container's
//! mutability, builds the next snapshot from a clone of the current one and
//! publishes it with [`Tracer::replace_all_references`].
use indexmap::IndexMap;
use log::trace;

use crate::{
    codegen::{ConstOperand, Emitter},
    containers::{
        ContainerId, ContainerKind, ContainerValue, DictMethod, HostClass, expect_args,
        expect_no_kwargs, key::HashableKey, view::ViewKind,
    },
    guards::GuardPredicate,
    tracer::Tracer,
    utils::{Error, TraceResult},
    value::{Literal, SymbolicValue, ValueId, ValueKind},
};

impl Tracer {
    /// Create a map container of class `dict` or `OrderedDict`.
    ///
    /// Entries are inserted in order; a repeated key keeps its first position
    /// and its last value.
    pub fn make_associative(
        &mut self,
        entries: impl IntoIterator<Item = (ValueId, ValueId)>,
        host_class: HostClass,
    ) -> TraceResult<ValueId> {
        if !matches!(host_class, HostClass::Dict | HostClass::OrderedDict) {
            return Err(Error::construct(
                host_class.to_string(),
                "not a plain associative container class",
            ));
        }
        let entries = self.collect_entries(entries)?;
        let value = ContainerValue::new(host_class, ContainerKind::Plain).with_entries(entries);
        Ok(self.new_container(value, None))
    }

    pub(crate) fn collect_entries(
        &mut self,
        entries: impl IntoIterator<Item = (ValueId, ValueId)>,
    ) -> TraceResult<IndexMap<HashableKey, ValueId>> {
        let mut collected = IndexMap::new();
        for (key, value) in entries {
            let key = HashableKey::wrap(self, key)?;
            collected.insert(key, value);
        }
        Ok(collected)
    }

    /// Record that the trace depends on `key` being present (or absent) in `cid`.
    ///
    /// Only the entries the container was observed with say anything about its
    /// source. After the trace mutates the container, presence follows from
    /// traced state and the observed key set is already pinned by `KeysMatch`.
    pub(crate) fn guard_key(
        &mut self,
        cid: ContainerId,
        key: &HashableKey,
        present: bool,
    ) -> TraceResult<()> {
        if !self.is_unmodified(cid)? {
            trace!("Skipping presence guard on mutated container {:?}.", cid);
            return Ok(());
        }
        let source = self.container_source(cid).cloned();
        self.add_guard(
            source,
            GuardPredicate::KeyPresent {
                key: key.projection().clone(),
                present,
            },
        );
        Ok(())
    }

    /// Sets only store the `None` sentinel and have no indexed access, so the
    /// keyed map protocol is refused on them.
    pub(crate) fn reject_indexing(&self, cid: ContainerId, operation: &str) -> TraceResult<()> {
        let snapshot = self.snapshot(cid)?;
        if snapshot.kind.is_set() {
            return Err(Error::unsupported(snapshot.host_class.to_string(), operation));
        }
        Ok(())
    }

    /// `receiver[key]`.
    pub fn lookup(&mut self, receiver: ValueId, key: ValueId) -> TraceResult<ValueId> {
        if self.get(receiver)?.is_sys_modules() {
            return self.sys_modules_lookup(key);
        }
        let cid = self.container_of(receiver)?;
        self.reject_indexing(cid, "__getitem__")?;
        let key = HashableKey::wrap(self, key)?;
        trace!("Lookup of {} in container {:?}.", key.projection(), cid);

        let snapshot = self.snapshot(cid)?;
        if let Some(value) = snapshot.entries.get(&key) {
            return Ok(*value);
        }
        let factory = match &snapshot.kind {
            ContainerKind::Defaulting { factory } => *factory,
            _ => None,
        };
        match factory {
            Some(factory) => self.default_missing(cid, key, factory),
            None => Err(Error::KeyNotPresent {
                key: key.projection().to_string(),
            }),
        }
    }

    /// Number of entries.
    pub fn length(&self, receiver: ValueId) -> TraceResult<usize> {
        let cid = self.container_of(receiver)?;
        Ok(self.snapshot(cid)?.len())
    }

    /// `key in receiver`. A value that cannot be used as a key is never present.
    pub fn contains(&mut self, receiver: ValueId, key: ValueId) -> TraceResult<bool> {
        if self.get(receiver)?.is_sys_modules() {
            return self.sys_modules_contains(key);
        }
        let cid = self.container_of(receiver)?;
        if !HashableKey::is_hashable(self, key) {
            return Ok(false);
        }
        let key = HashableKey::wrap(self, key)?;
        let present = self.snapshot(cid)?.entries.contains_key(&key);
        self.guard_key(cid, &key, present)?;
        Ok(present)
    }

    /// `receiver[key] = value`. An existing key keeps its position.
    pub fn set_item(&mut self, receiver: ValueId, key: ValueId, value: ValueId) -> TraceResult<()> {
        let cid = self.container_of(receiver)?;
        self.reject_indexing(cid, "__setitem__")?;
        self.ensure_mutable(cid, "__setitem__")?;
        let key = HashableKey::wrap(self, key)?;
        self.insert_entry(cid, key, value)
    }

    pub(crate) fn insert_entry(
        &mut self,
        cid: ContainerId,
        key: HashableKey,
        value: ValueId,
    ) -> TraceResult<()> {
        let mut next = self.snapshot(cid)?.clone();
        next.entries.insert(key, value);
        self.replace_all_references(cid, next)?;
        Ok(())
    }

    pub(crate) fn remove_entry(&mut self, cid: ContainerId, key: &HashableKey) -> TraceResult<ValueId> {
        let mut next = self.snapshot(cid)?.clone();
        let value = next
            .entries
            .shift_remove(key)
            .ok_or_else(|| Error::KeyNotPresent {
                key: key.projection().to_string(),
            })?;
        self.replace_all_references(cid, next)?;
        Ok(value)
    }

    /// `receiver.pop(key[, default])`.
    pub fn pop(
        &mut self,
        receiver: ValueId,
        key: ValueId,
        default: Option<ValueId>,
    ) -> TraceResult<ValueId> {
        let cid = self.container_of(receiver)?;
        self.reject_indexing(cid, "pop")?;
        self.ensure_mutable(cid, "pop")?;
        let key = HashableKey::wrap(self, key)?;
        let present = self.snapshot(cid)?.entries.contains_key(&key);
        match (present, default) {
            (true, default) => {
                if default.is_some() {
                    self.guard_key(cid, &key, true)?;
                }
                self.remove_entry(cid, &key)
            }
            (false, Some(default)) => {
                self.guard_key(cid, &key, false)?;
                Ok(default)
            }
            (false, None) => Err(Error::KeyNotPresent {
                key: key.projection().to_string(),
            }),
        }
    }

    /// `del receiver[key]`.
    pub fn del_item(&mut self, receiver: ValueId, key: ValueId) -> TraceResult<()> {
        let cid = self.container_of(receiver)?;
        self.reject_indexing(cid, "__delitem__")?;
        self.ensure_mutable(cid, "__delitem__")?;
        let key = HashableKey::wrap(self, key)?;
        self.remove_entry(cid, &key).map(|_| ())
    }

    /// `receiver.update(other, **kwargs)`.
    ///
    /// `other` may be another map-like container or a sequence of pairs. New
    /// keys are appended in the order they are produced.
    pub fn update(
        &mut self,
        receiver: ValueId,
        other: Option<ValueId>,
        kwargs: &IndexMap<String, ValueId>,
    ) -> TraceResult<()> {
        let cid = self.container_of(receiver)?;
        self.reject_indexing(cid, "update")?;
        self.ensure_mutable(cid, "update")?;

        let mut incoming: Vec<(HashableKey, ValueId)> = Vec::new();
        if let Some(other) = other {
            match self.get(other)?.clone() {
                SymbolicValue::Container(other_cid) => {
                    let snapshot = self.snapshot(other_cid)?;
                    if snapshot.kind.is_set() {
                        return Err(Error::unsupported(
                            self.snapshot(cid)?.host_class.to_string(),
                            "update from a set",
                        ));
                    }
                    incoming.extend(snapshot.entries.iter().map(|(k, v)| (k.clone(), *v)));
                }
                SymbolicValue::Tuple(items) | SymbolicValue::List(items) => {
                    for item in items {
                        let (key, value) = self.pair_of(item)?;
                        incoming.push((HashableKey::wrap(self, key)?, value));
                    }
                }
                other => {
                    return Err(Error::unsupported(
                        self.snapshot(cid)?.host_class.to_string(),
                        format!("update from a value of kind `{}`", ValueKind::from(&other)),
                    ));
                }
            }
        }
        for (name, value) in kwargs {
            let key = self.constant(name.as_str());
            incoming.push((HashableKey::wrap(self, key)?, *value));
        }

        let mut next = self.snapshot(cid)?.clone();
        next.entries.extend(incoming);
        self.replace_all_references(cid, next)?;
        Ok(())
    }

    fn pair_of(&self, item: ValueId) -> TraceResult<(ValueId, ValueId)> {
        match self.get(item)? {
            SymbolicValue::Tuple(pair) | SymbolicValue::List(pair) if pair.len() == 2 => {
                Ok((pair[0], pair[1]))
            }
            other => Err(Error::unsupported(
                ValueKind::from(other).to_string(),
                "unpacking as a key/value pair",
            )),
        }
    }

    /// `receiver.get(key[, default])`. An absent key yields `default`, or `None`.
    pub fn get_item_or(
        &mut self,
        receiver: ValueId,
        key: ValueId,
        default: Option<ValueId>,
    ) -> TraceResult<ValueId> {
        if self.get(receiver)?.is_sys_modules() {
            return self.sys_modules_get(key, default);
        }
        let cid = self.container_of(receiver)?;
        self.reject_indexing(cid, "get")?;
        let key = HashableKey::wrap(self, key)?;
        let found = self.snapshot(cid)?.entries.get(&key).copied();
        self.guard_key(cid, &key, found.is_some())?;
        Ok(found.or(default).unwrap_or(self.none()))
    }

    /// `receiver.setdefault(key[, default])`.
    pub fn setdefault(
        &mut self,
        receiver: ValueId,
        key: ValueId,
        default: Option<ValueId>,
    ) -> TraceResult<ValueId> {
        let cid = self.container_of(receiver)?;
        self.reject_indexing(cid, "setdefault")?;
        let key = HashableKey::wrap(self, key)?;
        if let Some(value) = self.snapshot(cid)?.entries.get(&key).copied() {
            self.guard_key(cid, &key, true)?;
            return Ok(value);
        }
        self.ensure_mutable(cid, "setdefault")?;
        self.guard_key(cid, &key, false)?;
        let value = default.unwrap_or(self.none());
        self.insert_entry(cid, key, value)?;
        Ok(value)
    }

    /// Keys of the current snapshot, in order.
    pub fn iterate_keys(&self, receiver: ValueId) -> TraceResult<Vec<ValueId>> {
        let cid = self.container_of(receiver)?;
        self.keys_of(cid)
    }

    /// `(key, value)` pairs of the current snapshot, in order.
    pub fn iterate_items(&self, receiver: ValueId) -> TraceResult<Vec<(ValueId, ValueId)>> {
        let cid = self.container_of(receiver)?;
        Ok(self
            .snapshot(cid)?
            .entries
            .iter()
            .map(|(k, v)| (k.value(), *v))
            .collect())
    }

    /// `receiver.items()` as a tuple of pairs.
    pub fn items(&mut self, receiver: ValueId) -> TraceResult<ValueId> {
        let pairs = self
            .iterate_items(receiver)?
            .into_iter()
            .map(|(k, v)| self.alloc(SymbolicValue::Tuple(vec![k, v])))
            .collect();
        Ok(self.alloc(SymbolicValue::Tuple(pairs)))
    }

    /// `receiver.copy()`: an independent container with the same entries.
    pub fn copy(&mut self, receiver: ValueId) -> TraceResult<ValueId> {
        let cid = self.container_of(receiver)?;
        self.fork_container(cid)
    }

    pub fn clear(&mut self, receiver: ValueId) -> TraceResult<()> {
        let cid = self.container_of(receiver)?;
        self.ensure_mutable(cid, "clear")?;
        let mut next = self.snapshot(cid)?.clone();
        next.entries.clear();
        self.replace_all_references(cid, next)?;
        Ok(())
    }

    pub(crate) fn call_dict_method(
        &mut self,
        receiver: ValueId,
        name: &str,
        args: &[ValueId],
        kwargs: &IndexMap<String, ValueId>,
    ) -> TraceResult<ValueId> {
        let cid = self.container_of(receiver)?;
        let class = self.snapshot(cid)?.host_class.to_string();
        let method = name
            .parse::<DictMethod>()
            .map_err(|_| Error::unsupported(class.as_str(), name))?;
        if method != DictMethod::Update {
            expect_no_kwargs(&class, name, kwargs)?;
        }

        match method {
            DictMethod::GetItem => {
                expect_args(&class, name, args, 1, 1)?;
                self.lookup(receiver, args[0])
            }
            DictMethod::SetItem => {
                expect_args(&class, name, args, 2, 2)?;
                self.set_item(receiver, args[0], args[1])?;
                Ok(self.none())
            }
            DictMethod::DelItem => {
                expect_args(&class, name, args, 1, 1)?;
                self.del_item(receiver, args[0])?;
                Ok(self.none())
            }
            DictMethod::Contains => {
                expect_args(&class, name, args, 1, 1)?;
                let present = self.contains(receiver, args[0])?;
                Ok(self.constant(present))
            }
            DictMethod::Len => {
                expect_args(&class, name, args, 0, 0)?;
                let len = self.length(receiver)? as i64;
                Ok(self.constant(len))
            }
            DictMethod::Iter => {
                expect_args(&class, name, args, 0, 0)?;
                let keys = self.iterate_keys(receiver)?;
                Ok(self.alloc(SymbolicValue::Tuple(keys)))
            }
            DictMethod::Get => {
                expect_args(&class, name, args, 1, 2)?;
                self.get_item_or(receiver, args[0], args.get(1).copied())
            }
            DictMethod::Pop => {
                expect_args(&class, name, args, 1, 2)?;
                self.pop(receiver, args[0], args.get(1).copied())
            }
            DictMethod::Update => {
                expect_args(&class, name, args, 0, 1)?;
                self.update(receiver, args.first().copied(), kwargs)?;
                Ok(self.none())
            }
            DictMethod::Keys => {
                expect_args(&class, name, args, 0, 0)?;
                self.view(receiver, ViewKind::Keys)
            }
            DictMethod::Values => {
                expect_args(&class, name, args, 0, 0)?;
                self.view(receiver, ViewKind::Values)
            }
            DictMethod::Items => {
                expect_args(&class, name, args, 0, 0)?;
                self.items(receiver)
            }
            DictMethod::Copy => {
                expect_args(&class, name, args, 0, 0)?;
                self.copy(receiver)
            }
            DictMethod::Clear => {
                expect_args(&class, name, args, 0, 0)?;
                self.clear(receiver)?;
                Ok(self.none())
            }
            DictMethod::SetDefault => {
                expect_args(&class, name, args, 1, 2)?;
                self.setdefault(receiver, args[0], args.get(1).copied())
            }
        }
    }

    /// Build the entries as a map literal. A map subclass wraps the literal in
    /// a call of its class.
    pub(crate) fn reconstruct_dict(&self, cid: ContainerId, out: &mut dyn Emitter) -> TraceResult<()> {
        let snapshot = self.snapshot(cid)?;
        let plain = snapshot.host_class.is_dict();
        if !plain {
            out.emit_load_constant(ConstOperand::Class(snapshot.host_class.clone()));
        }
        self.reconstruct_entries(cid, out)?;
        if !plain {
            out.emit_call_function(1);
        }
        Ok(())
    }

    /// Keys and values in order followed by `BuildMap`.
    pub(crate) fn reconstruct_entries(
        &self,
        cid: ContainerId,
        out: &mut dyn Emitter,
    ) -> TraceResult<()> {
        let snapshot = self.snapshot(cid)?;
        for (key, value) in &snapshot.entries {
            self.reconstruct(key.value(), out)?;
            self.reconstruct(*value, out)?;
        }
        out.emit_build_map(snapshot.len());
        Ok(())
    }

    pub(crate) fn literal_key(&mut self, name: &str) -> TraceResult<HashableKey> {
        let key = self.constant(Literal::from(name));
        HashableKey::wrap(self, key)
    }
}
