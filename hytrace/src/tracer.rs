//! The interpreter-side tracing context.
//!
//! A [`Tracer`] owns every piece of state the container subsystem touches:
//!
//! - the value arena, with the optional [`Source`] of each value;
//! - the snapshot arena holding immutable [`ContainerValue`]s;
//! - the handle table, mapping each logical container to its current snapshot;
//! - the guard registry, the record registry and the configuration;
//! - the collaborator hooks used to inline user routines and to read the
//!   process module table.
//!
//! Mutating a container never edits a snapshot in place. A new snapshot is
//! allocated and the handle is retargeted ([`Tracer::replace_all_references`]),
//! so every alias of the logical container observes the mutation while older
//! snapshots stay valid for [`Tracer::restore`].
use std::rc::Rc;

use indexmap::IndexMap;
use log::debug;
use slotmap::{SecondaryMap, SlotMap};

use crate::{
    config::TracerConfig,
    containers::{ContainerId, ContainerValue, Mutability, SnapshotId},
    guards::{Guard, GuardPredicate, GuardRegistry},
    records::RecordRegistry,
    source::Source,
    utils::{Error, TraceResult},
    value::{Literal, ModuleObject, SymbolicValue, ValueId},
};

/// Re-entry point into the interpreter for user-defined routines.
pub trait RoutineInliner: std::fmt::Debug {
    /// Trace a call of `func` and return the symbolic result.
    fn inline_call(
        &self,
        tx: &mut Tracer,
        func: ValueId,
        args: &[ValueId],
        kwargs: &IndexMap<String, ValueId>,
    ) -> TraceResult<ValueId>;
}

/// Inliner used when the embedding interpreter provides none.
#[derive(Debug, Default)]
pub struct NoInliner;

impl RoutineInliner for NoInliner {
    fn inline_call(
        &self,
        tx: &mut Tracer,
        func: ValueId,
        _args: &[ValueId],
        _kwargs: &IndexMap<String, ValueId>,
    ) -> TraceResult<ValueId> {
        let receiver = match tx.get(func)? {
            SymbolicValue::UserFunction(f) => f.qualname.clone(),
            other => crate::value::ValueKind::from(other).to_string(),
        };
        Err(Error::unsupported(receiver, "inline user routine"))
    }
}

/// Read access to the live module registry of the host process.
pub trait ModuleRegistry: std::fmt::Debug {
    fn lookup(&self, name: &str) -> Option<ModuleObject>;

    /// Every registered module, in registration order.
    fn entries(&self) -> Vec<ModuleObject>;
}

/// A fixed module registry.
#[derive(Debug, Clone, Default)]
pub struct StaticModuleRegistry {
    modules: IndexMap<String, ModuleObject>,
}

impl StaticModuleRegistry {
    pub fn new(modules: impl IntoIterator<Item = ModuleObject>) -> Self {
        Self {
            modules: modules.into_iter().map(|m| (m.name.clone(), m)).collect(),
        }
    }
}

impl ModuleRegistry for StaticModuleRegistry {
    fn lookup(&self, name: &str) -> Option<ModuleObject> {
        self.modules.get(name).cloned()
    }

    fn entries(&self) -> Vec<ModuleObject> {
        self.modules.values().cloned().collect()
    }
}

#[derive(Debug, Clone)]
struct HandleEntry {
    snapshot: SnapshotId,
    /// Snapshot the container held when it was created or wrapped.
    observed: SnapshotId,
    mutability: Mutability,
    source: Option<Source>,
}

/// The snapshot every logical container designated at some point in time.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    snapshots: SecondaryMap<ContainerId, SnapshotId>,
}

#[derive(Debug)]
pub struct Tracer {
    config: TracerConfig,
    values: SlotMap<ValueId, SymbolicValue>,
    sources: SecondaryMap<ValueId, Source>,
    snapshots: SlotMap<SnapshotId, ContainerValue>,
    handles: SlotMap<ContainerId, HandleEntry>,
    guards: GuardRegistry,
    records: RecordRegistry,
    inliner: Rc<dyn RoutineInliner>,
    modules: Rc<dyn ModuleRegistry>,
    none: ValueId,
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(TracerConfig::default())
    }
}

impl Tracer {
    pub fn new(config: TracerConfig) -> Self {
        let mut values = SlotMap::with_key();
        let none = values.insert(SymbolicValue::Constant(Literal::None));
        Self {
            config,
            values,
            sources: SecondaryMap::new(),
            snapshots: SlotMap::with_key(),
            handles: SlotMap::with_key(),
            guards: GuardRegistry::default(),
            records: RecordRegistry::default(),
            inliner: Rc::new(NoInliner),
            modules: Rc::new(StaticModuleRegistry::default()),
            none,
        }
    }

    pub fn with_inliner(mut self, inliner: impl RoutineInliner + 'static) -> Self {
        self.inliner = Rc::new(inliner);
        self
    }

    pub fn with_module_registry(mut self, modules: impl ModuleRegistry + 'static) -> Self {
        self.modules = Rc::new(modules);
        self
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    pub fn guards(&self) -> &GuardRegistry {
        &self.guards
    }

    pub fn records(&self) -> &RecordRegistry {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut RecordRegistry {
        &mut self.records
    }

    pub(crate) fn module_registry(&self) -> Rc<dyn ModuleRegistry> {
        Rc::clone(&self.modules)
    }

    // ---- values ----

    /// Allocate a value created during tracing.
    pub fn alloc(&mut self, value: impl Into<SymbolicValue>) -> ValueId {
        self.values.insert(value.into())
    }

    /// Allocate a value, recording where it was read from.
    pub fn alloc_with_source(
        &mut self,
        value: impl Into<SymbolicValue>,
        source: Option<Source>,
    ) -> ValueId {
        let id = self.values.insert(value.into());
        if let Some(source) = source {
            self.sources.insert(id, source);
        }
        id
    }

    pub fn constant(&mut self, literal: impl Into<Literal>) -> ValueId {
        self.alloc(SymbolicValue::Constant(literal.into()))
    }

    /// The shared `None` constant.
    pub fn none(&self) -> ValueId {
        self.none
    }

    pub fn get(&self, id: ValueId) -> TraceResult<&SymbolicValue> {
        self.values
            .get(id)
            .ok_or_else(|| Error::InvalidHandle(format!("{:?}", id)))
    }

    /// Replace the payload of a value in place. Used when a lazily modelled
    /// value is realized into a richer representation.
    pub(crate) fn realize(&mut self, id: ValueId, value: SymbolicValue) -> TraceResult<()> {
        let slot = self
            .values
            .get_mut(id)
            .ok_or_else(|| Error::InvalidHandle(format!("{:?}", id)))?;
        *slot = value;
        Ok(())
    }

    pub fn source(&self, id: ValueId) -> Option<&Source> {
        self.sources.get(id)
    }

    // ---- containers ----

    /// Publish `value` as the first snapshot of a new logical container and
    /// return a symbolic value referring to it.
    pub(crate) fn new_container(&mut self, value: ContainerValue, source: Option<Source>) -> ValueId {
        let snapshot = self.snapshots.insert(value);
        let handle = self.handles.insert(HandleEntry {
            snapshot,
            observed: snapshot,
            mutability: Mutability::Mutable,
            source: source.clone(),
        });
        self.alloc_with_source(handle, source)
    }

    /// Create a new logical container sharing the current snapshot of `cid`.
    pub(crate) fn fork_container(&mut self, cid: ContainerId) -> TraceResult<ValueId> {
        let snapshot = self.handle(cid)?.snapshot;
        let handle = self.handles.insert(HandleEntry {
            snapshot,
            observed: snapshot,
            mutability: Mutability::Mutable,
            source: None,
        });
        Ok(self.alloc(handle))
    }

    fn handle(&self, cid: ContainerId) -> TraceResult<&HandleEntry> {
        self.handles
            .get(cid)
            .ok_or_else(|| Error::InvalidHandle(format!("{:?}", cid)))
    }

    /// The logical container a value refers to.
    pub fn container_of(&self, id: ValueId) -> TraceResult<ContainerId> {
        match self.get(id)? {
            SymbolicValue::Container(cid) => Ok(*cid),
            other => Err(Error::unsupported(
                crate::value::ValueKind::from(other).to_string(),
                "container access",
            )),
        }
    }

    /// Current snapshot of a logical container.
    pub fn snapshot(&self, cid: ContainerId) -> TraceResult<&ContainerValue> {
        let snapshot = self.handle(cid)?.snapshot;
        self.snapshots
            .get(snapshot)
            .ok_or_else(|| Error::InvalidHandle(format!("{:?}", snapshot)))
    }

    pub fn snapshot_id(&self, cid: ContainerId) -> TraceResult<SnapshotId> {
        Ok(self.handle(cid)?.snapshot)
    }

    /// Whether `cid` still holds the entries it was observed with, that is, the
    /// trace has not mutated it (or a restore undid every mutation).
    pub fn is_unmodified(&self, cid: ContainerId) -> TraceResult<bool> {
        let entry = self.handle(cid)?;
        Ok(entry.snapshot == entry.observed)
    }

    /// Source of the value a logical container was first observed as.
    pub fn container_source(&self, cid: ContainerId) -> Option<&Source> {
        self.handles.get(cid).and_then(|h| h.source.as_ref())
    }

    /// Publish `next` as the new state of `cid`. Every value referring to the
    /// container observes the change.
    pub fn replace_all_references(
        &mut self,
        cid: ContainerId,
        next: ContainerValue,
    ) -> TraceResult<SnapshotId> {
        if !self.handles.contains_key(cid) {
            return Err(Error::InvalidHandle(format!("{:?}", cid)));
        }
        let snapshot = self.snapshots.insert(next);
        let entry = &mut self.handles[cid];
        debug!(
            "Container {:?} retargeted from snapshot {:?} to {:?}.",
            cid, entry.snapshot, snapshot
        );
        entry.snapshot = snapshot;
        Ok(snapshot)
    }

    /// Fail with [`Error::ImmutableContainer`] unless `cid` may be mutated.
    pub fn ensure_mutable(&self, cid: ContainerId, operation: &str) -> TraceResult<()> {
        match self.handle(cid)?.mutability {
            Mutability::Mutable => Ok(()),
            Mutability::Immutable => Err(Error::ImmutableContainer {
                operation: operation.to_string(),
            }),
        }
    }

    /// Mark the container behind `id` as bound in an immutable scope.
    pub fn mark_immutable(&mut self, id: ValueId) -> TraceResult<()> {
        let cid = self.container_of(id)?;
        let entry = self
            .handles
            .get_mut(cid)
            .ok_or_else(|| Error::InvalidHandle(format!("{:?}", cid)))?;
        entry.mutability = Mutability::Immutable;
        Ok(())
    }

    pub fn mutability(&self, id: ValueId) -> TraceResult<Mutability> {
        let cid = self.container_of(id)?;
        Ok(self.handle(cid)?.mutability)
    }

    // ---- branches ----

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            snapshots: self
                .handles
                .iter()
                .map(|(cid, entry)| (cid, entry.snapshot))
                .collect(),
        }
    }

    /// Rewind every container that existed at `checkpoint` to the snapshot it
    /// designated then. Guards are kept.
    pub fn restore(&mut self, checkpoint: &Checkpoint) {
        for (cid, snapshot) in &checkpoint.snapshots {
            if let Some(entry) = self.handles.get_mut(cid) {
                entry.snapshot = *snapshot;
            }
        }
        debug!("Restored {} containers from checkpoint.", checkpoint.snapshots.len());
    }

    /// Drop every snapshot that no container designates now and that none of
    /// the checkpoints in `keep` designates. Restoring a checkpoint that was
    /// not kept afterwards fails with [`Error::InvalidHandle`] on access.
    /// Returns the number of snapshots dropped.
    pub fn reclaim_snapshots(&mut self, keep: &[&Checkpoint]) -> usize {
        let mut live: SecondaryMap<SnapshotId, ()> = SecondaryMap::new();
        for (_, entry) in &self.handles {
            live.insert(entry.snapshot, ());
        }
        for checkpoint in keep {
            for (_, snapshot) in &checkpoint.snapshots {
                live.insert(*snapshot, ());
            }
        }
        let before = self.snapshots.len();
        self.snapshots.retain(|id, _| live.contains_key(id));
        let dropped = before - self.snapshots.len();
        debug!("Reclaimed {} unreferenced snapshots, {} remain.", dropped, self.snapshots.len());
        dropped
    }

    // ---- guards and collaborators ----

    pub fn add_guard(&mut self, source: Option<Source>, predicate: GuardPredicate) {
        self.guards.add_guard(Guard { source, predicate });
    }

    /// Trace a call of the user routine `func` through the inliner.
    pub fn inline_call(
        &mut self,
        func: ValueId,
        args: &[ValueId],
        kwargs: &IndexMap<String, ValueId>,
    ) -> TraceResult<ValueId> {
        let inliner = Rc::clone(&self.inliner);
        inliner.inline_call(self, func, args, kwargs)
    }
}
