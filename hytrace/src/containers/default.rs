//! Defaulting containers (`collections.defaultdict`).
//!
//! A missing key is not an error when a factory is set: the factory result is
//! materialized as a fresh value, stored under the key, and returned. The trace
//! then depends on the key having been absent, which is recorded as a guard.
use crate::{
    codegen::{ConstOperand, Emitter},
    containers::{
        ContainerId, ContainerKind, ContainerValue, DefaultFactory, FactoryIntent, HostClass,
        key::HashableKey,
    },
    tracer::Tracer,
    utils::{Error, TraceResult},
    value::{Literal, SymbolicValue, ValueId, ValueKind},
};

impl Tracer {
    /// Create a defaulting container. `factory` must be one of the builtins
    /// `list`, `tuple`, `dict`, a user routine, or absent (`None`).
    pub fn make_defaulting(
        &mut self,
        entries: impl IntoIterator<Item = (ValueId, ValueId)>,
        factory: Option<ValueId>,
    ) -> TraceResult<ValueId> {
        let factory = self.default_factory_of(factory)?;
        let entries = self.collect_entries(entries)?;
        let value = ContainerValue::new(HostClass::DefaultDict, ContainerKind::Defaulting { factory })
            .with_entries(entries);
        Ok(self.new_container(value, None))
    }

    /// Classify a factory argument.
    pub(crate) fn default_factory_of(
        &self,
        factory: Option<ValueId>,
    ) -> TraceResult<Option<DefaultFactory>> {
        let Some(factory) = factory else {
            return Ok(None);
        };
        match self.get(factory)? {
            SymbolicValue::Constant(Literal::None) => Ok(None),
            SymbolicValue::Builtin(builtin) => FactoryIntent::from_builtin(*builtin)
                .map(|intent| Some(DefaultFactory::Intent(intent)))
                .ok_or_else(|| {
                    Error::construct(
                        HostClass::DefaultDict.to_string(),
                        format!("`{}` is not a supported default factory", builtin),
                    )
                }),
            SymbolicValue::UserFunction(_) if self.config().allow_user_default_factory => {
                Ok(Some(DefaultFactory::Routine(factory)))
            }
            other => Err(Error::construct(
                HostClass::DefaultDict.to_string(),
                format!(
                    "a value of kind `{}` is not a supported default factory",
                    ValueKind::from(other)
                ),
            )),
        }
    }

    /// Default factory of the defaulting container behind `receiver`.
    pub fn default_factory(&self, receiver: ValueId) -> TraceResult<Option<DefaultFactory>> {
        let cid = self.container_of(receiver)?;
        match &self.snapshot(cid)?.kind {
            ContainerKind::Defaulting { factory } => Ok(*factory),
            _ => Err(Error::unsupported(
                self.snapshot(cid)?.host_class.to_string(),
                "default_factory",
            )),
        }
    }

    pub(crate) fn default_missing(
        &mut self,
        cid: ContainerId,
        key: HashableKey,
        factory: DefaultFactory,
    ) -> TraceResult<ValueId> {
        self.ensure_mutable(cid, "__getitem__")?;
        self.guard_key(cid, &key, false)?;
        let value = self.materialize_factory(factory)?;
        self.insert_entry(cid, key, value)?;
        Ok(value)
    }

    fn materialize_factory(&mut self, factory: DefaultFactory) -> TraceResult<ValueId> {
        match factory {
            DefaultFactory::Intent(FactoryIntent::EmptyList) => {
                Ok(self.alloc(SymbolicValue::List(Vec::new())))
            }
            DefaultFactory::Intent(FactoryIntent::EmptyTuple) => {
                Ok(self.alloc(SymbolicValue::Tuple(Vec::new())))
            }
            DefaultFactory::Intent(FactoryIntent::EmptyMap) => {
                self.make_associative([], HostClass::Dict)
            }
            DefaultFactory::Routine(routine) => self.inline_call(routine, &[], &Default::default()),
        }
    }

    pub(crate) fn reconstruct_defaulting(
        &self,
        cid: ContainerId,
        out: &mut dyn Emitter,
    ) -> TraceResult<()> {
        out.emit_load_constant(ConstOperand::Class(HostClass::DefaultDict));
        match &self.snapshot(cid)?.kind {
            ContainerKind::Defaulting {
                factory: Some(DefaultFactory::Intent(intent)),
            } => out.emit_load_constant(ConstOperand::Builtin(intent.builtin())),
            ContainerKind::Defaulting {
                factory: Some(DefaultFactory::Routine(routine)),
            } => self.reconstruct(*routine, out)?,
            _ => out.emit_load_constant(ConstOperand::Literal(Literal::None)),
        }
        self.reconstruct_entries(cid, out)?;
        out.emit_call_function(2);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{guards::GuardPredicate, value::BuiltinFn};

    #[test]
    fn missing_key_materializes_the_factory_once() {
        let mut tx = Tracer::default();
        let list = tx.alloc(BuiltinFn::List);
        let d = tx.make_defaulting([], Some(list)).unwrap();
        let k = tx.constant("k");

        let first = tx.lookup(d, k).unwrap();
        assert_eq!(tx.get(first).unwrap(), &SymbolicValue::List(vec![]));
        let second = tx.lookup(d, k).unwrap();
        assert_eq!(first, second);
        assert_eq!(tx.length(d).unwrap(), 1);
        assert!(tx.guards().iter().any(|g| matches!(
            &g.predicate,
            GuardPredicate::KeyPresent { present: false, .. }
        )));
    }

    #[test]
    fn no_factory_behaves_like_a_plain_map() {
        let mut tx = Tracer::default();
        let d = tx.make_defaulting([], None).unwrap();
        let k = tx.constant("k");
        assert!(tx.lookup(d, k).unwrap_err().is_key_not_present());
    }

    #[test]
    fn unsupported_factories_are_rejected() {
        let mut tx = Tracer::default();
        let len = tx.alloc(BuiltinFn::Len);
        assert!(tx.make_defaulting([], Some(len)).unwrap_err().is_unsupported_construct());

        let mut tx = Tracer::new(crate::config::TracerConfig {
            allow_user_default_factory: false,
            ..Default::default()
        });
        let f = tx.alloc(crate::value::UserFunction::new("make"));
        assert!(tx.make_defaulting([], Some(f)).unwrap_err().is_unsupported_construct());
    }
}
