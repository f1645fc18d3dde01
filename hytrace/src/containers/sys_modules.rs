//! The process module table (`sys.modules`).
//!
//! Membership tests and lookups are answered from the live registry and guard
//! only the key they touch, so a trace that reads `sys.modules["os"]` does not
//! depend on unrelated imports. Any other operation needs the whole table: the
//! registry is then materialized into a plain map and the value is realized as
//! that map for the rest of the trace.
use indexmap::IndexMap;
use log::{info, trace};

use crate::{
    codegen::{ConstOperand, Emitter},
    containers::{DictMethod, HostClass, expect_args, expect_no_kwargs, key::HashableKey},
    guards::GuardPredicate,
    source::Source,
    tracer::Tracer,
    utils::{Error, TraceResult},
    value::{HostValue, ModuleObject, SymbolicValue, ValueId},
};

const RECEIVER: &str = "sys.modules";

impl Tracer {
    /// A symbolic value standing for the process module table.
    pub fn sys_modules(&mut self) -> ValueId {
        self.alloc_with_source(SymbolicValue::SysModules, Some(Source::SysModules))
    }

    /// Resolve `key` against the registry, guarding its presence.
    fn resolve_module(&mut self, key: ValueId) -> TraceResult<(HashableKey, Option<ModuleObject>)> {
        let key = HashableKey::wrap(self, key)?;
        let module = key
            .projection()
            .as_str()
            .and_then(|name| self.module_registry().lookup(name));
        trace!("Module table lookup of {}: {}.", key.projection(), module.is_some());
        self.add_guard(
            Some(Source::SysModules),
            GuardPredicate::KeyPresent {
                key: key.projection().clone(),
                present: module.is_some(),
            },
        );
        Ok((key, module))
    }

    fn wrap_module(&mut self, key: &HashableKey, module: ModuleObject) -> TraceResult<ValueId> {
        let source = Source::SysModules.item(key.projection().clone());
        self.wrap_host(&HostValue::Module(module), source)
    }

    pub(crate) fn sys_modules_contains(&mut self, key: ValueId) -> TraceResult<bool> {
        if !HashableKey::is_hashable(self, key) {
            return Ok(false);
        }
        let (_, module) = self.resolve_module(key)?;
        Ok(module.is_some())
    }

    pub(crate) fn sys_modules_get(
        &mut self,
        key: ValueId,
        default: Option<ValueId>,
    ) -> TraceResult<ValueId> {
        match self.resolve_module(key)? {
            (key, Some(module)) => self.wrap_module(&key, module),
            (_, None) => Ok(default.unwrap_or(self.none())),
        }
    }

    pub(crate) fn sys_modules_lookup(&mut self, key: ValueId) -> TraceResult<ValueId> {
        match self.resolve_module(key)? {
            (key, Some(module)) => self.wrap_module(&key, module),
            (key, None) => Err(Error::KeyNotPresent {
                key: key.projection().to_string(),
            }),
        }
    }

    /// Replace the table value by a plain map of the whole registry.
    fn materialize_sys_modules(&mut self, receiver: ValueId, operation: &str) -> TraceResult<()> {
        if !self.config().materialize_sys_modules {
            return Err(Error::unsupported(RECEIVER, operation));
        }
        let modules = self.module_registry().entries();
        info!(
            "Materializing {} modules of {} for `{}`.",
            modules.len(),
            RECEIVER,
            operation
        );
        let table = HostValue::Map {
            class: HostClass::Dict,
            entries: modules
                .into_iter()
                .map(|m| (HostValue::from(m.name.as_str()), HostValue::Module(m)))
                .collect(),
        };
        let materialized = self.wrap_host(&table, Source::SysModules)?;
        let cid = self.container_of(materialized)?;
        self.realize(receiver, cid.into())
    }

    pub(crate) fn call_sys_modules_method(
        &mut self,
        receiver: ValueId,
        name: &str,
        args: &[ValueId],
        kwargs: &IndexMap<String, ValueId>,
    ) -> TraceResult<ValueId> {
        let method = name.parse::<DictMethod>().ok();
        match method {
            Some(DictMethod::Contains) => {
                expect_no_kwargs(RECEIVER, name, kwargs)?;
                expect_args(RECEIVER, name, args, 1, 1)?;
                let present = self.sys_modules_contains(args[0])?;
                Ok(self.constant(present))
            }
            Some(DictMethod::Get) => {
                expect_no_kwargs(RECEIVER, name, kwargs)?;
                expect_args(RECEIVER, name, args, 1, 2)?;
                self.sys_modules_get(args[0], args.get(1).copied())
            }
            Some(DictMethod::GetItem) => {
                expect_no_kwargs(RECEIVER, name, kwargs)?;
                expect_args(RECEIVER, name, args, 1, 1)?;
                self.sys_modules_lookup(args[0])
            }
            _ => {
                self.materialize_sys_modules(receiver, name)?;
                self.call_method(receiver, name, args, kwargs)
            }
        }
    }

    pub(crate) fn reconstruct_sys_modules(&self, out: &mut dyn Emitter) {
        out.emit_load_constant(ConstOperand::Module("sys".to_string()));
        out.emit_load_attr("modules");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{containers::key::Projection, tracer::StaticModuleRegistry};

    fn tracer() -> Tracer {
        Tracer::default().with_module_registry(StaticModuleRegistry::new([
            ModuleObject::new("os"),
            ModuleObject::new("torch"),
        ]))
    }

    #[test]
    fn lookups_guard_only_the_touched_key() {
        let mut tx = tracer();
        let table = tx.sys_modules();
        let os = tx.constant("os");
        let missing = tx.constant("numpy");

        assert!(tx.contains(table, os).unwrap());
        assert!(!tx.contains(table, missing).unwrap());
        let module = tx.lookup(table, os).unwrap();
        assert!(tx.get(module).unwrap().is_module());
        assert_eq!(
            tx.source(module).map(ToString::to_string).as_deref(),
            Some("sys.modules[\"os\"]")
        );

        let keys: Vec<_> = tx
            .guards()
            .iter()
            .map(|g| match &g.predicate {
                GuardPredicate::KeyPresent { key, present } => (key.clone(), *present),
                other => panic!("unexpected guard {:?}", other),
            })
            .collect();
        assert_eq!(
            keys,
            [
                (Projection::Str("os".into()), true),
                (Projection::Str("numpy".into()), false)
            ]
        );
    }

    #[test]
    fn other_operations_materialize_the_table() {
        let mut tx = tracer();
        let table = tx.sys_modules();
        let len = tx.call_method(table, "__len__", &[], &IndexMap::new()).unwrap();
        assert_eq!(tx.get(len).unwrap(), &SymbolicValue::Constant(2i64.into()));
        assert!(tx.get(table).unwrap().is_container());
    }

    #[test]
    fn materialization_can_be_disabled() {
        let mut tx = Tracer::new(crate::config::TracerConfig {
            materialize_sys_modules: false,
            ..Default::default()
        });
        let table = tx.sys_modules();
        let err = tx.call_method(table, "keys", &[], &IndexMap::new()).unwrap_err();
        assert!(err.is_unsupported_operation());
    }
}
