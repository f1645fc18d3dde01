//! Conversions between host objects and symbolic values.
//!
//! [`Tracer::wrap_host`] lifts an object read from untraced state into the
//! tracer, recording its source and the guards that make the trace valid for
//! that object. [`Tracer::as_constant`] goes the other way for values that are
//! fully known at trace time.
use crate::{
    containers::{
        ContainerKind, ContainerValue, DefaultFactory, HostClass, RecordFlavor, key::Projection,
    },
    guards::GuardPredicate,
    source::Source,
    tracer::Tracer,
    utils::{Error, TraceResult},
    value::{Capabilities, HostValue, SymbolicValue, TensorValue, ValueId, ValueKind},
};

impl Tracer {
    /// Wrap a host object read from `source`.
    pub fn wrap_host(&mut self, host: &HostValue, source: Source) -> TraceResult<ValueId> {
        self.build_host(host, Some(source))
    }

    /// Build the symbolic counterpart of `host`. Guards are only recorded for
    /// sourced objects.
    pub(crate) fn build_host(
        &mut self,
        host: &HostValue,
        source: Option<Source>,
    ) -> TraceResult<ValueId> {
        let value = match host {
            HostValue::Literal(literal) => {
                self.guard_source(
                    &source,
                    GuardPredicate::ConstantMatch {
                        value: Projection::from_literal(literal),
                    },
                );
                SymbolicValue::Constant(literal.clone())
            }
            HostValue::Enum(e) => {
                self.guard_source(
                    &source,
                    GuardPredicate::ConstantMatch {
                        value: Projection::Enum {
                            class: e.class.clone(),
                            member: e.member.clone(),
                        },
                    },
                );
                SymbolicValue::Enum(e.clone())
            }
            HostValue::Tensor(fake) => SymbolicValue::Tensor(TensorValue {
                example: Some(fake.clone()),
            }),
            HostValue::Builtin(builtin) => SymbolicValue::Builtin(*builtin),
            HostValue::MethodWrapper(wrapper) => SymbolicValue::MethodWrapper(wrapper.clone()),
            HostValue::Tuple(items) => SymbolicValue::Tuple(self.build_items(items, &source)?),
            HostValue::List(items) => SymbolicValue::List(self.build_items(items, &source)?),
            HostValue::Map { class, entries } => return self.build_map(class, entries, source),
            HostValue::DefaultMap { factory, entries } => {
                let factory = match factory {
                    Some(factory) => Some(self.build_host(factory, None)?),
                    None => None,
                };
                let factory = self.default_factory_of(factory)?;
                return self.build_container(
                    HostClass::DefaultDict,
                    ContainerKind::Defaulting { factory },
                    entries,
                    source,
                );
            }
            HostValue::Set(elements) => {
                let entries: Vec<_> = elements.iter().map(|e| (e.clone(), HostValue::none())).collect();
                return self.build_container(HostClass::Set, ContainerKind::Set, &entries, source);
            }
            HostValue::Record { class, fields } => {
                return self.wrap_record_instance(class, fields, source);
            }
            HostValue::Function(f) => SymbolicValue::UserFunction(f.clone()),
            HostValue::Class(class) => SymbolicValue::Class(class.clone()),
            HostValue::Module(module) => SymbolicValue::Module(module.clone()),
            HostValue::SysModules => {
                return Ok(self.sys_modules());
            }
            HostValue::Opaque(description) => SymbolicValue::Opaque(description.clone()),
        };
        Ok(self.alloc_with_source(value, source))
    }

    fn guard_source(&mut self, source: &Option<Source>, predicate: GuardPredicate) {
        if source.is_some() {
            self.add_guard(source.clone(), predicate);
        }
    }

    fn build_items(
        &mut self,
        items: &[HostValue],
        source: &Option<Source>,
    ) -> TraceResult<Vec<ValueId>> {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let item_source = source.as_ref().map(|s| s.item(Projection::Int(i as i64)));
                self.build_host(item, item_source)
            })
            .collect()
    }

    fn build_map(
        &mut self,
        class: &HostClass,
        entries: &[(HostValue, HostValue)],
        source: Option<Source>,
    ) -> TraceResult<ValueId> {
        match class {
            HostClass::Dict | HostClass::OrderedDict => {
                self.build_container(class.clone(), ContainerKind::Plain, entries, source)
            }
            other => Err(Error::construct(
                other.to_string(),
                "instances of this class cannot be wrapped as a map",
            )),
        }
    }

    /// Keys are built without a source: the key set is pinned as a whole by a
    /// `KeysMatch` guard, and each value is sourced through its key.
    fn build_container(
        &mut self,
        class: HostClass,
        kind: ContainerKind,
        entries: &[(HostValue, HostValue)],
        source: Option<Source>,
    ) -> TraceResult<ValueId> {
        let mut pairs = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let key = self.build_host(key, None)?;
            pairs.push((key, value));
        }
        let mut collected = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let key = crate::containers::key::HashableKey::wrap(self, key)?;
            let value_source = source.as_ref().map(|s| s.item(key.projection().clone()));
            let value = self.build_host(value, value_source)?;
            collected.push((key, value));
        }

        if source.is_some() {
            self.add_guard(source.clone(), GuardPredicate::ClassIs { class: class.clone() });
            self.add_guard(
                source.clone(),
                GuardPredicate::KeysMatch {
                    keys: collected.iter().map(|(k, _)| k.projection().clone()).collect(),
                },
            );
        }

        let value = ContainerValue::new(class, kind).with_entries(collected.into_iter().collect());
        Ok(self.new_container(value, source))
    }

    /// Lower a value that is fully known at trace time to a host object.
    pub fn as_constant(&self, id: ValueId) -> TraceResult<HostValue> {
        let value = self.get(id)?;
        let not_constant = || Error::NotConstant {
            kind: ValueKind::from(value),
        };
        Ok(match value {
            SymbolicValue::Constant(literal) => HostValue::Literal(literal.clone()),
            SymbolicValue::Enum(e) => HostValue::Enum(e.clone()),
            SymbolicValue::Builtin(builtin) => HostValue::Builtin(*builtin),
            SymbolicValue::MethodWrapper(wrapper) => HostValue::MethodWrapper(wrapper.clone()),
            SymbolicValue::UserFunction(f) => HostValue::Function(f.clone()),
            SymbolicValue::Class(class) => HostValue::Class(class.clone()),
            SymbolicValue::Module(module) => HostValue::Module(module.clone()),
            SymbolicValue::Tuple(items) => HostValue::Tuple(self.lower_all(items)?),
            SymbolicValue::List(items) => HostValue::List(self.lower_all(items)?),
            SymbolicValue::Container(cid) => {
                let snapshot = self.snapshot(*cid)?;
                let mut entries = Vec::with_capacity(snapshot.len());
                for (key, value) in &snapshot.entries {
                    entries.push((self.as_constant(key.value())?, self.as_constant(*value)?));
                }
                match &snapshot.kind {
                    ContainerKind::Plain => HostValue::Map {
                        class: snapshot.host_class.clone(),
                        entries,
                    },
                    ContainerKind::Defaulting { factory } => HostValue::DefaultMap {
                        factory: match factory {
                            None => None,
                            Some(DefaultFactory::Intent(intent)) => {
                                Some(Box::new(HostValue::Builtin(intent.builtin())))
                            }
                            Some(DefaultFactory::Routine(_)) => return Err(not_constant()),
                        },
                        entries,
                    },
                    ContainerKind::Set => HostValue::Set(entries.into_iter().map(|(k, _)| k).collect()),
                    ContainerKind::Record { flavor } => {
                        let HostClass::Record(class) = &snapshot.host_class else {
                            return Err(not_constant());
                        };
                        match flavor {
                            RecordFlavor::PlainData => HostValue::Record {
                                class: class.clone(),
                                fields: self.record_fields(entries).ok_or_else(not_constant)?,
                            },
                            RecordFlavor::Customized => HostValue::Map {
                                class: snapshot.host_class.clone(),
                                entries,
                            },
                        }
                    }
                }
            }
            SymbolicValue::Tensor(_)
            | SymbolicValue::SymInt(_)
            | SymbolicValue::View(_)
            | SymbolicValue::SysModules
            | SymbolicValue::Opaque(_) => return Err(not_constant()),
        })
    }

    fn lower_all(&self, items: &[ValueId]) -> TraceResult<Vec<HostValue>> {
        items.iter().map(|item| self.as_constant(*item)).collect()
    }

    fn record_fields(
        &self,
        entries: Vec<(HostValue, HostValue)>,
    ) -> Option<Vec<(String, Option<HostValue>)>> {
        entries
            .into_iter()
            .map(|(key, value)| match key {
                HostValue::Literal(literal) => {
                    literal.as_str().map(|name| (name.to_string(), Some(value)))
                }
                _ => None,
            })
            .collect()
    }

    /// Capability flags of a value.
    pub fn capabilities(&self, id: ValueId) -> TraceResult<Capabilities> {
        let mut caps = match self.get(id)? {
            SymbolicValue::Tensor(_) => Capabilities::TENSOR_LIKE,
            SymbolicValue::Builtin(_) | SymbolicValue::UserFunction(_) | SymbolicValue::Class(_) => {
                Capabilities::CALLABLE
            }
            SymbolicValue::Tuple(_) | SymbolicValue::List(_) | SymbolicValue::View(_) => {
                Capabilities::SEQUENCE_LIKE
            }
            SymbolicValue::Container(_) | SymbolicValue::SysModules => Capabilities::CONTAINER_LIKE,
            _ => Capabilities::empty(),
        };
        if self.as_constant(id).is_ok() {
            caps |= Capabilities::CONSTANT;
        }
        Ok(caps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{BuiltinFn, FakeTensor, UserFunction};

    #[test]
    fn wrapped_maps_are_guarded_on_class_and_keys() {
        let mut tx = Tracer::default();
        let d = tx
            .wrap_host(&HostValue::dict([("a", 1i64), ("b", 2i64)]), Source::local("d"))
            .unwrap();

        let predicates: Vec<_> = tx.guards().installable().map(|g| g.predicate.clone()).collect();
        assert!(predicates.contains(&GuardPredicate::ClassIs { class: HostClass::Dict }));
        assert!(predicates.contains(&GuardPredicate::KeysMatch {
            keys: vec![Projection::Str("a".into()), Projection::Str("b".into())],
        }));

        let a = tx.constant("a");
        let one = tx.lookup(d, a).unwrap();
        assert_eq!(tx.source(one).map(ToString::to_string).as_deref(), Some("L[\"d\"][\"a\"]"));
        assert_eq!(tx.as_constant(d).unwrap(), HostValue::dict([("a", 1i64), ("b", 2i64)]));
    }

    #[test]
    fn tensors_and_routine_factories_are_not_constant() {
        let mut tx = Tracer::default();
        let tensor = tx
            .wrap_host(
                &HostValue::Tensor(FakeTensor {
                    id: 1,
                    shape: vec![2, 2],
                    dtype: "f32".into(),
                }),
                Source::local("x"),
            )
            .unwrap();
        assert!(tx.as_constant(tensor).unwrap_err().is_not_constant());
        assert_eq!(tx.capabilities(tensor).unwrap(), Capabilities::TENSOR_LIKE);

        let f = tx.alloc(UserFunction::new("make"));
        let d = tx.make_defaulting([], Some(f)).unwrap();
        assert!(tx.as_constant(d).unwrap_err().is_not_constant());

        let list = tx.alloc(BuiltinFn::List);
        let d = tx.make_defaulting([], Some(list)).unwrap();
        assert!(tx.capabilities(d).unwrap().contains(Capabilities::CONSTANT));
    }

    #[test]
    fn sets_lower_to_their_elements() {
        let mut tx = Tracer::default();
        let (a, b) = (tx.constant(1i64), tx.constant(2i64));
        let s = tx.make_set([a, b]).unwrap();
        assert_eq!(
            tx.as_constant(s).unwrap(),
            HostValue::Set(vec![HostValue::from(1i64), HostValue::from(2i64)])
        );
    }
}
