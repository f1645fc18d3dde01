//! Guards accumulated while tracing.
//!
//! A guard is a runtime pre-condition over an input [`Source`] that must hold
//! for a cached trace to be reused. Guards are plain data here; evaluating them
//! is the job of the guard runtime.
use indexmap::IndexSet;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{containers::HostClass, containers::key::Projection, source::Source};

/// Predicate checked against the object designated by a guard's source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuardPredicate {
    /// `key in obj` is `present`.
    KeyPresent { key: Projection, present: bool },

    /// The keys of `obj` are exactly `keys`, in this order.
    KeysMatch { keys: Vec<Projection> },

    /// `type(obj)` is exactly `class`.
    ClassIs { class: HostClass },

    /// `obj` equals the constant `value`.
    ConstantMatch { value: Projection },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Guard {
    /// `None` when the guarded value was created during tracing; such guards
    /// hold trivially and are never installed.
    pub source: Option<Source>,
    pub predicate: GuardPredicate,
}

impl std::fmt::Display for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            Some(source) => source.to_string(),
            None => "<traced>".to_string(),
        };
        match &self.predicate {
            GuardPredicate::KeyPresent { key, present: true } => {
                write!(f, "DICT_CONTAINS({}, {})", source, key)
            }
            GuardPredicate::KeyPresent { key, present: false } => {
                write!(f, "NOT DICT_CONTAINS({}, {})", source, key)
            }
            GuardPredicate::KeysMatch { keys } => {
                write!(f, "DICT_KEYS({}, [", source)?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", key)?;
                }
                write!(f, "])")
            }
            GuardPredicate::ClassIs { class } => write!(f, "TYPE_MATCH({}, {})", source, class),
            GuardPredicate::ConstantMatch { value } => {
                write!(f, "CONSTANT_MATCH({}, {})", source, value)
            }
        }
    }
}

/// Insertion-ordered, deduplicating set of guards.
#[derive(Debug, Clone, Default)]
pub struct GuardRegistry {
    guards: IndexSet<Guard>,
}

impl GuardRegistry {
    /// Record a guard. Returns `false` if an identical guard was already known.
    pub fn add_guard(&mut self, guard: Guard) -> bool {
        if self.guards.contains(&guard) {
            return false;
        }
        debug!("Installing guard {}.", guard);
        self.guards.insert(guard)
    }

    pub fn contains(&self, guard: &Guard) -> bool {
        self.guards.contains(guard)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Guard> {
        self.guards.iter()
    }

    /// Guards that refer to an input source and must be checked at reuse.
    pub fn installable(&self) -> impl Iterator<Item = &Guard> {
        self.guards.iter().filter(|guard| guard.source.is_some())
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_deduplicates_and_keeps_order() {
        let mut registry = GuardRegistry::default();
        let absent = Guard {
            source: Some(Source::local("d")),
            predicate: GuardPredicate::KeyPresent {
                key: Projection::Str("k".into()),
                present: false,
            },
        };
        let class = Guard {
            source: Some(Source::local("d")),
            predicate: GuardPredicate::ClassIs {
                class: HostClass::Dict,
            },
        };
        assert!(registry.add_guard(absent.clone()));
        assert!(registry.add_guard(class.clone()));
        assert!(!registry.add_guard(absent.clone()));
        assert_eq!(registry.iter().cloned().collect::<Vec<_>>(), [absent.clone(), class]);
        assert_eq!(absent.to_string(), "NOT DICT_CONTAINS(L[\"d\"], \"k\")");
    }

    #[test]
    fn traced_guards_are_not_installable() {
        let mut registry = GuardRegistry::default();
        registry.add_guard(Guard {
            source: None,
            predicate: GuardPredicate::ConstantMatch {
                value: Projection::Int(3),
            },
        });
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.installable().count(), 0);
    }
}
