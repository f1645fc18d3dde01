//! Sets, modelled as associative containers whose values are all `None`.
use indexmap::IndexMap;

use crate::{
    codegen::Emitter,
    containers::{
        ContainerId, ContainerKind, ContainerValue, HostClass, SetMethod, expect_args,
        expect_no_kwargs, key::HashableKey,
    },
    tracer::Tracer,
    utils::{Error, TraceResult},
    value::{SymbolicValue, ValueId},
};

impl Tracer {
    pub fn make_set(&mut self, elements: impl IntoIterator<Item = ValueId>) -> TraceResult<ValueId> {
        let none = self.none();
        let entries = self.collect_entries(elements.into_iter().map(|e| (e, none)))?;
        let value = ContainerValue::new(HostClass::Set, ContainerKind::Set).with_entries(entries);
        Ok(self.new_container(value, None))
    }

    /// `receiver.add(element)`.
    pub fn add(&mut self, receiver: ValueId, element: ValueId) -> TraceResult<()> {
        let cid = self.container_of(receiver)?;
        self.ensure_mutable(cid, "add")?;
        let key = HashableKey::wrap(self, element)?;
        let none = self.none();
        self.insert_entry(cid, key, none)
    }

    /// `receiver.pop()`.
    ///
    /// Which element is removed is unspecified; callers must not rely on it.
    pub fn set_pop(&mut self, receiver: ValueId) -> TraceResult<ValueId> {
        let cid = self.container_of(receiver)?;
        self.ensure_mutable(cid, "pop")?;
        let key = self
            .snapshot(cid)?
            .entries
            .keys()
            .last()
            .cloned()
            .ok_or_else(|| Error::KeyNotPresent {
                key: "<any>".to_string(),
            })?;
        self.remove_entry(cid, &key)?;
        Ok(key.value())
    }

    /// `receiver.remove(element)`: fails when the element is absent.
    pub fn remove(&mut self, receiver: ValueId, element: ValueId) -> TraceResult<()> {
        let cid = self.container_of(receiver)?;
        self.ensure_mutable(cid, "remove")?;
        let key = HashableKey::wrap(self, element)?;
        self.remove_entry(cid, &key).map(|_| ())
    }

    /// `receiver.discard(element)`: absent elements are ignored.
    pub fn discard(&mut self, receiver: ValueId, element: ValueId) -> TraceResult<()> {
        let cid = self.container_of(receiver)?;
        self.ensure_mutable(cid, "discard")?;
        let key = HashableKey::wrap(self, element)?;
        let present = self.snapshot(cid)?.entries.contains_key(&key);
        self.guard_key(cid, &key, present)?;
        if present {
            self.remove_entry(cid, &key)?;
        }
        Ok(())
    }

    pub(crate) fn call_set_method(
        &mut self,
        receiver: ValueId,
        name: &str,
        args: &[ValueId],
        kwargs: &IndexMap<String, ValueId>,
    ) -> TraceResult<ValueId> {
        let class = HostClass::Set.to_string();
        let method = name
            .parse::<SetMethod>()
            .map_err(|_| Error::unsupported(class.as_str(), name))?;
        expect_no_kwargs(&class, name, kwargs)?;

        match method {
            SetMethod::Add => {
                expect_args(&class, name, args, 1, 1)?;
                self.add(receiver, args[0])?;
                Ok(self.none())
            }
            SetMethod::Pop => {
                expect_args(&class, name, args, 0, 0)?;
                self.set_pop(receiver)
            }
            SetMethod::Remove => {
                expect_args(&class, name, args, 1, 1)?;
                self.remove(receiver, args[0])?;
                Ok(self.none())
            }
            SetMethod::Discard => {
                expect_args(&class, name, args, 1, 1)?;
                self.discard(receiver, args[0])?;
                Ok(self.none())
            }
            SetMethod::Contains => {
                expect_args(&class, name, args, 1, 1)?;
                let present = self.contains(receiver, args[0])?;
                Ok(self.constant(present))
            }
            SetMethod::Len => {
                expect_args(&class, name, args, 0, 0)?;
                let len = self.length(receiver)? as i64;
                Ok(self.constant(len))
            }
            SetMethod::Iter => {
                expect_args(&class, name, args, 0, 0)?;
                let elements = self.iterate_keys(receiver)?;
                Ok(self.alloc(SymbolicValue::Tuple(elements)))
            }
            SetMethod::Copy => {
                expect_args(&class, name, args, 0, 0)?;
                self.copy(receiver)
            }
            SetMethod::Clear => {
                expect_args(&class, name, args, 0, 0)?;
                self.clear(receiver)?;
                Ok(self.none())
            }
        }
    }

    pub(crate) fn reconstruct_set(&self, cid: ContainerId, out: &mut dyn Emitter) -> TraceResult<()> {
        let snapshot = self.snapshot(cid)?;
        for key in snapshot.entries.keys() {
            self.reconstruct(key.value(), out)?;
        }
        out.emit_build_set(snapshot.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Literal;

    #[test]
    fn pop_returns_the_element_not_the_sentinel() {
        let mut tx = Tracer::default();
        let x = tx.constant("x");
        let s = tx.make_set([x]).unwrap();
        let popped = tx.set_pop(s).unwrap();
        assert_eq!(tx.get(popped).unwrap(), &SymbolicValue::Constant(Literal::from("x")));
        assert_eq!(tx.length(s).unwrap(), 0);
        assert!(tx.set_pop(s).unwrap_err().is_key_not_present());
    }

    #[test]
    fn indexing_a_set_is_unsupported() {
        let mut tx = Tracer::default();
        let x = tx.constant(1i64);
        let s = tx.make_set([x]).unwrap();
        assert!(tx.lookup(s, x).unwrap_err().is_unsupported_operation());
        assert!(
            tx.call_method(s, "__getitem__", &[x], &IndexMap::new())
                .unwrap_err()
                .is_unsupported_operation()
        );
    }

    #[test]
    fn keyed_map_mutators_refuse_sets() {
        let mut tx = Tracer::default();
        let one = tx.constant(1i64);
        let s = tx.make_set([one]).unwrap();
        let five = tx.constant(5i64);

        assert!(tx.set_item(s, one, five).unwrap_err().is_unsupported_operation());
        assert!(tx.setdefault(s, one, Some(five)).unwrap_err().is_unsupported_operation());
        assert!(tx.pop(s, one, None).unwrap_err().is_unsupported_operation());
        assert!(tx.del_item(s, one).unwrap_err().is_unsupported_operation());
        let other = tx.make_associative([(one, five)], HostClass::Dict).unwrap();
        assert!(
            tx.update(s, Some(other), &IndexMap::new())
                .unwrap_err()
                .is_unsupported_operation()
        );

        let two = tx.constant(2i64);
        tx.add(s, two).unwrap();
        let cid = tx.container_of(s).unwrap();
        let none = tx.none();
        assert!(tx.snapshot(cid).unwrap().entries.values().all(|v| *v == none));
        assert_eq!(tx.length(s).unwrap(), 2);
    }

    #[test]
    fn duplicates_collapse_and_discard_ignores_absent() {
        let mut tx = Tracer::default();
        let (a, b, a2) = (tx.constant(1i64), tx.constant(2i64), tx.constant(1i64));
        let s = tx.make_set([a, b, a2]).unwrap();
        assert_eq!(tx.length(s).unwrap(), 2);

        let c = tx.constant(3i64);
        tx.discard(s, c).unwrap();
        assert!(tx.remove(s, c).unwrap_err().is_key_not_present());
        tx.remove(s, a).unwrap();
        assert_eq!(tx.length(s).unwrap(), 1);
    }
}
