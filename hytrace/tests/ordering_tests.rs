use hytrace::prelude::*;
use indexmap::IndexMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

fn int_keys(tx: &Tracer, d: ValueId) -> Vec<i64> {
    tx.iterate_keys(d)
        .unwrap()
        .into_iter()
        .map(|k| match tx.get(k).unwrap() {
            SymbolicValue::Constant(Literal::Int(i)) => *i,
            other => panic!("unexpected key {:?}", other),
        })
        .collect()
}

#[test]
fn random_mutation_sequences_preserve_insertion_order() {
    let mut rng = ChaCha20Rng::seed_from_u64(0x42);

    for _ in 0..32 {
        let mut tx = Tracer::default();
        let d = tx.make_associative([], HostClass::Dict).unwrap();
        // Reference model: keys in insertion order with their latest value.
        let mut model: Vec<(i64, i64)> = Vec::new();

        for step in 0..64 {
            let key = rng.random_range(0..12i64);
            let k = tx.constant(key);
            if rng.random_bool(0.7) {
                let v = tx.constant(step);
                tx.set_item(d, k, v).unwrap();
                match model.iter_mut().find(|(mk, _)| *mk == key) {
                    Some(entry) => entry.1 = step,
                    None => model.push((key, step)),
                }
            } else {
                let popped = tx.pop(d, k, None);
                match model.iter().position(|(mk, _)| *mk == key) {
                    Some(at) => {
                        let (_, expected) = model.remove(at);
                        let popped = popped.expect("present key should pop");
                        assert_eq!(
                            tx.get(popped).unwrap(),
                            &SymbolicValue::Constant(Literal::Int(expected))
                        );
                    }
                    None => assert!(popped.unwrap_err().is_key_not_present()),
                }
            }

            let expected: Vec<_> = model.iter().map(|(k, _)| *k).collect();
            assert_eq!(int_keys(&tx, d), expected, "order diverged at step {}", step);
        }
    }
}

#[test]
fn update_appends_new_keys_and_overwrites_in_place() {
    let mut tx = Tracer::default();
    let (a, b, c) = (tx.constant("a"), tx.constant("b"), tx.constant("c"));
    let (one, two, three, four) = (
        tx.constant(1i64),
        tx.constant(2i64),
        tx.constant(3i64),
        tx.constant(4i64),
    );
    let left = tx.make_associative([(a, one), (b, two)], HostClass::Dict).unwrap();
    let right = tx.make_associative([(b, three), (c, four)], HostClass::Dict).unwrap();

    tx.update(left, Some(right), &IndexMap::new()).unwrap();

    let items = tx.iterate_items(left).unwrap();
    let lowered: Vec<_> = items
        .into_iter()
        .map(|(k, v)| (tx.as_constant(k).unwrap(), tx.as_constant(v).unwrap()))
        .collect();
    assert_eq!(
        lowered,
        [
            (HostValue::from("a"), HostValue::from(1i64)),
            (HostValue::from("b"), HostValue::from(3i64)),
            (HostValue::from("c"), HostValue::from(4i64)),
        ]
    );
    assert_eq!(tx.length(right).unwrap(), 2, "the argument of update is not mutated");
}

#[test]
fn iteration_is_a_snapshot_of_call_time() {
    let mut tx = Tracer::default();
    let (a, one) = (tx.constant("a"), tx.constant(1i64));
    let d = tx.make_associative([(a, one)], HostClass::Dict).unwrap();

    let before = tx.iterate_keys(d).unwrap();
    let (b, two) = (tx.constant("b"), tx.constant(2i64));
    tx.set_item(d, b, two).unwrap();

    assert_eq!(before.len(), 1);
    assert_eq!(tx.iterate_keys(d).unwrap().len(), 2);
    assert_eq!(tx.iterate_keys(d).unwrap(), tx.iterate_keys(d).unwrap());
}
