use hytrace::{
    containers::key::Projection,
    prelude::*,
    value::{EnumConst, FakeTensor, MethodWrapper, SymInt, TensorValue},
};

fn tensor(tx: &mut Tracer, id: u64) -> ValueId {
    tx.alloc(TensorValue {
        example: Some(FakeTensor {
            id,
            shape: vec![2, 3],
            dtype: "f32".into(),
        }),
    })
}

#[test]
fn keys_compare_by_kind_and_projection() {
    let mut tx = Tracer::default();
    let (one, one_again, t, one_f) = (
        tx.constant(1i64),
        tx.constant(1i64),
        tx.constant(true),
        tx.constant(1.0f64),
    );
    let key = |tx: &mut Tracer, v| HashableKey::wrap(tx, v).unwrap();

    assert_eq!(key(&mut tx, one), key(&mut tx, one_again));
    assert_ne!(key(&mut tx, one), key(&mut tx, t), "bool and int keys differ");
    assert_ne!(key(&mut tx, one), key(&mut tx, one_f), "float and int keys differ");

    let red = tx.alloc(EnumConst {
        class: "Color".into(),
        member: "RED".into(),
    });
    assert_eq!(
        key(&mut tx, red).projection(),
        &Projection::Enum {
            class: "Color".into(),
            member: "RED".into()
        }
    );
}

#[test]
fn tensor_keys_are_equal_only_for_the_same_example() {
    let mut tx = Tracer::default();
    let (a, a_alias, b) = (tensor(&mut tx, 1), tensor(&mut tx, 1), tensor(&mut tx, 2));
    assert_eq!(HashableKey::wrap(&mut tx, a).unwrap(), HashableKey::wrap(&mut tx, a_alias).unwrap());
    assert_ne!(HashableKey::wrap(&mut tx, a).unwrap(), HashableKey::wrap(&mut tx, b).unwrap());

    let unbacked = tx.alloc(TensorValue { example: None });
    assert!(HashableKey::wrap(&mut tx, unbacked).unwrap_err().is_unhashable_value());
}

#[test]
fn method_wrappers_compare_by_identity() {
    let mut tx = Tracer::default();
    let init = |id| MethodWrapper {
        object_id: id,
        name: "__init__".into(),
    };
    let (a, b) = (tx.alloc(init(7)), tx.alloc(init(8)));
    assert_ne!(HashableKey::wrap(&mut tx, a).unwrap(), HashableKey::wrap(&mut tx, b).unwrap());
}

#[test]
fn tuple_keys_are_recursive() {
    let mut tx = Tracer::default();
    let (x, y) = (tx.constant("x"), tx.constant(2i64));
    let pair = tx.alloc(SymbolicValue::Tuple(vec![x, y]));
    let d = tx.make_associative([(pair, x)], HostClass::Dict).unwrap();

    let (x2, y2) = (tx.constant("x"), tx.constant(2i64));
    let needle = tx.alloc(SymbolicValue::Tuple(vec![x2, y2]));
    assert!(tx.contains(d, needle).unwrap());

    let list = tx.alloc(SymbolicValue::List(vec![x]));
    let nested = tx.alloc(SymbolicValue::Tuple(vec![list]));
    assert!(HashableKey::wrap(&mut tx, nested).unwrap_err().is_unhashable_value());
}

#[test]
fn symbolic_integer_keys_are_specialized_and_guarded() {
    let mut tx = Tracer::default();
    let n = tx.alloc_with_source(
        SymInt {
            expr: "s0".into(),
            hint: 4,
        },
        Some(Source::local("n")),
    );
    let key = HashableKey::wrap(&mut tx, n).unwrap();
    assert_eq!(key.projection(), &Projection::Int(4));
    assert_ne!(key.value(), n, "the key refers to the specialized constant");
    assert!(tx.guards().contains(&Guard {
        source: Some(Source::local("n")),
        predicate: GuardPredicate::ConstantMatch {
            value: Projection::Int(4)
        },
    }));

    let mut strict = Tracer::new(TracerConfig {
        specialize_symnodes: false,
        ..Default::default()
    });
    let n = strict.alloc(SymInt {
        expr: "s0".into(),
        hint: 4,
    });
    assert!(HashableKey::wrap(&mut strict, n).unwrap_err().is_unhashable_value());
}
