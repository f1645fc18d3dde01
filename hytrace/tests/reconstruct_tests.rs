use hytrace::{
    prelude::*,
    tests_utils::{execute, output_record},
};
use indexmap::IndexMap;

fn round_trip(tx: &Tracer, value: ValueId) -> HostValue {
    let mut out = InstrStream::new();
    tx.reconstruct(value, &mut out).expect("reconstruction failed");
    execute(tx, &out).expect("stream execution failed")
}

#[test]
fn maps_round_trip_with_their_class() {
    let mut tx = Tracer::default();
    let (a, b) = (tx.constant("a"), tx.constant(2i64));
    let (one, two) = (tx.constant(1.5f64), tx.constant(true));

    let plain = tx.make_associative([(a, one), (b, two)], HostClass::Dict).unwrap();
    assert_eq!(round_trip(&tx, plain), tx.as_constant(plain).unwrap());

    let ordered = tx.make_associative([(b, two), (a, one)], HostClass::OrderedDict).unwrap();
    let rebuilt = round_trip(&tx, ordered);
    assert_eq!(rebuilt, tx.as_constant(ordered).unwrap());
    assert!(matches!(
        rebuilt,
        HostValue::Map {
            class: HostClass::OrderedDict,
            ..
        }
    ));
}

#[test]
fn defaulting_map_round_trips_with_its_factory() {
    let mut tx = Tracer::default();
    let list = tx.alloc(hytrace::value::BuiltinFn::List);
    let d = tx.make_defaulting([], Some(list)).unwrap();
    let k = tx.constant("k");
    tx.lookup(d, k).unwrap();

    let rebuilt = round_trip(&tx, d);
    assert_eq!(
        rebuilt,
        HostValue::DefaultMap {
            factory: Some(Box::new(HostValue::Builtin(hytrace::value::BuiltinFn::List))),
            entries: vec![(HostValue::from("k"), HostValue::List(vec![]))],
        }
    );
}

#[test]
fn sets_round_trip() {
    let mut tx = Tracer::default();
    let (x, y) = (tx.constant(1i64), tx.constant("y"));
    let s = tx.make_set([x, y]).unwrap();
    assert_eq!(round_trip(&tx, s), tx.as_constant(s).unwrap());
}

#[test]
fn record_with_an_omitted_field_rebuilds_with_the_bound_fields_only() {
    let mut tx = Tracer::default();
    let class = output_record(&mut tx);
    let logits = tx.alloc(SymbolicValue::Tensor(hytrace::value::TensorValue {
        example: Some(hytrace::value::FakeTensor {
            id: 3,
            shape: vec![4],
            dtype: "f32".into(),
        }),
    }));
    let hidden = tx.constant("h");

    let args = [CallArg::Value(logits), CallArg::Value(hidden)];
    let r = tx.create_record_from_call(&class, &args, &IndexMap::new()).unwrap();
    assert_eq!(tx.length(r).unwrap(), 2);

    let mut out = InstrStream::new();
    tx.reconstruct(r, &mut out).unwrap();
    let Some(Instr::CallKeyword(names)) = out.last() else {
        panic!("expected a keyword call, got {}", out);
    };
    assert_eq!(names.as_slice(), ["logits".to_string(), "hidden".to_string()]);

    let steps = tx.get_attr(r, "steps").unwrap();
    assert_eq!(tx.as_constant(steps).unwrap(), HostValue::from(0i64));
}

#[test]
fn customized_record_rebuilds_through_a_keyword_call() {
    let mut tx = Tracer::default();
    let class = tx.records_mut().register(CustomRecordType::new("Cfg").structured(vec![
        FieldDecl::required("depth"),
        FieldDecl::with_default("act", Literal::None),
    ]));
    let depth = tx.constant(4i64);
    let r = tx
        .create_customized_from_call(&class, &[CallArg::Value(depth)], &IndexMap::new())
        .unwrap();

    assert_eq!(
        round_trip(&tx, r),
        HostValue::Record {
            class,
            fields: vec![
                ("depth".to_string(), Some(HostValue::from(4i64))),
                ("act".to_string(), Some(HostValue::none())),
            ],
        }
    );
}

#[test]
fn key_view_rebuilds_the_owner_then_calls_keys() {
    let mut tx = Tracer::default();
    let (a, one) = (tx.constant("a"), tx.constant(1i64));
    let d = tx.make_associative([(a, one)], HostClass::Dict).unwrap();
    let keys = tx.call_method(d, "keys", &[], &IndexMap::new()).unwrap();

    let mut out = InstrStream::new();
    tx.reconstruct(keys, &mut out).unwrap();
    assert_eq!(
        out.last(),
        Some(&Instr::CallMethod {
            name: "keys".into(),
            argc: 0
        })
    );
    assert_eq!(round_trip(&tx, keys), HostValue::List(vec![HostValue::from("a")]));
}

#[test]
fn non_literal_values_are_loaded_by_reference() {
    let mut tx = Tracer::default();
    let a = tx.constant("a");
    let t = tx.alloc(SymbolicValue::Tensor(hytrace::value::TensorValue { example: None }));
    let d = tx.make_associative([(a, t)], HostClass::Dict).unwrap();

    let mut out = InstrStream::new();
    tx.reconstruct(d, &mut out).unwrap();
    assert!(out.contains(&Instr::LoadValue(t)));
}
