use hytrace::{
    containers::key::Projection,
    prelude::*,
    tests_utils::{RecordingInliner, output_record, sample_modules},
    value::{BuiltinFn, UserFunction},
};
use indexmap::IndexMap;

fn no_kwargs() -> IndexMap<String, ValueId> {
    IndexMap::new()
}

#[test]
fn immutable_containers_reject_every_mutator() {
    let mut tx = Tracer::default();
    let (a, one) = (tx.constant("a"), tx.constant(1i64));
    let d = tx.make_associative([(a, one)], HostClass::Dict).unwrap();
    let other = tx.make_associative([], HostClass::Dict).unwrap();
    tx.mark_immutable(d).unwrap();

    assert!(tx.set_item(d, a, one).unwrap_err().is_immutable_container());
    assert!(tx.pop(d, a, None).unwrap_err().is_immutable_container());
    assert!(
        tx.update(d, Some(other), &IndexMap::new())
            .unwrap_err()
            .is_immutable_container()
    );
    assert!(tx.clear(d).unwrap_err().is_immutable_container());

    // Reads still work.
    assert_eq!(tx.lookup(d, a).unwrap(), one);
    let copy = tx.copy(d).unwrap();
    tx.set_item(copy, a, a).unwrap();
}

#[test]
fn restoring_a_checkpoint_discards_branch_mutations() {
    let mut tx = Tracer::default();
    let (a, one) = (tx.constant("a"), tx.constant(1i64));
    let d = tx.make_associative([(a, one)], HostClass::Dict).unwrap();

    let checkpoint = tx.checkpoint();
    let (b, two) = (tx.constant("b"), tx.constant(2i64));
    tx.set_item(d, b, two).unwrap();
    tx.pop(d, a, None).unwrap();
    assert_eq!(tx.length(d).unwrap(), 1);

    tx.restore(&checkpoint);
    assert_eq!(tx.iterate_keys(d).unwrap(), [a]);
}

#[test]
fn defaulting_lookup_records_the_absence_of_the_key() {
    let mut tx = Tracer::default();
    let d = tx
        .wrap_host(
            &HostValue::DefaultMap {
                factory: Some(Box::new(HostValue::Builtin(BuiltinFn::Dict))),
                entries: vec![],
            },
            Source::local("counts"),
        )
        .unwrap();
    let k = tx.constant("x");
    let inner = tx.lookup(d, k).unwrap();
    assert!(tx.get(inner).unwrap().is_container());

    assert!(tx.guards().contains(&Guard {
        source: Some(Source::local("counts")),
        predicate: GuardPredicate::KeyPresent {
            key: Projection::Str("x".into()),
            present: false,
        },
    }));
}

#[test]
fn membership_after_a_default_insert_adds_no_contradicting_guard() {
    let mut tx = Tracer::default();
    let d = tx
        .wrap_host(
            &HostValue::DefaultMap {
                factory: Some(Box::new(HostValue::Builtin(BuiltinFn::List))),
                entries: vec![],
            },
            Source::local("counts"),
        )
        .unwrap();
    let x = tx.constant("x");
    tx.lookup(d, x).unwrap();
    assert!(tx.contains(d, x).unwrap());

    let installed: Vec<_> = tx.guards().installable().map(ToString::to_string).collect();
    assert!(installed.contains(&"NOT DICT_CONTAINS(L[\"counts\"], \"x\")".to_string()));
    assert!(!installed.contains(&"DICT_CONTAINS(L[\"counts\"], \"x\")".to_string()));
}

#[test]
fn keys_inserted_by_the_trace_are_not_guarded_on_the_source() {
    let mut tx = Tracer::default();
    let d = tx
        .wrap_host(&HostValue::dict([("a", 1i64)]), Source::local("d"))
        .unwrap();
    let observed = tx.checkpoint();
    let (b, two) = (tx.constant("b"), tx.constant(2i64));
    tx.set_item(d, b, two).unwrap();
    assert_eq!(tx.get_item_or(d, b, None).unwrap(), two);

    let present_b = Guard {
        source: Some(Source::local("d")),
        predicate: GuardPredicate::KeyPresent {
            key: Projection::Str("b".into()),
            present: true,
        },
    };
    assert!(!tx.guards().contains(&present_b));
    assert!(tx.guards().contains(&Guard {
        source: Some(Source::local("d")),
        predicate: GuardPredicate::KeysMatch {
            keys: vec![Projection::Str("a".into())],
        },
    }));

    // Back on the observed entries, presence describes the source again.
    tx.restore(&observed);
    assert!(!tx.contains(d, b).unwrap());
    assert!(tx.guards().contains(&Guard {
        source: Some(Source::local("d")),
        predicate: GuardPredicate::KeyPresent {
            key: Projection::Str("b".into()),
            present: false,
        },
    }));
}

#[test]
fn customized_record_dispatches_overrides_through_the_inliner() {
    let inliner = RecordingInliner::default();
    let mut tx = Tracer::default().with_inliner(inliner.clone());
    let class = tx.records_mut().register(
        CustomRecordType::new("Config")
            .with_override("__getitem__", UserFunction::new("Config.__getitem__")),
    );
    let (k, v) = (tx.constant("depth"), tx.constant(12i64));
    let record = tx.make_customized_record_adapter(&class, [(k, v)]).unwrap();

    // Unoverridden methods use the base map.
    let len = tx.call_method(record, "__len__", &[], &no_kwargs()).unwrap();
    assert_eq!(tx.as_constant(len).unwrap(), HostValue::from(1i64));

    // Overridden ones are inlined with the record as first argument.
    let result = tx.call_method(record, "__getitem__", &[k], &no_kwargs()).unwrap();
    assert_eq!(tx.as_constant(result).unwrap(), HostValue::from("Config.__getitem__"));
    assert_eq!(
        inliner.calls(),
        [("Config.__getitem__".to_string(), vec![record, k])]
    );

    let err = tx.call_method(record, "frobnicate", &[], &no_kwargs()).unwrap_err();
    assert!(err.is_unsupported_operation());
    assert!(err.is_recoverable());
}

#[test]
fn wrapped_records_skip_unset_fields() {
    let mut tx = Tracer::default();
    let class = output_record(&mut tx);
    let record = tx
        .wrap_host(
            &HostValue::Record {
                class: class.clone(),
                fields: vec![
                    ("logits".into(), Some(HostValue::from(1.0f64))),
                    ("hidden".into(), Some(HostValue::none())),
                    ("steps".into(), None),
                ],
            },
            Source::local("out"),
        )
        .unwrap();

    assert_eq!(tx.length(record).unwrap(), 1);
    let logits = tx.get_attr(record, "logits").unwrap();
    assert_eq!(
        tx.source(logits).map(ToString::to_string).as_deref(),
        Some("L[\"out\"].logits")
    );
    let tuple = tx.call_method(record, "to_tuple", &[], &no_kwargs()).unwrap();
    assert_eq!(tx.as_constant(tuple).unwrap(), HostValue::Tuple(vec![HostValue::from(1.0f64)]));
}

#[test]
fn module_table_reads_are_guarded_per_key() {
    let mut tx = Tracer::default().with_module_registry(sample_modules());
    let table = tx.wrap_host(&HostValue::SysModules, Source::global("sys")).unwrap();
    let torch = tx.constant("torch");
    let fallback = tx.constant(0i64);
    let missing = tx.constant("jax");

    let module = tx.call_method(table, "get", &[torch], &no_kwargs()).unwrap();
    assert!(tx.get(module).unwrap().is_module());
    assert_eq!(tx.call_method(table, "get", &[missing, fallback], &no_kwargs()).unwrap(), fallback);
    assert!(tx.lookup(table, missing).unwrap_err().is_key_not_present());

    let installed: Vec<_> = tx.guards().installable().map(ToString::to_string).collect();
    assert_eq!(
        installed,
        [
            "DICT_CONTAINS(sys.modules, \"torch\")",
            "NOT DICT_CONTAINS(sys.modules, \"jax\")",
        ]
    );

    let mut out = InstrStream::new();
    tx.reconstruct(table, &mut out).unwrap();
    assert_eq!(
        out.into_inner(),
        [
            Instr::LoadConst(ConstOperand::Module("sys".into())),
            Instr::LoadAttr("modules".into()),
        ]
    );
}

#[test]
fn configuration_is_read_from_toml_files() {
    let path = std::env::temp_dir().join(format!("hytrace-config-{}.toml", std::process::id()));
    std::fs::write(&path, "allow_user_default_factory = false\n").unwrap();
    let config = TracerConfig::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert!(!config.allow_user_default_factory);
    let mut tx = Tracer::new(config);
    let f = tx.alloc(UserFunction::new("factory"));
    assert!(tx.make_defaulting([], Some(f)).unwrap_err().is_unsupported_construct());
}
