//! End-to-end scenarios, mirrors each literal example worked through the
//! draft/finalize/patch pipeline.

use std::rc::Rc;

use draftwood::{
    apply_patches, create_manual_draft, finish_manual_draft, original, run, run_scalar,
    run_with_patches, snapshot, DraftError, Key, PathSegment, RecordData, SequenceData, SetData,
    Value, ValueKey,
};

fn record(pairs: &[(&str, Value)]) -> Value {
    let mut entries = indexmap::IndexMap::new();
    for (k, v) in pairs {
        entries.insert(Key::from(*k), v.clone());
    }
    Value::Record(Rc::new(RecordData::new(None, entries)))
}

fn seq(items: Vec<Value>) -> Value { Value::Sequence(Rc::new(SequenceData::new(items))) }

fn int(n: i64) -> Value { Value::Int(n) }
fn str_v(s: &str) -> Value { Value::from(s) }

fn as_record_get<'a>(v: &'a Value, key: &str) -> &'a Value {
    match v {
        Value::Record(r) => r.entries.get(&Key::from(key)).expect("key present"),
        _ => panic!("not a record"),
    }
}

fn same_items(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| draftwood::deep_eq(x, y))
}

trait DebugShort {
    fn to_debug(&self) -> String;
}
impl DebugShort for Value {
    fn to_debug(&self) -> String { format!("{self:?}") }
}

#[test]
fn scenario_1_structural_sharing() {
    let base = record(&[("a", record(&[("x", int(1))])), ("b", record(&[("y", int(2))]))]);

    let (result, forward, inverse) = run_with_patches(&base, |d| {
        let r = d.as_record().unwrap();
        let draftwood::Read::Draft(inner) = r.get("a").unwrap() else { panic!("expected a draft for a draftable record value") };
        inner.as_record().unwrap().set("x", int(9)).unwrap();
        Ok(None)
    })
    .unwrap();

    assert_eq!(as_record_get(as_record_get(&result, "a"), "x").clone().to_debug(), "9");
    match (as_record_get(&result, "b"), as_record_get(&base, "b")) {
        (Value::Record(r1), Value::Record(r2)) => assert!(Rc::ptr_eq(r1, r2)),
        _ => panic!(),
    }
    match (as_record_get(&result, "a"), as_record_get(&base, "a")) {
        (Value::Record(r1), Value::Record(r2)) => assert!(!Rc::ptr_eq(r1, r2)),
        _ => panic!(),
    }

    assert_eq!(forward.len(), 1);
    assert_eq!(forward[0].path, vec![PathSegment::from("a"), PathSegment::from("x")]);
    assert_eq!(inverse.len(), 1);
}

#[test]
fn scenario_2_array_append_and_replace() {
    let base = seq(vec![int(10), int(20), int(30)]);

    let (result, forward, inverse) = run_with_patches(&base, |d| {
        let s = d.as_sequence().unwrap();
        s.push(int(40)).unwrap();
        s.set(0, int(11)).unwrap();
        Ok(None)
    })
    .unwrap();

    match &result {
        Value::Sequence(s) => assert!(same_items(&s.items, &[int(11), int(20), int(30), int(40)])),
        _ => panic!(),
    }
    assert_eq!(forward.len(), 2);
    assert_eq!(forward[0].path, vec![PathSegment::Index(0)]);
    assert_eq!(forward[1].path, vec![PathSegment::Index(3)]);
    assert_eq!(inverse.len(), 2);
}

#[test]
fn scenario_3_array_shrink_via_length() {
    let base = seq(vec![int(1), int(2), int(3), int(4)]);

    let (result, forward, inverse) = run_with_patches(&base, |d| {
        d.as_sequence().unwrap().set_length(2).unwrap();
        Ok(None)
    })
    .unwrap();

    match &result {
        Value::Sequence(s) => assert!(same_items(&s.items, &[int(1), int(2)])),
        _ => panic!(),
    }
    assert_eq!(forward.len(), 2);
    assert_eq!(forward[0].path, vec![PathSegment::Index(3)]);
    assert_eq!(forward[1].path, vec![PathSegment::Index(2)]);

    let restored = apply_patches(&result, &inverse).unwrap();
    match &restored {
        Value::Sequence(s) => assert!(same_items(&s.items, &[int(1), int(2), int(3), int(4)])),
        _ => panic!(),
    }
}

#[test]
fn scenario_4_keyed_map_value_draft_propagation() {
    let mut entries = indexmap::IndexMap::new();
    let key = str_v("u");
    entries.insert(ValueKey(key.clone()), (key, record(&[("n", str_v("a"))])));
    let base = Value::Map(Rc::new(draftwood::MapData::new(entries)));

    let (result, forward, _inverse) = run_with_patches(&base, |d| {
        let m = d.as_map().unwrap();
        let entry = m.get(&str_v("u")).unwrap();
        let draftwood::Read::Draft(child) = entry else { panic!("expected a draft for a draftable map value") };
        child.as_record().unwrap().set("n", str_v("b")).unwrap();
        Ok(None)
    })
    .unwrap();

    match &result {
        Value::Map(m) => {
            let (_, v) = m.entries.get(&ValueKey(str_v("u"))).unwrap();
            assert_eq!(as_record_get(v, "n").clone().to_debug(), "\"b\"");
        }
        _ => panic!(),
    }
    assert_eq!(forward.len(), 1);
    assert_eq!(forward[0].path, vec![PathSegment::from("u"), PathSegment::from("n")]);

    match (&base, &result) {
        (Value::Map(b), Value::Map(r)) => assert!(!Rc::ptr_eq(b, r)),
        _ => panic!(),
    }
}

#[test]
fn scenario_5_unique_set_add_and_remove() {
    let mut entries = indexmap::IndexSet::new();
    entries.insert(ValueKey(int(1)));
    entries.insert(ValueKey(int(2)));
    entries.insert(ValueKey(int(3)));
    let base = Value::Set(Rc::new(SetData::new(entries)));

    let (result, forward, inverse) = run_with_patches(&base, |d| {
        let s = d.as_set().unwrap();
        s.delete(&int(2)).unwrap();
        s.add(int(4)).unwrap();
        Ok(None)
    })
    .unwrap();

    match &result {
        Value::Set(s) => {
            let got: Vec<i64> = s.entries.iter().map(|vk| match &vk.0 { Value::Int(n) => *n, _ => unreachable!() }).collect();
            assert_eq!(got, vec![1, 3, 4]);
        }
        _ => panic!(),
    }
    assert_eq!(forward.len(), 2);
    assert_eq!(inverse.len(), 2);

    let restored = apply_patches(&result, &inverse).unwrap();
    assert!(draftwood::is_draftable(&restored));
    assert!(draftwood::deep_eq(&restored, &base), "restored: {restored:?}, base: {base:?}");
}

#[test]
fn scenario_6_recipe_returns_replacement_and_mutates_is_an_error() {
    let base = record(&[("a", int(1))]);
    let err = run(&base, |d| {
        d.as_record().unwrap().set("a", int(2)).unwrap();
        Ok(Some(record(&[("a", int(3))])))
    })
    .unwrap_err();
    assert!(matches!(err, DraftError::ModifiedAndReturned));
    assert_eq!(as_record_get(&base, "a").clone().to_debug(), "1");
}

#[test]
fn scenario_7_revocation_after_escape() {
    let base = record(&[("a", int(1))]);
    let mut escaped = None;
    run(&base, |d| {
        escaped = Some(*d);
        Ok(None)
    })
    .unwrap();

    let err = escaped.unwrap().as_record().unwrap().set("a", int(9)).unwrap_err();
    assert!(matches!(err, DraftError::ProxyRevoked));
}

#[test]
fn scenario_8_nested_run_cross_scope_reference() {
    let base1 = record(&[("sub", Value::Null)]);
    let base2 = record(&[("x", int(0))]);

    let result = run(&base1, |d1| {
        let inner = run(&base2, |d2| {
            d2.as_record().unwrap().set("x", int(1)).unwrap();
            Ok(None)
        })
        .unwrap();
        d1.as_record().unwrap().set("sub", inner).unwrap();
        Ok(None)
    })
    .unwrap();

    let sub = as_record_get(&result, "sub");
    assert_eq!(as_record_get(sub, "x").clone().to_debug(), "1");
}

#[test]
fn identity_sharing_for_no_op_recipe() {
    let base = record(&[("a", int(1))]);
    let (result, forward, _) = run_with_patches(&base, |_d| Ok(None)).unwrap();
    match (&base, &result) {
        (Value::Record(b), Value::Record(r)) => assert!(Rc::ptr_eq(b, r)),
        _ => panic!(),
    }
    assert!(forward.is_empty());
}

#[test]
fn set_length_to_its_current_length_is_a_no_op() {
    let base = seq(vec![int(1), int(2), int(3)]);
    let (result, forward, _) = run_with_patches(&base, |d| {
        d.as_sequence().unwrap().set_length(3).unwrap();
        Ok(None)
    })
    .unwrap();
    match (&base, &result) {
        (Value::Sequence(b), Value::Sequence(r)) => assert!(Rc::ptr_eq(b, r)),
        _ => panic!(),
    }
    assert!(forward.is_empty());
}

#[test]
fn self_assignment_causes_no_modification() {
    let base = record(&[("k", Value::Float(f64::NAN))]);
    let (result, forward, _) = run_with_patches(&base, |d| {
        let r = d.as_record().unwrap();
        let v = match r.get("k").unwrap() {
            draftwood::Read::Value(v) => v,
            draftwood::Read::Draft(_) => panic!("scalar should not draft"),
        };
        r.set("k", v).unwrap();
        Ok(None)
    })
    .unwrap();
    match (&base, &result) {
        (Value::Record(b), Value::Record(r)) => assert!(Rc::ptr_eq(b, r)),
        _ => panic!(),
    }
    assert!(forward.is_empty());
}

#[test]
fn snapshot_does_not_finalize_a_manual_draft() {
    let base = record(&[("a", record(&[("x", int(1))]))]);
    let manual = create_manual_draft(&base).unwrap();
    let d = manual.draft();
    let nested = d.as_record().unwrap().get("a").unwrap();
    let draftwood::Read::Draft(inner) = nested else { panic!("expected a draft for a draftable record value") };
    inner.as_record().unwrap().set("x", int(5)).unwrap();

    let snap = snapshot(&d).unwrap();
    assert_eq!(as_record_get(as_record_get(&snap, "a"), "x").clone().to_debug(), "5");

    // the manual draft is still live and can keep being mutated after the snapshot
    let result = finish_manual_draft(manual).unwrap();
    assert_eq!(as_record_get(as_record_get(&result, "a"), "x").clone().to_debug(), "5");
}

#[test]
fn adding_a_deep_equal_but_distinct_record_to_a_set_grows_it() {
    let mut entries = indexmap::IndexSet::new();
    entries.insert(ValueKey(record(&[("x", int(1))])));
    let base = Value::Set(Rc::new(SetData::new(entries)));

    let result = run(&base, |d| {
        let s = d.as_set().unwrap();
        s.add(record(&[("x", int(1))])).unwrap();
        Ok(None)
    })
    .unwrap();

    match &result {
        Value::Set(s) => assert_eq!(s.entries.len(), 2, "a freshly allocated record is a distinct element by reference"),
        _ => panic!(),
    }
}

#[test]
fn assigning_a_deep_equal_but_distinct_record_is_a_real_write() {
    let inner = record(&[("x", int(1))]);
    let base = record(&[("a", inner.clone())]);

    let (result, forward, _) = run_with_patches(&base, |d| {
        let r = d.as_record().unwrap();
        r.set("a", record(&[("x", int(1))])).unwrap();
        Ok(None)
    })
    .unwrap();

    match (as_record_get(&base, "a"), as_record_get(&result, "a")) {
        (Value::Record(b), Value::Record(r)) => assert!(!Rc::ptr_eq(b, r)),
        _ => panic!(),
    }
    assert_eq!(forward.len(), 1, "a deep-equal but distinct reference must still emit a patch");
}

#[test]
fn run_rejects_a_scalar_base() {
    let err = run(&int(1), |_d| Ok(None)).unwrap_err();
    assert!(matches!(err, DraftError::NotDraftable));
}

#[test]
fn run_scalar_runs_the_recipe_directly_against_a_scalar_base() {
    let result = run_scalar(&int(1), |v| match v {
        Value::Int(n) => Ok(Some(int(*n + 1))),
        _ => panic!("expected an int"),
    })
    .unwrap();
    assert_eq!(result.to_debug(), "2");

    let unchanged = run_scalar(&int(1), |_v| Ok(None)).unwrap();
    assert_eq!(unchanged.to_debug(), "1");

    let cleared = run_scalar(&int(1), |_v| Ok(Some(Value::Nothing))).unwrap();
    assert!(matches!(cleared, Value::Nothing));
}

#[test]
fn run_scalar_rejects_a_draftable_base() {
    let base = record(&[("a", int(1))]);
    let err = run_scalar(&base, |_v| Ok(None)).unwrap_err();
    assert!(matches!(err, DraftError::BadArgument(_)));
}

#[test]
fn original_returns_the_pre_mutation_base() {
    let base = record(&[("a", int(1))]);
    run(&base, |d| {
        let r = d.as_record().unwrap();
        let before = original(d).unwrap();
        assert_eq!(as_record_get(&before, "a").clone().to_debug(), "1");
        r.set("a", int(2)).unwrap();
        Ok(None)
    })
    .unwrap();
}
