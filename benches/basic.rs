use std::hint::black_box;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, Criterion};

use draftwood::{run, Key, RecordData, SequenceData, Value};

fn wide_record(n: usize) -> Value {
    let mut entries = indexmap::IndexMap::new();
    for i in 0..n {
        entries.insert(Key::from(format!("field{i}")), Value::Int(i as i64));
    }
    Value::Record(Rc::new(RecordData::new(None, entries)))
}

fn deep_sequence(n: usize) -> Value {
    Value::Sequence(Rc::new(SequenceData::new((0..n as i64).map(Value::Int).collect())))
}

/// Touches one field and finalizes: measures the lazy-copy-on-first-write
/// plus single-node finalize path.
fn single_write(base: &Value) {
    let result = run(base, |d| {
        d.as_record().unwrap().set("field0", Value::Int(-1)).unwrap();
        Ok(None)
    })
    .unwrap();
    black_box(result);
}

/// Writes every field, exercising the full per-key finalize/patch-generation
/// loop over a wide record.
fn full_rewrite(base: &Value, n: usize) {
    let result = run(base, |d| {
        let r = d.as_record().unwrap();
        for i in 0..n {
            r.set(format!("field{i}"), Value::Int(-(i as i64))).unwrap();
        }
        Ok(None)
    })
    .unwrap();
    black_box(result);
}

/// Appends to a sequence repeatedly, exercising `ensure_copy` + `push`.
fn append_many(base: &Value, n: usize) {
    let result = run(base, |d| {
        let s = d.as_sequence().unwrap();
        for i in 0..n {
            s.push(Value::Int(i as i64)).unwrap();
        }
        Ok(None)
    })
    .unwrap();
    black_box(result);
}

fn criterion_benchmark(c: &mut Criterion) {
    let record_1000 = wide_record(1000);
    c.bench_function("single field write, 1000-field record", |b| {
        b.iter(|| single_write(black_box(&record_1000)))
    });
    c.bench_function("rewrite all fields, 1000-field record", |b| {
        b.iter(|| full_rewrite(black_box(&record_1000), 1000))
    });

    let seq_100 = deep_sequence(100);
    c.bench_function("append 1000 elements onto a 100-element sequence", |b| {
        b.iter(|| append_many(black_box(&seq_100), 1000))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
