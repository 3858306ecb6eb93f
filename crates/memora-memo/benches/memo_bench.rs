use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use memora_core::{Array, MapValue, PlainObject, Value};
use memora_memo::{encode, has_cycle, memoize, memoize_with, MemoConfig, TupleKeying};

/// Deterministic CPU-bound work standing in for an expensive callable.
fn costly(_: &(), args: &[Value]) -> Result<f64, String> {
    let seed: f64 = args.iter().filter_map(Value::as_number).sum();
    let mut acc = seed;
    for i in 0..20_000 {
        acc = (acc + f64::from(i)).sqrt() + seed;
    }
    Ok(acc)
}

fn nested_object(depth: usize, width: usize) -> Value {
    let obj = PlainObject::new();
    for i in 0..width {
        obj.insert(format!("leaf_{i}"), i as f64);
    }
    if depth > 0 {
        let children =
            Array::from_values((0..width).map(|_| nested_object(depth - 1, width)));
        obj.insert("children", children);
    }
    Value::from(obj)
}

fn bench_key_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("keys");

    for depth in [1, 3, 5] {
        let value = nested_object(depth, 3);

        group.bench_with_input(BenchmarkId::new("encode", depth), &value, |b, value| {
            b.iter(|| encode(black_box(value)))
        });

        group.bench_with_input(BenchmarkId::new("has_cycle", depth), &value, |b, value| {
            b.iter(|| has_cycle(black_box(value)))
        });
    }

    group.finish();
}

fn bench_memoized_calls(c: &mut Criterion) {
    let mut group = c.benchmark_group("memoize");

    group.bench_function("uncached", |b| {
        let args = [Value::from(7)];
        b.iter(|| costly(&(), black_box(&args)))
    });

    group.bench_function("hit_primitive", |b| {
        let memo = memoize(costly);
        let args = [Value::from(7)];
        memo.invoke(&args).ok();

        b.iter(|| memo.invoke(black_box(&args)))
    });

    group.bench_function("hit_identity", |b| {
        let memo = memoize(costly);
        let args = [Value::from(MapValue::new())];
        memo.invoke(&args).ok();

        b.iter(|| memo.invoke(black_box(&args)))
    });

    group.bench_function("hit_structural", |b| {
        let memo = memoize(costly);
        let args = [nested_object(3, 3)];
        memo.invoke(&args).ok();

        b.iter(|| memo.invoke(black_box(&args)))
    });

    group.bench_function("hit_tuple_per_argument", |b| {
        let memo = memoize_with(
            costly,
            MemoConfig::new("bench").with_tuple_keying(TupleKeying::PerArgument),
        );
        let args = [Value::from(MapValue::new()), Value::from(1), Value::from("x")];
        memo.invoke(&args).ok();

        b.iter(|| memo.invoke(black_box(&args)))
    });

    group.bench_function("hit_single_flight", |b| {
        let memo = memoize_with(costly, MemoConfig::new("bench").with_single_flight(true));
        let args = [Value::from(7)];
        memo.invoke(&args).ok();

        b.iter(|| memo.invoke(black_box(&args)))
    });

    group.finish();
}

criterion_group!(benches, bench_key_generation, bench_memoized_calls);
criterion_main!(benches);
