use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use kyrowatch::diff::compare;
use kyrowatch::{
    run_pending, watch, ArrayCell, Cell, Object, TagFields, Value, WatchContext, WatchEvent,
    WatchOptions,
};

/// A model with `width` fields per level, `depth` levels deep, every leaf a cell.
fn make_model(width: usize, depth: usize) -> (Object, Vec<Cell>) {
    let mut leaves = Vec::new();
    let root = build_level(width, depth, &mut leaves);
    (root, leaves)
}

fn build_level(width: usize, depth: usize, leaves: &mut Vec<Cell>) -> Object {
    let mut object = Object::new();
    for i in 0..width {
        let key = format!("f{i}");
        object = if depth == 0 {
            let cell = Cell::new(i64::try_from(i).unwrap_or_default());
            leaves.push(cell.clone());
            object.with(key, cell)
        } else {
            object.with(key, build_level(width, depth - 1, leaves))
        };
    }
    object
}

fn unbounded() -> WatchOptions {
    WatchOptions::builder()
        .depth(-1)
        .old_values(1)
        .tag_fields(TagFields::All)
        .build()
        .unwrap()
}

fn bench_watch_setup(c: &mut Criterion) {
    let mut group = c.benchmark_group("watch/setup");
    group.throughput(Throughput::Elements(8 * 8 * 8));
    group.bench_function("512_leaves", |b| {
        b.iter_batched(
            || make_model(8, 2).0,
            |model| {
                let handle = watch(model, unbounded(), |_| None, &WatchContext::new()).unwrap();
                handle.dispose();
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

fn bench_change_dispatch(c: &mut Criterion) {
    let (model, leaves) = make_model(8, 2);
    let echo = |event: &WatchEvent| Some(event.child.peek());
    let _handle = watch(model, unbounded(), echo, &WatchContext::new()).unwrap();
    let leaf = leaves[leaves.len() / 2].clone();
    let mut n = 0i64;

    c.bench_function("watch/change_dispatch", |b| {
        b.iter(|| {
            n += 1;
            leaf.set(n);
        });
    });
}

fn bench_collection_diff(c: &mut Criterion) {
    let prev: Vec<Value> = (0..256).map(Value::Int).collect();
    let mut next = prev.clone();
    next.rotate_left(3);
    next.truncate(250);

    let mut group = c.benchmark_group("diff");
    group.throughput(Throughput::Elements(256));
    group.bench_function("compare_256_rotated", |b| b.iter(|| compare(&prev, &next)));
    group.finish();
}

fn bench_collection_churn(c: &mut Criterion) {
    let arr = ArrayCell::new(Vec::new());
    let model = Object::new().with("items", arr.clone());
    let _handle = watch(model, unbounded(), |_| None, &WatchContext::new()).unwrap();

    c.bench_function("watch/collection_push_shift", |b| {
        b.iter(|| {
            arr.push(Object::new().with("p", Cell::new(1)));
            if arr.len() > 64 {
                arr.shift();
            }
            run_pending();
        });
    });
}

criterion_group!(
    watch_benches,
    bench_watch_setup,
    bench_change_dispatch,
    bench_collection_diff,
    bench_collection_churn
);
criterion_main!(watch_benches);
