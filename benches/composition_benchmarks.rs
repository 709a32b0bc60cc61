use amalgam::{payload, CompositeType, Constituent, Fragment, Options, TaskQueue};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn behavior_fragment(index: usize) -> Fragment {
    Fragment::builder()
        .initializer(|_, _| {})
        .behavior(format!("behavior_{index}"), move |_, _| Ok(payload(index)))
        .build()
}

fn fragments(count: usize) -> Vec<Constituent> {
    (0..count).map(|i| behavior_fragment(i).into()).collect()
}

fn benchmark_define(c: &mut Criterion) {
    let mut group = c.benchmark_group("define");
    for count in [1usize, 4, 16] {
        let constituents = fragments(count);
        group.bench_with_input(
            BenchmarkId::from_parameter(count),
            &constituents,
            |b, constituents| {
                b.iter(|| CompositeType::define(black_box(constituents.clone())));
            },
        );
    }
    group.finish();
}

fn benchmark_extend(c: &mut Criterion) {
    let base = CompositeType::define(fragments(4));
    c.bench_function("extend", |b| {
        b.iter(|| black_box(&base).extend(fragments(1)));
    });
}

fn benchmark_construct(c: &mut Criterion) {
    let mut group = c.benchmark_group("construct");
    for count in [1usize, 4, 16] {
        let ty = CompositeType::define(fragments(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &ty, |b, ty| {
            b.iter(|| ty.construct(black_box(Options::new())));
        });
    }
    group.finish();
}

fn benchmark_behavior_dispatch(c: &mut Criterion) {
    let ty = CompositeType::define(fragments(16));
    let instance = ty.construct(Options::new());
    c.bench_function("behavior_dispatch", |b| {
        b.iter(|| instance.call(black_box("behavior_15"), &[]));
    });
}

fn benchmark_membership(c: &mut Criterion) {
    let shared = behavior_fragment(0);
    let mut ty = CompositeType::define([Constituent::from(&shared)]);
    for _ in 0..8 {
        ty = ty.extend(fragments(2));
    }
    let instance = ty.construct(Options::new());
    c.bench_function("membership_deep_lineage", |b| {
        b.iter(|| instance.is_instance(black_box(&shared)));
    });
}

fn benchmark_event_round_trip(c: &mut Criterion) {
    use amalgam::{event_fragment, listener, Evented};

    let queue = TaskQueue::shared();
    let ty = CompositeType::define([event_fragment().into()]);
    let instance = ty.construct(Options::with_scheduler(queue.clone()));
    instance.on("ping", listener(|_| {}), None).unwrap();

    c.bench_function("trigger_and_drain", |b| {
        b.iter(|| {
            instance.trigger(black_box("ping")).unwrap();
            queue.run_until_idle()
        });
    });
}

criterion_group!(
    benches,
    benchmark_define,
    benchmark_extend,
    benchmark_construct,
    benchmark_behavior_dispatch,
    benchmark_membership,
    benchmark_event_round_trip
);
criterion_main!(benches);
