use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tether_bridge::{lookup_read, Callable, ClassId, ClassRegistry, Runtime, Scope, Value, View};

struct Point {
    x: f64,
    y: f64,
}

fn chain_of(depth: usize) -> (ClassRegistry, ClassId, ClassId) {
    let mut registry = ClassRegistry::new();
    let root = registry.create_table("Level0", None).unwrap();
    let mut leaf = root;
    for level in 1..depth {
        leaf = registry.create_table(&format!("Level{level}"), Some(leaf)).unwrap();
    }
    registry
        .install_getter(root, Scope::Instance, "field", Callable::function(|| 1i64))
        .unwrap();
    (registry, root, leaf)
}

fn bench_chain_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup_read");

    for depth in [1usize, 4, 16, 64] {
        let (registry, _, leaf) = chain_of(depth);
        group.bench_with_input(BenchmarkId::new("inherited", depth), &depth, |b, _| {
            b.iter(|| lookup_read(&registry, black_box(leaf), View::Instance, black_box("field")));
        });
        group.bench_with_input(BenchmarkId::new("absent", depth), &depth, |b, _| {
            b.iter(|| lookup_read(&registry, black_box(leaf), View::Instance, black_box("missing")));
        });
    }

    group.finish();
}

fn point_runtime() -> (Runtime, Value) {
    let mut rt = Runtime::new();
    let point = rt.classes_mut().register_type::<Point>("Point").unwrap();
    rt.classes_mut()
        .install_property(
            point,
            Scope::Instance,
            "x",
            Callable::field_getter(|p: &Point| &p.x),
            Some(Callable::field_setter(|p: &mut Point| &mut p.x)),
        )
        .unwrap();
    rt.classes_mut()
        .install_method(
            point,
            Scope::Instance,
            "length",
            Callable::const_method(|p: &Point| p.x.hypot(p.y)),
        )
        .unwrap();
    let proxy = rt.wrap(Point { x: 3.0, y: 4.0 }).unwrap();
    (rt, proxy)
}

fn bench_runtime(c: &mut Criterion) {
    let mut group = c.benchmark_group("runtime");
    let (mut rt, proxy) = point_runtime();

    group.bench_function("get_field", |b| {
        b.iter(|| rt.get_field(black_box(&proxy), "x").unwrap());
    });
    group.bench_function("set_field", |b| {
        b.iter(|| rt.set_field(black_box(&proxy), "x", Value::Number(1.5)).unwrap());
    });
    group.bench_function("call_method", |b| {
        b.iter(|| rt.call_method(black_box(&proxy), "length", &[]).unwrap());
    });

    let add = Value::function(Callable::function(|a: i64, b: i64| a + b));
    let args = [Value::Integer(1), Value::Integer(2)];
    group.bench_function("call_function", |b| {
        b.iter(|| rt.call(black_box(&add), black_box(&args)).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_chain_lookup, bench_runtime);
criterion_main!(benches);
