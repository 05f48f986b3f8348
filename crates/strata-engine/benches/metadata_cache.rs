use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use strata_engine::metadata::encode_members;
use strata_engine::{
    ImageSource, Loader, LoaderBuilder, Member, Runtime, TypeHandle, TypeImage,
};

/// A chain of `depth` classes, each declaring `width` methods
fn hierarchy(depth: usize, width: usize) -> (Arc<Loader>, Arc<TypeHandle>) {
    let runtime = Runtime::builder().build();
    let source = ImageSource::new();
    for level in 0..depth {
        let mut image = TypeImage::class(&format!("bench.L{level}"));
        if level > 0 {
            image = image.extends(&format!("bench.L{}", level - 1));
        }
        for i in 0..width {
            image = image.member(Member::method(&format!("m{level}_{i}"), "void", &["int"]));
        }
        source.insert(image.build().unwrap()).unwrap();
    }
    let boot = LoaderBuilder::new("bench", runtime.base_loader_type())
        .source(source)
        .build(&runtime);
    let leaf = boot
        .resolve(&format!("bench.L{}", depth - 1))
        .expect("leaf type resolves");
    (boot, leaf)
}

fn bench_cache_hit(c: &mut Criterion) {
    let (boot, leaf) = hierarchy(8, 16);
    let reflector = boot.runtime().reflector(None);
    reflector.methods(&leaf).unwrap();

    c.bench_function("methods_cache_hit", |b| {
        b.iter(|| reflector.method(black_box(&leaf), "m0_0", &["int"]).unwrap());
    });
}

fn bench_cache_miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("methods_after_redefine");

    for depth in [1usize, 4, 16] {
        let (boot, leaf) = hierarchy(depth, 16);
        let reflector = boot.runtime().reflector(None);
        let blob = encode_members(&[Member::method("only", "void", &[])]).unwrap();

        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, _| {
            b.iter(|| {
                leaf.redefine(blob.clone(), Vec::new());
                reflector.methods(black_box(&leaf)).unwrap()
            });
        });
    }

    group.finish();
}

fn bench_resolve_hit(c: &mut Criterion) {
    let (boot, _leaf) = hierarchy(4, 1);

    c.bench_function("resolve_already_resolved", |b| {
        b.iter(|| boot.resolve(black_box("bench.L3")).unwrap());
    });
}

criterion_group!(benches, bench_cache_hit, bench_cache_miss, bench_resolve_hit);
criterion_main!(benches);
