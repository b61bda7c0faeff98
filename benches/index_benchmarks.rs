use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lucien_core::{IndexConfig, MortonKey, Octree, SpatialKey};
use rand::Rng;

fn benchmark_morton_encode(c: &mut Criterion) {
    let level = 18;
    let bound = 1u32 << level;
    let mut rng = rand::thread_rng();

    c.bench_function("morton encode", |b| {
        b.iter(|| {
            let x = rng.gen_range(0..bound);
            let y = rng.gen_range(0..bound);
            let z = rng.gen_range(0..bound);
            black_box(MortonKey::encode(x, y, z, level).unwrap());
        })
    });
}

fn benchmark_octree_insert(c: &mut Criterion) {
    let level = 12;
    let world = (1u64 << lucien_core::MAX_LEVEL) as f64;
    let mut rng = rand::thread_rng();

    c.bench_function("octree insert", |b| {
        b.iter(|| {
            let index: Octree<u64> = Octree::new(IndexConfig::default());
            for i in 0..1000u64 {
                let pos = [rng.gen::<f64>() * world, rng.gen::<f64>() * world, rng.gen::<f64>() * world];
                black_box(index.insert(pos, level, i).unwrap());
            }
        })
    });
}

fn benchmark_k_nearest(c: &mut Criterion) {
    let level = 12;
    let world = (1u64 << lucien_core::MAX_LEVEL) as f64;
    let mut rng = rand::thread_rng();
    let index: Octree<u64> = Octree::new(IndexConfig::default());
    for i in 0..5000u64 {
        let pos = [rng.gen::<f64>() * world, rng.gen::<f64>() * world, rng.gen::<f64>() * world];
        index.insert(pos, level, i).unwrap();
    }

    c.bench_function("k nearest (k=10)", |b| {
        b.iter(|| {
            let pos = [rng.gen::<f64>() * world, rng.gen::<f64>() * world, rng.gen::<f64>() * world];
            black_box(index.k_nearest(pos, black_box(10), f64::INFINITY).unwrap());
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(30).measurement_time(std::time::Duration::from_secs(10));
    targets = benchmark_morton_encode,
              benchmark_octree_insert,
              benchmark_k_nearest,
}
criterion_main!(benches);
