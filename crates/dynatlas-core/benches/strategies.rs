use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use dynatlas_core::prelude::*;
use image::RgbaImage;

fn generate_sizes(count: usize, min_size: u32, max_size: u32) -> Vec<(String, u32, u32)> {
    use rand::{Rng, SeedableRng};
    let mut rng = rand::rngs::StdRng::seed_from_u64(1234);
    (0..count)
        .map(|i| {
            let w = rng.gen_range(min_size..=max_size);
            let h = rng.gen_range(min_size..=max_size);
            (format!("tex_{}", i), w, h)
        })
        .collect()
}

fn settings(algorithm: Algorithm) -> AtlasSettings {
    AtlasSettings::builder()
        .algorithm(algorithm)
        .initial_size(512)
        .max_size(2048)
        .padding(1)
        .build()
}

fn bench_reserve(c: &mut Criterion) {
    let mut group = c.benchmark_group("reserve");

    for count in [50, 200, 800] {
        let sizes = generate_sizes(count, 8, 64);
        group.throughput(Throughput::Elements(count as u64));

        for algorithm in Algorithm::ALL {
            group.bench_with_input(
                BenchmarkId::new(algorithm.name(), count),
                &sizes,
                |b, sizes| {
                    b.iter(|| {
                        let mut atlas = Atlas::in_memory(settings(algorithm)).unwrap();
                        for (key, w, h) in sizes {
                            let _ = atlas.reserve(Some(key.as_str()), *w, *h);
                        }
                        black_box(atlas.stats())
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("churn");
    let sizes = generate_sizes(300, 8, 48);

    for algorithm in Algorithm::ALL {
        group.bench_function(BenchmarkId::from_parameter(algorithm.name()), |b| {
            b.iter(|| {
                let mut atlas = Atlas::in_memory(settings(algorithm)).unwrap();
                let mut live = Vec::new();
                for (i, (key, w, h)) in sizes.iter().enumerate() {
                    if let Ok(e) = atlas.reserve(Some(key.as_str()), *w, *h) {
                        live.push(e.id);
                    }
                    if i % 3 == 2 {
                        if let Some(id) = live.pop() {
                            let _ = atlas.remove(id);
                        }
                    }
                }
                let _ = atlas.repack();
                black_box(atlas.stats())
            });
        });
    }

    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    let sizes = generate_sizes(200, 8, 64);
    let images: Vec<(String, RgbaImage)> = sizes
        .iter()
        .map(|(k, w, h)| (k.clone(), RgbaImage::new(*w, *h)))
        .collect();
    group.throughput(Throughput::Elements(images.len() as u64));

    for algorithm in Algorithm::ALL {
        group.bench_function(BenchmarkId::from_parameter(algorithm.name()), |b| {
            b.iter(|| {
                let mut atlas = Atlas::in_memory(settings(algorithm)).unwrap();
                let items = images
                    .iter()
                    .map(|(k, img)| BatchItem::new(k.clone(), img))
                    .collect();
                black_box(atlas.add_batch(items).unwrap().placed())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reserve, bench_churn, bench_batch);
criterion_main!(benches);
