//! Benchmarks for Random Forest training and per-pixel classification

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use geo::Coord;
use lcmap_algorithms::classification::{classify, RandomForest, RandomForestParams};
use lcmap_algorithms::sampling::{Sample, SampleSet};
use lcmap_core::{AcquisitionDate, GeoTransform, Raster, Scene};

const BANDS: [&str; 4] = ["SR_B2", "SR_B3", "SR_B4", "SR_B5"];

fn training_set(n: usize) -> SampleSet {
    let samples = (0..n)
        .map(|i| {
            let label = (i % 2) as i64;
            let base = if label == 0 { 0.05 } else { 0.25 };
            Sample {
                values: (0..BANDS.len())
                    .map(|b| base + ((i * 7 + b * 13) % 50) as f64 * 0.002)
                    .collect(),
                label,
                random: None,
                point: Coord { x: 0.0, y: 0.0 },
            }
        })
        .collect();
    SampleSet {
        feature_names: BANDS.iter().map(|b| b.to_string()).collect(),
        samples,
    }
}

fn composite(size: usize) -> Scene {
    let date = AcquisitionDate::new(2022, 1, 1).unwrap();
    let mut scene = Scene::new("bench", date);
    for (b, name) in BANDS.iter().enumerate() {
        let mut r = Raster::new(size, size);
        r.set_transform(GeoTransform::new(0.0, size as f64 * 30.0, 30.0, -30.0));
        for row in 0..size {
            for col in 0..size {
                let v = 0.02 + ((row * 7 + col * 13 + b) % 150) as f64 * 0.002;
                r.set(row, col, v).unwrap();
            }
        }
        scene.add_band(*name, r).unwrap();
    }
    scene
}

fn bench_train(c: &mut Criterion) {
    let mut group = c.benchmark_group("classification/train");
    group.sample_size(10);
    for n in [200, 1000] {
        let set = training_set(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| RandomForest::train(black_box(&set), &BANDS, RandomForestParams::default()).unwrap())
        });
    }
    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classification/classify");
    group.sample_size(10);
    let forest = RandomForest::train(&training_set(500), &BANDS, RandomForestParams::default()).unwrap();
    for size in [128, 256, 512] {
        let scene = composite(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| classify(black_box(&scene), &forest, None).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_train, bench_classify);
criterion_main!(benches);
