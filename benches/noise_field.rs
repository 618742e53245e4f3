//! Noise field and composite rendering throughput.
//!
//! Run with: cargo bench --bench noise_field

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use worldmap_layers::atlas::Atlas;
use worldmap_layers::config::AtlasConfig;
use worldmap_layers::geo::GeoRegion;
use worldmap_layers::layers::LayerKind;
use worldmap_layers::noise_field::{NoiseField, NoiseParams};

fn benchmark_single_sample(c: &mut Criterion) {
    let Ok(field) = NoiseField::new(NoiseParams::with_seed(42)) else {
        return;
    };

    c.bench_function("sphere_noise_sample", |b| {
        let mut lon = 0.0f64;
        b.iter(|| {
            lon += 0.01;
            black_box(field.at(black_box(lon), black_box(lon * 0.3)))
        });
    });
}

fn benchmark_region_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("elevation_region");
    group.throughput(Throughput::Elements(256 * 256));
    group.sample_size(10);

    group.bench_function("256x256_uncached", |b| {
        let Ok(atlas) = Atlas::new(&AtlasConfig::default()) else {
            return;
        };
        let Ok(region) = GeoRegion::from_degrees(-30.0, 30.0, -20.0, 20.0) else {
            return;
        };
        let mut seed = 0.0;
        b.iter(|| {
            // A new seed invalidates the cache so every iteration computes.
            seed += 1.0;
            let _ = atlas.set_parameter(LayerKind::Elevation, "seed", seed);
            black_box(atlas.sample_region(LayerKind::Elevation, region, 256, 256, None))
        });
    });

    group.finish();
}

fn benchmark_composite(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite");
    group.sample_size(10);

    group.bench_function("full_globe_512x256", |b| {
        b.iter(|| {
            let Ok(atlas) = Atlas::new(&AtlasConfig::default()) else {
                return;
            };
            let _ = black_box(atlas.get_color(LayerKind::Color));
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_single_sample,
    benchmark_region_grid,
    benchmark_composite,
);
criterion_main!(benches);
