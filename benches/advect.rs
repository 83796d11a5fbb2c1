//! Benchmarks for the host particle step and brush stamping.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use flowlens::brush::{cursor_mask, falloff_weight};
use flowlens::{
    BoundaryPreset, Brush, BrushGeometry, BrushShape, CpuAdvector, Falloff, GridSize, ParticleAdvector,
    ParticleConfig, Vec2,
};

fn swirl(grid: GridSize) -> (Vec<f32>, Vec<f32>) {
    let center = Vec2::new(grid.width as f32, grid.height as f32) * 0.5;
    (0..grid.cells())
        .map(|i| {
            let p = Vec2::new((i % grid.width as usize) as f32, (i / grid.width as usize) as f32);
            let v = (p - center).perp() * 0.02;
            (v.x, v.y)
        })
        .unzip()
}

fn bench_cpu_advect(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_advect");
    let grid = GridSize::new(256, 144);
    let (ux, uy) = swirl(grid);
    let mask = vec![0u8; grid.cells()];
    let boundary = BoundaryPreset::Periodic.config();

    for count in [1_000u32, 10_000, 50_000] {
        let mut config = ParticleConfig::default();
        config.count(count);
        let mut advector = CpuAdvector::new((1280, 720), grid, &config);
        advector.set_fields(grid, &ux, &uy, &mask);

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| advector.advance(black_box(1.0), &boundary))
        });
    }

    group.finish();
}

fn bench_brush(c: &mut Criterion) {
    let mut group = c.benchmark_group("brush");
    let grid = GridSize::new(512, 512);

    for shape in BrushShape::ALL {
        let geometry = BrushGeometry {
            radius: 24.0,
            shape,
            falloff: Falloff::Smooth { softness: 0.5 },
            rotation: 0.4,
            aspect: 1.5,
        };
        let brush = Brush::new(Vec2::new(256.0, 256.0), geometry);

        group.bench_function(format!("footprint_{:?}", shape), |b| {
            b.iter(|| black_box(brush.footprint(grid)))
        });
        group.bench_function(format!("cursor_mask_{:?}", shape), |b| {
            b.iter(|| black_box(cursor_mask(&geometry, 64)))
        });
    }

    group.bench_function("falloff_weight", |b| {
        let geometry = BrushGeometry::default();
        b.iter(|| black_box(falloff_weight(black_box(Vec2::new(3.0, -2.0)), &geometry)))
    });

    group.finish();
}

criterion_group!(benches, bench_cpu_advect, bench_brush);
criterion_main!(benches);
