//! Benchmarks for mesh operations.

use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::Point2;
use quadpave::algo::restructure::resta;
use quadpave::algo::smooth::{smooth, SmoothOptions, SmoothingKind};
use quadpave::prelude::*;

fn square(id: u32, n: usize) -> Region {
    let size = n as f64;
    let perimeter = Perimeter::builder(1, Point2::new(0.0, 0.0))
        .line(1, 2, Point2::new(size, 0.0), n)
        .line(2, 3, Point2::new(size, size), n)
        .line(3, 4, Point2::new(0.0, size), n)
        .close(4, n);
    Region::new(id, perimeter)
}

fn create_jittered_grid(n: usize) -> QuadMesh {
    let mut nodes = Vec::with_capacity((n + 1) * (n + 1));
    for j in 0..=n {
        for i in 0..=n {
            let interior = i > 0 && i < n && j > 0 && j < n;
            // deterministic jitter
            let t = ((i * 7 + j * 13) % 11) as f64 / 11.0 - 0.5;
            let d = if interior { 0.3 * t } else { 0.0 };
            nodes.push((Point2::new(i as f64 + d, j as f64 - d), NodeOrigin::Interior));
        }
    }
    let mut faces = Vec::with_capacity(n * n);
    for j in 0..n {
        for i in 0..n {
            let a = j * (n + 1) + i;
            faces.push([a, a + 1, a + n + 2, a + n + 1]);
        }
    }
    build_from_quads(&nodes, &faces, |_, _| Some(1), Capacity::estimate(4 * n)).unwrap()
}

fn bench_region_meshing(c: &mut Criterion) {
    let region = square(1, 20).with_scheme("M(RS)");
    c.bench_function("mesh_region_20x20", |b| {
        b.iter(|| mesh_region(&region, &MeshingConfig::default()).unwrap())
    });

    let regions: Vec<Region> = (1..=8).map(|id| square(id, 12)).collect();
    let config = MeshingConfig::default().with_parallel(true);
    c.bench_function("mesh_regions_8x12x12_parallel", |b| {
        b.iter(|| mesh_regions(&regions, &config, &Progress::none()))
    });
}

fn bench_mesh_edits(c: &mut Criterion) {
    let mesh = create_jittered_grid(30);

    for kind in [SmoothingKind::Laplacian, SmoothingKind::Equipotential, SmoothingKind::Isoparametric] {
        let options = SmoothOptions::default().with_kind(kind).with_iterations(10);
        c.bench_function(&format!("smooth_{:?}_30x30", kind), |b| {
            b.iter(|| {
                let mut m = mesh.clone();
                smooth(&mut m, &options)
            })
        });
    }

    c.bench_function("resta_30x30", |b| {
        b.iter(|| {
            let mut m = mesh.clone();
            resta(&mut m, usize::MAX).unwrap()
        })
    });
}

criterion_group!(benches, bench_region_meshing, bench_mesh_edits);
criterion_main!(benches);
