use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cv_stereotgv::prelude::*;
use image::{DynamicImage, GrayImage, Luma};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;

fn textured(dx: f32) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(WIDTH, HEIGHT, |x, y| {
        let (x, y) = (x as f32 - dx, y as f32);
        let v = 0.5
            + 0.18 * (0.31 * x + 0.17 * y).sin()
            + 0.12 * (0.13 * x - 0.29 * y + 1.0).sin()
            + 0.1 * (0.71 * x + 0.05 * y).sin() * (0.43 * y).cos();
        Luma([(255.0 * v).round() as u8])
    }))
}

fn stereotgv_bench(c: &mut Criterion) {
    // Build images
    let left = textured(0.0);
    let right = textured(6.0);

    // Build solver
    let mut solver = StereoTgv::new().unwrap();
    solver
        .initialize(WIDTH as usize, HEIGHT as usize, Params::default())
        .unwrap();
    solver.copy_images_to_device(&left, &right).unwrap();

    // Benchmark solve function
    c.bench_function("stereotgv forward 320x240", |b| {
        b.iter(|| black_box(solver.solve_stereo_forward()))
    });

    let frame = StereoFrame::new(left, right);
    c.bench_function("stereotgv compute 320x240", |b| {
        b.iter(|| solver.compute(black_box(&frame)))
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = stereotgv_bench
}
criterion_main!(benches);
