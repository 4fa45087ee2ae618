//! Synthetic stereo pairs shared by the integration tests.

#![allow(dead_code)]

use cv_stereotgv::prelude::*;
use image::{DynamicImage, GrayImage, Luma, LumaA};

/// Smooth, non-periodic texture with values in `[0.1, 0.9]`.
pub fn texture(x: f32, y: f32) -> f32 {
    0.5 + 0.18 * (0.31 * x + 0.17 * y).sin()
        + 0.12 * (0.13 * x - 0.29 * y + 1.0).sin()
        + 0.1 * (0.71 * x + 0.05 * y).sin() * (0.43 * y).cos()
}

/// 8-bit image of the texture displaced by `(dx, dy)`.
pub fn textured_image(width: u32, height: u32, dx: f32, dy: f32) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
        Luma([(255.0 * texture(x as f32 - dx, y as f32 - dy)).round() as u8])
    }))
}

/// A pair where image 1 is image 0 moved by `shift` pixels along `(tx, ty)`.
pub fn shifted_pair(
    width: u32,
    height: u32,
    shift: f32,
    tx: f32,
    ty: f32,
) -> (DynamicImage, DynamicImage) {
    (
        textured_image(width, height, 0.0, 0.0),
        textured_image(width, height, shift * tx, shift * ty),
    )
}

/// Translation field whose length and direction both change along x.
pub fn curved_translation(x: f32) -> (f32, f32) {
    let (len, angle) = (1.0 + 0.005 * x, 0.006 * x);
    (len * angle.cos(), len * angle.sin())
}

/// A pair where the pixel at `p` in image 1 shows image 0 at `p - shift * tv(p)`, so the
/// displacement of image 0 is `shift` times the translation field at its warped position.
pub fn curved_pair(width: u32, height: u32, shift: f32) -> (DynamicImage, DynamicImage) {
    let img1 = GrayImage::from_fn(width, height, |x, y| {
        let (tx, ty) = curved_translation(x as f32);
        let (x, y) = (x as f32 - shift * tx, y as f32 - shift * ty);
        Luma([(255.0 * texture(x, y)).round() as u8])
    });

    (
        textured_image(width, height, 0.0, 0.0),
        DynamicImage::ImageLuma8(img1),
    )
}

pub fn curved_field(width: u32, height: u32) -> HostVectorField {
    HostVectorField::from_fn(width, height, |x, _| {
        let (tx, ty) = curved_translation(x as f32);
        LumaA([tx, ty])
    })
}

/// Constant host vector field.
pub fn constant_field(width: u32, height: u32, x: f32, y: f32) -> HostVectorField {
    HostVectorField::from_fn(width, height, |_, _| LumaA([x, y]))
}

pub fn mean_abs_error(field: &ScalarField, expected: f32) -> f32 {
    let n = (field.width() * field.height()) as f32;
    field.pixels().map(|d| (d - expected).abs()).sum::<f32>() / n
}

/// Default parameters with fewer levels and iterations.
pub fn params(n_levels: usize, n_warp_iters: usize, n_solver_iters: usize) -> Params {
    Params {
        n_levels,
        n_warp_iters,
        n_solver_iters,
        ..Params::default()
    }
}
