//! # Resampling kernels
//!
//! Area-weighted downscaling for building the pyramid, bilinear upscaling for seeding a finer
//! level, and image warping along a displacement field.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use crate::backend::ComputeBackend;
use crate::error::*;
use crate::field::{Field, Sample, ScalarField, VectorField};

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Downscale `src` into `out` by averaging every source pixel that overlaps each output pixel,
/// weighted by the overlapping area, then multiply the result by `scale`.
pub fn downscale<T, B>(backend: &B, src: &Field<T>, scale: f32, out: &mut Field<T>) -> Result<()>
where
    T: Sample,
    B: ComputeBackend,
{
    let rx = src.width() as f32 / out.width() as f32;
    let ry = src.height() as f32 / out.height() as f32;

    backend.launch(out, |x, y| {
        let (x0, x1) = (x as f32 * rx, (x + 1) as f32 * rx);
        let (y0, y1) = (y as f32 * ry, (y + 1) as f32 * ry);

        let i_range = x0.floor() as usize..(x1.ceil() as usize).min(src.width());
        let j_range = y0.floor() as usize..(y1.ceil() as usize).min(src.height());

        let mut acc = T::default();
        let mut total = 0.0f32;

        for j in j_range {
            let wy = overlap(j, y0, y1);
            if wy <= 0.0 {
                continue;
            }

            for i in i_range.clone() {
                let wx = overlap(i, x0, x1);
                if wx <= 0.0 {
                    continue;
                }

                acc = acc + src.get(i, j) * (wx * wy);
                total += wx * wy;
            }
        }

        if total > 0.0 {
            acc * (scale / total)
        } else {
            src.sample((x0 + x1) * 0.5, (y0 + y1) * 0.5) * scale
        }
    })
}

/// Upscale `src` into `out` by bilinear interpolation at pixel centres, multiplying by `scale`.
pub fn upscale<T, B>(backend: &B, src: &Field<T>, scale: f32, out: &mut Field<T>) -> Result<()>
where
    T: Sample,
    B: ComputeBackend,
{
    let rx = src.width() as f32 / out.width() as f32;
    let ry = src.height() as f32 / out.height() as f32;

    backend.launch(out, |x, y| {
        let sx = (x as f32 + 0.5) * rx - 0.5;
        let sy = (y as f32 + 0.5) * ry - 0.5;
        src.sample(sx, sy) * scale
    })
}

/// Resample `src` at every pixel displaced by `warp`, with sub-pixel bilinear interpolation.
///
/// Positions falling outside the image are clamped to the border.
pub fn warp_image<B: ComputeBackend>(
    backend: &B,
    src: &ScalarField,
    warp: &VectorField,
    out: &mut ScalarField,
) -> Result<()> {
    backend.launch(out, |x, y| {
        let d = warp.get(x, y);
        src.sample(x as f32 + d.x, y as f32 + d.y)
    })
}

/// Length of the overlap of pixel `i` (spanning `[i, i + 1)`) with `[lo, hi)`.
fn overlap(i: usize, lo: f32, hi: f32) -> f32 {
    let start = lo.max(i as f32);
    let end = hi.min((i + 1) as f32);
    (end - start).max(0.0)
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
