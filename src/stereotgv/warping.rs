//! # Warping and data term linearisation
//!
//! Each outer warp converts the current disparity into a displacement along the translation
//! vector field, resamples the target image at the displaced positions and linearises the
//! brightness constancy residual `I1(x + u·tv) - I0(x)` around the current disparity:
//!
//! ```text
//! rho(u) ≈ Iz + Iw·(u - u_s)
//! ```
//!
//! where `Iz` is the warped residual and `Iw` the image gradient projected on the translation
//! vector.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use crate::backend::ComputeBackend;
use crate::error::*;
use crate::field::{Float2, ScalarField, VectorField};

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Convert a disparity into a pixel displacement: `warp = u·tv`.
pub fn compute_optical_flow_vector<B: ComputeBackend>(
    backend: &B,
    u: &ScalarField,
    tv: &VectorField,
    warp: &mut VectorField,
) -> Result<()> {
    backend.launch(warp, |x, y| tv.get(x, y) * u.get(x, y))
}

/// Re-sample the translation vector field at the currently warped position of every pixel.
///
/// Under curved epipolar geometry the direction of motion depends on where along the curve the
/// match lies, so the vector used for the next linearisation is the one at `x + warp(x)`.
pub fn find_warping_vector<B: ComputeBackend>(
    backend: &B,
    warp: &VectorField,
    tv: &VectorField,
    tv2: &mut VectorField,
) -> Result<()> {
    backend.launch(tv2, |x, y| {
        let d = warp.get(x, y);
        tv.sample(x as f32 + d.x, y as f32 + d.y)
    })
}

/// Compute the averaged image gradients `(Ix, Iy)` and the residual `Iz` of the warped pair.
///
/// Pixels whose warped position falls outside the image carry no data term: all three derivatives
/// are set to zero there.
pub fn compute_derivatives<B: ComputeBackend>(
    backend: &B,
    i0: &ScalarField,
    i1w: &ScalarField,
    warp: &VectorField,
    ix: &mut ScalarField,
    iy: &mut ScalarField,
    iz: &mut ScalarField,
) -> Result<()> {
    backend.launch_pair(ix, iy, |x, y| {
        if !inside(i0, x, y, warp.get(x, y)) {
            return (0.0, 0.0);
        }

        let g = averaged_gradient(i0, i1w, x, y);
        (g.x, g.y)
    })?;

    compute_residual(backend, i0, i1w, warp, iz)
}

/// Project the image gradient on the translation vector: `Iw = Ix·tv.x + Iy·tv.y`.
pub fn project_gradient<B: ComputeBackend>(
    backend: &B,
    ix: &ScalarField,
    iy: &ScalarField,
    tv: &VectorField,
    iw: &mut ScalarField,
) -> Result<()> {
    backend.launch(iw, |x, y| {
        Float2::new(ix.get(x, y), iy.get(x, y)).dot(tv.get(x, y))
    })
}

/// Compute `Iw` and `Iz` directly, projecting the gradient on the re-sampled vector field `tv2`.
pub fn compute_derivatives_fisheye<B: ComputeBackend>(
    backend: &B,
    i0: &ScalarField,
    i1w: &ScalarField,
    tv2: &VectorField,
    warp: &VectorField,
    iw: &mut ScalarField,
    iz: &mut ScalarField,
) -> Result<()> {
    backend.launch_pair(iw, iz, |x, y| {
        if !inside(i0, x, y, warp.get(x, y)) {
            return (0.0, 0.0);
        }

        let g = averaged_gradient(i0, i1w, x, y);
        (g.dot(tv2.get(x, y)), i1w.get(x, y) - i0.get(x, y))
    })
}

fn compute_residual<B: ComputeBackend>(
    backend: &B,
    i0: &ScalarField,
    i1w: &ScalarField,
    warp: &VectorField,
    iz: &mut ScalarField,
) -> Result<()> {
    backend.launch(iz, |x, y| {
        if inside(i0, x, y, warp.get(x, y)) {
            i1w.get(x, y) - i0.get(x, y)
        } else {
            0.0
        }
    })
}

/// Mean of the reference and warped image gradients.
fn averaged_gradient(i0: &ScalarField, i1w: &ScalarField, x: usize, y: usize) -> Float2 {
    let (x, y) = (x as isize, y as isize);

    Float2::new(
        0.5 * (five_point(|k| i0.get_clamped(x + k, y)) + five_point(|k| i1w.get_clamped(x + k, y))),
        0.5 * (five_point(|k| i0.get_clamped(x, y + k)) + five_point(|k| i1w.get_clamped(x, y + k))),
    )
}

/// Five point central difference `(f(-2) - 8f(-1) + 8f(1) - f(2)) / 12`.
#[inline]
fn five_point<F: Fn(isize) -> f32>(f: F) -> f32 {
    (f(-2) - 8.0 * f(-1) + 8.0 * f(1) - f(2)) / 12.0
}

#[inline]
fn inside(field: &ScalarField, x: usize, y: usize, d: Float2) -> bool {
    let (wx, wy) = (x as f32 + d.x, y as f32 + d.y);
    wx >= 0.0
        && wy >= 0.0
        && wx <= (field.width() - 1) as f32
        && wy <= (field.height() - 1) as f32
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
