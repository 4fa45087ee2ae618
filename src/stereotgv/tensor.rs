//! # Diffusion tensor and step sizes
//!
//! The tensor `T = w·n nᵗ + n⊥ n⊥ᵗ`, with `n` the normalised image gradient and
//! `w = exp(-beta·|∇I|^gamma)`, damps regularisation across strong edges while leaving it
//! isotropic in flat regions.
//!
//! Step sizes follow diagonal preconditioning: each primal variable gets the inverse of the sum of
//! the absolute coefficients it carries in the linear operator
//! `K(u, v) = (alpha0·(T∇u - v), alpha1·∇v)`, built from forward differences with Neumann
//! boundaries.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use crate::backend::ComputeBackend;
use crate::error::*;
use crate::field::{Eta, Field, ScalarField, SymTensor};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Gradients weaker than this leave the tensor isotropic.
const MIN_GRADIENT: f32 = 1e-6;

/// Lower bound on a preconditioner.
const MIN_ETA: f32 = 1e-6;

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Compute the diffusion tensor of a (smoothed) grayscale image.
pub fn calc_tensor<B: ComputeBackend>(
    backend: &B,
    gray: &ScalarField,
    beta: f32,
    gamma: f32,
    tensor: &mut Field<SymTensor>,
) -> Result<()> {
    backend.launch(tensor, |x, y| {
        let (x, y) = (x as isize, y as isize);
        let gx = 0.5 * (gray.get_clamped(x + 1, y) - gray.get_clamped(x - 1, y));
        let gy = 0.5 * (gray.get_clamped(x, y + 1) - gray.get_clamped(x, y - 1));

        tensor_from_gradient(gx, gy, beta, gamma)
    })
}

/// Tensor for a single image gradient.
pub fn tensor_from_gradient(gx: f32, gy: f32, beta: f32, gamma: f32) -> SymTensor {
    let norm = gx.hypot(gy);
    if !(norm > MIN_GRADIENT) || !norm.is_finite() {
        return SymTensor::IDENTITY;
    }

    let (nx, ny) = (gx / norm, gy / norm);
    let w = (-beta * norm.powf(gamma)).exp();

    SymTensor {
        a: w * nx * nx + ny * ny,
        b: w * ny * ny + nx * nx,
        c: (w - 1.0) * nx * ny,
    }
}

/// Compute the per-pixel preconditioners `etau`, `etav1` and `etav2` from the tensor.
pub fn solve_eta<B: ComputeBackend>(
    backend: &B,
    alpha0: f32,
    alpha1: f32,
    tensor: &Field<SymTensor>,
    eta: &mut Field<Eta>,
) -> Result<()> {
    let (w, h) = (tensor.width(), tensor.height());

    backend.launch(eta, |x, y| {
        let bx = if x + 1 < w { 1.0 } else { 0.0 };
        let by = if y + 1 < h { 1.0 } else { 0.0 };
        let t = tensor.get(x, y);

        // Coefficients of u(x, y) in its own rows
        let mut sum_u = (t.a * bx + t.c * by).abs() + (t.c * bx + t.b * by).abs();
        let mut n_diff = bx + by;

        // ...and in the forward differences of its left and upper neighbours
        if x > 0 {
            let l = tensor.get(x - 1, y);
            sum_u += l.a.abs() + l.c.abs();
            n_diff += 1.0;
        }
        if y > 0 {
            let up = tensor.get(x, y - 1);
            sum_u += up.c.abs() + up.b.abs();
            n_diff += 1.0;
        }

        let eta_v = alpha0 + alpha1 * n_diff;

        Eta {
            u: (alpha0 * sum_u).max(MIN_ETA),
            v1: eta_v,
            v2: eta_v,
        }
    })
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
