//! # Depth conversion

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use crate::backend::ComputeBackend;
use crate::error::*;
use crate::field::ScalarField;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Disparities at or below this are treated as points at infinity.
pub const DISPARITY_EPSILON: f32 = 1e-3;

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Depth of a single disparity, `baseline·focal/d` clamped to `max_depth`.
///
/// Disparities at or below [`DISPARITY_EPSILON`] (including negative and NaN disparities) map to
/// `max_depth`.
pub fn disparity_to_depth(d: f32, baseline: f32, focal: f32, max_depth: f32) -> f32 {
    if d > DISPARITY_EPSILON {
        (baseline * focal / d).min(max_depth)
    } else {
        max_depth
    }
}

/// Convert a disparity field to depth.
pub fn compute_depth<B: ComputeBackend>(
    backend: &B,
    disparity: &ScalarField,
    baseline: f32,
    focal: f32,
    max_depth: f32,
    depth: &mut ScalarField,
) -> Result<()> {
    backend.launch(depth, |x, y| {
        disparity_to_depth(disparity.get(x, y), baseline, focal, max_depth)
    })
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
