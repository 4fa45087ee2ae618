//! # Solver parameters

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::error::*;

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

/// Linearisation of the brightness constancy term.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DataTerm {
    /// Image gradients projected on the per-pixel translation vector.
    Planar,

    /// Translation vector re-sampled at the warped position, for curved epipolar geometry.
    Fisheye,
}

/// Which view of the pair the disparity is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Image 0 is the reference, image 1 is warped along the forward vector field.
    Forward,

    /// Image 1 is the reference, image 0 is warped along the backward vector field.
    Backward,
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Params {
    /// Edge sensitivity of the diffusion tensor.
    pub beta: f32,

    /// Exponent applied to the gradient magnitude in the diffusion tensor.
    pub gamma: f32,

    /// Weight of the first order term `|T∇u - v|`.
    pub alpha0: f32,

    /// Weight of the second order term `|∇v|`.
    pub alpha1: f32,

    /// Ratio between primal and dual step sizes.
    pub timestep_lambda: f32,

    /// Weight of the L1 data term.
    pub lambda: f32,

    pub n_levels: usize,

    /// Per-level downscaling factor, strictly between 0 and 1.
    pub f_scale: f32,

    pub n_warp_iters: usize,
    pub n_solver_iters: usize,

    /// Stereo baseline in metres.
    pub baseline: f32,

    /// Focal length in pixels.
    pub focal: f32,

    /// Depth reported where the disparity is too small to convert.
    pub max_depth: f32,

    pub data_term: DataTerm,

    /// Sigma of the Gaussian blur applied to host images before conversion, `0` disables it.
    pub prefilter_sigma: f32,
}

/// Regularisation and step weights used by the primal-dual kernels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TgvWeights {
    pub alpha0: f32,
    pub alpha1: f32,
    pub lambda: f32,
    pub theta: f32,
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Params {
            beta: 4.0,
            gamma: 0.8,
            alpha0: 1.0,
            alpha1: 5.0,
            timestep_lambda: 1.0,
            lambda: 10.0,
            n_levels: 4,
            f_scale: 0.5,
            n_warp_iters: 5,
            n_solver_iters: 30,
            baseline: 0.05,
            focal: 500.0,
            max_depth: 100.0,
            data_term: DataTerm::Planar,
            prefilter_sigma: 0.0,
        }
    }
}

impl Params {
    /// Parse parameters from a TOML document. Missing keys take their default value.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let params: Params = toml::from_str(s)?;
        params.validate()?;
        Ok(params)
    }

    /// Check that every parameter lies in its valid range.
    pub fn validate(&self) -> Result<()> {
        if !(self.f_scale > 0.0 && self.f_scale < 1.0) {
            return Err(Error::InvalidScale(self.f_scale));
        }

        positive("alpha0", self.alpha0)?;
        positive("alpha1", self.alpha1)?;
        positive("timestep_lambda", self.timestep_lambda)?;
        positive("gamma", self.gamma)?;
        positive("baseline", self.baseline)?;
        positive("focal", self.focal)?;
        positive("max_depth", self.max_depth)?;
        non_negative("lambda", self.lambda)?;
        non_negative("beta", self.beta)?;
        non_negative("prefilter_sigma", self.prefilter_sigma)?;

        at_least_one("n_levels", self.n_levels)?;
        at_least_one("n_warp_iters", self.n_warp_iters)?;
        at_least_one("n_solver_iters", self.n_solver_iters)?;

        Ok(())
    }

    pub fn weights(&self) -> TgvWeights {
        TgvWeights {
            alpha0: self.alpha0,
            alpha1: self.alpha1,
            lambda: self.lambda,
            theta: self.timestep_lambda,
        }
    }
}

fn positive(name: &'static str, val: f32) -> Result<()> {
    if val.is_finite() && val > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidParameter {
            name,
            reason: format!("{} must be a finite positive number", val),
        })
    }
}

fn non_negative(name: &'static str, val: f32) -> Result<()> {
    if val.is_finite() && val >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidParameter {
            name,
            reason: format!("{} must be a finite non-negative number", val),
        })
    }
}

fn at_least_one(name: &'static str, val: usize) -> Result<()> {
    if val >= 1 {
        Ok(())
    } else {
        Err(Error::InvalidParameter {
            name,
            reason: "must be at least 1".into(),
        })
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
