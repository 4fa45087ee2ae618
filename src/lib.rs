//! # Stereo TGV-L1 Disparity
//!
//! This crate provides dense disparity and depth computation for stereo computer vision, using a
//! coarse-to-fine primal-dual solver for a TGV-L1 energy. Per-pixel vector fields describe the
//! camera geometry, so both rectified pinhole pairs and fisheye pairs are supported.
//!
//! Kernels run on a [`ComputeBackend`](backend::ComputeBackend): either serially or on a rayon
//! thread pool.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod backend;
mod disparity;
pub mod error;
pub mod field;
pub mod stereotgv;

// -----------------------------------------------------------------------------------------------
// EXPORTS
// -----------------------------------------------------------------------------------------------

pub mod prelude {
    pub use crate::backend::{BackendType, ComputeBackend, CpuBackend, LaunchConfig, SerialBackend};
    pub use crate::disparity::{DisparityAlgorithm, DisparityMap, StereoFrame};
    pub use crate::error::Error;
    pub use crate::field::{Field, Float2, ScalarField, VectorField};
    pub use crate::stereotgv::params::{DataTerm, Direction, Params};
    pub use crate::stereotgv::preprocess::HostVectorField;
    pub use crate::stereotgv::stats::WarpStats;
    pub use crate::stereotgv::StereoTgv;
}
