//! # Stereo TGV-L1 disparity
//!
//! This module provides a coarse-to-fine primal-dual solver for dense disparity between two
//! images, using a TGV-L1 energy with an image-driven anisotropic regulariser.
//!
//! The disparity `u` is a scalar per pixel of the reference image. A per-pixel translation vector
//! field `tv` converts it into an image displacement `u·tv`, which lets the same solver handle
//! rectified pinhole pairs (constant `tv = (1, 0)`) as well as curved epipolar geometry such as
//! fisheye pairs.
//!
//! Usage:
//!
//! ```no_run
//! # use cv_stereotgv::prelude::*;
//! # fn run(left: &image::DynamicImage, right: &image::DynamicImage) -> Result<(), Error> {
//! let mut solver = StereoTgv::new()?;
//! solver.initialize(640, 480, Params::default())?;
//! solver.copy_images_to_device(left, right)?;
//! solver.solve_stereo_forward()?;
//!
//! let depth = solver.depth()?;
//! # Ok(())
//! # }
//! ```

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod depth;
pub mod params;
pub mod preprocess;
pub mod primal_dual;
pub mod pyramid;
pub mod resample;
pub mod stats;
pub mod tensor;
pub mod warping;

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::{DynamicImage, GenericImageView};
use log::{debug, info, trace};

use crate::backend::{ComputeBackend, CpuBackend};
use crate::disparity::{DisparityAlgorithm, DisparityMap, StereoFrame};
use crate::error::*;
use crate::field::ScalarField;

use self::depth::compute_depth;
use self::params::{DataTerm, Direction, Params};
use self::preprocess::{check_dims, gaussian, gray_from_dynamic, vector_field_from_host};
use self::preprocess::HostVectorField;
use self::primal_dual::{solve_tp, update_dual_variables, update_primal_variables, SolverState};
use self::pyramid::{level_geometry, LevelImages, Pyramid, PyramidLevel};
use self::resample::{upscale, warp_image};
use self::stats::WarpStats;
use self::tensor::{calc_tensor, solve_eta};
use self::warping::{
    compute_derivatives, compute_derivatives_fisheye, compute_optical_flow_vector,
    find_warping_vector, project_gradient,
};

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Multi-resolution TGV-L1 stereo solver.
pub struct StereoTgv<B: ComputeBackend = CpuBackend> {
    backend: B,
    params: Params,
    buffers: Option<Buffers>,
    images_loaded: bool,
    stats: Vec<WarpStats>,
}

/// Everything allocated by [`StereoTgv::initialize`].
struct Buffers {
    pyramid: Pyramid,

    /// One solver state per level, level 0 first.
    states: Vec<SolverState>,

    depth: ScalarField,
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl StereoTgv<CpuBackend> {
    /// Create a solver running on a rayon thread pool.
    pub fn new() -> Result<Self> {
        Ok(Self::with_backend(CpuBackend::new()?))
    }
}

impl<B: ComputeBackend> StereoTgv<B> {
    /// Create a solver running on the given backend. It must be initialised before use.
    pub fn with_backend(backend: B) -> Self {
        StereoTgv {
            backend,
            params: Params::default(),
            buffers: None,
            images_loaded: false,
            stats: Vec::new(),
        }
    }

    /// Allocate the buffers of every pyramid level for images of the given size.
    ///
    /// A planar horizontal translation field and an identity calibration are installed, so a
    /// rectified pair can be solved without loading vector fields. On error the solver is left
    /// unchanged.
    pub fn initialize(&mut self, width: usize, height: usize, params: Params) -> Result<()> {
        params.validate()?;

        let levels = level_geometry(
            width,
            height,
            params.n_levels,
            params.f_scale,
            &self.backend.launch_config(),
        )?;

        let mut pyramid = Pyramid::new(levels);
        pyramid.reset_vector_fields(&self.backend)?;

        let states = pyramid.levels().iter().map(SolverState::new).collect();
        let depth = pyramid.level(0).field();

        for (l, level) in pyramid.levels().iter().enumerate() {
            debug!(
                "Level {}: {}x{} (stride {}, scale {:.4})",
                l, level.width, level.height, level.stride, level.scale
            );
        }

        info!(
            "Stereo TGV initialised for {}x{} images: {} levels, {} warps x {} iterations, {} backend",
            width,
            height,
            params.n_levels,
            params.n_warp_iters,
            params.n_solver_iters,
            self.backend.name()
        );

        self.params = params;
        self.buffers = Some(Buffers {
            pyramid,
            states,
            depth,
        });
        self.images_loaded = false;
        self.stats.clear();

        Ok(())
    }

    /// Load the full resolution translation and calibration vector fields.
    ///
    /// The translation field gives the image motion per unit of disparity at every pixel of
    /// image 0, the calibration field a displacement applied to image 1 before solving. If images
    /// were already copied in, image 1 is re-calibrated at every level.
    pub fn load_vector_fields(
        &mut self,
        translation: &HostVectorField,
        calibration: &HostVectorField,
    ) -> Result<()> {
        let buffers = self.buffers.as_mut().ok_or(Error::NotInitialised)?;

        let base = buffers.pyramid.base_mut();
        check_dims(
            "Translation vector field",
            translation.width(),
            translation.height(),
            &base.tv_forward,
        )?;
        check_dims(
            "Calibration vector field",
            calibration.width(),
            calibration.height(),
            &base.calibration,
        )?;

        vector_field_from_host(
            &self.backend,
            "Translation vector field",
            translation,
            &mut base.tv_forward,
        )?;
        vector_field_from_host(
            &self.backend,
            "Calibration vector field",
            calibration,
            &mut base.calibration,
        )?;

        buffers.pyramid.build_vector_fields(&self.backend)?;
        if self.images_loaded {
            buffers.pyramid.calibrate(&self.backend)?;
        }

        info!(
            "Vector fields loaded for {} levels",
            buffers.pyramid.n_levels()
        );

        Ok(())
    }

    /// Convert both host images to grayscale and build the image pyramid.
    ///
    /// Both images must match the initialised size. On error the solver is left unchanged.
    pub fn copy_images_to_device(
        &mut self,
        image0: &DynamicImage,
        image1: &DynamicImage,
    ) -> Result<()> {
        let buffers = self.buffers.as_mut().ok_or(Error::NotInitialised)?;

        let base = buffers.pyramid.base_mut();
        check_dims("Image 0", image0.width(), image0.height(), &base.i0)?;
        check_dims("Image 1", image1.width(), image1.height(), &base.i1_source)?;

        let sigma = self.params.prefilter_sigma;
        gray_from_dynamic(&self.backend, image0, sigma, &mut base.i0)?;
        gray_from_dynamic(&self.backend, image1, sigma, &mut base.i1_source)?;

        buffers.pyramid.build_images(&self.backend)?;
        self.images_loaded = true;

        Ok(())
    }

    /// Solve for the disparity of image 0 against image 1.
    pub fn solve_stereo_forward(&mut self) -> Result<()> {
        self.solve(Direction::Forward)
    }

    /// Solve for the disparity of image 1 against image 0, along the backward vector field.
    pub fn solve_stereo_backward(&mut self) -> Result<()> {
        self.solve(Direction::Backward)
    }

    /// Run the full coarse-to-fine solve and convert the result to depth.
    pub fn solve(&mut self, direction: Direction) -> Result<()> {
        let buffers = self.buffers.as_mut().ok_or(Error::NotInitialised)?;
        if !self.images_loaded {
            return Err(Error::MissingImages);
        }

        let backend = &self.backend;
        let params = &self.params;
        let pyramid = &buffers.pyramid;
        let n_levels = pyramid.n_levels();

        self.stats.clear();

        for level in (0..n_levels).rev() {
            let (finer, coarser) = buffers.states.split_at_mut(level + 1);
            let state = &mut finer[level];

            match coarser.first() {
                // Coarsest level starts from zero disparity
                None => state.reset(),

                // Otherwise seed from the coarser solution. Disparity scales with resolution,
                // `v` approximates its gradient and does not.
                Some(prev) => {
                    let scale = pyramid.level(level).ratio_to(pyramid.level(level + 1));
                    upscale(backend, &prev.u, scale, &mut state.u)?;
                    upscale(backend, &prev.v, 1.0, &mut state.v)?;
                }
            }

            solve_level(
                backend,
                params,
                pyramid.level(level),
                level,
                pyramid.images(level),
                direction,
                state,
                &mut self.stats,
            )?;
        }

        compute_depth(
            backend,
            &buffers.states[0].u,
            params.baseline,
            params.focal,
            params.max_depth,
            &mut buffers.depth,
        )?;

        info!(
            "{:?} solve complete, final mean update {:.5} px",
            direction,
            self.stats.last().map(|s| s.mean_update).unwrap_or(0.0)
        );

        Ok(())
    }

    /// Disparity of the last solve at full resolution.
    pub fn disparity(&self) -> Result<&ScalarField> {
        let buffers = self.buffers.as_ref().ok_or(Error::NotInitialised)?;
        Ok(&buffers.states[0].u)
    }

    /// Depth of the last solve at full resolution, in the units of the baseline.
    pub fn depth(&self) -> Result<&ScalarField> {
        let buffers = self.buffers.as_ref().ok_or(Error::NotInitialised)?;
        Ok(&buffers.depth)
    }

    /// Copy the disparity of the last solve into a [`DisparityMap`] with its range set.
    pub fn disparity_map(&self) -> Result<DisparityMap> {
        let u = self.disparity()?;

        let mut map = DisparityMap::from_field(u.clone());
        map.min_disp = u.pixels().fold(None, |m: Option<f32>, d| {
            Some(m.map_or(d, |m| m.min(d)))
        });
        map.max_disp = u.pixels().fold(None, |m: Option<f32>, d| {
            Some(m.map_or(d, |m| m.max(d)))
        });

        Ok(map)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Dimensions of every level, empty before initialisation.
    pub fn levels(&self) -> &[PyramidLevel] {
        match &self.buffers {
            Some(buffers) => buffers.pyramid.levels(),
            None => &[],
        }
    }

    /// Per-warp statistics of the last solve, coarsest level first.
    pub fn last_stats(&self) -> &[WarpStats] {
        &self.stats
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Plot the statistics of the last solve to a PNG file.
    #[cfg(feature = "statistics")]
    pub fn plot_stats<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        stats::plot_stats(&self.stats, path)
    }
}

impl<B: ComputeBackend> DisparityAlgorithm for StereoTgv<B> {
    /// Compute the disparity of the left image of the frame.
    ///
    /// An uninitialised solver is initialised for the frame size with its current parameters.
    fn compute(&mut self, frame: &StereoFrame) -> Result<DisparityMap> {
        if self.buffers.is_none() {
            let (width, height) = frame.dimensions();
            self.initialize(width, height, self.params.clone())?;
        }

        self.copy_images_to_device(&frame.left, &frame.right)?;
        self.solve_stereo_forward()?;
        self.disparity_map()
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Run every warp of one level, starting from the `u` and `v` already in `state`.
#[allow(clippy::too_many_arguments)]
fn solve_level<B: ComputeBackend>(
    backend: &B,
    params: &Params,
    dims: &PyramidLevel,
    level: usize,
    images: &LevelImages,
    direction: Direction,
    state: &mut SolverState,
    stats: &mut Vec<WarpStats>,
) -> Result<()> {
    let (reference, target, tv) = match direction {
        Direction::Forward => (&images.i0, &images.i1, &images.tv_forward),
        Direction::Backward => (&images.i1, &images.i0, &images.tv_backward),
    };
    let weights = params.weights();

    let (grid_x, grid_y) = backend.launch_config().grid(dims.width, dims.height);
    debug!(
        "Solving level {} ({}x{}, {}x{} blocks)",
        level, dims.width, dims.height, grid_x, grid_y
    );

    // Fixed for the whole level
    gaussian(backend, reference, &mut state.smooth_tmp, &mut state.smooth)?;
    calc_tensor(
        backend,
        &state.smooth,
        params.beta,
        params.gamma,
        &mut state.tensor,
    )?;
    solve_eta(
        backend,
        params.alpha0,
        params.alpha1,
        &state.tensor,
        &mut state.eta,
    )?;

    state.begin_level()?;
    state.tv2.copy_from(tv)?;

    for warp in 0..params.n_warp_iters {
        state.begin_warp()?;

        match params.data_term {
            DataTerm::Planar => {
                compute_optical_flow_vector(backend, &state.u, tv, &mut state.warp)?;
                warp_image(backend, target, &state.warp, &mut state.i1_warp)?;
                compute_derivatives(
                    backend,
                    reference,
                    &state.i1_warp,
                    &state.warp,
                    &mut state.ix,
                    &mut state.iy,
                    &mut state.iz,
                )?;
                project_gradient(backend, &state.ix, &state.iy, tv, &mut state.iw)?;
            }
            DataTerm::Fisheye => {
                compute_optical_flow_vector(backend, &state.u, &state.tv2, &mut state.warp)?;
                find_warping_vector(backend, &state.warp, tv, &mut state.tv2)?;
                compute_optical_flow_vector(backend, &state.u, &state.tv2, &mut state.warp)?;
                warp_image(backend, target, &state.warp, &mut state.i1_warp)?;
                compute_derivatives_fisheye(
                    backend,
                    reference,
                    &state.i1_warp,
                    &state.tv2,
                    &state.warp,
                    &mut state.iw,
                    &mut state.iz,
                )?;
            }
        }

        for _ in 0..params.n_solver_iters {
            update_dual_variables(backend, &weights, state)?;
            solve_tp(backend, state)?;
            update_primal_variables(backend, &weights, state)?;
        }

        let mean_update = state.mean_update();
        trace!(
            "Level {} warp {}: mean update {:.5} px",
            level,
            warp,
            mean_update
        );
        stats.push(WarpStats {
            level,
            warp,
            mean_update,
        });
    }

    Ok(())
}
