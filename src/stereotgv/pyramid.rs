//! # Geometric pyramid
//!
//! Level dimensions are fixed at initialisation: each level is `f_scale` times the size of the one
//! below it, rounded to whole pixels, with rows padded to the backend's stride alignment. The
//! pyramid owns the grayscale images and the vector fields of every level.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::debug;

use super::resample::{downscale, warp_image};
use crate::backend::{ComputeBackend, LaunchConfig};
use crate::error::*;
use crate::field::{Field, Float2, Float4, Pixel, ScalarField, VectorField};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Smallest width or height any level may have.
pub const MIN_LEVEL_DIM: usize = 2;

/// Largest pixel type stored in a level buffer.
const MAX_PIXEL_BYTES: usize = std::mem::size_of::<Float4>();

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Dimensions of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PyramidLevel {
    pub width: usize,
    pub height: usize,
    pub stride: usize,

    /// Nominal size of this level relative to level 0.
    pub scale: f32,
}

/// Images and vector fields of a single level.
pub struct LevelImages {
    pub i0: ScalarField,

    /// Image 1 after the calibration field has been applied.
    pub i1: ScalarField,

    /// Image 1 as it was copied in.
    pub i1_source: ScalarField,

    pub tv_forward: VectorField,
    pub tv_backward: VectorField,

    /// Displacement applied to image 1, in pixels of this level.
    pub calibration: VectorField,
}

pub struct Pyramid {
    levels: Vec<PyramidLevel>,
    images: Vec<LevelImages>,
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Compute the dimensions of every level of the pyramid.
pub fn level_geometry(
    width: usize,
    height: usize,
    n_levels: usize,
    f_scale: f32,
    config: &LaunchConfig,
) -> Result<Vec<PyramidLevel>> {
    if !(f_scale > 0.0 && f_scale < 1.0) {
        return Err(Error::InvalidScale(f_scale));
    }

    if width < MIN_LEVEL_DIM || height < MIN_LEVEL_DIM {
        return Err(Error::InvalidDimensions { width, height });
    }

    let mut levels = vec![PyramidLevel::new(width, height, 1.0, config)?];

    for level in 1..n_levels {
        let prev = levels[level - 1];
        let w = (prev.width as f32 * f_scale).round() as usize;
        let h = (prev.height as f32 * f_scale).round() as usize;

        if w < MIN_LEVEL_DIM || h < MIN_LEVEL_DIM {
            return Err(Error::LevelTooSmall {
                level,
                width: w,
                height: h,
                min: MIN_LEVEL_DIM,
            });
        }

        levels.push(PyramidLevel::new(w, h, prev.scale * f_scale, config)?);
    }

    Ok(levels)
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl PyramidLevel {
    /// Lay out a level, failing if its largest buffer could not be addressed.
    fn new(width: usize, height: usize, scale: f32, config: &LaunchConfig) -> Result<Self> {
        let stride = config
            .align_up(width)
            .filter(|stride| {
                stride
                    .checked_mul(height)
                    .and_then(|len| len.checked_mul(MAX_PIXEL_BYTES))
                    .map_or(false, |bytes| bytes <= isize::MAX as usize)
            })
            .ok_or(Error::InvalidDimensions { width, height })?;

        Ok(PyramidLevel {
            width,
            height,
            stride,
            scale,
        })
    }

    /// Factor taking a displacement in pixels of `other` to pixels of this level.
    pub fn ratio_to(&self, other: &PyramidLevel) -> f32 {
        self.width as f32 / other.width as f32
    }

    /// Allocate a zeroed field with this level's dimensions.
    pub fn field<T: Pixel>(&self) -> Field<T> {
        Field::new(self.width, self.height, self.stride)
    }
}

impl LevelImages {
    fn new(level: &PyramidLevel) -> Self {
        LevelImages {
            i0: level.field(),
            i1: level.field(),
            i1_source: level.field(),
            tv_forward: level.field(),
            tv_backward: level.field(),
            calibration: level.field(),
        }
    }
}

impl Pyramid {
    /// Allocate the buffers of every level.
    pub fn new(levels: Vec<PyramidLevel>) -> Self {
        let images = levels.iter().map(LevelImages::new).collect();
        Pyramid { levels, images }
    }

    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }

    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> &PyramidLevel {
        &self.levels[level]
    }

    pub fn images(&self, level: usize) -> &LevelImages {
        &self.images[level]
    }

    /// Level 0 buffers, which are filled from the host.
    pub fn base_mut(&mut self) -> &mut LevelImages {
        &mut self.images[0]
    }

    /// Downscale the level 0 images to every coarser level and apply the calibration field.
    pub fn build_images<B: ComputeBackend>(&mut self, backend: &B) -> Result<()> {
        for level in 1..self.levels.len() {
            let (finer, coarser) = self.images.split_at_mut(level);
            let src = &finer[level - 1];
            let dst = &mut coarser[0];

            downscale(backend, &src.i0, 1.0, &mut dst.i0)?;
            downscale(backend, &src.i1_source, 1.0, &mut dst.i1_source)?;
        }

        self.calibrate(backend)
    }

    /// Warp the source image 1 of every level by that level's calibration field.
    pub fn calibrate<B: ComputeBackend>(&mut self, backend: &B) -> Result<()> {
        for images in self.images.iter_mut() {
            let LevelImages {
                i1,
                i1_source,
                calibration,
                ..
            } = images;
            warp_image(backend, i1_source, calibration, i1)?;
        }

        Ok(())
    }

    /// Build the coarser vector fields from the level 0 translation and calibration fields.
    ///
    /// Translation fields give the image motion per unit of disparity and keep their magnitude;
    /// disparity itself carries the change of resolution. Calibration fields are displacements and
    /// are rescaled along with the image.
    pub fn build_vector_fields<B: ComputeBackend>(&mut self, backend: &B) -> Result<()> {
        for level in 1..self.levels.len() {
            let scale = self.levels[level].ratio_to(&self.levels[level - 1]);
            let (finer, coarser) = self.images.split_at_mut(level);
            let src = &finer[level - 1];
            let dst = &mut coarser[0];

            downscale(backend, &src.tv_forward, 1.0, &mut dst.tv_forward)?;
            downscale(backend, &src.calibration, scale, &mut dst.calibration)?;

            debug!(
                "Vector fields for level {} built ({}x{}, displacement scale {})",
                level, self.levels[level].width, self.levels[level].height, scale
            );
        }

        for images in self.images.iter_mut() {
            let LevelImages {
                tv_forward,
                tv_backward,
                ..
            } = images;
            backend.launch(tv_backward, |x, y| -tv_forward.get(x, y))?;
        }

        Ok(())
    }

    /// Install a planar horizontal translation field and an identity calibration.
    pub fn reset_vector_fields<B: ComputeBackend>(&mut self, backend: &B) -> Result<()> {
        let base = self.base_mut();
        backend.launch(&mut base.tv_forward, |_, _| Float2::new(1.0, 0.0))?;
        backend.launch(&mut base.calibration, |_, _| Float2::default())?;

        self.build_vector_fields(backend)
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
