//! # General disparity objects
//!
//! This module provides generic disparity traits and structures for use by different algorithms.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::{DynamicImage, GenericImageView, GrayImage};

use crate::error::*;
use crate::field::ScalarField;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// A pair of images taken at the same time by two cameras.
#[derive(Debug, Clone)]
pub struct StereoFrame {
    pub left: DynamicImage,
    pub right: DynamicImage,
}

/// A generic floating point disparity map.
#[derive(Debug, Clone)]
pub struct DisparityMap {
    data: ScalarField,
    pub max_disp: Option<f32>,
    pub min_disp: Option<f32>,
}

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

pub trait DisparityAlgorithm {
    /// Compute the disparity map of the given stereo frame.
    fn compute(&mut self, frame: &StereoFrame) -> Result<DisparityMap>;
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl StereoFrame {
    pub fn new(left: DynamicImage, right: DynamicImage) -> Self {
        StereoFrame { left, right }
    }

    /// Dimensions of the left image.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.left.width() as usize, self.left.height() as usize)
    }
}

impl DisparityMap {
    pub fn new(width: usize, height: usize) -> Self {
        Self::from_field(ScalarField::new(width, height, width))
    }

    /// Wrap an existing disparity field, with no range set.
    pub fn from_field(data: ScalarField) -> Self {
        DisparityMap {
            data,
            min_disp: None,
            max_disp: None,
        }
    }

    pub fn width(&self) -> usize {
        self.data.width()
    }

    pub fn height(&self) -> usize {
        self.data.height()
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data.get(x, y)
    }

    pub fn put(&mut self, x: usize, y: usize, val: f32) {
        self.data.put(x, y, val)
    }

    pub fn data(&self) -> &ScalarField {
        &self.data
    }

    /// Converts the map into a Luma8 image, clamping disparities to `[0, 255]`.
    pub fn to_luma(&self) -> GrayImage {
        self.to_luma_scaled(1.0, 0.0)
    }

    /// Converts the map to a normalised GrayImage.
    ///
    /// Maps the observed disparity range onto `[0, 255]`. If the range is not set then the
    /// function is equivalent to `.to_luma()`.
    pub fn to_luma_normalised(&self) -> GrayImage {
        match (self.min_disp, self.max_disp) {
            (Some(min), Some(max)) if max > min => self.to_luma_scaled(255.0 / (max - min), min),
            (_, Some(max)) if max > 0.0 => self.to_luma_scaled(255.0 / max, 0.0),
            _ => self.to_luma(),
        }
    }

    fn to_luma_scaled(&self, mult: f32, offset: f32) -> GrayImage {
        GrayImage::from_fn(self.width() as u32, self.height() as u32, |x, y| {
            let val = (self.data.get(x as usize, y as usize) - offset) * mult;
            image::Luma([val.max(0.0).min(255.0) as u8])
        })
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
