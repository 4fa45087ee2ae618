//! # Preprocessing
//!
//! Conversion of 8-bit host images and calibrated vector fields into solver fields, and the
//! Gaussian smoothing applied before the diffusion tensor is computed.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::{DynamicImage, GrayImage, ImageBuffer, LumaA, RgbImage};
use imageproc::filter::gaussian_blur_f32;

use crate::backend::ComputeBackend;
use crate::error::*;
use crate::field::{Field, Float2, Pixel, ScalarField};

// -----------------------------------------------------------------------------------------------
// TYPES
// -----------------------------------------------------------------------------------------------

/// Host-side two channel vector field, as produced by an external calibration.
pub type HostVectorField = ImageBuffer<LumaA<f32>, Vec<f32>>;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Normalised 5-tap binomial approximation of a Gaussian.
const GAUSSIAN_5TAP: [f32; 5] = [0.0625, 0.25, 0.375, 0.25, 0.0625];

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Convert an 8-bit mono image into a `[0, 1]` float field.
pub fn gray_from_luma8<B: ComputeBackend>(
    backend: &B,
    image: &GrayImage,
    out: &mut ScalarField,
) -> Result<()> {
    check_dims("Mono image", image.width(), image.height(), out)?;

    backend.launch(out, |x, y| image.get_pixel(x as u32, y as u32)[0] as f32 / 255.0)
}

/// Convert an 8-bit RGB image into a `[0, 1]` float luminance field.
pub fn gray_from_rgb8<B: ComputeBackend>(
    backend: &B,
    image: &RgbImage,
    out: &mut ScalarField,
) -> Result<()> {
    check_dims("Colour image", image.width(), image.height(), out)?;

    backend.launch(out, |x, y| {
        let [r, g, b] = image.get_pixel(x as u32, y as u32).0;
        (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32) / 255.0
    })
}

/// Convert any host image into a float luminance field, optionally blurring it first.
///
/// Mono and RGB images are converted directly, every other format goes through RGB.
pub fn gray_from_dynamic<B: ComputeBackend>(
    backend: &B,
    image: &DynamicImage,
    prefilter_sigma: f32,
    out: &mut ScalarField,
) -> Result<()> {
    let blur = prefilter_sigma > 0.0;

    match image {
        DynamicImage::ImageLuma8(gray) if blur => {
            gray_from_luma8(backend, &gaussian_blur_f32(gray, prefilter_sigma), out)
        }
        DynamicImage::ImageLuma8(gray) => gray_from_luma8(backend, gray, out),
        DynamicImage::ImageRgb8(rgb) if blur => {
            gray_from_rgb8(backend, &gaussian_blur_f32(rgb, prefilter_sigma), out)
        }
        DynamicImage::ImageRgb8(rgb) => gray_from_rgb8(backend, rgb, out),
        other => {
            let rgb = other.to_rgb8();
            if blur {
                gray_from_rgb8(backend, &gaussian_blur_f32(&rgb, prefilter_sigma), out)
            } else {
                gray_from_rgb8(backend, &rgb, out)
            }
        }
    }
}

/// Copy a host vector field into a solver field.
pub fn vector_field_from_host<B: ComputeBackend>(
    backend: &B,
    what: &'static str,
    host: &HostVectorField,
    out: &mut Field<Float2>,
) -> Result<()> {
    check_dims(what, host.width(), host.height(), out)?;

    backend.launch(out, |x, y| {
        let px = host.get_pixel(x as u32, y as u32);
        Float2::new(px[0], px[1])
    })
}

/// Separable 5-tap Gaussian smoothing with clamped borders, using `tmp` for the horizontal pass.
pub fn gaussian<B: ComputeBackend>(
    backend: &B,
    input: &ScalarField,
    tmp: &mut ScalarField,
    out: &mut ScalarField,
) -> Result<()> {
    backend.launch(tmp, |x, y| {
        GAUSSIAN_5TAP
            .iter()
            .enumerate()
            .map(|(k, w)| w * input.get_clamped(x as isize + k as isize - 2, y as isize))
            .sum::<f32>()
    })?;

    let tmp = &*tmp;
    backend.launch(out, |x, y| {
        GAUSSIAN_5TAP
            .iter()
            .enumerate()
            .map(|(k, w)| w * tmp.get_clamped(x as isize, y as isize + k as isize - 2))
            .sum::<f32>()
    })
}

pub(crate) fn check_dims<T: Pixel>(
    what: &'static str,
    width: u32,
    height: u32,
    out: &Field<T>,
) -> Result<()> {
    if width as usize == out.width() && height as usize == out.height() {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            what,
            expected_width: out.width(),
            expected_height: out.height(),
            width: width as usize,
            height: height as usize,
        })
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SerialBackend;
    use approx::assert_abs_diff_eq;
    use image::{Luma, Rgb};

    #[test]
    fn mono_is_normalised() {
        let backend = SerialBackend::new();
        let img = GrayImage::from_fn(5, 3, |x, _| Luma([(x * 60) as u8]));
        let mut out = ScalarField::new(5, 3, 32);

        gray_from_luma8(&backend, &img, &mut out).unwrap();

        assert_abs_diff_eq!(out.get(0, 2), 0.0);
        assert_abs_diff_eq!(out.get(4, 2), 240.0 / 255.0, epsilon = 1e-6);
    }

    #[test]
    fn colour_uses_luminance_weights() {
        let backend = SerialBackend::new();
        let img = RgbImage::from_fn(2, 2, |x, _| {
            if x == 0 {
                Rgb([255, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let mut out = ScalarField::new(2, 2, 32);

        gray_from_dynamic(&backend, &DynamicImage::ImageRgb8(img), 0.0, &mut out).unwrap();

        assert_abs_diff_eq!(out.get(0, 1), 0.299, epsilon = 1e-5);
        assert_abs_diff_eq!(out.get(1, 1), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn other_formats_are_converted() {
        let backend = SerialBackend::new();
        let img = DynamicImage::new_rgba8(6, 4);
        let mut out = ScalarField::new(6, 4, 32);

        gray_from_dynamic(&backend, &img, 1.0, &mut out).unwrap();

        assert!(out.pixels().all(|v| v == 0.0));
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let backend = SerialBackend::new();
        let img = GrayImage::new(5, 4);
        let mut out = ScalarField::new(5, 3, 32);

        assert!(matches!(
            gray_from_luma8(&backend, &img, &mut out),
            Err(Error::DimensionMismatch { height: 4, expected_height: 3, .. })
        ));
    }

    #[test]
    fn host_vector_fields_keep_both_channels() {
        let backend = SerialBackend::new();
        let host = HostVectorField::from_fn(3, 2, |x, y| LumaA([x as f32, -(y as f32)]));
        let mut out = Field::<Float2>::new(3, 2, 32);

        vector_field_from_host(&backend, "Translation vector", &host, &mut out).unwrap();

        assert_eq!(out.get(2, 1), Float2::new(2.0, -1.0));
    }

    #[test]
    fn gaussian_preserves_constants_and_mass() {
        let backend = SerialBackend::new();
        let flat = ScalarField::from_fn(12, 9, 16, |_, _| 0.25);
        let mut tmp = ScalarField::new(12, 9, 16);
        let mut out = ScalarField::new(12, 9, 16);

        gaussian(&backend, &flat, &mut tmp, &mut out).unwrap();
        for v in out.pixels() {
            assert_abs_diff_eq!(v, 0.25, epsilon = 1e-6);
        }

        let spike = ScalarField::from_fn(12, 9, 16, |x, y| if (x, y) == (6, 4) { 1.0 } else { 0.0 });
        gaussian(&backend, &spike, &mut tmp, &mut out).unwrap();
        assert_abs_diff_eq!(out.pixels().sum::<f32>(), 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(out.get(6, 4), 0.375 * 0.375, epsilon = 1e-6);
    }
}
