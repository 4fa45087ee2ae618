//! # Solver fields
//!
//! This module provides the strided 2D buffers every solver kernel reads and writes, together with
//! the small set of pixel types stored in them.
//!
//! A field is `width` pixels wide but each row occupies `stride` elements, so that rows start on
//! the alignment boundary given by the backend's launch configuration. Padding elements are never
//! read by kernels.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::ops::{Add, Mul, Neg, Sub};

use crate::error::*;

// -----------------------------------------------------------------------------------------------
// TYPES
// -----------------------------------------------------------------------------------------------

/// Single channel float field, used for images, disparity and data term derivatives.
pub type ScalarField = Field<f32>;

/// Two component float field, used for vector fields, `v`, `p` and warps.
pub type VectorField = Field<Float2>;

/// Four component float field, used for the dual variable `q`.
pub type TensorField = Field<Float4>;

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// Marker for values that can be stored in a [`Field`].
pub trait Pixel: Copy + Default + Send + Sync + 'static {}

/// Pixels that support the linear arithmetic needed for interpolation and resampling.
pub trait Sample:
    Pixel + Add<Output = Self> + Sub<Output = Self> + Mul<f32, Output = Self>
{
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// A two component vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Float2 {
    pub x: f32,
    pub y: f32,
}

/// A four component vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Float4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

/// Upper triangle `[[a, c], [c, b]]` of a symmetric 2x2 matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SymTensor {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

/// Per-pixel preconditioners of the primal variables `u`, `v.x` and `v.y`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Eta {
    pub u: f32,
    pub v1: f32,
    pub v2: f32,
}

/// A strided 2D buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Field<T> {
    width: usize,
    height: usize,
    stride: usize,
    data: Vec<T>,
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Pixel for f32 {}
impl Pixel for Float2 {}
impl Pixel for Float4 {}
impl Pixel for SymTensor {}
impl Pixel for Eta {}

impl Sample for f32 {}
impl Sample for Float2 {}
impl Sample for Float4 {}

impl Float2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Euclidean norm, computed without intermediate overflow.
    pub fn norm(self) -> f32 {
        self.x.hypot(self.y)
    }
}

impl Add for Float2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Float2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Float2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Float2 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl Float4 {
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Frobenius norm of the four components, computed without intermediate overflow.
    pub fn norm(self) -> f32 {
        let m = self
            .x
            .abs()
            .max(self.y.abs())
            .max(self.z.abs())
            .max(self.w.abs());

        if m == 0.0 || !m.is_finite() {
            return m;
        }

        let (x, y, z, w) = (self.x / m, self.y / m, self.z / m, self.w / m);
        m * (x * x + y * y + z * z + w * w).sqrt()
    }
}

impl Add for Float4 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z, self.w + rhs.w)
    }
}

impl Sub for Float4 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z, self.w - rhs.w)
    }
}

impl Mul<f32> for Float4 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs, self.w * rhs)
    }
}

impl SymTensor {
    pub const IDENTITY: SymTensor = SymTensor {
        a: 1.0,
        b: 1.0,
        c: 0.0,
    };

    /// Matrix-vector product.
    pub fn apply(self, v: Float2) -> Float2 {
        Float2::new(self.a * v.x + self.c * v.y, self.c * v.x + self.b * v.y)
    }
}

impl Default for SymTensor {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl<T: Pixel> Field<T> {
    /// Allocate a zeroed (`T::default()`) field.
    pub fn new(width: usize, height: usize, stride: usize) -> Self {
        debug_assert!(stride >= width, "stride must cover the row width");

        Field {
            width,
            height,
            stride,
            data: vec![T::default(); stride * height],
        }
    }

    /// Allocate a field and fill every pixel from a function of its coordinates.
    pub fn from_fn<F>(width: usize, height: usize, stride: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> T,
    {
        let mut field = Self::new(width, height, stride);

        for y in 0..height {
            for x in 0..width {
                field.data[y * stride + x] = f(x, y);
            }
        }

        field
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[y * self.stride + x]
    }

    /// Get a pixel, clamping the coordinates to the field.
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> T {
        let x = x.max(0).min(self.width as isize - 1) as usize;
        let y = y.max(0).min(self.height as isize - 1) as usize;
        self.get(x, y)
    }

    pub fn put(&mut self, x: usize, y: usize, val: T) {
        self.data[y * self.stride + x] = val;
    }

    /// The `width` valid pixels of row `y`.
    pub fn row(&self, y: usize) -> &[T] {
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    /// Iterate over the valid pixels in row-major order, skipping the row padding.
    pub fn pixels(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.height).flat_map(move |y| self.row(y).iter().copied())
    }

    pub fn fill(&mut self, val: T) {
        for px in self.data.iter_mut() {
            *px = val;
        }
    }

    /// Whether the two fields share width, height and stride.
    pub fn same_shape<U>(&self, other: &Field<U>) -> bool {
        self.width == other.width && self.height == other.height && self.stride == other.stride
    }

    /// Copy the contents of `src` into this field.
    pub fn copy_from(&mut self, src: &Field<T>) -> Result<()> {
        if !self.same_shape(src) {
            return Err(Error::DimensionMismatch {
                what: "Source field",
                expected_width: self.width,
                expected_height: self.height,
                width: src.width,
                height: src.height,
            });
        }

        self.data.copy_from_slice(&src.data);
        Ok(())
    }

    /// Exchange the buffers of two same-shaped fields (double buffering).
    pub fn swap(&mut self, other: &mut Field<T>) {
        debug_assert!(self.same_shape(other), "only same-shaped fields may be swapped");
        std::mem::swap(&mut self.data, &mut other.data);
    }

    /// The raw strided storage, including row padding.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// The raw strided storage, including row padding.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T: Sample> Field<T> {
    /// Bilinearly interpolate the field at a sub-pixel position.
    ///
    /// Positions outside the field are clamped to the border, so this never reads out of range.
    pub fn sample(&self, fx: f32, fy: f32) -> T {
        let fx = fx.max(0.0).min((self.width - 1) as f32);
        let fy = fy.max(0.0).min((self.height - 1) as f32);

        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;

        let top = self.get(x0, y0) + (self.get(x1, y0) - self.get(x0, y0)) * tx;
        let bottom = self.get(x0, y1) + (self.get(x1, y1) - self.get(x0, y1)) * tx;

        top + (bottom - top) * ty
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ramp() -> ScalarField {
        Field::from_fn(4, 3, 8, |x, y| (x + 10 * y) as f32)
    }

    #[test]
    fn sample_is_exact_on_pixel_centres() {
        let f = ramp();
        for y in 0..3 {
            for x in 0..4 {
                assert_eq!(f.sample(x as f32, y as f32), f.get(x, y));
            }
        }
    }

    #[test]
    fn sample_interpolates_and_clamps() {
        let f = ramp();
        assert_abs_diff_eq!(f.sample(1.5, 0.0), 1.5, epsilon = 1e-6);
        assert_abs_diff_eq!(f.sample(1.0, 0.5), 6.0, epsilon = 1e-6);
        assert_abs_diff_eq!(f.sample(-3.0, -3.0), 0.0);
        assert_abs_diff_eq!(f.sample(10.0, 10.0), 23.0);
        assert_abs_diff_eq!(f.sample(f32::NAN, 0.0), 0.0);
    }

    #[test]
    fn padding_is_skipped() {
        let f = ramp();
        assert_eq!(f.as_slice().len(), 24);
        assert_eq!(f.pixels().count(), 12);
        assert_eq!(f.row(2), &[20.0, 21.0, 22.0, 23.0]);
    }

    #[test]
    fn copy_rejects_other_shapes() {
        let mut a = ScalarField::new(4, 3, 8);
        assert!(a.copy_from(&ramp()).is_ok());
        assert_eq!(a, ramp());

        let b = ScalarField::new(4, 3, 4);
        assert!(matches!(
            a.copy_from(&b),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn swap_exchanges_contents() {
        let mut a = ramp();
        let mut b = ScalarField::new(4, 3, 8);
        a.swap(&mut b);
        assert_eq!(b, ramp());
        assert!(a.pixels().all(|v| v == 0.0));
    }

    #[test]
    fn norms_do_not_overflow() {
        assert_abs_diff_eq!(Float2::new(3.0, 4.0).norm(), 5.0);
        assert!(Float2::new(1e30, 1e30).norm().is_finite());
        assert_abs_diff_eq!(Float4::new(1.0, 1.0, 1.0, 1.0).norm(), 2.0);
        assert!(Float4::new(1e30, -1e30, 1e30, 1e30).norm().is_finite());
        assert_eq!(Float4::default().norm(), 0.0);
    }

    #[test]
    fn tensor_application() {
        let t = SymTensor { a: 2.0, b: 3.0, c: 0.5 };
        assert_eq!(t.apply(Float2::new(1.0, 2.0)), Float2::new(3.0, 6.5));
        assert_eq!(SymTensor::default(), SymTensor::IDENTITY);
    }
}
