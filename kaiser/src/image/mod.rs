//! Pixel data model: planes with an origin, masked images, exposures and WCS.

mod exposure;
mod masked_image;
mod wcs;


use std::fmt::Debug;
use std::ops::{AddAssign, Index, IndexMut};

use num_traits::Float;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::error::{Error, Result};

pub use exposure::Exposure;
pub use masked_image::MaskedImage;
pub use wcs::TanWcs;

/// Mask plane pixel: one bit per [`MaskPlane`].
pub type MaskPixel = u16;
/// Variance plane pixel.
pub type VariancePixel = f32;
/// Depth map pixel: number of contributing input samples.
pub type DepthPixel = u16;
/// Per-pixel count of unmasked inputs that reached a coadd pixel.
pub type DepthMap = PixelPlane<DepthPixel>;

/// Floating point types usable for the image plane.
pub trait Pixel: Float + AddAssign + Default + Debug + Send + Sync + 'static {
    fn from_f64_value(value: f64) -> Self;
    fn as_f64(self) -> f64;
}

impl Pixel for f32 {
    #[inline]
    fn from_f64_value(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Pixel for f64 {
    #[inline]
    fn from_f64_value(value: f64) -> Self {
        value
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self
    }
}

/// Named mask bits. The bit index is the enum discriminant.
///
/// Names are the conventional upper-case plane names (`SAT`, `NO_DATA`, ...), both for
/// `Display`/`FromStr` and in config files.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum MaskPlane {
    /// Known bad pixel (dead, hot, bad column).
    Bad = 0,
    /// Cosmic ray hit.
    Cr = 1,
    /// Value was interpolated.
    Intrp = 2,
    /// Saturated.
    Sat = 3,
    /// Too close to the image border to be trusted, or never observed in a coadd.
    Edge = 4,
    Detected = 5,
    DetectedNegative = 6,
    /// No input data mapped onto this pixel.
    NoData = 7,
}

impl MaskPlane {
    #[inline]
    pub const fn bit(self) -> MaskPixel {
        1 << (self as u8)
    }

    /// Union of the bits of `planes`.
    pub fn mask_of(planes: &[MaskPlane]) -> MaskPixel {
        planes.iter().fold(0, |mask, plane| mask | plane.bit())
    }

    /// Planes whose bit is set in `mask`, lowest bit first.
    pub fn planes_in(mask: MaskPixel) -> Vec<MaskPlane> {
        use strum::IntoEnumIterator;
        MaskPlane::iter().filter(|p| mask & p.bit() != 0).collect()
    }
}

/// Width and height of a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: usize,
    pub height: usize,
}

impl Dimensions {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }
}

/// A plane's footprint in its parent coordinate frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x0: i64,
    pub y0: i64,
    pub width: usize,
    pub height: usize,
}

impl BBox {
    pub const fn new(x0: i64, y0: i64, width: usize, height: usize) -> Self {
        Self {
            x0,
            y0,
            width,
            height,
        }
    }

    #[inline]
    pub fn x_end(&self) -> i64 {
        self.x0 + self.width as i64
    }

    #[inline]
    pub fn y_end(&self) -> i64 {
        self.y0 + self.height as i64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Overlap of two boxes, `None` when they do not overlap.
    pub fn intersect(&self, other: &BBox) -> Option<BBox> {
        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        let x_end = self.x_end().min(other.x_end());
        let y_end = self.y_end().min(other.y_end());
        if x_end <= x0 || y_end <= y0 {
            return None;
        }
        Some(BBox::new(x0, y0, (x_end - x0) as usize, (y_end - y0) as usize))
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x0 && x < self.x_end() && y >= self.y0 && y < self.y_end()
    }
}

/// Row-major 2D pixel array with an origin offset into a parent frame.
///
/// Local coordinates `(x, y)` index the array; parent coordinates are
/// `(x0 + x, y0 + y)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelPlane<T> {
    pixels: Vec<T>,
    width: usize,
    height: usize,
    x0: i64,
    y0: i64,
}

impl<T> PixelPlane<T> {
    pub fn new(width: usize, height: usize, pixels: Vec<T>) -> Self {
        assert_eq!(
            pixels.len(),
            width * height,
            "pixels length must equal width * height"
        );
        Self {
            pixels,
            width,
            height,
            x0: 0,
            y0: 0,
        }
    }

    pub fn with_origin(mut self, x0: i64, y0: i64) -> Self {
        self.x0 = x0;
        self.y0 = y0;
        self
    }

    #[inline]
    pub fn set_origin(&mut self, x0: i64, y0: i64) {
        self.x0 = x0;
        self.y0 = y0;
    }

    #[inline]
    pub fn origin(&self) -> (i64, i64) {
        (self.x0, self.y0)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    #[inline]
    pub fn bbox(&self) -> BBox {
        BBox::new(self.x0, self.y0, self.width, self.height)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    #[inline]
    pub fn pixels(&self) -> &[T] {
        &self.pixels
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [T] {
        &mut self.pixels
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> &T {
        debug_assert!(x < self.width && y < self.height);
        &self.pixels[y * self.width + x]
    }

    /// Pixel at parent-frame position, `None` outside the footprint.
    pub fn get_parent(&self, x: i64, y: i64) -> Option<&T> {
        if !self.bbox().contains(x, y) {
            return None;
        }
        Some(self.get((x - self.x0) as usize, (y - self.y0) as usize))
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        &mut self.pixels[y * self.width..(y + 1) * self.width]
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.pixels.iter()
    }

    #[inline]
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.pixels.iter_mut()
    }

    /// Builds a plane of the same shape and origin by mapping every pixel.
    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> PixelPlane<U> {
        PixelPlane {
            pixels: self.pixels.iter().map(f).collect(),
            width: self.width,
            height: self.height,
            x0: self.x0,
            y0: self.y0,
        }
    }

    /// Fails with [`Error::DimensionMismatch`] unless both planes have the same size.
    pub fn check_dimensions<U>(&self, other: &PixelPlane<U>, what: &'static str) -> Result<()> {
        if self.dimensions() != other.dimensions() {
            return Err(Error::DimensionMismatch {
                what,
                expected: self.dimensions(),
                actual: other.dimensions(),
            });
        }
        Ok(())
    }
}

impl<T: Default + Clone> PixelPlane<T> {
    pub fn new_default(width: usize, height: usize) -> Self {
        Self::new(width, height, vec![T::default(); width * height])
    }
}

impl<T: Clone> PixelPlane<T> {
    pub fn new_filled(width: usize, height: usize, value: T) -> Self {
        Self::new(width, height, vec![value; width * height])
    }

    #[inline]
    pub fn fill(&mut self, value: T) {
        self.pixels.fill(value);
    }
}

impl<T> Index<(usize, usize)> for PixelPlane<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        &self.pixels[y * self.width + x]
    }
}

impl<T> IndexMut<(usize, usize)> for PixelPlane<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        &mut self.pixels[y * self.width + x]
    }
}
