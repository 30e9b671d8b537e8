use super::{BBox, Dimensions, MaskPixel, Pixel, PixelPlane, VariancePixel};
use crate::error::Result;

/// Image, mask and variance planes sharing one size and origin.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedImage<T> {
    image: PixelPlane<T>,
    mask: PixelPlane<MaskPixel>,
    variance: PixelPlane<VariancePixel>,
}

impl<T: Pixel> MaskedImage<T> {
    /// Zero-filled masked image with origin `(0, 0)`.
    pub fn blank(width: usize, height: usize) -> Self {
        Self {
            image: PixelPlane::new_filled(width, height, T::zero()),
            mask: PixelPlane::new_filled(width, height, 0),
            variance: PixelPlane::new_filled(width, height, 0.0),
        }
    }

    /// Assembles a masked image from planes; the mask and variance take the image's origin.
    pub fn new(
        image: PixelPlane<T>,
        mut mask: PixelPlane<MaskPixel>,
        mut variance: PixelPlane<VariancePixel>,
    ) -> Result<Self> {
        image.check_dimensions(&mask, "mask plane")?;
        image.check_dimensions(&variance, "variance plane")?;
        let (x0, y0) = image.origin();
        mask.set_origin(x0, y0);
        variance.set_origin(x0, y0);
        Ok(Self {
            image,
            mask,
            variance,
        })
    }

    /// Image plane with an empty mask and constant variance.
    pub fn from_image(image: PixelPlane<T>, variance: VariancePixel) -> Self {
        let (x0, y0) = image.origin();
        let (w, h) = (image.width(), image.height());
        Self {
            image,
            mask: PixelPlane::new_filled(w, h, 0).with_origin(x0, y0),
            variance: PixelPlane::new_filled(w, h, variance).with_origin(x0, y0),
        }
    }

    pub fn with_origin(mut self, x0: i64, y0: i64) -> Self {
        self.set_origin(x0, y0);
        self
    }

    pub fn set_origin(&mut self, x0: i64, y0: i64) {
        self.image.set_origin(x0, y0);
        self.mask.set_origin(x0, y0);
        self.variance.set_origin(x0, y0);
    }

    #[inline]
    pub fn origin(&self) -> (i64, i64) {
        self.image.origin()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.image.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.image.height()
    }

    #[inline]
    pub fn dimensions(&self) -> Dimensions {
        self.image.dimensions()
    }

    #[inline]
    pub fn bbox(&self) -> BBox {
        self.image.bbox()
    }

    #[inline]
    pub fn image(&self) -> &PixelPlane<T> {
        &self.image
    }

    #[inline]
    pub fn mask(&self) -> &PixelPlane<MaskPixel> {
        &self.mask
    }

    #[inline]
    pub fn variance(&self) -> &PixelPlane<VariancePixel> {
        &self.variance
    }

    #[inline]
    pub fn image_mut(&mut self) -> &mut PixelPlane<T> {
        &mut self.image
    }

    #[inline]
    pub fn mask_mut(&mut self) -> &mut PixelPlane<MaskPixel> {
        &mut self.mask
    }

    #[inline]
    pub fn variance_mut(&mut self) -> &mut PixelPlane<VariancePixel> {
        &mut self.variance
    }

    /// Mutable access to all three planes at once.
    #[inline]
    pub fn planes_mut(
        &mut self,
    ) -> (
        &mut PixelPlane<T>,
        &mut PixelPlane<MaskPixel>,
        &mut PixelPlane<VariancePixel>,
    ) {
        (&mut self.image, &mut self.mask, &mut self.variance)
    }

    /// Subtracts a constant from the image plane; mask and variance are unchanged.
    pub fn subtract(&mut self, value: f64) {
        let value = T::from_f64_value(value);
        self.image.iter_mut().for_each(|p| *p = *p - value);
    }

    /// Multiplies the image by `factor` and the variance by `factor^2`.
    pub fn scale(&mut self, factor: f64) {
        let image_factor = T::from_f64_value(factor);
        let variance_factor = (factor * factor) as VariancePixel;
        self.image.iter_mut().for_each(|p| *p = *p * image_factor);
        self.variance
            .iter_mut()
            .for_each(|v| *v *= variance_factor);
    }
}
