use super::{MaskedImage, Pixel, TanWcs};

/// One exposure: pixel data plus the sky mapping of its pixel grid.
///
/// Not `Clone`: exposures are moved or borrowed, never duplicated implicitly.
#[derive(Debug)]
pub struct Exposure<T> {
    masked_image: MaskedImage<T>,
    wcs: Option<TanWcs>,
}

impl<T: Pixel> Exposure<T> {
    pub fn new(masked_image: MaskedImage<T>, wcs: Option<TanWcs>) -> Self {
        Self { masked_image, wcs }
    }

    /// Zero-filled exposure, used to start a coadd.
    pub fn blank(width: usize, height: usize, wcs: Option<TanWcs>) -> Self {
        Self::new(MaskedImage::blank(width, height), wcs)
    }

    #[inline]
    pub fn masked_image(&self) -> &MaskedImage<T> {
        &self.masked_image
    }

    #[inline]
    pub fn masked_image_mut(&mut self) -> &mut MaskedImage<T> {
        &mut self.masked_image
    }

    pub fn into_masked_image(self) -> MaskedImage<T> {
        self.masked_image
    }

    #[inline]
    pub fn wcs(&self) -> Option<&TanWcs> {
        self.wcs.as_ref()
    }

    pub fn set_wcs(&mut self, wcs: Option<TanWcs>) {
        self.wcs = wcs;
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.masked_image.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.masked_image.height()
    }

    /// Removes a constant sky level in place.
    pub fn subtract_background(&mut self, sky: f64) {
        if sky != 0.0 {
            self.masked_image.subtract(sky);
        }
    }

    /// Scales pixel values (and variance quadratically) in place.
    pub fn scale(&mut self, factor: f64) {
        self.masked_image.scale(factor);
    }
}
