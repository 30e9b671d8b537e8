//! PSF kernels: fixed kernel images and spatially varying models.
//!
//! A [`KernelImage`] is a small `f64` image with a center pixel. Kernels are
//! applied as true convolutions by the [`crate::convolve`] module, so the
//! center pixel is the one that lands on the output pixel.


use std::fmt;
use std::sync::Arc;

use glam::DVec2;

use crate::component::Diagnostic;
use crate::error::{ConvolutionError, Error, Result};
use crate::image::Dimensions;

/// Fixed kernel image with its center pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelImage {
    values: Vec<f64>,
    width: usize,
    height: usize,
    ctr_x: usize,
    ctr_y: usize,
}

impl KernelImage {
    /// Kernel centered at `((width - 1) / 2, (height - 1) / 2)`.
    pub fn new(width: usize, height: usize, values: Vec<f64>) -> Self {
        assert_eq!(
            values.len(),
            width * height,
            "kernel values length must equal width * height"
        );
        Self {
            values,
            width,
            height,
            ctr_x: width.saturating_sub(1) / 2,
            ctr_y: height.saturating_sub(1) / 2,
        }
    }

    pub fn with_center(mut self, ctr_x: usize, ctr_y: usize) -> Self {
        assert!(
            ctr_x < self.width && ctr_y < self.height,
            "kernel center must lie inside the kernel"
        );
        self.ctr_x = ctr_x;
        self.ctr_y = ctr_y;
        self
    }

    /// Samples `f(dx, dy)` at each pixel, with `(dx, dy)` the offset from the center.
    pub fn from_fn(width: usize, height: usize, f: impl Fn(f64, f64) -> f64) -> Self {
        let ctr_x = width.saturating_sub(1) / 2;
        let ctr_y = height.saturating_sub(1) / 2;
        let mut values = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                values.push(f(x as f64 - ctr_x as f64, y as f64 - ctr_y as f64));
            }
        }
        Self::new(width, height, values)
    }

    /// 1x1 identity kernel.
    pub fn delta() -> Self {
        Self::new(1, 1, vec![1.0])
    }

    /// Unit-sum circular Gaussian of radius `ceil(3 * sigma)`.
    pub fn gaussian(sigma: f64) -> Self {
        Self::double_gaussian(sigma, sigma, 0.0)
    }

    /// Core Gaussian plus `ampl2` times a wing Gaussian, normalized to unit sum.
    ///
    /// `f(r) = exp(-r^2 / 2 sigma1^2) + ampl2 * exp(-r^2 / 2 sigma2^2)`
    pub fn double_gaussian(sigma1: f64, sigma2: f64, ampl2: f64) -> Self {
        assert!(sigma1 > 0.0, "Sigma must be positive");
        assert!(sigma2 > 0.0 || ampl2 == 0.0, "Wing sigma must be positive");

        let radius = (3.0 * sigma1.max(sigma2)).ceil() as usize;
        let size = 2 * radius + 1;
        let two_s1 = 2.0 * sigma1 * sigma1;
        let two_s2 = 2.0 * sigma2 * sigma2;
        let kernel = Self::from_fn(size, size, |dx, dy| {
            let r2 = dx * dx + dy * dy;
            let wing = if ampl2 == 0.0 {
                0.0
            } else {
                ampl2 * (-r2 / two_s2).exp()
            };
            (-r2 / two_s1).exp() + wing
        });

        let sum = kernel.sum();
        Self {
            values: kernel.values.iter().map(|v| v / sum).collect(),
            ..kernel
        }
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
    pub fn center(&self) -> (usize, usize) {
        (self.ctr_x, self.ctr_y)
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.values[y * self.width + x]
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Copy scaled to unit sum.
    ///
    /// # Errors
    /// [`ConvolutionError::EmptyKernel`] for a kernel without pixels,
    /// [`ConvolutionError::ZeroKernelSum`] when the sum is zero or not finite.
    pub fn normalized(&self) -> std::result::Result<Self, ConvolutionError> {
        if self.is_empty() {
            return Err(ConvolutionError::EmptyKernel);
        }
        let sum = self.sum();
        if !sum.is_finite() || sum.abs() < f64::MIN_POSITIVE {
            return Err(ConvolutionError::ZeroKernelSum { sum });
        }
        Ok(Self {
            values: self.values.iter().map(|v| v / sum).collect(),
            ..self.clone()
        })
    }

    /// Element-wise square, the kernel that propagates variance.
    pub fn squared(&self) -> Self {
        Self {
            values: self.values.iter().map(|v| v * v).collect(),
            ..self.clone()
        }
    }

    /// The kernel convolved with its own reflection.
    ///
    /// The result is `(2w - 1) x (2h - 1)`, centered at `(w - 1, h - 1)`, the zero lag.
    /// This is the PSF an exposure contributes to a Kaiser coadd.
    pub fn auto_correlation(&self) -> Self {
        let (w, h) = (self.width as isize, self.height as isize);
        if w == 0 || h == 0 {
            return self.clone();
        }
        let out_w = (2 * w - 1) as usize;
        let out_h = (2 * h - 1) as usize;
        let mut values = vec![0.0; out_w * out_h];

        for (oy, row) in values.chunks_exact_mut(out_w).enumerate() {
            let dy = oy as isize - (h - 1);
            for (ox, out) in row.iter_mut().enumerate() {
                let dx = ox as isize - (w - 1);
                let mut acc = 0.0;
                for y in 0isize.max(-dy)..h.min(h - dy) {
                    for x in 0isize.max(-dx)..w.min(w - dx) {
                        acc += self.get(x as usize, y as usize)
                            * self.get((x + dx) as usize, (y + dy) as usize);
                    }
                }
                *out = acc;
            }
        }

        Self {
            values,
            width: out_w,
            height: out_h,
            ctr_x: self.width - 1,
            ctr_y: self.height - 1,
        }
    }
}

/// PSF model whose kernel depends on the position in the exposure.
#[derive(Clone)]
pub struct SpatialKernel {
    dimensions: Dimensions,
    realize: Arc<dyn Fn(DVec2) -> KernelImage + Send + Sync>,
}

impl SpatialKernel {
    /// `realize(position)` must return kernels of size `width x height`.
    pub fn new(
        width: usize,
        height: usize,
        realize: impl Fn(DVec2) -> KernelImage + Send + Sync + 'static,
    ) -> Self {
        Self {
            dimensions: Dimensions::new(width, height),
            realize: Arc::new(realize),
        }
    }

    #[inline]
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Fixed kernel at a pixel position of the exposure.
    pub fn at(&self, position: DVec2) -> KernelImage {
        (self.realize)(position)
    }

    /// The kernel's own midpoint, `((w - 1) / 2, (h - 1) / 2)`, unrounded.
    pub fn midpoint(&self) -> DVec2 {
        DVec2::new(
            self.dimensions.width.saturating_sub(1) as f64 / 2.0,
            self.dimensions.height.saturating_sub(1) as f64 / 2.0,
        )
    }
}

impl fmt::Debug for SpatialKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialKernel")
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

/// A PSF kernel as handed over by the PSF modelling collaborator.
#[derive(Debug, Clone)]
pub enum PsfKernel {
    Fixed(KernelImage),
    SpatiallyVarying(SpatialKernel),
}

impl PsfKernel {
    pub fn dimensions(&self) -> Dimensions {
        match self {
            PsfKernel::Fixed(kernel) => kernel.dimensions(),
            PsfKernel::SpatiallyVarying(spatial) => spatial.dimensions(),
        }
    }

    pub fn is_spatially_varying(&self) -> bool {
        matches!(self, PsfKernel::SpatiallyVarying(_))
    }

    /// The fixed kernel to convolve with.
    ///
    /// With `normalize` the kernel is scaled to unit sum. A spatially varying kernel is
    /// then collapsed to its realization at its own midpoint, which is reported through
    /// [`Diagnostic::SpatiallyVaryingPsfCoerced`]. Without `normalize` a spatially
    /// varying kernel is rejected with [`Error::UnsupportedKernel`].
    pub fn resolve(&self, normalize: bool) -> Result<(KernelImage, Option<Diagnostic>)> {
        match (self, normalize) {
            (PsfKernel::Fixed(kernel), false) => {
                if kernel.is_empty() {
                    return Err(ConvolutionError::EmptyKernel.into());
                }
                Ok((kernel.clone(), None))
            }
            (PsfKernel::Fixed(kernel), true) => Ok((kernel.normalized()?, None)),
            (PsfKernel::SpatiallyVarying(spatial), true) => {
                let center = spatial.midpoint();
                let kernel = spatial.at(center).normalized()?;
                let diagnostic = Diagnostic::SpatiallyVaryingPsfCoerced {
                    x: center.x,
                    y: center.y,
                };
                Ok((kernel, Some(diagnostic)))
            }
            (PsfKernel::SpatiallyVarying(_), false) => Err(Error::UnsupportedKernel(
                "spatially varying PSF requires normalize_psf to collapse it to a fixed kernel"
                    .to_string(),
            )),
        }
    }
}

impl From<KernelImage> for PsfKernel {
    fn from(kernel: KernelImage) -> Self {
        PsfKernel::Fixed(kernel)
    }
}
