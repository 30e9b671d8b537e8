//! Coadd components: one exposure blurred by its own PSF, with its inverse-variance weight.

use serde::{Deserialize, Serialize};

use crate::convolve::Convolver;
use crate::error::{Error, Result};
use crate::image::{Exposure, Pixel};
use crate::psf::{KernelImage, PsfKernel};
use crate::stats::{self, DEFAULT_N_BINS};

/// Where the per-exposure noise level `sigma^2` comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseSource {
    /// Median of the variance plane over pixels with a clear mask.
    #[default]
    Variance,
    /// Square of the robust (MAD-based) spread of the background-subtracted image,
    /// over pixels with a clear mask. For inputs without a trustworthy variance plane.
    ImageSpread,
}

/// Non-fatal conditions met while building a component.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A spatially varying PSF was replaced by its realization at `(x, y)`.
    SpatiallyVaryingPsfCoerced { x: f64, y: f64 },
}

/// Settings for [`ComponentBuilder::build`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentBuilder {
    pub n_bins: usize,
    pub normalize_psf: bool,
    pub noise_source: NoiseSource,
}

impl Default for ComponentBuilder {
    fn default() -> Self {
        Self {
            n_bins: DEFAULT_N_BINS,
            normalize_psf: true,
            noise_source: NoiseSource::Variance,
        }
    }
}

/// An exposure convolved with its own PSF, plus weight `1 / sigma^2`.
///
/// Built per exposure and handed straight to the accumulator.
#[derive(Debug)]
pub struct CoaddComponent {
    blurred: Exposure<f64>,
    sigma_sq: f64,
    weight: f64,
    blurred_psf: KernelImage,
    diagnostics: Vec<Diagnostic>,
}

impl ComponentBuilder {
    pub fn new(normalize_psf: bool) -> Self {
        Self {
            normalize_psf,
            ..Self::default()
        }
    }

    /// Builds the component of a background-subtracted exposure.
    ///
    /// # Errors
    /// - [`Error::EmptyInput`] when every pixel is masked.
    /// - [`Error::DegenerateNoise`] when `sigma^2` is not positive and finite.
    /// - [`Error::UnsupportedKernel`] for a spatially varying PSF without `normalize_psf`.
    /// - [`Error::Convolution`] from the convolver or kernel normalization.
    pub fn build<T: Pixel, C: Convolver>(
        &self,
        exposure: &Exposure<T>,
        psf: &PsfKernel,
        convolver: &C,
    ) -> Result<CoaddComponent> {
        let sigma_sq = self.noise_variance(exposure)?;
        if !(sigma_sq.is_finite() && sigma_sq > 0.0) {
            return Err(Error::DegenerateNoise { sigma_sq });
        }

        let masked_image = exposure.masked_image();
        let (kernel, diagnostic) = psf.resolve(self.normalize_psf)?;
        let mut diagnostics = Vec::new();
        if let Some(diagnostic) = diagnostic {
            let Diagnostic::SpatiallyVaryingPsfCoerced { x, y } = diagnostic;
            tracing::warn!(
                x,
                y,
                "Ignoring spatial variation of the PSF, using its realization at the kernel midpoint"
            );
            diagnostics.push(diagnostic);
        }

        let blurred = convolver.convolve(masked_image, &kernel)?;
        let blurred_psf = kernel.auto_correlation();
        let weight = 1.0 / sigma_sq;

        tracing::debug!(
            sigma_sq,
            weight,
            kernel_width = kernel.width(),
            kernel_height = kernel.height(),
            spatially_varying = psf.is_spatially_varying(),
            "Built coadd component"
        );

        Ok(CoaddComponent {
            blurred: Exposure::new(blurred, exposure.wcs().copied()),
            sigma_sq,
            weight,
            blurred_psf,
            diagnostics,
        })
    }

    fn noise_variance<T: Pixel>(&self, exposure: &Exposure<T>) -> Result<f64> {
        let mi = exposure.masked_image();
        match self.noise_source {
            NoiseSource::Variance => {
                stats::masked_variance_median(mi.variance(), mi.mask(), self.n_bins)
            }
            NoiseSource::ImageSpread => {
                let sigma = stats::masked_robust_sigma(mi.image(), mi.mask(), self.n_bins)?;
                Ok(sigma * sigma)
            }
        }
    }
}

impl CoaddComponent {
    #[inline]
    pub fn blurred_exposure(&self) -> &Exposure<f64> {
        &self.blurred
    }

    /// Per-exposure noise variance the weight was derived from.
    #[inline]
    pub fn sigma_sq(&self) -> f64 {
        self.sigma_sq
    }

    #[inline]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// PSF auto-correlation: this exposure's contribution to the coadd PSF.
    #[inline]
    pub fn blurred_psf(&self) -> &KernelImage {
        &self.blurred_psf
    }

    #[inline]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Consumes the component, returning the blurred exposure scaled by its weight.
    pub fn into_weighted_exposure(self) -> Exposure<f64> {
        let mut exposure = self.blurred;
        exposure.scale(self.weight);
        exposure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convolve::DirectConvolver;
    use crate::error::ConvolutionError;
    use crate::image::{Dimensions, MaskPlane, MaskedImage, PixelPlane};
    use crate::psf::SpatialKernel;
    use crate::testing::{exposure_from_fn, noise_exposure, small_kernel, test_wcs};

    fn build(
        exposure: &Exposure<f32>,
        psf: &PsfKernel,
        builder: ComponentBuilder,
    ) -> Result<CoaddComponent> {
        builder.build(exposure, psf, &DirectConvolver)
    }

    #[test]
    fn test_weight_is_inverse_variance() {
        let exposure = exposure_from_fn(8, 8, 4.0, |x, y| (x + y) as f32);
        let component = build(&exposure, &small_kernel().into(), ComponentBuilder::default()).unwrap();
        assert!((component.sigma_sq() - 4.0).abs() < 1e-9);
        assert!((component.weight() - 0.25).abs() < 1e-9);
        assert!(component.diagnostics().is_empty());
    }

    #[test]
    fn test_all_zero_variance_is_degenerate() {
        let exposure = exposure_from_fn(6, 6, 0.0, |_, _| 1.0);
        let result = build(&exposure, &small_kernel().into(), ComponentBuilder::default());
        assert_eq!(result.unwrap_err(), Error::DegenerateNoise { sigma_sq: 0.0 });
    }

    #[test]
    fn test_fully_masked_exposure_has_no_noise_estimate() {
        let mut exposure = exposure_from_fn(4, 4, 1.0, |_, _| 1.0);
        exposure
            .masked_image_mut()
            .mask_mut()
            .fill(MaskPlane::Bad.bit());
        let result = build(&exposure, &small_kernel().into(), ComponentBuilder::default());
        assert_eq!(result.unwrap_err(), Error::EmptyInput);
    }

    #[test]
    fn test_masked_pixels_do_not_bias_sigma() {
        let mut exposure = exposure_from_fn(10, 10, 2.0, |_, _| 0.0);
        {
            let (_, mask, variance) = exposure.masked_image_mut().planes_mut();
            for x in 0..10 {
                for y in 0..6 {
                    variance[(x, y)] = 1e6;
                    mask[(x, y)] = MaskPlane::Sat.bit();
                }
            }
        }
        let component = build(&exposure, &small_kernel().into(), ComponentBuilder::default()).unwrap();
        assert!((component.sigma_sq() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_image_spread_noise_source() {
        let exposure = noise_exposure(128, 128, 3.0, 21);
        let builder = ComponentBuilder {
            noise_source: NoiseSource::ImageSpread,
            ..ComponentBuilder::default()
        };
        let component = build(&exposure, &small_kernel().into(), builder).unwrap();
        assert!(
            (component.sigma_sq() - 9.0).abs() < 0.5,
            "sigma_sq = {}",
            component.sigma_sq()
        );
    }

    #[test]
    fn test_blurred_exposure_keeps_wcs_and_shape() {
        let exposure = noise_exposure(9, 7, 1.0, 3);
        let component = build(&exposure, &small_kernel().into(), ComponentBuilder::default()).unwrap();
        let blurred = component.blurred_exposure();
        assert_eq!(blurred.wcs(), Some(&test_wcs()));
        assert_eq!(blurred.masked_image().dimensions(), Dimensions::new(9, 7));
        assert_eq!(component.blurred_psf().dimensions(), Dimensions::new(5, 5));
        assert!((component.blurred_psf().sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_psf_controls_kernel_scale() {
        let exposure = exposure_from_fn(5, 5, 1.0, |_, _| 1.0);
        let raw = KernelImage::new(1, 1, vec![3.0]);

        let normalized = build(&exposure, &raw.clone().into(), ComponentBuilder::new(true)).unwrap();
        assert!((normalized.blurred_exposure().masked_image().image()[(2, 2)] - 1.0).abs() < 1e-12);

        let unnormalized = build(&exposure, &raw.into(), ComponentBuilder::new(false)).unwrap();
        assert!((unnormalized.blurred_exposure().masked_image().image()[(2, 2)] - 3.0).abs() < 1e-12);
        assert!((unnormalized.blurred_psf().get(0, 0) - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_spatially_varying_psf_is_coerced_with_diagnostic() {
        // The position depends on the kernel, not on where the exposure sits.
        let exposure = exposure_from_fn(7, 5, 1.0, |_, _| 1.0);
        let mut shifted = exposure_from_fn(7, 5, 1.0, |_, _| 1.0);
        shifted.masked_image_mut().set_origin(100, -40);
        let psf = PsfKernel::SpatiallyVarying(SpatialKernel::new(5, 3, |_| small_kernel()));
        for exposure in [&exposure, &shifted] {
            let component = build(exposure, &psf, ComponentBuilder::new(true)).unwrap();
            assert_eq!(
                component.diagnostics(),
                &[Diagnostic::SpatiallyVaryingPsfCoerced { x: 2.0, y: 1.0 }]
            );
        }
    }

    #[test]
    fn test_spatially_varying_psf_without_normalize_is_rejected() {
        let exposure = exposure_from_fn(7, 5, 1.0, |_, _| 1.0);
        let psf = PsfKernel::SpatiallyVarying(SpatialKernel::new(3, 3, |_| small_kernel()));
        let result = build(&exposure, &psf, ComponentBuilder::new(false));
        assert!(matches!(result, Err(Error::UnsupportedKernel(_))));
    }

    #[test]
    fn test_kernel_too_large_propagates() {
        let exposure = exposure_from_fn(4, 4, 1.0, |_, _| 1.0);
        let result = build(&exposure, &KernelImage::gaussian(2.0).into(), ComponentBuilder::default());
        assert!(matches!(
            result,
            Err(Error::Convolution(ConvolutionError::KernelTooLarge { .. }))
        ));
    }

    #[test]
    fn test_weighted_exposure_scales_image_and_variance() {
        let image = PixelPlane::new_filled(3, 3, 2.0f32);
        let exposure = Exposure::new(MaskedImage::from_image(image, 4.0), None);
        let component = build(&exposure, &KernelImage::delta().into(), ComponentBuilder::default()).unwrap();
        let weighted = component.into_weighted_exposure();
        let mi = weighted.masked_image();
        assert!(mi.image().iter().all(|&v| (v - 0.5).abs() < 1e-12));
        assert!(mi.variance().iter().all(|&v| (v - 0.25).abs() < 1e-6));
        assert!(weighted.wcs().is_none());
    }
}
