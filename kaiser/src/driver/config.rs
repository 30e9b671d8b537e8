//! Coaddition run settings.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::coadd::Coadd;
use crate::component::{ComponentBuilder, NoiseSource};
use crate::error::{Error, Result};
use crate::image::{Exposure, MaskPixel, MaskPlane, Pixel};
use crate::stats::DEFAULT_N_BINS;

const ALL_BITS: MaskPixel = 0xFFFF;

/// Settings for one coaddition run.
///
/// Missing fields take their defaults when deserialized, so a config file only
/// needs to list what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoaddConfig {
    /// Histogram size of the binapprox noise estimate (>= 2).
    pub n_bins: usize,
    /// Scale PSF kernels to unit sum before convolving.
    pub normalize_psf: bool,
    /// Input pixels with any of these mask bits set are not accumulated.
    pub bad_pixel_mask: MaskPixel,
    /// Mask planes allowed into the coadd, e.g. `[SAT, INTRP]`. When set, every other
    /// bit of the 16-bit mask is bad and `bad_pixel_mask` must be left at its default.
    pub allowed_mask_planes: Option<Vec<MaskPlane>>,
    pub noise_source: NoiseSource,
    /// Coadd pixels per exposure pixel when the coadd grid is derived from an exposure.
    pub resolution_factor: f64,
    /// Build partial coadds on the rayon pool and merge them.
    pub parallel: bool,
}

impl Default for CoaddConfig {
    fn default() -> Self {
        Self {
            n_bins: DEFAULT_N_BINS,
            normalize_psf: true,
            bad_pixel_mask: ALL_BITS,
            allowed_mask_planes: None,
            noise_source: NoiseSource::Variance,
            resolution_factor: 1.0,
            parallel: false,
        }
    }
}

impl CoaddConfig {
    /// # Errors
    /// [`Error::InvalidConfig`] when `n_bins < 2`, when `resolution_factor` is not
    /// positive, or when both `bad_pixel_mask` and `allowed_mask_planes` are given.
    pub fn validate(&self) -> Result<()> {
        if self.n_bins < 2 {
            return Err(Error::InvalidConfig(format!(
                "n_bins must be at least 2, got {}",
                self.n_bins
            )));
        }
        if !(self.resolution_factor.is_finite() && self.resolution_factor > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "resolution_factor must be positive, got {}",
                self.resolution_factor
            )));
        }
        if self.allowed_mask_planes.is_some() && self.bad_pixel_mask != ALL_BITS {
            return Err(Error::InvalidConfig(
                "set either bad_pixel_mask or allowed_mask_planes, not both".to_string(),
            ));
        }
        Ok(())
    }

    /// Mask bits that keep an input pixel out of the coadd.
    pub fn effective_bad_pixel_mask(&self) -> MaskPixel {
        match &self.allowed_mask_planes {
            Some(allowed) => ALL_BITS & !MaskPlane::mask_of(allowed),
            None => self.bad_pixel_mask,
        }
    }

    /// Blank coadd on the grid of `exposure`, scaled by `resolution_factor`.
    pub fn blank_coadd_for<T: Pixel>(&self, exposure: &Exposure<T>) -> Result<Coadd> {
        Coadd::blank_from_exposure(exposure, self.resolution_factor)
    }

    /// Reads a YAML or JSON config (chosen by file extension) and validates it.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: Self = common::serde::load_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn component_builder(&self) -> ComponentBuilder {
        ComponentBuilder {
            n_bins: self.n_bins,
            normalize_psf: self.normalize_psf,
            noise_source: self.noise_source,
        }
    }
}
