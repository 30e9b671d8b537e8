//! Kaiser - coaddition of aligned astronomical exposures.
//!
//! Each exposure is convolved with its own PSF, weighted by its inverse noise
//! variance and summed into a coadd together with a per-pixel depth map. Pixels
//! that no input reached are flagged `EDGE` at the end of the run.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use kaiser::{Coadd, CoaddConfig, CoaddInput, DirectConvolver, KaiserCoadd, NearestRemapper};
//!
//! let coadd = Coadd::blank(2048, 2048, (0, 0), Some(coadd_wcs));
//! let kaiser = KaiserCoadd::new(CoaddConfig::default(), coadd, NearestRemapper, DirectConvolver)?;
//! let inputs = exposures.into_iter().map(|(name, exposure, psf)| CoaddInput::new(name, exposure, psf));
//! let result = kaiser.run(inputs)?;
//!
//! println!("{} added, {} skipped", result.report.added, result.report.skipped.len());
//! ```

pub mod accumulate;
mod coadd;
pub mod component;
pub mod convolve;
mod driver;
pub mod edge;
mod error;
pub mod image;
pub mod psf;
pub mod remap;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;

// ============================================================================
// Errors
// ============================================================================

pub use error::{ConvolutionError, Error, Result};

// ============================================================================
// Image data model
// ============================================================================

pub use image::{
    BBox, DepthMap, DepthPixel, Dimensions, Exposure, MaskPixel, MaskPlane, MaskedImage, Pixel,
    PixelPlane, TanWcs, VariancePixel,
};

// ============================================================================
// Core operations
// ============================================================================

pub use accumulate::{add_to_coadd, add_to_masked_image};
pub use component::{CoaddComponent, ComponentBuilder, Diagnostic, NoiseSource};
pub use edge::set_coadd_edge_bits;
pub use stats::{median_binapprox, median_binapprox_plane};

// ============================================================================
// Kernels and collaborators
// ============================================================================

pub use convolve::{Convolver, DirectConvolver};
pub use psf::{KernelImage, PsfKernel, SpatialKernel};
pub use remap::{IdentityRemapper, NearestRemapper, RemapTarget, Remapper};

// ============================================================================
// Coadd and driver
// ============================================================================

pub use coadd::{Coadd, CoaddMetadata};
pub use driver::{
    CoaddConfig, CoaddInput, CoaddReport, CoaddResult, ExposureDiagnostic, KaiserCoadd,
    SkippedExposure,
};
