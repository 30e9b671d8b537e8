//! Error types for coaddition.

use thiserror::Error;

use crate::image::Dimensions;

/// Failures reported by a convolution primitive.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvolutionError {
    #[error("Kernel {kernel:?} does not fit inside image {image:?}")]
    KernelTooLarge {
        kernel: Dimensions,
        image: Dimensions,
    },

    #[error("Kernel has no pixels")]
    EmptyKernel,

    #[error("Kernel sums to {sum}, cannot normalize")]
    ZeroKernelSum { sum: f64 },
}

/// Errors that can occur while estimating statistics, building components or accumulating.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("No usable pixels to compute statistics from")]
    EmptyInput,

    #[error("Number of histogram bins must be at least 2, got {n_bins}")]
    InvalidBinCount { n_bins: usize },

    #[error("Noise estimate sigma^2 = {sigma_sq} is not a positive finite number")]
    DegenerateNoise { sigma_sq: f64 },

    #[error("Convolution failed: {0}")]
    Convolution(#[from] ConvolutionError),

    #[error("Unsupported PSF kernel: {0}")]
    UnsupportedKernel(String),

    #[error("Dimension mismatch for {what}: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: Dimensions,
        actual: Dimensions,
    },

    #[error("Remap failed: {0}")]
    Remap(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// True when the failure concerns a single input exposure, which the driver skips.
    ///
    /// Everything else points at a broken invariant and aborts the run.
    pub fn is_exposure_local(&self) -> bool {
        match self {
            Error::EmptyInput
            | Error::InvalidBinCount { .. }
            | Error::DegenerateNoise { .. }
            | Error::Convolution(_)
            | Error::UnsupportedKernel(_)
            | Error::Remap(_) => true,
            Error::DimensionMismatch { .. } | Error::InvalidConfig(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
