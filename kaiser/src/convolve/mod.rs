//! Masked-image convolution.
//!
//! [`Convolver`] is the seam the component builder convolves through; [`DirectConvolver`]
//! is the stock implementation, a direct 2D convolution parallelized over rows.
//!
//! Output pixel `(x, y)` is `sum_{i,j} k[i, j] * in[x + cx - i, y + cy - j]` where
//! `(cx, cy)` is the kernel center. The variance plane is convolved with `k^2` and the
//! mask is OR-ed over the non-zero part of the kernel footprint. Pixels whose
//! footprint leaves the image are zeroed and flagged `EDGE`.

#[cfg(test)]
mod tests;

use rayon::prelude::*;

use crate::error::ConvolutionError;
use crate::image::{MaskPixel, MaskPlane, MaskedImage, Pixel, VariancePixel};
use crate::psf::KernelImage;

/// A 2D convolution primitive for masked images.
pub trait Convolver: Sync {
    /// Convolves all three planes of `input`; the output keeps the input's size and origin.
    fn convolve<T: Pixel>(
        &self,
        input: &MaskedImage<T>,
        kernel: &KernelImage,
    ) -> Result<MaskedImage<f64>, ConvolutionError>;
}

/// Direct (non-FFT) convolution, one rayon task per output row.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectConvolver;

impl Convolver for DirectConvolver {
    fn convolve<T: Pixel>(
        &self,
        input: &MaskedImage<T>,
        kernel: &KernelImage,
    ) -> Result<MaskedImage<f64>, ConvolutionError> {
        if kernel.is_empty() {
            return Err(ConvolutionError::EmptyKernel);
        }
        let (width, height) = (input.width(), input.height());
        if kernel.width() > width || kernel.height() > height {
            return Err(ConvolutionError::KernelTooLarge {
                kernel: kernel.dimensions(),
                image: input.dimensions(),
            });
        }

        let (cx, cy) = kernel.center();
        let (kw, kh) = (kernel.width(), kernel.height());
        // Output pixels whose whole footprint lies inside the input.
        let x_range = (kw - 1 - cx)..(width - cx);
        let y_range = (kh - 1 - cy)..(height - cy);

        let squared = kernel.squared();
        let taps: Vec<Tap> = (0..kh)
            .flat_map(|ky| (0..kw).map(move |kx| (kx, ky)))
            .filter_map(|(kx, ky)| {
                let k = kernel.get(kx, ky);
                (k != 0.0).then(|| Tap {
                    kx,
                    ky,
                    k,
                    k_sq: squared.get(kx, ky),
                })
            })
            .collect();

        let (x0, y0) = input.origin();
        let mut output = MaskedImage::<f64>::blank(width, height).with_origin(x0, y0);
        let (out_image, out_mask, out_variance) = output.planes_mut();

        let in_image = input.image();
        let in_mask = input.mask();
        let in_variance = input.variance();
        let edge = MaskPlane::Edge.bit();

        out_image
            .pixels_mut()
            .par_chunks_mut(width)
            .zip(out_mask.pixels_mut().par_chunks_mut(width))
            .zip(out_variance.pixels_mut().par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, ((image_row, mask_row), variance_row))| {
                if !y_range.contains(&y) {
                    mask_row.fill(edge);
                    return;
                }
                for x in 0..width {
                    if !x_range.contains(&x) {
                        mask_row[x] = edge;
                        continue;
                    }
                    let mut sum = 0.0f64;
                    let mut var = 0.0f64;
                    let mut mask: MaskPixel = 0;
                    for tap in &taps {
                        let sx = x + cx - tap.kx;
                        let sy = y + cy - tap.ky;
                        sum += tap.k * in_image.get(sx, sy).as_f64();
                        var += tap.k_sq * *in_variance.get(sx, sy) as f64;
                        mask |= *in_mask.get(sx, sy);
                    }
                    image_row[x] = sum;
                    variance_row[x] = var as VariancePixel;
                    mask_row[x] = mask;
                }
            });

        Ok(output)
    }
}

#[derive(Debug, Clone, Copy)]
struct Tap {
    kx: usize,
    ky: usize,
    k: f64,
    k_sq: f64,
}
