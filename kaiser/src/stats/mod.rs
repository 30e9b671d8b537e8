//! Robust statistics without sorting: binapprox median and MAD-based spread.
//!
//! The median is located with a histogram instead of a sort (Tibshirani, "Fast
//! computation of the median by successive binning", 2008). The first pass bins the
//! data over `[mu - sigma, mu + sigma]`; the bin holding the median rank is then
//! re-binned until its width is at most `sigma / n_bins`, so the estimate is always
//! within `sigma / n_bins` of the exact median. Memory is `O(n_bins)` and each pass
//! is `O(n)`.


use crate::error::{Error, Result};
use crate::image::{MaskPixel, Pixel, PixelPlane, VariancePixel};

/// Typical histogram size.
pub const DEFAULT_N_BINS: usize = 1000;

/// MAD to standard deviation conversion factor for a normal distribution.
pub const MAD_TO_SIGMA: f64 = 1.482_602_218_505_602;

/// Re-binning passes stop here even if floating point refuses to narrow the bin further.
const MAX_REFINEMENTS: usize = 64;

/// Count, mean and population standard deviation of the finite values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub count: usize,
    pub mean: f64,
    pub sigma: f64,
}

/// Two-pass mean and population standard deviation, ignoring non-finite values.
pub fn moments<I>(values: I) -> Option<Moments>
where
    I: Iterator<Item = f64> + Clone,
{
    let mut count = 0usize;
    let mut sum = 0.0f64;
    for v in values.clone().filter(|v| v.is_finite()) {
        count += 1;
        sum += v;
    }
    if count == 0 {
        return None;
    }
    let mean = sum / count as f64;
    let sum_sq: f64 = values
        .filter(|v| v.is_finite())
        .map(|v| (v - mean) * (v - mean))
        .sum();
    Some(Moments {
        count,
        mean,
        sigma: (sum_sq / count as f64).sqrt(),
    })
}

/// Approximate median of the finite values yielded by `values`.
///
/// The iterator is walked several times, so it must be cheap to clone.
///
/// # Errors
/// [`Error::InvalidBinCount`] if `n_bins < 2`, [`Error::EmptyInput`] if there is no
/// finite value.
pub fn median_binapprox_iter<I>(values: I, n_bins: usize) -> Result<f64>
where
    I: Iterator<Item = f64> + Clone,
{
    if n_bins < 2 {
        return Err(Error::InvalidBinCount { n_bins });
    }
    let finite = values.filter(|v| v.is_finite());
    let Moments { count, mean, sigma } = moments(finite.clone()).ok_or(Error::EmptyInput)?;

    // With fewer than three values the median is the mean.
    if count < 3 || sigma == 0.0 || !sigma.is_finite() {
        return Ok(mean);
    }

    let target_width = sigma / n_bins as f64;
    let left = mean - sigma;
    let width = 2.0 * sigma / (n_bins - 1) as f64;

    if count % 2 == 1 {
        let rank = (count - 1) / 2;
        Ok(locate_rank(finite, rank, left, width, n_bins, target_width))
    } else {
        let lower = locate_rank(finite.clone(), count / 2 - 1, left, width, n_bins, target_width);
        let upper = locate_rank(finite, count / 2, left, width, n_bins, target_width);
        Ok((lower + upper) / 2.0)
    }
}

/// Approximate median of a slice of pixel values.
pub fn median_binapprox<T: Pixel>(values: &[T], n_bins: usize) -> Result<f64> {
    median_binapprox_iter(values.iter().map(|v| v.as_f64()), n_bins)
}

/// Approximate median of every pixel in a plane.
pub fn median_binapprox_plane<T: Pixel>(plane: &PixelPlane<T>, n_bins: usize) -> Result<f64> {
    median_binapprox(plane.pixels(), n_bins)
}

/// Approximate median of the variance of pixels whose mask is clear.
pub fn masked_variance_median(
    variance: &PixelPlane<VariancePixel>,
    mask: &PixelPlane<MaskPixel>,
    n_bins: usize,
) -> Result<f64> {
    variance.check_dimensions(mask, "mask plane")?;
    let good = variance
        .iter()
        .zip(mask.iter())
        .filter(|&(_, &m)| m == 0)
        .map(|(&v, _)| v as f64);
    median_binapprox_iter(good, n_bins)
}

/// Robust standard deviation `MAD_TO_SIGMA * MAD` of the pixels whose mask is clear.
///
/// Both the median and the median absolute deviation use the binapprox estimator.
pub fn masked_robust_sigma<T: Pixel>(
    image: &PixelPlane<T>,
    mask: &PixelPlane<MaskPixel>,
    n_bins: usize,
) -> Result<f64> {
    image.check_dimensions(mask, "mask plane")?;
    let good = image
        .iter()
        .zip(mask.iter())
        .filter(|&(_, &m)| m == 0)
        .map(|(&v, _)| v.as_f64());
    let median = median_binapprox_iter(good.clone(), n_bins)?;
    let mad = median_binapprox_iter(good.map(|v| (v - median).abs()), n_bins)?;
    Ok(MAD_TO_SIGMA * mad)
}

/// Value of the `rank`-th smallest element (0-based), to within half the final bin width.
///
/// Starts from `n_bins` bins of `width` beginning at `left`, then repeatedly re-bins the
/// bin that holds the rank into `n_bins` narrower bins until the width is at most
/// `target_width`. Values below the current bin are counted, not stored.
fn locate_rank<I>(
    values: I,
    rank: usize,
    mut left: f64,
    mut width: f64,
    n_bins: usize,
    target_width: f64,
) -> f64
where
    I: Iterator<Item = f64> + Clone,
{
    let mut counts = vec![0usize; n_bins];

    for _ in 0..MAX_REFINEMENTS {
        let right = left + width * n_bins as f64;
        let scale = 1.0 / width;
        counts.fill(0);
        let mut below = 0usize;
        for v in values.clone() {
            if v < left {
                below += 1;
            } else if v < right {
                let bin = (((v - left) * scale) as usize).min(n_bins - 1);
                counts[bin] += 1;
            }
        }

        let Some(bin) = find_rank_bin(&counts, below, rank) else {
            // Rounding pushed the rank out of the binned range.
            return if below > rank { left } else { right };
        };

        if width <= target_width {
            return left + (bin as f64 + 0.5) * width;
        }

        let next_left = left + bin as f64 * width;
        let next_width = width / n_bins as f64;
        if next_width <= 0.0 || next_left + next_width * n_bins as f64 == next_left {
            return left + (bin as f64 + 0.5) * width;
        }
        left = next_left;
        width = next_width;
    }

    left + 0.5 * width * n_bins as f64
}

/// Index of the bin holding the `rank`-th value, counting `below` values left of bin 0.
fn find_rank_bin(counts: &[usize], below: usize, rank: usize) -> Option<usize> {
    if below > rank {
        return None;
    }
    let mut cumulative = below;
    for (i, &c) in counts.iter().enumerate() {
        if cumulative + c > rank {
            return Some(i);
        }
        cumulative += c;
    }
    None
}
