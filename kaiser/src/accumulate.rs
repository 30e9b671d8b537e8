//! Mask-aware accumulation of weighted inputs into a coadd.
//!
//! For every pixel where `input.mask & bad_pixel_mask == 0`:
//! image and variance are added, the input mask is OR-ed in and the depth is
//! incremented. Pixels flagged bad leave all coadd planes and the depth untouched,
//! so bad input bits never reach the coadd mask.
//!
//! Inputs are not weighted here; callers scale them beforehand.

use crate::error::{Error, Result};
use crate::image::{DepthMap, MaskPixel, MaskedImage, Pixel};

/// Adds `input` to `coadd` and counts contributing pixels in `depth`.
///
/// The planes are aligned by parent-frame position, so differing origins shift the
/// input relative to the coadd; pixels outside the overlap are ignored. `depth` is
/// indexed like the coadd.
///
/// Returns the number of input pixels that were added.
///
/// # Errors
/// [`Error::DimensionMismatch`] if `input` or `depth` differ in size from `coadd`.
pub fn add_to_coadd<C: Pixel, I: Pixel>(
    coadd: &mut MaskedImage<C>,
    depth: &mut DepthMap,
    input: &MaskedImage<I>,
    bad_pixel_mask: MaskPixel,
) -> Result<usize> {
    check_depth(coadd, depth)?;
    accumulate(coadd, Some(depth), input, bad_pixel_mask)
}

/// Same per-pixel rule as [`add_to_coadd`], without depth tracking.
pub fn add_to_masked_image<C: Pixel, I: Pixel>(
    coadd: &mut MaskedImage<C>,
    input: &MaskedImage<I>,
    bad_pixel_mask: MaskPixel,
) -> Result<usize> {
    accumulate(coadd, None, input, bad_pixel_mask)
}

fn check_depth<C: Pixel>(coadd: &MaskedImage<C>, depth: &DepthMap) -> Result<()> {
    if coadd.dimensions() != depth.dimensions() {
        return Err(Error::DimensionMismatch {
            what: "depth map",
            expected: coadd.dimensions(),
            actual: depth.dimensions(),
        });
    }
    Ok(())
}

fn accumulate<C: Pixel, I: Pixel>(
    coadd: &mut MaskedImage<C>,
    mut depth: Option<&mut DepthMap>,
    input: &MaskedImage<I>,
    bad_pixel_mask: MaskPixel,
) -> Result<usize> {
    if coadd.dimensions() != input.dimensions() {
        return Err(Error::DimensionMismatch {
            what: "input masked image",
            expected: coadd.dimensions(),
            actual: input.dimensions(),
        });
    }

    let Some(overlap) = coadd.bbox().intersect(&input.bbox()) else {
        tracing::debug!(
            coadd_origin = ?coadd.origin(),
            input_origin = ?input.origin(),
            "Input does not overlap the coadd"
        );
        return Ok(0);
    };

    let coadd_box = coadd.bbox();
    let input_box = input.bbox();
    let cx = (overlap.x0 - coadd_box.x0) as usize;
    let ix = (overlap.x0 - input_box.x0) as usize;
    let (image, mask, variance) = coadd.planes_mut();
    let n = overlap.width;
    let mut added = 0usize;

    for y in overlap.y0..overlap.y_end() {
        let cy = (y - coadd_box.y0) as usize;
        let iy = (y - input_box.y0) as usize;

        let in_image = &input.image().row(iy)[ix..ix + n];
        let in_mask = &input.mask().row(iy)[ix..ix + n];
        let in_variance = &input.variance().row(iy)[ix..ix + n];

        let out_image = &mut image.row_mut(cy)[cx..cx + n];
        let out_mask = &mut mask.row_mut(cy)[cx..cx + n];
        let out_variance = &mut variance.row_mut(cy)[cx..cx + n];
        let mut out_depth = depth.as_deref_mut().map(|d| &mut d.row_mut(cy)[cx..cx + n]);

        for i in 0..n {
            let m = in_mask[i];
            if m & bad_pixel_mask != 0 {
                continue;
            }
            out_image[i] += C::from_f64_value(in_image[i].as_f64());
            out_variance[i] += in_variance[i];
            out_mask[i] |= m;
            if let Some(d) = out_depth.as_deref_mut() {
                d[i] = d[i].saturating_add(1);
            }
            added += 1;
        }
    }

    Ok(added)
}
