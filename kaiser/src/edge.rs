//! Final pass marking coadd pixels that no input reached.

use crate::error::Result;
use crate::image::{DepthMap, MaskPixel, MaskPlane, PixelPlane};

/// Sets [`MaskPlane::Edge`] wherever `depth` is zero and returns how many such pixels
/// there are. Other pixels and other bits are left alone, so repeated calls are no-ops.
///
/// # Errors
/// [`crate::Error::DimensionMismatch`] if the planes differ in size.
pub fn set_coadd_edge_bits(mask: &mut PixelPlane<MaskPixel>, depth: &DepthMap) -> Result<usize> {
    mask.check_dimensions(depth, "depth map")?;
    let edge = MaskPlane::Edge.bit();
    let mut tagged = 0usize;
    for (m, &d) in mask.iter_mut().zip(depth.iter()) {
        if d == 0 {
            *m |= edge;
            tagged += 1;
        }
    }
    Ok(tagged)
}
