//! Placing weighted components onto the coadd pixel grid.
//!
//! Resampling proper belongs to an external warping service; [`Remapper`] is the seam
//! the driver calls through. Two simple implementations ship here.

use glam::DVec2;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::image::{BBox, Exposure, MaskPlane, MaskedImage, TanWcs};

/// Footprint and sky mapping of the grid to remap onto.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemapTarget {
    pub bbox: BBox,
    pub wcs: Option<TanWcs>,
}

/// Resamples an exposure onto a target grid.
pub trait Remapper: Sync {
    /// Returns a masked image covering exactly `target.bbox`.
    fn remap(&self, source: Exposure<f64>, target: &RemapTarget) -> Result<MaskedImage<f64>>;
}

/// For inputs that already sit on the coadd grid: hands the pixels through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityRemapper;

impl Remapper for IdentityRemapper {
    fn remap(&self, source: Exposure<f64>, target: &RemapTarget) -> Result<MaskedImage<f64>> {
        let bbox = source.masked_image().bbox();
        if bbox.width != target.bbox.width || bbox.height != target.bbox.height {
            return Err(Error::Remap(format!(
                "exposure footprint {bbox:?} is not on the coadd grid {:?}",
                target.bbox
            )));
        }
        Ok(source.into_masked_image())
    }
}

/// Nearest-neighbour resampling through both WCSs.
///
/// Target pixels that map outside the source are zeroed and flagged `NO_DATA`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestRemapper;

impl Remapper for NearestRemapper {
    fn remap(&self, source: Exposure<f64>, target: &RemapTarget) -> Result<MaskedImage<f64>> {
        let source_wcs = source
            .wcs()
            .copied()
            .ok_or_else(|| Error::Remap("exposure has no WCS".to_string()))?;
        let target_wcs = target
            .wcs
            .ok_or_else(|| Error::Remap("coadd has no WCS".to_string()))?;

        let BBox {
            x0,
            y0,
            width,
            height,
        } = target.bbox;
        let src = source.masked_image();
        let no_data = MaskPlane::NoData.bit();

        let mut output = MaskedImage::<f64>::blank(width, height).with_origin(x0, y0);
        let (out_image, out_mask, out_variance) = output.planes_mut();

        out_image
            .pixels_mut()
            .par_chunks_mut(width.max(1))
            .zip(out_mask.pixels_mut().par_chunks_mut(width.max(1)))
            .zip(out_variance.pixels_mut().par_chunks_mut(width.max(1)))
            .enumerate()
            .for_each(|(row, ((image_row, mask_row), variance_row))| {
                let py = y0 + row as i64;
                for col in 0..width {
                    let px = x0 + col as i64;
                    let sky = target_wcs.pixel_to_sky(DVec2::new(px as f64, py as f64));
                    let hit = source_wcs.sky_to_pixel(sky).and_then(|p| {
                        let (sx, sy) = (p.x.round() as i64, p.y.round() as i64);
                        Some((
                            *src.image().get_parent(sx, sy)?,
                            *src.mask().get_parent(sx, sy)?,
                            *src.variance().get_parent(sx, sy)?,
                        ))
                    });
                    match hit {
                        Some((value, mask, variance)) => {
                            image_row[col] = value;
                            mask_row[col] = mask;
                            variance_row[col] = variance;
                        }
                        None => mask_row[col] = no_data,
                    }
                }
            });

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PixelPlane;
    use crate::testing::{random_masked_image, test_wcs};

    fn target(width: usize, height: usize, wcs: TanWcs) -> RemapTarget {
        RemapTarget {
            bbox: BBox::new(0, 0, width, height),
            wcs: Some(wcs),
        }
    }

    #[test]
    fn test_nearest_with_same_wcs_is_identity() {
        let mi = random_masked_image(6, 5, 3);
        let exposure = Exposure::new(mi.clone(), Some(test_wcs()));
        let out = NearestRemapper.remap(exposure, &target(6, 5, test_wcs())).unwrap();
        assert_eq!(out, mi);
    }

    #[test]
    fn test_nearest_integer_shift_and_no_data() {
        // The source grid is offset by two pixels in x from the coadd grid.
        let mut shifted = test_wcs();
        shifted.crpix += DVec2::new(2.0, 0.0);
        let image = PixelPlane::new(4, 1, vec![1.0, 2.0, 3.0, 4.0]);
        let exposure = Exposure::new(MaskedImage::from_image(image, 1.0), Some(shifted));

        let out = NearestRemapper.remap(exposure, &target(4, 1, test_wcs())).unwrap();
        // Coadd pixel x sees source pixel x + 2.
        assert_eq!(out.image().pixels(), &[3.0, 4.0, 0.0, 0.0]);
        let no_data = MaskPlane::NoData.bit();
        assert_eq!(out.mask().pixels(), &[0, 0, no_data, no_data]);
        assert_eq!(out.variance().pixels(), &[1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_nearest_honors_source_origin() {
        let image = PixelPlane::new(2, 1, vec![7.0, 8.0]).with_origin(1, 0);
        let exposure = Exposure::new(MaskedImage::from_image(image, 1.0), Some(test_wcs()));
        let out = NearestRemapper.remap(exposure, &target(3, 1, test_wcs())).unwrap();
        assert_eq!(out.image().pixels(), &[0.0, 7.0, 8.0]);
        assert_eq!(out.mask()[(0, 0)], MaskPlane::NoData.bit());
    }

    #[test]
    fn test_nearest_requires_wcs() {
        let exposure = Exposure::new(MaskedImage::<f64>::blank(2, 2), None);
        assert!(matches!(
            NearestRemapper.remap(exposure, &target(2, 2, test_wcs())),
            Err(Error::Remap(_))
        ));
    }

    #[test]
    fn test_identity_checks_footprint() {
        let exposure = Exposure::new(MaskedImage::<f64>::blank(3, 2), None);
        assert!(matches!(
            IdentityRemapper.remap(exposure, &target(2, 2, test_wcs())),
            Err(Error::Remap(_))
        ));
        let exposure = Exposure::new(random_masked_image(2, 2, 1), None);
        let expected = exposure.masked_image().clone();
        assert_eq!(
            IdentityRemapper.remap(exposure, &target(2, 2, test_wcs())).unwrap(),
            expected
        );
    }
}
