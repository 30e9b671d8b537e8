//! The running coadd: summed masked image, depth map and WCS.

use serde::{Deserialize, Serialize};

use crate::accumulate::add_to_coadd;
use crate::edge::set_coadd_edge_bits;
use crate::error::{Error, Result};
use crate::image::{BBox, DepthMap, Exposure, MaskPixel, MaskedImage, Pixel, TanWcs};

/// Weighted sum of coadd components.
///
/// At any point `image[p]` is the sum of every accepted input pixel at `p` and
/// `depth[p]` is how many there were. Nothing is normalized; divide by the weight
/// sum for a weighted mean.
#[derive(Debug, Clone, PartialEq)]
pub struct Coadd {
    masked_image: MaskedImage<f64>,
    depth: DepthMap,
    wcs: Option<TanWcs>,
}

/// Companion record persisted next to the four coadd planes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoaddMetadata {
    pub bbox: BBox,
    pub wcs: Option<TanWcs>,
}

impl Coadd {
    /// Zero image, variance, mask and depth on the given footprint.
    pub fn blank(width: usize, height: usize, origin: (i64, i64), wcs: Option<TanWcs>) -> Self {
        let (x0, y0) = origin;
        Self {
            masked_image: MaskedImage::blank(width, height).with_origin(x0, y0),
            depth: DepthMap::new_default(width, height).with_origin(x0, y0),
            wcs,
        }
    }

    /// Blank coadd covering the pixel grid of `exposure`, sampled `resolution_factor`
    /// times more finely.
    ///
    /// The footprint and origin are scaled by the factor and rounded up; the WCS keeps
    /// pixel edges aligned, so `crpix' = (crpix + 0.5) * f - 0.5` and `cd' = cd / f`.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] unless `resolution_factor` is positive and finite.
    pub fn blank_from_exposure<T: Pixel>(exposure: &Exposure<T>, resolution_factor: f64) -> Result<Self> {
        if !(resolution_factor.is_finite() && resolution_factor > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "resolution_factor must be positive, got {resolution_factor}"
            )));
        }
        let f = resolution_factor;
        let (x0, y0) = exposure.masked_image().origin();
        let width = (exposure.width() as f64 * f).ceil() as usize;
        let height = (exposure.height() as f64 * f).ceil() as usize;
        let origin = ((x0 as f64 * f).round() as i64, (y0 as f64 * f).round() as i64);

        let wcs = exposure.wcs().map(|wcs| {
            TanWcs::new((wcs.crpix + 0.5) * f - 0.5, wcs.crval, wcs.cd * (1.0 / f))
        });
        tracing::debug!(
            width,
            height,
            resolution_factor,
            pixel_scale_arcsec = ?wcs.map(|w| w.pixel_scale() * 3600.0),
            "Blank coadd from exposure grid"
        );
        Ok(Self::blank(width, height, origin, wcs))
    }

    /// A blank coadd with the same footprint and WCS.
    pub fn blank_like(&self) -> Self {
        Self::blank(self.width(), self.height(), self.origin(), self.wcs)
    }

    #[inline]
    pub fn masked_image(&self) -> &MaskedImage<f64> {
        &self.masked_image
    }

    #[inline]
    pub fn depth_map(&self) -> &DepthMap {
        &self.depth
    }

    #[inline]
    pub fn wcs(&self) -> Option<&TanWcs> {
        self.wcs.as_ref()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.masked_image.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.masked_image.height()
    }

    #[inline]
    pub fn origin(&self) -> (i64, i64) {
        self.masked_image.origin()
    }

    #[inline]
    pub fn bbox(&self) -> BBox {
        self.masked_image.bbox()
    }

    pub fn metadata(&self) -> CoaddMetadata {
        CoaddMetadata {
            bbox: self.bbox(),
            wcs: self.wcs,
        }
    }

    pub fn into_parts(self) -> (MaskedImage<f64>, DepthMap, Option<TanWcs>) {
        (self.masked_image, self.depth, self.wcs)
    }

    /// Accumulates an already weighted input; see [`add_to_coadd`].
    pub fn add<T: Pixel>(&mut self, input: &MaskedImage<T>, bad_pixel_mask: MaskPixel) -> Result<usize> {
        add_to_coadd(&mut self.masked_image, &mut self.depth, input, bad_pixel_mask)
    }

    /// Folds a partial coadd built from other inputs into this one.
    ///
    /// Where `other` has non-zero depth its image and variance are added, its mask
    /// OR-ed in and its depth added. The result equals accumulating both input sets
    /// into one coadd, in any order.
    ///
    /// # Errors
    /// [`Error::DimensionMismatch`] if the footprints differ in size.
    pub fn merge(&mut self, other: &Coadd) -> Result<()> {
        if self.masked_image.dimensions() != other.masked_image.dimensions() {
            return Err(Error::DimensionMismatch {
                what: "partial coadd",
                expected: self.masked_image.dimensions(),
                actual: other.masked_image.dimensions(),
            });
        }
        let Some(overlap) = self.bbox().intersect(&other.bbox()) else {
            return Ok(());
        };

        let (sx0, sy0) = self.origin();
        let (ox0, oy0) = other.origin();
        let sx = (overlap.x0 - sx0) as usize;
        let ox = (overlap.x0 - ox0) as usize;
        let n = overlap.width;
        let (image, mask, variance) = self.masked_image.planes_mut();

        for y in overlap.y0..overlap.y_end() {
            let sy = (y - sy0) as usize;
            let oy = (y - oy0) as usize;
            let src = &other.masked_image;
            let src_depth = &other.depth.row(oy)[ox..ox + n];
            let src_image = &src.image().row(oy)[ox..ox + n];
            let src_mask = &src.mask().row(oy)[ox..ox + n];
            let src_variance = &src.variance().row(oy)[ox..ox + n];

            let dst_image = &mut image.row_mut(sy)[sx..sx + n];
            let dst_mask = &mut mask.row_mut(sy)[sx..sx + n];
            let dst_variance = &mut variance.row_mut(sy)[sx..sx + n];
            let dst_depth = &mut self.depth.row_mut(sy)[sx..sx + n];

            for i in 0..n {
                if src_depth[i] == 0 {
                    continue;
                }
                dst_image[i] += src_image[i];
                dst_variance[i] += src_variance[i];
                dst_mask[i] |= src_mask[i];
                dst_depth[i] = dst_depth[i].saturating_add(src_depth[i]);
            }
        }
        Ok(())
    }

    /// Marks never-reached pixels `EDGE`; returns their count.
    pub fn tag_edges(&mut self) -> Result<usize> {
        set_coadd_edge_bits(self.masked_image.mask_mut(), &self.depth)
    }

    /// True when no input pixel was ever accepted.
    pub fn is_degenerate(&self) -> bool {
        self.depth.iter().all(|&d| d == 0)
    }
}
