//! Tangent-plane (gnomonic) world coordinate system.

use glam::{DMat2, DVec2};
use serde::{Deserialize, Serialize};

/// Gnomonic projection between parent-frame pixel positions and sky positions.
///
/// `pixel -> intermediate`: `(xi, eta) = CD * (p - CRPIX)` in degrees, followed by
/// de-projection about `CRVAL = (ra, dec)` in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TanWcs {
    /// Reference pixel in parent-frame pixel coordinates.
    pub crpix: DVec2,
    /// Reference sky position (RA, Dec) in degrees.
    pub crval: DVec2,
    /// Pixel offset to intermediate coordinates, degrees per pixel.
    pub cd: DMat2,
}

impl TanWcs {
    pub fn new(crpix: DVec2, crval: DVec2, cd: DMat2) -> Self {
        Self { crpix, crval, cd }
    }

    /// North up, east left, square pixels of `scale_deg` degrees.
    pub fn from_scale(crpix: DVec2, crval: DVec2, scale_deg: f64) -> Self {
        Self::new(
            crpix,
            crval,
            DMat2::from_cols(DVec2::new(-scale_deg, 0.0), DVec2::new(0.0, scale_deg)),
        )
    }

    /// Mean pixel scale in degrees per pixel.
    pub fn pixel_scale(&self) -> f64 {
        (self.cd.x_axis.length() + self.cd.y_axis.length()) / 2.0
    }

    /// Sky position (RA in `[0, 360)`, Dec) in degrees of a pixel position.
    pub fn pixel_to_sky(&self, pixel: DVec2) -> DVec2 {
        let intermediate = self.cd * (pixel - self.crpix);
        let xi = intermediate.x.to_radians();
        let eta = intermediate.y.to_radians();

        let ra0 = self.crval.x.to_radians();
        let (sin_dec0, cos_dec0) = self.crval.y.to_radians().sin_cos();
        let denom = cos_dec0 - eta * sin_dec0;

        let ra = ra0 + xi.atan2(denom);
        let dec = (sin_dec0 + eta * cos_dec0).atan2((xi * xi + denom * denom).sqrt());

        DVec2::new(ra.to_degrees().rem_euclid(360.0), dec.to_degrees())
    }

    /// Pixel position of a sky position, `None` for points on the far hemisphere.
    pub fn sky_to_pixel(&self, sky: DVec2) -> Option<DVec2> {
        let (sin_dec, cos_dec) = sky.y.to_radians().sin_cos();
        let (sin_dec0, cos_dec0) = self.crval.y.to_radians().sin_cos();
        let (sin_dra, cos_dra) = (sky.x - self.crval.x).to_radians().sin_cos();

        let d = sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_dra;
        if d <= 0.0 {
            return None;
        }

        let xi = (cos_dec * sin_dra / d).to_degrees();
        let eta = ((sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_dra) / d).to_degrees();

        let det = self.cd.determinant();
        if det.abs() < f64::MIN_POSITIVE {
            return None;
        }
        Some(self.crpix + self.cd.inverse() * DVec2::new(xi, eta))
    }
}
