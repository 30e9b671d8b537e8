//! Deterministic data generators shared by unit and scenario tests.

use glam::DVec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::image::{Exposure, MaskedImage, PixelPlane, TanWcs, VariancePixel};
use crate::psf::KernelImage;

/// Seeded random source with Gaussian draws.
pub struct TestRng {
    rng: StdRng,
}

impl TestRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64()
    }

    pub fn index(&mut self, upper: usize) -> usize {
        self.rng.random_range(0..upper)
    }

    /// Standard normal draw (Box-Muller).
    pub fn next_gaussian(&mut self) -> f64 {
        let u1 = self.next_f64().max(f64::MIN_POSITIVE);
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }

    pub fn gaussian_vec(&mut self, n: usize, mean: f64, sigma: f64) -> Vec<f64> {
        (0..n).map(|_| mean + sigma * self.next_gaussian()).collect()
    }
}

/// WCS shared by synthetic exposures that already sit on the coadd grid.
pub fn test_wcs() -> TanWcs {
    TanWcs::from_scale(DVec2::new(0.0, 0.0), DVec2::new(150.0, 2.0), 0.2 / 3600.0)
}

/// Gaussian noise image with constant variance `sigma^2` and a clear mask.
pub fn noise_exposure(
    width: usize,
    height: usize,
    sigma: f64,
    seed: u64,
) -> Exposure<f32> {
    let mut rng = TestRng::new(seed);
    let pixels: Vec<f32> = rng
        .gaussian_vec(width * height, 0.0, sigma)
        .into_iter()
        .map(|v| v as f32)
        .collect();
    let image = PixelPlane::new(width, height, pixels);
    Exposure::new(
        MaskedImage::from_image(image, (sigma * sigma) as VariancePixel),
        Some(test_wcs()),
    )
}

/// Exposure filled from `f(x, y)` with constant `variance`.
pub fn exposure_from_fn(
    width: usize,
    height: usize,
    variance: VariancePixel,
    f: impl Fn(usize, usize) -> f32,
) -> Exposure<f32> {
    let mut pixels = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            pixels.push(f(x, y));
        }
    }
    Exposure::new(
        MaskedImage::from_image(PixelPlane::new(width, height, pixels), variance),
        Some(test_wcs()),
    )
}

/// Masked image with pseudo-random image, mask and variance planes.
pub fn random_masked_image(width: usize, height: usize, seed: u64) -> MaskedImage<f64> {
    let mut rng = TestRng::new(seed);
    let n = width * height;
    let image = PixelPlane::new(width, height, rng.gaussian_vec(n, 10.0, 3.0));
    let mask = PixelPlane::new(
        width,
        height,
        (0..n).map(|_| rng.index(1 << 16) as u16).collect(),
    );
    let variance = PixelPlane::new(
        width,
        height,
        (0..n).map(|_| rng.uniform(0.5, 4.0) as f32).collect(),
    );
    MaskedImage::new(image, mask, variance).expect("planes share dimensions")
}

/// 3x3 kernel with a bright center, normalized to unit sum.
pub fn small_kernel() -> KernelImage {
    KernelImage::new(
        3,
        3,
        vec![0.0, 1.0, 0.0, 1.0, 4.0, 1.0, 0.0, 1.0, 0.0],
    )
    .normalized()
    .expect("non-zero kernel sum")
}
