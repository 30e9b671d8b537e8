//! Example: coadd a set of synthetic, dithered star-field exposures
//!
//! Each exposure sees the same handful of stars through a different seeing
//! Gaussian, with its own noise level, a small dither and one cosmic ray hit.
//! The exposures are remapped onto a 64x64 coadd grid and accumulated with the
//! Kaiser method.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example synthetic_coadd
//! cargo run --example synthetic_coadd -- path/to/coadd.yaml
//! ```
//!
//! Logs go to the console and to `test_output/logs`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use glam::DVec2;
use kaiser::{
    Coadd, CoaddConfig, CoaddInput, DirectConvolver, Exposure, KaiserCoadd, KernelImage,
    MaskPlane, MaskedImage, NearestRemapper, PixelPlane, TanWcs,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const COADD_SIZE: usize = 64;
const EXPOSURE_SIZE: usize = 72;
const SKY: f64 = 200.0;

/// (x, y, flux) on the coadd grid.
const STARS: [(f64, f64, f64); 5] = [
    (16.0, 20.0, 4000.0),
    (40.0, 12.0, 1500.0),
    (32.0, 32.0, 9000.0),
    (50.0, 48.0, 2500.0),
    (12.0, 52.0, 800.0),
];

fn main() -> anyhow::Result<()> {
    common::log_setup::setup_logging("info", Path::new("test_output/logs"))?;

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => CoaddConfig::load(&path)?,
        None => CoaddConfig {
            parallel: true,
            ..CoaddConfig::default()
        },
    };
    tracing::info!(?config, "Coadd configuration");

    let mut rng = StdRng::seed_from_u64(7);
    let inputs: Vec<_> = (0..8)
        .map(|i| synthetic_input(i, &mut rng))
        .collect();

    let coadd = Coadd::blank(COADD_SIZE, COADD_SIZE, (0, 0), Some(coadd_wcs()));
    let kaiser = KaiserCoadd::new(config, coadd, NearestRemapper, DirectConvolver)?;

    let start = Instant::now();
    let result = kaiser.run(inputs)?;
    tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "Coadd done");

    let report = &result.report;
    println!("added:       {}", report.added);
    println!("skipped:     {}", report.skipped.len());
    for skipped in &report.skipped {
        println!("  {}: {}", skipped.name, skipped.reason);
    }
    println!("weight sum:  {:.4}", report.weight_sum);
    println!("edge pixels: {}", report.edge_pixels);

    if report.degenerate {
        anyhow::bail!("no input pixel reached the coadd");
    }

    let metadata = serde_yml::to_string(&result.coadd.metadata())?;
    let (masked, depth, _) = result.coadd.into_parts();
    let (cx, cy) = (32, 32);
    println!(
        "central star peak (weighted mean): {:.2}, depth {}",
        masked.image()[(cx, cy)] / report.weight_sum,
        depth[(cx, cy)]
    );
    println!("metadata:\n{metadata}");

    Ok(())
}

fn coadd_wcs() -> TanWcs {
    TanWcs::from_scale(DVec2::ZERO, DVec2::new(150.0, 2.0), 0.2 / 3600.0)
}

fn synthetic_input(index: usize, rng: &mut StdRng) -> CoaddInput<f32> {
    let seeing = rng.random_range(1.0..2.2);
    let noise = rng.random_range(4.0..12.0);
    let dither = DVec2::new(
        rng.random_range(0..=EXPOSURE_SIZE - COADD_SIZE) as f64,
        rng.random_range(0..=EXPOSURE_SIZE - COADD_SIZE) as f64,
    );

    let mut pixels = Vec::with_capacity(EXPOSURE_SIZE * EXPOSURE_SIZE);
    for y in 0..EXPOSURE_SIZE {
        for x in 0..EXPOSURE_SIZE {
            let p = DVec2::new(x as f64, y as f64) - dither;
            let stars: f64 = STARS
                .iter()
                .map(|&(sx, sy, flux)| {
                    let r2 = p.distance_squared(DVec2::new(sx, sy));
                    flux * (-r2 / (2.0 * seeing * seeing)).exp()
                        / (2.0 * std::f64::consts::PI * seeing * seeing)
                })
                .sum();
            pixels.push((SKY + stars + noise * gaussian(rng)) as f32);
        }
    }

    let mut masked = MaskedImage::from_image(
        PixelPlane::new(EXPOSURE_SIZE, EXPOSURE_SIZE, pixels),
        (noise * noise) as f32,
    );
    let (crx, cry) = (
        rng.random_range(0..EXPOSURE_SIZE),
        rng.random_range(0..EXPOSURE_SIZE),
    );
    masked.image_mut()[(crx, cry)] += 5000.0;
    masked.mask_mut()[(crx, cry)] = MaskPlane::Cr.bit();

    let mut wcs = coadd_wcs();
    wcs.crpix += dither;

    tracing::debug!(index, seeing, noise, ?dither, "Synthesized exposure");
    CoaddInput::new(
        format!("synthetic-{index:02}"),
        Exposure::new(masked, Some(wcs)),
        KernelImage::gaussian(seeing),
    )
    .with_sky(SKY)
}

/// Standard normal sample (Box-Muller).
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random_range(f64::EPSILON..1.0);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
