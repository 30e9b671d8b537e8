//! Coaddition driver: runs every input through build, weight, remap and accumulate,
//! then tags edges.
//!
//! Each input is processed to completion before the next one starts and its
//! [`CoaddComponent`](crate::component::CoaddComponent) is dropped as soon as it has
//! been accumulated. Problems confined to one exposure (degenerate noise, an unusable
//! PSF, a failed remap) skip that exposure; broken invariants such as plane size
//! mismatches abort the run.
//!
//! The parallel path builds partial coadds on the rayon pool, one per worker fold,
//! and merges them with [`Coadd::merge`].

mod config;


use rayon::prelude::*;

use crate::coadd::Coadd;
use crate::component::{ComponentBuilder, Diagnostic};
use crate::convolve::Convolver;
use crate::error::{Error, Result};
use crate::image::{Exposure, MaskPixel, MaskPlane, Pixel};
use crate::psf::PsfKernel;
use crate::remap::{RemapTarget, Remapper};

pub use config::CoaddConfig;

/// One input exposure with everything needed to turn it into a component.
#[derive(Debug)]
pub struct CoaddInput<T> {
    /// Used in logs and in the report.
    pub name: String,
    pub exposure: Exposure<T>,
    pub psf: PsfKernel,
    /// Constant background level subtracted before the component is built.
    pub sky: f64,
}

impl<T: Pixel> CoaddInput<T> {
    pub fn new(name: impl Into<String>, exposure: Exposure<T>, psf: impl Into<PsfKernel>) -> Self {
        Self {
            name: name.into(),
            exposure,
            psf: psf.into(),
            sky: 0.0,
        }
    }

    pub fn with_sky(mut self, sky: f64) -> Self {
        self.sky = sky;
        self
    }
}

/// An exposure left out of the coadd, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedExposure {
    pub name: String,
    pub reason: Error,
}

/// A non-fatal diagnostic raised while building one exposure's component.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureDiagnostic {
    pub name: String,
    pub diagnostic: Diagnostic,
}

/// Summary of a coaddition run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoaddReport {
    /// Exposures that were accumulated.
    pub added: usize,
    pub skipped: Vec<SkippedExposure>,
    pub diagnostics: Vec<ExposureDiagnostic>,
    /// Sum of the weights `1 / sigma^2` of the accumulated exposures.
    pub weight_sum: f64,
    /// Coadd pixels no input reached, flagged `EDGE`.
    pub edge_pixels: usize,
    /// No input pixel was accepted anywhere.
    pub degenerate: bool,
}

impl CoaddReport {
    fn absorb(&mut self, other: CoaddReport) {
        self.added += other.added;
        self.skipped.extend(other.skipped);
        self.diagnostics.extend(other.diagnostics);
        self.weight_sum += other.weight_sum;
    }
}

#[derive(Debug)]
pub struct CoaddResult {
    pub coadd: Coadd,
    pub report: CoaddReport,
}

/// Accumulates exposures into a coadd with the Kaiser method.
pub struct KaiserCoadd<R, C> {
    config: CoaddConfig,
    builder: ComponentBuilder,
    bad_pixel_mask: MaskPixel,
    target: RemapTarget,
    coadd: Coadd,
    report: CoaddReport,
    remapper: R,
    convolver: C,
}

impl<R: Remapper, C: Convolver> KaiserCoadd<R, C> {
    /// Starts a run accumulating into `coadd` (normally [`Coadd::blank`]).
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] if the config does not validate.
    pub fn new(config: CoaddConfig, coadd: Coadd, remapper: R, convolver: C) -> Result<Self> {
        config.validate()?;
        let target = RemapTarget {
            bbox: coadd.bbox(),
            wcs: coadd.wcs().copied(),
        };
        let bad_pixel_mask = config.effective_bad_pixel_mask();
        tracing::debug!(
            bad_pixel_mask,
            rejected_planes = ?MaskPlane::planes_in(bad_pixel_mask),
            "Coadd run configured"
        );
        Ok(Self {
            builder: config.component_builder(),
            bad_pixel_mask,
            config,
            target,
            coadd,
            report: CoaddReport::default(),
            remapper,
            convolver,
        })
    }

    pub fn config(&self) -> &CoaddConfig {
        &self.config
    }

    /// The coadd as accumulated so far.
    pub fn coadd(&self) -> &Coadd {
        &self.coadd
    }

    pub fn report(&self) -> &CoaddReport {
        &self.report
    }

    /// Processes one input. Exposure-local failures are logged and recorded as skipped.
    ///
    /// # Errors
    /// Only failures that are not local to the exposure, e.g. [`Error::DimensionMismatch`].
    pub fn add_exposure<T: Pixel>(&mut self, input: CoaddInput<T>) -> Result<()> {
        let stage = Stage {
            bad_pixel_mask: self.bad_pixel_mask,
            builder: &self.builder,
            target: &self.target,
            remapper: &self.remapper,
            convolver: &self.convolver,
        };
        stage.process(&mut self.coadd, &mut self.report, input)
    }

    /// Processes `inputs` one after another, or on the rayon pool when
    /// [`CoaddConfig::parallel`] is set, then finishes the run.
    pub fn run<T, I>(self, inputs: I) -> Result<CoaddResult>
    where
        T: Pixel,
        I: IntoIterator<Item = CoaddInput<T>>,
        I::IntoIter: Send,
    {
        if self.config.parallel {
            self.run_parallel(inputs)
        } else {
            self.run_sequential(inputs)
        }
    }

    pub fn run_sequential<T, I>(mut self, inputs: I) -> Result<CoaddResult>
    where
        T: Pixel,
        I: IntoIterator<Item = CoaddInput<T>>,
    {
        for input in inputs {
            self.add_exposure(input)?;
        }
        self.finish()
    }

    /// Builds partial coadds in parallel and merges them.
    ///
    /// Skipped exposures are reported sorted by name since completion order varies.
    pub fn run_parallel<T, I>(mut self, inputs: I) -> Result<CoaddResult>
    where
        T: Pixel,
        I: IntoIterator<Item = CoaddInput<T>>,
        I::IntoIter: Send,
    {
        let stage = Stage {
            bad_pixel_mask: self.bad_pixel_mask,
            builder: &self.builder,
            target: &self.target,
            remapper: &self.remapper,
            convolver: &self.convolver,
        };
        let template = &self.coadd;
        let blank = || Ok::<_, Error>((template.blank_like(), CoaddReport::default()));

        let (partial, partial_report) = inputs
            .into_iter()
            .par_bridge()
            .fold(blank, |acc, input| {
                let (mut coadd, mut report) = acc?;
                stage.process(&mut coadd, &mut report, input)?;
                Ok((coadd, report))
            })
            .reduce(blank, |a, b| {
                let (mut coadd, mut report) = a?;
                let (other, other_report) = b?;
                coadd.merge(&other)?;
                report.absorb(other_report);
                Ok((coadd, report))
            })?;

        self.coadd.merge(&partial)?;
        self.report.absorb(partial_report);
        self.report.skipped.sort_by(|a, b| a.name.cmp(&b.name));
        self.report.diagnostics.sort_by(|a, b| a.name.cmp(&b.name));
        self.finish()
    }

    /// Tags never-reached pixels `EDGE` and returns the coadd with its report.
    ///
    /// An all-zero depth map is not an error; it is flagged in the report.
    pub fn finish(mut self) -> Result<CoaddResult> {
        self.report.edge_pixels = self.coadd.tag_edges()?;
        self.report.degenerate = self.coadd.is_degenerate();

        if self.report.degenerate {
            tracing::warn!(
                skipped = self.report.skipped.len(),
                "Degenerate coadd: no input pixel was accumulated, depth map is zero everywhere"
            );
        } else {
            tracing::info!(
                added = self.report.added,
                skipped = self.report.skipped.len(),
                weight_sum = self.report.weight_sum,
                edge_pixels = self.report.edge_pixels,
                "Coadd finished"
            );
        }

        Ok(CoaddResult {
            coadd: self.coadd,
            report: self.report,
        })
    }
}

/// Borrowed per-run state shared by the sequential and parallel paths.
struct Stage<'a, R, C> {
    bad_pixel_mask: MaskPixel,
    builder: &'a ComponentBuilder,
    target: &'a RemapTarget,
    remapper: &'a R,
    convolver: &'a C,
}

impl<R: Remapper, C: Convolver> Stage<'_, R, C> {
    fn process<T: Pixel>(
        &self,
        coadd: &mut Coadd,
        report: &mut CoaddReport,
        input: CoaddInput<T>,
    ) -> Result<()> {
        let span = tracing::info_span!("exposure", name = %input.name);
        let _enter = span.enter();
        let name = input.name.clone();

        match self.contribute(coadd, input) {
            Ok(contribution) => {
                report.added += 1;
                report.weight_sum += contribution.weight;
                report.diagnostics.extend(
                    contribution
                        .diagnostics
                        .into_iter()
                        .map(|diagnostic| ExposureDiagnostic {
                            name: name.clone(),
                            diagnostic,
                        }),
                );
                Ok(())
            }
            Err(reason) if reason.is_exposure_local() => {
                tracing::warn!(error = %reason, "Skipping exposure");
                report.skipped.push(SkippedExposure { name, reason });
                Ok(())
            }
            Err(reason) => {
                tracing::error!(error = %reason, "Aborting coadd");
                Err(reason)
            }
        }
    }

    fn contribute<T: Pixel>(&self, coadd: &mut Coadd, input: CoaddInput<T>) -> Result<Contribution> {
        let CoaddInput {
            mut exposure,
            psf,
            sky,
            ..
        } = input;

        exposure.subtract_background(sky);
        let component = self.builder.build(&exposure, &psf, self.convolver)?;
        drop(exposure);

        let weight = component.weight();
        let diagnostics = component.diagnostics().to_vec();
        tracing::debug!(stage = "build", sigma_sq = component.sigma_sq(), weight);

        let weighted = component.into_weighted_exposure();
        let remapped = self.remapper.remap(weighted, self.target)?;
        tracing::debug!(stage = "remap", width = remapped.width(), height = remapped.height());

        let pixels = coadd.add(&remapped, self.bad_pixel_mask)?;
        tracing::info!(stage = "accumulate", pixels, weight, "Accumulated exposure");

        Ok(Contribution {
            weight,
            diagnostics,
        })
    }
}

struct Contribution {
    weight: f64,
    diagnostics: Vec<Diagnostic>,
}
