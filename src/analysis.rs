//! Region → profile → filtered profile → fit, as called by a viewer.

use log::info;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;

use crate::{
    config::AnalysisConfig,
    error::Result,
    fit::{FitResult, FitStrategy, display_absorption, fit_profile},
    profile::extract_profile,
    read::RawVolume,
    region::{Region, Shape, regions, single_rectangle},
    signal::{aligned_axis, reference_index},
};

#[derive(Debug, Clone, Serialize)]
pub struct ProfileAnalysis {
    pub depth: usize,
    pub region: Region,
    pub profile: Vec<f64>,
    pub filtered: Vec<f64>,
    pub reference_index: usize,
    /// Micrometers relative to the reference index.
    pub axis: Vec<f64>,
}

pub fn analyze_region(
    volume: &RawVolume,
    depth: usize,
    region: &Region,
    config: &AnalysisConfig,
) -> Result<ProfileAnalysis> {
    let profile = extract_profile(volume, depth, region)?;
    let filtered = config.align_filter.apply(profile.view())?;
    let reference = reference_index(filtered.view(), config.reference_mode)?;
    info!(
        "{region:?} at depth {depth}: {} samples, {} at {reference}",
        profile.len(),
        config.reference_mode
    );
    Ok(ProfileAnalysis {
        depth,
        region: *region,
        axis: aligned_axis(profile.len(), reference, config.transverse_resolution).to_vec(),
        profile: profile.to_vec(),
        filtered: filtered.to_vec(),
        reference_index: reference,
    })
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReportedFit {
    #[serde(flatten)]
    pub fit: FitResult,
    pub absorption: f64,
    /// `absorption` in thousandths.
    pub display: f64,
}

impl ReportedFit {
    pub fn new(fit: FitResult, config: &AnalysisConfig) -> Self {
        let resolution = config
            .scale_by_resolution
            .then_some(config.transverse_resolution);
        let absorption = fit.absorption(resolution);
        Self {
            fit,
            absorption,
            display: display_absorption(absorption),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionFits {
    pub region: Region,
    pub fits: Vec<ReportedFit>,
}

/// Automatic fits accept any number of shapes; manual fits need exactly
/// one rectangle since the points refer to a single profile.
pub fn fit_shapes(
    volume: &RawVolume,
    depth: usize,
    shapes: &[Shape],
    strategy: &FitStrategy,
    config: &AnalysisConfig,
) -> Result<Vec<RegionFits>> {
    let regions = match strategy {
        FitStrategy::Auto => regions(shapes)?,
        FitStrategy::Manual(_) => vec![single_rectangle(shapes)?],
    };
    regions
        .par_iter()
        .map(|region| -> Result<RegionFits> {
            let profile = extract_profile(volume, depth, region)?;
            let fits = fit_profile(profile.view(), strategy, config)?
                .into_iter()
                .map(|fit| {
                    let reported = ReportedFit::new(fit, config);
                    info!("{region:?}: a={:.2}", reported.display);
                    reported
                })
                .collect();
            Ok(RegionFits {
                region: *region,
                fits,
            })
        })
        .collect()
}
