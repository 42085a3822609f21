//! Linear absorption model `y = slope * x + intercept` fitted to log
//! intensity profiles, `x` being the sample index.

use std::ops::Range;

use log::debug;
use ndarray::{Array1, ArrayView1, s};
use serde::Serialize;

use crate::{
    config::AnalysisConfig,
    error::{AbsorptionError, Result},
    signal::argmax,
};

/// Slopes are reported in thousandths for readability.
pub const DISPLAY_SCALE: f64 = 1000.0;

/// How the fit intervals are chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum FitStrategy {
    /// Everything before the maximum of the filtered profile.
    Auto,
    /// Pairs of x coordinates in micrometers, `[x0, x1), [x2, x3), ...`.
    Manual(Vec<f64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitResult {
    pub start: usize,
    pub end: usize,
    pub slope: f64,
    pub intercept: f64,
}

impl FitResult {
    pub fn interval(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Slope per sample, or per micrometer when a resolution is given.
    pub fn absorption(&self, resolution: Option<f64>) -> f64 {
        match resolution {
            Some(r) => self.slope / r,
            None => self.slope,
        }
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

pub fn display_absorption(value: f64) -> f64 {
    value * DISPLAY_SCALE
}

/// Ordinary least squares. Pairs whose `y` is not finite are skipped.
pub fn linear_fit(x: ArrayView1<f64>, y: ArrayView1<f64>) -> Result<(f64, f64)> {
    let points: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter(|(_, y)| y.is_finite())
        .map(|(&x, &y)| (x, y))
        .collect();
    let n = points.len();
    if n < 2 {
        return Err(AbsorptionError::InsufficientSamples(n));
    }

    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n as f64;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n as f64;
    let (sxx, sxy) = points.iter().fold((0.0, 0.0), |(sxx, sxy), &(x, y)| {
        let dx = x - mean_x;
        (sxx + dx * dx, sxy + dx * (y - mean_y))
    });
    if sxx == 0.0 {
        return Err(AbsorptionError::InsufficientSamples(n));
    }
    let slope = sxy / sxx;
    Ok((slope, mean_y - slope * mean_x))
}

fn fit_interval(values: ArrayView1<f64>, interval: Range<usize>) -> Result<FitResult> {
    let x = Array1::from_iter(interval.clone().map(|i| i as f64));
    let (slope, intercept) = linear_fit(x.view(), values.slice(s![interval.clone()]))?;
    debug!("fit {interval:?}: slope {slope}, intercept {intercept}");
    Ok(FitResult {
        start: interval.start,
        end: interval.end,
        slope,
        intercept,
    })
}

/// `[0, m)` where `m` is the first maximum of `filtered`.
pub fn auto_interval(filtered: ArrayView1<f64>) -> Result<Range<usize>> {
    let m = argmax(filtered).ok_or(AbsorptionError::InsufficientSamples(0))?;
    if m < 2 {
        return Err(AbsorptionError::InsufficientSamples(m));
    }
    Ok(0..m)
}

/// Converts click coordinates to sample intervals. Each pair may be given
/// in either order.
pub fn manual_intervals(points: &[f64], resolution: f64, len: usize) -> Result<Vec<Range<usize>>> {
    if points.len() % 2 != 0 {
        return Err(AbsorptionError::OddPointCount(points.len()));
    }
    let to_index = |x: f64| ((x / resolution).floor().max(0.0) as usize).min(len);
    Ok(points
        .chunks_exact(2)
        .map(|pair| {
            let (a, b) = (to_index(pair[0]), to_index(pair[1]));
            a.min(b)..a.max(b)
        })
        .collect())
}

/// Fits `profile` according to `strategy`. The automatic fit runs on the
/// filtered profile, manual fits on the profile as given.
pub fn fit_profile(
    profile: ArrayView1<f64>,
    strategy: &FitStrategy,
    config: &AnalysisConfig,
) -> Result<Vec<FitResult>> {
    match strategy {
        FitStrategy::Auto => {
            let filtered = config.fit_filter.apply(profile)?;
            let interval = auto_interval(filtered.view())?;
            Ok(vec![fit_interval(filtered.view(), interval)?])
        }
        FitStrategy::Manual(points) => {
            manual_intervals(points, config.transverse_resolution, profile.len())?
                .into_iter()
                .map(|interval| fit_interval(profile, interval))
                .collect()
        }
    }
}
