//! Overlaying profiles from repeated acquisitions (e.g. the same sample
//! after 0h, 3h, 6h) on a common origin.

use std::{ffi::OsStr, fs::File, path::Path};

use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_npy::{NpzReader, read_npy};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;

use crate::{
    config::AnalysisConfig,
    error::{AbsorptionError, Result},
    signal::{aligned_axis, diff, reference_index},
};

#[derive(Debug, Clone, Serialize)]
pub struct AlignedProfile {
    pub reference_index: usize,
    pub axis: Vec<f64>,
    /// Divided by its maximum when normalization is enabled.
    pub profile: Vec<f64>,
    pub filtered: Vec<f64>,
    /// Negated first difference of `filtered`, plotted against
    /// `axis[..len - 1]`.
    pub falloff: Vec<f64>,
}

/// Profiles saved from earlier sessions: either one per row of a 2-D
/// `.npy` array, or one 1-D array per entry of an `.npz` archive, in
/// archive order. Archive entries may differ in length.
pub fn load_profiles(path: &Path) -> Result<Vec<Array1<f64>>> {
    let profiles = if path.extension() == Some(OsStr::new("npz")) {
        let file = File::open(path).map_err(|e| AbsorptionError::io(path, e))?;
        let mut npz = NpzReader::new(file)?;
        (0..npz.len())
            .map(|i| Ok(npz.by_index(i)?))
            .collect::<Result<Vec<Array1<f64>>>>()?
    } else {
        let rows: Array2<f64> = read_npy(path)?;
        rows.axis_iter(Axis(0)).map(|row| row.to_owned()).collect()
    };
    info!("loaded {} profiles from {path:?}", profiles.len());
    Ok(profiles)
}

/// The reference is located on the filtered raw profile; normalization
/// only affects the returned curves.
pub fn align_profile(profile: ArrayView1<f64>, config: &AnalysisConfig) -> Result<AlignedProfile> {
    let filtered = config.align_filter.apply(profile)?;
    let reference = reference_index(filtered.view(), config.reference_mode)?;
    debug!("reference index {reference} ({})", config.reference_mode);

    let profile = if config.normalize {
        let max = profile.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        profile.mapv(|v| v / max)
    } else {
        profile.to_owned()
    };
    let filtered = config.align_filter.apply(profile.view())?;
    let falloff = -diff(filtered.view());

    Ok(AlignedProfile {
        reference_index: reference,
        axis: aligned_axis(profile.len(), reference, config.transverse_resolution).to_vec(),
        profile: profile.to_vec(),
        filtered: filtered.to_vec(),
        falloff: falloff.to_vec(),
    })
}

pub fn align_profiles(
    profiles: &[Array1<f64>],
    config: &AnalysisConfig,
) -> Result<Vec<AlignedProfile>> {
    profiles
        .par_iter()
        .map(|profile| align_profile(profile.view(), config))
        .collect()
}
