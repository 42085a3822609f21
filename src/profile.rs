use log::debug;
use ndarray::{Array1, ArrayView2, Axis};

use crate::{
    error::{AbsorptionError, Result},
    read::RawVolume,
    region::Region,
};

/// Log of the column means of `region` in plane `depth`: one sample per
/// column. Zero columns yield `-inf`, which is kept as data.
pub fn extract_profile(volume: &RawVolume, depth: usize, region: &Region) -> Result<Array1<f64>> {
    if region.is_empty() {
        return Err(AbsorptionError::EmptyRegion {
            rows: region.rows().len(),
            cols: region.cols().len(),
        });
    }
    let crop = volume.read_region(depth, region.rows(), region.cols())?;
    debug!("cropped {:?} at depth {depth}: {:?}", region, crop.dim());
    log_column_means(crop.view())
}

pub fn log_column_means(crop: ArrayView2<u16>) -> Result<Array1<f64>> {
    let (rows, cols) = crop.dim();
    if rows == 0 || cols == 0 {
        return Err(AbsorptionError::EmptyRegion { rows, cols });
    }
    let sums = crop.mapv(f64::from).sum_axis(Axis(0));
    Ok(sums.mapv(|s| (s / rows as f64).ln()))
}
