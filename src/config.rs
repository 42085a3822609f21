//! Analysis settings shared by every stage of the pipeline.
//!
//! All values have defaults matching the acquisition setup the tool was
//! written for; a JSON file may override any subset of them.

use std::{fs, path::Path};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AbsorptionError, Result},
    signal::{FilterConfig, ReferenceMode},
};

/// Plane dimensions of the raw format. Depth is never configured, it is
/// derived from the file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeGeometry {
    pub height: usize,
    pub width: usize,
}

impl VolumeGeometry {
    pub const fn plane_len(&self) -> usize {
        self.height * self.width
    }

    /// Byte size of one plane (2 bytes per sample).
    pub const fn plane_bytes(&self) -> u64 {
        2 * self.plane_len() as u64
    }
}

impl Default for VolumeGeometry {
    fn default() -> Self {
        Self {
            height: 2048,
            width: 2048,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub geometry: VolumeGeometry,
    /// Display contrast hint handed to the viewer, not a data statistic.
    pub contrast_limits: [u16; 2],
    /// Micrometers per sample along the profile axis.
    pub transverse_resolution: f64,
    /// Divide aligned profiles by their maximum before output.
    pub normalize: bool,
    pub fit_filter: FilterConfig,
    pub align_filter: FilterConfig,
    pub reference_mode: ReferenceMode,
    /// Report absorption per micrometer instead of per sample.
    pub scale_by_resolution: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            geometry: VolumeGeometry::default(),
            contrast_limits: [0, 5000],
            transverse_resolution: 5.26,
            normalize: false,
            fit_filter: FilterConfig::FIT,
            align_filter: FilterConfig::ALIGNMENT,
            reference_mode: ReferenceMode::DerivativeMax,
            scale_by_resolution: false,
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| AbsorptionError::io(path, e))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| AbsorptionError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        debug!("loaded configuration from {path:?}: {config:?}");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.geometry.height == 0 || self.geometry.width == 0 {
            return Err(AbsorptionError::Config(format!(
                "plane dimensions must be non-zero, got {}x{}",
                self.geometry.height, self.geometry.width
            )));
        }
        if !(self.transverse_resolution.is_finite() && self.transverse_resolution > 0.0) {
            return Err(AbsorptionError::Config(format!(
                "transverse_resolution must be positive, got {}",
                self.transverse_resolution
            )));
        }
        let [lo, hi] = self.contrast_limits;
        if lo >= hi {
            return Err(AbsorptionError::Config(format!(
                "contrast limits must be increasing, got [{lo}, {hi}]"
            )));
        }
        self.fit_filter.validate()?;
        self.align_filter.validate()?;
        Ok(())
    }
}
