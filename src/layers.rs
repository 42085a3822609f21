//! Entry point for image viewers: recognizes raw files and hands back one
//! lazy image layer per file plus an empty annotation layer.

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

use log::info;

use crate::{
    config::AnalysisConfig,
    error::{AbsorptionError, Result},
    read::RawVolume,
};

pub const RAW_EXTENSION: &str = "raw";
pub const SHAPES_LAYER_NAME: &str = "Draw a rectangle";

#[derive(Debug, Clone)]
pub enum LayerData {
    Image {
        data: RawVolume,
        name: String,
        contrast_limits: [u16; 2],
    },
    /// Empty layer the user draws regions on.
    Shapes { name: String },
}

impl LayerData {
    pub fn name(&self) -> &str {
        match self {
            LayerData::Image { name, .. } | LayerData::Shapes { name } => name,
        }
    }
}

pub type Reader = fn(&[PathBuf], &AnalysisConfig) -> Result<Vec<LayerData>>;

pub fn is_raw(path: &Path) -> bool {
    path.extension() == Some(OsStr::new(RAW_EXTENSION))
}

/// Returns a reader only if every path is a `.raw` file.
pub fn get_reader<P: AsRef<Path>>(paths: &[P]) -> Option<Reader> {
    if paths.is_empty() || !paths.iter().all(|p| is_raw(p.as_ref())) {
        return None;
    }
    Some(read_layers as Reader)
}

pub fn read_layers(paths: &[PathBuf], config: &AnalysisConfig) -> Result<Vec<LayerData>> {
    let mut layers = Vec::with_capacity(paths.len() + 1);
    for path in paths {
        if !is_raw(path) {
            return Err(AbsorptionError::Format(format!(
                "{} is not a .{RAW_EXTENSION} file",
                path.display()
            )));
        }
        let volume = RawVolume::open_with_geometry(path, config.geometry)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("opened {name}: {:?}", volume.shape());
        layers.push(LayerData::Image {
            data: volume,
            name,
            contrast_limits: config.contrast_limits,
        });
    }
    layers.push(LayerData::Shapes {
        name: SHAPES_LAYER_NAME.to_owned(),
    });
    Ok(layers)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::read::tests::{SMALL, write_volume};

    #[test]
    fn only_raw_paths_get_a_reader() {
        assert!(get_reader(&["a.raw", "b.raw"]).is_some());
        assert!(get_reader(&["a.raw", "b.tif"]).is_none());
        assert!(get_reader(&["a.RAW.gz"]).is_none());
        assert!(get_reader::<&str>(&[]).is_none());
    }

    #[test]
    fn one_image_per_file_then_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for (i, depth) in [2, 3].into_iter().enumerate() {
            let file = write_volume(SMALL, depth, |_, _, _| 7);
            let path = dir.path().join(format!("stack_{i}.raw"));
            fs::copy(file.path(), &path).unwrap();
            paths.push(path);
        }
        let config = AnalysisConfig {
            geometry: SMALL,
            ..Default::default()
        };

        let reader = get_reader(&paths).unwrap();
        let layers = reader(&paths, &config).unwrap();
        assert_eq!(layers.len(), 3);

        let LayerData::Image {
            data,
            name,
            contrast_limits,
        } = &layers[1]
        else {
            panic!("expected an image layer, got {:?}", layers[1]);
        };
        assert_eq!(name, "stack_1.raw");
        assert_eq!(*contrast_limits, [0, 5000]);
        assert_eq!(data.shape(), (3, 6, 8));
        assert_eq!(data.path(), paths[1]);
        assert_eq!(data.geometry(), SMALL);
        assert_eq!(layers[2].name(), SHAPES_LAYER_NAME);
    }

    #[test]
    fn wrong_extension_is_a_format_error() {
        let file = write_volume(SMALL, 1, |_, _, _| 0);
        let paths = vec![file.path().with_extension("tif")];
        assert!(matches!(
            read_layers(&paths, &AnalysisConfig::default()),
            Err(AbsorptionError::Format(_))
        ));
    }
}
