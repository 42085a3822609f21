use std::{
    error::Error,
    io::{self, Write},
    path::PathBuf,
};

use absorptix::{
    align::{align_profiles, load_profiles},
    analysis::{analyze_region, fit_shapes},
    config::AnalysisConfig,
    convert,
    fit::FitStrategy,
    layers::{LayerData, get_reader},
    read::RawVolume,
    region::{Shape, single_rectangle},
    signal::ReferenceMode,
    write::Endianess,
};
use clap::{Parser, Subcommand};
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use log::warn;
use ndarray::Array2;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(version, about = "Absorption analysis of raw microscopy volumes")]
struct Args {
    /// JSON file overriding the default analysis settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured reference landmark.
    #[arg(long, global = true)]
    reference: Option<ReferenceMode>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the shape and display range of raw volumes.
    Info { raw_paths: Vec<PathBuf> },
    /// Extract the filtered, aligned profile of one rectangle.
    Profile {
        raw_path: PathBuf,
        #[arg(long)]
        depth: usize,
        /// Rectangle corners as `row0,col0,row1,col1`.
        #[arg(long, value_parser = parse_rectangle)]
        region: Shape,
    },
    /// Fit the absorption model, automatically on every region or on the
    /// intervals between pairs of points on a single region.
    Fit {
        raw_path: PathBuf,
        #[arg(long)]
        depth: usize,
        #[arg(long = "region", value_parser = parse_rectangle, required = true)]
        regions: Vec<Shape>,
        /// Interval bounds in micrometers, given in pairs.
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        points: Option<Vec<f64>>,
    },
    /// Align stored profiles (rows of a .npy array, or the 1-D arrays of
    /// an .npz archive) on their reference landmark.
    Align {
        profiles: PathBuf,
        /// Divide each profile by its maximum.
        #[arg(long)]
        normalize: bool,
    },
    /// Export planes as 16-bit TIFF files.
    Convert {
        raw_path: PathBuf,
        dest_path: PathBuf,
        #[arg(default_value = "big")]
        endianess: Endianess,
        /// First plane to export, 1-indexed.
        #[arg(long, default_value_t = 1)]
        start: usize,
        /// Last plane to export, 1-indexed; the last plane if omitted.
        #[arg(long)]
        stop: Option<usize>,
    },
}

fn parse_rectangle(s: &str) -> Result<Shape, String> {
    let coords = s
        .split(',')
        .map(|c| c.trim().parse::<f64>().map_err(|e| format!("{c:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    let [r0, c0, r1, c1] = coords[..] else {
        return Err(format!("expected row0,col0,row1,col1, got {} values", coords.len()));
    };
    Ok(Shape::rectangle(
        Array2::from_shape_vec((2, 2), vec![r0, c0, r1, c1]).map_err(|e| e.to_string())?,
    ))
}

fn emit(value: &impl Serialize) -> Result<(), Box<dyn Error + Sync + Send>> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

#[derive(Serialize)]
struct VolumeInfo {
    name: String,
    path: PathBuf,
    shape: (usize, usize, usize),
    contrast_limits: [u16; 2],
}

fn main() -> Result<(), Box<dyn Error + Sync + Send>> {
    let env = env_logger::Env::default().filter_or("RUST_LOG", "info");
    let logger = env_logger::Builder::from_env(env).build();
    let level = logger.filter();
    let multi_progress = MultiProgress::new();
    LogWrapper::new(multi_progress.clone(), logger).try_init()?;
    log::set_max_level(level);

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(mode) = args.reference {
        config.reference_mode = mode;
    }

    match args.command {
        Command::Info { raw_paths } => {
            let Some(reader) = get_reader(&raw_paths) else {
                return Err(format!("not a list of .raw files: {raw_paths:?}").into());
            };
            let infos: Vec<VolumeInfo> = reader(&raw_paths, &config)?
                .into_iter()
                .filter_map(|layer| match layer {
                    LayerData::Image {
                        data,
                        name,
                        contrast_limits,
                    } => Some(VolumeInfo {
                        name,
                        path: data.path().to_owned(),
                        shape: data.shape(),
                        contrast_limits,
                    }),
                    LayerData::Shapes { .. } => None,
                })
                .collect();
            emit(&infos)?;
        }
        Command::Profile {
            raw_path,
            depth,
            region,
        } => {
            let volume = RawVolume::open_with_geometry(&raw_path, config.geometry)?;
            let region = single_rectangle(&[region])?;
            emit(&analyze_region(&volume, depth, &region, &config)?)?;
        }
        Command::Fit {
            raw_path,
            depth,
            regions,
            points,
        } => {
            let volume = RawVolume::open_with_geometry(&raw_path, config.geometry)?;
            let strategy = match points {
                Some(points) => FitStrategy::Manual(points),
                None => FitStrategy::Auto,
            };
            emit(&fit_shapes(&volume, depth, &regions, &strategy, &config)?)?;
        }
        Command::Align {
            profiles,
            normalize,
        } => {
            config.normalize |= normalize;
            let profiles = load_profiles(&profiles)?;
            if profiles.is_empty() {
                warn!("no profiles to align");
            }
            emit(&align_profiles(&profiles, &config)?)?;
        }
        Command::Convert {
            raw_path,
            dest_path,
            endianess,
            start,
            stop,
        } => {
            let volume = RawVolume::open_with_geometry(&raw_path, config.geometry)?;
            convert::convert(
                &volume,
                &dest_path,
                endianess,
                start,
                stop,
                &multi_progress,
            )?;
        }
    }

    Ok(())
}
