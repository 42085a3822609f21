//! Export of raw planes as numbered TIFF files, e.g. for tools that cannot
//! read the raw format.

use std::{path::Path, time::Instant};

use indicatif::{MultiProgress, ParallelProgressIterator, ProgressBar};
use log::{debug, info};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::{
    config::VolumeGeometry,
    error::{AbsorptionError, Result},
    read::RawVolume,
    write::{Endianess, write_tiff},
};

/// Writes planes `start_at_frame..=stop_at_frame` (1-indexed, last plane if
/// no stop is given) to `dest_path` and returns how many were written.
pub fn convert(
    volume: &RawVolume,
    dest_path: &Path,
    endianess: Endianess,
    start_at_frame: usize,
    stop_at_frame: Option<usize>,
    multi_progress: &MultiProgress,
) -> Result<usize> {
    let t0 = Instant::now();

    let nz = volume.shape().0;
    let VolumeGeometry {
        height: ny,
        width: nx,
    } = volume.geometry();
    info!("converting {:?}: {nz}x{ny}x{nx}", volume.path());
    info!("endianess: {:?}", endianess);

    let start = start_at_frame.saturating_sub(1);
    let stop = stop_at_frame.unwrap_or(nz);
    if start_at_frame == 0 || start > stop || stop > nz {
        return Err(AbsorptionError::OutOfRange {
            axis: "depth",
            start: start_at_frame,
            end: stop,
            len: nz,
        });
    }

    let idxs: Vec<usize> = (start..stop).collect();
    let len = idxs.len();
    let progress = multi_progress.add(ProgressBar::new(len as u64));

    idxs.into_par_iter()
        .progress_with(progress.clone())
        .map(|z| -> Result<()> {
            let (samples, _) = volume.read_plane(z)?.into_raw_vec_and_offset();
            let idx = z + 1 - start;
            let out_path = dest_path.join(format!("slice_{idx:05}.tif"));
            write_tiff(&out_path, &samples, nx, ny, endianess)?;
            debug!("created {out_path:?}");
            Ok(())
        })
        .collect::<Result<()>>()?;

    progress.finish();
    multi_progress.remove(&progress);

    info!("conversion of {len} planes done in {:?}", t0.elapsed());

    Ok(len)
}

#[cfg(test)]
mod tests {
    use indicatif::ProgressDrawTarget;

    use super::*;
    use crate::{
        read::tests::{SMALL, write_volume},
        write::tests::read_tiff,
    };

    fn hidden() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn writes_requested_planes() {
        let file = write_volume(SMALL, 4, |z, y, x| (z * 100 + y * 8 + x) as u16);
        let volume = RawVolume::open_with_geometry(file.path(), SMALL).unwrap();
        let dest = tempfile::tempdir().unwrap();

        let written = convert(&volume, dest.path(), Endianess::Native, 2, Some(3), &hidden()).unwrap();
        assert_eq!(written, 2);

        let (width, height, data) = read_tiff(&dest.path().join("slice_00002.tif"));
        assert_eq!((width, height), (8, 6));
        assert_eq!(data, volume.read_plane(2).unwrap().iter().copied().collect::<Vec<_>>());
        assert!(dest.path().join("slice_00001.tif").exists());
        assert!(!dest.path().join("slice_00003.tif").exists());
    }

    #[test]
    fn defaults_to_the_last_plane() {
        let file = write_volume(SMALL, 3, |_, _, _| 9);
        let volume = RawVolume::open_with_geometry(file.path(), SMALL).unwrap();
        let dest = tempfile::tempdir().unwrap();
        let written = convert(&volume, dest.path(), Endianess::Big, 1, None, &hidden()).unwrap();
        assert_eq!(written, 3);
        assert_eq!(read_tiff(&dest.path().join("slice_00003.tif")).2, vec![9; 48]);
    }

    #[test]
    fn rejects_bad_frame_ranges() {
        let file = write_volume(SMALL, 3, |_, _, _| 0);
        let volume = RawVolume::open_with_geometry(file.path(), SMALL).unwrap();
        let dest = tempfile::tempdir().unwrap();
        for (start, stop) in [(0, None), (3, Some(1)), (1, Some(4))] {
            assert!(matches!(
                convert(&volume, dest.path(), Endianess::Native, start, stop, &hidden()),
                Err(AbsorptionError::OutOfRange { axis: "depth", .. })
            ));
        }
    }
}
