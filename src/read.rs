//! Lazy access to headerless raw volumes.
//!
//! A raw file is a flat sequence of planes, each `height * width`
//! little-endian `u16` samples. Nothing is kept resident: every read opens
//! the file, seeks to the byte offset of the requested samples and decodes
//! only those.

use std::{
    fs::File,
    io::{Seek, SeekFrom},
    ops::{Bound, Range, RangeBounds},
    path::{Path, PathBuf},
};

use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;
use ndarray::{Array2, Array3, Axis, s};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::{
    config::VolumeGeometry,
    error::{AbsorptionError, Result},
};

#[derive(Debug, Clone)]
pub struct RawVolume {
    path: PathBuf,
    geometry: VolumeGeometry,
    depth: usize,
}

impl RawVolume {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_geometry(path, VolumeGeometry::default())
    }

    pub fn open_with_geometry(path: impl AsRef<Path>, geometry: VolumeGeometry) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let file_size = std::fs::metadata(&path)
            .map_err(|e| AbsorptionError::io(&path, e))?
            .len();
        let plane_bytes = geometry.plane_bytes();
        if plane_bytes == 0 || file_size % plane_bytes != 0 {
            return Err(AbsorptionError::Format(format!(
                "{} is {file_size} bytes, not a multiple of the {plane_bytes} byte plane size",
                path.display()
            )));
        }
        let depth = (file_size / plane_bytes) as usize;
        debug!(
            "opened {path:?}: {depth}x{}x{}",
            geometry.height, geometry.width
        );
        Ok(Self {
            path,
            geometry,
            depth,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `(depth, height, width)`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.depth, self.geometry.height, self.geometry.width)
    }

    pub fn ndim(&self) -> usize {
        3
    }

    pub fn geometry(&self) -> VolumeGeometry {
        self.geometry
    }

    pub fn read_plane(&self, index: usize) -> Result<Array2<u16>> {
        self.check_depth(index)?;
        let VolumeGeometry { height, width } = self.geometry;
        let samples = self.read_samples(index * self.geometry.plane_len(), height * width)?;
        Ok(Array2::from_shape_vec((height, width), samples)?)
    }

    /// Reads the rows `rows` of plane `depth` in one contiguous read and
    /// keeps the columns `cols`. Open bounds default to the plane edges.
    pub fn read_region(
        &self,
        depth: usize,
        rows: impl RangeBounds<usize>,
        cols: impl RangeBounds<usize>,
    ) -> Result<Array2<u16>> {
        self.check_depth(depth)?;
        let VolumeGeometry { height, width } = self.geometry;
        let rows = resolve_bounds("row", &rows, height)?;
        let cols = resolve_bounds("column", &cols, width)?;

        let offset = depth * self.geometry.plane_len() + rows.start * width;
        let samples = self.read_samples(offset, rows.len() * width)?;
        let band = Array2::from_shape_vec((rows.len(), width), samples)?;
        Ok(band.slice(s![.., cols]).to_owned())
    }

    /// Loads every plane. Only sensible for small volumes.
    pub fn read_all(&self) -> Result<Array3<u16>> {
        let VolumeGeometry { height, width } = self.geometry;
        let planes: Vec<Array2<u16>> = (0..self.depth)
            .into_par_iter()
            .map(|z| self.read_plane(z))
            .collect::<Result<_>>()?;

        let mut volume = Array3::zeros((self.depth, height, width));
        for (mut dest, plane) in volume.axis_iter_mut(Axis(0)).zip(planes) {
            dest.assign(&plane);
        }
        Ok(volume)
    }

    fn check_depth(&self, index: usize) -> Result<()> {
        if index >= self.depth {
            return Err(AbsorptionError::index_out_of_range(
                "depth", index, self.depth,
            ));
        }
        Ok(())
    }

    /// `offset` and `count` are in samples, not bytes.
    fn read_samples(&self, offset: usize, count: usize) -> Result<Vec<u16>> {
        let mut samples = vec![0u16; count];
        if count == 0 {
            return Ok(samples);
        }
        let io_err = |e| AbsorptionError::io(&self.path, e);
        let mut file = File::open(&self.path).map_err(io_err)?;
        file.seek(SeekFrom::Start(2 * offset as u64))
            .map_err(io_err)?;
        file.read_u16_into::<LittleEndian>(&mut samples)
            .map_err(io_err)?;
        Ok(samples)
    }
}

fn resolve_bounds(
    axis: &'static str,
    bounds: &impl RangeBounds<usize>,
    len: usize,
) -> Result<Range<usize>> {
    let out_of_range = |start, end| AbsorptionError::OutOfRange {
        axis,
        start,
        end,
        len,
    };
    let start = match bounds.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.checked_add(1).ok_or_else(|| out_of_range(s, s))?,
        Bound::Unbounded => 0,
    };
    let end = match bounds.end_bound() {
        Bound::Included(&e) => e.checked_add(1).ok_or_else(|| out_of_range(start, e))?,
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    };
    if start > end || end > len {
        return Err(out_of_range(start, end));
    }
    Ok(start..end)
}
