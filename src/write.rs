use std::{
    fs::File,
    io::{self, Write},
    path::Path,
};

use byteorder::{BigEndian, WriteBytesExt};
use tiff::encoder::{TiffEncoder, colortype};

use crate::error::{AbsorptionError, Result};

#[derive(Debug, clap::ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum Endianess {
    Big,
    Native,
}

pub fn write_tiff(
    filename: &Path,
    data: &[u16],
    width: usize,
    height: usize,
    endianess: Endianess,
) -> Result<()> {
    match endianess {
        Endianess::Big => write_tiff_big_endian(filename, data, width, height),
        Endianess::Native => write_tiff_native_endian(filename, data, width, height),
    }
}

pub fn write_tiff_native_endian(
    filename: &Path,
    data: &[u16],
    width: usize,
    height: usize,
) -> Result<()> {
    let mut out_file = File::create_new(filename).map_err(|e| AbsorptionError::io(filename, e))?;
    let mut tiff = TiffEncoder::new(&mut out_file)?;
    tiff.write_image::<colortype::Gray16>(width as u32, height as u32, data)?;
    Ok(())
}

// Big-endian files hold a single-strip, uncompressed, unsigned 16-bit
// grayscale image with the baseline tags in ascending order.
const IFD_ENTRIES: u16 = 13;
const HEADER_LEN: u32 = 8;
const IFD_LEN: u32 = 2 + 12 * IFD_ENTRIES as u32 + 4;
const RATIONAL_LEN: u32 = 8;

const SHORT: u16 = 3;
const LONG: u16 = 4;
const RATIONAL: u16 = 5;

/// Lays the whole file out in memory (header, one IFD, resolutions,
/// strip), then creates the output with `create_new` so that an existing
/// file is never touched.
pub fn write_tiff_big_endian(
    filename: &Path,
    data: &[u16],
    width: usize,
    height: usize,
) -> Result<()> {
    let layout = StripLayout::new(data.len(), width, height)?;
    let mut bytes = Vec::with_capacity(layout.file_len());
    layout
        .encode(&mut bytes, data)
        .map_err(|e| AbsorptionError::io(filename, e))?;

    let mut out_file = File::create_new(filename).map_err(|e| AbsorptionError::io(filename, e))?;
    out_file
        .write_all(&bytes)
        .map_err(|e| AbsorptionError::io(filename, e))?;
    Ok(())
}

/// Offsets of a file holding one uncompressed strip.
struct StripLayout {
    width: u32,
    height: u32,
    strip_len: u32,
}

impl StripLayout {
    const X_RESOLUTION: u32 = HEADER_LEN + IFD_LEN;
    const Y_RESOLUTION: u32 = Self::X_RESOLUTION + RATIONAL_LEN;
    const STRIP_OFFSET: u32 = Self::Y_RESOLUTION + RATIONAL_LEN;

    fn new(samples: usize, width: usize, height: usize) -> Result<Self> {
        if width.checked_mul(height) != Some(samples) {
            return Err(AbsorptionError::Format(format!(
                "{samples} samples do not fill a {width}x{height} image"
            )));
        }
        let too_large = || AbsorptionError::Format(format!("{width}x{height} is too large for TIFF"));
        let strip_len = samples
            .checked_mul(2)
            .and_then(|len| u32::try_from(len).ok())
            .filter(|len| len.checked_add(Self::STRIP_OFFSET).is_some())
            .ok_or_else(too_large)?;
        Ok(Self {
            width: u32::try_from(width).map_err(|_| too_large())?,
            height: u32::try_from(height).map_err(|_| too_large())?,
            strip_len,
        })
    }

    fn file_len(&self) -> usize {
        (Self::STRIP_OFFSET + self.strip_len) as usize
    }

    fn encode(&self, out: &mut impl Write, data: &[u16]) -> io::Result<()> {
        out.write_all(b"MM")?;
        out.write_u16::<BigEndian>(42)?;
        out.write_u32::<BigEndian>(HEADER_LEN)?;

        out.write_u16::<BigEndian>(IFD_ENTRIES)?;
        let entries = [
            (256, LONG, self.width),  // ImageWidth
            (257, LONG, self.height), // ImageLength
            (258, SHORT, 16),         // BitsPerSample
            (259, SHORT, 1),          // Compression: none
            (262, SHORT, 1),          // PhotometricInterpretation: black is zero
            (273, LONG, Self::STRIP_OFFSET),
            (277, SHORT, 1),           // SamplesPerPixel
            (278, LONG, self.height),  // RowsPerStrip: a single strip
            (279, LONG, self.strip_len),
            (282, RATIONAL, Self::X_RESOLUTION),
            (283, RATIONAL, Self::Y_RESOLUTION),
            (296, SHORT, 1), // ResolutionUnit: none
            (339, SHORT, 1), // SampleFormat: unsigned
        ];
        for (tag, kind, value) in entries {
            out.write_u16::<BigEndian>(tag)?;
            out.write_u16::<BigEndian>(kind)?;
            out.write_u32::<BigEndian>(1)?;
            // short values are left-justified in the value field
            if kind == SHORT {
                out.write_u16::<BigEndian>(value as u16)?;
                out.write_u16::<BigEndian>(0)?;
            } else {
                out.write_u32::<BigEndian>(value)?;
            }
        }
        out.write_u32::<BigEndian>(0)?;

        // 1/1 for both resolutions
        for _ in 0..4 {
            out.write_u32::<BigEndian>(1)?;
        }
        for &value in data {
            out.write_u16::<BigEndian>(value)?;
        }
        Ok(())
    }
}
