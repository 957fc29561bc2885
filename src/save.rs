use clap::ValueEnum;
use image::GrayImage;
use ndarray::Array2;
use ndarray_npy::WriteNpyError;
use snafu::{ResultExt, Snafu};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tiff::encoder::colortype::Gray8;
use tiff::encoder::compression::{Compression, Compressor, Lzw, Packbits, Uncompressed};
use tiff::encoder::TiffEncoder;
use tiff::TiffError;

use crate::normalize::to_unit_range;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SaveError {
    #[snafu(display("unsupported output extension: {}", path.display()))]
    UnsupportedFormat { path: PathBuf },

    #[snafu(display("could not create output file {}", path.display()))]
    CreateFile {
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
        path: PathBuf,
    },

    #[snafu(display("could not write NPY file {}", path.display()))]
    WriteNpy {
        #[snafu(source(from(WriteNpyError, Box::new)))]
        source: Box<WriteNpyError>,
        path: PathBuf,
    },

    #[snafu(display("could not write PNG file {}", path.display()))]
    WritePng {
        #[snafu(source(from(image::ImageError, Box::new)))]
        source: Box<image::ImageError>,
        path: PathBuf,
    },

    #[snafu(display("could not write TIFF file {}", path.display()))]
    WriteTiff {
        #[snafu(source(from(TiffError, Box::new)))]
        source: Box<TiffError>,
        path: PathBuf,
    },

    #[snafu(display("mask of {}x{} pixels does not fit an image buffer", rows, columns))]
    ConvertArrayToImage { rows: usize, columns: usize },
}

/// On-disk format of a saved mask or slice array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MaskFormat {
    #[default]
    Npy,
    Png,
    Tiff,
}

impl MaskFormat {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, SaveError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("npy") => Ok(MaskFormat::Npy),
            Some("png") => Ok(MaskFormat::Png),
            Some("tiff") | Some("tif") => Ok(MaskFormat::Tiff),
            _ => UnsupportedFormatSnafu { path }.fail(),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            MaskFormat::Npy => "npy",
            MaskFormat::Png => "png",
            MaskFormat::Tiff => "tiff",
        }
    }
}

impl fmt::Display for MaskFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// TIFF compression offered on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SupportedCompressor {
    #[default]
    Packbits,
    Lzw,
    Uncompressed,
}

impl From<SupportedCompressor> for Compressor {
    fn from(value: SupportedCompressor) -> Self {
        match value {
            SupportedCompressor::Packbits => Compressor::Packbits(Packbits),
            SupportedCompressor::Lzw => Compressor::Lzw(Lzw),
            SupportedCompressor::Uncompressed => Compressor::Uncompressed(Uncompressed),
        }
    }
}

impl fmt::Display for SupportedCompressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupportedCompressor::Packbits => "packbits",
            SupportedCompressor::Lzw => "lzw",
            SupportedCompressor::Uncompressed => "none",
        };
        write!(f, "{}", name)
    }
}

/// Foreground value of saved `.npy` masks. Image formats always store 0/255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MaskRange {
    /// `u8` masks with foreground 255
    #[default]
    Byte,
    /// `f32` masks with foreground 1.0
    Unit,
}

impl fmt::Display for MaskRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MaskRange::Byte => "byte",
            MaskRange::Unit => "unit",
        };
        write!(f, "{}", name)
    }
}

/// Saves masks and normalized slices. The format follows the output extension.
pub struct MaskSaver {
    compressor: Compressor,
    range: MaskRange,
}

impl Default for MaskSaver {
    fn default() -> Self {
        Self::new(Compressor::Packbits(Packbits))
    }
}

fn write_tiff<D: Compression>(
    path: &Path,
    columns: u32,
    rows: u32,
    data: &[u8],
    compression: D,
) -> Result<(), SaveError> {
    let file = File::create(path).context(CreateFileSnafu { path })?;
    let mut encoder = TiffEncoder::new(file).context(WriteTiffSnafu { path })?;
    let tiff = encoder
        .new_image_with_compression::<Gray8, _>(columns, rows, compression)
        .context(WriteTiffSnafu { path })?;
    tiff.write_data(data).context(WriteTiffSnafu { path })?;
    Ok(())
}

impl MaskSaver {
    /// TIFF output uses `compressor`; other formats are uncompressed.
    pub fn new(compressor: Compressor) -> Self {
        Self {
            compressor,
            range: MaskRange::default(),
        }
    }

    pub fn with_range(self, range: MaskRange) -> Self {
        Self { range, ..self }
    }

    /// Save a 0/255 mask.
    pub fn save_mask<P: AsRef<Path>>(&self, mask: &Array2<u8>, path: P) -> Result<(), SaveError> {
        let path = path.as_ref();
        match MaskFormat::from_path(path)? {
            MaskFormat::Npy => match self.range {
                MaskRange::Byte => ndarray_npy::write_npy(path, mask),
                MaskRange::Unit => ndarray_npy::write_npy(path, &to_unit_range(mask)),
            }
            .context(WriteNpySnafu { path }),
            MaskFormat::Png => self.to_gray_image(mask)?.save(path).context(WritePngSnafu { path }),
            MaskFormat::Tiff => self.save_tiff(mask, path),
        }
    }

    /// Save a `[0, 1]` slice. Image formats are quantized to 8 bits.
    pub fn save_array<P: AsRef<Path>>(&self, array: &Array2<f32>, path: P) -> Result<(), SaveError> {
        let path = path.as_ref();
        match MaskFormat::from_path(path)? {
            MaskFormat::Npy => ndarray_npy::write_npy(path, array).context(WriteNpySnafu { path }),
            _ => {
                let quantized = array.mapv(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8);
                self.save_mask(&quantized, path)
            }
        }
    }

    fn to_gray_image(&self, mask: &Array2<u8>) -> Result<GrayImage, SaveError> {
        let (rows, columns) = mask.dim();
        GrayImage::from_raw(columns as u32, rows as u32, mask.iter().copied().collect())
            .ok_or(SaveError::ConvertArrayToImage { rows, columns })
    }

    fn save_tiff(&self, mask: &Array2<u8>, path: &Path) -> Result<(), SaveError> {
        let (rows, columns) = mask.dim();
        let data = mask.iter().copied().collect::<Vec<_>>();
        let (columns, rows) = (columns as u32, rows as u32);
        match &self.compressor {
            Compressor::Uncompressed(c) => write_tiff(path, columns, rows, &data, *c),
            Compressor::Packbits(c) => write_tiff(path, columns, rows, &data, *c),
            Compressor::Lzw(c) => write_tiff(path, columns, rows, &data, *c),
            Compressor::Deflate(c) => write_tiff(path, columns, rows, &data, *c),
        }
    }
}
