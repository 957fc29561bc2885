use dicom::object::{FileDicomObject, InMemDicomObject};
use dicom::pixeldata::{ConvertOptions, PixelDecoder};
use ndarray::Array2;
use snafu::ResultExt;

use crate::errors::{dicom::PixelDataSnafu, DicomError};

/// Scale an array linearly to `[0, 1]`. A constant array maps to zeros.
pub fn min_max(array: &Array2<f32>) -> Array2<f32> {
    let (min, max) = array
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return Array2::zeros(array.raw_dim());
    }
    array.mapv(|v| (v - min) / range)
}

/// Bring a 0/255 mask into 0/1. Masks already at most 1 are only cast.
pub fn to_unit_range(mask: &Array2<u8>) -> Array2<f32> {
    let max = mask.iter().copied().max().unwrap_or(0);
    if max > 1 {
        mask.mapv(|v| v as f32 / 255.0)
    } else {
        mask.mapv(f32::from)
    }
}

/// Decode the first frame of a slice and min-max normalize it.
pub fn slice_array(file: &FileDicomObject<InMemDicomObject>) -> Result<Array2<f32>, DicomError> {
    let image = file
        .decode_pixel_data_frame(0)
        .context(PixelDataSnafu)?
        .to_dynamic_image_with_options(0, &ConvertOptions::default())
        .context(PixelDataSnafu)?
        .to_luma32f();

    let (width, height) = image.dimensions();
    let array = Array2::from_shape_vec((height as usize, width as usize), image.into_raw())
        .map_err(|e| DicomError::Other {
            message: format!("pixel buffer does not match {}x{}: {}", height, width, e),
        })?;
    Ok(min_max(&array))
}
