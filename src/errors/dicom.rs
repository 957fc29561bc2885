use dicom::core::value::ConvertValueError;
use dicom::object::ReadError;
use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DicomError {
    #[snafu(display("error reading DICOM file {}: {:?}", path.display(), source))]
    ReadError {
        path: PathBuf,
        #[snafu(source(from(ReadError, Box::new)))]
        source: Box<ReadError>,
    },

    #[snafu(display("missing DICOM property: {}", name))]
    MissingPropertyError { name: &'static str },

    #[snafu(display("unable to convert DICOM property value '{}': {:?}", name, source))]
    ConvertValueError {
        name: &'static str,
        #[snafu(source(from(ConvertValueError, Box::new)))]
        source: Box<ConvertValueError>,
    },

    #[snafu(display("invalid DICOM property value '{}': {}", name, value))]
    InvalidValueError { name: &'static str, value: String },

    #[snafu(display("error parsing float in '{}': {:?}", name, source))]
    ParseFloatError {
        name: &'static str,
        #[snafu(source(from(std::num::ParseFloatError, Box::new)))]
        source: Box<std::num::ParseFloatError>,
    },

    #[snafu(display("tag {} has invalid length: {} (expected {})", name, actual, expected))]
    CardinalityError {
        name: &'static str,
        actual: usize,
        expected: usize,
    },

    #[snafu(display("error processing DICOM pixel data: {:?}", source))]
    PixelDataError {
        #[snafu(source(from(dicom::pixeldata::Error, Box::new)))]
        source: Box<dicom::pixeldata::Error>,
    },

    #[snafu(display("no DICOM file with SOP Instance UID {} in {}", uid, path.display()))]
    SliceNotFound { uid: String, path: PathBuf },

    #[snafu(display("{}", message))]
    Other { message: String },
}
