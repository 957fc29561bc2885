pub mod contour;
pub mod dicom;
pub mod mask;

pub use contour::ContourError;
pub use dicom::DicomError;
pub use mask::MaskError;
