use ndarray::Array2;
use snafu::{ResultExt, Snafu};
use std::path::{Path, PathBuf};

use crate::contour::Contour;
use crate::errors::dicom::ReadSnafu;
use crate::errors::{ContourError, DicomError, MaskError};
use crate::file::{sop_instance_uid, DicomFileOperations};
use crate::geometry::ImagePlane;
use crate::normalize::slice_array;
use crate::rasterize::{PointSpace, Rasterized, Rasterizer};
use crate::repair_log::RepairLog;
use crate::save::{MaskSaver, SaveError};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ExportError {
    #[snafu(display("could not load slice from {}: {}", path.display(), source))]
    LoadSlice {
        path: PathBuf,
        #[snafu(source(from(DicomError, Box::new)))]
        source: Box<DicomError>,
    },

    #[snafu(display("could not read contour: {}", source))]
    LoadContour {
        #[snafu(source(from(ContourError, Box::new)))]
        source: Box<ContourError>,
    },

    #[snafu(display("could not rasterize contour for {}: {}", uid, source))]
    Rasterize { uid: String, source: MaskError },

    #[snafu(display("could not normalize slice {}: {}", uid, source))]
    Normalize {
        uid: String,
        #[snafu(source(from(DicomError, Box::new)))]
        source: Box<DicomError>,
    },

    #[snafu(display("could not save {}: {}", path.display(), source))]
    Save {
        path: PathBuf,
        #[snafu(source(from(SaveError, Box::new)))]
        source: Box<SaveError>,
    },

    #[snafu(display("could not create output directory {}: {}", path.display(), source))]
    CreateDir {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("could not write repair log for {}: {}", uid, source))]
    WriteLog {
        uid: String,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },
}

/// Where one slice export comes from.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSource {
    /// A DICOM file, or a series directory searched for `sop_instance_uid`.
    pub dicom: PathBuf,
    pub contour: PathBuf,
    /// Required when `dicom` is a directory. For a file, it is checked when given.
    pub sop_instance_uid: Option<String>,
}

/// Files written for one slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFiles {
    pub mask: PathBuf,
    pub image: Option<PathBuf>,
    /// `None` when the slice needed no repairs.
    pub log: Option<PathBuf>,
}

/// A rasterized slice, ready to be written.
#[derive(Debug, Clone)]
pub struct SliceExport {
    pub sop_instance_uid: String,
    pub plane: ImagePlane,
    pub contour: Contour,
    pub rasterized: Rasterized,
    /// Min-max normalized pixel data, when requested.
    pub image: Option<Array2<f32>>,
}

impl SliceExport {
    pub fn load(
        source: &ExportSource,
        rasterizer: &Rasterizer,
        space: PointSpace,
        with_image: bool,
    ) -> Result<Self, ExportError> {
        let dicom = source.dicom.as_path();
        let file = match (&source.sop_instance_uid, dicom.is_dir()) {
            (Some(uid), _) => dicom.find_slice(uid),
            (None, true) => Err(DicomError::Other {
                message: "a SOP Instance UID is needed to search a directory".to_string(),
            }),
            (None, false) => dicom.dcmread().context(ReadSnafu { path: dicom }),
        }
        .context(LoadSliceSnafu { path: dicom })?;

        let uid = sop_instance_uid(&file).context(LoadSliceSnafu { path: dicom })?;
        let plane = ImagePlane::try_from(&file).context(LoadSliceSnafu { path: dicom })?;
        let contour = Contour::load(&source.contour).context(LoadContourSnafu)?;

        let rasterized = rasterizer
            .rasterize(&plane, &contour.points, space)
            .context(RasterizeSnafu { uid: uid.as_str() })?;
        tracing::debug!(
            "Rasterized {} points for {} into {} foreground pixels",
            contour.len(),
            uid,
            rasterized.foreground_count()
        );

        let image = match with_image {
            true => Some(slice_array(&file).context(NormalizeSnafu { uid: uid.as_str() })?),
            false => None,
        };

        Ok(Self {
            sop_instance_uid: uid,
            plane,
            contour,
            rasterized,
            image,
        })
    }

    /// Write the mask, the image if it was loaded and `image_path` is given, and the
    /// repair log. Parent directories are created as needed.
    pub fn write(
        &self,
        saver: &MaskSaver,
        mask_path: &Path,
        image_path: Option<&Path>,
        log: Option<(&RepairLog, &str)>,
    ) -> Result<WrittenFiles, ExportError> {
        create_parent(mask_path)?;
        saver
            .save_mask(&self.rasterized.mask, mask_path)
            .context(SaveSnafu { path: mask_path })?;

        let image = match (&self.image, image_path) {
            (Some(image), Some(path)) => {
                create_parent(path)?;
                saver.save_array(image, path).context(SaveSnafu { path })?;
                Some(path.to_path_buf())
            }
            _ => None,
        };

        let log = match log {
            Some((log, name)) => log
                .write(name, &self.rasterized.repairs)
                .context(WriteLogSnafu {
                    uid: self.sop_instance_uid.as_str(),
                })?,
            None => None,
        };
        if let Some(path) = &log {
            tracing::info!(
                "Logged {} repairs for {} to {}",
                self.rasterized.repairs.len(),
                self.sop_instance_uid,
                path.display()
            );
        }

        Ok(WrittenFiles {
            mask: mask_path.to_path_buf(),
            image,
            log,
        })
    }
}

fn create_parent(path: &Path) -> Result<(), ExportError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).context(CreateDirSnafu { path: parent })
        }
        _ => Ok(()),
    }
}
