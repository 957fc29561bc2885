use dicom::dictionary_std::tags;
use dicom::object::open_file;
use dicom::object::DefaultDicomObject;
use dicom::object::ReadError;
use snafu::ResultExt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::str::FromStr;

use indicatif::{ProgressBar, ProgressStyle};
use rust_search::SearchBuilder;
use std::path::Path;

use crate::errors::dicom::{ConvertValueSnafu, ReadSnafu};
use crate::errors::DicomError;

pub const DICM_PREFIX: &[u8; 4] = b"DICM";
pub const DICM_PREFIX_LOCATION: u64 = 128;

type IOResult<T> = Result<T, std::io::Error>;

pub fn default_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta} @ {per_sec})",
            )
            .unwrap(),
    );
    pb
}

/// Read the SOP Instance UID of a loaded object, without padding.
pub fn sop_instance_uid(file: &DefaultDicomObject) -> Result<String, DicomError> {
    let name = "SOP Instance UID";
    let uid = file
        .get(tags::SOP_INSTANCE_UID)
        .ok_or(DicomError::MissingPropertyError { name })?
        .value()
        .to_str()
        .context(ConvertValueSnafu { name })?;
    Ok(uid.trim_end_matches('\0').trim().to_string())
}

pub trait DicomFileOperations
where
    Self: AsRef<Path>,
{
    /// Check if a file has a DICM prefix.
    /// This will only return an error if the file cannot be opened.
    /// Any other errors mapped to `false`.
    fn has_dicm_prefix(&self) -> IOResult<bool> {
        let mut reader = File::open(self.as_ref())?;
        let mut buffer = [0; DICM_PREFIX.len()];
        reader
            .seek(SeekFrom::Start(DICM_PREFIX_LOCATION))
            .and_then(|_| reader.read_exact(&mut buffer))
            .map_or(Ok(false), |_| Ok(&buffer == DICM_PREFIX))
    }

    /// Check if a file has a DICOM extension.
    fn has_dicom_extension(&self) -> bool {
        let path = self.as_ref();
        if let Some(ext) = path.extension() {
            return ext == "dcm" || ext == "dicom" || ext == "DCM" || ext == "DICOM";
        }
        false
    }

    /// Check if a path is a DICOM file as efficiently as possible.
    /// The function will use the file extension if available, otherwise it will check the DICM prefix.
    fn is_dicom_file(&self) -> IOResult<bool> {
        let path = self.as_ref();
        if self.has_dicom_extension() {
            Ok(path.is_file())
        } else if path.extension().is_some() || path.is_dir() {
            Ok(false)
        } else {
            self.has_dicm_prefix()
        }
    }

    /// Similar to `is_dicom_file`, but returns a default value if an error occurs.
    fn is_dicom_file_or(&self, default: bool) -> bool {
        self.is_dicom_file().unwrap_or(default)
    }

    /// Find all DICOM files in a directory.
    fn find_dicoms(&self) -> IOResult<impl Iterator<Item = PathBuf>> {
        let dir = self.as_ref();
        if !dir.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Not a directory",
            ));
        }
        let result = SearchBuilder::default()
            .location(dir)
            .build()
            .filter(move |file| file.is_dicom_file_or(false))
            .filter_map(|file| PathBuf::from_str(file.as_str()).ok());
        Ok(result)
    }

    /// Read the DICOM file.
    fn dcmread(&self) -> Result<DefaultDicomObject, ReadError> {
        open_file(self.as_ref())
    }

    /// Load the slice with the given SOP Instance UID.
    ///
    /// A file path is opened directly and its UID is checked. A directory is searched
    /// recursively for the first DICOM file carrying the UID. Unreadable files met
    /// during the search are skipped.
    fn find_slice(&self, uid: &str) -> Result<DefaultDicomObject, DicomError> {
        let path = self.as_ref();
        if !path.is_dir() {
            let file = self.dcmread().context(ReadSnafu { path })?;
            return match sop_instance_uid(&file)? == uid {
                true => Ok(file),
                false => Err(DicomError::SliceNotFound {
                    uid: uid.to_string(),
                    path: path.to_path_buf(),
                }),
            };
        }

        let candidates = path.find_dicoms().map_err(|e| DicomError::Other {
            message: format!("unable to search {}: {}", path.display(), e),
        })?;
        for candidate in candidates {
            let file = match candidate.dcmread() {
                Ok(file) => file,
                Err(e) => {
                    tracing::debug!("Skipping unreadable file {}: {}", candidate.display(), e);
                    continue;
                }
            };
            if sop_instance_uid(&file).is_ok_and(|found| found == uid) {
                tracing::debug!("Found slice {} at {}", uid, candidate.display());
                return Ok(file);
            }
        }
        Err(DicomError::SliceNotFound {
            uid: uid.to_string(),
            path: path.to_path_buf(),
        })
    }
}

impl<P: AsRef<Path>> DicomFileOperations for P {}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CT_SMALL_UID: &str = "1.3.6.1.4.1.5962.1.1.1.1.1.20040119072730.12322";

    #[rstest]
    #[case::empty_file(vec![], false)]
    #[case::dicm_prefix(b"DICM".to_vec(), true)]
    #[case::wrong_prefix(b"NOT_DICM".to_vec(), false)]
    fn test_has_dicm_prefix(#[case] contents: Vec<u8>, #[case] expected: bool) {
        let mut temp = NamedTempFile::new().unwrap();
        temp.seek(SeekFrom::Start(DICM_PREFIX_LOCATION)).unwrap();
        temp.write_all(&contents).unwrap();

        let result = temp.path().has_dicm_prefix().unwrap();
        assert_eq!(result, expected);
    }

    #[test]
    fn test_has_dicm_prefix_real_dicom() {
        let dicom_file_path = dicom_test_files::path("pydicom/CT_small.dcm").unwrap();
        let result = dicom_file_path.has_dicm_prefix().unwrap();
        assert!(result);
    }

    #[rstest]
    #[case::no_extension("test", false)]
    #[case::wrong_extension("test.txt", false)]
    #[case::dcm_extension("test.dcm", true)]
    #[case::dicom_extension("test.dicom", true)]
    #[case::dcm_extension_uppercase("test.DCM", true)]
    #[case::mixed_case("test.DiCoM", false)]
    fn test_has_dicom_extension(#[case] path: &str, #[case] expected: bool) {
        let path = PathBuf::from(path);
        assert_eq!(path.has_dicom_extension(), expected);
    }

    #[test]
    fn test_find_dicom_files() {
        let temp_dir = tempfile::tempdir().unwrap();

        let dicom_path = dicom_test_files::path("pydicom/CT_small.dcm").unwrap();
        let dicom_dest = temp_dir.path().join("test.dcm");
        std::fs::copy(&dicom_path, &dicom_dest).unwrap();
        std::fs::write(temp_dir.path().join("test.txt"), "not a DICOM file").unwrap();

        let sub_dir = temp_dir.path().join("subdir");
        std::fs::create_dir(&sub_dir).unwrap();
        let sub_dicom = sub_dir.join("sub.dcm");
        std::fs::copy(&dicom_path, &sub_dicom).unwrap();

        let files: Vec<_> = temp_dir.path().find_dicoms().unwrap().collect();
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|p| p == &dicom_dest));
        assert!(files.iter().any(|p| p == &sub_dicom));
    }

    #[test]
    fn test_sop_instance_uid() {
        let path = dicom_test_files::path("pydicom/CT_small.dcm").unwrap();
        let file = path.dcmread().unwrap();
        assert_eq!(sop_instance_uid(&file).unwrap(), CT_SMALL_UID);
    }

    #[test]
    fn test_find_slice_in_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let series = temp_dir.path().join("series");
        std::fs::create_dir(&series).unwrap();
        std::fs::write(series.join("notes.dcm"), "not a DICOM file").unwrap();
        let dicom_path = dicom_test_files::path("pydicom/CT_small.dcm").unwrap();
        std::fs::copy(&dicom_path, series.join("slice.dcm")).unwrap();

        let file = series.find_slice(CT_SMALL_UID).unwrap();
        assert_eq!(sop_instance_uid(&file).unwrap(), CT_SMALL_UID);
    }

    #[rstest]
    #[case::file(false)]
    #[case::directory(true)]
    fn test_find_slice_missing(#[case] directory: bool) {
        let temp_dir = tempfile::tempdir().unwrap();
        let dicom_path = dicom_test_files::path("pydicom/CT_small.dcm").unwrap();
        let dest = temp_dir.path().join("slice.dcm");
        std::fs::copy(&dicom_path, &dest).unwrap();

        let source = match directory {
            true => temp_dir.path().to_path_buf(),
            false => dest,
        };
        let result = source.find_slice("1.2.3.4");
        assert!(matches!(result, Err(DicomError::SliceNotFound { .. })));
    }
}
