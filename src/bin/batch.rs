use clap::Parser;
use csv::Reader as CsvReader;
use dicom_contour_mask::export::{ExportError, ExportSource, SliceExport, WrittenFiles};
use dicom_contour_mask::file::default_bar;
use dicom_contour_mask::rasterize::{RasterizeArgs, Rasterizer};
use dicom_contour_mask::repair_log::RepairLog;
use dicom_contour_mask::save::{MaskFormat, MaskRange, MaskSaver, SupportedCompressor};
use dicom_contour_mask::tally::{ExportTally, Outcome};
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{error, Level};

const MASK_DIR: &str = "masks";
const IMAGE_DIR: &str = "img";
const LOG_DIR: &str = "logs";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Invalid manifest path: {}", path.display()))]
    InvalidManifestPath { path: PathBuf },

    #[snafu(display("Manifest {} has no '{}' column", path.display(), column))]
    InvalidManifestFormat { path: PathBuf, column: &'static str },

    #[snafu(display("No entries found in manifest: {}", path.display()))]
    NoManifestEntries { path: PathBuf },

    #[snafu(display("Error reading CSV: {:?}", source))]
    Csv {
        #[snafu(source(from(csv::Error, Box::new)))]
        source: Box<csv::Error>,
    },

    #[snafu(display("IO error on {}: {:?}", path.display(), source))]
    IO {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("Error exporting {}: {}", path.display(), source))]
    Export {
        path: PathBuf,
        #[snafu(source(from(ExportError, Box::new)))]
        source: Box<ExportError>,
    },

    #[snafu(display("Output name {} was already used by another manifest entry", name))]
    DuplicateOutput { name: String },

    #[snafu(display("Tally ({}) does not account for {} manifest entries", tally, expected))]
    CountMismatch { tally: ExportTally, expected: usize },

    #[snafu(display("Found {} images but {} masks", images, masks))]
    ImageMaskMismatch { images: usize, masks: usize },
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "Rasterize the contours listed in a manifest into segmentation masks", long_about = None)]
struct Args {
    #[arg(
        help = "Manifest CSV with columns dicom, contour and optionally sop_instance_uid and label. Relative paths are resolved against the manifest directory"
    )]
    manifest: PathBuf,

    #[arg(help = "Output directory")]
    output: PathBuf,

    #[command(flatten)]
    rasterize: RasterizeArgs,

    #[arg(
        help = "Also save each min-max normalized slice under img/",
        long = "images",
        short = 'i',
        default_value_t = false
    )]
    images: bool,

    #[arg(
        help = "Mask file format",
        long = "format",
        short = 'f',
        value_enum,
        default_value_t = MaskFormat::default()
    )]
    format: MaskFormat,

    #[arg(
        help = "Compression for TIFF masks",
        long = "compressor",
        short = 'z',
        value_enum,
        default_value_t = SupportedCompressor::default()
    )]
    compressor: SupportedCompressor,

    #[arg(
        help = "Foreground value of .npy masks: 255 (byte) or 1.0 (unit)",
        long = "mask-range",
        value_enum,
        default_value_t = MaskRange::default()
    )]
    mask_range: MaskRange,

    #[arg(
        help = "Abort on the first failed entry instead of logging it and moving on",
        long = "strict",
        default_value_t = false
    )]
    strict: bool,

    #[arg(
        help = "Enable verbose logging",
        long = "verbose",
        short = 'v',
        default_value = "false"
    )]
    verbose: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct ManifestEntry {
    source: ExportSource,
    label: Option<String>,
    /// Occurrence of the same slice among earlier entries
    index: usize,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::ERROR
    };
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(level)
            .finish(),
    )
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    run(args).unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-1);
    });
}

fn non_empty(record: &HashMap<String, String>, column: &str) -> Option<String> {
    record
        .get(column)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn load_manifest(path: &Path) -> Result<Vec<ManifestEntry>, Error> {
    let base = path.parent().unwrap_or(Path::new("."));
    let resolve = |value: String| {
        let value = PathBuf::from(value);
        match value.is_relative() {
            true => base.join(value),
            false => value,
        }
    };

    let mut reader = CsvReader::from_path(path).context(CsvSnafu)?;
    let mut seen = HashMap::<(PathBuf, Option<String>), usize>::new();
    let mut entries = Vec::new();

    for result in reader.deserialize() {
        let record: HashMap<String, String> = result.context(CsvSnafu)?;
        let require = |column: &'static str| {
            non_empty(&record, column).ok_or(Error::InvalidManifestFormat {
                path: path.to_path_buf(),
                column,
            })
        };
        let source = ExportSource {
            dicom: resolve(require("dicom")?),
            contour: resolve(require("contour")?),
            sop_instance_uid: non_empty(&record, "sop_instance_uid"),
        };

        let count = seen
            .entry((source.dicom.clone(), source.sop_instance_uid.clone()))
            .or_default();
        entries.push(ManifestEntry {
            source,
            label: non_empty(&record, "label"),
            index: *count,
        });
        *count += 1;
    }

    Ok(entries)
}

/// `<output>/<kind>/<label>/`, without the label level for unlabeled entries.
fn partition_dir(output: &Path, kind: &str, label: Option<&str>) -> PathBuf {
    let dir = output.join(kind);
    match label {
        Some(label) => dir.join(label),
        None => dir,
    }
}

/// Outcome counts plus the files written by this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Summary {
    tally: ExportTally,
    masks: usize,
    images: usize,
}

impl Summary {
    fn record(mut self, written: Option<&WrittenFiles>) -> Self {
        match written {
            Some(written) => {
                self.tally = self.tally.record(&Outcome::Exported);
                self.masks += 1;
                self.images += usize::from(written.image.is_some());
            }
            None => self.tally = self.tally.record(&Outcome::Skipped),
        }
        self
    }

    fn record_result<E>(self, result: Result<Option<WrittenFiles>, E>) -> Self {
        match result {
            Ok(written) => self.record(written.as_ref()),
            Err(_) => Self {
                tally: self.tally.record(&Outcome::Failed),
                ..self
            },
        }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            tally: self.tally.merge(other.tally),
            masks: self.masks + other.masks,
            images: self.images + other.images,
        }
    }
}

/// Returns the files written, or `None` when the entry was skipped.
fn process_entry(
    entry: &ManifestEntry,
    args: &Args,
    rasterizer: &Rasterizer,
    saver: &MaskSaver,
    log: &RepairLog,
    claimed: &Mutex<HashSet<String>>,
) -> Result<Option<WrittenFiles>, Error> {
    let dicom = entry.source.dicom.as_path();
    let export = SliceExport::load(
        &entry.source,
        rasterizer,
        args.rasterize.space(),
        args.images,
    )
    .context(ExportSnafu { path: dicom })?;

    if export.contour.is_empty() {
        tracing::debug!(
            "Skipping {} with an empty contour {}",
            export.sop_instance_uid,
            entry.source.contour.display()
        );
        return Ok(None);
    }

    // Rows that reach one slice through different paths share an index, so their
    // outputs would overwrite each other
    let name = format!("{}_{}", export.sop_instance_uid, entry.index);
    let is_new = claimed
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(name.clone());
    if !is_new {
        return DuplicateOutputSnafu { name }.fail();
    }

    let label = entry.label.as_deref();
    let mask_path = partition_dir(&args.output, MASK_DIR, label)
        .join(format!("{}_mask.{}", name, args.format.extension()));
    let image_path =
        partition_dir(&args.output, IMAGE_DIR, label).join(format!("{}.npy", name));

    let written = export
        .write(saver, &mask_path, Some(&image_path), Some((log, &name)))
        .context(ExportSnafu { path: dicom })?;

    tracing::debug!("Exported {} -> {}", dicom.display(), mask_path.display());
    Ok(Some(written))
}

fn run(args: Args) -> Result<ExportTally, Error> {
    if !args.manifest.is_file() {
        return InvalidManifestPathSnafu {
            path: args.manifest.clone(),
        }
        .fail();
    }
    let entries = load_manifest(&args.manifest)?;
    if entries.is_empty() {
        return NoManifestEntriesSnafu {
            path: args.manifest.clone(),
        }
        .fail();
    }
    tracing::info!("Loaded {} entries from manifest", entries.len());

    std::fs::create_dir_all(&args.output).context(IOSnafu {
        path: args.output.clone(),
    })?;
    let rasterizer = Rasterizer::new(args.rasterize.config());
    let saver = MaskSaver::new(args.compressor.into()).with_range(args.mask_range);
    let log = RepairLog::new(args.output.join(LOG_DIR));
    let claimed = Mutex::new(HashSet::new());

    let pb = default_bar(entries.len() as u64);
    pb.set_message("Rasterizing contours");

    let process = |entry: &ManifestEntry| {
        process_entry(entry, &args, &rasterizer, &saver, &log, &claimed).inspect_err(|e| {
            error!(
                "Error processing {}: {}",
                entry.source.contour.display(),
                Report::from_error(e)
            );
        })
    };

    let summary = if args.strict {
        // Abort on the first error
        entries
            .par_iter()
            .progress_with(pb)
            .try_fold(Summary::default, |summary, entry| {
                process(entry).map(|written| summary.record(written.as_ref()))
            })
            .try_reduce(Summary::default, |a, b| Ok(a.merge(b)))?
    } else {
        // Failures are logged and counted
        entries
            .par_iter()
            .progress_with(pb)
            .map(process)
            .fold(Summary::default, Summary::record_result)
            .reduce(Summary::default, Summary::merge)
    };
    let tally = summary.tally;

    if !tally.is_consistent(entries.len()) {
        return CountMismatchSnafu {
            tally,
            expected: entries.len(),
        }
        .fail();
    }
    if args.images && summary.images != summary.masks {
        return ImageMaskMismatchSnafu {
            images: summary.images,
            masks: summary.masks,
        }
        .fail();
    }

    println!(
        "Processed {} manifest entries: {}",
        entries.len(),
        tally
    );
    Ok(tally)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_contour_mask::rasterize::FOREGROUND;
    use ndarray::Array2;
    use ndarray_npy::read_npy;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    const CT_SMALL_UID: &str = "1.3.6.1.4.1.5962.1.1.1.1.1.20040119072730.12322";

    fn rasterize_args() -> RasterizeArgs {
        RasterizeArgs {
            pixel_space: true,
            no_repair: false,
            outlier_check: Default::default(),
            out_of_bounds: Default::default(),
            threshold: 0.07,
        }
    }

    fn args(manifest: PathBuf, output: PathBuf) -> Args {
        Args {
            manifest,
            output,
            rasterize: rasterize_args(),
            images: false,
            format: MaskFormat::Npy,
            compressor: SupportedCompressor::default(),
            mask_range: MaskRange::default(),
            strict: false,
            verbose: false,
        }
    }

    /// Lays out a series directory, three contours and a manifest:
    /// two contours on the slice, one empty contour, and one entry pointing at a missing file.
    fn setup(dir: &Path) -> PathBuf {
        let series = dir.join("series");
        fs::create_dir(&series).unwrap();
        let dicom = dicom_test_files::path("pydicom/CT_small.dcm").unwrap();
        fs::copy(&dicom, series.join("slice.dcm")).unwrap();

        let contours = dir.join("contours");
        fs::create_dir(&contours).unwrap();
        fs::write(contours.join("square.csv"), "x,y\n30,40\n50,40\n50,60\n30,60\n").unwrap();
        fs::write(contours.join("diamond.csv"), "x,y\n64,54\n74,64\n64,74\n54,64\n").unwrap();
        fs::write(contours.join("empty.csv"), "x,y\n").unwrap();

        let manifest = dir.join("manifest.csv");
        fs::write(
            &manifest,
            format!(
                "dicom,contour,sop_instance_uid,label\n\
                 series,contours/square.csv,{uid},benign\n\
                 series,contours/diamond.csv,{uid},benign\n\
                 series/slice.dcm,contours/empty.csv,,malignant\n\
                 series/missing.dcm,contours/square.csv,,malignant\n",
                uid = CT_SMALL_UID
            ),
        )
        .unwrap();
        manifest
    }

    #[test]
    fn test_load_manifest() {
        let tmp_dir = TempDir::new().unwrap();
        let manifest = setup(tmp_dir.path());
        let entries = load_manifest(&manifest).unwrap();

        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].source.dicom, tmp_dir.path().join("series"));
        assert_eq!(
            entries[0].source.contour,
            tmp_dir.path().join("contours/square.csv")
        );
        assert_eq!(
            entries[0].source.sop_instance_uid.as_deref(),
            Some(CT_SMALL_UID)
        );
        assert_eq!(entries[0].label.as_deref(), Some("benign"));
        assert_eq!(
            entries.iter().map(|e| e.index).collect::<Vec<_>>(),
            vec![0, 1, 0, 0]
        );
        assert_eq!(entries[2].source.sop_instance_uid, None);
    }

    #[rstest]
    #[case::no_dicom("contour\na.csv\n", "dicom")]
    #[case::no_contour("dicom\na.dcm\n", "contour")]
    #[case::empty_contour("dicom,contour\na.dcm,\n", "contour")]
    fn test_load_manifest_invalid(#[case] contents: &str, #[case] missing: &str) {
        let tmp_dir = TempDir::new().unwrap();
        let manifest = tmp_dir.path().join("manifest.csv");
        fs::write(&manifest, contents).unwrap();
        match load_manifest(&manifest) {
            Err(Error::InvalidManifestFormat { column, .. }) => assert_eq!(column, missing),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[rstest]
    #[case::masks_only(false)]
    #[case::with_images(true)]
    fn test_run(#[case] images: bool) {
        let tmp_dir = TempDir::new().unwrap();
        let manifest = setup(tmp_dir.path());
        let output = tmp_dir.path().join("out");

        let mut args = args(manifest, output.clone());
        args.images = images;
        let tally = run(args).unwrap();
        assert_eq!(
            tally,
            ExportTally {
                exported: 2,
                skipped: 1,
                failed: 1
            }
        );

        let masks = output.join("masks").join("benign");
        let square: Array2<u8> =
            read_npy(masks.join(format!("{}_0_mask.npy", CT_SMALL_UID))).unwrap();
        assert_eq!(square.iter().filter(|&&v| v == FOREGROUND).count(), 21 * 21);
        let diamond: Array2<u8> =
            read_npy(masks.join(format!("{}_1_mask.npy", CT_SMALL_UID))).unwrap();
        assert_eq!(diamond[[64, 64]], FOREGROUND);
        assert!(!output.join("masks").join("malignant").exists());

        let image = output
            .join("img")
            .join("benign")
            .join(format!("{}_0.npy", CT_SMALL_UID));
        assert_eq!(image.is_file(), images);

        // Both contours needed gap repair
        let logs = output.join("logs");
        assert!(logs.join(format!("{}_0_logs.txt", CT_SMALL_UID)).is_file());
        assert!(logs.join(format!("{}_1_logs.txt", CT_SMALL_UID)).is_file());
    }

    #[rstest]
    #[case::png(MaskFormat::Png)]
    #[case::tiff(MaskFormat::Tiff)]
    fn test_run_format(#[case] format: MaskFormat) {
        let tmp_dir = TempDir::new().unwrap();
        let manifest = setup(tmp_dir.path());
        let output = tmp_dir.path().join("out");

        let mut args = args(manifest, output.clone());
        args.format = format;
        run(args).unwrap();

        let mask = output.join("masks").join("benign").join(format!(
            "{}_0_mask.{}",
            CT_SMALL_UID,
            format.extension()
        ));
        assert!(mask.is_file());
    }

    /// Two rows naming the same slice once through the series directory and once through
    /// the file, so both get index 0.
    fn setup_aliased_rows(dir: &Path) -> PathBuf {
        setup(dir);
        let manifest = dir.join("aliased.csv");
        fs::write(
            &manifest,
            format!(
                "dicom,contour,sop_instance_uid,label\n\
                 series,contours/square.csv,{uid},benign\n\
                 series/slice.dcm,contours/diamond.csv,,benign\n",
                uid = CT_SMALL_UID
            ),
        )
        .unwrap();
        manifest
    }

    #[test]
    fn test_run_refuses_duplicate_output() {
        let tmp_dir = TempDir::new().unwrap();
        let manifest = setup_aliased_rows(tmp_dir.path());
        let output = tmp_dir.path().join("out");

        let tally = run(args(manifest, output.clone())).unwrap();
        assert_eq!(
            tally,
            ExportTally {
                exported: 1,
                skipped: 0,
                failed: 1
            }
        );
        // Whichever row claimed the name first owns the only mask
        let masks = output.join("masks").join("benign");
        assert_eq!(fs::read_dir(&masks).unwrap().count(), 1);
        assert!(masks.join(format!("{}_0_mask.npy", CT_SMALL_UID)).is_file());
    }

    #[test]
    fn test_run_strict_duplicate_output() {
        let tmp_dir = TempDir::new().unwrap();
        let manifest = setup_aliased_rows(tmp_dir.path());
        let mut args = args(manifest, tmp_dir.path().join("out"));
        args.strict = true;
        assert!(matches!(run(args), Err(Error::DuplicateOutput { .. })));
    }

    #[test]
    fn test_run_ignores_files_from_earlier_runs() {
        let tmp_dir = TempDir::new().unwrap();
        let manifest = setup(tmp_dir.path());
        let output = tmp_dir.path().join("out");
        let stale = output.join("img").join("benign");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("old.npy"), "left over").unwrap();
        fs::write(stale.join("notes.txt"), "user file").unwrap();

        let mut args = args(manifest, output);
        args.images = true;
        let tally = run(args).unwrap();
        assert_eq!(tally.exported, 2);
    }

    #[test]
    fn test_summary() {
        let written = WrittenFiles {
            mask: PathBuf::from("m.npy"),
            image: None,
            log: None,
        };
        let with_image = WrittenFiles {
            image: Some(PathBuf::from("i.npy")),
            ..written.clone()
        };
        let summary = Summary::default()
            .record(Some(&written))
            .record(None)
            .merge(Summary::default().record(Some(&with_image)))
            .record_result::<()>(Err(()));
        assert_eq!(
            summary,
            Summary {
                tally: ExportTally {
                    exported: 2,
                    skipped: 1,
                    failed: 1
                },
                masks: 2,
                images: 1,
            }
        );
    }

    #[test]
    fn test_run_unit_range() {
        let tmp_dir = TempDir::new().unwrap();
        let manifest = setup(tmp_dir.path());
        let output = tmp_dir.path().join("out");

        let mut args = args(manifest, output.clone());
        args.mask_range = MaskRange::Unit;
        run(args).unwrap();

        let mask: Array2<f32> = read_npy(
            output
                .join("masks")
                .join("benign")
                .join(format!("{}_0_mask.npy", CT_SMALL_UID)),
        )
        .unwrap();
        assert_eq!(mask[[50, 40]], 1.0);
        assert_eq!(mask.sum(), (21 * 21) as f32);
    }

    #[test]
    fn test_run_strict() {
        let tmp_dir = TempDir::new().unwrap();
        let manifest = setup(tmp_dir.path());
        let mut args = args(manifest, tmp_dir.path().join("out"));
        args.strict = true;
        assert!(matches!(run(args), Err(Error::Export { .. })));
    }

    #[test]
    fn test_run_empty_manifest() {
        let tmp_dir = TempDir::new().unwrap();
        let manifest = tmp_dir.path().join("manifest.csv");
        fs::write(&manifest, "dicom,contour\n").unwrap();
        let result = run(args(manifest, tmp_dir.path().join("out")));
        assert!(matches!(result, Err(Error::NoManifestEntries { .. })));
    }

    #[test]
    fn test_run_missing_manifest() {
        let tmp_dir = TempDir::new().unwrap();
        let result = run(args(
            tmp_dir.path().join("manifest.csv"),
            tmp_dir.path().join("out"),
        ));
        assert!(matches!(result, Err(Error::InvalidManifestPath { .. })));
    }

    #[rstest]
    #[case::labeled(Some("benign"), "out/masks/benign")]
    #[case::unlabeled(None, "out/masks")]
    fn test_partition_dir(#[case] label: Option<&str>, #[case] expected: &str) {
        assert_eq!(
            partition_dir(Path::new("out"), MASK_DIR, label),
            PathBuf::from(expected)
        );
    }
}
