use std::path::PathBuf;

use clap::Parser;
use snafu::{Report, ResultExt, Snafu, Whatever};
use tracing::{error, Level};

use dicom_contour_mask::export::{ExportError, ExportSource, SliceExport};
use dicom_contour_mask::rasterize::{RasterizeArgs, Rasterizer};
use dicom_contour_mask::repair_log::RepairLog;
use dicom_contour_mask::save::{MaskFormat, MaskRange, MaskSaver, SupportedCompressor};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Invalid DICOM path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("Invalid output path: {}", path.display()))]
    InvalidOutputPath { path: PathBuf },

    #[snafu(display("Export failed: {}", source))]
    Export {
        #[snafu(source(from(ExportError, Box::new)))]
        source: Box<ExportError>,
    },
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "Rasterize a contour into a segmentation mask for one DICOM slice", long_about = None)]
struct Args {
    #[arg(help = "DICOM slice, or a series directory when --uid is given")]
    dicom: PathBuf,

    #[arg(
        help = "Contour points: a CSV with x and y columns, or exported Contour Data (x\\y\\z values)"
    )]
    contour: PathBuf,

    #[arg(help = "Output mask path. The extension selects the format (npy, png, tiff)")]
    output: PathBuf,

    #[arg(
        help = "SOP Instance UID of the slice to search for in a series directory",
        long = "uid"
    )]
    uid: Option<String>,

    #[command(flatten)]
    rasterize: RasterizeArgs,

    #[arg(
        help = "Also save the min-max normalized slice to this path",
        long = "image"
    )]
    image: Option<PathBuf>,

    #[arg(
        help = "Directory for repair logs. Slices without repairs get no log",
        long = "log-dir"
    )]
    log_dir: Option<PathBuf>,

    #[arg(
        help = "Compression for TIFF outputs",
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
        help = "Enable verbose logging",
        long = "verbose",
        short = 'v',
        default_value = "false"
    )]
    verbose: bool,
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

fn run(args: Args) -> Result<(), Error> {
    if !args.dicom.exists() {
        return InvalidSourcePathSnafu { path: args.dicom }.fail();
    }
    // Catch a bad extension before any work is done
    for path in std::iter::once(&args.output).chain(args.image.as_ref()) {
        if MaskFormat::from_path(path).is_err() {
            return InvalidOutputPathSnafu { path }.fail();
        }
    }

    let source = ExportSource {
        dicom: args.dicom,
        contour: args.contour,
        sop_instance_uid: args.uid,
    };
    let rasterizer = Rasterizer::new(args.rasterize.config());
    let export = SliceExport::load(
        &source,
        &rasterizer,
        args.rasterize.space(),
        args.image.is_some(),
    )
    .context(ExportSnafu)?;

    let log = args.log_dir.map(RepairLog::new);
    let saver = MaskSaver::new(args.compressor.into()).with_range(args.mask_range);
    let written = export
        .write(
            &saver,
            &args.output,
            args.image.as_deref(),
            log.as_ref()
                .map(|log| (log, export.sop_instance_uid.as_str())),
        )
        .context(ExportSnafu)?;

    tracing::info!(
        "Wrote mask for {} to {} ({} foreground pixels, {} repairs)",
        export.sop_instance_uid,
        written.mask.display(),
        export.rasterized.foreground_count(),
        export.rasterized.repairs.len()
    );
    Ok(())
}
