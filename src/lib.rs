pub mod contour;
pub mod errors;
pub mod export;
pub mod file;
pub mod geometry;
pub mod normalize;
pub mod rasterize;
pub mod repair_log;
pub mod save;
pub mod tally;

pub use contour::Contour;
pub use export::{ExportError, ExportSource, SliceExport, WrittenFiles};
pub use geometry::{ImagePlane, Orientation, PixelIndex, PixelSpacing, Point};
pub use rasterize::{
    OutOfBoundsPolicy, OutlierCheck, PointSpace, RasterizeConfig, Rasterized, Rasterizer,
    RepairEvent,
};
pub use repair_log::RepairLog;
pub use save::{MaskFormat, MaskRange, MaskSaver, SupportedCompressor};
pub use tally::{ExportTally, Outcome};
