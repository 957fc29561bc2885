//! # Contour rasterization
//!
//! Turns a contour (a list of points on one slice) into a 0/255 segmentation mask with the
//! dimensions of the slice.
//!
//! 1. Every point is mapped to a pixel and drawn into an empty grid.
//! 2. The leftmost and rightmost foreground column of each row form a [`ScanlineBoundary`].
//! 3. Rows the contour skipped are synthesized from their neighbours (gap repair).
//! 4. Boundaries that stray from their neighbours by more than a fraction of the image
//!    width are pulled back to the neighbour mean (outlier repair).
//! 5. Each row is filled between its boundaries.
//!
//! Both repair passes can be disabled, see [`RasterizeConfig::simple`]. Filling only ever
//! adds foreground pixels, so every drawn contour pixel survives.
use clap::ValueEnum;
use ndarray::{s, Array2};
use std::fmt;

use crate::errors::MaskError;
use crate::geometry::{ImagePlane, PixelIndex, Point};

pub mod boundary;
pub mod repair;

pub use boundary::*;
pub use repair::*;

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// Fraction of the column count a boundary may deviate before it is considered an outlier.
pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 0.07;

/// How the middle record of a triple is checked during outlier repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutlierCheck {
    /// Check the min first and only check the max when the min was not flagged.
    #[default]
    MinThenMax,
    /// Check and correct min and max independently.
    Both,
}

impl fmt::Display for OutlierCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let check_str = match self {
            OutlierCheck::MinThenMax => "min-then-max",
            OutlierCheck::Both => "both",
        };
        write!(f, "{}", check_str)
    }
}

/// What to do with contour points that land outside the pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutOfBoundsPolicy {
    /// Fail the whole contour.
    #[default]
    Reject,
    /// Clamp the point to the nearest edge pixel.
    Clip,
    /// Drop the point.
    Skip,
}

impl fmt::Display for OutOfBoundsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policy_str = match self {
            OutOfBoundsPolicy::Reject => "reject",
            OutOfBoundsPolicy::Clip => "clip",
            OutOfBoundsPolicy::Skip => "skip",
        };
        write!(f, "{}", policy_str)
    }
}

/// Coordinate system of the contour points handed to the rasterizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointSpace {
    /// Millimeters, mapped through the image plane.
    #[default]
    Physical,
    /// Pixel coordinates where `x` is the column and `y` the row.
    Pixel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairPasses {
    pub gaps: bool,
    pub outliers: bool,
}

impl RepairPasses {
    pub const ALL: RepairPasses = RepairPasses {
        gaps: true,
        outliers: true,
    };
    pub const NONE: RepairPasses = RepairPasses {
        gaps: false,
        outliers: false,
    };
}

impl Default for RepairPasses {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizeConfig {
    pub repair: RepairPasses,
    /// Outlier threshold as a fraction of the column count
    pub outlier_threshold: f64,
    pub outlier_check: OutlierCheck,
    pub out_of_bounds: OutOfBoundsPolicy,
}

impl Default for RasterizeConfig {
    fn default() -> Self {
        Self {
            repair: RepairPasses::ALL,
            outlier_threshold: DEFAULT_OUTLIER_THRESHOLD,
            outlier_check: OutlierCheck::default(),
            out_of_bounds: OutOfBoundsPolicy::default(),
        }
    }
}

impl RasterizeConfig {
    /// Plain scanline fill without any repair.
    pub fn simple() -> Self {
        Self {
            repair: RepairPasses::NONE,
            ..Self::default()
        }
    }
}

/// Parse an outlier threshold, a fraction of the column count in `[0, 1]`.
pub fn parse_threshold(value: &str) -> Result<f64, String> {
    let threshold = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("{}: {}", value, e))?;
    match (0.0..=1.0).contains(&threshold) {
        true => Ok(threshold),
        false => Err(format!("{} is not a fraction between 0 and 1", threshold)),
    }
}

/// Rasterizer options shared by the command line tools.
#[derive(Debug, Clone, clap::Args)]
pub struct RasterizeArgs {
    #[arg(
        help = "Contour points are pixel coordinates (x = column, y = row) rather than millimeters",
        long = "pixel-space",
        default_value_t = false
    )]
    pub pixel_space: bool,

    #[arg(
        help = "Fill each row between its extreme contour pixels without repairing gaps or outliers",
        long = "no-repair",
        default_value_t = false
    )]
    pub no_repair: bool,

    #[arg(
        help = "How row boundaries are checked for outliers",
        long = "outlier-check",
        value_enum,
        default_value_t = OutlierCheck::default()
    )]
    pub outlier_check: OutlierCheck,

    #[arg(
        help = "Handling of contour points outside the image",
        long = "out-of-bounds",
        value_enum,
        default_value_t = OutOfBoundsPolicy::default()
    )]
    pub out_of_bounds: OutOfBoundsPolicy,

    #[arg(
        help = "Outlier threshold as a fraction of the image width",
        long = "threshold",
        value_parser = parse_threshold,
        default_value_t = DEFAULT_OUTLIER_THRESHOLD
    )]
    pub threshold: f64,
}

impl RasterizeArgs {
    pub fn config(&self) -> RasterizeConfig {
        RasterizeConfig {
            repair: match self.no_repair {
                true => RepairPasses::NONE,
                false => RepairPasses::ALL,
            },
            outlier_threshold: self.threshold,
            outlier_check: self.outlier_check,
            out_of_bounds: self.out_of_bounds,
        }
    }

    pub fn space(&self) -> PointSpace {
        match self.pixel_space {
            true => PointSpace::Pixel,
            false => PointSpace::Physical,
        }
    }
}

/// A rasterized mask along with the repairs applied while filling it.
#[derive(Debug, Clone, PartialEq)]
pub struct Rasterized {
    pub mask: Array2<u8>,
    pub repairs: Vec<RepairEvent>,
}

impl Rasterized {
    pub fn foreground_count(&self) -> usize {
        self.mask.iter().filter(|&&v| v == FOREGROUND).count()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Rasterizer {
    config: RasterizeConfig,
}

impl From<RasterizeConfig> for Rasterizer {
    fn from(config: RasterizeConfig) -> Self {
        Self { config }
    }
}

impl Rasterizer {
    pub fn new(config: RasterizeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RasterizeConfig {
        &self.config
    }

    /// Resolve a contour point to an in-grid `(row, column)`, or `None` if it is skipped.
    fn resolve(
        &self,
        plane: &ImagePlane,
        point: Point,
        space: PointSpace,
    ) -> Result<Option<(usize, usize)>, MaskError> {
        if !point.is_finite() {
            return Err(MaskError::NonFinitePoint {
                x: point.x,
                y: point.y,
            });
        }
        let index = match space {
            PointSpace::Physical => plane.map_point(point)?,
            PointSpace::Pixel => PixelIndex::new(
                point.y.round_ties_even() as i64,
                point.x.round_ties_even() as i64,
            ),
        };
        if plane.contains(index) {
            return Ok(Some((index.row as usize, index.column as usize)));
        }

        let error = MaskError::OutOfBoundsPoint {
            row: index.row,
            column: index.column,
            rows: plane.rows,
            columns: plane.columns,
        };
        match self.config.out_of_bounds {
            OutOfBoundsPolicy::Reject => Err(error),
            OutOfBoundsPolicy::Clip if plane.rows > 0 && plane.columns > 0 => {
                let row = index.row.clamp(0, plane.rows as i64 - 1) as usize;
                let column = index.column.clamp(0, plane.columns as i64 - 1) as usize;
                tracing::debug!("Clipped contour point {} to ({}, {})", index, row, column);
                Ok(Some((row, column)))
            }
            OutOfBoundsPolicy::Clip => Err(error),
            OutOfBoundsPolicy::Skip => {
                tracing::debug!("Skipped contour point {} outside the grid", index);
                Ok(None)
            }
        }
    }

    /// Draw the contour points into an empty grid without filling.
    pub fn draw_contour(
        &self,
        plane: &ImagePlane,
        points: &[Point],
        space: PointSpace,
    ) -> Result<Array2<u8>, MaskError> {
        let mut mask = Array2::from_elem(plane.shape(), BACKGROUND);
        for &point in points {
            if let Some((row, column)) = self.resolve(plane, point, space)? {
                mask[[row, column]] = FOREGROUND;
            }
        }
        Ok(mask)
    }

    /// Rasterize a contour into a filled mask with the dimensions of `plane`.
    pub fn rasterize(
        &self,
        plane: &ImagePlane,
        points: &[Point],
        space: PointSpace,
    ) -> Result<Rasterized, MaskError> {
        let mut mask = self.draw_contour(plane, points, space)?;
        let mut boundaries = scanline_boundaries(&mask);

        let mut repairs = Vec::new();
        if self.config.repair.gaps {
            repairs.extend(repair_gaps(&mut boundaries));
        }
        if self.config.repair.outliers {
            let threshold = plane.columns as f64 * self.config.outlier_threshold;
            repairs.extend(repair_outliers(
                &mut boundaries,
                threshold,
                self.config.outlier_check,
            ));
        }

        for boundary in boundaries.iter().filter(|b| b.min <= b.max) {
            mask.slice_mut(s![boundary.row, boundary.min..=boundary.max])
                .fill(FOREGROUND);
        }

        if !repairs.is_empty() {
            tracing::debug!(
                "Applied {} scanline repairs across {} rows",
                repairs.len(),
                boundaries.len()
            );
        }
        Ok(Rasterized { mask, repairs })
    }
}
