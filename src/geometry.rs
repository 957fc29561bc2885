//! Image plane geometry and the physical-space to pixel-index mapping.
//!
//! The physical position of pixel (row `j`, column `i`) on a slice is
//!
//! ```text
//! P = S + i * Δcol * R + j * Δrow * C
//! ```
//!
//! where `S` is the Image Position (Patient), `R` and `C` are the row and column direction
//! cosines from Image Orientation (Patient), and `Δrow`, `Δcol` come from Pixel Spacing.
//! Only the in-plane `x` and `y` components take part in the mapping, so a contour point
//! is resolved by solving a 2x2 linear system.
use dicom::dictionary_std::tags;
use dicom::object::mem::InMemElement;
use dicom::object::{FileDicomObject, InMemDicomObject};
use snafu::ResultExt;
use std::fmt;

use crate::errors::dicom::{ConvertValueSnafu, ParseFloatSnafu};
use crate::errors::{DicomError, MaskError};

/// Determinants with a smaller magnitude are treated as singular.
const SINGULAR_EPSILON: f64 = 1e-10;

/// A 2D point in physical (millimeter) space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// A pixel index. Signed because mapped points may fall outside the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelIndex {
    pub row: i64,
    pub column: i64,
}

impl PixelIndex {
    pub const fn new(row: i64, column: i64) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for PixelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(row={}, column={})", self.row, self.column)
    }
}

/// Pixel Spacing in DICOM order: distance between adjacent rows, then between adjacent columns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSpacing {
    pub row: f64,
    pub column: f64,
}

/// Image Orientation (Patient) direction cosines.
///
/// `row` is the direction travelled along a row, i.e. the direction of increasing column
/// index. `column` is the direction of increasing row index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub row: [f64; 3],
    pub column: [f64; 3],
}

impl Default for Orientation {
    fn default() -> Self {
        Self {
            row: [1.0, 0.0, 0.0],
            column: [0.0, 1.0, 0.0],
        }
    }
}

/// Geometric description of one 2D slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlane {
    /// In-plane components of the Image Position (Patient), i.e. the center of pixel (0, 0).
    pub origin: Point,
    pub pixel_spacing: PixelSpacing,
    pub orientation: Orientation,
    pub rows: usize,
    pub columns: usize,
}

impl ImagePlane {
    /// Build an axis-aligned plane with identity orientation.
    pub fn axis_aligned(origin: Point, pixel_spacing: PixelSpacing, rows: usize, columns: usize) -> Self {
        Self {
            origin,
            pixel_spacing,
            orientation: Orientation::default(),
            rows,
            columns,
        }
    }

    /// Coefficients `[[a, b], [c, d]]` mapping `(column, row)` offsets to `(x, y)` offsets.
    fn matrix(&self) -> [[f64; 2]; 2] {
        let Orientation { row, column } = self.orientation;
        let PixelSpacing {
            row: row_spacing,
            column: column_spacing,
        } = self.pixel_spacing;
        [
            [row[0] * column_spacing, column[0] * row_spacing],
            [row[1] * column_spacing, column[1] * row_spacing],
        ]
    }

    /// Determinant of the in-plane mapping. Zero when the direction cosines are
    /// degenerate (zero length or parallel) or a spacing is zero.
    pub fn determinant(&self) -> f64 {
        let [[a, b], [c, d]] = self.matrix();
        a * d - b * c
    }

    /// Map a physical point to the nearest pixel index.
    ///
    /// `x` resolves to the column and `y` to the row. Halfway cases round to the even
    /// index. Points outside the grid are returned as-is; bounds are the caller's concern.
    pub fn map_point(&self, point: Point) -> Result<PixelIndex, MaskError> {
        if !point.is_finite() {
            return Err(MaskError::NonFinitePoint {
                x: point.x,
                y: point.y,
            });
        }
        let [[a, b], [c, d]] = self.matrix();
        let determinant = a * d - b * c;
        if !determinant.is_finite() || determinant.abs() < SINGULAR_EPSILON {
            return Err(MaskError::InvalidGeometry { determinant });
        }

        let dx = point.x - self.origin.x;
        let dy = point.y - self.origin.y;

        // Cramer's rule
        let column = (dx * d - b * dy) / determinant;
        let row = (a * dy - c * dx) / determinant;
        // `as i64` would turn NaN into 0
        if !column.is_finite() || !row.is_finite() {
            return Err(MaskError::NonFinitePoint {
                x: point.x,
                y: point.y,
            });
        }

        Ok(PixelIndex {
            row: row.round_ties_even() as i64,
            column: column.round_ties_even() as i64,
        })
    }

    /// Physical position of the center of a pixel.
    pub fn to_physical(&self, index: PixelIndex) -> Point {
        let [[a, b], [c, d]] = self.matrix();
        let column = index.column as f64;
        let row = index.row as f64;
        Point {
            x: self.origin.x + a * column + b * row,
            y: self.origin.y + c * column + d * row,
        }
    }

    /// Whether a pixel index lies inside the grid.
    pub fn contains(&self, index: PixelIndex) -> bool {
        (0..self.rows as i64).contains(&index.row) && (0..self.columns as i64).contains(&index.column)
    }

    /// Grid dimensions as `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.columns)
    }
}

/// Read a backslash separated decimal string with an exact number of values.
fn read_decimals(
    element: Option<&InMemElement>,
    name: &'static str,
    expected: usize,
) -> Result<Vec<f64>, DicomError> {
    let raw = element
        .ok_or(DicomError::MissingPropertyError { name })?
        .value()
        .to_str()
        .context(ConvertValueSnafu { name })?;
    let values = raw
        .split('\\')
        .map(|s| s.trim().parse::<f64>().context(ParseFloatSnafu { name }))
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() != expected {
        return Err(DicomError::CardinalityError {
            name,
            actual: values.len(),
            expected,
        });
    }
    Ok(values)
}

fn read_dimension(
    file: &FileDicomObject<InMemDicomObject>,
    tag: dicom::core::Tag,
    name: &'static str,
) -> Result<usize, DicomError> {
    let value = file
        .get(tag)
        .ok_or(DicomError::MissingPropertyError { name })?
        .value()
        .to_int::<i32>()
        .context(ConvertValueSnafu { name })?;
    usize::try_from(value).map_err(|_| DicomError::InvalidValueError {
        name,
        value: value.to_string(),
    })
}

impl TryFrom<&FileDicomObject<InMemDicomObject>> for ImagePlane {
    type Error = DicomError;

    fn try_from(file: &FileDicomObject<InMemDicomObject>) -> Result<Self, Self::Error> {
        let position = read_decimals(
            file.get(tags::IMAGE_POSITION_PATIENT),
            "Image Position (Patient)",
            3,
        )?;

        // Pixel Spacing first, then Imager Pixel Spacing for projection images
        let spacing = read_decimals(
            file.get(tags::PIXEL_SPACING)
                .or_else(|| file.get(tags::IMAGER_PIXEL_SPACING)),
            "Pixel Spacing",
            2,
        )?;

        let orientation = read_decimals(
            file.get(tags::IMAGE_ORIENTATION_PATIENT),
            "Image Orientation (Patient)",
            6,
        )?;

        let rows = read_dimension(file, tags::ROWS, "Rows")?;
        let columns = read_dimension(file, tags::COLUMNS, "Columns")?;

        let plane = ImagePlane {
            origin: Point::new(position[0], position[1]),
            pixel_spacing: PixelSpacing {
                row: spacing[0],
                column: spacing[1],
            },
            orientation: Orientation {
                row: [orientation[0], orientation[1], orientation[2]],
                column: [orientation[3], orientation[4], orientation[5]],
            },
            rows,
            columns,
        };
        tracing::debug!("Read image plane {:?}", plane);
        Ok(plane)
    }
}
