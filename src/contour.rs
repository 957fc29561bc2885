use csv::Reader as CsvReader;
use snafu::ResultExt;
use std::path::Path;

use crate::errors::contour::{CsvSnafu, IoSnafu};
use crate::errors::ContourError;
use crate::geometry::Point;

/// Values per point in RT Structure Set Contour Data (x, y, z).
const CONTOUR_DATA_STRIDE: usize = 3;

/// Contour points on a single slice.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Contour {
    pub points: Vec<Point>,
}

impl From<Vec<Point>> for Contour {
    fn from(points: Vec<Point>) -> Self {
        Self { points }
    }
}

impl Contour {
    /// Build a contour from flat `x\y\z` triples, as stored in Contour Data (3006,0050).
    /// The z coordinate is dropped since every point lies on the same slice.
    pub fn from_contour_data(data: &[f64]) -> Result<Self, ContourError> {
        if data.len() % CONTOUR_DATA_STRIDE != 0 {
            return Err(ContourError::Cardinality {
                actual: data.len(),
                stride: CONTOUR_DATA_STRIDE,
            });
        }
        let points = data
            .chunks_exact(CONTOUR_DATA_STRIDE)
            .map(|xyz| Point::new(xyz[0], xyz[1]))
            .collect();
        Ok(Self { points })
    }

    /// Read a contour file. `.csv` files go through [`Contour::from_csv`]; anything else is
    /// read as exported Contour Data, `x\y\z` values separated by backslashes or whitespace.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ContourError> {
        let path = path.as_ref();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            return Self::from_csv(path);
        }

        let text = std::fs::read_to_string(path).context(IoSnafu { path })?;
        let mut data = Vec::new();
        for (line, content) in text.lines().enumerate() {
            let values = content
                .split(|c: char| c == '\\' || c.is_whitespace())
                .filter(|value| !value.is_empty());
            for value in values {
                let parsed = value
                    .parse::<f64>()
                    .map_err(|_| ContourError::InvalidCoordinate {
                        value: value.to_string(),
                        line: line + 1,
                        path: path.to_path_buf(),
                    })?;
                data.push(parsed);
            }
        }
        let contour = Self::from_contour_data(&data)?;
        tracing::debug!("Read {} contour points from {}", contour.len(), path.display());
        Ok(contour)
    }

    /// Read a contour from a CSV file with `x` and `y` columns. Other columns are ignored.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self, ContourError> {
        let path = path.as_ref();
        let mut reader = CsvReader::from_path(path).context(CsvSnafu { path })?;

        let headers = reader.headers().context(CsvSnafu { path })?.clone();
        let column = |name: &'static str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or(ContourError::MissingColumn {
                    name,
                    path: path.to_path_buf(),
                })
        };
        let x_column = column("x")?;
        let y_column = column("y")?;

        let mut points = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.context(CsvSnafu { path })?;
            let parse = |index: usize| {
                let value = record.get(index).unwrap_or_default().trim();
                value
                    .parse::<f64>()
                    .map_err(|_| ContourError::InvalidCoordinate {
                        value: value.to_string(),
                        // Header is line 1
                        line: line + 2,
                        path: path.to_path_buf(),
                    })
            };
            points.push(Point::new(parse(x_column)?, parse(y_column)?));
        }

        tracing::debug!("Read {} contour points from {}", points.len(), path.display());
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
