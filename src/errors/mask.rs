use snafu::Snafu;

/// Errors that abort a single mask computation.
#[derive(Debug, Snafu, PartialEq)]
#[snafu(visibility(pub))]
pub enum MaskError {
    #[snafu(display(
        "degenerate image plane: orientation/spacing matrix has determinant {}",
        determinant
    ))]
    InvalidGeometry { determinant: f64 },

    #[snafu(display(
        "contour point maps to pixel (row={}, column={}) outside a {}x{} grid",
        row,
        column,
        rows,
        columns
    ))]
    OutOfBoundsPoint {
        row: i64,
        column: i64,
        rows: usize,
        columns: usize,
    },

    #[snafu(display("contour point ({}, {}) has a non-finite coordinate", x, y))]
    NonFinitePoint { x: f64, y: f64 },
}
