//! Error types for mesh decoding and grid construction.

use thiserror::Error;

/// Errors that can occur while decoding a mesh report.
///
/// None of these affect the transport; the caller may retry the download.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// The report contained no comma separated numeric line.
    #[error("no mesh data found in report")]
    NoDataFound,

    /// A grid row has more values than the grid has columns.
    #[error("too many columns in mesh row {row}: expected at most {expected}, got {found}")]
    TooManyColumns {
        /// Zero-based grid row.
        row: usize,
        /// Number of grid columns.
        expected: usize,
        /// Number of values in the row.
        found: usize,
    },

    /// A value inside the grid is not a number.
    #[error("invalid mesh value {text:?} at row {row}, column {col}")]
    InvalidValue {
        row: usize,
        col: usize,
        text: String,
    },

    /// The requested grid cannot be built.
    #[error("invalid mesh shape: {0}")]
    InvalidShape(#[from] GridError),
}

/// Errors that can occur while building a grid from external data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    /// Grids need at least one row and one column.
    #[error("mesh grid must have at least one row and one column")]
    Empty,

    /// More points than [`MAX_GRID_POINTS`](crate::MAX_GRID_POINTS).
    #[error("mesh grid {rows}x{cols} is too large")]
    TooLarge { rows: usize, cols: usize },

    /// Rows of different lengths.
    #[error("mesh row {row} has {found} points, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// The grid does not have the expected dimensions.
    #[error("mesh is {rows}x{cols}, expected {expected_rows}x{expected_cols}")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },
}

/// Result type for mesh decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;
