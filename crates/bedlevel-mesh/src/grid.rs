//! Mesh points and the fixed-size grid that holds them.

use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::error::GridError;

/// One height-correction sample.
///
/// The X/Y location is fixed when the grid is built; only the height and the
/// validity flag change afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshPoint {
    x: f32,
    y: f32,
    z: f32,
    valid: bool,
}

impl MeshPoint {
    /// An unset point at the given location.
    pub fn new(x: f32, y: f32) -> Self {
        MeshPoint {
            x,
            y,
            z: 0.0,
            valid: false,
        }
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    /// Height offset from the Z home point. Meaningless unless [`is_valid`](Self::is_valid).
    pub fn z(&self) -> f32 {
        self.z
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Store a measured height and mark the point valid.
    pub fn set_height(&mut self, z: f32) {
        self.z = z;
        self.valid = true;
    }

    /// Mark the point unset and reset its height.
    pub fn invalidate(&mut self) {
        self.z = 0.0;
        self.valid = false;
    }

    /// The height if the point is valid.
    pub fn height(&self) -> Option<f32> {
        self.valid.then_some(self.z)
    }
}

/// The rectangle covered by the mesh, in machine coordinates (mm).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshBounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl MeshBounds {
    /// Bounds where point coordinates equal their column and row indices.
    pub fn index_space(rows: usize, cols: usize) -> Self {
        MeshBounds {
            min_x: 0.0,
            min_y: 0.0,
            max_x: cols.saturating_sub(1) as f32,
            max_y: rows.saturating_sub(1) as f32,
        }
    }

    fn interpolate(min: f32, max: f32, index: usize, count: usize) -> f32 {
        if count < 2 {
            return min;
        }
        min + (index as f32 * (max - min)) / (count - 1) as f32
    }
}

/// Largest number of points a grid may hold.
pub const MAX_GRID_POINTS: usize = 1 << 16;

/// A `rows x cols` grid of mesh points stored row-major.
///
/// Row `0` is the front of the bed (lowest Y), column `0` the left side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "MeshFile", try_from = "MeshFile")]
pub struct MeshGrid {
    rows: usize,
    cols: usize,
    bounds: MeshBounds,
    points: Vec<MeshPoint>,
}

impl MeshGrid {
    /// Create a grid of unset points spread evenly over `bounds`.
    pub fn new(rows: usize, cols: usize, bounds: MeshBounds) -> Result<Self, GridError> {
        if rows == 0 || cols == 0 {
            return Err(GridError::Empty);
        }
        let len = rows
            .checked_mul(cols)
            .filter(|&len| len <= MAX_GRID_POINTS)
            .ok_or(GridError::TooLarge { rows, cols })?;
        let mut points = Vec::with_capacity(len);
        for row in 0..rows {
            let y = MeshBounds::interpolate(bounds.min_y, bounds.max_y, row, rows);
            for col in 0..cols {
                let x = MeshBounds::interpolate(bounds.min_x, bounds.max_x, col, cols);
                points.push(MeshPoint::new(x, y));
            }
        }
        Ok(MeshGrid {
            rows,
            cols,
            bounds,
            points,
        })
    }

    /// Create a grid whose point coordinates are the column and row indices.
    pub fn with_dimensions(rows: usize, cols: usize) -> Result<Self, GridError> {
        Self::new(rows, cols, MeshBounds::index_space(rows, cols))
    }

    /// Build a grid from per-row heights, `None` marking unset points.
    pub fn from_heights(bounds: MeshBounds, heights: &[Vec<Option<f32>>]) -> Result<Self, GridError> {
        let cols = heights.first().map(Vec::len).unwrap_or(0);
        let mut grid = Self::new(heights.len(), cols, bounds)?;
        for (row, values) in heights.iter().enumerate() {
            if values.len() != cols {
                return Err(GridError::RaggedRow {
                    row,
                    expected: cols,
                    found: values.len(),
                });
            }
            for (col, value) in values.iter().enumerate() {
                if let Some(z) = value {
                    grid.points[row * cols + col].set_height(*z);
                }
            }
        }
        Ok(grid)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn bounds(&self) -> MeshBounds {
        self.bounds
    }

    /// Fail unless the grid has the given dimensions.
    pub fn ensure_shape(&self, rows: usize, cols: usize) -> Result<(), GridError> {
        if self.rows != rows || self.cols != cols {
            return Err(GridError::ShapeMismatch {
                rows: self.rows,
                cols: self.cols,
                expected_rows: rows,
                expected_cols: cols,
            });
        }
        Ok(())
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&MeshPoint> {
        if row < self.rows && col < self.cols {
            self.points.get(row * self.cols + col)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut MeshPoint> {
        if row < self.rows && col < self.cols {
            self.points.get_mut(row * self.cols + col)
        } else {
            None
        }
    }

    /// The points of one row, left to right.
    pub fn row(&self, row: usize) -> &[MeshPoint] {
        &self.points[row * self.cols..(row + 1) * self.cols]
    }

    /// Iterate over `(row, col, point)` in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &MeshPoint)> + '_ {
        let cols = self.cols;
        self.points
            .iter()
            .enumerate()
            .map(move |(i, point)| (i / cols, i % cols, point))
    }

    /// Number of valid points.
    pub fn valid_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_valid()).count()
    }

    /// Whether every point is valid.
    pub fn is_complete(&self) -> bool {
        self.points.iter().all(MeshPoint::is_valid)
    }

    /// Mark every point unset.
    pub fn invalidate_all(&mut self) {
        self.points.iter_mut().for_each(MeshPoint::invalidate);
    }

    /// Copy the points out as nested rows.
    pub fn to_rows(&self) -> Vec<Vec<MeshPoint>> {
        self.points.chunks(self.cols).map(<[MeshPoint]>::to_vec).collect()
    }
}

impl Index<(usize, usize)> for MeshGrid {
    type Output = MeshPoint;

    fn index(&self, (row, col): (usize, usize)) -> &MeshPoint {
        assert!(col < self.cols, "mesh column {} out of range", col);
        &self.points[row * self.cols + col]
    }
}

/// On-disk form of a grid: bounds plus heights, `null` for unset points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshFile {
    pub bounds: MeshBounds,
    pub heights: Vec<Vec<Option<f32>>>,
}

impl From<MeshGrid> for MeshFile {
    fn from(grid: MeshGrid) -> Self {
        let heights = grid
            .points
            .chunks(grid.cols)
            .map(|row| row.iter().map(MeshPoint::height).collect())
            .collect();
        MeshFile {
            bounds: grid.bounds,
            heights,
        }
    }
}

impl TryFrom<MeshFile> for MeshGrid {
    type Error = GridError;

    fn try_from(file: MeshFile) -> Result<Self, Self::Error> {
        MeshGrid::from_heights(file.bounds, &file.heights)
    }
}
