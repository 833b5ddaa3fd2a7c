//! Mesh report decoding and mesh upload encoding.
//!
//! Firmware answers a mesh report request with free-form text: banners,
//! status lines, and somewhere in the middle one comma separated line of
//! heights per mesh row.
//!
//! ```text
//! Bed Topography Report for CSV:
//!
//! -0.120,-0.050,0.010
//! -0.080,0.000,0.040
//! ok
//! ```
//!
//! The first line made only of digits, `.`, `,` and `-` (or `nan` fields)
//! that contains at least one comma starts the grid. From there on every line
//! is a grid row until a blank line or the acknowledgment.
//! A numeric-looking diagnostic line before the real grid is indistinguishable
//! from grid data and will be taken as the first row.

use bedlevel_protocol::{Command, Gcode, Sentinel};
use tracing::{debug, trace};

use crate::error::{DecodeError, DecodeResult};
use crate::grid::{MeshGrid, MeshPoint};

/// Bytes reserved in a report for headers, status lines and the trailing `ok`.
pub const REPORT_OVERHEAD: usize = 256;

/// Widest value a report prints per point, separator included (`-999.999,`).
const MAX_FIELD_WIDTH: usize = 9;

/// Minimum reply buffer capacity for a full report of a `rows x cols` mesh.
///
/// Every row costs up to `cols * 9` bytes plus a `\r\n`; the rest of the
/// report fits in [`REPORT_OVERHEAD`]. `None` when the size does not fit in
/// a `usize`.
pub fn required_capacity(rows: usize, cols: usize) -> Option<usize> {
    cols.checked_mul(MAX_FIELD_WIDTH)?
        .checked_add(2)?
        .checked_mul(rows)?
        .checked_add(REPORT_OVERHEAD)
}

/// What a successful decode touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSummary {
    /// Grid rows read from the report.
    pub rows: usize,
    /// Points that received a height.
    pub points: usize,
}

/// Whether a line looks like a row of mesh heights.
///
/// Every field has to be made of digits, `.` and `-`, or be `nan` (an unset
/// point), and there has to be more than one field.
pub fn is_data_line(line: &str) -> bool {
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.contains(',')
        && line.split(',').all(|field| {
            field.eq_ignore_ascii_case("nan")
                || field
                    .chars()
                    .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
        })
}

/// Whether a line inside the grid region ends it.
fn ends_grid(line: &str) -> bool {
    line.trim().is_empty() || Sentinel::Ack.matches(line.as_bytes())
}

/// Decode a mesh report into a new grid with index-space coordinates.
pub fn decode(payload: &str, rows: usize, cols: usize) -> DecodeResult<MeshGrid> {
    let mut grid = MeshGrid::with_dimensions(rows, cols)?;
    decode_into(payload, &mut grid)?;
    Ok(grid)
}

/// Decode a mesh report into an existing grid.
///
/// Points that the report covers are overwritten; all others keep their
/// state. Rows are applied as they are read, so on error the rows before the
/// failing one have already been written.
pub fn decode_into(payload: &str, grid: &mut MeshGrid) -> DecodeResult<DecodeSummary> {
    let mut lines = payload
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line));

    let first = lines
        .by_ref()
        .find(|line| {
            let data = is_data_line(line);
            if !data {
                trace!(line = *line, "skipping report line");
            }
            data
        })
        .ok_or(DecodeError::NoDataFound)?;
    decode_rows(std::iter::once(first).chain(lines), grid)
}

fn decode_rows<'a>(
    lines: impl Iterator<Item = &'a str>,
    grid: &mut MeshGrid,
) -> DecodeResult<DecodeSummary> {
    let cols = grid.cols();
    let mut summary = DecodeSummary { rows: 0, points: 0 };

    for line in lines {
        if summary.rows == grid.rows() || ends_grid(line) {
            break;
        }
        let row = summary.rows;
        // Some firmware terminates each row with a separator.
        let line = line.strip_suffix(',').unwrap_or(line);
        let found = line.split(',').count();
        if found > cols {
            return Err(DecodeError::TooManyColumns {
                row,
                expected: cols,
                found,
            });
        }

        let mut values = Vec::with_capacity(found);
        for (col, field) in line.split(',').enumerate() {
            let text = field.trim();
            let z: f32 = text.parse().map_err(|_| DecodeError::InvalidValue {
                row,
                col,
                text: text.to_string(),
            })?;
            values.push(z);
        }

        for (col, z) in values.into_iter().enumerate() {
            if let Some(point) = grid.get_mut(row, col) {
                if z.is_nan() {
                    point.invalidate();
                } else {
                    point.set_height(z);
                    summary.points += 1;
                }
            }
        }
        summary.rows += 1;
    }

    debug!(rows = summary.rows, points = summary.points, "decoded mesh report");
    Ok(summary)
}

/// Encode a grid as one upload command per point, row-major.
///
/// Valid points set their height, unset points are cleared on the
/// controller. With a slot, a final command persists the mesh.
pub fn encode(grid: &MeshGrid, slot: Option<u32>) -> Vec<Command> {
    let mut commands: Vec<Command> = grid
        .iter()
        .map(|(row, col, point)| match point.height() {
            Some(z) => Gcode::MeshSetPoint { col, row, z },
            None => Gcode::MeshClearPoint { col, row },
        })
        .map(Command::from)
        .collect();
    if let Some(slot) = slot {
        commands.push(Gcode::MeshSave { slot }.into());
    }
    commands
}

/// Render a grid the way firmware prints a CSV mesh report.
///
/// One line per row, heights with three decimals, `nan` for unset points.
pub fn render_csv(grid: &MeshGrid) -> String {
    let mut out = String::new();
    for row in 0..grid.rows() {
        let fields: Vec<String> = grid.row(row).iter().map(format_height).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn format_height(point: &MeshPoint) -> String {
    match point.height() {
        Some(z) => format!("{:.3}", z),
        None => "nan".to_string(),
    }
}
