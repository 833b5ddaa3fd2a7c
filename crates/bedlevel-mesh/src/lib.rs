//! # bedlevel-mesh
//!
//! Height-correction meshes for bed leveling, and the text codec used to
//! move them between the host and the controller.
//!
//! - **Download**: the controller prints the active mesh as a report; the
//!   heights are pulled out of the surrounding text with [`decode_into`].
//! - **Upload**: a grid is sent back as one set/clear command per point, with
//!   an optional final command persisting it to a storage slot ([`encode`]).
//!
//! ## Example
//!
//! ```rust
//! use bedlevel_mesh::{decode, encode};
//!
//! let report = "Bed Topography Report:\n\n1.0,2.0\n3.0,4.0\nok\n";
//! let grid = decode(report, 2, 2)?;
//! assert_eq!(grid[(1, 0)].height(), Some(3.0));
//!
//! let commands = encode(&grid, Some(1));
//! assert_eq!(commands.len(), 5);
//! # Ok::<(), bedlevel_mesh::DecodeError>(())
//! ```
//!
//! ## Buffer sizing
//!
//! A mesh report is read in full before decoding, so the reply buffer must
//! hold the whole report. [`required_capacity`] gives the minimum for a grid
//! size.

mod codec;
mod error;
mod grid;

pub use codec::{
    decode, decode_into, encode, is_data_line, render_csv, required_capacity, DecodeSummary,
    REPORT_OVERHEAD,
};
pub use error::{DecodeError, DecodeResult, GridError};
pub use grid::{MeshBounds, MeshFile, MeshGrid, MeshPoint, MAX_GRID_POINTS};
