//! Error type for the command-line tool.

use std::path::PathBuf;

use bedlevel_mesh::{DecodeError, GridError};
use bedlevel_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the `bedlevel` tool.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("mesh report error: {0}")]
    Decode(#[from] DecodeError),

    #[error("mesh error: {0}")]
    Grid(#[from] GridError),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("failed to access {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid mesh file {path}: {source}")]
    MeshFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A target position lies outside the configured travel.
    #[error("{axis} position {value:.3} outside limits [{min:.2}, {max:.2}]")]
    OutOfBounds {
        axis: char,
        value: f32,
        min: f32,
        max: f32,
    },

    /// A feed rate above the configured maximum for the moving axes.
    #[error("feed rate {feedrate:.2} exceeds maximum {max:.2} mm/min")]
    FeedTooHigh { feedrate: f32, max: f32 },

    /// A relative move on an axis whose position has never been set.
    #[error("{axis} position unknown; home the axis first")]
    UnknownPosition { axis: char },
}

/// Result type for the command-line tool.
pub type CliResult<T> = Result<T, CliError>;
