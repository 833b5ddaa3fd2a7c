//! YAML configuration for the `bedlevel` tool.
//!
//! Every field has a default, so an empty file (or no file at all) is a valid
//! configuration:
//!
//! ```yaml
//! serial:
//!   port: /dev/ttyACM0
//!   baud_rate: 250000
//! protocol:
//!   reply_timeout_secs: 30
//! mesh:
//!   rows: 10
//!   cols: 10
//! ```

use std::path::Path;
use std::time::Duration;

use bedlevel_mesh::{required_capacity, GridError, MeshBounds, MeshGrid};
use bedlevel_protocol::{FramerConfig, DEFAULT_REPLY_CAPACITY};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CliError, CliResult};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub protocol: ProtocolConfig,
    pub machine: MachineConfig,
    pub mesh: MeshConfig,
}

impl Config {
    /// Load a configuration file.
    pub fn load(path: &Path) -> CliResult<Config> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::File {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| CliError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse a configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Config, serde_yaml::Error> {
        // An empty document deserializes as null rather than an empty map.
        if text.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(text)
    }

    /// Framer settings, with the reply buffer raised to fit a full mesh report.
    pub fn framer_config(&self) -> CliResult<FramerConfig> {
        let required = required_capacity(self.mesh.rows, self.mesh.cols).ok_or_else(|| {
            CliError::InvalidConfig(format!(
                "mesh.rows x mesh.cols: {}x{} is too large",
                self.mesh.rows, self.mesh.cols
            ))
        })?;
        let mut capacity = self.protocol.reply_capacity;
        if capacity < required {
            warn!(
                configured = capacity,
                required,
                rows = self.mesh.rows,
                cols = self.mesh.cols,
                "reply capacity too small for a mesh report, raising it"
            );
            capacity = required;
        }

        let reply_timeout = self
            .protocol
            .reply_timeout_secs
            .map(|secs| seconds("protocol.reply_timeout_secs", secs))
            .transpose()?;

        Ok(FramerConfig {
            capacity,
            reply_timeout,
            flush_before_send: self.protocol.flush_before_send,
        })
    }
}

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    pub baud_rate: u32,
    /// Pulse DTR after opening to restart the controller.
    pub reset_on_open: bool,
    /// Time to let the controller boot when no banner is awaited.
    pub settle_secs: f64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            reset_on_open: true,
            settle_secs: 5.0,
        }
    }
}

impl SerialConfig {
    pub fn settle_time(&self) -> CliResult<Duration> {
        seconds("serial.settle_secs", self.settle_secs)
    }
}

/// Command/acknowledgment exchange settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Reply buffer size in bytes.
    pub reply_capacity: usize,
    /// How long to wait for the startup banner between reads.
    pub banner_timeout_secs: f64,
    /// Overall deadline for one command exchange; unset blocks indefinitely.
    pub reply_timeout_secs: Option<f64>,
    /// Drop stale input before every command.
    pub flush_before_send: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            reply_capacity: DEFAULT_REPLY_CAPACITY,
            banner_timeout_secs: 10.0,
            reply_timeout_secs: None,
            flush_before_send: true,
        }
    }
}

impl ProtocolConfig {
    pub fn banner_timeout(&self) -> CliResult<Duration> {
        seconds("protocol.banner_timeout_secs", self.banner_timeout_secs)
    }
}

/// Travel range of one axis in mm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisLimits {
    pub min: f32,
    pub max: f32,
}

impl AxisLimits {
    pub fn new(min: f32, max: f32) -> Self {
        AxisLimits { min, max }
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Machine travel and speed limits enforced before sending moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub x: AxisLimits,
    pub y: AxisLimits,
    pub z: AxisLimits,
    /// Highest feed rate for moves involving X or Y, in mm/min.
    pub max_feed_xy: f32,
    /// Highest feed rate for Z-only moves, in mm/min.
    pub max_feed_z: f32,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            x: AxisLimits::new(0.0, 183.0),
            y: AxisLimits::new(0.0, 180.0),
            z: AxisLimits::new(0.0, 140.0),
            max_feed_xy: 4000.0,
            max_feed_z: 200.0,
        }
    }
}

/// Mesh geometry as configured on the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub rows: usize,
    pub cols: usize,
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
    /// Storage slot used when a command does not name one.
    pub slot: Option<u32>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        MeshConfig {
            rows: 5,
            cols: 5,
            min_x: 0.0,
            min_y: 0.0,
            max_x: 183.0,
            max_y: 180.0,
            slot: None,
        }
    }
}

impl MeshConfig {
    pub fn bounds(&self) -> MeshBounds {
        MeshBounds {
            min_x: self.min_x,
            min_y: self.min_y,
            max_x: self.max_x,
            max_y: self.max_y,
        }
    }

    /// An empty grid with the configured shape and bounds.
    pub fn empty_grid(&self) -> Result<MeshGrid, GridError> {
        MeshGrid::new(self.rows, self.cols, self.bounds())
    }
}

fn seconds(field: &str, secs: f64) -> CliResult<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| CliError::InvalidConfig(format!("{}: {} ({})", field, secs, e)))
}
