//! Commands sent to the motion controller.
//!
//! A [`Command`] is one opaque line of text; the framer appends the `\n`.
//! [`Gcode`] is the vocabulary of typed commands this tool issues. Every
//! variant encodes to exactly one line.

use std::fmt;

use crate::error::{ProtocolError, ProtocolResult};

/// One line of text sent verbatim to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command(String);

impl Command {
    /// Build a command from a line of text.
    ///
    /// A single trailing `\n` or `\r\n` is accepted and stripped. Embedded
    /// line breaks are rejected: each command must produce exactly one
    /// acknowledgment.
    pub fn new(text: impl Into<String>) -> ProtocolResult<Command> {
        let mut text = text.into();
        if text.ends_with('\n') {
            text.pop();
            if text.ends_with('\r') {
                text.pop();
            }
        }
        if text.contains(['\n', '\r']) {
            return Err(ProtocolError::InvalidCommand(format!(
                "embedded line break in {:?}",
                text
            )));
        }
        Ok(Command(text))
    }

    /// The command text, without terminator.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bytes written to the transport, newline included.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.0.len() + 1);
        buf.extend_from_slice(self.0.as_bytes());
        buf.push(b'\n');
        buf
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Gcode> for Command {
    fn from(gcode: Gcode) -> Self {
        Command(gcode.encode())
    }
}

/// Axes that can be homed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Axes {
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

impl Axes {
    /// All three axes.
    pub const ALL: Axes = Axes { x: true, y: true, z: true };
    /// X and Y only.
    pub const XY: Axes = Axes { x: true, y: true, z: false };
    /// Z only.
    pub const Z: Axes = Axes { x: false, y: false, z: true };
}

/// G-code commands understood by the controller firmware.
#[derive(Debug, Clone, PartialEq)]
pub enum Gcode {
    // ========== Motion ==========
    /// Home the given axes (`G28`).
    Home(Axes),

    /// Linear move (`G1`); only the given words are emitted.
    LinearMove {
        x: Option<f32>,
        y: Option<f32>,
        z: Option<f32>,
        /// Feed rate in mm/min.
        feedrate: Option<f32>,
    },

    /// Pause the command queue (`G4`); also a barrier for pending moves.
    Dwell {
        /// Duration in milliseconds.
        millis: u32,
    },

    /// Override the current Z position without moving (`G92`).
    SetZPosition {
        z: f32,
    },

    /// Release the stepper motors (`M84`).
    DisableMotors,

    /// Enable or disable software end-stops (`M211`).
    SoftEndstops(bool),

    // ========== Mesh ==========
    /// Enable or disable mesh compensation (`M420`).
    MeshCompensation(bool),

    /// Load a mesh from a storage slot (`G29 L`).
    MeshLoad {
        slot: u32,
    },

    /// Report the active mesh as comma separated values (`G29 T1`).
    MeshReport,

    /// Set the height of one mesh point (`M421`).
    MeshSetPoint {
        col: usize,
        row: usize,
        z: f32,
    },

    /// Mark one mesh point as unset (`M421 ... N1`).
    MeshClearPoint {
        col: usize,
        row: usize,
    },

    /// Persist the active mesh to a storage slot (`G29 S`).
    MeshSave {
        slot: u32,
    },
}

impl Gcode {
    /// Encode the command as a single line, without terminator.
    pub fn encode(&self) -> String {
        match self {
            Gcode::Home(axes) => {
                let mut line = String::from("G28");
                if axes.x {
                    line.push_str(" X0");
                }
                if axes.y {
                    line.push_str(" Y0");
                }
                if axes.z {
                    line.push_str(" Z0");
                }
                line
            }
            Gcode::LinearMove { x, y, z, feedrate } => {
                let mut line = String::from("G1");
                for (word, value) in [('X', x), ('Y', y), ('Z', z), ('F', feedrate)] {
                    if let Some(v) = value {
                        line.push_str(&format!(" {}{:.2}", word, v));
                    }
                }
                line
            }
            Gcode::Dwell { millis } => format!("G4 P{}", millis),
            Gcode::SetZPosition { z } => format!("G92 Z{:.2}", z),
            Gcode::DisableMotors => "M84".to_string(),
            Gcode::SoftEndstops(on) => format!("M211 S{}", u8::from(*on)),
            Gcode::MeshCompensation(on) => format!("M420 S{}", u8::from(*on)),
            Gcode::MeshLoad { slot } => format!("G29 L{}", slot),
            Gcode::MeshReport => "G29 T1".to_string(),
            Gcode::MeshSetPoint { col, row, z } => {
                format!("M421 I{} J{} Z{:.3}", col, row, z)
            }
            Gcode::MeshClearPoint { col, row } => format!("M421 I{} J{} N1", col, row),
            Gcode::MeshSave { slot } => format!("G29 S{}", slot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_strips_terminator() {
        let cmd = Command::new("G28 X0 Y0\r\n").unwrap();
        assert_eq!(cmd.as_str(), "G28 X0 Y0");
        assert_eq!(cmd.to_wire(), b"G28 X0 Y0\n");
    }

    #[test]
    fn test_command_rejects_embedded_newline() {
        let err = Command::new("G28\nM84").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidCommand(_)));
    }

    #[test]
    fn test_home_encoding() {
        assert_eq!(Gcode::Home(Axes::ALL).encode(), "G28 X0 Y0 Z0");
        assert_eq!(Gcode::Home(Axes::XY).encode(), "G28 X0 Y0");
        assert_eq!(Gcode::Home(Axes::Z).encode(), "G28 Z0");
    }

    #[test]
    fn test_linear_move_only_emits_given_words() {
        let cmd = Gcode::LinearMove {
            x: None,
            y: Some(12.5),
            z: Some(-0.25),
            feedrate: None,
        };
        assert_eq!(cmd.encode(), "G1 Y12.50 Z-0.25");
    }

    #[test]
    fn test_mesh_point_encoding() {
        let set = Gcode::MeshSetPoint { col: 3, row: 1, z: -0.0626 };
        assert_eq!(set.encode(), "M421 I3 J1 Z-0.063");
        let clear = Gcode::MeshClearPoint { col: 0, row: 4 };
        assert_eq!(clear.encode(), "M421 I0 J4 N1");
        assert_eq!(Gcode::MeshSave { slot: 2 }.encode(), "G29 S2");
    }

    #[test]
    fn test_switch_encoding() {
        assert_eq!(Gcode::SoftEndstops(false).encode(), "M211 S0");
        assert_eq!(Gcode::MeshCompensation(true).encode(), "M420 S1");
        assert_eq!(Gcode::Dwell { millis: 100 }.encode(), "G4 P100");
        assert_eq!(Gcode::SetZPosition { z: 7.0 }.encode(), "G92 Z7.00");
    }
}
