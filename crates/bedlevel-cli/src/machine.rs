//! A session with the machine: position tracking, limits and mesh transfer.
//!
//! Moves only carry the words that change the last commanded state, so a
//! repeated move to the same spot sends nothing. Travel and feed limits are
//! checked here, before anything reaches the controller.

use std::time::Duration;

use bedlevel_mesh::{decode_into, encode, required_capacity, DecodeSummary, MeshGrid};
use bedlevel_protocol::{AckFramer, Axes, Command, Gcode, Reply, ReplyMode, Transport};
use tracing::{debug, info, warn};

use crate::config::{AxisLimits, MachineConfig};
use crate::error::{CliError, CliResult};

/// Last commanded tool position in mm. `None` until the axis is homed or moved.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
}

/// An absolute move. Axes left `None` stay where they are.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Target {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
    /// Feed rate in mm/min; `None` keeps the current one.
    pub feedrate: Option<f32>,
}

/// Drives one controller over an acknowledgment framer.
#[derive(Debug)]
pub struct Machine<T> {
    framer: AckFramer<T>,
    limits: MachineConfig,
    position: Position,
    feedrate: Option<f32>,
}

impl<T: Transport> Machine<T> {
    pub fn new(framer: AckFramer<T>, limits: MachineConfig) -> Self {
        Machine {
            framer,
            limits,
            position: Position::default(),
            feedrate: None,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn feedrate(&self) -> Option<f32> {
        self.feedrate
    }

    pub fn framer_mut(&mut self) -> &mut AckFramer<T> {
        &mut self.framer
    }

    pub fn into_framer(self) -> AckFramer<T> {
        self.framer
    }

    /// Wait for the controller's startup banner.
    pub fn wait_for_banner(&mut self, timeout: Duration) -> CliResult<Reply> {
        let reply = self.framer.wait_for_banner(timeout)?;
        info!(banner = %reply.sentinel_line(), "controller started");
        // A restarted controller has lost its position.
        self.position = Position::default();
        self.feedrate = None;
        Ok(reply)
    }

    /// Send one raw line.
    ///
    /// The line may move the head, so the tracked position is forgotten.
    pub fn send_line(&mut self, line: &str, mode: ReplyMode) -> CliResult<Reply> {
        let command = Command::new(line)?;
        let reply = self.framer.send(&command, mode)?;
        self.position = Position::default();
        self.feedrate = None;
        Ok(reply)
    }

    /// Home the given axes; homed axes are at 0 afterwards.
    pub fn home(&mut self, axes: Axes) -> CliResult<()> {
        self.framer.send_gcode(Gcode::Home(axes))?;
        if axes.x {
            self.position.x = Some(0.0);
        }
        if axes.y {
            self.position.y = Some(0.0);
        }
        if axes.z {
            self.position.z = Some(0.0);
        }
        Ok(())
    }

    /// Move to an absolute position.
    ///
    /// Returns `false` when the target equals the tracked state and nothing
    /// was sent.
    pub fn move_to(&mut self, target: Target) -> CliResult<bool> {
        check_axis('X', target.x, &self.limits.x)?;
        check_axis('Y', target.y, &self.limits.y)?;
        check_axis('Z', target.z, &self.limits.z)?;

        let x = changed(target.x, self.position.x);
        let y = changed(target.y, self.position.y);
        let z = changed(target.z, self.position.z);
        let feedrate = changed(target.feedrate, self.feedrate);

        let moves_xy = x.is_some() || y.is_some();
        let moves = moves_xy || z.is_some();
        // A feed-only target still becomes the rate of later moves.
        let feed = if moves {
            target.feedrate.or(self.feedrate)
        } else {
            target.feedrate
        };
        if let Some(feed) = feed {
            let max = if moves_xy || !moves {
                self.limits.max_feed_xy
            } else {
                self.limits.max_feed_z
            };
            if feed.is_nan() || feed > max {
                return Err(CliError::FeedTooHigh { feedrate: feed, max });
            }
        }

        if x.is_none() && y.is_none() && z.is_none() && feedrate.is_none() {
            debug!(?target, "already at target");
            return Ok(false);
        }

        self.framer.send_gcode(Gcode::LinearMove { x, y, z, feedrate })?;
        self.position.x = target.x.or(self.position.x);
        self.position.y = target.y.or(self.position.y);
        self.position.z = target.z.or(self.position.z);
        self.feedrate = target.feedrate.or(self.feedrate);
        Ok(true)
    }

    /// Move relative to the tracked position.
    ///
    /// Axes with a zero offset are left alone; the others must have a known
    /// position.
    pub fn move_by(&mut self, dx: f32, dy: f32, dz: f32, feedrate: Option<f32>) -> CliResult<bool> {
        let target = Target {
            x: offset('X', dx, self.position.x)?,
            y: offset('Y', dy, self.position.y)?,
            z: offset('Z', dz, self.position.z)?,
            feedrate,
        };
        self.move_to(target)
    }

    /// Pause the controller's queue; waits for all queued moves to finish.
    pub fn dwell(&mut self, millis: u32) -> CliResult<()> {
        self.framer.send_gcode(Gcode::Dwell { millis })?;
        Ok(())
    }

    /// Declare the current Z position without moving.
    ///
    /// The controller accepts the value blindly, so it is bounded by the Z
    /// travel in both directions.
    pub fn override_z(&mut self, z: f32) -> CliResult<()> {
        let max = self.limits.z.max;
        check_axis('Z', Some(z), &AxisLimits::new(-max, max))?;
        warn!(z, "overriding Z position");
        self.framer.send_gcode(Gcode::SetZPosition { z })?;
        self.position.z = Some(z);
        Ok(())
    }

    /// Release the motors; the position is lost.
    pub fn disable_motors(&mut self) -> CliResult<()> {
        self.framer.send_gcode(Gcode::DisableMotors)?;
        self.position = Position::default();
        Ok(())
    }

    pub fn set_soft_endstops(&mut self, enabled: bool) -> CliResult<()> {
        self.framer.send_gcode(Gcode::SoftEndstops(enabled))?;
        Ok(())
    }

    pub fn set_mesh_compensation(&mut self, enabled: bool) -> CliResult<()> {
        self.framer.send_gcode(Gcode::MeshCompensation(enabled))?;
        Ok(())
    }

    /// Read the controller's mesh into `grid`.
    ///
    /// With a slot, that slot is loaded first; otherwise the active mesh is
    /// read.
    pub fn download_mesh(&mut self, slot: Option<u32>, grid: &mut MeshGrid) -> CliResult<DecodeSummary> {
        let capacity = self.framer.config().capacity;
        let required = required_capacity(grid.rows(), grid.cols());
        if required.map_or(true, |required| capacity < required) {
            warn!(
                capacity,
                ?required,
                "reply buffer may be too small for the mesh report"
            );
        }

        if let Some(slot) = slot {
            self.framer.send_gcode(Gcode::MeshLoad { slot })?;
        }
        let reply = self
            .framer
            .send(&Gcode::MeshReport.into(), ReplyMode::RetainAll)?;
        let summary = decode_into(&reply.payload(), grid)?;
        info!(
            rows = summary.rows,
            points = summary.points,
            "downloaded mesh"
        );
        Ok(summary)
    }

    /// Write `grid` to the controller, persisting it when a slot is given.
    ///
    /// Returns the number of commands sent.
    pub fn upload_mesh(&mut self, grid: &MeshGrid, slot: Option<u32>) -> CliResult<usize> {
        let commands = encode(grid, slot);
        let sent = self.framer.send_all(&commands)?;
        info!(sent, valid = grid.valid_count(), ?slot, "uploaded mesh");
        Ok(sent)
    }

    /// Wait for every queued move to complete.
    pub fn finish(&mut self) -> CliResult<()> {
        self.dwell(0)
    }
}

fn check_axis(axis: char, value: Option<f32>, limits: &AxisLimits) -> CliResult<()> {
    match value {
        Some(v) if !limits.contains(v) => Err(CliError::OutOfBounds {
            axis,
            value: v,
            min: limits.min,
            max: limits.max,
        }),
        _ => Ok(()),
    }
}

fn changed(new: Option<f32>, current: Option<f32>) -> Option<f32> {
    new.filter(|v| current != Some(*v))
}

fn offset(axis: char, delta: f32, current: Option<f32>) -> CliResult<Option<f32>> {
    if delta == 0.0 {
        return Ok(None);
    }
    match current {
        Some(pos) => Ok(Some(pos + delta)),
        None => Err(CliError::UnknownPosition { axis }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bedlevel_protocol::MemoryTransport;

    fn machine() -> Machine<MemoryTransport> {
        let transport = MemoryTransport::with_auto_reply(b"ok\n");
        Machine::new(AckFramer::new(transport), MachineConfig::default())
    }

    fn sent(machine: Machine<MemoryTransport>) -> Vec<String> {
        machine.into_framer().into_inner().written_lines()
    }

    #[test]
    fn test_changed_words_only() {
        assert_eq!(changed(Some(1.0), Some(1.0)), None);
        assert_eq!(changed(Some(1.0), None), Some(1.0));
        assert_eq!(changed(None, Some(2.0)), None);
    }

    #[test]
    fn test_home_sets_origin() {
        let mut m = machine();
        m.home(Axes::XY).unwrap();
        assert_eq!(
            m.position(),
            Position {
                x: Some(0.0),
                y: Some(0.0),
                z: None
            }
        );
        assert_eq!(sent(m), vec!["G28 X0 Y0"]);
    }

    #[test]
    fn test_relative_move_needs_known_axis() {
        let mut m = machine();
        m.home(Axes::Z).unwrap();
        assert!(matches!(
            m.move_by(5.0, 0.0, 0.0, None),
            Err(CliError::UnknownPosition { axis: 'X' })
        ));
        assert!(m.move_by(0.0, 0.0, 2.5, Some(100.0)).unwrap());
        assert_eq!(m.position().z, Some(2.5));
    }

    #[test]
    fn test_override_z_may_go_below_zero() {
        let mut m = machine();
        m.override_z(-3.0).unwrap();
        assert_eq!(m.position().z, Some(-3.0));
        assert!(matches!(
            m.override_z(500.0),
            Err(CliError::OutOfBounds { axis: 'Z', .. })
        ));
        assert_eq!(sent(m), vec!["G92 Z-3.00"]);
    }
}
