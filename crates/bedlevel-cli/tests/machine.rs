//! Machine session tests against a scripted controller.

use approx::assert_relative_eq;
use bedlevel_cli::{CliError, Machine, MachineConfig, Position, Target};
use bedlevel_mesh::{render_csv, DecodeError, MeshBounds, MeshGrid};
use bedlevel_protocol::{
    AckFramer, Axes, FramerConfig, FramerState, MemoryTransport, ProtocolError, ReplyMode,
};

fn machine_with(transport: MemoryTransport) -> Machine<MemoryTransport> {
    Machine::new(AckFramer::new(transport), MachineConfig::default())
}

fn acking_machine() -> Machine<MemoryTransport> {
    machine_with(MemoryTransport::with_auto_reply(b"ok\n"))
}

fn written(machine: Machine<MemoryTransport>) -> Vec<String> {
    machine.into_framer().into_inner().written_lines()
}

#[test]
fn test_moves_send_only_changed_words() {
    let mut machine = acking_machine();
    machine.home(Axes::ALL).unwrap();

    let target = Target {
        x: Some(50.0),
        y: Some(0.0),
        z: Some(5.0),
        feedrate: Some(150.0),
    };
    assert!(machine.move_to(target).unwrap());
    // Same target again: nothing to send
    assert!(!machine.move_to(target).unwrap());
    assert!(machine
        .move_to(Target {
            y: Some(20.0),
            ..target
        })
        .unwrap());

    assert_eq!(machine.feedrate(), Some(150.0));
    assert_eq!(
        machine.position(),
        Position {
            x: Some(50.0),
            y: Some(20.0),
            z: Some(5.0)
        }
    );
    assert_eq!(
        written(machine),
        vec!["G28 X0 Y0 Z0", "G1 X50.00 Z5.00 F150.00", "G1 Y20.00"]
    );
}

#[test]
fn test_unknown_axes_are_always_sent() {
    let mut machine = acking_machine();
    machine
        .move_to(Target {
            x: Some(0.0),
            ..Target::default()
        })
        .unwrap();
    assert_eq!(written(machine), vec!["G1 X0.00"]);
}

#[test]
fn test_limits_block_the_move() {
    let mut machine = acking_machine();
    let err = machine
        .move_to(Target {
            x: Some(10.0),
            y: Some(181.0),
            ..Target::default()
        })
        .unwrap_err();
    assert!(matches!(err, CliError::OutOfBounds { axis: 'Y', .. }));

    let err = machine
        .move_to(Target {
            z: Some(10.0),
            feedrate: Some(1000.0),
            ..Target::default()
        })
        .unwrap_err();
    assert!(matches!(err, CliError::FeedTooHigh { max, .. } if max == 200.0));

    // Nothing reached the controller
    assert!(written(machine).is_empty());
}

#[test]
fn test_feed_only_target_is_limited() {
    let mut machine = acking_machine();
    let err = machine
        .move_to(Target {
            feedrate: Some(99_999.0),
            ..Target::default()
        })
        .unwrap_err();
    assert!(matches!(err, CliError::FeedTooHigh { max, .. } if max == 4000.0));
    assert!(matches!(
        machine.move_to(Target {
            feedrate: Some(f32::NAN),
            ..Target::default()
        }),
        Err(CliError::FeedTooHigh { .. })
    ));
    assert_eq!(machine.feedrate(), None);

    // Within the limit the rate alone is sent
    assert!(machine
        .move_to(Target {
            feedrate: Some(1200.0),
            ..Target::default()
        })
        .unwrap());
    assert_eq!(written(machine), vec!["G1 F1200.00"]);
}

#[test]
fn test_fast_xy_feed_allowed() {
    let mut machine = acking_machine();
    machine
        .move_to(Target {
            x: Some(100.0),
            y: Some(100.0),
            z: None,
            feedrate: Some(3000.0),
        })
        .unwrap();

    // The remembered XY feed is too fast for Z alone
    let err = machine.move_by(0.0, 0.0, 1.0, None);
    assert!(matches!(err, Err(CliError::UnknownPosition { axis: 'Z' })));
    machine.home(Axes::Z).unwrap();
    let err = machine.move_by(0.0, 0.0, 1.0, None).unwrap_err();
    assert!(matches!(err, CliError::FeedTooHigh { .. }));
}

#[test]
fn test_raw_line_forgets_position() {
    let mut machine = acking_machine();
    machine.home(Axes::XY).unwrap();
    let reply = machine.send_line("G91", ReplyMode::DiscardNoise).unwrap();
    assert_eq!(reply.sentinel_line(), "ok");
    assert_eq!(machine.position(), Position::default());
}

#[test]
fn test_finish_is_a_dwell_barrier() {
    let mut machine = acking_machine();
    machine.set_soft_endstops(false).unwrap();
    machine.set_mesh_compensation(true).unwrap();
    machine.disable_motors().unwrap();
    machine.finish().unwrap();
    assert_eq!(written(machine), vec!["M211 S0", "M420 S1", "M84", "G4 P0"]);
}

#[test]
fn test_banner_then_commands() {
    let mut transport = MemoryTransport::with_auto_reply(b"ok\n");
    transport.push_reply(b"\x00\xffgarbage\nstart\n");
    let mut machine = machine_with(transport);

    let banner = machine
        .wait_for_banner(std::time::Duration::from_millis(50))
        .unwrap();
    assert_eq!(banner.sentinel_line(), "start");
    machine.home(Axes::XY).unwrap();
    assert_eq!(written(machine), vec!["G28 X0 Y0"]);
}

#[test]
fn test_download_mesh_from_slot() {
    let bounds = MeshBounds {
        min_x: 10.0,
        min_y: 10.0,
        max_x: 170.0,
        max_y: 170.0,
    };
    let source = MeshGrid::from_heights(
        bounds,
        &[
            vec![Some(-0.1), Some(0.0), Some(0.1)],
            vec![Some(0.2), None, Some(0.3)],
        ],
    )
    .unwrap();

    let report = format!(
        "\nBed Topography Report for CSV:\n\n{}ok\n",
        render_csv(&source)
    );
    let mut transport = MemoryTransport::new();
    transport.script_reply(b"echo:Mesh loaded from slot 2\nok\n");
    transport.script_reply(report.as_bytes());
    let mut machine = machine_with(transport);

    let mut grid = MeshGrid::new(2, 3, bounds).unwrap();
    let summary = machine.download_mesh(Some(2), &mut grid).unwrap();
    assert_eq!(summary.rows, 2);
    assert_eq!(summary.points, 5);
    assert_relative_eq!(grid[(1, 2)].z(), 0.3);
    assert_eq!(grid[(1, 2)].x(), 170.0);
    assert!(!grid[(1, 1)].is_valid());

    assert_eq!(written(machine), vec!["G29 L2", "G29 T1"]);
}

#[test]
fn test_download_without_grid_leaves_transport_usable() {
    let mut transport = MemoryTransport::new();
    transport.script_reply(b"Mesh not loaded\nok\n");
    transport.script_reply(b"ok\n");
    let mut machine = machine_with(transport);

    let mut grid = MeshGrid::with_dimensions(2, 2).unwrap();
    let err = machine.download_mesh(None, &mut grid).unwrap_err();
    assert!(matches!(err, CliError::Decode(DecodeError::NoDataFound)));

    machine.dwell(10).unwrap();
    assert_eq!(machine.framer_mut().state(), FramerState::Resolved);
}

#[test]
fn test_download_overflow_latches() {
    let mut transport = MemoryTransport::new();
    transport.push_reply(&[b'1'; 64]);
    let config = FramerConfig {
        capacity: 32,
        ..FramerConfig::default()
    };
    let mut machine = Machine::new(
        AckFramer::with_config(transport, config),
        MachineConfig::default(),
    );

    let mut grid = MeshGrid::with_dimensions(2, 2).unwrap();
    let err = machine.download_mesh(None, &mut grid).unwrap_err();
    assert!(matches!(
        err,
        CliError::Protocol(ProtocolError::Overflow { capacity: 32 })
    ));
    assert!(matches!(
        machine.finish(),
        Err(CliError::Protocol(ProtocolError::Unusable { .. }))
    ));
}

#[test]
fn test_upload_mesh_then_persist() {
    let grid = MeshGrid::from_heights(
        MeshBounds::index_space(2, 2),
        &[vec![Some(0.125), None], vec![Some(-0.5), Some(1.0)]],
    )
    .unwrap();

    let mut machine = acking_machine();
    let sent = machine.upload_mesh(&grid, Some(1)).unwrap();
    assert_eq!(sent, 5);
    assert_eq!(
        written(machine),
        vec![
            "M421 I0 J0 Z0.125",
            "M421 I1 J0 N1",
            "M421 I0 J1 Z-0.500",
            "M421 I1 J1 Z1.000",
            "G29 S1",
        ]
    );
}

#[test]
fn test_upload_stops_at_closed_link() {
    let mut transport = MemoryTransport::new();
    transport.script_reply(b"ok\n");
    transport.script_reply(b"ok\n");
    let mut machine = machine_with(transport);

    let grid = MeshGrid::with_dimensions(2, 2).unwrap();
    let err = machine.upload_mesh(&grid, None).unwrap_err();
    assert!(matches!(
        err,
        CliError::Protocol(ProtocolError::TransportClosed)
    ));
    assert_eq!(written(machine).len(), 3);
}
