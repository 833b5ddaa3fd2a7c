//! Integration tests for acknowledgment framing over fragmented transports.

use bedlevel_protocol::{
    AckFramer, Command, FramerConfig, FramerState, MemoryTransport, ProtocolError, ReplyMode,
    Sentinel,
};
use proptest::prelude::*;

/// Build the controller output for a list of noise lines followed by `ok`.
fn script(noise: &[String], sentinel: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    for line in noise {
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
    }
    bytes.extend_from_slice(sentinel.as_bytes());
    bytes.push(b'\n');
    bytes
}

fn noise_line() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9:., -]{0,30}".prop_filter("must not look like an acknowledgment", |line| {
        !Sentinel::Ack.matches(line.as_bytes())
    })
}

fn command_text() -> impl Strategy<Value = String> {
    "[GM][0-9]{1,3}( [A-Z]-?[0-9]{1,3}(\\.[0-9]{1,3})?){0,3}"
}

proptest! {
    #[test]
    fn prop_immediate_ok_resolves(text in command_text()) {
        let mut transport = MemoryTransport::new();
        transport.push_reply(b"ok\n");
        let mut framer = AckFramer::new(&mut transport);

        let command = Command::new(text.clone()).unwrap();
        let reply = framer.send(&command, ReplyMode::DiscardNoise).unwrap();
        prop_assert!(reply.payload().trim().starts_with("ok"));
        let wire = format!("{}\n", text);
        prop_assert_eq!(transport.written(), wire.as_bytes());
    }

    #[test]
    fn prop_discard_mode_returns_only_sentinel(
        noise in prop::collection::vec(noise_line(), 0..10),
        fragment in 1usize..16,
    ) {
        let mut transport = MemoryTransport::new();
        transport.set_fragment_size(fragment);
        transport.push_reply(&script(&noise, "ok T:21.3"));
        let mut framer = AckFramer::new(&mut transport);

        let reply = framer.send(&Command::new("M105").unwrap(), ReplyMode::DiscardNoise).unwrap();
        prop_assert_eq!(reply.payload(), "ok T:21.3\n");
        prop_assert_eq!(reply.noise_lines(), noise.len());
    }

    #[test]
    fn prop_retain_mode_returns_every_line_in_order(
        noise in prop::collection::vec(noise_line(), 0..10),
        fragment in 1usize..16,
    ) {
        let mut transport = MemoryTransport::new();
        transport.set_fragment_size(fragment);
        let expected = script(&noise, "ok");
        transport.push_reply(&expected);
        let mut framer = AckFramer::new(&mut transport);

        let reply = framer.send(&Command::new("G29 T1").unwrap(), ReplyMode::RetainAll).unwrap();
        prop_assert_eq!(reply.as_bytes(), &expected[..]);

        let payload = reply.payload();
        let lines: Vec<&str> = payload.lines().collect();
        prop_assert_eq!(lines.len(), noise.len() + 1);
        for (got, want) in lines.iter().zip(noise.iter()) {
            prop_assert_eq!(*got, want.as_str());
        }
    }

    #[test]
    fn prop_unterminated_data_overflows(
        capacity in 8usize..512,
        fragment in 1usize..64,
        mode in prop_oneof![Just(ReplyMode::DiscardNoise), Just(ReplyMode::RetainAll)],
    ) {
        let mut transport = MemoryTransport::new();
        transport.set_fragment_size(fragment);
        transport.push_reply(&vec![b'x'; capacity]);
        let config = FramerConfig { capacity, ..FramerConfig::default() };
        let mut framer = AckFramer::with_config(&mut transport, config);

        let err = framer.send(&Command::new("G29 T1").unwrap(), mode).unwrap_err();
        match err {
            ProtocolError::Overflow { capacity: c } => prop_assert_eq!(c, capacity),
            other => prop_assert!(false, "expected overflow, got {:?}", other),
        }
        prop_assert_eq!(framer.state(), FramerState::Overflow);
    }
}

#[test]
fn test_retained_reply_overflows_when_too_long() {
    let mut transport = MemoryTransport::new();
    let noise: Vec<String> = (0..20).map(|i| format!("echo:line {i:02}")).collect();
    transport.push_reply(&script(&noise, "ok"));
    let config = FramerConfig {
        capacity: 64,
        ..FramerConfig::default()
    };
    let mut framer = AckFramer::with_config(&mut transport, config);

    let err = framer
        .send(&Command::new("G29 T1").unwrap(), ReplyMode::RetainAll)
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Overflow { capacity: 64 }));
}

#[test]
fn test_discarded_noise_does_not_consume_capacity() {
    let mut transport = MemoryTransport::new();
    let noise: Vec<String> = (0..20).map(|i| format!("echo:line {i:02}")).collect();
    transport.push_reply(&script(&noise, "ok"));
    let config = FramerConfig {
        capacity: 64,
        ..FramerConfig::default()
    };
    let mut framer = AckFramer::with_config(&mut transport, config);

    let reply = framer
        .send(&Command::new("G28").unwrap(), ReplyMode::DiscardNoise)
        .unwrap();
    assert_eq!(reply.noise_lines(), 20);
    assert_eq!(reply.payload(), "ok\n");
}

#[test]
fn test_consecutive_exchanges() {
    let mut transport = MemoryTransport::with_auto_reply(b"echo:busy\nok\n");
    let mut framer = AckFramer::new(&mut transport);

    for text in ["G28 X0 Y0", "G28 Z0", "G1 Z4.00"] {
        let reply = framer
            .send(&Command::new(text).unwrap(), ReplyMode::DiscardNoise)
            .unwrap();
        assert_eq!(reply.noise_lines(), 1);
        assert_eq!(framer.state(), FramerState::Resolved);
    }
    assert_eq!(
        transport.written_lines(),
        vec!["G28 X0 Y0", "G28 Z0", "G1 Z4.00"]
    );
}

#[test]
fn test_banner_then_ack_exchange() {
    let mut transport = MemoryTransport::new();
    transport.push_reply(b"start\necho: External Reset\n");
    let mut framer = AckFramer::new(&mut transport);

    let banner = framer
        .wait_for_banner(std::time::Duration::from_secs(1))
        .unwrap();
    assert_eq!(banner.sentinel_line(), "start");

    // Whatever followed the banner is flushed before the next command
    framer.transport_mut().push_stale(b"echo: Marlin 2.1\nok\n");
    framer.transport_mut().push_reply(b"ok\n");
    let reply = framer
        .send(&Command::new("M420 S0").unwrap(), ReplyMode::DiscardNoise)
        .unwrap();
    assert_eq!(reply.noise_lines(), 0);
}
