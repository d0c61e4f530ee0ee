use midibridge::midi::codec::decode_packet;
use midibridge::midi::{encode, Message, MockMidiEngine, NOT_READY, UNKNOWN_NAME};
use midibridge::{Bridge, ReconcileStrategy};

fn poll_bridge(engine: &MockMidiEngine) -> Bridge<MockMidiEngine> {
    Bridge::with_strategy(engine.clone(), ReconcileStrategy::Poll)
}

#[test]
fn test_empty_bridge_reports_nothing() {
    let engine = MockMidiEngine::new();
    let bridge = poll_bridge(&engine);

    assert_eq!(bridge.count_sources(), 0);
    assert_eq!(bridge.count_destinations(), 0);
    assert_eq!(bridge.dequeue_incoming_message(), 0);
    assert_eq!(bridge.try_dequeue_incoming(), None);
    assert_eq!(bridge.source_id_at_index(0), 0);
    assert_eq!(bridge.destination_id_at_index(0), 0);
}

#[test]
fn test_note_on_reaches_consumer_encoded() {
    let engine = MockMidiEngine::with_devices(&["Keys"], &[]);
    let bridge = poll_bridge(&engine);

    assert_eq!(bridge.count_sources(), 1);
    let id = bridge.source_id_at_index(0);
    assert_ne!(id, 0);

    assert!(engine.emit("Keys", &[0x90, 0x40, 0x7F]));
    let expected = u64::from(id) | 0x90u64 << 32 | 0x40u64 << 40 | 0x7Fu64 << 48;
    assert_eq!(bridge.dequeue_incoming_message(), expected);
    assert_eq!(bridge.dequeue_incoming_message(), 0);
}

#[test]
fn test_vendor_sysex_packet() {
    let messages = decode_packet(7, &[0xF0, 0x00, 0x20, 0x76, 0x03, 0x11, 0x22, 0xF7]);
    assert_eq!(messages, vec![Message::new(7, 0xF0, 0x11, 0x22)]);
}

#[test]
fn test_send_to_unknown_destination_is_dropped() {
    let engine = MockMidiEngine::with_devices(&[], &["Synth"]);
    let bridge = poll_bridge(&engine);

    assert_eq!(bridge.count_destinations(), 1);
    let id = bridge.destination_id_at_index(0);

    assert!(!bridge.send_message(encode(id.wrapping_add(99), 0x90, 0x40, 0x7F)));
    assert!(engine.sent().is_empty());
}

#[test]
fn test_send_to_known_destination() {
    let engine = MockMidiEngine::with_devices(&[], &["Synth"]);
    let bridge = poll_bridge(&engine);

    assert_eq!(bridge.count_destinations(), 1);
    let id = bridge.destination_id_at_index(0);

    assert!(bridge.send_message(encode(id, 0xB0, 0x07, 0x64)));
    assert_eq!(engine.sent(), vec![(id, vec![0xB0, 0x07, 0x64])]);
}

#[test]
fn test_disconnect_removes_exactly_one_source() {
    let engine = MockMidiEngine::with_devices(&["Keys", "Pads"], &[]);
    let bridge = poll_bridge(&engine);

    assert_eq!(bridge.count_sources(), 2);
    let keys = bridge.source_id_at_index(0);
    let pads = bridge.source_id_at_index(1);
    assert_eq!(bridge.source_name(keys), "Keys");

    assert!(engine.unplug_input("Keys"));
    assert_eq!(bridge.count_sources(), 1);
    assert_eq!(bridge.source_id_at_index(0), pads);

    let stale = bridge.source_name(keys);
    assert!(stale == NOT_READY || stale == UNKNOWN_NAME);
    assert_eq!(engine.close_log(), vec![keys]);
}

#[test]
fn test_indices_stable_between_counts() {
    let engine = MockMidiEngine::with_devices(&["Keys"], &["Synth"]);
    let bridge = poll_bridge(&engine);

    assert_eq!(bridge.count_sources(), 1);
    let before = bridge.source_id_at_index(0);

    // A device plugged between count and lookup only shows after the next count.
    engine.plug_input("Pads");
    assert_eq!(bridge.source_id_at_index(1), 0);
    assert_eq!(bridge.source_id_at_index(0), before);

    assert_eq!(bridge.count_sources(), 2);
    assert_eq!(bridge.source_id_at_index(0), before);
    assert_ne!(bridge.source_id_at_index(1), 0);
}

#[test]
fn test_reconcile_is_idempotent() {
    let engine = MockMidiEngine::with_devices(&["Keys", "Pads"], &["Synth"]);
    let bridge = poll_bridge(&engine);

    let first = bridge.sources();
    assert_eq!(bridge.count_sources(), 2);
    assert_eq!(bridge.count_destinations(), 1);
    assert_eq!(bridge.sources(), first);
    assert_eq!(bridge.count_sources(), 2);
    assert!(engine.close_log().is_empty());
}

#[test]
fn test_listing_names_and_positions() {
    let engine = MockMidiEngine::with_devices(&["Keys", "Pads"], &["Synth"]);
    let bridge = poll_bridge(&engine);

    let sources = bridge.sources();
    let names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Keys", "Pads"]);
    assert_eq!(sources[1].index, 1);
    assert_eq!(sources[1].id, bridge.source_id_at_index(1));

    let destinations = bridge.destinations();
    assert_eq!(destinations.len(), 1);
    assert_eq!(bridge.destination_name(destinations[0].id), "Synth");
}

#[test]
fn test_name_lookup_failure_reports_unknown() {
    let engine = MockMidiEngine::with_devices(&[], &["Synth"]);
    let bridge = poll_bridge(&engine);

    assert_eq!(bridge.count_destinations(), 1);
    let id = bridge.destination_id_at_index(0);
    engine.set_fail_names(true);
    assert_eq!(bridge.destination_name(id), UNKNOWN_NAME);
    assert_eq!(bridge.destination_name(0), NOT_READY);
}

#[test]
fn test_multi_message_packet_keeps_order() {
    let engine = MockMidiEngine::with_devices(&["Keys"], &[]);
    let bridge = poll_bridge(&engine);
    assert_eq!(bridge.count_sources(), 1);
    let id = bridge.source_id_at_index(0);

    engine.emit("Keys", &[0x90, 0x3C, 0x64, 0xF8, 0x80, 0x3C, 0x00]);
    let received: Vec<Message> = std::iter::from_fn(|| bridge.try_dequeue_incoming()).collect();
    assert_eq!(
        received,
        vec![
            Message::new(id, 0x90, 0x3C, 0x64),
            Message::new(id, 0xF8, 0, 0),
            Message::new(id, 0x80, 0x3C, 0x00),
        ]
    );
}

#[test]
fn test_teardown_closes_each_handle_once() {
    let engine = MockMidiEngine::with_devices(&["Keys", "Pads"], &["Synth"]);
    engine.set_echo_closes(true);
    let bridge = poll_bridge(&engine);
    assert_eq!(bridge.count_sources(), 2);

    engine.emit("Keys", &[0x90, 0x40, 0x7F]);
    assert_eq!(bridge.pending_messages(), 1);
    drop(bridge);

    let mut closed = engine.close_log();
    assert_eq!(closed.len(), 3);
    closed.sort_unstable();
    closed.dedup();
    assert_eq!(closed.len(), 3);
    assert!(!engine.is_input_open("Keys"));
    assert!(!engine.is_output_open("Synth"));
}

#[test]
fn test_start_failure_leaves_source_unregistered() {
    let engine = MockMidiEngine::with_devices(&["Keys"], &[]);
    engine.set_fail_start(true);
    let bridge = poll_bridge(&engine);

    assert_eq!(bridge.count_sources(), 0);
    assert!(!engine.is_input_open("Keys"));

    engine.set_fail_start(false);
    assert_eq!(bridge.count_sources(), 1);
    assert!(engine.is_input_open("Keys"));
}
