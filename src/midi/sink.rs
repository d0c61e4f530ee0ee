//! Handles given to backends so their callbacks can reach the bridge.
//!
//! Nothing in here takes the bridge lock. Callbacks only push onto channels or
//! set a flag; every state change is applied later by the consumer.

use crate::midi::codec::{decode_packet, Message};
use crate::midi::queue::QueueWriter;
use crossbeam::channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// A disconnect observed by a backend, naming the registration it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseRecord {
    pub direction: Direction,
    pub serial: u64,
}

/// Lets a backend report that one registered endpoint went away
#[derive(Clone)]
pub struct CloseNotifier {
    record: CloseRecord,
    tx: Sender<CloseRecord>,
}

impl CloseNotifier {
    pub(crate) fn new(direction: Direction, serial: u64, tx: Sender<CloseRecord>) -> Self {
        Self {
            record: CloseRecord { direction, serial },
            tx,
        }
    }

    /// Records the disconnect. The handle is closed by the consumer on its
    /// next reconciliation, never from here.
    pub fn closed(&self) {
        let _ = self.tx.send(self.record);
    }
}

/// Per-input callback target: decodes raw bytes and queues the messages
#[derive(Clone)]
pub struct InputSink {
    endpoint_id: u32,
    writer: QueueWriter,
    closer: CloseNotifier,
}

impl InputSink {
    pub(crate) fn new(endpoint_id: u32, writer: QueueWriter, closer: CloseNotifier) -> Self {
        Self {
            endpoint_id,
            writer,
            closer,
        }
    }

    /// Decodes one packet of raw bytes and queues every resulting message.
    pub fn deliver(&self, bytes: &[u8]) {
        for message in decode_packet(self.endpoint_id, bytes) {
            self.writer.enqueue(message);
        }
    }

    /// Queues a message the driver already packed into one word.
    pub fn deliver_short_word(&self, raw: u32) {
        self.writer
            .enqueue(Message::from_short_word(self.endpoint_id, raw));
    }

    pub fn closed(&self) {
        self.closer.closed();
    }

    pub fn close_notifier(&self) -> CloseNotifier {
        self.closer.clone()
    }
}

/// Dirty flag raised when the system reports a device topology change.
///
/// Read without the bridge lock: a change racing with a rebuild at worst
/// triggers one more rebuild.
#[derive(Debug, Clone, Default)]
pub struct TopologyFlag(Arc<AtomicBool>);

impl TopologyFlag {
    /// A flag that starts raised, so the first read performs a full
    /// enumeration.
    pub fn dirty() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn mark_changed(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Lowers the flag, returning whether it was raised.
    pub(crate) fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::queue::InboundQueue;
    use crossbeam::channel::unbounded;

    #[test]
    fn test_sink_decodes_into_queue() {
        let queue = InboundQueue::new();
        let (tx, rx) = unbounded();
        let sink = InputSink::new(4, queue.writer(), CloseNotifier::new(Direction::Input, 9, tx));

        sink.deliver(&[0x90, 0x40, 0x7F, 0x80, 0x40, 0x00]);
        sink.deliver_short_word(0x0000_05C0);
        sink.closed();

        assert_eq!(queue.try_dequeue(), Some(Message::new(4, 0x90, 0x40, 0x7F)));
        assert_eq!(queue.try_dequeue(), Some(Message::new(4, 0x80, 0x40, 0x00)));
        assert_eq!(queue.try_dequeue(), Some(Message::new(4, 0xC0, 0x05, 0x00)));
        assert_eq!(
            rx.try_recv().ok(),
            Some(CloseRecord {
                direction: Direction::Input,
                serial: 9
            })
        );
    }

    #[test]
    fn test_topology_flag() {
        let flag = TopologyFlag::dirty();
        assert!(flag.is_dirty());
        assert!(flag.take());
        assert!(!flag.is_dirty());
        assert!(!flag.take());

        let watcher = flag.clone();
        watcher.mark_changed();
        assert!(flag.is_dirty());
    }
}
