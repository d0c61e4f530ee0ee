use crate::midi::codec::Message;
use crossbeam::channel::{unbounded, Receiver, Sender};

/// FIFO of decoded messages between backend callback threads and the
/// consumer.
///
/// Producers hold a [`QueueWriter`] and never block. The queue is unbounded:
/// if the consumer stops polling, messages accumulate.
pub struct InboundQueue {
    tx: Sender<Message>,
    rx: Receiver<Message>,
}

/// Cloneable producer end of an [`InboundQueue`]
#[derive(Clone)]
pub struct QueueWriter {
    tx: Sender<Message>,
}

impl QueueWriter {
    pub fn enqueue(&self, message: Message) {
        // The queue owns a sender itself, so the channel never disconnects
        // while the receiver is alive.
        let _ = self.tx.send(message);
    }
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InboundQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn writer(&self) -> QueueWriter {
        QueueWriter {
            tx: self.tx.clone(),
        }
    }

    pub fn enqueue(&self, message: Message) {
        let _ = self.tx.send(message);
    }

    pub fn try_dequeue(&self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Discards every queued message, returning how many were dropped.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }
}
