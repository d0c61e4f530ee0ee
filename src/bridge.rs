//! The bridge context: one owned value holding the registry, the reconciler
//! and the inbound queue, exposing the host-facing operations.
//!
//! Every operation takes the bridge lock for its whole duration, so a count
//! followed by index lookups sees a consistent registry. Backend callbacks
//! never take that lock; they only write to channels and the topology flag.

use crate::midi::{
    sender, EndpointInfo, InboundQueue, Message, MidiEngine, PendingCloses, ReconcileStrategy,
    Reconciler, Registry, Result, TopologyFlag, NOT_READY,
};
use log::{debug, info};
use std::sync::{Mutex, MutexGuard, PoisonError};

struct Core<E: MidiEngine> {
    registry: Registry<E>,
    reconciler: Reconciler,
}

impl<E: MidiEngine> Core<E> {
    fn reconcile(&mut self) -> Result<()> {
        self.reconciler.run(&mut self.registry)
    }

    fn refresh(&mut self) -> Result<()> {
        self.reconciler.refresh(&mut self.registry)
    }
}

pub struct Bridge<E: MidiEngine> {
    core: Mutex<Core<E>>,
    inbound: InboundQueue,
    topology: TopologyFlag,
}

impl<E: MidiEngine> Bridge<E> {
    /// Creates a bridge using the backend's preferred reconciliation strategy.
    pub fn new(engine: E) -> Self {
        let strategy = engine.preferred_strategy();
        Self::with_strategy(engine, strategy)
    }

    pub fn with_strategy(engine: E, strategy: ReconcileStrategy) -> Self {
        let inbound = InboundQueue::new();
        let pending = PendingCloses::new();
        // Dirty from the start so the first read under Reset enumerates.
        let topology = TopologyFlag::dirty();

        let registry = Registry::new(engine, inbound.writer(), pending.sender());
        let reconciler = Reconciler::new(strategy, pending, topology.clone());
        info!("MIDI bridge created, reconciling by {}", strategy);

        Bridge {
            core: Mutex::new(Core {
                registry,
                reconciler,
            }),
            inbound,
            topology,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Core<E>> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn strategy(&self) -> ReconcileStrategy {
        self.lock().reconciler.strategy()
    }

    pub fn count_sources(&self) -> usize {
        let mut core = self.lock();
        match core.reconcile() {
            Ok(()) => core.registry.count_inputs(),
            Err(e) => {
                debug!("Reporting no sources: {}", e);
                0
            }
        }
    }

    pub fn count_destinations(&self) -> usize {
        let mut core = self.lock();
        match core.reconcile() {
            Ok(()) => core.registry.count_outputs(),
            Err(e) => {
                debug!("Reporting no destinations: {}", e);
                0
            }
        }
    }

    /// Identifier of the source at `index`, or 0 if there is none.
    pub fn source_id_at_index(&self, index: usize) -> u32 {
        let mut core = self.lock();
        if core.refresh().is_err() {
            return 0;
        }
        core.registry.input_id_at(index).unwrap_or(0)
    }

    /// Identifier of the destination at `index`, or 0 if there is none.
    pub fn destination_id_at_index(&self, index: usize) -> u32 {
        let mut core = self.lock();
        if core.refresh().is_err() {
            return 0;
        }
        core.registry.output_id_at(index).unwrap_or(0)
    }

    pub fn source_name(&self, id: u32) -> String {
        let mut core = self.lock();
        if core.refresh().is_err() {
            return NOT_READY.to_string();
        }
        core.registry.input_name(id)
    }

    pub fn destination_name(&self, id: u32) -> String {
        let mut core = self.lock();
        if core.refresh().is_err() {
            return NOT_READY.to_string();
        }
        core.registry.output_name(id)
    }

    /// Reconciles, then takes the oldest queued message.
    pub fn try_dequeue_incoming(&self) -> Option<Message> {
        let mut core = self.lock();
        if let Err(e) = core.reconcile() {
            debug!("Holding back incoming messages: {}", e);
            return None;
        }
        self.inbound.try_dequeue()
    }

    /// Oldest queued message in wire form, 0 when the queue is empty.
    pub fn dequeue_incoming_message(&self) -> u64 {
        self.try_dequeue_incoming()
            .map(|message| message.encode())
            .unwrap_or(0)
    }

    /// Sends a wire message to the destination named by its low 32 bits.
    /// Returns whether it was handed to the backend; failures are logged and
    /// otherwise ignored.
    pub fn send_message(&self, wire: u64) -> bool {
        let mut core = self.lock();
        if let Err(e) = core.refresh() {
            debug!("Dropping outgoing message {:016X}: {}", wire, e);
            return false;
        }
        sender::send(&mut core.registry, wire)
    }

    /// Reconciles and lists the registered sources.
    pub fn sources(&self) -> Vec<EndpointInfo> {
        let mut core = self.lock();
        match core.reconcile() {
            Ok(()) => core.registry.inputs(),
            Err(_) => Vec::new(),
        }
    }

    /// Reconciles and lists the registered destinations.
    pub fn destinations(&self) -> Vec<EndpointInfo> {
        let mut core = self.lock();
        match core.reconcile() {
            Ok(()) => core.registry.outputs(),
            Err(_) => Vec::new(),
        }
    }

    /// Messages waiting in the inbound queue.
    pub fn pending_messages(&self) -> usize {
        self.inbound.len()
    }

    /// Closes every open handle and discards queued input. The bridge stays
    /// usable; the next count enumerates again.
    pub fn shutdown(&self) {
        let closed = self.lock().registry.close_all();
        let dropped = self.inbound.clear();
        self.topology.mark_changed();
        info!(
            "MIDI bridge shut down: {} handles closed, {} queued messages dropped",
            closed, dropped
        );
    }
}

impl<E: MidiEngine> Drop for Bridge<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MockMidiEngine;

    #[test]
    fn test_new_uses_preferred_strategy() {
        let engine = MockMidiEngine::new();
        engine.set_preferred_strategy(ReconcileStrategy::Reset);
        let bridge = Bridge::new(engine);
        assert_eq!(bridge.strategy(), ReconcileStrategy::Reset);

        let bridge = Bridge::with_strategy(MockMidiEngine::new(), ReconcileStrategy::Poll);
        assert_eq!(bridge.strategy(), ReconcileStrategy::Poll);
    }

    #[test]
    fn test_shutdown_is_repeatable() {
        let engine = MockMidiEngine::with_devices(&["Keys"], &["Synth"]);
        let bridge = Bridge::new(engine.clone());
        assert_eq!(bridge.count_sources(), 1);

        bridge.shutdown();
        bridge.shutdown();
        drop(bridge);
        assert_eq!(engine.close_log().len(), 2);
    }
}
