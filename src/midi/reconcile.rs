//! Keeps the registry in step with the system's device topology.

use crate::midi::engine::{MidiEngine, MidiError, Result};
use crate::midi::registry::Registry;
use crate::midi::sink::{CloseRecord, Direction, TopologyFlag};
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};
use std::fmt;
use std::str::FromStr;

/// How hot-plug changes reach the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStrategy {
    /// Apply recorded disconnects, then try to open every enumerated endpoint.
    /// Runs on every count and every dequeue.
    Poll,
    /// Rebuild everything from scratch, but only after the system reported a
    /// topology change.
    Reset,
}

impl fmt::Display for ReconcileStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileStrategy::Poll => write!(f, "poll"),
            ReconcileStrategy::Reset => write!(f, "reset"),
        }
    }
}

impl FromStr for ReconcileStrategy {
    type Err = MidiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poll" => Ok(ReconcileStrategy::Poll),
            "reset" => Ok(ReconcileStrategy::Reset),
            other => Err(MidiError::Config(format!(
                "unknown reconcile strategy '{}', expected 'poll' or 'reset'",
                other
            ))),
        }
    }
}

/// Disconnects recorded by callback threads, waiting for the consumer
pub struct PendingCloses {
    tx: Sender<CloseRecord>,
    rx: Receiver<CloseRecord>,
}

impl Default for PendingCloses {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingCloses {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Sender handed to the registry for building close notifiers.
    pub fn sender(&self) -> Sender<CloseRecord> {
        self.tx.clone()
    }

    fn next(&self) -> Option<CloseRecord> {
        self.rx.try_recv().ok()
    }

    fn discard(&self) -> usize {
        self.rx.try_iter().count()
    }
}

pub struct Reconciler {
    strategy: ReconcileStrategy,
    pending: PendingCloses,
    topology: TopologyFlag,
}

impl Reconciler {
    pub fn new(strategy: ReconcileStrategy, pending: PendingCloses, topology: TopologyFlag) -> Self {
        Self {
            strategy,
            pending,
            topology,
        }
    }

    pub fn strategy(&self) -> ReconcileStrategy {
        self.strategy
    }

    /// Full reconciliation pass, run before counting and before dequeuing.
    pub fn run<E: MidiEngine>(&mut self, registry: &mut Registry<E>) -> Result<()> {
        match self.strategy {
            ReconcileStrategy::Poll => {
                registry.engine_mut().poll_topology();
                self.apply_pending_closes(registry);
                self.open_new_endpoints(registry);
                Ok(())
            }
            ReconcileStrategy::Reset => {
                self.reset_if_required(registry)?;
                self.apply_pending_closes(registry);
                Ok(())
            }
        }
    }

    /// Cheap check run before index and name lookups and before sending.
    /// Under polling this does nothing, so a count followed by index lookups
    /// sees one stable snapshot.
    pub fn refresh<E: MidiEngine>(&mut self, registry: &mut Registry<E>) -> Result<()> {
        match self.strategy {
            ReconcileStrategy::Poll => Ok(()),
            ReconcileStrategy::Reset => self.reset_if_required(registry),
        }
    }

    /// Closes every endpoint a callback reported as gone. Records whose
    /// registration is no longer present are skipped, so a handle is never
    /// closed twice even when the backend reports our own closes back to us.
    pub fn apply_pending_closes<E: MidiEngine>(&mut self, registry: &mut Registry<E>) -> usize {
        let mut closed = 0;
        while let Some(record) = self.pending.next() {
            let Some(id) = registry.id_for_serial(record.direction, record.serial) else {
                debug!(
                    "Ignoring close record for {:?} registration {}, already gone",
                    record.direction, record.serial
                );
                continue;
            };

            let result = match record.direction {
                Direction::Input => registry.close_input(id),
                Direction::Output => registry.close_output(id),
            };
            match result {
                Ok(()) => closed += 1,
                Err(e) => warn!("Failed to close {:?} {:X}: {}", record.direction, id, e),
            }
        }
        closed
    }

    /// Tries to open every enumerated endpoint. Endpoints already open are
    /// refused by the backend; every failure is skipped.
    pub fn open_new_endpoints<E: MidiEngine>(&mut self, registry: &mut Registry<E>) -> usize {
        let mut opened = 0;

        let input_count = registry.engine_mut().input_count();
        for index in 0..input_count {
            match registry.open_input(index) {
                Ok(_) => opened += 1,
                Err(e) => debug!("Skipping MIDI input {}: {}", index, e),
            }
        }

        let output_count = registry.engine_mut().output_count();
        for index in 0..output_count {
            match registry.open_output(index) {
                Ok(_) => opened += 1,
                Err(e) => debug!("Skipping MIDI output {}: {}", index, e),
            }
        }

        opened
    }

    /// Rebuilds the registry if the topology flag is raised. On failure the
    /// flag is raised again so the next call retries.
    pub fn reset_if_required<E: MidiEngine>(&mut self, registry: &mut Registry<E>) -> Result<()> {
        if !self.topology.take() {
            return Ok(());
        }

        match self.rebuild(registry) {
            Ok(()) => {
                info!(
                    "MIDI setup rebuilt: {} sources, {} destinations",
                    registry.count_inputs(),
                    registry.count_outputs()
                );
                Ok(())
            }
            Err(e) => {
                self.topology.mark_changed();
                warn!("MIDI setup rebuild failed, will retry: {}", e);
                Err(MidiError::ResetFailure(e.to_string()))
            }
        }
    }

    fn rebuild<E: MidiEngine>(&mut self, registry: &mut Registry<E>) -> Result<()> {
        registry.close_all();
        let discarded = self.pending.discard();
        if discarded > 0 {
            debug!("Discarded {} close records during rebuild", discarded);
        }

        registry.engine_mut().reset()?;
        registry.engine_mut().watch_topology(self.topology.clone());

        let input_count = registry.engine_mut().input_count();
        for index in 0..input_count {
            registry.open_input(index)?;
        }

        let output_count = registry.engine_mut().output_count();
        for index in 0..output_count {
            registry.open_output(index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("poll".parse::<ReconcileStrategy>().unwrap(), ReconcileStrategy::Poll);
        assert_eq!(" Reset ".parse::<ReconcileStrategy>().unwrap(), ReconcileStrategy::Reset);
        assert!(matches!(
            "sometimes".parse::<ReconcileStrategy>(),
            Err(MidiError::Config(_))
        ));
    }

    #[test]
    fn test_strategy_display_round_trips() {
        for strategy in [ReconcileStrategy::Poll, ReconcileStrategy::Reset] {
            assert_eq!(strategy.to_string().parse::<ReconcileStrategy>().unwrap(), strategy);
        }
    }
}
