//! MIDI device registry and message bridge
//!
//! This module provides:
//! - The packed 64-bit message format and raw packet decoding
//! - A registry of open sources and destinations with stable identifiers
//! - Hot-plug reconciliation by polling or by full reset
//! - Real MIDI device communication via midir
//! - A mock backend for testing
//!
//! The main components are:
//! - [`MidiEngine`] trait over the system MIDI service
//! - [`MidirEngine`] for real MIDI devices
//! - [`MockMidiEngine`] for testing
//! - [`Registry`] and [`Reconciler`], driven by [`crate::bridge::Bridge`]
//!
pub mod codec;
mod engine;
pub mod midir_engine;
pub mod mock_engine;
pub mod queue;
pub mod reconcile;
pub mod registry;
pub mod sender;
pub mod sink;

pub use codec::{encode, short_message_len, Message};
pub use engine::{MidiEngine, MidiError, Opened, Result};
pub use midir_engine::MidirEngine;
pub use mock_engine::MockMidiEngine;
pub use queue::{InboundQueue, QueueWriter};
pub use reconcile::{PendingCloses, ReconcileStrategy, Reconciler};
pub use registry::{EndpointInfo, Registry, NOT_READY, UNKNOWN_NAME};
pub use sink::{CloseNotifier, CloseRecord, Direction, InputSink, TopologyFlag};

use crate::config::BridgeConfig;

// Set default engine type
#[cfg(not(feature = "test-mock"))]
pub type DefaultMidiEngine = MidirEngine;
#[cfg(feature = "test-mock")]
pub type DefaultMidiEngine = MockMidiEngine;

/// Builds the backend the binary and the C interface run on.
#[cfg(not(feature = "test-mock"))]
pub fn create_default_engine(config: &BridgeConfig) -> DefaultMidiEngine {
    MidirEngine::from_config(config)
}

#[cfg(feature = "test-mock")]
pub fn create_default_engine(_config: &BridgeConfig) -> DefaultMidiEngine {
    MockMidiEngine::with_devices(&["Mock Device 1"], &["Mock Device 2"])
}
