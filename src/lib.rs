pub mod bridge;
pub mod cli;
pub mod config;
pub mod ffi;
pub mod logging;
pub mod midi;
pub mod monitor;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use midi::{Message, MidiEngine, MidiError, ReconcileStrategy};
