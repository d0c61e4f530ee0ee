use crate::midi::reconcile::ReconcileStrategy;
use crate::midi::sink::{CloseNotifier, InputSink, TopologyFlag};
use std::error::Error;
use std::fmt;
use std::io;

/// Error type shared by the registry, the reconciler and the backends
#[derive(Debug)]
pub enum MidiError {
    /// The backend refused to open a device
    OpenFailure(String),
    /// A device opened but could not start delivering input
    StartFailure(String),
    /// A name or handle lookup failed
    LookupFailure(String),
    /// A full rebuild of the backend resources failed part way
    ResetFailure(String),
    /// The backend could not transmit a message
    SendFailure(String),
    /// No registered endpoint carries this identifier
    UnknownEndpoint(u32),
    /// Configuration could not be loaded or holds an invalid value
    Config(String),
    /// Filesystem error, mostly from the logger
    Io(io::Error),
}

impl fmt::Display for MidiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiError::OpenFailure(msg) => write!(f, "MIDI open error: {}", msg),
            MidiError::StartFailure(msg) => write!(f, "MIDI start error: {}", msg),
            MidiError::LookupFailure(msg) => write!(f, "MIDI lookup error: {}", msg),
            MidiError::ResetFailure(msg) => write!(f, "MIDI reset error: {}", msg),
            MidiError::SendFailure(msg) => write!(f, "MIDI send error: {}", msg),
            MidiError::UnknownEndpoint(id) => write!(f, "unknown MIDI endpoint: {:X}", id),
            MidiError::Config(msg) => write!(f, "configuration error: {}", msg),
            MidiError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl Error for MidiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MidiError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for MidiError {
    fn from(err: io::Error) -> Self {
        MidiError::Io(err)
    }
}

impl From<midir::InitError> for MidiError {
    fn from(err: midir::InitError) -> Self {
        MidiError::OpenFailure(err.to_string())
    }
}

impl From<midir::PortInfoError> for MidiError {
    fn from(err: midir::PortInfoError) -> Self {
        MidiError::LookupFailure(err.to_string())
    }
}

impl From<midir::SendError> for MidiError {
    fn from(err: midir::SendError) -> Self {
        MidiError::SendFailure(err.to_string())
    }
}

impl From<config::ConfigError> for MidiError {
    fn from(err: config::ConfigError) -> Self {
        MidiError::Config(err.to_string())
    }
}

/// Result type for MIDI operations
pub type Result<T> = std::result::Result<T, MidiError>;

/// A handle freshly acquired from a backend, with the identifier it was
/// assigned and the name it was enumerated under.
#[derive(Debug)]
pub struct Opened<H> {
    pub id: u32,
    pub name: String,
    pub handle: H,
}

/// The operating system capability the bridge is written against.
///
/// Backends enumerate endpoints by index, open and close handles, and call
/// back into the bridge through the sinks they are given. Those callbacks may
/// run on any thread. Handles are owned values: closing consumes them, so the
/// registry can release each one exactly once.
pub trait MidiEngine: Send {
    /// Open input connection.
    type Input: Send;
    /// Open output connection.
    type Output: Send;

    /// Reconciliation strategy that suits how this backend reports topology
    /// changes.
    fn preferred_strategy(&self) -> ReconcileStrategy {
        ReconcileStrategy::Poll
    }

    /// Reports endpoints that disappeared since the last call through their
    /// close notifiers. Run at the start of every polling pass, before pending
    /// closes are drained, so a removal shows up in the same pass.
    fn poll_topology(&mut self) {}

    /// Number of input endpoints currently enumerated by the system.
    fn input_count(&mut self) -> usize;

    /// Number of output endpoints currently enumerated by the system.
    fn output_count(&mut self) -> usize;

    /// Acquires the input at `index`. Opening a device that is already open
    /// must fail rather than hand out a second handle.
    fn open_input(&mut self, index: usize) -> Result<Opened<Self::Input>>;

    /// Starts delivering data from an opened input into `sink`.
    fn start_input(&mut self, handle: &mut Self::Input, sink: InputSink) -> Result<()>;

    fn close_input(&mut self, handle: Self::Input);

    /// Acquires the output at `index`. `closer` is fired if the system later
    /// reports the output as gone.
    fn open_output(&mut self, index: usize, closer: CloseNotifier)
        -> Result<Opened<Self::Output>>;

    fn close_output(&mut self, handle: Self::Output);

    /// Display name of an open input, as currently reported by the system.
    fn input_name(&self, handle: &Self::Input) -> Result<String>;

    /// Display name of an open output, as currently reported by the system.
    fn output_name(&self, handle: &Self::Output) -> Result<String>;

    /// Transmits one short message of one to three bytes.
    fn send_short(&mut self, handle: &mut Self::Output, bytes: &[u8]) -> Result<()>;

    /// Registers `flag` to be marked whenever the system's device topology
    /// changes. Backends without change notifications ignore this.
    fn watch_topology(&mut self, _flag: TopologyFlag) {}

    /// Disposes and recreates client level resources. Called by the reset
    /// strategy after every handle has been closed.
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}
