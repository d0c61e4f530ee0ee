//! In-memory backend used by the tests and by `--features test-mock` builds.
//!
//! Clones share state, so a test can keep one clone for plugging devices and
//! injecting data while the bridge owns another.

use crate::midi::engine::{MidiEngine, MidiError, Opened, Result};
use crate::midi::reconcile::ReconcileStrategy;
use crate::midi::sink::{CloseNotifier, InputSink, TopologyFlag};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone, Default)]
pub struct MockMidiEngine {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    inputs: Vec<MockPort>,
    outputs: Vec<MockPort>,
    next_id: u32,
    closers: HashMap<u32, CloseNotifier>,
    close_log: Vec<u32>,
    sent: Vec<(u32, Vec<u8>)>,
    resets: usize,
    topology: Option<TopologyFlag>,
    preferred: Option<ReconcileStrategy>,
    fail_start: bool,
    fail_reset: bool,
    fail_names: bool,
    echo_closes: bool,
    reuse_ids: bool,
    defer_closes: bool,
    deferred: Vec<CloseNotifier>,
}

struct MockPort {
    name: String,
    live: Option<LivePort>,
}

struct LivePort {
    id: u32,
    sink: Option<InputSink>,
}

/// Handle to a mock endpoint
#[derive(Debug)]
pub struct MockHandle {
    id: u32,
}

impl MockHandle {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl MockState {
    fn allocate_id(&mut self) -> u32 {
        if self.reuse_ids {
            let live: Vec<u32> = self
                .inputs
                .iter()
                .chain(self.outputs.iter())
                .filter_map(|port| port.live.as_ref().map(|live| live.id))
                .collect();
            (1..).find(|id| !live.contains(id)).unwrap_or(1)
        } else {
            self.next_id += 1;
            self.next_id
        }
    }

    fn topology_changed(&self) {
        if let Some(flag) = &self.topology {
            flag.mark_changed();
        }
    }

    fn release(&mut self, id: u32) -> Option<CloseNotifier> {
        self.close_log.push(id);
        for port in self.inputs.iter_mut().chain(self.outputs.iter_mut()) {
            if port.live.as_ref().map(|live| live.id) == Some(id) {
                port.live = None;
            }
        }
        self.closers.remove(&id)
    }
}

fn plug(ports: &mut Vec<MockPort>, name: &str) {
    ports.push(MockPort {
        name: name.to_string(),
        live: None,
    });
}

/// Removes the first port called `name`, returning the id it was open under.
fn unplug(ports: &mut Vec<MockPort>, name: &str) -> Option<Option<u32>> {
    let position = ports.iter().position(|port| port.name == name)?;
    let port = ports.remove(position);
    Some(port.live.map(|live| live.id))
}

impl MockMidiEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(inputs: &[&str], outputs: &[&str]) -> Self {
        let engine = Self::new();
        for name in inputs {
            engine.plug_input(name);
        }
        for name in outputs {
            engine.plug_output(name);
        }
        engine
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn plug_input(&self, name: &str) {
        let mut state = self.state();
        plug(&mut state.inputs, name);
        state.topology_changed();
    }

    pub fn plug_output(&self, name: &str) {
        let mut state = self.state();
        plug(&mut state.outputs, name);
        state.topology_changed();
    }

    /// Removes an input the way a cable pull would: an open handle gets its
    /// close notification and the topology flag is raised. Returns false if
    /// no input has that name.
    pub fn unplug_input(&self, name: &str) -> bool {
        let closer = {
            let mut state = self.state();
            let Some(live_id) = unplug(&mut state.inputs, name) else {
                return false;
            };
            state.topology_changed();
            let closer = live_id.and_then(|id| state.closers.get(&id).cloned());
            if state.defer_closes {
                state.deferred.extend(closer);
                None
            } else {
                closer
            }
        };
        if let Some(closer) = closer {
            closer.closed();
        }
        true
    }

    pub fn unplug_output(&self, name: &str) -> bool {
        let closer = {
            let mut state = self.state();
            let Some(live_id) = unplug(&mut state.outputs, name) else {
                return false;
            };
            state.topology_changed();
            let closer = live_id.and_then(|id| state.closers.get(&id).cloned());
            if state.defer_closes {
                state.deferred.extend(closer);
                None
            } else {
                closer
            }
        };
        if let Some(closer) = closer {
            closer.closed();
        }
        true
    }

    /// Sink of the started input called `name`, for feeding data from test
    /// threads.
    pub fn input_sink(&self, name: &str) -> Option<InputSink> {
        self.state()
            .inputs
            .iter()
            .find(|port| port.name == name)
            .and_then(|port| port.live.as_ref())
            .and_then(|live| live.sink.clone())
    }

    /// Delivers one raw packet from the input called `name`. Returns false if
    /// that input is not started.
    pub fn emit(&self, name: &str, bytes: &[u8]) -> bool {
        match self.input_sink(name) {
            Some(sink) => {
                sink.deliver(bytes);
                true
            }
            None => false,
        }
    }

    pub fn is_input_open(&self, name: &str) -> bool {
        self.state()
            .inputs
            .iter()
            .any(|port| port.name == name && port.live.is_some())
    }

    pub fn is_output_open(&self, name: &str) -> bool {
        self.state()
            .outputs
            .iter()
            .any(|port| port.name == name && port.live.is_some())
    }

    /// Identifiers of every handle closed so far, in closing order.
    pub fn close_log(&self) -> Vec<u32> {
        self.state().close_log.clone()
    }

    pub fn sent(&self) -> Vec<(u32, Vec<u8>)> {
        self.state().sent.clone()
    }

    pub fn resets(&self) -> usize {
        self.state().resets
    }

    pub fn set_preferred_strategy(&self, strategy: ReconcileStrategy) {
        self.state().preferred = Some(strategy);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.state().fail_start = fail;
    }

    pub fn set_fail_reset(&self, fail: bool) {
        self.state().fail_reset = fail;
    }

    pub fn set_fail_names(&self, fail: bool) {
        self.state().fail_names = fail;
    }

    /// Report every close back through the handle's close notifier, the way
    /// some drivers do for closes the application asked for itself.
    pub fn set_echo_closes(&self, echo: bool) {
        self.state().echo_closes = echo;
    }

    /// Hold unplug notifications until the next topology poll, the way
    /// backends that only notice removals while enumerating behave.
    pub fn set_defer_closes(&self, defer: bool) {
        self.state().defer_closes = defer;
    }

    /// Hand out the lowest free identifier instead of a fresh one.
    pub fn set_reuse_ids(&self, reuse: bool) {
        self.state().reuse_ids = reuse;
    }
}

impl MidiEngine for MockMidiEngine {
    type Input = MockHandle;
    type Output = MockHandle;

    fn preferred_strategy(&self) -> ReconcileStrategy {
        self.state().preferred.unwrap_or(ReconcileStrategy::Poll)
    }

    fn poll_topology(&mut self) {
        let deferred = std::mem::take(&mut self.state().deferred);
        for closer in deferred {
            closer.closed();
        }
    }

    fn input_count(&mut self) -> usize {
        self.state().inputs.len()
    }

    fn output_count(&mut self) -> usize {
        self.state().outputs.len()
    }

    fn open_input(&mut self, index: usize) -> Result<Opened<MockHandle>> {
        let mut state = self.state();
        let id = state.allocate_id();
        let port = state
            .inputs
            .get_mut(index)
            .ok_or_else(|| MidiError::OpenFailure(format!("no input at index {}", index)))?;
        if port.live.is_some() {
            return Err(MidiError::OpenFailure(format!("{} is in use", port.name)));
        }
        port.live = Some(LivePort { id, sink: None });
        Ok(Opened {
            id,
            name: port.name.clone(),
            handle: MockHandle { id },
        })
    }

    fn start_input(&mut self, handle: &mut MockHandle, sink: InputSink) -> Result<()> {
        let mut state = self.state();
        if state.fail_start {
            return Err(MidiError::StartFailure("mock start refused".to_string()));
        }
        let live = state
            .inputs
            .iter_mut()
            .filter_map(|port| port.live.as_mut())
            .find(|live| live.id == handle.id)
            .ok_or_else(|| MidiError::StartFailure("input vanished before start".to_string()))?;
        let closer = sink.close_notifier();
        live.sink = Some(sink);
        state.closers.insert(handle.id, closer);
        Ok(())
    }

    fn close_input(&mut self, handle: MockHandle) {
        let echo = {
            let mut state = self.state();
            let closer = state.release(handle.id);
            if state.echo_closes {
                closer
            } else {
                None
            }
        };
        if let Some(closer) = echo {
            closer.closed();
        }
    }

    fn open_output(&mut self, index: usize, closer: CloseNotifier) -> Result<Opened<MockHandle>> {
        let mut state = self.state();
        let id = state.allocate_id();
        let port = state
            .outputs
            .get_mut(index)
            .ok_or_else(|| MidiError::OpenFailure(format!("no output at index {}", index)))?;
        if port.live.is_some() {
            return Err(MidiError::OpenFailure(format!("{} is in use", port.name)));
        }
        port.live = Some(LivePort { id, sink: None });
        let name = port.name.clone();
        state.closers.insert(id, closer);
        Ok(Opened {
            id,
            name,
            handle: MockHandle { id },
        })
    }

    fn close_output(&mut self, handle: MockHandle) {
        let echo = {
            let mut state = self.state();
            let closer = state.release(handle.id);
            if state.echo_closes {
                closer
            } else {
                None
            }
        };
        if let Some(closer) = echo {
            closer.closed();
        }
    }

    fn input_name(&self, handle: &MockHandle) -> Result<String> {
        let state = self.state();
        if state.fail_names {
            return Err(MidiError::LookupFailure("mock names unavailable".to_string()));
        }
        state
            .inputs
            .iter()
            .find(|port| port.live.as_ref().map(|live| live.id) == Some(handle.id))
            .map(|port| port.name.clone())
            .ok_or_else(|| MidiError::LookupFailure(format!("input {:X} is gone", handle.id)))
    }

    fn output_name(&self, handle: &MockHandle) -> Result<String> {
        let state = self.state();
        if state.fail_names {
            return Err(MidiError::LookupFailure("mock names unavailable".to_string()));
        }
        state
            .outputs
            .iter()
            .find(|port| port.live.as_ref().map(|live| live.id) == Some(handle.id))
            .map(|port| port.name.clone())
            .ok_or_else(|| MidiError::LookupFailure(format!("output {:X} is gone", handle.id)))
    }

    fn send_short(&mut self, handle: &mut MockHandle, bytes: &[u8]) -> Result<()> {
        let mut state = self.state();
        let live = state
            .outputs
            .iter()
            .any(|port| port.live.as_ref().map(|live| live.id) == Some(handle.id));
        if !live {
            return Err(MidiError::SendFailure(format!(
                "output {:X} is gone",
                handle.id
            )));
        }
        state.sent.push((handle.id, bytes.to_vec()));
        Ok(())
    }

    fn watch_topology(&mut self, flag: TopologyFlag) {
        self.state().topology = Some(flag);
    }

    fn reset(&mut self) -> Result<()> {
        let mut state = self.state();
        state.resets += 1;
        if state.fail_reset {
            return Err(MidiError::ResetFailure("mock reset refused".to_string()));
        }
        Ok(())
    }
}
