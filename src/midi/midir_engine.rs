use crate::config::BridgeConfig;
use crate::midi::engine::{MidiEngine, MidiError, Opened, Result};
use crate::midi::sink::{CloseNotifier, InputSink, TopologyFlag};
use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use midir::{
    Ignore, MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection,
    MidiOutputPort,
};
use std::collections::HashMap;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const DEFAULT_HOTPLUG_INTERVAL: Duration = Duration::from_secs(1);

/// An endpoint this engine has connected, tracked so that reopening it can
/// be refused and its disappearance reported.
struct LivePort {
    id: u32,
    name: String,
    closer: CloseNotifier,
}

pub struct MidirInput {
    id: u32,
    index: usize,
    name: String,
    connection: Option<MidiInputConnection<()>>,
}

pub struct MidirOutput {
    id: u32,
    name: String,
    connection: MidiOutputConnection,
}

/// Backend over `midir`.
///
/// midir has no disconnect callbacks, so the engine compares port names on
/// every topology poll: a connected port whose name is no longer listed gets
/// its close notification fired. Ports created by this client are never
/// listed. Identifiers come from a per-engine handle counter.
pub struct MidirEngine {
    client_name: String,
    hotplug_interval: Duration,
    next_id: u32,
    live_inputs: Vec<LivePort>,
    live_outputs: Vec<LivePort>,
    watcher: Option<TopologyWatcher>,
}

impl Default for MidirEngine {
    fn default() -> Self {
        Self::new("midibridge")
    }
}

impl MidirEngine {
    pub fn new(client_name: &str) -> Self {
        Self {
            client_name: client_name.to_string(),
            hotplug_interval: DEFAULT_HOTPLUG_INTERVAL,
            next_id: 0,
            live_inputs: Vec::new(),
            live_outputs: Vec::new(),
            watcher: None,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        let mut engine = Self::new(&config.client_name);
        engine.hotplug_interval = config.hotplug_interval;
        engine
    }

    fn allocate_id(&mut self) -> u32 {
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.next_id
    }

    fn stop_watcher(&mut self) {
        if self.watcher.take().is_some() {
            debug!("Stopped MIDI hotplug watcher");
        }
    }
}

fn port_name_or_index(name: std::result::Result<String, midir::PortInfoError>, index: usize) -> String {
    name.unwrap_or_else(|_| format!("Port {}", index))
}

/// Whether a port belongs to this engine. Some backends list every
/// client's ports, including the ones our own connections create; ALSA names
/// them "client:port", so the client prefix identifies them.
fn is_own_port(name: &str, client_name: &str) -> bool {
    [client_name.to_string(), format!("{}-list", client_name)]
        .iter()
        .any(|client| {
            name.strip_prefix(client.as_str())
                .map_or(false, |rest| rest.starts_with(':'))
        })
}

fn input_ports(midi_in: &MidiInput, client_name: &str) -> Vec<(MidiInputPort, String)> {
    midi_in
        .ports()
        .into_iter()
        .enumerate()
        .map(|(index, port)| {
            let name = port_name_or_index(midi_in.port_name(&port), index);
            (port, name)
        })
        .filter(|(_, name)| !is_own_port(name, client_name))
        .collect()
}

fn output_ports(midi_out: &MidiOutput, client_name: &str) -> Vec<(MidiOutputPort, String)> {
    midi_out
        .ports()
        .into_iter()
        .enumerate()
        .map(|(index, port)| {
            let name = port_name_or_index(midi_out.port_name(&port), index);
            (port, name)
        })
        .filter(|(_, name)| !is_own_port(name, client_name))
        .collect()
}

fn input_names(client_name: &str) -> Result<Vec<String>> {
    let midi_in = MidiInput::new(&format!("{}-list", client_name))?;
    Ok(input_ports(&midi_in, client_name)
        .into_iter()
        .map(|(_, name)| name)
        .collect())
}

fn output_names(client_name: &str) -> Result<Vec<String>> {
    let midi_out = MidiOutput::new(&format!("{}-list", client_name))?;
    Ok(output_ports(&midi_out, client_name)
        .into_iter()
        .map(|(_, name)| name)
        .collect())
}

/// Whether the enumeration slot at `index` is already connected. Ports can
/// share a name, so the k-th port called N counts as open once k ports called
/// N are live.
fn slot_in_use(names: &[String], live_names: &[&str], index: usize) -> bool {
    let Some(name) = names.get(index) else {
        return false;
    };
    let occurrence = names[..=index].iter().filter(|n| *n == name).count();
    let live = live_names.iter().filter(|n| **n == name.as_str()).count();
    live >= occurrence
}

/// Fires the close notifier of every live port that no longer appears in
/// `names`, and stops tracking it.
fn notify_vanished(live: &mut Vec<LivePort>, names: &[String]) {
    let mut available: HashMap<&str, usize> = HashMap::new();
    for name in names {
        *available.entry(name.as_str()).or_insert(0) += 1;
    }
    live.retain(|port| match available.get_mut(port.name.as_str()) {
        Some(count) if *count > 0 => {
            *count -= 1;
            true
        }
        _ => {
            info!("MIDI port {} ({:X}) disappeared", port.name, port.id);
            port.closer.closed();
            false
        }
    });
}

impl MidiEngine for MidirEngine {
    type Input = MidirInput;
    type Output = MidirOutput;

    fn poll_topology(&mut self) {
        match input_names(&self.client_name) {
            Ok(names) => notify_vanished(&mut self.live_inputs, &names),
            Err(e) => warn!("Failed to enumerate MIDI inputs: {}", e),
        }
        match output_names(&self.client_name) {
            Ok(names) => notify_vanished(&mut self.live_outputs, &names),
            Err(e) => warn!("Failed to enumerate MIDI outputs: {}", e),
        }
    }

    fn input_count(&mut self) -> usize {
        input_names(&self.client_name)
            .map(|names| names.len())
            .unwrap_or_else(|e| {
                warn!("Failed to enumerate MIDI inputs: {}", e);
                0
            })
    }

    fn output_count(&mut self) -> usize {
        output_names(&self.client_name)
            .map(|names| names.len())
            .unwrap_or_else(|e| {
                warn!("Failed to enumerate MIDI outputs: {}", e);
                0
            })
    }

    fn open_input(&mut self, index: usize) -> Result<Opened<MidirInput>> {
        let names = input_names(&self.client_name)?;
        let name = names
            .get(index)
            .cloned()
            .ok_or_else(|| MidiError::OpenFailure(format!("no MIDI input at index {}", index)))?;

        let live: Vec<&str> = self.live_inputs.iter().map(|p| p.name.as_str()).collect();
        if slot_in_use(&names, &live, index) {
            return Err(MidiError::OpenFailure(format!("{} is already open", name)));
        }

        let id = self.allocate_id();
        Ok(Opened {
            id,
            name: name.clone(),
            handle: MidirInput {
                id,
                index,
                name,
                connection: None,
            },
        })
    }

    fn start_input(&mut self, handle: &mut MidirInput, sink: InputSink) -> Result<()> {
        let mut midi_in = MidiInput::new(&self.client_name)?;
        midi_in.ignore(Ignore::None);

        let port = input_ports(&midi_in, &self.client_name)
            .into_iter()
            .nth(handle.index)
            .filter(|(_, name)| *name == handle.name)
            .map(|(port, _)| port)
            .ok_or_else(|| {
                MidiError::StartFailure(format!("{} moved before it could start", handle.name))
            })?;

        let closer = sink.close_notifier();
        let connection = midi_in
            .connect(
                &port,
                &format!("{}-in-{:X}", self.client_name, handle.id),
                move |_stamp, message, _| sink.deliver(message),
                (),
            )
            .map_err(|e| MidiError::StartFailure(e.to_string()))?;

        handle.connection = Some(connection);
        self.live_inputs.push(LivePort {
            id: handle.id,
            name: handle.name.clone(),
            closer,
        });
        Ok(())
    }

    fn close_input(&mut self, handle: MidirInput) {
        self.live_inputs.retain(|port| port.id != handle.id);
        if let Some(connection) = handle.connection {
            connection.close();
        }
        debug!("Closed midir input {} ({:X})", handle.name, handle.id);
    }

    fn open_output(&mut self, index: usize, closer: CloseNotifier) -> Result<Opened<MidirOutput>> {
        let midi_out = MidiOutput::new(&self.client_name)?;
        let (ports, names): (Vec<MidiOutputPort>, Vec<String>) =
            output_ports(&midi_out, &self.client_name).into_iter().unzip();
        let name = names
            .get(index)
            .cloned()
            .ok_or_else(|| MidiError::OpenFailure(format!("no MIDI output at index {}", index)))?;

        let live: Vec<&str> = self.live_outputs.iter().map(|p| p.name.as_str()).collect();
        if slot_in_use(&names, &live, index) {
            return Err(MidiError::OpenFailure(format!("{} is already open", name)));
        }

        let id = self.allocate_id();
        let connection = midi_out
            .connect(&ports[index], &format!("{}-out-{:X}", self.client_name, id))
            .map_err(|e| MidiError::OpenFailure(e.to_string()))?;

        self.live_outputs.push(LivePort {
            id,
            name: name.clone(),
            closer,
        });
        Ok(Opened {
            id,
            name: name.clone(),
            handle: MidirOutput {
                id,
                name,
                connection,
            },
        })
    }

    fn close_output(&mut self, handle: MidirOutput) {
        self.live_outputs.retain(|port| port.id != handle.id);
        handle.connection.close();
        debug!("Closed midir output {} ({:X})", handle.name, handle.id);
    }

    fn input_name(&self, handle: &MidirInput) -> Result<String> {
        if input_names(&self.client_name)?.contains(&handle.name) {
            Ok(handle.name.clone())
        } else {
            Err(MidiError::LookupFailure(format!(
                "{} is no longer present",
                handle.name
            )))
        }
    }

    fn output_name(&self, handle: &MidirOutput) -> Result<String> {
        if output_names(&self.client_name)?.contains(&handle.name) {
            Ok(handle.name.clone())
        } else {
            Err(MidiError::LookupFailure(format!(
                "{} is no longer present",
                handle.name
            )))
        }
    }

    fn send_short(&mut self, handle: &mut MidirOutput, bytes: &[u8]) -> Result<()> {
        handle.connection.send(bytes)?;
        Ok(())
    }

    fn watch_topology(&mut self, flag: TopologyFlag) {
        self.stop_watcher();
        match TopologyWatcher::spawn(self.client_name.clone(), self.hotplug_interval, flag) {
            Ok(watcher) => self.watcher = Some(watcher),
            Err(e) => warn!("Failed to start MIDI hotplug watcher: {}", e),
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.stop_watcher();
        self.live_inputs.clear();
        self.live_outputs.clear();

        // Fail early if the system refuses new clients.
        MidiInput::new(&self.client_name)?;
        MidiOutput::new(&self.client_name)?;
        Ok(())
    }
}

type PortSnapshot = (Vec<String>, Vec<String>);

fn snapshot(client_name: &str) -> Option<PortSnapshot> {
    Some((input_names(client_name).ok()?, output_names(client_name).ok()?))
}

/// Background thread that polls port names and raises the topology flag when
/// they change.
struct TopologyWatcher {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TopologyWatcher {
    fn spawn(client_name: String, interval: Duration, flag: TopologyFlag) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("midibridge-hotplug".into())
            .spawn(move || {
                let mut last = snapshot(&client_name);
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                    let current = snapshot(&client_name);
                    if current.is_some() && current != last {
                        debug!("MIDI port list changed");
                        flag.mark_changed();
                        last = current;
                    }
                }
            })?;
        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(handle),
        })
    }
}

impl Drop for TopologyWatcher {
    fn drop(&mut self) {
        // Dropping the sender disconnects the channel and wakes the thread.
        self.stop_tx.take();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::sink::{CloseRecord, Direction};
    use crossbeam::channel::unbounded;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_slot_in_use_with_duplicate_names() {
        let enumerated = names(&["Keys", "Keys", "Pads"]);
        assert!(!slot_in_use(&enumerated, &[], 0));
        assert!(slot_in_use(&enumerated, &["Keys"], 0));
        assert!(!slot_in_use(&enumerated, &["Keys"], 1));
        assert!(slot_in_use(&enumerated, &["Keys", "Keys"], 1));
        assert!(!slot_in_use(&enumerated, &["Keys", "Keys"], 2));
        assert!(!slot_in_use(&enumerated, &["Keys"], 7));
    }

    #[test]
    fn test_own_ports_are_skipped() {
        assert!(is_own_port("midibridge:midibridge-out-1 128:1", "midibridge"));
        assert!(is_own_port("midibridge-list:midir input 129:0", "midibridge"));
        assert!(!is_own_port("USB Keys:USB Keys MIDI 1 20:0", "midibridge"));
        assert!(!is_own_port("midibridge2:port 130:0", "midibridge"));
        assert!(!is_own_port("midibridge", "midibridge"));
        assert!(is_own_port("studio:studio-in-2 131:0", "studio"));
    }

    #[test]
    fn test_vanished_ports_are_reported_once() {
        let (tx, rx) = unbounded::<CloseRecord>();
        let mut live = vec![
            LivePort {
                id: 1,
                name: "Keys".to_string(),
                closer: CloseNotifier::new(Direction::Input, 10, tx.clone()),
            },
            LivePort {
                id: 2,
                name: "Pads".to_string(),
                closer: CloseNotifier::new(Direction::Input, 11, tx),
            },
        ];

        notify_vanished(&mut live, &names(&["Keys"]));
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, 1);
        assert_eq!(rx.try_recv().map(|r| r.serial).ok(), Some(11));

        notify_vanished(&mut live, &names(&["Keys"]));
        assert!(rx.try_recv().is_err());
    }
}
