use crate::midi::engine::{MidiEngine, MidiError, Opened, Result};
use crate::midi::queue::QueueWriter;
use crate::midi::sink::{CloseNotifier, CloseRecord, Direction, InputSink};
use crossbeam::channel::Sender;
use log::{debug, info};

/// Name returned for identifiers that are not registered
pub const NOT_READY: &str = "(not ready)";
/// Name returned when the backend cannot name a registered endpoint
pub const UNKNOWN_NAME: &str = "unknown";

struct Endpoint<H> {
    id: u32,
    serial: u64,
    name: String,
    handle: H,
}

/// Listing entry for one registered endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    pub index: usize,
    pub id: u32,
    pub name: String,
}

/// Authoritative set of open inputs and outputs.
///
/// Owns the backend and every handle it handed out. Insertion order is the
/// index order seen across the boundary; identifiers are unique within each
/// direction.
pub struct Registry<E: MidiEngine> {
    engine: E,
    inputs: Vec<Endpoint<E::Input>>,
    outputs: Vec<Endpoint<E::Output>>,
    next_serial: u64,
    writer: QueueWriter,
    closes: Sender<CloseRecord>,
}

impl<E: MidiEngine> Registry<E> {
    pub fn new(engine: E, writer: QueueWriter, closes: Sender<CloseRecord>) -> Self {
        Self {
            engine,
            inputs: Vec::new(),
            outputs: Vec::new(),
            next_serial: 1,
            writer,
            closes,
        }
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    fn allocate_serial(&mut self) -> u64 {
        let serial = self.next_serial;
        self.next_serial += 1;
        serial
    }

    /// Opens and starts the input at `index` in the system enumeration.
    pub fn open_input(&mut self, index: usize) -> Result<u32> {
        let Opened {
            id,
            name,
            mut handle,
        } = self.engine.open_input(index)?;

        if id == 0 || self.inputs.iter().any(|entry| entry.id == id) {
            self.engine.close_input(handle);
            return Err(MidiError::OpenFailure(format!(
                "input {} was given unusable identifier {:X}",
                index, id
            )));
        }

        let serial = self.allocate_serial();
        let closer = CloseNotifier::new(Direction::Input, serial, self.closes.clone());
        let sink = InputSink::new(id, self.writer.clone(), closer);
        if let Err(e) = self.engine.start_input(&mut handle, sink) {
            self.engine.close_input(handle);
            return Err(e);
        }

        info!("Registered MIDI input {:X} ({})", id, name);
        self.inputs.push(Endpoint {
            id,
            serial,
            name,
            handle,
        });
        Ok(id)
    }

    /// Opens the output at `index` in the system enumeration.
    pub fn open_output(&mut self, index: usize) -> Result<u32> {
        let serial = self.allocate_serial();
        let closer = CloseNotifier::new(Direction::Output, serial, self.closes.clone());
        let Opened { id, name, handle } = self.engine.open_output(index, closer)?;

        if id == 0 || self.outputs.iter().any(|entry| entry.id == id) {
            self.engine.close_output(handle);
            return Err(MidiError::OpenFailure(format!(
                "output {} was given unusable identifier {:X}",
                index, id
            )));
        }

        info!("Registered MIDI output {:X} ({})", id, name);
        self.outputs.push(Endpoint {
            id,
            serial,
            name,
            handle,
        });
        Ok(id)
    }

    pub fn close_input(&mut self, id: u32) -> Result<()> {
        let position = self
            .inputs
            .iter()
            .position(|entry| entry.id == id)
            .ok_or(MidiError::UnknownEndpoint(id))?;
        let entry = self.inputs.remove(position);
        info!("Closing MIDI input {:X} ({})", entry.id, entry.name);
        self.engine.close_input(entry.handle);
        Ok(())
    }

    pub fn close_output(&mut self, id: u32) -> Result<()> {
        let position = self
            .outputs
            .iter()
            .position(|entry| entry.id == id)
            .ok_or(MidiError::UnknownEndpoint(id))?;
        let entry = self.outputs.remove(position);
        info!("Closing MIDI output {:X} ({})", entry.id, entry.name);
        self.engine.close_output(entry.handle);
        Ok(())
    }

    /// Closes every registered handle, returning how many were closed.
    pub fn close_all(&mut self) -> usize {
        let mut closed = 0;
        while let Some(entry) = self.inputs.pop() {
            debug!("Closing MIDI input {:X} on teardown", entry.id);
            self.engine.close_input(entry.handle);
            closed += 1;
        }
        while let Some(entry) = self.outputs.pop() {
            debug!("Closing MIDI output {:X} on teardown", entry.id);
            self.engine.close_output(entry.handle);
            closed += 1;
        }
        closed
    }

    pub fn count_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn count_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn input_id_at(&self, index: usize) -> Option<u32> {
        self.inputs.get(index).map(|entry| entry.id)
    }

    pub fn output_id_at(&self, index: usize) -> Option<u32> {
        self.outputs.get(index).map(|entry| entry.id)
    }

    pub fn contains_input(&self, id: u32) -> bool {
        self.inputs.iter().any(|entry| entry.id == id)
    }

    pub fn contains_output(&self, id: u32) -> bool {
        self.outputs.iter().any(|entry| entry.id == id)
    }

    /// Identifier of the endpoint registered under `serial`, if it is still
    /// registered.
    pub fn id_for_serial(&self, direction: Direction, serial: u64) -> Option<u32> {
        match direction {
            Direction::Input => self
                .inputs
                .iter()
                .find(|entry| entry.serial == serial)
                .map(|entry| entry.id),
            Direction::Output => self
                .outputs
                .iter()
                .find(|entry| entry.serial == serial)
                .map(|entry| entry.id),
        }
    }

    pub fn input_name(&self, id: u32) -> String {
        match self.inputs.iter().find(|entry| entry.id == id) {
            Some(entry) => self.engine.input_name(&entry.handle).unwrap_or_else(|e| {
                debug!("Name lookup for input {:X} failed: {}", id, e);
                UNKNOWN_NAME.to_string()
            }),
            None => NOT_READY.to_string(),
        }
    }

    pub fn output_name(&self, id: u32) -> String {
        match self.outputs.iter().find(|entry| entry.id == id) {
            Some(entry) => self.engine.output_name(&entry.handle).unwrap_or_else(|e| {
                debug!("Name lookup for output {:X} failed: {}", id, e);
                UNKNOWN_NAME.to_string()
            }),
            None => NOT_READY.to_string(),
        }
    }

    /// Registered inputs with the names they were enumerated under.
    pub fn inputs(&self) -> Vec<EndpointInfo> {
        self.inputs
            .iter()
            .enumerate()
            .map(|(index, entry)| EndpointInfo {
                index,
                id: entry.id,
                name: entry.name.clone(),
            })
            .collect()
    }

    /// Registered outputs with the names they were enumerated under.
    pub fn outputs(&self) -> Vec<EndpointInfo> {
        self.outputs
            .iter()
            .enumerate()
            .map(|(index, entry)| EndpointInfo {
                index,
                id: entry.id,
                name: entry.name.clone(),
            })
            .collect()
    }

    /// Sends `bytes` to the output currently registered as `id`.
    pub fn transmit(&mut self, id: u32, bytes: &[u8]) -> Result<()> {
        let entry = self
            .outputs
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(MidiError::UnknownEndpoint(id))?;
        self.engine.send_short(&mut entry.handle, bytes)
    }
}
