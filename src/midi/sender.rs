use crate::midi::codec::Message;
use crate::midi::engine::{MidiEngine, MidiError};
use crate::midi::registry::Registry;
use log::{debug, warn};

/// Sends one wire message to the output named by its low 32 bits.
///
/// The destination is looked up in the registry at call time. Unknown
/// destinations, statuses that are not short messages and backend failures
/// all drop the message; the return value only says whether it went out.
pub fn send<E: MidiEngine>(registry: &mut Registry<E>, wire: u64) -> bool {
    let message = Message::decode(wire);
    let Some(bytes) = message.to_short_bytes() else {
        debug!("Dropping outgoing {}: not a short message", message);
        return false;
    };

    match registry.transmit(message.endpoint_id, &bytes) {
        Ok(()) => true,
        Err(MidiError::UnknownEndpoint(id)) => {
            debug!("Dropping outgoing {}: no destination {:X}", message, id);
            false
        }
        Err(e) => {
            warn!("Failed to send {}: {}", message, e);
            false
        }
    }
}
