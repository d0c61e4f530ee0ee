//! Conversion between raw MIDI bytes and the 64-bit wire message.
//!
//! Wire layout, low bits first: endpoint id (32), status (8), data1 (8),
//! data2 (8). The top byte is always zero.

use std::fmt;

/// Status byte opening a system exclusive frame
pub const SYSEX_START: u8 = 0xF0;
/// Status byte closing a system exclusive frame
pub const SYSEX_END: u8 = 0xF7;
/// Manufacturer and device bytes of the only sysex frames that are decoded
pub const VENDOR_SIGNATURE: [u8; 4] = [0x00, 0x20, 0x76, 0x03];

/// Packs the fields of one message into the wire format.
pub fn encode(endpoint_id: u32, status: u8, data1: u8, data2: u8) -> u64 {
    u64::from(endpoint_id)
        | u64::from(status) << 32
        | u64::from(data1) << 40
        | u64::from(data2) << 48
}

/// One decoded MIDI event, tagged with the endpoint it came from or is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Message {
    pub endpoint_id: u32,
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl Message {
    pub fn new(endpoint_id: u32, status: u8, data1: u8, data2: u8) -> Self {
        Self {
            endpoint_id,
            status,
            data1,
            data2,
        }
    }

    /// Unpacks a driver packed short message (`status | data1 << 8 | data2 << 16`).
    pub fn from_short_word(endpoint_id: u32, raw: u32) -> Self {
        Self::new(endpoint_id, raw as u8, (raw >> 8) as u8, (raw >> 16) as u8)
    }

    pub fn encode(&self) -> u64 {
        encode(self.endpoint_id, self.status, self.data1, self.data2)
    }

    pub fn decode(wire: u64) -> Self {
        Self::new(
            wire as u32,
            (wire >> 32) as u8,
            (wire >> 40) as u8,
            (wire >> 48) as u8,
        )
    }

    /// Bytes to put on the wire when this message is sent as a short message.
    /// Returns `None` for statuses that do not start a short message.
    pub fn to_short_bytes(&self) -> Option<Vec<u8>> {
        match short_message_len(self.status)? {
            1 => Some(vec![self.status]),
            2 => Some(vec![self.status, self.data1]),
            _ => Some(vec![self.status, self.data1, self.data2]),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:X}) {:02X} {:02X} {:02X}",
            self.endpoint_id, self.status, self.data1, self.data2
        )
    }
}

/// Length in bytes, status included, of the short message opened by `status`.
pub fn short_message_len(status: u8) -> Option<usize> {
    match status {
        0x80..=0xBF | 0xE0..=0xEF | 0xF2 => Some(3),
        0xC0..=0xDF | 0xF1 | 0xF3 => Some(2),
        0xF6 | 0xF8..=0xFF => Some(1),
        _ => None,
    }
}

/// Splits one packet of raw input bytes into messages.
///
/// Every status byte starts a message and keeps at most two of the data bytes
/// that follow it. Packets must carry their own status: one that starts with a
/// data byte is dropped. A packet opening with `0xF0` must be a complete
/// single packet sysex frame carrying [`VENDOR_SIGNATURE`]; the two payload
/// bytes after the signature become `data1` and `data2` of a `0xF0` message.
/// Any other sysex packet is dropped.
pub fn decode_packet(endpoint_id: u32, bytes: &[u8]) -> Vec<Message> {
    let Some(&first) = bytes.first() else {
        return Vec::new();
    };

    if first == SYSEX_START {
        return decode_vendor_sysex(endpoint_id, bytes).into_iter().collect();
    }

    if first < 0x80 {
        return Vec::new();
    }

    let mut messages = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let mut message = Message::new(endpoint_id, bytes[offset], 0, 0);
        offset += 1;

        let mut count = 0;
        while offset < bytes.len() && bytes[offset] < 0x80 {
            match count {
                0 => message.data1 = bytes[offset],
                1 => message.data2 = bytes[offset],
                _ => {}
            }
            count += 1;
            offset += 1;
        }
        messages.push(message);
    }
    messages
}

fn decode_vendor_sysex(endpoint_id: u32, frame: &[u8]) -> Option<Message> {
    // F0, signature, two payload bytes, F7
    if frame.len() < 8 || frame.last() != Some(&SYSEX_END) || frame[1..5] != VENDOR_SIGNATURE {
        return None;
    }
    Some(Message::new(endpoint_id, SYSEX_START, frame[5], frame[6]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_bit_layout() {
        let wire = encode(0x1234_5678, 0x90, 0x40, 0x7F);
        assert_eq!(wire, 0x007F_4090_1234_5678);
        assert_eq!(wire as u32, 0x1234_5678);
        assert_eq!((wire >> 32) as u8, 0x90);
        assert_eq!((wire >> 40) as u8, 0x40);
        assert_eq!((wire >> 48) as u8, 0x7F);
        assert_eq!(wire >> 56, 0);
    }

    #[test]
    fn test_decode_inverts_encode() {
        let samples = [
            Message::new(0, 0, 0, 0),
            Message::new(1, 0x80, 0x3C, 0x00),
            Message::new(7, 0xF0, 0x11, 0x22),
            Message::new(u32::MAX, 0xFF, 0xFF, 0xFF),
            Message::new(0xDEAD_BEEF, 0xB3, 0x07, 0x64),
        ];
        for message in samples {
            assert_eq!(Message::decode(message.encode()), message);
        }
    }

    #[test]
    fn test_decode_ignores_top_byte() {
        let wire = encode(3, 0x90, 1, 2) | 0xABu64 << 56;
        assert_eq!(Message::decode(wire), Message::new(3, 0x90, 1, 2));
    }

    #[test]
    fn test_note_on_packet() {
        let messages = decode_packet(5, &[0x90, 0x40, 0x7F]);
        assert_eq!(messages, vec![Message::new(5, 0x90, 0x40, 0x7F)]);
    }

    #[test]
    fn test_packet_with_several_messages() {
        let messages = decode_packet(2, &[0x90, 0x3C, 0x64, 0xC1, 0x05, 0xF8, 0x80, 0x3C, 0x00]);
        assert_eq!(
            messages,
            vec![
                Message::new(2, 0x90, 0x3C, 0x64),
                Message::new(2, 0xC1, 0x05, 0x00),
                Message::new(2, 0xF8, 0x00, 0x00),
                Message::new(2, 0x80, 0x3C, 0x00),
            ]
        );
    }

    #[test]
    fn test_extra_data_bytes_are_skipped() {
        let messages = decode_packet(1, &[0x90, 0x3C, 0x64, 0x3E, 0x64, 0xB0, 0x07, 0x10]);
        assert_eq!(
            messages,
            vec![
                Message::new(1, 0x90, 0x3C, 0x64),
                Message::new(1, 0xB0, 0x07, 0x10),
            ]
        );
    }

    #[test]
    fn test_running_status_packet_is_dropped() {
        assert!(decode_packet(1, &[0x3C, 0x64]).is_empty());
        assert!(decode_packet(1, &[]).is_empty());
    }

    #[test]
    fn test_vendor_sysex() {
        let messages = decode_packet(7, &[0xF0, 0x00, 0x20, 0x76, 0x03, 0x11, 0x22, 0xF7]);
        assert_eq!(messages, vec![Message::new(7, 0xF0, 0x11, 0x22)]);
    }

    #[test]
    fn test_foreign_or_short_sysex_is_dropped() {
        assert!(decode_packet(7, &[0xF0, 0x7E, 0x7F, 0x06, 0x01, 0xF7]).is_empty());
        assert!(decode_packet(7, &[0xF0, 0x00, 0x20, 0x76, 0x04, 0x11, 0x22, 0xF7]).is_empty());
        assert!(decode_packet(7, &[0xF0, 0x00, 0x20, 0x76, 0x03, 0x11, 0xF7]).is_empty());
        // unterminated frame
        assert!(decode_packet(7, &[0xF0, 0x00, 0x20, 0x76, 0x03, 0x11, 0x22]).is_empty());
    }

    #[test]
    fn test_short_message_lengths() {
        assert_eq!(short_message_len(0x90), Some(3));
        assert_eq!(short_message_len(0xE5), Some(3));
        assert_eq!(short_message_len(0xC0), Some(2));
        assert_eq!(short_message_len(0xD9), Some(2));
        assert_eq!(short_message_len(0xF8), Some(1));
        assert_eq!(short_message_len(0xF0), None);
        assert_eq!(short_message_len(0xF7), None);
        assert_eq!(short_message_len(0x40), None);
    }

    #[test]
    fn test_to_short_bytes() {
        assert_eq!(
            Message::new(1, 0x90, 0x40, 0x7F).to_short_bytes(),
            Some(vec![0x90, 0x40, 0x7F])
        );
        assert_eq!(
            Message::new(1, 0xC2, 0x05, 0x7F).to_short_bytes(),
            Some(vec![0xC2, 0x05])
        );
        assert_eq!(Message::new(1, 0xFA, 0, 0).to_short_bytes(), Some(vec![0xFA]));
        assert_eq!(Message::new(1, 0xF0, 0x11, 0x22).to_short_bytes(), None);
    }

    #[test]
    fn test_from_short_word() {
        let message = Message::from_short_word(9, 0x007F_4090);
        assert_eq!(message, Message::new(9, 0x90, 0x40, 0x7F));
    }

    #[test]
    fn test_display() {
        let message = Message::new(0x1A, 0x90, 0x40, 0x7F);
        assert_eq!(message.to_string(), "(1A) 90 40 7F");
    }
}
