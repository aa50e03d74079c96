//! Stream reassembly for length-prefixed frames
//!
//! TCP delivers bytes, not frames. `FrameDecoder` accumulates whatever the
//! socket hands back and yields complete frames in arrival order.

use crate::errors::ProtocolError;
use crate::protocol::wire::{Frame, WireFormat, HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// Incremental frame decoder over a byte stream
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_payload_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder with the default payload limit
    pub fn new() -> Self {
        Self::with_max_payload_size(MAX_PAYLOAD_SIZE)
    }

    /// Create a decoder that rejects frames declaring more than `max_payload_size` bytes
    pub fn with_max_payload_size(max_payload_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_payload_size,
        }
    }

    /// Append freshly read bytes
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, if one is buffered
    ///
    /// Bytes are only consumed once the whole frame is present. On error the
    /// buffer is discarded; the stream cannot be resynchronised after a bad
    /// header.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = match WireFormat::decode_header(&self.buffer) {
            Ok(header) => header,
            Err(e) => {
                self.buffer.clear();
                return Err(e);
            }
        };

        let length = header.length as usize;
        if length > self.max_payload_size {
            self.buffer.clear();
            return Err(ProtocolError::PayloadTooLarge {
                max: self.max_payload_size,
                actual: length,
            });
        }

        let total = HEADER_SIZE + length;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let payload = self.buffer[HEADER_SIZE..total].to_vec();
        self.buffer.drain(..total);

        Ok(Some(Frame::new(header.message_type, payload)))
    }

    /// Number of bytes waiting for the rest of their frame
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire::MessageType;

    #[test]
    fn test_partial_header_waits() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[0x02, 0x00]);
        assert_eq!(decoder.next_frame().unwrap(), None);
        assert_eq!(decoder.buffered_len(), 2);

        decoder.push(&[0x00, 0x00, 0x02, b'h']);
        assert_eq!(decoder.next_frame().unwrap(), None);

        decoder.push(b"i");
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame, Frame::new(MessageType::TextMessage, b"hi".to_vec()));
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let mut bytes = Vec::new();
        for _ in 0..3 {
            bytes.extend(WireFormat::encode(MessageType::Heartbeat, []).unwrap());
        }
        bytes.extend(WireFormat::encode(MessageType::TextMessage, "yo").unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);

        let mut types = Vec::new();
        while let Some(frame) = decoder.next_frame().unwrap() {
            types.push(frame.message_type);
        }
        assert_eq!(
            types,
            vec![
                MessageType::Heartbeat,
                MessageType::Heartbeat,
                MessageType::Heartbeat,
                MessageType::TextMessage
            ]
        );
    }

    #[test]
    fn test_unknown_type_clears_buffer() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[0xEE, 0, 0, 0, 0, 0x03, 0, 0, 0, 0]);
        assert!(matches!(
            decoder.next_frame(),
            Err(ProtocolError::UnknownMessageType { message_type: 0xEE })
        ));
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_oversized_declared_length_rejected() {
        let mut decoder = FrameDecoder::with_max_payload_size(8);
        decoder.push(&[0x01, 0x00, 0x00, 0x00, 0x09]);
        assert_eq!(
            decoder.next_frame(),
            Err(ProtocolError::PayloadTooLarge { max: 8, actual: 9 })
        );
        assert_eq!(decoder.buffered_len(), 0);
    }
}
