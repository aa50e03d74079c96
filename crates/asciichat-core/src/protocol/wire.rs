//! Wire format utilities for binary framing
//!
//! Every frame on the stream is `[1 byte type][4 bytes length, big-endian][payload]`.
//! This module provides the message type table, the header codec and the
//! zlib compression used for video frame payloads.

use core::fmt;
use std::io::{Read, Write};

use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression as ZlibCompression};

use crate::errors::{PayloadError, ProtocolError};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Size of the frame header (type tag + length)
pub const HEADER_SIZE: usize = 5;

/// Default upper bound on a single frame payload
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Encoded heartbeat: header only, zero-length payload
pub const HEARTBEAT_FRAME: [u8; HEADER_SIZE] = [MessageType::Heartbeat as u8, 0, 0, 0, 0];

// ----------------------------------------------------------------------------
// Message Types
// ----------------------------------------------------------------------------

/// Closed set of frame type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    VideoFrame = 0x01,
    TextMessage = 0x02,
    Heartbeat = 0x03,
    UserInfo = 0x04,
    BattleshipInvite = 0x05,
    BattleshipAccept = 0x06,
    BattleshipShipPlacement = 0x07,
    BattleshipMove = 0x08,
    BattleshipResult = 0x09,
    BattleshipQuit = 0x0A,
    AiComment = 0x0B,
    BattleshipTurnOrder = 0x0C,
}

impl MessageType {
    /// Every message type, in tag order
    pub const ALL: [MessageType; 12] = [
        MessageType::VideoFrame,
        MessageType::TextMessage,
        MessageType::Heartbeat,
        MessageType::UserInfo,
        MessageType::BattleshipInvite,
        MessageType::BattleshipAccept,
        MessageType::BattleshipShipPlacement,
        MessageType::BattleshipMove,
        MessageType::BattleshipResult,
        MessageType::BattleshipQuit,
        MessageType::AiComment,
        MessageType::BattleshipTurnOrder,
    ];

    /// Wire tag for this type
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this type belongs to the Battleship game family
    pub fn is_battleship(self) -> bool {
        matches!(
            self,
            MessageType::BattleshipInvite
                | MessageType::BattleshipAccept
                | MessageType::BattleshipShipPlacement
                | MessageType::BattleshipMove
                | MessageType::BattleshipResult
                | MessageType::BattleshipQuit
                | MessageType::BattleshipTurnOrder
        )
    }

    /// Human-readable name used in logs
    pub fn name(self) -> &'static str {
        match self {
            MessageType::VideoFrame => "video_frame",
            MessageType::TextMessage => "text_message",
            MessageType::Heartbeat => "heartbeat",
            MessageType::UserInfo => "user_info",
            MessageType::BattleshipInvite => "battleship_invite",
            MessageType::BattleshipAccept => "battleship_accept",
            MessageType::BattleshipShipPlacement => "battleship_ship_placement",
            MessageType::BattleshipMove => "battleship_move",
            MessageType::BattleshipResult => "battleship_result",
            MessageType::BattleshipQuit => "battleship_quit",
            MessageType::AiComment => "ai_comment",
            MessageType::BattleshipTurnOrder => "battleship_turn_order",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        MessageType::ALL
            .iter()
            .copied()
            .find(|message_type| message_type.as_u8() == value)
            .ok_or(ProtocolError::UnknownMessageType {
                message_type: value,
            })
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02x})", self.name(), self.as_u8())
    }
}

// ----------------------------------------------------------------------------
// Frames
// ----------------------------------------------------------------------------

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub message_type: MessageType,
    pub length: u32,
}

/// One complete type-tagged, length-prefixed unit of the wire protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame from a type and payload
    pub fn new(message_type: MessageType, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            message_type,
            payload: payload.into(),
        }
    }

    /// Encode this frame using the default payload limit
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        WireFormat::encode(self.message_type, &self.payload)
    }

    /// Encode this frame, rejecting payloads above `max_payload_size`
    pub fn encode_with_limit(&self, max_payload_size: usize) -> Result<Vec<u8>, ProtocolError> {
        WireFormat::encode_with_limit(self.message_type, &self.payload, max_payload_size)
    }
}

// ----------------------------------------------------------------------------
// Wire Format Codec
// ----------------------------------------------------------------------------

/// Stateless header codec
pub struct WireFormat;

impl WireFormat {
    /// Encode a payload with its type and length header
    ///
    /// Text payloads can be passed directly; `&str` encodes as its UTF-8 bytes.
    pub fn encode(
        message_type: MessageType,
        payload: impl AsRef<[u8]>,
    ) -> Result<Vec<u8>, ProtocolError> {
        Self::encode_with_limit(message_type, payload, MAX_PAYLOAD_SIZE)
    }

    /// Encode a payload, rejecting anything above `max_payload_size`
    pub fn encode_with_limit(
        message_type: MessageType,
        payload: impl AsRef<[u8]>,
        max_payload_size: usize,
    ) -> Result<Vec<u8>, ProtocolError> {
        let payload = payload.as_ref();
        let limit = max_payload_size.min(u32::MAX as usize);
        if payload.len() > limit {
            return Err(ProtocolError::PayloadTooLarge {
                max: limit,
                actual: payload.len(),
            });
        }

        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.push(message_type.as_u8());
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(payload);
        Ok(bytes)
    }

    /// Decode the type and length from the first `HEADER_SIZE` bytes
    ///
    /// Buffering enough bytes is the caller's responsibility; trailing bytes
    /// beyond the header are ignored.
    pub fn decode_header(bytes: &[u8]) -> Result<FrameHeader, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::IncompleteHeader {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let message_type = MessageType::try_from(bytes[0])?;
        let length = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);

        Ok(FrameHeader {
            message_type,
            length,
        })
    }

    /// Decode one complete frame from the front of `bytes`
    ///
    /// Returns the frame and the number of bytes consumed, or `None` when
    /// `bytes` does not yet hold the whole frame.
    pub fn decode(bytes: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = Self::decode_header(bytes)?;
        let total = HEADER_SIZE + header.length as usize;
        if bytes.len() < total {
            return Ok(None);
        }

        let frame = Frame::new(header.message_type, &bytes[HEADER_SIZE..total]);
        Ok(Some((frame, total)))
    }
}

// ----------------------------------------------------------------------------
// Compression
// ----------------------------------------------------------------------------

/// Video frame compression utilities
pub struct Compression;

impl Compression {
    /// Compress text using zlib at the fastest level
    pub fn compress(text: &str) -> Result<Vec<u8>, PayloadError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), ZlibCompression::fast());
        encoder
            .write_all(text.as_bytes())
            .map_err(|e| PayloadError::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| PayloadError::Compression(format!("finalization failed: {}", e)))
    }

    /// Decompress zlib data back into text
    pub fn decompress(data: &[u8]) -> Result<String, PayloadError> {
        let mut decoder = ZlibDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| PayloadError::Decompression(e.to_string()))?;
        Ok(String::from_utf8(decompressed)?)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
