//! ASCII Chat Protocol Module
//!
//! This module contains the wire protocol:
//! - `wire`: Frame header codec, message type table and video compression
//! - `framing`: Reassembly of frames from a byte stream
//! - `message`: Typed payloads carried inside frames

pub mod framing;
pub mod message;
pub mod wire;

// Re-export codec types
pub use wire::{
    Compression, Frame, FrameHeader, MessageType, WireFormat, HEADER_SIZE, HEARTBEAT_FRAME,
    MAX_PAYLOAD_SIZE,
};

// Re-export framing types
pub use framing::FrameDecoder;

// Re-export message types
pub use message::{
    AttackOutcome, BattleshipMessage, Coordinate, Message, Orientation, PaletteColor,
    ShipPlacement, TextMessage, UserInfo, ALERT_PREFIX, GRID_SIZE,
};
