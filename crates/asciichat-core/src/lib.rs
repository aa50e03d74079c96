//! ASCII Chat Core Transport
//!
//! This crate provides the point-to-point transport for ASCII video chat: a
//! binary framing protocol, typed message payloads, and a TCP connection that
//! demultiplexes the byte stream into per-type queues with heartbeat-based
//! liveness detection.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod errors;
pub mod protocol;
pub mod transport;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use errors::{PayloadError, ProtocolError, Result, TransportError};
pub use protocol::{
    AttackOutcome, BattleshipMessage, Compression, Coordinate, Frame, FrameDecoder, FrameHeader,
    Message, MessageType, Orientation, PaletteColor, ShipPlacement, TextMessage, UserInfo,
    WireFormat, ALERT_PREFIX, GRID_SIZE, HEADER_SIZE, HEARTBEAT_FRAME, MAX_PAYLOAD_SIZE,
};
pub use transport::{
    CloseReason, Connection, ConnectionConfig, ConnectionId, ConnectionState, ConnectionStats,
    Listener, MessageQueue,
};
