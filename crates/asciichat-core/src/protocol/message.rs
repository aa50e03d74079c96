//! Typed message payloads
//!
//! Converts between raw [`Frame`]s and the application-level [`Message`]
//! enum. Structured payloads are field-named JSON records so that new
//! optional fields stay backward compatible.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::PayloadError;
use crate::protocol::wire::{Compression, Frame, MessageType};

// ----------------------------------------------------------------------------
// Text Messages
// ----------------------------------------------------------------------------

/// Reserved prefix marking a text message as a high-priority alert
pub const ALERT_PREFIX: &str = "[PING] ";

/// Chat line, optionally flagged as an alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub body: String,
    pub alert: bool,
}

impl TextMessage {
    /// Plain chat line
    pub fn chat(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            alert: false,
        }
    }

    /// High-priority alert
    pub fn alert(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            alert: true,
        }
    }

    /// Text as carried on the wire, with the alert prefix applied
    pub fn to_wire_text(&self) -> String {
        if self.alert {
            format!("{}{}", ALERT_PREFIX, self.body)
        } else {
            self.body.clone()
        }
    }

    /// Parse wire text, stripping the alert prefix when present
    pub fn from_wire_text(text: String) -> Self {
        match text.strip_prefix(ALERT_PREFIX) {
            Some(body) => Self::alert(body),
            None => Self::chat(text),
        }
    }
}

// ----------------------------------------------------------------------------
// Identity
// ----------------------------------------------------------------------------

/// Closed set of chat and theme colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaletteColor {
    #[default]
    White,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    Black,
}

const COLOR_NAMES: [(PaletteColor, &str); 8] = [
    (PaletteColor::White, "white"),
    (PaletteColor::Red, "red"),
    (PaletteColor::Green, "green"),
    (PaletteColor::Yellow, "yellow"),
    (PaletteColor::Blue, "blue"),
    (PaletteColor::Magenta, "magenta"),
    (PaletteColor::Cyan, "cyan"),
    (PaletteColor::Black, "black"),
];

impl PaletteColor {
    /// Every color, in palette order
    pub const ALL: [PaletteColor; 8] = [
        PaletteColor::White,
        PaletteColor::Red,
        PaletteColor::Green,
        PaletteColor::Yellow,
        PaletteColor::Blue,
        PaletteColor::Magenta,
        PaletteColor::Cyan,
        PaletteColor::Black,
    ];

    /// Lowercase name
    pub fn name(self) -> &'static str {
        COLOR_NAMES
            .iter()
            .find(|(color, _)| *color == self)
            .map(|(_, name)| *name)
            .unwrap_or("white")
    }

    /// Case-insensitive lookup
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        COLOR_NAMES
            .iter()
            .find(|(_, candidate)| candidate.eq_ignore_ascii_case(name))
            .map(|(color, _)| *color)
    }
}

impl FromStr for PaletteColor {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| PayloadError::UnknownColor(s.to_string()))
    }
}

// Unknown names decode as the default color
impl From<String> for PaletteColor {
    fn from(value: String) -> Self {
        Self::from_name(&value).unwrap_or_default()
    }
}

impl From<PaletteColor> for String {
    fn from(value: PaletteColor) -> Self {
        value.name().to_string()
    }
}

impl fmt::Display for PaletteColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Display identity exchanged during the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    #[serde(default)]
    pub chat_color: PaletteColor,
    #[serde(default)]
    pub theme_color: PaletteColor,
}

impl UserInfo {
    pub fn new(name: impl Into<String>, chat_color: PaletteColor, theme_color: PaletteColor) -> Self {
        Self {
            name: name.into(),
            chat_color,
            theme_color,
        }
    }

    /// Identity shown for the peer until its `UserInfo` arrives
    pub fn remote_placeholder() -> Self {
        Self::new("Remote", PaletteColor::White, PaletteColor::Blue)
    }
}

impl Default for UserInfo {
    fn default() -> Self {
        Self::new("You", PaletteColor::White, PaletteColor::Green)
    }
}

// ----------------------------------------------------------------------------
// Battleship Payloads
// ----------------------------------------------------------------------------

/// Board edge length
pub const GRID_SIZE: u8 = 10;

/// Zero-based board coordinate, written as letter row + 1-based column (`B7`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub row: u8,
    pub col: u8,
}

impl Coordinate {
    /// Create a coordinate, rejecting positions off the board
    pub fn new(row: u8, col: u8) -> Result<Self, PayloadError> {
        if row >= GRID_SIZE || col >= GRID_SIZE {
            return Err(PayloadError::InvalidCoordinate(format!("({}, {})", row, col)));
        }
        Ok(Self { row, col })
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            char::from(b'A'.saturating_add(self.row)),
            u16::from(self.col) + 1
        )
    }
}

impl FromStr for Coordinate {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PayloadError::InvalidCoordinate(s.to_string());
        let trimmed = s.trim();
        let mut chars = trimmed.chars();

        let letter = chars.next().ok_or_else(invalid)?.to_ascii_uppercase();
        if !letter.is_ascii_uppercase() {
            return Err(invalid());
        }
        let row = letter as u8 - b'A';

        let column: u8 = chars.as_str().parse().map_err(|_| invalid())?;
        if column == 0 {
            return Err(invalid());
        }

        Self::new(row, column - 1).map_err(|_| invalid())
    }
}

/// Ship orientation on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// One placed ship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipPlacement {
    pub name: String,
    pub size: u8,
    pub row: u8,
    pub col: u8,
    pub orientation: Orientation,
}

/// Outcome of an attack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackOutcome {
    Hit,
    Miss,
    Sunk,
    AlreadyAttacked,
    Invalid,
}

/// Battleship game traffic, carried opaquely for the game engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BattleshipMessage {
    Invite,
    Accept { accepted: bool },
    ShipPlacement { ships: Vec<ShipPlacement> },
    Move(Coordinate),
    TurnOrder { roll: u32 },
    Result {
        outcome: AttackOutcome,
        ship_name: Option<String>,
    },
    Quit,
}

#[derive(Serialize, Deserialize)]
struct AcceptPayload {
    accepted: bool,
}

#[derive(Serialize, Deserialize)]
struct PlacementPayload {
    #[serde(default)]
    ships: Vec<ShipPlacement>,
}

#[derive(Serialize, Deserialize)]
struct TurnOrderPayload {
    roll: u32,
}

#[derive(Serialize, Deserialize)]
struct ResultPayload {
    result: AttackOutcome,
    #[serde(default)]
    ship_name: Option<String>,
}

impl BattleshipMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            BattleshipMessage::Invite => MessageType::BattleshipInvite,
            BattleshipMessage::Accept { .. } => MessageType::BattleshipAccept,
            BattleshipMessage::ShipPlacement { .. } => MessageType::BattleshipShipPlacement,
            BattleshipMessage::Move(_) => MessageType::BattleshipMove,
            BattleshipMessage::TurnOrder { .. } => MessageType::BattleshipTurnOrder,
            BattleshipMessage::Result { .. } => MessageType::BattleshipResult,
            BattleshipMessage::Quit => MessageType::BattleshipQuit,
        }
    }

    fn to_payload(&self) -> Result<Vec<u8>, PayloadError> {
        let payload = match self {
            BattleshipMessage::Invite | BattleshipMessage::Quit => Vec::new(),
            BattleshipMessage::Accept { accepted } => serde_json::to_vec(&AcceptPayload {
                accepted: *accepted,
            })?,
            BattleshipMessage::ShipPlacement { ships } => serde_json::to_vec(&PlacementPayload {
                ships: ships.clone(),
            })?,
            BattleshipMessage::Move(coordinate) => coordinate.to_string().into_bytes(),
            BattleshipMessage::TurnOrder { roll } => {
                serde_json::to_vec(&TurnOrderPayload { roll: *roll })?
            }
            BattleshipMessage::Result { outcome, ship_name } => {
                serde_json::to_vec(&ResultPayload {
                    result: *outcome,
                    ship_name: ship_name.clone(),
                })?
            }
        };
        Ok(payload)
    }

    fn from_payload(message_type: MessageType, payload: &[u8]) -> Result<Self, PayloadError> {
        let message = match message_type {
            MessageType::BattleshipInvite => BattleshipMessage::Invite,
            MessageType::BattleshipQuit => BattleshipMessage::Quit,
            MessageType::BattleshipAccept => {
                let body: AcceptPayload = serde_json::from_slice(payload)?;
                BattleshipMessage::Accept {
                    accepted: body.accepted,
                }
            }
            MessageType::BattleshipShipPlacement => {
                // An empty payload is a bare "ready" signal
                let ships = if payload.is_empty() {
                    Vec::new()
                } else {
                    serde_json::from_slice::<PlacementPayload>(payload)?.ships
                };
                BattleshipMessage::ShipPlacement { ships }
            }
            MessageType::BattleshipMove => {
                let text = String::from_utf8(payload.to_vec())?;
                BattleshipMessage::Move(text.parse()?)
            }
            MessageType::BattleshipTurnOrder => {
                let body: TurnOrderPayload = serde_json::from_slice(payload)?;
                BattleshipMessage::TurnOrder { roll: body.roll }
            }
            MessageType::BattleshipResult => {
                let body: ResultPayload = serde_json::from_slice(payload)?;
                BattleshipMessage::Result {
                    outcome: body.result,
                    ship_name: body.ship_name,
                }
            }
            other => {
                return Err(PayloadError::Protocol(
                    crate::errors::ProtocolError::UnknownMessageType {
                        message_type: other.as_u8(),
                    },
                ))
            }
        };
        Ok(message)
    }
}

// ----------------------------------------------------------------------------
// Messages
// ----------------------------------------------------------------------------

/// Application-level message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    VideoFrame(String),
    Text(TextMessage),
    Heartbeat,
    UserInfo(UserInfo),
    Battleship(BattleshipMessage),
    AiComment(String),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::VideoFrame(_) => MessageType::VideoFrame,
            Message::Text(_) => MessageType::TextMessage,
            Message::Heartbeat => MessageType::Heartbeat,
            Message::UserInfo(_) => MessageType::UserInfo,
            Message::Battleship(message) => message.message_type(),
            Message::AiComment(_) => MessageType::AiComment,
        }
    }

    /// Build the frame for this message, compressing video payloads
    pub fn to_frame(&self) -> Result<Frame, PayloadError> {
        let payload = match self {
            Message::VideoFrame(text) => Compression::compress(text)?,
            Message::Text(text) => text.to_wire_text().into_bytes(),
            Message::Heartbeat => Vec::new(),
            Message::UserInfo(info) => serde_json::to_vec(info)?,
            Message::Battleship(message) => message.to_payload()?,
            Message::AiComment(text) => text.clone().into_bytes(),
        };
        Ok(Frame::new(self.message_type(), payload))
    }

    /// Encode straight to wire bytes
    pub fn encode(&self, max_payload_size: usize) -> Result<Vec<u8>, PayloadError> {
        Ok(self.to_frame()?.encode_with_limit(max_payload_size)?)
    }

    /// Decode a received frame
    pub fn from_frame(frame: Frame) -> Result<Self, PayloadError> {
        let Frame {
            message_type,
            payload,
        } = frame;

        let message = match message_type {
            MessageType::VideoFrame => Message::VideoFrame(Compression::decompress(&payload)?),
            MessageType::TextMessage => {
                Message::Text(TextMessage::from_wire_text(String::from_utf8(payload)?))
            }
            MessageType::Heartbeat => Message::Heartbeat,
            MessageType::UserInfo => Message::UserInfo(serde_json::from_slice(&payload)?),
            MessageType::AiComment => Message::AiComment(String::from_utf8(payload)?),
            battleship => Message::Battleship(BattleshipMessage::from_payload(battleship, &payload)?),
        };
        Ok(message)
    }
}

impl From<TextMessage> for Message {
    fn from(value: TextMessage) -> Self {
        Message::Text(value)
    }
}

impl From<UserInfo> for Message {
    fn from(value: UserInfo) -> Self {
        Message::UserInfo(value)
    }
}

impl From<BattleshipMessage> for Message {
    fn from(value: BattleshipMessage) -> Self {
        Message::Battleship(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(message: Message) -> Message {
        let frame = message.to_frame().unwrap();
        Message::from_frame(frame).unwrap()
    }

    #[test]
    fn test_alert_prefix_on_wire() {
        let frame = Message::Text(TextMessage::alert("wake up")).to_frame().unwrap();
        assert_eq!(frame.message_type, MessageType::TextMessage);
        assert_eq!(frame.payload, b"[PING] wake up");

        let decoded = roundtrip(Message::Text(TextMessage::alert("wake up")));
        assert_eq!(decoded, Message::Text(TextMessage::alert("wake up")));
    }

    #[test]
    fn test_user_info_json_keys() {
        let info = UserInfo::new("alice", PaletteColor::Cyan, PaletteColor::Magenta);
        let frame = Message::UserInfo(info.clone()).to_frame().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame.payload).unwrap();

        assert_eq!(value["name"], "alice");
        assert_eq!(value["chat_color"], "cyan");
        assert_eq!(value["theme_color"], "magenta");
        assert_eq!(roundtrip(Message::UserInfo(info.clone())), Message::UserInfo(info));
    }

    #[test]
    fn test_unknown_color_falls_back() {
        let frame = Frame::new(
            MessageType::UserInfo,
            br#"{"name":"bob","chat_color":"chartreuse","theme_color":"RED","extra":1}"#.to_vec(),
        );
        let Message::UserInfo(info) = Message::from_frame(frame).unwrap() else {
            panic!("expected user info");
        };
        assert_eq!(info.chat_color, PaletteColor::White);
        assert_eq!(info.theme_color, PaletteColor::Red);
        assert!("chartreuse".parse::<PaletteColor>().is_err());
    }

    #[test]
    fn test_coordinate_parsing() {
        let coordinate: Coordinate = "b7".parse().unwrap();
        assert_eq!(coordinate, Coordinate { row: 1, col: 6 });
        assert_eq!(coordinate.to_string(), "B7");
        assert_eq!("J10".parse::<Coordinate>().unwrap(), Coordinate { row: 9, col: 9 });

        for bad in ["", "7", "K1", "A0", "A11", "AA", "3"] {
            assert!(bad.parse::<Coordinate>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_move_and_turn_order_are_distinct() {
        let attack = Message::Battleship(BattleshipMessage::Move("C3".parse().unwrap()));
        let frame = attack.to_frame().unwrap();
        assert_eq!(frame.payload, b"C3");

        let roll = Message::Battleship(BattleshipMessage::TurnOrder { roll: 42 });
        let frame = roll.to_frame().unwrap();
        assert_eq!(frame.message_type, MessageType::BattleshipTurnOrder);
        assert_eq!(roundtrip(roll.clone()), roll);

        // A numeric move payload is not a tie-break value
        let numeric = Frame::new(MessageType::BattleshipMove, b"42".to_vec());
        assert!(Message::from_frame(numeric).is_err());
    }

    #[test]
    fn test_battleship_payloads_roundtrip() {
        let messages = vec![
            BattleshipMessage::Invite,
            BattleshipMessage::Accept { accepted: false },
            BattleshipMessage::ShipPlacement {
                ships: vec![ShipPlacement {
                    name: "Destroyer".into(),
                    size: 2,
                    row: 0,
                    col: 3,
                    orientation: Orientation::Vertical,
                }],
            },
            BattleshipMessage::Result {
                outcome: AttackOutcome::AlreadyAttacked,
                ship_name: None,
            },
            BattleshipMessage::Result {
                outcome: AttackOutcome::Sunk,
                ship_name: Some("Carrier".into()),
            },
            BattleshipMessage::Quit,
        ];

        for message in messages {
            let message = Message::Battleship(message);
            assert_eq!(roundtrip(message.clone()), message);
        }
    }

    #[test]
    fn test_empty_ship_placement_is_ready_signal() {
        let frame = Frame::new(MessageType::BattleshipShipPlacement, Vec::new());
        assert_eq!(
            Message::from_frame(frame).unwrap(),
            Message::Battleship(BattleshipMessage::ShipPlacement { ships: Vec::new() })
        );

        let frame = Frame::new(MessageType::BattleshipResult, br#"{"result":"miss"}"#.to_vec());
        assert_eq!(
            Message::from_frame(frame).unwrap(),
            Message::Battleship(BattleshipMessage::Result {
                outcome: AttackOutcome::Miss,
                ship_name: None
            })
        );
    }

    #[test]
    fn test_video_frame_is_compressed() {
        let art = "##..##..\n".repeat(40);
        let frame = Message::VideoFrame(art.clone()).to_frame().unwrap();
        assert!(frame.payload.len() < art.len());
        assert_eq!(Message::from_frame(frame).unwrap(), Message::VideoFrame(art));
    }

    #[test]
    fn test_bad_payloads_are_payload_errors() {
        let cases = [
            Frame::new(MessageType::VideoFrame, b"raw".to_vec()),
            Frame::new(MessageType::TextMessage, vec![0xFF, 0xFE]),
            Frame::new(MessageType::UserInfo, b"{not json".to_vec()),
            Frame::new(MessageType::BattleshipMove, b"Z99".to_vec()),
        ];
        for frame in cases {
            assert!(Message::from_frame(frame).is_err());
        }
    }

    #[test]
    fn test_encode_respects_limit() {
        let message = Message::AiComment("x".repeat(64));
        assert!(message.encode(1024).is_ok());
        assert!(matches!(
            message.encode(16),
            Err(PayloadError::Protocol(_))
        ));
    }
}
