//! Line-oriented console collaborator
//!
//! Stands in for the full-screen renderer: chat lines, alerts and system
//! notices are printed in the sender's chat color, and received video is
//! either redrawn in place or only counted.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use crossterm::{
    cursor, queue,
    style::{Color, Print, Stylize},
    terminal::{Clear, ClearType},
};
use tracing::{debug, warn};

use asciichat_core::{BattleshipMessage, PaletteColor, TextMessage, UserInfo};
use asciichat_runtime::{Notification, SessionHandler, SessionStats};

/// Terminal color for each palette entry
const COLOR_TABLE: [(PaletteColor, Color); 8] = [
    (PaletteColor::White, Color::White),
    (PaletteColor::Red, Color::Red),
    (PaletteColor::Green, Color::Green),
    (PaletteColor::Yellow, Color::Yellow),
    (PaletteColor::Blue, Color::Blue),
    (PaletteColor::Magenta, Color::Magenta),
    (PaletteColor::Cyan, Color::Cyan),
    (PaletteColor::Black, Color::Black),
];

pub fn terminal_color(color: PaletteColor) -> Color {
    COLOR_TABLE
        .iter()
        .find(|(palette, _)| *palette == color)
        .map(|(_, terminal)| *terminal)
        .unwrap_or(Color::White)
}

/// Prints session traffic to a writer (stdout in the binary)
pub struct ConsoleHandler {
    out: Mutex<Box<dyn Write + Send>>,
    colored: bool,
    show_video: bool,
    frames_received: AtomicU64,
}

impl ConsoleHandler {
    pub fn new(out: Box<dyn Write + Send>, colored: bool, show_video: bool) -> Self {
        Self {
            out: Mutex::new(out),
            colored,
            show_video,
            frames_received: AtomicU64::new(0),
        }
    }

    pub fn stdout(colored: bool, show_video: bool) -> Self {
        Self::new(Box::new(std::io::stdout()), colored, show_video)
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// `System: <text>`
    pub fn system(&self, text: &str) {
        self.write_line(format!("System: {}", text), None);
    }

    /// Echo of a line we sent
    pub fn local_text(&self, local: &UserInfo, text: &TextMessage) {
        self.write_line(chat_line("You", text), Some(local.chat_color));
    }

    fn write_line(&self, line: String, color: Option<PaletteColor>) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        let result = match color {
            Some(color) if self.colored => {
                writeln!(out, "{}", line.with(terminal_color(color)))
            }
            _ => writeln!(out, "{}", line),
        };
        if let Err(e) = result.and_then(|_| out.flush()) {
            warn!(error = %e, "Console write failed");
        }
    }

    fn draw_frame(&self, frame: &str) -> std::io::Result<()> {
        let Ok(mut guard) = self.out.lock() else {
            return Ok(());
        };
        let out = &mut *guard;
        if self.colored {
            queue!(out, cursor::MoveTo(0, 0), Clear(ClearType::FromCursorDown))?;
        }
        queue!(out, Print(frame), Print("\n"))?;
        out.flush()
    }
}

fn chat_line(sender: &str, text: &TextMessage) -> String {
    if text.alert {
        format!("{}: ATTENTION: {}", sender, text.body)
    } else {
        format!("{}: {}", sender, text.body)
    }
}

fn describe_battleship(message: &BattleshipMessage) -> String {
    match message {
        BattleshipMessage::Invite => "Battleship: invitation received".to_string(),
        BattleshipMessage::Accept { accepted: true } => {
            "Battleship: invitation accepted".to_string()
        }
        BattleshipMessage::Accept { accepted: false } => {
            "Battleship: invitation declined".to_string()
        }
        BattleshipMessage::ShipPlacement { ships } => {
            format!("Battleship: opponent ready ({} ships placed)", ships.len())
        }
        BattleshipMessage::Move(coordinate) => format!("Battleship: opponent fires at {}", coordinate),
        BattleshipMessage::TurnOrder { roll } => format!("Battleship: opponent rolled {}", roll),
        BattleshipMessage::Result { outcome, ship_name } => match ship_name {
            Some(ship) => format!("Battleship: {:?} ({})", outcome, ship),
            None => format!("Battleship: {:?}", outcome),
        },
        BattleshipMessage::Quit => "Battleship: opponent left the game".to_string(),
    }
}

#[async_trait]
impl SessionHandler for ConsoleHandler {
    async fn on_video_frame(&self, frame: String) -> anyhow::Result<()> {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        if self.show_video {
            self.draw_frame(&frame)?;
        } else {
            debug!(len = frame.len(), "Remote frame");
        }
        Ok(())
    }

    async fn on_text(&self, from: &UserInfo, text: TextMessage) -> anyhow::Result<()> {
        self.write_line(chat_line(&from.name, &text), Some(from.chat_color));
        Ok(())
    }

    async fn on_user_info(&self, info: UserInfo) -> anyhow::Result<()> {
        self.system(&format!("{} has joined the chat!", info.name));
        Ok(())
    }

    async fn on_battleship(&self, message: BattleshipMessage) -> anyhow::Result<()> {
        self.system(&describe_battleship(&message));
        Ok(())
    }

    async fn on_ai_comment(&self, comment: String) -> anyhow::Result<()> {
        self.write_line(format!("AI: {}", comment), Some(PaletteColor::Yellow));
        Ok(())
    }

    async fn on_notification(&self, notification: Notification) {
        if notification == Notification::Alert {
            if let Ok(mut out) = self.out.lock() {
                // terminal bell
                if let Err(e) = write!(out, "\x07").and_then(|_| out.flush()) {
                    warn!(error = %e, "Console write failed");
                }
            }
        }
    }

    async fn on_stats(&self, stats: SessionStats) {
        debug!(
            local_fps = stats.local_fps,
            remote_fps = stats.remote_fps,
            frames_sent = stats.frames_sent,
            frames_received = stats.frames_received,
            "Session statistics"
        );
    }

    async fn on_connection_lost(&self, reason: &str) {
        self.system(&format!("Connection lost ({})", reason));
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

/// Writer sharing its buffer with the test; only flushed bytes are visible
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(std::sync::Arc<Mutex<BufferState>>);

#[cfg(test)]
#[derive(Default)]
pub(crate) struct BufferState {
    pending: Vec<u8>,
    flushed: Vec<u8>,
}

#[cfg(test)]
impl SharedBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap().flushed).into_owned()
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut state = self.0.lock().unwrap();
        let pending = std::mem::take(&mut state.pending);
        state.flushed.extend(pending);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asciichat_core::{AttackOutcome, Coordinate};

    fn plain_console(show_video: bool) -> (ConsoleHandler, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let console = ConsoleHandler::new(Box::new(buffer.clone()), false, show_video);
        (console, buffer)
    }

    #[test]
    fn test_color_table_covers_palette() {
        for color in PaletteColor::ALL {
            assert!(COLOR_TABLE.iter().any(|(palette, _)| *palette == color));
        }
        assert_eq!(terminal_color(PaletteColor::Cyan), Color::Cyan);
    }

    #[tokio::test]
    async fn test_chat_and_alert_lines() {
        let (console, buffer) = plain_console(false);
        let bob = UserInfo::new("bob", PaletteColor::Red, PaletteColor::Blue);

        console.on_text(&bob, TextMessage::chat("hi")).await.unwrap();
        console
            .on_text(&bob, TextMessage::alert("look"))
            .await
            .unwrap();
        console.local_text(&UserInfo::default(), &TextMessage::chat("hey"));

        let output = buffer.contents();
        assert!(output.contains("bob: hi\n"));
        assert!(output.contains("bob: ATTENTION: look\n"));
        assert!(output.contains("You: hey\n"));
    }

    #[tokio::test]
    async fn test_colored_output_uses_escape_codes() {
        let buffer = SharedBuffer::default();
        let console = ConsoleHandler::new(Box::new(buffer.clone()), true, false);
        let bob = UserInfo::new("bob", PaletteColor::Red, PaletteColor::Blue);

        console.on_text(&bob, TextMessage::chat("hi")).await.unwrap();
        let output = buffer.contents();
        assert!(output.contains("bob: hi"));
        assert!(output.contains('\x1b'));
    }

    #[tokio::test]
    async fn test_video_counted_and_optionally_drawn() {
        let (hidden, hidden_buffer) = plain_console(false);
        hidden.on_video_frame("##\n##".to_string()).await.unwrap();
        assert_eq!(hidden.frames_received(), 1);
        assert!(hidden_buffer.contents().is_empty());

        let (shown, shown_buffer) = plain_console(true);
        shown.on_video_frame("##\n##".to_string()).await.unwrap();
        assert_eq!(shown.frames_received(), 1);
        assert!(shown_buffer.contents().contains("##\n##"));
    }

    #[tokio::test]
    async fn test_alert_rings_bell_immediately() {
        let (console, buffer) = plain_console(false);

        console.on_notification(Notification::Ding).await;
        assert!(!buffer.contents().contains('\x07'));

        console.on_notification(Notification::Alert).await;
        assert_eq!(buffer.contents(), "\x07");
    }

    #[tokio::test]
    async fn test_system_notices() {
        let (console, buffer) = plain_console(false);
        console
            .on_user_info(UserInfo::new("carol", PaletteColor::Green, PaletteColor::Green))
            .await
            .unwrap();
        console
            .on_battleship(BattleshipMessage::Move(Coordinate::new(1, 6).unwrap()))
            .await
            .unwrap();
        console
            .on_battleship(BattleshipMessage::Result {
                outcome: AttackOutcome::Sunk,
                ship_name: Some("Destroyer".to_string()),
            })
            .await
            .unwrap();
        console.on_connection_lost("peer closed").await;

        let output = buffer.contents();
        assert!(output.contains("System: carol has joined the chat!"));
        assert!(output.contains("opponent fires at B7"));
        assert!(output.contains("Sunk (Destroyer)"));
        assert!(output.contains("System: Connection lost (peer closed)"));
    }
}
