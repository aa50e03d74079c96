//! Collaborator interface
//!
//! Rendering, sound, the game engine and the commentary client live outside
//! the session. They receive inbound traffic through [`SessionHandler`] and
//! push outbound traffic through [`crate::SessionHandle`].

use async_trait::async_trait;

use asciichat_core::{BattleshipMessage, TextMessage, UserInfo};

/// Side effect requested alongside an inbound chat line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// Ordinary chat message
    Ding,
    /// Alert ("ping") message
    Alert,
}

/// Throughput snapshot produced once per statistics interval
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub local_fps: f64,
    pub remote_fps: f64,
    /// Video frames sent since the session started
    pub frames_sent: u64,
    /// Video frames received since the session started
    pub frames_received: u64,
}

/// Inbound dispatch callbacks, invoked from the session's inbound loop
///
/// An `Err` from any of the five message callbacks counts as one failed
/// iteration; enough consecutive failures end the session.
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    async fn on_video_frame(&self, frame: String) -> anyhow::Result<()>;

    async fn on_text(&self, from: &UserInfo, text: TextMessage) -> anyhow::Result<()>;

    /// Called after the session has recorded `info` as the remote identity
    async fn on_user_info(&self, info: UserInfo) -> anyhow::Result<()>;

    async fn on_battleship(&self, message: BattleshipMessage) -> anyhow::Result<()>;

    async fn on_ai_comment(&self, comment: String) -> anyhow::Result<()>;

    async fn on_notification(&self, _notification: Notification) {}

    async fn on_stats(&self, _stats: SessionStats) {}

    /// Called at most once, when the connection is lost without a local stop
    async fn on_connection_lost(&self, _reason: &str) {}
}
