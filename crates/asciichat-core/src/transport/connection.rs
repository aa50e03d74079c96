//! Peer connection
//!
//! A [`Connection`] owns one byte stream to one peer. Two background tasks run
//! for its lifetime: the receive task reassembles frames and fans them out into
//! typed queues, and the heartbeat task sends liveness pings and closes the
//! connection when the peer goes silent. Every failure ends up as a state
//! transition; callers observe it through `bool`/`Option` results and
//! [`Connection::close_reason`].

use core::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::errors::{ProtocolError, Result, TransportError};
use crate::protocol::{
    BattleshipMessage, Frame, FrameDecoder, Message, TextMessage, UserInfo, HEARTBEAT_FRAME,
};
use crate::transport::config::ConnectionConfig;
use crate::transport::lock;
use crate::transport::queue::MessageQueue;

// ----------------------------------------------------------------------------
// Identity and State
// ----------------------------------------------------------------------------

/// Random per-connection identifier used in log fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Connection lifecycle
///
/// `Idle → Connecting → Connected → Closed` when dialing, `Connected → Closed`
/// for accepted sockets. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Idle = 0,
    Connecting = 1,
    Connected = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Idle,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a connection reached `Closed`; only the first reason is kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    LocalClose,
    PeerClosed,
    Protocol(ProtocolError),
    Io(String),
    HeartbeatTimeout,
    DialFailed(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::LocalClose => write!(f, "closed locally"),
            CloseReason::PeerClosed => write!(f, "peer closed the connection"),
            CloseReason::Protocol(e) => write!(f, "protocol error: {}", e),
            CloseReason::Io(e) => write!(f, "I/O error: {}", e),
            CloseReason::HeartbeatTimeout => write!(f, "heartbeat timeout"),
            CloseReason::DialFailed(e) => write!(f, "dial failed: {}", e),
        }
    }
}

/// Counter snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub frames_received: u64,
    pub bytes_received: u64,
    pub heartbeats_received: u64,
    pub video_frames_dropped: u64,
    pub malformed_payloads: u64,
    pub frames_sent: u64,
    pub send_failures: u64,
}

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Default)]
struct Counters {
    frames_received: AtomicU64,
    bytes_received: AtomicU64,
    heartbeats_received: AtomicU64,
    malformed_payloads: AtomicU64,
    frames_sent: AtomicU64,
    send_failures: AtomicU64,
}

struct Shared {
    id: ConnectionId,
    config: ConnectionConfig,
    state: AtomicU8,
    running: AtomicBool,
    close_reason: Mutex<Option<CloseReason>>,
    last_heartbeat: Mutex<Instant>,
    peer_addr: Mutex<Option<SocketAddr>>,
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    shutdown: watch::Sender<bool>,
    counters: Counters,

    video_frames: MessageQueue<String>,
    texts: MessageQueue<TextMessage>,
    user_infos: MessageQueue<UserInfo>,
    battleship: MessageQueue<BattleshipMessage>,
    ai_comments: MessageQueue<String>,
}

impl Shared {
    fn new(config: ConnectionConfig, writer: Option<BoxedWriter>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let video_capacity = config.video_queue_capacity;
        Self {
            id: ConnectionId::new(),
            config,
            state: AtomicU8::new(ConnectionState::Idle as u8),
            running: AtomicBool::new(false),
            close_reason: Mutex::new(None),
            last_heartbeat: Mutex::new(Instant::now()),
            peer_addr: Mutex::new(None),
            writer: tokio::sync::Mutex::new(writer),
            shutdown,
            counters: Counters::default(),
            video_frames: MessageQueue::bounded(video_capacity),
            texts: MessageQueue::unbounded(),
            user_infos: MessageQueue::unbounded(),
            battleship: MessageQueue::unbounded(),
            ai_comments: MessageQueue::unbounded(),
        }
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected && self.running.load(Ordering::Acquire)
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> Result<()> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| TransportError::InvalidState {
                expected: from.to_string(),
                actual: ConnectionState::from_u8(actual).to_string(),
            })
    }

    /// Move to `Closed` and signal both tasks; returns false if already closed
    fn mark_closed(&self, reason: CloseReason) -> bool {
        let previous = ConnectionState::from_u8(
            self.state
                .swap(ConnectionState::Closed as u8, Ordering::AcqRel),
        );
        self.running.store(false, Ordering::Release);

        let first = previous != ConnectionState::Closed;
        if first {
            match &reason {
                CloseReason::LocalClose | CloseReason::PeerClosed => {
                    info!(connection_id = %self.id, reason = %reason, "Connection closed")
                }
                CloseReason::HeartbeatTimeout | CloseReason::DialFailed(_) => {
                    warn!(connection_id = %self.id, reason = %reason, "Connection closed")
                }
                CloseReason::Protocol(_) | CloseReason::Io(_) => {
                    error!(connection_id = %self.id, reason = %reason, "Connection closed")
                }
            }
            lock(&self.close_reason).get_or_insert(reason);
        }

        // Reason is recorded before waking anyone waiting on `closed()`
        self.shutdown.send_replace(true);
        first
    }

    fn record_heartbeat(&self) {
        *lock(&self.last_heartbeat) = Instant::now();
        self.counters
            .heartbeats_received
            .fetch_add(1, Ordering::Relaxed);
    }

    fn heartbeat_silence(&self) -> Duration {
        lock(&self.last_heartbeat).elapsed()
    }

    async fn send_bytes(&self, bytes: &[u8]) -> bool {
        if !self.is_connected() {
            return false;
        }

        let guard = self.writer.lock().await;
        self.write_locked(guard, bytes).await
    }

    /// Send one heartbeat, giving up on a writer that stays busy past `deadline`
    ///
    /// Returns `false` only once the connection is closed.
    async fn send_heartbeat(&self, deadline: Duration) -> bool {
        if !self.is_connected() {
            return false;
        }

        let guard = match tokio::time::timeout(deadline, self.writer.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                debug!(connection_id = %self.id, "Writer busy, heartbeat skipped");
                return self.is_connected();
            }
        };

        match tokio::time::timeout(deadline, self.write_locked(guard, &HEARTBEAT_FRAME)).await {
            Ok(sent) => sent,
            Err(_) => {
                // A partial frame may already be on the wire
                warn!(connection_id = %self.id, "Heartbeat write stalled");
                self.counters.send_failures.fetch_add(1, Ordering::Relaxed);
                self.mark_closed(CloseReason::Io("heartbeat write stalled".to_string()));
                false
            }
        }
    }

    async fn write_locked(
        &self,
        mut guard: tokio::sync::MutexGuard<'_, Option<BoxedWriter>>,
        bytes: &[u8],
    ) -> bool {
        let mut shutdown = self.shutdown.subscribe();
        let Some(writer) = guard.as_mut() else {
            return false;
        };

        let result = tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => return false,
            result = async {
                writer.write_all(bytes).await?;
                writer.flush().await
            } => result,
        };

        match result {
            Ok(()) => {
                self.counters.frames_sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                drop(guard);
                self.counters.send_failures.fetch_add(1, Ordering::Relaxed);
                self.mark_closed(CloseReason::Io(e.to_string()));
                false
            }
        }
    }

    async fn release_writer(&self) {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                trace!(connection_id = %self.id, error = %e, "Writer shutdown failed");
            }
        }
    }

    fn drain_frames(&self, decoder: &mut FrameDecoder) -> std::result::Result<(), ProtocolError> {
        while let Some(frame) = decoder.next_frame()? {
            self.dispatch(frame);
        }
        Ok(())
    }

    fn dispatch(&self, frame: Frame) {
        self.counters.frames_received.fetch_add(1, Ordering::Relaxed);
        let message_type = frame.message_type;

        match Message::from_frame(frame) {
            Ok(Message::Heartbeat) => self.record_heartbeat(),
            Ok(Message::VideoFrame(frame)) => {
                if self.video_frames.push(frame).is_some() {
                    debug!(connection_id = %self.id, "Dropped stale video frame");
                }
            }
            Ok(Message::Text(text)) => {
                self.texts.push(text);
            }
            Ok(Message::UserInfo(info)) => {
                self.user_infos.push(info);
            }
            Ok(Message::Battleship(message)) => {
                self.battleship.push(message);
            }
            Ok(Message::AiComment(comment)) => {
                self.ai_comments.push(comment);
            }
            Err(e) => {
                self.counters
                    .malformed_payloads
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    connection_id = %self.id,
                    message_type = %message_type,
                    error = %e,
                    "Skipping malformed payload"
                );
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Background Tasks
// ----------------------------------------------------------------------------

async fn receive_loop<R>(shared: Arc<Shared>, mut reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut shutdown = shared.shutdown.subscribe();
    let mut decoder = FrameDecoder::with_max_payload_size(shared.config.max_payload_size);
    let mut buffer = vec![0u8; shared.config.read_buffer_size];

    debug!(connection_id = %shared.id, "Receive loop started");

    while shared.running.load(Ordering::Acquire) {
        let read = tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => break,
            read = reader.read(&mut buffer) => read,
        };

        match read {
            Ok(0) => {
                shared.mark_closed(CloseReason::PeerClosed);
                break;
            }
            Ok(n) => {
                shared
                    .counters
                    .bytes_received
                    .fetch_add(n as u64, Ordering::Relaxed);
                decoder.push(&buffer[..n]);
                if let Err(e) = shared.drain_frames(&mut decoder) {
                    shared.mark_closed(CloseReason::Protocol(e));
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                shared.mark_closed(CloseReason::Io(e.to_string()));
                break;
            }
        }
    }

    shared.release_writer().await;
    debug!(connection_id = %shared.id, "Receive loop stopped");
}

async fn heartbeat_loop(shared: Arc<Shared>) {
    let mut shutdown = shared.shutdown.subscribe();
    let timeout = shared.config.heartbeat_timeout;
    let interval = shared.config.heartbeat_interval;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(connection_id = %shared.id, "Heartbeat loop started");

    loop {
        tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => break,
            _ = ticker.tick() => {}
        }

        if !shared.is_connected() {
            break;
        }

        let silence = shared.heartbeat_silence();
        if silence > timeout {
            warn!(
                connection_id = %shared.id,
                silence_ms = silence.as_millis() as u64,
                "Peer heartbeat timed out"
            );
            shared.mark_closed(CloseReason::HeartbeatTimeout);
            break;
        }

        if !shared.send_heartbeat(interval).await {
            break;
        }
    }

    debug!(connection_id = %shared.id, "Heartbeat loop stopped");
}

// ----------------------------------------------------------------------------
// Connection
// ----------------------------------------------------------------------------

/// Handle to a single peer connection; clones share the same connection
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("peer_addr", &self.peer_addr())
            .finish()
    }
}

impl Connection {
    /// Create an idle connection, ready to dial
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new(config, None)),
        }
    }

    /// Wrap a socket handed over by a listener
    pub fn accepted_from(stream: TcpStream, config: ConnectionConfig) -> Self {
        let peer_addr = stream.peer_addr().ok();
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }
        let (reader, writer) = stream.into_split();
        let connection = Self::from_parts(reader, writer, config);
        *lock(&connection.shared.peer_addr) = peer_addr;
        info!(connection_id = %connection.id(), peer = ?peer_addr, "Accepted peer connection");
        connection
    }

    /// Wrap any established byte stream split into its read and write halves
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_parts<R, W>(reader: R, writer: W, config: ConnectionConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared::new(config, Some(Box::new(writer))));
        shared
            .state
            .store(ConnectionState::Connected as u8, Ordering::Release);
        let connection = Self { shared };
        connection.start(reader);
        connection
    }

    /// Dial `address` using the configured connect timeout
    pub async fn connect(&self, address: &str) -> Result<()> {
        self.connect_with_timeout(address, self.shared.config.connect_timeout)
            .await
    }

    /// Dial `address`, giving up after `timeout`
    ///
    /// On failure the connection is left `Closed`; build a new one to retry.
    pub async fn connect_with_timeout(&self, address: &str, timeout: Duration) -> Result<()> {
        self.shared
            .transition(ConnectionState::Idle, ConnectionState::Connecting)?;
        if let Err(e) = self.shared.config.validate() {
            self.shared.mark_closed(CloseReason::DialFailed(e.to_string()));
            return Err(e);
        }

        debug!(connection_id = %self.id(), address, "Dialing peer");

        let stream = match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                self.shared
                    .mark_closed(CloseReason::DialFailed(source.to_string()));
                return Err(TransportError::Dial {
                    address: address.to_string(),
                    source,
                });
            }
            Err(_) => {
                self.shared
                    .mark_closed(CloseReason::DialFailed("timed out".to_string()));
                return Err(TransportError::DialTimeout {
                    address: address.to_string(),
                    duration_ms: timeout.as_millis() as u64,
                });
            }
        };

        let peer_addr = stream.peer_addr().ok();
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }
        let (reader, writer) = stream.into_split();

        *self.shared.writer.lock().await = Some(Box::new(writer));
        *lock(&self.shared.peer_addr) = peer_addr;
        self.shared
            .transition(ConnectionState::Connecting, ConnectionState::Connected)?;
        self.start(reader);

        info!(connection_id = %self.id(), peer = ?peer_addr, "Connected to peer");
        Ok(())
    }

    fn start<R>(&self, reader: R)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        *lock(&self.shared.last_heartbeat) = Instant::now();
        self.shared.running.store(true, Ordering::Release);

        tokio::spawn(receive_loop(Arc::clone(&self.shared), reader));
        tokio::spawn(heartbeat_loop(Arc::clone(&self.shared)));
    }

    // ------------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------------

    /// Write pre-encoded bytes; false means the connection is (now) closed
    pub async fn send(&self, bytes: &[u8]) -> bool {
        self.shared.send_bytes(bytes).await
    }

    /// Encode and send a message; an encode failure leaves the connection open
    pub async fn send_message(&self, message: &Message) -> bool {
        match message.encode(self.shared.config.max_payload_size) {
            Ok(bytes) => self.send(&bytes).await,
            Err(e) => {
                warn!(
                    connection_id = %self.id(),
                    message_type = %message.message_type(),
                    error = %e,
                    "Failed to encode outgoing message"
                );
                false
            }
        }
    }

    pub async fn send_video_frame(&self, frame: impl Into<String>) -> bool {
        self.send_message(&Message::VideoFrame(frame.into())).await
    }

    pub async fn send_text(&self, text: TextMessage) -> bool {
        self.send_message(&Message::Text(text)).await
    }

    pub async fn send_user_info(&self, info: UserInfo) -> bool {
        self.send_message(&Message::UserInfo(info)).await
    }

    pub async fn send_battleship(&self, message: BattleshipMessage) -> bool {
        self.send_message(&Message::Battleship(message)).await
    }

    pub async fn send_ai_comment(&self, comment: impl Into<String>) -> bool {
        self.send_message(&Message::AiComment(comment.into())).await
    }

    // ------------------------------------------------------------------------
    // Receiving
    // ------------------------------------------------------------------------

    pub async fn get_video_frame(&self, timeout: Duration) -> Option<String> {
        self.shared.video_frames.pop(timeout).await
    }

    pub async fn get_text(&self, timeout: Duration) -> Option<TextMessage> {
        self.shared.texts.pop(timeout).await
    }

    pub async fn get_user_info(&self, timeout: Duration) -> Option<UserInfo> {
        self.shared.user_infos.pop(timeout).await
    }

    /// All Battleship subtypes share one queue, in arrival order
    pub async fn get_battleship(&self, timeout: Duration) -> Option<BattleshipMessage> {
        self.shared.battleship.pop(timeout).await
    }

    pub async fn get_ai_comment(&self, timeout: Duration) -> Option<String> {
        self.shared.ai_comments.pop(timeout).await
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Close the connection; safe to call repeatedly
    pub async fn close(&self) {
        self.shared.mark_closed(CloseReason::LocalClose);
        self.shared.release_writer().await;
    }

    /// Resolve once the connection has closed for any reason
    pub async fn closed(&self) {
        let mut shutdown = self.shared.shutdown.subscribe();
        // The sender lives as long as `self`, so this only returns once closed
        let _ = shutdown.wait_for(|stop| *stop).await;
    }

    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        lock(&self.shared.close_reason).clone()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        *lock(&self.shared.peer_addr)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    pub fn stats(&self) -> ConnectionStats {
        let counters = &self.shared.counters;
        ConnectionStats {
            frames_received: counters.frames_received.load(Ordering::Relaxed),
            bytes_received: counters.bytes_received.load(Ordering::Relaxed),
            heartbeats_received: counters.heartbeats_received.load(Ordering::Relaxed),
            video_frames_dropped: self.shared.video_frames.dropped(),
            malformed_payloads: counters.malformed_payloads.load(Ordering::Relaxed),
            frames_sent: counters.frames_sent.load(Ordering::Relaxed),
            send_failures: counters.send_failures.load(Ordering::Relaxed),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FrameDecoder, MessageType, WireFormat};
    use tokio::io::{duplex, split, DuplexStream};

    const WAIT: Duration = Duration::from_secs(2);

    fn duplex_connection(config: ConnectionConfig) -> (Connection, DuplexStream) {
        let (local, remote) = duplex(64 * 1024);
        let (reader, writer) = split(local);
        (Connection::from_parts(reader, writer, config), remote)
    }

    async fn write_message(peer: &mut DuplexStream, message: Message) {
        let bytes = message.encode(usize::MAX).unwrap();
        peer.write_all(&bytes).await.unwrap();
    }

    #[tokio::test]
    async fn test_heartbeats_split_across_reads() {
        let mut stream = Vec::new();
        for _ in 0..3 {
            stream.extend_from_slice(&HEARTBEAT_FRAME);
        }

        let reader = tokio_test::io::Builder::new()
            .read(&stream[..2])
            .read(&stream[2..7])
            .read(&stream[7..8])
            .read(&stream[8..13])
            .read(&stream[13..])
            .build();
        let (writer, _peer_end) = duplex(1024);

        let connection = Connection::from_parts(reader, writer, ConnectionConfig::default());
        tokio::time::timeout(WAIT, connection.closed()).await.unwrap();

        let stats = connection.stats();
        assert_eq!(stats.heartbeats_received, 3);
        assert_eq!(stats.frames_received, 3);
        assert_eq!(stats.bytes_received, 15);
        assert_eq!(connection.close_reason(), Some(CloseReason::PeerClosed));
        assert_eq!(connection.get_text(Duration::ZERO).await, None);
        assert_eq!(connection.get_video_frame(Duration::ZERO).await, None);
    }

    #[tokio::test]
    async fn test_video_queue_drops_oldest() {
        let (connection, mut peer) = duplex_connection(ConnectionConfig::default());

        for frame in 1..=8 {
            write_message(&mut peer, Message::VideoFrame(format!("frame {frame}"))).await;
        }
        write_message(&mut peer, Message::Text(TextMessage::chat("sync"))).await;

        assert_eq!(
            connection.get_text(WAIT).await,
            Some(TextMessage::chat("sync"))
        );

        let mut frames = Vec::new();
        while let Some(frame) = connection.get_video_frame(Duration::ZERO).await {
            frames.push(frame);
        }
        assert_eq!(
            frames,
            (4..=8).map(|n| format!("frame {n}")).collect::<Vec<_>>()
        );
        assert_eq!(connection.stats().video_frames_dropped, 3);
    }

    #[tokio::test]
    async fn test_typed_queues_preserve_order() {
        let (connection, mut peer) = duplex_connection(ConnectionConfig::default());

        write_message(&mut peer, Message::Battleship(BattleshipMessage::Invite)).await;
        write_message(&mut peer, Message::AiComment("bold move".into())).await;
        write_message(
            &mut peer,
            Message::Battleship(BattleshipMessage::Accept { accepted: true }),
        )
        .await;
        write_message(
            &mut peer,
            Message::UserInfo(UserInfo::remote_placeholder()),
        )
        .await;

        assert_eq!(
            connection.get_battleship(WAIT).await,
            Some(BattleshipMessage::Invite)
        );
        assert_eq!(
            connection.get_battleship(WAIT).await,
            Some(BattleshipMessage::Accept { accepted: true })
        );
        assert_eq!(
            connection.get_ai_comment(WAIT).await.as_deref(),
            Some("bold move")
        );
        assert_eq!(
            connection.get_user_info(WAIT).await,
            Some(UserInfo::remote_placeholder())
        );
    }

    #[tokio::test]
    async fn test_malformed_payload_is_skipped() {
        let (connection, mut peer) = duplex_connection(ConnectionConfig::default());

        let bad = WireFormat::encode(MessageType::UserInfo, "{broken").unwrap();
        peer.write_all(&bad).await.unwrap();
        write_message(&mut peer, Message::Text(TextMessage::chat("still here"))).await;

        assert_eq!(
            connection.get_text(WAIT).await,
            Some(TextMessage::chat("still here"))
        );
        assert_eq!(connection.stats().malformed_payloads, 1);
        assert!(connection.is_connected());
    }

    #[tokio::test]
    async fn test_unknown_type_closes_connection() {
        let (connection, mut peer) = duplex_connection(ConnectionConfig::default());

        peer.write_all(&[0xEE, 0, 0, 0, 0]).await.unwrap();
        tokio::time::timeout(WAIT, connection.closed()).await.unwrap();

        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(
            connection.close_reason(),
            Some(CloseReason::Protocol(ProtocolError::UnknownMessageType {
                message_type: 0xEE
            }))
        );
    }

    #[tokio::test]
    async fn test_oversized_frame_closes_connection() {
        let config = ConnectionConfig::default().with_max_payload_size(16);
        let (connection, mut peer) = duplex_connection(config);

        peer.write_all(&[0x02, 0x00, 0x00, 0x10, 0x00]).await.unwrap();
        tokio::time::timeout(WAIT, connection.closed()).await.unwrap();

        assert!(matches!(
            connection.close_reason(),
            Some(CloseReason::Protocol(ProtocolError::PayloadTooLarge { .. }))
        ));
    }

    #[tokio::test]
    async fn test_send_text_reaches_peer() {
        let (connection, mut peer) = duplex_connection(ConnectionConfig::default());
        assert!(connection.send_text(TextMessage::alert("look")).await);

        let mut decoder = FrameDecoder::new();
        let mut buffer = [0u8; 256];
        let text = loop {
            let n = peer.read(&mut buffer).await.unwrap();
            assert!(n > 0);
            decoder.push(&buffer[..n]);
            let mut found = None;
            while let Some(frame) = decoder.next_frame().unwrap() {
                if frame.message_type == MessageType::TextMessage {
                    found = Some(frame.payload);
                }
            }
            if let Some(payload) = found {
                break payload;
            }
        };
        assert_eq!(text, b"[PING] look");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (connection, _peer) = duplex_connection(ConnectionConfig::default());
        assert!(connection.is_connected());

        connection.close().await;
        connection.close().await;

        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(connection.close_reason(), Some(CloseReason::LocalClose));
        assert!(!connection.send_text(TextMessage::chat("late")).await);
    }

    #[tokio::test]
    async fn test_encode_failure_keeps_connection_open() {
        let config = ConnectionConfig::default().with_max_payload_size(8);
        let (connection, _peer) = duplex_connection(config);

        assert!(!connection.send_ai_comment("far too long for the limit").await);
        assert!(connection.is_connected());
    }

    #[tokio::test]
    async fn test_peer_that_stops_reading_times_out() {
        let config = ConnectionConfig::testing();
        let bound =
            config.heartbeat_timeout + config.heartbeat_interval + Duration::from_millis(250);

        // Small pipe the far end never drains
        let (local, _stalled_peer) = duplex(1024);
        let (reader, writer) = split(local);
        let started = Instant::now();
        let connection = Connection::from_parts(reader, writer, config);

        // Pseudo-random text so compression cannot shrink it below the pipe size
        let mut seed: u32 = 0x2545_f491;
        let frame: String = (0..16 * 1024)
            .map(|_| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                char::from(b' ' + ((seed >> 16) % 95) as u8)
            })
            .collect();
        let sender = connection.clone();
        let blocked_send = tokio::spawn(async move { sender.send_video_frame(frame).await });

        tokio::time::timeout(WAIT, connection.closed()).await.unwrap();
        assert!(started.elapsed() <= bound, "closed after {:?}", started.elapsed());
        assert_eq!(connection.close_reason(), Some(CloseReason::HeartbeatTimeout));

        let sent = tokio::time::timeout(WAIT, blocked_send).await.unwrap().unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn test_invalid_config_connect_leaves_closed() {
        let config = ConnectionConfig::default()
            .with_heartbeat(Duration::from_secs(1), Duration::from_secs(1));
        let connection = Connection::new(config);

        let result = connection.connect("127.0.0.1:9").await;

        assert!(matches!(
            result,
            Err(TransportError::InvalidConfiguration { .. })
        ));
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert!(matches!(
            connection.close_reason(),
            Some(CloseReason::DialFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_dial_failure_leaves_closed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let connection = Connection::new(ConnectionConfig::default());
        let result = connection
            .connect_with_timeout(&address, Duration::from_secs(2))
            .await;

        assert!(result.is_err());
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert!(matches!(
            connection.close_reason(),
            Some(CloseReason::DialFailed(_))
        ));

        let again = connection.connect(&address).await;
        assert!(matches!(again, Err(TransportError::InvalidState { .. })));
    }
}
