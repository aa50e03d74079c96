//! Session orchestrator
//!
//! A [`Session`] owns exactly one [`Connection`] and drives three loops
//! against it for the session's lifetime:
//!
//! - outbound: sends frames pushed through [`SessionHandle::push_frame`]
//! - inbound: drains each typed queue and dispatches to the [`SessionHandler`]
//! - statistics: derives frames-per-second once per interval
//!
//! Every loop stops at its next iteration boundary once the shared stop signal
//! fires. When the connection closes, the inbound loop dispatches whatever the
//! peer delivered before closing and then reports the loss once. A loop that
//! fails too many times in a row reports the loss as well.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use asciichat_core::{
    Connection, ConnectionStats, Listener, Message, MessageQueue, TextMessage, UserInfo,
};
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::{SessionConfig, SessionRole};
use crate::error::{Result, SessionError};
use crate::handler::{Notification, SessionHandler, SessionStats};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn per_second(count: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        count as f64 / elapsed_secs
    } else {
        0.0
    }
}

// ----------------------------------------------------------------------------
// Stop Signal
// ----------------------------------------------------------------------------

/// Requests a session stop; usable before `start` returns
#[derive(Debug, Clone)]
pub struct StopHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal: Arc::new(signal),
        }
    }

    pub fn stop(&self) {
        self.signal.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.signal.borrow()
    }

    /// Resolve once a stop has been requested
    pub async fn stopped(&self) {
        let mut receiver = self.signal.subscribe();
        let _ = receiver.wait_for(|stopped| *stopped).await;
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }
}

// ----------------------------------------------------------------------------
// Shared Session State
// ----------------------------------------------------------------------------

struct SessionShared {
    config: SessionConfig,
    connection: Connection,
    handler: Arc<dyn SessionHandler>,
    stop: StopHandle,
    local: Mutex<UserInfo>,
    remote: Mutex<UserInfo>,
    outbound_frames: MessageQueue<String>,
    interval_sent: AtomicU64,
    interval_received: AtomicU64,
    total_sent: AtomicU64,
    total_received: AtomicU64,
    stats: Mutex<SessionStats>,
    lost_reported: AtomicBool,
}

impl SessionShared {
    fn is_running(&self) -> bool {
        !self.stop.is_stopped()
    }

    fn close_reason(&self) -> String {
        self.connection
            .close_reason()
            .map(|reason| reason.to_string())
            .unwrap_or_else(|| "connection closed".to_string())
    }

    /// Stop the session and tell the handler, once, that the peer is gone
    async fn report_lost(&self, reason: String) {
        if self.stop.is_stopped() || self.lost_reported.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop.stop();
        warn!(reason = %reason, "Connection lost");
        self.handler.on_connection_lost(&reason).await;
    }

    async fn handshake(&self) -> Result<()> {
        let local = lock(&self.local).clone();
        if !self.connection.send_user_info(local).await {
            return Err(SessionError::Handshake {
                reason: self.close_reason(),
            });
        }
        tokio::time::sleep(self.config.handshake_grace).await;
        Ok(())
    }

    /// One pass over every inbound queue; `Ok(false)` when all were empty
    async fn dispatch_inbound(&self) -> anyhow::Result<bool> {
        let connection = &self.connection;
        let secondary = self.config.secondary_poll;
        let mut dispatched = false;

        if let Some(frame) = connection.get_video_frame(self.config.inbound_poll).await {
            self.interval_received.fetch_add(1, Ordering::Relaxed);
            self.total_received.fetch_add(1, Ordering::Relaxed);
            self.handler.on_video_frame(frame).await?;
            dispatched = true;
        }

        if let Some(text) = connection.get_text(secondary).await {
            self.deliver_text(text).await?;
            dispatched = true;
        }

        if let Some(info) = connection.get_user_info(secondary).await {
            self.deliver_user_info(info).await?;
            dispatched = true;
        }

        if let Some(message) = connection.get_battleship(secondary).await {
            self.handler.on_battleship(message).await?;
            dispatched = true;
        }

        if let Some(comment) = connection.get_ai_comment(secondary).await {
            self.handler.on_ai_comment(comment).await?;
            dispatched = true;
        }

        Ok(dispatched)
    }

    /// Dispatch everything the peer delivered before the connection closed
    ///
    /// Video is skipped; identity goes first so chat lines are attributed to
    /// the peer's latest name.
    async fn drain_after_close(&self) {
        let connection = &self.connection;
        let mut drained = 0usize;

        while let Some(info) = connection.get_user_info(Duration::ZERO).await {
            drained += 1;
            if let Err(e) = self.deliver_user_info(info).await {
                warn!(error = %e, "Dispatch after close failed");
            }
        }
        while let Some(text) = connection.get_text(Duration::ZERO).await {
            drained += 1;
            if let Err(e) = self.deliver_text(text).await {
                warn!(error = %e, "Dispatch after close failed");
            }
        }
        while let Some(message) = connection.get_battleship(Duration::ZERO).await {
            drained += 1;
            if let Err(e) = self.handler.on_battleship(message).await {
                warn!(error = %e, "Dispatch after close failed");
            }
        }
        while let Some(comment) = connection.get_ai_comment(Duration::ZERO).await {
            drained += 1;
            if let Err(e) = self.handler.on_ai_comment(comment).await {
                warn!(error = %e, "Dispatch after close failed");
            }
        }

        if drained > 0 {
            debug!(drained, "Dispatched messages queued before close");
        }
    }

    async fn deliver_text(&self, text: TextMessage) -> anyhow::Result<()> {
        let from = lock(&self.remote).clone();
        let notification = if text.alert {
            Notification::Alert
        } else {
            Notification::Ding
        };
        self.handler.on_text(&from, text).await?;
        self.handler.on_notification(notification).await;
        Ok(())
    }

    async fn deliver_user_info(&self, info: UserInfo) -> anyhow::Result<()> {
        info!(name = %info.name, chat_color = %info.chat_color, "Peer identity received");
        *lock(&self.remote) = info.clone();
        self.handler.on_user_info(info).await
    }
}

// ----------------------------------------------------------------------------
// Session Loops
// ----------------------------------------------------------------------------

async fn outbound_loop(shared: Arc<SessionShared>) {
    let mut stop = shared.stop.subscribe();
    let mut failures = 0u32;
    debug!("Outbound loop started");

    while shared.is_running() {
        // The inbound loop reports the loss once it has drained the queues
        if !shared.connection.is_connected() {
            break;
        }

        let frame = tokio::select! {
            _ = stop.wait_for(|stopped| *stopped) => break,
            frame = shared.outbound_frames.pop(shared.config.outbound_poll) => frame,
        };
        let Some(frame) = frame else {
            continue;
        };

        if shared.connection.send_video_frame(frame).await {
            failures = 0;
            shared.interval_sent.fetch_add(1, Ordering::Relaxed);
            shared.total_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            failures += 1;
            debug!(failures, "Failed to send video frame");
            if failures >= shared.config.max_consecutive_failures {
                shared
                    .report_lost(format!("{} consecutive send failures", failures))
                    .await;
                break;
            }
        }
    }

    debug!("Outbound loop stopped");
}

async fn inbound_loop(shared: Arc<SessionShared>) {
    let mut stop = shared.stop.subscribe();
    let mut failures = 0u32;
    debug!("Inbound loop started");

    while shared.is_running() {
        if !shared.connection.is_connected() {
            shared.drain_after_close().await;
            shared.report_lost(shared.close_reason()).await;
            break;
        }

        let outcome = tokio::select! {
            _ = stop.wait_for(|stopped| *stopped) => break,
            outcome = shared.dispatch_inbound() => outcome,
        };

        match outcome {
            Ok(true) => failures = 0,
            Ok(false) => {}
            Err(e) => {
                failures += 1;
                warn!(error = %e, failures, "Inbound dispatch failed");
                if failures >= shared.config.max_consecutive_failures {
                    shared
                        .report_lost(format!("{} consecutive dispatch failures: {}", failures, e))
                        .await;
                    break;
                }
            }
        }
    }

    debug!("Inbound loop stopped");
}

async fn stats_loop(shared: Arc<SessionShared>) {
    let mut stop = shared.stop.subscribe();
    let interval = shared.config.stats_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = stop.wait_for(|stopped| *stopped) => break,
            _ = ticker.tick() => {}
        }

        let elapsed = last.elapsed().as_secs_f64();
        last = Instant::now();

        let sent = shared.interval_sent.swap(0, Ordering::Relaxed);
        let received = shared.interval_received.swap(0, Ordering::Relaxed);
        let stats = SessionStats {
            local_fps: per_second(sent, elapsed),
            remote_fps: per_second(received, elapsed),
            frames_sent: shared.total_sent.load(Ordering::Relaxed),
            frames_received: shared.total_received.load(Ordering::Relaxed),
        };

        trace!(
            local_fps = stats.local_fps,
            remote_fps = stats.remote_fps,
            "Session statistics"
        );
        *lock(&shared.stats) = stats.clone();
        shared.handler.on_stats(stats).await;
    }
}

// ----------------------------------------------------------------------------
// Session Handle
// ----------------------------------------------------------------------------

/// Outbound side of a running session; clones share the same session
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    /// Queue a rendered frame; an unsent older frame is discarded when full
    pub fn push_frame(&self, frame: impl Into<String>) {
        if self.shared.outbound_frames.push(frame.into()).is_some() {
            trace!("Replaced unsent outbound frame");
        }
    }

    /// Send a chat line
    pub async fn push_text(&self, text: impl Into<String>) -> bool {
        self.shared
            .connection
            .send_text(TextMessage::chat(text))
            .await
    }

    /// Send a high-priority alert line
    pub async fn push_alert(&self, text: impl Into<String>) -> bool {
        self.shared
            .connection
            .send_text(TextMessage::alert(text))
            .await
    }

    /// Send any message; a `UserInfo` also becomes the new local identity
    pub async fn send(&self, message: Message) -> bool {
        if let Message::UserInfo(info) = &message {
            *lock(&self.shared.local) = info.clone();
        }
        self.shared.connection.send_message(&message).await
    }

    pub fn stop(&self) {
        self.shared.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.shared.stop.clone()
    }

    /// Snapshot from the most recent statistics interval
    pub fn stats(&self) -> SessionStats {
        lock(&self.shared.stats).clone()
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        self.shared.connection.stats()
    }

    pub fn local_identity(&self) -> UserInfo {
        lock(&self.shared.local).clone()
    }

    /// Peer identity, or a placeholder until the peer's `UserInfo` arrives
    pub fn remote_identity(&self) -> UserInfo {
        lock(&self.shared.remote).clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running() && self.shared.connection.is_connected()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.connection.peer_addr()
    }
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// Owns the connection and the loops of one chat session
pub struct Session {
    config: SessionConfig,
    handler: Arc<dyn SessionHandler>,
    stop: StopHandle,
    listener: Option<Listener>,
    shared: Option<Arc<SessionShared>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn new(config: SessionConfig, handler: Arc<dyn SessionHandler>) -> Self {
        Self {
            config,
            handler,
            stop: StopHandle::new(),
            listener: None,
            shared: None,
            tasks: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Handle to the running session, once started
    pub fn handle(&self) -> Option<SessionHandle> {
        self.shared.as_ref().map(|shared| SessionHandle {
            shared: Arc::clone(shared),
        })
    }

    /// Bind the listening socket ahead of `start`, returning the bound address
    ///
    /// Only valid for the listen role. `start` binds on its own when this was
    /// not called.
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        let SessionRole::Listen { bind } = &self.config.role else {
            return Err(SessionError::InvalidConfiguration {
                reason: "only a listening session can bind".to_string(),
            });
        };

        if let Some(listener) = &self.listener {
            return Ok(listener.local_addr());
        }

        let listener = Listener::bind(bind, self.config.connection.clone())
            .await
            .map_err(|source| SessionError::Bind {
                address: bind.clone(),
                source,
            })?;
        let local_addr = listener.local_addr();
        self.listener = Some(listener);
        Ok(local_addr)
    }

    /// Establish the connection, exchange identities and spawn the loops
    pub async fn start(&mut self) -> Result<SessionHandle> {
        if self.shared.is_some() {
            return Err(SessionError::AlreadyStarted);
        }
        if self.stop.is_stopped() {
            return Err(SessionError::Stopped);
        }
        self.config.validate()?;

        let connection = match self.config.role.clone() {
            SessionRole::Dial { remote } => self.dial(&remote).await?,
            SessionRole::Listen { .. } => self.accept_peer().await?,
        };

        let shared = Arc::new(SessionShared {
            config: self.config.clone(),
            connection,
            handler: Arc::clone(&self.handler),
            stop: self.stop.clone(),
            local: Mutex::new(self.config.local.clone()),
            remote: Mutex::new(UserInfo::remote_placeholder()),
            outbound_frames: MessageQueue::bounded(self.config.outbound_frame_capacity),
            interval_sent: AtomicU64::new(0),
            interval_received: AtomicU64::new(0),
            total_sent: AtomicU64::new(0),
            total_received: AtomicU64::new(0),
            stats: Mutex::new(SessionStats::default()),
            lost_reported: AtomicBool::new(false),
        });

        if let Err(e) = shared.handshake().await {
            shared.connection.close().await;
            if let Some(listener) = self.listener.take() {
                listener.close().await;
            }
            return Err(e);
        }

        let role = if self.config.role.is_listener() {
            "listener"
        } else {
            "dialer"
        };
        info!(
            role,
            peer = ?shared.connection.peer_addr(),
            name = %self.config.local.name,
            "Session started"
        );

        self.tasks = vec![
            tokio::spawn(outbound_loop(Arc::clone(&shared))),
            tokio::spawn(inbound_loop(Arc::clone(&shared))),
            tokio::spawn(stats_loop(Arc::clone(&shared))),
        ];
        self.shared = Some(Arc::clone(&shared));

        Ok(SessionHandle { shared })
    }

    async fn dial(&self, remote: &str) -> Result<Connection> {
        let connection = Connection::new(self.config.connection.clone());
        connection
            .connect(remote)
            .await
            .map_err(|source| SessionError::Dial {
                address: remote.to_string(),
                source,
            })?;
        Ok(connection)
    }

    async fn accept_peer(&mut self) -> Result<Connection> {
        self.bind().await?;
        let Some(listener) = &self.listener else {
            return Err(SessionError::Stopped);
        };

        info!(local_addr = %listener.local_addr(), "Waiting for peer");

        let deadline = Instant::now() + self.config.accept_wait;
        let outcome = loop {
            if self.stop.is_stopped() {
                break Err(SessionError::Stopped);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break Err(SessionError::AcceptTimeout {
                    waited_secs: self.config.accept_wait.as_secs(),
                });
            }

            if let Some(connection) = listener
                .accept(remaining.min(self.config.accept_slice))
                .await
            {
                break Ok(connection);
            }
        };

        if outcome.is_err() {
            if let Some(listener) = self.listener.take() {
                listener.close().await;
            }
        }
        outcome
    }

    /// Resolve once the session is stopped, locally or by connection loss
    pub async fn wait(&self) {
        self.stop.stopped().await;
    }

    /// Stop the loops, wait for them, then close the connection and listener
    pub async fn shutdown(&mut self) {
        self.stop.stop();

        let tasks = std::mem::take(&mut self.tasks);
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "Session task ended abnormally");
            }
        }

        if let Some(shared) = &self.shared {
            shared.connection.close().await;
        }
        if let Some(listener) = self.listener.take() {
            listener.close().await;
        }

        info!("Session shut down");
    }
}
