//! Session configuration

use core::time::Duration;

use asciichat_core::{ConnectionConfig, UserInfo};

use crate::error::{Result, SessionError};

/// How the session obtains its single connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRole {
    /// Bind `bind` and wait for one peer
    Listen { bind: String },
    /// Dial `remote`
    Dial { remote: String },
}

impl SessionRole {
    pub fn is_listener(&self) -> bool {
        matches!(self, SessionRole::Listen { .. })
    }

    pub fn address(&self) -> &str {
        match self {
            SessionRole::Listen { bind } => bind,
            SessionRole::Dial { remote } => remote,
        }
    }
}

/// Session tunables
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub role: SessionRole,
    /// Identity sent during the handshake
    pub local: UserInfo,
    /// Total time a listener waits for its peer
    pub accept_wait: Duration,
    /// Length of each accept attempt; stop requests are seen between slices
    pub accept_slice: Duration,
    pub connection: ConnectionConfig,
    /// Wait on the outbound frame queue per iteration
    pub outbound_poll: Duration,
    /// Wait on the inbound video queue per iteration
    pub inbound_poll: Duration,
    /// Wait on each non-video inbound queue per iteration
    pub secondary_poll: Duration,
    pub stats_interval: Duration,
    /// Consecutive per-iteration failures before a loop gives up
    pub max_consecutive_failures: u32,
    /// Capacity of the drop-oldest outbound frame queue
    pub outbound_frame_capacity: usize,
    /// Pause after sending our identity so the peer's can arrive
    pub handshake_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            role: SessionRole::Listen {
                bind: "0.0.0.0:5000".to_string(),
            },
            local: UserInfo::default(),
            accept_wait: Duration::from_secs(300),
            accept_slice: Duration::from_secs(1),
            connection: ConnectionConfig::default(),
            outbound_poll: Duration::from_millis(100),
            inbound_poll: Duration::from_millis(100),
            secondary_poll: Duration::from_millis(10),
            stats_interval: Duration::from_secs(1),
            max_consecutive_failures: 5,
            outbound_frame_capacity: 2,
            handshake_grace: Duration::from_millis(500),
        }
    }
}

impl SessionConfig {
    /// Listen on `bind` for a single peer
    pub fn listen(bind: impl Into<String>) -> Self {
        Self {
            role: SessionRole::Listen { bind: bind.into() },
            ..Self::default()
        }
    }

    /// Dial the peer at `remote`
    pub fn dial(remote: impl Into<String>) -> Self {
        Self {
            role: SessionRole::Dial {
                remote: remote.into(),
            },
            ..Self::default()
        }
    }

    /// Short timers for loopback tests
    pub fn testing(role: SessionRole) -> Self {
        Self {
            role,
            accept_wait: Duration::from_secs(5),
            accept_slice: Duration::from_millis(100),
            connection: ConnectionConfig::testing(),
            outbound_poll: Duration::from_millis(20),
            inbound_poll: Duration::from_millis(20),
            secondary_poll: Duration::from_millis(5),
            stats_interval: Duration::from_millis(100),
            handshake_grace: Duration::from_millis(50),
            ..Self::default()
        }
    }

    pub fn with_local(mut self, local: UserInfo) -> Self {
        self.local = local;
        self
    }

    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_accept_wait(mut self, accept_wait: Duration) -> Self {
        self.accept_wait = accept_wait;
        self
    }

    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    pub fn with_max_consecutive_failures(mut self, failures: u32) -> Self {
        self.max_consecutive_failures = failures;
        self
    }

    pub fn with_handshake_grace(mut self, grace: Duration) -> Self {
        self.handshake_grace = grace;
        self
    }

    /// Reject settings the session cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(SessionError::InvalidConfiguration { reason });

        if self.role.address().trim().is_empty() {
            return invalid("peer address must not be empty".to_string());
        }
        if self.local.name.trim().is_empty() {
            return invalid("display name must not be empty".to_string());
        }
        if self.accept_slice.is_zero() {
            return invalid("accept_slice must be non-zero".to_string());
        }
        if self.stats_interval.is_zero() {
            return invalid("stats_interval must be non-zero".to_string());
        }
        if self.max_consecutive_failures == 0 {
            return invalid("max_consecutive_failures must be at least 1".to_string());
        }
        if self.outbound_frame_capacity == 0 {
            return invalid("outbound_frame_capacity must be at least 1".to_string());
        }
        if let Err(e) = self.connection.validate() {
            return invalid(e.to_string());
        }
        Ok(())
    }
}
