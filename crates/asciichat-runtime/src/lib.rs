//! ASCII Chat Runtime
//!
//! Session orchestration on top of `asciichat-core`: establishes the single
//! peer connection, exchanges identities, and runs the outbound, inbound and
//! statistics loops until the session is stopped or the peer is lost.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod error;
pub mod handler;
pub mod session;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{SessionConfig, SessionRole};
pub use error::{Result, SessionError};
pub use handler::{Notification, SessionHandler, SessionStats};
pub use session::{Session, SessionHandle, StopHandle};
