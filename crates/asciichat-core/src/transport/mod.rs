//! TCP transport
//!
//! - `config`: Connection tunables
//! - `queue`: Typed receive queues with optional drop-oldest bound
//! - `connection`: One peer socket with its receive and heartbeat tasks
//! - `listener`: Accepts inbound peers and wraps them as connections

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod config;
pub mod connection;
pub mod listener;
pub mod queue;

pub use config::ConnectionConfig;
pub use connection::{CloseReason, Connection, ConnectionId, ConnectionState, ConnectionStats};
pub use listener::Listener;
pub use queue::MessageQueue;

/// Lock a std mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
