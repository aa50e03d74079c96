//! Inbound connection listener
//!
//! The protocol is strictly point-to-point, so the listen backlog is one.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use tokio::net::{lookup_host, TcpListener, TcpSocket};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::{Result, TransportError};
use crate::transport::config::ConnectionConfig;
use crate::transport::connection::Connection;
use crate::transport::lock;

/// Listen backlog: one pending peer at a time
const BACKLOG: u32 = 1;

/// Bound TCP listener yielding [`Connection`]s
pub struct Listener {
    inner: tokio::sync::Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    config: ConnectionConfig,
    produced: Mutex<Vec<Connection>>,
}

impl Listener {
    /// Bind `address` (`host:port`) with `SO_REUSEADDR` and start listening
    pub async fn bind(address: &str, config: ConnectionConfig) -> Result<Self> {
        config.validate()?;

        let bind_error = |source: io::Error| TransportError::Bind {
            address: address.to_string(),
            source,
        };

        let addr = lookup_host(address)
            .await
            .map_err(bind_error)?
            .next()
            .ok_or_else(|| {
                bind_error(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    "address did not resolve",
                ))
            })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_error)?;
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;

        let listener = socket.listen(BACKLOG).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        info!(%local_addr, "Listening for peer");

        Ok(Self {
            inner: tokio::sync::Mutex::new(Some(listener)),
            local_addr,
            config,
            produced: Mutex::new(Vec::new()),
        })
    }

    /// Wait up to `timeout` for a peer; `None` on timeout or once closed
    ///
    /// A failed accept also yields `None`, but only once `timeout` has passed.
    pub async fn accept(&self, timeout: Duration) -> Option<Connection> {
        let deadline = Instant::now() + timeout;
        let guard = self.inner.lock().await;
        let listener = guard.as_ref()?;

        let (stream, peer) = accept_until(deadline, listener.accept()).await?;
        debug!(%peer, "Inbound connection");
        let connection = Connection::accepted_from(stream, self.config.clone());
        lock(&self.produced).push(connection.clone());
        Some(connection)
    }

    /// Stop listening and close every connection this listener produced
    pub async fn close(&self) {
        if self.inner.lock().await.take().is_some() {
            info!(local_addr = %self.local_addr, "Listener closed");
        }

        let produced: Vec<Connection> = lock(&self.produced).drain(..).collect();
        for connection in produced {
            connection.close().await;
        }
    }

    /// Address actually bound; resolves port 0 to the ephemeral port
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn is_listening(&self) -> bool {
        self.inner.lock().await.is_some()
    }
}

/// Resolve `accept` by `deadline`, sleeping out the rest of the window on error
async fn accept_until<T, F>(deadline: Instant, accept: F) -> Option<T>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout_at(deadline, accept).await {
        Ok(Ok(accepted)) => Some(accepted),
        Ok(Err(e)) => {
            warn!(error = %e, "Accept failed");
            tokio::time::sleep_until(deadline).await;
            None
        }
        Err(_) => None,
    }
}
