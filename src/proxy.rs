//! portcullis/src/proxy.rs
//! Listener and session management.

use crate::config::ProxyConfig;
use crate::connection::{self, Direction};
use crate::error::Result;
use dashmap::DashMap;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Aggregate counters for the whole proxy.
#[derive(Debug, Default)]
pub struct ProxyMetrics {
    total_conn: AtomicU64,
    active_conn: AtomicU64,
    bytes_to_upstream: AtomicU64,
    bytes_to_client: AtomicU64,
}

impl ProxyMetrics {
    pub(crate) fn record_accept(&self) {
        self.total_conn.fetch_add(1, Ordering::SeqCst);
        self.active_conn.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_release(&self) {
        self.active_conn.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn record_relayed(&self, direction: Direction, bytes: u64) {
        match direction {
            Direction::ClientToUpstream => &self.bytes_to_upstream,
            Direction::UpstreamToClient => &self.bytes_to_client,
        }
        .fetch_add(bytes, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_conn: self.total_conn.load(Ordering::SeqCst),
            active_conn: self.active_conn.load(Ordering::SeqCst),
            bytes_to_upstream: self.bytes_to_upstream.load(Ordering::SeqCst),
            bytes_to_client: self.bytes_to_client.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time view of [`ProxyMetrics`].
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_conn: u64,
    pub active_conn: u64,
    pub bytes_to_upstream: u64,
    pub bytes_to_client: u64,
}

/// State shared between the accept loop and every connection task.
pub(crate) struct SessionShared {
    pub(crate) upstream_addr: String,
    pub(crate) connections: DashMap<u64, JoinHandle<()>>,
    pub(crate) metrics: Arc<ProxyMetrics>,
}

impl SessionShared {
    pub(crate) fn release(&self, id: u64) {
        self.connections.remove(&id);
        self.metrics.record_release();
    }
}

/// The proxy server: one listening socket, one upstream address, one task
/// per accepted connection.
pub struct Proxy {
    listener: TcpListener,
    shared: Arc<SessionShared>,
    shutdown: CancellationToken,
    conn_counter: AtomicU64,
}

impl Proxy {
    /// Binds the listening socket. The upstream is dialed lazily, per
    /// connection.
    pub async fn bind(config: &ProxyConfig) -> Result<Proxy> {
        let listener = TcpListener::bind(&config.listen_addr).await?;
        info!(listen = %config.listen_addr, upstream = %config.upstream_addr, "Proxy listening");
        Ok(Proxy {
            listener,
            shared: Arc::new(SessionShared {
                upstream_addr: config.upstream_addr.clone(),
                connections: DashMap::new(),
                metrics: Arc::new(ProxyMetrics::default()),
            }),
            shutdown: CancellationToken::new(),
            conn_counter: AtomicU64::new(1),
        })
    }

    /// The address actually bound, useful when listening on port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// A handle for stopping the proxy and inspecting it from other tasks.
    pub fn controller(&self) -> ProxyController {
        ProxyController {
            shutdown: self.shutdown.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Accepts connections until stopped or the listener fails.
    ///
    /// [`ProxyController::stop`] unblocks the loop and counts as clean
    /// shutdown; any other accept failure surfaces to the caller. In-flight
    /// connections are not torn down by stop; they drain on their own.
    pub async fn run(self) -> Result<()> {
        loop {
            let (socket, peer) = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Listener stopped");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted?,
            };

            let id = self.conn_counter.fetch_add(1, Ordering::SeqCst);
            self.shared.metrics.record_accept();
            debug!(conn = id, peer = %peer, "Accepted connection");

            let shared = Arc::clone(&self.shared);
            let handle = tokio::spawn(connection::handle_conn(id, socket, shared));
            self.shared.connections.insert(id, handle);
        }
    }
}

/// Clonable control surface over a running [`Proxy`].
#[derive(Clone)]
pub struct ProxyController {
    shutdown: CancellationToken,
    shared: Arc<SessionShared>,
}

impl ProxyController {
    /// Stops the accept loop. Established connections keep relaying until
    /// their peers close.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Number of connections currently registered.
    pub fn active_connections(&self) -> usize {
        self.shared.connections.len()
    }
}
