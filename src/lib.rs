//! A forwarding HTTP/1.x proxy with an in-memory, single-flight,
//! LRU-evicting response cache: concurrent clients requesting the same
//! URL cause the upstream origin to be contacted at most once while
//! the response is in flight, and late-arriving clients stream the
//! partially-downloaded response as a single leader fetcher fills it.
//!
//! [`Cache`] is the crate's public surface — an owned object
//! constructed once and shared by `Arc` with every connection task, in
//! place of the process-wide globals a naive accept loop tends to
//! reach for.

pub mod config;
pub mod connection;
pub mod connector;
pub mod directory;
pub mod error;
pub mod fetch;
pub mod follower;
pub mod http;
pub mod payload;
pub mod server;
pub mod slot;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;

pub use error::ProxyError;

use connector::{Connector, TcpConnector};
use directory::Directory;

/// The crate's single entry point: a fixed-capacity, single-flight
/// cache in front of an abstract upstream `connect` capability.
/// Constructed once at startup and shared by
/// `Arc` with every accepted connection.
pub struct Cache {
    directory: Arc<Directory>,
    connector: Arc<dyn Connector>,
    follower_timeout: Duration,
}

impl Cache {
    /// `n_entries` slots (`N`), each capped at
    /// `max_bytes`. Dials upstream over real TCP.
    pub fn new(n_entries: usize, max_bytes: usize) -> Self {
        Self::with_connector(
            n_entries,
            max_bytes,
            Arc::new(TcpConnector),
            follower::DEFAULT_FOLLOWER_TIMEOUT,
        )
    }

    /// As [`Cache::new`], but with an explicit [`Connector`] and
    /// follower inactivity timeout — the seam tests use to substitute
    /// a loopback fake origin for real TCP.
    pub fn with_connector(
        n_entries: usize,
        max_bytes: usize,
        connector: Arc<dyn Connector>,
        follower_timeout: Duration,
    ) -> Self {
        Self {
            directory: Arc::new(Directory::new(n_entries, max_bytes)),
            connector,
            follower_timeout,
        }
    }

    /// One call per accepted connection; blocks until the client
    /// interaction ends.
    pub async fn handle(&self, client: TcpStream) {
        let client_addr = client.peer_addr().ok();
        connection::handle_connection(
            client,
            client_addr,
            self.directory.clone(),
            self.connector.clone(),
            self.follower_timeout,
        )
        .await
    }

    /// Administrative removal.
    pub fn delete(&self, url: &[u8]) {
        self.directory.delete(url);
    }

    /// Releases all payloads and wakes any waiters with `Error`.
    pub fn shutdown(&self) {
        self.directory.shutdown();
    }

    /// Number of configured cache slots (`N`).
    pub fn len(&self) -> usize {
        self.directory.len()
    }
}
