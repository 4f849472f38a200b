use std::fmt;

/// Errors surfaced by the cache and the connection handler.
///
/// Per-client errors (everything except the four cache-resolving
/// variants noted below) are logged and end that client's connection;
/// they never touch the directory. `NonCacheable`, `CapacityExceeded`,
/// `UpstreamIoError`, and `UpstreamUnavailable` additionally resolve
/// the owning entry to `Error`.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("malformed request line or oversize URL/Host")]
    ParseRejected,

    #[error("could not connect to upstream host {host}: {source}")]
    UpstreamUnavailable {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error talking to upstream: {0}")]
    UpstreamIoError(#[source] std::io::Error),

    #[error("client disconnected")]
    ClientDisconnected,

    #[error("upstream response was not cacheable (non-200 status)")]
    NonCacheable,

    #[error("response exceeded the configured capacity")]
    CapacityExceeded,

    #[error("all cache slots are loading, admission rejected")]
    Saturated,

    #[error("follower inactivity timeout elapsed")]
    Timeout,

    #[error("cache is shutting down")]
    Shutdown,
}

impl ProxyError {
    /// Whether this error, observed by the leader, must resolve the
    /// owning cache entry to `Error`.
    pub fn resolves_entry_to_error(&self) -> bool {
        matches!(
            self,
            ProxyError::NonCacheable
                | ProxyError::CapacityExceeded
                | ProxyError::UpstreamIoError(_)
                | ProxyError::UpstreamUnavailable { .. }
        )
    }
}

/// Classifies a client-write I/O error:
/// EPIPE/ECONNRESET are non-fatal to the leader (it keeps filling the
/// cache) but end that client's stream; anything else is a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    ClientDisconnected,
    Fatal,
}

impl fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOutcome::ClientDisconnected => write!(f, "client disconnected"),
            WriteOutcome::Fatal => write!(f, "fatal"),
        }
    }
}

pub fn classify_write_error(err: &std::io::Error) -> WriteOutcome {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => WriteOutcome::ClientDisconnected,
        _ => WriteOutcome::Fatal,
    }
}
