//! CLI/config surface, parsed with `clap`'s derive API.

use std::time::Duration;

use clap::{Parser, ValueEnum};

/// A forwarding HTTP/1.x proxy with a single-flight, LRU-evicting
/// in-memory response cache.
#[derive(Debug, Parser)]
#[command(name = "teeproxy", version, about)]
pub struct Config {
    /// Address to accept client connections on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Number of cache slots (`N`, default 3).
    #[arg(long, default_value_t = 3)]
    pub cache_entries: usize,

    /// Maximum cached response size in bytes per slot (default 500 MiB).
    #[arg(long, default_value_t = 500 * 1024 * 1024)]
    pub max_bytes: usize,

    /// Total-inactivity timeout applied to a follower's wait, in seconds.
    #[arg(long, default_value_t = 10)]
    pub follower_timeout_secs: u64,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl Config {
    pub fn follower_timeout(&self) -> Duration {
        Duration::from_secs(self.follower_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}
