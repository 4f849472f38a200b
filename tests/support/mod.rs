//! Shared harness for the integration suites: a real loopback "origin"
//! (so the fetch coordinator's actual `TcpConnector` is exercised, not
//! a stub) and a real loopback proxy listener fed by `teeproxy::Cache`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use teeproxy::Cache;

/// A scripted response chunk: bytes plus a delay before the *next*
/// chunk is written (ignored for the last chunk).
#[derive(Clone)]
pub struct Chunk {
    pub bytes: Vec<u8>,
    pub delay_after: Duration,
}

impl Chunk {
    pub fn now(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            delay_after: Duration::ZERO,
        }
    }

    pub fn delayed(bytes: impl Into<Vec<u8>>, delay: Duration) -> Self {
        Self {
            bytes: bytes.into(),
            delay_after: delay,
        }
    }
}

/// An origin that accepts connections forever, replaying `chunks` on
/// every connection and counting how many connections it accepted.
/// Used to assert the single-flight property directly: for a
/// continuously-Loading URL, `connect_count()` must never exceed 1.
pub struct ScriptedOrigin {
    pub addr: SocketAddr,
    connect_count: Arc<AtomicUsize>,
    _task: JoinHandle<()>,
}

impl ScriptedOrigin {
    pub async fn spawn(chunks: Vec<Chunk>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect_count = Arc::new(AtomicUsize::new(0));
        let count_for_task = connect_count.clone();

        let task = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => return,
                };
                count_for_task.fetch_add(1, Ordering::SeqCst);
                let chunks = chunks.clone();
                tokio::spawn(async move {
                    // Drain the request line + headers before replying,
                    // mirroring a real origin.
                    let mut buf = vec![0u8; 4096];
                    let _ = stream.read(&mut buf).await;
                    if chunks.is_empty() {
                        // A silent origin: hold the connection open
                        // (rather than let it drop and EOF) so the
                        // entry stays Loading for the test's duration.
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        return;
                    }
                    for chunk in &chunks {
                        if stream.write_all(&chunk.bytes).await.is_err() {
                            return;
                        }
                        if !chunk.delay_after.is_zero() {
                            tokio::time::sleep(chunk.delay_after).await;
                        }
                    }
                });
            }
        });

        Self {
            addr,
            connect_count,
            _task: task,
        }
    }

    /// An origin that accepts a connection but never replies — used to
    /// keep an entry `Loading` indefinitely (saturation scenarios).
    pub async fn spawn_silent() -> Self {
        Self::spawn(Vec::new()).await
    }

    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }

    pub fn host_header(&self) -> String {
        self.addr.to_string()
    }
}

/// A `Cache` wired to a real accept loop on a loopback port, so tests
/// drive it with genuine `TcpStream` clients exactly as a real client
/// would connect to the proxy.
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub cache: Arc<Cache>,
    _task: JoinHandle<()>,
}

impl RunningProxy {
    pub async fn spawn(n_entries: usize, max_bytes: usize) -> Self {
        Self::spawn_with_timeout(n_entries, max_bytes, Duration::from_secs(10)).await
    }

    pub async fn spawn_with_timeout(
        n_entries: usize,
        max_bytes: usize,
        follower_timeout: Duration,
    ) -> Self {
        let cache = Arc::new(Cache::with_connector(
            n_entries,
            max_bytes,
            Arc::new(teeproxy::connector::TcpConnector),
            follower_timeout,
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let cache_for_task = cache.clone();
        let task = tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => return,
                };
                let cache = cache_for_task.clone();
                tokio::spawn(async move {
                    cache.handle(stream).await;
                });
            }
        });

        Self {
            addr,
            cache,
            _task: task,
        }
    }

    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }
}

/// Sends `GET {url} HTTP/1.1\r\nHost: {host}\r\n\r\n` and reads the
/// response to EOF (or until the peer stops sending for a while).
pub async fn get(proxy: &RunningProxy, url: &str, host: &str) -> Vec<u8> {
    let mut stream = proxy.connect().await;
    let request = format!("GET {url} HTTP/1.1\r\nHost: {host}\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    read_to_eof_or_idle(&mut stream).await
}

/// Reads until EOF or until no bytes arrive for `idle_for`.
pub async fn read_to_eof_or_idle(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match tokio::time::timeout(Duration::from_millis(500), stream.read(&mut buf)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => out.extend_from_slice(&buf[..n]),
            Ok(Err(_)) => break,
        }
    }
    out
}
