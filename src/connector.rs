use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// A bidirectional byte stream to an upstream origin. Anything that is
/// both `AsyncRead` and `AsyncWrite` qualifies.
pub trait AsyncDuplex: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncDuplex for T {}

/// Abstracts upstream dial so the fetch coordinator never depends on
/// DNS/TCP directly: it only asks for a `connect(host) -> Stream`
/// capability, which tests can substitute with a loopback fake.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str) -> std::io::Result<Box<dyn AsyncDuplex>>;
}

/// Production connector: resolves `host` (optionally `host:port`, else
/// port 80) and opens a TCP connection.
#[derive(Debug, Default)]
pub struct TcpConnector;

#[async_trait::async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str) -> std::io::Result<Box<dyn AsyncDuplex>> {
        let addr = if host.contains(':') {
            host.to_string()
        } else {
            format!("{host}:80")
        };
        let stream = TcpStream::connect(addr).await?;
        let _ = stream.set_nodelay(true);
        Ok(Box::new(stream))
    }
}
