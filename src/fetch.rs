//! The leader path: sole upstream fetcher for a URL,
//! teeing bytes to the payload buffer and the originating client.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::connector::Connector;
use crate::error::{classify_write_error, ProxyError, WriteOutcome};
use crate::http::is_cacheable;
use crate::slot::LeaderToken;

const CHUNK_SIZE: usize = 64 * 1024;

/// Runs the leader fetch to completion. Always resolves `token`
/// (`publish_ready` or `publish_error`) before returning — or, on an
/// early return via `?`/panic, the token's `Drop` impl does it instead.
pub async fn run_leader<U, C>(
    mut token: LeaderToken,
    mut upstream: U,
    request_bytes: &[u8],
    mut client: C,
) -> Result<(), ProxyError>
where
    U: AsyncRead + AsyncWrite + Unpin,
    C: AsyncWrite + Unpin,
{
    if let Err(e) = write_all_retrying(&mut upstream, request_bytes).await {
        token.publish_error();
        return Err(ProxyError::UpstreamIoError(e));
    }

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut first_chunk = true;
    let mut cacheable = true;
    let mut client_disconnected = false;

    loop {
        let n = match tokio::io::AsyncReadExt::read(&mut upstream, &mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                token.publish_error();
                return Err(ProxyError::UpstreamIoError(e));
            }
        };
        let chunk = &buf[..n];

        if first_chunk {
            cacheable = is_cacheable(chunk);
            first_chunk = false;
        }

        if cacheable && !token.is_size_full() {
            if token.payload().append(chunk).is_err() {
                token.mark_size_full();
            } else {
                token.notify_progress();
            }
        }

        if !client_disconnected {
            if let Err(e) = client.write_all(chunk).await {
                match classify_write_error(&e) {
                    WriteOutcome::ClientDisconnected => client_disconnected = true,
                    WriteOutcome::Fatal => {
                        // Any write failure other than EPIPE/ECONNRESET
                        // terminates the whole transfer.
                        token.publish_error();
                        return Err(ProxyError::ClientDisconnected);
                    }
                }
            }
        }
    }

    if !cacheable {
        token.publish_error();
        return Err(ProxyError::NonCacheable);
    }
    if token.is_size_full() {
        token.publish_error();
        return Err(ProxyError::CapacityExceeded);
    }

    token.publish_ready();
    Ok(())
}

async fn write_all_retrying<W: AsyncWrite + Unpin + ?Sized>(
    w: &mut W,
    mut buf: &[u8],
) -> std::io::Result<()> {
    while !buf.is_empty() {
        match w.write(buf).await {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "write returned 0 bytes",
                ))
            }
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Dials upstream via `connector`, translating connect failures into
/// `UpstreamUnavailable` and publishing `Error` on the token.
pub async fn connect_or_fail(
    token: LeaderToken,
    connector: &dyn Connector,
    host: &str,
) -> Result<(LeaderToken, Box<dyn crate::connector::AsyncDuplex>), ProxyError> {
    match connector.connect(host).await {
        Ok(stream) => Ok((token, stream)),
        Err(source) => {
            token.publish_error();
            Err(ProxyError::UpstreamUnavailable {
                host: host.to_string(),
                source,
            })
        }
    }
}
