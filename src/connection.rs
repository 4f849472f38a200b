//! Per-connection task: parse the request line and `Host` header,
//! dispatch through the cache, and copy bytes to the client. HTTP-level
//! logic is only interpreted at its boundary with the cache (the
//! request line, `Host`, and whether a response is a `200`) — no
//! other HTTP semantics live here.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, warn, Instrument};

use crate::connector::Connector;
use crate::directory::{Directory, FindOrInsert};
use crate::error::ProxyError;
use crate::fetch::{connect_or_fail, run_leader};
use crate::follower::run_follower;
use crate::http::{extract_host, parse_request_line};

/// Caps the total bytes read for one request line + header block.
/// The URL and Host fields are bounded individually; this is a sane
/// outer guard against an unbounded header block from a misbehaving
/// client.
pub const MAX_REQUEST_HEADER_BYTES: usize = 16 * 1024;

/// One accepted client connection, end to end. Reads exactly one
/// request (this proxy does not keep-alive multiple requests per
/// connection — doing so would require interpreting
/// `Content-Length`/chunked framing, which is out of scope), dispatches
/// it through `directory`, and streams the response back.
///
/// Everything below runs inside a `connection` span carrying
/// `client_addr`, so every log line this task emits (rejection,
/// leader/follower/hit outcome, final error) can be correlated back to
/// the originating client.
pub async fn handle_connection<C>(
    client: C,
    client_addr: Option<SocketAddr>,
    directory: Arc<Directory>,
    connector: Arc<dyn Connector>,
    follower_timeout: Duration,
) where
    C: AsyncRead + AsyncWrite + Unpin,
{
    let client_addr_display = client_addr
        .map(|a| a.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let span = tracing::info_span!("connection", client_addr = %client_addr_display);

    async move {
        let mut reader = BufReader::new(client);
        let parsed = match read_request(&mut reader).await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "rejecting request");
                return;
            }
        };

        let client = reader.into_inner();
        if let Err(e) = dispatch(
            &parsed.url,
            &parsed.host,
            &parsed.raw,
            client,
            directory,
            connector,
            follower_timeout,
        )
        .await
        {
            warn!(error = %e, url = %String::from_utf8_lossy(&parsed.url), "request ended with error");
        }
    }
    .instrument(span)
    .await
}

struct ParsedRequest {
    raw: Vec<u8>,
    url: Vec<u8>,
    host: String,
}

/// Reads the request line and headers, validating against the narrow
/// contract: `METHOD SP URL SP VERSION CRLF`, URL length < 1024, a
/// mandatory `Host:` header of length < 50. Returns the
/// verbatim bytes read (request line through the blank line) so the
/// leader can forward them byte-identical to upstream.
async fn read_request<R>(reader: &mut R) -> Result<ParsedRequest, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::with_capacity(512);
    let mut line = Vec::with_capacity(256);

    reader
        .read_until(b'\n', &mut line)
        .await
        .map_err(|_| ProxyError::ParseRejected)?;
    if line.is_empty() {
        return Err(ProxyError::ParseRejected);
    }
    let request_line = parse_request_line(&line).ok_or(ProxyError::ParseRejected)?;
    let url = request_line.url.to_vec();
    raw.extend_from_slice(&line);

    let mut header_lines: Vec<Vec<u8>> = Vec::new();
    loop {
        if raw.len() > MAX_REQUEST_HEADER_BYTES {
            return Err(ProxyError::ParseRejected);
        }
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(|_| ProxyError::ParseRejected)?;
        if n == 0 {
            return Err(ProxyError::ParseRejected);
        }
        raw.extend_from_slice(&line);
        if line == b"\r\n" || line == b"\n" {
            break;
        }
        header_lines.push(line.clone());
    }

    let host = extract_host(header_lines.iter().map(|l| l.as_slice()))
        .ok_or(ProxyError::ParseRejected)?;
    let host = String::from_utf8(host.to_vec()).map_err(|_| ProxyError::ParseRejected)?;

    Ok(ParsedRequest { raw, url, host })
}

/// Routes a parsed request through the directory's admission decision
/// and runs the role-appropriate path.
async fn dispatch<C>(
    url: &[u8],
    host: &str,
    raw_request: &[u8],
    mut client: C,
    directory: Arc<Directory>,
    connector: Arc<dyn Connector>,
    follower_timeout: Duration,
) -> Result<(), ProxyError>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    match directory.find_or_insert(url)? {
        FindOrInsert::Hit(slot) => {
            info!(url = %String::from_utf8_lossy(url), "cache hit");
            let payload = slot.payload().ok_or(ProxyError::NonCacheable)?;
            client
                .write_all(payload.snapshot())
                .await
                .map_err(ProxyError::UpstreamIoError)?;
            Ok(())
        }
        FindOrInsert::Follower(slot) => {
            info!(url = %String::from_utf8_lossy(url), "follower attaching to in-flight fetch");
            run_follower(slot, client, follower_timeout).await
        }
        FindOrInsert::Leader(token) => {
            let url_display = String::from_utf8_lossy(url).into_owned();
            let span = tracing::info_span!("leader_fetch", url = %url_display, %host);
            async move {
                info!("leader fetching from upstream");
                let (token, upstream) = connect_or_fail(token, connector.as_ref(), host).await?;
                run_leader(token, upstream, raw_request, client).await
            }
            .instrument(span)
            .await
        }
    }
}
