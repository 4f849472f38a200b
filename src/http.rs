//! Narrow HTTP parsing: just enough to extract the request line's URL,
//! the `Host` header, and to classify a response's cacheability. No
//! other HTTP semantics are interpreted; bytes are proxied verbatim.

pub const MAX_URL_LEN: usize = 1024;
pub const MAX_HOST_LEN: usize = 50;

pub struct RequestLine<'a> {
    pub method: &'a [u8],
    pub url: &'a [u8],
    pub version: &'a [u8],
}

/// Parses `METHOD SP URL SP VERSION`. Rejects empty fields and URLs of
/// length `>= MAX_URL_LEN`.
pub fn parse_request_line(line: &[u8]) -> Option<RequestLine<'_>> {
    let line = trim_header_line(line);
    let mut parts = line.splitn(3, |&b| b == b' ');
    let method = parts.next()?;
    let url = parts.next()?;
    let version = parts.next()?;

    if method.is_empty() || url.is_empty() || version.is_empty() {
        return None;
    }
    if url.len() >= MAX_URL_LEN {
        return None;
    }
    Some(RequestLine {
        method,
        url,
        version,
    })
}

/// Trims trailing CRLF/whitespace and leading whitespace without
/// allocating.
pub fn trim_header_line(line: &[u8]) -> &[u8] {
    let mut start = 0;
    let mut end = line.len();

    while end > 0 {
        match line[end - 1] {
            b'\r' | b'\n' | b' ' | b'\t' => end -= 1,
            _ => break,
        }
    }
    while start < end {
        match line[start] {
            b' ' | b'\t' => start += 1,
            _ => break,
        }
    }
    &line[start..end]
}

fn header_starts_with(header_line: &[u8], prefix: &[u8]) -> bool {
    if header_line.len() < prefix.len() {
        return false;
    }
    header_line[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn extract_header_value<'a>(line: &'a [u8], header_name: &[u8]) -> Option<&'a [u8]> {
    if line.len() <= header_name.len() {
        return None;
    }
    let mut value = &line[header_name.len()..];
    while let Some(&b) = value.first() {
        if b == b' ' || b == b'\t' {
            value = &value[1..];
        } else {
            break;
        }
    }
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Scans already-trimmed header lines (no request line, no trailing
/// blank line) for `Host:`. Returns `None` if absent or `>= MAX_HOST_LEN`.
pub fn extract_host<'a>(header_lines: impl IntoIterator<Item = &'a [u8]>) -> Option<&'a [u8]> {
    for raw in header_lines {
        let line = trim_header_line(raw);
        if header_starts_with(line, b"host:") {
            let value = extract_header_value(line, b"host:")?;
            if value.len() >= MAX_HOST_LEN {
                return None;
            }
            return Some(value);
        }
    }
    None
}

/// A response is cacheable iff its first chunk begins with
/// `HTTP/1.0 200 OK` or has the `HTTP/1.1 200` prefix.
pub fn is_cacheable(first_chunk: &[u8]) -> bool {
    first_chunk.starts_with(b"HTTP/1.0 200 OK") || first_chunk.starts_with(b"HTTP/1.1 200")
}
