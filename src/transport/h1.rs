//! HTTP/1.1 client over an established stream.
//!
//! Requests are written by hand so header order and casing reach the wire
//! exactly as assembled; responses are parsed with httparse.

use bytes::Bytes;
use http::Method;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use url::{Position, Url};

use crate::error::{Error, Result};
use crate::response::RawResponse;
use crate::transport::connector::MaybeHttpsStream;

/// Maximum response header size (64KB).
const MAX_HEADERS_SIZE: usize = 64 * 1024;

/// Maximum number of headers to parse.
const MAX_HEADERS_COUNT: usize = 100;

/// Maximum length of a chunk-size line, extensions included.
const MAX_CHUNK_LINE: usize = 4096;

/// One HTTP/1.1 exchange per connection; the fetch engine never reuses it.
pub struct H1Connection {
    stream: MaybeHttpsStream,
    max_body_size: usize,
    /// Whether the server asked to close after the current response.
    should_close: bool,
}

impl H1Connection {
    pub fn new(stream: MaybeHttpsStream, max_body_size: usize) -> Self {
        Self {
            stream,
            max_body_size,
            should_close: false,
        }
    }

    pub fn should_close(&self) -> bool {
        self.should_close
    }

    /// Send a request and read the full response.
    pub async fn send_request(
        &mut self,
        method: &Method,
        url: &Url,
        headers: &[(String, String)],
        body: Option<&Bytes>,
    ) -> Result<RawResponse> {
        let request_bytes = build_request(method, url, headers, body)?;
        self.stream
            .write_all(&request_bytes)
            .await
            .map_err(|e| Error::http_protocol(format!("Failed to write request: {}", e)))?;

        if let Some(body) = body {
            self.stream
                .write_all(body)
                .await
                .map_err(|e| Error::http_protocol(format!("Failed to write body: {}", e)))?;
        }

        self.stream
            .flush()
            .await
            .map_err(|e| Error::http_protocol(format!("Failed to flush: {}", e)))?;

        self.read_response(method).await
    }

    /// Read and parse a response, skipping any 1xx interim responses.
    async fn read_response(&mut self, method: &Method) -> Result<RawResponse> {
        // Bytes after an interim response belong to the next one.
        let mut buffer = Vec::with_capacity(8192);

        loop {
            loop {
                if find_header_end(&buffer).is_some() {
                    break;
                }
                if buffer.len() >= MAX_HEADERS_SIZE {
                    return Err(Error::http_protocol("Response headers too large"));
                }

                let mut read_buf = vec![0u8; 8192];
                let n = self
                    .stream
                    .read(&mut read_buf)
                    .await
                    .map_err(|e| Error::http_protocol(format!("Failed to read response: {}", e)))?;
                if n == 0 {
                    return Err(Error::http_protocol(
                        "Connection closed before response complete",
                    ));
                }
                buffer.extend_from_slice(&read_buf[..n]);
            }

            let (response, consumed) = self.parse_response_with_remainder(&buffer, method).await?;
            buffer.drain(..consumed.min(buffer.len()));

            if (100..200).contains(&response.status) {
                continue;
            }
            return Ok(response);
        }
    }

    /// Parse headers and read the body. Returns the response and how many
    /// bytes of `buffer` it used.
    async fn parse_response_with_remainder(
        &mut self,
        buffer: &[u8],
        request_method: &Method,
    ) -> Result<(RawResponse, usize)> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
        let mut response = httparse::Response::new(&mut headers);

        let headers_len = match response
            .parse(buffer)
            .map_err(|e| Error::http_protocol(format!("Failed to parse response: {}", e)))?
        {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => {
                return Err(Error::http_protocol("Incomplete response headers"));
            }
        };

        let status = response
            .code
            .ok_or_else(|| Error::http_protocol("Missing status code"))?;
        let version = match response.version {
            Some(0) => "HTTP/1.0",
            _ => "HTTP/1.1",
        };

        let response_headers: Vec<(String, String)> = response
            .headers
            .iter()
            .filter(|h| !h.name.is_empty())
            .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
            .collect();

        if let Some(conn) = find_header_value(&response_headers, "connection") {
            if conn.to_ascii_lowercase().contains("close") {
                self.should_close = true;
            }
        }

        // HEAD responses, 1xx, 204 and 304 carry no body.
        let has_body = !matches!(status, 100..=199 | 204 | 304) && *request_method != Method::HEAD;
        if !has_body {
            let resp = RawResponse::new(status, response_headers, Bytes::new(), version);
            return Ok((resp, headers_len));
        }

        let transfer_encoding = find_header_value(&response_headers, "transfer-encoding");
        let content_length_str = find_header_value(&response_headers, "content-length");

        // chunked must be the final transfer coding
        let is_chunked = transfer_encoding
            .map(|v| {
                v.split(',')
                    .next_back()
                    .map(|s| s.trim().eq_ignore_ascii_case("chunked"))
                    .unwrap_or(false)
            })
            .unwrap_or(false);

        // Transfer-Encoding overrides Content-Length.
        let content_length = match (transfer_encoding, content_length_str) {
            (Some(_), _) => None,
            (None, Some(cl)) => Some(parse_content_length(cl)?),
            (None, None) => None,
        };

        let body_start = &buffer[headers_len..];
        let (body, consumed) = if is_chunked {
            let body = self.read_chunked_body(body_start.to_vec()).await?;
            (body, buffer.len())
        } else if let Some(len) = content_length {
            if len > self.max_body_size {
                return Err(Error::BodyTooLarge {
                    limit: self.max_body_size,
                });
            }
            let body = self.read_fixed_body(body_start, len).await?;
            (body, headers_len + body_start.len().min(len))
        } else {
            // Delimited by connection close.
            self.should_close = true;
            let body = self.read_until_close(body_start).await?;
            (body, buffer.len())
        };

        let resp = RawResponse::new(status, response_headers, body, version);
        Ok((resp, consumed))
    }

    fn check_size(&self, len: usize) -> Result<()> {
        if len > self.max_body_size {
            return Err(Error::BodyTooLarge {
                limit: self.max_body_size,
            });
        }
        Ok(())
    }

    /// Read body until EOF.
    async fn read_until_close(&mut self, initial: &[u8]) -> Result<Bytes> {
        self.check_size(initial.len())?;
        let mut body = initial.to_vec();
        let mut read_buf = vec![0u8; 8192];
        loop {
            let n = self.stream.read(&mut read_buf).await.map_err(|e| {
                Error::http_protocol(format!("Failed to read body (close-delimited): {}", e))
            })?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&read_buf[..n]);
            self.check_size(body.len())?;
        }
        Ok(Bytes::from(body))
    }

    /// Read a fixed-length body. EOF before `content_length` bytes is an error.
    async fn read_fixed_body(&mut self, initial: &[u8], content_length: usize) -> Result<Bytes> {
        let initial_len = initial.len().min(content_length);
        let mut body = Vec::with_capacity(content_length);
        body.extend_from_slice(&initial[..initial_len]);

        while body.len() < content_length {
            let remaining = content_length - body.len();
            let mut chunk = vec![0u8; remaining.min(8192)];
            let n = self
                .stream
                .read(&mut chunk)
                .await
                .map_err(|e| Error::http_protocol(format!("Failed to read body: {}", e)))?;
            if n == 0 {
                return Err(Error::http_protocol(format!(
                    "Connection closed before receiving full body (got {} of {} bytes)",
                    body.len(),
                    content_length
                )));
            }
            body.extend_from_slice(&chunk[..n]);
        }

        Ok(Bytes::from(body))
    }

    /// Read a chunked body: `*chunk last-chunk trailer-section CRLF`.
    async fn read_chunked_body(&mut self, initial: Vec<u8>) -> Result<Bytes> {
        let mut body = Vec::new();
        let mut buffer = initial;
        let mut read_buf = vec![0u8; 8192];

        loop {
            let (chunk_size, line_end) = loop {
                if let Some(found) = find_chunk_size(&buffer)? {
                    break found;
                }
                if buffer.len() > MAX_CHUNK_LINE {
                    return Err(Error::http_protocol("Chunk size line too long"));
                }
                let n = self.stream.read(&mut read_buf).await.map_err(|e| {
                    Error::http_protocol(format!("Failed to read chunk size: {}", e))
                })?;
                if n == 0 {
                    return Err(Error::http_protocol(
                        "Connection closed while reading chunk size",
                    ));
                }
                buffer.extend_from_slice(&read_buf[..n]);
            };
            buffer.drain(..line_end);

            if chunk_size == 0 {
                self.consume_trailers(&mut buffer).await?;
                break;
            }
            self.check_size(body.len().saturating_add(chunk_size))?;

            let chunk_end = chunk_size + 2;
            while buffer.len() < chunk_end {
                let n = self.stream.read(&mut read_buf).await.map_err(|e| {
                    Error::http_protocol(format!("Failed to read chunk data: {}", e))
                })?;
                if n == 0 {
                    return Err(Error::http_protocol(
                        "Connection closed while reading chunk data",
                    ));
                }
                buffer.extend_from_slice(&read_buf[..n]);
            }

            body.extend_from_slice(&buffer[..chunk_size]);
            buffer.drain(..chunk_end);
        }

        Ok(Bytes::from(body))
    }

    /// Skip trailer fields up to the terminating empty line.
    async fn consume_trailers(&mut self, buffer: &mut Vec<u8>) -> Result<()> {
        let mut read_buf = vec![0u8; 4096];
        let mut seen = 0usize;

        loop {
            if let Some(pos) = find_crlf(buffer) {
                buffer.drain(..pos + 2);
                if pos == 0 {
                    return Ok(());
                }
                seen += pos + 2;
                if seen > MAX_HEADERS_SIZE {
                    return Err(Error::http_protocol("Trailer section too large"));
                }
                continue;
            }
            if seen + buffer.len() > MAX_HEADERS_SIZE {
                return Err(Error::http_protocol("Trailer section too large"));
            }

            let n = self
                .stream
                .read(&mut read_buf)
                .await
                .map_err(|e| Error::http_protocol(format!("Failed to read trailers: {}", e)))?;
            if n == 0 {
                // Missing final CRLF is tolerated.
                return Ok(());
            }
            buffer.extend_from_slice(&read_buf[..n]);
        }
    }
}

/// Serialize the request head.
///
/// The request line uses origin-form (authority-form for CONNECT). `Host`
/// comes first unless the caller supplied one, in which case the caller's
/// value is emitted at the caller's position. Caller headers follow in
/// order with their casing intact.
fn build_request(
    method: &Method,
    url: &Url,
    headers: &[(String, String)],
    body: Option<&Bytes>,
) -> Result<Vec<u8>> {
    let mut request = Vec::with_capacity(1024);

    for (name, value) in headers {
        validate_header_name(name)?;
        validate_header_value(value)?;
    }

    let host = url
        .host_str()
        .ok_or_else(|| Error::http_protocol("URL has no host"))?;

    request.extend_from_slice(method.as_str().as_bytes());
    request.push(b' ');
    if *method == Method::CONNECT {
        let port = url.port_or_known_default().unwrap_or(443);
        request.extend_from_slice(format!("{}:{}", host, port).as_bytes());
    } else {
        request.extend_from_slice(url[Position::BeforePath..Position::AfterQuery].as_bytes());
    }
    request.extend_from_slice(b" HTTP/1.1\r\n");

    let has_header = |name: &str| headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name));

    if !has_header("host") {
        request.extend_from_slice(b"Host: ");
        request.extend_from_slice(host.as_bytes());
        if let Some(port) = url.port() {
            request.extend_from_slice(format!(":{}", port).as_bytes());
        }
        request.extend_from_slice(b"\r\n");
    }

    for (name, value) in headers {
        request.extend_from_slice(name.as_bytes());
        request.extend_from_slice(b": ");
        request.extend_from_slice(value.as_bytes());
        request.extend_from_slice(b"\r\n");
    }

    // Content-Length must not accompany Transfer-Encoding.
    if let Some(body) = body {
        if !has_header("transfer-encoding") && !has_header("content-length") {
            request.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        }
    } else if matches!(*method, Method::POST | Method::PUT | Method::PATCH)
        && !has_header("content-length")
        && !has_header("transfer-encoding")
    {
        request.extend_from_slice(b"Content-Length: 0\r\n");
    }

    request.extend_from_slice(b"\r\n");
    Ok(request)
}

/// Find the end of HTTP headers (\r\n\r\n).
fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Find a header value by name (case-insensitive).
fn find_header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Parse a chunk size from the buffer, returning (size, end_of_line_position).
///
/// `Ok(None)` means the line is not complete yet; a complete line that does
/// not start with a hex size is an error.
fn find_chunk_size(buffer: &[u8]) -> Result<Option<(usize, usize)>> {
    let Some(i) = find_crlf(buffer) else {
        return Ok(None);
    };
    // Chunk extensions after ';' are ignored.
    let line = &buffer[..i];
    let size_part = line.split(|b| *b == b';').next().unwrap_or_default();
    let size_part = std::str::from_utf8(size_part)
        .map(str::trim)
        .map_err(|_| Error::http_protocol("invalid chunk size"))?;
    if size_part.is_empty() || !size_part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::http_protocol(format!(
            "invalid chunk size: {:?}",
            String::from_utf8_lossy(line)
        )));
    }
    let size = usize::from_str_radix(size_part, 16)
        .map_err(|_| Error::http_protocol("invalid chunk size: overflow"))?;
    Ok(Some((size, i + 2)))
}

/// Find the first CRLF in a buffer, returning its position.
fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\r\n")
}

/// Header names must be tokens (RFC 9110 Section 5.1).
fn validate_header_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::http_protocol("Empty header name"));
    }
    if !name.bytes().all(is_tchar) {
        return Err(Error::http_protocol(format!(
            "Invalid character in header name: {:?}",
            name
        )));
    }
    Ok(())
}

/// Check if a byte is a valid token character per RFC 9110.
fn is_tchar(b: u8) -> bool {
    matches!(b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'^' | b'_' | b'`' | b'|' | b'~' | b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z'
    )
}

/// Header values must not contain NUL, CR, or LF.
fn validate_header_value(value: &str) -> Result<()> {
    if value.bytes().any(|b| b == 0 || b == b'\r' || b == b'\n') {
        return Err(Error::http_protocol(
            "Invalid character in header value (CR/LF/NUL not allowed)",
        ));
    }
    Ok(())
}

/// Parse Content-Length. Repeated values must all be identical.
fn parse_content_length(value: &str) -> Result<usize> {
    let mut parsed = value.split(',').map(|s| {
        s.trim()
            .parse::<usize>()
            .map_err(|_| Error::http_protocol(format!("Invalid Content-Length: {}", value)))
    });

    let first = parsed
        .next()
        .ok_or_else(|| Error::http_protocol("Empty Content-Length"))??;
    for next in parsed {
        if next? != first {
            return Err(Error::http_protocol(format!(
                "Conflicting Content-Length values: {}",
                value
            )));
        }
    }
    Ok(first)
}
