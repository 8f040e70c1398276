//! Response handling: raw transport responses, body decoding and the
//! canonical [`FetchResult`] every adapter encodes.

use std::borrow::Cow;
use std::io::Read;

use base64::Engine as _;
use bytes::Bytes;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::{Error, ErrorKind, Result};

/// Response as read off the wire, before decoding.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    /// Header lines in received order.
    pub headers: Vec<(String, String)>,
    body: Bytes,
    http_version: &'static str,
}

impl RawResponse {
    pub fn new(
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
        http_version: &'static str,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            http_version,
        }
    }

    pub fn http_version(&self) -> &'static str {
        self.http_version
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn redirect_url(&self) -> Option<&str> {
        self.get_header("Location")
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.get_header("Content-Encoding")
    }

    /// Decode the body per Content-Encoding (gzip, deflate, br, zstd).
    ///
    /// Stacked codings (`gzip, br`) are undone last-applied first. Every
    /// decoder stops after `limit + 1` output bytes, so a body that inflates
    /// past `limit` fails with [`Error::BodyTooLarge`] without being
    /// materialized. Returns `None` when no coding was applied.
    pub fn decoded_body(&self, limit: usize) -> Result<Option<Bytes>> {
        let Some(encoding) = self.content_encoding() else {
            return Ok(None);
        };
        let mut body = self.body.clone();
        let mut applied = false;
        for coding in encoding.rsplit(',').map(|c| c.trim().to_ascii_lowercase()) {
            body = match coding.as_str() {
                "gzip" | "x-gzip" => decode_gzip(&body, limit)?,
                "deflate" => decode_deflate(&body, limit)?,
                "br" => decode_brotli(&body, limit)?,
                "zstd" => decode_zstd(&body, limit)?,
                _ => continue,
            };
            applied = true;
        }
        Ok(applied.then_some(body))
    }
}

/// Drain `reader` into memory, failing once more than `limit` bytes come out.
fn read_bounded(reader: impl Read, limit: usize, coding: &str) -> Result<Bytes> {
    let mut decoded = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut decoded)
        .map_err(|e| Error::Decompression(format!("{}: {}", coding, e)))?;
    if decoded.len() > limit {
        return Err(Error::BodyTooLarge { limit });
    }
    Ok(Bytes::from(decoded))
}

fn decode_gzip(data: &[u8], limit: usize) -> Result<Bytes> {
    read_bounded(flate2::read::GzDecoder::new(data), limit, "gzip")
}

fn decode_deflate(data: &[u8], limit: usize) -> Result<Bytes> {
    match read_bounded(flate2::read::ZlibDecoder::new(data), limit, "deflate") {
        Err(Error::Decompression(_)) => {
            // Some servers send raw deflate without the zlib wrapper.
            read_bounded(flate2::read::DeflateDecoder::new(data), limit, "deflate")
        }
        other => other,
    }
}

fn decode_brotli(data: &[u8], limit: usize) -> Result<Bytes> {
    read_bounded(brotli::Decompressor::new(data, 4096), limit, "brotli")
}

fn decode_zstd(data: &[u8], limit: usize) -> Result<Bytes> {
    let decoder = zstd::stream::read::Decoder::new(data)
        .map_err(|e| Error::Decompression(format!("zstd: {}", e)))?;
    read_bounded(decoder, limit, "zstd")
}

/// Ordered multi-value header map.
///
/// Names keep the casing of their first occurrence; later lines with the
/// same name (any case) add values to that entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders(Vec<(String, Vec<String>)>);

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.0.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some((_, values)) => values.push(value.into()),
            None => self.0.push((name, vec![value.into()])),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for ResponseHeaders {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

impl Serialize for ResponseHeaders {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, values) in &self.0 {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

/// Canonical fetch outcome, identical across adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub ok: bool,
    /// HTTP status, 0 when no response was received.
    pub status: u16,
    pub headers: ResponseHeaders,
    pub body: Bytes,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl FetchResult {
    /// Build a result from the final response, decoding its body.
    ///
    /// A body that fails to decode is passed through as received, headers
    /// included. A decoded body drops `Content-Encoding` and
    /// `Content-Length`, which described the bytes on the wire. A body that
    /// decodes past `max_body_size` is an error.
    pub fn from_response(response: RawResponse, max_body_size: usize) -> Result<Self> {
        let (body, decoded) = match response.decoded_body(max_body_size) {
            Ok(Some(body)) => (body, true),
            Ok(None) => (response.body().clone(), false),
            Err(e @ Error::BodyTooLarge { .. }) => return Err(e),
            Err(e) => {
                tracing::debug!(error = %e, "keeping undecoded response body");
                (response.body().clone(), false)
            }
        };
        let headers = response
            .headers
            .iter()
            .filter(|(k, _)| {
                !decoded
                    || !(k.eq_ignore_ascii_case("content-encoding")
                        || k.eq_ignore_ascii_case("content-length"))
            })
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        Ok(Self {
            ok: (200..400).contains(&response.status),
            status: response.status,
            headers,
            body,
            error: None,
            error_kind: None,
        })
    }

    pub fn from_error(error: &Error) -> Self {
        Self {
            ok: false,
            status: 0,
            headers: ResponseHeaders::new(),
            body: Bytes::new(),
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }

    pub fn is_validation_error(&self) -> bool {
        self.error_kind == Some(ErrorKind::Validation)
    }

    /// Whether JSON wires must carry the body as base64.
    pub fn is_binary(&self) -> bool {
        let content_type = self
            .headers
            .get("Content-Type")
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();
        content_type.starts_with("image/")
            || content_type.starts_with("application/pdf")
            || std::str::from_utf8(&self.body).is_err()
    }

    /// Borrowed JSON view with the body encoded for text transport.
    pub fn to_json(&self) -> JsonFetchResult<'_> {
        let (body, body_encoding) = if self.is_binary() {
            (
                Cow::Owned(base64::engine::general_purpose::STANDARD.encode(&self.body)),
                Some("base64"),
            )
        } else {
            (String::from_utf8_lossy(&self.body), None)
        };
        JsonFetchResult {
            ok: self.ok,
            status: self.status,
            headers: &self.headers,
            body,
            body_encoding,
            error: self.error.as_deref(),
            error_kind: self.error_kind,
        }
    }
}

/// JSON encoding of a [`FetchResult`] shared by the HTTP and JSON-RPC wires.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonFetchResult<'a> {
    pub ok: bool,
    pub status: u16,
    pub headers: &'a ResponseHeaders,
    pub body: Cow<'a, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_encoding: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}
