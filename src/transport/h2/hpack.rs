//! HPACK for the request HEADERS block, with the pseudo-header order taken
//! from the HTTP/2 fingerprint. Table and Huffman work is done by the
//! `hpack` crate.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::fingerprint::http2::{PseudoHeader, PseudoHeaderOrder};

/// Illegal on an HTTP/2 request (RFC 9113 8.2.2); `host` is carried by
/// `:authority`.
const CONNECTION_SPECIFIC: &[&str] = &[
    "connection",
    "host",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
];

/// Request pseudo-header values.
#[derive(Debug, Clone, Copy)]
pub struct RequestTarget<'a> {
    pub method: &'a str,
    pub scheme: &'a str,
    pub authority: &'a str,
    pub path: &'a str,
}

impl RequestTarget<'_> {
    fn value(&self, pseudo: PseudoHeader) -> &str {
        match pseudo {
            PseudoHeader::Method => self.method,
            PseudoHeader::Authority => self.authority,
            PseudoHeader::Scheme => self.scheme,
            PseudoHeader::Path => self.path,
        }
    }
}

pub struct HpackEncoder {
    encoder: ::hpack::Encoder<'static>,
    pseudo_order: PseudoHeaderOrder,
}

impl HpackEncoder {
    pub fn new(pseudo_order: PseudoHeaderOrder) -> Self {
        Self {
            encoder: ::hpack::Encoder::new(),
            pseudo_order,
        }
    }

    /// Pseudo-headers in the configured order, then `headers` in caller
    /// order with names lower-cased and connection headers dropped.
    pub fn encode_request(&mut self, target: &RequestTarget<'_>, headers: &[(String, String)]) -> Bytes {
        let regular: Vec<(String, &str)> = headers
            .iter()
            .filter(|(name, _)| !name.is_empty() && !name.starts_with(':'))
            .map(|(name, value)| (name.to_ascii_lowercase(), value.as_str()))
            .filter(|(name, value)| {
                !CONNECTION_SPECIFIC.contains(&name.as_str())
                    && (name != "te" || value.eq_ignore_ascii_case("trailers"))
            })
            .collect();

        let block: Vec<(&[u8], &[u8])> = self
            .pseudo_order
            .iter()
            .map(|pseudo| (pseudo.name().as_bytes(), target.value(pseudo).as_bytes()))
            .chain(
                regular
                    .iter()
                    .map(|(name, value)| (name.as_bytes(), value.as_bytes())),
            )
            .collect();

        Bytes::from(self.encoder.encode(block))
    }
}

pub struct HpackDecoder {
    decoder: ::hpack::Decoder<'static>,
}

impl Default for HpackDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackDecoder {
    pub fn new() -> Self {
        Self {
            decoder: ::hpack::Decoder::new(),
        }
    }

    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<(String, String)>> {
        let fields = self
            .decoder
            .decode(block)
            .map_err(|e| Error::http_protocol(format!("HPACK decode error: {:?}", e)))?;
        Ok(fields
            .into_iter()
            .map(|(name, value)| {
                (
                    String::from_utf8_lossy(&name).into_owned(),
                    String::from_utf8_lossy(&value).into_owned(),
                )
            })
            .collect())
    }
}
