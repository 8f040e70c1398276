//! JA4R (raw JA4) string parsing.
//!
//! Grammar: `{proto}{ver}{sni}{cc}{ee}{alpn}_{ciphers}_{extensions}_{sigalgs}`
//!
//! - `proto` is `t` (TCP) or `q` (QUIC), `ver` one of `10`..`13`, `sni` is
//!   `d` (domain) or `i` (IP)
//! - `cc` / `ee` are two-digit counts; `ee` includes SNI and ALPN even though
//!   the extension list omits them. Captures in the wild often disagree with
//!   their lists, so the lists win and a mismatch is only logged
//! - parts after the fourth are ignored
//! - `alpn` is `h2`, `h1` or `00` and may be left out entirely
//! - lists are comma-separated four-digit hex values

use tracing::debug;

use crate::error::ValidationError;

use super::TlsVersion;

const FORMAT: &str = "JA4R";

/// Parsed JA4R fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ja4r {
    pub quic: bool,
    pub version: TlsVersion,
    pub sni: bool,
    pub alpn: Option<Alpn>,
    pub ciphers: Vec<u16>,
    /// Extensions without SNI and ALPN, as listed in the string.
    pub extensions: Vec<u16>,
    pub signature_algorithms: Vec<u16>,
}

/// First ALPN value advertised, as summarised in the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alpn {
    H2,
    Http1,
    /// QUIC hellos advertise HTTP/3.
    H3,
    /// `00`: the ALPN marker is present but no protocol was offered.
    Empty,
}

impl Alpn {
    fn parse(marker: &str) -> Result<Self, ValidationError> {
        match marker {
            "h2" => Ok(Self::H2),
            "h1" => Ok(Self::Http1),
            "h3" => Ok(Self::H3),
            "00" => Ok(Self::Empty),
            other => Err(ValidationError::malformed(
                FORMAT,
                format!("unsupported ALPN marker {:?}", other),
            )),
        }
    }

    fn marker(&self) -> &'static str {
        match self {
            Self::H2 => "h2",
            Self::Http1 => "h1",
            Self::H3 => "h3",
            Self::Empty => "00",
        }
    }

    /// Protocols to offer for this marker.
    pub fn protocols(&self) -> Vec<String> {
        match self {
            Self::H2 => vec!["h2".to_string(), "http/1.1".to_string()],
            Self::Http1 => vec!["http/1.1".to_string()],
            Self::H3 => vec!["h3".to_string()],
            Self::Empty => Vec::new(),
        }
    }
}

impl Ja4r {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let parts: Vec<&str> = value.trim().split('_').collect();
        if parts.len() < 4 {
            return Err(ValidationError::malformed(
                FORMAT,
                format!("expected 4 '_'-separated parts, got {}", parts.len()),
            ));
        }
        if parts.len() > 4 {
            debug!(ignored = parts.len() - 4, "JA4R has trailing parts");
        }

        let prefix = parts[0];
        if !prefix.is_ascii() || (prefix.len() != 8 && prefix.len() != 10) {
            return Err(ValidationError::malformed(
                FORMAT,
                format!("invalid prefix {:?}", prefix),
            ));
        }

        let quic = match &prefix[0..1] {
            "t" => false,
            "q" => true,
            other => {
                return Err(ValidationError::malformed(
                    FORMAT,
                    format!("unknown protocol marker {:?}", other),
                ))
            }
        };
        let version = match &prefix[1..3] {
            "10" => TlsVersion::Tls10,
            "11" => TlsVersion::Tls11,
            "12" => TlsVersion::Tls12,
            "13" => TlsVersion::Tls13,
            other => {
                return Err(ValidationError::malformed(
                    FORMAT,
                    format!("unsupported TLS version {:?}", other),
                ))
            }
        };
        let sni = match &prefix[3..4] {
            "d" => true,
            "i" => false,
            other => {
                return Err(ValidationError::malformed(
                    FORMAT,
                    format!("unknown SNI marker {:?}", other),
                ))
            }
        };
        let cipher_count = parse_count(&prefix[4..6], "cipher count")?;
        let extension_count = parse_count(&prefix[6..8], "extension count")?;
        let alpn = if prefix.len() == 10 {
            Some(Alpn::parse(&prefix[8..10])?)
        } else {
            None
        };

        let ciphers = parse_hex_list(parts[1], "ciphers")?;
        if ciphers.is_empty() {
            return Err(ValidationError::malformed(FORMAT, "cipher list is empty"));
        }
        let extensions = parse_hex_list(parts[2], "extensions")?;
        let signature_algorithms = parse_hex_list(parts[3], "signature algorithms")?;

        if ciphers.len().min(99) != cipher_count {
            debug!(
                declared = cipher_count,
                listed = ciphers.len(),
                "JA4R cipher count does not match its list"
            );
        }

        let implied = extensions.len()
            + usize::from(sni)
            + usize::from(matches!(alpn, Some(Alpn::H2) | Some(Alpn::Http1) | Some(Alpn::H3)));
        if implied.min(99) != extension_count {
            debug!(
                declared = extension_count,
                listed = extensions.len(),
                "JA4R extension count does not match its list"
            );
        }

        Ok(Self {
            quic,
            version,
            sni,
            alpn,
            ciphers,
            extensions,
            signature_algorithms,
        })
    }

    /// ClientHello legacy version paired with this protocol version.
    pub fn legacy_version(&self) -> u16 {
        match self.version {
            TlsVersion::Tls10 => 0x0301,
            TlsVersion::Tls11 => 0x0302,
            TlsVersion::Tls12 | TlsVersion::Tls13 => 0x0303,
        }
    }

    /// Full extension list with SNI and ALPN restored.
    pub fn full_extensions(&self) -> Vec<u16> {
        let mut exts = Vec::with_capacity(self.extensions.len() + 2);
        if self.sni {
            exts.push(0x0000);
        }
        exts.extend_from_slice(&self.extensions);
        if matches!(self.alpn, Some(Alpn::H2) | Some(Alpn::Http1) | Some(Alpn::H3)) {
            exts.push(0x0010);
        }
        exts
    }
}

impl std::fmt::Display for Ja4r {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let version = match self.version {
            TlsVersion::Tls10 => "10",
            TlsVersion::Tls11 => "11",
            TlsVersion::Tls12 => "12",
            TlsVersion::Tls13 => "13",
        };
        let ext_count = self.full_extensions().len().min(99);
        write!(
            f,
            "{}{}{}{:02}{:02}{}_{}_{}_{}",
            if self.quic { 'q' } else { 't' },
            version,
            if self.sni { 'd' } else { 'i' },
            self.ciphers.len().min(99),
            ext_count,
            self.alpn.map(|a| a.marker()).unwrap_or(""),
            join_hex(&self.ciphers),
            join_hex(&self.extensions),
            join_hex(&self.signature_algorithms)
        )
    }
}

fn parse_count(digits: &str, what: &str) -> Result<usize, ValidationError> {
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::malformed(
            FORMAT,
            format!("{} {:?} is not two digits", what, digits),
        ));
    }
    digits
        .parse()
        .map_err(|_| ValidationError::malformed(FORMAT, format!("invalid {}", what)))
}

fn parse_hex_list(list: &str, what: &str) -> Result<Vec<u16>, ValidationError> {
    if list.is_empty() {
        return Ok(Vec::new());
    }
    list.split(',')
        .map(|token| {
            if token.len() != 4 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(ValidationError::malformed(
                    FORMAT,
                    format!("{}: {:?} is not a 4-digit hex value", what, token),
                ));
            }
            u16::from_str_radix(token, 16)
                .map_err(|_| ValidationError::malformed(FORMAT, format!("{}: bad hex", what)))
        })
        .collect()
}

fn join_hex(values: &[u16]) -> String {
    values
        .iter()
        .map(|v| format!("{:04x}", v))
        .collect::<Vec<_>>()
        .join(",")
}
