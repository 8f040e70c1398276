//! TLS fingerprint resolution.
//!
//! A fetch names its TLS identity either through a registered browser profile
//! or through a raw JA3 / JA4R string. Both resolve into one
//! [`FingerprintSpec`], which is the only shape the connector consumes.

pub mod grease;
pub mod http2;
pub mod ja3;
pub mod ja4r;
pub mod names;
pub mod registry;
pub mod resolver;

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

pub use http2::{HeaderPriority, Http2Settings, PseudoHeader, PseudoHeaderOrder};
pub use registry::{BrowserFamily, BrowserProfile, Registry};
pub use resolver::{resolve, ResolvedProfile};

/// Protocol version bound applied to the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

/// Raw fingerprint format named by `fingerprint.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintKind {
    Ja3,
    Ja4r,
}

impl FromStr for FingerprintKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ja3" => Ok(Self::Ja3),
            "ja4r" | "ja4" => Ok(Self::Ja4r),
            _ => Err(ValidationError::UnsupportedFingerprintType(s.to_string())),
        }
    }
}

impl fmt::Display for FingerprintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ja3 => f.write_str("ja3"),
            Self::Ja4r => f.write_str("ja4r"),
        }
    }
}

/// Where the TLS identity of a fetch comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FingerprintSource {
    /// No impersonation; BoringSSL defaults.
    Native,
    /// A registered browser profile name.
    Browser(String),
    /// Raw JA3 string.
    Ja3(String),
    /// Raw JA4R string.
    Ja4r(String),
}

impl FingerprintSource {
    /// Build a source from an explicit `type` / `value` pair.
    pub fn raw(kind: FingerprintKind, value: impl Into<String>) -> Self {
        match kind {
            FingerprintKind::Ja3 => Self::Ja3(value.into()),
            FingerprintKind::Ja4r => Self::Ja4r(value.into()),
        }
    }
}

/// Resolved ClientHello shape for one fetch.
///
/// Built fresh per call and never mutated afterwards. List fields keep the
/// order (and any GREASE placeholders) of the source string; the connector
/// strips GREASE before handing values to BoringSSL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintSpec {
    /// ClientHello legacy version as written in JA3 (771 = TLS 1.2 record).
    pub tls_version: u16,
    pub min_version: TlsVersion,
    pub max_version: TlsVersion,
    pub cipher_suites: Vec<u16>,
    pub extensions: Vec<u16>,
    pub supported_groups: Vec<u16>,
    pub ec_point_formats: Vec<u8>,
    pub signature_algorithms: Vec<u16>,
    /// ALPN protocols in preference order; empty means no ALPN extension.
    pub alpn: Vec<String>,
    pub grease: bool,
    /// JA4R `q` marker: send over QUIC as HTTP/3.
    pub quic: bool,
    /// Lower-case header names in emission order.
    pub default_header_order: Vec<String>,
    pub http2: Http2Settings,
}

impl FingerprintSpec {
    /// No impersonation: BoringSSL picks ciphers, groups and extensions.
    pub fn native() -> Self {
        Self {
            tls_version: 0x0303,
            min_version: TlsVersion::Tls12,
            max_version: TlsVersion::Tls13,
            cipher_suites: Vec::new(),
            extensions: Vec::new(),
            supported_groups: Vec::new(),
            ec_point_formats: Vec::new(),
            signature_algorithms: Vec::new(),
            alpn: vec!["h2".to_string(), "http/1.1".to_string()],
            grease: false,
            quic: false,
            default_header_order: Vec::new(),
            http2: Http2Settings::default(),
        }
    }

    pub fn is_native(&self) -> bool {
        self.cipher_suites.is_empty()
    }

    pub fn has_extension(&self, id: u16) -> bool {
        self.extensions.contains(&id)
    }

    /// Re-serialize the ordered lists in JA3 form.
    pub fn to_ja3(&self) -> String {
        ja3::format_fields(
            self.tls_version,
            &self.cipher_suites,
            &self.extensions,
            &self.supported_groups,
            &self.ec_point_formats,
        )
    }

    /// Standard JA3 hash (GREASE removed, MD5 hex).
    pub fn ja3_hash(&self) -> String {
        ja3::hash_fields(
            self.tls_version,
            &grease::filter_grease_u16(&self.cipher_suites),
            &grease::filter_grease_u16(&self.extensions),
            &grease::filter_grease_u16(&self.supported_groups),
            &self.ec_point_formats,
        )
    }
}
