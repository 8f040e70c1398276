//! JA3 string parsing.
//!
//! Grammar: `SSLVersion,Ciphers,Extensions,EllipticCurves,EcPointFormats`
//!
//! - exactly five comma-separated fields
//! - list values separated by dashes, all decimal
//! - version, ciphers and extensions are required; curves and point formats
//!   may be empty

use md5::{Digest, Md5};

use crate::error::ValidationError;

const FORMAT: &str = "JA3";

/// Parsed JA3 fields in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ja3 {
    pub version: u16,
    pub ciphers: Vec<u16>,
    pub extensions: Vec<u16>,
    pub curves: Vec<u16>,
    pub point_formats: Vec<u8>,
}

impl Ja3 {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();
        let fields: Vec<&str> = value.split(',').collect();
        if fields.len() != 5 {
            return Err(ValidationError::malformed(
                FORMAT,
                format!("expected 5 comma-separated fields, got {}", fields.len()),
            ));
        }

        let version = parse_token::<u16>(fields[0], "version")?;
        if !matches!(version, 0x0301..=0x0304) {
            return Err(ValidationError::malformed(
                FORMAT,
                format!("unsupported TLS version {}", version),
            ));
        }

        let ciphers = parse_list::<u16>(fields[1], "ciphers", true)?;
        let extensions = parse_list::<u16>(fields[2], "extensions", true)?;
        let curves = parse_list::<u16>(fields[3], "curves", false)?;
        let point_formats = parse_list::<u8>(fields[4], "point formats", false)?;

        Ok(Self {
            version,
            ciphers,
            extensions,
            curves,
            point_formats,
        })
    }

    /// MD5 of the GREASE-free string, as reported by fingerprinting services.
    pub fn hash(&self) -> String {
        use super::grease::filter_grease_u16;
        hash_fields(
            self.version,
            &filter_grease_u16(&self.ciphers),
            &filter_grease_u16(&self.extensions),
            &filter_grease_u16(&self.curves),
            &self.point_formats,
        )
    }
}

impl std::fmt::Display for Ja3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_fields(
            self.version,
            &self.ciphers,
            &self.extensions,
            &self.curves,
            &self.point_formats,
        ))
    }
}

pub(crate) fn format_fields(
    version: u16,
    ciphers: &[u16],
    extensions: &[u16],
    curves: &[u16],
    point_formats: &[u8],
) -> String {
    format!(
        "{},{},{},{},{}",
        version,
        join_dash(ciphers),
        join_dash(extensions),
        join_dash(curves),
        join_dash(point_formats)
    )
}

pub(crate) fn hash_fields(
    version: u16,
    ciphers: &[u16],
    extensions: &[u16],
    curves: &[u16],
    point_formats: &[u8],
) -> String {
    let raw = format_fields(version, ciphers, extensions, curves, point_formats);
    let mut hasher = Md5::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn join_dash<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("-")
}

fn parse_token<T: std::str::FromStr>(token: &str, field: &str) -> Result<T, ValidationError> {
    // Leading zeros or signs would not survive re-serialization.
    let canonical = !token.is_empty()
        && token.bytes().all(|b| b.is_ascii_digit())
        && (token == "0" || !token.starts_with('0'));
    if !canonical {
        return Err(ValidationError::malformed(
            FORMAT,
            format!("{}: {:?} is not a decimal number", field, token),
        ));
    }
    token.parse::<T>().map_err(|_| {
        ValidationError::malformed(FORMAT, format!("{}: {} is out of range", field, token))
    })
}

fn parse_list<T: std::str::FromStr>(
    field_value: &str,
    field: &str,
    required: bool,
) -> Result<Vec<T>, ValidationError> {
    if field_value.is_empty() {
        if required {
            return Err(ValidationError::malformed(
                FORMAT,
                format!("{} field is empty", field),
            ));
        }
        return Ok(Vec::new());
    }
    field_value
        .split('-')
        .map(|token| parse_token::<T>(token, field))
        .collect()
}
