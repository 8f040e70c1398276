//! Fingerprint source -> concrete [`FingerprintSpec`].

use crate::error::ValidationError;

use super::grease::contains_grease;
use super::ja3::Ja3;
use super::ja4r::Ja4r;
use super::registry::{BrowserFamily, BrowserProfile, Registry};
use super::{FingerprintSource, FingerprintSpec, Http2Settings, TlsVersion};

/// JA4R carries neither groups nor point formats. Uncompressed is the only
/// point format a ClientHello can offer here.
const JA4R_GROUPS: [u16; 4] = [29, 23, 24, 25];
const JA4R_POINT_FORMATS: [u8; 1] = [0];

const EXT_ALPN: u16 = 16;
const EXT_SUPPORTED_VERSIONS: u16 = 43;

/// Everything a fetch needs from its fingerprint source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    pub spec: FingerprintSpec,
    /// Effective User-Agent before caller headers are applied.
    pub user_agent: Option<String>,
    /// Profile default headers in emission order, User-Agent excluded.
    pub default_headers: Vec<(String, String)>,
}

/// Resolve a fingerprint source.
///
/// `user_agent` is the request's `userAgent` field. It overrides a profile's
/// default User-Agent and picks the engine family for raw fingerprints.
pub fn resolve(
    source: &FingerprintSource,
    user_agent: Option<&str>,
) -> Result<ResolvedProfile, ValidationError> {
    match source {
        FingerprintSource::Native => Ok(ResolvedProfile {
            spec: FingerprintSpec::native(),
            user_agent: user_agent.map(str::to_string),
            default_headers: Vec::new(),
        }),
        FingerprintSource::Browser(name) => {
            let profile = Registry::builtin()
                .lookup(name)
                .ok_or_else(|| ValidationError::UnknownBrowser(name.clone()))?;
            from_profile(profile, user_agent)
        }
        FingerprintSource::Ja3(value) => {
            let ja3 = Ja3::parse(value)?;
            let family = user_agent.and_then(BrowserFamily::from_user_agent);
            Ok(ResolvedProfile {
                spec: spec_from_ja3(&ja3, family, None),
                user_agent: user_agent.map(str::to_string),
                default_headers: Vec::new(),
            })
        }
        FingerprintSource::Ja4r(value) => {
            let ja4r = Ja4r::parse(value)?;
            let family = user_agent.and_then(BrowserFamily::from_user_agent);
            Ok(ResolvedProfile {
                spec: spec_from_ja4r(&ja4r, family),
                user_agent: user_agent.map(str::to_string),
                default_headers: Vec::new(),
            })
        }
    }
}

fn from_profile(
    profile: &'static BrowserProfile,
    user_agent: Option<&str>,
) -> Result<ResolvedProfile, ValidationError> {
    let ja3 = Ja3::parse(profile.ja3)?;
    let sigalgs = match profile.ja4r {
        Some(raw) => Some(Ja4r::parse(raw)?.signature_algorithms),
        None => None,
    };

    let mut spec = spec_from_ja3(&ja3, Some(profile.family), sigalgs);
    spec.http2 = Http2Settings::parse(profile.http2)?;
    spec.default_header_order = profile
        .header_order
        .iter()
        .map(|name| name.to_string())
        .collect();

    Ok(ResolvedProfile {
        spec,
        user_agent: Some(
            user_agent
                .unwrap_or(profile.default_user_agent)
                .to_string(),
        ),
        default_headers: profile
            .default_headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
    })
}

fn spec_from_ja3(
    ja3: &Ja3,
    family: Option<BrowserFamily>,
    signature_algorithms: Option<Vec<u16>>,
) -> FingerprintSpec {
    let (min_version, max_version) = match ja3.version {
        0x0301 => (TlsVersion::Tls10, TlsVersion::Tls10),
        0x0302 => (TlsVersion::Tls10, TlsVersion::Tls11),
        0x0304 => (TlsVersion::Tls13, TlsVersion::Tls13),
        _ if ja3.extensions.contains(&EXT_SUPPORTED_VERSIONS) => {
            (TlsVersion::Tls12, TlsVersion::Tls13)
        }
        _ => (TlsVersion::Tls12, TlsVersion::Tls12),
    };

    let alpn = if ja3.extensions.contains(&EXT_ALPN) {
        vec!["h2".to_string(), "http/1.1".to_string()]
    } else {
        Vec::new()
    };

    FingerprintSpec {
        tls_version: ja3.version,
        min_version,
        max_version,
        grease: wants_grease(&[&ja3.ciphers, &ja3.extensions, &ja3.curves], family),
        cipher_suites: ja3.ciphers.clone(),
        extensions: ja3.extensions.clone(),
        supported_groups: ja3.curves.clone(),
        ec_point_formats: ja3.point_formats.clone(),
        signature_algorithms: signature_algorithms
            .unwrap_or_else(|| default_sigalgs(family)),
        alpn,
        quic: false,
        default_header_order: Vec::new(),
        http2: http2_for(family),
    }
}

fn spec_from_ja4r(ja4r: &Ja4r, family: Option<BrowserFamily>) -> FingerprintSpec {
    let (min_version, max_version) = match ja4r.version {
        TlsVersion::Tls13 => (TlsVersion::Tls12, TlsVersion::Tls13),
        other => (other, other),
    };

    let signature_algorithms = if ja4r.signature_algorithms.is_empty() {
        default_sigalgs(family)
    } else {
        ja4r.signature_algorithms.clone()
    };

    FingerprintSpec {
        tls_version: ja4r.legacy_version(),
        min_version,
        max_version,
        grease: wants_grease(&[&ja4r.ciphers, &ja4r.extensions], family),
        cipher_suites: ja4r.ciphers.clone(),
        extensions: ja4r.full_extensions(),
        supported_groups: JA4R_GROUPS.to_vec(),
        ec_point_formats: JA4R_POINT_FORMATS.to_vec(),
        signature_algorithms,
        alpn: if ja4r.quic {
            vec!["h3".to_string()]
        } else {
            ja4r.alpn.map(|alpn| alpn.protocols()).unwrap_or_default()
        },
        quic: ja4r.quic,
        default_header_order: Vec::new(),
        http2: http2_for(family),
    }
}

fn wants_grease(lists: &[&Vec<u16>], family: Option<BrowserFamily>) -> bool {
    lists.iter().any(|list| contains_grease(list))
        || family.map(|f| f.uses_grease()).unwrap_or(false)
}

fn default_sigalgs(family: Option<BrowserFamily>) -> Vec<u16> {
    family
        .unwrap_or(BrowserFamily::Chromium)
        .default_signature_algorithms()
        .to_vec()
}

fn http2_for(family: Option<BrowserFamily>) -> Http2Settings {
    family.map(|f| f.http2_settings()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIREFOX_UA: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:144.0) Gecko/20100101 Firefox/144.0";

    #[test]
    fn test_native_when_nothing_set() {
        let resolved = resolve(&FingerprintSource::Native, None).unwrap();
        assert!(resolved.spec.is_native());
        assert!(resolved.user_agent.is_none());
        assert!(resolved.default_headers.is_empty());
    }

    #[test]
    fn test_browser_profile() {
        let resolved = resolve(&FingerprintSource::Browser("chrome".into()), None).unwrap();
        let spec = &resolved.spec;
        assert_eq!(spec.cipher_suites[3], 49195);
        assert_eq!(spec.supported_groups, vec![4588, 29, 23, 24]);
        assert!(spec.grease);
        assert_eq!(spec.min_version, TlsVersion::Tls12);
        assert_eq!(spec.max_version, TlsVersion::Tls13);
        assert_eq!(spec.alpn, vec!["h2", "http/1.1"]);
        assert_eq!(spec.signature_algorithms[0], 0x0403);
        assert_eq!(spec.default_header_order[0], "pragma");
        assert!(resolved.user_agent.unwrap().contains("Chrome/142"));
        assert!(resolved
            .default_headers
            .iter()
            .any(|(name, _)| name == "sec-ch-ua"));
    }

    #[test]
    fn test_user_agent_override() {
        let resolved = resolve(
            &FingerprintSource::Browser("firefox".into()),
            Some("custom-agent/1.0"),
        )
        .unwrap();
        assert_eq!(resolved.user_agent.as_deref(), Some("custom-agent/1.0"));
        assert!(!resolved.spec.grease);
        assert_eq!(resolved.spec.http2, Http2Settings::firefox());

        let chromium = resolve(&FingerprintSource::Browser("chromium".into()), None).unwrap();
        assert_eq!(chromium.spec.http2.get(3), Some(1000));
        assert_eq!(
            chromium.spec.http2.pseudo_order,
            Http2Settings::chrome().pseudo_order
        );
    }

    #[test]
    fn test_unknown_browser() {
        let err = resolve(&FingerprintSource::Browser("netscape".into()), None).unwrap_err();
        assert_eq!(err, ValidationError::UnknownBrowser("netscape".into()));
    }

    #[test]
    fn test_raw_ja3() {
        let source = FingerprintSource::Ja3("771,4865-49195-49199,0-10-11-13-43-16,29-23,0".into());
        let resolved = resolve(&source, None).unwrap();
        let spec = resolved.spec;
        assert_eq!(spec.cipher_suites, vec![4865, 49195, 49199]);
        assert_eq!(spec.max_version, TlsVersion::Tls13);
        assert_eq!(spec.alpn, vec!["h2", "http/1.1"]);
        assert!(!spec.grease);
        assert!(spec.default_header_order.is_empty());
        assert_eq!(spec.to_ja3(), "771,4865-49195-49199,0-10-11-13-43-16,29-23,0");
    }

    #[test]
    fn test_ja3_version_bounds() {
        let tls12 = resolve(&FingerprintSource::Ja3("771,49195,0-10,29,0".into()), None).unwrap();
        assert_eq!(tls12.spec.max_version, TlsVersion::Tls12);
        assert!(tls12.spec.alpn.is_empty());

        let tls10 = resolve(&FingerprintSource::Ja3("769,47,0,,".into()), None).unwrap();
        assert_eq!(tls10.spec.min_version, TlsVersion::Tls10);
        assert_eq!(tls10.spec.max_version, TlsVersion::Tls10);
    }

    #[test]
    fn test_grease_from_input_or_family() {
        let greased = resolve(&FingerprintSource::Ja3("771,2570-49195,0-10,29,0".into()), None)
            .unwrap();
        assert!(greased.spec.grease);
        // placeholders survive for re-serialization
        assert_eq!(greased.spec.cipher_suites[0], 2570);

        let chromium_ua = resolve(
            &FingerprintSource::Ja3("771,49195,0-10,29,0".into()),
            Some("Mozilla/5.0 AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36"),
        )
        .unwrap();
        assert!(chromium_ua.spec.grease);

        let firefox_ua =
            resolve(&FingerprintSource::Ja3("771,49195,0-10,29,0".into()), Some(FIREFOX_UA))
                .unwrap();
        assert!(!firefox_ua.spec.grease);
        assert_eq!(firefox_ua.spec.signature_algorithms.len(), 11);
    }

    #[test]
    fn test_raw_ja4r() {
        let source = FingerprintSource::Ja4r("t13d0305h2_1301,c02b,c02f_000a,000b,000d_0403,0804".into());
        let spec = resolve(&source, None).unwrap().spec;
        assert_eq!(spec.extensions, vec![0, 10, 11, 13, 16]);
        assert_eq!(spec.supported_groups, vec![29, 23, 24, 25]);
        assert_eq!(spec.ec_point_formats, vec![0]);
        assert_eq!(spec.signature_algorithms, vec![0x0403, 0x0804]);
        assert_eq!(spec.alpn, vec!["h2", "http/1.1"]);
        assert_eq!(spec.tls_version, 771);
        assert!(!spec.quic);

        let source = FingerprintSource::Ja4r("q13d0310h3_1301,1302_000a,000d,002b_0403".into());
        let spec = resolve(&source, None).unwrap().spec;
        assert!(spec.quic);
        assert_eq!(spec.alpn, vec!["h3"]);
    }

    #[test]
    fn test_malformed_is_validation_error() {
        let err = resolve(&FingerprintSource::Ja3("garbage".into()), None).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedFingerprint { format: "JA3", .. }));
        let err = resolve(&FingerprintSource::Ja4r("garbage".into()), None).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedFingerprint { format: "JA4R", .. }));
    }
}
