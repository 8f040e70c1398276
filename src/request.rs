//! Canonical fetch request.
//!
//! [`FetchRequest`] is what every adapter decodes into. It mirrors the JSON
//! wire shape (camelCase fields) and is checked once by
//! [`FetchRequest::validate`], which produces the [`ValidatedRequest`] the
//! executor works with.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use http::Method;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::cookie::{parse_cookie_date, Cookie};
use crate::error::ValidationError;
use crate::fingerprint::{FingerprintKind, FingerprintSource, Http2Settings};

/// Ordered header list.
///
/// On JSON wires this is an object; member order is kept and duplicate names
/// are kept as separate entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList(pub Vec<(String, String)>);

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Serialize for HeaderList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for HeaderList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeaderListVisitor;

        impl<'de> Visitor<'de> for HeaderListVisitor {
            type Value = HeaderList;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of header names to string values")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(HeaderList::default())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut headers = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, value)) = map.next_entry::<String, String>()? {
                    headers.push((name, value));
                }
                Ok(HeaderList(headers))
            }
        }

        deserializer.deserialize_any(HeaderListVisitor)
    }
}

/// `fingerprint` field: raw JA3 / JA4R string with its format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintParam {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// Cookie expiry as unix seconds or a date string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CookieExpiry {
    Unix(i64),
    Text(String),
}

impl CookieExpiry {
    fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Unix(0) => None,
            Self::Unix(ts) => Utc.timestamp_opt(*ts, 0).single(),
            Self::Text(text) if text.is_empty() => None,
            Self::Text(text) => parse_cookie_date(text),
        }
    }
}

/// Cookie supplied with a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieParam {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Value")]
    pub value: String,
    #[serde(default, alias = "Domain", skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, alias = "Path", skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, alias = "Expires", skip_serializing_if = "Option::is_none")]
    pub expires: Option<CookieExpiry>,
    #[serde(default, alias = "Secure")]
    pub secure: bool,
    #[serde(default, alias = "HttpOnly")]
    pub http_only: bool,
}

impl CookieParam {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    fn to_cookie(&self, url: &Url) -> Cookie {
        let domain = self
            .domain
            .as_deref()
            .filter(|d| !d.is_empty())
            .or_else(|| url.host_str())
            .unwrap_or_default();
        let mut cookie = Cookie::new(self.name.clone(), self.value.clone(), domain);
        if let Some(path) = self.path.as_deref().filter(|p| p.starts_with('/')) {
            cookie.path = path.to_string();
        }
        cookie.secure = self.secure;
        cookie.http_only = self.http_only;
        cookie.expires = self.expires.as_ref().and_then(CookieExpiry::to_datetime);
        cookie
    }
}

/// Transport-neutral fetch request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: HeaderList,
    #[serde(
        default,
        deserialize_with = "deserialize_body",
        serialize_with = "serialize_body",
        skip_serializing_if = "Option::is_none"
    )]
    pub body: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Seconds; fractions allowed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub disable_redirect: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<FingerprintParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    /// Akamai-style HTTP/2 fingerprint overriding the profile's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http2_settings: Option<String>,
    #[serde(default)]
    pub cookies: Vec<CookieParam>,
}

fn deserialize_body<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Bytes>, D::Error> {
    let body: Option<String> = Option::deserialize(deserializer)?;
    Ok(body.map(Bytes::from))
}

fn serialize_body<S: Serializer>(body: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error> {
    match body {
        Some(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
        None => serializer.serialize_none(),
    }
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.as_secs_f64());
        self
    }

    pub fn disable_redirect(mut self, disable: bool) -> Self {
        self.disable_redirect = disable;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn fingerprint(mut self, kind: impl Into<String>, value: impl Into<String>) -> Self {
        self.fingerprint = Some(FingerprintParam {
            kind: kind.into(),
            value: value.into(),
        });
        self
    }

    pub fn browser(mut self, browser: impl Into<String>) -> Self {
        self.browser = Some(browser.into());
        self
    }

    pub fn http2_settings(mut self, akamai: impl Into<String>) -> Self {
        self.http2_settings = Some(akamai.into());
        self
    }

    pub fn cookie(mut self, cookie: CookieParam) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Check every field and normalise defaults.
    ///
    /// No I/O happens here; a failure means the caller sent a bad request.
    pub fn validate(&self, default_timeout: Duration) -> Result<ValidatedRequest, ValidationError> {
        let url = parse_url(&self.url)?;

        let method = match self.method.as_deref().map(str::trim) {
            None | Some("") => Method::GET,
            Some(raw) => {
                let upper = raw.to_ascii_uppercase();
                if !upper.bytes().all(is_tchar) {
                    return Err(ValidationError::InvalidMethod(raw.to_string()));
                }
                Method::from_bytes(upper.as_bytes())
                    .map_err(|_| ValidationError::InvalidMethod(raw.to_string()))?
            }
        };

        let timeout = match self.timeout {
            None => default_timeout,
            Some(secs) if secs.is_finite() && secs > 0.0 => Duration::try_from_secs_f64(secs)
                .map_err(|_| ValidationError::NonPositiveTimeout)?,
            Some(_) => return Err(ValidationError::NonPositiveTimeout),
        };

        for (name, value) in self.headers.iter() {
            if name.is_empty() || !name.bytes().all(is_tchar) {
                return Err(ValidationError::InvalidHeader(format!(
                    "invalid header name {:?}",
                    name
                )));
            }
            if value.bytes().any(|b| matches!(b, b'\r' | b'\n' | 0)) {
                return Err(ValidationError::InvalidHeader(format!(
                    "value of {} contains a control character",
                    name
                )));
            }
        }

        let browser = self.browser.as_deref().filter(|b| !b.is_empty());
        let fingerprint = match (&self.fingerprint, browser) {
            (Some(_), Some(_)) => return Err(ValidationError::ConflictingFingerprint),
            (Some(param), None) => {
                let kind = FingerprintKind::from_str(&param.kind)?;
                FingerprintSource::raw(kind, param.value.trim())
            }
            (None, Some(name)) => FingerprintSource::Browser(name.to_string()),
            (None, None) => FingerprintSource::Native,
        };

        let http2 = self
            .http2_settings
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(Http2Settings::parse)
            .transpose()?;

        let cookies = self.cookies.iter().map(|c| c.to_cookie(&url)).collect();

        Ok(ValidatedRequest {
            url,
            method,
            headers: self.headers.0.clone(),
            body: self.body.clone().filter(|b| !b.is_empty()),
            proxy: self.proxy.clone().filter(|p| !p.trim().is_empty()),
            timeout,
            follow_redirects: !self.disable_redirect,
            user_agent: self.user_agent.clone().filter(|ua| !ua.is_empty()),
            fingerprint,
            http2,
            cookies,
        })
    }
}

/// A request that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub url: Url,
    pub method: Method,
    /// Caller headers in caller order and casing.
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub proxy: Option<String>,
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub user_agent: Option<String>,
    pub fingerprint: FingerprintSource,
    pub http2: Option<Http2Settings>,
    pub cookies: Vec<Cookie>,
}

fn parse_url(raw: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ValidationError::InvalidUrl(format!("{}: {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidUrl(format!(
            "unsupported scheme {:?}",
            url.scheme()
        )));
    }
    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(ValidationError::InvalidUrl(format!("{}: missing host", raw)));
    }
    Ok(url)
}

/// RFC 9110 `tchar`.
fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: Duration = Duration::from_secs(30);

    #[test]
    fn test_deserialize_wire_shape() {
        let req: FetchRequest = serde_json::from_str(
            r#"{
                "url": "https://example.com/api",
                "method": "post",
                "headers": {"Zeta": "1", "alpha": "2", "X-Custom-Header": "v1"},
                "body": "{\"key\":\"value\"}",
                "timeout": 2.5,
                "disableRedirect": true,
                "userAgent": "ua/1",
                "fingerprint": {"type": "ja3", "value": "771,4865,0,29,0"},
                "cookies": [{"Name": "sid", "Value": "42", "expires": 1700000000}]
            }"#,
        )
        .unwrap();
        let names: Vec<&str> = req.headers.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["Zeta", "alpha", "X-Custom-Header"]);
        assert_eq!(req.body.as_deref(), Some(&b"{\"key\":\"value\"}"[..]));
        assert_eq!(req.timeout, Some(2.5));
        assert!(req.disable_redirect);
        assert_eq!(req.cookies[0].name, "sid");
        assert_eq!(req.cookies[0].expires, Some(CookieExpiry::Unix(1_700_000_000)));

        let validated = req.validate(DEFAULT).unwrap();
        assert_eq!(validated.method, Method::POST);
        assert_eq!(validated.timeout, Duration::from_millis(2500));
        assert!(!validated.follow_redirects);
        assert!(matches!(validated.fingerprint, FingerprintSource::Ja3(_)));
        assert_eq!(validated.cookies[0].domain, "example.com");
        assert_eq!(validated.cookies[0].path, "/");
    }

    #[test]
    fn test_defaults() {
        let req: FetchRequest = serde_json::from_str(r#"{"url":"http://example.com"}"#).unwrap();
        let validated = req.validate(DEFAULT).unwrap();
        assert_eq!(validated.method, Method::GET);
        assert_eq!(validated.timeout, DEFAULT);
        assert!(validated.follow_redirects);
        assert_eq!(validated.fingerprint, FingerprintSource::Native);
        assert!(validated.body.is_none());
    }

    #[test]
    fn test_empty_strings_are_absent() {
        let req: FetchRequest = serde_json::from_str(
            r#"{"url":"http://example.com","body":"","proxy":"","browser":"","headers":null}"#,
        )
        .unwrap();
        let validated = req.validate(DEFAULT).unwrap();
        assert!(validated.body.is_none());
        assert!(validated.proxy.is_none());
        assert_eq!(validated.fingerprint, FingerprintSource::Native);
    }

    #[test]
    fn test_invalid_url() {
        for url in ["", "not a url", "ftp://example.com/", "/relative"] {
            let err = FetchRequest::new(url).validate(DEFAULT).unwrap_err();
            assert!(matches!(err, ValidationError::InvalidUrl(_)), "{}", url);
        }
    }

    #[test]
    fn test_invalid_timeout() {
        for timeout in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut req = FetchRequest::new("https://example.com");
            req.timeout = Some(timeout);
            assert_eq!(
                req.validate(DEFAULT).unwrap_err(),
                ValidationError::NonPositiveTimeout
            );
        }
    }

    #[test]
    fn test_invalid_method() {
        let err = FetchRequest::new("https://example.com")
            .method("GE T")
            .validate(DEFAULT)
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidMethod(_)));

        let ok = FetchRequest::new("https://example.com")
            .method("patch")
            .validate(DEFAULT)
            .unwrap();
        assert_eq!(ok.method, Method::PATCH);
    }

    #[test]
    fn test_invalid_headers() {
        let err = FetchRequest::new("https://example.com")
            .header("Bad Name", "v")
            .validate(DEFAULT)
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidHeader(_)));

        let err = FetchRequest::new("https://example.com")
            .header("X-Injected", "a\r\nEvil: 1")
            .validate(DEFAULT)
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidHeader(_)));
    }

    #[test]
    fn test_browser_and_fingerprint_conflict() {
        let err = FetchRequest::new("https://example.com")
            .browser("chrome")
            .fingerprint("ja3", "771,4865,0,29,0")
            .validate(DEFAULT)
            .unwrap_err();
        assert_eq!(err, ValidationError::ConflictingFingerprint);
    }

    #[test]
    fn test_fingerprint_type() {
        let ok = FetchRequest::new("https://example.com")
            .fingerprint("JA4", "t13d0101_1301__")
            .validate(DEFAULT)
            .unwrap();
        assert!(matches!(ok.fingerprint, FingerprintSource::Ja4r(_)));

        let err = FetchRequest::new("https://example.com")
            .fingerprint("akamai", "x")
            .validate(DEFAULT)
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedFingerprintType(_)));
    }

    #[test]
    fn test_http2_settings_field() {
        let req: FetchRequest = serde_json::from_str(
            r#"{"url":"https://example.com","http2Settings":"1:65536;2:0;4:131072;5:16384|12517377|0:42:false|m,p,a,s"}"#,
        )
        .unwrap();
        let validated = req.validate(DEFAULT).unwrap();
        assert_eq!(validated.http2, Some(Http2Settings::firefox()));

        let blank = FetchRequest::new("https://example.com")
            .http2_settings(" ")
            .validate(DEFAULT)
            .unwrap();
        assert!(blank.http2.is_none());

        let err = FetchRequest::new("https://example.com")
            .http2_settings("1:65536|0|0|m,a,s")
            .validate(DEFAULT)
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidHttp2Settings(_)));
    }

    #[test]
    fn test_cookie_expiry_text() {
        let param: CookieParam = serde_json::from_str(
            r#"{"name":"a","value":"b","domain":".example.com","path":"/x","expires":"2030-01-01T00:00:00Z","httpOnly":true}"#,
        )
        .unwrap();
        let cookie = param.to_cookie(&Url::parse("https://www.example.com/").unwrap());
        assert_eq!(cookie.domain, "example.com");
        assert_eq!(cookie.path, "/x");
        assert!(cookie.http_only);
        assert_eq!(
            cookie.expires,
            Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
        );
    }
}
