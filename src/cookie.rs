//! RFC 6265 cookie handling for a single fetch.
//!
//! Every fetch owns one [`CookieJar`]: it is seeded from the request's
//! cookies, receives `Set-Cookie` values from each redirect hop and is
//! dropped with the fetch. Nothing is shared between fetches.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use url::Url;

/// RFC 6265 cookie representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub expires: Option<DateTime<Utc>>,
    /// Set when the cookie came without a `Domain` attribute; only the exact
    /// host then matches.
    pub host_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: normalize_domain(&domain.into()),
            path: "/".to_string(),
            secure: false,
            http_only: false,
            expires: None,
            host_only: false,
        }
    }

    /// Parse a `Set-Cookie` value received from `request_url`.
    ///
    /// Returns `None` for values without a name, which user agents ignore.
    pub fn from_set_cookie_header(header: &str, request_url: &Url) -> Option<Self> {
        let request_domain = request_url.host_str()?;

        let mut parts = header.split(';').map(str::trim);
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie::new(name, value.trim(), request_domain);
        cookie.host_only = true;
        cookie.path = default_path(request_url);

        let mut max_age = None;
        for attr in parts {
            let attr_lower = attr.to_ascii_lowercase();
            if attr_lower == "secure" {
                cookie.secure = true;
            } else if attr_lower == "httponly" {
                cookie.http_only = true;
            } else if let Some((key, val)) = attr.split_once('=') {
                let val = val.trim();
                match key.trim().to_ascii_lowercase().as_str() {
                    "domain" if !val.is_empty() => {
                        cookie.domain = normalize_domain(val);
                        cookie.host_only = false;
                    }
                    "path" if val.starts_with('/') => cookie.path = val.to_string(),
                    "expires" => cookie.expires = parse_cookie_date(val),
                    "max-age" => max_age = val.parse::<i64>().ok(),
                    _ => {}
                }
            }
        }

        // Max-Age wins over Expires.
        if let Some(seconds) = max_age {
            cookie.expires = Some(if seconds <= 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                Utc::now() + chrono::Duration::seconds(seconds)
            });
        }

        Some(cookie)
    }

    pub fn is_expired(&self) -> bool {
        self.expires.map(|at| at <= Utc::now()).unwrap_or(false)
    }

    /// Domain, path, secure and expiry checks against a request URL.
    pub fn matches_url(&self, url: &Url) -> bool {
        let request_domain = match url.host_str() {
            Some(h) => h.to_ascii_lowercase(),
            None => return false,
        };

        if self.secure && url.scheme() != "https" {
            return false;
        }
        if self.is_expired() {
            return false;
        }

        let domain_match = request_domain == self.domain
            || (!self.host_only && request_domain.ends_with(&format!(".{}", self.domain)));
        if !domain_match {
            return false;
        }

        let request_path = url.path();
        request_path == self.path
            || request_path.starts_with(&format!("{}/", self.path.trim_end_matches('/')))
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Insertion-ordered cookie store scoped to one fetch.
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a cookie, replacing one with the same name, domain and path.
    ///
    /// An already expired cookie removes its stored counterpart.
    pub fn store(&mut self, cookie: Cookie) {
        let existing = self.cookies.iter().position(|c| {
            c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path
        });
        match (existing, cookie.is_expired()) {
            (Some(idx), true) => {
                self.cookies.remove(idx);
            }
            (Some(idx), false) => self.cookies[idx] = cookie,
            (None, true) => {}
            (None, false) => self.cookies.push(cookie),
        }
    }

    pub fn cookies_for_url(&self, url: &Url) -> Vec<&Cookie> {
        self.cookies.iter().filter(|c| c.matches_url(url)).collect()
    }

    /// `Cookie` header value for a request to `url`, if any cookie applies.
    pub fn build_cookie_header(&self, url: &Url) -> Option<String> {
        let cookies = self.cookies_for_url(url);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Store every `Set-Cookie` value in a response.
    pub fn store_from_headers<'a>(
        &mut self,
        headers: impl IntoIterator<Item = (&'a str, &'a str)>,
        request_url: &Url,
    ) {
        for (name, value) in headers {
            if name.eq_ignore_ascii_case("set-cookie") {
                if let Some(cookie) = Cookie::from_set_cookie_header(value, request_url) {
                    self.store(cookie);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.strip_prefix('.').unwrap_or(domain).to_ascii_lowercase()
}

/// RFC 6265 5.1.4 default-path.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

pub(crate) fn parse_cookie_date(date_str: &str) -> Option<DateTime<Utc>> {
    for fmt in [
        "%a, %d %b %Y %H:%M:%S GMT",
        "%a, %d-%b-%Y %H:%M:%S GMT",
        "%a, %d-%b-%y %H:%M:%S GMT",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(date_str, fmt) {
            return Some(dt.and_utc());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
        return Some(dt.with_timezone(&Utc));
    }
    date_str
        .parse::<i64>()
        .ok()
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}
