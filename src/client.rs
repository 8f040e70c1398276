//! Request-scoped TLS client.
//!
//! [`TlsClientFactory`] turns a resolved [`FingerprintSpec`] into a
//! [`FetchClient`] that owns its own BoringSSL configuration. Nothing is
//! shared between fetches: the client, its connections and its cookie jar
//! live exactly as long as one call to the executor.

use bytes::Bytes;
use http::Method;
use tracing::debug;
use url::Url;

use crate::config::EngineConfig;
use crate::cookie::CookieJar;
use crate::error::{Error, Result};
use crate::fingerprint::{FingerprintSpec, Http2Settings};
use crate::headers::{apply_order, remove_header, with_cookies};
use crate::response::RawResponse;
use crate::transport::{BoringConnector, H1Connection, H2Connection, H3Client, ProxyConfig};

/// Builds one [`FetchClient`] per fetch.
pub struct TlsClientFactory;

impl TlsClientFactory {
    /// Build a client for `spec`.
    ///
    /// An unparsable proxy URL fails here with `ProxyUnreachable`; an
    /// unreachable proxy fails on the first connect. QUIC fingerprints
    /// cannot go through a TCP proxy.
    pub fn build(
        spec: &FingerprintSpec,
        proxy: Option<&str>,
        follow_redirects: bool,
        config: &EngineConfig,
    ) -> Result<FetchClient> {
        let proxy = proxy.map(ProxyConfig::parse).transpose()?;
        if spec.quic && proxy.is_some() {
            return Err(Error::Quic(
                "a QUIC fingerprint cannot be sent through a TCP proxy".to_string(),
            ));
        }
        let h3 = spec.quic.then(|| {
            H3Client::new(spec.clone(), config.max_body_size)
                .with_root_certificates(config.root_certificates.clone())
                .with_verification(config.verify_certificates)
        });
        let connector = BoringConnector::new(spec.clone())
            .with_root_certificates(config.root_certificates.clone())
            .with_verification(config.verify_certificates)
            .with_proxy(proxy);

        Ok(FetchClient {
            connector,
            h3,
            http2: spec.http2.clone(),
            header_order: spec.default_header_order.clone(),
            follow_redirects,
            max_redirects: config.max_redirects,
            max_body_size: config.max_body_size,
        })
    }
}

/// Short-lived client owning one fingerprint configuration.
pub struct FetchClient {
    connector: BoringConnector,
    /// Set for QUIC fingerprints; `https` then goes over HTTP/3.
    h3: Option<H3Client>,
    http2: Http2Settings,
    header_order: Vec<String>,
    follow_redirects: bool,
    max_redirects: usize,
    max_body_size: usize,
}

impl FetchClient {
    pub fn follows_redirects(&self) -> bool {
        self.follow_redirects
    }

    /// Send a request, following redirects when enabled.
    ///
    /// `headers` is the merged list without cookies; the `Cookie` header is
    /// rebuilt from `jar` for every hop and `Set-Cookie` responses are
    /// stored back into it.
    pub async fn send(
        &self,
        method: Method,
        url: Url,
        headers: Vec<(String, String)>,
        body: Option<Bytes>,
        jar: &mut CookieJar,
    ) -> Result<RawResponse> {
        let mut method = method;
        let mut url = url;
        let mut headers = headers;
        let mut body = body;
        let mut hops = 0usize;

        loop {
            let hop_headers = apply_order(
                with_cookies(headers.clone(), jar.build_cookie_header(&url)),
                &self.header_order,
            );
            let response = self
                .round_trip(&method, &url, &hop_headers, body.as_ref())
                .await?;
            jar.store_from_headers(
                response
                    .headers
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.as_str())),
                &url,
            );

            if !self.follow_redirects || !response.is_redirect() {
                return Ok(response);
            }
            let Some(location) = response.redirect_url() else {
                return Ok(response);
            };

            if hops >= self.max_redirects {
                return Err(Error::RedirectLimit { count: hops });
            }
            hops += 1;

            let next = url
                .join(location)
                .map_err(|e| Error::InvalidRedirectUrl(format!("{}: {}", location, e)))?;
            if !matches!(next.scheme(), "http" | "https") {
                return Err(Error::InvalidRedirectUrl(next.to_string()));
            }

            let (next_method, keep_body) = redirect_method(response.status, &method);
            if !keep_body {
                body = None;
                remove_header(&mut headers, "content-length");
                remove_header(&mut headers, "content-type");
                remove_header(&mut headers, "transfer-encoding");
            }
            if !same_origin(&url, &next) {
                remove_header(&mut headers, "authorization");
                remove_header(&mut headers, "www-authenticate");
                remove_header(&mut headers, "cookie");
            }

            debug!(
                status = response.status,
                from = %url,
                to = %next,
                method = %next_method,
                hop = hops,
                "following redirect"
            );
            method = next_method;
            url = next;
        }
    }

    /// One request on a fresh connection. QUIC fingerprints use HTTP/3;
    /// otherwise the negotiated ALPN picks the HTTP version.
    async fn round_trip(
        &self,
        method: &Method,
        url: &Url,
        headers: &[(String, String)],
        body: Option<&Bytes>,
    ) -> Result<RawResponse> {
        if let Some(h3) = self.h3.as_ref().filter(|_| url.scheme() == "https") {
            return h3.send_request(method, url, headers, body).await;
        }
        let stream = self.connector.connect(url).await?;
        if stream.is_h2() {
            let mut conn = H2Connection::handshake(stream, &self.http2, self.max_body_size).await?;
            conn.send_request(method, url, headers, body).await
        } else {
            let mut conn = H1Connection::new(stream, self.max_body_size);
            conn.send_request(method, url, headers, body).await
        }
    }
}

/// Method for the next hop and whether the body is resent.
///
/// 307 and 308 replay the request unchanged. 301, 302 and 303 turn
/// anything but HEAD into a bodiless GET.
fn redirect_method(status: u16, method: &Method) -> (Method, bool) {
    match status {
        307 | 308 => (method.clone(), true),
        _ if *method == Method::HEAD => (Method::HEAD, false),
        _ => (Method::GET, false),
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}
