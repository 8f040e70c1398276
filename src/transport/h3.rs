//! HTTP/3 over QUIC, used when a JA4R fingerprint carries the `q` marker.
//!
//! QUIC runs its own TLS 1.3 handshake, so the ClientHello comes from
//! rustls rather than BoringSSL. The fingerprint's TLS 1.3 cipher order,
//! group order and signature algorithm order are applied through a
//! reordered crypto provider; extension order is rustls' own.

use std::future::poll_fn;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{Method, Request};
use quinn::crypto::rustls::QuicClientConfig;
use quinn::{Endpoint, VarInt};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};
use crate::fingerprint::grease::is_grease_u16;
use crate::fingerprint::FingerprintSpec;
use crate::response::RawResponse;

const ALPN_H3: &[u8] = b"h3";

/// Same set as the HTTP/2 path; none of these exist in HTTP/3.
const CONNECTION_SPECIFIC: &[&str] = &[
    "connection",
    "host",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
];

/// HTTP/3 client for one fetch.
#[derive(Clone)]
pub struct H3Client {
    spec: FingerprintSpec,
    root_certs: Vec<Vec<u8>>,
    verify: bool,
    max_body_size: usize,
}

impl H3Client {
    pub fn new(spec: FingerprintSpec, max_body_size: usize) -> Self {
        Self {
            spec,
            root_certs: Vec::new(),
            verify: true,
            max_body_size,
        }
    }

    /// Add custom root certificates (DER or PEM).
    pub fn with_root_certificates(mut self, certs: Vec<Vec<u8>>) -> Self {
        self.root_certs = certs;
        self
    }

    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// ring provider with suites and groups in fingerprint order.
    fn crypto_provider(&self) -> Result<CryptoProvider> {
        let mut provider = rustls::crypto::ring::default_provider();

        let mut suites = Vec::new();
        for id in self.spec.cipher_suites.iter().copied().filter(|id| !is_grease_u16(*id)) {
            if id >> 8 != 0x13 {
                trace!(cipher = format_args!("{:#06x}", id), "TLS 1.2 suite not offered over QUIC");
                continue;
            }
            let suite = provider
                .cipher_suites
                .iter()
                .find(|s| u16::from(s.suite()) == id)
                .ok_or_else(|| {
                    Error::tls(format!(
                        "fingerprint cannot be reproduced over QUIC: cipher suite {:#06x}",
                        id
                    ))
                })?;
            suites.push(*suite);
        }
        if suites.is_empty() {
            return Err(Error::tls(
                "fingerprint cannot be reproduced over QUIC: no TLS 1.3 cipher suites",
            ));
        }
        provider.cipher_suites = suites;

        let groups: Vec<_> = self
            .spec
            .supported_groups
            .iter()
            .filter_map(|id| {
                provider
                    .kx_groups
                    .iter()
                    .find(|g| u16::from(g.name()) == *id)
                    .copied()
            })
            .collect();
        if !groups.is_empty() {
            provider.kx_groups = groups;
        }
        Ok(provider)
    }

    fn root_store(&self) -> Result<RootCertStore> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        for bytes in &self.root_certs {
            let certs: Vec<CertificateDer<'static>> = if bytes.starts_with(b"-----BEGIN") {
                CertificateDer::pem_slice_iter(bytes)
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| Error::tls(format!("Failed to parse root certificate: {:?}", e)))?
            } else {
                vec![CertificateDer::from(bytes.clone())]
            };
            for cert in certs {
                roots
                    .add(cert)
                    .map_err(|e| Error::tls(format!("Failed to add root certificate: {}", e)))?;
            }
        }
        Ok(roots)
    }

    fn client_config(&self) -> Result<rustls::ClientConfig> {
        let provider = Arc::new(self.crypto_provider()?);

        let inner: Arc<dyn ServerCertVerifier> = if self.verify {
            WebPkiServerVerifier::builder_with_provider(Arc::new(self.root_store()?), provider.clone())
                .build()
                .map_err(|e| Error::tls(format!("Failed to build certificate verifier: {}", e)))?
        } else {
            Arc::new(AcceptAnyCertificate(provider.signature_verification_algorithms))
        };
        let verifier = Arc::new(OrderedSchemes::new(inner, &self.spec.signature_algorithms));

        let mut config = rustls::ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&[&rustls::version::TLS13])
            .map_err(|e| Error::tls(format!("Failed to configure TLS 1.3: {}", e)))?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_no_client_auth();
        config.alpn_protocols = vec![ALPN_H3.to_vec()];
        config.enable_sni = self.spec.extensions.is_empty() || self.spec.has_extension(0x0000);
        Ok(config)
    }

    /// Open a QUIC connection, send one request and buffer the response.
    pub async fn send_request(
        &self,
        method: &Method,
        url: &Url,
        headers: &[(String, String)],
        body: Option<&Bytes>,
    ) -> Result<RawResponse> {
        let host = url
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
            .ok_or_else(|| Error::connection("Missing host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::connection("Missing port"))?;
        let addr = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| Error::connection(format!("Failed to resolve {}:{}: {}", host, port, e)))?
            .next()
            .ok_or_else(|| Error::connection(format!("No address found for {}:{}", host, port)))?;

        let quic_config = QuicClientConfig::try_from(Arc::new(self.client_config()?))
            .map_err(|e| Error::Quic(format!("Failed to build QUIC config: {}", e)))?;
        let bind: SocketAddr = if addr.is_ipv6() {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        };
        let mut endpoint = Endpoint::client(bind)
            .map_err(|e| Error::Quic(format!("Failed to bind UDP socket: {}", e)))?;
        endpoint.set_default_client_config(quinn::ClientConfig::new(Arc::new(quic_config)));

        let result = self.exchange(&endpoint, addr, host, method, url, headers, body).await;
        endpoint.close(VarInt::from_u32(0), b"");
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn exchange(
        &self,
        endpoint: &Endpoint,
        addr: SocketAddr,
        host: &str,
        method: &Method,
        url: &Url,
        headers: &[(String, String)],
        body: Option<&Bytes>,
    ) -> Result<RawResponse> {
        let connection = endpoint
            .connect(addr, host)
            .map_err(|e| Error::Quic(format!("Failed to start QUIC connection: {}", e)))?
            .await
            .map_err(|e| Error::Quic(format!("QUIC handshake failed: {}", e)))?;
        debug!(%addr, "QUIC handshake complete");

        let (mut driver, mut sender) = h3::client::new(h3_quinn::Connection::new(connection))
            .await
            .map_err(|e| Error::http_protocol(format!("HTTP/3 setup failed: {}", e)))?;
        let drive = tokio::spawn(async move {
            let _ = poll_fn(|cx| driver.poll_close(cx)).await;
        });

        let request = build_request(method, url, headers)?;
        let result = async {
            let mut stream = sender
                .send_request(request)
                .await
                .map_err(|e| Error::http_protocol(format!("HTTP/3 request failed: {}", e)))?;
            if let Some(body) = body.filter(|b| !b.is_empty()) {
                stream
                    .send_data(body.clone())
                    .await
                    .map_err(|e| Error::http_protocol(format!("HTTP/3 body send failed: {}", e)))?;
            }
            stream
                .finish()
                .await
                .map_err(|e| Error::http_protocol(format!("HTTP/3 finish failed: {}", e)))?;

            let response = stream
                .recv_response()
                .await
                .map_err(|e| Error::http_protocol(format!("HTTP/3 response failed: {}", e)))?;

            let mut collected = BytesMut::new();
            while let Some(mut chunk) = stream
                .recv_data()
                .await
                .map_err(|e| Error::http_protocol(format!("HTTP/3 body read failed: {}", e)))?
            {
                if collected.len() + chunk.remaining() > self.max_body_size {
                    return Err(Error::BodyTooLarge {
                        limit: self.max_body_size,
                    });
                }
                collected.extend_from_slice(&chunk.copy_to_bytes(chunk.remaining()));
            }

            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            Ok::<_, Error>(RawResponse::new(
                response.status().as_u16(),
                headers,
                collected.freeze(),
                "HTTP/3",
            ))
        }
        .await;

        drive.abort();
        result
    }
}

fn build_request(method: &Method, url: &Url, headers: &[(String, String)]) -> Result<Request<()>> {
    let mut builder = Request::builder().method(method.clone()).uri(url.as_str());
    for (name, value) in headers {
        let lower = name.to_ascii_lowercase();
        if CONNECTION_SPECIFIC.contains(&lower.as_str())
            || (lower == "te" && !value.eq_ignore_ascii_case("trailers"))
        {
            continue;
        }
        let name = HeaderName::from_bytes(lower.as_bytes())
            .map_err(|e| Error::http_protocol(format!("invalid header name {:?}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::http_protocol(format!("invalid header value for {}: {}", name, e)))?;
        builder = builder.header(name, value);
    }
    builder
        .body(())
        .map_err(|e| Error::http_protocol(format!("invalid HTTP/3 request: {}", e)))
}

/// Offers the fingerprint's signature algorithms, in its order, as far as
/// the provider can verify them.
#[derive(Debug)]
struct OrderedSchemes {
    inner: Arc<dyn ServerCertVerifier>,
    schemes: Vec<SignatureScheme>,
}

impl OrderedSchemes {
    fn new(inner: Arc<dyn ServerCertVerifier>, order: &[u16]) -> Self {
        let supported = inner.supported_verify_schemes();
        let schemes: Vec<SignatureScheme> = order
            .iter()
            .map(|id| SignatureScheme::from(*id))
            .filter(|scheme| supported.contains(scheme))
            .collect();
        Self {
            inner,
            schemes: if schemes.is_empty() { supported } else { schemes },
        }
    }
}

impl ServerCertVerifier for OrderedSchemes {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        self.inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.schemes.clone()
    }
}

/// Skips chain and name checks; handshake signatures are still verified.
#[derive(Debug)]
struct AcceptAnyCertificate(WebPkiSupportedAlgorithms);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.0)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.0)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{resolve, FingerprintSource};

    fn quic_spec(ja4r: &str) -> FingerprintSpec {
        resolve(&FingerprintSource::Ja4r(ja4r.into()), None).unwrap().spec
    }

    #[test]
    fn test_provider_follows_cipher_order() {
        let spec = quic_spec("q13d0310h3_1303,1301,1302_000a,000d,002b_0804,0403");
        let provider = H3Client::new(spec, 1024).crypto_provider().unwrap();
        let suites: Vec<u16> = provider
            .cipher_suites
            .iter()
            .map(|s| u16::from(s.suite()))
            .collect();
        assert_eq!(suites, vec![0x1303, 0x1301, 0x1302]);
        let groups: Vec<u16> = provider.kx_groups.iter().map(|g| u16::from(g.name())).collect();
        assert_eq!(groups, vec![29, 23, 24]);
    }

    #[test]
    fn test_tls12_suites_skipped_and_unknown_tls13_refused() {
        let spec = quic_spec("q13d0310h3_c02b,1302_000a,000d,002b_0403");
        let provider = H3Client::new(spec, 1024).crypto_provider().unwrap();
        assert_eq!(provider.cipher_suites.len(), 1);

        let spec = quic_spec("q13d0310h3_1301,1304_000a,000d,002b_0403");
        let err = H3Client::new(spec, 1024).crypto_provider().unwrap_err();
        assert!(err.to_string().contains("0x1304"));

        let spec = quic_spec("q13d0310h3_c02b_000a,000d,002b_0403");
        assert!(H3Client::new(spec, 1024).crypto_provider().is_err());
    }

    #[test]
    fn test_config_offers_h3_and_signature_order() {
        let spec = quic_spec("q13d0310h3_1301,1302,1303_000a,000d,002b_0804,0403,9999");
        let client = H3Client::new(spec, 1024).with_verification(false);
        let config = client.client_config().unwrap();
        assert_eq!(config.alpn_protocols, vec![b"h3".to_vec()]);

        let provider = rustls::crypto::ring::default_provider();
        let ordered = OrderedSchemes::new(
            Arc::new(AcceptAnyCertificate(provider.signature_verification_algorithms)),
            &[0x0804, 0x0403, 0x9999],
        );
        assert_eq!(
            ordered.supported_verify_schemes(),
            vec![SignatureScheme::RSA_PSS_SHA256, SignatureScheme::ECDSA_NISTP256_SHA256]
        );
    }

    #[test]
    fn test_request_drops_connection_headers() {
        let url = Url::parse("https://example.com/x?y=1").unwrap();
        let headers = vec![
            ("Connection".to_string(), "keep-alive".to_string()),
            ("User-Agent".to_string(), "ua".to_string()),
            ("TE".to_string(), "gzip".to_string()),
        ];
        let request = build_request(&Method::GET, &url, &headers).unwrap();
        assert_eq!(request.uri(), "https://example.com/x?y=1");
        assert_eq!(request.headers().len(), 1);
        assert_eq!(request.headers()["user-agent"], "ua");
    }
}
