//! BoringSSL TLS connector configured from a [`FingerprintSpec`].
//!
//! Every fetch builds its own `SslConnector`; nothing TLS-related is shared
//! between fetches. Cipher suites (TLS 1.3 included), groups, signature
//! algorithms and extensions go out in the fingerprint's order; a
//! fingerprint BoringSSL cannot emit as written is refused before any I/O.

use std::io;
use std::io::Read;
use std::os::raw::c_int;
use std::pin::Pin;
use std::task::{Context, Poll};

use boring::ssl::{
    ExtensionType, SslConnector, SslConnectorBuilder, SslMethod, SslOptions, SslRef,
    SslVerifyMode, SslVersion,
};
use boring::x509::X509;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_boring::SslStream;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::fingerprint::grease::{filter_grease_u16, is_grease_u16};
use crate::fingerprint::names::{cipher_name, group_name, name_list, sigalg_name};
use crate::fingerprint::{FingerprintSpec, TlsVersion};
use crate::transport::proxy::ProxyConfig;

use boring_sys::{CRYPTO_BUFFER, SSL};

const EXT_SERVER_NAME: u16 = 0;
const EXT_STATUS_REQUEST: u16 = 5;
const EXT_SUPPORTED_GROUPS: u16 = 10;
const EXT_EC_POINT_FORMATS: u16 = 11;
const EXT_SIGNATURE_ALGORITHMS: u16 = 13;
const EXT_ALPN: u16 = 16;
const EXT_SCT: u16 = 18;
const EXT_PADDING: u16 = 21;
const EXT_EXTENDED_MASTER_SECRET: u16 = 23;
const EXT_COMPRESS_CERTIFICATE: u16 = 27;
const EXT_RECORD_SIZE_LIMIT: u16 = 28;
const EXT_DELEGATED_CREDENTIALS: u16 = 34;
const EXT_SESSION_TICKET: u16 = 35;
const EXT_PRE_SHARED_KEY: u16 = 41;
const EXT_SUPPORTED_VERSIONS: u16 = 43;
const EXT_PSK_KEY_EXCHANGE_MODES: u16 = 45;
const EXT_KEY_SHARE: u16 = 51;
const EXT_ALPS: u16 = 17513;
const EXT_ALPS_NEW: u16 = 17613;
const EXT_ECH: u16 = 65037;
const EXT_RENEGOTIATION_INFO: u16 = 65281;

/// Every extension BoringSSL can place in a ClientHello.
const REPRODUCIBLE_EXTENSIONS: [u16; 21] = [
    EXT_SERVER_NAME,
    EXT_STATUS_REQUEST,
    EXT_SUPPORTED_GROUPS,
    EXT_EC_POINT_FORMATS,
    EXT_SIGNATURE_ALGORITHMS,
    EXT_ALPN,
    EXT_SCT,
    EXT_PADDING,
    EXT_EXTENDED_MASTER_SECRET,
    EXT_COMPRESS_CERTIFICATE,
    EXT_RECORD_SIZE_LIMIT,
    EXT_DELEGATED_CREDENTIALS,
    EXT_SESSION_TICKET,
    EXT_PRE_SHARED_KEY,
    EXT_SUPPORTED_VERSIONS,
    EXT_PSK_KEY_EXCHANGE_MODES,
    EXT_KEY_SHARE,
    EXT_ALPS,
    EXT_ALPS_NEW,
    EXT_ECH,
    EXT_RENEGOTIATION_INFO,
];

/// Positioned by BoringSSL itself (padding before PSK, PSK last) and only
/// present on some hellos, so they stay out of the permutation.
const FLOATING_EXTENSIONS: [u16; 2] = [EXT_PADDING, EXT_PRE_SHARED_KEY];

/// Sent only when TLS 1.2 or lower is allowed.
const PRE_TLS13_EXTENSIONS: [u16; 4] = [
    EXT_EC_POINT_FORMATS,
    EXT_EXTENDED_MASTER_SECRET,
    EXT_SESSION_TICKET,
    EXT_RENEGOTIATION_INFO,
];

/// Sent only when TLS 1.3 is allowed.
const TLS13_EXTENSIONS: [u16; 4] = [
    EXT_SUPPORTED_VERSIONS,
    EXT_PSK_KEY_EXCHANGE_MODES,
    EXT_KEY_SHARE,
    EXT_PRE_SHARED_KEY,
];

/// Firefox's record_size_limit value.
const RECORD_SIZE_LIMIT: u16 = 0x4001;

const DELEGATED_CREDENTIALS: &str =
    "ecdsa_secp256r1_sha256:ecdsa_secp384r1_sha384:ecdsa_secp521r1_sha512:ecdsa_sha1";

/// Brotli certificate decompression callback for BoringSSL.
///
/// Called when the server sends a Brotli-compressed certificate (RFC 8879).
unsafe extern "C" fn decompress_brotli_cert(
    _ssl: *mut SSL,
    out: *mut *mut CRYPTO_BUFFER,
    uncompressed_len: usize,
    in_: *const u8,
    in_len: usize,
) -> c_int {
    let compressed = std::slice::from_raw_parts(in_, in_len);

    let mut decompressed = Vec::with_capacity(uncompressed_len);
    let mut decoder = brotli::Decompressor::new(compressed, uncompressed_len.max(1));
    match decoder.read_to_end(&mut decompressed) {
        Ok(_) if decompressed.len() == uncompressed_len => {
            // CRYPTO_BUFFER_new copies the data; pool may be null for one-off buffers.
            let buffer = boring_sys::CRYPTO_BUFFER_new(
                decompressed.as_ptr(),
                decompressed.len(),
                std::ptr::null_mut(),
            );
            if buffer.is_null() {
                return 0;
            }
            *out = buffer;
            1
        }
        _ => 0,
    }
}

/// Raw `SSL*` behind a `&mut SslRef`.
fn ssl_ptr(ssl: &mut SslRef) -> *mut SSL {
    // SslRef is an opaque view over the SSL object itself.
    ssl as *mut SslRef as *mut SSL
}

fn ssl_version(version: TlsVersion) -> SslVersion {
    match version {
        TlsVersion::Tls10 => SslVersion::TLS1,
        TlsVersion::Tls11 => SslVersion::TLS1_1,
        TlsVersion::Tls12 => SslVersion::TLS1_2,
        TlsVersion::Tls13 => SslVersion::TLS1_3,
    }
}

/// ALPN protocol list in wire format (length-prefixed strings).
fn alpn_wire(protocols: &[String]) -> Vec<u8> {
    let mut wire = Vec::new();
    for proto in protocols.iter().filter(|p| !p.is_empty() && p.len() <= 255) {
        wire.push(proto.len() as u8);
        wire.extend_from_slice(proto.as_bytes());
    }
    wire
}

fn unreproducible(reason: impl std::fmt::Display) -> Error {
    Error::tls(format!("fingerprint cannot be reproduced: {}", reason))
}

/// Extensions BoringSSL sends on every hello within the fingerprint's version
/// bounds, whether asked to or not.
fn implied_extensions(spec: &FingerprintSpec) -> Vec<u16> {
    let mut implied = vec![EXT_SUPPORTED_GROUPS];
    if spec.min_version < TlsVersion::Tls13 {
        implied.extend([EXT_EC_POINT_FORMATS, EXT_EXTENDED_MASTER_SECRET, EXT_RENEGOTIATION_INFO]);
    }
    if spec.max_version >= TlsVersion::Tls12 {
        implied.push(EXT_SIGNATURE_ALGORITHMS);
    }
    if spec.max_version == TlsVersion::Tls13 {
        implied.extend([EXT_SUPPORTED_VERSIONS, EXT_PSK_KEY_EXCHANGE_MODES, EXT_KEY_SHARE]);
    }
    implied
}

/// Reject a spec whose ClientHello BoringSSL cannot emit as written: every
/// cipher, group and signature algorithm must have a BoringSSL name, and the
/// extension set must be exactly what the configured switches produce.
pub fn check_reproducible(spec: &FingerprintSpec) -> Result<()> {
    if spec.is_native() {
        return Ok(());
    }

    let lists: [(&[u16], fn(u16) -> Option<&'static str>, &str); 3] = [
        (&spec.cipher_suites, cipher_name, "cipher suite"),
        (&spec.supported_groups, group_name, "supported group"),
        (&spec.signature_algorithms, sigalg_name, "signature algorithm"),
    ];
    for (ids, lookup, what) in lists {
        if let Some(id) = ids
            .iter()
            .copied()
            .find(|id| !is_grease_u16(*id) && lookup(*id).is_none())
        {
            return Err(unreproducible(format_args!("unsupported {} 0x{:04x}", what, id)));
        }
    }
    if let Some(format) = spec.ec_point_formats.iter().find(|f| **f != 0) {
        return Err(unreproducible(format_args!("unsupported EC point format {}", format)));
    }

    let extensions = filter_grease_u16(&spec.extensions);
    if let Some(id) = extensions
        .iter()
        .find(|id| !REPRODUCIBLE_EXTENSIONS.contains(id))
    {
        return Err(unreproducible(format_args!("unsupported extension {}", id)));
    }
    if let Some(id) = implied_extensions(spec)
        .into_iter()
        .find(|id| !extensions.contains(id))
    {
        return Err(unreproducible(format_args!(
            "extension {} is always sent for this version range",
            id
        )));
    }
    if spec.min_version == TlsVersion::Tls13 {
        if let Some(id) = extensions.iter().find(|id| PRE_TLS13_EXTENSIONS.contains(id)) {
            return Err(unreproducible(format_args!("extension {} needs TLS 1.2", id)));
        }
    }
    if spec.max_version < TlsVersion::Tls13 {
        if let Some(id) = extensions
            .iter()
            .find(|id| TLS13_EXTENSIONS.contains(id) || **id == EXT_ECH)
        {
            return Err(unreproducible(format_args!("extension {} needs TLS 1.3", id)));
        }
    }
    if extensions.contains(&EXT_ALPN) == spec.alpn.is_empty() {
        return Err(unreproducible("ALPN extension and protocol list disagree"));
    }
    let alps = extensions.contains(&EXT_ALPS) || extensions.contains(&EXT_ALPS_NEW);
    if extensions.contains(&EXT_ALPS) && extensions.contains(&EXT_ALPS_NEW) {
        return Err(unreproducible("both application settings codepoints"));
    }
    if alps && !spec.alpn.iter().any(|p| p == "h2") {
        return Err(unreproducible("application settings without h2 in ALPN"));
    }
    Ok(())
}

/// Extension order handed to BoringSSL.
fn extension_permutation(spec: &FingerprintSpec) -> Vec<u16> {
    filter_grease_u16(&spec.extensions)
        .into_iter()
        .filter(|id| !FLOATING_EXTENSIONS.contains(id))
        .collect()
}

/// BoringSSL-based connector for one fetch.
#[derive(Clone)]
pub struct BoringConnector {
    spec: FingerprintSpec,
    root_certs: Vec<Vec<u8>>,
    verify: bool,
    proxy: Option<ProxyConfig>,
}

impl BoringConnector {
    pub fn new(spec: FingerprintSpec) -> Self {
        Self {
            spec,
            root_certs: Vec::new(),
            verify: true,
            proxy: None,
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

    pub fn with_proxy(mut self, proxy: Option<ProxyConfig>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn spec(&self) -> &FingerprintSpec {
        &self.spec
    }

    fn configure_ssl(&self) -> Result<SslConnector> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(|e| Error::tls(format!("Failed to create SSL connector: {}", e)))?;

        for cert_bytes in &self.root_certs {
            let cert = X509::from_der(cert_bytes).or_else(|_| X509::from_pem(cert_bytes));
            match cert {
                Ok(cert) => {
                    if let Err(e) = builder.cert_store_mut().add_cert(cert) {
                        warn!(error = %e, "failed to add root certificate");
                    }
                }
                Err(e) => warn!(error = %e, "ignoring unparsable root certificate"),
            }
        }
        if !self.verify {
            builder.set_verify(SslVerifyMode::NONE);
        }

        let spec = &self.spec;
        builder
            .set_min_proto_version(Some(ssl_version(spec.min_version)))
            .map_err(|e| Error::tls(format!("Failed to set min TLS version: {}", e)))?;
        builder
            .set_max_proto_version(Some(ssl_version(spec.max_version)))
            .map_err(|e| Error::tls(format!("Failed to set max TLS version: {}", e)))?;

        if !spec.alpn.is_empty() {
            builder
                .set_alpn_protos(&alpn_wire(&spec.alpn))
                .map_err(|e| Error::tls(format!("Failed to set ALPN: {}", e)))?;
        }

        if spec.is_native() {
            return Ok(builder.build());
        }
        check_reproducible(spec)?;

        // TLS 1.3 suites sit in the same list, in the fingerprint's order.
        builder.set_preserve_tls13_cipher_list(true);
        builder
            .set_cipher_list(&name_list(&spec.cipher_suites, cipher_name))
            .map_err(|e| Error::tls(format!("Failed to set cipher list: {}", e)))?;

        let groups = name_list(&spec.supported_groups, group_name);
        if !groups.is_empty() {
            builder
                .set_curves_list(&groups)
                .map_err(|e| Error::tls(format!("Failed to set curves {:?}: {}", groups, e)))?;
        }

        let sigalgs = name_list(&spec.signature_algorithms, sigalg_name);
        if !sigalgs.is_empty() {
            builder
                .set_sigalgs_list(&sigalgs)
                .map_err(|e| Error::tls(format!("Failed to set signature algorithms: {}", e)))?;
        }

        self.configure_extensions(&mut builder)?;

        builder.set_grease_enabled(spec.grease);
        builder.set_permute_extensions(false);
        let permutation: Vec<ExtensionType> = extension_permutation(spec)
            .into_iter()
            .map(ExtensionType::from)
            .collect();
        builder
            .set_extension_permutation(&permutation)
            .map_err(|e| Error::tls(format!("Failed to set extension order: {}", e)))?;

        Ok(builder.build())
    }

    /// Turn on the extensions that BoringSSL only sends when asked.
    fn configure_extensions(&self, builder: &mut SslConnectorBuilder) -> Result<()> {
        let spec = &self.spec;

        if spec.has_extension(EXT_STATUS_REQUEST) {
            builder.enable_ocsp_stapling();
        }
        if spec.has_extension(EXT_SCT) {
            builder.enable_signed_cert_timestamps();
        }
        if !spec.has_extension(EXT_SESSION_TICKET) {
            builder.set_options(SslOptions::NO_TICKET);
        }
        if spec.has_extension(EXT_RECORD_SIZE_LIMIT) {
            builder.set_record_size_limit(RECORD_SIZE_LIMIT);
        }
        if spec.has_extension(EXT_DELEGATED_CREDENTIALS) {
            builder
                .set_delegated_credentials(DELEGATED_CREDENTIALS)
                .map_err(|e| Error::tls(format!("Failed to set delegated credentials: {}", e)))?;
        }
        if spec.has_extension(EXT_COMPRESS_CERTIFICATE) {
            let rc = unsafe {
                boring_sys::SSL_CTX_add_cert_compression_alg(
                    builder.as_ptr(),
                    boring_sys::TLSEXT_cert_compression_brotli as u16,
                    None,
                    Some(decompress_brotli_cert),
                )
            };
            if rc != 1 {
                return Err(Error::tls("Failed to enable certificate compression"));
            }
        }
        Ok(())
    }

    /// Per-connection settings that BoringSSL only exposes on the `SSL`.
    fn configure_connection(&self, ssl: &mut SslRef) -> Result<()> {
        let spec = &self.spec;
        if spec.is_native() {
            return Ok(());
        }

        let wants_alps = spec.has_extension(EXT_ALPS) || spec.has_extension(EXT_ALPS_NEW);
        if spec.has_extension(EXT_ALPS_NEW) {
            unsafe {
                boring_sys::SSL_set_alps_use_new_codepoint(ssl_ptr(ssl), 1);
            }
        }
        if wants_alps {
            for proto in spec.alpn.iter().filter(|p| p.as_str() == "h2") {
                let rc = unsafe {
                    boring_sys::SSL_add_application_settings(
                        ssl_ptr(ssl),
                        proto.as_ptr(),
                        proto.len(),
                        std::ptr::null(),
                        0,
                    )
                };
                if rc != 1 {
                    return Err(Error::tls("Failed to enable application settings"));
                }
            }
        }

        if spec.has_extension(EXT_ECH) {
            unsafe {
                boring_sys::SSL_set_enable_ech_grease(ssl_ptr(ssl), 1);
            }
        }
        Ok(())
    }

    /// Open a TCP (or proxy) connection and, for `https`, run the handshake.
    pub async fn connect(&self, url: &Url) -> Result<MaybeHttpsStream> {
        let host = url
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
            .ok_or_else(|| Error::connection("Missing host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::connection("Missing port"))?;

        let https = url.scheme() == "https";
        if https {
            check_reproducible(&self.spec)?;
        }

        let tcp_stream = match &self.proxy {
            Some(proxy) => proxy.connect(host, port).await?,
            None => TcpStream::connect((host, port)).await.map_err(|e| {
                Error::connection(format!("Failed to connect to {}:{}: {}", host, port, e))
            })?,
        };
        let _ = tcp_stream.set_nodelay(true);

        if !https {
            return Ok(MaybeHttpsStream::Http(tcp_stream));
        }

        let ssl_connector = self.configure_ssl()?;
        let mut ssl_config = ssl_connector
            .configure()
            .map_err(|e| Error::tls(format!("Failed to configure SSL: {}", e)))?;
        if !self.verify {
            ssl_config.set_verify_hostname(false);
        }
        if !self.spec.is_native() && !self.spec.has_extension(EXT_SERVER_NAME) {
            ssl_config.set_use_server_name_indication(false);
        }
        self.configure_connection(&mut ssl_config)?;

        let ssl_stream = tokio_boring::connect(ssl_config, host, tcp_stream)
            .await
            .map_err(|e| Error::tls(format!("TLS handshake failed: {}", e)))?;

        debug!(
            host,
            version = ssl_stream.ssl().version_str(),
            cipher = ssl_stream.ssl().current_cipher().map(|c| c.name()).unwrap_or("none"),
            "TLS handshake complete"
        );
        Ok(MaybeHttpsStream::Https(ssl_stream))
    }
}

/// Negotiated ALPN protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlpnProtocol {
    H2,
    Http1,
    /// No ALPN negotiated or unknown protocol
    Unknown,
}

impl AlpnProtocol {
    pub fn is_h2(&self) -> bool {
        matches!(self, Self::H2)
    }
}

/// Stream that can be either HTTP (plain TCP) or HTTPS (TLS).
#[derive(Debug)]
pub enum MaybeHttpsStream {
    Http(TcpStream),
    Https(SslStream<TcpStream>),
}

impl MaybeHttpsStream {
    /// Protocol selected during the handshake; `Unknown` for plain TCP.
    pub fn alpn_protocol(&self) -> AlpnProtocol {
        match self {
            MaybeHttpsStream::Http(_) => AlpnProtocol::Unknown,
            MaybeHttpsStream::Https(stream) => match stream.ssl().selected_alpn_protocol() {
                Some(b"h2") => AlpnProtocol::H2,
                Some(b"http/1.1") => AlpnProtocol::Http1,
                _ => AlpnProtocol::Unknown,
            },
        }
    }

    pub fn is_h2(&self) -> bool {
        self.alpn_protocol().is_h2()
    }
}

impl AsyncRead for MaybeHttpsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_read(cx, buf),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeHttpsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_write(cx, buf),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_flush(cx),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_shutdown(cx),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{resolve, FingerprintSource, Registry};

    #[test]
    fn test_alpn_wire_format() {
        let wire = alpn_wire(&["h2".to_string(), "http/1.1".to_string()]);
        assert_eq!(wire, b"\x02h2\x08http/1.1");
        assert!(alpn_wire(&[]).is_empty());
    }

    fn spec_for(source: FingerprintSource) -> FingerprintSpec {
        resolve(&source, None).unwrap().spec
    }

    fn ja3_spec(ja3: &str) -> FingerprintSpec {
        spec_for(FingerprintSource::Ja3(ja3.into()))
    }

    #[test]
    fn test_builds_for_every_profile() {
        for name in Registry::builtin().names() {
            let spec = spec_for(FingerprintSource::Browser(name.into()));
            check_reproducible(&spec).unwrap_or_else(|e| panic!("{}: {}", name, e));
            BoringConnector::new(spec)
                .configure_ssl()
                .unwrap_or_else(|e| panic!("{}: {}", name, e));
        }
    }

    #[test]
    fn test_builds_native_and_raw() {
        BoringConnector::new(FingerprintSpec::native())
            .configure_ssl()
            .unwrap();
        let spec = ja3_spec("771,4865-4866-49195-49199-156,0-10-11-13-16-23-43-45-51-65281,29-23,0");
        BoringConnector::new(spec)
            .with_verification(false)
            .configure_ssl()
            .unwrap();
    }

    #[test]
    fn test_permutation_keeps_spec_order() {
        let chrome = spec_for(FingerprintSource::Browser("chrome142".into()));
        assert_eq!(
            extension_permutation(&chrome),
            vec![65281, 27, 51, 13, 0, 11, 10, 5, 18, 35, 43, 45, 17613, 23, 65037, 16]
        );

        let greased = ja3_spec("771,4865,2570-0-10-11-13-21-23-43-45-51-65281-41,29,0");
        assert_eq!(
            extension_permutation(&greased),
            vec![0, 10, 11, 13, 23, 43, 45, 51, 65281]
        );
    }

    #[test]
    fn test_unreproducible_specs_rejected() {
        let cases = [
            // encrypt_then_mac has no BoringSSL switch
            ("771,4865,0-10-11-13-22-23-43-45-51-65281,29,0", "unsupported extension 22"),
            // TLS_EMPTY_RENEGOTIATION_INFO_SCSV
            ("771,4865-255,0-10-11-13-23-43-45-51-65281,29,0", "cipher suite 0x00ff"),
            // sect571r1
            ("771,4865,0-10-11-13-23-43-45-51-65281,14,0", "supported group 0x000e"),
            ("771,4865,0-10-11-13-23-43-45-51-65281,29,0-1", "EC point format 1"),
            // psk_key_exchange_modes always goes with TLS 1.3
            ("771,4865,0-10-11-13-23-43-51-65281,29,0", "extension 45 is always sent"),
            ("771,49195,0-10-11-13-23,29,0", "extension 65281 is always sent"),
            ("771,4865,0-10-11-13-17513-23-43-45-51-65281,29,0", "application settings without h2"),
        ];
        for (ja3, expected) in cases {
            let err = check_reproducible(&ja3_spec(ja3)).unwrap_err();
            assert!(matches!(err, Error::Tls(_)), "{}", ja3);
            assert_eq!(err.kind(), crate::error::ErrorKind::Connect);
            assert!(err.to_string().contains("cannot be reproduced"), "{}", err);
            assert!(err.to_string().contains(expected), "{}: {}", ja3, err);
        }
    }

    #[test]
    fn test_unreproducible_fails_before_io() {
        let spec = ja3_spec("771,4865,0-10-11-13-22-23-43-45-51-65281,29,0");
        let err = BoringConnector::new(spec).configure_ssl().err().unwrap();
        assert!(err.to_string().contains("unsupported extension 22"));
    }

    #[test]
    fn test_unsupported_sigalg_rejected() {
        let mut spec = ja3_spec("771,4865,0-10-11-13-23-43-45-51-65281,29,0");
        spec.signature_algorithms.push(0x0303);
        let err = check_reproducible(&spec).unwrap_err();
        assert!(err.to_string().contains("signature algorithm 0x0303"));
    }
}
