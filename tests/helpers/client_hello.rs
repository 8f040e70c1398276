//! Captures the ClientHello a fetch sends, then drops the connection.

use tls_parser::{
    parse_tls_extensions, parse_tls_plaintext, TlsExtension, TlsMessage, TlsMessageHandshake,
};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// SNI (absent for IP hosts), padding (size dependent) and PSK
/// (resumption only) come and go between hellos from the same spec.
const VOLATILE_EXTENSIONS: [u16; 3] = [0, 21, 41];

fn is_grease(value: u16) -> bool {
    (value & 0x0f0f) == 0x0a0a && (value >> 8) == (value & 0xff)
}

#[derive(Debug, Clone, Default)]
pub struct CapturedHello {
    pub ciphers: Vec<u16>,
    /// Extension ids in wire order.
    pub extensions: Vec<u16>,
    pub groups: Vec<u16>,
    pub signature_algorithms: Vec<u16>,
    pub supported_versions: Vec<u16>,
    pub alpn: Vec<String>,
    pub server_name: Option<String>,
}

impl CapturedHello {
    /// Suites in offered order, GREASE removed.
    pub fn cipher_order(&self) -> Vec<u16> {
        without_grease(&self.ciphers)
    }

    /// Extensions in wire order without GREASE and the volatile ones.
    pub fn extension_order(&self) -> Vec<u16> {
        comparable_extensions(&self.extensions)
    }

    pub fn groups_without(&self, skip: &[u16]) -> Vec<u16> {
        self.groups
            .iter()
            .copied()
            .filter(|g| !is_grease(*g) && !skip.contains(g))
            .collect()
    }

    pub fn has_grease(&self) -> bool {
        self.ciphers.iter().any(|c| is_grease(*c)) || self.groups.iter().any(|g| is_grease(*g))
    }

    pub fn has_extension(&self, id: u16) -> bool {
        self.extensions.contains(&id)
    }
}

pub fn without_grease(values: &[u16]) -> Vec<u16> {
    values.iter().copied().filter(|v| !is_grease(*v)).collect()
}

/// An expected extension list in the shape [`CapturedHello::extension_order`]
/// returns.
pub fn comparable_extensions(values: &[u16]) -> Vec<u16> {
    values
        .iter()
        .copied()
        .filter(|v| !is_grease(*v) && !VOLATILE_EXTENSIONS.contains(v))
        .collect()
}

/// Extension type ids of a raw extensions block, in order.
fn extension_ids(mut block: &[u8]) -> Vec<u16> {
    let mut ids = Vec::new();
    while block.len() >= 4 {
        ids.push(u16::from_be_bytes([block[0], block[1]]));
        let len = u16::from_be_bytes([block[2], block[3]]) as usize;
        block = block.get(4 + len..).unwrap_or_default();
    }
    ids
}

/// Parse one TLS record holding a ClientHello.
pub fn parse_client_hello(record: &[u8]) -> Option<CapturedHello> {
    let (_, plaintext) = parse_tls_plaintext(record).ok()?;
    for msg in &plaintext.msg {
        let TlsMessage::Handshake(TlsMessageHandshake::ClientHello(ch)) = msg else {
            continue;
        };
        let mut hello = CapturedHello {
            ciphers: ch.ciphers.iter().map(|c| c.0).collect(),
            ..Default::default()
        };
        if let Some(ext_data) = ch.ext {
            hello.extensions = extension_ids(ext_data);
            let (_, extensions) = parse_tls_extensions(ext_data).ok()?;
            for ext in &extensions {
                match ext {
                    TlsExtension::SNI(names) => {
                        hello.server_name = names
                            .iter()
                            .find_map(|(_, name)| std::str::from_utf8(name).ok())
                            .map(str::to_string);
                    }
                    TlsExtension::EllipticCurves(curves) => {
                        hello.groups = curves.iter().map(|c| c.0).collect();
                    }
                    TlsExtension::SignatureAlgorithms(algs) => {
                        hello.signature_algorithms = algs.to_vec();
                    }
                    TlsExtension::SupportedVersions(versions) => {
                        hello.supported_versions = versions.iter().map(|v| v.0).collect();
                    }
                    TlsExtension::ALPN(protocols) => {
                        hello.alpn = protocols
                            .iter()
                            .filter_map(|p| std::str::from_utf8(p).ok())
                            .map(str::to_string)
                            .collect();
                    }
                    _ => {}
                }
            }
        }
        return Some(hello);
    }
    None
}

/// Listener that records every ClientHello it receives.
pub struct HelloCapture {
    listener: TcpListener,
    port: u16,
}

impl HelloCapture {
    pub async fn new() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    pub fn url(&self) -> String {
        format!("https://127.0.0.1:{}/", self.port)
    }

    pub fn start(self) -> mpsc::UnboundedReceiver<CapturedHello> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = self.listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut header = [0u8; 5];
                    if stream.read_exact(&mut header).await.is_err() {
                        return;
                    }
                    let len = u16::from_be_bytes([header[3], header[4]]) as usize;
                    let mut record = header.to_vec();
                    record.resize(5 + len, 0);
                    if stream.read_exact(&mut record[5..]).await.is_err() {
                        return;
                    }
                    if let Some(hello) = parse_client_hello(&record) {
                        let _ = tx.send(hello);
                    }
                });
            }
        });
        rx
    }
}
