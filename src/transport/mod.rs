//! Wire transports.
//!
//! - TCP, proxy tunnels and BoringSSL handshakes in [`connector`]
//! - HTTP/1.1 written by hand for exact header order
//! - HTTP/2 written by hand when the peer selects `h2`, so SETTINGS order
//!   and pseudo-header order follow the fingerprint
//! - HTTP/3 over QUIC for JA4R fingerprints with the `q` marker

pub mod connector;
pub mod h1;
pub mod h2;
pub mod h3;
pub mod proxy;

pub use connector::{AlpnProtocol, BoringConnector, MaybeHttpsStream};
pub use h1::H1Connection;
pub use h2::H2Connection;
pub use h3::H3Client;
pub use proxy::{ProxyConfig, ProxyScheme};
