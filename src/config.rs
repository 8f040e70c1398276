//! Engine and server configuration.
//!
//! [`EngineConfig`] is the library-side configuration and has no CLI
//! dependencies. [`ServerArgs`] is the `fastls` binary's command line; every
//! flag can also come from a `FASTLS_*` environment variable.
//!
//! ```rust,ignore
//! use fastls::{EngineConfig, FetchExecutor};
//!
//! let executor = FetchExecutor::new(
//!     EngineConfig::default()
//!         .max_in_flight(64)
//!         .max_redirects(5),
//! );
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

/// Default per-fetch deadline when the request carries none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default redirect hop bound.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;
/// Default response body bound (32 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 32 * 1024 * 1024;

/// Engine-wide settings shared by every fetch.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Maximum redirect hops followed per fetch.
    pub max_redirects: usize,

    /// Maximum concurrent fetches. `None` means unbounded.
    ///
    /// Waiting for a slot counts against the fetch's own deadline.
    pub max_in_flight: Option<usize>,

    /// Maximum decoded-before-decompression response body size.
    pub max_body_size: usize,

    /// Deadline applied when a request carries no timeout.
    pub default_timeout: Duration,

    /// Extra trust anchors (DER or PEM).
    pub root_certificates: Vec<Vec<u8>>,

    /// Verify server certificates. Disable only for testing.
    pub verify_certificates: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_in_flight: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            default_timeout: DEFAULT_TIMEOUT,
            root_certificates: Vec::new(),
            verify_certificates: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the redirect hop bound.
    pub fn max_redirects(mut self, hops: usize) -> Self {
        self.max_redirects = hops;
        self
    }

    /// Bound concurrent fetches.
    pub fn max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = Some(limit);
        self
    }

    /// Set the response body bound.
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    /// Set the deadline used when a request has none.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Add a trust anchor (DER or PEM).
    pub fn add_root_certificate(mut self, cert: Vec<u8>) -> Self {
        self.root_certificates.push(cert);
        self
    }

    /// Skip server certificate verification.
    pub fn danger_accept_invalid_certs(mut self) -> Self {
        self.verify_certificates = false;
        self
    }
}

/// Command line of the `fastls` server binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "fastls", version, about = "Fetch service with TLS fingerprint impersonation")]
pub struct ServerArgs {
    /// HTTP+JSON listen address.
    #[arg(long, env = "FASTLS_HTTP_ADDR", default_value = "0.0.0.0:8800")]
    pub http_addr: SocketAddr,

    /// JSON-RPC listen address.
    #[arg(long, env = "FASTLS_RPC_ADDR", default_value = "0.0.0.0:8801")]
    pub rpc_addr: SocketAddr,

    /// gRPC listen address.
    #[arg(long, env = "FASTLS_GRPC_ADDR", default_value = "0.0.0.0:8802")]
    pub grpc_addr: SocketAddr,

    /// Maximum concurrent fetches (unbounded when unset).
    #[arg(long, env = "FASTLS_MAX_IN_FLIGHT")]
    pub max_in_flight: Option<usize>,

    /// Maximum redirect hops per fetch.
    #[arg(long, env = "FASTLS_MAX_REDIRECTS", default_value_t = DEFAULT_MAX_REDIRECTS)]
    pub max_redirects: usize,

    /// Maximum response body size in bytes.
    #[arg(long, env = "FASTLS_MAX_BODY_SIZE", default_value_t = DEFAULT_MAX_BODY_SIZE)]
    pub max_body_size: usize,

    /// Skip server certificate verification.
    #[arg(long, env = "FASTLS_INSECURE")]
    pub insecure: bool,

    /// Do not start the HTTP+JSON front end.
    #[arg(long)]
    pub disable_http: bool,

    /// Do not start the JSON-RPC front end.
    #[arg(long)]
    pub disable_rpc: bool,

    /// Do not start the gRPC front end.
    #[arg(long)]
    pub disable_grpc: bool,
}

impl ServerArgs {
    /// Engine configuration implied by the flags.
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default()
            .max_redirects(self.max_redirects)
            .max_body_size(self.max_body_size);
        if let Some(limit) = self.max_in_flight {
            config = config.max_in_flight(limit);
        }
        if self.insecure {
            config = config.danger_accept_invalid_certs();
        }
        config
    }
}
