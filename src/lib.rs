//! # fastls
//!
//! Fetch engine with per-request TLS fingerprint impersonation.
//!
//! A fetch names its TLS identity through a registered browser profile
//! (`chrome`, `firefox`, `safari`, ...) or a raw JA3 / JA4R string. The
//! engine resolves it into a BoringSSL configuration that lives only for
//! that fetch, sends the request over HTTP/1.1 or HTTP/2 with the profile's
//! header order, and returns a [`FetchResult`] that never panics or errors
//! across the API boundary.
//!
//! ```rust,ignore
//! use fastls::{EngineConfig, FetchExecutor, FetchRequest};
//!
//! let executor = FetchExecutor::new(EngineConfig::default());
//! let result = executor
//!     .execute(&FetchRequest::new("https://example.com").browser("chrome"))
//!     .await;
//! assert!(result.ok);
//! ```
//!
//! The `fastls` binary serves the same executor over HTTP+JSON, JSON-RPC 2.0
//! and gRPC (see [`server`]).

pub mod client;
pub mod config;
pub mod cookie;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod headers;
pub mod request;
pub mod response;
pub mod server;
pub mod transport;

pub use config::EngineConfig;
pub use cookie::{Cookie, CookieJar};
pub use error::{Error, ErrorKind, Result, ValidationError};
pub use executor::FetchExecutor;
pub use fingerprint::{FingerprintSource, FingerprintSpec, Registry};
pub use request::{CookieParam, FetchRequest};
pub use response::FetchResult;
