//! Network front ends.
//!
//! Three adapters expose the same [`FetchExecutor`]: HTTP+JSON, JSON-RPC 2.0
//! and gRPC. Each translates its wire shape into a [`FetchRequest`] and the
//! canonical [`FetchResult`] back, through the [`Adapter`] trait; none of
//! them carries fetch logic of its own.

pub mod grpc;
pub mod http;
pub mod jsonrpc;

use std::io;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::info;

use crate::config::ServerArgs;
use crate::executor::FetchExecutor;
use crate::request::FetchRequest;
use crate::response::FetchResult;

pub use self::grpc::GrpcServer;
pub use self::http::HttpServer;
pub use self::jsonrpc::RpcServer;

/// Wire <-> canonical translation for one front end.
pub trait Adapter {
    /// Inbound wire representation of a fetch.
    type Wire;
    /// Outbound wire representation of a result.
    type Reply;

    fn decode(&self, wire: Self::Wire) -> Result<FetchRequest, DecodeError>;

    fn encode(&self, result: &FetchResult) -> Self::Reply;
}

/// The wire payload could not be turned into a [`FetchRequest`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DecodeError(pub String);

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}

/// Failures that stop a front end.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("listener error: {0}")]
    Io(#[from] io::Error),

    #[error("gRPC transport error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Body of every health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

/// Liveness only; never touches the executor.
pub fn health() -> HealthStatus {
    HealthStatus { status: "ok" }
}

/// Permissive CORS headers set on every HTTP and JSON-RPC response.
const CORS_HEADERS: &[(&str, &str)] = &[
    ("access-control-allow-origin", "*"),
    ("access-control-allow-credentials", "true"),
    (
        "access-control-allow-headers",
        "Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, Authorization, accept, origin, Cache-Control, X-Requested-With",
    ),
    ("access-control-allow-methods", "POST, OPTIONS, GET, PUT, DELETE"),
];

/// JSON response with CORS headers.
pub(crate) fn json_response(status: StatusCode, body: &impl Serialize) -> Response<Full<Bytes>> {
    let (status, payload) = match serde_json::to_vec(body) {
        Ok(payload) => (status, payload),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{{\"error\":{:?}}}", e.to_string()).into_bytes(),
        ),
    };
    let mut response = with_cors(Response::new(Full::new(Bytes::from(payload))));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
    response
}

/// Empty 204 answering a CORS preflight.
pub(crate) fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = with_cors(Response::new(Full::new(Bytes::new())));
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

fn with_cors(mut response: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    let headers = response.headers_mut();
    for (name, value) in CORS_HEADERS {
        headers.insert(*name, HeaderValue::from_static(*value));
    }
    response
}

/// Start every enabled front end and run until one of them fails.
pub async fn run(args: &ServerArgs, executor: FetchExecutor) -> Result<(), ServerError> {
    let mut tasks = tokio::task::JoinSet::new();

    if !args.disable_http {
        let server = HttpServer::new(args.http_addr, executor.clone());
        tasks.spawn(async move { server.run().await });
    }
    if !args.disable_rpc {
        let server = RpcServer::new(args.rpc_addr, executor.clone());
        tasks.spawn(async move { server.run().await });
    }
    if !args.disable_grpc {
        let server = GrpcServer::new(args.grpc_addr, executor.clone());
        tasks.spawn(async move { server.run().await });
    }

    if tasks.is_empty() {
        info!("all front ends disabled, nothing to serve");
        return Ok(());
    }

    while let Some(joined) = tasks.join_next().await {
        joined??;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_health_body() {
        assert_eq!(serde_json::to_string(&health()).unwrap(), r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn test_json_response_has_cors() {
        let response = json_response(StatusCode::BAD_REQUEST, &health());
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"status":"ok"}"#);
    }

    #[test]
    fn test_preflight() {
        let response = preflight_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()["access-control-allow-methods"],
            "POST, OPTIONS, GET, PUT, DELETE"
        );
    }
}
