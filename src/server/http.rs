//! HTTP+JSON front end: `POST /fetch` and `GET /health`.

use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, info};

use super::{health, json_response, preflight_response, Adapter, DecodeError, ServerError};
use crate::executor::FetchExecutor;
use crate::request::FetchRequest;
use crate::response::FetchResult;

/// Largest request document accepted on the JSON wires.
pub(crate) const MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;

/// JSON body <-> canonical model.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpAdapter;

impl Adapter for HttpAdapter {
    type Wire = Bytes;
    type Reply = Response<Full<Bytes>>;

    fn decode(&self, wire: Bytes) -> Result<FetchRequest, DecodeError> {
        Ok(serde_json::from_slice(&wire)?)
    }

    /// Validation failures are 400; every other outcome is 200 with the
    /// result document.
    fn encode(&self, result: &FetchResult) -> Response<Full<Bytes>> {
        let status = if result.is_validation_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::OK
        };
        json_response(status, &result.to_json())
    }
}

#[derive(Serialize)]
struct MalformedBody {
    ok: bool,
    status: u16,
    error: String,
}

#[derive(Serialize)]
struct NotFound {
    error: &'static str,
}

pub struct HttpServer {
    addr: SocketAddr,
    executor: FetchExecutor,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, executor: FetchExecutor) -> Self {
        Self { addr, executor }
    }

    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        info!(
            "fastls HTTP API listening on http://{}",
            listener.local_addr()?
        );

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let executor = self.executor.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let executor = executor.clone();
                    async move { route(req, executor).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("HTTP API connection error: {}", e);
                }
            });
        }
    }
}

async fn route(
    req: Request<Incoming>,
    executor: FetchExecutor,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.method() == Method::OPTIONS {
        return Ok(preflight_response());
    }
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => json_response(StatusCode::OK, &health()),
        (&Method::POST, "/fetch") => fetch(req, &executor).await,
        _ => json_response(StatusCode::NOT_FOUND, &NotFound { error: "not found" }),
    };
    Ok(response)
}

async fn fetch(req: Request<Incoming>, executor: &FetchExecutor) -> Response<Full<Bytes>> {
    let adapter = HttpAdapter;
    let decoded = match read_body(req.into_body()).await {
        Ok(body) => adapter.decode(body),
        Err(e) => Err(e),
    };
    match decoded {
        Ok(request) => adapter.encode(&executor.execute(&request).await),
        Err(e) => json_response(
            StatusCode::BAD_REQUEST,
            &MalformedBody {
                ok: false,
                status: 0,
                error: e.to_string(),
            },
        ),
    }
}

pub(crate) async fn read_body(body: Incoming) -> Result<Bytes, DecodeError> {
    Limited::new(body, MAX_REQUEST_BYTES)
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| DecodeError(format!("failed to read request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ValidationError};

    #[test]
    fn test_decode_request_document() {
        let body = Bytes::from_static(
            br#"{"url":"https://example.com","method":"POST","headers":{"B":"1","A":"2"},"body":"{\"key\":\"value\"}","disableRedirect":true,"http2Settings":"1:65536|0|0|m,p,a,s"}"#,
        );
        let request = HttpAdapter.decode(body).unwrap();
        assert_eq!(request.http2_settings.as_deref(), Some("1:65536|0|0|m,p,a,s"));
        assert_eq!(request.url, "https://example.com");
        assert_eq!(request.method.as_deref(), Some("POST"));
        assert_eq!(
            request.headers.iter().collect::<Vec<_>>(),
            vec![("B", "1"), ("A", "2")]
        );
        assert_eq!(request.body.as_deref(), Some(&b"{\"key\":\"value\"}"[..]));
        assert!(request.disable_redirect);
    }

    #[test]
    fn test_decode_malformed() {
        assert!(HttpAdapter.decode(Bytes::from_static(b"{not json")).is_err());
        assert!(HttpAdapter.decode(Bytes::from_static(b"{}")).is_err());
    }

    #[test]
    fn test_encode_status_codes() {
        let invalid = FetchResult::from_error(&Error::Validation(ValidationError::ConflictingFingerprint));
        assert_eq!(HttpAdapter.encode(&invalid).status(), StatusCode::BAD_REQUEST);

        let timeout = FetchResult::from_error(&Error::Timeout(std::time::Duration::from_secs(1)));
        assert_eq!(HttpAdapter.encode(&timeout).status(), StatusCode::OK);
    }
}
