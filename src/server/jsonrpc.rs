//! JSON-RPC 2.0 front end: `POST /rpc` with methods `fetch` and `health`.
//!
//! Every reply is HTTP 200; failures travel in the JSON-RPC `error` member.
//! Fetches that fail past validation are still a `result` with `ok: false`.

use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::{debug, info};

use super::http::read_body;
use super::{health, json_response, preflight_response, Adapter, DecodeError, ServerError};
use crate::executor::FetchExecutor;
use crate::request::FetchRequest;
use crate::response::FetchResult;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    fn new(code: i64, message: &str, data: impl Into<Option<Value>>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl RpcResponse {
    fn reply(id: Value, outcome: Result<Value, RpcError>) -> Self {
        let (result, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(e) => (None, Some(e)),
        };
        Self {
            jsonrpc: "2.0",
            result,
            error,
            id,
        }
    }
}

/// `params` <-> canonical model.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcAdapter;

impl Adapter for RpcAdapter {
    type Wire = Value;
    type Reply = Result<Value, RpcError>;

    fn decode(&self, wire: Value) -> Result<FetchRequest, DecodeError> {
        Ok(serde_json::from_value(wire)?)
    }

    fn encode(&self, result: &FetchResult) -> Result<Value, RpcError> {
        let document = serde_json::to_value(result.to_json()).map_err(|e| {
            RpcError::new(INTERNAL_ERROR, "Internal error", Value::String(e.to_string()))
        })?;
        if result.is_validation_error() {
            return Err(RpcError::new(INVALID_PARAMS, "Invalid params", document));
        }
        Ok(document)
    }
}

/// Handle one JSON-RPC document.
pub async fn handle_document(body: &[u8], executor: &FetchExecutor) -> RpcResponse {
    let document: Value = match serde_json::from_slice(body) {
        Ok(document) => document,
        Err(e) => {
            return RpcResponse::reply(
                Value::Null,
                Err(RpcError::new(PARSE_ERROR, "Parse error", Value::String(e.to_string()))),
            )
        }
    };

    let id = document.get("id").cloned().unwrap_or(Value::Null);
    if document.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return RpcResponse::reply(
            id,
            Err(RpcError::new(
                INVALID_REQUEST,
                "Invalid Request",
                Value::String("jsonrpc must be '2.0'".to_string()),
            )),
        );
    }
    let Some(method) = document.get("method").and_then(Value::as_str) else {
        return RpcResponse::reply(
            id,
            Err(RpcError::new(
                INVALID_REQUEST,
                "Invalid Request",
                Value::String("method is required".to_string()),
            )),
        );
    };

    let outcome = match method {
        "fetch" => {
            let adapter = RpcAdapter;
            let params = document.get("params").cloned().unwrap_or(Value::Null);
            match adapter.decode(params) {
                Ok(request) => adapter.encode(&executor.execute(&request).await),
                Err(e) => Err(RpcError::new(
                    INVALID_PARAMS,
                    "Invalid params",
                    Value::String(e.to_string()),
                )),
            }
        }
        "health" => serde_json::to_value(health())
            .map_err(|e| RpcError::new(INTERNAL_ERROR, "Internal error", Value::String(e.to_string()))),
        other => Err(RpcError::new(
            METHOD_NOT_FOUND,
            "Method not found",
            Value::String(format!("Unknown method: {}", other)),
        )),
    };
    RpcResponse::reply(id, outcome)
}

pub struct RpcServer {
    addr: SocketAddr,
    executor: FetchExecutor,
}

impl RpcServer {
    pub fn new(addr: SocketAddr, executor: FetchExecutor) -> Self {
        Self { addr, executor }
    }

    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        info!(
            "fastls JSON-RPC endpoint listening on http://{}/rpc",
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
                    debug!("JSON-RPC connection error: {}", e);
                }
            });
        }
    }
}

#[derive(Serialize)]
struct NotFound {
    error: &'static str,
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
        (&Method::POST, "/rpc") => {
            let reply = match read_body(req.into_body()).await {
                Ok(body) => handle_document(&body, &executor).await,
                Err(e) => RpcResponse::reply(
                    Value::Null,
                    Err(RpcError::new(PARSE_ERROR, "Parse error", Value::String(e.to_string()))),
                ),
            };
            json_response(StatusCode::OK, &reply)
        }
        _ => json_response(StatusCode::NOT_FOUND, &NotFound { error: "not found" }),
    };
    Ok(response)
}
