//! gRPC front end: `fastls.FastlsService` with `Fetch` and `Health`.
//!
//! Bodies travel as raw bytes, so no base64 step is needed on this wire.
//! A validation failure becomes `INVALID_ARGUMENT`; every other outcome is a
//! `FetchResponse`, with `ok: false` when the fetch failed.

pub mod pb {
    tonic::include_proto!("fastls");
}

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tonic::{Request, Response, Status};
use tracing::info;

use self::pb::fastls_service_server::{FastlsService, FastlsServiceServer};
use super::{health, Adapter, DecodeError, ServerError};
use crate::executor::FetchExecutor;
use crate::request::{CookieExpiry, CookieParam, FetchRequest, FingerprintParam, HeaderList};
use crate::response::FetchResult;

pub use self::pb::fastls_service_client::FastlsServiceClient;

/// Protobuf messages <-> canonical model.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrpcAdapter;

impl Adapter for GrpcAdapter {
    type Wire = pb::FetchRequest;
    type Reply = Result<pb::FetchResponse, Status>;

    fn decode(&self, wire: pb::FetchRequest) -> Result<FetchRequest, DecodeError> {
        if wire.timeout.is_nan() {
            return Err(DecodeError("timeout is not a number".to_string()));
        }
        let cookies = wire
            .cookies
            .into_iter()
            .map(|c| CookieParam {
                name: c.name,
                value: c.value,
                domain: non_empty(c.domain),
                path: non_empty(c.path),
                expires: (c.expires > 0).then_some(CookieExpiry::Unix(c.expires)),
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect();

        Ok(FetchRequest {
            url: wire.url,
            method: non_empty(wire.method),
            headers: wire
                .headers
                .into_iter()
                .map(|h| (h.name, h.value))
                .collect::<HeaderList>(),
            body: (!wire.body.is_empty()).then_some(wire.body),
            proxy: non_empty(wire.proxy),
            timeout: (wire.timeout != 0.0).then_some(wire.timeout),
            disable_redirect: wire.disable_redirect,
            user_agent: non_empty(wire.user_agent),
            fingerprint: wire
                .fingerprint
                .filter(|f| !f.r#type.is_empty() || !f.value.is_empty())
                .map(|f| FingerprintParam {
                    kind: f.r#type,
                    value: f.value,
                }),
            browser: non_empty(wire.browser),
            http2_settings: non_empty(wire.http2_settings),
            cookies,
        })
    }

    fn encode(&self, result: &FetchResult) -> Result<pb::FetchResponse, Status> {
        if result.is_validation_error() {
            return Err(Status::invalid_argument(
                result.error.clone().unwrap_or_default(),
            ));
        }
        Ok(pb::FetchResponse {
            ok: result.ok,
            status: u32::from(result.status),
            headers: result
                .headers
                .iter()
                .map(|(name, values)| pb::HeaderValues {
                    name: name.to_string(),
                    values: values.to_vec(),
                })
                .collect(),
            body: result.body.clone(),
            error: result.error.clone().unwrap_or_default(),
            error_kind: result
                .error_kind
                .map(|kind| kind.as_str().to_string())
                .unwrap_or_default(),
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

/// Service implementation backed by the executor.
#[derive(Clone)]
pub struct FastlsGrpc {
    executor: FetchExecutor,
}

impl FastlsGrpc {
    pub fn new(executor: FetchExecutor) -> Self {
        Self { executor }
    }
}

#[tonic::async_trait]
impl FastlsService for FastlsGrpc {
    async fn fetch(
        &self,
        request: Request<pb::FetchRequest>,
    ) -> Result<Response<pb::FetchResponse>, Status> {
        let adapter = GrpcAdapter;
        let fetch = adapter
            .decode(request.into_inner())
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        let result = self.executor.execute(&fetch).await;
        adapter.encode(&result).map(Response::new)
    }

    async fn health(
        &self,
        _request: Request<pb::HealthRequest>,
    ) -> Result<Response<pb::HealthResponse>, Status> {
        Ok(Response::new(pb::HealthResponse {
            status: health().status.to_string(),
        }))
    }
}

pub struct GrpcServer {
    addr: SocketAddr,
    executor: FetchExecutor,
}

impl GrpcServer {
    pub fn new(addr: SocketAddr, executor: FetchExecutor) -> Self {
        Self { addr, executor }
    }

    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        info!("fastls gRPC service listening on {}", listener.local_addr()?);
        let incoming = futures::stream::unfold(listener, |listener| async move {
            let accepted = listener.accept().await.map(|(stream, _)| stream);
            Some((accepted, listener))
        });
        tonic::transport::Server::builder()
            .add_service(FastlsServiceServer::new(FastlsGrpc::new(self.executor)))
            .serve_with_incoming(incoming)
            .await?;
        Ok(())
    }
}
