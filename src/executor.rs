//! Fetch execution.
//!
//! [`FetchExecutor`] is the single entry point every adapter calls. A fetch
//! goes through validation, fingerprint resolution, header assembly and a
//! request-scoped [`FetchClient`](crate::client::FetchClient), all under one
//! deadline. Every outcome, including panics, comes back as a
//! [`FetchResult`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::TlsClientFactory;
use crate::config::EngineConfig;
use crate::cookie::CookieJar;
use crate::error::{Error, ErrorKind, Result};
use crate::fingerprint::{resolve, ResolvedProfile};
use crate::headers::merge;
use crate::request::{FetchRequest, ValidatedRequest};
use crate::response::FetchResult;

/// Runs fetches. Cheap to clone; clones share the in-flight limit.
#[derive(Clone)]
pub struct FetchExecutor {
    config: Arc<EngineConfig>,
    limiter: Option<Arc<Semaphore>>,
}

impl Default for FetchExecutor {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl FetchExecutor {
    pub fn new(config: EngineConfig) -> Self {
        let limiter = config
            .max_in_flight
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
        Self {
            config: Arc::new(config),
            limiter,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute one fetch.
    pub async fn execute(&self, request: &FetchRequest) -> FetchResult {
        self.execute_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Execute one fetch, aborting when `cancel` fires.
    ///
    /// Timeout and cancellation drop the in-flight future, which closes its
    /// sockets.
    pub async fn execute_with_cancel(
        &self,
        request: &FetchRequest,
        cancel: CancellationToken,
    ) -> FetchResult {
        let (validated, resolved) = match guarded(|| prepare(request, &self.config)) {
            Ok(prepared) => prepared,
            Err(e) => {
                if e.kind() == ErrorKind::Internal {
                    warn!(url = %request.url, error = %e, "fetch preparation failed");
                } else {
                    debug!(url = %request.url, error = %e, "rejected fetch request");
                }
                return FetchResult::from_error(&e);
            }
        };

        let deadline = validated.timeout;
        let url = validated.url.clone();
        let work = AssertUnwindSafe(self.run(validated, resolved)).catch_unwind();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            finished = tokio::time::timeout(deadline, work) => match finished {
                Err(_) => Err(Error::Timeout(deadline)),
                Ok(Err(panic)) => Err(Error::internal(panic_message(panic))),
                Ok(Ok(result)) => result,
            },
        };

        match outcome {
            Ok(result) => result,
            Err(e) => {
                if e.kind() == ErrorKind::Internal {
                    warn!(url = %url, error = %e, "fetch failed");
                } else {
                    debug!(url = %url, error = %e, "fetch failed");
                }
                FetchResult::from_error(&e)
            }
        }
    }

    /// Everything after validation: the network exchange and body decoding.
    async fn run(&self, request: ValidatedRequest, profile: ResolvedProfile) -> Result<FetchResult> {
        // Waiting for a slot is part of the fetch's deadline.
        let _permit = match &self.limiter {
            Some(limiter) => Some(
                limiter
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::internal("in-flight limiter closed"))?,
            ),
            None => None,
        };

        let headers = merge(
            &profile.default_headers,
            profile.user_agent.as_deref(),
            &request.headers,
        );

        let mut jar = CookieJar::new();
        for cookie in request.cookies {
            jar.store(cookie);
        }

        let client = TlsClientFactory::build(
            &profile.spec,
            request.proxy.as_deref(),
            request.follow_redirects,
            &self.config,
        )?;
        let response = client
            .send(request.method, request.url.clone(), headers, request.body, &mut jar)
            .await?;
        debug!(url = %request.url, status = response.status, version = response.http_version(), "fetch complete");
        FetchResult::from_response(response, self.config.max_body_size)
    }
}

/// Validate and resolve without touching the network.
fn prepare(request: &FetchRequest, config: &EngineConfig) -> Result<(ValidatedRequest, ResolvedProfile)> {
    let validated = request.validate(config.default_timeout)?;
    let mut resolved = resolve(&validated.fingerprint, validated.user_agent.as_deref())?;
    if let Some(http2) = &validated.http2 {
        resolved.spec.http2 = http2.clone();
    }
    debug!(
        url = %validated.url,
        method = %validated.method,
        fingerprint = ?validated.fingerprint,
        ja3 = %resolved.spec.to_ja3(),
        http2 = %resolved.spec.http2,
        "resolved fetch"
    );
    Ok((validated, resolved))
}

/// Run synchronous engine code, turning a panic into an internal error.
fn guarded<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    std::panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|panic| Err(Error::internal(panic_message(panic))))
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panic during fetch: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panic during fetch: {}", msg)
    } else {
        "panic during fetch".to_string()
    }
}
