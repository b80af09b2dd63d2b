//! Proxy endpoint.
//!
//! # Data Flow
//! ```text
//! request + route VIP
//!     → OriginManager::get → Origin::pre_request_checks (InFlightGuard)
//!     → attempt 1..=max_retries+1:
//!         cancelled? → stop
//!         backoff (retries only)
//!         choose_server → connect → send (read timeout)
//!         record RequestAttempt, update server health
//!         retryable failure and attempts left? → next attempt
//!     → record_final_response / record_final_error
//! ```
//!
//! # Design Decisions
//! - The request body is buffered once and replayed on retries without copying
//! - A timed-out connection is discarded, never pooled
//! - A retried 503 is dropped; the last one is returned to the client as-is

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;

use crate::config::OriginConfig;
use crate::context::{PassportState, SessionContext};
use crate::errors::GatewayError;
use crate::filter::{Filter, FilterOutput, FilterSyncType, FilterType};
use crate::filters::PROXY_ENDPOINT;
use crate::message::{Headers, HttpMessage, HttpRequestMessage, HttpResponseMessage, MessageBody};
use crate::observability::metrics;
use crate::origin::{Origin, OriginManager, OriginRequest, OriginResponse, OriginServer, RequestAttempt};
use crate::resilience::RetryPolicy;

/// Forwards the request to the origin chosen by routing.
pub struct ProxyEndpoint {
    origins: Arc<OriginManager>,
}

impl ProxyEndpoint {
    pub fn new(origins: Arc<OriginManager>) -> Self {
        Self { origins }
    }

    async fn proxy(&self, req: &HttpRequestMessage, ctx: &mut SessionContext) -> Result<HttpResponseMessage, GatewayError> {
        let vip = ctx.route_vip().unwrap_or_default().to_string();
        let origin = self
            .origins
            .get(&vip)
            .ok_or_else(|| GatewayError::UnknownOrigin(vip.clone()))?;

        let _in_flight = match origin.pre_request_checks(ctx) {
            Ok(guard) => guard,
            Err(err) => {
                origin.record_final_error(ctx, &err);
                return Err(err);
            }
        };

        let settings = origin.settings();
        let policy = RetryPolicy::for_origin(&settings, origin.max_retries_for_request(ctx));
        let request = origin_request(req, &settings);

        let mut attempt = 0;
        loop {
            attempt += 1;
            if ctx.is_cancelled() {
                return Err(GatewayError::ClientCancelled);
            }
            if attempt > 1 {
                ctx.mark(PassportState::OriginRetryStart);
                let delay = policy.backoff(attempt - 1);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            match self.attempt(&origin, &settings, attempt, request.clone(), ctx).await {
                Ok(resp) if policy.should_retry_status(attempt, resp.status) => {
                    tracing::info!(
                        request_id = %ctx.request_id(),
                        origin = %origin.name(),
                        attempt,
                        status = resp.status.as_u16(),
                        "Retrying throttled origin request"
                    );
                }
                Ok(resp) => {
                    origin.record_final_response(ctx, resp.status);
                    return Ok(into_response(req, resp));
                }
                Err(err) if policy.should_retry_error(attempt, &err) => {
                    tracing::info!(
                        request_id = %ctx.request_id(),
                        origin = %origin.name(),
                        attempt,
                        error = %err,
                        "Retrying origin request"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        origin = %origin.name(),
                        attempts = attempt,
                        error = %err,
                        "Origin request failed"
                    );
                    origin.record_final_error(ctx, &err);
                    return Err(err);
                }
            }
        }
    }

    /// One try against a freshly selected server. Always leaves a
    /// [`RequestAttempt`] on the context.
    async fn attempt(
        &self,
        origin: &Arc<Origin>,
        settings: &OriginConfig,
        attempt: u32,
        request: OriginRequest,
        ctx: &mut SessionContext,
    ) -> Result<OriginResponse, GatewayError> {
        let started = Instant::now();
        let Some(server) = origin.choose_server() else {
            let err = GatewayError::NoAvailableServers(origin.name().to_string());
            let mut record = RequestAttempt::new(attempt, origin.name(), "-", settings.read_timeout_ms);
            record.fail(&err, started.elapsed());
            metrics::record_origin_attempt(origin.name(), err.kind());
            ctx.add_request_attempt(record);
            return Err(err);
        };

        let mut record = RequestAttempt::new(attempt, origin.name(), &server.addr.to_string(), settings.read_timeout_ms);
        let result = self.send_to(origin, &server, attempt, request, settings.read_timeout_ms, ctx).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(resp) => {
                record.complete(resp.status, elapsed);
                if resp.status == axum::http::StatusCode::SERVICE_UNAVAILABLE {
                    server.mark_failure(settings.unhealthy_threshold);
                } else {
                    server.mark_success(settings.healthy_threshold);
                }
                metrics::record_origin_attempt(origin.name(), record_outcome(&record));
            }
            Err(err) => {
                record.fail(err, elapsed);
                if counts_against_server(err) {
                    server.mark_failure(settings.unhealthy_threshold);
                }
                metrics::record_origin_attempt(origin.name(), err.kind());
            }
        }
        ctx.add_request_attempt(record);
        result
    }

    async fn send_to(
        &self,
        origin: &Origin,
        server: &Arc<OriginServer>,
        attempt: u32,
        request: OriginRequest,
        read_timeout_ms: u64,
        ctx: &mut SessionContext,
    ) -> Result<OriginResponse, GatewayError> {
        let mut conn = origin.connect(server, attempt, ctx).await?;
        ctx.mark(PassportState::OriginRequestSent);

        match tokio::time::timeout(Duration::from_millis(read_timeout_ms), conn.send(request)).await {
            Ok(Ok(resp)) => {
                ctx.mark(PassportState::OriginResponseReceived);
                Ok(resp)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => {
                conn.discard();
                Err(GatewayError::OriginReadTimeout {
                    server: server.addr.to_string(),
                    timeout_ms: read_timeout_ms,
                })
            }
        }
    }
}

impl Filter for ProxyEndpoint {
    fn name(&self) -> &str {
        PROXY_ENDPOINT
    }

    fn filter_type(&self) -> FilterType {
        FilterType::Endpoint
    }

    fn order(&self) -> i32 {
        0
    }

    fn sync_type(&self) -> FilterSyncType {
        FilterSyncType::Async
    }

    fn apply_async<'a>(&'a self, msg: &'a mut HttpMessage, ctx: &'a mut SessionContext) -> BoxFuture<'a, FilterOutput> {
        Box::pin(async move {
            let response = self.proxy(msg.request(), ctx).await?;
            Ok(Some(HttpMessage::Response(response)))
        })
    }
}

/// Failures that say something about the server rather than about the
/// gateway's own limits.
fn counts_against_server(err: &GatewayError) -> bool {
    matches!(
        err,
        GatewayError::OriginConnectError { .. }
            | GatewayError::OriginConnectTimeout { .. }
            | GatewayError::OriginReadTimeout { .. }
            | GatewayError::OriginResetConnection { .. }
    )
}

fn record_outcome(record: &RequestAttempt) -> &'static str {
    record.category.map(|c| c.as_str()).unwrap_or("UNKNOWN")
}

/// The request as sent to the origin: hop-by-hop headers stripped,
/// forwarding headers added, body buffered.
fn origin_request(req: &HttpRequestMessage, settings: &OriginConfig) -> OriginRequest {
    let mut headers = req.headers.clone();
    headers.remove_hop_by_hop();
    if let Some(client) = req.client_addr {
        let forwarded = match headers.get_first("x-forwarded-for") {
            Some(prior) => format!("{prior}, {}", client.ip()),
            None => client.ip().to_string(),
        };
        headers.set("X-Forwarded-For", forwarded);
    }
    if !headers.contains("x-forwarded-proto") {
        headers.set("X-Forwarded-Proto", req.scheme.as_str());
    }

    OriginRequest {
        method: req.method.clone(),
        uri: req.path_and_query(),
        headers: headers.to_header_map(),
        body: req.body.to_bytes(),
        max_response_bytes: settings.max_response_body_size,
    }
}

fn into_response(req: &HttpRequestMessage, resp: OriginResponse) -> HttpResponseMessage {
    let mut response = HttpResponseMessage::new(req, resp.status);
    let mut headers = Headers::from_header_map(&resp.headers);
    headers.remove_hop_by_hop();
    response.headers = headers;
    response.body = MessageBody::from_bytes(resp.body);
    response.has_body = !response.body.is_empty();
    response
}
