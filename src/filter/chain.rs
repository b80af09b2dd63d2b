//! Filter chain orchestration.
//!
//! # State Machine
//! ```text
//! InboundRunning ──all inbound done──▶ EndpointRunning ──response──▶ OutboundRunning ──▶ Complete
//!        │                                   │                              │
//!        └──── should_send_error_response ───┴──────────▶ ErrorDivert ◀─────┘
//!                                                            │
//!                         resumes the interrupted phase with the error response
//! ```
//!
//! # Design Decisions
//! - One generation snapshot per request; a concurrent reload never mixes sets
//! - The error endpoint is marked as sent before it runs, so a failing error
//!   endpoint cannot divert again
//! - Cancellation is checked before every filter; a cancelled request yields
//!   no response at all

use std::sync::Arc;

use serde::Serialize;

use crate::context::{PassportState, SessionContext};
use crate::errors::{GatewayError, StatusCategory};
use crate::filter::registry::{FilterRegistry, Generation};
use crate::filter::runner::{FilterRole, FilterRunner};
use crate::filter::FilterType;
use crate::message::{HttpMessage, HttpRequestMessage, HttpResponseMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainState {
    InboundRunning,
    ErrorDivert,
    EndpointRunning,
    OutboundRunning,
    Complete,
}

/// Runs a request through INBOUND, ENDPOINT and OUTBOUND filters.
#[derive(Clone)]
pub struct FilterChain {
    registry: Arc<FilterRegistry>,
    runner: FilterRunner,
}

impl FilterChain {
    pub fn new(registry: Arc<FilterRegistry>, runner: FilterRunner) -> Self {
        Self { registry, runner }
    }

    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    /// Process one request to exactly one response.
    ///
    /// Returns [`GatewayError::ClientCancelled`] if the context was cancelled
    /// before the chain finished; no response must be written in that case.
    pub async fn process(
        &self,
        request: HttpRequestMessage,
        ctx: &mut SessionContext,
    ) -> Result<HttpResponseMessage, GatewayError> {
        let generation = self.registry.generation();
        let mut msg = HttpMessage::Request(request);

        // Inbound
        ctx.set_chain_state(ChainState::InboundRunning);
        ctx.mark(PassportState::FiltersInboundStart);
        msg = self.divert_if_needed(msg, ctx, &generation).await;
        for filter in generation.filters(FilterType::Inbound).iter() {
            if ctx.error_response_sent() {
                break;
            }
            msg = check_cancelled(msg, ctx)?;
            msg = self.runner.run_filter(filter, msg, ctx, FilterRole::Phase).await;
            msg = self.divert_if_needed(msg, ctx, &generation).await;
        }
        ctx.mark(PassportState::FiltersInboundEnd);

        // Endpoint
        if msg.is_request() && !ctx.error_response_sent() {
            msg = check_cancelled(msg, ctx)?;
            ctx.set_chain_state(ChainState::EndpointRunning);
            ctx.mark(PassportState::EndpointStart);
            msg = self.run_endpoint(msg, ctx, &generation).await;
            ctx.mark(PassportState::EndpointEnd);
            msg = self.divert_if_needed(msg, ctx, &generation).await;
        }

        // Outbound
        ctx.set_chain_state(ChainState::OutboundRunning);
        ctx.mark(PassportState::FiltersOutboundStart);
        for filter in generation.filters(FilterType::Outbound).iter() {
            msg = check_cancelled(msg, ctx)?;
            msg = self.runner.run_filter(filter, msg, ctx, FilterRole::Phase).await;
            msg = self.divert_if_needed(msg, ctx, &generation).await;
        }
        ctx.mark(PassportState::FiltersOutboundEnd);

        msg = check_cancelled(msg, ctx)?;
        ctx.set_chain_state(ChainState::Complete);
        ctx.mark(PassportState::ChainComplete);

        let response = match msg {
            HttpMessage::Response(resp) => resp,
            HttpMessage::Request(req) => {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    "Chain completed without a response, synthesizing 500"
                );
                HttpResponseMessage::default_error(req)
            }
        };

        if ctx.status_category().is_none() {
            let category = match ctx.error() {
                Some(err) => err.error.status_category(),
                None if response.status.is_server_error() => StatusCategory::FailureLocal,
                None => StatusCategory::Success,
            };
            ctx.set_status_category(category);
        }

        Ok(response)
    }

    async fn run_endpoint(
        &self,
        msg: HttpMessage,
        ctx: &mut SessionContext,
        generation: &Generation,
    ) -> HttpMessage {
        if let Some(resp) = ctx.take_static_response() {
            tracing::debug!(request_id = %ctx.request_id(), status = resp.status.as_u16(), "Using static response");
            return HttpMessage::Response(resp);
        }

        let Some(name) = ctx.endpoint().map(str::to_string) else {
            ctx.set_error(None, GatewayError::NoEndpointChosen);
            ctx.set_should_send_error_response(true);
            return msg;
        };

        match generation.endpoint(&name) {
            Some(endpoint) => {
                self.runner
                    .run_filter(&endpoint, msg, ctx, FilterRole::Endpoint)
                    .await
            }
            None => {
                ctx.set_error(None, GatewayError::NoEndpointFilterFound(name));
                ctx.set_should_send_error_response(true);
                msg
            }
        }
    }

    /// Replace the message with the error endpoint's response if a filter
    /// asked for one and none was sent yet.
    async fn divert_if_needed(
        &self,
        msg: HttpMessage,
        ctx: &mut SessionContext,
        generation: &Generation,
    ) -> HttpMessage {
        if !ctx.should_send_error_response() || ctx.error_response_sent() {
            return msg;
        }

        let interrupted = ctx.chain_state();
        ctx.set_chain_state(ChainState::ErrorDivert);
        ctx.mark(PassportState::ErrorDivertStart);
        ctx.set_error_response_sent(true);
        ctx.set_should_send_error_response(false);

        let name = ctx
            .error_endpoint()
            .map(str::to_string)
            .unwrap_or_else(|| ctx.config().filters.default_error_endpoint.clone());
        let request = HttpMessage::Request(msg.into_request());

        let out = match generation.endpoint(&name) {
            Some(endpoint) => {
                self.runner
                    .run_filter(&endpoint, request, ctx, FilterRole::ErrorEndpoint)
                    .await
            }
            None => {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    endpoint = %name,
                    "Error endpoint not found, using default error response"
                );
                request
            }
        };

        let out = match out {
            HttpMessage::Response(resp) => HttpMessage::Response(resp),
            HttpMessage::Request(req) => HttpMessage::Response(HttpResponseMessage::default_error(req)),
        };

        ctx.mark(PassportState::ErrorDivertEnd);
        ctx.set_chain_state(interrupted);
        out
    }
}

fn check_cancelled(mut msg: HttpMessage, ctx: &mut SessionContext) -> Result<HttpMessage, GatewayError> {
    if !ctx.is_cancelled() {
        return Ok(msg);
    }
    msg.dispose_body();
    if !ctx.passport().contains(PassportState::ClientCancelled) {
        ctx.mark(PassportState::ClientCancelled);
    }
    ctx.set_status_category(StatusCategory::FailureClientCancelled);
    tracing::debug!(request_id = %ctx.request_id(), state = ?ctx.chain_state(), "Request cancelled");
    Err(GatewayError::ClientCancelled)
}
