//! Per-request session context.
//!
//! # Data Flow
//! ```text
//! transport adapter creates SessionContext (+ optional decorator)
//!     → passed as &mut to every filter next to the message
//!     → runner/orchestrator read and set routing flags
//!     → adapter reads passport, executions, status category for logging
//! ```
//!
//! # Design Decisions
//! - Exactly one context per request, shared by the request and its response
//! - Passed explicitly at every call boundary; no thread-local "current context"
//! - Cancellation is a shared monotonic flag so the transport can raise it
//!   from outside the request task

pub mod keys;
pub mod passport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::GatewayConfig;
use crate::errors::{GatewayError, StatusCategory};
use crate::filter::chain::ChainState;
use crate::filter::FilterExecution;
use crate::message::HttpResponseMessage;
use crate::origin::attempt::RequestAttempt;

pub use keys::{Attributes, ContextKey};
pub use passport::{Passport, PassportEvent, PassportState};

/// Monotonic cancellation flag shared between a request's context and the
/// transport that owns its connection.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. There is no way to lower it again.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// An error recorded on the context, with the error it superseded.
#[derive(Debug, Clone)]
pub struct ContextError {
    /// Name of the filter the error is attributed to, if any.
    pub filter: Option<String>,
    pub error: GatewayError,
    pub cause: Option<Box<ContextError>>,
}

impl ContextError {
    /// This error followed by its chain of causes.
    pub fn chain(&self) -> impl Iterator<Item = &ContextError> {
        std::iter::successors(Some(self), |e| e.cause.as_deref())
    }
}

/// Hook for injecting custom state into every new context.
pub trait SessionContextDecorator: Send + Sync {
    fn decorate(&self, ctx: &mut SessionContext);
}

/// Mutable per-request state threaded through the whole pipeline.
#[derive(Debug)]
pub struct SessionContext {
    request_id: String,
    config: Arc<GatewayConfig>,
    attributes: Attributes,
    passport: Passport,
    error: Option<ContextError>,
    should_send_error_response: bool,
    error_response_sent: bool,
    stop_filter_processing: bool,
    cancelled: CancellationFlag,
    filter_executions: Vec<FilterExecution>,
    endpoint: Option<String>,
    error_endpoint: Option<String>,
    static_response: Option<HttpResponseMessage>,
    route_vip: Option<String>,
    request_attempts: Vec<RequestAttempt>,
    status_category: Option<StatusCategory>,
    chain_state: ChainState,
    debug_request: bool,
    debug_trace: Vec<String>,
    started: Instant,
}

impl SessionContext {
    /// New context bound to one configuration generation.
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            config,
            attributes: Attributes::default(),
            passport: Passport::new(),
            error: None,
            should_send_error_response: false,
            error_response_sent: false,
            stop_filter_processing: false,
            cancelled: CancellationFlag::new(),
            filter_executions: Vec::new(),
            endpoint: None,
            error_endpoint: None,
            static_response: None,
            route_vip: None,
            request_attempts: Vec::new(),
            status_category: None,
            chain_state: ChainState::InboundRunning,
            debug_request: false,
            debug_trace: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn set_request_id(&mut self, id: impl Into<String>) {
        self.request_id = id.into();
    }

    /// Configuration snapshot taken when the request arrived.
    pub fn config(&self) -> &Arc<GatewayConfig> {
        &self.config
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    // --- Attributes ---

    pub fn get<T: Send + Sync + 'static>(&self, key: &ContextKey<T>) -> Option<&T> {
        self.attributes.get(key)
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self, key: &ContextKey<T>) -> Option<&mut T> {
        self.attributes.get_mut(key)
    }

    pub fn put<T: Send + Sync + 'static>(&mut self, key: &ContextKey<T>, value: T) -> Option<T> {
        self.attributes.put(key, value)
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self, key: &ContextKey<T>) -> Option<T> {
        self.attributes.remove(key)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    // --- Passport ---

    pub fn passport(&self) -> &Passport {
        &self.passport
    }

    pub fn passport_mut(&mut self) -> &mut Passport {
        &mut self.passport
    }

    pub fn mark(&mut self, state: PassportState) {
        self.passport.add(state);
    }

    // --- Errors ---

    /// Record an error. A previously recorded error becomes its cause.
    pub fn set_error(&mut self, filter: Option<&str>, error: GatewayError) {
        let cause = self.error.take().map(Box::new);
        self.error = Some(ContextError {
            filter: filter.map(str::to_string),
            error,
            cause,
        });
    }

    pub fn error(&self) -> Option<&ContextError> {
        self.error.as_ref()
    }

    /// Number of errors recorded so far.
    pub fn error_count(&self) -> usize {
        self.error.as_ref().map(|e| e.chain().count()).unwrap_or(0)
    }

    // --- Routing flags ---

    pub fn should_send_error_response(&self) -> bool {
        self.should_send_error_response
    }

    pub fn set_should_send_error_response(&mut self, value: bool) {
        self.should_send_error_response = value;
    }

    pub fn error_response_sent(&self) -> bool {
        self.error_response_sent
    }

    pub fn set_error_response_sent(&mut self, value: bool) {
        self.error_response_sent = value;
    }

    pub fn stop_filter_processing(&self) -> bool {
        self.stop_filter_processing
    }

    /// Ask the runner to skip every remaining filter that does not override
    /// the flag. The chosen endpoint still runs.
    pub fn set_stop_filter_processing(&mut self, value: bool) {
        self.stop_filter_processing = value;
    }

    // --- Cancellation ---

    pub fn cancel(&mut self) {
        if !self.cancelled.is_cancelled() {
            self.cancelled.cancel();
            self.passport.add(PassportState::ClientCancelled);
        }
        if let Some(resp) = self.static_response.as_mut() {
            resp.body.dispose();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }

    /// Handle to the cancellation flag for code outside the request task.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancelled.clone()
    }

    // --- Filter bookkeeping ---

    pub fn record_execution(&mut self, execution: FilterExecution) {
        self.filter_executions.push(execution);
    }

    pub fn filter_executions(&self) -> &[FilterExecution] {
        &self.filter_executions
    }

    /// Compact `name[STATUS]` summary for access logs.
    pub fn execution_summary(&self) -> String {
        self.filter_executions
            .iter()
            .map(|e| format!("{}[{}]", e.name, e.status))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn chain_state(&self) -> ChainState {
        self.chain_state
    }

    pub fn set_chain_state(&mut self, state: ChainState) {
        self.chain_state = state;
    }

    // --- Endpoint selection ---

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn set_endpoint(&mut self, name: impl Into<String>) {
        self.endpoint = Some(name.into());
    }

    pub fn error_endpoint(&self) -> Option<&str> {
        self.error_endpoint.as_deref()
    }

    pub fn set_error_endpoint(&mut self, name: impl Into<String>) {
        self.error_endpoint = Some(name.into());
    }

    pub fn static_response(&self) -> Option<&HttpResponseMessage> {
        self.static_response.as_ref()
    }

    /// Answer the request with `response`, bypassing the endpoint phase.
    pub fn set_static_response(&mut self, response: HttpResponseMessage) {
        self.static_response = Some(response);
    }

    pub fn take_static_response(&mut self) -> Option<HttpResponseMessage> {
        self.static_response.take()
    }

    pub fn route_vip(&self) -> Option<&str> {
        self.route_vip.as_deref()
    }

    pub fn set_route_vip(&mut self, origin: impl Into<String>) {
        self.route_vip = Some(origin.into());
    }

    // --- Origin outcome ---

    pub fn add_request_attempt(&mut self, attempt: RequestAttempt) {
        self.request_attempts.push(attempt);
    }

    pub fn request_attempts(&self) -> &[RequestAttempt] {
        &self.request_attempts
    }

    pub fn status_category(&self) -> Option<StatusCategory> {
        self.status_category
    }

    pub fn set_status_category(&mut self, category: StatusCategory) {
        self.status_category = Some(category);
    }

    // --- Debugging ---

    pub fn debug_request(&self) -> bool {
        self.debug_request
    }

    pub fn set_debug_request(&mut self, value: bool) {
        self.debug_request = value;
    }

    pub fn add_debug(&mut self, line: impl Into<String>) {
        self.debug_trace.push(line.into());
    }

    pub fn debug_trace(&self) -> &[String] {
        &self.debug_trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SessionContext {
        SessionContext::new(Arc::new(GatewayConfig::default()))
    }

    #[test]
    fn test_errors_chain() {
        let mut ctx = ctx();
        assert_eq!(ctx.error_count(), 0);
        ctx.set_error(Some("a"), GatewayError::NoEndpointChosen);
        ctx.set_error(Some("b"), GatewayError::MalformedRequest("x".into()));
        assert_eq!(ctx.error_count(), 2);
        let current = ctx.error().unwrap();
        assert_eq!(current.filter.as_deref(), Some("b"));
        assert_eq!(current.cause.as_ref().unwrap().filter.as_deref(), Some("a"));
    }

    #[test]
    fn test_cancel_is_monotonic() {
        let mut ctx = ctx();
        let flag = ctx.cancellation();
        assert!(!ctx.is_cancelled());
        flag.cancel();
        assert!(ctx.is_cancelled());
        ctx.cancel();
        ctx.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.passport().count(PassportState::ClientCancelled), 0);
    }

    #[test]
    fn test_cancel_records_passport_once() {
        let mut ctx = ctx();
        ctx.cancel();
        ctx.cancel();
        assert_eq!(ctx.passport().count(PassportState::ClientCancelled), 1);
    }

    #[test]
    fn test_request_ids_unique() {
        assert_ne!(ctx().request_id().to_string(), ctx().request_id().to_string());
    }
}
