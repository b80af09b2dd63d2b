//! Single-filter execution.
//!
//! # Responsibilities
//! - Decide whether a filter runs (disabled, stop flag, `should_filter`)
//! - Hand the filter the kind of message its phase expects
//! - Contain every failure, including panics, at the filter boundary
//! - Record status, timing, usage and debug trace for each execution
//!
//! # Design Decisions
//! - `run_filter` only suspends inside an async filter's future, so a run of
//!   sync filters completes without yielding to the scheduler
//! - A failing filter yields its default output; the chain keeps going

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;

use crate::context::SessionContext;
use crate::errors::GatewayError;
use crate::filter::{ExecutionStatus, Filter, FilterExecution, FilterOutput, FilterSyncType, FilterType};
use crate::message::HttpMessage;
use crate::observability::metrics;

/// How the chain is running a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterRole {
    /// Regular inbound or outbound filter.
    Phase,
    /// The chosen endpoint. Ignores the stop flag; failures escalate to the
    /// error endpoint.
    Endpoint,
    /// The error endpoint. Ignores the stop flag; failures never escalate.
    ErrorEndpoint,
}

/// Observer for filter executions.
pub trait FilterUsageNotifier: Send + Sync {
    fn notify(&self, filter: &dyn Filter, status: ExecutionStatus);
}

/// Reports every execution through the metrics facade.
#[derive(Debug, Default)]
pub struct MetricsUsageNotifier;

impl FilterUsageNotifier for MetricsUsageNotifier {
    fn notify(&self, filter: &dyn Filter, status: ExecutionStatus) {
        metrics::record_filter_execution(filter.name(), filter.filter_type().as_str(), status.as_str());
    }
}

/// What happened inside the filter body.
enum Applied {
    NotApplicable,
    Output(FilterOutput),
    Panicked(String),
}

/// Executes one filter at a time.
#[derive(Clone)]
pub struct FilterRunner {
    notifier: Arc<dyn FilterUsageNotifier>,
}

impl FilterRunner {
    pub fn new(notifier: Arc<dyn FilterUsageNotifier>) -> Self {
        Self { notifier }
    }

    /// Run `filter` against `msg` and return the message for the next step.
    pub async fn run_filter(
        &self,
        filter: &Arc<dyn Filter>,
        msg: HttpMessage,
        ctx: &mut SessionContext,
        role: FilterRole,
    ) -> HttpMessage {
        let started = Instant::now();
        let before = ctx.debug_request().then(|| msg.summary());
        let name = filter.name().to_string();

        if filter.is_disabled() || ctx.config().filters.is_disabled(filter.filter_type(), &name) {
            let out = filter.default_output(msg);
            self.finish(filter.as_ref(), ExecutionStatus::Disabled, started, before, &out, ctx);
            return out;
        }

        if role == FilterRole::Phase
            && ctx.stop_filter_processing()
            && !filter.override_stop_filter_processing()
        {
            let out = filter.default_output(msg);
            self.finish(filter.as_ref(), ExecutionStatus::Skipped, started, before, &out, ctx);
            return out;
        }

        let mut input = match choose_input(filter.as_ref(), msg) {
            Ok(input) => input,
            Err((err, passthrough)) => {
                self.fail(filter.as_ref(), err, role, ctx);
                self.finish(filter.as_ref(), ExecutionStatus::Failed, started, before, &passthrough, ctx);
                return passthrough;
            }
        };

        let applied = match filter.sync_type() {
            FilterSyncType::Sync => {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    if filter.should_filter(&input, ctx) {
                        Some(filter.apply(&mut input, ctx))
                    } else {
                        None
                    }
                }));
                into_applied(result)
            }
            FilterSyncType::Async => {
                let body = async {
                    if filter.should_filter(&input, ctx) {
                        Some(filter.apply_async(&mut input, ctx).await)
                    } else {
                        None
                    }
                };
                into_applied(AssertUnwindSafe(body).catch_unwind().await)
            }
        };

        let (out, status) = match applied {
            Applied::NotApplicable => (filter.default_output(input), ExecutionStatus::Skipped),
            Applied::Output(Ok(Some(out))) => match check_output(filter.as_ref(), &out, role) {
                Ok(()) => (out, ExecutionStatus::Success),
                Err(err) => {
                    self.fail(filter.as_ref(), err, role, ctx);
                    (filter.default_output(input), ExecutionStatus::Failed)
                }
            },
            Applied::Output(Ok(None)) => {
                let out = filter.default_output(input);
                (out, ExecutionStatus::Success)
            }
            Applied::Output(Err(err)) => {
                self.fail(filter.as_ref(), err, role, ctx);
                (filter.default_output(input), ExecutionStatus::Failed)
            }
            Applied::Panicked(message) => {
                let err = GatewayError::FilterExecution {
                    filter: name.clone(),
                    message: format!("panicked: {message}"),
                };
                self.fail(filter.as_ref(), err, role, ctx);
                (filter.default_output(input), ExecutionStatus::Failed)
            }
        };

        self.finish(filter.as_ref(), status, started, before, &out, ctx);
        out
    }

    fn fail(&self, filter: &dyn Filter, err: GatewayError, role: FilterRole, ctx: &mut SessionContext) {
        tracing::warn!(
            request_id = %ctx.request_id(),
            filter = %filter.name(),
            error = %err,
            "Filter failed"
        );
        ctx.set_error(Some(filter.name()), err);
        if role == FilterRole::Endpoint {
            ctx.set_should_send_error_response(true);
        }
    }

    fn finish(
        &self,
        filter: &dyn Filter,
        status: ExecutionStatus,
        started: Instant,
        before: Option<String>,
        out: &HttpMessage,
        ctx: &mut SessionContext,
    ) {
        let elapsed = started.elapsed();
        tracing::debug!(
            request_id = %ctx.request_id(),
            filter = %filter.name(),
            status = %status,
            elapsed_us = elapsed.as_micros() as u64,
            "Filter executed"
        );
        self.notifier.notify(filter, status);
        if let Some(before) = before {
            ctx.add_debug(format!("{} [{}] {} => {}", filter.name(), status, before, out.summary()));
        }
        ctx.record_execution(FilterExecution {
            name: filter.name().to_string(),
            filter_type: filter.filter_type(),
            status,
            elapsed,
        });
    }
}

impl Default for FilterRunner {
    fn default() -> Self {
        Self::new(Arc::new(MetricsUsageNotifier))
    }
}

/// Outbound filters need a response; everything else sees the request.
fn choose_input(
    filter: &dyn Filter,
    msg: HttpMessage,
) -> Result<HttpMessage, (GatewayError, HttpMessage)> {
    match (filter.filter_type(), msg) {
        (FilterType::Outbound, HttpMessage::Request(req)) => Err((
            GatewayError::InvalidFilterInput {
                filter: filter.name().to_string(),
                expected: "response",
                received: "request",
            },
            HttpMessage::Request(req),
        )),
        (FilterType::Outbound, msg) => Ok(msg),
        (_, msg @ HttpMessage::Request(_)) => Ok(msg),
        (_, msg @ HttpMessage::Response(_)) => Ok(HttpMessage::Request(msg.into_request())),
    }
}

/// A phase never changes the message kind; endpoints must answer.
fn check_output(filter: &dyn Filter, out: &HttpMessage, role: FilterRole) -> Result<(), GatewayError> {
    let expected = match (role, filter.filter_type()) {
        (FilterRole::Phase, FilterType::Inbound) => "request",
        _ => "response",
    };
    if out.kind() == expected {
        Ok(())
    } else {
        Err(GatewayError::InvalidFilterOutput {
            filter: filter.name().to_string(),
            expected,
            produced: out.kind(),
        })
    }
}

fn into_applied(result: Result<Option<FilterOutput>, Box<dyn Any + Send>>) -> Applied {
    match result {
        Ok(Some(output)) => Applied::Output(output),
        Ok(None) => Applied::NotApplicable,
        Err(payload) => Applied::Panicked(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
