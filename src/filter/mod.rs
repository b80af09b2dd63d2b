//! Filter contract and execution engine.
//!
//! # Data Flow
//! ```text
//! FilterSource (static list, config, tests)
//!     → registry.rs (sorted FilterSet per type, atomic generation swap)
//!     → chain.rs (INBOUND → ENDPOINT → OUTBOUND, error diversion)
//!     → runner.rs (one filter: disable/skip/apply, failure isolation)
//!     → FilterExecution summary on the SessionContext
//! ```
//!
//! # Design Decisions
//! - One trait for every phase; the phase is a tag, not a type
//! - Filters mutate the message in place or return a replacement
//! - Errors never cross a filter boundary; escalation is an explicit flag
//! - Async filters return boxed futures; sync filters never suspend

pub mod chain;
pub mod registry;
pub mod runner;

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::context::SessionContext;
use crate::errors::GatewayError;
use crate::message::{HttpMessage, HttpResponseMessage};

pub use chain::{ChainState, FilterChain};
pub use registry::{FilterInfo, FilterRegistry, FilterSet, FilterSource, Generation, StaticFilterSource};
pub use runner::{FilterRole, FilterRunner, FilterUsageNotifier, MetricsUsageNotifier};

/// Phase a filter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Inbound,
    Endpoint,
    Outbound,
}

impl FilterType {
    pub const ALL: [FilterType; 3] = [FilterType::Inbound, FilterType::Endpoint, FilterType::Outbound];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterType::Inbound => "inbound",
            FilterType::Endpoint => "endpoint",
            FilterType::Outbound => "outbound",
        }
    }
}

impl std::fmt::Display for FilterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterSyncType {
    Sync,
    Async,
}

/// Outcome of running one filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    Skipped,
    Disabled,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Skipped => "SKIPPED",
            ExecutionStatus::Disabled => "DISABLED",
            ExecutionStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the per-request execution summary.
#[derive(Debug, Clone, Serialize)]
pub struct FilterExecution {
    pub name: String,
    pub filter_type: FilterType,
    pub status: ExecutionStatus,
    #[serde(rename = "elapsed_us", serialize_with = "serialize_micros")]
    pub elapsed: Duration,
}

fn serialize_micros<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_micros() as u64)
}

/// Result of [`Filter::apply`].
///
/// `Ok(Some(msg))` replaces the message, `Ok(None)` keeps the (possibly
/// mutated) input, `Err` marks the filter as failed.
pub type FilterOutput = Result<Option<HttpMessage>, GatewayError>;

/// A unit of request or response processing.
///
/// Implementations must be cheap to share: the registry hands the same
/// instance to every request. Per-request state belongs on the
/// [`SessionContext`].
pub trait Filter: Send + Sync {
    /// Unique name within the filter's type; secondary sort key.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn filter_type(&self) -> FilterType;

    /// Primary sort key, ascending.
    fn order(&self) -> i32;

    fn sync_type(&self) -> FilterSyncType {
        FilterSyncType::Sync
    }

    /// Checked on every request, so it may change at runtime.
    fn is_disabled(&self) -> bool {
        false
    }

    /// Run even after a previous filter asked to stop processing.
    fn override_stop_filter_processing(&self) -> bool {
        false
    }

    fn should_filter(&self, _msg: &HttpMessage, _ctx: &SessionContext) -> bool {
        true
    }

    /// Synchronous body of the filter.
    fn apply(&self, _msg: &mut HttpMessage, _ctx: &mut SessionContext) -> FilterOutput {
        Ok(None)
    }

    /// Asynchronous body of the filter, used when [`Filter::sync_type`] is
    /// [`FilterSyncType::Async`].
    fn apply_async<'a>(
        &'a self,
        msg: &'a mut HttpMessage,
        ctx: &'a mut SessionContext,
    ) -> BoxFuture<'a, FilterOutput> {
        let output = self.apply(msg, ctx);
        Box::pin(std::future::ready(output))
    }

    /// Output used when the filter is disabled, skipped, failed, or
    /// returned `Ok(None)`. Endpoints turn a request into a generic 500.
    fn default_output(&self, input: HttpMessage) -> HttpMessage {
        match (self.filter_type(), input) {
            (FilterType::Endpoint, HttpMessage::Request(req)) => {
                HttpMessage::Response(HttpResponseMessage::default_error(req))
            }
            (_, msg) => msg,
        }
    }
}

impl std::fmt::Debug for dyn Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("name", &self.name())
            .field("type", &self.filter_type())
            .field("order", &self.order())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::HttpRequestMessage;
    use axum::http::{Method, StatusCode};

    struct Plain;

    impl Filter for Plain {
        fn filter_type(&self) -> FilterType {
            FilterType::Endpoint
        }

        fn order(&self) -> i32 {
            0
        }
    }

    #[test]
    fn test_default_name_is_type_name() {
        assert!(Plain.name().ends_with("Plain"));
    }

    #[test]
    fn test_endpoint_default_output_is_500() {
        let req = HttpRequestMessage::new(Method::GET, "/");
        let out = Plain.default_output(HttpMessage::Request(req));
        assert_eq!(out.as_response().unwrap().status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_filter_type_sorts_by_phase() {
        let mut types = vec![FilterType::Outbound, FilterType::Inbound, FilterType::Endpoint];
        types.sort();
        assert_eq!(types, FilterType::ALL.to_vec());
    }
}
