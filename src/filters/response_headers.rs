//! Outbound response header filter.

use crate::context::SessionContext;
use crate::errors::StatusCategory;
use crate::filter::{Filter, FilterOutput, FilterType};
use crate::message::HttpMessage;

pub const NAME: &str = "outbound.ResponseHeaders";

/// Value of the `Server` header.
pub const SERVER_NAME: &str = concat!("edge-gateway/", env!("CARGO_PKG_VERSION"));

/// Stamps gateway headers on every response and strips hop-by-hop ones.
/// Debug requests also get the status category and the filter summary.
#[derive(Debug, Default)]
pub struct ResponseHeadersFilter;

impl Filter for ResponseHeadersFilter {
    fn name(&self) -> &str {
        NAME
    }

    fn filter_type(&self) -> FilterType {
        FilterType::Outbound
    }

    fn order(&self) -> i32 {
        10
    }

    fn override_stop_filter_processing(&self) -> bool {
        true
    }

    fn apply(&self, msg: &mut HttpMessage, ctx: &mut SessionContext) -> FilterOutput {
        let Some(resp) = msg.as_response_mut() else {
            return Ok(None);
        };
        resp.headers.remove_hop_by_hop();
        resp.headers.set("X-Request-ID", ctx.request_id());
        resp.headers.set("Server", SERVER_NAME);

        if ctx.debug_request() {
            let category = ctx.status_category().unwrap_or_else(|| {
                if resp.status.is_server_error() {
                    StatusCategory::FailureLocal
                } else {
                    StatusCategory::Success
                }
            });
            resp.headers.set("X-Gateway-Status", category.as_str());
            resp.headers.set("X-Gateway-Filters", ctx.execution_summary());
        }
        Ok(None)
    }
}
