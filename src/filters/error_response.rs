//! Error response endpoint.

use axum::http::StatusCode;

use crate::context::SessionContext;
use crate::filter::{Filter, FilterOutput, FilterType};
use crate::filters::ERROR_RESPONSE_ENDPOINT;
use crate::message::{HttpMessage, HttpResponseMessage};

/// Renders the context's error as a generic response: the status comes from
/// the error, the body is the status' reason phrase.
#[derive(Debug, Default)]
pub struct ErrorResponseEndpoint;

impl Filter for ErrorResponseEndpoint {
    fn name(&self) -> &str {
        ERROR_RESPONSE_ENDPOINT
    }

    fn filter_type(&self) -> FilterType {
        FilterType::Endpoint
    }

    fn order(&self) -> i32 {
        0
    }

    fn apply(&self, msg: &mut HttpMessage, ctx: &mut SessionContext) -> FilterOutput {
        let status = ctx
            .error()
            .map(|e| e.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let response = HttpResponseMessage::error(msg.request().without_body(), status);
        Ok(Some(HttpMessage::Response(response)))
    }
}
