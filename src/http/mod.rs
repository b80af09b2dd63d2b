//! HTTP transport adapter.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, catch-all handler, reloads, shutdown)
//!     → request.rs (request ID, decode, validate, buffer body)
//!     → filter chain
//!     → response.rs (encode the response message)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{build_request_message, X_REQUEST_ID};
pub use server::{AppState, HttpServer, HttpServerBuilder};
