//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all gateway handler
//! - Wire up middleware (tracing)
//! - Decode each request into a message and a fresh session context
//! - Run the filter chain under the overall request deadline
//! - Apply configuration reloads to origins, routes and settings
//! - Observability (access log, request metrics)
//!
//! # Data Flow
//! ```text
//! axum request
//!     → request permit (listener.max_connections)
//!     → SessionContext (config generation, request id, debug flag)
//!     → build_request_message → validate_request → read_body
//!        (failures become context errors for the error endpoint)
//!     → FilterChain::process under timeouts.request_secs
//!     → into_axum_response → access log + metrics
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tower_http::trace::TraceLayer;

use crate::config::{config_handle, ConfigHandle, GatewayConfig};
use crate::context::{CancellationFlag, PassportState, SessionContext};
use crate::errors::{GatewayError, StatusCategory};
use crate::filter::{Filter, FilterChain, FilterRegistry, FilterRunner, FilterUsageNotifier};
use crate::filters::builtin_filters;
use crate::http::request::{build_request_message, read_body, request_id_from, validate_request};
use crate::http::response::{error_response, into_axum_response};
use crate::observability::{logging, metrics};
use crate::origin::{HttpOriginConnector, OriginConnector, OriginManager};
use crate::routing::{router_handle, Router as RouteTable, RouterHandle};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ConfigHandle,
    pub chain: Arc<FilterChain>,
    pub origins: Arc<OriginManager>,
    pub routes: RouterHandle,
    /// Bounds requests processed at once.
    pub request_permits: Arc<Semaphore>,
    pub active_requests: Arc<AtomicUsize>,
    pub started: Instant,
}

impl AppState {
    pub fn registry(&self) -> &Arc<FilterRegistry> {
        self.chain.registry()
    }

    /// Install a validated configuration. Requests already running keep the
    /// generation they started with.
    pub fn apply_config(&self, config: GatewayConfig) {
        self.origins.apply_config(&config.origins);
        self.routes.store(Arc::new(RouteTable::from_config(&config.routes)));
        tracing::info!(
            origins = config.origins.len(),
            routes = config.routes.len(),
            "Configuration reloaded"
        );
        self.config.store(Arc::new(config));
        metrics::record_config_reload("success");
    }
}

/// Builder for [`HttpServer`].
pub struct HttpServerBuilder {
    config: GatewayConfig,
    filters: Vec<Arc<dyn Filter>>,
    builtin_filters: bool,
    connector: Arc<dyn OriginConnector>,
    notifier: Option<Arc<dyn FilterUsageNotifier>>,
}

impl HttpServerBuilder {
    /// Add a filter next to the built-in ones.
    pub fn filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Run only the filters added with [`HttpServerBuilder::filter`].
    pub fn without_builtin_filters(mut self) -> Self {
        self.builtin_filters = false;
        self
    }

    pub fn connector(mut self, connector: Arc<dyn OriginConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn FilterUsageNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> HttpServer {
        let origins = Arc::new(OriginManager::new(&self.config.origins, self.connector));
        let routes = router_handle(&self.config);

        let mut filters = if self.builtin_filters {
            builtin_filters(routes.clone(), origins.clone())
        } else {
            Vec::new()
        };
        filters.extend(self.filters);

        let registry = Arc::new(FilterRegistry::new(filters));
        let runner = match self.notifier {
            Some(notifier) => FilterRunner::new(notifier),
            None => FilterRunner::default(),
        };

        let state = AppState {
            request_permits: Arc::new(Semaphore::new(self.config.listener.max_connections)),
            config: config_handle(self.config),
            chain: Arc::new(FilterChain::new(registry, runner)),
            origins,
            routes,
            active_requests: Arc::new(AtomicUsize::new(0)),
            started: Instant::now(),
        };
        HttpServer { state }
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    /// Server with the built-in filters and the HTTP/1.1 origin connector.
    pub fn new(config: GatewayConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: GatewayConfig) -> HttpServerBuilder {
        HttpServerBuilder {
            config,
            filters: Vec::new(),
            builtin_filters: true,
            connector: Arc::new(HttpOriginConnector),
            notifier: None,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", any(gateway_handler))
            .route("/{*path}", any(gateway_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` fires, applying configurations received on
    /// `config_updates` as they arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let reload_state = self.state.clone();
        let reloader = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                reload_state.apply_config(config);
            }
        });

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Sets the cancellation flag if the request future is dropped before the
/// response is ready, which is how a client disconnect surfaces.
struct CancelOnDrop {
    flag: CancellationFlag,
    request_id: String,
    armed: bool,
}

impl CancelOnDrop {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(request_id = %self.request_id, "Client went away, cancelling request");
            self.flag.cancel();
        }
    }
}

/// Counts a request as active for its lifetime.
struct ActiveRequest {
    active: Arc<AtomicUsize>,
}

impl ActiveRequest {
    fn enter(active: &Arc<AtomicUsize>) -> Self {
        let now = active.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::record_active_requests(now);
        Self { active: active.clone() }
    }
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        let now = self.active.fetch_sub(1, Ordering::Relaxed) - 1;
        metrics::record_active_requests(now);
    }
}

/// Catch-all handler: every request goes through the filter chain.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let config = state.config.load_full();
    let request_id = request_id_from(request.headers());

    let Ok(_permit) = state.request_permits.clone().acquire_owned().await else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &request_id);
    };
    let _active = ActiveRequest::enter(&state.active_requests);

    let mut ctx = SessionContext::new(config.clone());
    ctx.set_request_id(request_id.clone());
    ctx.mark(PassportState::InRequestReceived);
    if request.headers().contains_key(config.filters.debug_header.as_str()) {
        ctx.set_debug_request(true);
    }
    let mut cancel_guard = CancelOnDrop {
        flag: ctx.cancellation(),
        request_id: request_id.clone(),
        armed: true,
    };

    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = request.into_parts();
    let method = parts.method.to_string();
    let path = parts.uri.path().to_string();

    let mut message = build_request_message(
        &parts.headers,
        parts.method.clone(),
        parts.uri.path(),
        parts.uri.query(),
        client_addr,
        "http",
    );
    message.protocol = format!("{:?}", parts.version);

    tracing::debug!(request_id = %request_id, method = %method, path = %path, "Request received");

    let decoded = match validate_request(&message, &config.limits) {
        Ok(()) => {
            read_body(
                body,
                config.limits.max_body_size,
                Duration::from_secs(config.timeouts.read_secs),
            )
            .await
        }
        Err(e) => Err(e),
    };
    match decoded {
        Ok(buffered) => {
            message.body = buffered;
            ctx.mark(PassportState::InRequestBodyReceived);
        }
        Err(e) => {
            tracing::info!(request_id = %request_id, error = %e, "Rejecting invalid request");
            ctx.set_error(None, e);
            ctx.set_should_send_error_response(true);
        }
    }

    let deadline = Duration::from_secs(config.timeouts.request_secs);
    let response = match tokio::time::timeout(deadline, state.chain.process(message, &mut ctx)).await {
        Ok(Ok(resp)) => into_axum_response(resp),
        Ok(Err(err)) => {
            // Only cancellation ends the chain without a response; nobody
            // reads this one.
            tracing::debug!(request_id = %request_id, error = %err, "Request abandoned");
            error_response(err.status_code(), &request_id)
        }
        Err(_) => {
            let err = GatewayError::Timeout(deadline.as_millis() as u64);
            tracing::warn!(request_id = %request_id, error = %err, "Request deadline exceeded");
            ctx.mark(PassportState::RequestTimeout);
            ctx.set_status_category(StatusCategory::FailureLocalIdleTimeout);
            ctx.set_error(None, err.clone());
            error_response(err.status_code(), &request_id)
        }
    };
    cancel_guard.disarm();

    let elapsed = started.elapsed();
    let status = response.status().as_u16();
    let category = ctx.status_category().map(|c| c.as_str()).unwrap_or("UNKNOWN");
    metrics::record_request(category, status, elapsed);
    if config.observability.access_log {
        logging::log_access(&ctx, &method, &path, status, elapsed);
    }
    response
}
