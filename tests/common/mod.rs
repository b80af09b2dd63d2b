//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{HeaderMap, Method, StatusCode};
use edge_gateway::config::{GatewayConfig, OriginConfig, RouteConfig};
use edge_gateway::context::SessionContext;
use edge_gateway::errors::GatewayError;
use edge_gateway::filter::{
    Filter, FilterChain, FilterOutput, FilterRegistry, FilterRunner, FilterSyncType, FilterType,
};
use edge_gateway::http::HttpServer;
use edge_gateway::lifecycle::Shutdown;
use edge_gateway::message::{HttpMessage, HttpRequestMessage, HttpResponseMessage};
use edge_gateway::origin::{OriginConnection, OriginConnector, OriginRequest, OriginResponse, OriginServer};
use futures_util::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Names of the filters whose `apply` ran, in call order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// What a [`TestFilter`] does when applied.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Leave the message alone.
    Pass,
    /// Set a header on whatever message the filter sees.
    SetHeader(&'static str, &'static str),
    /// Return an error.
    Fail,
    /// Panic inside `apply`.
    Panic,
    /// `should_filter` returns false.
    NotApplicable,
    /// Ask the chain to stop running the remaining filters.
    Stop,
    /// Endpoint: answer with a status and a text body.
    Respond(u16, &'static str),
}

/// Configurable filter that records its invocations.
pub struct TestFilter {
    name: String,
    filter_type: FilterType,
    order: i32,
    sync_type: FilterSyncType,
    behavior: Behavior,
    disabled: AtomicBool,
    override_stop: bool,
    log: CallLog,
}

impl TestFilter {
    pub fn new(name: &str, filter_type: FilterType, order: i32, behavior: Behavior, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            filter_type,
            order,
            sync_type: FilterSyncType::Sync,
            behavior,
            disabled: AtomicBool::new(false),
            override_stop: false,
            log: log.clone(),
        }
    }

    pub fn inbound(name: &str, order: i32, behavior: Behavior, log: &CallLog) -> Self {
        Self::new(name, FilterType::Inbound, order, behavior, log)
    }

    pub fn outbound(name: &str, order: i32, behavior: Behavior, log: &CallLog) -> Self {
        Self::new(name, FilterType::Outbound, order, behavior, log)
    }

    pub fn endpoint(name: &str, behavior: Behavior, log: &CallLog) -> Self {
        Self::new(name, FilterType::Endpoint, 0, behavior, log)
    }

    /// Run through `apply_async`, yielding to the scheduler first.
    pub fn asynchronous(mut self) -> Self {
        self.sync_type = FilterSyncType::Async;
        self
    }

    pub fn overriding_stop(mut self) -> Self {
        self.override_stop = true;
        self
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::SeqCst);
    }

    pub fn shared(self) -> Arc<dyn Filter> {
        Arc::new(self)
    }
}

impl Filter for TestFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn sync_type(&self) -> FilterSyncType {
        self.sync_type
    }

    fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    fn override_stop_filter_processing(&self) -> bool {
        self.override_stop
    }

    fn should_filter(&self, _msg: &HttpMessage, _ctx: &SessionContext) -> bool {
        !matches!(self.behavior, Behavior::NotApplicable)
    }

    fn apply(&self, msg: &mut HttpMessage, ctx: &mut SessionContext) -> FilterOutput {
        self.log.lock().unwrap().push(self.name.clone());
        match &self.behavior {
            Behavior::Pass | Behavior::NotApplicable => Ok(None),
            Behavior::SetHeader(name, value) => {
                msg.headers_mut().set(*name, *value);
                Ok(None)
            }
            Behavior::Fail => Err(GatewayError::FilterExecution {
                filter: self.name.clone(),
                message: "boom".to_string(),
            }),
            Behavior::Panic => panic!("{} exploded", self.name),
            Behavior::Stop => {
                ctx.set_stop_filter_processing(true);
                Ok(None)
            }
            Behavior::Respond(status, body) => {
                let status = StatusCode::from_u16(*status).unwrap();
                let mut resp = HttpResponseMessage::new(msg.request(), status);
                resp.set_body_text("text/plain", *body);
                Ok(Some(HttpMessage::Response(resp)))
            }
        }
    }

    fn apply_async<'a>(
        &'a self,
        msg: &'a mut HttpMessage,
        ctx: &'a mut SessionContext,
    ) -> BoxFuture<'a, FilterOutput> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.apply(msg, ctx)
        })
    }
}

pub fn chain_of(filters: Vec<Arc<dyn Filter>>) -> FilterChain {
    FilterChain::new(Arc::new(FilterRegistry::new(filters)), FilterRunner::default())
}

pub fn context() -> SessionContext {
    context_with(GatewayConfig::default())
}

pub fn context_with(config: GatewayConfig) -> SessionContext {
    let mut ctx = SessionContext::new(Arc::new(config));
    ctx.set_request_id("test-request");
    ctx
}

pub fn get(path: &str) -> HttpRequestMessage {
    HttpRequestMessage::new(Method::GET, path)
}

/// One scripted origin outcome for [`FakeConnector`].
#[derive(Debug, Clone)]
pub enum Scripted {
    Respond(u16, &'static str),
    ConnectError,
    /// Connect succeeds, the send fails with a reset.
    Reset,
}

/// Origin connector that plays back a script instead of opening sockets.
/// Once the script runs out every connection answers 200 "ok". Connections
/// are closed after one exchange unless [`FakeConnector::keep_alive`] is set.
pub struct FakeConnector {
    script: Mutex<VecDeque<Scripted>>,
    connects: AtomicUsize,
    response_delay: Duration,
    keep_alive: bool,
}

impl FakeConnector {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            connects: AtomicUsize::new(0),
            response_delay: Duration::ZERO,
            keep_alive: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    /// Hand out connections the pool may reuse.
    pub fn keep_alive(mut self) -> Self {
        self.keep_alive = true;
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl OriginConnector for FakeConnector {
    fn connect<'a>(
        &'a self,
        server: &'a OriginServer,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<Box<dyn OriginConnection>, GatewayError>> {
        Box::pin(async move {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Scripted::Respond(200, "ok"));
            match next {
                Scripted::ConnectError => Err(GatewayError::OriginConnectError {
                    server: server.addr.to_string(),
                    message: "connection refused".to_string(),
                }),
                outcome => Ok(Box::new(FakeConnection {
                    server: server.addr.to_string(),
                    outcome,
                    delay: self.response_delay,
                    keep_alive: self.keep_alive,
                }) as Box<dyn OriginConnection>),
            }
        })
    }
}

struct FakeConnection {
    server: String,
    outcome: Scripted,
    delay: Duration,
    keep_alive: bool,
}

impl OriginConnection for FakeConnection {
    fn send(&mut self, _request: OriginRequest) -> BoxFuture<'_, Result<OriginResponse, GatewayError>> {
        Box::pin(async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.outcome {
                Scripted::Respond(status, body) => Ok(OriginResponse {
                    status: StatusCode::from_u16(*status).unwrap(),
                    headers: HeaderMap::new(),
                    body: (*body).into(),
                }),
                _ => Err(GatewayError::OriginResetConnection {
                    server: self.server.clone(),
                    message: "reset by peer".to_string(),
                }),
            }
        })
    }

    fn is_reusable(&self) -> bool {
        self.keep_alive
    }
}

/// Gateway config with one origin named `api` routed at `/`.
pub fn proxy_config(servers: &[String]) -> GatewayConfig {
    GatewayConfig {
        origins: vec![OriginConfig {
            name: "api".into(),
            servers: servers.to_vec(),
            retry_backoff_base_ms: 0,
            ..Default::default()
        }],
        routes: vec![RouteConfig {
            name: "all".into(),
            host: None,
            path_prefix: Some("/".into()),
            origin: "api".into(),
            endpoint: None,
            priority: 0,
        }],
        ..Default::default()
    }
}

/// Serve `server` on an ephemeral port until the returned handle triggers.
pub async fn start_gateway(server: HttpServer) -> (SocketAddr, Shutdown, mpsc::UnboundedSender<GatewayConfig>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (config_tx, config_updates) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });
    (addr, shutdown, config_tx)
}

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (200, response.to_string()) }).await
}

/// Start a mock backend whose status and body come from `f`, one call per
/// connection.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                // Read the request head before answering.
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                while read < buf.len() {
                    match socket.read(&mut buf[read..]).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => read += n,
                    }
                    if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }

                let (status, body) = f().await;
                let reason = StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("OK");
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}
