use axum::{extract::State, Json};
use serde::Serialize;

use crate::filter::FilterInfo;
use crate::http::server::AppState;
use crate::origin::OriginStatus;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub active_requests: usize,
    pub filter_generation: u64,
    pub origins: usize,
    pub routes: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started.elapsed().as_secs(),
        active_requests: state.active_requests.load(std::sync::atomic::Ordering::Relaxed),
        filter_generation: state.registry().generation().id(),
        origins: state.origins.len(),
        routes: state.routes.load().len(),
    })
}

pub async fn get_filters(State(state): State<AppState>) -> Json<Vec<FilterInfo>> {
    let config = state.config.load();
    Json(state.registry().filter_infos(&config.filters))
}

pub async fn get_origins(State(state): State<AppState>) -> Json<Vec<OriginStatus>> {
    Json(state.origins.all().iter().map(|o| o.status()).collect())
}
