/**
 * API REST CAMWATCH - Exposition JSON du snapshot et des historiques
 *
 * RÔLE :
 * Plomberie minimale entre le dashboard et le noyau d'agrégation.
 * Aucune logique métier ici : chaque route délègue au noyau.
 *
 * ROUTES :
 * - GET /health          liveness du daemon lui-même
 * - GET /api/status      snapshot complet
 * - GET /api/cameras     lignes caméras du snapshot
 * - GET /api/streams     URLs RTSP go2rtc / neolink par caméra
 * - GET /api/config      configuration déclarée (mot de passe RTSP masqué)
 * - GET /api/motion      événements motion récents
 * - GET /api/logs?limit= lignes de log récentes (défaut 100, max 200)
 */

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use std::collections::HashMap;
use std::sync::Arc;

use crate::aggregator::StatusAggregator;
use crate::history::{LogLine, MessageLog, MotionEvent, MotionLog, MESSAGE_LOG_CAPACITY, MOTION_LOG_CAPACITY};
use crate::snapshot::{ConfigView, DeviceRow, Snapshot, StreamEntry};

const DEFAULT_LOG_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<StatusAggregator>,
    pub motion_log: MotionLog,
    pub message_log: MessageLog,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/status", get(get_status))
        .route("/api/cameras", get(get_cameras))
        .route("/api/streams", get(get_streams))
        .route("/api/config", get(get_config))
        .route("/api/motion", get(get_motion))
        .route("/api/logs", get(get_logs))
        .with_state(app_state)
}

// GET /api/status
async fn get_status(State(app): State<AppState>) -> Json<Snapshot> {
    Json(app.aggregator.snapshot().await)
}

// GET /api/cameras
async fn get_cameras(State(app): State<AppState>) -> Json<Vec<DeviceRow>> {
    Json(app.aggregator.snapshot().await.devices)
}

// GET /api/streams
async fn get_streams(State(app): State<AppState>) -> Json<Vec<StreamEntry>> {
    Json(app.aggregator.stream_entries())
}

// GET /api/config
async fn get_config(State(app): State<AppState>) -> Json<ConfigView> {
    Json(app.aggregator.config_view())
}

// GET /api/motion
async fn get_motion(State(app): State<AppState>) -> Json<Vec<MotionEvent>> {
    Json(app.motion_log.recent_entries(MOTION_LOG_CAPACITY))
}

// GET /api/logs?limit=N
async fn get_logs(
    State(app): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Vec<LogLine>> {
    let limit = log_limit(params.get("limit").map(String::as_str));
    Json(app.message_log.recent_entries(limit))
}

/// Limite demandée bornée à la capacité du buffer; illisible = défaut.
fn log_limit(raw: Option<&str>) -> usize {
    raw.and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .min(MESSAGE_LOG_CAPACITY)
}
