use anyhow::Result;
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Query, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Instant, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::WxPaths;
use crate::weather::WeatherReading;

/// Realistic acceptance ranges per known metric. Metrics outside their
/// range are rejected; unknown keys are accepted if numeric.
const LIMITS: &[(&str, f64, f64)] = &[
    ("temperature", -50.0, 70.0),
    ("humidity", 0.0, 100.0),
    ("pressure", 800.0, 1200.0),
    ("wind_speed", 0.0, 100.0),
    ("wind_direction", 0.0, 360.0),
    ("wind_gust", 0.0, 150.0),
    ("rain_1h", 0.0, 200.0),
    ("rain_24h", 0.0, 1000.0),
    ("dewpoint", -60.0, 50.0),
];

#[derive(Clone)]
pub struct AppState {
    paths: WxPaths,
    started_at: Instant,
    metrics: PrometheusHandle,
}

/// Numeric value of a submitted metric. Strings support both `.` and `,`
/// as decimal separator (comma normalized to dot before parsing).
fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

/// Range-validate a submitted document, splitting it into the accepted
/// reading and the rejected keys.
pub fn validate_reading(data: &serde_json::Map<String, Value>) -> (WeatherReading, Vec<String>) {
    let mut validated = WeatherReading::new();
    let mut rejected = Vec::new();
    for (key, value) in data {
        let Some(v) = numeric_value(value) else {
            warn!("rejected {}: {} - numeric conversion failed", key, value);
            rejected.push(key.clone());
            continue;
        };
        match LIMITS.iter().find(|(name, _, _)| *name == key.as_str()) {
            Some((_, min, max)) if v >= *min && v <= *max => {
                validated.insert(key.clone(), v);
            }
            Some((_, min, max)) => {
                warn!("rejected {}: {} - valid range [{}, {}]", key, v, min, max);
                rejected.push(key.clone());
            }
            None => {
                info!("unmapped parameter {} accepted: {}", key, v);
                validated.insert(key.clone(), v);
            }
        }
    }
    (validated, rejected)
}

/// Whole-value replace via temp file + rename so the daemon never
/// observes a torn document.
async fn persist_reading(path: &Path, reading: &WeatherReading) -> Result<()> {
    let body = serde_json::to_string_pretty(reading)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn process_reading(state: &AppState, data: serde_json::Map<String, Value>) -> Response {
    if data.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "No valid weather data received",
                "help": "Send data via POST JSON or GET parameters",
                "decimal_format": "Both dot (22.5) and comma (22,5) supported",
            })),
        )
            .into_response();
    }

    let (validated, rejected) = validate_reading(&data);
    metrics::counter!("wxgate.ingest.metrics_accepted_total").increment(validated.len() as u64);
    metrics::counter!("wxgate.ingest.metrics_rejected_total").increment(rejected.len() as u64);

    if validated.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "All weather data rejected due to validation",
                "rejected_params": rejected,
            })),
        )
            .into_response();
    }

    match persist_reading(&state.paths.reading, &validated).await {
        Ok(()) => {
            info!("weather data saved: {} parameters", validated.len());
            let mut response = json!({
                "status": "ok",
                "accepted": validated.len(),
                "accepted_params": validated.keys().collect::<Vec<_>>(),
            });
            if !rejected.is_empty() {
                response["rejected"] = json!(rejected.len());
                response["rejected_params"] = json!(rejected);
            }
            Json(response).into_response()
        }
        Err(e) => {
            error!("failed to persist reading: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("File save error: {e}") })),
            )
                .into_response()
        }
    }
}

async fn wx_get(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let data = params
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    process_reading(&state, data).await
}

async fn wx_post(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    // JSON body wins; fall back to query parameters otherwise.
    let data = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(map)) if !map.is_empty() => map,
        _ => params
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect(),
    };
    process_reading(&state, data).await
}

async fn health(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "healthy",
        "uptime": state.started_at.elapsed().as_secs_f64(),
    }))
    .into_response()
}

async fn status(State(state): State<AppState>) -> Response {
    let last_reading = std::fs::read_to_string(&state.paths.reading)
        .ok()
        .and_then(|text| serde_json::from_str::<Value>(&text).ok());
    let last_update = std::fs::metadata(&state.paths.reading)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64());
    Json(json!({
        "status": "running",
        "last_weather_data": last_reading,
        "last_update": last_update,
        "uptime": state.started_at.elapsed().as_secs_f64(),
    }))
    .into_response()
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    state.metrics.render().into_response()
}

/// Request logging with a short correlation id.
async fn request_logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = Uuid::new_v4().to_string()[..8].to_string();
    let start_time = Instant::now();

    info!("Started {} {} [{}]", method, path, request_id);
    let response = next.run(request).await;
    info!(
        "Completed {} {} [{}] {} in {:.2}ms",
        method,
        path,
        request_id,
        response.status().as_u16(),
        start_time.elapsed().as_secs_f64() * 1000.0
    );
    response
}

pub fn app(paths: WxPaths, metrics: PrometheusHandle) -> Router {
    let state = AppState {
        paths,
        started_at: Instant::now(),
        metrics,
    };
    Router::new()
        .route("/wx", get(wx_get).post(wx_post))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(CorsLayer::permissive())
}

pub async fn serve(
    listen: &str,
    paths: WxPaths,
    metrics: PrometheusHandle,
    token: CancellationToken,
) -> Result<()> {
    let app = app(paths, metrics);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!("ingest service listening on http://{}", listen);
    axum::serve(listener, app)
        .with_graceful_shutdown(token.cancelled_owned())
        .await?;
    Ok(())
}
