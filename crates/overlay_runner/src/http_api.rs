use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use core_types::{InterceptedRequest, InterceptedResponse, RangeKey};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::sync::oneshot;
use traffic_router::{Continue, InterceptionHook};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) hook: InterceptionHook,
    pub(crate) prometheus: PrometheusHandle,
}

#[derive(Serialize)]
struct HealthResp {
    status: &'static str,
    source: &'static str,
    loaded: bool,
}

#[derive(Debug, Serialize)]
struct CurrentResp {
    range: RangeKey,
    fetched_at_ms: i64,
    expires_at_ms: i64,
}

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/hook/request", post(hook_request))
        .route("/hook/response", post(hook_response))
        .route("/cache/clear", post(cache_clear))
        .route("/cache/current", get(cache_current))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResp> {
    let provider = state.hook.provider();
    Json(HealthResp {
        status: "ok",
        source: provider.source_name(),
        loaded: provider.current().is_some(),
    })
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}

async fn hook_request(State(state): State<AppState>, Json(req): Json<InterceptedRequest>) -> StatusCode {
    let (tx, rx) = oneshot::channel();
    state.hook.on_request(
        req,
        Continue::new(move |req| {
            let _ = tx.send(req);
        }),
    );
    match rx.await {
        Ok(_) => StatusCode::NO_CONTENT,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn hook_response(
    State(state): State<AppState>,
    Json(resp): Json<InterceptedResponse>,
) -> Result<Json<InterceptedResponse>, StatusCode> {
    let (tx, rx) = oneshot::channel();
    state.hook.on_response(
        resp,
        Continue::new(move |resp| {
            let _ = tx.send(resp);
        }),
    );
    rx.await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn cache_clear(State(state): State<AppState>) -> StatusCode {
    state.hook.provider().clear();
    StatusCode::NO_CONTENT
}

async fn cache_current(State(state): State<AppState>) -> Result<Json<CurrentResp>, StatusCode> {
    let snap = state.hook.provider().current().ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(CurrentResp {
        range: snap.range.clone(),
        fetched_at_ms: snap.fetched_at_ms,
        expires_at_ms: snap.expires_at_ms,
    }))
}
