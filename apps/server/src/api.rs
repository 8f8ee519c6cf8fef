//! HTTP surface: history queries and the streaming chat route.

use std::{convert::Infallible, sync::Arc};

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use colloquy_chat::{ChatRequest, ChatTurn};

use crate::{
    config::Config,
    error::ApiResult,
    main_lib::AppState,
};

async fn healthz() -> &'static str {
    "ok"
}

/// GET /history — the full transcript in creation order.
async fn get_history(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<ChatTurn>>> {
    let turns = state.store.history().await?;
    Ok(Json(turns))
}

/// DELETE /history — best-effort clear; a storage failure is logged but the
/// response stays 200.
async fn clear_history(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    if let Err(e) = state.store.clear().await {
        tracing::error!("failed to clear history: {e}");
    }
    Json(json!({ "message": "history cleared" }))
}

/// POST /chat — relay one user message and stream the reply.
///
/// Each fragment is written to the wire as raw text, no envelope or prefix;
/// the client treats stream end as completion regardless of cause. A
/// provider failure before streaming starts yields a plain-text 502.
async fn chat(State(state): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> Response {
    match state.relay.relay(&req.message).await {
        Ok(stream) => {
            let body = Body::from_stream(stream.map(Ok::<_, Infallible>));
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/event-stream")
                .header(header::CACHE_CONTROL, "no-cache")
                .body(body)
                .unwrap()
        }
        Err(e) => {
            tracing::warn!("chat relay failed before streaming: {e}");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

pub fn app_router(state: Arc<AppState>, config: &Config) -> Router {
    let cors = if config.cors_allow.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins = config
            .cors_allow
            .iter()
            .map(|o| o.parse().unwrap())
            .collect::<Vec<_>>();
        CorsLayer::new().allow_origin(origins)
    };
    let cors = cors
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/history", get(get_history).delete(clear_history))
        .route("/chat", post(chat))
        .with_state(state)
        .layer(cors)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
}
