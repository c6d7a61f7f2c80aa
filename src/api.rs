//! HTTP API: ping, QR login and message sending.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use log::{error, info};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::GatewayError;
use crate::service::{GatewayService, LoginResponse, SendRequest};

/// Base64 images travel inside the JSON body.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    service: Arc<GatewayService>,
}

/// `GET /ping`
async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

/// `GET /v1/login`: QR code PNG for an unpaired session.
async fn login(State(state): State<ApiState>) -> Response {
    match state.service.login().await {
        Ok(LoginResponse::QrPng(png)) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, "image/png")], png).into_response()
        }
        Ok(LoginResponse::AlreadyLoggedIn) => {
            (StatusCode::OK, Json(json!({ "message": "already login" }))).into_response()
        }
        Err(err) => {
            error!("Login failed: {err}");
            err.into_response()
        }
    }
}

/// `POST /v1/send-message`: text, or an image captioned with the text.
async fn send_message(
    State(state): State<ApiState>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return GatewayError::Bind(rejection.body_text()).into_response(),
    };

    match state.service.send_message(&req).await {
        Ok(ack) => (
            StatusCode::OK,
            Json(json!({ "message": "success send message", "data": ack })),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

/// Build the axum router with shared state.
pub fn router(service: Arc<GatewayService>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/v1/login", get(login))
        .route("/v1/send-message", post(send_message))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(ApiState { service })
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn serve<F>(config: &Config, service: Arc<GatewayService>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {addr}");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}
