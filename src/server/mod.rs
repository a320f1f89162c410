use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::bot::ChatBot;
use crate::core::Result;
use crate::envconfig::ServiceConfig;

const CHAT_PAGE: &str = include_str!("chat.html");

#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<ChatBot>,
    pub decode_timeout: Duration,
}

#[derive(Deserialize)]
struct TalkParams {
    #[serde(default)]
    inpt: String,
}

#[derive(Serialize)]
struct TalkResponse {
    reply: String,
}

pub async fn serve(config: &ServiceConfig, bot: Arc<ChatBot>) -> Result<()> {
    let state = AppState {
        bot,
        decode_timeout: config.decode_timeout,
    };
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&config.host)
        .await
        .with_context(|| format!("binding {}", config.host))?;
    tracing::info!(addr = %config.host, "chat service listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", get(chat_page))
        .route("/chat/talk", get(talk))
        .route("/api/health", get(health))
        .route("/api/version", get(version))
        .with_state(state)
}

async fn chat_page() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "OK" }))
}

async fn version() -> impl IntoResponse {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

async fn talk(State(state): State<AppState>, Query(params): Query<TalkParams>) -> Response {
    let request_id = Uuid::new_v4();
    let input = params.inpt;
    tracing::info!(%request_id, input_chars = input.chars().count(), "chat request");

    let bot = state.bot.clone();
    let decode = tokio::task::spawn_blocking(move || bot.reply(&input));
    // On timeout the blocking task is abandoned, not cancelled; it still
    // finishes in the background.
    match tokio::time::timeout(state.decode_timeout, decode).await {
        Err(_) => {
            tracing::error!(%request_id, "reply timed out");
            error_response(StatusCode::GATEWAY_TIMEOUT, "reply timed out")
        }
        Ok(Err(join_err)) => {
            tracing::error!(%request_id, error = %join_err, "decode task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "decode task failed")
        }
        Ok(Ok(Err(err))) => {
            tracing::error!(%request_id, error = %err, "decode failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
        Ok(Ok(Ok(reply))) => {
            tracing::debug!(%request_id, reply_chars = reply.chars().count(), "chat reply");
            Json(TalkResponse { reply }).into_response()
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
