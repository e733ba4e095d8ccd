use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::llm::{Completer, Completion, CompletionClient};
use crate::platform::telegram::{TelegramNotifier, Update};
use crate::platform::{Delivery, Notify};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    completer: Arc<dyn Completer>,
    notifier: Arc<dyn Notify>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self::with_clients(
            Arc::new(CompletionClient::new(config)),
            Arc::new(TelegramNotifier::new(config)),
        )
    }

    pub fn with_clients(completer: Arc<dyn Completer>, notifier: Arc<dyn Notify>) -> Self {
        Self {
            completer,
            notifier,
        }
    }
}

/// Everything that happened while relaying one update.
#[derive(Debug)]
pub struct Relay {
    pub chat_id: i64,
    pub completion: Completion,
    pub delivery: Result<Delivery>,
}

/// Decode an update, ask for a completion, send it back to the chat.
///
/// Nothing here fails: a bad body becomes an empty prompt for chat 0, a
/// failed completion becomes the fallback reply, a failed send is logged.
pub async fn relay(state: &AppState, body: &[u8]) -> Relay {
    let (update, decode_err) = Update::decode(body);
    if let Some(e) = decode_err {
        warn!("Failed to decode webhook update: {}", e);
    }

    let message = update.message;
    info!(
        "Update {} (message {}) from {} in chat {} {:?}: {:?}",
        update.update_id,
        message.message_id,
        message.from.id,
        message.chat.id,
        message.chat.title,
        message.text
    );

    let completion = state.completer.complete(&message.text).await;
    if completion.is_fallback() {
        info!("Replying to chat {} with the fallback reply", message.chat.id);
    }

    let delivery = state
        .notifier
        .send_message(message.chat.id, completion.text())
        .await;
    match &delivery {
        Ok(d) if !d.is_success() => warn!(
            "Telegram rejected reply to chat {} ({}): {}",
            message.chat.id, d.status, d.body
        ),
        Ok(_) => {}
        Err(e) => error!("Failed to deliver reply to chat {}: {:#}", message.chat.id, e),
    }

    Relay {
        chat_id: message.chat.id,
        completion,
        delivery,
    }
}

#[derive(Serialize)]
struct PingResponse {
    message: &'static str,
}

/// Always 200. The body is read without a size limit and a body that can't
/// be read at all is relayed like an undecodable one.
async fn telegram_webhook(State(state): State<AppState>, body: Body) -> StatusCode {
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to read webhook body: {}", e);
            Default::default()
        }
    };

    let outcome = relay(&state, &body).await;
    debug!(
        "Relayed update to chat {} (fallback: {}, delivered: {})",
        outcome.chat_id,
        outcome.completion.is_fallback(),
        outcome.delivery.as_ref().is_ok_and(Delivery::is_success)
    );
    StatusCode::OK
}

async fn ping() -> Json<PingResponse> {
    Json(PingResponse { message: "pong" })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/telegram/webhook",
            post(telegram_webhook).layer(DefaultBodyLimit::disable()),
        )
        .route("/ping", get(ping))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
