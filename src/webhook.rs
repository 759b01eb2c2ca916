//! Webhook HTTP server
//!
//! Lets Home Assistant automations push notifications into chat groups:
//! plain text via `/webhook/notify`, text plus a media attachment via
//! `/webhook/multimodal`. Both check the shared token when one is
//! configured.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::gateway::GatewayHandle;
use crate::handlers::BotContext;
use crate::media;
use crate::message::{self, Segment};
use crate::text;

pub struct WebhookState {
    pub bot: Arc<BotContext>,
    pub gateway: Arc<GatewayHandle>,
    /// Where fetched attachments land; must be reachable by the gateway
    pub media_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct NotifyRequest {
    #[serde(default)]
    group_id: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MultimodalRequest {
    #[serde(default)]
    group_id: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    token: Option<String>,
    /// Capture length in seconds for live streams
    #[serde(default)]
    duration: Option<u64>,
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> Response {
    (status, Json(json!({"detail": detail.into()}))).into_response()
}

fn check_token(state: &WebhookState, provided: Option<&str>) -> Result<(), Response> {
    let Some(expected) = state
        .bot
        .runtime
        .config
        .webhook
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
    else {
        return Ok(());
    };

    if provided == Some(expected) {
        Ok(())
    } else {
        Err(error_response(
            StatusCode::UNAUTHORIZED,
            text::invalid_webhook_token(),
        ))
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn notify(
    State(state): State<Arc<WebhookState>>,
    Json(request): Json<NotifyRequest>,
) -> Response {
    if let Err(response) = check_token(&state, request.token.as_deref()) {
        return response;
    }

    let (Some(group_id), Some(msg)) = (request.group_id, request.message.as_deref()) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            text::group_id_and_message_required(),
        );
    };
    if msg.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            text::group_id_and_message_required(),
        );
    }

    let envelope = message::group_message(group_id, None, msg);
    match state.gateway.send(&envelope).await {
        Ok(()) => {
            log::info!(
                "Sent notification to group {group_id}: {}...",
                msg.chars().take(50).collect::<String>()
            );
            Json(json!({"status": "ok", "message": text::notification_sent()})).into_response()
        }
        Err(err) => {
            log::error!("Failed to send notification: {err:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
        }
    }
}

async fn multimodal(
    State(state): State<Arc<WebhookState>>,
    Json(request): Json<MultimodalRequest>,
) -> Response {
    if let Err(response) = check_token(&state, request.token.as_deref()) {
        return response;
    }

    let Some(group_id) = request.group_id else {
        return error_response(StatusCode::BAD_REQUEST, text::group_id_required());
    };
    let msg = request.message.as_deref().filter(|m| !m.is_empty());
    let url = request.url.as_deref().filter(|u| !u.is_empty());
    if msg.is_none() && url.is_none() {
        return error_response(StatusCode::BAD_REQUEST, text::message_or_url_required());
    }

    let mut attachment: Option<Segment> = None;
    let mut file_path: Option<String> = None;
    if let Some(url) = url {
        log::info!("Processing media from URL: {url}");
        match media::fetch(url, request.duration.unwrap_or(60), &state.media_dir).await {
            Ok((path, kind)) => {
                attachment = Some(media::attachment_segment(kind, &path));
                file_path = Some(path.to_string_lossy().to_string());
            }
            Err(err) => {
                log::error!("Error processing media: {err:#}");
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    text::failed_to_process_video_stream(&format!("{err:#}")),
                );
            }
        }
    }

    let gateway_cfg = &state.bot.runtime.config.gateway;
    let envelope = message::forward_card(
        group_id,
        &gateway_cfg.account,
        &gateway_cfg.nickname,
        msg,
        attachment,
    );

    match state.gateway.send(&envelope).await {
        Ok(()) => Json(json!({
            "status": "ok",
            "message": "Multimodal notification sent",
            "file_path": file_path,
        }))
        .into_response(),
        Err(err) => {
            log::error!("Failed to send multimodal notification: {err:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
        }
    }
}

pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/webhook/notify", post(notify))
        .route("/webhook/multimodal", post(multimodal))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve the webhook API until the process exits
pub async fn serve(state: Arc<WebhookState>) -> Result<()> {
    let bind = state.bot.runtime.config.webhook.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding webhook server to {bind}"))?;

    log::info!("Webhook server started on {bind}");
    axum::serve(listener, router(state))
        .await
        .context("webhook server failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, RuntimeContext};
    use tokio::sync::mpsc;

    async fn spawn_server(config: AppConfig) -> (String, mpsc::Receiver<String>) {
        let bot = Arc::new(BotContext::new(RuntimeContext::with_config(config)).unwrap());
        let gateway = Arc::new(GatewayHandle::new());
        let rx = gateway.connect_for_test();
        let media_dir = std::env::temp_dir().join("habridge-test-media");

        let state = Arc::new(WebhookState {
            bot,
            gateway,
            media_dir,
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        (format!("http://{addr}"), rx)
    }

    fn base_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.homeassistant.token = Some("test-token".to_string());
        config
    }

    #[tokio::test]
    async fn test_health() {
        let (base, _rx) = spawn_server(base_config()).await;
        let response = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_notify_forwards_to_gateway() {
        let (base, mut rx) = spawn_server(base_config()).await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("{base}/webhook/notify"))
            .json(&json!({"group_id": 777, "message": "door opened"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let sent = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&sent).unwrap();
        assert_eq!(value["action"], "send_group_msg");
        assert_eq!(value["params"]["group_id"], 777);
        assert_eq!(value["params"]["message"][0]["data"]["text"], "door opened");
    }

    #[tokio::test]
    async fn test_notify_requires_fields() {
        let (base, _rx) = spawn_server(base_config()).await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("{base}/webhook/notify"))
            .json(&json!({"group_id": 777}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_token_enforced_when_configured() {
        let mut config = base_config();
        config.webhook.token = Some("secret".to_string());
        let (base, mut rx) = spawn_server(config).await;

        let client = reqwest::Client::new();
        let denied = client
            .post(format!("{base}/webhook/notify"))
            .json(&json!({"group_id": 1, "message": "hi", "token": "wrong"}))
            .send()
            .await
            .unwrap();
        assert_eq!(denied.status(), 401);

        let allowed = client
            .post(format!("{base}/webhook/notify"))
            .json(&json!({"group_id": 1, "message": "hi", "token": "secret"}))
            .send()
            .await
            .unwrap();
        assert_eq!(allowed.status(), 200);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_multimodal_text_only_sends_forward_card() {
        let (base, mut rx) = spawn_server(base_config()).await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("{base}/webhook/multimodal"))
            .json(&json!({"group_id": 9, "message": "motion detected"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let sent = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&sent).unwrap();
        assert_eq!(value["action"], "send_group_forward_msg");
        assert_eq!(value["params"]["prompt"], "motion detected");
    }

    #[tokio::test]
    async fn test_multimodal_requires_message_or_url() {
        let (base, _rx) = spawn_server(base_config()).await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("{base}/webhook/multimodal"))
            .json(&json!({"group_id": 9}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_notify_fails_when_gateway_down() {
        let bot = Arc::new(
            BotContext::new(RuntimeContext::with_config(base_config())).unwrap(),
        );
        let state = Arc::new(WebhookState {
            bot,
            gateway: Arc::new(GatewayHandle::new()),
            media_dir: std::env::temp_dir(),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{addr}/webhook/notify"))
            .json(&json!({"group_id": 1, "message": "hi"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 500);
    }
}
