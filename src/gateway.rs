//! Chat gateway connection
//!
//! Maintains the WebSocket connection to the group-chat gateway, filters
//! inbound events against the configured allow-lists, and dispatches each
//! accepted message on its own task so a slow Home Assistant call never
//! blocks the read loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::handlers::{self, BotContext};
use crate::message::{self, ChatEvent, Envelope};
use crate::router;
use crate::voice;

/// Handle to the currently connected gateway socket.
///
/// The webhook server sends through this; while the socket is down, sends
/// fail fast instead of queueing.
#[derive(Default)]
pub struct GatewayHandle {
    sender: Mutex<Option<mpsc::Sender<String>>>,
}

impl GatewayHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, sender: mpsc::Sender<String>) {
        *self.sender.lock().expect("gateway lock poisoned") = Some(sender);
    }

    fn clear(&self) {
        *self.sender.lock().expect("gateway lock poisoned") = None;
    }

    pub fn is_connected(&self) -> bool {
        self.sender.lock().expect("gateway lock poisoned").is_some()
    }

    /// Wire up a test receiver in place of a live socket
    #[cfg(test)]
    pub(crate) fn connect_for_test(&self) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(8);
        self.set(tx);
        rx
    }

    /// Queue an envelope for delivery on the current connection
    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        let sender = self
            .sender
            .lock()
            .expect("gateway lock poisoned")
            .clone()
            .ok_or_else(|| anyhow!("WebSocket connection not available"))?;

        sender
            .send(envelope.to_json())
            .await
            .context("queueing gateway message")
    }
}

/// Whether an id passes an allow-list; no list means everything passes
fn allowed(list: &Option<Vec<String>>, id: i64) -> bool {
    match list {
        Some(ids) => ids.iter().any(|allowed| *allowed == id.to_string()),
        None => true,
    }
}

/// Run the gateway connection until the process shuts down.
///
/// Reconnects forever with the configured delay. Every successful connect
/// kicks off a background cache refresh so commands work shortly after
/// startup without blocking message handling.
pub async fn run(bot: Arc<BotContext>, handle: Arc<GatewayHandle>) {
    let url = bot.runtime.config.gateway.url.clone();
    let delay = Duration::from_secs(bot.runtime.config.gateway.reconnect_delay.max(1));

    loop {
        log::info!("Connecting to chat gateway: {url}");
        match connect_async(&url).await {
            Ok((stream, _)) => {
                if let Err(err) = serve_connection(&bot, &handle, stream).await {
                    log::warn!("Gateway connection ended: {err:#}");
                }
            }
            Err(err) => {
                log::warn!("Failed to connect to gateway: {err:#}");
            }
        }

        handle.clear();
        log::info!("Reconnecting in {}s...", delay.as_secs());
        tokio::time::sleep(delay).await;
    }
}

async fn serve_connection(
    bot: &Arc<BotContext>,
    handle: &Arc<GatewayHandle>,
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> Result<()> {
    let (mut write, mut read) = stream.split();

    let (tx, mut rx) = mpsc::channel::<String>(32);
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if write.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    handle.set(tx);
    log::info!("Connected to chat gateway");

    // load the cache off the read loop; commands degrade gracefully until
    // the first refresh lands
    let cache_bot = Arc::clone(bot);
    tokio::spawn(async move {
        if let Err(err) = cache_bot.cache.refresh(&cache_bot.client).await {
            log::warn!("Initial cache load failed: {err:#}");
        }
    });

    while let Some(msg) = read.next().await {
        let msg = msg.context("reading from gateway")?;
        let Message::Text(text) = msg else {
            continue;
        };

        let Ok(event) = serde_json::from_str::<ChatEvent>(&text) else {
            log::debug!("Ignoring unparseable gateway frame");
            continue;
        };

        handle_event(bot, handle, event);
    }

    writer.abort();
    Err(anyhow!("gateway closed the connection"))
}

/// Filter one event and, if it survives, dispatch it on its own task
fn handle_event(bot: &Arc<BotContext>, handle: &Arc<GatewayHandle>, event: ChatEvent) {
    if !event.is_group_message() {
        return;
    }
    let Some(group_id) = event.group_id else {
        return;
    };

    if !allowed(&bot.runtime.allowed_groups(), group_id) {
        log::debug!("Ignoring message from disallowed group {group_id}");
        return;
    }
    if let Some(user_id) = event.user_id {
        if !allowed(&bot.runtime.allowed_senders(), user_id) {
            log::debug!("Ignoring message from disallowed sender {user_id}");
            return;
        }
    }

    let (clean_text, record_file) = message::extract_content(&event);
    if clean_text.is_empty() && record_file.is_none() {
        return;
    }

    let bot = Arc::clone(bot);
    let handle = Arc::clone(handle);
    let reply_to = event.message_id;

    tokio::spawn(async move {
        let text = if clean_text.is_empty() {
            let Some(record_file) = record_file else {
                return;
            };
            // a voice turn that fails transcription is dropped silently
            match voice::transcribe_record(&bot.runtime, &record_file).await {
                Ok(text) => text,
                Err(err) => {
                    log::warn!("ASR failed, skip replying: {err:#}");
                    return;
                }
            }
        } else {
            clean_text
        };

        let command = router::classify(&text);
        let group_key = group_id.to_string();
        let Some(response) = handlers::dispatch(&bot, command, &group_key).await else {
            return;
        };

        let envelope = message::group_message(group_id, reply_to, &response);
        if let Err(err) = handle.send(&envelope).await {
            log::error!("Failed to send response to group {group_id}: {err:#}");
        }
    });
}
