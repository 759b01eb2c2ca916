//! Voice message transcription
//!
//! A voice-only chat turn is transcribed before routing: the audio is pulled
//! from the gateway with a one-shot `get_record` request, then posted to the
//! configured speech-to-text endpoint. Any failure along the way drops the
//! turn; the bot never replies to audio it could not understand.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

use crate::config::RuntimeContext;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
/// Frames to inspect before giving up on a matching get_record reply
const MAX_FRAMES: usize = 5;

/// Transcribe a gateway voice attachment to text
pub async fn transcribe_record(runtime: &RuntimeContext, record_file: &str) -> Result<String> {
    let audio = fetch_voice(runtime, record_file).await?;
    let text = transcribe(runtime, audio).await?;
    log::info!("ASR transcribed voice to text: {text}");
    Ok(text)
}

/// Where a get_record reply says the audio lives
enum VoiceTarget {
    Inline(Vec<u8>),
    Remote(String),
}

/// HTTP base URL for the gateway host, derived from its WebSocket URL
fn gateway_http_base(ws_url: &str) -> String {
    if let Some(rest) = ws_url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = ws_url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        ws_url.to_string()
    }
    .trim_end_matches('/')
    .to_string()
}

/// Whether a frame is the reply to our get_record request
fn is_get_record_reply(frame: &Value, echo: &str) -> bool {
    if frame.get("post_type").and_then(Value::as_str) == Some("meta_event") {
        return false;
    }
    if let Some(frame_echo) = frame.get("echo").and_then(Value::as_str) {
        if frame_echo != echo {
            return false;
        }
    }
    frame.get("status").is_some()
}

/// Pull the audio location out of a get_record reply
fn extract_voice_target(frame: &Value) -> Result<VoiceTarget> {
    let status = frame.get("status").and_then(Value::as_str).unwrap_or("");
    let retcode = frame.get("retcode").and_then(Value::as_i64);
    if !status.eq_ignore_ascii_case("ok") && !matches!(retcode, Some(0) | None) {
        bail!("gateway get_record returned error: {frame}");
    }

    let data = frame.get("data").cloned().unwrap_or(Value::Null);

    if let Some(encoded) = data.get("base64").and_then(Value::as_str) {
        let bytes = BASE64
            .decode(encoded)
            .context("decoding base64 voice data")?;
        return Ok(VoiceTarget::Inline(bytes));
    }

    let target = data
        .get("url")
        .and_then(Value::as_str)
        .or_else(|| data.get("file").and_then(Value::as_str))
        .ok_or_else(|| anyhow!("get_record reply missing file/url/base64"))?;
    Ok(VoiceTarget::Remote(target.to_string()))
}

/// Fetch the audio bytes for a voice attachment via a one-shot gateway
/// connection, separate from the main event socket so request/reply
/// correlation stays trivial.
async fn fetch_voice(runtime: &RuntimeContext, record_file: &str) -> Result<Vec<u8>> {
    let ws_url = &runtime.config.gateway.url;
    let echo = Uuid::new_v4().to_string();
    let request = json!({
        "action": "get_record",
        "params": {"file": record_file, "out_format": "mp3"},
        "echo": echo,
    });

    let (mut stream, _) = tokio::time::timeout(FETCH_TIMEOUT, connect_async(ws_url))
        .await
        .context("connecting to gateway for voice fetch")?
        .context("gateway voice connection failed")?;

    stream
        .send(Message::Text(request.to_string()))
        .await
        .context("sending get_record request")?;

    let mut reply: Option<Value> = None;
    for _ in 0..MAX_FRAMES {
        let frame = match tokio::time::timeout(FETCH_TIMEOUT, stream.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => text,
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(err))) => {
                let _ = stream.close(None).await;
                return Err(err).context("receiving get_record reply");
            }
            Ok(None) | Err(_) => break,
        };

        let Ok(value) = serde_json::from_str::<Value>(&frame) else {
            continue;
        };
        if is_get_record_reply(&value, &echo) {
            reply = Some(value);
            break;
        }
    }
    let _ = stream.close(None).await;

    let reply = reply.ok_or_else(|| anyhow!("gateway did not answer get_record"))?;

    match extract_voice_target(&reply)? {
        VoiceTarget::Inline(bytes) => Ok(bytes),
        VoiceTarget::Remote(target) => {
            let url = if target.starts_with("http://") || target.starts_with("https://") {
                target
            } else {
                format!(
                    "{}/{}",
                    gateway_http_base(ws_url),
                    target.trim_start_matches('/')
                )
            };
            download_voice(&url).await
        }
    }
}

async fn download_voice(url: &str) -> Result<Vec<u8>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("building voice download client")?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("downloading voice file from {url}"))?
        .error_for_status()
        .context("voice file download failed")?;

    Ok(response.bytes().await.context("reading voice file")?.to_vec())
}

/// Post raw audio to the configured transcription endpoint
async fn transcribe(runtime: &RuntimeContext, audio: Vec<u8>) -> Result<String> {
    let asr = &runtime.config.asr;
    let url = asr
        .url
        .as_deref()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| anyhow!("no ASR endpoint configured"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("building ASR client")?;

    let mut request = client
        .post(url)
        .header("Content-Type", "audio/mpeg")
        .body(audio);
    if let Some(token) = asr.token.as_deref().filter(|t| !t.is_empty()) {
        request = request.header("Authorization", format!("Bearer {token}"));
    }

    let response = request
        .send()
        .await
        .context("sending audio to ASR endpoint")?
        .error_for_status()
        .context("ASR endpoint rejected the request")?;

    let value: Value = response.json().await.context("parsing ASR response")?;
    let text = value
        .get("text")
        .and_then(Value::as_str)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("ASR response contained no text"))?;

    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_gateway_http_base() {
        assert_eq!(gateway_http_base("ws://gateway:3001"), "http://gateway:3001");
        assert_eq!(
            gateway_http_base("wss://gateway.example/"),
            "https://gateway.example"
        );
    }

    #[test]
    fn test_reply_matching_skips_meta_and_foreign_echo() {
        assert!(!is_get_record_reply(
            &json!({"post_type": "meta_event", "status": "ok"}),
            "abc"
        ));
        assert!(!is_get_record_reply(
            &json!({"echo": "other", "status": "ok"}),
            "abc"
        ));
        assert!(is_get_record_reply(
            &json!({"echo": "abc", "status": "ok", "data": {}}),
            "abc"
        ));
        // frames without an echo still count if they carry a status
        assert!(is_get_record_reply(&json!({"status": "ok"}), "abc"));
    }

    #[test]
    fn test_extract_inline_base64() {
        let frame = json!({"status": "ok", "data": {"base64": BASE64.encode(b"audio")}});
        match extract_voice_target(&frame).unwrap() {
            VoiceTarget::Inline(bytes) => assert_eq!(bytes, b"audio"),
            VoiceTarget::Remote(_) => panic!("expected inline audio"),
        }
    }

    #[test]
    fn test_extract_remote_prefers_url() {
        let frame = json!({
            "status": "ok",
            "data": {"url": "http://host/a.mp3", "file": "/tmp/a.mp3"}
        });
        match extract_voice_target(&frame).unwrap() {
            VoiceTarget::Remote(target) => assert_eq!(target, "http://host/a.mp3"),
            VoiceTarget::Inline(_) => panic!("expected remote target"),
        }
    }

    #[test]
    fn test_extract_error_frames() {
        assert!(extract_voice_target(&json!({"status": "failed", "retcode": 1})).is_err());
        assert!(extract_voice_target(&json!({"status": "ok", "data": {}})).is_err());
    }

    #[tokio::test]
    async fn test_transcribe_requires_endpoint() {
        let runtime = RuntimeContext::with_config(Default::default());
        let err = transcribe(&runtime, vec![1, 2, 3]).await.unwrap_err();
        assert!(err.to_string().contains("no ASR endpoint"));
    }

    #[tokio::test]
    async fn test_transcribe_posts_audio() {
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transcribe"))
            .and(header("Authorization", "Bearer asr-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"text": " turn on the lights "})),
            )
            .mount(&server)
            .await;

        let mut config = crate::config::AppConfig::default();
        config.asr.url = Some(format!("{}/transcribe", server.uri()));
        config.asr.token = Some("asr-token".to_string());
        let runtime = RuntimeContext::with_config(config);

        let text = transcribe(&runtime, vec![0u8; 16]).await.unwrap();
        assert_eq!(text, "turn on the lights");
    }
}
