//! Gateway wire types
//!
//! Inbound chat events and outbound command envelopes for the group-chat
//! gateway protocol. Outbound messages are arrays of typed segments; every
//! envelope carries a fresh `echo` id so responses can be correlated.

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// An inbound event pushed by the gateway.
///
/// Only the fields the bot acts on are modeled; everything else in the event
/// is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatEvent {
    #[serde(default)]
    pub post_type: Option<String>,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub message_id: Option<i64>,
    #[serde(default)]
    pub raw_message: Option<String>,
    /// Segment array when the gateway sends structured messages
    #[serde(default)]
    pub message: Option<Value>,
}

impl ChatEvent {
    pub fn is_group_message(&self) -> bool {
        self.post_type.as_deref() == Some("message")
            && self.message_type.as_deref() == Some("group")
    }
}

/// Extract the text and the first voice attachment from an event.
///
/// Structured segment arrays are preferred: `at` segments are skipped,
/// `text` segments concatenated, and the first `record` segment's file kept.
/// Without a segment array the raw message is used with mention markup
/// stripped.
pub fn extract_content(event: &ChatEvent) -> (String, Option<String>) {
    if let Some(Value::Array(segments)) = &event.message {
        let mut text_parts: Vec<&str> = Vec::new();
        let mut record_file: Option<String> = None;

        for segment in segments {
            let seg_type = segment.get("type").and_then(Value::as_str).unwrap_or("");
            let data = segment.get("data");
            match seg_type {
                "at" => continue,
                "text" => {
                    if let Some(text) = data.and_then(|d| d.get("text")).and_then(Value::as_str) {
                        if !text.is_empty() {
                            text_parts.push(text);
                        }
                    }
                }
                "record" if record_file.is_none() => {
                    record_file = data
                        .and_then(|d| d.get("file"))
                        .and_then(Value::as_str)
                        .map(|s| s.to_string());
                }
                _ => {}
            }
        }

        return (text_parts.concat().trim().to_string(), record_file);
    }

    let raw = event.raw_message.as_deref().unwrap_or("").trim();
    if raw.is_empty() {
        return (String::new(), None);
    }

    (strip_mentions(raw), None)
}

/// Remove `[CQ:at,...]` markup and leading `@name` mentions from raw text
fn strip_mentions(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("[CQ:at,") {
        text.push_str(&rest[..start]);
        match rest[start..].find(']') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = "";
                break;
            }
        }
    }
    text.push_str(rest);

    // drop "@name " tokens left over from plain-text mentions
    let cleaned: Vec<&str> = text
        .split_whitespace()
        .filter(|word| !word.starts_with('@'))
        .collect();
    cleaned.join(" ").trim().to_string()
}

/// One message segment on the wire.
///
/// Serializes to `{"type": "<variant>", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Segment {
    Text { text: String },
    Reply { id: String },
    Image { file: String },
    File { file: String },
    Video { file: String },
    Node { user_id: String, nickname: String, content: Vec<Segment> },
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text { text: text.into() }
    }

    pub fn reply(message_id: i64) -> Self {
        Segment::Reply {
            id: message_id.to_string(),
        }
    }

    pub fn file(path: impl Into<String>) -> Self {
        Segment::File { file: path.into() }
    }

    pub fn video(path: impl Into<String>) -> Self {
        Segment::Video { file: path.into() }
    }

    pub fn node(user_id: &str, nickname: &str, content: Vec<Segment>) -> Self {
        Segment::Node {
            user_id: user_id.to_string(),
            nickname: nickname.to_string(),
            content,
        }
    }
}

/// An outbound command envelope
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub action: String,
    pub params: Value,
    pub echo: String,
}

impl Envelope {
    pub fn new(action: &str, params: Value) -> Self {
        Self {
            action: action.to_string(),
            params,
            echo: Uuid::new_v4().to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Build a plain group message, quoting the triggering message when known
pub fn group_message(group_id: i64, reply_to: Option<i64>, text: &str) -> Envelope {
    let mut segments: Vec<Segment> = Vec::new();
    if let Some(message_id) = reply_to {
        segments.push(Segment::reply(message_id));
    }
    segments.push(Segment::text(text));

    Envelope::new(
        "send_group_msg",
        json!({
            "group_id": group_id,
            "message": segments,
        }),
    )
}

/// Build a forward-card message bundling text and an optional attachment.
///
/// The card gets one node per part plus a timestamp node, and the preview
/// fields (`news`, `prompt`, `summary`, `source`) are filled from the text.
pub fn forward_card(
    group_id: i64,
    account: &str,
    nickname: &str,
    text: Option<&str>,
    attachment: Option<Segment>,
) -> Envelope {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M").to_string();
    let mut nodes: Vec<Segment> = Vec::new();

    if let Some(text) = text {
        nodes.push(Segment::node(account, nickname, vec![Segment::text(text)]));
    }
    if let Some(attachment) = attachment {
        nodes.push(Segment::node(account, nickname, vec![attachment]));
    }
    nodes.push(Segment::node(
        account,
        nickname,
        vec![Segment::text(timestamp.clone())],
    ));

    let preview = text.unwrap_or("");
    Envelope::new(
        "send_group_forward_msg",
        json!({
            "group_id": group_id,
            "messages": nodes,
            "news": [{"text": preview}],
            "prompt": preview,
            "summary": timestamp,
            "source": format!("{nickname} WARNING"),
        }),
    )
}
