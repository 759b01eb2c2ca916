//! Free-text conversation handler
//!
//! Forwards anything that is not a slash command to the Home Assistant
//! conversation agent, continuing the group's thread when one exists.

use serde_json::Value;

use crate::handlers::BotContext;
use crate::text;

/// Pull the spoken reply out of a conversation result.
///
/// The agent response nests the text at `response.speech.plain.speech`, but
/// older and error shapes flatten parts of that path, so each level falls
/// back before giving up on the payload entirely.
fn extract_speech(result: &Value) -> String {
    let response = result.get("response");

    if let Some(response) = response {
        let speech = response.get("speech");
        if let Some(speech) = speech {
            if let Some(text) = speech
                .get("plain")
                .and_then(|plain| {
                    plain
                        .get("speech")
                        .and_then(Value::as_str)
                        .or_else(|| plain.as_str())
                })
            {
                if !text.is_empty() {
                    return text.to_string();
                }
            }
            if let Some(text) = speech.as_str() {
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
        if let Some(text) = response.as_str() {
            if !text.is_empty() {
                return text.to_string();
            }
        }
    }

    if let Some(text) = result.get("speech").and_then(Value::as_str) {
        if !text.is_empty() {
            return text.to_string();
        }
    }

    // a recognized speech field that happens to be empty is still an answer;
    // only a payload with no speech shape at all gets dumped verbatim
    let has_speech_shape = response.is_some_and(|r| r.get("speech").is_some() || r.is_string())
        || result.get("speech").is_some();
    if has_speech_shape {
        return String::new();
    }

    log::warn!("Using entire result as response (fallback)");
    result.to_string()
}

/// Handle a free-text turn for a group
pub async fn freeform(bot: &BotContext, group_id: &str, clean_text: &str) -> String {
    let conversation_id = bot.conversations.get(group_id);

    let result = match bot
        .client
        .process_conversation(clean_text, conversation_id.as_deref())
        .await
    {
        Ok(result) => result,
        Err(err) => {
            log::error!("Error processing conversation: {err:#}");
            return text::error_processing_request(&format!("{err:#}"));
        }
    };

    if let Some(new_id) = result.get("conversation_id").and_then(Value::as_str) {
        bot.conversations.set(group_id, new_id.to_string());
    }

    if let Some(response) = result.get("response") {
        if response.get("response_type").and_then(Value::as_str) == Some("error") {
            let code = response
                .get("data")
                .and_then(|d| d.get("code"))
                .and_then(Value::as_str);
            match code {
                Some("no_intent_match") => {
                    log::warn!("Conversation agent could not match user intent")
                }
                Some(code) => log::warn!("Conversation agent returned error code: {code}"),
                None => log::warn!("Conversation agent returned an error response"),
            }
        }
    }

    let speech = extract_speech(&result);
    if speech.trim().is_empty() {
        log::warn!("Response text is empty, using default message");
        return text::request_processed().to_string();
    }

    log::info!(
        "Conversation response: {}{}",
        speech.chars().take(100).collect::<String>(),
        if speech.chars().count() > 100 { "..." } else { "" }
    );
    speech
}
