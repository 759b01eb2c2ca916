//! Housekeeping handlers: `/clear`, `/refresh`, `/help`

use crate::handlers::BotContext;
use crate::text;

/// Handle `/clear`: drop the group's conversation thread
pub fn clear_context(bot: &BotContext, group_id: &str) -> String {
    if bot.conversations.clear(group_id) {
        text::conversation_context_cleared().to_string()
    } else {
        text::no_conversation_context().to_string()
    }
}

/// Handle `/refresh`: reload the entity cache on demand
pub async fn refresh(bot: &BotContext) -> String {
    match bot.cache.refresh(&bot.client).await {
        Ok(()) => {
            let snapshot = bot.cache.snapshot().unwrap_or_default();
            text::cache_refreshed(
                snapshot.entities.len(),
                snapshot.devices.len(),
                snapshot.areas.len(),
            )
        }
        Err(err) => {
            log::error!("Cache refresh failed: {err:#}");
            text::cache_refresh_failed(&format!("{err:#}"))
        }
    }
}

/// Handle `/help`
pub fn help(bot: &BotContext) -> String {
    text::help_text(&bot.runtime.config.gateway.nickname)
}
