//! Command handlers
//!
//! Each handler turns a classified command into the response text for the
//! chat group. Handlers never touch the gateway socket; the caller owns
//! delivery, which keeps every handler testable against a mock API server.

pub mod control;
pub mod conversation;
pub mod info;
pub mod system;

use crate::api::HassClient;
use crate::cache::EntityCache;
use crate::config::RuntimeContext;
use crate::conversation::ConversationState;
use crate::router::Command;

/// Shared state threaded through every handler
pub struct BotContext {
    pub client: HassClient,
    pub cache: EntityCache,
    pub conversations: ConversationState,
    pub runtime: RuntimeContext,
}

impl BotContext {
    pub fn new(runtime: RuntimeContext) -> anyhow::Result<Self> {
        Ok(Self {
            client: HassClient::new(&runtime)?,
            cache: EntityCache::new(),
            conversations: ConversationState::new(),
            runtime,
        })
    }
}

/// Run a command and produce the reply text, if any
pub async fn dispatch(bot: &BotContext, command: Command, group_id: &str) -> Option<String> {
    match command {
        Command::Echo(text) => Some(text),
        Command::ClearContext => Some(system::clear_context(bot, group_id)),
        Command::TurnOn(args) => Some(control::control_entities(bot, "turn_on", &args).await),
        Command::TurnOff(args) => Some(control::control_entities(bot, "turn_off", &args).await),
        Command::Toggle(args) => Some(control::control_entities(bot, "toggle", &args).await),
        Command::Info => Some(info::home_digest(bot).await),
        Command::ListDomain(domain) => Some(info::list_domain(bot, &domain)),
        Command::RunScript(script_id) => Some(control::run_script(bot, &script_id).await),
        Command::Climate(args) => Some(control::climate(bot, &args).await),
        Command::Search(query) => Some(info::search(bot, &query)),
        Command::Refresh => Some(system::refresh(bot).await),
        Command::Help => Some(system::help(bot)),
        Command::FreeformText(text) => Some(conversation::freeform(bot, group_id, &text).await),
        Command::Ignore => None,
    }
}
