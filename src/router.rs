//! Inbound message classification
//!
//! Maps a raw chat message to a command by a strict ordered cascade of
//! prefix and exact-match checks. Order matters: prefixed commands are
//! checked before the free-text fallback, and exact-match commands like
//! `/info` must not prefix-match longer messages.

/// A classified chat message
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `/echo <text>` - verbatim echo, diagnostic
    Echo(String),
    /// `/clear` - drop this group's conversation context
    ClearContext,
    /// `/turnon <alias>...`
    TurnOn(String),
    /// `/turnoff <alias>...`
    TurnOff(String),
    /// `/toggle <alias>...`
    Toggle(String),
    /// `/info` - home status digest
    Info,
    /// `/light` or `/switch` - list devices of a domain grouped by area
    ListDomain(String),
    /// `/script <id>` - run a script
    RunScript(String),
    /// `/climate <alias> [mode] [temp]`
    Climate(String),
    /// `/search <query>`
    Search(String),
    /// `/refresh` - force a cache reload
    Refresh,
    /// `/help`
    Help,
    /// Anything else non-empty goes to the conversation agent
    FreeformText(String),
    /// Empty message
    Ignore,
}

/// Classify a raw message. Pure: no I/O, no cache access.
pub fn classify(raw_message: &str) -> Command {
    let raw = raw_message.trim();

    if let Some(rest) = raw.strip_prefix("/echo ") {
        Command::Echo(rest.to_string())
    } else if raw == "/clear" {
        Command::ClearContext
    } else if let Some(rest) = raw.strip_prefix("/turnon ") {
        Command::TurnOn(rest.to_string())
    } else if let Some(rest) = raw.strip_prefix("/turnoff ") {
        Command::TurnOff(rest.to_string())
    } else if let Some(rest) = raw.strip_prefix("/toggle ") {
        Command::Toggle(rest.to_string())
    } else if raw == "/info" {
        Command::Info
    } else if raw == "/light" {
        Command::ListDomain("light".to_string())
    } else if raw == "/switch" {
        Command::ListDomain("switch".to_string())
    } else if let Some(rest) = raw.strip_prefix("/script ") {
        Command::RunScript(rest.trim().to_string())
    } else if let Some(rest) = raw.strip_prefix("/climate ") {
        Command::Climate(rest.to_string())
    } else if let Some(rest) = raw.strip_prefix("/search ") {
        Command::Search(rest.trim().to_string())
    } else if raw == "/refresh" {
        Command::Refresh
    } else if raw == "/help" {
        Command::Help
    } else if !raw.is_empty() {
        Command::FreeformText(raw.to_string())
    } else {
        Command::Ignore
    }
}
