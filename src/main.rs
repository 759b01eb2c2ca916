//! habridge - Home Assistant group-chat bridge
//!
//! Connects a group-chat gateway to a local or remote Home Assistant
//! instance: slash commands and free-form conversation flow in over
//! WebSocket, proactive notifications flow out through an HTTP webhook.

mod api;
mod cache;
mod config;
mod conversation;
mod gateway;
mod grouping;
mod handlers;
mod media;
mod message;
mod resolver;
mod router;
mod search;
mod text;
mod tokenizer;
mod voice;
mod webhook;

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::{GlobalOpts, RuntimeContext};
use crate::gateway::GatewayHandle;
use crate::handlers::BotContext;
use crate::webhook::WebhookState;

#[derive(Debug, Parser)]
#[command(name = "habridge", version, about)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a default config file and exit
    InitConfig,
}

fn main() -> ExitCode {
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = writeln!(io::stderr(), "Error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = RuntimeContext::new(&cli.global)?;

    if let Some(Command::InitConfig) = cli.command {
        config::write_default_config(ctx.config_path())?;
        println!("Wrote default config to: {}", ctx.config_path().display());
        return Ok(());
    }

    ctx.init_logging()?;
    log::debug!("Config loaded from: {:?}", ctx.config_path());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(ctx))
}

async fn run(ctx: RuntimeContext) -> Result<()> {
    log::info!("Home Assistant: {}", ctx.ha_url());
    log::info!("Chat gateway: {}", ctx.config.gateway.url);
    log::info!("Webhook bind: {}", ctx.config.webhook.bind);
    match ctx.ha_token() {
        Ok(_) => log::info!("Home Assistant token: configured"),
        Err(_) => log::error!("Home Assistant token: NOT CONFIGURED"),
    }

    // fail fast on a missing token rather than erroring on every command
    ctx.ha_token()?;

    let bot = Arc::new(BotContext::new(ctx)?);
    let handle = Arc::new(GatewayHandle::new());

    let webhook_state = Arc::new(WebhookState {
        bot: Arc::clone(&bot),
        gateway: Arc::clone(&handle),
        media_dir: std::env::temp_dir().join("habridge"),
    });

    tokio::select! {
        result = webhook::serve(webhook_state) => result,
        () = gateway::run(bot, handle) => Ok(()),
        result = tokio::signal::ctrl_c() => {
            log::info!("Shutting down");
            result.map_err(Into::into)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }
}
