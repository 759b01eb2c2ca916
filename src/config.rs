//! Configuration management for habridge
//!
//! Supports:
//! - TOML config file at XDG locations
//! - Environment variable overrides (HAB__*)
//! - Command-line argument overrides

use std::env;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Args;
use config::{Config, Environment, File, FileFormat};
use env_logger::fmt::WriteStyle;
use log::LevelFilter;
use serde::{Deserialize, Serialize};

const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// Global command-line options
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalOpts {
    /// Path to the config file (or directory containing config.toml)
    #[arg(short, long, env = "HAB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Suppress all log output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Runtime context containing resolved configuration
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub global: GlobalOpts,
    pub config: AppConfig,
    config_path: PathBuf,
}

impl RuntimeContext {
    pub fn new(global: &GlobalOpts) -> Result<Self> {
        let config_path = resolve_config_path(global.config.as_ref())?;
        let config = load_config(&config_path)?;

        Ok(Self {
            global: global.clone(),
            config,
            config_path,
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn init_logging(&self) -> Result<()> {
        if self.global.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let mut builder = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(&self.config.logging.level),
        );

        builder.filter_level(self.effective_log_level());

        let disable_color =
            env::var_os("NO_COLOR").is_some() || !std::io::stderr().is_terminal();
        if disable_color {
            builder.write_style(WriteStyle::Never);
        } else {
            builder.write_style(WriteStyle::Auto);
        }

        builder.try_init().or_else(|err| {
            if self.global.debug {
                eprintln!("logger already initialized: {err}");
            }
            Ok(())
        })
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.global.debug || self.config.logging.debug {
            LevelFilter::Debug
        } else {
            match self.config.logging.level.as_str() {
                "trace" => LevelFilter::Trace,
                "debug" => LevelFilter::Debug,
                "warn" => LevelFilter::Warn,
                "error" => LevelFilter::Error,
                _ => LevelFilter::Info,
            }
        }
    }

    /// Get the Home Assistant base URL
    pub fn ha_url(&self) -> &str {
        self.config.homeassistant.url.trim_end_matches('/')
    }

    /// Get the Home Assistant auth token
    ///
    /// A missing token is a configuration error and fatal at startup.
    pub fn ha_token(&self) -> Result<&str> {
        self.config
            .homeassistant
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "No Home Assistant token configured.\n\
                    Set via HAB__HOMEASSISTANT__TOKEN env var or in the config file."
                )
            })
    }

    /// Sender allow-list, or None when every sender is allowed
    pub fn allowed_senders(&self) -> Option<Vec<String>> {
        parse_id_list(self.config.access.allowed_senders.as_deref())
    }

    /// Group allow-list, or None when every group is allowed
    pub fn allowed_groups(&self) -> Option<Vec<String>> {
        parse_id_list(self.config.access.allowed_groups.as_deref())
    }

    #[cfg(test)]
    pub(crate) fn with_config(config: AppConfig) -> Self {
        Self {
            global: GlobalOpts::default(),
            config,
            config_path: PathBuf::new(),
        }
    }
}

/// Parse a comma or whitespace separated id list; empty input means "no list"
fn parse_id_list(raw: Option<&str>) -> Option<Vec<String>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }

    let ids: Vec<String> = raw
        .replace(',', " ")
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();

    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

/// Application configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub homeassistant: HomeAssistantConfig,
    pub gateway: GatewayConfig,
    pub webhook: WebhookConfig,
    pub access: AccessConfig,
    pub asr: AsrConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeAssistantConfig {
    pub url: String,
    pub token: Option<String>,
    /// Conversation agent id passed to /api/conversation/process
    pub agent_id: String,
    /// HTTP timeout in seconds; generous by default because AI-backed
    /// conversation responses can take minutes
    pub timeout: u64,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            url: "http://homeassistant:8123".to_string(),
            token: None,
            agent_id: "conversation.home_assistant".to_string(),
            timeout: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// WebSocket URL of the chat gateway
    pub url: String,
    /// Seconds to wait before reconnecting after a dropped connection
    pub reconnect_delay: u64,
    /// Bot account id, used as the author of forward-card nodes
    pub account: String,
    /// Display name shown in help text and forward cards
    pub nickname: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: "ws://gateway:3001".to_string(),
            reconnect_delay: 5,
            account: "10001".to_string(),
            nickname: "habridge".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Bind address for the webhook HTTP server
    pub bind: String,
    /// Shared secret; when set, requests must carry a matching token
    pub token: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8321".to_string(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Comma or whitespace separated sender ids allowed to issue commands
    pub allowed_senders: Option<String>,
    /// Comma or whitespace separated group ids the bot responds in
    pub allowed_groups: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    /// HTTP endpoint for voice transcription; voice turns are dropped when unset
    pub url: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            debug: false,
        }
    }
}

fn resolve_config_path(override_path: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        let expanded = expand_path(path)?;
        if expanded.is_dir() {
            return Ok(expanded.join("config.toml"));
        }
        return Ok(expanded);
    }

    Ok(default_config_dir()?.join("config.toml"))
}

fn load_config(config_path: &Path) -> Result<AppConfig> {
    let config = Config::builder()
        .set_default("homeassistant.url", "http://homeassistant:8123")?
        .set_default("homeassistant.agent_id", "conversation.home_assistant")?
        .set_default("homeassistant.timeout", 600_i64)?
        .set_default("gateway.url", "ws://gateway:3001")?
        .set_default("gateway.reconnect_delay", 5_i64)?
        .set_default("gateway.account", "10001")?
        .set_default("gateway.nickname", "habridge")?
        .set_default("webhook.bind", "0.0.0.0:8321")?
        .set_default("logging.level", "info")?
        .set_default("logging.debug", false)?
        .add_source(
            File::from(config_path)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(
            Environment::with_prefix("HAB")
                .try_parsing(true)
                .separator("__"),
        )
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    Ok(app_config)
}

pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config")?;

    let content = format!(
        "# habridge configuration\n\
        # File: {}\n\
        #\n\
        # Environment variables override any value here, e.g.\n\
        #   HAB__HOMEASSISTANT__TOKEN=...\n\
        #   HAB__GATEWAY__URL=ws://gateway:3001\n\
        \n\
        {toml}",
        path.display()
    );

    fs::write(path, content).with_context(|| format!("writing config to {}", path.display()))
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        let expanded = shellexpand::full(text).context("expanding path")?;
        Ok(PathBuf::from(expanded.to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.homeassistant.timeout, 600);
        assert_eq!(config.gateway.reconnect_delay, 5);
        assert!(config.webhook.token.is_none());
        assert!(config.access.allowed_senders.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[homeassistant]"));
        assert!(toml.contains("[gateway]"));
        assert!(toml.contains("[webhook]"));
        assert!(toml.contains("[logging]"));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[homeassistant]\ntoken = \"abc\"\n\n[gateway]\nnickname = \"meido\""
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.homeassistant.token.as_deref(), Some("abc"));
        assert_eq!(config.gateway.nickname, "meido");
        assert_eq!(config.homeassistant.timeout, 600);
    }

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list(None), None);
        assert_eq!(parse_id_list(Some("")), None);
        assert_eq!(parse_id_list(Some("  ")), None);
        assert_eq!(
            parse_id_list(Some("123, 456 789")),
            Some(vec![
                "123".to_string(),
                "456".to_string(),
                "789".to_string()
            ])
        );
    }

    #[test]
    fn test_missing_token_is_error() {
        let ctx = RuntimeContext::with_config(AppConfig::default());
        assert!(ctx.ha_token().is_err());
    }
}
