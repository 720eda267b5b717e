//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `./tasklink.json`) and then overridden by
//! environment variables, so a deployment can run on env alone.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";
const DEFAULT_NOTION_API_BASE: &str = "https://api.notion.com/v1";

/// Top-level relay config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Slack app credentials and API base.
    #[serde(default)]
    pub slack: SlackConfig,

    /// Notion integration credentials and target database.
    #[serde(default)]
    pub notion: NotionConfig,

    /// Retry policy for every outbound call.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Bind, port and host authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for HTTP (default 4567). Overridden by PORT env.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0"). Overridden by BIND env.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Hosts accepted in the Host header. An entry starting with "." also matches subdomains.
    /// Empty means the built-in default list. Overridden by ALLOWED_HOSTS env (comma-separated).
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    /// Signing secret from the Slack app page. Overridden by SLACK_SIGNING_SECRET env.
    pub signing_secret: Option<String>,
    /// Bot token (xoxb-...). Overridden by SLACK_BOT_TOKEN env.
    pub bot_token: Option<String>,
    /// Log header values and signature prefixes on verification. Overridden by SLACK_DEBUG=true.
    #[serde(default)]
    pub debug: bool,
    /// Web API base URL (for tests or proxies). Overridden by SLACK_API_BASE env.
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotionConfig {
    /// Integration token. Overridden by NOTION_TOKEN env.
    pub token: Option<String>,
    /// Database the task pages are created in. Overridden by NOTION_DATABASE_ID env.
    pub database_id: Option<String>,
    /// API base URL. Overridden by NOTION_API_BASE env.
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Retries after the first attempt (default 2).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Linear backoff step in milliseconds (default 500).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound of the random jitter added to each backoff, in milliseconds (default 250).
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_port() -> u16 {
    4567
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_jitter_ms() -> u64 {
    250
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            allowed_hosts: Vec::new(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            jitter: Duration::from_millis(self.jitter_ms),
        }
    }
}

/// Hosts permitted when neither config nor ALLOWED_HOSTS name any.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &[".up.railway.app", "localhost", "127.0.0.1", "::1"];

/// Read an env var, trimmed; empty counts as unset.
fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Split a comma-separated host list, dropping blanks.
pub fn parse_host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect()
}

impl RelayConfig {
    /// Apply environment overrides on top of file values.
    pub fn apply_env(&mut self) {
        if let Some(port) = env_non_empty("PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => log::warn!("ignoring invalid PORT value: {}", port),
            }
        }
        if let Some(bind) = env_non_empty("BIND") {
            self.server.bind = bind;
        }
        if let Some(hosts) = env_non_empty("ALLOWED_HOSTS") {
            self.server.allowed_hosts = parse_host_list(&hosts);
        }
        if let Some(v) = env_non_empty("SLACK_SIGNING_SECRET") {
            self.slack.signing_secret = Some(v);
        }
        if let Some(v) = env_non_empty("SLACK_BOT_TOKEN") {
            self.slack.bot_token = Some(v);
        }
        if let Some(v) = env_non_empty("SLACK_DEBUG") {
            self.slack.debug = v == "true";
        }
        if let Some(v) = env_non_empty("SLACK_API_BASE") {
            self.slack.api_base = Some(v);
        }
        if let Some(v) = env_non_empty("NOTION_TOKEN") {
            self.notion.token = Some(v);
        }
        if let Some(v) = env_non_empty("NOTION_DATABASE_ID") {
            self.notion.database_id = Some(v);
        }
        if let Some(v) = env_non_empty("NOTION_API_BASE") {
            self.notion.api_base = Some(v);
        }
    }

    /// Signing secret, trimmed. Empty is treated as unset.
    pub fn signing_secret(&self) -> String {
        trimmed(&self.slack.signing_secret).unwrap_or_default()
    }

    pub fn slack_bot_token(&self) -> Option<String> {
        trimmed(&self.slack.bot_token)
    }

    pub fn notion_token(&self) -> Option<String> {
        trimmed(&self.notion.token)
    }

    pub fn notion_database_id(&self) -> Option<String> {
        trimmed(&self.notion.database_id)
    }

    pub fn slack_api_base(&self) -> String {
        trimmed(&self.slack.api_base)
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_SLACK_API_BASE.to_string())
    }

    pub fn notion_api_base(&self) -> String {
        trimmed(&self.notion.api_base)
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_NOTION_API_BASE.to_string())
    }

    /// Effective host allow-list: configured hosts, or the defaults when none are set.
    pub fn allowed_hosts(&self) -> Vec<String> {
        let hosts: Vec<String> = self
            .server
            .allowed_hosts
            .iter()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();
        if hosts.is_empty() {
            DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect()
        } else {
            hosts
        }
    }

    /// Names of required settings that are missing. Values are never included.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.signing_secret().is_empty() {
            missing.push("slack.signingSecret (SLACK_SIGNING_SECRET)");
        }
        if self.slack_bot_token().is_none() {
            missing.push("slack.botToken (SLACK_BOT_TOKEN)");
        }
        if self.notion_token().is_none() {
            missing.push("notion.token (NOTION_TOKEN)");
        }
        if self.notion_database_id().is_none() {
            missing.push("notion.databaseId (NOTION_DATABASE_ID)");
        }
        missing
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("TASKLINK_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("tasklink.json"))
}

/// Load config from `path` (or TASKLINK_CONFIG_PATH / ./tasklink.json), then apply env overrides.
/// Missing file => defaults. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(RelayConfig, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        RelayConfig::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    config.apply_env();
    Ok((config, path))
}
