use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::bot::{BotOptions, LaunchOptions, WebhookOptions};
use crate::catch::FaultReporter;
use crate::platform::polling::PollingOptions;
use crate::types::UpdateKind;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub launch: LaunchConfig,
    /// Absent means long polling.
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
    #[serde(default = "default_polling_config")]
    pub polling: PollingConfig,
    /// Fields every context starts out with.
    #[serde(default)]
    pub context: HashMap<String, Value>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,
    #[serde(default = "default_webhook_reply")]
    pub webhook_reply: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LaunchConfig {
    #[serde(default)]
    pub drop_pending_updates: Option<bool>,
    #[serde(default)]
    pub allowed_updates: Vec<UpdateKind>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_webhook_host")]
    pub host: String,
    #[serde(default = "default_webhook_port")]
    pub port: u16,
    #[serde(default)]
    pub secret_token: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u8>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_polling_timeout")]
    pub timeout_secs: u32,
    #[serde(default = "default_polling_limit")]
    pub limit: u8,
}

fn default_handler_timeout_ms() -> u64 {
    90_000
}

fn default_webhook_reply() -> bool {
    true
}

fn default_webhook_host() -> String {
    "0.0.0.0".to_string()
}

fn default_webhook_port() -> u16 {
    8443
}

fn default_polling_timeout() -> u32 {
    50
}

fn default_polling_limit() -> u8 {
    100
}

fn default_polling_config() -> PollingConfig {
    PollingConfig {
        timeout_secs: default_polling_timeout(),
        limit: default_polling_limit(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        if config.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("telegram.bot_token must not be empty");
        }
        Ok(config)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.telegram.handler_timeout_ms)
    }

    /// "webhook" or "polling", for logging.
    pub fn mode(&self) -> &'static str {
        if self.webhook.is_some() {
            "webhook"
        } else {
            "polling"
        }
    }

    pub fn bot_options(&self, fault_reporter: Arc<dyn FaultReporter>) -> BotOptions {
        BotOptions {
            handler_timeout: self.handler_timeout(),
            webhook_reply: self.telegram.webhook_reply,
            context_defaults: self.context.clone(),
            fault_reporter,
        }
    }

    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            drop_pending_updates: self.launch.drop_pending_updates,
            allowed_updates: self.launch.allowed_updates.clone(),
            webhook: self.webhook.as_ref().map(|w| WebhookOptions {
                domain: w.domain.clone(),
                path: w.path.clone(),
                host: w.host.clone(),
                port: w.port,
                ip_address: w.ip_address.clone(),
                max_connections: w.max_connections,
                secret_token: w.secret_token.clone(),
                on_request: None,
            }),
            polling: PollingOptions {
                timeout_secs: self.polling.timeout_secs,
                limit: self.polling.limit,
                ..Default::default()
            },
        }
    }
}
