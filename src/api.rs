use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use teloxide::payloads::{DeleteWebhookSetters, SetWebhookSetters};
use teloxide::prelude::*;
use teloxide::types::AllowedUpdate;
use tracing::debug;

use crate::error::ApiError;
use crate::types::{BotIdentity, UpdateKind};

/// Extra time granted to the HTTP request on top of the long-poll timeout.
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);

/// Options forwarded to `setWebhook`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetWebhookOptions {
    pub drop_pending_updates: Option<bool>,
    pub allowed_updates: Vec<UpdateKind>,
    pub ip_address: Option<String>,
    pub max_connections: Option<u8>,
    pub secret_token: Option<String>,
}

/// Parameters of one `getUpdates` long-poll request.
#[derive(Debug, Clone, PartialEq)]
pub struct GetUpdates {
    pub offset: Option<i64>,
    pub limit: u8,
    pub timeout_secs: u32,
    pub allowed_updates: Vec<UpdateKind>,
}

impl GetUpdates {
    fn payload(&self) -> Value {
        let mut payload = json!({
            "limit": self.limit,
            "timeout": self.timeout_secs,
            "allowed_updates": self.allowed_updates,
        });
        if let Some(offset) = self.offset {
            payload["offset"] = json!(offset);
        }
        payload
    }
}

/// The slice of the Bot API the runtime depends on.
#[async_trait]
pub trait BotApi: Send + Sync {
    async fn get_me(&self) -> Result<BotIdentity, ApiError>;

    async fn delete_webhook(&self, drop_pending_updates: Option<bool>) -> Result<(), ApiError>;

    async fn set_webhook(&self, url: &str, options: &SetWebhookOptions) -> Result<(), ApiError>;

    /// Returns the raw `result` array of `getUpdates`.
    async fn get_updates(&self, params: &GetUpdates) -> Result<Value, ApiError>;

    /// Calls any Bot API method with a JSON payload and returns its `result`.
    async fn call(&self, method: &str, payload: Value) -> Result<Value, ApiError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

impl ApiResponse {
    fn into_result(self) -> Result<Value, ApiError> {
        if self.ok {
            return Ok(self.result);
        }
        Err(ApiError::Telegram {
            code: self.error_code.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
        })
    }
}

/// `BotApi` backed by teloxide for typed methods and the bot's own reqwest
/// client for raw method calls.
#[derive(Clone)]
pub struct TelegramApi {
    bot: Bot,
}

impl TelegramApi {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    pub fn from_bot(bot: Bot) -> Self {
        Self { bot }
    }

    fn method_url(&self, method: &str) -> String {
        let api_url = self.bot.api_url();
        format!(
            "{}/bot{}/{}",
            api_url.as_str().trim_end_matches('/'),
            self.bot.token(),
            method
        )
    }

    async fn post(
        &self,
        method: &str,
        payload: &Value,
        timeout: Option<Duration>,
    ) -> Result<Value, ApiError> {
        debug!("Calling Bot API method {}", method);

        let mut request = self.bot.client().post(self.method_url(method)).json(payload);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response: ApiResponse = request.send().await?.json().await?;
        response.into_result()
    }
}

#[async_trait]
impl BotApi for TelegramApi {
    async fn get_me(&self) -> Result<BotIdentity, ApiError> {
        let me = self.bot.get_me().await?;
        Ok(BotIdentity::from(me))
    }

    async fn delete_webhook(&self, drop_pending_updates: Option<bool>) -> Result<(), ApiError> {
        let mut request = self.bot.delete_webhook();
        if let Some(drop) = drop_pending_updates {
            request = request.drop_pending_updates(drop);
        }
        request.await?;
        Ok(())
    }

    async fn set_webhook(&self, url: &str, options: &SetWebhookOptions) -> Result<(), ApiError> {
        let parsed =
            reqwest::Url::parse(url).map_err(|_| ApiError::InvalidUrl(url.to_string()))?;

        let mut request = self.bot.set_webhook(parsed);
        if let Some(drop) = options.drop_pending_updates {
            request = request.drop_pending_updates(drop);
        }
        if !options.allowed_updates.is_empty() {
            let allowed: Vec<AllowedUpdate> = options
                .allowed_updates
                .iter()
                .copied()
                .map(AllowedUpdate::from)
                .collect();
            request = request.allowed_updates(allowed);
        }
        if let Some(ip) = &options.ip_address {
            request = request.ip_address(ip.clone());
        }
        if let Some(max) = options.max_connections {
            request = request.max_connections(max);
        }
        if let Some(secret) = &options.secret_token {
            request = request.secret_token(secret.clone());
        }
        request.await?;
        Ok(())
    }

    async fn get_updates(&self, params: &GetUpdates) -> Result<Value, ApiError> {
        let timeout = Duration::from_secs(params.timeout_secs.into()) + LONG_POLL_GRACE;
        self.post("getUpdates", &params.payload(), Some(timeout))
            .await
    }

    async fn call(&self, method: &str, payload: Value) -> Result<Value, ApiError> {
        self.post(method, &payload, None).await
    }
}
