use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures::FutureExt;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{BotApi, SetWebhookOptions, TelegramApi};
use crate::catch::{ErrorHandler, ExitCodeReporter, FailLoudly, FaultReporter};
use crate::context::ContextFactory;
use crate::dispatch::Dispatcher;
use crate::error::BotError;
use crate::executor::DEFAULT_HANDLER_TIMEOUT;
use crate::identity::IdentityCache;
use crate::middleware::Middleware;
use crate::platform::polling::{Polling, PollingOptions};
use crate::platform::webhook::{
    validate_hook_path, webhook_router, UpdateCallback, WebhookServer,
};
use crate::platform::Ingestion;
use crate::response::ResponseHandle;
use crate::types::{Update, UpdateKind};

/// Runtime knobs fixed when the bot is built.
#[derive(Clone)]
pub struct BotOptions {
    pub handler_timeout: Duration,
    pub webhook_reply: bool,
    /// Fields copied into the state of every new context.
    pub context_defaults: HashMap<String, Value>,
    /// Defaults to the process-wide `ExitCodeReporter::global()`.
    pub fault_reporter: Arc<dyn FaultReporter>,
}

impl Default for BotOptions {
    fn default() -> Self {
        Self {
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            webhook_reply: true,
            context_defaults: HashMap::new(),
            fault_reporter: Arc::new(ExitCodeReporter::global()),
        }
    }
}

/// How `Bot::launch` should receive updates. Without `webhook` the bot
/// long-polls.
#[derive(Clone, Default)]
pub struct LaunchOptions {
    pub drop_pending_updates: Option<bool>,
    pub allowed_updates: Vec<UpdateKind>,
    pub webhook: Option<WebhookOptions>,
    pub polling: PollingOptions,
}

#[derive(Clone)]
pub struct WebhookOptions {
    /// Public domain Telegram should deliver to. For a full URL only its host
    /// and port are kept; anything without a scheme is used as given.
    pub domain: Option<String>,
    pub path: Option<String>,
    pub host: String,
    pub port: u16,
    pub ip_address: Option<String>,
    pub max_connections: Option<u8>,
    pub secret_token: Option<String>,
    /// Extra routes served next to the hook.
    pub on_request: Option<Router>,
}

impl Default for WebhookOptions {
    fn default() -> Self {
        Self {
            domain: None,
            path: None,
            host: "0.0.0.0".to_string(),
            port: 8443,
            ip_address: None,
            max_connections: None,
            secret_token: None,
            on_request: None,
        }
    }
}

/// A bot: the dispatcher plus whichever update source it was launched with.
pub struct Bot {
    token: String,
    api: Arc<dyn BotApi>,
    dispatcher: Dispatcher,
    ingestion: Mutex<Option<Ingestion>>,
}

impl Bot {
    pub fn new(token: impl Into<String>, handler: impl Middleware, options: BotOptions) -> Self {
        let token = token.into();
        let api = Arc::new(TelegramApi::new(&token));
        Self::with_api(token, api, handler, options)
    }

    /// Builds a bot on top of any `BotApi` implementation.
    pub fn with_api(
        token: impl Into<String>,
        api: Arc<dyn BotApi>,
        handler: impl Middleware,
        options: BotOptions,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            IdentityCache::new(api.clone()),
            ContextFactory::new(api.clone(), options.webhook_reply, options.context_defaults),
            Arc::new(handler),
            Arc::new(FailLoudly::new(options.fault_reporter)),
            options.handler_timeout,
        );
        Self {
            token: token.into(),
            api,
            dispatcher,
            ingestion: Mutex::new(None),
        }
    }

    /// Replaces the error handler.
    pub fn catch(mut self, handler: impl ErrorHandler) -> Self {
        self.dispatcher.set_error_handler(Arc::new(handler));
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Hex SHA-256 of the token salted with this crate's version, used as
    /// the default hook path. The value is stable across restarts of the same
    /// build and changes when the crate is upgraded.
    pub fn secret_path_component(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.token.as_bytes());
        hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Router serving the hook at `path`, for mounting into another server.
    pub fn webhook_callback(&self, path: &str) -> Result<Router, BotError> {
        webhook_router(path, None, self.update_callback())
    }

    pub async fn handle_update(
        &self,
        update: Update,
        response: Option<Arc<dyn ResponseHandle>>,
    ) -> Result<(), BotError> {
        self.dispatcher.handle_update(update, response).await
    }

    pub async fn handle_updates(&self, updates: Value) -> Result<(), BotError> {
        self.dispatcher.handle_updates(updates).await
    }

    pub async fn is_running(&self) -> bool {
        self.ingestion
            .lock()
            .await
            .as_ref()
            .is_some_and(|ingestion| !ingestion.is_finished())
    }

    /// Address the webhook listener is bound to, while one is running.
    pub async fn webhook_addr(&self) -> Option<SocketAddr> {
        match self.ingestion.lock().await.as_ref() {
            Some(Ingestion::Webhook(server)) => Some(server.local_addr()),
            _ => None,
        }
    }

    pub async fn launch(&self, options: LaunchOptions) -> Result<(), BotError> {
        let mut ingestion = self.ingestion.lock().await;
        if ingestion.as_ref().is_some_and(|i| !i.is_finished()) {
            return Err(BotError::Configuration("bot is already running".to_string()));
        }

        let domain = match &options.webhook {
            Some(webhook) => {
                if webhook.domain.is_none() && webhook.path.is_none() {
                    return Err(BotError::Configuration(
                        "webhook launch needs a domain or a path".to_string(),
                    ));
                }
                if let Some(path) = &webhook.path {
                    validate_hook_path(path)?;
                }
                webhook.domain.as_deref().map(webhook_domain).transpose()?
            }
            None => None,
        };

        let me = self.dispatcher.identity().resolve().await?;
        info!("Launching @{}", me.username);

        let started = match options.webhook {
            Some(webhook) => {
                let server = self
                    .start_webhook(
                        webhook,
                        domain,
                        options.drop_pending_updates,
                        options.allowed_updates,
                    )
                    .await?;
                Ingestion::Webhook(server)
            }
            None => {
                self.api.delete_webhook(options.drop_pending_updates).await?;
                let polling = self.start_polling(options.polling, options.allowed_updates);
                Ingestion::Polling(polling)
            }
        };

        info!("Bot started with {}", started.mode());
        *ingestion = Some(started);
        Ok(())
    }

    pub async fn stop(&self, reason: &str) -> Result<(), BotError> {
        let mut ingestion = self.ingestion.lock().await;
        let mut running = ingestion.take().ok_or(BotError::NotRunning)?;
        info!("Stopping bot... Reason: {}", reason);
        running.stop();
        Ok(())
    }

    fn update_callback(&self) -> UpdateCallback {
        let dispatcher = self.dispatcher.clone();
        Arc::new(move |update: Update, response: Arc<dyn ResponseHandle>| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.handle_update(update, Some(response)).await }.boxed()
        })
    }

    fn start_polling(&self, options: PollingOptions, allowed_updates: Vec<UpdateKind>) -> Polling {
        let dispatcher = self.dispatcher.clone();
        Polling::start(self.api.clone(), options, allowed_updates, move |batch| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.handle_updates(batch).await }
        })
    }

    async fn start_webhook(
        &self,
        webhook: WebhookOptions,
        domain: Option<String>,
        drop_pending_updates: Option<bool>,
        allowed_updates: Vec<UpdateKind>,
    ) -> Result<WebhookServer, BotError> {
        let path = webhook
            .path
            .unwrap_or_else(|| format!("/rustbot/{}", self.secret_path_component()));

        let mut router =
            webhook_router(&path, webhook.secret_token.clone(), self.update_callback())?;
        if let Some(extra) = webhook.on_request {
            router = router.merge(extra);
        }

        let mut server = WebhookServer::listen(&webhook.host, webhook.port, router).await?;

        let Some(domain) = domain else {
            debug!("No webhook domain given, skipping setWebhook");
            return Ok(server);
        };

        let url = format!("https://{}{}", domain, path);
        let registration = SetWebhookOptions {
            drop_pending_updates,
            allowed_updates,
            ip_address: webhook.ip_address,
            max_connections: webhook.max_connections,
            secret_token: webhook.secret_token,
        };
        if let Err(e) = self.api.set_webhook(&url, &registration).await {
            warn!("Failed to register webhook {}: {}", url, e);
            server.close();
            return Err(e.into());
        }

        info!("Webhook registered at {}", url);
        Ok(server)
    }
}

/// Reduces `https://host:port/anything` to `host[:port]`. A domain without
/// a scheme is kept as given, path included, minus trailing slashes.
fn webhook_domain(domain: &str) -> Result<String, BotError> {
    if domain.starts_with("http://") || domain.starts_with("https://") {
        let url = reqwest::Url::parse(domain)
            .map_err(|e| BotError::Configuration(format!("invalid webhook domain {}: {}", domain, e)))?;
        let host = url.host_str().ok_or_else(|| {
            BotError::Configuration(format!("webhook domain {} has no host", domain))
        })?;
        return Ok(match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        });
    }

    let domain = domain.trim_end_matches('/');
    if domain.is_empty() || domain.starts_with('/') {
        return Err(BotError::Configuration(format!(
            "webhook domain {:?} has no host",
            domain
        )));
    }
    Ok(domain.to_string())
}
