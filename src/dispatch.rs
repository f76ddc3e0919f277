use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::catch::ErrorHandler;
use crate::context::ContextFactory;
use crate::error::BotError;
use crate::executor::run_with_timeout;
use crate::identity::IdentityCache;
use crate::middleware::Middleware;
use crate::response::ResponseHandle;
use crate::types::Update;

/// Runs updates through the handler chain.
#[derive(Clone)]
pub struct Dispatcher {
    identity: IdentityCache,
    contexts: ContextFactory,
    handler: Arc<dyn Middleware>,
    error_handler: Arc<dyn ErrorHandler>,
    handler_timeout: Duration,
}

/// Finalizes the pending response and traces completion on every exit
/// path of a dispatch.
struct FinalizeGuard {
    update_id: i64,
    response: Option<Arc<dyn ResponseHandle>>,
}

impl Drop for FinalizeGuard {
    fn drop(&mut self) {
        if let Some(response) = &self.response {
            if !response.is_finished() {
                response.finish();
            }
        }
        debug!("Finished processing update {}", self.update_id);
    }
}

impl Dispatcher {
    pub fn new(
        identity: IdentityCache,
        contexts: ContextFactory,
        handler: Arc<dyn Middleware>,
        error_handler: Arc<dyn ErrorHandler>,
        handler_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            contexts,
            handler,
            error_handler,
            handler_timeout,
        }
    }

    pub fn identity(&self) -> &IdentityCache {
        &self.identity
    }

    pub fn handler_timeout(&self) -> Duration {
        self.handler_timeout
    }

    pub(crate) fn set_error_handler(&mut self, error_handler: Arc<dyn ErrorHandler>) {
        self.error_handler = error_handler;
    }

    /// Processes one update. The outcome of the error handler decides whether
    /// this returns an error; `response`, when given, is always finalized.
    pub async fn handle_update(
        &self,
        update: Update,
        response: Option<Arc<dyn ResponseHandle>>,
    ) -> Result<(), BotError> {
        let update_id = update.update_id;
        let _guard = FinalizeGuard {
            update_id,
            response: response.clone(),
        };

        let bot_info = match self.identity.get() {
            Some(bot_info) => bot_info,
            None => {
                debug!("Update {} is waiting for bot identity", update_id);
                self.identity.resolve().await?
            }
        };

        debug!("Processing update {}", update_id);
        let ctx = self.contexts.build(update, bot_info, response);

        match run_with_timeout(self.handler.clone(), ctx.clone(), self.handler_timeout).await {
            Ok(()) => Ok(()),
            Err(err) => self.error_handler.handle(err, ctx).await,
        }
    }

    /// Processes every update concurrently and waits for all of them.
    /// Returns the first failure, if any.
    pub async fn handle_update_batch(&self, updates: Vec<Update>) -> Result<(), BotError> {
        let results = join_all(
            updates
                .into_iter()
                .map(|update| self.handle_update(update, None)),
        )
        .await;
        results.into_iter().collect()
    }

    /// Processes a raw `getUpdates` result. Anything other than an array is
    /// rejected before a single update is touched; malformed elements of an
    /// array are logged and skipped while the rest are dispatched.
    pub async fn handle_updates(&self, updates: Value) -> Result<(), BotError> {
        let items = match updates {
            Value::Array(items) => items,
            other => {
                return Err(BotError::TypeMismatch(format!(
                    "updates must be an array, got {}",
                    json_type(&other)
                )))
            }
        };

        let updates = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<Update>(item) {
                Ok(update) => Some(update),
                Err(e) => {
                    warn!("Skipping malformed update in batch: {}", e);
                    None
                }
            })
            .collect();

        self.handle_update_batch(updates).await
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
