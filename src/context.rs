use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::api::BotApi;
use crate::client::Telegram;
use crate::error::ApiError;
use crate::response::ResponseHandle;
use crate::types::{BotIdentity, Update, UpdateKind};

/// Everything a handler sees while processing one update.
///
/// Clones share the same per-update state; a new `Context` is built for
/// every update and dropped when its dispatch is done.
#[derive(Clone)]
pub struct Context {
    update: Arc<Update>,
    telegram: Telegram,
    bot_info: Arc<BotIdentity>,
    state: Arc<Mutex<HashMap<String, Value>>>,
}

impl Context {
    pub fn update(&self) -> &Update {
        &self.update
    }

    pub fn update_id(&self) -> i64 {
        self.update.update_id
    }

    pub fn update_kind(&self) -> Option<UpdateKind> {
        self.update.kind()
    }

    pub fn telegram(&self) -> &Telegram {
        &self.telegram
    }

    pub fn bot_info(&self) -> &BotIdentity {
        &self.bot_info
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock_state().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.lock_state().insert(key.into(), value);
    }

    pub fn state(&self) -> HashMap<String, Value> {
        self.lock_state().clone()
    }

    /// Sends `text` to the chat the update came from.
    pub async fn reply(&self, text: &str) -> Result<Option<Value>, ApiError> {
        let chat_id = self
            .update
            .chat_id()
            .ok_or_else(|| ApiError::Telegram {
                code: 400,
                description: format!("update {} has no chat to reply to", self.update_id()),
            })?;
        self.telegram.send_message(chat_id, text).await
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builds one `Context` per update.
#[derive(Clone)]
pub struct ContextFactory {
    api: Arc<dyn BotApi>,
    webhook_reply: bool,
    defaults: Arc<HashMap<String, Value>>,
}

impl ContextFactory {
    pub fn new(
        api: Arc<dyn BotApi>,
        webhook_reply: bool,
        defaults: HashMap<String, Value>,
    ) -> Self {
        Self {
            api,
            webhook_reply,
            defaults: Arc::new(defaults),
        }
    }

    pub fn defaults(&self) -> &HashMap<String, Value> {
        &self.defaults
    }

    /// Allocates a fresh client bound to `response` and copies the default
    /// fields into the new context's state. Performs no I/O.
    pub fn build(
        &self,
        update: Update,
        bot_info: Arc<BotIdentity>,
        response: Option<Arc<dyn ResponseHandle>>,
    ) -> Context {
        let telegram = Telegram::new(self.api.clone(), self.webhook_reply, response);
        Context {
            update: Arc::new(update),
            telegram,
            bot_info,
            state: Arc::new(Mutex::new((*self.defaults).clone())),
        }
    }
}
