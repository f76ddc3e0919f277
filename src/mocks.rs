use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::api::{BotApi, GetUpdates, SetWebhookOptions};
use crate::error::ApiError;
use crate::response::ResponseHandle;
use crate::types::{BotIdentity, Update};

pub fn identity() -> BotIdentity {
    BotIdentity {
        id: 4242,
        username: "dispatch_test_bot".to_string(),
        first_name: "Dispatch".to_string(),
        can_join_groups: true,
        can_read_all_group_messages: false,
        supports_inline_queries: false,
    }
}

pub fn message_update(update_id: i64, chat_id: i64, text: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "date": 0,
            "chat": { "id": chat_id, "type": "private" },
            "text": text
        }
    }))
    .unwrap()
}

/// In-memory `BotApi` recording every call it receives.
pub struct MockApi {
    get_me_calls: AtomicUsize,
    get_me_delay: Duration,
    get_me_failures: AtomicUsize,
    set_webhook_fails: bool,
    deleted_webhooks: Mutex<Vec<Option<bool>>>,
    webhooks: Mutex<Vec<(String, SetWebhookOptions)>>,
    batches: Mutex<VecDeque<Value>>,
    polls: Mutex<Vec<GetUpdates>>,
    calls: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self {
            get_me_calls: AtomicUsize::new(0),
            get_me_delay: Duration::ZERO,
            get_me_failures: AtomicUsize::new(0),
            set_webhook_fails: false,
            deleted_webhooks: Mutex::new(Vec::new()),
            webhooks: Mutex::new(Vec::new()),
            batches: Mutex::new(VecDeque::new()),
            polls: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_get_me_delay(mut self, delay: Duration) -> Self {
        self.get_me_delay = delay;
        self
    }

    /// The next `failures` calls to `get_me` fail.
    pub fn failing_get_me(self, failures: usize) -> Self {
        self.get_me_failures.store(failures, Ordering::SeqCst);
        self
    }

    pub fn failing_set_webhook(mut self) -> Self {
        self.set_webhook_fails = true;
        self
    }

    /// Raw `getUpdates` results served in order; afterwards polls hang.
    pub fn with_batches(self, batches: Vec<Value>) -> Self {
        self.batches.lock().unwrap().extend(batches);
        self
    }

    pub fn get_me_calls(&self) -> usize {
        self.get_me_calls.load(Ordering::SeqCst)
    }

    pub fn deleted_webhooks(&self) -> Vec<Option<bool>> {
        self.deleted_webhooks.lock().unwrap().clone()
    }

    pub fn webhooks(&self) -> Vec<(String, SetWebhookOptions)> {
        self.webhooks.lock().unwrap().clone()
    }

    pub fn polls(&self) -> Vec<GetUpdates> {
        self.polls.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BotApi for MockApi {
    async fn get_me(&self) -> Result<BotIdentity, ApiError> {
        self.get_me_calls.fetch_add(1, Ordering::SeqCst);
        if !self.get_me_delay.is_zero() {
            tokio::time::sleep(self.get_me_delay).await;
        }
        let failing = self
            .get_me_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ApiError::Telegram {
                code: 502,
                description: "Bad Gateway".to_string(),
            });
        }
        Ok(identity())
    }

    async fn delete_webhook(&self, drop_pending_updates: Option<bool>) -> Result<(), ApiError> {
        self.deleted_webhooks
            .lock()
            .unwrap()
            .push(drop_pending_updates);
        Ok(())
    }

    async fn set_webhook(&self, url: &str, options: &SetWebhookOptions) -> Result<(), ApiError> {
        if self.set_webhook_fails {
            return Err(ApiError::Telegram {
                code: 400,
                description: "Bad Request: bad webhook".to_string(),
            });
        }
        self.webhooks
            .lock()
            .unwrap()
            .push((url.to_string(), options.clone()));
        Ok(())
    }

    async fn get_updates(&self, params: &GetUpdates) -> Result<Value, ApiError> {
        self.polls.lock().unwrap().push(params.clone());
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(batch) => Ok(batch),
            None => std::future::pending().await,
        }
    }

    async fn call(&self, method: &str, _payload: Value) -> Result<Value, ApiError> {
        self.calls.lock().unwrap().push(method.to_string());
        Ok(json!(true))
    }
}

/// `ResponseHandle` counting how often it gets finalized.
pub struct CountingResponse {
    body: Mutex<Option<Value>>,
    finished: Mutex<bool>,
    finalizations: AtomicUsize,
}

impl CountingResponse {
    pub fn new() -> Self {
        Self {
            body: Mutex::new(None),
            finished: Mutex::new(false),
            finalizations: AtomicUsize::new(0),
        }
    }

    /// Number of `finish` calls plus successful `reply` calls.
    pub fn finish_count(&self) -> usize {
        self.finalizations.load(Ordering::SeqCst)
    }

    pub fn body(&self) -> Option<Value> {
        self.body.lock().unwrap().clone()
    }
}

impl ResponseHandle for CountingResponse {
    fn is_finished(&self) -> bool {
        *self.finished.lock().unwrap()
    }

    fn reply(&self, body: Value) -> bool {
        let mut finished = self.finished.lock().unwrap();
        if *finished {
            return false;
        }
        *finished = true;
        *self.body.lock().unwrap() = Some(body);
        self.finalizations.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn finish(&self) {
        *self.finished.lock().unwrap() = true;
        self.finalizations.fetch_add(1, Ordering::SeqCst);
    }
}
