use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::api::BotApi;
use crate::error::ApiError;
use crate::response::ResponseHandle;

/// Methods whose result the caller never needs, so they can be answered
/// inline in the webhook HTTP response instead of a separate request.
const WEBHOOK_REPLY_METHODS: &[&str] = &[
    "answerCallbackQuery",
    "answerInlineQuery",
    "deleteMessage",
    "leaveChat",
    "sendChatAction",
];

/// API client scoped to a single update.
///
/// When built for a webhook delivery it carries that delivery's response
/// handle, so reply routing never crosses into another update.
#[derive(Clone)]
pub struct Telegram {
    api: Arc<dyn BotApi>,
    webhook_reply: bool,
    response: Option<Arc<dyn ResponseHandle>>,
}

impl Telegram {
    pub fn new(
        api: Arc<dyn BotApi>,
        webhook_reply: bool,
        response: Option<Arc<dyn ResponseHandle>>,
    ) -> Self {
        Self {
            api,
            webhook_reply,
            response,
        }
    }

    pub fn api(&self) -> &Arc<dyn BotApi> {
        &self.api
    }

    pub fn response(&self) -> Option<&Arc<dyn ResponseHandle>> {
        self.response.as_ref()
    }

    /// Calls `method`, answering through the pending webhook response when
    /// possible. Returns `None` when the call was routed into the response.
    pub async fn call(&self, method: &str, payload: Value) -> Result<Option<Value>, ApiError> {
        if let Some(response) = self.reply_target(method) {
            let mut body = payload.clone();
            if let Value::Object(fields) = &mut body {
                fields.insert("method".to_string(), Value::String(method.to_string()));
            }
            if response.reply(body) {
                debug!("Answered {} through webhook response", method);
                return Ok(None);
            }
        }

        self.api.call(method, payload).await.map(Some)
    }

    fn reply_target(&self, method: &str) -> Option<&Arc<dyn ResponseHandle>> {
        if !self.webhook_reply || !WEBHOOK_REPLY_METHODS.contains(&method) {
            return None;
        }
        self.response.as_ref().filter(|r| !r.is_finished())
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<Option<Value>, ApiError> {
        self.call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await
    }

    pub async fn send_chat_action(
        &self,
        chat_id: i64,
        action: &str,
    ) -> Result<Option<Value>, ApiError> {
        self.call("sendChatAction", json!({ "chat_id": chat_id, "action": action }))
            .await
    }

    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<Option<Value>, ApiError> {
        let mut payload = json!({ "callback_query_id": callback_query_id });
        if let Some(text) = text {
            payload["text"] = json!(text);
        }
        self.call("answerCallbackQuery", payload).await
    }
}
