use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::oneshot;

/// The reply channel of one webhook delivery.
///
/// A handle is finalized exactly once, either by `reply` carrying a body or
/// by `finish` closing it empty. Later calls are no-ops.
pub trait ResponseHandle: Send + Sync {
    fn is_finished(&self) -> bool;

    /// Finalizes the handle with `body`; returns `false` if it was already
    /// finalized.
    fn reply(&self, body: Value) -> bool;

    fn finish(&self);
}

/// `ResponseHandle` completing a pending webhook HTTP response.
pub struct WebhookResponse {
    tx: Mutex<Option<oneshot::Sender<Option<Value>>>>,
}

impl WebhookResponse {
    /// The receiver yields `Some(body)` for a routed reply and `None` for an
    /// empty acknowledgement.
    pub fn channel() -> (Self, oneshot::Receiver<Option<Value>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    fn complete(&self, body: Option<Value>) -> bool {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                // The listener may have gone away; the handle is finalized either way.
                let _ = tx.send(body);
                true
            }
            None => false,
        }
    }
}

impl ResponseHandle for WebhookResponse {
    fn is_finished(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn reply(&self, body: Value) -> bool {
        self.complete(Some(body))
    }

    fn finish(&self) {
        self.complete(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_reply_then_finish_is_noop() {
        let (response, rx) = WebhookResponse::channel();
        assert!(!response.is_finished());

        assert!(response.reply(json!({ "method": "sendMessage" })));
        assert!(response.is_finished());
        response.finish();
        assert!(!response.reply(json!({})));

        assert_eq!(rx.await.unwrap(), Some(json!({ "method": "sendMessage" })));
    }

    #[tokio::test]
    async fn test_finish_sends_empty_body() {
        let (response, rx) = WebhookResponse::channel();
        response.finish();
        response.finish();
        assert_eq!(rx.await.unwrap(), None);
    }
}
