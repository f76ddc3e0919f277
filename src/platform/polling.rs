use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::{BotApi, GetUpdates};
use crate::error::BotError;
use crate::types::UpdateKind;

/// Long-poll tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct PollingOptions {
    pub timeout_secs: u32,
    pub limit: u8,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 50,
            limit: 100,
            retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

/// A running `getUpdates` loop.
pub struct Polling {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Polling {
    /// Spawns the loop. Every raw batch is awaited in `handler` before the
    /// next poll is issued.
    pub fn start<F, Fut>(
        api: Arc<dyn BotApi>,
        options: PollingOptions,
        allowed_updates: Vec<UpdateKind>,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BotError>> + Send + 'static,
    {
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(poll_loop(api, options, allowed_updates, handler, stop_rx));
        Self { stop, task }
    }

    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn poll_loop<F, Fut>(
    api: Arc<dyn BotApi>,
    options: PollingOptions,
    allowed_updates: Vec<UpdateKind>,
    handler: F,
    mut stop_rx: watch::Receiver<bool>,
) where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BotError>> + Send + 'static,
{
    let mut offset = None;
    let mut backoff = options.retry_delay;

    info!("Long polling started");

    loop {
        if *stop_rx.borrow() {
            break;
        }

        let params = GetUpdates {
            offset,
            limit: options.limit,
            timeout_secs: options.timeout_secs,
            allowed_updates: allowed_updates.clone(),
        };

        let result = tokio::select! {
            _ = stop_rx.changed() => break,
            result = api.get_updates(&params) => result,
        };

        match result {
            Ok(batch) => {
                backoff = options.retry_delay;
                if let Some(next) = next_offset(&batch) {
                    offset = Some(next);
                }
                debug!("Received batch, next offset {:?}", offset);
                if let Err(e) = handler(batch).await {
                    error!("Failed to process updates: {}", e);
                }
            }
            Err(e) if e.is_terminal() => {
                error!("Long polling aborted: {}", e);
                break;
            }
            Err(e) => {
                warn!("getUpdates failed: {}. Retrying in {:?}", e, backoff);
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(options.max_retry_delay);
            }
        }
    }

    info!("Long polling stopped");
}

/// Offset acknowledging every update of `batch`.
fn next_offset(batch: &Value) -> Option<i64> {
    batch
        .as_array()?
        .iter()
        .filter_map(|update| update.get("update_id")?.as_i64())
        .max()
        .map(|id| id + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockApi;
    use serde_json::json;
    use std::sync::Mutex;

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[test]
    fn test_next_offset() {
        assert_eq!(
            next_offset(&json!([{ "update_id": 7 }, { "update_id": 9 }])),
            Some(10)
        );
        assert_eq!(next_offset(&json!([])), None);
        assert_eq!(next_offset(&json!({ "update_id": 1 })), None);
    }

    #[tokio::test]
    async fn test_batches_are_handed_over_in_order() {
        let api = Arc::new(MockApi::new().with_batches(vec![
            json!([{ "update_id": 1 }, { "update_id": 2 }]),
            json!([{ "update_id": 3 }]),
        ]));
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();

        let polling = Polling::start(
            api.clone(),
            PollingOptions::default(),
            vec![UpdateKind::Message],
            move |batch| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(batch);
                    Ok::<(), BotError>(())
                }
            },
        );

        wait_until(|| api.polls().len() == 3).await;
        polling.stop();
        wait_until(|| polling.is_finished()).await;

        assert_eq!(received.lock().unwrap().len(), 2);
        let offsets: Vec<_> = api.polls().iter().map(|p| p.offset).collect();
        assert_eq!(offsets, vec![None, Some(3), Some(4)]);
        assert_eq!(api.polls()[0].allowed_updates, vec![UpdateKind::Message]);
    }

    #[tokio::test]
    async fn test_handler_errors_do_not_stop_polling() {
        let api = Arc::new(MockApi::new().with_batches(vec![json!(5), json!([])]));

        let polling = Polling::start(
            api.clone(),
            PollingOptions::default(),
            Vec::new(),
            |_batch| async {
                Err::<(), BotError>(BotError::TypeMismatch("not an array".to_string()))
            },
        );

        wait_until(|| api.polls().len() == 3).await;
        assert!(!polling.is_finished());
        polling.stop();
        wait_until(|| polling.is_finished()).await;
    }
}
