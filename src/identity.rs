use std::sync::{Arc, OnceLock};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::BotApi;
use crate::error::{ApiError, BotError};
use crate::types::BotIdentity;

type IdentityFuture = Shared<BoxFuture<'static, Result<Arc<BotIdentity>, Arc<ApiError>>>>;

/// Resolves the bot's identity once and remembers it.
///
/// Callers arriving while `getMe` is in flight await that same request. A
/// failed request is reported to all of its waiters and then forgotten, so
/// the next caller tries again.
#[derive(Clone)]
pub struct IdentityCache {
    api: Arc<dyn BotApi>,
    resolved: Arc<OnceLock<Arc<BotIdentity>>>,
    pending: Arc<Mutex<Option<IdentityFuture>>>,
}

impl IdentityCache {
    pub fn new(api: Arc<dyn BotApi>) -> Self {
        Self {
            api,
            resolved: Arc::new(OnceLock::new()),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// The cached identity, without any I/O.
    pub fn get(&self) -> Option<Arc<BotIdentity>> {
        self.resolved.get().cloned()
    }

    pub async fn resolve(&self) -> Result<Arc<BotIdentity>, BotError> {
        if let Some(identity) = self.get() {
            return Ok(identity);
        }

        let request = {
            let mut pending = self.pending.lock().await;
            if let Some(identity) = self.get() {
                return Ok(identity);
            }
            // A request that already failed is never joined; its waiters
            // may not have cleared it yet.
            let failed = pending
                .as_ref()
                .is_some_and(|request| matches!(request.peek(), Some(Err(_))));
            match pending.as_ref() {
                Some(request) if !failed => request.clone(),
                _ => {
                    debug!("Fetching bot identity");
                    let api = self.api.clone();
                    let request = async move {
                        api.get_me().await.map(Arc::new).map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    *pending = Some(request.clone());
                    request
                }
            }
        };

        // Publish the identity before clearing the in-flight request so a
        // caller arriving in between never starts a second `getMe`.
        let outcome = match request.clone().await {
            Ok(identity) => Ok(self.resolved.get_or_init(|| identity).clone()),
            Err(err) => Err(BotError::from(err)),
        };

        let mut pending = self.pending.lock().await;
        if pending.as_ref().is_some_and(|p| p.ptr_eq(&request)) {
            *pending = None;
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockApi;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_resolves_share_one_request() {
        let api = Arc::new(MockApi::new().with_get_me_delay(Duration::from_millis(50)));
        let cache = IdentityCache::new(api.clone());

        let results = futures::future::join_all((0..16).map(|_| cache.resolve())).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(api.get_me_calls(), 1);

        let again = cache.resolve().await.unwrap();
        assert_eq!(again.username, "dispatch_test_bot");
        assert_eq!(api.get_me_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_resolves_across_tasks() {
        let api = Arc::new(MockApi::new().with_get_me_delay(Duration::from_millis(50)));
        let cache = IdentityCache::new(api.clone());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.resolve().await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(api.get_me_calls(), 1);
    }

    #[tokio::test]
    async fn test_settled_failure_is_not_joined() {
        let api = Arc::new(MockApi::new());
        let cache = IdentityCache::new(api.clone());

        let failed: IdentityFuture = async {
            Err(Arc::new(ApiError::Telegram {
                code: 502,
                description: "Bad Gateway".to_string(),
            }))
        }
        .boxed()
        .shared();
        assert!(failed.clone().await.is_err());
        *cache.pending.lock().await = Some(failed);

        let identity = cache.resolve().await.unwrap();
        assert_eq!(identity.id, 4242);
        assert_eq!(api.get_me_calls(), 1);
        assert!(cache.pending.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_failure_reaches_all_waiters_and_is_not_cached() {
        let api = Arc::new(
            MockApi::new()
                .with_get_me_delay(Duration::from_millis(30))
                .failing_get_me(1),
        );
        let cache = IdentityCache::new(api.clone());

        let (a, b) = tokio::join!(cache.resolve(), cache.resolve());
        assert!(matches!(a, Err(BotError::Api(_))));
        assert!(matches!(b, Err(BotError::Api(_))));
        assert_eq!(api.get_me_calls(), 1);
        assert!(cache.get().is_none());

        let identity = cache.resolve().await.unwrap();
        assert_eq!(identity.id, 4242);
        assert_eq!(api.get_me_calls(), 2);
        assert!(cache.get().is_some());
    }
}
