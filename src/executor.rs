use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tracing::warn;

use crate::context::Context;
use crate::error::BotError;
use crate::middleware::{Middleware, Next};

/// Default upper bound on one update's handling time.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_millis(90_000);

/// Runs `handler` against `ctx`, failing with `BotError::Timeout` once
/// `timeout` elapses.
///
/// The handler runs on its own task and is not aborted on timeout: it keeps
/// going in the background and only the wait for it is given up.
pub async fn run_with_timeout(
    handler: Arc<dyn Middleware>,
    ctx: Context,
    timeout: Duration,
) -> Result<(), BotError> {
    let update_id = ctx.update_id();
    let task = tokio::spawn(async move { handler.call(ctx, Next::noop()).await });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result.map_err(BotError::Handler),
        Ok(Err(join_err)) => Err(BotError::Handler(anyhow!(
            "handler for update {} panicked: {}",
            update_id,
            join_err
        ))),
        Err(_) => {
            warn!(
                "Update {} exceeded handler timeout of {:?}, leaving it running",
                update_id, timeout
            );
            Err(BotError::Timeout { update_id, timeout })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextFactory;
    use crate::mocks::{identity, message_update, MockApi};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn context(update_id: i64) -> Context {
        ContextFactory::new(Arc::new(MockApi::new()), true, HashMap::new()).build(
            message_update(update_id, 1, "hi"),
            Arc::new(identity()),
            None,
        )
    }

    async fn pass_through(ctx: Context, next: Next) -> anyhow::Result<()> {
        next.run(ctx).await
    }

    async fn boom(_ctx: Context, _next: Next) -> anyhow::Result<()> {
        anyhow::bail!("boom")
    }

    async fn panics(_ctx: Context, _next: Next) -> anyhow::Result<()> {
        panic!("handler bug")
    }

    #[tokio::test]
    async fn test_success_and_handler_error() {
        let ok: Arc<dyn Middleware> = Arc::new(pass_through);
        assert!(run_with_timeout(ok, context(1), Duration::from_secs(1))
            .await
            .is_ok());

        let failing: Arc<dyn Middleware> = Arc::new(boom);
        let err = run_with_timeout(failing, context(2), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Handler(ref e) if e.to_string() == "boom"));
    }

    #[tokio::test]
    async fn test_timeout_leaves_handler_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let slow: Arc<dyn Middleware> = Arc::new(move |_ctx: Context, _next: Next| {
            let flag = flag.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                flag.store(true, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            }
        });

        let err = run_with_timeout(slow, context(3), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Timeout { update_id: 3, .. }));
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panic_is_reported_as_handler_error() {
        let panicking: Arc<dyn Middleware> = Arc::new(panics);
        let err = run_with_timeout(panicking, context(4), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Handler(_)));
    }
}
