use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::context::Context;

/// The rest of the chain after the current middleware.
pub struct Next(Box<dyn FnOnce(Context) -> BoxFuture<'static, anyhow::Result<()>> + Send>);

impl Next {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self(Box::new(move |ctx| f(ctx).boxed()))
    }

    /// Terminal `next`: does nothing.
    pub fn noop() -> Self {
        Self::new(|_| async { Ok(()) })
    }

    pub async fn run(self, ctx: Context) -> anyhow::Result<()> {
        (self.0)(ctx).await
    }
}

/// A composed handler chain.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn call(&self, ctx: Context, next: Next) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> Middleware for F
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn call(&self, ctx: Context, next: Next) -> anyhow::Result<()> {
        (self)(ctx, next).await
    }
}
