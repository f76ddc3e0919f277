use std::future::Future;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tracing::error;

use crate::context::Context;
use crate::error::BotError;

/// Receives every failure of a dispatched handler.
///
/// Returning `Ok` swallows the error; returning `Err` makes the dispatch
/// itself fail.
#[async_trait]
pub trait ErrorHandler: Send + Sync + 'static {
    async fn handle(&self, error: BotError, ctx: Context) -> Result<(), BotError>;
}

#[async_trait]
impl<F, Fut> ErrorHandler for F
where
    F: Fn(BotError, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BotError>> + Send + 'static,
{
    async fn handle(&self, error: BotError, ctx: Context) -> Result<(), BotError> {
        (self)(error, ctx).await
    }
}

/// Lets the host record that the process should not exit cleanly.
pub trait FaultReporter: Send + Sync {
    fn report_fault(&self);
}

/// Records a non-zero process exit code for `main` to return.
#[derive(Debug, Clone, Default)]
pub struct ExitCodeReporter {
    code: Arc<AtomicU8>,
}

impl ExitCodeReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide reporter. Every clone shares one exit code.
    pub fn global() -> Self {
        static GLOBAL: OnceLock<ExitCodeReporter> = OnceLock::new();
        GLOBAL.get_or_init(Self::new).clone()
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code.load(Ordering::SeqCst))
    }

    pub fn has_fault(&self) -> bool {
        self.code.load(Ordering::SeqCst) != 0
    }
}

impl FaultReporter for ExitCodeReporter {
    fn report_fault(&self) {
        self.code.store(1, Ordering::SeqCst);
    }
}

/// Default error handler: flags the fault, logs the update and re-raises.
pub struct FailLoudly {
    reporter: Arc<dyn FaultReporter>,
}

impl FailLoudly {
    pub fn new(reporter: Arc<dyn FaultReporter>) -> Self {
        Self { reporter }
    }
}

#[async_trait]
impl ErrorHandler for FailLoudly {
    async fn handle(&self, err: BotError, ctx: Context) -> Result<(), BotError> {
        self.reporter.report_fault();
        error!(
            update_id = ctx.update_id(),
            "Unhandled error while processing update {}: {}",
            ctx.update_id(),
            err
        );
        Err(err)
    }
}
