use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::future::BoxFuture;
use subtle::ConstantTimeEq;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::BotError;
use crate::response::{ResponseHandle, WebhookResponse};
use crate::types::Update;

/// Header Telegram echoes back when `setWebhook` was given a secret token.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Receives each webhook delivery together with its pending response.
pub type UpdateCallback = Arc<
    dyn Fn(Update, Arc<dyn ResponseHandle>) -> BoxFuture<'static, Result<(), BotError>>
        + Send
        + Sync,
>;

#[derive(Clone)]
struct WebhookState {
    secret_token: Option<String>,
    callback: UpdateCallback,
}

/// Checks that `path` is a literal route axum will accept.
///
/// Hook paths never carry captures, so `:`/`*` segments and braces are
/// rejected along with anything not starting with `/`.
pub fn validate_hook_path(path: &str) -> Result<(), BotError> {
    let invalid = |reason: &str| -> Result<(), BotError> {
        Err(BotError::Configuration(format!(
            "invalid webhook path {:?}: {}",
            path, reason
        )))
    };

    if !path.starts_with('/') {
        return invalid("must start with '/'");
    }
    if path.contains(['{', '}']) {
        return invalid("must not contain '{' or '}'");
    }
    if path
        .split('/')
        .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
    {
        return invalid("segments must not start with ':' or '*'");
    }
    Ok(())
}

/// Router accepting Telegram deliveries with `POST path`.
pub fn webhook_router(
    path: &str,
    secret_token: Option<String>,
    callback: UpdateCallback,
) -> Result<Router, BotError> {
    validate_hook_path(path)?;
    Ok(Router::new()
        .route(path, post(handle_webhook))
        .with_state(WebhookState {
            secret_token,
            callback,
        }))
}

fn secret_matches(expected: &str, provided: Option<&str>) -> bool {
    provided.is_some_and(|provided| provided.as_bytes().ct_eq(expected.as_bytes()).into())
}

async fn handle_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = &state.secret_token {
        let provided = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if !secret_matches(secret, provided) {
            warn!("Rejected webhook request with a wrong secret token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Malformed webhook update: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let update_id = update.update_id;
    let (response, reply) = WebhookResponse::channel();
    let callback = state.callback.clone();

    // Detached so a dropped HTTP connection does not cancel the dispatch.
    tokio::spawn(async move {
        if let Err(e) = callback(update, Arc::new(response)).await {
            error!("Webhook update {} failed: {}", update_id, e);
        }
    });

    match reply.await {
        Ok(Some(body)) => Json(body).into_response(),
        _ => StatusCode::OK.into_response(),
    }
}

/// A listening webhook endpoint.
pub struct WebhookServer {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WebhookServer {
    pub async fn listen(host: &str, port: u16, app: Router) -> Result<Self, BotError> {
        let listener = tokio::net::TcpListener::bind((host, port)).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                error!("Webhook server error: {}", e);
            }
        });

        info!("Webhook listening on {}", local_addr);
        Ok(Self {
            local_addr,
            shutdown: Some(shutdown),
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections; in-flight requests are allowed to finish.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
            info!("Webhook on {} closed", self.local_addr);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
