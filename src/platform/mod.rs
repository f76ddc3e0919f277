pub mod polling;
pub mod webhook;

use self::polling::Polling;
use self::webhook::WebhookServer;

/// The update source a running bot is attached to.
pub enum Ingestion {
    Webhook(WebhookServer),
    Polling(Polling),
}

impl Ingestion {
    /// Signals the source to stop; does not wait for it to wind down.
    pub fn stop(&mut self) {
        match self {
            Ingestion::Webhook(server) => server.close(),
            Ingestion::Polling(polling) => polling.stop(),
        }
    }

    /// True once the underlying task has exited on its own or after `stop`.
    pub fn is_finished(&self) -> bool {
        match self {
            Ingestion::Webhook(server) => server.is_finished(),
            Ingestion::Polling(polling) => polling.is_finished(),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Ingestion::Webhook(_) => "webhook",
            Ingestion::Polling(_) => "polling",
        }
    }
}
