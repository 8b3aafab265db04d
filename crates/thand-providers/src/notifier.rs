//! Log-backed notifier (spec §4.4 `Notifier` capability): a minimal
//! stand-in for a real paging/email/chat integration. No SMTP or chat-API
//! crate is present anywhere in the corpus this workspace draws from, so
//! this emits a structured `tracing` event instead of fabricating a
//! dependency; a deployment wires a real `Notifier` in its place.

use async_trait::async_trait;

use thand_core::provider::{Capability, NotificationRequest, Notifier, Provider};
use thand_core::ThandError;

pub struct LogNotifier {
    kind: String,
}

impl LogNotifier {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

impl Provider for LogNotifier {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Notifier]
    }

    fn as_notifier(&self) -> Option<&dyn Notifier> {
        Some(self)
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_notification(&self, req: &NotificationRequest) -> Result<(), ThandError> {
        tracing::info!(
            provider = %self.kind,
            to = ?req.to,
            subject = %req.subject,
            "notification dispatched"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_notification_succeeds() {
        let notifier = LogNotifier::new("log");
        notifier
            .send_notification(&NotificationRequest {
                to: vec!["a@x.com".into()],
                subject: "s".into(),
                body: "b".into(),
            })
            .await
            .unwrap();
    }
}
