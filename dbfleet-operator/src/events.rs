use std::sync::Arc;

use chrono::{DateTime, Utc};
use dbfleet_api::ObjectKey;
use tokio::sync::broadcast;
use tracing::{info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// An operator-visible event about a record.
#[derive(Debug, Clone)]
pub struct OperatorEvent {
    pub object: ObjectKey,
    pub type_: EventType,
    pub reason: &'static str,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Records operator events: logs them and fans them out to subscribers.
pub struct EventRecorder {
    tx: broadcast::Sender<OperatorEvent>,
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRecorder {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OperatorEvent> {
        self.tx.subscribe()
    }

    fn record(&self, object: &ObjectKey, type_: EventType, reason: &'static str, message: String) {
        match type_ {
            EventType::Normal => info!(object = %object, reason, "{}", message),
            EventType::Warning => warn!(object = %object, reason, "{}", message),
        }
        // No subscribers is fine
        let _ = self.tx.send(OperatorEvent {
            object: object.clone(),
            type_,
            reason,
            message,
            timestamp: Utc::now(),
        });
    }

    pub fn finalizer_set(&self, object: &ObjectKey) {
        self.record(
            object,
            EventType::Normal,
            "FinalizerSet",
            "Deletion finalizer added".to_string(),
        );
    }

    pub fn finalizer_removed(&self, object: &ObjectKey) {
        self.record(
            object,
            EventType::Normal,
            "FinalizerRemoved",
            "Deletion finalizer removed".to_string(),
        );
    }

    pub fn reconciliation_skipped(&self, object: &ObjectKey) {
        self.record(
            object,
            EventType::Normal,
            "ReconciliationSkipped",
            "Reconciliation is disabled by annotation".to_string(),
        );
    }

    pub fn deployment_created(&self, object: &ObjectKey, name: &str) {
        self.record(
            object,
            EventType::Normal,
            "DeploymentCreated",
            format!("Deployment {} created in provider", name),
        );
    }

    pub fn deployment_updated(&self, object: &ObjectKey, name: &str) {
        self.record(
            object,
            EventType::Normal,
            "DeploymentUpdated",
            format!("Deployment {} update submitted", name),
        );
    }

    pub fn deployment_deleted(&self, object: &ObjectKey, name: &str) {
        self.record(
            object,
            EventType::Normal,
            "DeploymentDeleted",
            format!("Deployment {} deleted from provider", name),
        );
    }

    pub fn deployment_kept(&self, object: &ObjectKey, name: &str) {
        self.record(
            object,
            EventType::Normal,
            "DeploymentKept",
            format!("Deployment {} left in provider on deletion", name),
        );
    }

    pub fn connection_secrets_ensured(&self, object: &ObjectKey, count: usize) {
        self.record(
            object,
            EventType::Normal,
            "ConnectionSecretsEnsured",
            format!("Connection secrets ensured for {} users", count),
        );
    }

    pub fn pass_failed(&self, object: &ObjectKey, reason: &'static str, error: &str) {
        self.record(object, EventType::Warning, reason, error.to_string());
    }
}

pub fn create_event_recorder() -> Arc<EventRecorder> {
    Arc::new(EventRecorder::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recorder_without_subscribers_doesnt_panic() {
        let recorder = EventRecorder::new();
        let key = ObjectKey::new("default", "c1");
        recorder.finalizer_set(&key);
        recorder.deployment_created(&key, "c1");
        recorder.connection_secrets_ensured(&key, 2);
        recorder.pass_failed(&key, "Internal", "boom");
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let recorder = create_event_recorder();
        let mut rx = recorder.subscribe();
        let key = ObjectKey::new("default", "c1");

        recorder.connection_secrets_ensured(&key, 3);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.object, key);
        assert_eq!(event.reason, "ConnectionSecretsEnsured");
        assert_eq!(event.type_, EventType::Normal);
        assert_eq!(event.message, "Connection secrets ensured for 3 users");
    }
}
