//! Event publisher implementations.
//!
//! Delivery is best-effort: the lifecycle service logs a failed publish and
//! keeps the committed transition. The doubles here let tests assert both
//! sides of that contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tracing::info;

use greenlight_core::{CoreError, DomainEvent, DomainEventPublisher, FlowInstanceId};

/// Publisher that logs every event through `tracing`
pub struct TracingEventPublisher;

#[async_trait]
impl DomainEventPublisher for TracingEventPublisher {
    async fn publish(&self, event: &dyn DomainEvent) -> Result<(), CoreError> {
        info!(
            event_type = event.event_type(),
            flow_instance_id = ?event.flow_instance_id().map(|id| id.0),
            occurred_at = %event.occurred_at(),
            "domain event"
        );
        Ok(())
    }
}

/// A published event as seen by the recording publisher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// The event type string
    pub event_type: String,

    /// The flow instance the event belongs to
    pub flow_instance_id: Option<FlowInstanceId>,

    /// When the event occurred
    pub occurred_at: DateTime<Utc>,
}

/// Publisher that records events for test assertions
pub struct RecordingEventPublisher {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventPublisher {
    /// Create an empty publisher
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Everything published so far, in order
    pub fn recorded(&self) -> Vec<RecordedEvent> {
        self.events.lock().expect("publisher lock poisoned").clone()
    }

    /// The event types published so far, in order
    pub fn event_types(&self) -> Vec<String> {
        self.recorded().into_iter().map(|e| e.event_type).collect()
    }

    /// Number of published events
    pub fn count(&self) -> usize {
        self.events.lock().expect("publisher lock poisoned").len()
    }
}

impl Default for RecordingEventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DomainEventPublisher for RecordingEventPublisher {
    async fn publish(&self, event: &dyn DomainEvent) -> Result<(), CoreError> {
        self.events
            .lock()
            .expect("publisher lock poisoned")
            .push(RecordedEvent {
                event_type: event.event_type().to_string(),
                flow_instance_id: event.flow_instance_id(),
                occurred_at: event.occurred_at(),
            });
        Ok(())
    }
}

/// Publisher whose sink is permanently down; every publish fails
pub struct FailingEventPublisher;

#[async_trait]
impl DomainEventPublisher for FailingEventPublisher {
    async fn publish(&self, event: &dyn DomainEvent) -> Result<(), CoreError> {
        Err(CoreError::EventDeliveryError(format!(
            "sink unavailable for {}",
            event.event_type()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenlight_core::domain::events::FlowStarted;
    use greenlight_core::{DocumentId, FlowDefId};

    fn started_event() -> FlowStarted {
        FlowStarted {
            flow_instance_id: Some(FlowInstanceId(1)),
            document_id: DocumentId(100),
            flow_def_id: FlowDefId(5),
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_recording_publisher_captures_events() {
        let publisher = RecordingEventPublisher::new();
        publisher.publish(&started_event()).await.unwrap();
        publisher.publish(&started_event()).await.unwrap();

        assert_eq!(publisher.count(), 2);
        let recorded = publisher.recorded();
        assert_eq!(recorded[0].event_type, "flow_instance.started");
        assert_eq!(recorded[0].flow_instance_id, Some(FlowInstanceId(1)));
    }

    #[tokio::test]
    async fn test_failing_publisher_always_errors() {
        let publisher = FailingEventPublisher;
        let err = publisher.publish(&started_event()).await.unwrap_err();
        assert!(matches!(err, CoreError::EventDeliveryError(_)));
    }

    #[tokio::test]
    async fn test_tracing_publisher_accepts_events() {
        let publisher = TracingEventPublisher;
        assert!(publisher.publish(&started_event()).await.is_ok());
    }
}
