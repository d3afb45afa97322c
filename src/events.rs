use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundEvent {
    PrisonerAllocated,
    AllocationAmended,
    AttendanceCreated,
    AttendanceAmended,
    ScheduledInstanceAmended,
}

impl OutboundEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboundEvent::PrisonerAllocated => "activities.prisoner.allocated",
            OutboundEvent::AllocationAmended => "activities.prisoner.allocation-amended",
            OutboundEvent::AttendanceCreated => "activities.prisoner.attendance-created",
            OutboundEvent::AttendanceAmended => "activities.prisoner.attendance-amended",
            OutboundEvent::ScheduledInstanceAmended => "activities.scheduled-instance.amended",
        }
    }
}

/// Fire-and-forget sink for domain events. Delivery is at least once, so
/// consumers must tolerate repeats; failures never reach the caller.
#[async_trait]
pub trait EventPublisher: Send + Sync + 'static {
    async fn publish(&self, event: OutboundEvent, entity_id: Uuid);
}

#[derive(Debug, Default)]
pub struct TracingPublisher;

#[async_trait]
impl EventPublisher for TracingPublisher {
    async fn publish(&self, event: OutboundEvent, entity_id: Uuid) {
        info!(event_type = event.as_str(), %entity_id, "domain event");
    }
}

/// Posts each event to a webhook from a detached task.
pub struct WebhookPublisher {
    client: Client,
    url: String,
}

impl WebhookPublisher {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl EventPublisher for WebhookPublisher {
    async fn publish(&self, event: OutboundEvent, entity_id: Uuid) {
        let request = self.client.post(&self.url).json(&json!({
            "eventType": event.as_str(),
            "additionalInformation": { "id": entity_id },
        }));
        tokio::spawn(async move {
            if let Err(err) = request.send().await.and_then(|res| res.error_for_status()) {
                warn!(event_type = event.as_str(), %entity_id, error = %err, "failed to publish event");
            }
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    TemporaryRelease,
    Received,
    Released,
    Transferred,
}

/// Inbound notification that a prisoner moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrisonerMovementEvent {
    pub prisoner_number: String,
    #[serde(default)]
    pub prison_code: Option<String>,
    pub movement_type: MovementType,
}
