// Workflow Triggers - Event types and per-type filter configuration

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowdesk_shared::{Booking, Client, Contract, Proposal};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use uuid::Uuid;

/// Flat key/value data carried by an event.
pub type EventData = Map<String, Value>;

/// Types of business events that can fire workflows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    FunnelStepCompleted,
    NewClientCreated,
    InvoicePaid,
    TaskCompleted,
    ProposalAccepted,
    ContractSigned,
    BookingCreated,
    BookingCancelled,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FunnelStepCompleted => "funnel_step_completed",
            Self::NewClientCreated => "new_client_created",
            Self::InvoicePaid => "invoice_paid",
            Self::TaskCompleted => "task_completed",
            Self::ProposalAccepted => "proposal_accepted",
            Self::ContractSigned => "contract_signed",
            Self::BookingCreated => "booking_created",
            Self::BookingCancelled => "booking_cancelled",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FunnelStepFilter {
    pub funnel_id: Option<Uuid>,
    pub step_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientCreatedFilter {
    /// Acquisition source, e.g. `funnel`, `booking`, `manual`.
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InvoicePaidFilter {
    pub client_id: Option<Uuid>,
    pub amount_threshold: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskCompletedFilter {
    pub task_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientFilter {
    pub client_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BookingLinkFilter {
    pub link_id: Option<Uuid>,
}

/// A workflow trigger: event type tag plus its filter configuration.
///
/// Serialized as `{"type": "invoice_paid", "config": {...}}`. An unknown
/// `type` or an unknown config key fails deserialization, so bad triggers
/// are rejected when the workflow is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum Trigger {
    FunnelStepCompleted(FunnelStepFilter),
    NewClientCreated(ClientCreatedFilter),
    InvoicePaid(InvoicePaidFilter),
    TaskCompleted(TaskCompletedFilter),
    ProposalAccepted(ClientFilter),
    ContractSigned(ClientFilter),
    BookingCreated(BookingLinkFilter),
    BookingCancelled(BookingLinkFilter),
}

impl Trigger {
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            Self::FunnelStepCompleted(_) => TriggerType::FunnelStepCompleted,
            Self::NewClientCreated(_) => TriggerType::NewClientCreated,
            Self::InvoicePaid(_) => TriggerType::InvoicePaid,
            Self::TaskCompleted(_) => TriggerType::TaskCompleted,
            Self::ProposalAccepted(_) => TriggerType::ProposalAccepted,
            Self::ContractSigned(_) => TriggerType::ContractSigned,
            Self::BookingCreated(_) => TriggerType::BookingCreated,
            Self::BookingCancelled(_) => TriggerType::BookingCancelled,
        }
    }
}

/// Origin of a trigger event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EventSource {
    System,
    User(Uuid),
    Public,
    Integration(String),
}

/// A business event that can initiate workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_id: Uuid,
    pub workspace_id: Uuid,
    pub trigger_type: TriggerType,
    pub payload: EventData,
    pub source: EventSource,
    pub timestamp: DateTime<Utc>,
}

fn into_data(value: Value) -> EventData {
    match value {
        Value::Object(map) => map,
        _ => EventData::new(),
    }
}

impl TriggerEvent {
    pub fn new(
        workspace_id: Uuid,
        trigger_type: TriggerType,
        payload: EventData,
        source: EventSource,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            workspace_id,
            trigger_type,
            payload,
            source,
            timestamp: Utc::now(),
        }
    }

    pub fn funnel_step_completed(
        workspace_id: Uuid,
        funnel_id: Uuid,
        step_id: Uuid,
        step_type: &str,
        client_id: Option<Uuid>,
    ) -> Self {
        Self::new(
            workspace_id,
            TriggerType::FunnelStepCompleted,
            into_data(json!({
                "funnel_id": funnel_id,
                "step_id": step_id,
                "step_type": step_type,
                "client_id": client_id
            })),
            EventSource::Public,
        )
    }

    pub fn new_client_created(client: &Client, source: &str) -> Self {
        Self::new(
            client.workspace_id,
            TriggerType::NewClientCreated,
            into_data(json!({
                "client_id": client.id,
                "client_name": client.name,
                "client_email": client.email,
                "source": source
            })),
            EventSource::System,
        )
    }

    pub fn invoice_paid(
        workspace_id: Uuid,
        invoice_id: Uuid,
        invoice_number: &str,
        client_id: Uuid,
        amount: Decimal,
    ) -> Self {
        Self::new(
            workspace_id,
            TriggerType::InvoicePaid,
            into_data(json!({
                "invoice_id": invoice_id,
                "invoice_number": invoice_number,
                "client_id": client_id,
                "amount": amount
            })),
            EventSource::Integration("payments".to_string()),
        )
    }

    pub fn task_completed(
        workspace_id: Uuid,
        task_id: Uuid,
        title: &str,
        client_id: Option<Uuid>,
        completed_by: Uuid,
    ) -> Self {
        Self::new(
            workspace_id,
            TriggerType::TaskCompleted,
            into_data(json!({
                "task_id": task_id,
                "task_title": title,
                "client_id": client_id
            })),
            EventSource::User(completed_by),
        )
    }

    pub fn proposal_accepted(proposal: &Proposal, contract_id: Uuid) -> Self {
        Self::new(
            proposal.workspace_id,
            TriggerType::ProposalAccepted,
            into_data(json!({
                "proposal_id": proposal.id,
                "proposal_number": proposal.number,
                "proposal_title": proposal.title,
                "client_id": proposal.client_id,
                "total": proposal.total,
                "signer_name": proposal.signer_name,
                "contract_id": contract_id
            })),
            EventSource::Public,
        )
    }

    pub fn contract_signed(contract: &Contract) -> Self {
        Self::new(
            contract.workspace_id,
            TriggerType::ContractSigned,
            into_data(json!({
                "contract_id": contract.id,
                "contract_number": contract.number,
                "contract_title": contract.title,
                "client_id": contract.client_id,
                "proposal_id": contract.proposal_id
            })),
            EventSource::Public,
        )
    }

    pub fn booking_created(workspace_id: Uuid, booking: &Booking) -> Self {
        Self::booking_event(workspace_id, booking, TriggerType::BookingCreated, EventSource::Public)
    }

    pub fn booking_cancelled(workspace_id: Uuid, booking: &Booking, cancelled_by: Uuid) -> Self {
        Self::booking_event(
            workspace_id,
            booking,
            TriggerType::BookingCancelled,
            EventSource::User(cancelled_by),
        )
    }

    fn booking_event(
        workspace_id: Uuid,
        booking: &Booking,
        trigger_type: TriggerType,
        source: EventSource,
    ) -> Self {
        Self::new(
            workspace_id,
            trigger_type,
            into_data(json!({
                "booking_id": booking.id,
                "link_id": booking.link_id,
                "booker_name": booking.booker_name,
                "booker_email": booking.booker_email,
                "scheduled_at": booking.scheduled_at.to_rfc3339(),
                "status": booking.status.as_str(),
                "cancellation_reason": booking.cancellation_reason
            })),
            source,
        )
    }
}

/// Receives events published by document and booking state machines.
///
/// Implementations must not report workflow failures back to the publisher.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: TriggerEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_serializes_with_type_and_config() {
        let trigger = Trigger::InvoicePaid(InvoicePaidFilter {
            client_id: None,
            amount_threshold: Some(Decimal::from(100)),
        });
        let value = serde_json::to_value(&trigger).unwrap();
        assert_eq!(value["type"], "invoice_paid");
        assert!(value["config"].get("amount_threshold").is_some());
        assert_eq!(trigger.trigger_type(), TriggerType::InvoicePaid);
    }

    #[test]
    fn test_unknown_trigger_type_is_rejected() {
        let result: Result<Trigger, _> = serde_json::from_value(json!({
            "type": "ticket_created",
            "config": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_filter_key_is_rejected() {
        let result: Result<Trigger, _> = serde_json::from_value(json!({
            "type": "task_completed",
            "config": { "project_id": "abc" }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_threshold_accepts_numeric_json() {
        let trigger: Trigger = serde_json::from_value(json!({
            "type": "invoice_paid",
            "config": { "amount_threshold": 100 }
        }))
        .unwrap();
        match trigger {
            Trigger::InvoicePaid(filter) => {
                assert_eq!(filter.amount_threshold, Some(Decimal::from(100)))
            }
            other => panic!("unexpected trigger {:?}", other),
        }
    }
}
