// Trigger Matcher - selects the workflows an event should run

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

use super::{EventData, Trigger, TriggerEvent, WorkflowDefinition};

fn payload_str<'a>(payload: &'a EventData, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

fn payload_uuid(payload: &EventData, key: &str) -> Option<Uuid> {
    payload_str(payload, key).and_then(|s| Uuid::parse_str(s).ok())
}

fn payload_decimal(payload: &EventData, key: &str) -> Option<Decimal> {
    match payload.get(key)? {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

/// A configured filter passes when unset, or when the payload carries an
/// equal value. A missing payload value never satisfies a set filter.
fn uuid_filter(filter: Option<Uuid>, payload: &EventData, key: &str) -> bool {
    match filter {
        None => true,
        Some(expected) => payload_uuid(payload, key) == Some(expected),
    }
}

fn str_filter(filter: Option<&str>, payload: &EventData, key: &str) -> bool {
    match filter {
        None => true,
        Some(expected) => payload_str(payload, key) == Some(expected),
    }
}

impl Trigger {
    /// Evaluate this trigger's filters against an event payload. The event
    /// type itself is checked by [`match_workflows`].
    pub fn accepts(&self, payload: &EventData) -> bool {
        match self {
            Trigger::FunnelStepCompleted(filter) => {
                uuid_filter(filter.funnel_id, payload, "funnel_id")
                    && str_filter(filter.step_type.as_deref(), payload, "step_type")
            }
            Trigger::NewClientCreated(filter) => {
                str_filter(filter.source.as_deref(), payload, "source")
            }
            Trigger::InvoicePaid(filter) => {
                if !uuid_filter(filter.client_id, payload, "client_id") {
                    return false;
                }
                match filter.amount_threshold {
                    None => true,
                    Some(threshold) => payload_decimal(payload, "amount")
                        .is_some_and(|amount| amount >= threshold),
                }
            }
            Trigger::TaskCompleted(filter) => uuid_filter(filter.task_id, payload, "task_id"),
            Trigger::ProposalAccepted(filter) | Trigger::ContractSigned(filter) => {
                uuid_filter(filter.client_id, payload, "client_id")
            }
            Trigger::BookingCreated(filter) | Trigger::BookingCancelled(filter) => {
                uuid_filter(filter.link_id, payload, "link_id")
            }
        }
    }
}

/// Enabled workflows whose trigger type equals the event's and whose filters
/// accept its payload, in source order.
pub fn match_workflows<'a>(
    workflows: &'a [WorkflowDefinition],
    event: &TriggerEvent,
) -> Vec<&'a WorkflowDefinition> {
    workflows
        .iter()
        .filter(|w| w.enabled)
        .filter(|w| w.trigger.trigger_type() == event.trigger_type)
        .filter(|w| w.trigger.accepts(&event.payload))
        .collect()
}
