// Email outbox - retry queue for workflow emails whose first delivery failed

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{EmailMessage, MailSender};
use crate::store::{OutboxRepository, StoreResult};

/// Minutes added to the retry delay per failed attempt.
const BACKOFF_STEP_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Dead,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Dead => "dead",
        }
    }
}

impl std::str::FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "dead" => Ok(Self::Dead),
            other => Err(format!("unknown outbox status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub recipient: String,
    pub template: String,
    pub subject: String,
    pub body: String,
    pub status: OutboxStatus,
    /// Attempts made by the dispatcher; the failed inline send is not counted.
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Delay before the next try after `attempts` failures.
pub fn backoff(attempts: i32) -> Duration {
    Duration::minutes(BACKOFF_STEP_MINUTES * i64::from(attempts.max(1)))
}

impl OutboxEntry {
    pub fn new(
        recipient: &str,
        template: &str,
        message: &EmailMessage,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient: recipient.to_string(),
            template: template.to_string(),
            subject: message.subject.clone(),
            body: message.body.clone(),
            status: OutboxStatus::Pending,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            next_attempt_at: now,
            last_error: None,
            created_at: now,
            sent_at: None,
        }
    }

    pub fn message(&self) -> EmailMessage {
        EmailMessage {
            subject: self.subject.clone(),
            body: self.body.clone(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == OutboxStatus::Pending && self.next_attempt_at <= now
    }

    pub fn mark_sent(&mut self, now: DateTime<Utc>) {
        self.attempts += 1;
        self.status = OutboxStatus::Sent;
        self.sent_at = Some(now);
        self.last_error = None;
    }

    /// Record a failed attempt; the entry goes dead once its budget is spent.
    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.attempts += 1;
        self.last_error = Some(error.into());
        if self.attempts >= self.max_attempts {
            self.status = OutboxStatus::Dead;
        } else {
            self.next_attempt_at = now + backoff(self.attempts);
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub sent: usize,
    pub retried: usize,
    pub dead: usize,
}

/// Drains due outbox entries through a mail sender.
pub struct OutboxDispatcher {
    outbox: Arc<dyn OutboxRepository>,
    mailer: Arc<dyn MailSender>,
    batch_size: i64,
}

impl OutboxDispatcher {
    pub fn new(outbox: Arc<dyn OutboxRepository>, mailer: Arc<dyn MailSender>, batch_size: i64) -> Self {
        Self {
            outbox,
            mailer,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> StoreResult<DispatchSummary> {
        let entries = self.outbox.due_entries(now, self.batch_size).await?;
        let mut summary = DispatchSummary::default();

        for mut entry in entries {
            match self
                .mailer
                .send_email(&entry.recipient, &entry.template, &entry.message())
                .await
            {
                Ok(()) => {
                    entry.mark_sent(now);
                    summary.sent += 1;
                    info!("Outbox entry {} delivered to {}", entry.id, entry.recipient);
                }
                Err(e) => {
                    entry.mark_failed(e.to_string(), now);
                    if entry.status == OutboxStatus::Dead {
                        summary.dead += 1;
                        warn!(
                            "Outbox entry {} to {} dead after {} attempts: {}",
                            entry.id, entry.recipient, entry.attempts, e
                        );
                    } else {
                        summary.retried += 1;
                        warn!(
                            "Outbox entry {} attempt {} failed, retrying at {}: {}",
                            entry.id, entry.attempts, entry.next_attempt_at, e
                        );
                    }
                }
            }
            self.outbox.update_entry(&entry).await?;
        }

        Ok(summary)
    }
}
