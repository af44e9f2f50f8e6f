// Send/view transitions shared by proposals and contracts

use chrono::{DateTime, Utc};
use flowdesk_shared::{Contract, ContractStatus, DocumentKind, Proposal, ProposalStatus};

use crate::error::{DomainError, DomainResult};

/// Where a document sits in the part of the lifecycle both kinds share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Draft,
    Sent,
    Viewed,
    /// Any status past viewing (accepted, declined, signed, ...).
    Closed,
}

pub trait Lifecycle {
    const KIND: DocumentKind;

    fn stage(&self) -> Stage;
    fn status_label(&self) -> String;
    fn mark_sent(&mut self, now: DateTime<Utc>);
    /// Moves a sent document to viewed, stamping `viewed_at` once.
    fn mark_viewed(&mut self, now: DateTime<Utc>);
    fn view_count_mut(&mut self) -> &mut i32;
    /// Bumps the row version and `updated_at` after any change.
    fn touch(&mut self, now: DateTime<Utc>);
}

/// `draft -> sent`
pub fn send<D: Lifecycle>(document: &mut D, now: DateTime<Utc>) -> DomainResult<()> {
    if document.stage() != Stage::Draft {
        return Err(DomainError::invalid_transition(
            D::KIND,
            document.status_label(),
            "send",
        ));
    }
    document.mark_sent(now);
    document.touch(now);
    Ok(())
}

/// Counts a view. The count always grows; status only moves `sent -> viewed`.
pub fn record_view<D: Lifecycle>(document: &mut D, now: DateTime<Utc>) {
    *document.view_count_mut() += 1;
    if document.stage() == Stage::Sent {
        document.mark_viewed(now);
    }
    document.touch(now);
}

impl Lifecycle for Proposal {
    const KIND: DocumentKind = DocumentKind::Proposal;

    fn stage(&self) -> Stage {
        match self.status {
            ProposalStatus::Draft => Stage::Draft,
            ProposalStatus::Sent => Stage::Sent,
            ProposalStatus::Viewed => Stage::Viewed,
            ProposalStatus::Accepted | ProposalStatus::Declined | ProposalStatus::Expired => {
                Stage::Closed
            }
        }
    }

    fn status_label(&self) -> String {
        self.status.to_string()
    }

    fn mark_sent(&mut self, now: DateTime<Utc>) {
        self.status = ProposalStatus::Sent;
        self.sent_at = Some(now);
    }

    fn mark_viewed(&mut self, now: DateTime<Utc>) {
        self.status = ProposalStatus::Viewed;
        self.viewed_at.get_or_insert(now);
    }

    fn view_count_mut(&mut self) -> &mut i32 {
        &mut self.view_count
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}

impl Lifecycle for Contract {
    const KIND: DocumentKind = DocumentKind::Contract;

    fn stage(&self) -> Stage {
        match self.status {
            ContractStatus::Draft => Stage::Draft,
            ContractStatus::Sent => Stage::Sent,
            ContractStatus::Viewed => Stage::Viewed,
            ContractStatus::Signed | ContractStatus::Cancelled | ContractStatus::Completed => {
                Stage::Closed
            }
        }
    }

    fn status_label(&self) -> String {
        self.status.to_string()
    }

    fn mark_sent(&mut self, now: DateTime<Utc>) {
        self.status = ContractStatus::Sent;
        self.sent_at = Some(now);
    }

    fn mark_viewed(&mut self, now: DateTime<Utc>) {
        self.status = ContractStatus::Viewed;
        self.viewed_at.get_or_insert(now);
    }

    fn view_count_mut(&mut self) -> &mut i32 {
        &mut self.view_count
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}
