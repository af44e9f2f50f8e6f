// Proposal state machine and service

use chrono::{DateTime, Utc};
use flowdesk_shared::{
    Contract, DocumentContent, DocumentKind, Proposal, ProposalStatus, Section, SignatureLog,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::derivation::derive_contract;
use super::lifecycle::{self, Lifecycle};
use super::numbering::DocumentNumbering;
use super::generate_access_token;
use crate::error::{DomainError, DomainResult};
use crate::store::{DirectoryRepository, DocumentRepository};
use crate::workflows::{EventSink, TriggerEvent};

/// Attempts made when a view races with another write.
const VIEW_RETRIES: usize = 3;
/// Attempts made when an acceptance or decline loses its conditional write.
const COMMIT_RETRIES: usize = 3;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProposal {
    pub client_id: Uuid,
    #[validate(length(min = 1, max = 200, message = "title is required"))]
    pub title: String,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub discount: Option<Decimal>,
    /// Percent applied after the discount.
    #[serde(default)]
    pub tax_rate: Option<Decimal>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

impl NewProposal {
    fn check_amounts(&self) -> DomainResult<()> {
        if self.discount.is_some_and(|d| d.is_sign_negative()) {
            return Err(DomainError::invalid("discount", "must not be negative"));
        }
        if self
            .tax_rate
            .is_some_and(|r| r.is_sign_negative() || r > Decimal::ONE_HUNDRED)
        {
            return Err(DomainError::invalid("tax_rate", "must be between 0 and 100"));
        }
        Ok(())
    }
}

/// What a client submits when accepting a proposal.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignatureInput {
    #[validate(length(min = 1, max = 200, message = "signer name is required"))]
    pub signer_name: String,
    #[validate(email(message = "must be a valid email address"))]
    #[serde(default)]
    pub signer_email: Option<String>,
    #[serde(default)]
    pub signature_data: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptedProposal {
    pub proposal: Proposal,
    pub contract: Contract,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn ensure_open(proposal: &Proposal, action: &'static str) -> DomainResult<()> {
    match proposal.status {
        ProposalStatus::Sent | ProposalStatus::Viewed => Ok(()),
        ProposalStatus::Accepted => Err(DomainError::AlreadyAccepted),
        ProposalStatus::Declined => Err(DomainError::AlreadyDeclined),
        other => Err(DomainError::invalid_transition(DocumentKind::Proposal, other, action)),
    }
}

/// `sent|viewed -> accepted`. Returns the signature row to append when real
/// signature data was supplied.
pub fn accept(
    proposal: &mut Proposal,
    input: &SignatureInput,
    now: DateTime<Utc>,
) -> DomainResult<Option<SignatureLog>> {
    ensure_open(proposal, "accept")?;
    if proposal.is_past_validity(now) {
        return Err(DomainError::ProposalExpired);
    }
    input.validate()?;

    let signature_data = non_empty(input.signature_data.as_deref());

    proposal.status = ProposalStatus::Accepted;
    proposal.accepted_at = Some(now);
    proposal.signer_name = Some(input.signer_name.trim().to_string());
    proposal.signer_email = non_empty(input.signer_email.as_deref());
    proposal.signed_at = signature_data.as_ref().map(|_| now);
    proposal.signature_data = signature_data.clone();
    proposal.touch(now);

    Ok(signature_data.map(|data| SignatureLog {
        id: Uuid::new_v4(),
        document_type: DocumentKind::Proposal,
        document_id: proposal.id,
        signer_name: input.signer_name.trim().to_string(),
        signer_email: proposal.signer_email.clone(),
        signature_data: data,
        signed_at: now,
    }))
}

/// `sent|viewed -> declined`
pub fn decline(proposal: &mut Proposal, reason: Option<&str>, now: DateTime<Utc>) -> DomainResult<()> {
    ensure_open(proposal, "decline")?;

    proposal.status = ProposalStatus::Declined;
    proposal.declined_at = Some(now);
    proposal.decline_reason = non_empty(reason);
    proposal.touch(now);
    Ok(())
}

pub struct ProposalService {
    documents: Arc<dyn DocumentRepository>,
    directory: Arc<dyn DirectoryRepository>,
    events: Arc<dyn EventSink>,
    numbering: DocumentNumbering,
}

impl ProposalService {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        directory: Arc<dyn DirectoryRepository>,
        events: Arc<dyn EventSink>,
        numbering: DocumentNumbering,
    ) -> Self {
        Self {
            documents,
            directory,
            events,
            numbering,
        }
    }

    pub async fn create(&self, workspace_id: Uuid, request: NewProposal) -> DomainResult<Proposal> {
        request.validate()?;
        request.check_amounts()?;

        self.directory
            .find_client(workspace_id, request.client_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Client", request.client_id))?;

        let content = DocumentContent {
            sections: request.sections,
        };
        if request.discount.is_some_and(|d| d > content.subtotal()) {
            return Err(DomainError::invalid("discount", "must not exceed the subtotal"));
        }

        let now = Utc::now();
        let number = self
            .numbering
            .next(workspace_id, DocumentKind::Proposal, now)
            .await?;

        let mut proposal = Proposal {
            id: Uuid::new_v4(),
            workspace_id,
            client_id: request.client_id,
            number,
            title: request.title.trim().to_string(),
            content,
            subtotal: Decimal::ZERO,
            discount: request.discount,
            tax_rate: request.tax_rate,
            total: Decimal::ZERO,
            valid_until: request.valid_until,
            status: ProposalStatus::Draft,
            access_token: generate_access_token(),
            sent_at: None,
            viewed_at: None,
            view_count: 0,
            accepted_at: None,
            declined_at: None,
            decline_reason: None,
            signer_name: None,
            signer_email: None,
            signature_data: None,
            signed_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        proposal.compute_totals();

        self.documents.insert_proposal(&proposal).await?;
        info!("Proposal {} created (total {})", proposal.number, proposal.total);

        Ok(proposal)
    }

    pub async fn get(&self, workspace_id: Uuid, proposal_id: Uuid) -> DomainResult<Proposal> {
        self.documents
            .find_proposal(workspace_id, proposal_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Proposal", proposal_id))
    }

    async fn by_token(&self, token: &str) -> DomainResult<Proposal> {
        self.documents
            .find_proposal_by_token(token)
            .await?
            .ok_or_else(|| DomainError::not_found("Proposal", "token"))
    }

    pub async fn send(&self, workspace_id: Uuid, proposal_id: Uuid) -> DomainResult<Proposal> {
        let mut proposal = self.get(workspace_id, proposal_id).await?;
        let expected = proposal.version;

        lifecycle::send(&mut proposal, Utc::now())?;

        if !self.documents.update_proposal(&proposal, expected).await? {
            return Err(DomainError::ConcurrentModification("Proposal"));
        }
        info!("Proposal {} sent", proposal.number);
        Ok(proposal)
    }

    /// Public view through the access token.
    pub async fn view(&self, token: &str) -> DomainResult<Proposal> {
        for _ in 0..VIEW_RETRIES {
            let mut proposal = self.by_token(token).await?;
            let expected = proposal.version;

            lifecycle::record_view(&mut proposal, Utc::now());

            if self.documents.update_proposal(&proposal, expected).await? {
                return Ok(proposal);
            }
        }
        Err(DomainError::ConcurrentModification("Proposal"))
    }

    /// Accept through the public link: records the signature, derives the
    /// contract and publishes `proposal_accepted`, all or nothing.
    ///
    /// A commit lost to an unrelated write (a view) reloads the proposal and
    /// re-runs the guards, so only a real acceptance or decline wins.
    pub async fn accept(&self, token: &str, input: SignatureInput) -> DomainResult<AcceptedProposal> {
        let mut contract_number = None;

        for _ in 0..COMMIT_RETRIES {
            let mut proposal = self.by_token(token).await?;
            let expected = proposal.version;
            let now = Utc::now();

            let signature = match accept(&mut proposal, &input, now) {
                Ok(signature) => signature,
                Err(e) => {
                    warn!("Acceptance of proposal {} rejected: {}", proposal.number, e);
                    return Err(e);
                }
            };

            let workspace = self
                .directory
                .find_workspace(proposal.workspace_id)
                .await?
                .ok_or_else(|| DomainError::not_found("Workspace", proposal.workspace_id))?;
            let client = self
                .directory
                .find_client(proposal.workspace_id, proposal.client_id)
                .await?;

            let number = match contract_number.take() {
                Some(number) => number,
                None => {
                    self.numbering
                        .next(proposal.workspace_id, DocumentKind::Contract, now)
                        .await?
                }
            };
            let contract = derive_contract(
                &proposal,
                &workspace,
                client.as_ref(),
                number,
                generate_access_token(),
                now,
            );

            let committed = self
                .documents
                .commit_acceptance(&proposal, expected, signature.as_ref(), &contract)
                .await?;
            if !committed {
                debug!("Acceptance of proposal {} raced another write, reloading", proposal.number);
                contract_number = Some(contract.number);
                continue;
            }

            info!(
                "Proposal {} accepted by {}, contract {} created",
                proposal.number,
                proposal.signer_name.as_deref().unwrap_or_default(),
                contract.number
            );

            self.events
                .publish(TriggerEvent::proposal_accepted(&proposal, contract.id))
                .await;

            return Ok(AcceptedProposal { proposal, contract });
        }

        Err(DomainError::ConcurrentModification("Proposal"))
    }

    pub async fn decline(&self, token: &str, reason: Option<String>) -> DomainResult<Proposal> {
        for _ in 0..COMMIT_RETRIES {
            let mut proposal = self.by_token(token).await?;
            let expected = proposal.version;

            decline(&mut proposal, reason.as_deref(), Utc::now())?;

            if self.documents.update_proposal(&proposal, expected).await? {
                info!("Proposal {} declined", proposal.number);
                return Ok(proposal);
            }
        }
        Err(DomainError::ConcurrentModification("Proposal"))
    }
}
