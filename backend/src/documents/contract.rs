// Contract state machine: multi-party signing, cancellation, completion

use chrono::{DateTime, Utc};
use flowdesk_shared::{
    Contract, ContractStatus, DocumentContent, DocumentKind, Party, PartyType, Section,
    SignatureLog,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::derivation::boilerplate_sections;
use super::generate_access_token;
use super::lifecycle::{self, Lifecycle};
use super::numbering::DocumentNumbering;
use crate::error::{DomainError, DomainResult};
use crate::store::{DirectoryRepository, DocumentRepository};
use crate::workflows::{EventSink, TriggerEvent};

const VIEW_RETRIES: usize = 3;
const COMMIT_RETRIES: usize = 3;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewParty {
    /// Defaults to `party_<n>` by position.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: PartyType,
    #[validate(length(min = 1, message = "party name is required"))]
    pub name: String,
    #[validate(email)]
    #[serde(default)]
    pub email: Option<String>,
    pub role: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewContract {
    #[validate(length(min = 1, max = 200, message = "title is required"))]
    pub title: String,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[validate(nested)]
    pub parties: Vec<NewParty>,
    #[serde(default)]
    pub effective_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
}

/// One party's signing act.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignContract {
    pub party_id: String,
    #[serde(default)]
    pub signature_data: String,
    #[serde(default)]
    pub signer_name: Option<String>,
    #[validate(email(message = "must be a valid email address"))]
    #[serde(default)]
    pub signer_email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SignOutcome {
    pub signature: Option<SignatureLog>,
    /// This signature was the last one missing.
    pub completed: bool,
}

fn build_parties(requested: Vec<NewParty>) -> DomainResult<Vec<Party>> {
    if requested.is_empty() {
        return Err(DomainError::invalid("parties", "at least one party is required"));
    }

    let mut seen = HashSet::new();
    let mut parties = Vec::with_capacity(requested.len());

    for (index, party) in requested.into_iter().enumerate() {
        let id = party
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("party_{}", index + 1));
        if !seen.insert(id.clone()) {
            return Err(DomainError::invalid("parties", format!("duplicate party id '{}'", id)));
        }
        parties.push(Party {
            id,
            kind: party.kind,
            name: party.name,
            email: party.email,
            role: party.role,
            signed: false,
            signature_data: None,
            signed_at: None,
        });
    }

    Ok(parties)
}

/// Sign as one party. Legal from `sent`/`viewed` while not fully signed;
/// the last signature flips `fully_signed` and moves the contract to `signed`.
pub fn sign(contract: &mut Contract, input: &SignContract, now: DateTime<Utc>) -> DomainResult<SignOutcome> {
    if contract.fully_signed {
        return Err(DomainError::AlreadyFullySigned);
    }
    if !matches!(contract.status, ContractStatus::Sent | ContractStatus::Viewed) {
        return Err(DomainError::invalid_transition(
            DocumentKind::Contract,
            contract.status,
            "sign",
        ));
    }
    input.validate()?;

    let contract_id = contract.id;
    let party = contract
        .party_mut(&input.party_id)
        .ok_or_else(|| DomainError::not_found("Party", &input.party_id))?;
    if party.signed {
        return Err(DomainError::PartyAlreadySigned(party.id.clone()));
    }

    if let Some(name) = input.signer_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        party.name = name.to_string();
    }
    if let Some(email) = input.signer_email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        party.email = Some(email.to_string());
    }

    let data = input.signature_data.trim();
    party.signed = true;
    party.signed_at = Some(now);
    party.signature_data = (!data.is_empty()).then(|| data.to_string());

    let signature = party.signature_data.clone().map(|data| SignatureLog {
        id: Uuid::new_v4(),
        document_type: DocumentKind::Contract,
        document_id: contract_id,
        signer_name: party.name.clone(),
        signer_email: party.email.clone(),
        signature_data: data,
        signed_at: now,
    });

    contract.fully_signed = contract.all_parties_signed();
    if contract.fully_signed {
        contract.fully_signed_at = Some(now);
        contract.status = ContractStatus::Signed;
    }
    contract.touch(now);

    Ok(SignOutcome {
        signature,
        completed: contract.fully_signed,
    })
}

/// `draft|sent|viewed -> cancelled`
pub fn cancel(contract: &mut Contract, now: DateTime<Utc>) -> DomainResult<()> {
    match contract.status {
        ContractStatus::Draft | ContractStatus::Sent | ContractStatus::Viewed => {
            contract.status = ContractStatus::Cancelled;
            contract.touch(now);
            Ok(())
        }
        other => Err(DomainError::invalid_transition(DocumentKind::Contract, other, "cancel")),
    }
}

/// `signed -> completed`
pub fn complete(contract: &mut Contract, now: DateTime<Utc>) -> DomainResult<()> {
    if contract.status != ContractStatus::Signed {
        return Err(DomainError::invalid_transition(
            DocumentKind::Contract,
            contract.status,
            "complete",
        ));
    }
    contract.status = ContractStatus::Completed;
    contract.touch(now);
    Ok(())
}

pub struct ContractService {
    documents: Arc<dyn DocumentRepository>,
    directory: Arc<dyn DirectoryRepository>,
    events: Arc<dyn EventSink>,
    numbering: DocumentNumbering,
}

impl ContractService {
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

    /// Standalone contract, starting as a draft.
    pub async fn create(&self, workspace_id: Uuid, request: NewContract) -> DomainResult<Contract> {
        request.validate()?;

        if let Some(client_id) = request.client_id {
            self.directory
                .find_client(workspace_id, client_id)
                .await?
                .ok_or_else(|| DomainError::not_found("Client", client_id))?;
        }

        let now = Utc::now();
        let number = self
            .numbering
            .next(workspace_id, DocumentKind::Contract, now)
            .await?;
        let content = if request.sections.is_empty() {
            boilerplate_sections(&format!("contract {}", number))
        } else {
            DocumentContent {
                sections: request.sections,
            }
        };

        let contract = Contract {
            id: Uuid::new_v4(),
            workspace_id,
            client_id: request.client_id,
            proposal_id: None,
            number,
            title: request.title.trim().to_string(),
            content,
            parties: build_parties(request.parties)?,
            status: ContractStatus::Draft,
            fully_signed: false,
            fully_signed_at: None,
            effective_date: request.effective_date,
            expiry_date: request.expiry_date,
            access_token: generate_access_token(),
            sent_at: None,
            viewed_at: None,
            view_count: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        self.documents.insert_contract(&contract).await?;
        info!("Contract {} created with {} parties", contract.number, contract.parties.len());

        Ok(contract)
    }

    pub async fn get(&self, workspace_id: Uuid, contract_id: Uuid) -> DomainResult<Contract> {
        self.documents
            .find_contract(workspace_id, contract_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Contract", contract_id))
    }

    async fn by_token(&self, token: &str) -> DomainResult<Contract> {
        self.documents
            .find_contract_by_token(token)
            .await?
            .ok_or_else(|| DomainError::not_found("Contract", "token"))
    }

    pub async fn signatures(&self, workspace_id: Uuid, contract_id: Uuid) -> DomainResult<Vec<SignatureLog>> {
        let contract = self.get(workspace_id, contract_id).await?;
        Ok(self
            .documents
            .signatures_for(DocumentKind::Contract, contract.id)
            .await?)
    }

    async fn transition(
        &self,
        workspace_id: Uuid,
        contract_id: Uuid,
        apply: fn(&mut Contract, DateTime<Utc>) -> DomainResult<()>,
    ) -> DomainResult<Contract> {
        let mut contract = self.get(workspace_id, contract_id).await?;
        let expected = contract.version;

        apply(&mut contract, Utc::now())?;

        if !self.documents.update_contract(&contract, expected).await? {
            return Err(DomainError::ConcurrentModification("Contract"));
        }
        info!("Contract {} is now {}", contract.number, contract.status);
        Ok(contract)
    }

    pub async fn send(&self, workspace_id: Uuid, contract_id: Uuid) -> DomainResult<Contract> {
        self.transition(workspace_id, contract_id, lifecycle::send::<Contract>)
            .await
    }

    pub async fn cancel(&self, workspace_id: Uuid, contract_id: Uuid) -> DomainResult<Contract> {
        self.transition(workspace_id, contract_id, cancel).await
    }

    pub async fn complete(&self, workspace_id: Uuid, contract_id: Uuid) -> DomainResult<Contract> {
        self.transition(workspace_id, contract_id, complete).await
    }

    pub async fn view(&self, token: &str) -> DomainResult<Contract> {
        for _ in 0..VIEW_RETRIES {
            let mut contract = self.by_token(token).await?;
            let expected = contract.version;

            lifecycle::record_view(&mut contract, Utc::now());

            if self.documents.update_contract(&contract, expected).await? {
                return Ok(contract);
            }
        }
        Err(DomainError::ConcurrentModification("Contract"))
    }

    /// Public signing through the access token. A commit lost to another
    /// write reloads the contract and re-runs the guards, so a view or a
    /// different party's signature never rejects a valid signature.
    pub async fn sign(&self, token: &str, input: SignContract) -> DomainResult<Contract> {
        for _ in 0..COMMIT_RETRIES {
            let mut contract = self.by_token(token).await?;
            let expected = contract.version;

            let outcome = match sign(&mut contract, &input, Utc::now()) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Signature on contract {} rejected: {}", contract.number, e);
                    return Err(e);
                }
            };

            let committed = self
                .documents
                .commit_signature(&contract, expected, outcome.signature.as_ref())
                .await?;
            if !committed {
                debug!("Signature on contract {} raced another write, reloading", contract.number);
                continue;
            }

            info!("Contract {} signed by party {}", contract.number, input.party_id);

            if outcome.completed {
                info!("Contract {} fully signed", contract.number);
                self.events
                    .publish(TriggerEvent::contract_signed(&contract))
                    .await;
            }

            return Ok(contract);
        }

        Err(DomainError::ConcurrentModification("Contract"))
    }
}
