use async_trait::async_trait;
use chrono::Utc;
use flowdesk_shared::{Client, Contract, DocumentKind, Proposal, SignatureLog, Workspace};
use std::sync::{Arc, Once};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::fixtures;
use crate::config::NumberingConfig;
use crate::documents::{contract, lifecycle, ContractService, DocumentNumbering, ProposalService, SignContract};
use crate::scheduling::BookingService;
use crate::services::MailSender;
use crate::store::{DocumentRepository, MemoryStore, StoreResult};
use crate::workflows::{ActionExecutor, EventSink, TriggerEvent, TriggerType, WorkflowEngine};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init()
            .ok();
    });
}

/// Event sink that keeps every published event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TriggerEvent>>,
}

impl RecordingSink {
    pub async fn types(&self) -> Vec<TriggerType> {
        self.events.lock().await.iter().map(|e| e.trigger_type).collect()
    }

    pub async fn events(&self) -> Vec<TriggerEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: TriggerEvent) {
        self.events.lock().await.push(event);
    }
}

/// A seeded workspace and client on the in-memory store.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub events: Arc<RecordingSink>,
    pub workspace: Workspace,
    pub client: Client,
}

impl TestContext {
    pub async fn new() -> Self {
        init_test_logging();

        let store = Arc::new(MemoryStore::new());
        let workspace = fixtures::workspace();
        let client = fixtures::client(workspace.id);
        store.add_workspace(workspace.clone()).await;
        store.add_client(client.clone()).await;

        Self {
            store,
            events: Arc::new(RecordingSink::default()),
            workspace,
            client,
        }
    }

    fn numbering(&self) -> DocumentNumbering {
        DocumentNumbering::new(self.store.clone(), NumberingConfig::default())
    }

    pub fn bookings(&self) -> BookingService {
        BookingService::new(self.store.clone(), self.events.clone())
    }

    pub fn proposals(&self) -> ProposalService {
        self.proposals_over(self.store.clone())
    }

    /// Proposal service whose document writes go through `documents`.
    pub fn proposals_over(&self, documents: Arc<dyn DocumentRepository>) -> ProposalService {
        ProposalService::new(
            documents,
            self.store.clone(),
            self.events.clone(),
            self.numbering(),
        )
    }

    pub fn contracts(&self) -> ContractService {
        self.contracts_over(self.store.clone())
    }

    pub fn contracts_over(&self, documents: Arc<dyn DocumentRepository>) -> ContractService {
        ContractService::new(
            documents,
            self.store.clone(),
            self.events.clone(),
            self.numbering(),
        )
    }

    pub fn engine(&self, mailer: Arc<dyn MailSender>) -> WorkflowEngine {
        let executor = ActionExecutor::new(self.store.clone(), self.store.clone(), mailer, 3);
        WorkflowEngine::new(self.store.clone(), executor)
    }
}

/// A write another request lands between a service's load and its commit.
#[derive(Debug, Clone)]
pub enum Interleaved {
    View,
    Signature(SignContract),
}

/// Document store that applies one interleaved write to the stored row just
/// before the first acceptance or signature commit reaches the store.
pub struct InterleavingStore {
    inner: Arc<MemoryStore>,
    pending: Mutex<Option<Interleaved>>,
}

impl InterleavingStore {
    pub fn new(inner: Arc<MemoryStore>, write: Interleaved) -> Self {
        Self {
            inner,
            pending: Mutex::new(Some(write)),
        }
    }

    pub async fn fired(&self) -> bool {
        self.pending.lock().await.is_none()
    }

    async fn interleave_proposal(&self, token: &str) {
        if let Some(Interleaved::View) = self.pending.lock().await.take() {
            let mut current = self.inner.find_proposal_by_token(token).await.unwrap().unwrap();
            let expected = current.version;
            lifecycle::record_view(&mut current, Utc::now());
            assert!(self.inner.update_proposal(&current, expected).await.unwrap());
        }
    }

    async fn interleave_contract(&self, token: &str) {
        let Some(write) = self.pending.lock().await.take() else {
            return;
        };
        let mut current = self.inner.find_contract_by_token(token).await.unwrap().unwrap();
        let expected = current.version;
        match write {
            Interleaved::View => {
                lifecycle::record_view(&mut current, Utc::now());
                assert!(self.inner.update_contract(&current, expected).await.unwrap());
            }
            Interleaved::Signature(input) => {
                let outcome = contract::sign(&mut current, &input, Utc::now()).unwrap();
                assert!(self
                    .inner
                    .commit_signature(&current, expected, outcome.signature.as_ref())
                    .await
                    .unwrap());
            }
        }
    }
}

#[async_trait]
impl DocumentRepository for InterleavingStore {
    async fn next_sequence(&self, workspace_id: Uuid, kind: DocumentKind, year: i32) -> StoreResult<i64> {
        self.inner.next_sequence(workspace_id, kind, year).await
    }

    async fn insert_proposal(&self, proposal: &Proposal) -> StoreResult<()> {
        self.inner.insert_proposal(proposal).await
    }

    async fn find_proposal(&self, workspace_id: Uuid, proposal_id: Uuid) -> StoreResult<Option<Proposal>> {
        self.inner.find_proposal(workspace_id, proposal_id).await
    }

    async fn find_proposal_by_token(&self, token: &str) -> StoreResult<Option<Proposal>> {
        self.inner.find_proposal_by_token(token).await
    }

    async fn update_proposal(&self, proposal: &Proposal, expected_version: i32) -> StoreResult<bool> {
        self.inner.update_proposal(proposal, expected_version).await
    }

    async fn commit_acceptance(
        &self,
        proposal: &Proposal,
        expected_version: i32,
        signature: Option<&SignatureLog>,
        contract: &Contract,
    ) -> StoreResult<bool> {
        self.interleave_proposal(&proposal.access_token).await;
        self.inner
            .commit_acceptance(proposal, expected_version, signature, contract)
            .await
    }

    async fn insert_contract(&self, contract: &Contract) -> StoreResult<()> {
        self.inner.insert_contract(contract).await
    }

    async fn find_contract(&self, workspace_id: Uuid, contract_id: Uuid) -> StoreResult<Option<Contract>> {
        self.inner.find_contract(workspace_id, contract_id).await
    }

    async fn find_contract_by_token(&self, token: &str) -> StoreResult<Option<Contract>> {
        self.inner.find_contract_by_token(token).await
    }

    async fn update_contract(&self, contract: &Contract, expected_version: i32) -> StoreResult<bool> {
        self.inner.update_contract(contract, expected_version).await
    }

    async fn commit_signature(
        &self,
        contract: &Contract,
        expected_version: i32,
        signature: Option<&SignatureLog>,
    ) -> StoreResult<bool> {
        self.interleave_contract(&contract.access_token).await;
        self.inner
            .commit_signature(contract, expected_version, signature)
            .await
    }

    async fn signatures_for(&self, kind: DocumentKind, document_id: Uuid) -> StoreResult<Vec<SignatureLog>> {
        self.inner.signatures_for(kind, document_id).await
    }
}
