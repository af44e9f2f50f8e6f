// In-memory store used by tests and local development without PostgreSQL.
//
// Every trait method takes the single lock once, so conditional writes are
// atomic in the same way the SQL statements are.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowdesk_shared::{
    Booking, BookingBlock, BookingLink, BookingStatus, BoardCard, ChatMessage, Client, Contract,
    Conversation, DocumentKind, Proposal, SignatureLog, Task, Workspace,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    BookingRepository, DirectoryRepository, DocumentRepository, OutboxRepository, StoreError,
    StoreResult, WorkflowRepository,
};
use crate::services::{OutboxEntry, OutboxStatus};
use crate::workflows::{WorkflowDefinition, WorkflowExecution};

#[derive(Default)]
struct Tables {
    workspaces: HashMap<Uuid, Workspace>,
    clients: HashMap<Uuid, Client>,
    tasks: Vec<Task>,
    cards: HashMap<Uuid, BoardCard>,
    conversations: Vec<Conversation>,
    messages: Vec<ChatMessage>,
    links: HashMap<Uuid, BookingLink>,
    bookings: Vec<Booking>,
    blocks: Vec<BookingBlock>,
    sequences: HashMap<(Uuid, DocumentKind, i32), i64>,
    proposals: HashMap<Uuid, Proposal>,
    contracts: HashMap<Uuid, Contract>,
    signatures: Vec<SignatureLog>,
    workflows: Vec<WorkflowDefinition>,
    executions: Vec<WorkflowExecution>,
    outbox: Vec<OutboxEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Seeding =====

    pub async fn add_workspace(&self, workspace: Workspace) {
        self.tables.write().await.workspaces.insert(workspace.id, workspace);
    }

    pub async fn add_client(&self, client: Client) {
        self.tables.write().await.clients.insert(client.id, client);
    }

    pub async fn add_card(&self, card: BoardCard) {
        self.tables.write().await.cards.insert(card.id, card);
    }

    pub async fn add_link(&self, link: BookingLink) {
        self.tables.write().await.links.insert(link.id, link);
    }

    pub async fn add_block(&self, block: BookingBlock) {
        self.tables.write().await.blocks.push(block);
    }

    // ===== Inspection =====

    pub async fn tasks(&self) -> Vec<Task> {
        self.tables.read().await.tasks.clone()
    }

    pub async fn card(&self, card_id: Uuid) -> Option<BoardCard> {
        self.tables.read().await.cards.get(&card_id).cloned()
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.tables.read().await.messages.clone()
    }

    pub async fn bookings(&self) -> Vec<Booking> {
        self.tables.read().await.bookings.clone()
    }

    pub async fn contracts(&self) -> Vec<Contract> {
        self.tables.read().await.contracts.values().cloned().collect()
    }

    pub async fn executions(&self) -> Vec<WorkflowExecution> {
        self.tables.read().await.executions.clone()
    }

    pub async fn outbox_entries(&self) -> Vec<OutboxEntry> {
        self.tables.read().await.outbox.clone()
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn find_link(&self, link_id: Uuid) -> StoreResult<Option<BookingLink>> {
        Ok(self.tables.read().await.links.get(&link_id).cloned())
    }

    async fn find_link_by_slug(&self, slug: &str) -> StoreResult<Option<BookingLink>> {
        Ok(self
            .tables
            .read()
            .await
            .links
            .values()
            .find(|l| l.slug == slug)
            .cloned())
    }

    async fn bookings_between(
        &self,
        link_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .tables
            .read()
            .await
            .bookings
            .iter()
            .filter(|b| b.link_id == link_id && b.scheduled_at >= from && b.scheduled_at < to)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.scheduled_at);
        Ok(bookings)
    }

    async fn blocks_between(
        &self,
        owner_id: Uuid,
        link_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<BookingBlock>> {
        Ok(self
            .tables
            .read()
            .await
            .blocks
            .iter()
            .filter(|b| b.owner_id == owner_id)
            .filter(|b| b.link_id.is_none_or(|id| id == link_id))
            .filter(|b| b.starts_at < to && b.ends_at > from)
            .cloned()
            .collect())
    }

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if booking.status == BookingStatus::Confirmed
            && tables.bookings.iter().any(|b| {
                b.link_id == booking.link_id
                    && b.scheduled_at == booking.scheduled_at
                    && b.status == BookingStatus::Confirmed
            })
        {
            return Err(StoreError::UniqueViolation(
                "bookings_confirmed_slot_unique".to_string(),
            ));
        }
        tables.bookings.push(booking.clone());
        Ok(())
    }

    async fn find_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self
            .tables
            .read()
            .await
            .bookings
            .iter()
            .find(|b| b.id == booking_id)
            .cloned())
    }

    async fn cancel_booking(&self, booking: &Booking) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables
            .bookings
            .iter_mut()
            .find(|b| b.id == booking.id && b.status != BookingStatus::Cancelled)
        {
            Some(stored) => {
                *stored = booking.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn write_proposal(tables: &mut Tables, proposal: &Proposal, expected_version: i32) -> bool {
    match tables.proposals.get_mut(&proposal.id) {
        Some(stored) if stored.version == expected_version => {
            *stored = proposal.clone();
            true
        }
        _ => false,
    }
}

fn write_contract(tables: &mut Tables, contract: &Contract, expected_version: i32) -> bool {
    match tables.contracts.get_mut(&contract.id) {
        Some(stored) if stored.version == expected_version => {
            *stored = contract.clone();
            true
        }
        _ => false,
    }
}

#[async_trait]
impl DocumentRepository for MemoryStore {
    async fn next_sequence(&self, workspace_id: Uuid, kind: DocumentKind, year: i32) -> StoreResult<i64> {
        let mut tables = self.tables.write().await;
        let counter = tables.sequences.entry((workspace_id, kind, year)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn insert_proposal(&self, proposal: &Proposal) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.proposals.values().any(|p| p.access_token == proposal.access_token) {
            return Err(StoreError::UniqueViolation("proposals_access_token_key".to_string()));
        }
        tables.proposals.insert(proposal.id, proposal.clone());
        Ok(())
    }

    async fn find_proposal(&self, workspace_id: Uuid, proposal_id: Uuid) -> StoreResult<Option<Proposal>> {
        Ok(self
            .tables
            .read()
            .await
            .proposals
            .get(&proposal_id)
            .filter(|p| p.workspace_id == workspace_id)
            .cloned())
    }

    async fn find_proposal_by_token(&self, token: &str) -> StoreResult<Option<Proposal>> {
        Ok(self
            .tables
            .read()
            .await
            .proposals
            .values()
            .find(|p| p.access_token == token)
            .cloned())
    }

    async fn update_proposal(&self, proposal: &Proposal, expected_version: i32) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(write_proposal(&mut tables, proposal, expected_version))
    }

    async fn commit_acceptance(
        &self,
        proposal: &Proposal,
        expected_version: i32,
        signature: Option<&SignatureLog>,
        contract: &Contract,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if !write_proposal(&mut tables, proposal, expected_version) {
            return Ok(false);
        }
        if let Some(signature) = signature {
            tables.signatures.push(signature.clone());
        }
        tables.contracts.insert(contract.id, contract.clone());
        Ok(true)
    }

    async fn insert_contract(&self, contract: &Contract) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .contracts
            .insert(contract.id, contract.clone());
        Ok(())
    }

    async fn find_contract(&self, workspace_id: Uuid, contract_id: Uuid) -> StoreResult<Option<Contract>> {
        Ok(self
            .tables
            .read()
            .await
            .contracts
            .get(&contract_id)
            .filter(|c| c.workspace_id == workspace_id)
            .cloned())
    }

    async fn find_contract_by_token(&self, token: &str) -> StoreResult<Option<Contract>> {
        Ok(self
            .tables
            .read()
            .await
            .contracts
            .values()
            .find(|c| c.access_token == token)
            .cloned())
    }

    async fn update_contract(&self, contract: &Contract, expected_version: i32) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(write_contract(&mut tables, contract, expected_version))
    }

    async fn commit_signature(
        &self,
        contract: &Contract,
        expected_version: i32,
        signature: Option<&SignatureLog>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if !write_contract(&mut tables, contract, expected_version) {
            return Ok(false);
        }
        if let Some(signature) = signature {
            tables.signatures.push(signature.clone());
        }
        Ok(true)
    }

    async fn signatures_for(&self, kind: DocumentKind, document_id: Uuid) -> StoreResult<Vec<SignatureLog>> {
        Ok(self
            .tables
            .read()
            .await
            .signatures
            .iter()
            .filter(|s| s.document_type == kind && s.document_id == document_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DirectoryRepository for MemoryStore {
    async fn find_workspace(&self, workspace_id: Uuid) -> StoreResult<Option<Workspace>> {
        Ok(self.tables.read().await.workspaces.get(&workspace_id).cloned())
    }

    async fn find_client(&self, workspace_id: Uuid, client_id: Uuid) -> StoreResult<Option<Client>> {
        Ok(self
            .tables
            .read()
            .await
            .clients
            .get(&client_id)
            .filter(|c| c.workspace_id == workspace_id)
            .cloned())
    }

    async fn insert_task(&self, task: &Task) -> StoreResult<()> {
        self.tables.write().await.tasks.push(task.clone());
        Ok(())
    }

    async fn move_card(
        &self,
        workspace_id: Uuid,
        card_id: Uuid,
        column_name: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<BoardCard>> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .cards
            .get_mut(&card_id)
            .filter(|c| c.workspace_id == workspace_id)
            .map(|card| {
                card.column_name = column_name.to_string();
                card.updated_at = at;
                card.clone()
            }))
    }

    async fn find_or_create_conversation(
        &self,
        workspace_id: Uuid,
        client_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Conversation> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .conversations
            .iter()
            .find(|c| c.workspace_id == workspace_id && c.client_id == client_id)
        {
            return Ok(existing.clone());
        }

        let conversation = Conversation {
            id: Uuid::new_v4(),
            workspace_id,
            client_id,
            created_at: at,
        };
        tables.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn insert_message(&self, message: &ChatMessage) -> StoreResult<()> {
        self.tables.write().await.messages.push(message.clone());
        Ok(())
    }
}

#[async_trait]
impl WorkflowRepository for MemoryStore {
    async fn insert_workflow(&self, workflow: &WorkflowDefinition) -> StoreResult<()> {
        self.tables.write().await.workflows.push(workflow.clone());
        Ok(())
    }

    async fn list_workflows(&self, workspace_id: Uuid) -> StoreResult<Vec<WorkflowDefinition>> {
        Ok(self
            .tables
            .read()
            .await
            .workflows
            .iter()
            .filter(|w| w.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn insert_execution(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        self.tables.write().await.executions.push(execution.clone());
        Ok(())
    }

    async fn finish_execution(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .executions
            .iter_mut()
            .find(|e| e.id == execution.id)
            .ok_or_else(|| StoreError::Conflict(format!("execution {}", execution.id)))?;
        *stored = execution.clone();
        Ok(())
    }

    async fn list_executions(
        &self,
        workspace_id: Uuid,
        workflow_id: Option<Uuid>,
        limit: i64,
    ) -> StoreResult<Vec<WorkflowExecution>> {
        let tables = self.tables.read().await;
        let mut executions: Vec<WorkflowExecution> = tables
            .executions
            .iter()
            .filter(|e| e.workspace_id == workspace_id)
            .filter(|e| workflow_id.is_none_or(|id| e.workflow_id == id))
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        executions.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(executions)
    }
}

#[async_trait]
impl OutboxRepository for MemoryStore {
    async fn enqueue(&self, entry: &OutboxEntry) -> StoreResult<()> {
        self.tables.write().await.outbox.push(entry.clone());
        Ok(())
    }

    async fn due_entries(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<OutboxEntry>> {
        let tables = self.tables.read().await;
        let mut due: Vec<OutboxEntry> = tables
            .outbox
            .iter()
            .filter(|e| e.status == OutboxStatus::Pending && e.next_attempt_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|e| e.next_attempt_at);
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn update_entry(&self, entry: &OutboxEntry) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .outbox
            .iter_mut()
            .find(|e| e.id == entry.id)
            .ok_or_else(|| StoreError::Conflict(format!("outbox entry {}", entry.id)))?;
        *stored = entry.clone();
        Ok(())
    }
}
