// Storage contracts
//
// The automation core reaches persistent state only through these traits.
// `PgStore` backs the server; `MemoryStore` backs local development and tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowdesk_shared::{
    Booking, BookingBlock, BookingLink, BoardCard, ChatMessage, Client, Contract, Conversation,
    DocumentKind, Proposal, SignatureLog, Task, Workspace,
};
use uuid::Uuid;

use crate::services::OutboxEntry;
use crate::workflows::{WorkflowDefinition, WorkflowExecution};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("Write conflict on {0}")]
    Conflict(String),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn find_link(&self, link_id: Uuid) -> StoreResult<Option<BookingLink>>;

    async fn find_link_by_slug(&self, slug: &str) -> StoreResult<Option<BookingLink>>;

    /// Bookings of a link (any status) starting in `[from, to)`.
    async fn bookings_between(
        &self,
        link_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Booking>>;

    /// Blocks overlapping `[from, to)` that apply to the link: scoped to it,
    /// or owner-wide.
    async fn blocks_between(
        &self,
        owner_id: Uuid,
        link_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<BookingBlock>>;

    /// Must fail with [`StoreError::UniqueViolation`] when a confirmed
    /// booking already exists for the same `(link_id, scheduled_at)`.
    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()>;

    async fn find_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>>;

    /// Persists the cancellation fields. Returns `false` when the stored row
    /// was already cancelled.
    async fn cancel_booking(&self, booking: &Booking) -> StoreResult<bool>;
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Atomically increments and returns the per-(workspace, kind, year) counter.
    async fn next_sequence(&self, workspace_id: Uuid, kind: DocumentKind, year: i32) -> StoreResult<i64>;

    async fn insert_proposal(&self, proposal: &Proposal) -> StoreResult<()>;

    async fn find_proposal(&self, workspace_id: Uuid, proposal_id: Uuid) -> StoreResult<Option<Proposal>>;

    async fn find_proposal_by_token(&self, token: &str) -> StoreResult<Option<Proposal>>;

    /// Conditional write: applies only while the stored version equals
    /// `expected_version`. Returns whether a row was written.
    async fn update_proposal(&self, proposal: &Proposal, expected_version: i32) -> StoreResult<bool>;

    /// Writes the accepted proposal, its signature row and the derived
    /// contract as one unit, conditional on `expected_version`.
    async fn commit_acceptance(
        &self,
        proposal: &Proposal,
        expected_version: i32,
        signature: Option<&SignatureLog>,
        contract: &Contract,
    ) -> StoreResult<bool>;

    async fn insert_contract(&self, contract: &Contract) -> StoreResult<()>;

    async fn find_contract(&self, workspace_id: Uuid, contract_id: Uuid) -> StoreResult<Option<Contract>>;

    async fn find_contract_by_token(&self, token: &str) -> StoreResult<Option<Contract>>;

    async fn update_contract(&self, contract: &Contract, expected_version: i32) -> StoreResult<bool>;

    /// Writes a signed contract and its signature row as one unit,
    /// conditional on `expected_version`.
    async fn commit_signature(
        &self,
        contract: &Contract,
        expected_version: i32,
        signature: Option<&SignatureLog>,
    ) -> StoreResult<bool>;

    async fn signatures_for(&self, kind: DocumentKind, document_id: Uuid) -> StoreResult<Vec<SignatureLog>>;
}

/// Entities owned by other parts of the platform that workflow actions and
/// document derivation read or touch.
#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn find_workspace(&self, workspace_id: Uuid) -> StoreResult<Option<Workspace>>;

    async fn find_client(&self, workspace_id: Uuid, client_id: Uuid) -> StoreResult<Option<Client>>;

    async fn insert_task(&self, task: &Task) -> StoreResult<()>;

    /// Returns `None` when the card does not exist in the workspace.
    async fn move_card(
        &self,
        workspace_id: Uuid,
        card_id: Uuid,
        column_name: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<BoardCard>>;

    async fn find_or_create_conversation(
        &self,
        workspace_id: Uuid,
        client_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Conversation>;

    async fn insert_message(&self, message: &ChatMessage) -> StoreResult<()>;
}

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn insert_workflow(&self, workflow: &WorkflowDefinition) -> StoreResult<()>;

    /// Workflows of a workspace in creation order. Rows whose trigger no
    /// longer decodes are skipped.
    async fn list_workflows(&self, workspace_id: Uuid) -> StoreResult<Vec<WorkflowDefinition>>;

    async fn insert_execution(&self, execution: &WorkflowExecution) -> StoreResult<()>;

    /// The single terminal update of an execution row.
    async fn finish_execution(&self, execution: &WorkflowExecution) -> StoreResult<()>;

    async fn list_executions(
        &self,
        workspace_id: Uuid,
        workflow_id: Option<Uuid>,
        limit: i64,
    ) -> StoreResult<Vec<WorkflowExecution>>;
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn enqueue(&self, entry: &OutboxEntry) -> StoreResult<()>;

    /// Pending entries whose `next_attempt_at <= now`, oldest first.
    async fn due_entries(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<OutboxEntry>>;

    /// Persists status, attempts, schedule and last error of an entry.
    async fn update_entry(&self, entry: &OutboxEntry) -> StoreResult<()>;
}
