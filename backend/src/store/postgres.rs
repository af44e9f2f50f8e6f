// PostgreSQL implementation of the storage contracts

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowdesk_shared::{
    Booking, BookingBlock, BookingLink, BoardCard, ChatMessage, Client, Contract, Conversation,
    DocumentContent, DocumentKind, MeetingLocation, Party, Proposal, SignatureLog, Task,
    WeeklySchedule, Workspace,
};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

use super::{
    BookingRepository, DirectoryRepository, DocumentRepository, OutboxRepository, StoreError,
    StoreResult, WorkflowRepository,
};
use crate::services::{OutboxEntry, OutboxStatus};
use crate::workflows::{
    ActionStep, ExecutionResult, ExecutionStatus, Trigger, WorkflowDefinition, WorkflowExecution,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_status<T: FromStr>(table: &str, raw: &str) -> StoreResult<T>
where
    T::Err: std::fmt::Display,
{
    T::from_str(raw).map_err(|e| StoreError::Corrupt(format!("{}: {}", table, e)))
}

fn unique_violation(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::UniqueViolation(db.constraint().unwrap_or("unique").to_string())
        }
        _ => StoreError::Database(err),
    }
}

// ============================================
// Row types
// ============================================

#[derive(FromRow)]
struct LinkRow {
    id: Uuid,
    workspace_id: Uuid,
    owner_id: Uuid,
    slug: String,
    title: String,
    duration_minutes: i32,
    buffer_minutes: i32,
    minimum_notice_hours: i32,
    max_bookings_per_day: Option<i32>,
    requires_confirmation: bool,
    is_active: bool,
    availability: Json<WeeklySchedule>,
    location: Json<MeetingLocation>,
    created_at: DateTime<Utc>,
}

impl From<LinkRow> for BookingLink {
    fn from(row: LinkRow) -> Self {
        BookingLink {
            id: row.id,
            workspace_id: row.workspace_id,
            owner_id: row.owner_id,
            slug: row.slug,
            title: row.title,
            duration_minutes: row.duration_minutes,
            buffer_minutes: row.buffer_minutes,
            minimum_notice_hours: row.minimum_notice_hours,
            max_bookings_per_day: row.max_bookings_per_day,
            requires_confirmation: row.requires_confirmation,
            is_active: row.is_active,
            availability: row.availability.0,
            location: row.location.0,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct BookingRow {
    id: Uuid,
    link_id: Uuid,
    owner_id: Uuid,
    booker_name: String,
    booker_email: String,
    notes: Option<String>,
    scheduled_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    status: String,
    cancellation_reason: Option<String>,
    cancelled_by: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> StoreResult<Self> {
        Ok(Booking {
            id: row.id,
            link_id: row.link_id,
            owner_id: row.owner_id,
            booker_name: row.booker_name,
            booker_email: row.booker_email,
            notes: row.notes,
            scheduled_at: row.scheduled_at,
            ends_at: row.ends_at,
            status: parse_status("bookings", &row.status)?,
            cancellation_reason: row.cancellation_reason,
            cancelled_by: row.cancelled_by,
            cancelled_at: row.cancelled_at,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct ProposalRow {
    id: Uuid,
    workspace_id: Uuid,
    client_id: Uuid,
    number: String,
    title: String,
    content: Json<DocumentContent>,
    subtotal: Decimal,
    discount: Option<Decimal>,
    tax_rate: Option<Decimal>,
    total: Decimal,
    valid_until: Option<DateTime<Utc>>,
    status: String,
    access_token: String,
    sent_at: Option<DateTime<Utc>>,
    viewed_at: Option<DateTime<Utc>>,
    view_count: i32,
    accepted_at: Option<DateTime<Utc>>,
    declined_at: Option<DateTime<Utc>>,
    decline_reason: Option<String>,
    signer_name: Option<String>,
    signer_email: Option<String>,
    signature_data: Option<String>,
    signed_at: Option<DateTime<Utc>>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProposalRow> for Proposal {
    type Error = StoreError;

    fn try_from(row: ProposalRow) -> StoreResult<Self> {
        Ok(Proposal {
            id: row.id,
            workspace_id: row.workspace_id,
            client_id: row.client_id,
            number: row.number,
            title: row.title,
            content: row.content.0,
            subtotal: row.subtotal,
            discount: row.discount,
            tax_rate: row.tax_rate,
            total: row.total,
            valid_until: row.valid_until,
            status: parse_status("proposals", &row.status)?,
            access_token: row.access_token,
            sent_at: row.sent_at,
            viewed_at: row.viewed_at,
            view_count: row.view_count,
            accepted_at: row.accepted_at,
            declined_at: row.declined_at,
            decline_reason: row.decline_reason,
            signer_name: row.signer_name,
            signer_email: row.signer_email,
            signature_data: row.signature_data,
            signed_at: row.signed_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ContractRow {
    id: Uuid,
    workspace_id: Uuid,
    client_id: Option<Uuid>,
    proposal_id: Option<Uuid>,
    number: String,
    title: String,
    content: Json<DocumentContent>,
    parties: Json<Vec<Party>>,
    status: String,
    fully_signed: bool,
    fully_signed_at: Option<DateTime<Utc>>,
    effective_date: Option<DateTime<Utc>>,
    expiry_date: Option<DateTime<Utc>>,
    access_token: String,
    sent_at: Option<DateTime<Utc>>,
    viewed_at: Option<DateTime<Utc>>,
    view_count: i32,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ContractRow> for Contract {
    type Error = StoreError;

    fn try_from(row: ContractRow) -> StoreResult<Self> {
        Ok(Contract {
            id: row.id,
            workspace_id: row.workspace_id,
            client_id: row.client_id,
            proposal_id: row.proposal_id,
            number: row.number,
            title: row.title,
            content: row.content.0,
            parties: row.parties.0,
            status: parse_status("contracts", &row.status)?,
            fully_signed: row.fully_signed,
            fully_signed_at: row.fully_signed_at,
            effective_date: row.effective_date,
            expiry_date: row.expiry_date,
            access_token: row.access_token,
            sent_at: row.sent_at,
            viewed_at: row.viewed_at,
            view_count: row.view_count,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct SignatureRow {
    id: Uuid,
    document_type: String,
    document_id: Uuid,
    signer_name: String,
    signer_email: Option<String>,
    signature_data: String,
    signed_at: DateTime<Utc>,
}

impl TryFrom<SignatureRow> for SignatureLog {
    type Error = StoreError;

    fn try_from(row: SignatureRow) -> StoreResult<Self> {
        Ok(SignatureLog {
            id: row.id,
            document_type: parse_status("signature_logs", &row.document_type)?,
            document_id: row.document_id,
            signer_name: row.signer_name,
            signer_email: row.signer_email,
            signature_data: row.signature_data,
            signed_at: row.signed_at,
        })
    }
}

#[derive(FromRow)]
struct WorkflowRow {
    id: Uuid,
    workspace_id: Uuid,
    name: String,
    description: Option<String>,
    trigger: serde_json::Value,
    actions: serde_json::Value,
    enabled: bool,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ExecutionRow {
    id: Uuid,
    workflow_id: Uuid,
    workspace_id: Uuid,
    trigger_data: serde_json::Value,
    status: String,
    result: Json<ExecutionResult>,
    error_message: Option<String>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ExecutionRow> for WorkflowExecution {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> StoreResult<Self> {
        Ok(WorkflowExecution {
            id: row.id,
            workflow_id: row.workflow_id,
            workspace_id: row.workspace_id,
            trigger_data: row.trigger_data,
            status: parse_status::<ExecutionStatus>("workflow_executions", &row.status)?,
            result: row.result.0,
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(FromRow)]
struct OutboxRow {
    id: Uuid,
    recipient: String,
    template: String,
    subject: String,
    body: String,
    status: String,
    attempts: i32,
    max_attempts: i32,
    next_attempt_at: DateTime<Utc>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
}

impl TryFrom<OutboxRow> for OutboxEntry {
    type Error = StoreError;

    fn try_from(row: OutboxRow) -> StoreResult<Self> {
        Ok(OutboxEntry {
            id: row.id,
            recipient: row.recipient,
            template: row.template,
            subject: row.subject,
            body: row.body,
            status: parse_status::<OutboxStatus>("email_outbox", &row.status)?,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            next_attempt_at: row.next_attempt_at,
            last_error: row.last_error,
            created_at: row.created_at,
            sent_at: row.sent_at,
        })
    }
}

const PROPOSAL_COLUMNS: &str = "id, workspace_id, client_id, number, title, content, subtotal, discount, \
     tax_rate, total, valid_until, status, access_token, sent_at, viewed_at, view_count, accepted_at, \
     declined_at, decline_reason, signer_name, signer_email, signature_data, signed_at, version, \
     created_at, updated_at";

const CONTRACT_COLUMNS: &str = "id, workspace_id, client_id, proposal_id, number, title, content, parties, \
     status, fully_signed, fully_signed_at, effective_date, expiry_date, access_token, sent_at, \
     viewed_at, view_count, version, created_at, updated_at";

// ============================================
// Shared statements
// ============================================

async fn write_proposal(
    tx: &mut Transaction<'_, Postgres>,
    proposal: &Proposal,
    expected_version: i32,
) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE proposals SET
            title = $3, content = $4, subtotal = $5, discount = $6, tax_rate = $7, total = $8,
            valid_until = $9, status = $10, sent_at = $11, viewed_at = $12, view_count = $13,
            accepted_at = $14, declined_at = $15, decline_reason = $16, signer_name = $17,
            signer_email = $18, signature_data = $19, signed_at = $20, version = $21,
            updated_at = $22
        WHERE id = $1 AND version = $2
        "#,
    )
    .bind(proposal.id)
    .bind(expected_version)
    .bind(&proposal.title)
    .bind(Json(&proposal.content))
    .bind(proposal.subtotal)
    .bind(proposal.discount)
    .bind(proposal.tax_rate)
    .bind(proposal.total)
    .bind(proposal.valid_until)
    .bind(proposal.status.as_str())
    .bind(proposal.sent_at)
    .bind(proposal.viewed_at)
    .bind(proposal.view_count)
    .bind(proposal.accepted_at)
    .bind(proposal.declined_at)
    .bind(&proposal.decline_reason)
    .bind(&proposal.signer_name)
    .bind(&proposal.signer_email)
    .bind(&proposal.signature_data)
    .bind(proposal.signed_at)
    .bind(proposal.version)
    .bind(proposal.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() == 1)
}

async fn write_contract(
    tx: &mut Transaction<'_, Postgres>,
    contract: &Contract,
    expected_version: i32,
) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE contracts SET
            title = $3, content = $4, parties = $5, status = $6, fully_signed = $7,
            fully_signed_at = $8, effective_date = $9, expiry_date = $10, sent_at = $11,
            viewed_at = $12, view_count = $13, version = $14, updated_at = $15
        WHERE id = $1 AND version = $2
        "#,
    )
    .bind(contract.id)
    .bind(expected_version)
    .bind(&contract.title)
    .bind(Json(&contract.content))
    .bind(Json(&contract.parties))
    .bind(contract.status.as_str())
    .bind(contract.fully_signed)
    .bind(contract.fully_signed_at)
    .bind(contract.effective_date)
    .bind(contract.expiry_date)
    .bind(contract.sent_at)
    .bind(contract.viewed_at)
    .bind(contract.view_count)
    .bind(contract.version)
    .bind(contract.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() == 1)
}

async fn insert_contract_row(tx: &mut Transaction<'_, Postgres>, contract: &Contract) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO contracts
        (id, workspace_id, client_id, proposal_id, number, title, content, parties, status,
         fully_signed, fully_signed_at, effective_date, expiry_date, access_token, sent_at,
         viewed_at, view_count, version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
        "#,
    )
    .bind(contract.id)
    .bind(contract.workspace_id)
    .bind(contract.client_id)
    .bind(contract.proposal_id)
    .bind(&contract.number)
    .bind(&contract.title)
    .bind(Json(&contract.content))
    .bind(Json(&contract.parties))
    .bind(contract.status.as_str())
    .bind(contract.fully_signed)
    .bind(contract.fully_signed_at)
    .bind(contract.effective_date)
    .bind(contract.expiry_date)
    .bind(&contract.access_token)
    .bind(contract.sent_at)
    .bind(contract.viewed_at)
    .bind(contract.view_count)
    .bind(contract.version)
    .bind(contract.created_at)
    .bind(contract.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(unique_violation)?;

    Ok(())
}

async fn insert_signature(tx: &mut Transaction<'_, Postgres>, signature: &SignatureLog) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO signature_logs
        (id, document_type, document_id, signer_name, signer_email, signature_data, signed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(signature.id)
    .bind(signature.document_type.as_str())
    .bind(signature.document_id)
    .bind(&signature.signer_name)
    .bind(&signature.signer_email)
    .bind(&signature.signature_data)
    .bind(signature.signed_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

// ============================================
// Booking
// ============================================

#[async_trait]
impl BookingRepository for PgStore {
    async fn find_link(&self, link_id: Uuid) -> StoreResult<Option<BookingLink>> {
        let row = sqlx::query_as::<_, LinkRow>("SELECT * FROM booking_links WHERE id = $1")
            .bind(link_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(BookingLink::from))
    }

    async fn find_link_by_slug(&self, slug: &str) -> StoreResult<Option<BookingLink>> {
        let row = sqlx::query_as::<_, LinkRow>("SELECT * FROM booking_links WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(BookingLink::from))
    }

    async fn bookings_between(
        &self,
        link_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT * FROM bookings
            WHERE link_id = $1 AND scheduled_at >= $2 AND scheduled_at < $3
            ORDER BY scheduled_at
            "#,
        )
        .bind(link_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn blocks_between(
        &self,
        owner_id: Uuid,
        link_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<BookingBlock>> {
        let blocks = sqlx::query_as::<_, BookingBlock>(
            r#"
            SELECT id, owner_id, link_id, starts_at, ends_at, reason FROM booking_blocks
            WHERE owner_id = $1
              AND (link_id IS NULL OR link_id = $2)
              AND starts_at < $4 AND ends_at > $3
            ORDER BY starts_at
            "#,
        )
        .bind(owner_id)
        .bind(link_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(blocks)
    }

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings
            (id, link_id, owner_id, booker_name, booker_email, notes, scheduled_at, ends_at,
             status, cancellation_reason, cancelled_by, cancelled_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(booking.id)
        .bind(booking.link_id)
        .bind(booking.owner_id)
        .bind(&booking.booker_name)
        .bind(&booking.booker_email)
        .bind(&booking.notes)
        .bind(booking.scheduled_at)
        .bind(booking.ends_at)
        .bind(booking.status.as_str())
        .bind(&booking.cancellation_reason)
        .bind(&booking.cancelled_by)
        .bind(booking.cancelled_at)
        .bind(booking.created_at)
        .execute(&self.pool)
        .await
        .map_err(unique_violation)?;

        Ok(())
    }

    async fn find_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        sqlx::query_as::<_, BookingRow>("SELECT * FROM bookings WHERE id = $1")
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Booking::try_from)
            .transpose()
    }

    async fn cancel_booking(&self, booking: &Booking) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $2, cancellation_reason = $3, cancelled_by = $4, cancelled_at = $5
            WHERE id = $1 AND status <> 'cancelled'
            "#,
        )
        .bind(booking.id)
        .bind(booking.status.as_str())
        .bind(&booking.cancellation_reason)
        .bind(&booking.cancelled_by)
        .bind(booking.cancelled_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// ============================================
// Documents
// ============================================

#[async_trait]
impl DocumentRepository for PgStore {
    async fn next_sequence(&self, workspace_id: Uuid, kind: DocumentKind, year: i32) -> StoreResult<i64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO document_sequences (workspace_id, kind, year, last_value)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (workspace_id, kind, year)
            DO UPDATE SET last_value = document_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(workspace_id)
        .bind(kind.as_str())
        .bind(year)
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
    }

    async fn insert_proposal(&self, proposal: &Proposal) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO proposals
            (id, workspace_id, client_id, number, title, content, subtotal, discount, tax_rate,
             total, valid_until, status, access_token, view_count, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(proposal.id)
        .bind(proposal.workspace_id)
        .bind(proposal.client_id)
        .bind(&proposal.number)
        .bind(&proposal.title)
        .bind(Json(&proposal.content))
        .bind(proposal.subtotal)
        .bind(proposal.discount)
        .bind(proposal.tax_rate)
        .bind(proposal.total)
        .bind(proposal.valid_until)
        .bind(proposal.status.as_str())
        .bind(&proposal.access_token)
        .bind(proposal.view_count)
        .bind(proposal.version)
        .bind(proposal.created_at)
        .bind(proposal.updated_at)
        .execute(&self.pool)
        .await
        .map_err(unique_violation)?;

        Ok(())
    }

    async fn find_proposal(&self, workspace_id: Uuid, proposal_id: Uuid) -> StoreResult<Option<Proposal>> {
        let sql = format!(
            "SELECT {} FROM proposals WHERE id = $1 AND workspace_id = $2",
            PROPOSAL_COLUMNS
        );
        sqlx::query_as::<_, ProposalRow>(&sql)
            .bind(proposal_id)
            .bind(workspace_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Proposal::try_from)
            .transpose()
    }

    async fn find_proposal_by_token(&self, token: &str) -> StoreResult<Option<Proposal>> {
        let sql = format!("SELECT {} FROM proposals WHERE access_token = $1", PROPOSAL_COLUMNS);
        sqlx::query_as::<_, ProposalRow>(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?
            .map(Proposal::try_from)
            .transpose()
    }

    async fn update_proposal(&self, proposal: &Proposal, expected_version: i32) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let written = write_proposal(&mut tx, proposal, expected_version).await?;
        tx.commit().await?;
        Ok(written)
    }

    async fn commit_acceptance(
        &self,
        proposal: &Proposal,
        expected_version: i32,
        signature: Option<&SignatureLog>,
        contract: &Contract,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        if !write_proposal(&mut tx, proposal, expected_version).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        if let Some(signature) = signature {
            insert_signature(&mut tx, signature).await?;
        }
        insert_contract_row(&mut tx, contract).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn insert_contract(&self, contract: &Contract) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_contract_row(&mut tx, contract).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_contract(&self, workspace_id: Uuid, contract_id: Uuid) -> StoreResult<Option<Contract>> {
        let sql = format!(
            "SELECT {} FROM contracts WHERE id = $1 AND workspace_id = $2",
            CONTRACT_COLUMNS
        );
        sqlx::query_as::<_, ContractRow>(&sql)
            .bind(contract_id)
            .bind(workspace_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Contract::try_from)
            .transpose()
    }

    async fn find_contract_by_token(&self, token: &str) -> StoreResult<Option<Contract>> {
        let sql = format!("SELECT {} FROM contracts WHERE access_token = $1", CONTRACT_COLUMNS);
        sqlx::query_as::<_, ContractRow>(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?
            .map(Contract::try_from)
            .transpose()
    }

    async fn update_contract(&self, contract: &Contract, expected_version: i32) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let written = write_contract(&mut tx, contract, expected_version).await?;
        tx.commit().await?;
        Ok(written)
    }

    async fn commit_signature(
        &self,
        contract: &Contract,
        expected_version: i32,
        signature: Option<&SignatureLog>,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        if !write_contract(&mut tx, contract, expected_version).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        if let Some(signature) = signature {
            insert_signature(&mut tx, signature).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn signatures_for(&self, kind: DocumentKind, document_id: Uuid) -> StoreResult<Vec<SignatureLog>> {
        let rows = sqlx::query_as::<_, SignatureRow>(
            r#"
            SELECT * FROM signature_logs
            WHERE document_type = $1 AND document_id = $2
            ORDER BY signed_at
            "#,
        )
        .bind(kind.as_str())
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SignatureLog::try_from).collect()
    }
}

// ============================================
// Directory
// ============================================

#[async_trait]
impl DirectoryRepository for PgStore {
    async fn find_workspace(&self, workspace_id: Uuid) -> StoreResult<Option<Workspace>> {
        Ok(
            sqlx::query_as::<_, Workspace>("SELECT id, name, email FROM workspaces WHERE id = $1")
                .bind(workspace_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_client(&self, workspace_id: Uuid, client_id: Uuid) -> StoreResult<Option<Client>> {
        Ok(sqlx::query_as::<_, Client>(
            "SELECT id, workspace_id, name, email, company FROM clients WHERE id = $1 AND workspace_id = $2",
        )
        .bind(client_id)
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_task(&self, task: &Task) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks
            (id, workspace_id, client_id, title, description, priority, status, assignee_id,
             due_date, source_workflow_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(task.id)
        .bind(task.workspace_id)
        .bind(task.client_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.priority)
        .bind(&task.status)
        .bind(task.assignee_id)
        .bind(task.due_date)
        .bind(task.source_workflow_id)
        .bind(task.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn move_card(
        &self,
        workspace_id: Uuid,
        card_id: Uuid,
        column_name: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<BoardCard>> {
        Ok(sqlx::query_as::<_, BoardCard>(
            r#"
            UPDATE board_cards SET column_name = $3, updated_at = $4
            WHERE id = $1 AND workspace_id = $2
            RETURNING id, workspace_id, board_id, column_name, title, client_id, position, updated_at
            "#,
        )
        .bind(card_id)
        .bind(workspace_id)
        .bind(column_name)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_or_create_conversation(
        &self,
        workspace_id: Uuid,
        client_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Conversation> {
        sqlx::query(
            r#"
            INSERT INTO conversations (id, workspace_id, client_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (workspace_id, client_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(workspace_id)
        .bind(client_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(sqlx::query_as::<_, Conversation>(
            "SELECT id, workspace_id, client_id, created_at FROM conversations WHERE workspace_id = $1 AND client_id = $2",
        )
        .bind(workspace_id)
        .bind(client_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn insert_message(&self, message: &ChatMessage) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO chat_messages (id, conversation_id, sender, body, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(&message.sender)
        .bind(&message.body)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================
// Workflows
// ============================================

#[async_trait]
impl WorkflowRepository for PgStore {
    async fn insert_workflow(&self, workflow: &WorkflowDefinition) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflows
            (id, workspace_id, name, description, trigger, actions, enabled, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(workflow.id)
        .bind(workflow.workspace_id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(serde_json::to_value(&workflow.trigger)?)
        .bind(serde_json::to_value(&workflow.actions)?)
        .bind(workflow.enabled)
        .bind(workflow.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_workflows(&self, workspace_id: Uuid) -> StoreResult<Vec<WorkflowDefinition>> {
        let rows = sqlx::query_as::<_, WorkflowRow>(
            r#"
            SELECT id, workspace_id, name, description, trigger, actions, enabled, created_at
            FROM workflows
            WHERE workspace_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        let mut workflows = Vec::with_capacity(rows.len());
        for row in rows {
            let trigger: Trigger = match serde_json::from_value(row.trigger) {
                Ok(trigger) => trigger,
                Err(e) => {
                    warn!("Skipping workflow {} with unreadable trigger: {}", row.id, e);
                    continue;
                }
            };
            let actions: Vec<ActionStep> = match serde_json::from_value(row.actions) {
                Ok(actions) => actions,
                Err(e) => {
                    warn!("Skipping workflow {} with unreadable actions: {}", row.id, e);
                    continue;
                }
            };

            workflows.push(WorkflowDefinition {
                id: row.id,
                workspace_id: row.workspace_id,
                name: row.name,
                description: row.description,
                trigger,
                actions,
                enabled: row.enabled,
                created_at: row.created_at,
            });
        }

        Ok(workflows)
    }

    async fn insert_execution(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions
            (id, workflow_id, workspace_id, trigger_data, status, result, error_message, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(execution.id)
        .bind(execution.workflow_id)
        .bind(execution.workspace_id)
        .bind(&execution.trigger_data)
        .bind(execution.status.as_str())
        .bind(Json(&execution.result))
        .bind(&execution.error_message)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn finish_execution(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $2, result = $3, error_message = $4, completed_at = $5
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(execution.id)
        .bind(execution.status.as_str())
        .bind(Json(&execution.result))
        .bind(&execution.error_message)
        .bind(execution.completed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("execution {}", execution.id)));
        }
        Ok(())
    }

    async fn list_executions(
        &self,
        workspace_id: Uuid,
        workflow_id: Option<Uuid>,
        limit: i64,
    ) -> StoreResult<Vec<WorkflowExecution>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT * FROM workflow_executions
            WHERE workspace_id = $1 AND ($2::uuid IS NULL OR workflow_id = $2)
            ORDER BY started_at DESC
            LIMIT $3
            "#,
        )
        .bind(workspace_id)
        .bind(workflow_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WorkflowExecution::try_from).collect()
    }
}

// ============================================
// Outbox
// ============================================

#[async_trait]
impl OutboxRepository for PgStore {
    async fn enqueue(&self, entry: &OutboxEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO email_outbox
            (id, recipient, template, subject, body, status, attempts, max_attempts,
             next_attempt_at, last_error, created_at, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.recipient)
        .bind(&entry.template)
        .bind(&entry.subject)
        .bind(&entry.body)
        .bind(entry.status.as_str())
        .bind(entry.attempts)
        .bind(entry.max_attempts)
        .bind(entry.next_attempt_at)
        .bind(&entry.last_error)
        .bind(entry.created_at)
        .bind(entry.sent_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn due_entries(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<OutboxEntry>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT * FROM email_outbox
            WHERE status = 'pending' AND next_attempt_at <= $1
            ORDER BY next_attempt_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OutboxEntry::try_from).collect()
    }

    async fn update_entry(&self, entry: &OutboxEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE email_outbox
            SET status = $2, attempts = $3, next_attempt_at = $4, last_error = $5, sent_at = $6
            WHERE id = $1
            "#,
        )
        .bind(entry.id)
        .bind(entry.status.as_str())
        .bind(entry.attempts)
        .bind(entry.next_attempt_at)
        .bind(&entry.last_error)
        .bind(entry.sent_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
