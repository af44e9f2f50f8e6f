// Flowdesk automation core: booking availability, proposal and contract
// lifecycles, and the workflow engine that reacts to business events.

pub mod auth;
pub mod config;
pub mod database;
pub mod documents;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod scheduling;
pub mod services;
pub mod store;
pub mod workflows;

#[cfg(test)]
mod tests;

pub use error::{ApiError, ApiResult, AppError, DomainError, DomainResult};

use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

use config::{Config, SmtpConfig};
use documents::{ContractService, DocumentNumbering, ProposalService};
use scheduling::BookingService;
use services::{DisabledMailer, EmailService, MailSender, OutboxDispatcher};
use store::{
    BookingRepository, DirectoryRepository, DocumentRepository, OutboxRepository,
    WorkflowRepository,
};
use workflows::{ActionExecutor, EventSink, WorkflowEngine};

/// Every repository the services need, usually backed by one store.
#[derive(Clone)]
pub struct Stores {
    pub bookings: Arc<dyn BookingRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub directory: Arc<dyn DirectoryRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub outbox: Arc<dyn OutboxRepository>,
}

impl Stores {
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: BookingRepository
            + DocumentRepository
            + DirectoryRepository
            + WorkflowRepository
            + OutboxRepository
            + 'static,
    {
        Self {
            bookings: store.clone(),
            documents: store.clone(),
            directory: store.clone(),
            workflows: store.clone(),
            outbox: store,
        }
    }
}

/// SMTP delivery when configured, otherwise a sender that always fails so
/// `send_email` actions land in the outbox.
pub fn mailer_from_config(smtp: &SmtpConfig) -> Arc<dyn MailSender> {
    if !smtp.is_configured() {
        warn!("SMTP not configured, outgoing email will queue in the outbox");
        return Arc::new(DisabledMailer);
    }
    match EmailService::new(smtp) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            warn!("SMTP transport unavailable ({}), outgoing email will queue in the outbox", e);
            Arc::new(DisabledMailer)
        }
    }
}

pub struct AppState {
    pub config: Config,
    /// `None` when running on the in-memory store.
    pub pool: Option<PgPool>,
    pub bookings: BookingService,
    pub proposals: ProposalService,
    pub contracts: ContractService,
    pub engine: Arc<WorkflowEngine>,
    pub outbox: Arc<OutboxDispatcher>,
}

impl AppState {
    pub fn new(
        config: Config,
        stores: Stores,
        mailer: Arc<dyn MailSender>,
        pool: Option<PgPool>,
    ) -> Self {
        let executor = ActionExecutor::new(
            stores.directory.clone(),
            stores.outbox.clone(),
            mailer.clone(),
            config.outbox.max_attempts,
        );
        let engine = Arc::new(WorkflowEngine::new(stores.workflows.clone(), executor));
        let events: Arc<dyn EventSink> = engine.clone();

        let numbering = DocumentNumbering::new(stores.documents.clone(), config.numbering.clone());

        let state = Self {
            bookings: BookingService::new(stores.bookings.clone(), events.clone()),
            proposals: ProposalService::new(
                stores.documents.clone(),
                stores.directory.clone(),
                events.clone(),
                numbering.clone(),
            ),
            contracts: ContractService::new(
                stores.documents.clone(),
                stores.directory.clone(),
                events,
                numbering,
            ),
            outbox: Arc::new(OutboxDispatcher::new(
                stores.outbox,
                mailer,
                config.outbox.batch_size,
            )),
            engine,
            config,
            pool,
        };

        info!("Application services wired");
        state
    }
}
