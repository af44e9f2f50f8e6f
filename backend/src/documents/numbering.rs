use chrono::{DateTime, Datelike, Utc};
use flowdesk_shared::DocumentKind;
use std::sync::Arc;

use crate::config::NumberingConfig;
use crate::store::{DocumentRepository, StoreResult};

/// `PROP-2025-0001`; sequences past 9999 simply widen.
pub fn format_number(prefix: &str, year: i32, sequence: i64) -> String {
    format!("{}-{}-{:04}", prefix, year, sequence)
}

#[derive(Clone)]
pub struct DocumentNumbering {
    documents: Arc<dyn DocumentRepository>,
    config: NumberingConfig,
}

impl DocumentNumbering {
    pub fn new(documents: Arc<dyn DocumentRepository>, config: NumberingConfig) -> Self {
        Self { documents, config }
    }

    fn prefix(&self, kind: DocumentKind) -> &str {
        match kind {
            DocumentKind::Proposal => &self.config.proposal_prefix,
            DocumentKind::Contract => &self.config.contract_prefix,
        }
    }

    pub async fn next(&self, workspace_id: uuid::Uuid, kind: DocumentKind, now: DateTime<Utc>) -> StoreResult<String> {
        let year = now.year();
        let sequence = self.documents.next_sequence(workspace_id, kind, year).await?;
        Ok(format_number(self.prefix(kind), year, sequence))
    }
}
