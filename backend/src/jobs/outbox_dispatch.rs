// Outbox dispatch - retries emails whose immediate delivery failed

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::services::{DispatchSummary, OutboxDispatcher};
use crate::store::StoreResult;

#[derive(Clone)]
pub struct OutboxDispatchJob {
    dispatcher: Arc<OutboxDispatcher>,
}

impl OutboxDispatchJob {
    pub fn new(dispatcher: Arc<OutboxDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn run(&self) -> StoreResult<DispatchSummary> {
        let summary = self.dispatcher.dispatch_due(Utc::now()).await?;

        if summary == DispatchSummary::default() {
            debug!("Outbox dispatch: nothing due");
        } else {
            info!(
                "Outbox dispatch: {} sent, {} rescheduled, {} dead",
                summary.sent, summary.retried, summary.dead
            );
        }

        Ok(summary)
    }
}
