// Workflow Executor - Runs a workflow's actions in order

use chrono::{DateTime, Duration, Utc};
use flowdesk_shared::{ChatMessage, Task, Workspace};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::template::interpolate;
use super::{
    Action, ActionOutcome, ActionStep, CreateTaskConfig, EventData, MoveCardConfig,
    SendChatMessageConfig, SendEmailConfig,
};
use crate::services::{EmailMessage, MailSender, OutboxEntry};
use crate::store::{DirectoryRepository, OutboxRepository, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("missing {0} in event data")]
    MissingData(&'static str),
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    Storage(#[from] StoreError),
    #[error("{0}")]
    Delivery(String),
    #[error("unknown or misconfigured action type '{0}'")]
    Unsupported(String),
}

/// Context for one workflow run
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub workspace: Workspace,
    pub data: EventData,
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    fn uuid(&self, key: &str) -> Option<Uuid> {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

pub struct ActionExecutor {
    directory: Arc<dyn DirectoryRepository>,
    outbox: Arc<dyn OutboxRepository>,
    mailer: Arc<dyn MailSender>,
    outbox_max_attempts: i32,
}

impl ActionExecutor {
    pub fn new(
        directory: Arc<dyn DirectoryRepository>,
        outbox: Arc<dyn OutboxRepository>,
        mailer: Arc<dyn MailSender>,
        outbox_max_attempts: i32,
    ) -> Self {
        Self {
            directory,
            outbox,
            mailer,
            outbox_max_attempts,
        }
    }

    /// Load the workspace an execution runs in. Failing here fails the
    /// whole run rather than one action.
    pub async fn prepare(
        &self,
        execution_id: Uuid,
        workflow_id: Uuid,
        workspace_id: Uuid,
        data: EventData,
    ) -> Result<ExecutionContext, ActionError> {
        let workspace = self
            .directory
            .find_workspace(workspace_id)
            .await?
            .ok_or_else(|| ActionError::NotFound {
                entity: "Workspace",
                id: workspace_id.to_string(),
            })?;

        Ok(ExecutionContext {
            execution_id,
            workflow_id,
            workspace,
            data,
            started_at: Utc::now(),
        })
    }

    /// Execute every step sequentially. A failing step is recorded and the
    /// next one still runs.
    pub async fn run_all(&self, steps: &[ActionStep], context: &ExecutionContext) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            outcomes.push(self.execute(index, step, context).await);
        }

        outcomes
    }

    /// Execute a single step, converting any handler error into a failed outcome.
    pub async fn execute(&self, index: usize, step: &ActionStep, context: &ExecutionContext) -> ActionOutcome {
        let start = Instant::now();
        let type_name = step.type_name().to_string();

        info!("Executing action {} ({}) for execution {}", index, type_name, context.execution_id);

        let result = match step {
            ActionStep::Known(Action::SendEmail(config)) => self.send_email(config, context).await,
            ActionStep::Known(Action::CreateTask(config)) => self.create_task(config, context).await,
            ActionStep::Known(Action::MoveCard(config)) => self.move_card(config, context).await,
            ActionStep::Known(Action::SendChatMessage(config)) => {
                self.send_chat_message(config, context).await
            }
            ActionStep::Unrecognized(raw) => {
                Err(ActionError::Unsupported(raw.action_type.clone()))
            }
        };

        let duration = start.elapsed().as_millis() as i64;

        match result {
            Ok(message) => ActionOutcome::success(index, &type_name, message).with_duration(duration),
            Err(e) => {
                warn!("Action {} ({}) failed: {}", index, type_name, e);
                ActionOutcome::failure(index, &type_name, e.to_string()).with_duration(duration)
            }
        }
    }

    /// Event data plus the client's name and email when the event names a client.
    async fn data_with_client(&self, context: &ExecutionContext) -> Result<EventData, ActionError> {
        let mut data = context.data.clone();
        data.entry("workspace_name".to_string())
            .or_insert_with(|| Value::String(context.workspace.name.clone()));

        if let Some(client_id) = context.uuid("client_id") {
            if let Some(client) = self.directory.find_client(context.workspace.id, client_id).await? {
                data.entry("client_name".to_string())
                    .or_insert_with(|| Value::String(client.name.clone()));
                if let Some(email) = client.email {
                    data.entry("client_email".to_string())
                        .or_insert(Value::String(email));
                }
            }
        }

        Ok(data)
    }

    // ===== Action Implementations =====

    async fn send_email(&self, config: &SendEmailConfig, context: &ExecutionContext) -> Result<String, ActionError> {
        let data = self.data_with_client(context).await?;

        let recipient = match &config.to {
            Some(to) => interpolate(to, &data),
            None => data
                .get("client_email")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_default(),
        };
        if recipient.trim().is_empty() {
            return Err(ActionError::MissingData("recipient email"));
        }

        let message = EmailMessage {
            subject: interpolate(&config.subject, &data),
            body: interpolate(&config.body, &data),
        };

        match self.mailer.send_email(&recipient, &config.template, &message).await {
            Ok(()) => Ok(format!("Email sent to {}", recipient)),
            Err(e) => {
                let entry = OutboxEntry::new(
                    &recipient,
                    &config.template,
                    &message,
                    self.outbox_max_attempts,
                    Utc::now(),
                );
                match self.outbox.enqueue(&entry).await {
                    Ok(()) => Err(ActionError::Delivery(format!(
                        "Email to {} failed ({}), queued for retry as {}",
                        recipient, e, entry.id
                    ))),
                    Err(store_err) => {
                        error!("Could not enqueue email to {}: {}", recipient, store_err);
                        Err(ActionError::Delivery(format!("Email to {} failed: {}", recipient, e)))
                    }
                }
            }
        }
    }

    async fn create_task(&self, config: &CreateTaskConfig, context: &ExecutionContext) -> Result<String, ActionError> {
        let data = self.data_with_client(context).await?;
        let now = Utc::now();

        let task = Task {
            id: Uuid::new_v4(),
            workspace_id: context.workspace.id,
            client_id: context.uuid("client_id"),
            title: interpolate(&config.title, &data),
            description: config.description.as_deref().map(|d| interpolate(d, &data)),
            priority: config.priority.clone().unwrap_or_else(|| "medium".to_string()),
            status: "todo".to_string(),
            assignee_id: config.assignee_id,
            due_date: config.due_in_days.map(|days| now + Duration::days(days)),
            source_workflow_id: Some(context.workflow_id),
            created_at: now,
        };

        self.directory.insert_task(&task).await?;

        Ok(format!("Task created: {}", task.title))
    }

    async fn move_card(&self, config: &MoveCardConfig, context: &ExecutionContext) -> Result<String, ActionError> {
        let data = self.data_with_client(context).await?;
        let card_id = config
            .card_id
            .or_else(|| context.uuid("card_id"))
            .ok_or(ActionError::MissingData("card_id"))?;
        let column = interpolate(&config.to_column, &data);

        let card = self
            .directory
            .move_card(context.workspace.id, card_id, &column, Utc::now())
            .await?
            .ok_or_else(|| ActionError::NotFound {
                entity: "Card",
                id: card_id.to_string(),
            })?;

        Ok(format!("Card '{}' moved to {}", card.title, card.column_name))
    }

    async fn send_chat_message(
        &self,
        config: &SendChatMessageConfig,
        context: &ExecutionContext,
    ) -> Result<String, ActionError> {
        let data = self.data_with_client(context).await?;
        let client_id = context
            .uuid("client_id")
            .ok_or(ActionError::MissingData("client_id"))?;

        let now = Utc::now();
        let conversation = self
            .directory
            .find_or_create_conversation(context.workspace.id, client_id, now)
            .await?;

        let message = ChatMessage {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            sender: "workspace".to_string(),
            body: interpolate(&config.message, &data),
            created_at: now,
        };
        self.directory.insert_message(&message).await?;

        Ok(format!("Message posted to conversation {}", conversation.id))
    }
}
