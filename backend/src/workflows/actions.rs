// Workflow Actions - Declarative steps a workflow runs in order

use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_email_template() -> String {
    "workflow_notification".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendEmailConfig {
    /// Recipient override; defaults to the event's client email.
    #[serde(default)]
    pub to: Option<String>,
    pub subject: String,
    pub body: String,
    #[serde(default = "default_email_template")]
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTaskConfig {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub due_in_days: Option<i64>,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoveCardConfig {
    /// Card to move; defaults to the event's `card_id`.
    #[serde(default)]
    pub card_id: Option<Uuid>,
    pub to_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendChatMessageConfig {
    pub message: String,
}

/// A known action with its typed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum Action {
    SendEmail(SendEmailConfig),
    CreateTask(CreateTaskConfig),
    MoveCard(MoveCardConfig),
    SendChatMessage(SendChatMessageConfig),
}

impl Action {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SendEmail(_) => "send_email",
            Self::CreateTask(_) => "create_task",
            Self::MoveCard(_) => "move_card",
            Self::SendChatMessage(_) => "send_chat_message",
        }
    }

    pub fn send_email(subject: &str, body: &str) -> Self {
        Self::SendEmail(SendEmailConfig {
            to: None,
            subject: subject.to_string(),
            body: body.to_string(),
            template: default_email_template(),
        })
    }

    pub fn create_task(title: &str) -> Self {
        Self::CreateTask(CreateTaskConfig {
            title: title.to_string(),
            description: None,
            priority: None,
            due_in_days: None,
            assignee_id: None,
        })
    }

    pub fn move_card(to_column: &str) -> Self {
        Self::MoveCard(MoveCardConfig {
            card_id: None,
            to_column: to_column.to_string(),
        })
    }

    pub fn send_chat_message(message: &str) -> Self {
        Self::SendChatMessage(SendChatMessageConfig {
            message: message.to_string(),
        })
    }
}

/// Stored step whose type or configuration is not understood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnrecognizedAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// One entry of a workflow's action list as stored.
///
/// Creating a workflow rejects `Unrecognized` steps; rows written before an
/// action kind was retired still load and fail at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionStep {
    Known(Action),
    Unrecognized(UnrecognizedAction),
}

impl ActionStep {
    pub fn type_name(&self) -> &str {
        match self {
            Self::Known(action) => action.type_name(),
            Self::Unrecognized(raw) => &raw.action_type,
        }
    }
}

impl From<Action> for ActionStep {
    fn from(action: Action) -> Self {
        Self::Known(action)
    }
}

/// Result of executing one action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub index: usize,
    pub action_type: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: i64,
}

impl ActionOutcome {
    pub fn success(index: usize, action_type: &str, message: impl Into<String>) -> Self {
        Self {
            index,
            action_type: action_type.to_string(),
            success: true,
            message: Some(message.into()),
            error: None,
            duration_ms: 0,
        }
    }

    pub fn failure(index: usize, action_type: &str, error: impl Into<String>) -> Self {
        Self {
            index,
            action_type: action_type.to_string(),
            success: false,
            message: None,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}
