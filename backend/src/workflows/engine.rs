// Workflow Engine - Matches events to workflows and records each run

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::matcher::match_workflows;
use super::{ActionExecutor, ActionOutcome, ActionStep, EventSink, Trigger, TriggerEvent};
use crate::error::{DomainError, DomainResult};
use crate::store::WorkflowRepository;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger: Trigger,
    pub actions: Vec<ActionStep>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Request body for configuring a workflow
#[derive(Debug, Clone, Deserialize)]
pub struct NewWorkflow {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub trigger: Trigger,
    pub actions: Vec<ActionStep>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl NewWorkflow {
    /// Reject configurations the executor could never run.
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::invalid("name", "is required"));
        }
        if self.actions.is_empty() {
            return Err(DomainError::invalid("actions", "at least one action is required"));
        }
        for (index, step) in self.actions.iter().enumerate() {
            if let ActionStep::Unrecognized(raw) = step {
                return Err(DomainError::invalid(
                    format!("actions[{}]", index),
                    format!("unknown or misconfigured action type '{}'", raw.action_type),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown execution status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub action_results: Vec<ActionOutcome>,
}

/// Audit row for one workflow run. Written once as `running`, then updated
/// once to its terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub workspace_id: Uuid,
    pub trigger_data: serde_json::Value,
    pub status: ExecutionStatus,
    pub result: ExecutionResult,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    fn start(workflow: &WorkflowDefinition, event: &TriggerEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow.id,
            workspace_id: workflow.workspace_id,
            trigger_data: serde_json::json!({
                "event_id": event.event_id,
                "trigger_type": event.trigger_type,
                "payload": event.payload,
            }),
            status: ExecutionStatus::Running,
            result: ExecutionResult::default(),
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    fn complete(&mut self, outcomes: Vec<ActionOutcome>) {
        self.status = ExecutionStatus::Completed;
        self.result = ExecutionResult { action_results: outcomes };
        self.completed_at = Some(Utc::now());
    }

    fn fail(&mut self, message: String) {
        self.status = ExecutionStatus::Failed;
        self.error_message = Some(message);
        self.completed_at = Some(Utc::now());
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "workflow run panicked".to_string()
    }
}

pub struct WorkflowEngine {
    workflows: Arc<dyn WorkflowRepository>,
    executor: ActionExecutor,
}

impl WorkflowEngine {
    pub fn new(workflows: Arc<dyn WorkflowRepository>, executor: ActionExecutor) -> Self {
        Self { workflows, executor }
    }

    /// Create a new workflow
    pub async fn create_workflow(&self, workspace_id: Uuid, request: NewWorkflow) -> DomainResult<WorkflowDefinition> {
        request.validate()?;

        let workflow = WorkflowDefinition {
            id: Uuid::new_v4(),
            workspace_id,
            name: request.name.trim().to_string(),
            description: request.description,
            trigger: request.trigger,
            actions: request.actions,
            enabled: request.enabled,
            created_at: Utc::now(),
        };

        self.workflows.insert_workflow(&workflow).await?;
        info!(
            "Workflow '{}' created for {} ({} actions)",
            workflow.name,
            workflow.trigger.trigger_type(),
            workflow.actions.len()
        );

        Ok(workflow)
    }

    pub async fn list_workflows(&self, workspace_id: Uuid) -> DomainResult<Vec<WorkflowDefinition>> {
        Ok(self.workflows.list_workflows(workspace_id).await?)
    }

    /// Run every matching workflow for an event, one after another.
    ///
    /// Only a failure to load the workspace's workflows is returned as an
    /// error; each workflow's own failure is captured in its execution row.
    pub async fn trigger_workflows(&self, event: &TriggerEvent) -> DomainResult<Vec<WorkflowExecution>> {
        let workflows = self.workflows.list_workflows(event.workspace_id).await?;
        let matched = match_workflows(&workflows, event);

        info!(
            "Event {} ({}) matched {} of {} workflows",
            event.event_id,
            event.trigger_type,
            matched.len(),
            workflows.len()
        );

        let mut executions = Vec::with_capacity(matched.len());
        for workflow in matched {
            executions.push(self.run_workflow(workflow, event).await);
        }

        Ok(executions)
    }

    async fn run_workflow(&self, workflow: &WorkflowDefinition, event: &TriggerEvent) -> WorkflowExecution {
        let mut execution = WorkflowExecution::start(workflow, event);

        if let Err(e) = self.workflows.insert_execution(&execution).await {
            error!("Could not record execution for workflow '{}': {}", workflow.name, e);
            execution.fail(format!("Could not record execution: {}", e));
            return execution;
        }

        let run = async {
            let context = self
                .executor
                .prepare(execution.id, workflow.id, workflow.workspace_id, event.payload.clone())
                .await?;
            Ok::<_, super::ActionError>(self.executor.run_all(&workflow.actions, &context).await)
        };

        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(Ok(outcomes)) => {
                let failed = outcomes.iter().filter(|o| !o.success).count();
                if failed > 0 {
                    warn!(
                        "Workflow '{}' completed with {} of {} actions failed",
                        workflow.name,
                        failed,
                        outcomes.len()
                    );
                } else {
                    info!("Workflow '{}' executed successfully", workflow.name);
                }
                execution.complete(outcomes);
            }
            Ok(Err(e)) => {
                error!("Workflow '{}' failed: {}", workflow.name, e);
                execution.fail(e.to_string());
            }
            Err(panic) => {
                let message = panic_message(panic);
                error!("Workflow '{}' panicked: {}", workflow.name, message);
                execution.fail(message);
            }
        }

        if let Err(e) = self.workflows.finish_execution(&execution).await {
            error!("Could not finalize execution {}: {}", execution.id, e);
        }

        execution
    }

    /// Get workflow execution history, newest first
    pub async fn execution_history(
        &self,
        workspace_id: Uuid,
        workflow_id: Option<Uuid>,
        limit: i64,
    ) -> DomainResult<Vec<WorkflowExecution>> {
        Ok(self
            .workflows
            .list_executions(workspace_id, workflow_id, limit.clamp(1, 500))
            .await?)
    }
}

#[async_trait]
impl EventSink for WorkflowEngine {
    async fn publish(&self, event: TriggerEvent) {
        if let Err(e) = self.trigger_workflows(&event).await {
            error!("Workflows for event {} ({}) not run: {}", event.event_id, event.trigger_type, e);
        }
    }
}
