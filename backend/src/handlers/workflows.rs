use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::WorkspaceContext;
use crate::error::ApiResult;
use crate::workflows::{
    EventData, EventSource, NewWorkflow, TriggerEvent, TriggerType, WorkflowDefinition,
    WorkflowExecution,
};
use crate::AppState;

/// An event fired by hand or by an integration on behalf of the workspace.
#[derive(Debug, Deserialize)]
pub struct FireEvent {
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub payload: EventData,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

pub fn workflow_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_workflows).post(create_workflow))
        .route("/events", post(fire_event))
        .route("/executions", get(workspace_history))
        .route("/:id/executions", get(workflow_history))
}

async fn create_workflow(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Json(request): Json<NewWorkflow>,
) -> ApiResult<(StatusCode, Json<WorkflowDefinition>)> {
    let workflow = state.engine.create_workflow(ctx.workspace_id, request).await?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

async fn list_workflows(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
) -> ApiResult<Json<Vec<WorkflowDefinition>>> {
    Ok(Json(state.engine.list_workflows(ctx.workspace_id).await?))
}

async fn fire_event(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Json(request): Json<FireEvent>,
) -> ApiResult<Json<Vec<WorkflowExecution>>> {
    let event = TriggerEvent::new(
        ctx.workspace_id,
        request.trigger_type,
        request.payload,
        EventSource::User(ctx.user_id),
    );
    Ok(Json(state.engine.trigger_workflows(&event).await?))
}

async fn workspace_history(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<WorkflowExecution>>> {
    let history = state
        .engine
        .execution_history(ctx.workspace_id, None, query.limit.unwrap_or(50))
        .await?;
    Ok(Json(history))
}

async fn workflow_history(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(workflow_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<WorkflowExecution>>> {
    let history = state
        .engine
        .execution_history(ctx.workspace_id, Some(workflow_id), query.limit.unwrap_or(50))
        .await?;
    Ok(Json(history))
}
