use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use flowdesk_shared::Proposal;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::WorkspaceContext;
use crate::documents::{AcceptedProposal, NewProposal, SignatureInput};
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DeclineRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub fn proposal_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_proposal))
        .route("/:id", get(get_proposal))
        .route("/:id/send", post(send_proposal))
}

/// Token-addressed routes for the client side of a proposal.
pub fn public_proposal_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:token", get(view_proposal))
        .route("/:token/accept", post(accept_proposal))
        .route("/:token/decline", post(decline_proposal))
}

async fn create_proposal(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Json(request): Json<NewProposal>,
) -> ApiResult<(StatusCode, Json<Proposal>)> {
    let proposal = state.proposals.create(ctx.workspace_id, request).await?;
    Ok((StatusCode::CREATED, Json(proposal)))
}

async fn get_proposal(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Proposal>> {
    Ok(Json(state.proposals.get(ctx.workspace_id, id).await?))
}

async fn send_proposal(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Proposal>> {
    Ok(Json(state.proposals.send(ctx.workspace_id, id).await?))
}

async fn view_proposal(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> ApiResult<Json<Proposal>> {
    Ok(Json(state.proposals.view(&token).await?))
}

async fn accept_proposal(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(input): Json<SignatureInput>,
) -> ApiResult<Json<AcceptedProposal>> {
    Ok(Json(state.proposals.accept(&token, input).await?))
}

async fn decline_proposal(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    request: Option<Json<DeclineRequest>>,
) -> ApiResult<Json<Proposal>> {
    let reason = request.and_then(|Json(r)| r.reason);
    Ok(Json(state.proposals.decline(&token, reason).await?))
}
