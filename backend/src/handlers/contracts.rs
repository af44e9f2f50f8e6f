use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use flowdesk_shared::{Contract, SignatureLog};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::WorkspaceContext;
use crate::documents::{NewContract, SignContract};
use crate::error::ApiResult;
use crate::AppState;

pub fn contract_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_contract))
        .route("/:id", get(get_contract))
        .route("/:id/send", post(send_contract))
        .route("/:id/cancel", post(cancel_contract))
        .route("/:id/complete", post(complete_contract))
        .route("/:id/signatures", get(contract_signatures))
}

pub fn public_contract_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:token", get(view_contract))
        .route("/:token/sign", post(sign_contract))
}

async fn create_contract(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Json(request): Json<NewContract>,
) -> ApiResult<(StatusCode, Json<Contract>)> {
    let contract = state.contracts.create(ctx.workspace_id, request).await?;
    Ok((StatusCode::CREATED, Json(contract)))
}

async fn get_contract(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Contract>> {
    Ok(Json(state.contracts.get(ctx.workspace_id, id).await?))
}

async fn send_contract(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Contract>> {
    Ok(Json(state.contracts.send(ctx.workspace_id, id).await?))
}

async fn cancel_contract(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Contract>> {
    Ok(Json(state.contracts.cancel(ctx.workspace_id, id).await?))
}

async fn complete_contract(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Contract>> {
    Ok(Json(state.contracts.complete(ctx.workspace_id, id).await?))
}

async fn contract_signatures(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<SignatureLog>>> {
    Ok(Json(state.contracts.signatures(ctx.workspace_id, id).await?))
}

async fn view_contract(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> ApiResult<Json<Contract>> {
    Ok(Json(state.contracts.view(&token).await?))
}

async fn sign_contract(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(input): Json<SignContract>,
) -> ApiResult<Json<Contract>> {
    Ok(Json(state.contracts.sign(&token, input).await?))
}
