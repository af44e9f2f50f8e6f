// Workspace context resolution from bearer tokens

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,    // Subject (user ID)
    pub workspace_id: Uuid,
    pub email: String,
    pub exp: i64,     // Expiration time
    pub iat: i64,     // Issued at
}

#[derive(Debug)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub fn create_jwt(
    secret: &str,
    user_id: Uuid,
    workspace_id: Uuid,
    email: &str,
) -> Result<TokenResponse, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let expires_at = now + Duration::hours(24);

    let claims = Claims {
        sub: user_id,
        workspace_id,
        email: email.to_string(),
        exp: expires_at.timestamp(),
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(TokenResponse { token, expires_at })
}

pub fn verify_jwt(secret: &str, token: &str) -> Result<TokenData<Claims>, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
}

/// The acting user and the workspace every operation is scoped to. Trusted
/// as authorization once the token verifies.
#[derive(Debug, Clone, Copy)]
pub struct WorkspaceContext {
    pub user_id: Uuid,
    pub workspace_id: Uuid,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for WorkspaceContext {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|header| header.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing authorization header".to_string()).into_response())?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Invalid authorization format".to_string()).into_response())?;

        let token_data = verify_jwt(&state.config.jwt_secret, token)
            .map_err(|e| AppError::from(e).into_response())?;

        Ok(WorkspaceContext {
            user_id: token_data.claims.sub,
            workspace_id: token_data.claims.workspace_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip_carries_workspace() {
        let (user, workspace) = (Uuid::new_v4(), Uuid::new_v4());
        let issued = create_jwt("secret", user, workspace, "owner@example.com").unwrap();

        let claims = verify_jwt("secret", &issued.token).unwrap().claims;
        assert_eq!(claims.sub, user);
        assert_eq!(claims.workspace_id, workspace);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let issued = create_jwt("secret", Uuid::new_v4(), Uuid::new_v4(), "a@example.com").unwrap();
        assert!(verify_jwt("other", &issued.token).is_err());
    }
}
