//! Error handling for the Flowdesk core and its HTTP boundary
//!
//! Domain operations return [`DomainError`] for expected business
//! conditions. Handlers convert it into [`AppError`], which renders the
//! standard JSON error body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use flowdesk_shared::DocumentKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::services::MailError;
use crate::store::StoreError;

/// Broad classes of failure every domain error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    StateConflict,
    NotFound,
    External,
}

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    // Validation
    #[error("Booking link is not active")]
    LinkInactive,
    #[error("Bookings require at least {hours} hours notice")]
    NoticeTooShort { hours: i32 },
    #[error("Daily booking limit reached")]
    DailyLimitReached,
    #[error("Requested time is outside the link's availability")]
    OutsideAvailability,
    #[error("Proposal has expired")]
    ProposalExpired,
    #[error("Invalid {field}: {message}")]
    Invalid { field: String, message: String },

    // State conflicts
    #[error("Selected time slot is no longer available")]
    SlotUnavailable,
    #[error("Cannot {action} a {document} in status '{from}'")]
    InvalidTransition {
        document: &'static str,
        from: String,
        action: &'static str,
    },
    #[error("Proposal has already been accepted")]
    AlreadyAccepted,
    #[error("Proposal has already been declined")]
    AlreadyDeclined,
    #[error("Contract is already fully signed")]
    AlreadyFullySigned,
    #[error("Party '{0}' has already signed")]
    PartyAlreadySigned(String),
    #[error("{0} was modified concurrently, retry the request")]
    ConcurrentModification(&'static str),

    // Not found
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    // External
    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),
    #[error("Mail failure: {0}")]
    Mail(#[from] MailError),
}

impl DomainError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::LinkInactive
            | Self::NoticeTooShort { .. }
            | Self::DailyLimitReached
            | Self::OutsideAvailability
            | Self::ProposalExpired
            | Self::Invalid { .. } => ErrorCategory::Validation,
            Self::SlotUnavailable
            | Self::InvalidTransition { .. }
            | Self::AlreadyAccepted
            | Self::AlreadyDeclined
            | Self::AlreadyFullySigned
            | Self::PartyAlreadySigned(_)
            | Self::ConcurrentModification(_) => ErrorCategory::StateConflict,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Storage(_) | Self::Mail(_) => ErrorCategory::External,
        }
    }

    /// Stable machine-readable code for API consumers.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::LinkInactive => "LINK_INACTIVE",
            Self::NoticeTooShort { .. } => "NOTICE_TOO_SHORT",
            Self::DailyLimitReached => "DAILY_LIMIT_REACHED",
            Self::OutsideAvailability => "OUTSIDE_AVAILABILITY",
            Self::ProposalExpired => "PROPOSAL_EXPIRED",
            Self::Invalid { .. } => "VALIDATION_ERROR",
            Self::SlotUnavailable => "SLOT_UNAVAILABLE",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::AlreadyAccepted => "ALREADY_ACCEPTED",
            Self::AlreadyDeclined => "ALREADY_DECLINED",
            Self::AlreadyFullySigned => "ALREADY_FULLY_SIGNED",
            Self::PartyAlreadySigned(_) => "PARTY_ALREADY_SIGNED",
            Self::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Mail(_) => "MAIL_ERROR",
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_transition(kind: DocumentKind, from: impl ToString, action: &'static str) -> Self {
        Self::InvalidTransition {
            document: kind.as_str(),
            from: from.to_string(),
            action,
        }
    }
}

impl From<validator::ValidationErrors> for DomainError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let (field, message) = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "is invalid".to_string());
                (field.to_string(), message)
            })
            .or_else(|| {
                // Nested structs and lists report under the parent field
                errors
                    .errors()
                    .keys()
                    .next()
                    .map(|field| (field.to_string(), "contains invalid entries".to_string()))
            })
            .unwrap_or_else(|| ("input".to_string(), "is invalid".to_string()));

        Self::Invalid { field, message }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

/// Standard API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code (e.g., "VALIDATION_ERROR", "NOT_FOUND", "SLOT_UNAVAILABLE")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional field-level errors for validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Vec<String>>>,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Application error type that can be converted to HTTP responses
#[derive(Debug)]
pub enum AppError {
    Unauthorized(String),
    TokenExpired,
    Domain(DomainError),
    BadRequest(String),
    InternalError(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) | Self::TokenExpired => StatusCode::UNAUTHORIZED,
            Self::Domain(err) => match err.category() {
                ErrorCategory::Validation => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorCategory::StateConflict => StatusCode::CONFLICT,
                ErrorCategory::NotFound => StatusCode::NOT_FOUND,
                ErrorCategory::External => StatusCode::BAD_GATEWAY,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::Domain(err) => err.error_code(),
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Get the error message
    pub fn message(&self) -> String {
        match self {
            Self::Unauthorized(msg) => msg.clone(),
            Self::TokenExpired => "Authentication token has expired".to_string(),
            Self::Domain(err) if err.category() == ErrorCategory::External => {
                tracing::error!("External failure: {}", err);
                "A dependent service is unavailable".to_string()
            }
            Self::Domain(err) => err.to_string(),
            Self::BadRequest(msg) => msg.clone(),
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut error = ApiError::new(self.error_code(), self.message());

        if let Self::Domain(DomainError::Invalid { field, message }) = &self {
            let mut details = HashMap::new();
            details.insert(field.clone(), vec![message.clone()]);
            error.details = Some(details);
        }

        (status, Json(error)).into_response()
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::Domain(DomainError::Storage(err))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Self::TokenExpired,
            _ => Self::Unauthorized(format!("Invalid token: {}", err)),
        }
    }
}

/// Result type alias for handlers
pub type ApiResult<T> = Result<T, AppError>;
