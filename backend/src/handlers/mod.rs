use axum::{routing::get, Router};
use std::sync::Arc;

use crate::AppState;

pub mod bookings;
pub mod contracts;
pub mod health;
pub mod proposals;
pub mod workflows;

pub use bookings::{booking_routes, public_booking_routes};
pub use contracts::{contract_routes, public_contract_routes};
pub use health::health_check;
pub use proposals::{proposal_routes, public_proposal_routes};
pub use workflows::workflow_routes;

/// Every API route, versioned under `/api/v1`.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1/book", public_booking_routes())
        .nest("/api/v1/bookings", booking_routes())
        .nest("/api/v1/proposals", proposal_routes())
        .nest("/api/v1/public/proposals", public_proposal_routes())
        .nest("/api/v1/contracts", contract_routes())
        .nest("/api/v1/public/contracts", public_contract_routes())
        .nest("/api/v1/workflows", workflow_routes())
}
