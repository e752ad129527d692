pub mod bookings;
pub mod health;
pub mod payments;
pub mod tours;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

use axum::Router;

/// Versioned API router. Health lives outside the version prefix.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1/tours", tours::router())
        .nest("/api/v1/bookings", bookings::router())
        .nest("/api/v1/payments", payments::router())
        .merge(health::router())
}
