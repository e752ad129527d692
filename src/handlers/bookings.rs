use crate::entities::payment;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::models::PaymentMethod;
use crate::services::bookings::BookingResponse;
use crate::services::payments::CheckoutResponse;
use crate::{ApiResponse, PaginatedResponse};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_bookings))
        .route("/:id", get(get_booking))
        .route("/:id/payments", get(booking_payments))
        .route("/:id/cancel", post(cancel_booking))
        .route("/:id/retry-payment", post(retry_payment))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BookingListParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}
fn default_per_page() -> u64 {
    20
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RetryPaymentRequest {
    /// Defaults to the method of the previous attempt.
    pub method: Option<PaymentMethod>,
}

/// List bookings, newest first
#[utoipa::path(
    get,
    path = "/api/v1/bookings",
    params(BookingListParams),
    responses(
        (status = 200, description = "Bookings page", body = crate::ApiResponse<crate::PaginatedResponse<BookingResponse>>)
    ),
    tag = "Bookings"
)]
pub async fn list_bookings(
    State(state): State<AppState>,
    Query(params): Query<BookingListParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<BookingResponse>>>, ServiceError> {
    let (items, total) = state
        .services
        .bookings
        .list(params.page, params.per_page)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse {
        total,
        page: params.page,
        per_page: params.per_page,
        items,
    })))
}

/// Fetch a booking
#[utoipa::path(
    get,
    path = "/api/v1/bookings/{id}",
    params(("id" = Uuid, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Booking detail", body = crate::ApiResponse<BookingResponse>),
        (status = 404, description = "Booking not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Bookings"
)]
pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<BookingResponse>>, ServiceError> {
    let booking = state.services.bookings.get(id).await?;
    Ok(Json(ApiResponse::success(booking)))
}

/// Payment attempts recorded against a booking (audit trail)
#[utoipa::path(
    get,
    path = "/api/v1/bookings/{id}/payments",
    params(("id" = Uuid, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Payment history", body = crate::ApiResponse<Vec<payment::Model>>),
        (status = 404, description = "Booking not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Bookings"
)]
pub async fn booking_payments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<payment::Model>>>, ServiceError> {
    let payments = state.services.bookings.payment_history(id).await?;
    Ok(Json(ApiResponse::success(payments)))
}

/// Cancel a booking; releases the tour slot. Idempotent.
#[utoipa::path(
    post,
    path = "/api/v1/bookings/{id}/cancel",
    params(("id" = Uuid, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Booking cancelled", body = crate::ApiResponse<BookingResponse>),
        (status = 404, description = "Booking not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Bookings"
)]
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<BookingResponse>>, ServiceError> {
    let booking = state.services.bookings.cancel(id).await?;
    Ok(Json(ApiResponse::success(booking)))
}

/// Start a fresh payment attempt for a pending booking whose previous
/// attempt ended terminally
#[utoipa::path(
    post,
    path = "/api/v1/bookings/{id}/retry-payment",
    params(("id" = Uuid, Path, description = "Booking id")),
    request_body = RetryPaymentRequest,
    responses(
        (status = 200, description = "New payment initiated", body = crate::ApiResponse<CheckoutResponse>),
        (status = 409, description = "An active payment already exists", body = crate::errors::ErrorResponse),
        (status = 422, description = "Booking cannot take a new payment", body = crate::errors::ErrorResponse)
    ),
    tag = "Bookings"
)]
pub async fn retry_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RetryPaymentRequest>,
) -> Result<Json<ApiResponse<CheckoutResponse>>, ServiceError> {
    let checkout = state
        .services
        .payments
        .retry_payment(id, request.method)
        .await?;
    Ok(Json(ApiResponse::success(checkout)))
}
