use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::models::PaymentMethod;
use crate::services::payments::{
    CheckoutRequest, CheckoutResponse, ConfirmPaymentRequest, PaymentStatusResponse,
    RefundResponse,
};
use crate::ApiResponse;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:method", post(initiate_payment))
        .route("/:method/confirm", post(confirm_payment))
        .route("/:method/processing", post(begin_processing))
        .route("/:method/status/:id", get(payment_status))
        .route("/:method/cancel", post(cancel_payment))
        .route("/:method/refund", post(refund_payment))
}

fn parse_method(raw: &str) -> Result<PaymentMethod, ServiceError> {
    PaymentMethod::from_str(raw).map_err(|_| {
        ServiceError::ValidationError(format!(
            "unknown payment method '{raw}' (expected card, sol, btc, or eth)"
        ))
    })
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InitiateCheckoutRequest {
    pub tour_id: Uuid,
    /// Supplied by the upstream session layer; null for guest checkout.
    pub user_id: Option<Uuid>,
    pub customer_email: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BeginProcessingRequest {
    pub payment_id: Uuid,
    /// Processor intent id or on-chain transaction hash.
    #[validate(length(min = 1, max = 128))]
    pub external_tx_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelPaymentRequest {
    pub payment_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefundPaymentRequest {
    pub payment_id: Uuid,
    /// Rail smallest units; omit for a full refund.
    pub amount: Option<Decimal>,
}

/// Start a checkout: pending booking + pending payment + rail handle
#[utoipa::path(
    post,
    path = "/api/v1/payments/{method}",
    params(("method" = String, Path, description = "card | sol | btc | eth")),
    request_body = InitiateCheckoutRequest,
    responses(
        (status = 201, description = "Checkout initiated", body = crate::ApiResponse<CheckoutResponse>),
        (status = 404, description = "Tour not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Tour fully booked or price missing", body = crate::errors::ErrorResponse),
        (status = 502, description = "Rail unavailable after retries", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn initiate_payment(
    State(state): State<AppState>,
    Path(method): Path<String>,
    Json(request): Json<InitiateCheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResponse>>), ServiceError> {
    let method = parse_method(&method)?;
    let checkout = state
        .services
        .payments
        .initiate_checkout(
            request.tour_id,
            method,
            CheckoutRequest {
                user_id: request.user_id,
                customer_email: request.customer_email,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(checkout))))
}

/// Record that the client began the rail completion step
#[utoipa::path(
    post,
    path = "/api/v1/payments/{method}/processing",
    params(("method" = String, Path, description = "card | sol | btc | eth")),
    request_body = BeginProcessingRequest,
    responses(
        (status = 200, description = "Payment processing", body = crate::ApiResponse<PaymentStatusResponse>),
        (status = 409, description = "Payment already terminal", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn begin_processing(
    State(state): State<AppState>,
    Path(method): Path<String>,
    Json(request): Json<BeginProcessingRequest>,
) -> Result<Json<ApiResponse<PaymentStatusResponse>>, ServiceError> {
    parse_method(&method)?;
    request.validate()?;
    let status = state
        .services
        .payments
        .mark_processing(request.payment_id, &request.external_tx_id)
        .await?;
    Ok(Json(ApiResponse::success(status)))
}

/// Verify a payment against its rail. Client polls and webhooks share this
/// endpoint; it is idempotent.
#[utoipa::path(
    post,
    path = "/api/v1/payments/{method}/confirm",
    params(("method" = String, Path, description = "card | sol | btc | eth")),
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Current payment state after verification", body = crate::ApiResponse<PaymentStatusResponse>),
        (status = 402, description = "Amount mismatch, expired handle, or rail rejection", body = crate::errors::ErrorResponse),
        (status = 409, description = "Payment already terminal", body = crate::errors::ErrorResponse),
        (status = 502, description = "Rail unavailable after retries", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(method): Path<String>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<ApiResponse<PaymentStatusResponse>>, ServiceError> {
    parse_method(&method)?;
    request.validate()?;
    let status = state
        .services
        .payments
        .attempt_completion(request.payment_id, request.external_tx_id.as_deref())
        .await?;
    Ok(Json(ApiResponse::success(status)))
}

/// Current payment state
#[utoipa::path(
    get,
    path = "/api/v1/payments/{method}/status/{id}",
    params(
        ("method" = String, Path, description = "card | sol | btc | eth"),
        ("id" = Uuid, Path, description = "Payment id")
    ),
    responses(
        (status = 200, description = "Payment state", body = crate::ApiResponse<PaymentStatusResponse>),
        (status = 404, description = "Payment not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_status(
    State(state): State<AppState>,
    Path((method, id)): Path<(String, Uuid)>,
) -> Result<Json<ApiResponse<PaymentStatusResponse>>, ServiceError> {
    parse_method(&method)?;
    let status = state.services.payments.payment_status(id).await?;
    Ok(Json(ApiResponse::success(status)))
}

/// Abort a payment prior to completion; releases the booking. Idempotent.
#[utoipa::path(
    post,
    path = "/api/v1/payments/{method}/cancel",
    params(("method" = String, Path, description = "card | sol | btc | eth")),
    request_body = CancelPaymentRequest,
    responses(
        (status = 200, description = "Payment cancelled", body = crate::ApiResponse<PaymentStatusResponse>),
        (status = 409, description = "A concurrent transition already settled the payment", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn cancel_payment(
    State(state): State<AppState>,
    Path(method): Path<String>,
    Json(request): Json<CancelPaymentRequest>,
) -> Result<Json<ApiResponse<PaymentStatusResponse>>, ServiceError> {
    parse_method(&method)?;
    let status = state
        .services
        .payments
        .cancel_payment(request.payment_id)
        .await?;
    Ok(Json(ApiResponse::success(status)))
}

/// Refund a completed payment (operator). The booking stays confirmed.
#[utoipa::path(
    post,
    path = "/api/v1/payments/{method}/refund",
    params(("method" = String, Path, description = "card | sol | btc | eth")),
    request_body = RefundPaymentRequest,
    responses(
        (status = 200, description = "Refund executed", body = crate::ApiResponse<RefundResponse>),
        (status = 422, description = "Payment is not completed", body = crate::errors::ErrorResponse),
        (status = 502, description = "Rail unavailable after retries", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn refund_payment(
    State(state): State<AppState>,
    Path(method): Path<String>,
    Json(request): Json<RefundPaymentRequest>,
) -> Result<Json<ApiResponse<RefundResponse>>, ServiceError> {
    parse_method(&method)?;
    let refund = state
        .services
        .payments
        .refund_payment(request.payment_id, request.amount)
        .await?;
    Ok(Json(ApiResponse::success(refund)))
}
