use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::tours::list_tours,
        crate::handlers::tours::get_tour,
        crate::handlers::tours::create_tour,
        crate::handlers::tours::update_tour,
        crate::handlers::tours::tour_availability,
        crate::handlers::bookings::list_bookings,
        crate::handlers::bookings::get_booking,
        crate::handlers::bookings::booking_payments,
        crate::handlers::bookings::cancel_booking,
        crate::handlers::bookings::retry_payment,
        crate::handlers::payments::initiate_payment,
        crate::handlers::payments::begin_processing,
        crate::handlers::payments::confirm_payment,
        crate::handlers::payments::payment_status,
        crate::handlers::payments::cancel_payment,
        crate::handlers::payments::refund_payment,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::models::PaymentMethod,
        crate::models::PaymentStatus,
        crate::models::BookingStatus,
        crate::models::InvoiceStatus,
        crate::entities::tour::Model,
        crate::entities::payment::Model,
        crate::services::tours::CreateTourRequest,
        crate::services::tours::UpdateTourRequest,
        crate::services::tours::TourAvailability,
        crate::services::bookings::BookingResponse,
        crate::services::payments::CheckoutRequest,
        crate::services::payments::ConfirmPaymentRequest,
        crate::services::payments::CheckoutResponse,
        crate::services::payments::PaymentStatusResponse,
        crate::services::payments::RefundResponse,
        crate::handlers::bookings::RetryPaymentRequest,
        crate::handlers::payments::InitiateCheckoutRequest,
        crate::handlers::payments::BeginProcessingRequest,
        crate::handlers::payments::CancelPaymentRequest,
        crate::handlers::payments::RefundPaymentRequest,
    )),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Tours", description = "Tour catalog and availability"),
        (name = "Bookings", description = "Bookings and their payment history"),
        (name = "Payments", description = "Multi-rail checkout, verification, and refunds"),
    ),
    info(
        title = "Tourbook API",
        description = "Tour catalog, bookings, multi-rail payments, and invoicing",
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    pub fn openapi_spec() -> utoipa::openapi::OpenApi {
        <Self as OpenApi>::openapi()
    }
}
