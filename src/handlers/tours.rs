use crate::entities::tour;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::tours::{CreateTourRequest, TourAvailability, UpdateTourRequest};
use crate::ApiResponse;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::get,
    Router,
};
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tours).post(create_tour))
        .route("/:id", get(get_tour).put(update_tour))
        .route("/:id/availability", get(tour_availability))
}

/// List the tour catalog
#[utoipa::path(
    get,
    path = "/api/v1/tours",
    responses(
        (status = 200, description = "Tour catalog", body = crate::ApiResponse<Vec<tour::Model>>)
    ),
    tag = "Tours"
)]
pub async fn list_tours(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<tour::Model>>>, ServiceError> {
    let tours = state.services.tours.list().await?;
    Ok(Json(ApiResponse::success(tours)))
}

/// Fetch a single tour
#[utoipa::path(
    get,
    path = "/api/v1/tours/{id}",
    params(("id" = Uuid, Path, description = "Tour id")),
    responses(
        (status = 200, description = "Tour detail", body = crate::ApiResponse<tour::Model>),
        (status = 404, description = "Tour not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Tours"
)]
pub async fn get_tour(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<tour::Model>>, ServiceError> {
    let tour = state.services.tours.get(id).await?;
    Ok(Json(ApiResponse::success(tour)))
}

/// Publish a new tour (operator)
#[utoipa::path(
    post,
    path = "/api/v1/tours",
    request_body = CreateTourRequest,
    responses(
        (status = 201, description = "Tour created", body = crate::ApiResponse<tour::Model>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Tours"
)]
pub async fn create_tour(
    State(state): State<AppState>,
    Json(request): Json<CreateTourRequest>,
) -> Result<(StatusCode, Json<ApiResponse<tour::Model>>), ServiceError> {
    let tour = state.services.tours.create(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(tour))))
}

/// Edit a published tour (operator)
#[utoipa::path(
    put,
    path = "/api/v1/tours/{id}",
    params(("id" = Uuid, Path, description = "Tour id")),
    request_body = UpdateTourRequest,
    responses(
        (status = 200, description = "Tour updated", body = crate::ApiResponse<tour::Model>),
        (status = 404, description = "Tour not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Tours"
)]
pub async fn update_tour(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateTourRequest>,
) -> Result<Json<ApiResponse<tour::Model>>, ServiceError> {
    let tour = state.services.tours.update(id, request).await?;
    Ok(Json(ApiResponse::success(tour)))
}

/// Remaining capacity, derived from active bookings
#[utoipa::path(
    get,
    path = "/api/v1/tours/{id}/availability",
    params(("id" = Uuid, Path, description = "Tour id")),
    responses(
        (status = 200, description = "Availability", body = crate::ApiResponse<TourAvailability>),
        (status = 404, description = "Tour not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Tours"
)]
pub async fn tour_availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<TourAvailability>>, ServiceError> {
    let availability = state.services.tours.availability(id).await?;
    Ok(Json(ApiResponse::success(availability)))
}
