use crate::{
    entities::{booking, tour},
    errors::ServiceError,
    models::BookingStatus,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateTourRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be between 1 and 200 characters"))]
    pub name: String,
    pub description: Option<String>,
    /// Fiat price in USD.
    pub price: Decimal,
    /// Whole-coin price snapshots per chain rail.
    pub price_sol: Decimal,
    pub price_btc: Decimal,
    pub price_eth: Decimal,
    pub duration: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub capacity: Option<i32>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateTourRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub price_sol: Option<Decimal>,
    pub price_btc: Option<Decimal>,
    pub price_eth: Option<Decimal>,
    pub duration: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub capacity: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TourAvailability {
    pub tour_id: Uuid,
    /// Null when the tour is unmetered.
    pub capacity: Option<i32>,
    /// Pending plus confirmed bookings holding a slot.
    pub active_bookings: u64,
    pub available: bool,
}

/// Catalog access plus the derived-availability query. Capacity is always
/// computed from booking rows, never from an in-process counter.
pub struct TourService {
    db: Arc<DatabaseConnection>,
}

impl TourService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Result<Vec<tour::Model>, ServiceError> {
        let tours = tour::Entity::find()
            .order_by_asc(tour::Column::Name)
            .all(&*self.db)
            .await?;
        Ok(tours)
    }

    pub async fn get(&self, tour_id: Uuid) -> Result<tour::Model, ServiceError> {
        tour::Entity::find_by_id(tour_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Tour {tour_id} not found")))
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateTourRequest) -> Result<tour::Model, ServiceError> {
        request.validate()?;

        let model = tour::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name),
            description: Set(request.description),
            price: Set(request.price),
            price_sol: Set(request.price_sol),
            price_btc: Set(request.price_btc),
            price_eth: Set(request.price_eth),
            duration: Set(request.duration),
            location: Set(request.location),
            image_url: Set(request.image_url),
            capacity: Set(request.capacity),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };

        let tour = model.insert(&*self.db).await?;
        info!(tour_id = %tour.id, name = %tour.name, "tour created");
        Ok(tour)
    }

    /// Operator edit of a published tour.
    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        tour_id: Uuid,
        request: UpdateTourRequest,
    ) -> Result<tour::Model, ServiceError> {
        request.validate()?;
        let existing = self.get(tour_id).await?;

        let mut model: tour::ActiveModel = existing.into();
        if let Some(name) = request.name {
            model.name = Set(name);
        }
        if let Some(description) = request.description {
            model.description = Set(Some(description));
        }
        if let Some(price) = request.price {
            model.price = Set(price);
        }
        if let Some(price_sol) = request.price_sol {
            model.price_sol = Set(price_sol);
        }
        if let Some(price_btc) = request.price_btc {
            model.price_btc = Set(price_btc);
        }
        if let Some(price_eth) = request.price_eth {
            model.price_eth = Set(price_eth);
        }
        if let Some(duration) = request.duration {
            model.duration = Set(Some(duration));
        }
        if let Some(location) = request.location {
            model.location = Set(Some(location));
        }
        if let Some(image_url) = request.image_url {
            model.image_url = Set(Some(image_url));
        }
        if let Some(capacity) = request.capacity {
            model.capacity = Set(Some(capacity));
        }
        model.updated_at = Set(Some(Utc::now()));

        let tour = model.update(&*self.db).await?;
        Ok(tour)
    }

    /// Slots held = bookings still pending or already confirmed. Cancelled
    /// and completed bookings release their slot.
    pub async fn availability(&self, tour_id: Uuid) -> Result<TourAvailability, ServiceError> {
        let tour = self.get(tour_id).await?;
        let active = booking::Entity::find()
            .filter(booking::Column::TourId.eq(tour_id))
            .filter(
                booking::Column::Status.is_in([
                    BookingStatus::Pending.to_string(),
                    BookingStatus::Confirmed.to_string(),
                ]),
            )
            .count(&*self.db)
            .await?;

        let available = match tour.capacity {
            Some(capacity) => active < capacity.max(0) as u64,
            None => true,
        };

        Ok(TourAvailability {
            tour_id,
            capacity: tour.capacity,
            active_bookings: active,
            available,
        })
    }
}
