use crate::{
    entities::{booking, payment},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{BookingStatus, PaymentStatus},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BookingResponse {
    pub id: Uuid,
    pub tour_id: Uuid,
    pub user_id: Option<Uuid>,
    pub customer_email: Option<String>,
    pub booking_date: chrono::DateTime<Utc>,
    pub status: BookingStatus,
    pub created_at: chrono::DateTime<Utc>,
}

impl TryFrom<booking::Model> for BookingResponse {
    type Error = ServiceError;

    fn try_from(model: booking::Model) -> Result<Self, Self::Error> {
        let status = BookingStatus::from_str(&model.status).map_err(|_| {
            ServiceError::InternalError(format!("unknown booking status '{}'", model.status))
        })?;
        Ok(Self {
            id: model.id,
            tour_id: model.tour_id,
            user_id: model.user_id,
            customer_email: model.customer_email,
            booking_date: model.booking_date,
            status,
            created_at: model.created_at,
        })
    }
}

/// Booking reads and the idempotent confirm/cancel transitions. Creation
/// happens inside the payment workflow's checkout transaction.
pub struct BookingService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl BookingService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    pub async fn get(&self, booking_id: Uuid) -> Result<BookingResponse, ServiceError> {
        let model = booking::Entity::find_by_id(booking_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {booking_id} not found")))?;
        model.try_into()
    }

    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<BookingResponse>, u64), ServiceError> {
        let paginator = booking::Entity::find()
            .order_by_desc(booking::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let models = paginator.fetch_page(page.saturating_sub(1)).await?;
        let responses = models
            .into_iter()
            .map(BookingResponse::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((responses, total))
    }

    /// Payments recorded against a booking, newest first. Retries create new
    /// rows, so this is the audit trail.
    pub async fn payment_history(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<payment::Model>, ServiceError> {
        // Existence check keeps NotFound distinct from an empty history.
        let _ = self.get(booking_id).await?;
        let payments = payment::Entity::find()
            .filter(payment::Column::BookingId.eq(booking_id))
            .order_by_desc(payment::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(payments)
    }

    /// Cancels the booking together with any in-flight payment against it,
    /// in one transaction. The version guard on the payment rows arbitrates
    /// against a concurrent verification: whoever transitions the payment
    /// first wins, and the loser gets `Conflict`. Idempotent on an
    /// already-cancelled booking.
    #[instrument(skip(self))]
    pub async fn cancel(&self, booking_id: Uuid) -> Result<BookingResponse, ServiceError> {
        let current = self.get(booking_id).await?;
        if current.status == BookingStatus::Cancelled {
            return Ok(current);
        }

        let in_flight = payment::Entity::find()
            .filter(payment::Column::BookingId.eq(booking_id))
            .filter(
                payment::Column::Status.is_in([
                    PaymentStatus::Pending.to_string(),
                    PaymentStatus::Processing.to_string(),
                ]),
            )
            .all(&*self.db)
            .await?;

        let txn = self.db.begin().await?;
        for row in &in_flight {
            let result = payment::Entity::update_many()
                .col_expr(
                    payment::Column::Status,
                    Expr::value(PaymentStatus::Cancelled.to_string()),
                )
                .col_expr(
                    payment::Column::FailureReason,
                    Expr::value("booking cancelled".to_string()),
                )
                .col_expr(payment::Column::Version, Expr::value(row.version + 1))
                .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(payment::Column::Id.eq(row.id))
                .filter(payment::Column::Version.eq(row.version))
                .exec(&txn)
                .await?;
            if result.rows_affected == 0 {
                // A concurrent verification moved this payment; its outcome
                // decides the booking, not us.
                txn.rollback().await?;
                return Err(ServiceError::Conflict(format!(
                    "payment {} is being settled concurrently",
                    row.id
                )));
            }
        }
        let released = cancel_booking(&txn, booking_id).await?;
        txn.commit().await?;

        if released {
            info!(%booking_id, "booking cancelled");
            self.event_sender.send(Event::BookingCancelled(booking_id)).await;
        }
        self.get(booking_id).await
    }
}

/// Sets the booking to confirmed. Only a pending booking can be confirmed;
/// a cancelled one must never come back. Usable inside a larger
/// transaction; returns whether a row actually changed.
pub async fn confirm_booking<C: ConnectionTrait>(
    conn: &C,
    booking_id: Uuid,
) -> Result<bool, ServiceError> {
    let result = booking::Entity::update_many()
        .col_expr(
            booking::Column::Status,
            Expr::value(BookingStatus::Confirmed.to_string()),
        )
        .col_expr(booking::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(booking::Column::Id.eq(booking_id))
        .filter(booking::Column::Status.eq(BookingStatus::Pending.to_string()))
        .exec(conn)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Sets the booking to cancelled unless it is already terminal.
pub async fn cancel_booking<C: ConnectionTrait>(
    conn: &C,
    booking_id: Uuid,
) -> Result<bool, ServiceError> {
    let result = booking::Entity::update_many()
        .col_expr(
            booking::Column::Status,
            Expr::value(BookingStatus::Cancelled.to_string()),
        )
        .col_expr(booking::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(booking::Column::Id.eq(booking_id))
        .filter(
            booking::Column::Status.is_in([
                BookingStatus::Pending.to_string(),
                BookingStatus::Confirmed.to_string(),
            ]),
        )
        .exec(conn)
        .await?;
    Ok(result.rows_affected > 0)
}
