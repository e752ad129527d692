//! Periodic sweep resolving stale payments and abandoned bookings.
//!
//! Any payment still pending or processing past its expiry window is driven
//! to failed and its booking released. A pending booking whose payments
//! have all gone terminal (the customer walked away after a mismatch or
//! expiry instead of retrying) is released after a grace window. Between
//! the two passes, an abandoned checkout can never lock a tour slot
//! forever.

use crate::{
    entities::{booking, payment},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{BookingStatus, PaymentStatus},
};
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    TransactionTrait,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

pub struct PaymentSweeper {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    interval: Duration,
    /// How long a pending booking with only terminal payments may wait for
    /// a retry before the sweep releases its slot.
    booking_grace: Duration,
}

impl PaymentSweeper {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        interval: Duration,
        booking_grace: Duration,
    ) -> Self {
        Self {
            db,
            event_sender,
            interval,
            booking_grace,
        }
    }

    /// Runs until the process shuts down.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.sweep_once().await {
                warn!(error = %err, "payment sweep failed");
            }
        }
    }

    /// One pass, two phases: fail every expired in-flight payment and
    /// release its booking, then release pending bookings past the grace
    /// window whose payments are all terminal. Each row is resolved with a
    /// guarded update; the version filter keeps the sweep from clobbering
    /// a verify that is completing concurrently.
    #[instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<u64, ServiceError> {
        let now = Utc::now();
        let stale = payment::Entity::find()
            .filter(
                payment::Column::Status.is_in([
                    PaymentStatus::Pending.to_string(),
                    PaymentStatus::Processing.to_string(),
                ]),
            )
            .filter(payment::Column::ExpiresAt.lt(now))
            .all(&*self.db)
            .await?;

        let mut resolved = 0u64;
        for row in stale {
            let txn = self.db.begin().await?;

            let result = payment::Entity::update_many()
                .col_expr(
                    payment::Column::Status,
                    Expr::value(PaymentStatus::Failed.to_string()),
                )
                .col_expr(
                    payment::Column::FailureReason,
                    Expr::value("expired by sweep".to_string()),
                )
                .col_expr(payment::Column::Version, Expr::value(row.version + 1))
                .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(payment::Column::Id.eq(row.id))
                .filter(payment::Column::Version.eq(row.version))
                .exec(&txn)
                .await?;
            if result.rows_affected == 0 {
                // A verify got there first; leave its outcome alone.
                txn.rollback().await?;
                continue;
            }

            booking::Entity::update_many()
                .col_expr(
                    booking::Column::Status,
                    Expr::value(BookingStatus::Cancelled.to_string()),
                )
                .col_expr(booking::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(booking::Column::Id.eq(row.booking_id))
                .filter(booking::Column::Status.eq(BookingStatus::Pending.to_string()))
                .exec(&txn)
                .await?;

            txn.commit().await?;
            resolved += 1;

            info!(payment_id = %row.id, booking_id = %row.booking_id, "stale payment swept");
            self.event_sender
                .send(Event::PaymentFailed {
                    payment_id: row.id,
                    reason: "expired by sweep".to_string(),
                })
                .await;
            self.event_sender
                .send(Event::BookingCancelled(row.booking_id))
                .await;
        }

        let cutoff = now
            - ChronoDuration::from_std(self.booking_grace)
                .unwrap_or_else(|_| ChronoDuration::hours(2));
        let stale_bookings = booking::Entity::find()
            .filter(booking::Column::Status.eq(BookingStatus::Pending.to_string()))
            .filter(booking::Column::CreatedAt.lt(cutoff))
            .all(&*self.db)
            .await?;

        for row in stale_bookings {
            let in_flight = payment::Entity::find()
                .filter(payment::Column::BookingId.eq(row.id))
                .filter(
                    payment::Column::Status.is_in([
                        PaymentStatus::Pending.to_string(),
                        PaymentStatus::Processing.to_string(),
                    ]),
                )
                .count(&*self.db)
                .await?;
            if in_flight > 0 {
                // Still has a live payment; phase one owns it.
                continue;
            }

            let result = booking::Entity::update_many()
                .col_expr(
                    booking::Column::Status,
                    Expr::value(BookingStatus::Cancelled.to_string()),
                )
                .col_expr(booking::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(booking::Column::Id.eq(row.id))
                .filter(booking::Column::Status.eq(BookingStatus::Pending.to_string()))
                .exec(&*self.db)
                .await?;
            if result.rows_affected == 0 {
                continue;
            }
            resolved += 1;

            info!(booking_id = %row.id, "abandoned booking released");
            self.event_sender
                .send(Event::BookingCancelled(row.id))
                .await;
        }

        Ok(resolved)
    }
}
