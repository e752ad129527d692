use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One payment attempt against a booking. Retries create new rows rather
/// than mutating a failed one, so the table doubles as the audit trail.
///
/// `amount` is denominated in the rail's smallest unit (cents, lamports,
/// satoshis, wei), fixed at initiation so later verification compares
/// like-for-like even if market price moves.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, utoipa::ToSchema)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub method: String,
    /// Rail handle: processor intent id or deposit address.
    pub handle: Option<String>,
    /// External settlement reference: intent id or on-chain tx hash.
    pub external_tx_id: Option<String>,
    pub status: String,
    pub failure_reason: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Optimistic-lock counter; every status transition bumps it.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::booking::Entity",
        from = "Column::BookingId",
        to = "super::booking::Column::Id"
    )]
    Booking,
    #[sea_orm(has_many = "super::invoice::Entity")]
    Invoices,
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Booking.def()
    }
}

impl Related<super::invoice::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Invoices.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
