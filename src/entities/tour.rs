use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog entry for a bookable tour. Prices in the supported crypto units
/// are operator-maintained snapshots; fiat-to-rail conversion reads them
/// exactly once, at checkout initiation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, utoipa::ToSchema)]
#[sea_orm(table_name = "tours")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
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
    /// Null means unmetered; a value enables overbooking protection.
    pub capacity: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::booking::Entity")]
    Bookings,
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bookings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
