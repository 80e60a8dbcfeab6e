use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

/// Stock position for one product at one location.
///
/// `available_quantity` is what can still be promised; `reserved_quantity`
/// is the sum of active reservations against this row. Both are adjusted
/// only through the inventory ledger.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub available_quantity: i32,
    pub reserved_quantity: i32,
    /// Reorder threshold used for stock status.
    pub required_quantity: i32,
    /// Set when an oversold reservation drove this row below zero.
    pub needs_review: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    #[strum(serialize = "enough stock")]
    EnoughStock,
    #[strum(serialize = "low stock")]
    LowStock,
    #[strum(serialize = "out of stock")]
    OutOfStock,
}

impl StockStatus {
    pub fn classify(available: i32, required: i32) -> Self {
        if available <= 0 {
            StockStatus::OutOfStock
        } else if available <= required {
            StockStatus::LowStock
        } else {
            StockStatus::EnoughStock
        }
    }
}

impl Model {
    pub fn stock_status(&self) -> StockStatus {
        StockStatus::classify(self.available_quantity, self.required_quantity)
    }

    /// Physical units on hand: promisable plus held.
    pub fn on_hand(&self) -> i32 {
        self.available_quantity + self.reserved_quantity
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inventory_location::Entity",
        from = "Column::LocationId",
        to = "super::inventory_location::Column::Id"
    )]
    Location,
}

impl Related<super::inventory_location::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Location.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);

        Ok(active_model)
    }
}
