use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AllocationStrategy {
    /// Locations in the order the rule lists them.
    #[sea_orm(string_value = "priority")]
    Priority,
    /// Closest location to the ship-to coordinates first.
    #[sea_orm(string_value = "nearest")]
    Nearest,
    /// Every active location, most stock first.
    #[sea_orm(string_value = "any_available")]
    AnyAvailable,
}

/// Matching criteria stored in `allocation_rules.conditions`.
/// An absent field matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_ids: Option<Vec<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_quantity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_quantity: Option<i32>,
}

impl RuleConditions {
    pub fn matches(&self, product_id: Uuid, quantity: i32) -> bool {
        if let Some(products) = &self.product_ids {
            if !products.contains(&product_id) {
                return false;
            }
        }
        if self.min_quantity.map_or(false, |min| quantity < min) {
            return false;
        }
        if self.max_quantity.map_or(false, |max| quantity > max) {
            return false;
        }
        true
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "allocation_rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    /// Lower value is evaluated first.
    pub priority: i32,
    pub conditions: Json,
    /// Ordered list of candidate location ids.
    pub location_ids: Json,
    pub strategy: AllocationStrategy,
    pub fallback_strategy: Option<AllocationStrategy>,
    pub is_active: bool,
}

impl Model {
    pub fn parsed_conditions(&self) -> RuleConditions {
        serde_json::from_value(self.conditions.clone()).unwrap_or_default()
    }

    pub fn parsed_location_ids(&self) -> Vec<Uuid> {
        serde_json::from_value(self.location_ids.clone()).unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
