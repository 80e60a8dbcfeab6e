#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use chrono::Duration;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use serde_json::json;
use stateset_order_ledger::{
    config::AppConfig,
    db::{self, retry::RetryConfig},
    entities::{
        allocation_rule::{self, AllocationStrategy, RuleConditions},
        inventory_adjustment::AdjustmentReason,
        inventory_location, inventory_record, outbox_event,
    },
    handlers,
    services::{
        factory::ServiceContainer, inventory_ledger::StockMovement,
        reservations::ReservationSettings,
    },
    AppState,
};
use uuid::Uuid;

/// Fresh in-memory database with migrations applied and every service
/// wired to it.
pub struct TestContext {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub services: ServiceContainer,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_settings(ReservationSettings::default()).await
    }

    pub async fn with_settings(settings: ReservationSettings) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection keeps the in-memory database alive and shared
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.db_acquire_timeout_secs = 30;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db = Arc::new(pool);
        let retry = RetryConfig {
            max_attempts: 5,
            initial_delay: std::time::Duration::from_millis(1),
            ..RetryConfig::default()
        };
        let services = ServiceContainer::with_settings(db.clone(), retry, settings);
        Self {
            db,
            config: cfg,
            services,
        }
    }

    /// Context whose cart holds expire almost immediately.
    pub async fn with_cart_ttl(ttl: Duration) -> Self {
        Self::with_settings(ReservationSettings {
            cart_ttl: ttl,
            ..ReservationSettings::default()
        })
        .await
    }

    pub fn router(&self) -> Router {
        handlers::router(AppState {
            db: self.db.clone(),
            config: self.config.clone(),
            services: self.services.clone(),
        })
    }

    pub async fn location(&self, code: &str) -> Uuid {
        self.location_at(code, None).await
    }

    pub async fn location_at(&self, code: &str, coords: Option<(f64, f64)>) -> Uuid {
        let location = inventory_location::ActiveModel {
            code: Set(code.to_string()),
            name: Set(format!("{} warehouse", code)),
            is_active: Set(true),
            latitude: Set(coords.map(|c| c.0)),
            longitude: Set(coords.map(|c| c.1)),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("insert location");
        location.id
    }

    pub async fn deactivate_location(&self, location_id: Uuid) {
        let location = inventory_location::Entity::find_by_id(location_id)
            .one(&*self.db)
            .await
            .expect("query location")
            .expect("location exists");
        let mut active: inventory_location::ActiveModel = location.into();
        active.is_active = Set(false);
        active.update(&*self.db).await.expect("deactivate location");
    }

    /// Adds `quantity` units of stock through the ledger.
    pub async fn stock(&self, product_id: Uuid, location_id: Uuid, quantity: i32) {
        self.services
            .ledger
            .restock(StockMovement::new(
                product_id,
                location_id,
                quantity,
                AdjustmentReason::Restock,
            ))
            .await
            .expect("seed stock");
    }

    pub async fn record(&self, product_id: Uuid, location_id: Uuid) -> inventory_record::Model {
        self.services
            .ledger
            .get_record(product_id, location_id)
            .await
            .expect("query record")
            .expect("record exists")
    }

    /// (available, reserved) at one location.
    pub async fn counters(&self, product_id: Uuid, location_id: Uuid) -> (i32, i32) {
        let record = self.record(product_id, location_id).await;
        (record.available_quantity, record.reserved_quantity)
    }

    pub async fn rule(
        &self,
        priority: i32,
        conditions: RuleConditions,
        location_ids: &[Uuid],
        strategy: AllocationStrategy,
        fallback: Option<AllocationStrategy>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        allocation_rule::ActiveModel {
            id: Set(id),
            name: Set(format!("rule-{}", priority)),
            priority: Set(priority),
            conditions: Set(json!(conditions)),
            location_ids: Set(json!(location_ids)),
            strategy: Set(strategy),
            fallback_strategy: Set(fallback),
            is_active: Set(true),
        }
        .insert(&*self.db)
        .await
        .expect("insert allocation rule");
        id
    }

    /// Event types written to the outbox, oldest first.
    pub async fn outbox_event_types(&self) -> Vec<String> {
        outbox_event::Entity::find()
            .order_by_asc(outbox_event::Column::CreatedAt)
            .all(&*self.db)
            .await
            .expect("query outbox")
            .into_iter()
            .map(|row| row.event_type)
            .collect()
    }
}
