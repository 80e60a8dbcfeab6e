use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    entities::inventory_reservation::{self, OwnerType, ReservationStatus},
    errors::ServiceError,
    services::{
        allocation::{AllocationRequest, AllocationResolver, GeoPoint},
        inventory_ledger::{InventoryLedger, ReleaseOutcome, ReservationOwner, ReserveRequest},
    },
};

#[derive(Debug, Clone)]
pub struct ReservationSettings {
    /// Lifetime of add-to-cart holds.
    pub cart_ttl: Duration,
    /// Lifetime of order holds; `None` means they never expire.
    pub order_ttl: Option<Duration>,
    pub sweep_batch_size: u64,
}

impl Default for ReservationSettings {
    fn default() -> Self {
        Self {
            cart_ttl: Duration::minutes(30),
            order_ttl: None,
            sweep_batch_size: 500,
        }
    }
}

impl From<&AppConfig> for ReservationSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            cart_ttl: cfg.cart_reservation_ttl(),
            order_ttl: cfg.order_reservation_ttl(),
            sweep_batch_size: cfg.reservation_sweep_batch_size,
        }
    }
}

/// One add-to-cart request.
#[derive(Debug, Clone, Deserialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Hold at this location; otherwise the allocation rules choose.
    #[serde(default)]
    pub location_id: Option<Uuid>,
    #[serde(default)]
    pub ship_to: Option<GeoPoint>,
}

/// Result of one expiry sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResult {
    /// Reservations expired and returned to available stock.
    pub expired_count: u64,
    /// Candidates that were consumed or released concurrently, or failed.
    pub skipped_count: u64,
    pub swept_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationStats {
    pub active_reservations: u64,
    pub expired_not_swept: u64,
    pub expiring_within_24h: u64,
    pub stats_at: DateTime<Utc>,
}

/// Short-lived holds on stock for carts and orders, plus the background
/// sweep that returns expired holds to available stock.
#[derive(Clone)]
pub struct ReservationManager {
    db: Arc<DatabaseConnection>,
    ledger: Arc<InventoryLedger>,
    allocation: Arc<AllocationResolver>,
    settings: ReservationSettings,
}

impl ReservationManager {
    pub fn new(
        db: Arc<DatabaseConnection>,
        ledger: Arc<InventoryLedger>,
        allocation: Arc<AllocationResolver>,
        settings: ReservationSettings,
    ) -> Self {
        Self {
            db,
            ledger,
            allocation,
            settings,
        }
    }

    pub fn settings(&self) -> &ReservationSettings {
        &self.settings
    }

    /// Expiry for a new order-scoped hold.
    pub fn order_hold_expiry(&self) -> Option<DateTime<Utc>> {
        self.settings.order_ttl.map(|ttl| Utc::now() + ttl)
    }

    /// Places cart-time holds for `item`. All or nothing: either the full
    /// quantity is held (possibly split across locations) or nothing is.
    #[instrument(skip(self, item), fields(product_id = %item.product_id, quantity = item.quantity))]
    pub async fn reserve_for_cart(
        &self,
        cart_id: Uuid,
        item: CartItem,
    ) -> Result<Vec<inventory_reservation::Model>, ServiceError> {
        if item.quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be positive".to_string(),
            ));
        }

        let owner = ReservationOwner::cart(cart_id);
        let expires_at = Some(Utc::now() + self.settings.cart_ttl);
        let txn = self.db.begin().await?;

        let holds = match item.location_id {
            Some(location_id) => vec![
                self.ledger
                    .reserve_in(
                        &txn,
                        ReserveRequest {
                            product_id: item.product_id,
                            location_id,
                            quantity: item.quantity,
                            owner,
                            expires_at,
                            allow_oversell: false,
                        },
                    )
                    .await?,
            ],
            None => {
                let plan = self
                    .allocation
                    .resolve_in(
                        &txn,
                        &AllocationRequest {
                            product_id: item.product_id,
                            quantity: item.quantity,
                            ship_to: item.ship_to,
                        },
                    )
                    .await?;
                if !plan.is_satisfied() {
                    return Err(ServiceError::InsufficientStock {
                        product_id: item.product_id,
                        location_id: None,
                        requested: item.quantity,
                        available: item.quantity - plan.shortfall,
                    });
                }

                let mut holds = Vec::with_capacity(plan.lines.len());
                for line in &plan.lines {
                    holds.push(
                        self.ledger
                            .reserve_in(
                                &txn,
                                ReserveRequest {
                                    product_id: item.product_id,
                                    location_id: line.location_id,
                                    quantity: line.quantity,
                                    owner,
                                    expires_at,
                                    allow_oversell: false,
                                },
                            )
                            .await?,
                    );
                }
                holds
            }
        };

        txn.commit().await?;
        info!(%cart_id, holds = holds.len(), "Cart reservation placed");
        Ok(holds)
    }

    pub async fn release(&self, reservation_id: Uuid) -> Result<ReleaseOutcome, ServiceError> {
        self.ledger.release(reservation_id).await
    }

    /// Releases every active hold of a cart or order. Returns how many were
    /// released.
    #[instrument(skip(self))]
    pub async fn release_owner(&self, owner: ReservationOwner) -> Result<u64, ServiceError> {
        let txn = self.db.begin().await?;
        let released = self.release_owner_in(&txn, owner).await?;
        txn.commit().await?;
        Ok(released)
    }

    pub async fn release_owner_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        owner: ReservationOwner,
    ) -> Result<u64, ServiceError> {
        let active = self
            .owner_holds_in(conn, owner, Some(ReservationStatus::Active))
            .await?;
        let mut released = 0;
        for hold in active {
            if self.ledger.release_in(conn, hold.id).await? == ReleaseOutcome::Released {
                released += 1;
            }
        }
        Ok(released)
    }

    /// Re-issues a cart's holds on `product_id` under the order, up to
    /// `quantity` units. Holds that expired or were swept are skipped; the
    /// caller allocates whatever is left.
    pub async fn convert_cart_holds_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
        order_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<Vec<inventory_reservation::Model>, ServiceError> {
        let holds = inventory_reservation::Entity::find()
            .filter(inventory_reservation::Column::OwnerType.eq(OwnerType::Cart))
            .filter(inventory_reservation::Column::OwnerId.eq(cart_id))
            .filter(inventory_reservation::Column::ProductId.eq(product_id))
            .filter(inventory_reservation::Column::Status.eq(ReservationStatus::Active))
            .order_by_asc(inventory_reservation::Column::CreatedAt)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        let owner = ReservationOwner::order(order_id);
        let expires_at = self.order_hold_expiry();
        let mut remaining = quantity;
        let mut converted = Vec::new();
        for hold in holds {
            if remaining <= 0 {
                break;
            }
            if let Some(reissued) = self
                .ledger
                .reissue_in(conn, hold.id, owner, remaining, expires_at)
                .await?
            {
                remaining -= reissued.quantity;
                converted.push(reissued);
            }
        }

        if !converted.is_empty() {
            counter!("inventory.reservations.converted", converted.len() as u64);
        }
        Ok(converted)
    }

    pub async fn get(
        &self,
        reservation_id: Uuid,
    ) -> Result<inventory_reservation::Model, ServiceError> {
        self.ledger
            .find_reservation_in(&*self.db, reservation_id)
            .await
    }

    pub async fn list_by_owner(
        &self,
        owner: ReservationOwner,
    ) -> Result<Vec<inventory_reservation::Model>, ServiceError> {
        self.owner_holds_in(&*self.db, owner, None).await
    }

    pub async fn owner_holds_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        owner: ReservationOwner,
        status: Option<ReservationStatus>,
    ) -> Result<Vec<inventory_reservation::Model>, ServiceError> {
        let mut query = inventory_reservation::Entity::find()
            .filter(inventory_reservation::Column::OwnerType.eq(owner.owner_type))
            .filter(inventory_reservation::Column::OwnerId.eq(owner.owner_id));
        if let Some(status) = status {
            query = query.filter(inventory_reservation::Column::Status.eq(status));
        }
        query
            .order_by_asc(inventory_reservation::Column::CreatedAt)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<ReservationStats, ServiceError> {
        let db = &*self.db;
        let now = Utc::now();

        let active = inventory_reservation::Entity::find()
            .filter(inventory_reservation::Column::Status.eq(ReservationStatus::Active))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;

        let expired_not_swept = inventory_reservation::Entity::find()
            .filter(inventory_reservation::Column::Status.eq(ReservationStatus::Active))
            .filter(inventory_reservation::Column::ExpiresAt.lte(now))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;

        let expiring_within_24h = inventory_reservation::Entity::find()
            .filter(inventory_reservation::Column::Status.eq(ReservationStatus::Active))
            .filter(inventory_reservation::Column::ExpiresAt.gt(now))
            .filter(inventory_reservation::Column::ExpiresAt.lt(now + Duration::hours(24)))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(ReservationStats {
            active_reservations: active,
            expired_not_swept,
            expiring_within_24h,
            stats_at: now,
        })
    }

    /// Expires every active hold past its deadline, one transaction per
    /// hold. A hold consumed or released in the meantime is skipped.
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self) -> Result<SweepResult, ServiceError> {
        let now = Utc::now();
        let candidates = inventory_reservation::Entity::find()
            .filter(inventory_reservation::Column::Status.eq(ReservationStatus::Active))
            .filter(inventory_reservation::Column::ExpiresAt.lte(now))
            .order_by_asc(inventory_reservation::Column::ExpiresAt)
            .limit(self.settings.sweep_batch_size)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut expired_count = 0;
        let mut skipped_count = 0;
        for candidate in candidates {
            match self.expire_one(candidate.id, now).await {
                Ok(true) => expired_count += 1,
                Ok(false) => skipped_count += 1,
                Err(e) => {
                    skipped_count += 1;
                    error!(reservation_id = %candidate.id, "Failed to expire reservation: {}", e);
                }
            }
        }

        counter!("inventory.sweeps", 1);
        if expired_count > 0 || skipped_count > 0 {
            info!(expired_count, skipped_count, "Reservation sweep finished");
        }

        Ok(SweepResult {
            expired_count,
            skipped_count,
            swept_at: now,
        })
    }

    async fn expire_one(&self, reservation_id: Uuid, now: DateTime<Utc>) -> Result<bool, ServiceError> {
        let txn = self.db.begin().await?;
        let expired = self.ledger.expire_in(&txn, reservation_id, now).await?;
        txn.commit().await?;
        Ok(expired)
    }

    /// Runs `sweep_expired` on a fixed interval until the task is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, interval: StdDuration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "Reservation sweeper started");
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_expired().await {
                    warn!("Reservation sweep failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_from_config_use_cart_ttl() {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            0,
            "test".into(),
        );
        cfg.order_reservation_ttl_secs = Some(7 * 24 * 3600);
        let settings = ReservationSettings::from(&cfg);
        assert_eq!(settings.cart_ttl, Duration::minutes(30));
        assert_eq!(settings.order_ttl, Some(Duration::days(7)));
        assert_eq!(settings.sweep_batch_size, 500);
    }
}
