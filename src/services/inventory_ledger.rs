use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::retry::{with_conflict_retry, RetryConfig},
    entities::{
        inventory_adjustment::{self, AdjustmentReason},
        inventory_record::{self, StockStatus},
        inventory_reservation::{self, OwnerType, ReservationStatus},
    },
    errors::ServiceError,
    events::{outbox, Event},
};

pub const SYSTEM_ACTOR: &str = "system";

fn default_actor() -> String {
    SYSTEM_ACTOR.to_string()
}

/// Who a reservation holds stock for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationOwner {
    pub owner_type: OwnerType,
    pub owner_id: Uuid,
}

impl ReservationOwner {
    pub fn cart(cart_id: Uuid) -> Self {
        Self {
            owner_type: OwnerType::Cart,
            owner_id: cart_id,
        }
    }

    pub fn order(order_id: Uuid) -> Self {
        Self {
            owner_type: OwnerType::Order,
            owner_id: order_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub quantity: i32,
    pub owner: ReservationOwner,
    pub expires_at: Option<DateTime<Utc>>,
    /// Skip the availability guard. The row is flagged for review if it
    /// goes negative; the quantity is never clamped.
    pub allow_oversell: bool,
}

/// Signed change to a location's available stock outside the reservation
/// flow: restocks, returns, corrections, transfer legs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub delta: i32,
    pub reason: AdjustmentReason,
    #[serde(default)]
    pub reference_id: Option<Uuid>,
    #[serde(default = "default_actor")]
    pub actor: String,
}

impl StockMovement {
    pub fn new(product_id: Uuid, location_id: Uuid, delta: i32, reason: AdjustmentReason) -> Self {
        Self {
            product_id,
            location_id,
            delta,
            reason,
            reference_id: None,
            actor: default_actor(),
        }
    }

    pub fn with_reference(mut self, reference_id: Uuid) -> Self {
        self.reference_id = Some(reference_id);
        self
    }

    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }
}

/// Result of releasing a reservation. Releasing a hold that is no longer
/// active is a no-op and reports the status it already had.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    AlreadyInactive(ReservationStatus),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdjustmentQuery {
    pub product_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub limit: Option<u64>,
}

/// Owns the per-(product, location) available/reserved counters.
///
/// Every counter change is a single conditional `UPDATE` on the record row,
/// so concurrent callers on the same key serialize at the database. The
/// `*_in` variants run inside a caller-supplied transaction; the others open
/// and commit their own.
#[derive(Clone)]
pub struct InventoryLedger {
    db: Arc<DatabaseConnection>,
    retry: RetryConfig,
}

impl InventoryLedger {
    pub fn new(db: Arc<DatabaseConnection>, retry: RetryConfig) -> Self {
        Self { db, retry }
    }

    // ---------------------------------------------------------------------
    // Reserve / release / deduct
    // ---------------------------------------------------------------------

    #[instrument(skip(self), fields(product_id = %req.product_id, location_id = %req.location_id))]
    pub async fn reserve(
        &self,
        req: ReserveRequest,
    ) -> Result<inventory_reservation::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let reservation = self.reserve_in(&txn, req).await?;
        txn.commit().await?;
        Ok(reservation)
    }

    /// Moves `quantity` from available to reserved and records the hold.
    /// Fails with `InsufficientStock` without touching anything when the
    /// guard does not hold.
    pub async fn reserve_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        req: ReserveRequest,
    ) -> Result<inventory_reservation::Model, ServiceError> {
        if req.quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "reservation quantity must be positive".to_string(),
            ));
        }

        let record = if req.allow_oversell {
            Some(
                self.ensure_record_in(conn, req.product_id, req.location_id, 0)
                    .await?,
            )
        } else {
            self.find_record_in(conn, req.product_id, req.location_id)
                .await?
        };
        let Some(record) = record else {
            counter!("inventory.reservations.failed", 1);
            return Err(ServiceError::InsufficientStock {
                product_id: req.product_id,
                location_id: Some(req.location_id),
                requested: req.quantity,
                available: 0,
            });
        };

        let mut update = inventory_record::Entity::update_many()
            .col_expr(
                inventory_record::Column::AvailableQuantity,
                Expr::col(inventory_record::Column::AvailableQuantity).sub(req.quantity),
            )
            .col_expr(
                inventory_record::Column::ReservedQuantity,
                Expr::col(inventory_record::Column::ReservedQuantity).add(req.quantity),
            )
            .col_expr(
                inventory_record::Column::Version,
                Expr::col(inventory_record::Column::Version).add(1),
            )
            .col_expr(inventory_record::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_record::Column::Id.eq(record.id));
        if !req.allow_oversell {
            update = update.filter(inventory_record::Column::AvailableQuantity.gte(req.quantity));
        }
        let result = update.exec(conn).await.map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            let available = self
                .record_by_id_in(conn, record.id)
                .await
                .map(|r| r.available_quantity)
                .unwrap_or(0);
            counter!("inventory.reservations.failed", 1);
            warn!(
                product_id = %req.product_id,
                location_id = %req.location_id,
                requested = req.quantity,
                available,
                "Insufficient stock for reservation"
            );
            return Err(ServiceError::InsufficientStock {
                product_id: req.product_id,
                location_id: Some(req.location_id),
                requested: req.quantity,
                available: available.max(0),
            });
        }

        let after = self.record_by_id_in(conn, record.id).await?;
        if after.available_quantity < 0 {
            self.flag_oversold_in(conn, &after, req.quantity).await?;
        }

        let reservation = inventory_reservation::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(req.product_id),
            location_id: Set(req.location_id),
            quantity: Set(req.quantity),
            owner_type: Set(req.owner.owner_type),
            owner_id: Set(req.owner.owner_id),
            status: Set(ReservationStatus::Active),
            expires_at: Set(req.expires_at),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;

        outbox::enqueue(
            conn,
            &Event::InventoryReserved {
                reservation_id: reservation.id,
                product_id: reservation.product_id,
                location_id: reservation.location_id,
                quantity: reservation.quantity,
                owner_type: reservation.owner_type.to_string(),
                owner_id: reservation.owner_id,
            },
        )
        .await?;
        self.emit_low_stock_if_crossed_in(conn, after.available_quantity + req.quantity, &after)
            .await?;

        counter!("inventory.reservations.created", 1);
        debug!(
            reservation_id = %reservation.id,
            quantity = reservation.quantity,
            available_after = after.available_quantity,
            "Reserved inventory"
        );

        Ok(reservation)
    }

    #[instrument(skip(self))]
    pub async fn release(&self, reservation_id: Uuid) -> Result<ReleaseOutcome, ServiceError> {
        let txn = self.db.begin().await?;
        let outcome = self.release_in(&txn, reservation_id).await?;
        txn.commit().await?;
        Ok(outcome)
    }

    /// Returns an active hold to available stock. Idempotent: a hold that
    /// was already released, consumed or expired is left untouched.
    pub async fn release_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        reservation_id: Uuid,
    ) -> Result<ReleaseOutcome, ServiceError> {
        let reservation = self.find_reservation_in(conn, reservation_id).await?;
        if reservation.status != ReservationStatus::Active {
            debug!(%reservation_id, status = %reservation.status, "Release of inactive reservation ignored");
            return Ok(ReleaseOutcome::AlreadyInactive(reservation.status));
        }

        if !self
            .claim_reservation_in(conn, reservation_id, ReservationStatus::Released, None)
            .await?
        {
            let current = self.find_reservation_in(conn, reservation_id).await?;
            return Ok(ReleaseOutcome::AlreadyInactive(current.status));
        }

        self.return_to_available_in(conn, &reservation).await?;
        outbox::enqueue(
            conn,
            &Event::InventoryReleased {
                reservation_id,
                product_id: reservation.product_id,
                location_id: reservation.location_id,
                quantity: reservation.quantity,
            },
        )
        .await?;

        counter!("inventory.reservations.released", 1);
        info!(%reservation_id, quantity = reservation.quantity, "Released reservation");
        Ok(ReleaseOutcome::Released)
    }

    /// Expires an active hold whose deadline has passed at `now`. Returns
    /// false when the hold is no longer active or not yet due.
    pub async fn expire_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        reservation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let reservation = self.find_reservation_in(conn, reservation_id).await?;
        if reservation.status != ReservationStatus::Active || !reservation.is_expired_at(now) {
            return Ok(false);
        }

        let due = Condition::all().add(inventory_reservation::Column::ExpiresAt.lte(now));
        if !self
            .claim_reservation_in(conn, reservation_id, ReservationStatus::Expired, Some(due))
            .await?
        {
            return Ok(false);
        }

        self.return_to_available_in(conn, &reservation).await?;
        outbox::enqueue(
            conn,
            &Event::ReservationExpired {
                reservation_id,
                product_id: reservation.product_id,
                location_id: reservation.location_id,
                quantity: reservation.quantity,
            },
        )
        .await?;

        counter!("inventory.reservations.expired", 1);
        Ok(true)
    }

    #[instrument(skip(self))]
    pub async fn deduct(
        &self,
        reservation_id: Uuid,
    ) -> Result<inventory_reservation::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let reservation = self.deduct_in(&txn, reservation_id).await?;
        txn.commit().await?;
        Ok(reservation)
    }

    /// Fulfillment: removes the held quantity from reserved stock for good
    /// and marks the reservation consumed.
    pub async fn deduct_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        reservation_id: Uuid,
    ) -> Result<inventory_reservation::Model, ServiceError> {
        let reservation = self.find_reservation_in(conn, reservation_id).await?;
        let now = Utc::now();

        match reservation.status {
            ReservationStatus::Active if reservation.is_expired_at(now) => {
                return Err(ServiceError::ReservationExpired(reservation_id))
            }
            ReservationStatus::Active => {}
            ReservationStatus::Expired => {
                return Err(ServiceError::ReservationExpired(reservation_id))
            }
            ReservationStatus::Consumed | ReservationStatus::Released => {
                return Err(ServiceError::ReservationNotFound(reservation_id))
            }
        }

        let unexpired = Condition::any()
            .add(inventory_reservation::Column::ExpiresAt.is_null())
            .add(inventory_reservation::Column::ExpiresAt.gt(now));
        if !self
            .claim_reservation_in(conn, reservation_id, ReservationStatus::Consumed, Some(unexpired))
            .await?
        {
            let current = self.find_reservation_in(conn, reservation_id).await?;
            return Err(match current.status {
                ReservationStatus::Expired => ServiceError::ReservationExpired(reservation_id),
                _ => ServiceError::ReservationNotFound(reservation_id),
            });
        }

        let result = inventory_record::Entity::update_many()
            .col_expr(
                inventory_record::Column::ReservedQuantity,
                Expr::col(inventory_record::Column::ReservedQuantity).sub(reservation.quantity),
            )
            .col_expr(
                inventory_record::Column::Version,
                Expr::col(inventory_record::Column::Version).add(1),
            )
            .col_expr(inventory_record::Column::UpdatedAt, Expr::value(now))
            .filter(inventory_record::Column::ProductId.eq(reservation.product_id))
            .filter(inventory_record::Column::LocationId.eq(reservation.location_id))
            .filter(inventory_record::Column::ReservedQuantity.gte(reservation.quantity))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(reserved_counter_drift(&reservation));
        }

        outbox::enqueue(
            conn,
            &Event::InventoryDeducted {
                reservation_id,
                product_id: reservation.product_id,
                location_id: reservation.location_id,
                quantity: reservation.quantity,
            },
        )
        .await?;

        counter!("inventory.reservations.deducted", 1);
        info!(%reservation_id, quantity = reservation.quantity, "Deducted reserved inventory");

        self.find_reservation_in(conn, reservation_id).await
    }

    /// Hands part or all of an active hold to a new owner without touching
    /// available stock. The old hold is marked consumed; any quantity beyond
    /// `quantity` goes back to available. Returns `None` when the hold is no
    /// longer active or has expired.
    pub async fn reissue_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        reservation_id: Uuid,
        owner: ReservationOwner,
        quantity: i32,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<inventory_reservation::Model>, ServiceError> {
        let held = self.find_reservation_in(conn, reservation_id).await?;
        let now = Utc::now();
        if held.status != ReservationStatus::Active || held.is_expired_at(now) || quantity <= 0 {
            return Ok(None);
        }

        let unexpired = Condition::any()
            .add(inventory_reservation::Column::ExpiresAt.is_null())
            .add(inventory_reservation::Column::ExpiresAt.gt(now));
        if !self
            .claim_reservation_in(conn, reservation_id, ReservationStatus::Consumed, Some(unexpired))
            .await?
        {
            return Ok(None);
        }

        let kept = quantity.min(held.quantity);
        let surplus = held.quantity - kept;
        if surplus > 0 {
            let surplus_hold = inventory_reservation::Model {
                quantity: surplus,
                ..held.clone()
            };
            self.return_to_available_in(conn, &surplus_hold).await?;
        }

        let reissued = inventory_reservation::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(held.product_id),
            location_id: Set(held.location_id),
            quantity: Set(kept),
            owner_type: Set(owner.owner_type),
            owner_id: Set(owner.owner_id),
            status: Set(ReservationStatus::Active),
            expires_at: Set(expires_at),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;

        debug!(
            from = %reservation_id,
            to = %reissued.id,
            kept,
            surplus,
            "Reissued reservation under new owner"
        );
        Ok(Some(reissued))
    }

    // ---------------------------------------------------------------------
    // Restock / adjust / transfer legs
    // ---------------------------------------------------------------------

    /// Adds stock and writes an adjustment row. Retried on version conflicts.
    #[instrument(skip(self, movement), fields(product_id = %movement.product_id, location_id = %movement.location_id))]
    pub async fn restock(
        &self,
        movement: StockMovement,
    ) -> Result<inventory_adjustment::Model, ServiceError> {
        with_conflict_retry(&self.retry, "restock", || {
            let movement = movement.clone();
            async move {
                let txn = self.db.begin().await?;
                let adjustment = self.restock_in(&txn, movement).await?;
                txn.commit().await?;
                Ok(adjustment)
            }
        })
        .await
    }

    pub async fn restock_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        movement: StockMovement,
    ) -> Result<inventory_adjustment::Model, ServiceError> {
        if movement.delta <= 0 {
            return Err(ServiceError::ValidationError(
                "restock quantity must be positive".to_string(),
            ));
        }
        self.apply_movement_in(conn, movement).await
    }

    /// Signed manual correction. Cannot take available stock below zero.
    #[instrument(skip(self, movement), fields(product_id = %movement.product_id, location_id = %movement.location_id))]
    pub async fn adjust(
        &self,
        movement: StockMovement,
    ) -> Result<inventory_adjustment::Model, ServiceError> {
        if movement.delta == 0 {
            return Err(ServiceError::ValidationError(
                "adjustment delta must be non-zero".to_string(),
            ));
        }
        with_conflict_retry(&self.retry, "adjust", || {
            let movement = movement.clone();
            async move {
                let txn = self.db.begin().await?;
                let adjustment = self.apply_movement_in(&txn, movement).await?;
                txn.commit().await?;
                Ok(adjustment)
            }
        })
        .await
    }

    /// Read-modify-write of available stock guarded by the record version.
    /// A lost race surfaces as `ConcurrentModification` so the caller can
    /// retry the whole unit of work.
    async fn apply_movement_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        movement: StockMovement,
    ) -> Result<inventory_adjustment::Model, ServiceError> {
        let record = self
            .ensure_record_in(conn, movement.product_id, movement.location_id, 0)
            .await?;

        let new_available = record
            .available_quantity
            .checked_add(movement.delta)
            .ok_or_else(|| ServiceError::ValidationError("quantity overflow".to_string()))?;
        if movement.delta < 0 && new_available < 0 {
            return Err(ServiceError::InsufficientStock {
                product_id: movement.product_id,
                location_id: Some(movement.location_id),
                requested: -movement.delta,
                available: record.available_quantity.max(0),
            });
        }

        let result = inventory_record::Entity::update_many()
            .col_expr(
                inventory_record::Column::AvailableQuantity,
                Expr::value(new_available),
            )
            .col_expr(
                inventory_record::Column::Version,
                Expr::value(record.version + 1),
            )
            .col_expr(inventory_record::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_record::Column::Id.eq(record.id))
            .filter(inventory_record::Column::Version.eq(record.version))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(record.id));
        }

        let adjustment = self
            .record_adjustment_in(
                conn,
                &movement,
                record.available_quantity,
                new_available,
            )
            .await?;

        outbox::enqueue(
            conn,
            &Event::InventoryRestocked {
                product_id: movement.product_id,
                location_id: movement.location_id,
                delta: movement.delta,
                new_available,
                reason: movement.reason.to_string(),
                reference_id: movement.reference_id,
            },
        )
        .await?;
        let after = inventory_record::Model {
            available_quantity: new_available,
            ..record.clone()
        };
        self.emit_low_stock_if_crossed_in(conn, record.available_quantity, &after)
            .await?;

        counter!("inventory.adjustments", 1, "reason" => movement.reason.to_string());
        info!(
            product_id = %movement.product_id,
            location_id = %movement.location_id,
            delta = movement.delta,
            reason = %movement.reason,
            previous = record.available_quantity,
            new = new_available,
            "Inventory adjusted"
        );

        Ok(adjustment)
    }

    /// Removes stock from the source location's available count for an
    /// outbound transfer. The units are neither reserved nor sellable until
    /// the transfer completes or is cancelled.
    pub async fn commit_to_transfer_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        location_id: Uuid,
        quantity: i32,
        transfer_id: Uuid,
        actor: &str,
    ) -> Result<inventory_adjustment::Model, ServiceError> {
        let Some(record) = self.find_record_in(conn, product_id, location_id).await? else {
            return Err(ServiceError::InsufficientStock {
                product_id,
                location_id: Some(location_id),
                requested: quantity,
                available: 0,
            });
        };

        let result = inventory_record::Entity::update_many()
            .col_expr(
                inventory_record::Column::AvailableQuantity,
                Expr::col(inventory_record::Column::AvailableQuantity).sub(quantity),
            )
            .col_expr(
                inventory_record::Column::Version,
                Expr::col(inventory_record::Column::Version).add(1),
            )
            .col_expr(inventory_record::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_record::Column::Id.eq(record.id))
            .filter(inventory_record::Column::AvailableQuantity.gte(quantity))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            let available = self
                .record_by_id_in(conn, record.id)
                .await
                .map(|r| r.available_quantity)
                .unwrap_or(0);
            return Err(ServiceError::InsufficientStock {
                product_id,
                location_id: Some(location_id),
                requested: quantity,
                available: available.max(0),
            });
        }

        let after = self.record_by_id_in(conn, record.id).await?;
        let movement = StockMovement::new(
            product_id,
            location_id,
            -quantity,
            AdjustmentReason::TransferOut,
        )
        .with_reference(transfer_id)
        .by(actor);
        let adjustment = self
            .record_adjustment_in(
                conn,
                &movement,
                after.available_quantity + quantity,
                after.available_quantity,
            )
            .await?;
        self.emit_low_stock_if_crossed_in(conn, after.available_quantity + quantity, &after)
            .await?;

        Ok(adjustment)
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Available stock for a product at one location, or summed over every
    /// location when `location_id` is omitted.
    pub async fn snapshot_available(
        &self,
        product_id: Uuid,
        location_id: Option<Uuid>,
    ) -> Result<i64, ServiceError> {
        self.snapshot_available_in(&*self.db, product_id, location_id)
            .await
    }

    pub async fn snapshot_available_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        location_id: Option<Uuid>,
    ) -> Result<i64, ServiceError> {
        let mut query = inventory_record::Entity::find()
            .filter(inventory_record::Column::ProductId.eq(product_id));
        if let Some(location_id) = location_id {
            query = query.filter(inventory_record::Column::LocationId.eq(location_id));
        }
        let records = query.all(conn).await.map_err(ServiceError::db_error)?;
        Ok(records
            .iter()
            .map(|r| i64::from(r.available_quantity))
            .sum())
    }

    pub async fn get_record(
        &self,
        product_id: Uuid,
        location_id: Uuid,
    ) -> Result<Option<inventory_record::Model>, ServiceError> {
        self.find_record_in(&*self.db, product_id, location_id)
            .await
    }

    pub async fn list_records_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
    ) -> Result<Vec<inventory_record::Model>, ServiceError> {
        inventory_record::Entity::find()
            .filter(inventory_record::Column::ProductId.eq(product_id))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Creates a zeroed record for the pair if none exists. Records are
    /// never deleted.
    pub async fn ensure_record(
        &self,
        product_id: Uuid,
        location_id: Uuid,
        required_quantity: i32,
    ) -> Result<inventory_record::Model, ServiceError> {
        self.ensure_record_in(&*self.db, product_id, location_id, required_quantity)
            .await
    }

    pub async fn ensure_record_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        location_id: Uuid,
        required_quantity: i32,
    ) -> Result<inventory_record::Model, ServiceError> {
        if let Some(record) = self.find_record_in(conn, product_id, location_id).await? {
            return Ok(record);
        }

        let now = Utc::now();
        let record = inventory_record::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            location_id: Set(location_id),
            available_quantity: Set(0),
            reserved_quantity: Set(0),
            required_quantity: Set(required_quantity),
            needs_review: Set(false),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        };
        inventory_record::Entity::insert(record)
            .on_conflict(
                OnConflict::columns([
                    inventory_record::Column::ProductId,
                    inventory_record::Column::LocationId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await
            .map_err(ServiceError::db_error)?;

        self.find_record_in(conn, product_id, location_id)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "inventory record for product {} at {} vanished after insert",
                    product_id, location_id
                ))
            })
    }

    pub async fn list_adjustments(
        &self,
        query: AdjustmentQuery,
    ) -> Result<Vec<inventory_adjustment::Model>, ServiceError> {
        let mut select = inventory_adjustment::Entity::find();
        if let Some(product_id) = query.product_id {
            select = select.filter(inventory_adjustment::Column::ProductId.eq(product_id));
        }
        if let Some(location_id) = query.location_id {
            select = select.filter(inventory_adjustment::Column::LocationId.eq(location_id));
        }
        select
            .order_by_desc(inventory_adjustment::Column::CreatedAt)
            .limit(query.limit.unwrap_or(100).min(1000))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Records driven negative by an oversold reservation.
    pub async fn records_needing_review(
        &self,
    ) -> Result<Vec<inventory_record::Model>, ServiceError> {
        inventory_record::Entity::find()
            .filter(inventory_record::Column::NeedsReview.eq(true))
            .order_by_asc(inventory_record::Column::AvailableQuantity)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn clear_review_flag(
        &self,
        product_id: Uuid,
        location_id: Uuid,
    ) -> Result<inventory_record::Model, ServiceError> {
        let record = self
            .find_record_in(&*self.db, product_id, location_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "No inventory record for product {} at location {}",
                    product_id, location_id
                ))
            })?;
        inventory_record::Entity::update_many()
            .col_expr(inventory_record::Column::NeedsReview, Expr::value(false))
            .col_expr(inventory_record::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_record::Column::Id.eq(record.id))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        self.record_by_id_in(&*self.db, record.id).await
    }

    pub async fn find_reservation_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        reservation_id: Uuid,
    ) -> Result<inventory_reservation::Model, ServiceError> {
        inventory_reservation::Entity::find_by_id(reservation_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or(ServiceError::ReservationNotFound(reservation_id))
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    async fn find_record_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        location_id: Uuid,
    ) -> Result<Option<inventory_record::Model>, ServiceError> {
        inventory_record::Entity::find()
            .filter(inventory_record::Column::ProductId.eq(product_id))
            .filter(inventory_record::Column::LocationId.eq(location_id))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn record_by_id_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        record_id: Uuid,
    ) -> Result<inventory_record::Model, ServiceError> {
        inventory_record::Entity::find_by_id(record_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Inventory record {}", record_id)))
    }

    /// Moves an active reservation to `to`. Only one caller can win the
    /// claim; the loser sees `false`.
    async fn claim_reservation_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        reservation_id: Uuid,
        to: ReservationStatus,
        extra: Option<Condition>,
    ) -> Result<bool, ServiceError> {
        let mut update = inventory_reservation::Entity::update_many()
            .col_expr(inventory_reservation::Column::Status, Expr::value(to))
            .col_expr(
                inventory_reservation::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(inventory_reservation::Column::Id.eq(reservation_id))
            .filter(inventory_reservation::Column::Status.eq(ReservationStatus::Active));
        if let Some(condition) = extra {
            update = update.filter(condition);
        }
        let result = update.exec(conn).await.map_err(ServiceError::db_error)?;
        Ok(result.rows_affected == 1)
    }

    async fn return_to_available_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        reservation: &inventory_reservation::Model,
    ) -> Result<(), ServiceError> {
        let result = inventory_record::Entity::update_many()
            .col_expr(
                inventory_record::Column::AvailableQuantity,
                Expr::col(inventory_record::Column::AvailableQuantity).add(reservation.quantity),
            )
            .col_expr(
                inventory_record::Column::ReservedQuantity,
                Expr::col(inventory_record::Column::ReservedQuantity).sub(reservation.quantity),
            )
            .col_expr(
                inventory_record::Column::Version,
                Expr::col(inventory_record::Column::Version).add(1),
            )
            .col_expr(inventory_record::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_record::Column::ProductId.eq(reservation.product_id))
            .filter(inventory_record::Column::LocationId.eq(reservation.location_id))
            .filter(inventory_record::Column::ReservedQuantity.gte(reservation.quantity))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(reserved_counter_drift(reservation));
        }
        Ok(())
    }

    async fn record_adjustment_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        movement: &StockMovement,
        previous_available: i32,
        new_available: i32,
    ) -> Result<inventory_adjustment::Model, ServiceError> {
        inventory_adjustment::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(movement.product_id),
            location_id: Set(movement.location_id),
            previous_available: Set(previous_available),
            new_available: Set(new_available),
            delta: Set(movement.delta),
            reason: Set(movement.reason),
            reference_id: Set(movement.reference_id),
            actor: Set(movement.actor.clone()),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)
    }

    async fn flag_oversold_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        record: &inventory_record::Model,
        requested: i32,
    ) -> Result<(), ServiceError> {
        inventory_record::Entity::update_many()
            .col_expr(inventory_record::Column::NeedsReview, Expr::value(true))
            .filter(inventory_record::Column::Id.eq(record.id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        outbox::enqueue(
            conn,
            &Event::OversellFlagged {
                product_id: record.product_id,
                location_id: record.location_id,
                requested,
                available_after: record.available_quantity,
            },
        )
        .await?;

        counter!("inventory.oversell.flagged", 1);
        warn!(
            product_id = %record.product_id,
            location_id = %record.location_id,
            available = record.available_quantity,
            "Oversold reservation flagged for review"
        );
        Ok(())
    }

    async fn emit_low_stock_if_crossed_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        previous_available: i32,
        after: &inventory_record::Model,
    ) -> Result<(), ServiceError> {
        let before = StockStatus::classify(previous_available, after.required_quantity);
        if before == StockStatus::EnoughStock && after.stock_status() != StockStatus::EnoughStock {
            outbox::enqueue(
                conn,
                &Event::LowStock {
                    product_id: after.product_id,
                    location_id: after.location_id,
                    available: after.available_quantity,
                    required: after.required_quantity,
                },
            )
            .await?;
        }
        Ok(())
    }
}

fn reserved_counter_drift(reservation: &inventory_reservation::Model) -> ServiceError {
    ServiceError::InternalError(format!(
        "reserved quantity for product {} at {} is below reservation {} ({} units)",
        reservation.product_id, reservation.location_id, reservation.id, reservation.quantity
    ))
}
