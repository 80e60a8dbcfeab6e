use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::retry::{with_conflict_retry, RetryConfig},
    entities::{
        inventory_adjustment::AdjustmentReason,
        inventory_location,
        inventory_transfer::{self, TransferStatus},
    },
    errors::ServiceError,
    events::{outbox, Event},
    services::{
        allocation::TransferSuggestion,
        document_number,
        inventory_ledger::{InventoryLedger, StockMovement, SYSTEM_ACTOR},
        order_status::validate_transfer_transition,
    },
};

fn default_actor() -> String {
    SYSTEM_ACTOR.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTransfer {
    pub product_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    #[validate(range(min = 1, message = "Transfer quantity must be positive"))]
    pub quantity: i32,
    #[validate(length(max = 1000))]
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_actor")]
    pub actor: String,
}

/// Extra input accepted by a transfer transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferTransition {
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
}

/// Moves stock between locations: pending, shipped, received, completed,
/// with cancellation allowed before receipt.
///
/// Units leave the source's available count at creation and are added to
/// the destination only at completion, so stock in transit is never counted
/// at both ends.
#[derive(Clone)]
pub struct TransferCoordinator {
    db: Arc<DatabaseConnection>,
    ledger: Arc<InventoryLedger>,
    retry: RetryConfig,
}

impl TransferCoordinator {
    pub fn new(db: Arc<DatabaseConnection>, ledger: Arc<InventoryLedger>, retry: RetryConfig) -> Self {
        Self { db, ledger, retry }
    }

    #[instrument(skip(self, request), fields(product_id = %request.product_id, quantity = request.quantity))]
    pub async fn create(
        &self,
        request: CreateTransfer,
    ) -> Result<inventory_transfer::Model, ServiceError> {
        request.validate()?;
        if request.from_location_id == request.to_location_id {
            return Err(ServiceError::LocationMismatch(format!(
                "cannot transfer from location {} to itself",
                request.from_location_id
            )));
        }

        let txn = self.db.begin().await?;
        self.require_active_location(&txn, request.from_location_id).await?;
        self.require_active_location(&txn, request.to_location_id).await?;

        let transfer_id = Uuid::new_v4();
        self.ledger
            .commit_to_transfer_in(
                &txn,
                request.product_id,
                request.from_location_id,
                request.quantity,
                transfer_id,
                &request.actor,
            )
            .await?;

        let transfer = inventory_transfer::ActiveModel {
            id: Set(transfer_id),
            transfer_number: Set(document_number("TRF")),
            product_id: Set(request.product_id),
            from_location_id: Set(request.from_location_id),
            to_location_id: Set(request.to_location_id),
            quantity: Set(request.quantity),
            status: Set(TransferStatus::Pending),
            tracking_number: Set(None),
            notes: Set(request.notes.clone()),
            shipped_at: Set(None),
            received_at: Set(None),
            completed_at: Set(None),
            cancelled_at: Set(None),
            version: Set(1),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        outbox::enqueue(
            &txn,
            &Event::TransferStatusChanged {
                transfer_id,
                old_status: "none".to_string(),
                new_status: TransferStatus::Pending.to_string(),
            },
        )
        .await?;
        txn.commit().await?;

        counter!("inventory.transfers.created", 1);
        info!(
            transfer_id = %transfer.id,
            transfer_number = %transfer.transfer_number,
            from = %transfer.from_location_id,
            to = %transfer.to_location_id,
            "Transfer created"
        );
        Ok(transfer)
    }

    /// Executes a consolidation move suggested by an allocation plan.
    pub async fn create_from_suggestion(
        &self,
        suggestion: TransferSuggestion,
        actor: impl Into<String>,
    ) -> Result<inventory_transfer::Model, ServiceError> {
        self.create(CreateTransfer {
            product_id: suggestion.product_id,
            from_location_id: suggestion.from_location_id,
            to_location_id: suggestion.to_location_id,
            quantity: suggestion.quantity,
            notes: Some("consolidation".to_string()),
            actor: actor.into(),
        })
        .await
    }

    pub async fn ship(
        &self,
        transfer_id: Uuid,
        input: TransferTransition,
    ) -> Result<inventory_transfer::Model, ServiceError> {
        self.advance(transfer_id, TransferStatus::Shipped, input).await
    }

    pub async fn receive(
        &self,
        transfer_id: Uuid,
        input: TransferTransition,
    ) -> Result<inventory_transfer::Model, ServiceError> {
        self.advance(transfer_id, TransferStatus::Received, input).await
    }

    /// Adds the transferred units to the destination's available stock.
    pub async fn complete(
        &self,
        transfer_id: Uuid,
        input: TransferTransition,
    ) -> Result<inventory_transfer::Model, ServiceError> {
        self.advance(transfer_id, TransferStatus::Completed, input).await
    }

    /// Returns the full quantity to the source location.
    pub async fn cancel(
        &self,
        transfer_id: Uuid,
        input: TransferTransition,
    ) -> Result<inventory_transfer::Model, ServiceError> {
        self.advance(transfer_id, TransferStatus::Cancelled, input).await
    }

    pub async fn get(&self, transfer_id: Uuid) -> Result<inventory_transfer::Model, ServiceError> {
        find_transfer_in(&*self.db, transfer_id).await
    }

    /// Units of `product_id` committed to transfers that have not yet
    /// completed or been cancelled.
    pub async fn in_transit_quantity(&self, product_id: Uuid) -> Result<i64, ServiceError> {
        let open = inventory_transfer::Entity::find()
            .filter(inventory_transfer::Column::ProductId.eq(product_id))
            .filter(inventory_transfer::Column::Status.is_in([
                TransferStatus::Pending,
                TransferStatus::Shipped,
                TransferStatus::Received,
            ]))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(open.iter().map(|t| i64::from(t.quantity)).sum())
    }

    #[instrument(skip(self, input))]
    async fn advance(
        &self,
        transfer_id: Uuid,
        to: TransferStatus,
        input: TransferTransition,
    ) -> Result<inventory_transfer::Model, ServiceError> {
        let transfer = with_conflict_retry(&self.retry, "transfer_transition", || {
            let input = input.clone();
            async move {
                let txn = self.db.begin().await?;
                let transfer = self.advance_in(&txn, transfer_id, to, input).await?;
                txn.commit().await?;
                Ok(transfer)
            }
        })
        .await?;

        counter!("inventory.transfers.transitions", 1, "to" => to.to_string());
        info!(%transfer_id, status = %to, "Transfer status changed");
        Ok(transfer)
    }

    async fn advance_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        transfer_id: Uuid,
        to: TransferStatus,
        input: TransferTransition,
    ) -> Result<inventory_transfer::Model, ServiceError> {
        let current = find_transfer_in(conn, transfer_id).await?;
        validate_transfer_transition(current.status, to)?;
        if to == TransferStatus::Completed {
            self.require_active_location(conn, current.to_location_id).await?;
        }

        let now = Utc::now();
        let mut update = inventory_transfer::Entity::update_many()
            .col_expr(inventory_transfer::Column::Status, Expr::value(to))
            .col_expr(
                inventory_transfer::Column::Version,
                Expr::value(current.version + 1),
            )
            .col_expr(inventory_transfer::Column::UpdatedAt, Expr::value(now));
        update = match to {
            TransferStatus::Shipped => {
                let mut update =
                    update.col_expr(inventory_transfer::Column::ShippedAt, Expr::value(now));
                if let Some(tracking) = input.tracking_number.filter(|t| !t.trim().is_empty()) {
                    update = update
                        .col_expr(inventory_transfer::Column::TrackingNumber, Expr::value(tracking));
                }
                update
            }
            TransferStatus::Received => {
                update.col_expr(inventory_transfer::Column::ReceivedAt, Expr::value(now))
            }
            TransferStatus::Completed => {
                update.col_expr(inventory_transfer::Column::CompletedAt, Expr::value(now))
            }
            TransferStatus::Cancelled => {
                update.col_expr(inventory_transfer::Column::CancelledAt, Expr::value(now))
            }
            TransferStatus::Pending => update,
        };
        let result = update
            .filter(inventory_transfer::Column::Id.eq(transfer_id))
            .filter(inventory_transfer::Column::Status.eq(current.status))
            .filter(inventory_transfer::Column::Version.eq(current.version))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(transfer_id));
        }

        let actor = input.actor.unwrap_or_else(default_actor);
        match to {
            TransferStatus::Completed => {
                self.ledger
                    .restock_in(
                        conn,
                        StockMovement::new(
                            current.product_id,
                            current.to_location_id,
                            current.quantity,
                            AdjustmentReason::TransferIn,
                        )
                        .with_reference(transfer_id)
                        .by(actor),
                    )
                    .await?;
            }
            TransferStatus::Cancelled => {
                self.ledger
                    .restock_in(
                        conn,
                        StockMovement::new(
                            current.product_id,
                            current.from_location_id,
                            current.quantity,
                            AdjustmentReason::TransferCancelled,
                        )
                        .with_reference(transfer_id)
                        .by(actor),
                    )
                    .await?;
            }
            TransferStatus::Pending | TransferStatus::Shipped | TransferStatus::Received => {}
        }

        outbox::enqueue(
            conn,
            &Event::TransferStatusChanged {
                transfer_id,
                old_status: current.status.to_string(),
                new_status: to.to_string(),
            },
        )
        .await?;

        find_transfer_in(conn, transfer_id).await
    }

    async fn require_active_location<C: ConnectionTrait>(
        &self,
        conn: &C,
        location_id: Uuid,
    ) -> Result<inventory_location::Model, ServiceError> {
        let location = inventory_location::Entity::find_by_id(location_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::LocationMismatch(format!("location {} does not exist", location_id))
            })?;
        if !location.is_active {
            return Err(ServiceError::LocationMismatch(format!(
                "location {} ({}) is inactive",
                location.code, location_id
            )));
        }
        Ok(location)
    }
}

async fn find_transfer_in<C: ConnectionTrait>(
    conn: &C,
    transfer_id: Uuid,
) -> Result<inventory_transfer::Model, ServiceError> {
    inventory_transfer::Entity::find_by_id(transfer_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Transfer {} not found", transfer_id)))
}
