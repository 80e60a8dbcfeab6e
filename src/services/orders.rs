use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::retry::{with_conflict_retry, RetryConfig},
    entities::{
        inventory_adjustment::AdjustmentReason,
        inventory_reservation::{self, ReservationStatus},
        order::{self, FulfillmentStatus, OrderStatus, PaymentStatus},
        order_item,
    },
    errors::ServiceError,
    events::{outbox, Event},
    services::{
        allocation::{AllocationRequest, AllocationResolver, GeoPoint},
        document_number,
        inventory_ledger::{InventoryLedger, ReservationOwner, ReserveRequest, StockMovement},
        order_status::{
            check_consistency, fulfillment_after, validate_order_transition,
            validate_payment_transition, StatusAxis,
        },
        reservations::ReservationManager,
    },
};

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderItemInput {
    pub product_id: Uuid,
    #[validate(range(
        min = 1,
        max = 1_000_000,
        message = "Item quantity must be between 1 and 1000000"
    ))]
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrder {
    pub customer_id: Uuid,
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemInput>,
    /// Cart whose holds should be converted to order holds.
    #[serde(default)]
    pub cart_id: Option<Uuid>,
    #[serde(default)]
    pub is_draft: bool,
    /// Privileged callers only. Shortfalls are reserved anyway and flagged.
    #[serde(default)]
    pub allow_oversell: bool,
    #[serde(default)]
    pub ship_to: Option<GeoPoint>,
    #[validate(length(min = 3, max = 3, message = "Currency must be 3 characters"))]
    #[serde(default = "default_currency")]
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub to: OrderStatus,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinalizeDraft {
    #[serde(default)]
    pub allow_oversell: bool,
    #[serde(default)]
    pub ship_to: Option<GeoPoint>,
}

/// Asynchronous notifications from the payment collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentEvent {
    Authorized,
    Captured,
    PartiallyCaptured,
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl PaymentEvent {
    pub fn target_status(self) -> PaymentStatus {
        match self {
            PaymentEvent::Authorized => PaymentStatus::Authorized,
            PaymentEvent::Captured => PaymentStatus::Paid,
            PaymentEvent::PartiallyCaptured => PaymentStatus::PartiallyPaid,
            PaymentEvent::Failed => PaymentStatus::Failed,
            PaymentEvent::Refunded => PaymentStatus::Refunded,
            PaymentEvent::PartiallyRefunded => PaymentStatus::PartiallyRefunded,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub reservations: Vec<inventory_reservation::Model>,
}

/// Statuses from which an order may be archived.
const ARCHIVABLE: [OrderStatus; 4] = [
    OrderStatus::Delivered,
    OrderStatus::Cancelled,
    OrderStatus::Returned,
    OrderStatus::Refunded,
];

/// Drives orders through their order, payment and fulfillment axes.
///
/// Each request runs as one transaction: the version-guarded status write,
/// every ledger side effect and the outbox events commit together or not
/// at all.
#[derive(Clone)]
pub struct OrderStateMachine {
    db: Arc<DatabaseConnection>,
    ledger: Arc<InventoryLedger>,
    reservations: Arc<ReservationManager>,
    allocation: Arc<AllocationResolver>,
    retry: RetryConfig,
}

impl OrderStateMachine {
    pub fn new(
        db: Arc<DatabaseConnection>,
        ledger: Arc<InventoryLedger>,
        reservations: Arc<ReservationManager>,
        allocation: Arc<AllocationResolver>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            db,
            ledger,
            reservations,
            allocation,
            retry,
        }
    }

    /// Creates an order with its items. Non-draft orders also hold stock
    /// for every item, converting the cart's holds first.
    #[instrument(skip(self, request), fields(customer_id = %request.customer_id, items = request.items.len()))]
    pub async fn create_order(&self, request: CreateOrder) -> Result<OrderDetails, ServiceError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
            if item.unit_price.is_sign_negative() {
                return Err(ServiceError::ValidationError(format!(
                    "unit price for product {} cannot be negative",
                    item.product_id
                )));
            }
        }

        let demand: Vec<(Uuid, i32)> = request
            .items
            .iter()
            .map(|item| (item.product_id, item.quantity))
            .collect();
        merge_demand(&demand)?;

        let mut total = Decimal::ZERO;
        for item in &request.items {
            total = line_total(item)
                .and_then(|line| total.checked_add(line))
                .ok_or_else(|| {
                    ServiceError::ValidationError("order total is out of range".to_string())
                })?;
        }

        let txn = self.db.begin().await?;
        let order_id = Uuid::new_v4();
        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(document_number("ORD")),
            customer_id: Set(request.customer_id),
            order_status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            fulfillment_status: Set(FulfillmentStatus::Unfulfilled),
            is_draft: Set(request.is_draft),
            tracking_number: Set(None),
            total_amount: Set(total),
            currency: Set(request.currency.to_uppercase()),
            deleted_at: Set(None),
            version: Set(1),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;
        order.validate()?;

        let now = Utc::now();
        let items: Vec<order_item::ActiveModel> = request
            .items
            .iter()
            .map(|item| order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                total_price: Set(line_total(item).unwrap_or_default()),
                created_at: Set(now),
            })
            .collect();
        order_item::Entity::insert_many(items)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if !request.is_draft {
            self.reserve_items_in(
                &txn,
                order_id,
                &demand,
                request.cart_id,
                request.allow_oversell,
                request.ship_to,
            )
            .await?;
        }

        outbox::enqueue(
            &txn,
            &Event::OrderCreated {
                order_id,
                order_number: order.order_number.clone(),
                is_draft: order.is_draft,
            },
        )
        .await?;
        txn.commit().await?;

        counter!("orders.created", 1);
        info!(
            %order_id,
            order_number = %order.order_number,
            is_draft = order.is_draft,
            total = %total,
            "Order created"
        );
        self.get_order(order_id).await
    }

    /// Reserves stock for a draft and makes it a live order.
    #[instrument(skip(self, input))]
    pub async fn finalize_draft(
        &self,
        order_id: Uuid,
        input: FinalizeDraft,
    ) -> Result<OrderDetails, ServiceError> {
        with_conflict_retry(&self.retry, "finalize_draft", || {
            let input = input.clone();
            async move {
                let txn = self.db.begin().await?;
                let order = find_live_order_in(&txn, order_id).await?;
                if !order.is_draft {
                    return Err(ServiceError::InvalidOperation(format!(
                        "order {} is not a draft",
                        order.order_number
                    )));
                }
                if order.order_status != OrderStatus::Pending {
                    return Err(ServiceError::InvalidOperation(format!(
                        "draft {} is {} and cannot be finalized",
                        order.order_number, order.order_status
                    )));
                }

                claim_order_in(
                    &txn,
                    &order,
                    vec![(order::Column::IsDraft, Expr::value(false))],
                )
                .await?;

                let demand = item_demand_in(&txn, order_id).await?;
                self.reserve_items_in(
                    &txn,
                    order_id,
                    &demand,
                    None,
                    input.allow_oversell,
                    input.ship_to,
                )
                .await?;
                txn.commit().await?;
                Ok(())
            }
        })
        .await?;

        info!(%order_id, "Draft order finalized");
        self.get_order(order_id).await
    }

    /// Moves the order axis to `request.to` and applies its ledger side
    /// effects. Retried as a whole when the order row changed underneath.
    #[instrument(skip(self, request), fields(to = %request.to))]
    pub async fn transition(
        &self,
        order_id: Uuid,
        request: TransitionRequest,
    ) -> Result<order::Model, ServiceError> {
        let (from, updated) = with_conflict_retry(&self.retry, "order_transition", || {
            let request = request.clone();
            async move {
                let txn = self.db.begin().await?;
                let result = self.transition_in(&txn, order_id, request).await?;
                txn.commit().await?;
                Ok(result)
            }
        })
        .await?;

        counter!("orders.transitions", 1, "to" => updated.order_status.to_string());
        info!(
            %order_id,
            from = %from,
            to = %updated.order_status,
            fulfillment = %updated.fulfillment_status,
            "Order status changed"
        );
        Ok(updated)
    }

    async fn transition_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        request: TransitionRequest,
    ) -> Result<(OrderStatus, order::Model), ServiceError> {
        let order = find_live_order_in(conn, order_id).await?;
        let to = request.to;

        if order.is_draft && to != OrderStatus::Cancelled {
            return Err(ServiceError::InvalidOperation(format!(
                "draft order {} must be finalized before moving to {}",
                order.order_number, to
            )));
        }
        validate_order_transition(order.order_status, to)?;

        let tracking_number = request
            .tracking_number
            .filter(|t| !t.trim().is_empty())
            .map(|t| t.trim().to_string());
        if to == OrderStatus::Shipped {
            let has_tracking = tracking_number.is_some()
                || order
                    .tracking_number
                    .as_deref()
                    .is_some_and(|t| !t.trim().is_empty());
            if !has_tracking {
                return Err(ServiceError::ValidationError(format!(
                    "order {} needs a tracking number to ship",
                    order.order_number
                )));
            }
        }

        let fulfillment = fulfillment_after(to, order.fulfillment_status);
        check_consistency(to, fulfillment)?;

        let mut columns = vec![
            (order::Column::OrderStatus, Expr::value(to)),
            (order::Column::FulfillmentStatus, Expr::value(fulfillment)),
        ];
        if let Some(tracking) = tracking_number {
            columns.push((order::Column::TrackingNumber, Expr::value(tracking)));
        }
        claim_order_in(conn, &order, columns).await?;

        let owner = ReservationOwner::order(order_id);
        match to {
            OrderStatus::Shipped if order.fulfillment_status == FulfillmentStatus::Unfulfilled => {
                self.deduct_order_holds_in(conn, &order).await?;
            }
            OrderStatus::Cancelled
                if matches!(
                    order.fulfillment_status,
                    FulfillmentStatus::Unfulfilled | FulfillmentStatus::Partial
                ) =>
            {
                let released = self.reservations.release_owner_in(conn, owner).await?;
                info!(%order_id, released, "Released holds for cancelled order");
            }
            OrderStatus::Returned => {
                let shipped = self
                    .reservations
                    .owner_holds_in(conn, owner, Some(ReservationStatus::Consumed))
                    .await?;
                for hold in shipped {
                    self.ledger
                        .restock_in(
                            conn,
                            StockMovement::new(
                                hold.product_id,
                                hold.location_id,
                                hold.quantity,
                                AdjustmentReason::Return,
                            )
                            .with_reference(order_id),
                        )
                        .await?;
                }
            }
            _ => {}
        }

        outbox::enqueue(
            conn,
            &Event::OrderStatusChanged {
                order_id,
                axis: StatusAxis::Order.to_string(),
                old_status: order.order_status.to_string(),
                new_status: to.to_string(),
            },
        )
        .await?;
        if fulfillment != order.fulfillment_status {
            outbox::enqueue(
                conn,
                &Event::OrderStatusChanged {
                    order_id,
                    axis: StatusAxis::Fulfillment.to_string(),
                    old_status: order.fulfillment_status.to_string(),
                    new_status: fulfillment.to_string(),
                },
            )
            .await?;
        }

        let updated = find_live_order_in(conn, order_id).await?;
        Ok((order.order_status, updated))
    }

    /// Consumes the order's active holds. Fails with `Conflict` when any
    /// item is not fully covered, including holds that expired.
    async fn deduct_order_holds_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: &order::Model,
    ) -> Result<(), ServiceError> {
        let holds = self
            .reservations
            .owner_holds_in(
                conn,
                ReservationOwner::order(order.id),
                Some(ReservationStatus::Active),
            )
            .await?;

        let mut held: HashMap<Uuid, i32> = HashMap::new();
        for hold in &holds {
            let entry = held.entry(hold.product_id).or_default();
            *entry = entry.saturating_add(hold.quantity);
        }
        for (product_id, needed) in item_demand_in(conn, order.id).await? {
            let covered = held.get(&product_id).copied().unwrap_or(0);
            if covered < needed {
                return Err(ServiceError::Conflict(format!(
                    "order {} holds {} of {} units of product {}; reservation missing or expired",
                    order.order_number, covered, needed, product_id
                )));
            }
        }

        for hold in holds {
            self.ledger
                .deduct_in(conn, hold.id)
                .await
                .map_err(|e| match e {
                    ServiceError::ReservationExpired(id) | ServiceError::ReservationNotFound(id) => {
                        warn!(order_id = %order.id, reservation_id = %id, "Hold lost before shipping");
                        ServiceError::Conflict(format!(
                            "reservation {} for order {} expired or was released before shipping",
                            id, order.order_number
                        ))
                    }
                    other => other,
                })?;
        }
        Ok(())
    }

    /// Maps a payment collaborator event onto the payment axis.
    #[instrument(skip(self))]
    pub async fn apply_payment_event(
        &self,
        order_id: Uuid,
        event: PaymentEvent,
    ) -> Result<order::Model, ServiceError> {
        let updated = with_conflict_retry(&self.retry, "payment_event", || async move {
            let txn = self.db.begin().await?;
            let order = find_live_order_in(&txn, order_id).await?;
            let to = event.target_status();
            validate_payment_transition(order.payment_status, to)?;

            claim_order_in(
                &txn,
                &order,
                vec![(order::Column::PaymentStatus, Expr::value(to))],
            )
            .await?;
            outbox::enqueue(
                &txn,
                &Event::OrderStatusChanged {
                    order_id,
                    axis: StatusAxis::Payment.to_string(),
                    old_status: order.payment_status.to_string(),
                    new_status: to.to_string(),
                },
            )
            .await?;

            let updated = find_live_order_in(&txn, order_id).await?;
            txn.commit().await?;
            Ok(updated)
        })
        .await?;

        counter!("orders.payment_events", 1, "event" => event.to_string());
        info!(%order_id, %event, payment_status = %updated.payment_status, "Payment event applied");
        Ok(updated)
    }

    /// Soft-deletes an order that has reached the end of its lifecycle.
    #[instrument(skip(self))]
    pub async fn archive(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let order = find_live_order_in(&txn, order_id).await?;
        if !ARCHIVABLE.contains(&order.order_status) {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} is {} and cannot be archived",
                order.order_number, order.order_status
            )));
        }
        claim_order_in(
            &txn,
            &order,
            vec![(order::Column::DeletedAt, Expr::value(Utc::now()))],
        )
        .await?;
        let archived = order::Entity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        txn.commit().await?;

        info!(%order_id, "Order archived");
        Ok(archived)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let db = &*self.db;
        let order = find_live_order_in(db, order_id).await?;
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;
        let reservations = self
            .reservations
            .owner_holds_in(db, ReservationOwner::order(order_id), None)
            .await?;
        Ok(OrderDetails {
            order,
            items,
            reservations,
        })
    }

    /// Holds stock for each (product, quantity): converted cart holds
    /// first, then fresh holds placed by the allocation plan. Leftover cart
    /// holds are released once the order is covered.
    async fn reserve_items_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        demand: &[(Uuid, i32)],
        cart_id: Option<Uuid>,
        allow_oversell: bool,
        ship_to: Option<GeoPoint>,
    ) -> Result<(), ServiceError> {
        let owner = ReservationOwner::order(order_id);
        let expires_at = self.reservations.order_hold_expiry();

        for (product_id, quantity) in merge_demand(demand)? {
            let mut remaining = quantity;
            if let Some(cart_id) = cart_id {
                let converted = self
                    .reservations
                    .convert_cart_holds_in(conn, cart_id, order_id, product_id, quantity)
                    .await?;
                remaining -= converted.iter().map(|r| r.quantity).sum::<i32>();
            }
            if remaining <= 0 {
                continue;
            }

            let plan = self
                .allocation
                .resolve_in(
                    conn,
                    &AllocationRequest {
                        product_id,
                        quantity: remaining,
                        ship_to,
                    },
                )
                .await?;

            if plan.shortfall > 0 && !allow_oversell {
                return Err(ServiceError::InsufficientStock {
                    product_id,
                    location_id: None,
                    requested: quantity,
                    available: quantity - plan.shortfall,
                });
            }

            for line in &plan.lines {
                self.ledger
                    .reserve_in(
                        conn,
                        ReserveRequest {
                            product_id,
                            location_id: line.location_id,
                            quantity: line.quantity,
                            owner,
                            expires_at,
                            allow_oversell: false,
                        },
                    )
                    .await?;
            }

            if plan.shortfall > 0 {
                let location_id = plan
                    .lines
                    .first()
                    .map(|line| line.location_id)
                    .or_else(|| plan.candidate_location_ids.first().copied())
                    .ok_or(ServiceError::InsufficientStock {
                        product_id,
                        location_id: None,
                        requested: quantity,
                        available: 0,
                    })?;
                warn!(%order_id, %product_id, %location_id, shortfall = plan.shortfall, "Overselling order line");
                self.ledger
                    .reserve_in(
                        conn,
                        ReserveRequest {
                            product_id,
                            location_id,
                            quantity: plan.shortfall,
                            owner,
                            expires_at,
                            allow_oversell: true,
                        },
                    )
                    .await?;
            }
        }

        if let Some(cart_id) = cart_id {
            self.reservations
                .release_owner_in(conn, ReservationOwner::cart(cart_id))
                .await?;
        }
        Ok(())
    }
}

fn line_total(item: &OrderItemInput) -> Option<Decimal> {
    item.unit_price.checked_mul(Decimal::from(item.quantity))
}

/// Sums quantities per product, keeping first-seen order. A per-product
/// total that does not fit in `i32` is rejected.
fn merge_demand(demand: &[(Uuid, i32)]) -> Result<Vec<(Uuid, i32)>, ServiceError> {
    let mut merged: Vec<(Uuid, i32)> = Vec::with_capacity(demand.len());
    for &(product_id, quantity) in demand {
        match merged.iter_mut().find(|(id, _)| *id == product_id) {
            Some(entry) => {
                entry.1 = entry.1.checked_add(quantity).ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "total quantity for product {} is out of range",
                        product_id
                    ))
                })?;
            }
            None => merged.push((product_id, quantity)),
        }
    }
    Ok(merged)
}

async fn item_demand_in<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<(Uuid, i32)>, ServiceError> {
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::CreatedAt)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;
    let demand: Vec<(Uuid, i32)> = items.iter().map(|i| (i.product_id, i.quantity)).collect();
    merge_demand(&demand)
}

async fn find_live_order_in<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<order::Model, ServiceError> {
    order::Entity::find_by_id(order_id)
        .filter(order::Column::DeletedAt.is_null())
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
}

/// Version-guarded write of `columns`. Losing the race yields
/// `ConcurrentModification` so the caller can retry the whole request.
async fn claim_order_in<C: ConnectionTrait>(
    conn: &C,
    order: &order::Model,
    columns: Vec<(order::Column, sea_orm::sea_query::SimpleExpr)>,
) -> Result<(), ServiceError> {
    let mut update = order::Entity::update_many()
        .col_expr(order::Column::Version, Expr::value(order.version + 1))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()));
    for (column, value) in columns {
        update = update.col_expr(column, value);
    }
    let result = update
        .filter(order::Column::Id.eq(order.id))
        .filter(order::Column::Version.eq(order.version))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;
    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrentModification(order.id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test_case(PaymentEvent::Authorized, PaymentStatus::Authorized)]
    #[test_case(PaymentEvent::Captured, PaymentStatus::Paid)]
    #[test_case(PaymentEvent::PartiallyCaptured, PaymentStatus::PartiallyPaid)]
    #[test_case(PaymentEvent::Failed, PaymentStatus::Failed)]
    #[test_case(PaymentEvent::Refunded, PaymentStatus::Refunded)]
    #[test_case(PaymentEvent::PartiallyRefunded, PaymentStatus::PartiallyRefunded)]
    fn payment_events_map_to_payment_status(event: PaymentEvent, expected: PaymentStatus) {
        assert_eq!(event.target_status(), expected);
    }

    #[test]
    fn merge_demand_sums_repeated_products() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let merged = merge_demand(&[(a, 2), (b, 1), (a, 3)]).unwrap();
        assert_eq!(merged, vec![(a, 5), (b, 1)]);
    }

    #[test]
    fn merge_demand_rejects_totals_beyond_i32() {
        let product = Uuid::new_v4();
        let err = merge_demand(&[(product, i32::MAX), (product, 1)]).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn item_quantity_is_bounded() {
        let item = OrderItemInput {
            product_id: Uuid::new_v4(),
            quantity: 1_500_000_000,
            unit_price: dec!(1.00),
        };
        assert!(item.validate().is_err());
    }

    #[test]
    fn create_order_requires_items_and_currency_code() {
        let request = CreateOrder {
            customer_id: Uuid::new_v4(),
            items: vec![],
            cart_id: None,
            is_draft: false,
            allow_oversell: false,
            ship_to: None,
            currency: "US".into(),
        };
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("items"));
        assert!(fields.contains_key("currency"));
    }

    #[test]
    fn create_order_deserializes_with_defaults() {
        let body = serde_json::json!({
            "customer_id": Uuid::new_v4(),
            "items": [{ "product_id": Uuid::new_v4(), "quantity": 2, "unit_price": "9.99" }]
        });
        let request: CreateOrder = serde_json::from_value(body).unwrap();
        assert_eq!(request.currency, "USD");
        assert!(!request.is_draft);
        assert!(!request.allow_oversell);
        assert_eq!(request.items[0].unit_price, dec!(9.99));
    }

    #[test]
    fn only_terminal_orders_are_archivable() {
        assert!(ARCHIVABLE.contains(&OrderStatus::Refunded));
        assert!(!ARCHIVABLE.contains(&OrderStatus::Shipped));
        assert!(!ARCHIVABLE.contains(&OrderStatus::Pending));
    }
}
