//! Inventory ledger: reserve, release, deduct, restock and the audit trail.

mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::TestContext;
use stateset_order_ledger::{
    entities::{
        inventory_adjustment::AdjustmentReason, inventory_record::StockStatus,
        inventory_reservation::ReservationStatus,
    },
    errors::ServiceError,
    services::inventory_ledger::{
        AdjustmentQuery, ReleaseOutcome, ReservationOwner, ReserveRequest, StockMovement,
    },
};
use uuid::Uuid;

fn hold(product_id: Uuid, location_id: Uuid, quantity: i32) -> ReserveRequest {
    ReserveRequest {
        product_id,
        location_id,
        quantity,
        owner: ReservationOwner::cart(Uuid::new_v4()),
        expires_at: None,
        allow_oversell: false,
    }
}

#[tokio::test]
async fn reserve_then_release_restores_counters() {
    let ctx = TestContext::new().await;
    let location = ctx.location("L1").await;
    let product = Uuid::new_v4();
    ctx.stock(product, location, 10).await;

    let reservation = ctx
        .services
        .ledger
        .reserve(hold(product, location, 4))
        .await
        .expect("reserve");
    assert_eq!(reservation.status, ReservationStatus::Active);
    assert_eq!(ctx.counters(product, location).await, (6, 4));

    let outcome = ctx.services.ledger.release(reservation.id).await.unwrap();
    assert_eq!(outcome, ReleaseOutcome::Released);
    assert_eq!(ctx.counters(product, location).await, (10, 0));
}

#[tokio::test]
async fn second_release_is_a_no_op() {
    let ctx = TestContext::new().await;
    let location = ctx.location("L1").await;
    let product = Uuid::new_v4();
    ctx.stock(product, location, 5).await;

    let reservation = ctx
        .services
        .ledger
        .reserve(hold(product, location, 2))
        .await
        .unwrap();
    ctx.services.ledger.release(reservation.id).await.unwrap();

    let again = ctx.services.ledger.release(reservation.id).await.unwrap();
    assert_eq!(again, ReleaseOutcome::AlreadyInactive(ReservationStatus::Released));
    assert_eq!(ctx.counters(product, location).await, (5, 0));
}

#[tokio::test]
async fn releasing_unknown_reservation_is_not_found() {
    let ctx = TestContext::new().await;
    let missing = Uuid::new_v4();
    let err = ctx.services.ledger.release(missing).await.unwrap_err();
    assert_matches!(err, ServiceError::ReservationNotFound(id) if id == missing);
}

#[tokio::test]
async fn insufficient_stock_leaves_counters_untouched() {
    let ctx = TestContext::new().await;
    let location = ctx.location("L1").await;
    let product = Uuid::new_v4();
    ctx.stock(product, location, 3).await;

    let err = ctx
        .services
        .ledger
        .reserve(hold(product, location, 4))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock { requested: 4, available: 3, .. }
    );
    assert_eq!(ctx.counters(product, location).await, (3, 0));
}

#[tokio::test]
async fn reserving_at_unknown_record_reports_zero_available() {
    let ctx = TestContext::new().await;
    let location = ctx.location("L1").await;
    let err = ctx
        .services
        .ledger
        .reserve(hold(Uuid::new_v4(), location, 1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { available: 0, .. });
}

#[tokio::test]
async fn deduct_removes_reserved_stock_for_good() {
    let ctx = TestContext::new().await;
    let location = ctx.location("L1").await;
    let product = Uuid::new_v4();
    ctx.stock(product, location, 10).await;

    let reservation = ctx
        .services
        .ledger
        .reserve(hold(product, location, 3))
        .await
        .unwrap();
    let consumed = ctx.services.ledger.deduct(reservation.id).await.unwrap();
    assert_eq!(consumed.status, ReservationStatus::Consumed);
    assert_eq!(ctx.counters(product, location).await, (7, 0));

    // Consumed holds can be neither deducted again nor released
    let err = ctx.services.ledger.deduct(reservation.id).await.unwrap_err();
    assert_matches!(err, ServiceError::ReservationNotFound(_));
    let outcome = ctx.services.ledger.release(reservation.id).await.unwrap();
    assert_eq!(outcome, ReleaseOutcome::AlreadyInactive(ReservationStatus::Consumed));
    assert_eq!(ctx.counters(product, location).await, (7, 0));
}

#[tokio::test]
async fn deducting_an_expired_hold_fails() {
    let ctx = TestContext::new().await;
    let location = ctx.location("L1").await;
    let product = Uuid::new_v4();
    ctx.stock(product, location, 10).await;

    let mut request = hold(product, location, 2);
    request.expires_at = Some(Utc::now() - Duration::seconds(5));
    let reservation = ctx.services.ledger.reserve(request).await.unwrap();

    let err = ctx.services.ledger.deduct(reservation.id).await.unwrap_err();
    assert_matches!(err, ServiceError::ReservationExpired(id) if id == reservation.id);
    assert_eq!(ctx.counters(product, location).await, (8, 2));
}

#[tokio::test]
async fn oversell_goes_negative_and_is_flagged() {
    let ctx = TestContext::new().await;
    let location = ctx.location("L1").await;
    let product = Uuid::new_v4();
    ctx.stock(product, location, 1).await;

    let mut request = hold(product, location, 3);
    request.allow_oversell = true;
    ctx.services.ledger.reserve(request).await.expect("oversell");

    let record = ctx.record(product, location).await;
    assert_eq!(record.available_quantity, -2);
    assert_eq!(record.reserved_quantity, 3);
    assert!(record.needs_review);
    assert_eq!(record.stock_status(), StockStatus::OutOfStock);

    let flagged = ctx.services.ledger.records_needing_review().await.unwrap();
    assert_eq!(flagged.len(), 1);
    assert!(ctx
        .outbox_event_types()
        .await
        .contains(&"OversellFlagged".to_string()));

    let cleared = ctx
        .services
        .ledger
        .clear_review_flag(product, location)
        .await
        .unwrap();
    assert!(!cleared.needs_review);
}

#[tokio::test]
async fn oversell_creates_a_missing_record() {
    let ctx = TestContext::new().await;
    let location = ctx.location("L1").await;
    let product = Uuid::new_v4();

    let mut request = hold(product, location, 2);
    request.allow_oversell = true;
    ctx.services.ledger.reserve(request).await.unwrap();
    assert_eq!(ctx.counters(product, location).await, (-2, 2));
}

#[tokio::test]
async fn restock_and_adjust_write_audit_rows() {
    let ctx = TestContext::new().await;
    let location = ctx.location("L1").await;
    let product = Uuid::new_v4();
    ctx.stock(product, location, 10).await;

    let adjustment = ctx
        .services
        .ledger
        .adjust(
            StockMovement::new(product, location, -4, AdjustmentReason::Correction).by("auditor"),
        )
        .await
        .unwrap();
    assert_eq!(adjustment.previous_available, 10);
    assert_eq!(adjustment.new_available, 6);
    assert_eq!(adjustment.delta, -4);
    assert_eq!(adjustment.actor, "auditor");

    let history = ctx
        .services
        .ledger
        .list_adjustments(AdjustmentQuery {
            product_id: Some(product),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().any(|a| a.reason == AdjustmentReason::Restock));
}

#[tokio::test]
async fn adjust_cannot_drive_available_negative() {
    let ctx = TestContext::new().await;
    let location = ctx.location("L1").await;
    let product = Uuid::new_v4();
    ctx.stock(product, location, 2).await;

    let err = ctx
        .services
        .ledger
        .adjust(StockMovement::new(product, location, -3, AdjustmentReason::Correction))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { requested: 3, available: 2, .. });
    assert_eq!(ctx.counters(product, location).await, (2, 0));
}

#[tokio::test]
async fn restock_rejects_non_positive_quantities() {
    let ctx = TestContext::new().await;
    let location = ctx.location("L1").await;
    let err = ctx
        .services
        .ledger
        .restock(StockMovement::new(Uuid::new_v4(), location, 0, AdjustmentReason::Restock))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn snapshot_sums_every_location_when_none_given() {
    let ctx = TestContext::new().await;
    let l1 = ctx.location("L1").await;
    let l2 = ctx.location("L2").await;
    let product = Uuid::new_v4();
    ctx.stock(product, l1, 7).await;
    ctx.stock(product, l2, 5).await;

    ctx.services
        .ledger
        .reserve(hold(product, l2, 2))
        .await
        .unwrap();

    let ledger = &ctx.services.ledger;
    assert_eq!(ledger.snapshot_available(product, None).await.unwrap(), 10);
    assert_eq!(ledger.snapshot_available(product, Some(l2)).await.unwrap(), 3);
    assert_eq!(
        ledger
            .snapshot_available(Uuid::new_v4(), None)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn crossing_the_required_threshold_emits_low_stock() {
    let ctx = TestContext::new().await;
    let location = ctx.location("L1").await;
    let product = Uuid::new_v4();
    ctx.services
        .ledger
        .ensure_record(product, location, 5)
        .await
        .unwrap();
    ctx.stock(product, location, 8).await;
    assert!(!ctx
        .outbox_event_types()
        .await
        .contains(&"LowStock".to_string()));

    ctx.services
        .ledger
        .reserve(hold(product, location, 4))
        .await
        .unwrap();
    assert_eq!(
        ctx.record(product, location).await.stock_status(),
        StockStatus::LowStock
    );
    assert!(ctx
        .outbox_event_types()
        .await
        .contains(&"LowStock".to_string()));
}
