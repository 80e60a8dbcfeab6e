//! Transfer lifecycle and its ledger legs.

mod common;

use assert_matches::assert_matches;
use common::TestContext;
use stateset_order_ledger::{
    entities::{inventory_adjustment::AdjustmentReason, inventory_transfer::TransferStatus},
    errors::ServiceError,
    services::{
        allocation::AllocationRequest,
        inventory_ledger::AdjustmentQuery,
        transfers::{CreateTransfer, TransferTransition},
    },
};
use uuid::Uuid;

fn transfer(product_id: Uuid, from: Uuid, to: Uuid, quantity: i32) -> CreateTransfer {
    CreateTransfer {
        product_id,
        from_location_id: from,
        to_location_id: to,
        quantity,
        notes: None,
        actor: "ops".to_string(),
    }
}

#[tokio::test]
async fn completed_transfer_moves_stock_exactly_once() {
    let ctx = TestContext::new().await;
    let l1 = ctx.location("L1").await;
    let l2 = ctx.location("L2").await;
    let product = Uuid::new_v4();
    ctx.stock(product, l1, 20).await;
    ctx.services.ledger.ensure_record(product, l2, 0).await.unwrap();
    let transfers = &ctx.services.transfers;

    let created = transfers.create(transfer(product, l1, l2, 5)).await.unwrap();
    assert_eq!(created.status, TransferStatus::Pending);
    assert!(created.transfer_number.starts_with("TRF-"));
    assert_eq!(ctx.counters(product, l1).await, (15, 0));
    assert_eq!(ctx.counters(product, l2).await, (0, 0));
    assert_eq!(transfers.in_transit_quantity(product).await.unwrap(), 5);

    let shipped = transfers
        .ship(
            created.id,
            TransferTransition {
                tracking_number: Some("1Z999".into()),
                actor: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(shipped.status, TransferStatus::Shipped);
    assert_eq!(shipped.tracking_number.as_deref(), Some("1Z999"));
    assert!(shipped.shipped_at.is_some());

    let received = transfers
        .receive(created.id, TransferTransition::default())
        .await
        .unwrap();
    assert!(received.received_at.is_some());
    // Received stock is not sellable until the transfer completes
    assert_eq!(ctx.counters(product, l2).await, (0, 0));

    let completed = transfers
        .complete(created.id, TransferTransition::default())
        .await
        .unwrap();
    assert_eq!(completed.status, TransferStatus::Completed);
    assert!(completed.completed_at.is_some());
    assert_eq!(ctx.counters(product, l1).await, (15, 0));
    assert_eq!(ctx.counters(product, l2).await, (5, 0));
    assert_eq!(transfers.in_transit_quantity(product).await.unwrap(), 0);

    let reasons: Vec<AdjustmentReason> = ctx
        .services
        .ledger
        .list_adjustments(AdjustmentQuery {
            product_id: Some(product),
            ..Default::default()
        })
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.reference_id == Some(created.id))
        .map(|a| a.reason)
        .collect();
    assert_eq!(reasons.len(), 2);
    assert!(reasons.contains(&AdjustmentReason::TransferOut));
    assert!(reasons.contains(&AdjustmentReason::TransferIn));
}

#[tokio::test]
async fn cancelling_a_shipped_transfer_restores_the_source() {
    let ctx = TestContext::new().await;
    let l1 = ctx.location("L1").await;
    let l2 = ctx.location("L2").await;
    let product = Uuid::new_v4();
    ctx.stock(product, l1, 8).await;
    let transfers = &ctx.services.transfers;

    let created = transfers.create(transfer(product, l1, l2, 8)).await.unwrap();
    transfers
        .ship(created.id, TransferTransition::default())
        .await
        .unwrap();
    assert_eq!(ctx.counters(product, l1).await, (0, 0));

    let cancelled = transfers
        .cancel(created.id, TransferTransition::default())
        .await
        .unwrap();
    assert_eq!(cancelled.status, TransferStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(ctx.counters(product, l1).await, (8, 0));
    assert!(ctx.services.ledger.get_record(product, l2).await.unwrap().is_none());
}

#[tokio::test]
async fn received_transfers_cannot_be_cancelled() {
    let ctx = TestContext::new().await;
    let l1 = ctx.location("L1").await;
    let l2 = ctx.location("L2").await;
    let product = Uuid::new_v4();
    ctx.stock(product, l1, 4).await;
    let transfers = &ctx.services.transfers;

    let created = transfers.create(transfer(product, l1, l2, 4)).await.unwrap();
    transfers
        .ship(created.id, TransferTransition::default())
        .await
        .unwrap();
    transfers
        .receive(created.id, TransferTransition::default())
        .await
        .unwrap();

    let err = transfers
        .cancel(created.id, TransferTransition::default())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InvalidTransition { ref from, ref allowed, .. }
            if from == "received" && allowed == &vec!["completed".to_string()]
    );
    assert_eq!(ctx.counters(product, l1).await, (0, 0));
}

#[tokio::test]
async fn transitions_cannot_skip_steps_or_repeat() {
    let ctx = TestContext::new().await;
    let l1 = ctx.location("L1").await;
    let l2 = ctx.location("L2").await;
    let product = Uuid::new_v4();
    ctx.stock(product, l1, 4).await;
    let transfers = &ctx.services.transfers;

    let created = transfers.create(transfer(product, l1, l2, 2)).await.unwrap();
    let err = transfers
        .complete(created.id, TransferTransition::default())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });

    transfers
        .cancel(created.id, TransferTransition::default())
        .await
        .unwrap();
    let err = transfers
        .cancel(created.id, TransferTransition::default())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });
    // Source restored once only
    assert_eq!(ctx.counters(product, l1).await, (4, 0));
}

#[tokio::test]
async fn transfer_to_same_or_inactive_location_is_rejected() {
    let ctx = TestContext::new().await;
    let l1 = ctx.location("L1").await;
    let l2 = ctx.location("L2").await;
    let product = Uuid::new_v4();
    ctx.stock(product, l1, 10).await;
    let transfers = &ctx.services.transfers;

    let err = transfers
        .create(transfer(product, l1, l1, 1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::LocationMismatch(_));

    ctx.deactivate_location(l2).await;
    let err = transfers
        .create(transfer(product, l1, l2, 1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::LocationMismatch(_));

    let err = transfers
        .create(transfer(product, l1, Uuid::new_v4(), 1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::LocationMismatch(_));
    assert_eq!(ctx.counters(product, l1).await, (10, 0));
}

#[tokio::test]
async fn transfer_needs_available_stock_at_source() {
    let ctx = TestContext::new().await;
    let l1 = ctx.location("L1").await;
    let l2 = ctx.location("L2").await;
    let product = Uuid::new_v4();
    ctx.stock(product, l1, 3).await;

    let err = ctx
        .services
        .transfers
        .create(transfer(product, l1, l2, 4))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { requested: 4, available: 3, .. });
    assert_eq!(ctx.counters(product, l1).await, (3, 0));
}

#[tokio::test]
async fn consolidation_suggestions_become_transfers() {
    let ctx = TestContext::new().await;
    let l1 = ctx.location("L1").await;
    let l2 = ctx.location("L2").await;
    let product = Uuid::new_v4();
    ctx.stock(product, l1, 4).await;
    ctx.stock(product, l2, 3).await;

    let plan = ctx
        .services
        .allocation
        .resolve(&AllocationRequest {
            product_id: product,
            quantity: 6,
            ship_to: None,
        })
        .await
        .unwrap();
    assert!(plan.is_satisfied());
    assert!(plan.is_split());

    let suggestions = plan.consolidation_transfers(l1);
    assert_eq!(suggestions.len(), 1);
    let created = ctx
        .services
        .transfers
        .create_from_suggestion(suggestions[0], "planner")
        .await
        .unwrap();
    assert_eq!(created.from_location_id, l2);
    assert_eq!(created.quantity, 2);
    assert_eq!(created.notes.as_deref(), Some("consolidation"));
    assert_eq!(ctx.counters(product, l2).await, (1, 0));
}

#[tokio::test]
async fn completing_into_an_inactive_destination_is_refused() {
    let ctx = TestContext::new().await;
    let l1 = ctx.location("L1").await;
    let l2 = ctx.location("L2").await;
    let product = Uuid::new_v4();
    ctx.stock(product, l1, 6).await;
    let transfers = &ctx.services.transfers;

    let created = transfers.create(transfer(product, l1, l2, 6)).await.unwrap();
    transfers
        .ship(created.id, TransferTransition::default())
        .await
        .unwrap();
    transfers
        .receive(created.id, TransferTransition::default())
        .await
        .unwrap();
    ctx.deactivate_location(l2).await;

    let err = transfers
        .complete(created.id, TransferTransition::default())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::LocationMismatch(_));

    let unchanged = transfers.get(created.id).await.unwrap();
    assert_eq!(unchanged.status, TransferStatus::Received);
    assert!(unchanged.completed_at.is_none());
    assert!(ctx.services.ledger.get_record(product, l2).await.unwrap().is_none());
    assert_eq!(transfers.in_transit_quantity(product).await.unwrap(), 6);
}
