//! Concurrent callers on the same (product, location) row must never
//! oversell, and reserve/release never change the units on hand.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use common::TestContext;
use proptest::prelude::*;
use sea_orm::{
    sea_query::Expr, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, TransactionTrait,
};
use stateset_order_ledger::{
    entities::{inventory_record, inventory_reservation},
    errors::ServiceError,
    services::inventory_ledger::{ReservationOwner, ReserveRequest},
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
async fn concurrent_reservations_never_oversell() {
    let ctx = TestContext::new().await;
    let location = ctx.location("L1").await;
    let product = Uuid::new_v4();
    ctx.stock(product, location, 10).await;

    let ledger = Arc::clone(&ctx.services.ledger);
    let mut tasks = vec![];
    for _ in 0..20 {
        let ledger = Arc::clone(&ledger);
        tasks.push(tokio::spawn(async move {
            ledger.reserve(hold(product, location, 1)).await
        }));
    }

    let mut success = 0;
    let mut insufficient = 0;
    for task in tasks {
        match task.await.expect("task panicked") {
            Ok(_) => success += 1,
            Err(ServiceError::InsufficientStock { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(success, 10, "exactly 10 reservations should succeed");
    assert_eq!(insufficient, 10);
    assert_eq!(ctx.counters(product, location).await, (0, 10));
}

#[tokio::test]
async fn last_unit_goes_to_exactly_one_caller() {
    let ctx = TestContext::new().await;
    let location = ctx.location("L1").await;
    let product = Uuid::new_v4();
    ctx.stock(product, location, 1).await;

    let first = {
        let ledger = Arc::clone(&ctx.services.ledger);
        tokio::spawn(async move { ledger.reserve(hold(product, location, 1)).await })
    };
    let second = {
        let ledger = Arc::clone(&ctx.services.ledger);
        tokio::spawn(async move { ledger.reserve(hold(product, location, 1)).await })
    };
    let results = [first.await.unwrap(), second.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let failure = results.into_iter().find(|r| r.is_err()).unwrap();
    assert_matches!(failure, Err(ServiceError::InsufficientStock { .. }));
    assert_eq!(ctx.counters(product, location).await, (0, 1));
}

#[tokio::test]
async fn concurrent_releases_of_one_hold_return_stock_once() {
    let ctx = TestContext::new().await;
    let location = ctx.location("L1").await;
    let product = Uuid::new_v4();
    ctx.stock(product, location, 5).await;
    let reservation = ctx
        .services
        .ledger
        .reserve(hold(product, location, 3))
        .await
        .unwrap();

    let mut tasks = vec![];
    for _ in 0..5 {
        let ledger = Arc::clone(&ctx.services.ledger);
        let id = reservation.id;
        tasks.push(tokio::spawn(async move { ledger.release(id).await }));
    }
    for task in tasks {
        task.await.unwrap().expect("release never errors on a known hold");
    }
    assert_eq!(ctx.counters(product, location).await, (5, 0));
}

#[derive(Debug, Clone)]
enum Op {
    Reserve(i32),
    ReleaseOldest,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![(1i32..6).prop_map(Op::Reserve), Just(Op::ReleaseOldest)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn reserve_and_release_conserve_units_on_hand(
        initial in 0i32..30,
        ops in proptest::collection::vec(op_strategy(), 1..20),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = TestContext::new().await;
            let location = ctx.location("L1").await;
            let product = Uuid::new_v4();
            ctx.services.ledger.ensure_record(product, location, 0).await.unwrap();
            if initial > 0 {
                ctx.stock(product, location, initial).await;
            }

            let mut held = Vec::new();
            for op in ops {
                match op {
                    Op::Reserve(qty) => {
                        if let Ok(r) = ctx.services.ledger.reserve(hold(product, location, qty)).await {
                            held.push(r.id);
                        }
                    }
                    Op::ReleaseOldest => {
                        if !held.is_empty() {
                            let id = held.remove(0);
                            ctx.services.ledger.release(id).await.unwrap();
                        }
                    }
                }

                let record = ctx.record(product, location).await;
                assert!(record.available_quantity >= 0);
                assert!(record.reserved_quantity >= 0);
                assert_eq!(record.on_hand(), initial);
            }
        });
    }
}

async fn read_record<C: sea_orm::ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    location_id: Uuid,
) -> inventory_record::Model {
    inventory_record::Entity::find()
        .filter(inventory_record::Column::ProductId.eq(product_id))
        .filter(inventory_record::Column::LocationId.eq(location_id))
        .one(conn)
        .await
        .expect("query record")
        .expect("record exists")
}

#[tokio::test]
async fn guard_rejects_stock_drained_after_it_was_read() {
    let ctx = TestContext::new().await;
    let location = ctx.location("L1").await;
    let product = Uuid::new_v4();
    ctx.stock(product, location, 5).await;
    let ledger = &ctx.services.ledger;

    let txn = ctx.db.begin().await.unwrap();
    let seen = read_record(&txn, product, location).await;
    assert_eq!(seen.available_quantity, 5);

    // Another writer takes everything before our update runs
    ledger
        .reserve_in(&txn, hold(product, location, 5))
        .await
        .unwrap();

    let err = ledger
        .reserve_in(&txn, hold(product, location, 3))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock { requested: 3, available: 0, .. }
    );
    txn.commit().await.unwrap();

    assert_eq!(ctx.counters(product, location).await, (0, 5));
    let holds = inventory_reservation::Entity::find()
        .filter(inventory_reservation::Column::ProductId.eq(product))
        .count(&*ctx.db)
        .await
        .unwrap();
    assert_eq!(holds, 1);
}

#[tokio::test]
async fn guard_reports_what_is_left_after_a_partial_drain() {
    let ctx = TestContext::new().await;
    let location = ctx.location("L1").await;
    let product = Uuid::new_v4();
    ctx.stock(product, location, 5).await;

    let txn = ctx.db.begin().await.unwrap();
    let seen = read_record(&txn, product, location).await;
    inventory_record::Entity::update_many()
        .col_expr(inventory_record::Column::AvailableQuantity, Expr::value(2))
        .col_expr(
            inventory_record::Column::Version,
            Expr::value(seen.version + 1),
        )
        .filter(inventory_record::Column::Id.eq(seen.id))
        .exec(&txn)
        .await
        .unwrap();

    let err = ctx
        .services
        .ledger
        .reserve_in(&txn, hold(product, location, 4))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock { requested: 4, available: 2, .. }
    );
    let after = read_record(&txn, product, location).await;
    assert_eq!((after.available_quantity, after.reserved_quantity), (2, 0));
    txn.rollback().await.unwrap();
}
