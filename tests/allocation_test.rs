//! Allocation rules, strategies and shortfall reporting.

mod common;

use common::TestContext;
use stateset_order_ledger::{
    entities::allocation_rule::{AllocationStrategy, RuleConditions},
    services::allocation::{AllocationLine, AllocationRequest, GeoPoint},
};
use uuid::Uuid;

fn request(product_id: Uuid, quantity: i32) -> AllocationRequest {
    AllocationRequest {
        product_id,
        quantity,
        ship_to: None,
    }
}

#[tokio::test]
async fn no_rule_uses_any_available() {
    let ctx = TestContext::new().await;
    let l1 = ctx.location("L1").await;
    let l2 = ctx.location("L2").await;
    let product = Uuid::new_v4();
    ctx.stock(product, l1, 2).await;
    ctx.stock(product, l2, 6).await;

    let plan = ctx.services.allocation.resolve(&request(product, 5)).await.unwrap();
    assert_eq!(plan.rule_id, None);
    assert_eq!(plan.strategy, AllocationStrategy::AnyAvailable);
    assert_eq!(plan.lines, vec![AllocationLine { location_id: l2, quantity: 5 }]);
    assert!(!plan.is_split());
}

#[tokio::test]
async fn priority_rule_consumes_locations_in_listed_order() {
    let ctx = TestContext::new().await;
    let store = ctx.location("STORE").await;
    let dc = ctx.location("DC").await;
    let product = Uuid::new_v4();
    ctx.stock(product, store, 2).await;
    ctx.stock(product, dc, 50).await;
    let rule = ctx
        .rule(
            1,
            RuleConditions::default(),
            &[store, dc],
            AllocationStrategy::Priority,
            None,
        )
        .await;

    let plan = ctx.services.allocation.resolve(&request(product, 5)).await.unwrap();
    assert_eq!(plan.rule_id, Some(rule));
    assert_eq!(
        plan.lines,
        vec![
            AllocationLine { location_id: store, quantity: 2 },
            AllocationLine { location_id: dc, quantity: 3 },
        ]
    );
    assert!(plan.is_satisfied());
}

#[tokio::test]
async fn first_matching_rule_by_priority_wins() {
    let ctx = TestContext::new().await;
    let east = ctx.location("EAST").await;
    let west = ctx.location("WEST").await;
    let product = Uuid::new_v4();
    ctx.stock(product, east, 10).await;
    ctx.stock(product, west, 10).await;

    // Bulk orders go west; the bulk rule only matches large quantities
    let bulk = ctx
        .rule(
            1,
            RuleConditions {
                min_quantity: Some(5),
                ..Default::default()
            },
            &[west],
            AllocationStrategy::Priority,
            None,
        )
        .await;
    let default_rule = ctx
        .rule(
            2,
            RuleConditions::default(),
            &[east],
            AllocationStrategy::Priority,
            None,
        )
        .await;

    let small = ctx.services.allocation.resolve(&request(product, 2)).await.unwrap();
    assert_eq!(small.rule_id, Some(default_rule));
    assert_eq!(small.lines[0].location_id, east);

    let large = ctx.services.allocation.resolve(&request(product, 6)).await.unwrap();
    assert_eq!(large.rule_id, Some(bulk));
    assert_eq!(large.lines[0].location_id, west);
}

#[tokio::test]
async fn nearest_rule_prefers_closest_location() {
    let ctx = TestContext::new().await;
    let nyc = ctx.location_at("NYC", Some((40.71, -74.00))).await;
    let lax = ctx.location_at("LAX", Some((34.05, -118.24))).await;
    let product = Uuid::new_v4();
    ctx.stock(product, nyc, 5).await;
    ctx.stock(product, lax, 5).await;
    ctx.rule(
        1,
        RuleConditions::default(),
        &[nyc, lax],
        AllocationStrategy::Nearest,
        None,
    )
    .await;

    let plan = ctx
        .services
        .allocation
        .resolve(&AllocationRequest {
            product_id: product,
            quantity: 3,
            ship_to: Some(GeoPoint {
                latitude: 37.77,
                longitude: -122.42,
            }),
        })
        .await
        .unwrap();
    assert_eq!(plan.lines, vec![AllocationLine { location_id: lax, quantity: 3 }]);
}

#[tokio::test]
async fn fallback_widens_to_every_active_location() {
    let ctx = TestContext::new().await;
    let listed = ctx.location("LISTED").await;
    let other = ctx.location("OTHER").await;
    let product = Uuid::new_v4();
    ctx.stock(product, listed, 1).await;
    ctx.stock(product, other, 9).await;
    ctx.rule(
        1,
        RuleConditions::default(),
        &[listed],
        AllocationStrategy::Priority,
        Some(AllocationStrategy::AnyAvailable),
    )
    .await;

    let plan = ctx.services.allocation.resolve(&request(product, 4)).await.unwrap();
    assert!(plan.used_fallback);
    assert_eq!(plan.strategy, AllocationStrategy::AnyAvailable);
    assert!(plan.is_satisfied());
    assert_eq!(plan.allocated(), 4);
}

#[tokio::test]
async fn shortfall_is_reported_across_all_candidates() {
    let ctx = TestContext::new().await;
    let l1 = ctx.location("L1").await;
    let l2 = ctx.location("L2").await;
    let product = Uuid::new_v4();
    ctx.stock(product, l1, 2).await;
    ctx.stock(product, l2, 1).await;

    let plan = ctx.services.allocation.resolve(&request(product, 10)).await.unwrap();
    assert!(!plan.is_satisfied());
    assert_eq!(plan.shortfall, 7);
    assert_eq!(plan.allocated(), 3);
}

#[tokio::test]
async fn inactive_locations_are_skipped() {
    let ctx = TestContext::new().await;
    let open = ctx.location("OPEN").await;
    let closed = ctx.location("CLOSED").await;
    let product = Uuid::new_v4();
    ctx.stock(product, open, 1).await;
    ctx.stock(product, closed, 10).await;
    ctx.deactivate_location(closed).await;

    let plan = ctx.services.allocation.resolve(&request(product, 3)).await.unwrap();
    assert_eq!(plan.lines, vec![AllocationLine { location_id: open, quantity: 1 }]);
    assert_eq!(plan.shortfall, 2);
    assert!(!plan.candidate_location_ids.contains(&closed));
}
