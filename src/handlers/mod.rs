pub mod health;
pub mod inventory;
pub mod orders;
pub mod transfers;

use axum::Router;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::AppState;

/// Versioned API routes plus the health probes.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(inventory::inventory_routes())
        .merge(orders::order_routes())
        .merge(transfers::transfer_routes());

    Router::new()
        .merge(health::health_routes())
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}
