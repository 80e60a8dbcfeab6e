use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::inventory_adjustment::AdjustmentReason,
    errors::ServiceError,
    services::{
        allocation::AllocationRequest,
        inventory_ledger::{AdjustmentQuery, ReleaseOutcome, StockMovement, SYSTEM_ACTOR},
        reservations::CartItem,
    },
    AppState,
};

fn default_actor() -> String {
    SYSTEM_ACTOR.to_string()
}

fn default_restock_reason() -> AdjustmentReason {
    AdjustmentReason::Restock
}

fn default_correction_reason() -> AdjustmentReason {
    AdjustmentReason::Correction
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub location_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub product_id: Uuid,
    pub location_id: Option<Uuid>,
    pub available: i64,
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub quantity: i32,
    #[serde(default = "default_restock_reason")]
    pub reason: AdjustmentReason,
    #[serde(default)]
    pub reference_id: Option<Uuid>,
    #[serde(default = "default_actor")]
    pub actor: String,
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub delta: i32,
    #[serde(default = "default_correction_reason")]
    pub reason: AdjustmentReason,
    #[serde(default)]
    pub reference_id: Option<Uuid>,
    #[serde(default = "default_actor")]
    pub actor: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub reservation_id: Uuid,
    pub released: bool,
    pub status: String,
}

pub fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/inventory/:product_id/available", get(get_available))
        .route("/inventory/adjustments", get(list_adjustments))
        .route("/inventory/review", get(list_needing_review))
        .route("/inventory/restock", post(restock))
        .route("/inventory/adjust", post(adjust))
        .route("/carts/:cart_id/reservations", post(reserve_for_cart))
        .route("/reservations/:id", delete(release_reservation).get(get_reservation))
        .route("/allocations/resolve", post(resolve_allocation))
}

/// Storefront availability; sums every location when none is given.
async fn get_available(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let available = state
        .services
        .ledger
        .snapshot_available(product_id, query.location_id)
        .await?;
    Ok(Json(AvailabilityResponse {
        product_id,
        location_id: query.location_id,
        available,
    }))
}

async fn list_adjustments(
    State(state): State<AppState>,
    Query(query): Query<AdjustmentQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let adjustments = state.services.ledger.list_adjustments(query).await?;
    Ok(Json(adjustments))
}

async fn list_needing_review(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let records = state.services.ledger.records_needing_review().await?;
    Ok(Json(records))
}

async fn restock(
    State(state): State<AppState>,
    Json(request): Json<RestockRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let mut movement = StockMovement::new(
        request.product_id,
        request.location_id,
        request.quantity,
        request.reason,
    )
    .by(request.actor);
    movement.reference_id = request.reference_id;

    let adjustment = state.services.ledger.restock(movement).await?;
    Ok((StatusCode::CREATED, Json(adjustment)))
}

async fn adjust(
    State(state): State<AppState>,
    Json(request): Json<AdjustRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let mut movement = StockMovement::new(
        request.product_id,
        request.location_id,
        request.delta,
        request.reason,
    )
    .by(request.actor);
    movement.reference_id = request.reference_id;

    let adjustment = state.services.ledger.adjust(movement).await?;
    Ok((StatusCode::CREATED, Json(adjustment)))
}

async fn reserve_for_cart(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
    Json(item): Json<CartItem>,
) -> Result<impl IntoResponse, ServiceError> {
    let holds = state
        .services
        .reservations
        .reserve_for_cart(cart_id, item)
        .await?;
    Ok((StatusCode::CREATED, Json(holds)))
}

async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let reservation = state.services.reservations.get(id).await?;
    Ok(Json(reservation))
}

/// Releasing a hold that is no longer active succeeds and reports its
/// current status.
async fn release_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = match state.services.reservations.release(id).await? {
        ReleaseOutcome::Released => ReleaseResponse {
            reservation_id: id,
            released: true,
            status: "released".to_string(),
        },
        ReleaseOutcome::AlreadyInactive(status) => ReleaseResponse {
            reservation_id: id,
            released: false,
            status: status.to_string(),
        },
    };
    Ok(Json(response))
}

async fn resolve_allocation(
    State(state): State<AppState>,
    Json(request): Json<AllocationRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let plan = state.services.allocation.resolve(&request).await?;
    Ok(Json(plan))
}
