use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::orders::{CreateOrder, FinalizeDraft, PaymentEvent, TransitionRequest},
    AppState,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentEventRequest {
    pub event: PaymentEvent,
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order).delete(archive_order))
        .route("/orders/:id/transitions", post(transition_order))
        .route("/orders/:id/payment-events", post(apply_payment_event))
        .route("/orders/:id/finalize", post(finalize_draft))
}

async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrder>,
) -> Result<impl IntoResponse, ServiceError> {
    let details = state.services.orders.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.services.orders.get_order(id).await?))
}

async fn transition_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.services.orders.transition(id, request).await?))
}

async fn apply_payment_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<PaymentEventRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(
        state
            .services
            .orders
            .apply_payment_event(id, request.event)
            .await?,
    ))
}

async fn finalize_draft(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<FinalizeDraft>>,
) -> Result<impl IntoResponse, ServiceError> {
    let input = body.map(|Json(input)| input).unwrap_or_default();
    Ok(Json(state.services.orders.finalize_draft(id, input).await?))
}

async fn archive_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.services.orders.archive(id).await?))
}
