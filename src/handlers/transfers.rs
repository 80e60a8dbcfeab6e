use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::transfers::{CreateTransfer, TransferTransition},
    AppState,
};

pub fn transfer_routes() -> Router<AppState> {
    Router::new()
        .route("/transfers", post(create_transfer))
        .route("/transfers/:id", get(get_transfer))
        .route("/transfers/:id/ship", post(ship_transfer))
        .route("/transfers/:id/receive", post(receive_transfer))
        .route("/transfers/:id/complete", post(complete_transfer))
        .route("/transfers/:id/cancel", post(cancel_transfer))
}

fn transition_input(body: Option<Json<TransferTransition>>) -> TransferTransition {
    body.map(|Json(input)| input).unwrap_or_default()
}

async fn create_transfer(
    State(state): State<AppState>,
    Json(request): Json<CreateTransfer>,
) -> Result<impl IntoResponse, ServiceError> {
    let transfer = state.services.transfers.create(request).await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

async fn get_transfer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.services.transfers.get(id).await?))
}

async fn ship_transfer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<TransferTransition>>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(
        state.services.transfers.ship(id, transition_input(body)).await?,
    ))
}

async fn receive_transfer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<TransferTransition>>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(
        state
            .services
            .transfers
            .receive(id, transition_input(body))
            .await?,
    ))
}

async fn complete_transfer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<TransferTransition>>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(
        state
            .services
            .transfers
            .complete(id, transition_input(body))
            .await?,
    ))
}

async fn cancel_transfer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<TransferTransition>>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(
        state
            .services
            .transfers
            .cancel(id, transition_input(body))
            .await?,
    ))
}
