use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Error body returned by the HTTP surface.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Conflict", "Unprocessable Entity")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Structured context: allowed next statuses, requested vs available, ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error(
        "Insufficient stock for product {product_id} at {}: requested {requested}, available {available}",
        .location_id.map(|id| id.to_string()).unwrap_or_else(|| "any location".to_string())
    )]
    InsufficientStock {
        product_id: Uuid,
        location_id: Option<Uuid>,
        requested: i32,
        available: i32,
    },

    #[error("Cannot transition {entity} from '{from}' to '{to}' (allowed: {})", .allowed.join(", "))]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
        allowed: Vec<String>,
    },

    #[error("Reservation not found or no longer active: {0}")]
    ReservationNotFound(Uuid),

    #[error("Reservation expired: {0}")]
    ReservationExpired(Uuid),

    #[error("Location mismatch: {0}")]
    LocationMismatch(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn db_error(error: DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }

    /// Whether the operation may succeed if the whole unit of work is retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) | Self::ReservationNotFound(_) => StatusCode::NOT_FOUND,
            Self::ReservationExpired(_) => StatusCode::GONE,
            Self::ValidationError(_) | Self::InvalidOperation(_) | Self::LocationMismatch(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidTransition { .. }
            | Self::Conflict(_)
            | Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Structured context for errors a caller can act on.
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::InsufficientStock {
                product_id,
                location_id,
                requested,
                available,
            } => Some(json!({
                "product_id": product_id,
                "location_id": location_id,
                "requested": requested,
                "available": available,
                "shortfall": (requested - available).max(0),
            })),
            Self::InvalidTransition {
                entity,
                from,
                to,
                allowed,
            } => Some(json!({
                "entity": entity,
                "current_status": from,
                "requested_status": to,
                "allowed_next_statuses": allowed,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: self.details(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
