use crate::config::AppConfig;
use crate::entities::outbox_event::{self, OutboxStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, warn};
use uuid::Uuid;

const BASE_BACKOFF_SECS: i64 = 2;
const MAX_BACKOFF_SECS: i64 = 15 * 60;
/// Poll intervals a claim may stay in `Processing` before it is handed back.
const STALE_CLAIM_POLLS: u32 = 120;

/// Tuning for the delivery worker.
#[derive(Debug, Clone)]
pub struct OutboxWorkerConfig {
    pub batch_size: u64,
    pub poll_interval: Duration,
    pub max_attempts: i32,
    /// A row claimed longer ago than this is returned to `Pending`; the
    /// worker that claimed it is assumed to have died mid-send.
    pub stale_after: Duration,
}

impl Default for OutboxWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            poll_interval: Duration::from_millis(500),
            max_attempts: 8,
            stale_after: Duration::from_millis(500) * STALE_CLAIM_POLLS,
        }
    }
}

impl From<&AppConfig> for OutboxWorkerConfig {
    fn from(cfg: &AppConfig) -> Self {
        let poll_interval = cfg.outbox_poll_interval();
        Self {
            poll_interval,
            max_attempts: cfg.outbox_max_attempts,
            stale_after: poll_interval * STALE_CLAIM_POLLS,
            ..Self::default()
        }
    }
}

/// Counts from one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    pub reclaimed: u64,
    pub delivered: usize,
    pub rescheduled: usize,
    pub failed: usize,
}

/// Enqueue a domain event into the outbox table. Call it with the same
/// connection or transaction as the write the event describes.
pub async fn enqueue<C: ConnectionTrait>(conn: &C, event: &Event) -> Result<(), ServiceError> {
    let (aggregate_type, aggregate_id) = event.aggregate();
    let payload = serde_json::to_value(event)
        .map_err(|e| ServiceError::EventError(format!("failed to serialize event: {}", e)))?;
    let now = Utc::now();

    let row = outbox_event::ActiveModel {
        id: Set(Uuid::new_v4()),
        aggregate_type: Set(aggregate_type.to_string()),
        aggregate_id: Set(aggregate_id),
        event_type: Set(event.event_type().to_string()),
        payload: Set(payload),
        status: Set(OutboxStatus::Pending),
        attempts: Set(0),
        available_at: Set(now),
        created_at: Set(now),
        processed_at: Set(None),
        error_message: Set(None),
    };
    row.insert(conn).await.map_err(ServiceError::db_error)?;

    debug!(
        event_type = event.event_type(),
        aggregate_type, "enqueued outbox event"
    );
    Ok(())
}

/// Background worker that polls pending rows and dispatches them via the
/// in-process EventSender.
pub fn start_worker(
    db: Arc<DatabaseConnection>,
    sender: EventSender,
    config: OutboxWorkerConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = drain_once(&db, &sender, &config).await {
                error!("outbox worker error: {}", e);
            }
            sleep(config.poll_interval).await;
        }
    })
}

/// Returns rows stuck in `Processing` for longer than `stale_after` to
/// `Pending`. A claim stamps `available_at`, so that column doubles as the
/// claim time. Delivery stays at-least-once.
pub async fn reclaim_stale(
    db: &DatabaseConnection,
    stale_after: Duration,
) -> Result<u64, ServiceError> {
    let stale_after = chrono::Duration::from_std(stale_after)
        .map_err(|e| ServiceError::InternalError(format!("invalid outbox stale window: {}", e)))?;
    let cutoff = Utc::now() - stale_after;
    let result = outbox_event::Entity::update_many()
        .col_expr(outbox_event::Column::Status, Expr::value(OutboxStatus::Pending))
        .filter(outbox_event::Column::Status.eq(OutboxStatus::Processing))
        .filter(outbox_event::Column::AvailableAt.lt(cutoff))
        .exec(db)
        .await
        .map_err(ServiceError::db_error)?;
    if result.rows_affected > 0 {
        warn!(rows = result.rows_affected, "reclaimed stale outbox claims");
        metrics::counter!("outbox.reclaimed", result.rows_affected);
    }
    Ok(result.rows_affected)
}

/// Claims and dispatches one batch of due events.
pub async fn drain_once(
    db: &DatabaseConnection,
    sender: &EventSender,
    config: &OutboxWorkerConfig,
) -> Result<DrainStats, ServiceError> {
    let reclaimed = reclaim_stale(db, config.stale_after).await?;
    let now = Utc::now();
    let due = outbox_event::Entity::find()
        .filter(outbox_event::Column::Status.eq(OutboxStatus::Pending))
        .filter(outbox_event::Column::AvailableAt.lte(now))
        .order_by_asc(outbox_event::Column::CreatedAt)
        .limit(config.batch_size)
        .all(db)
        .await
        .map_err(ServiceError::db_error)?;

    let mut stats = DrainStats {
        reclaimed,
        ..DrainStats::default()
    };
    for row in due {
        // Claim the row so a second worker skips it
        let claimed = outbox_event::Entity::update_many()
            .col_expr(
                outbox_event::Column::Status,
                Expr::value(OutboxStatus::Processing),
            )
            .col_expr(
                outbox_event::Column::Attempts,
                Expr::col(outbox_event::Column::Attempts).add(1),
            )
            .col_expr(outbox_event::Column::AvailableAt, Expr::value(Utc::now()))
            .filter(outbox_event::Column::Id.eq(row.id))
            .filter(outbox_event::Column::Status.eq(OutboxStatus::Pending))
            .exec(db)
            .await
            .map_err(ServiceError::db_error)?;
        if claimed.rows_affected == 0 {
            continue;
        }
        let attempts = row.attempts + 1;

        let event: Event = match serde_json::from_value(row.payload.clone()) {
            Ok(event) => event,
            Err(e) => {
                warn!("outbox {} has an unreadable payload: {}", row.id, e);
                mark(db, row.id, OutboxStatus::Failed, Some(format!("bad payload: {}", e)))
                    .await;
                stats.failed += 1;
                continue;
            }
        };

        match sender.send(event).await {
            Ok(()) => {
                let done = outbox_event::Entity::update_many()
                    .col_expr(
                        outbox_event::Column::Status,
                        Expr::value(OutboxStatus::Delivered),
                    )
                    .col_expr(
                        outbox_event::Column::ProcessedAt,
                        Expr::value(Some(Utc::now())),
                    )
                    .col_expr(
                        outbox_event::Column::ErrorMessage,
                        Expr::value(Option::<String>::None),
                    )
                    .filter(outbox_event::Column::Id.eq(row.id))
                    .exec(db)
                    .await;
                if let Err(e) = done {
                    warn!("failed updating outbox {}: {}", row.id, e);
                }
                metrics::counter!("outbox.delivered", 1);
                stats.delivered += 1;
            }
            Err(send_error) if attempts < config.max_attempts => {
                let backoff = retry_delay_secs(attempts);
                let retry_at = Utc::now() + chrono::Duration::seconds(backoff);
                let rescheduled = outbox_event::Entity::update_many()
                    .col_expr(
                        outbox_event::Column::Status,
                        Expr::value(OutboxStatus::Pending),
                    )
                    .col_expr(outbox_event::Column::AvailableAt, Expr::value(retry_at))
                    .col_expr(
                        outbox_event::Column::ErrorMessage,
                        Expr::value(Some(send_error)),
                    )
                    .filter(outbox_event::Column::Id.eq(row.id))
                    .exec(db)
                    .await;
                if let Err(e) = rescheduled {
                    warn!("failed scheduling retry for outbox {}: {}", row.id, e);
                }
                metrics::counter!("outbox.rescheduled", 1);
                stats.rescheduled += 1;
            }
            Err(send_error) => {
                warn!(
                    "outbox {} exhausted {} attempts: {}",
                    row.id, attempts, send_error
                );
                mark(
                    db,
                    row.id,
                    OutboxStatus::Failed,
                    Some("max attempts exceeded".to_string()),
                )
                .await;
                metrics::counter!("outbox.failed", 1);
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}

async fn mark(db: &DatabaseConnection, id: Uuid, status: OutboxStatus, message: Option<String>) {
    let result = outbox_event::Entity::update_many()
        .col_expr(outbox_event::Column::Status, Expr::value(status))
        .col_expr(outbox_event::Column::ErrorMessage, Expr::value(message))
        .filter(outbox_event::Column::Id.eq(id))
        .exec(db)
        .await;
    if let Err(e) = result {
        warn!("failed marking outbox {} {}: {}", id, status, e);
    }
}

/// Exponential backoff: 2s, 4s, 8s, ... capped at fifteen minutes.
fn retry_delay_secs(attempts: i32) -> i64 {
    let exp = attempts.clamp(1, 20) as u32;
    BASE_BACKOFF_SECS.saturating_pow(exp).min(MAX_BACKOFF_SECS)
}
