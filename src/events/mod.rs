use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub mod outbox;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Domain signals raised by the ledger, reservations, transfers and the
/// order state machine. They are persisted through the outbox and only
/// exist for committed changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        is_draft: bool,
    },
    OrderStatusChanged {
        order_id: Uuid,
        /// `order`, `payment` or `fulfillment`
        axis: String,
        old_status: String,
        new_status: String,
    },
    InventoryReserved {
        reservation_id: Uuid,
        product_id: Uuid,
        location_id: Uuid,
        quantity: i32,
        owner_type: String,
        owner_id: Uuid,
    },
    InventoryReleased {
        reservation_id: Uuid,
        product_id: Uuid,
        location_id: Uuid,
        quantity: i32,
    },
    InventoryDeducted {
        reservation_id: Uuid,
        product_id: Uuid,
        location_id: Uuid,
        quantity: i32,
    },
    InventoryRestocked {
        product_id: Uuid,
        location_id: Uuid,
        delta: i32,
        new_available: i32,
        reason: String,
        reference_id: Option<Uuid>,
    },
    OversellFlagged {
        product_id: Uuid,
        location_id: Uuid,
        requested: i32,
        available_after: i32,
    },
    ReservationExpired {
        reservation_id: Uuid,
        product_id: Uuid,
        location_id: Uuid,
        quantity: i32,
    },
    TransferStatusChanged {
        transfer_id: Uuid,
        old_status: String,
        new_status: String,
    },
    LowStock {
        product_id: Uuid,
        location_id: Uuid,
        available: i32,
        required: i32,
    },
}

impl Event {
    /// Stable name stored in `outbox_events.event_type`.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::OrderCreated { .. } => "OrderCreated",
            Event::OrderStatusChanged { .. } => "OrderStatusChanged",
            Event::InventoryReserved { .. } => "InventoryReserved",
            Event::InventoryReleased { .. } => "InventoryReleased",
            Event::InventoryDeducted { .. } => "InventoryDeducted",
            Event::InventoryRestocked { .. } => "InventoryRestocked",
            Event::OversellFlagged { .. } => "OversellFlagged",
            Event::ReservationExpired { .. } => "ReservationExpired",
            Event::TransferStatusChanged { .. } => "TransferStatusChanged",
            Event::LowStock { .. } => "LowStock",
        }
    }

    /// Aggregate the event belongs to, as `(type, id)`.
    pub fn aggregate(&self) -> (&'static str, Option<Uuid>) {
        match self {
            Event::OrderCreated { order_id, .. } | Event::OrderStatusChanged { order_id, .. } => {
                ("order", Some(*order_id))
            }
            Event::InventoryReserved { reservation_id, .. }
            | Event::InventoryReleased { reservation_id, .. }
            | Event::InventoryDeducted { reservation_id, .. }
            | Event::ReservationExpired { reservation_id, .. } => {
                ("reservation", Some(*reservation_id))
            }
            Event::InventoryRestocked { product_id, .. }
            | Event::OversellFlagged { product_id, .. }
            | Event::LowStock { product_id, .. } => ("inventory", Some(*product_id)),
            Event::TransferStatusChanged { transfer_id, .. } => ("transfer", Some(*transfer_id)),
        }
    }
}

/// Outbound hook for the notification collaborator. Delivery is
/// fire-and-forget from the core's point of view.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &Event) -> Result<(), String>;
}

/// Default sink: writes every event to the log.
#[derive(Debug, Default, Clone)]
pub struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    async fn notify(&self, event: &Event) -> Result<(), String> {
        match event {
            Event::OversellFlagged { .. } | Event::LowStock { .. } => {
                warn!(event_type = event.event_type(), "{:?}", event)
            }
            _ => info!(event_type = event.event_type(), "{:?}", event),
        }
        Ok(())
    }
}

/// Consumes the event channel and hands each event to `sink`.
/// Sink failures are logged and dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, sink: Arc<dyn NotificationSink>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        metrics::counter!("events.processed", 1, "type" => event.event_type());
        if let Err(e) = sink.notify(&event).await {
            metrics::counter!("events.sink_failures", 1);
            error!(
                event_type = event.event_type(),
                "Notification sink failed: {}", e
            );
        }
    }

    info!("Event channel closed; event processing loop stopped");
}
