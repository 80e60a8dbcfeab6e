//! Transition tables for the three order status axes and the transfer
//! lifecycle. Every status write in the crate goes through these.

use crate::entities::inventory_transfer::TransferStatus;
use crate::entities::order::{FulfillmentStatus, OrderStatus, PaymentStatus};
use crate::errors::ServiceError;

/// Which status column a change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StatusAxis {
    Order,
    Payment,
    Fulfillment,
}

/// Allowed next order statuses.
pub fn order_transitions(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match from {
        Pending => &[Confirmed, Cancelled],
        Confirmed => &[Processing, Cancelled],
        Processing => &[Shipped, Cancelled],
        Shipped => &[Delivered, Returned],
        Delivered => &[Refunded],
        Cancelled => &[Refunded],
        Returned => &[Refunded],
        Refunded => &[],
    }
}

/// Allowed next payment statuses. A refund requires captured money.
pub fn payment_transitions(from: PaymentStatus) -> &'static [PaymentStatus] {
    use PaymentStatus::*;
    match from {
        Pending => &[Authorized, Paid, PartiallyPaid, Failed],
        Authorized => &[Paid, PartiallyPaid, Failed],
        PartiallyPaid => &[Paid, Refunded, PartiallyRefunded],
        Paid => &[Refunded, PartiallyRefunded],
        Failed => &[Pending, Authorized],
        PartiallyRefunded => &[],
        Refunded => &[],
    }
}

pub fn transfer_transitions(from: TransferStatus) -> &'static [TransferStatus] {
    use TransferStatus::*;
    match from {
        Pending => &[Shipped, Cancelled],
        Shipped => &[Received, Cancelled],
        Received => &[Completed],
        Completed | Cancelled => &[],
    }
}

fn check<S: Copy + PartialEq + std::fmt::Display>(
    entity: &str,
    from: S,
    to: S,
    allowed: &[S],
) -> Result<(), ServiceError> {
    if allowed.contains(&to) {
        Ok(())
    } else {
        Err(ServiceError::InvalidTransition {
            entity: entity.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        })
    }
}

pub fn validate_order_transition(from: OrderStatus, to: OrderStatus) -> Result<(), ServiceError> {
    check("order", from, to, order_transitions(from))
}

pub fn validate_payment_transition(
    from: PaymentStatus,
    to: PaymentStatus,
) -> Result<(), ServiceError> {
    check("payment", from, to, payment_transitions(from))
}

pub fn validate_transfer_transition(
    from: TransferStatus,
    to: TransferStatus,
) -> Result<(), ServiceError> {
    check("transfer", from, to, transfer_transitions(from))
}

/// Fulfillment status an order lands in when it moves to `to`.
pub fn fulfillment_after(to: OrderStatus, current: FulfillmentStatus) -> FulfillmentStatus {
    match to {
        OrderStatus::Shipped | OrderStatus::Delivered => FulfillmentStatus::Fulfilled,
        OrderStatus::Returned => FulfillmentStatus::Returned,
        OrderStatus::Cancelled => match current {
            FulfillmentStatus::Partial => FulfillmentStatus::Partial,
            _ => FulfillmentStatus::Cancelled,
        },
        OrderStatus::Pending
        | OrderStatus::Confirmed
        | OrderStatus::Processing
        | OrderStatus::Refunded => current,
    }
}

fn fulfillment_allowed(order: OrderStatus) -> &'static [FulfillmentStatus] {
    use FulfillmentStatus::*;
    match order {
        OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Processing => {
            &[Unfulfilled, Partial]
        }
        OrderStatus::Shipped | OrderStatus::Delivered => &[Fulfilled],
        OrderStatus::Returned => &[Returned],
        OrderStatus::Cancelled => &[Cancelled, Partial],
        OrderStatus::Refunded => &[Cancelled, Partial, Fulfilled, Returned],
    }
}

/// Rejects status pairs that must never be persisted, such as a
/// delivered order that is still unfulfilled.
pub fn check_consistency(
    order: OrderStatus,
    fulfillment: FulfillmentStatus,
) -> Result<(), ServiceError> {
    if fulfillment_allowed(order).contains(&fulfillment) {
        Ok(())
    } else {
        Err(ServiceError::InternalError(format!(
            "inconsistent order state: order_status={} fulfillment_status={}",
            order, fulfillment
        )))
    }
}
