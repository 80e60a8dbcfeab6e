pub mod allocation_rule;
pub mod inventory_adjustment;
pub mod inventory_location;
pub mod inventory_record;
pub mod inventory_reservation;
pub mod inventory_transfer;
pub mod order;
pub mod order_item;
pub mod outbox_event;
