use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    config::AppConfig,
    db::retry::RetryConfig,
    services::{
        allocation::AllocationResolver,
        inventory_ledger::InventoryLedger,
        orders::OrderStateMachine,
        reservations::{ReservationManager, ReservationSettings},
        transfers::TransferCoordinator,
    },
};

/// Service container holding all service instances. Every component is
/// constructed explicitly and shares the one connection pool.
#[derive(Clone)]
pub struct ServiceContainer {
    pub ledger: Arc<InventoryLedger>,
    pub reservations: Arc<ReservationManager>,
    pub allocation: Arc<AllocationResolver>,
    pub transfers: Arc<TransferCoordinator>,
    pub orders: Arc<OrderStateMachine>,
}

impl ServiceContainer {
    /// Creates a new service container with all services initialized
    pub fn new(db: Arc<DatabaseConnection>, config: &AppConfig) -> Self {
        Self::with_settings(db, config.conflict_retry(), ReservationSettings::from(config))
    }

    pub fn with_settings(
        db: Arc<DatabaseConnection>,
        retry: RetryConfig,
        reservation_settings: ReservationSettings,
    ) -> Self {
        let ledger = Arc::new(InventoryLedger::new(db.clone(), retry.clone()));
        let allocation = Arc::new(AllocationResolver::new(db.clone()));
        let reservations = Arc::new(ReservationManager::new(
            db.clone(),
            ledger.clone(),
            allocation.clone(),
            reservation_settings,
        ));
        let transfers = Arc::new(TransferCoordinator::new(
            db.clone(),
            ledger.clone(),
            retry.clone(),
        ));
        let orders = Arc::new(OrderStateMachine::new(
            db,
            ledger.clone(),
            reservations.clone(),
            allocation.clone(),
            retry,
        ));

        Self {
            ledger,
            reservations,
            allocation,
            transfers,
            orders,
        }
    }
}
