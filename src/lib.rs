//! Order lifecycle state machine and multi-location inventory ledger.
//!
//! The ledger owns per-(product, location) stock counters. Reservations,
//! allocation, transfers and the order state machine are built on top of
//! it and share one database connection pool.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::services::factory::ServiceContainer;

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: ServiceContainer,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, config: config::AppConfig) -> Self {
        let services = ServiceContainer::new(db.clone(), &config);
        Self {
            db,
            config,
            services,
        }
    }
}
