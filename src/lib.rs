//! stockledger
//!
//! Multi-tenant, per-warehouse inventory ledger with weighted-average
//! costing, a two-phase reservation protocol, an inter-warehouse transfer
//! state machine, and a delegated-stock sub-ledger with seller
//! reconciliation. The surrounding API, auth and reporting surfaces are
//! external consumers of the command/query interface exposed here.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod queries;
pub mod services;

use crate::cache::QueryCache;
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use std::sync::Arc;
use std::time::Duration;

/// The full command surface of the ledger, sharing one pool, one event
/// channel and one read cache.
#[derive(Clone)]
pub struct LedgerServices {
    pub stock: services::StockService,
    pub reservations: services::ReservationService,
    pub transfers: services::TransferService,
    pub delegation: services::DelegationService,
    pub reconciliation: services::ReconciliationService,
}

impl LedgerServices {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, cache: Arc<QueryCache>) -> Self {
        Self {
            stock: services::StockService::new(db.clone(), event_sender.clone(), cache.clone()),
            reservations: services::ReservationService::new(
                db.clone(),
                event_sender.clone(),
                cache.clone(),
            ),
            transfers: services::TransferService::new(
                db.clone(),
                event_sender.clone(),
                cache.clone(),
            ),
            delegation: services::DelegationService::new(
                db.clone(),
                event_sender.clone(),
                cache.clone(),
            ),
            reconciliation: services::ReconciliationService::new(db, event_sender, cache),
        }
    }

    /// Builds the service bundle with a cache sized from configuration.
    pub fn from_config(db: Arc<DbPool>, event_sender: EventSender, config: &AppConfig) -> Self {
        let ttl = (config.cache.ttl_secs > 0).then(|| Duration::from_secs(config.cache.ttl_secs));
        let cache = Arc::new(QueryCache::new(config.cache.capacity, ttl));
        Self::new(db, event_sender, cache)
    }
}

/// Initializes the global tracing subscriber. Call once at process start;
/// `RUST_LOG` overrides the given default directive.
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    let _ = fmt().with_env_filter(filter).try_init();
}
