//! Shared test harness: in-memory sqlite with the full schema applied, a
//! drained event channel, and the service bundle under test.
#![allow(dead_code)]

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use std::time::Duration;
use stockledger::cache::QueryCache;
use stockledger::events;
use stockledger::migrator::Migrator;
use stockledger::LedgerServices;
use uuid::Uuid;

pub const TENANT: Uuid = Uuid::from_u128(0xA1);
pub const WAREHOUSE_MAIN: Uuid = Uuid::from_u128(0xB1);
pub const WAREHOUSE_RETAIL: Uuid = Uuid::from_u128(0xB2);
pub const PRODUCT_A: Uuid = Uuid::from_u128(0xC1);
pub const PRODUCT_B: Uuid = Uuid::from_u128(0xC2);
pub const MANAGER: Uuid = Uuid::from_u128(0xD1);
pub const SELLER: Uuid = Uuid::from_u128(0xD2);

pub async fn setup() -> (Arc<DatabaseConnection>, LedgerServices) {
    let (db, services, _cache) = setup_with_cache().await;
    (db, services)
}

pub async fn setup_with_cache() -> (Arc<DatabaseConnection>, LedgerServices, Arc<QueryCache>) {
    let mut options = ConnectOptions::new("sqlite::memory:");
    // One connection: an in-memory sqlite database exists per connection.
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.expect("connect sqlite");
    Migrator::up(&db, None).await.expect("run migrations");

    let db = Arc::new(db);
    let (sender, rx) = events::channel(256);
    tokio::spawn(events::process_events(rx));

    let cache = Arc::new(QueryCache::new(1024, Some(Duration::from_secs(60))));
    let services = LedgerServices::new(db.clone(), sender, cache.clone());
    (db, services, cache)
}
