//! Read side of the ledger. Reporting, alerting and export layers consume
//! these; none of them mutate state.

use crate::errors::ServiceError;
use async_trait::async_trait;
use sea_orm::DatabaseConnection;

pub mod delegation_queries;
pub mod stock_queries;

pub use delegation_queries::{
    GetOpenReconciliationQuery, ListDelegatedStocksQuery, ListPendingReconciliationsQuery,
};
pub use stock_queries::{
    CachedStockLookup, GetStockRecordQuery, GetStockValueQuery, ListStockMovementsQuery,
};

#[async_trait]
pub trait Query: Send + Sync {
    type Result: Send + Sync;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError>;
}
