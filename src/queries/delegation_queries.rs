use crate::{
    entities::{
        delegated_stock::{self, DelegatedStockStatus, Entity as DelegatedStock},
        reconciliation::{self, Entity as Reconciliation, ReconciliationStatus},
    },
    errors::ServiceError,
    queries::Query,
};
use async_trait::async_trait;
use sea_orm::{ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A seller's delegated stock, newest first, optionally only the rows still
/// being sold from.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListDelegatedStocksQuery {
    pub tenant_id: Uuid,
    pub server_id: Uuid,
    pub active_only: bool,
}

#[async_trait]
impl Query for ListDelegatedStocksQuery {
    type Result = Vec<delegated_stock::Model>;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        let mut query = DelegatedStock::find()
            .filter(delegated_stock::Column::TenantId.eq(self.tenant_id))
            .filter(delegated_stock::Column::ServerId.eq(self.server_id));
        if self.active_only {
            query = query
                .filter(delegated_stock::Column::Status.eq(DelegatedStockStatus::Active.as_ref()));
        }

        query
            .order_by_desc(delegated_stock::Column::DelegatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }
}

/// The seller's current session, if any: the single open or pending
/// reconciliation.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetOpenReconciliationQuery {
    pub tenant_id: Uuid,
    pub server_id: Uuid,
}

#[async_trait]
impl Query for GetOpenReconciliationQuery {
    type Result = Option<reconciliation::Model>;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        Reconciliation::find()
            .filter(reconciliation::Column::TenantId.eq(self.tenant_id))
            .filter(reconciliation::Column::ServerId.eq(self.server_id))
            .filter(
                Condition::any()
                    .add(reconciliation::Column::Status.eq(ReconciliationStatus::Open.as_ref()))
                    .add(
                        reconciliation::Column::Status.eq(ReconciliationStatus::Pending.as_ref()),
                    ),
            )
            .one(db)
            .await
            .map_err(ServiceError::db_error)
    }
}

/// Manager worklist: sessions awaiting validation, most recently submitted
/// first.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListPendingReconciliationsQuery {
    pub tenant_id: Uuid,
}

#[async_trait]
impl Query for ListPendingReconciliationsQuery {
    type Result = Vec<reconciliation::Model>;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        Reconciliation::find()
            .filter(reconciliation::Column::TenantId.eq(self.tenant_id))
            .filter(reconciliation::Column::Status.eq(ReconciliationStatus::Pending.as_ref()))
            .order_by_desc(reconciliation::Column::SessionEnd)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }
}
