use crate::{
    cache::{stock_record_key, QueryCache},
    entities::{
        stock_movement::{self, Entity as StockMovement},
        stock_record::{self, Entity as StockRecord},
    },
    errors::ServiceError,
    queries::Query,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Point lookup of one stock record by its natural key.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetStockRecordQuery {
    pub tenant_id: Uuid,
    pub warehouse_id: Uuid,
    pub product_id: Uuid,
}

#[async_trait]
impl Query for GetStockRecordQuery {
    type Result = Option<stock_record::Model>;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        StockRecord::find()
            .filter(stock_record::Column::TenantId.eq(self.tenant_id))
            .filter(stock_record::Column::WarehouseId.eq(self.warehouse_id))
            .filter(stock_record::Column::ProductId.eq(self.product_id))
            .one(db)
            .await
            .map_err(ServiceError::db_error)
    }
}

/// Cache-fronted stock lookup for read-heavy consumers (dashboards, stock
/// alerts). Mutating services invalidate the key on commit, so a hit is at
/// worst one TTL stale after an uncoordinated external write.
#[derive(Clone)]
pub struct CachedStockLookup {
    cache: Arc<QueryCache>,
}

impl CachedStockLookup {
    pub fn new(cache: Arc<QueryCache>) -> Self {
        Self { cache }
    }

    #[instrument(skip(self, db))]
    pub async fn get(
        &self,
        db: &DatabaseConnection,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<stock_record::Model>, ServiceError> {
        let key = stock_record_key(tenant_id, warehouse_id, product_id);
        if let Some(raw) = self.cache.get(&key) {
            if let Ok(model) = serde_json::from_str::<stock_record::Model>(&raw) {
                return Ok(Some(model));
            }
            self.cache.invalidate(&key);
        }

        let record = GetStockRecordQuery {
            tenant_id,
            warehouse_id,
            product_id,
        }
        .execute(db)
        .await?;

        if let Some(model) = &record {
            if let Ok(raw) = serde_json::to_string(model) {
                self.cache.put(&key, raw);
            }
        }
        Ok(record)
    }
}

/// Paginated movement history, newest first, with optional product,
/// warehouse and date-range filters.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListStockMovementsQuery {
    pub tenant_id: Uuid,
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// 1-based page number.
    pub page: u64,
    pub limit: u64,
}

#[async_trait]
impl Query for ListStockMovementsQuery {
    type Result = (Vec<stock_movement::Model>, u64);

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        if self.page == 0 {
            return Err(ServiceError::ValidationError(
                "page number must be greater than 0".to_string(),
            ));
        }
        if self.limit == 0 || self.limit > 1000 {
            return Err(ServiceError::ValidationError(
                "limit must be between 1 and 1000".to_string(),
            ));
        }

        let mut query =
            StockMovement::find().filter(stock_movement::Column::TenantId.eq(self.tenant_id));

        if let Some(product_id) = self.product_id {
            query = query.filter(stock_movement::Column::ProductId.eq(product_id));
        }
        if let Some(warehouse_id) = self.warehouse_id {
            query = query.filter(
                sea_orm::Condition::any()
                    .add(stock_movement::Column::FromWarehouseId.eq(warehouse_id))
                    .add(stock_movement::Column::ToWarehouseId.eq(warehouse_id)),
            );
        }
        if let Some(from) = self.from {
            query = query.filter(stock_movement::Column::CreatedAt.gte(from));
        }
        if let Some(to) = self.to {
            query = query.filter(stock_movement::Column::CreatedAt.lt(to));
        }

        query = query.order_by_desc(stock_movement::Column::CreatedAt);

        let paginator = query.paginate(db, self.limit);
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let movements = paginator
            .fetch_page(self.page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((movements, total))
    }
}

/// Inventory valuation: Σ quantity × cost_average over a tenant, optionally
/// narrowed to one warehouse.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetStockValueQuery {
    pub tenant_id: Uuid,
    pub warehouse_id: Option<Uuid>,
}

#[async_trait]
impl Query for GetStockValueQuery {
    type Result = Decimal;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        let mut query =
            StockRecord::find().filter(stock_record::Column::TenantId.eq(self.tenant_id));
        if let Some(warehouse_id) = self.warehouse_id {
            query = query.filter(stock_record::Column::WarehouseId.eq(warehouse_id));
        }

        let records = query.all(db).await.map_err(ServiceError::db_error)?;
        Ok(records.iter().map(stock_record::Model::stock_value).sum())
    }
}
