use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per (tenant, warehouse, product) stock balance.
///
/// `available` is maintained equal to `quantity - reserved` inside the same
/// transaction as every mutation. Rows are created lazily on the first
/// inbound movement and never deleted; zero-quantity rows stay around for
/// audit and reorder history.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub warehouse_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub reserved: i32,
    pub available: i32,
    /// Weighted-average unit cost, recomputed on every receipt.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub cost_average: Decimal,
    /// Last receipt cost, kept alongside the running average.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_cost: Decimal,
    /// Optimistic lock; bumped by every committed mutation.
    pub version: i32,
    pub last_counted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Inventory value of this row at the running average cost.
    pub fn stock_value(&self) -> Decimal {
        Decimal::from(self.quantity) * self.cost_average
    }
}
