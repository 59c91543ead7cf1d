use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Delegated-stock lifecycle: active while the seller is selling,
/// reconciling once a reconciliation has been submitted, settled when the
/// manager validates it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum DelegatedStockStatus {
    Active,
    Reconciling,
    Settled,
}

/// Stock delegated to a front-line seller, decoupled from warehouse stock at
/// delegation time. The four buckets must always sum back to
/// `quantity_delegated`; `unit_cost` is frozen from the warehouse average at
/// delegation and never recalculated.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delegated_stocks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub server_id: Uuid,
    pub product_id: Uuid,
    /// Originating warehouse; unsold units return here on settlement.
    pub warehouse_id: Uuid,
    pub batch_reference: String,
    pub delegated_by: Uuid,
    pub quantity_delegated: i32,
    pub quantity_remaining: i32,
    pub quantity_sold: i32,
    pub quantity_returned: i32,
    pub quantity_lost: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_sales_amount: Decimal,
    pub status: String,
    pub version: i32,
    pub delegated_at: DateTime<Utc>,
    pub reconciled_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::delegated_stock_movement::Entity")]
    Movements,
}

impl Related<super::delegated_stock_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Movements.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn status(&self) -> Option<DelegatedStockStatus> {
        self.status.parse().ok()
    }

    pub fn is_active(&self) -> bool {
        self.status == DelegatedStockStatus::Active.as_ref()
    }

    /// `delegated == remaining + sold + returned + lost` must hold after
    /// every mutation.
    pub fn buckets_balance(&self) -> bool {
        self.quantity_delegated
            == self.quantity_remaining
                + self.quantity_sold
                + self.quantity_returned
                + self.quantity_lost
    }

    /// Cash the seller is expected to hand over for this row.
    pub fn expected_amount(&self) -> Decimal {
        Decimal::from(self.quantity_sold) * self.unit_price
    }

    pub fn delegated_value(&self) -> Decimal {
        Decimal::from(self.quantity_delegated) * self.unit_price
    }

    pub fn returned_value(&self) -> Decimal {
        Decimal::from(self.quantity_returned) * self.unit_price
    }

    pub fn losses_value(&self) -> Decimal {
        Decimal::from(self.quantity_lost) * self.unit_price
    }

    pub fn gross_profit(&self) -> Decimal {
        (self.unit_price - self.unit_cost) * Decimal::from(self.quantity_sold)
    }
}
