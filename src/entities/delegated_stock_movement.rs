use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of movements in the delegated-stock sub-ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelegatedMovementType {
    Delegation,
    Sale,
    Return,
    Loss,
    ReconciliationReturn,
}

impl DelegatedMovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DelegatedMovementType::Delegation => "delegation",
            DelegatedMovementType::Sale => "sale",
            DelegatedMovementType::Return => "return",
            DelegatedMovementType::Loss => "loss",
            DelegatedMovementType::ReconciliationReturn => "reconciliation_return",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "delegation" => Some(DelegatedMovementType::Delegation),
            "sale" => Some(DelegatedMovementType::Sale),
            "return" => Some(DelegatedMovementType::Return),
            "loss" => Some(DelegatedMovementType::Loss),
            "reconciliation_return" => Some(DelegatedMovementType::ReconciliationReturn),
            _ => None,
        }
    }
}

/// Append-only audit trail of the delegated-stock sub-ledger, one row per
/// bucket move with before/after snapshots of `quantity_remaining`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delegated_stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub delegated_stock_id: Uuid,
    pub server_id: Uuid,
    pub product_id: Uuid,
    pub movement_type: String,
    /// Signed: positive on delegation, negative when remaining shrinks.
    pub quantity: i32,
    pub quantity_before: i32,
    pub quantity_after: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_amount: Decimal,
    pub reference: Option<String>,
    pub performed_by: Uuid,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::delegated_stock::Entity",
        from = "Column::DelegatedStockId",
        to = "super::delegated_stock::Column::Id"
    )]
    DelegatedStock,
}

impl Related<super::delegated_stock::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DelegatedStock.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
