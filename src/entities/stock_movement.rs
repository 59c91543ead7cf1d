use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of movements recorded in the append-only ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementType {
    Receipt,
    Sale,
    AdjustmentIn,
    AdjustmentOut,
    TransferOut,
    TransferIn,
    Delegation,
    ReconciliationReturn,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Receipt => "receipt",
            MovementType::Sale => "sale",
            MovementType::AdjustmentIn => "adjustment_in",
            MovementType::AdjustmentOut => "adjustment_out",
            MovementType::TransferOut => "transfer_out",
            MovementType::TransferIn => "transfer_in",
            MovementType::Delegation => "delegation",
            MovementType::ReconciliationReturn => "reconciliation_return",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "receipt" => Some(MovementType::Receipt),
            "sale" => Some(MovementType::Sale),
            "adjustment_in" => Some(MovementType::AdjustmentIn),
            "adjustment_out" => Some(MovementType::AdjustmentOut),
            "transfer_out" => Some(MovementType::TransferOut),
            "transfer_in" => Some(MovementType::TransferIn),
            "delegation" => Some(MovementType::Delegation),
            "reconciliation_return" => Some(MovementType::ReconciliationReturn),
            _ => None,
        }
    }
}

/// Immutable movement fact. Once written, never updated or deleted;
/// corrections are new offsetting movements. This table is the audit trail
/// and the sole rebuild source for stock records.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    /// Set for outbound and transfer movements.
    pub from_warehouse_id: Option<Uuid>,
    /// Set for inbound and transfer movements.
    pub to_warehouse_id: Option<Uuid>,
    pub movement_type: String,
    /// Signed quantity: positive into `to_warehouse_id`, negative out of
    /// `from_warehouse_id`.
    pub quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_cost: Decimal,
    /// Originating business document id.
    pub reference: String,
    pub actor: Uuid,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn movement_type(&self) -> Option<MovementType> {
        MovementType::from_str(&self.movement_type)
    }

    /// Monetary value of this movement at its recorded unit cost.
    pub fn value(&self) -> Decimal {
        Decimal::from(self.quantity.abs()) * self.unit_cost
    }
}
