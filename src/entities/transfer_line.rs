use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One product line of a transfer.
///
/// `quantity_approved` may be reduced below the requested quantity at
/// approval; `quantity_received` may be short of what was sent (shrinkage in
/// transit) — the difference is a documented variance, not a blocker.
/// `unit_cost` is the source warehouse's average cost frozen at execution,
/// preserving cost continuity into the destination.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transfer_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub transfer_id: Uuid,
    pub product_id: Uuid,
    pub quantity_requested: i32,
    pub quantity_approved: Option<i32>,
    pub quantity_received: Option<i32>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_cost: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transfer::Entity",
        from = "Column::TransferId",
        to = "super::transfer::Column::Id"
    )]
    Transfer,
}

impl Related<super::transfer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transfer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Units lost between execution and receipt, once both are known.
    pub fn variance(&self) -> Option<i32> {
        match (self.quantity_approved, self.quantity_received) {
            (Some(sent), Some(received)) => Some(sent - received),
            _ => None,
        }
    }
}
