use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Reconciliation state machine: `open → pending → validated | disputed`.
/// At most one open or pending session exists per (tenant, server).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ReconciliationStatus {
    Open,
    Pending,
    Validated,
    Disputed,
}

/// Settlement session between a seller and a manager: reconciles the
/// seller's reported cash against delegated-stock consumption and returns
/// unsold quantity to warehouse stock on validation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reconciliations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub server_id: Uuid,
    pub manager_id: Option<Uuid>,
    pub reference: String,
    pub session_start: DateTime<Utc>,
    pub session_end: Option<DateTime<Utc>>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_delegated_value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_sales: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_returned_value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_losses_value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub cash_expected: Decimal,
    /// Seller's self-reported figure, untrusted until validation.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub cash_collected: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub cash_difference: Decimal,
    pub status: String,
    pub server_notes: Option<String>,
    pub manager_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn status(&self) -> Option<ReconciliationStatus> {
        self.status.parse().ok()
    }

    /// Whether the cash gap stays inside the tenant's tolerance.
    pub fn is_acceptable_difference(&self, threshold: Decimal) -> bool {
        self.cash_difference.abs() <= threshold
    }
}
