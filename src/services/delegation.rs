//! Delegated-stock sub-ledger.
//!
//! Delegation debits warehouse stock and opens an independent per-seller
//! row whose unit cost is frozen at that instant. From then on the row only
//! moves between its four buckets (remaining, sold, returned, lost), which
//! must always sum back to the delegated quantity — a violated sum is a
//! programmer error, not a user error.

use crate::{
    cache::{stock_record_key, QueryCache},
    db::DbPool,
    entities::{
        delegated_stock::{self, Entity as DelegatedStock, DelegatedStockStatus},
        delegated_stock_movement::{self, DelegatedMovementType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock::{consume_stock, ConsumptionKind},
    services::with_conflict_retry,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DelegationItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DelegateStockCommand {
    pub tenant_id: Uuid,
    pub server_id: Uuid,
    pub warehouse_id: Uuid,
    pub delegated_by: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub batch_reference: String,
    #[validate(length(min = 1))]
    pub items: Vec<DelegationItem>,
    pub notes: Option<String>,
}

/// New bucket values for one delegated row; `apply` wraps the version check.
struct BucketMove {
    remaining: i32,
    sold: i32,
    returned: i32,
    lost: i32,
    total_sales_amount: Decimal,
}

fn check_buckets(row: &delegated_stock::Model, buckets: &BucketMove) -> Result<(), ServiceError> {
    let sum = buckets.remaining + buckets.sold + buckets.returned + buckets.lost;
    if sum != row.quantity_delegated || buckets.remaining < 0 {
        return Err(ServiceError::InvariantViolation(format!(
            "delegated stock {} buckets do not sum: delegated {}, remaining {}, sold {}, returned {}, lost {}",
            row.id, row.quantity_delegated, buckets.remaining, buckets.sold, buckets.returned, buckets.lost
        )));
    }
    Ok(())
}

/// Version-checked bucket update. Status/timestamps move separately through
/// the reconciliation service.
async fn cas_update_buckets<C: ConnectionTrait>(
    conn: &C,
    row: &delegated_stock::Model,
    buckets: &BucketMove,
) -> Result<delegated_stock::Model, ServiceError> {
    check_buckets(row, buckets)?;

    let result = DelegatedStock::update_many()
        .col_expr(
            delegated_stock::Column::QuantityRemaining,
            Expr::value(buckets.remaining),
        )
        .col_expr(
            delegated_stock::Column::QuantitySold,
            Expr::value(buckets.sold),
        )
        .col_expr(
            delegated_stock::Column::QuantityReturned,
            Expr::value(buckets.returned),
        )
        .col_expr(
            delegated_stock::Column::QuantityLost,
            Expr::value(buckets.lost),
        )
        .col_expr(
            delegated_stock::Column::TotalSalesAmount,
            Expr::value(buckets.total_sales_amount),
        )
        .col_expr(
            delegated_stock::Column::Version,
            Expr::value(row.version + 1),
        )
        .filter(delegated_stock::Column::Id.eq(row.id))
        .filter(delegated_stock::Column::Version.eq(row.version))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrencyConflict(format!(
            "delegated stock {} moved past version {}",
            row.id, row.version
        )));
    }

    Ok(delegated_stock::Model {
        quantity_remaining: buckets.remaining,
        quantity_sold: buckets.sold,
        quantity_returned: buckets.returned,
        quantity_lost: buckets.lost,
        total_sales_amount: buckets.total_sales_amount,
        version: row.version + 1,
        ..row.clone()
    })
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn insert_delegated_movement<C: ConnectionTrait>(
    conn: &C,
    row: &delegated_stock::Model,
    movement_type: DelegatedMovementType,
    quantity: i32,
    quantity_before: i32,
    quantity_after: i32,
    total_amount: Decimal,
    reference: Option<String>,
    performed_by: Uuid,
    notes: Option<String>,
) -> Result<delegated_stock_movement::Model, ServiceError> {
    let movement = delegated_stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(row.tenant_id),
        delegated_stock_id: Set(row.id),
        server_id: Set(row.server_id),
        product_id: Set(row.product_id),
        movement_type: Set(movement_type.as_str().to_string()),
        quantity: Set(quantity),
        quantity_before: Set(quantity_before),
        quantity_after: Set(quantity_after),
        unit_price: Set(row.unit_price),
        total_amount: Set(total_amount),
        reference: Set(reference),
        performed_by: Set(performed_by),
        notes: Set(notes),
        created_at: Set(Utc::now()),
    };
    movement.insert(conn).await.map_err(ServiceError::db_error)
}

pub(crate) async fn load_active_row<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    delegated_stock_id: Uuid,
) -> Result<delegated_stock::Model, ServiceError> {
    let row = DelegatedStock::find_by_id(delegated_stock_id)
        .filter(delegated_stock::Column::TenantId.eq(tenant_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("delegated stock {delegated_stock_id} not found"))
        })?;

    if !row.is_active() {
        return Err(ServiceError::InvalidStateTransition {
            entity: "delegated_stock",
            id: row.id,
            from: row.status.clone(),
            action: "mutate",
        });
    }
    Ok(row)
}

/// Service managing per-seller delegated stock.
#[derive(Clone)]
pub struct DelegationService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    cache: Arc<QueryCache>,
    retry_attempts: u32,
}

impl DelegationService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, cache: Arc<QueryCache>) -> Self {
        Self {
            db,
            event_sender,
            cache,
            retry_attempts: super::DEFAULT_CONFLICT_RETRY_ATTEMPTS,
        }
    }

    /// Delegates stock to a seller. All-or-nothing across items: every item
    /// debits the warehouse and opens a delegated row with the warehouse's
    /// average cost frozen in, or nothing happens.
    #[instrument(skip(self, command))]
    pub async fn delegate(
        &self,
        command: DelegateStockCommand,
    ) -> Result<Vec<delegated_stock::Model>, ServiceError> {
        command.validate()?;
        for item in &command.items {
            if item.quantity <= 0 {
                return Err(ServiceError::InvalidQuantity(format!(
                    "delegation quantity for product {} must be positive, got {}",
                    item.product_id, item.quantity
                )));
            }
            if item.unit_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "unit price for product {} must not be negative",
                    item.product_id
                )));
            }
        }

        let command_ref = &command;
        let rows = with_conflict_retry(self.retry_attempts, || async move {
            let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

            let mut rows = Vec::with_capacity(command_ref.items.len());
            for item in &command_ref.items {
                let record = consume_stock(
                    &txn,
                    command_ref.tenant_id,
                    command_ref.warehouse_id,
                    item.product_id,
                    item.quantity,
                    &command_ref.batch_reference,
                    command_ref.delegated_by,
                    ConsumptionKind::Delegation,
                    0,
                )
                .await?;

                let row = delegated_stock::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    tenant_id: Set(command_ref.tenant_id),
                    server_id: Set(command_ref.server_id),
                    product_id: Set(item.product_id),
                    warehouse_id: Set(command_ref.warehouse_id),
                    batch_reference: Set(command_ref.batch_reference.clone()),
                    delegated_by: Set(command_ref.delegated_by),
                    quantity_delegated: Set(item.quantity),
                    quantity_remaining: Set(item.quantity),
                    quantity_sold: Set(0),
                    quantity_returned: Set(0),
                    quantity_lost: Set(0),
                    unit_price: Set(item.unit_price),
                    unit_cost: Set(record.cost_average),
                    total_sales_amount: Set(Decimal::ZERO),
                    status: Set(DelegatedStockStatus::Active.as_ref().to_string()),
                    version: Set(0),
                    delegated_at: Set(Utc::now()),
                    reconciled_at: Set(None),
                    settled_at: Set(None),
                    notes: Set(command_ref.notes.clone()),
                };
                let row = row.insert(&txn).await.map_err(ServiceError::db_error)?;

                insert_delegated_movement(
                    &txn,
                    &row,
                    DelegatedMovementType::Delegation,
                    item.quantity,
                    0,
                    item.quantity,
                    Decimal::from(item.quantity) * item.unit_price,
                    Some(command_ref.batch_reference.clone()),
                    command_ref.delegated_by,
                    None,
                )
                .await?;

                rows.push(row);
            }

            txn.commit().await.map_err(ServiceError::db_error)?;
            Ok(rows)
        })
        .await?;

        for row in &rows {
            self.cache.invalidate(&stock_record_key(
                command.tenant_id,
                command.warehouse_id,
                row.product_id,
            ));
        }

        info!(
            server_id = %command.server_id,
            batch_reference = %command.batch_reference,
            item_count = rows.len(),
            "stock delegated"
        );

        self.event_sender
            .send(Event::StockDelegated {
                tenant_id: command.tenant_id,
                server_id: command.server_id,
                batch_reference: command.batch_reference.clone(),
                item_count: rows.len(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(rows)
    }

    /// Records a sale from delegated stock at the row's delegated price
    /// (which may diverge from the warehouse price).
    #[instrument(skip(self))]
    pub async fn record_sale(
        &self,
        tenant_id: Uuid,
        delegated_stock_id: Uuid,
        quantity: i32,
        reference: Option<&str>,
        actor: Uuid,
    ) -> Result<delegated_stock::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "sale quantity must be positive, got {quantity}"
            )));
        }

        let row = with_conflict_retry(self.retry_attempts, || async move {
            let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

            let row = load_active_row(&txn, tenant_id, delegated_stock_id).await?;
            if row.quantity_remaining < quantity {
                return Err(ServiceError::InsufficientQuantity {
                    delegated_stock_id,
                    remaining: row.quantity_remaining,
                    requested: quantity,
                });
            }

            let amount = Decimal::from(quantity) * row.unit_price;
            let updated = cas_update_buckets(
                &txn,
                &row,
                &BucketMove {
                    remaining: row.quantity_remaining - quantity,
                    sold: row.quantity_sold + quantity,
                    returned: row.quantity_returned,
                    lost: row.quantity_lost,
                    total_sales_amount: row.total_sales_amount + amount,
                },
            )
            .await?;

            insert_delegated_movement(
                &txn,
                &updated,
                DelegatedMovementType::Sale,
                -quantity,
                row.quantity_remaining,
                updated.quantity_remaining,
                amount,
                reference.map(str::to_string),
                actor,
                None,
            )
            .await?;

            txn.commit().await.map_err(ServiceError::db_error)?;
            Ok(updated)
        })
        .await?;

        info!(
            delegated_stock_id = %row.id,
            quantity,
            remaining = row.quantity_remaining,
            "delegated sale recorded"
        );

        self.event_sender
            .send(Event::DelegatedSaleRecorded {
                delegated_stock_id: row.id,
                quantity,
                amount: Decimal::from(quantity) * row.unit_price,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(row)
    }

    /// Returns unsold units to the manager mid-session. Bucket move plus
    /// sub-ledger movement only; the warehouse credit happens at
    /// reconciliation.
    #[instrument(skip(self))]
    pub async fn return_stock(
        &self,
        tenant_id: Uuid,
        delegated_stock_id: Uuid,
        quantity: i32,
        notes: Option<&str>,
        actor: Uuid,
    ) -> Result<delegated_stock::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "return quantity must be positive, got {quantity}"
            )));
        }

        let row = with_conflict_retry(self.retry_attempts, || async move {
            let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

            let row = load_active_row(&txn, tenant_id, delegated_stock_id).await?;
            if row.quantity_remaining < quantity {
                return Err(ServiceError::InsufficientQuantity {
                    delegated_stock_id,
                    remaining: row.quantity_remaining,
                    requested: quantity,
                });
            }

            let updated = cas_update_buckets(
                &txn,
                &row,
                &BucketMove {
                    remaining: row.quantity_remaining - quantity,
                    sold: row.quantity_sold,
                    returned: row.quantity_returned + quantity,
                    lost: row.quantity_lost,
                    total_sales_amount: row.total_sales_amount,
                },
            )
            .await?;

            insert_delegated_movement(
                &txn,
                &updated,
                DelegatedMovementType::Return,
                -quantity,
                row.quantity_remaining,
                updated.quantity_remaining,
                Decimal::from(quantity) * row.unit_price,
                None,
                actor,
                notes.map(str::to_string),
            )
            .await?;

            txn.commit().await.map_err(ServiceError::db_error)?;
            Ok(updated)
        })
        .await?;

        info!(
            delegated_stock_id = %row.id,
            quantity,
            "delegated stock returned"
        );

        self.event_sender
            .send(Event::DelegatedStockReturned {
                delegated_stock_id: row.id,
                quantity,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(row)
    }

    /// Declares units lost (breakage, theft). They move to the lost bucket
    /// and never come back.
    #[instrument(skip(self))]
    pub async fn declare_loss(
        &self,
        tenant_id: Uuid,
        delegated_stock_id: Uuid,
        quantity: i32,
        reason: &str,
        actor: Uuid,
    ) -> Result<delegated_stock::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "loss quantity must be positive, got {quantity}"
            )));
        }

        let row = with_conflict_retry(self.retry_attempts, || async move {
            let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

            let row = load_active_row(&txn, tenant_id, delegated_stock_id).await?;
            if row.quantity_remaining < quantity {
                return Err(ServiceError::InsufficientQuantity {
                    delegated_stock_id,
                    remaining: row.quantity_remaining,
                    requested: quantity,
                });
            }

            let updated = cas_update_buckets(
                &txn,
                &row,
                &BucketMove {
                    remaining: row.quantity_remaining - quantity,
                    sold: row.quantity_sold,
                    returned: row.quantity_returned,
                    lost: row.quantity_lost + quantity,
                    total_sales_amount: row.total_sales_amount,
                },
            )
            .await?;

            insert_delegated_movement(
                &txn,
                &updated,
                DelegatedMovementType::Loss,
                -quantity,
                row.quantity_remaining,
                updated.quantity_remaining,
                Decimal::from(quantity) * row.unit_price,
                None,
                actor,
                Some(reason.to_string()),
            )
            .await?;

            txn.commit().await.map_err(ServiceError::db_error)?;
            Ok(updated)
        })
        .await?;

        info!(
            delegated_stock_id = %row.id,
            quantity,
            reason,
            "delegated loss declared"
        );

        self.event_sender
            .send(Event::DelegatedLossDeclared {
                delegated_stock_id: row.id,
                quantity,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(row)
    }
}
