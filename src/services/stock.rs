//! Stock record store and costing engine.
//!
//! All mutations follow the same shape: read the record inside a
//! transaction, validate the business rule, then compare-and-swap on the
//! `version` column and append the movement in that same transaction. A CAS
//! miss surfaces as `ConcurrencyConflict` and the whole operation is re-run
//! by the retry wrapper against fresh state.

use crate::{
    cache::{stock_record_key, QueryCache},
    db::DbPool,
    entities::{
        stock_movement::{self, Entity as StockMovement, MovementType},
        stock_record::{self, Entity as StockRecord},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::with_conflict_retry,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::error::SqlErr;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// What a consumption is for; selects the movement type written to the
/// ledger. The attached unit cost is always the record's current average.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumptionKind {
    Sale,
    TransferOut,
    Delegation,
}

impl ConsumptionKind {
    pub fn movement_type(self) -> MovementType {
        match self {
            ConsumptionKind::Sale => MovementType::Sale,
            ConsumptionKind::TransferOut => MovementType::TransferOut,
            ConsumptionKind::Delegation => MovementType::Delegation,
        }
    }
}

/// What a receipt is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptKind {
    Receipt,
    TransferIn,
    ReconciliationReturn,
}

impl ReceiptKind {
    pub fn movement_type(self) -> MovementType {
        match self {
            ReceiptKind::Receipt => MovementType::Receipt,
            ReceiptKind::TransferIn => MovementType::TransferIn,
            ReceiptKind::ReconciliationReturn => MovementType::ReconciliationReturn,
        }
    }

    /// Reconciliation returns share one reference across several delegated
    /// batches of the same product; their replay protection lives in the
    /// reconciliation state machine instead of the movement ledger.
    fn checks_duplicates(self) -> bool {
        !matches!(self, ReceiptKind::ReconciliationReturn)
    }
}

/// Weighted-average unit cost after receiving `incoming_qty` at
/// `incoming_cost` on top of `on_hand` units carried at `current_average`.
/// Rounded to 2 decimal places. With nothing on hand the incoming cost wins
/// outright.
pub fn weighted_average_cost(
    on_hand: i32,
    current_average: Decimal,
    incoming_qty: i32,
    incoming_cost: Decimal,
) -> Decimal {
    if on_hand <= 0 {
        return incoming_cost.round_dp(2);
    }
    let on_hand = Decimal::from(on_hand);
    let incoming = Decimal::from(incoming_qty);
    ((on_hand * current_average + incoming * incoming_cost) / (on_hand + incoming)).round_dp(2)
}

pub(crate) async fn find_record<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    warehouse_id: Uuid,
    product_id: Uuid,
) -> Result<Option<stock_record::Model>, ServiceError> {
    StockRecord::find()
        .filter(stock_record::Column::TenantId.eq(tenant_id))
        .filter(stock_record::Column::WarehouseId.eq(warehouse_id))
        .filter(stock_record::Column::ProductId.eq(product_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Stock records are created lazily on the first inbound movement. A lost
/// create race (unique key on the tenant/warehouse/product triple) is
/// reported as a conflict so the retry wrapper re-reads the winner's row.
pub(crate) async fn find_or_create_record<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    warehouse_id: Uuid,
    product_id: Uuid,
) -> Result<stock_record::Model, ServiceError> {
    if let Some(record) = find_record(conn, tenant_id, warehouse_id, product_id).await? {
        return Ok(record);
    }

    let now = Utc::now();
    let fresh = stock_record::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(tenant_id),
        warehouse_id: Set(warehouse_id),
        product_id: Set(product_id),
        quantity: Set(0),
        reserved: Set(0),
        available: Set(0),
        cost_average: Set(Decimal::ZERO),
        unit_cost: Set(Decimal::ZERO),
        version: Set(0),
        last_counted_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };

    match fresh.insert(conn).await {
        Ok(record) => Ok(record),
        Err(err) => match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => Err(ServiceError::ConcurrencyConflict(
                format!("stock record create race for product {product_id} in warehouse {warehouse_id}"),
            )),
            _ => Err(ServiceError::DatabaseError(err)),
        },
    }
}

/// Version-checked update of a stock record. `available` is derived here so
/// it can never drift from `quantity - reserved`. Returns the row as it now
/// stands.
pub(crate) async fn cas_update_record<C: ConnectionTrait>(
    conn: &C,
    record: &stock_record::Model,
    new_quantity: i32,
    new_reserved: i32,
    new_cost_average: Decimal,
    new_unit_cost: Decimal,
    stamp_count: bool,
) -> Result<stock_record::Model, ServiceError> {
    if new_quantity < 0 || new_reserved < 0 || new_reserved > new_quantity {
        // Business checks run before this point; reaching here is a bug.
        return Err(ServiceError::InvariantViolation(format!(
            "stock bounds violated for product {} in warehouse {}: quantity {new_quantity}, reserved {new_reserved}",
            record.product_id, record.warehouse_id
        )));
    }

    let now = Utc::now();
    let available = new_quantity - new_reserved;

    let mut update = StockRecord::update_many()
        .col_expr(stock_record::Column::Quantity, Expr::value(new_quantity))
        .col_expr(stock_record::Column::Reserved, Expr::value(new_reserved))
        .col_expr(stock_record::Column::Available, Expr::value(available))
        .col_expr(
            stock_record::Column::CostAverage,
            Expr::value(new_cost_average),
        )
        .col_expr(stock_record::Column::UnitCost, Expr::value(new_unit_cost))
        .col_expr(
            stock_record::Column::Version,
            Expr::value(record.version + 1),
        )
        .col_expr(stock_record::Column::UpdatedAt, Expr::value(now));
    if stamp_count {
        update = update.col_expr(
            stock_record::Column::LastCountedAt,
            Expr::value(Some(now)),
        );
    }

    let result = update
        .filter(stock_record::Column::Id.eq(record.id))
        .filter(stock_record::Column::Version.eq(record.version))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrencyConflict(format!(
            "stock record {} moved past version {}",
            record.id, record.version
        )));
    }

    Ok(stock_record::Model {
        quantity: new_quantity,
        reserved: new_reserved,
        available,
        cost_average: new_cost_average,
        unit_cost: new_unit_cost,
        version: record.version + 1,
        last_counted_at: if stamp_count {
            Some(now)
        } else {
            record.last_counted_at
        },
        updated_at: now,
        ..record.clone()
    })
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn insert_movement<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    product_id: Uuid,
    from_warehouse_id: Option<Uuid>,
    to_warehouse_id: Option<Uuid>,
    movement_type: MovementType,
    quantity: i32,
    unit_cost: Decimal,
    reference: &str,
    actor: Uuid,
    notes: Option<String>,
) -> Result<stock_movement::Model, ServiceError> {
    let movement = stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(tenant_id),
        product_id: Set(product_id),
        from_warehouse_id: Set(from_warehouse_id),
        to_warehouse_id: Set(to_warehouse_id),
        movement_type: Set(movement_type.as_str().to_string()),
        quantity: Set(quantity),
        unit_cost: Set(unit_cost),
        reference: Set(reference.to_string()),
        actor: Set(actor),
        notes: Set(notes),
        created_at: Set(Utc::now()),
    };
    movement.insert(conn).await.map_err(ServiceError::db_error)
}

/// Replay protection: the same logical operation, identified by its
/// reference, must not hit the ledger twice for one product/warehouse.
pub(crate) async fn assert_no_duplicate<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    product_id: Uuid,
    warehouse_id: Uuid,
    movement_type: MovementType,
    reference: &str,
) -> Result<(), ServiceError> {
    let existing = StockMovement::find()
        .filter(stock_movement::Column::TenantId.eq(tenant_id))
        .filter(stock_movement::Column::ProductId.eq(product_id))
        .filter(stock_movement::Column::MovementType.eq(movement_type.as_str()))
        .filter(stock_movement::Column::Reference.eq(reference))
        .filter(
            Condition::any()
                .add(stock_movement::Column::FromWarehouseId.eq(warehouse_id))
                .add(stock_movement::Column::ToWarehouseId.eq(warehouse_id)),
        )
        .count(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if existing > 0 {
        return Err(ServiceError::DuplicateOperation(format!(
            "{} already applied for reference '{}' (product {})",
            movement_type.as_str(),
            reference,
            product_id
        )));
    }
    Ok(())
}

/// Full receipt path, usable inside a caller's transaction (transfers and
/// reconciliation returns reuse it).
#[allow(clippy::too_many_arguments)]
pub(crate) async fn receive_stock<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    warehouse_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    unit_cost: Decimal,
    reference: &str,
    actor: Uuid,
    kind: ReceiptKind,
    origin_warehouse_id: Option<Uuid>,
) -> Result<stock_record::Model, ServiceError> {
    let record = find_or_create_record(conn, tenant_id, warehouse_id, product_id).await?;

    if kind.checks_duplicates() {
        assert_no_duplicate(
            conn,
            tenant_id,
            product_id,
            warehouse_id,
            kind.movement_type(),
            reference,
        )
        .await?;
    }

    let new_cost = weighted_average_cost(record.quantity, record.cost_average, quantity, unit_cost);
    let updated = cas_update_record(
        conn,
        &record,
        record.quantity + quantity,
        record.reserved,
        new_cost,
        unit_cost,
        false,
    )
    .await?;

    insert_movement(
        conn,
        tenant_id,
        product_id,
        origin_warehouse_id,
        Some(warehouse_id),
        kind.movement_type(),
        quantity,
        unit_cost,
        reference,
        actor,
        None,
    )
    .await?;

    Ok(updated)
}

/// Full consumption path, usable inside a caller's transaction.
/// `release_reserved` converts up to that many held units back as part of
/// the same debit (the commit half of the reservation protocol).
#[allow(clippy::too_many_arguments)]
pub(crate) async fn consume_stock<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    warehouse_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    reference: &str,
    actor: Uuid,
    kind: ConsumptionKind,
    release_reserved: i32,
) -> Result<stock_record::Model, ServiceError> {
    let record = find_record(conn, tenant_id, warehouse_id, product_id)
        .await?
        .ok_or(ServiceError::InsufficientStock {
            product_id,
            warehouse_id,
            available: 0,
            requested: quantity,
        })?;

    assert_no_duplicate(
        conn,
        tenant_id,
        product_id,
        warehouse_id,
        kind.movement_type(),
        reference,
    )
    .await?;

    let new_reserved = record.reserved - release_reserved.min(record.reserved);
    let new_quantity = record.quantity - quantity;
    if new_quantity < new_reserved {
        return Err(ServiceError::InsufficientStock {
            product_id,
            warehouse_id,
            available: record.quantity - new_reserved,
            requested: quantity,
        });
    }

    let updated = cas_update_record(
        conn,
        &record,
        new_quantity,
        new_reserved,
        record.cost_average,
        record.unit_cost,
        false,
    )
    .await?;

    insert_movement(
        conn,
        tenant_id,
        product_id,
        Some(warehouse_id),
        None,
        kind.movement_type(),
        -quantity,
        record.cost_average,
        reference,
        actor,
        None,
    )
    .await?;

    Ok(updated)
}

/// Service for warehouse stock balances and costing.
#[derive(Clone)]
pub struct StockService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    cache: Arc<QueryCache>,
    retry_attempts: u32,
}

impl StockService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, cache: Arc<QueryCache>) -> Self {
        Self {
            db,
            event_sender,
            cache,
            retry_attempts: super::DEFAULT_CONFLICT_RETRY_ATTEMPTS,
        }
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Receives stock into a warehouse and recomputes the weighted-average
    /// cost.
    #[instrument(skip(self))]
    pub async fn apply_receipt(
        &self,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        unit_cost: Decimal,
        reference: &str,
        actor: Uuid,
    ) -> Result<stock_record::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "receipt quantity must be positive, got {quantity}"
            )));
        }
        if unit_cost < Decimal::ZERO {
            return Err(ServiceError::InvalidQuantity(format!(
                "unit cost must not be negative, got {unit_cost}"
            )));
        }

        let record = with_conflict_retry(self.retry_attempts, || async move {
            let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
            let record = receive_stock(
                &txn,
                tenant_id,
                warehouse_id,
                product_id,
                quantity,
                unit_cost,
                reference,
                actor,
                ReceiptKind::Receipt,
                None,
            )
            .await?;
            txn.commit().await.map_err(ServiceError::db_error)?;
            Ok(record)
        })
        .await?;

        self.cache
            .invalidate(&stock_record_key(tenant_id, warehouse_id, product_id));

        info!(
            quantity,
            new_quantity = record.quantity,
            cost_average = %record.cost_average,
            "stock received"
        );

        self.event_sender
            .send(Event::StockReceived {
                tenant_id,
                product_id,
                warehouse_id,
                quantity,
                unit_cost,
                new_quantity: record.quantity,
                new_cost_average: record.cost_average,
                reference: reference.to_string(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(record)
    }

    /// Consumes on-hand stock. The movement carries the current average
    /// cost; the average itself only moves on receipts.
    #[instrument(skip(self))]
    pub async fn apply_consumption(
        &self,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        reference: &str,
        actor: Uuid,
        kind: ConsumptionKind,
    ) -> Result<stock_record::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "consumption quantity must be positive, got {quantity}"
            )));
        }

        let record = with_conflict_retry(self.retry_attempts, || async move {
            let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
            let record = consume_stock(
                &txn,
                tenant_id,
                warehouse_id,
                product_id,
                quantity,
                reference,
                actor,
                kind,
                0,
            )
            .await?;
            txn.commit().await.map_err(ServiceError::db_error)?;
            Ok(record)
        })
        .await?;

        self.cache
            .invalidate(&stock_record_key(tenant_id, warehouse_id, product_id));

        info!(quantity, new_quantity = record.quantity, "stock consumed");

        self.event_sender
            .send(Event::StockConsumed {
                tenant_id,
                product_id,
                warehouse_id,
                quantity,
                movement_type: kind.movement_type().as_str().to_string(),
                new_quantity: record.quantity,
                reference: reference.to_string(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(record)
    }

    /// Inventory-count correction. Positive deltas may restate the average
    /// cost when a unit cost is supplied; negative deltas never touch it.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self))]
    pub async fn apply_adjustment(
        &self,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        product_id: Uuid,
        delta: i32,
        reason: &str,
        reference: &str,
        actor: Uuid,
        unit_cost: Option<Decimal>,
    ) -> Result<stock_record::Model, ServiceError> {
        if delta == 0 {
            return Err(ServiceError::InvalidQuantity(
                "adjustment delta must not be zero".to_string(),
            ));
        }

        let record = with_conflict_retry(self.retry_attempts, || async move {
            let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

            let record = if delta > 0 {
                let record =
                    find_or_create_record(&txn, tenant_id, warehouse_id, product_id).await?;
                assert_no_duplicate(
                    &txn,
                    tenant_id,
                    product_id,
                    warehouse_id,
                    MovementType::AdjustmentIn,
                    reference,
                )
                .await?;

                let (new_cost, movement_cost) = match unit_cost {
                    Some(cost) => (
                        weighted_average_cost(record.quantity, record.cost_average, delta, cost),
                        cost,
                    ),
                    None => (record.cost_average, record.cost_average),
                };
                let updated = cas_update_record(
                    &txn,
                    &record,
                    record.quantity + delta,
                    record.reserved,
                    new_cost,
                    unit_cost.unwrap_or(record.unit_cost),
                    true,
                )
                .await?;
                insert_movement(
                    &txn,
                    tenant_id,
                    product_id,
                    None,
                    Some(warehouse_id),
                    MovementType::AdjustmentIn,
                    delta,
                    movement_cost,
                    reference,
                    actor,
                    Some(reason.to_string()),
                )
                .await?;
                updated
            } else {
                let record = find_record(&txn, tenant_id, warehouse_id, product_id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "no stock record for product {product_id} in warehouse {warehouse_id}"
                        ))
                    })?;
                assert_no_duplicate(
                    &txn,
                    tenant_id,
                    product_id,
                    warehouse_id,
                    MovementType::AdjustmentOut,
                    reference,
                )
                .await?;

                let new_quantity = record.quantity + delta;
                if new_quantity < record.reserved {
                    return Err(ServiceError::InsufficientStock {
                        product_id,
                        warehouse_id,
                        available: record.available,
                        requested: -delta,
                    });
                }
                let updated = cas_update_record(
                    &txn,
                    &record,
                    new_quantity,
                    record.reserved,
                    record.cost_average,
                    record.unit_cost,
                    true,
                )
                .await?;
                insert_movement(
                    &txn,
                    tenant_id,
                    product_id,
                    Some(warehouse_id),
                    None,
                    MovementType::AdjustmentOut,
                    delta,
                    record.cost_average,
                    reference,
                    actor,
                    Some(reason.to_string()),
                )
                .await?;
                updated
            };

            txn.commit().await.map_err(ServiceError::db_error)?;
            Ok(record)
        })
        .await?;

        self.cache
            .invalidate(&stock_record_key(tenant_id, warehouse_id, product_id));

        info!(delta, new_quantity = record.quantity, reason, "stock adjusted");

        self.event_sender
            .send(Event::StockAdjusted {
                tenant_id,
                product_id,
                warehouse_id,
                delta,
                new_quantity: record.quantity,
                reason: reason.to_string(),
                reference: reference.to_string(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(record)
    }

    /// Uncached point read, for callers that need the row as persisted.
    #[instrument(skip(self))]
    pub async fn get_record(
        &self,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<stock_record::Model>, ServiceError> {
        find_record(self.db.as_ref(), tenant_id, warehouse_id, product_id).await
    }
}
