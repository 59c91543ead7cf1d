//! Reconciliation: the settlement session between a seller and a manager.
//!
//! `open → pending → validated | disputed`. Submission freezes the seller's
//! delegated rows into `reconciling` and rolls their values up; validation
//! posts the cash-in fact and returns unsold units to the originating
//! warehouses in one transaction. Disputes mutate nothing — resolution is
//! manual and outside this ledger.
//!
//! Status transitions are compare-and-swap updates filtered on the expected
//! status, so two concurrent validators cannot both post cash: the loser
//! sees zero rows affected, retries, and fails the status guard.

use crate::{
    cache::{stock_record_key, QueryCache},
    db::DbPool,
    entities::{
        cash_movement::{self, CashDirection},
        delegated_stock::{self, Entity as DelegatedStock, DelegatedStockStatus},
        delegated_stock_movement::DelegatedMovementType,
        reconciliation::{self, Entity as Reconciliation, ReconciliationStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::delegation::insert_delegated_movement,
    services::stock::{receive_stock, ReceiptKind},
    services::with_conflict_retry,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Service driving reconciliation sessions.
#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    cache: Arc<QueryCache>,
    retry_attempts: u32,
}

async fn load_reconciliation<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    reconciliation_id: Uuid,
) -> Result<reconciliation::Model, ServiceError> {
    Reconciliation::find_by_id(reconciliation_id)
        .filter(reconciliation::Column::TenantId.eq(tenant_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("reconciliation {reconciliation_id} not found"))
        })
}

fn require_status(
    model: &reconciliation::Model,
    expected: ReconciliationStatus,
    action: &'static str,
) -> Result<(), ServiceError> {
    if model.status != expected.as_ref() {
        return Err(ServiceError::InvalidStateTransition {
            entity: "reconciliation",
            id: model.id,
            from: model.status.clone(),
            action,
        });
    }
    Ok(())
}

/// Status flip guarded by the expected current status. Zero rows affected
/// means another worker got there first.
async fn cas_transition<C: ConnectionTrait>(
    conn: &C,
    model: &reconciliation::Model,
    from: ReconciliationStatus,
    to: ReconciliationStatus,
) -> Result<(), ServiceError> {
    let result = Reconciliation::update_many()
        .col_expr(
            reconciliation::Column::Status,
            Expr::value(to.as_ref()),
        )
        .col_expr(reconciliation::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(reconciliation::Column::Id.eq(model.id))
        .filter(reconciliation::Column::Status.eq(from.as_ref()))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrencyConflict(format!(
            "reconciliation {} left status '{}'",
            model.id,
            from.as_ref()
        )));
    }
    Ok(())
}

async fn server_rows_in_status<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    server_id: Uuid,
    status: DelegatedStockStatus,
) -> Result<Vec<delegated_stock::Model>, ServiceError> {
    DelegatedStock::find()
        .filter(delegated_stock::Column::TenantId.eq(tenant_id))
        .filter(delegated_stock::Column::ServerId.eq(server_id))
        .filter(delegated_stock::Column::Status.eq(status.as_ref()))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Version-checked freeze/settle of a delegated row. Bucket changes race
/// through the same version column, so a seller sale committing concurrently
/// forces a clean retry instead of a stale roll-up.
async fn cas_row_status<C: ConnectionTrait>(
    conn: &C,
    row: &delegated_stock::Model,
    update: sea_orm::UpdateMany<DelegatedStock>,
) -> Result<(), ServiceError> {
    let result = update
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
    Ok(())
}

impl ReconciliationService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, cache: Arc<QueryCache>) -> Self {
        Self {
            db,
            event_sender,
            cache,
            retry_attempts: super::DEFAULT_CONFLICT_RETRY_ATTEMPTS,
        }
    }

    /// Opens a reconciliation session for a seller. One at a time: an
    /// existing open or pending session blocks a new one, and there must be
    /// active delegated stock to reconcile.
    #[instrument(skip(self))]
    pub async fn start(
        &self,
        tenant_id: Uuid,
        server_id: Uuid,
        reference: &str,
    ) -> Result<reconciliation::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let existing = Reconciliation::find()
            .filter(reconciliation::Column::TenantId.eq(tenant_id))
            .filter(reconciliation::Column::ServerId.eq(server_id))
            .filter(
                Condition::any()
                    .add(reconciliation::Column::Status.eq(ReconciliationStatus::Open.as_ref()))
                    .add(
                        reconciliation::Column::Status.eq(ReconciliationStatus::Pending.as_ref()),
                    ),
            )
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if let Some(existing) = existing {
            return Err(ServiceError::InvalidStateTransition {
                entity: "reconciliation",
                id: existing.id,
                from: existing.status,
                action: "start",
            });
        }

        let active_rows = DelegatedStock::find()
            .filter(delegated_stock::Column::TenantId.eq(tenant_id))
            .filter(delegated_stock::Column::ServerId.eq(server_id))
            .filter(delegated_stock::Column::Status.eq(DelegatedStockStatus::Active.as_ref()))
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if active_rows == 0 {
            return Err(ServiceError::ValidationError(format!(
                "server {server_id} has no active delegated stock to reconcile"
            )));
        }

        let now = Utc::now();
        let model = reconciliation::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            server_id: Set(server_id),
            manager_id: Set(None),
            reference: Set(reference.to_string()),
            session_start: Set(now),
            session_end: Set(None),
            total_delegated_value: Set(Decimal::ZERO),
            total_sales: Set(Decimal::ZERO),
            total_returned_value: Set(Decimal::ZERO),
            total_losses_value: Set(Decimal::ZERO),
            cash_expected: Set(Decimal::ZERO),
            cash_collected: Set(Decimal::ZERO),
            cash_difference: Set(Decimal::ZERO),
            status: Set(ReconciliationStatus::Open.as_ref().to_string()),
            server_notes: Set(None),
            manager_notes: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = model.insert(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            reconciliation_id = %model.id,
            server_id = %server_id,
            reference,
            "reconciliation started"
        );

        self.event_sender
            .send(Event::ReconciliationStarted {
                reconciliation_id: model.id,
                server_id,
                reference: reference.to_string(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(model)
    }

    /// Seller submits the session with their self-reported cash figure.
    /// Rolls up the delegated rows, freezes them into `reconciling`, and
    /// moves the session to `pending` for manager review.
    #[instrument(skip(self))]
    pub async fn submit_for_validation(
        &self,
        tenant_id: Uuid,
        reconciliation_id: Uuid,
        cash_collected: Decimal,
        server_notes: Option<&str>,
    ) -> Result<reconciliation::Model, ServiceError> {
        if cash_collected < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "collected cash must not be negative".to_string(),
            ));
        }

        let model = with_conflict_retry(self.retry_attempts, || async move {
            let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

            let model = load_reconciliation(&txn, tenant_id, reconciliation_id).await?;
            require_status(&model, ReconciliationStatus::Open, "submit")?;
            cas_transition(
                &txn,
                &model,
                ReconciliationStatus::Open,
                ReconciliationStatus::Pending,
            )
            .await?;

            let rows = server_rows_in_status(
                &txn,
                tenant_id,
                model.server_id,
                DelegatedStockStatus::Active,
            )
            .await?;

            let now = Utc::now();
            let mut total_delegated_value = Decimal::ZERO;
            let mut total_sales = Decimal::ZERO;
            let mut total_returned_value = Decimal::ZERO;
            let mut total_losses_value = Decimal::ZERO;
            for row in &rows {
                total_delegated_value += row.delegated_value();
                total_sales += row.total_sales_amount;
                total_returned_value += row.returned_value();
                total_losses_value += row.losses_value();

                let freeze = DelegatedStock::update_many()
                    .col_expr(
                        delegated_stock::Column::Status,
                        Expr::value(DelegatedStockStatus::Reconciling.as_ref()),
                    )
                    .col_expr(
                        delegated_stock::Column::ReconciledAt,
                        Expr::value(Some(now)),
                    );
                cas_row_status(&txn, row, freeze).await?;
            }

            let cash_expected = total_sales;
            let mut active: reconciliation::ActiveModel = model.into();
            active.status = Set(ReconciliationStatus::Pending.as_ref().to_string());
            active.session_end = Set(Some(now));
            active.total_delegated_value = Set(total_delegated_value);
            active.total_sales = Set(total_sales);
            active.total_returned_value = Set(total_returned_value);
            active.total_losses_value = Set(total_losses_value);
            active.cash_expected = Set(cash_expected);
            active.cash_collected = Set(cash_collected);
            active.cash_difference = Set(cash_collected - cash_expected);
            active.server_notes = Set(server_notes.map(str::to_string));
            active.updated_at = Set(now);
            let model = active.update(&txn).await.map_err(ServiceError::db_error)?;

            txn.commit().await.map_err(ServiceError::db_error)?;
            Ok(model)
        })
        .await?;

        info!(
            reconciliation_id = %model.id,
            cash_expected = %model.cash_expected,
            cash_collected = %model.cash_collected,
            cash_difference = %model.cash_difference,
            "reconciliation submitted for validation"
        );

        self.event_sender
            .send(Event::ReconciliationSubmitted {
                reconciliation_id: model.id,
                cash_collected,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(model)
    }

    /// Manager accepts the session. In one transaction: posts exactly one
    /// cash-in fact for the collected amount, converts every reconciling
    /// row's remaining quantity into a `reconciliation_return` movement back
    /// into its originating warehouse at the frozen unit cost, and settles
    /// the rows. Re-validating a validated session fails the status guard.
    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        tenant_id: Uuid,
        reconciliation_id: Uuid,
        manager_id: Uuid,
        manager_notes: Option<&str>,
    ) -> Result<reconciliation::Model, ServiceError> {
        let (model, returned_units, touched_keys) =
            with_conflict_retry(self.retry_attempts, || async move {
                let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

                let model = load_reconciliation(&txn, tenant_id, reconciliation_id).await?;
                require_status(&model, ReconciliationStatus::Pending, "validate")?;
                cas_transition(
                    &txn,
                    &model,
                    ReconciliationStatus::Pending,
                    ReconciliationStatus::Validated,
                )
                .await?;

                let rows = server_rows_in_status(
                    &txn,
                    tenant_id,
                    model.server_id,
                    DelegatedStockStatus::Reconciling,
                )
                .await?;

                let now = Utc::now();
                let mut returned_units = 0;
                let mut touched_keys = Vec::new();
                for row in &rows {
                    let remaining = row.quantity_remaining;
                    if remaining > 0 {
                        receive_stock(
                            &txn,
                            tenant_id,
                            row.warehouse_id,
                            row.product_id,
                            remaining,
                            row.unit_cost,
                            &model.reference,
                            manager_id,
                            ReceiptKind::ReconciliationReturn,
                            None,
                        )
                        .await?;

                        insert_delegated_movement(
                            &txn,
                            row,
                            DelegatedMovementType::ReconciliationReturn,
                            -remaining,
                            remaining,
                            0,
                            Decimal::from(remaining) * row.unit_price,
                            Some(model.reference.clone()),
                            manager_id,
                            None,
                        )
                        .await?;

                        returned_units += remaining;
                        touched_keys.push((row.warehouse_id, row.product_id));
                    }

                    let new_returned = row.quantity_returned + remaining;
                    if new_returned + row.quantity_sold + row.quantity_lost
                        != row.quantity_delegated
                    {
                        return Err(ServiceError::InvariantViolation(format!(
                            "delegated stock {} buckets do not sum at settlement",
                            row.id
                        )));
                    }

                    let settle = DelegatedStock::update_many()
                        .col_expr(delegated_stock::Column::QuantityRemaining, Expr::value(0))
                        .col_expr(
                            delegated_stock::Column::QuantityReturned,
                            Expr::value(new_returned),
                        )
                        .col_expr(
                            delegated_stock::Column::Status,
                            Expr::value(DelegatedStockStatus::Settled.as_ref()),
                        )
                        .col_expr(
                            delegated_stock::Column::SettledAt,
                            Expr::value(Some(now)),
                        );
                    cas_row_status(&txn, row, settle).await?;
                }

                let cash = cash_movement::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    tenant_id: Set(tenant_id),
                    direction: Set(CashDirection::In.as_ref().to_string()),
                    category: Set("reconciliation".to_string()),
                    amount: Set(model.cash_collected),
                    reference: Set(model.reference.clone()),
                    recorded_by: Set(manager_id),
                    reconciliation_id: Set(Some(model.id)),
                    created_at: Set(now),
                };
                cash.insert(&txn).await.map_err(ServiceError::db_error)?;

                let mut active: reconciliation::ActiveModel = model.into();
                active.status = Set(ReconciliationStatus::Validated.as_ref().to_string());
                active.manager_id = Set(Some(manager_id));
                active.manager_notes = Set(manager_notes.map(str::to_string));
                active.updated_at = Set(now);
                let model = active.update(&txn).await.map_err(ServiceError::db_error)?;

                txn.commit().await.map_err(ServiceError::db_error)?;
                Ok((model, returned_units, touched_keys))
            })
            .await?;

        for (warehouse_id, product_id) in touched_keys {
            self.cache
                .invalidate(&stock_record_key(tenant_id, warehouse_id, product_id));
        }

        info!(
            reconciliation_id = %model.id,
            cash_collected = %model.cash_collected,
            returned_units,
            "reconciliation validated"
        );

        self.event_sender
            .send(Event::ReconciliationValidated {
                reconciliation_id: model.id,
                cash_collected: model.cash_collected,
                returned_units,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(model)
    }

    /// Manager rejects the session over a discrepancy. No ledger mutation;
    /// the delegated rows stay frozen in `reconciling` until the dispute is
    /// resolved out of band.
    #[instrument(skip(self))]
    pub async fn dispute(
        &self,
        tenant_id: Uuid,
        reconciliation_id: Uuid,
        manager_id: Uuid,
        reason: &str,
    ) -> Result<reconciliation::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let model = load_reconciliation(&txn, tenant_id, reconciliation_id).await?;
        require_status(&model, ReconciliationStatus::Pending, "dispute")?;
        cas_transition(
            &txn,
            &model,
            ReconciliationStatus::Pending,
            ReconciliationStatus::Disputed,
        )
        .await?;

        let mut active: reconciliation::ActiveModel = model.into();
        active.status = Set(ReconciliationStatus::Disputed.as_ref().to_string());
        active.manager_id = Set(Some(manager_id));
        active.manager_notes = Set(Some(reason.to_string()));
        active.updated_at = Set(Utc::now());
        let model = active.update(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(reconciliation_id = %model.id, reason, "reconciliation disputed");

        self.event_sender
            .send(Event::ReconciliationDisputed {
                reconciliation_id: model.id,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(model)
    }
}
