//! Two-phase reservation protocol: `reserve` holds available quantity
//! without touching on-hand, `commit` converts the hold into a real debit in
//! one transaction, `release` gives the hold back. Reservations are keyed by
//! business reference, which makes retried `reserve` calls idempotent.

use crate::{
    cache::{stock_record_key, QueryCache},
    db::DbPool,
    entities::{
        stock_record,
        stock_reservation::{self, Entity as StockReservation, ReservationStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock::{cas_update_record, consume_stock, find_record, ConsumptionKind},
    services::with_conflict_retry,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Service holding and settling short-lived stock reservations.
#[derive(Clone)]
pub struct ReservationService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    cache: Arc<QueryCache>,
    retry_attempts: u32,
}

async fn find_active_reservation<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    product_id: Uuid,
    warehouse_id: Uuid,
    reference: &str,
) -> Result<Option<stock_reservation::Model>, ServiceError> {
    StockReservation::find()
        .filter(stock_reservation::Column::TenantId.eq(tenant_id))
        .filter(stock_reservation::Column::ProductId.eq(product_id))
        .filter(stock_reservation::Column::WarehouseId.eq(warehouse_id))
        .filter(stock_reservation::Column::Reference.eq(reference))
        .filter(stock_reservation::Column::Status.eq(ReservationStatus::Active.as_str()))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

async fn shrink_reservation<C: ConnectionTrait>(
    conn: &C,
    reservation: stock_reservation::Model,
    by: i32,
    final_status: ReservationStatus,
) -> Result<(), ServiceError> {
    let remaining = reservation.quantity - by;
    let mut active: stock_reservation::ActiveModel = reservation.into();
    active.quantity = Set(remaining);
    if remaining == 0 {
        active.status = Set(final_status.as_str().to_string());
    }
    active.updated_at = Set(Utc::now());
    active.update(conn).await.map_err(ServiceError::db_error)?;
    Ok(())
}

impl ReservationService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, cache: Arc<QueryCache>) -> Self {
        Self {
            db,
            event_sender,
            cache,
            retry_attempts: super::DEFAULT_CONFLICT_RETRY_ATTEMPTS,
        }
    }

    /// Places a hold of `quantity` against available stock.
    ///
    /// Idempotent per reference: re-reserving the same reference with the
    /// same quantity is a no-op, a different quantity is rejected as a
    /// duplicate, so a retried request can never double-hold.
    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
        warehouse_id: Uuid,
        quantity: i32,
        reference: &str,
        actor: Uuid,
    ) -> Result<stock_record::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "reservation quantity must be positive, got {quantity}"
            )));
        }

        let (record, was_noop) = with_conflict_retry(self.retry_attempts, || async move {
            let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

            let record = find_record(&txn, tenant_id, warehouse_id, product_id)
                .await?
                .ok_or(ServiceError::InsufficientAvailable {
                    product_id,
                    warehouse_id,
                    available: 0,
                    requested: quantity,
                })?;

            if let Some(existing) =
                find_active_reservation(&txn, tenant_id, product_id, warehouse_id, reference)
                    .await?
            {
                if existing.quantity_requested == quantity {
                    txn.commit().await.map_err(ServiceError::db_error)?;
                    return Ok((record, true));
                }
                return Err(ServiceError::DuplicateOperation(format!(
                    "reference '{reference}' already holds {} units, re-requested {quantity}",
                    existing.quantity_requested
                )));
            }

            if record.available < quantity {
                return Err(ServiceError::InsufficientAvailable {
                    product_id,
                    warehouse_id,
                    available: record.available,
                    requested: quantity,
                });
            }

            let updated = cas_update_record(
                &txn,
                &record,
                record.quantity,
                record.reserved + quantity,
                record.cost_average,
                record.unit_cost,
                false,
            )
            .await?;

            let now = Utc::now();
            let reservation = stock_reservation::ActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(tenant_id),
                product_id: Set(product_id),
                warehouse_id: Set(warehouse_id),
                reference: Set(reference.to_string()),
                quantity: Set(quantity),
                quantity_requested: Set(quantity),
                status: Set(ReservationStatus::Active.as_str().to_string()),
                created_at: Set(now),
                updated_at: Set(now),
            };
            reservation
                .insert(&txn)
                .await
                .map_err(ServiceError::db_error)?;

            txn.commit().await.map_err(ServiceError::db_error)?;
            Ok((updated, false))
        })
        .await?;

        if was_noop {
            info!(reference, "reservation replayed, no additional hold");
            return Ok(record);
        }

        self.cache
            .invalidate(&stock_record_key(tenant_id, warehouse_id, product_id));

        info!(
            quantity,
            reserved = record.reserved,
            available = record.available,
            "stock reserved"
        );

        self.event_sender
            .send(Event::StockReserved {
                tenant_id,
                product_id,
                warehouse_id,
                quantity,
                reference: reference.to_string(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(record)
    }

    /// Gives back up to `quantity` units held under `reference`. Releasing
    /// more than is held is clamped, not an error, so partial releases and
    /// replays are harmless.
    #[instrument(skip(self))]
    pub async fn release(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
        warehouse_id: Uuid,
        quantity: i32,
        reference: &str,
        actor: Uuid,
    ) -> Result<stock_record::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "release quantity must be positive, got {quantity}"
            )));
        }

        let (record, released) = with_conflict_retry(self.retry_attempts, || async move {
            let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

            let record = find_record(&txn, tenant_id, warehouse_id, product_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "no stock record for product {product_id} in warehouse {warehouse_id}"
                    ))
                })?;

            let reservation =
                find_active_reservation(&txn, tenant_id, product_id, warehouse_id, reference)
                    .await?;
            let held = reservation.as_ref().map(|r| r.quantity).unwrap_or(0);
            let release_qty = quantity.min(held);

            if release_qty == 0 {
                txn.commit().await.map_err(ServiceError::db_error)?;
                return Ok((record, 0));
            }

            let updated = cas_update_record(
                &txn,
                &record,
                record.quantity,
                record.reserved - release_qty,
                record.cost_average,
                record.unit_cost,
                false,
            )
            .await?;

            if let Some(reservation) = reservation {
                shrink_reservation(&txn, reservation, release_qty, ReservationStatus::Released)
                    .await?;
            }

            txn.commit().await.map_err(ServiceError::db_error)?;
            Ok((updated, release_qty))
        })
        .await?;

        if released == 0 {
            info!(reference, "nothing held under reference, release is a no-op");
            return Ok(record);
        }

        self.cache
            .invalidate(&stock_record_key(tenant_id, warehouse_id, product_id));

        info!(released, reserved = record.reserved, "reservation released");

        self.event_sender
            .send(Event::ReservationReleased {
                tenant_id,
                product_id,
                warehouse_id,
                quantity: released,
                reference: reference.to_string(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(record)
    }

    /// Converts held stock into an actual debit: release plus consumption as
    /// one atomic step, so `available` never transits through a wrong value.
    #[instrument(skip(self))]
    pub async fn commit(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
        warehouse_id: Uuid,
        quantity: i32,
        reference: &str,
        actor: Uuid,
    ) -> Result<stock_record::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "commit quantity must be positive, got {quantity}"
            )));
        }

        let record = with_conflict_retry(self.retry_attempts, || async move {
            let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

            let reservation =
                find_active_reservation(&txn, tenant_id, product_id, warehouse_id, reference)
                    .await?;
            let held = reservation.as_ref().map(|r| r.quantity).unwrap_or(0);
            let release_qty = quantity.min(held);

            let updated = consume_stock(
                &txn,
                tenant_id,
                warehouse_id,
                product_id,
                quantity,
                reference,
                actor,
                ConsumptionKind::Sale,
                release_qty,
            )
            .await?;

            if let Some(reservation) = reservation {
                shrink_reservation(&txn, reservation, release_qty, ReservationStatus::Committed)
                    .await?;
            }

            txn.commit().await.map_err(ServiceError::db_error)?;
            Ok(updated)
        })
        .await?;

        self.cache
            .invalidate(&stock_record_key(tenant_id, warehouse_id, product_id));

        info!(
            quantity,
            new_quantity = record.quantity,
            reserved = record.reserved,
            "reservation committed"
        );

        self.event_sender
            .send(Event::ReservationCommitted {
                tenant_id,
                product_id,
                warehouse_id,
                quantity,
                reference: reference.to_string(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(record)
    }
}
