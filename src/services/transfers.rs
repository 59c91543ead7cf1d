//! Inter-warehouse transfer protocol.
//!
//! The execute/receive split keeps each side individually atomic: execution
//! debits the source and parks the goods in transit, receipt credits the
//! destination. A crash between the two steps leaves the transfer in
//! `in_transit`, which is resumable, never silently inconsistent.

use crate::{
    cache::{stock_record_key, QueryCache},
    db::DbPool,
    entities::{
        transfer::{self, Entity as Transfer, TransferStatus},
        transfer_line::{self, Entity as TransferLine},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock::{consume_stock, receive_stock, ConsumptionKind, ReceiptKind},
    services::with_conflict_retry,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferLineRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RequestTransferCommand {
    pub tenant_id: Uuid,
    pub from_warehouse_id: Uuid,
    pub to_warehouse_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub reference: String,
    pub requested_by: Uuid,
    #[validate(length(min = 1))]
    pub lines: Vec<TransferLineRequest>,
    pub notes: Option<String>,
}

/// Per-line quantity override, keyed by transfer line id.
pub type LineQuantities = HashMap<Uuid, i32>;

/// Service driving the transfer state machine.
#[derive(Clone)]
pub struct TransferService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    cache: Arc<QueryCache>,
    retry_attempts: u32,
}

async fn load_transfer<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    transfer_id: Uuid,
) -> Result<transfer::Model, ServiceError> {
    Transfer::find_by_id(transfer_id)
        .filter(transfer::Column::TenantId.eq(tenant_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("transfer {transfer_id} not found")))
}

async fn load_lines<C: ConnectionTrait>(
    conn: &C,
    transfer_id: Uuid,
) -> Result<Vec<transfer_line::Model>, ServiceError> {
    TransferLine::find()
        .filter(transfer_line::Column::TransferId.eq(transfer_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

fn require_status(
    transfer: &transfer::Model,
    expected: TransferStatus,
    action: &'static str,
) -> Result<(), ServiceError> {
    if transfer.status != expected.as_ref() {
        return Err(ServiceError::InvalidStateTransition {
            entity: "transfer",
            id: transfer.id,
            from: transfer.status.clone(),
            action,
        });
    }
    Ok(())
}

/// Status flip guarded by the expected current status, so two workers
/// driving the same transfer cannot both take a transition. The loser sees
/// zero rows affected, retries, and fails the status guard.
async fn cas_status<C: ConnectionTrait>(
    conn: &C,
    transfer: &transfer::Model,
    from: TransferStatus,
    to: TransferStatus,
) -> Result<(), ServiceError> {
    let result = Transfer::update_many()
        .col_expr(transfer::Column::Status, Expr::value(to.as_ref()))
        .filter(transfer::Column::Id.eq(transfer.id))
        .filter(transfer::Column::Status.eq(from.as_ref()))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrencyConflict(format!(
            "transfer {} left status '{}'",
            transfer.id,
            from.as_ref()
        )));
    }
    Ok(())
}

impl TransferService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, cache: Arc<QueryCache>) -> Self {
        Self {
            db,
            event_sender,
            cache,
            retry_attempts: super::DEFAULT_CONFLICT_RETRY_ATTEMPTS,
        }
    }

    /// Creates a transfer request with its line items.
    #[instrument(skip(self, command))]
    pub async fn request(
        &self,
        command: RequestTransferCommand,
    ) -> Result<(transfer::Model, Vec<transfer_line::Model>), ServiceError> {
        command.validate()?;
        if command.from_warehouse_id == command.to_warehouse_id {
            return Err(ServiceError::ValidationError(
                "source and destination warehouse must differ".to_string(),
            ));
        }
        for line in &command.lines {
            if line.quantity <= 0 {
                return Err(ServiceError::InvalidQuantity(format!(
                    "transfer quantity for product {} must be positive, got {}",
                    line.product_id, line.quantity
                )));
            }
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let transfer = transfer::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(command.tenant_id),
            reference: Set(command.reference.clone()),
            from_warehouse_id: Set(command.from_warehouse_id),
            to_warehouse_id: Set(command.to_warehouse_id),
            status: Set(TransferStatus::Requested.as_ref().to_string()),
            requested_by: Set(command.requested_by),
            approved_by: Set(None),
            requested_at: Set(Utc::now()),
            approved_at: Set(None),
            executed_at: Set(None),
            received_at: Set(None),
            notes: Set(command.notes.clone()),
        };
        let transfer = transfer.insert(&txn).await.map_err(ServiceError::db_error)?;

        let mut lines = Vec::with_capacity(command.lines.len());
        for line in &command.lines {
            let model = transfer_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                transfer_id: Set(transfer.id),
                product_id: Set(line.product_id),
                quantity_requested: Set(line.quantity),
                quantity_approved: Set(None),
                quantity_received: Set(None),
                unit_cost: Set(Decimal::ZERO),
            };
            lines.push(model.insert(&txn).await.map_err(ServiceError::db_error)?);
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            transfer_id = %transfer.id,
            reference = %transfer.reference,
            line_count = lines.len(),
            "transfer requested"
        );

        self.event_sender
            .send(Event::TransferRequested {
                transfer_id: transfer.id,
                reference: transfer.reference.clone(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok((transfer, lines))
    }

    /// Approves a requested transfer. Approval may reduce line quantities;
    /// approving more than was requested is rejected.
    #[instrument(skip(self))]
    pub async fn approve(
        &self,
        tenant_id: Uuid,
        transfer_id: Uuid,
        approver: Uuid,
        approved_quantities: Option<LineQuantities>,
    ) -> Result<transfer::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let transfer = load_transfer(&txn, tenant_id, transfer_id).await?;
        require_status(&transfer, TransferStatus::Requested, "approve")?;
        cas_status(
            &txn,
            &transfer,
            TransferStatus::Requested,
            TransferStatus::Approved,
        )
        .await?;

        let lines = load_lines(&txn, transfer_id).await?;
        for line in lines {
            let approved = approved_quantities
                .as_ref()
                .and_then(|m| m.get(&line.id).copied())
                .unwrap_or(line.quantity_requested);
            if approved < 0 || approved > line.quantity_requested {
                return Err(ServiceError::ValidationError(format!(
                    "approved quantity {approved} out of range for line {} (requested {})",
                    line.id, line.quantity_requested
                )));
            }
            let mut active: transfer_line::ActiveModel = line.into();
            active.quantity_approved = Set(Some(approved));
            active.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        let mut active: transfer::ActiveModel = transfer.into();
        active.status = Set(TransferStatus::Approved.as_ref().to_string());
        active.approved_by = Set(Some(approver));
        active.approved_at = Set(Some(Utc::now()));
        let transfer = active.update(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(transfer_id = %transfer.id, "transfer approved");

        self.event_sender
            .send(Event::TransferApproved {
                transfer_id: transfer.id,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(transfer)
    }

    /// Rejects a requested transfer.
    #[instrument(skip(self))]
    pub async fn reject(
        &self,
        tenant_id: Uuid,
        transfer_id: Uuid,
        actor: Uuid,
        reason: &str,
    ) -> Result<transfer::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let transfer = load_transfer(&txn, tenant_id, transfer_id).await?;
        require_status(&transfer, TransferStatus::Requested, "reject")?;
        cas_status(
            &txn,
            &transfer,
            TransferStatus::Requested,
            TransferStatus::Rejected,
        )
        .await?;

        let mut active: transfer::ActiveModel = transfer.into();
        active.status = Set(TransferStatus::Rejected.as_ref().to_string());
        active.notes = Set(Some(reason.to_string()));
        let transfer = active.update(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(transfer_id = %transfer.id, reason, "transfer rejected");

        self.event_sender
            .send(Event::TransferRejected {
                transfer_id: transfer.id,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(transfer)
    }

    /// Cancels an approved transfer. Only possible before execution; once
    /// stock left the source the transfer must run to completion.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        tenant_id: Uuid,
        transfer_id: Uuid,
        actor: Uuid,
    ) -> Result<transfer::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let transfer = load_transfer(&txn, tenant_id, transfer_id).await?;
        require_status(&transfer, TransferStatus::Approved, "cancel")?;
        cas_status(
            &txn,
            &transfer,
            TransferStatus::Approved,
            TransferStatus::Cancelled,
        )
        .await?;

        let mut active: transfer::ActiveModel = transfer.into();
        active.status = Set(TransferStatus::Cancelled.as_ref().to_string());
        let transfer = active.update(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(transfer_id = %transfer.id, "transfer cancelled");

        self.event_sender
            .send(Event::TransferCancelled {
                transfer_id: transfer.id,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(transfer)
    }

    /// Executes an approved transfer: debits every line's approved quantity
    /// at the source, all-or-nothing, freezing the source average cost into
    /// the line. The transfer is then in transit.
    #[instrument(skip(self))]
    pub async fn execute(
        &self,
        tenant_id: Uuid,
        transfer_id: Uuid,
        actor: Uuid,
    ) -> Result<transfer::Model, ServiceError> {
        let transfer = with_conflict_retry(self.retry_attempts, || async move {
            let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

            let transfer = load_transfer(&txn, tenant_id, transfer_id).await?;
            require_status(&transfer, TransferStatus::Approved, "execute")?;
            cas_status(
                &txn,
                &transfer,
                TransferStatus::Approved,
                TransferStatus::InTransit,
            )
            .await?;

            let lines = load_lines(&txn, transfer_id).await?;
            for line in lines {
                let quantity = line.quantity_approved.unwrap_or(line.quantity_requested);
                if quantity == 0 {
                    continue;
                }
                let record = consume_stock(
                    &txn,
                    tenant_id,
                    transfer.from_warehouse_id,
                    line.product_id,
                    quantity,
                    &transfer.reference,
                    actor,
                    ConsumptionKind::TransferOut,
                    0,
                )
                .await?;

                let mut active: transfer_line::ActiveModel = line.into();
                active.unit_cost = Set(record.cost_average);
                active.update(&txn).await.map_err(ServiceError::db_error)?;
            }

            let mut active: transfer::ActiveModel = transfer.into();
            active.status = Set(TransferStatus::InTransit.as_ref().to_string());
            active.executed_at = Set(Some(Utc::now()));
            let transfer = active.update(&txn).await.map_err(ServiceError::db_error)?;

            txn.commit().await.map_err(ServiceError::db_error)?;
            Ok(transfer)
        })
        .await?;

        let lines = load_lines(self.db.as_ref(), transfer_id).await?;
        for line in &lines {
            self.cache.invalidate(&stock_record_key(
                tenant_id,
                transfer.from_warehouse_id,
                line.product_id,
            ));
        }

        info!(
            transfer_id = %transfer.id,
            line_count = lines.len(),
            "transfer executed, stock in transit"
        );

        self.event_sender
            .send(Event::TransferExecuted {
                transfer_id: transfer.id,
                reference: transfer.reference.clone(),
                line_count: lines.len(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(transfer)
    }

    /// Receives an in-transit transfer at the destination. Received
    /// quantities default to what was sent and may be short (shrinkage in
    /// transit); any shortfall is logged as variance and kept on the line
    /// but never blocks completion. The carried unit cost is the source
    /// average frozen at execution.
    #[instrument(skip(self))]
    pub async fn receive(
        &self,
        tenant_id: Uuid,
        transfer_id: Uuid,
        actor: Uuid,
        received_quantities: Option<LineQuantities>,
    ) -> Result<transfer::Model, ServiceError> {
        let received_ref = &received_quantities;
        let (transfer, variance_units) =
            with_conflict_retry(self.retry_attempts, || async move {
                let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

                let transfer = load_transfer(&txn, tenant_id, transfer_id).await?;
                require_status(&transfer, TransferStatus::InTransit, "receive")?;
                cas_status(
                    &txn,
                    &transfer,
                    TransferStatus::InTransit,
                    TransferStatus::Completed,
                )
                .await?;

                let lines = load_lines(&txn, transfer_id).await?;
                let mut variance_units = 0;
                for line in lines {
                    let sent = line.quantity_approved.unwrap_or(line.quantity_requested);
                    let received = received_ref
                        .as_ref()
                        .and_then(|m| m.get(&line.id).copied())
                        .unwrap_or(sent);
                    if received < 0 || received > sent {
                        return Err(ServiceError::ValidationError(format!(
                            "received quantity {received} out of range for line {} (sent {sent})",
                            line.id
                        )));
                    }

                    if received > 0 {
                        receive_stock(
                            &txn,
                            tenant_id,
                            transfer.to_warehouse_id,
                            line.product_id,
                            received,
                            line.unit_cost,
                            &transfer.reference,
                            actor,
                            ReceiptKind::TransferIn,
                            Some(transfer.from_warehouse_id),
                        )
                        .await?;
                    }

                    let shortfall = sent - received;
                    if shortfall > 0 {
                        variance_units += shortfall;
                        warn!(
                            transfer_id = %transfer.id,
                            line_id = %line.id,
                            product_id = %line.product_id,
                            sent,
                            received,
                            "transfer received short, variance recorded"
                        );
                    }

                    let mut active: transfer_line::ActiveModel = line.into();
                    active.quantity_received = Set(Some(received));
                    active.update(&txn).await.map_err(ServiceError::db_error)?;
                }

                let mut active: transfer::ActiveModel = transfer.into();
                active.status = Set(TransferStatus::Completed.as_ref().to_string());
                active.received_at = Set(Some(Utc::now()));
                let transfer = active.update(&txn).await.map_err(ServiceError::db_error)?;

                txn.commit().await.map_err(ServiceError::db_error)?;
                Ok((transfer, variance_units))
            })
            .await?;

        let lines = load_lines(self.db.as_ref(), transfer_id).await?;
        for line in &lines {
            self.cache.invalidate(&stock_record_key(
                tenant_id,
                transfer.to_warehouse_id,
                line.product_id,
            ));
        }

        info!(
            transfer_id = %transfer.id,
            variance_units,
            "transfer received and completed"
        );

        self.event_sender
            .send(Event::TransferReceived {
                transfer_id: transfer.id,
                reference: transfer.reference.clone(),
                variance_units,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(transfer)
    }

    /// Point read of a transfer with its lines.
    #[instrument(skip(self))]
    pub async fn get(
        &self,
        tenant_id: Uuid,
        transfer_id: Uuid,
    ) -> Result<(transfer::Model, Vec<transfer_line::Model>), ServiceError> {
        let transfer = load_transfer(self.db.as_ref(), tenant_id, transfer_id).await?;
        let lines = load_lines(self.db.as_ref(), transfer_id).await?;
        Ok((transfer, lines))
    }
}
