mod common;

use assert_matches::assert_matches;
use common::{setup, MANAGER, PRODUCT_A, PRODUCT_B, SELLER, TENANT, WAREHOUSE_MAIN};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use stockledger::entities::cash_movement;
use stockledger::entities::delegated_stock::DelegatedStockStatus;
use stockledger::entities::reconciliation::ReconciliationStatus;
use stockledger::errors::ServiceError;
use stockledger::queries::{
    GetOpenReconciliationQuery, ListDelegatedStocksQuery, ListPendingReconciliationsQuery, Query,
};
use stockledger::services::delegation::{DelegateStockCommand, DelegationItem};

fn delegation_command(reference: &str, items: Vec<DelegationItem>) -> DelegateStockCommand {
    DelegateStockCommand {
        tenant_id: TENANT,
        server_id: SELLER,
        warehouse_id: WAREHOUSE_MAIN,
        delegated_by: MANAGER,
        batch_reference: reference.to_string(),
        items,
        notes: None,
    }
}

#[tokio::test]
async fn delegation_debits_warehouse_and_freezes_cost() {
    let (db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 20, dec!(600), "PO-1", MANAGER)
        .await
        .unwrap();

    let rows = services
        .delegation
        .delegate(delegation_command(
            "SS-1",
            vec![DelegationItem {
                product_id: PRODUCT_A,
                quantity: 12,
                unit_price: dec!(1000),
            }],
        ))
        .await
        .unwrap();

    let warehouse = services
        .stock
        .get_record(TENANT, WAREHOUSE_MAIN, PRODUCT_A)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(warehouse.quantity, 8);

    let row = &rows[0];
    assert_eq!(row.quantity_delegated, 12);
    assert_eq!(row.quantity_remaining, 12);
    assert_eq!(row.unit_cost, dec!(600));
    assert_eq!(row.unit_price, dec!(1000));
    assert_eq!(row.status, DelegatedStockStatus::Active.as_ref());
    assert!(row.buckets_balance());

    // A later receipt at a different cost does not touch the frozen cost.
    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 8, dec!(900), "PO-2", MANAGER)
        .await
        .unwrap();
    let rows = ListDelegatedStocksQuery {
        tenant_id: TENANT,
        server_id: SELLER,
        active_only: true,
    }
    .execute(&db)
    .await
    .unwrap();
    assert_eq!(rows[0].unit_cost, dec!(600));
}

#[tokio::test]
async fn delegation_is_atomic_across_items() {
    let (db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 10, dec!(600), "PO-1", MANAGER)
        .await
        .unwrap();
    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_B, 2, dec!(300), "PO-2", MANAGER)
        .await
        .unwrap();

    let err = services
        .delegation
        .delegate(delegation_command(
            "SS-1",
            vec![
                DelegationItem {
                    product_id: PRODUCT_A,
                    quantity: 5,
                    unit_price: dec!(1000),
                },
                DelegationItem {
                    product_id: PRODUCT_B,
                    quantity: 5,
                    unit_price: dec!(500),
                },
            ],
        ))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { .. });

    // Nothing moved and no rows were opened.
    let a = services
        .stock
        .get_record(TENANT, WAREHOUSE_MAIN, PRODUCT_A)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.quantity, 10);
    let rows = ListDelegatedStocksQuery {
        tenant_id: TENANT,
        server_id: SELLER,
        active_only: false,
    }
    .execute(&db)
    .await
    .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn buckets_always_sum_to_delegated() {
    let (_db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 20, dec!(600), "PO-1", MANAGER)
        .await
        .unwrap();
    let rows = services
        .delegation
        .delegate(delegation_command(
            "SS-1",
            vec![DelegationItem {
                product_id: PRODUCT_A,
                quantity: 12,
                unit_price: dec!(1000),
            }],
        ))
        .await
        .unwrap();
    let id = rows[0].id;

    let row = services
        .delegation
        .record_sale(TENANT, id, 5, Some("POS-1"), SELLER)
        .await
        .unwrap();
    assert_eq!(row.quantity_sold, 5);
    assert_eq!(row.quantity_remaining, 7);
    assert_eq!(row.total_sales_amount, dec!(5000));
    assert!(row.buckets_balance());

    let row = services
        .delegation
        .declare_loss(TENANT, id, 1, "broken bottle", SELLER)
        .await
        .unwrap();
    assert_eq!(row.quantity_lost, 1);
    assert!(row.buckets_balance());

    let row = services
        .delegation
        .return_stock(TENANT, id, 2, Some("end of shift"), SELLER)
        .await
        .unwrap();
    assert_eq!(row.quantity_returned, 2);
    assert_eq!(row.quantity_remaining, 4);
    assert!(row.buckets_balance());
    assert_eq!(
        row.quantity_delegated,
        row.quantity_remaining + row.quantity_sold + row.quantity_returned + row.quantity_lost
    );

    // Selling more than remains is a typed refusal, not a bucket leak.
    let err = services
        .delegation
        .record_sale(TENANT, id, 5, None, SELLER)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientQuantity {
            remaining: 4,
            requested: 5,
            ..
        }
    );
}

#[tokio::test]
async fn reconciliation_settles_cash_and_returns_remaining_stock() {
    let (db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 20, dec!(600), "PO-1", MANAGER)
        .await
        .unwrap();
    let rows = services
        .delegation
        .delegate(delegation_command(
            "SS-1",
            vec![DelegationItem {
                product_id: PRODUCT_A,
                quantity: 12,
                unit_price: dec!(3000),
            }],
        ))
        .await
        .unwrap();
    let id = rows[0].id;

    services
        .delegation
        .record_sale(TENANT, id, 5, Some("POS-1"), SELLER)
        .await
        .unwrap();
    services
        .delegation
        .declare_loss(TENANT, id, 3, "spoiled", SELLER)
        .await
        .unwrap();

    let reconciliation = services
        .reconciliation
        .start(TENANT, SELLER, "REC-1")
        .await
        .unwrap();
    assert_eq!(reconciliation.status, ReconciliationStatus::Open.as_ref());

    let reconciliation = services
        .reconciliation
        .submit_for_validation(TENANT, reconciliation.id, dec!(15000), Some("till counted"))
        .await
        .unwrap();
    assert_eq!(reconciliation.status, ReconciliationStatus::Pending.as_ref());
    assert_eq!(reconciliation.cash_expected, dec!(15000));
    assert_eq!(reconciliation.cash_difference, dec!(0));
    assert_eq!(reconciliation.total_delegated_value, dec!(36000));

    // The seller's rows are frozen while pending.
    let rows = ListDelegatedStocksQuery {
        tenant_id: TENANT,
        server_id: SELLER,
        active_only: false,
    }
    .execute(&db)
    .await
    .unwrap();
    assert_eq!(rows[0].status, DelegatedStockStatus::Reconciling.as_ref());
    let err = services
        .delegation
        .record_sale(TENANT, id, 1, None, SELLER)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition { .. });

    let worklist = ListPendingReconciliationsQuery { tenant_id: TENANT }
        .execute(&db)
        .await
        .unwrap();
    assert_eq!(worklist.len(), 1);

    let reconciliation = services
        .reconciliation
        .validate(TENANT, reconciliation.id, MANAGER, None)
        .await
        .unwrap();
    assert_eq!(
        reconciliation.status,
        ReconciliationStatus::Validated.as_ref()
    );

    // Exactly one cash-in fact for the collected amount.
    let cash = cash_movement::Entity::find()
        .filter(cash_movement::Column::TenantId.eq(TENANT))
        .all(db.as_ref())
        .await
        .unwrap();
    assert_eq!(cash.len(), 1);
    assert_eq!(cash[0].amount, dec!(15000));
    assert_eq!(cash[0].direction, "in");
    assert_eq!(cash[0].reconciliation_id, Some(reconciliation.id));

    // The 4 unsold units are back in the warehouse at the frozen cost.
    let warehouse = services
        .stock
        .get_record(TENANT, WAREHOUSE_MAIN, PRODUCT_A)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(warehouse.quantity, 12);
    assert_eq!(warehouse.cost_average, dec!(600));

    // Rows are settled with everything accounted for.
    let rows = ListDelegatedStocksQuery {
        tenant_id: TENANT,
        server_id: SELLER,
        active_only: false,
    }
    .execute(&db)
    .await
    .unwrap();
    let row = &rows[0];
    assert_eq!(row.status, DelegatedStockStatus::Settled.as_ref());
    assert_eq!(row.quantity_remaining, 0);
    assert_eq!(row.quantity_returned, 4);
    assert!(row.buckets_balance());

    // Validation is not repeatable.
    let err = services
        .reconciliation
        .validate(TENANT, reconciliation.id, MANAGER, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition { .. });
}

#[tokio::test]
async fn one_reconciliation_at_a_time_per_server() {
    let (_db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 10, dec!(600), "PO-1", MANAGER)
        .await
        .unwrap();
    services
        .delegation
        .delegate(delegation_command(
            "SS-1",
            vec![DelegationItem {
                product_id: PRODUCT_A,
                quantity: 5,
                unit_price: dec!(1000),
            }],
        ))
        .await
        .unwrap();

    let first = services
        .reconciliation
        .start(TENANT, SELLER, "REC-1")
        .await
        .unwrap();

    let err = services
        .reconciliation
        .start(TENANT, SELLER, "REC-2")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition { .. });

    // Still blocked while pending.
    services
        .reconciliation
        .submit_for_validation(TENANT, first.id, dec!(0), None)
        .await
        .unwrap();
    let err = services
        .reconciliation
        .start(TENANT, SELLER, "REC-3")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition { .. });

    // A seller with nothing delegated cannot open a session.
    let err = services
        .reconciliation
        .start(TENANT, MANAGER, "REC-4")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn dispute_leaves_the_ledger_untouched() {
    let (db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 10, dec!(600), "PO-1", MANAGER)
        .await
        .unwrap();
    services
        .delegation
        .delegate(delegation_command(
            "SS-1",
            vec![DelegationItem {
                product_id: PRODUCT_A,
                quantity: 5,
                unit_price: dec!(1000),
            }],
        ))
        .await
        .unwrap();

    let reconciliation = services
        .reconciliation
        .start(TENANT, SELLER, "REC-1")
        .await
        .unwrap();
    services
        .reconciliation
        .submit_for_validation(TENANT, reconciliation.id, dec!(99), None)
        .await
        .unwrap();

    let reconciliation = services
        .reconciliation
        .dispute(TENANT, reconciliation.id, MANAGER, "till is short")
        .await
        .unwrap();
    assert_eq!(
        reconciliation.status,
        ReconciliationStatus::Disputed.as_ref()
    );

    // No cash was posted and no stock came back.
    let cash = cash_movement::Entity::find()
        .filter(cash_movement::Column::TenantId.eq(TENANT))
        .all(db.as_ref())
        .await
        .unwrap();
    assert!(cash.is_empty());
    let warehouse = services
        .stock
        .get_record(TENANT, WAREHOUSE_MAIN, PRODUCT_A)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(warehouse.quantity, 5);

    // A disputed session cannot be validated afterwards.
    let err = services
        .reconciliation
        .validate(TENANT, reconciliation.id, MANAGER, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition { .. });

    // The session is no longer open for the seller.
    let open = GetOpenReconciliationQuery {
        tenant_id: TENANT,
        server_id: SELLER,
    }
    .execute(&db)
    .await
    .unwrap();
    assert!(open.is_none());
}
