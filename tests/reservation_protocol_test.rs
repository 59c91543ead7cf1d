mod common;

use assert_matches::assert_matches;
use common::{setup, MANAGER, PRODUCT_A, PRODUCT_B, TENANT, WAREHOUSE_MAIN};
use rust_decimal_macros::dec;
use stockledger::entities::stock_movement::MovementType;
use stockledger::errors::ServiceError;
use stockledger::queries::{ListStockMovementsQuery, Query};
use stockledger::services::stock::ConsumptionKind;

#[tokio::test]
async fn reserving_holds_available_without_touching_on_hand() {
    let (_db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 10, dec!(100), "PO-1", MANAGER)
        .await
        .unwrap();

    let record = services
        .reservations
        .reserve(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 4, "ORDER-1", MANAGER)
        .await
        .unwrap();
    assert_eq!(record.quantity, 10);
    assert_eq!(record.reserved, 4);
    assert_eq!(record.available, 6);
    assert!(record.reserved >= 0 && record.reserved <= record.quantity);
    assert_eq!(record.available, record.quantity - record.reserved);

    let err = services
        .reservations
        .reserve(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 7, "ORDER-2", MANAGER)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientAvailable {
            available: 6,
            requested: 7,
            ..
        }
    );

    let err = services
        .reservations
        .reserve(TENANT, PRODUCT_B, WAREHOUSE_MAIN, 1, "ORDER-3", MANAGER)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientAvailable { available: 0, .. });
}

#[tokio::test]
async fn reserve_is_idempotent_per_reference() {
    let (_db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 10, dec!(100), "PO-1", MANAGER)
        .await
        .unwrap();

    services
        .reservations
        .reserve(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 4, "ORDER-1", MANAGER)
        .await
        .unwrap();

    // A retried request with the same quantity is a no-op, not a second hold.
    let record = services
        .reservations
        .reserve(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 4, "ORDER-1", MANAGER)
        .await
        .unwrap();
    assert_eq!(record.reserved, 4);

    // The same reference with a different quantity is a conflicting replay.
    let err = services
        .reservations
        .reserve(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 6, "ORDER-1", MANAGER)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::DuplicateOperation(_));
}

#[tokio::test]
async fn release_is_clamped_to_what_is_held() {
    let (_db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 10, dec!(100), "PO-1", MANAGER)
        .await
        .unwrap();
    services
        .reservations
        .reserve(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 4, "ORDER-1", MANAGER)
        .await
        .unwrap();

    // Releasing more than held gives back only the hold.
    let record = services
        .reservations
        .release(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 10, "ORDER-1", MANAGER)
        .await
        .unwrap();
    assert_eq!(record.reserved, 0);
    assert_eq!(record.available, 10);

    // Releasing an unknown reference is harmless.
    let record = services
        .reservations
        .release(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 3, "ORDER-9", MANAGER)
        .await
        .unwrap();
    assert_eq!(record.reserved, 0);
    assert_eq!(record.quantity, 10);
}

#[tokio::test]
async fn partial_release_keeps_the_rest_held() {
    let (_db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 10, dec!(100), "PO-1", MANAGER)
        .await
        .unwrap();
    services
        .reservations
        .reserve(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 6, "ORDER-1", MANAGER)
        .await
        .unwrap();

    let record = services
        .reservations
        .release(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 2, "ORDER-1", MANAGER)
        .await
        .unwrap();
    assert_eq!(record.reserved, 4);
    assert_eq!(record.available, 6);
}

#[tokio::test]
async fn commit_equals_direct_consumption_and_never_double_debits() {
    let (db, services) = setup().await;

    // Path one: reserve then commit.
    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 10, dec!(100), "PO-1", MANAGER)
        .await
        .unwrap();
    services
        .reservations
        .reserve(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 4, "ORDER-1", MANAGER)
        .await
        .unwrap();
    let committed = services
        .reservations
        .commit(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 4, "ORDER-1", MANAGER)
        .await
        .unwrap();

    // Path two: straight consumption of the same quantity.
    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_B, 10, dec!(100), "PO-2", MANAGER)
        .await
        .unwrap();
    let consumed = services
        .stock
        .apply_consumption(
            TENANT,
            WAREHOUSE_MAIN,
            PRODUCT_B,
            4,
            "ORDER-2",
            MANAGER,
            ConsumptionKind::Sale,
        )
        .await
        .unwrap();

    assert_eq!(committed.quantity, consumed.quantity);
    assert_eq!(committed.reserved, 0);
    assert_eq!(committed.available, consumed.available);

    // Exactly one debit movement exists for the committed reference.
    let (movements, _) = ListStockMovementsQuery {
        tenant_id: TENANT,
        product_id: Some(PRODUCT_A),
        warehouse_id: Some(WAREHOUSE_MAIN),
        from: None,
        to: None,
        page: 1,
        limit: 50,
    }
    .execute(&db)
    .await
    .unwrap();
    let debits: Vec<_> = movements
        .iter()
        .filter(|m| m.movement_type == MovementType::Sale.as_str() && m.reference == "ORDER-1")
        .collect();
    assert_eq!(debits.len(), 1);
    assert_eq!(debits[0].quantity, -4);

    // Replaying the commit is rejected, not reapplied.
    let err = services
        .reservations
        .commit(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 4, "ORDER-1", MANAGER)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::DuplicateOperation(_));
}

#[tokio::test]
async fn commit_beyond_the_hold_draws_from_available() {
    let (_db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 10, dec!(100), "PO-1", MANAGER)
        .await
        .unwrap();
    services
        .reservations
        .reserve(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 2, "ORDER-1", MANAGER)
        .await
        .unwrap();

    let record = services
        .reservations
        .commit(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 5, "ORDER-1", MANAGER)
        .await
        .unwrap();
    assert_eq!(record.quantity, 5);
    assert_eq!(record.reserved, 0);
    assert_eq!(record.available, 5);
}

#[tokio::test]
async fn commit_fails_whole_when_stock_ran_out() {
    let (_db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 6, dec!(100), "PO-1", MANAGER)
        .await
        .unwrap();
    services
        .reservations
        .reserve(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 2, "ORDER-1", MANAGER)
        .await
        .unwrap();

    // Someone else drains the unreserved stock in the meantime.
    services
        .stock
        .apply_consumption(
            TENANT,
            WAREHOUSE_MAIN,
            PRODUCT_A,
            4,
            "SALE-X",
            MANAGER,
            ConsumptionKind::Sale,
        )
        .await
        .unwrap();

    let err = services
        .reservations
        .commit(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 5, "ORDER-1", MANAGER)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { .. });

    // Nothing was partially applied: the hold is intact.
    let record = services
        .stock
        .get_record(TENANT, WAREHOUSE_MAIN, PRODUCT_A)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.quantity, 2);
    assert_eq!(record.reserved, 2);
}
