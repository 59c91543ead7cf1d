//! Concurrent workers hammering the same stock key must serialize: with 10
//! on hand and 20 one-unit debits in flight, exactly 10 succeed and the rest
//! fail with a typed refusal, never a negative balance.

mod common;

use common::{setup, MANAGER, PRODUCT_A, TENANT, WAREHOUSE_MAIN};
use rust_decimal_macros::dec;
use stockledger::errors::ServiceError;
use stockledger::services::stock::ConsumptionKind;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_consumption_exhausts_stock_to_exactly_zero() {
    let (_db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 10, dec!(100), "PO-1", MANAGER)
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let stock = services.stock.clone();
        tasks.push(tokio::spawn(async move {
            stock
                .apply_consumption(
                    TENANT,
                    WAREHOUSE_MAIN,
                    PRODUCT_A,
                    1,
                    &format!("SALE-{i}"),
                    MANAGER,
                    ConsumptionKind::Sale,
                )
                .await
        }));
    }

    let mut successes = 0;
    let mut insufficient = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(ServiceError::InsufficientStock { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 10, "exactly enough debits to drain the stock");
    assert_eq!(insufficient, 10);

    let record = services
        .stock
        .get_record(TENANT, WAREHOUSE_MAIN, PRODUCT_A)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.quantity, 0);
    assert_eq!(record.available, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reservations_never_oversell_available() {
    let (_db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 10, dec!(100), "PO-1", MANAGER)
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let reservations = services.reservations.clone();
        tasks.push(tokio::spawn(async move {
            reservations
                .reserve(
                    TENANT,
                    PRODUCT_A,
                    WAREHOUSE_MAIN,
                    1,
                    &format!("ORDER-{i}"),
                    MANAGER,
                )
                .await
        }));
    }

    let mut successes = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(ServiceError::InsufficientAvailable { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 10);

    let record = services
        .stock
        .get_record(TENANT, WAREHOUSE_MAIN, PRODUCT_A)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.quantity, 10);
    assert_eq!(record.reserved, 10);
    assert_eq!(record.available, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_commits_and_releases_keep_the_bounds_invariant() {
    let (_db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 12, dec!(100), "PO-1", MANAGER)
        .await
        .unwrap();
    for i in 0..6 {
        services
            .reservations
            .reserve(
                TENANT,
                PRODUCT_A,
                WAREHOUSE_MAIN,
                2,
                &format!("ORDER-{i}"),
                MANAGER,
            )
            .await
            .unwrap();
    }

    // Half the orders settle, half back out, concurrently.
    let mut tasks = Vec::new();
    for i in 0..6 {
        let reservations = services.reservations.clone();
        tasks.push(tokio::spawn(async move {
            let reference = format!("ORDER-{i}");
            if i % 2 == 0 {
                reservations
                    .commit(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 2, &reference, MANAGER)
                    .await
            } else {
                reservations
                    .release(TENANT, PRODUCT_A, WAREHOUSE_MAIN, 2, &reference, MANAGER)
                    .await
            }
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let record = services
        .stock
        .get_record(TENANT, WAREHOUSE_MAIN, PRODUCT_A)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.quantity, 6);
    assert_eq!(record.reserved, 0);
    assert_eq!(record.available, 6);
    assert!(record.reserved >= 0 && record.reserved <= record.quantity);
}
