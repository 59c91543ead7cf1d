mod common;

use assert_matches::assert_matches;
use common::{setup, MANAGER, PRODUCT_A, PRODUCT_B, TENANT, WAREHOUSE_MAIN, WAREHOUSE_RETAIL};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use stockledger::entities::transfer::TransferStatus;
use stockledger::errors::ServiceError;
use stockledger::services::transfers::{RequestTransferCommand, TransferLineRequest};

fn transfer_command(reference: &str, lines: Vec<TransferLineRequest>) -> RequestTransferCommand {
    RequestTransferCommand {
        tenant_id: TENANT,
        from_warehouse_id: WAREHOUSE_MAIN,
        to_warehouse_id: WAREHOUSE_RETAIL,
        reference: reference.to_string(),
        requested_by: MANAGER,
        lines,
        notes: None,
    }
}

#[tokio::test]
async fn round_trip_preserves_quantity_and_cost_continuity() {
    let (_db, services) = setup().await;

    // Source average lands at 600 across two receipts.
    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 100, dec!(500), "PO-1", MANAGER)
        .await
        .unwrap();
    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 50, dec!(800), "PO-2", MANAGER)
        .await
        .unwrap();

    let (transfer, _lines) = services
        .transfers
        .request(transfer_command(
            "TR-1",
            vec![TransferLineRequest {
                product_id: PRODUCT_A,
                quantity: 10,
            }],
        ))
        .await
        .unwrap();
    assert_eq!(transfer.status, TransferStatus::Requested.as_ref());

    services
        .transfers
        .approve(TENANT, transfer.id, MANAGER, None)
        .await
        .unwrap();
    let transfer = services
        .transfers
        .execute(TENANT, transfer.id, MANAGER)
        .await
        .unwrap();
    assert_eq!(transfer.status, TransferStatus::InTransit.as_ref());

    let source = services
        .stock
        .get_record(TENANT, WAREHOUSE_MAIN, PRODUCT_A)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(source.quantity, 140);

    let transfer = services
        .transfers
        .receive(TENANT, transfer.id, MANAGER, None)
        .await
        .unwrap();
    assert_eq!(transfer.status, TransferStatus::Completed.as_ref());

    let destination = services
        .stock
        .get_record(TENANT, WAREHOUSE_RETAIL, PRODUCT_A)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(destination.quantity, 10);
    // Destination started empty, so its average is the carried source cost.
    assert_eq!(destination.cost_average, dec!(600));

    let (_, lines) = services.transfers.get(TENANT, transfer.id).await.unwrap();
    assert_eq!(lines[0].unit_cost, dec!(600));
    assert_eq!(lines[0].quantity_received, Some(10));
    assert_eq!(lines[0].variance(), Some(0));
}

#[tokio::test]
async fn approval_can_reduce_quantities() {
    let (_db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 20, dec!(100), "PO-1", MANAGER)
        .await
        .unwrap();

    let (transfer, lines) = services
        .transfers
        .request(transfer_command(
            "TR-1",
            vec![TransferLineRequest {
                product_id: PRODUCT_A,
                quantity: 10,
            }],
        ))
        .await
        .unwrap();

    let mut approved = HashMap::new();
    approved.insert(lines[0].id, 6);
    services
        .transfers
        .approve(TENANT, transfer.id, MANAGER, Some(approved))
        .await
        .unwrap();
    services
        .transfers
        .execute(TENANT, transfer.id, MANAGER)
        .await
        .unwrap();

    let source = services
        .stock
        .get_record(TENANT, WAREHOUSE_MAIN, PRODUCT_A)
        .await
        .unwrap()
        .unwrap();
    // The approved quantity moved, not the requested one.
    assert_eq!(source.quantity, 14);

    // Approving above the requested quantity is rejected.
    let (transfer2, lines2) = services
        .transfers
        .request(transfer_command(
            "TR-2",
            vec![TransferLineRequest {
                product_id: PRODUCT_A,
                quantity: 3,
            }],
        ))
        .await
        .unwrap();
    let mut too_much = HashMap::new();
    too_much.insert(lines2[0].id, 5);
    let err = services
        .transfers
        .approve(TENANT, transfer2.id, MANAGER, Some(too_much))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn short_receipt_records_variance_without_blocking() {
    let (_db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 20, dec!(100), "PO-1", MANAGER)
        .await
        .unwrap();

    let (transfer, lines) = services
        .transfers
        .request(transfer_command(
            "TR-1",
            vec![TransferLineRequest {
                product_id: PRODUCT_A,
                quantity: 10,
            }],
        ))
        .await
        .unwrap();
    services
        .transfers
        .approve(TENANT, transfer.id, MANAGER, None)
        .await
        .unwrap();
    services
        .transfers
        .execute(TENANT, transfer.id, MANAGER)
        .await
        .unwrap();

    let mut received = HashMap::new();
    received.insert(lines[0].id, 8);
    let transfer = services
        .transfers
        .receive(TENANT, transfer.id, MANAGER, Some(received))
        .await
        .unwrap();
    assert_eq!(transfer.status, TransferStatus::Completed.as_ref());

    let destination = services
        .stock
        .get_record(TENANT, WAREHOUSE_RETAIL, PRODUCT_A)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(destination.quantity, 8);

    let (_, lines) = services.transfers.get(TENANT, transfer.id).await.unwrap();
    // Two units lost in transit stay visible for audit.
    assert_eq!(lines[0].variance(), Some(2));

    // Receiving more than was sent is rejected.
    let (transfer2, lines2) = services
        .transfers
        .request(transfer_command(
            "TR-2",
            vec![TransferLineRequest {
                product_id: PRODUCT_A,
                quantity: 2,
            }],
        ))
        .await
        .unwrap();
    services
        .transfers
        .approve(TENANT, transfer2.id, MANAGER, None)
        .await
        .unwrap();
    services
        .transfers
        .execute(TENANT, transfer2.id, MANAGER)
        .await
        .unwrap();
    let mut over = HashMap::new();
    over.insert(lines2[0].id, 3);
    let err = services
        .transfers
        .receive(TENANT, transfer2.id, MANAGER, Some(over))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn execution_is_all_or_nothing_across_lines() {
    let (_db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 10, dec!(100), "PO-1", MANAGER)
        .await
        .unwrap();
    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_B, 2, dec!(100), "PO-2", MANAGER)
        .await
        .unwrap();

    let (transfer, _lines) = services
        .transfers
        .request(transfer_command(
            "TR-1",
            vec![
                TransferLineRequest {
                    product_id: PRODUCT_A,
                    quantity: 5,
                },
                TransferLineRequest {
                    product_id: PRODUCT_B,
                    quantity: 5,
                },
            ],
        ))
        .await
        .unwrap();
    services
        .transfers
        .approve(TENANT, transfer.id, MANAGER, None)
        .await
        .unwrap();

    let err = services
        .transfers
        .execute(TENANT, transfer.id, MANAGER)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { .. });

    // Neither line moved, and the transfer is still executable after a top-up.
    let a = services
        .stock
        .get_record(TENANT, WAREHOUSE_MAIN, PRODUCT_A)
        .await
        .unwrap()
        .unwrap();
    let b = services
        .stock
        .get_record(TENANT, WAREHOUSE_MAIN, PRODUCT_B)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.quantity, 10);
    assert_eq!(b.quantity, 2);

    let (transfer, _) = services.transfers.get(TENANT, transfer.id).await.unwrap();
    assert_eq!(transfer.status, TransferStatus::Approved.as_ref());
}

#[tokio::test]
async fn state_machine_rejects_out_of_order_transitions() {
    let (_db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 10, dec!(100), "PO-1", MANAGER)
        .await
        .unwrap();

    let (transfer, _) = services
        .transfers
        .request(transfer_command(
            "TR-1",
            vec![TransferLineRequest {
                product_id: PRODUCT_A,
                quantity: 5,
            }],
        ))
        .await
        .unwrap();

    // Execute and receive both need their predecessor states.
    let err = services
        .transfers
        .execute(TENANT, transfer.id, MANAGER)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition { .. });
    let err = services
        .transfers
        .receive(TENANT, transfer.id, MANAGER, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition { .. });

    // Cancel only applies to approved transfers; reject only to requested.
    let err = services
        .transfers
        .cancel(TENANT, transfer.id, MANAGER)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition { .. });

    services
        .transfers
        .approve(TENANT, transfer.id, MANAGER, None)
        .await
        .unwrap();
    let err = services
        .transfers
        .reject(TENANT, transfer.id, MANAGER, "late")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition { .. });

    services
        .transfers
        .execute(TENANT, transfer.id, MANAGER)
        .await
        .unwrap();
    let err = services
        .transfers
        .cancel(TENANT, transfer.id, MANAGER)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition { .. });
}

#[tokio::test]
async fn rejected_and_cancelled_transfers_never_move_stock() {
    let (_db, services) = setup().await;

    services
        .stock
        .apply_receipt(TENANT, WAREHOUSE_MAIN, PRODUCT_A, 10, dec!(100), "PO-1", MANAGER)
        .await
        .unwrap();

    let (rejected, _) = services
        .transfers
        .request(transfer_command(
            "TR-1",
            vec![TransferLineRequest {
                product_id: PRODUCT_A,
                quantity: 5,
            }],
        ))
        .await
        .unwrap();
    services
        .transfers
        .reject(TENANT, rejected.id, MANAGER, "not needed")
        .await
        .unwrap();

    let (cancelled, _) = services
        .transfers
        .request(transfer_command(
            "TR-2",
            vec![TransferLineRequest {
                product_id: PRODUCT_A,
                quantity: 5,
            }],
        ))
        .await
        .unwrap();
    services
        .transfers
        .approve(TENANT, cancelled.id, MANAGER, None)
        .await
        .unwrap();
    services
        .transfers
        .cancel(TENANT, cancelled.id, MANAGER)
        .await
        .unwrap();

    let record = services
        .stock
        .get_record(TENANT, WAREHOUSE_MAIN, PRODUCT_A)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.quantity, 10);
    assert_eq!(record.reserved, 0);
}

#[tokio::test]
async fn request_validation() {
    let (_db, services) = setup().await;

    let mut command = transfer_command(
        "TR-1",
        vec![TransferLineRequest {
            product_id: PRODUCT_A,
            quantity: 5,
        }],
    );
    command.to_warehouse_id = WAREHOUSE_MAIN;
    let err = services.transfers.request(command).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = services
        .transfers
        .request(transfer_command("TR-2", vec![]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = services
        .transfers
        .request(transfer_command(
            "TR-3",
            vec![TransferLineRequest {
                product_id: PRODUCT_A,
                quantity: 0,
            }],
        ))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidQuantity(_));
}
