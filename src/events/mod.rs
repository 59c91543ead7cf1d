use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Domain events emitted after a command commits. Consumers (alerting,
/// reporting, outbound sync) subscribe through the processing loop; the
/// ledger itself never reacts to its own events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    StockReceived {
        tenant_id: Uuid,
        product_id: Uuid,
        warehouse_id: Uuid,
        quantity: i32,
        unit_cost: Decimal,
        new_quantity: i32,
        new_cost_average: Decimal,
        reference: String,
    },
    StockConsumed {
        tenant_id: Uuid,
        product_id: Uuid,
        warehouse_id: Uuid,
        quantity: i32,
        movement_type: String,
        new_quantity: i32,
        reference: String,
    },
    StockAdjusted {
        tenant_id: Uuid,
        product_id: Uuid,
        warehouse_id: Uuid,
        delta: i32,
        new_quantity: i32,
        reason: String,
        reference: String,
    },
    StockReserved {
        tenant_id: Uuid,
        product_id: Uuid,
        warehouse_id: Uuid,
        quantity: i32,
        reference: String,
    },
    ReservationReleased {
        tenant_id: Uuid,
        product_id: Uuid,
        warehouse_id: Uuid,
        quantity: i32,
        reference: String,
    },
    ReservationCommitted {
        tenant_id: Uuid,
        product_id: Uuid,
        warehouse_id: Uuid,
        quantity: i32,
        reference: String,
    },
    TransferRequested {
        transfer_id: Uuid,
        reference: String,
    },
    TransferApproved {
        transfer_id: Uuid,
    },
    TransferRejected {
        transfer_id: Uuid,
    },
    TransferCancelled {
        transfer_id: Uuid,
    },
    TransferExecuted {
        transfer_id: Uuid,
        reference: String,
        line_count: usize,
    },
    TransferReceived {
        transfer_id: Uuid,
        reference: String,
        variance_units: i32,
    },
    StockDelegated {
        tenant_id: Uuid,
        server_id: Uuid,
        batch_reference: String,
        item_count: usize,
    },
    DelegatedSaleRecorded {
        delegated_stock_id: Uuid,
        quantity: i32,
        amount: Decimal,
    },
    DelegatedStockReturned {
        delegated_stock_id: Uuid,
        quantity: i32,
    },
    DelegatedLossDeclared {
        delegated_stock_id: Uuid,
        quantity: i32,
    },
    ReconciliationStarted {
        reconciliation_id: Uuid,
        server_id: Uuid,
        reference: String,
    },
    ReconciliationSubmitted {
        reconciliation_id: Uuid,
        cash_collected: Decimal,
    },
    ReconciliationValidated {
        reconciliation_id: Uuid,
        cash_collected: Decimal,
        returned_units: i32,
    },
    ReconciliationDisputed {
        reconciliation_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {e}"))
    }
}

/// Builds a connected sender/receiver pair.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Event processing loop. Downstream consumers hook in here; the default
/// implementation logs every event so the stream is observable in
/// development and tests.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        info!(event = ?event, "ledger event");
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_and_receive() {
        let (sender, mut rx) = channel(4);
        sender
            .send(Event::TransferApproved {
                transfer_id: Uuid::nil(),
            })
            .await
            .unwrap();
        match rx.recv().await {
            Some(Event::TransferApproved { transfer_id }) => assert!(transfer_id.is_nil()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (sender, rx) = channel(1);
        drop(rx);
        let result = sender
            .send(Event::TransferApproved {
                transfer_id: Uuid::nil(),
            })
            .await;
        assert!(result.is_err());
    }
}
