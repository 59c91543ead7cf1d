//! Sea-ORM entities backing the ledger.
//!
//! `stock_records` and `delegated_stocks` carry a `version` column used for
//! optimistic locking; every other table is either append-only
//! (`stock_movements`, `delegated_stock_movements`, `cash_movements`) or
//! guarded by a status state machine.

pub mod cash_movement;
pub mod delegated_stock;
pub mod delegated_stock_movement;
pub mod reconciliation;
pub mod stock_movement;
pub mod stock_record;
pub mod stock_reservation;
pub mod transfer;
pub mod transfer_line;
