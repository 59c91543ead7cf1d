use crate::errors::ServiceError;
use std::future::Future;
use tracing::warn;

pub mod delegation;
pub mod reconciliation;
pub mod reservations;
pub mod stock;
pub mod transfers;

pub use delegation::DelegationService;
pub use reconciliation::ReconciliationService;
pub use reservations::ReservationService;
pub use stock::StockService;
pub use transfers::TransferService;

/// Default retry budget for optimistic-lock conflicts.
pub const DEFAULT_CONFLICT_RETRY_ATTEMPTS: u32 = 3;

/// Re-runs `op` while it fails with `ConcurrencyConflict`, up to
/// `max_attempts` total attempts. Every other error, and success, passes
/// straight through. Each attempt must open its own transaction so a rolled
/// back conflict re-reads fresh state.
pub(crate) async fn with_conflict_retry<T, F, Fut>(
    max_attempts: u32,
    mut op: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Err(err @ ServiceError::ConcurrencyConflict(_)) => {
                if attempt >= max_attempts {
                    return Err(err);
                }
                warn!(attempt, max_attempts, error = %err, "optimistic lock conflict, retrying");
                attempt += 1;
            }
            other => return other,
        }
    }
}
