use sea_orm::error::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// Error taxonomy for ledger commands.
///
/// Business-rule failures (`InvalidQuantity`, the three `Insufficient*`
/// variants, `DuplicateOperation`, `InvalidStateTransition`) leave state
/// untouched and carry enough context for the caller to render a message.
/// `ConcurrencyConflict` is the only variant retried by the operation
/// wrappers; `InvariantViolation` signals a programmer error and aborts the
/// enclosing transaction.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Insufficient stock for product {product_id} in warehouse {warehouse_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: Uuid,
        warehouse_id: Uuid,
        available: i32,
        requested: i32,
    },

    #[error("Insufficient available quantity for product {product_id} in warehouse {warehouse_id}: available {available}, requested {requested}")]
    InsufficientAvailable {
        product_id: Uuid,
        warehouse_id: Uuid,
        available: i32,
        requested: i32,
    },

    #[error("Insufficient delegated quantity on {delegated_stock_id}: remaining {remaining}, requested {requested}")]
    InsufficientQuantity {
        delegated_stock_id: Uuid,
        remaining: i32,
        requested: i32,
    },

    #[error("Duplicate operation: {0}")]
    DuplicateOperation(String),

    #[error("Invalid state transition for {entity} {id}: cannot {action} from '{from}'")]
    InvalidStateTransition {
        entity: &'static str,
        id: Uuid,
        from: String,
        action: &'static str,
    },

    #[error("Concurrent modification: {0}")]
    ConcurrencyConflict(String),

    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Event error: {0}")]
    EventError(String),
}

impl ServiceError {
    /// Helper matching the common `map_err(ServiceError::db_error)` call sites.
    pub fn db_error(err: DbErr) -> Self {
        ServiceError::DatabaseError(err)
    }

    /// Only optimistic-lock conflicts are safe to retry automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::ConcurrencyConflict(_))
    }

    /// Invariant violations must halt the unit of work rather than persist
    /// corrupted state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServiceError::InvariantViolation(_))
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(errors.to_string())
    }
}
