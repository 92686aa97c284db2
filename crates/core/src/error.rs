//! Ledger error model.

use thiserror::Error;

/// Result type used across the ledger domain.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Deterministic guard failure raised by a counter operation.
///
/// Keep this focused on the arithmetic guards: these are the only ways a
/// counter operation can fail. Identifier parse failures surface the
/// underlying `uuid::Error` at the id boundary instead.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Attempted a unit decrement while the count is already 0.
    #[error("underflow on unit decrement")]
    UnderflowUnit,

    /// Attempted an amount decrement where the amount exceeds the count.
    #[error("underflow on amount decrement: amount {amount} exceeds count {count}")]
    UnderflowAmount { amount: u64, count: u64 },
}

impl LedgerError {
    /// Stable numeric code for the hosted contract surface.
    ///
    /// Unit underflow is code 1, amount underflow is code 2.
    pub const fn code(&self) -> u64 {
        match self {
            LedgerError::UnderflowUnit => 1,
            LedgerError::UnderflowAmount { .. } => 2,
        }
    }
}
