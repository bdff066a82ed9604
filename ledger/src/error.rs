//! Ledger error taxonomy.
//!
//! The `Display` text of each variant is what HTTP clients see in the
//! `error` field of a `500` envelope, so keep the messages short and free
//! of internal paths.

/// Errors returned by [`crate::Ledger`] operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The backing storage could not be created or opened.
    #[error("failed to open ledger: {0}")]
    Open(String),

    /// A block could not be written.
    #[error("failed to append block: {0}")]
    Append(String),

    /// Stored blocks could not be read back.
    #[error("failed to read ledger: {0}")]
    Read(String),

    /// A stored block does not hash or link the way it should.
    #[error("chain corrupted at block {index}: {reason}")]
    Corrupted { index: u64, reason: String },

    /// The ledger has already been closed.
    #[error("ledger is closed")]
    Closed,
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    /// Whether this error is the result of calling into a closed ledger.
    pub fn is_closed(&self) -> bool {
        matches!(self, LedgerError::Closed)
    }
}
