//! Error types for blinkdb.

use std::time::Duration;

use thiserror::Error;

use crate::buffer::LockMode;
use crate::common::{PageId, TransactionId};

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a transaction was told to abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// A page lock could not be granted within the buffer pool's timeout.
    LockTimeout {
        page: PageId,
        mode: LockMode,
        waited: Duration,
    },
    /// A structural check in verification mode failed.
    InvariantViolation(String),
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::LockTimeout { page, mode, waited } => write!(
                f,
                "waited {}ms for {:?} lock on {}",
                waited.as_millis(),
                mode,
                page
            ),
            AbortReason::InvariantViolation(msg) => write!(f, "invariant violated: {}", msg),
        }
    }
}

/// All possible errors in blinkdb.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the backing store. Not retried internally.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page does not exist in the backing store.
    #[error("{0} not found")]
    PageNotFound(PageId),

    /// Page bytes failed checksum or layout validation.
    #[error("{page} is corrupted: {reason}")]
    Corruption { page: PageId, reason: String },

    /// The transaction must be unwound with `BufferPool::abort`.
    #[error("{txn} aborted: {reason}")]
    TransactionAborted {
        txn: TransactionId,
        reason: AbortReason,
    },

    /// A programming-contract violation, e.g. reaching a header page during
    /// a tree descent.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Eviction was needed but every cached page is dirty or in use.
    #[error("no clean page to evict from a buffer pool of {capacity} pages")]
    NoCleanPages { capacity: usize },
}

impl Error {
    /// True if the owning transaction has to be rolled back.
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::TransactionAborted { .. })
    }

    pub(crate) fn illegal(msg: impl Into<String>) -> Self {
        Error::IllegalState(msg.into())
    }
}
