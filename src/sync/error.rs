use thiserror::Error;

use crate::order::Timestamp;

/// An older context asked for a lock held by a younger one.
///
/// This is the normal back-off signal of the protocol, not a fault. The
/// requester must release every lock it holds before it tries again.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{requester} rejected: lock is held by younger {owner}")]
pub struct Rejected {
    pub requester: Timestamp,
    pub owner: Timestamp,
}

/// Failure of one of the non-blocking or bounded acquire variants.
///
/// Every variant means the same thing to the caller: release everything and
/// retry.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    #[error(transparent)]
    Rejected(#[from] Rejected),
    #[error("{requester} would block on lock held by older {owner}")]
    WouldBlock {
        requester: Timestamp,
        owner: Timestamp,
    },
    #[error("{requester} timed out waiting on lock held by {owner}")]
    TimedOut {
        requester: Timestamp,
        owner: Timestamp,
    },
}

impl LockError {
    /// Timestamp of the context holding the lock when the attempt failed.
    pub fn owner(&self) -> Timestamp {
        match *self {
            LockError::Rejected(Rejected { owner, .. })
            | LockError::WouldBlock { owner, .. }
            | LockError::TimedOut { owner, .. } => owner,
        }
    }
}
