use crate::txn::TxnId;

/// Reason a transaction was forced into [`crate::txn::TransactionState::Aborted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    LockOnShrinking,
    UpgradeConflict,
    IncompatibleUpgrade,
    SharedOnReadUncommitted,
    IntentionLockOnRow,
    TableLockNotPresent,
    TableUnlockedBeforeRows,
    NoLockHeld,
    DeadlockVictim,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AbortReason::LockOnShrinking => "lock requested while shrinking",
            AbortReason::UpgradeConflict => "another transaction is already upgrading this lock",
            AbortReason::IncompatibleUpgrade => "requested upgrade is not in the upgrade matrix",
            AbortReason::SharedOnReadUncommitted => "shared lock requested under read uncommitted",
            AbortReason::IntentionLockOnRow => "intention lock requested on a row",
            AbortReason::TableLockNotPresent => "no appropriate table lock held for row request",
            AbortReason::TableUnlockedBeforeRows => "table unlocked while rows are still held",
            AbortReason::NoLockHeld => "unlock requested for a lock not held",
            AbortReason::DeadlockVictim => "chosen as victim by the deadlock detector",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("index {0} is out of bounds")]
    OutOfBounds(usize),

    #[error("no frame is available for eviction")]
    NoFrameAvailable,

    #[error("page {0} is not resident in the buffer pool")]
    PageNotResident(crate::page::PageId),

    #[error("key already exists")]
    Duplicate,

    #[error("not found")]
    NotFound,

    #[error("transaction {0} aborted: {1}")]
    TransactionAbort(TxnId, AbortReason),

    #[error("invalid transaction id {0}")]
    InvalidTxn(TxnId),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, Error>;
