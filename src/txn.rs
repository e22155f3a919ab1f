//! The transaction abstraction the lock manager depends on.
//!
//! A monotonic id counter behind a `lazy_static` singleton, with
//! `Arc<FairMutex<..>>` as the shared-handle shape. Transactions here exist
//! to drive two-phase locking, not durability, so `TransactionManager`
//! tracks held locks rather than dirtied pages.

use crate::error::AbortReason;
use crate::page::RecordId;
use lazy_static::lazy_static;
use parking_lot::FairMutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type TxnId = u64;
pub type TableOid = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
    IntentionShared,
    IntentionExclusive,
    SharedIntentionExclusive,
}

/// Held-lock bookkeeping for one transaction, consulted by the lock
/// manager when validating releases and by the deadlock detector when
/// tearing down an aborted txn's queue entries.
#[derive(Debug, Default)]
pub struct HeldLocks {
    pub tables: HashMap<TableOid, LockMode>,
    pub rows: HashMap<(TableOid, RecordId), LockMode>,
    pub rows_by_table: HashMap<TableOid, HashSet<RecordId>>,
}

pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    state: TransactionState,
    held: HeldLocks,
}

impl Transaction {
    fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            state: TransactionState::Growing,
            held: HeldLocks::default(),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn set_state(&mut self, state: TransactionState) {
        self.state = state;
    }

    pub fn abort(&mut self, _reason: AbortReason) {
        self.state = TransactionState::Aborted;
    }

    pub fn held_locks(&self) -> &HeldLocks {
        &self.held
    }

    pub fn held_locks_mut(&mut self) -> &mut HeldLocks {
        &mut self.held
    }
}

/// Kept minimal since there's no shadow-paging layer here; a B+-tree walk
/// simply releases page latches as it crabs down rather than registering
/// touched pages with the transaction.
pub struct TransactionManager {
    next_txn_id: AtomicU64,
    active: HashMap<TxnId, Transaction>,
}

pub type ArcTransactionManager = Arc<FairMutex<TransactionManager>>;

lazy_static! {
    static ref TM: ArcTransactionManager =
        Arc::new(FairMutex::new(TransactionManager::new()));
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_txn_id: AtomicU64::new(0),
            active: HashMap::new(),
        }
    }

    pub fn get() -> ArcTransactionManager {
        TM.clone()
    }

    pub fn begin(&mut self, isolation_level: IsolationLevel) -> TxnId {
        let id = self.next_txn_id.fetch_add(1, Ordering::Relaxed);
        self.active.insert(id, Transaction::new(id, isolation_level));
        id
    }

    pub fn get_transaction(&self, txn_id: TxnId) -> Option<&Transaction> {
        self.active.get(&txn_id)
    }

    pub fn get_transaction_mut(&mut self, txn_id: TxnId) -> Option<&mut Transaction> {
        self.active.get_mut(&txn_id)
    }

    /// Transitions to Committed. The lock manager's unlock-all path (run by
    /// the caller before this) is what actually releases the held locks.
    pub fn commit(&mut self, txn_id: TxnId) {
        if let Some(txn) = self.active.get_mut(&txn_id) {
            txn.set_state(TransactionState::Committed);
        }
    }

    pub fn abort(&mut self, txn_id: TxnId, reason: AbortReason) {
        if let Some(txn) = self.active.get_mut(&txn_id) {
            txn.abort(reason);
        }
    }

    pub fn active_ids(&self) -> Vec<TxnId> {
        self.active.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_assigns_monotonic_ids() {
        let mut tm = TransactionManager::new();
        let a = tm.begin(IsolationLevel::ReadCommitted);
        let b = tm.begin(IsolationLevel::ReadCommitted);
        assert!(b > a);
    }

    #[test]
    fn test_new_transaction_starts_growing() {
        let mut tm = TransactionManager::new();
        let id = tm.begin(IsolationLevel::RepeatableRead);
        assert_eq!(tm.get_transaction(id).unwrap().state(), TransactionState::Growing);
    }

    #[test]
    fn test_abort_is_terminal() {
        let mut tm = TransactionManager::new();
        let id = tm.begin(IsolationLevel::RepeatableRead);
        tm.abort(id, AbortReason::DeadlockVictim);
        assert_eq!(tm.get_transaction(id).unwrap().state(), TransactionState::Aborted);
    }
}
