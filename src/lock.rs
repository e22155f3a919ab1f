//! Multi-granularity two-phase lock manager: S/X/IS/IX/SIX table and row
//! locks, FIFO grant queues with upgrade priority, and background deadlock
//! detection over a wait-for graph.
//!
//! Acquisition/release protocol and the deadlock-detection shape follow the
//! standard multi-granularity 2PL design, expressed here with
//! `parking_lot::Mutex`/`Condvar` and an explicitly owned background thread
//! (`std::thread::spawn` plus a stop flag) rather than a runtime-managed task.

use crate::error::{AbortReason, DbResult, Error};
use crate::page::RecordId;
use crate::txn::{ArcTransactionManager, IsolationLevel, LockMode, TableOid, TransactionState, TxnId};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ResourceId {
    Table(TableOid),
    Row(TableOid, RecordId),
}

#[derive(Debug, Clone, Copy)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

#[derive(Default)]
struct LockRequestQueue {
    requests: Vec<LockRequest>,
    upgrading: Option<TxnId>,
}

struct QueueState {
    inner: Mutex<LockRequestQueue>,
    cv: Condvar,
}

impl QueueState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(LockRequestQueue::default()),
            cv: Condvar::new(),
        })
    }
}

/// `true` iff a lock held in `granted` does not block a request for `wanted`.
fn compatible(wanted: LockMode, granted: LockMode) -> bool {
    use LockMode::*;
    matches!(
        (wanted, granted),
        (IntentionShared, IntentionShared)
            | (IntentionShared, IntentionExclusive)
            | (IntentionShared, Shared)
            | (IntentionShared, SharedIntentionExclusive)
            | (IntentionExclusive, IntentionShared)
            | (IntentionExclusive, IntentionExclusive)
            | (Shared, IntentionShared)
            | (Shared, Shared)
            | (SharedIntentionExclusive, IntentionShared)
    )
}

fn can_upgrade(from: LockMode, to: LockMode) -> bool {
    use LockMode::*;
    matches!(
        (from, to),
        (IntentionShared, Shared)
            | (IntentionShared, Exclusive)
            | (IntentionShared, IntentionExclusive)
            | (IntentionShared, SharedIntentionExclusive)
            | (Shared, Exclusive)
            | (Shared, SharedIntentionExclusive)
            | (IntentionExclusive, Exclusive)
            | (IntentionExclusive, SharedIntentionExclusive)
            | (SharedIntentionExclusive, Exclusive)
    )
}

/// Re-evaluates a queue front-to-back, granting every request that's
/// compatible with everything granted ahead of it, stopping at the first
/// that isn't (FIFO), except that a pending upgrade must be granted before
/// any other pending request is considered.
fn try_grant_all(queue: &mut LockRequestQueue) {
    if let Some(upgrader) = queue.upgrading {
        let others_granted: Vec<LockMode> = queue
            .requests
            .iter()
            .filter(|r| r.granted && r.txn_id != upgrader)
            .map(|r| r.mode)
            .collect();
        let Some(idx) = queue.requests.iter().position(|r| r.txn_id == upgrader && !r.granted) else {
            queue.upgrading = None;
            return;
        };
        let mode = queue.requests[idx].mode;
        if others_granted.iter().all(|&g| compatible(mode, g)) {
            queue.requests[idx].granted = true;
            queue.upgrading = None;
        } else {
            return;
        }
    }

    let mut granted_modes: Vec<LockMode> = queue.requests.iter().filter(|r| r.granted).map(|r| r.mode).collect();
    for req in queue.requests.iter_mut() {
        if req.granted {
            continue;
        }
        if granted_modes.iter().all(|&g| compatible(req.mode, g)) {
            req.granted = true;
            granted_modes.push(req.mode);
        } else {
            break;
        }
    }
}

struct Inner {
    txn_manager: ArcTransactionManager,
    tables: Mutex<HashMap<TableOid, Arc<QueueState>>>,
    rows: Mutex<HashMap<(TableOid, RecordId), Arc<QueueState>>>,
}

impl Inner {
    fn table_queue(&self, oid: TableOid) -> Arc<QueueState> {
        self.tables.lock().entry(oid).or_insert_with(QueueState::new).clone()
    }

    fn row_queue(&self, oid: TableOid, rid: RecordId) -> Arc<QueueState> {
        self.rows
            .lock()
            .entry((oid, rid))
            .or_insert_with(QueueState::new)
            .clone()
    }

    fn is_aborted(&self, txn_id: TxnId) -> bool {
        matches!(
            self.txn_manager.lock().get_transaction(txn_id).map(|t| t.state()),
            Some(TransactionState::Aborted)
        )
    }

    /// Validates the request against the transaction's state and
    /// isolation level, aborting the transaction on rejection.
    fn check_gate(&self, txn_id: TxnId, mode: LockMode, is_row: bool) -> DbResult<()> {
        let mut tm = self.txn_manager.lock();
        let txn = tm.get_transaction_mut(txn_id).ok_or(Error::InvalidTxn(txn_id))?;
        let isolation = txn.isolation_level();
        let state = txn.state();

        let is_shared_like = matches!(
            mode,
            LockMode::Shared | LockMode::IntentionShared
        );
        if isolation == IsolationLevel::ReadUncommitted && is_shared_like {
            txn.abort(AbortReason::SharedOnReadUncommitted);
            return Err(Error::TransactionAbort(txn_id, AbortReason::SharedOnReadUncommitted));
        }

        let allowed = match (state, isolation) {
            (TransactionState::Growing, IsolationLevel::RepeatableRead) => true,
            (TransactionState::Growing, IsolationLevel::ReadCommitted) => true,
            (TransactionState::Growing, IsolationLevel::ReadUncommitted) => {
                if is_row {
                    mode == LockMode::Exclusive
                } else {
                    matches!(mode, LockMode::Exclusive | LockMode::IntentionExclusive)
                }
            }
            (TransactionState::Shrinking, IsolationLevel::RepeatableRead) => false,
            (TransactionState::Shrinking, IsolationLevel::ReadCommitted) => {
                if is_row {
                    mode == LockMode::Shared
                } else {
                    matches!(mode, LockMode::Shared | LockMode::IntentionShared)
                }
            }
            (TransactionState::Shrinking, IsolationLevel::ReadUncommitted) => false,
            _ => false,
        };

        if !allowed {
            txn.abort(AbortReason::LockOnShrinking);
            return Err(Error::TransactionAbort(txn_id, AbortReason::LockOnShrinking));
        }
        Ok(())
    }
}

/// Enforces multi-granularity two-phase locking for transactions accessing
/// tables and rows, with background deadlock detection.
pub struct LockManager {
    inner: Arc<Inner>,
    detector: Mutex<Option<DetectorHandle>>,
}

struct DetectorHandle {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl LockManager {
    pub fn new(txn_manager: ArcTransactionManager) -> Self {
        Self {
            inner: Arc::new(Inner {
                txn_manager,
                tables: Mutex::new(HashMap::new()),
                rows: Mutex::new(HashMap::new()),
            }),
            detector: Mutex::new(None),
        }
    }

    pub fn lock_table(&self, txn_id: TxnId, mode: LockMode, oid: TableOid) -> DbResult<bool> {
        self.inner.check_gate(txn_id, mode, false)?;

        let existing = {
            let mut tm = self.inner.txn_manager.lock();
            let txn = tm.get_transaction_mut(txn_id).ok_or(Error::InvalidTxn(txn_id))?;
            txn.held_locks().tables.get(&oid).copied()
        };
        if existing == Some(mode) {
            return Ok(true);
        }

        let qstate = self.inner.table_queue(oid);
        let mut queue = qstate.inner.lock();

        if let Some(old_mode) = existing {
            if queue.upgrading.is_some() {
                return Err(self.abort(txn_id, AbortReason::UpgradeConflict));
            }
            if !can_upgrade(old_mode, mode) {
                return Err(self.abort(txn_id, AbortReason::IncompatibleUpgrade));
            }
            queue.requests.retain(|r| r.txn_id != txn_id);
            queue.requests.push(LockRequest { txn_id, mode, granted: false });
            queue.upgrading = Some(txn_id);
        } else {
            queue.requests.push(LockRequest { txn_id, mode, granted: false });
        }
        try_grant_all(&mut queue);

        loop {
            if self.inner.is_aborted(txn_id) {
                queue.requests.retain(|r| r.txn_id != txn_id);
                if queue.upgrading == Some(txn_id) {
                    queue.upgrading = None;
                }
                try_grant_all(&mut queue);
                qstate.cv.notify_all();
                return Err(Error::TransactionAbort(txn_id, AbortReason::DeadlockVictim));
            }
            if queue.requests.iter().any(|r| r.txn_id == txn_id && r.granted) {
                break;
            }
            qstate.cv.wait(&mut queue);
        }

        self.inner
            .txn_manager
            .lock()
            .get_transaction_mut(txn_id)
            .ok_or(Error::InvalidTxn(txn_id))?
            .held_locks_mut()
            .tables
            .insert(oid, mode);
        Ok(true)
    }

    pub fn unlock_table(&self, txn_id: TxnId, oid: TableOid) -> DbResult<bool> {
        {
            let mut tm = self.inner.txn_manager.lock();
            let txn = tm.get_transaction_mut(txn_id).ok_or(Error::InvalidTxn(txn_id))?;
            if !txn.held_locks().tables.contains_key(&oid) {
                return Err(self.abort(txn_id, AbortReason::NoLockHeld));
            }
            if txn.held_locks().rows_by_table.get(&oid).is_some_and(|s| !s.is_empty()) {
                return Err(self.abort(txn_id, AbortReason::TableUnlockedBeforeRows));
            }
        }
        self.release_table(txn_id, oid, false)
    }

    fn release_table(&self, txn_id: TxnId, oid: TableOid, force: bool) -> DbResult<bool> {
        let released_mode = {
            let mut tm = self.inner.txn_manager.lock();
            let txn = tm.get_transaction_mut(txn_id).ok_or(Error::InvalidTxn(txn_id))?;
            let mode = txn.held_locks_mut().tables.remove(&oid);
            if !force {
                if let Some(mode) = mode {
                    self.transition_after_release(txn, mode);
                }
            }
            mode
        };
        if released_mode.is_none() {
            return Ok(false);
        }

        let qstate = self.inner.table_queue(oid);
        let mut queue = qstate.inner.lock();
        queue.requests.retain(|r| r.txn_id != txn_id);
        try_grant_all(&mut queue);
        qstate.cv.notify_all();
        Ok(true)
    }

    fn transition_after_release(&self, txn: &mut crate::txn::Transaction, mode: LockMode) {
        let should_shrink = match txn.isolation_level() {
            IsolationLevel::RepeatableRead => matches!(mode, LockMode::Shared | LockMode::Exclusive),
            IsolationLevel::ReadCommitted => mode == LockMode::Exclusive,
            IsolationLevel::ReadUncommitted => mode == LockMode::Exclusive,
        };
        if should_shrink && txn.state() == TransactionState::Growing {
            txn.set_state(TransactionState::Shrinking);
        }
    }

    pub fn lock_row(&self, txn_id: TxnId, mode: LockMode, oid: TableOid, rid: RecordId) -> DbResult<bool> {
        self.inner.check_gate(txn_id, mode, true)?;
        if matches!(
            mode,
            LockMode::IntentionShared | LockMode::IntentionExclusive | LockMode::SharedIntentionExclusive
        ) {
            return Err(self.abort(txn_id, AbortReason::IntentionLockOnRow));
        }

        {
            let mut tm = self.inner.txn_manager.lock();
            let txn = tm.get_transaction_mut(txn_id).ok_or(Error::InvalidTxn(txn_id))?;
            let table_mode = txn.held_locks().tables.get(&oid).copied();
            let ok = match mode {
                LockMode::Shared => table_mode.is_some(),
                LockMode::Exclusive => matches!(
                    table_mode,
                    Some(LockMode::IntentionExclusive | LockMode::SharedIntentionExclusive | LockMode::Exclusive)
                ),
                _ => unreachable!(),
            };
            if !ok {
                txn.abort(AbortReason::TableLockNotPresent);
                return Err(Error::TransactionAbort(txn_id, AbortReason::TableLockNotPresent));
            }
        }

        let existing = {
            let mut tm = self.inner.txn_manager.lock();
            let txn = tm.get_transaction_mut(txn_id).ok_or(Error::InvalidTxn(txn_id))?;
            txn.held_locks().rows.get(&(oid, rid)).copied()
        };
        if existing == Some(mode) {
            return Ok(true);
        }

        let qstate = self.inner.row_queue(oid, rid);
        let mut queue = qstate.inner.lock();

        if let Some(old_mode) = existing {
            if queue.upgrading.is_some() {
                return Err(self.abort(txn_id, AbortReason::UpgradeConflict));
            }
            if !can_upgrade(old_mode, mode) {
                return Err(self.abort(txn_id, AbortReason::IncompatibleUpgrade));
            }
            queue.requests.retain(|r| r.txn_id != txn_id);
            queue.requests.push(LockRequest { txn_id, mode, granted: false });
            queue.upgrading = Some(txn_id);
        } else {
            queue.requests.push(LockRequest { txn_id, mode, granted: false });
        }
        try_grant_all(&mut queue);

        loop {
            if self.inner.is_aborted(txn_id) {
                queue.requests.retain(|r| r.txn_id != txn_id);
                if queue.upgrading == Some(txn_id) {
                    queue.upgrading = None;
                }
                try_grant_all(&mut queue);
                qstate.cv.notify_all();
                return Err(Error::TransactionAbort(txn_id, AbortReason::DeadlockVictim));
            }
            if queue.requests.iter().any(|r| r.txn_id == txn_id && r.granted) {
                break;
            }
            qstate.cv.wait(&mut queue);
        }

        let mut tm = self.inner.txn_manager.lock();
        let txn = tm.get_transaction_mut(txn_id).ok_or(Error::InvalidTxn(txn_id))?;
        txn.held_locks_mut().rows.insert((oid, rid), mode);
        txn.held_locks_mut().rows_by_table.entry(oid).or_default().insert(rid);
        Ok(true)
    }

    pub fn unlock_row(&self, txn_id: TxnId, oid: TableOid, rid: RecordId, force: bool) -> DbResult<bool> {
        let released_mode = {
            let mut tm = self.inner.txn_manager.lock();
            let txn = tm.get_transaction_mut(txn_id).ok_or(Error::InvalidTxn(txn_id))?;
            let mode = txn.held_locks_mut().rows.remove(&(oid, rid));
            if mode.is_none() {
                return Err(self.abort(txn_id, AbortReason::NoLockHeld));
            }
            if let Some(set) = txn.held_locks_mut().rows_by_table.get_mut(&oid) {
                set.remove(&rid);
            }
            if !force {
                if let Some(mode) = mode {
                    self.transition_after_release(txn, mode);
                }
            }
            mode
        };
        if released_mode.is_none() {
            return Ok(false);
        }

        let qstate = self.inner.row_queue(oid, rid);
        let mut queue = qstate.inner.lock();
        queue.requests.retain(|r| r.txn_id != txn_id);
        try_grant_all(&mut queue);
        qstate.cv.notify_all();
        Ok(true)
    }

    /// Releases every lock the transaction holds without 2PL state
    /// transitions (it's already terminal): used on commit and abort.
    pub fn unlock_all(&self, txn_id: TxnId) {
        let (tables, rows) = {
            let mut tm = self.inner.txn_manager.lock();
            let Some(txn) = tm.get_transaction_mut(txn_id) else { return };
            let tables: Vec<TableOid> = txn.held_locks().tables.keys().copied().collect();
            let rows: Vec<(TableOid, RecordId)> = txn.held_locks().rows.keys().copied().collect();
            (tables, rows)
        };
        for (oid, rid) in rows {
            let _ = self.unlock_row(txn_id, oid, rid, true);
        }
        for oid in tables {
            let _ = self.release_table(txn_id, oid, true);
        }
    }

    fn abort(&self, txn_id: TxnId, reason: AbortReason) -> Error {
        if let Some(txn) = self.inner.txn_manager.lock().get_transaction_mut(txn_id) {
            txn.abort(reason);
        }
        Error::TransactionAbort(txn_id, reason)
    }

    /// Directed wait-for graph: edge `t1 -> t2` means `t1` is blocked
    /// waiting on a lock currently granted (incompatibly) to `t2`.
    fn build_wait_for_graph(&self) -> HashMap<TxnId, HashSet<TxnId>> {
        let mut graph: HashMap<TxnId, HashSet<TxnId>> = HashMap::new();
        let mut add_from_queue = |queue: &LockRequestQueue| {
            for p in queue.requests.iter().filter(|r| !r.granted) {
                for g in queue.requests.iter().filter(|r| r.granted && r.txn_id != p.txn_id) {
                    if !compatible(p.mode, g.mode) {
                        graph.entry(p.txn_id).or_default().insert(g.txn_id);
                    }
                }
            }
        };
        for qstate in self.inner.tables.lock().values() {
            add_from_queue(&qstate.inner.lock());
        }
        for qstate in self.inner.rows.lock().values() {
            add_from_queue(&qstate.inner.lock());
        }
        graph
    }

    /// Tri-color DFS cycle search. Returns the full cycle if one exists.
    fn find_cycle(graph: &HashMap<TxnId, HashSet<TxnId>>) -> Option<Vec<TxnId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }
        let mut color: HashMap<TxnId, Color> = graph.keys().map(|&t| (t, Color::White)).collect();
        let mut stack: Vec<TxnId> = Vec::new();

        fn visit(
            node: TxnId,
            graph: &HashMap<TxnId, HashSet<TxnId>>,
            color: &mut HashMap<TxnId, Color>,
            stack: &mut Vec<TxnId>,
        ) -> Option<Vec<TxnId>> {
            color.insert(node, Color::Gray);
            stack.push(node);
            if let Some(neighbors) = graph.get(&node) {
                let mut sorted: Vec<_> = neighbors.iter().copied().collect();
                sorted.sort_unstable();
                for next in sorted {
                    match color.get(&next).copied().unwrap_or(Color::White) {
                        Color::White => {
                            if let Some(cycle) = visit(next, graph, color, stack) {
                                return Some(cycle);
                            }
                        }
                        Color::Gray => {
                            let start = stack.iter().position(|&t| t == next).unwrap();
                            return Some(stack[start..].to_vec());
                        }
                        Color::Black => {}
                    }
                }
            }
            stack.pop();
            color.insert(node, Color::Black);
            None
        }

        let mut starts: Vec<_> = graph.keys().copied().collect();
        starts.sort_unstable();
        for start in starts {
            if color[&start] == Color::White {
                if let Some(cycle) = visit(start, graph, &mut color, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    /// Runs one detection pass: rebuild the graph, repeatedly abort the
    /// youngest txn on any cycle until none remain.
    fn run_detection_pass(&self) {
        loop {
            let graph = self.build_wait_for_graph();
            let Some(cycle) = Self::find_cycle(&graph) else {
                return;
            };
            let victim = *cycle.iter().max().unwrap();
            crate::printdbg!("deadlock detected, aborting txn {victim}");

            {
                let mut tm = self.inner.txn_manager.lock();
                if let Some(txn) = tm.get_transaction_mut(victim) {
                    txn.abort(AbortReason::DeadlockVictim);
                }
            }

            for qstate in self.inner.tables.lock().values().cloned().collect::<Vec<_>>() {
                let mut queue = qstate.inner.lock();
                let before = queue.requests.len();
                queue.requests.retain(|r| r.txn_id != victim);
                if queue.upgrading == Some(victim) {
                    queue.upgrading = None;
                }
                if queue.requests.len() != before {
                    try_grant_all(&mut queue);
                    qstate.cv.notify_all();
                }
            }
            for qstate in self.inner.rows.lock().values().cloned().collect::<Vec<_>>() {
                let mut queue = qstate.inner.lock();
                let before = queue.requests.len();
                queue.requests.retain(|r| r.txn_id != victim);
                if queue.upgrading == Some(victim) {
                    queue.upgrading = None;
                }
                if queue.requests.len() != before {
                    try_grant_all(&mut queue);
                    qstate.cv.notify_all();
                }
            }
        }
    }

    pub fn start_cycle_detection(&self, interval: Duration) {
        let mut detector = self.detector.lock();
        if detector.is_some() {
            return;
        }
        let stop = Arc::new(AtomicBool::new(false));
        let inner = self.inner.clone();
        let stop_clone = stop.clone();
        let handle = std::thread::spawn(move || {
            let lm = LockManager {
                inner,
                detector: Mutex::new(None),
            };
            while !stop_clone.load(Ordering::Relaxed) {
                std::thread::sleep(interval);
                if stop_clone.load(Ordering::Relaxed) {
                    break;
                }
                lm.run_detection_pass();
            }
        });
        *detector = Some(DetectorHandle { stop, handle });
    }

    pub fn stop_cycle_detection(&self) {
        let handle = self.detector.lock().take();
        if let Some(DetectorHandle { stop, handle }) = handle {
            stop.store(true, Ordering::Relaxed);
            let _ = handle.join();
        }
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        self.stop_cycle_detection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::TransactionManager;

    fn setup() -> (LockManager, ArcTransactionManager) {
        let tm = Arc::new(parking_lot::FairMutex::new(TransactionManager::new()));
        (LockManager::new(tm.clone()), tm)
    }

    #[test]
    fn test_shared_locks_on_same_table_are_compatible() {
        let (lm, tm) = setup();
        let a = tm.lock().begin(IsolationLevel::RepeatableRead);
        let b = tm.lock().begin(IsolationLevel::RepeatableRead);
        assert!(lm.lock_table(a, LockMode::Shared, 1).unwrap());
        assert!(lm.lock_table(b, LockMode::Shared, 1).unwrap());
    }

    #[test]
    fn test_exclusive_table_lock_requires_no_conflicting_grant() {
        let (lm, tm) = setup();
        let a = tm.lock().begin(IsolationLevel::RepeatableRead);
        assert!(lm.lock_table(a, LockMode::Exclusive, 1).unwrap());
        assert!(lm.unlock_table(a, 1).unwrap());
    }

    #[test]
    fn test_row_lock_requires_table_intent_lock() {
        let (lm, tm) = setup();
        let a = tm.lock().begin(IsolationLevel::RepeatableRead);
        let rid = RecordId::new(5, 0);
        assert!(lm.lock_row(a, LockMode::Shared, 1, rid).is_err());

        lm.lock_table(a, LockMode::IntentionShared, 1).unwrap();
        assert!(lm.lock_row(a, LockMode::Shared, 1, rid).unwrap());
    }

    #[test]
    fn test_intention_lock_on_row_rejected() {
        let (lm, tm) = setup();
        let a = tm.lock().begin(IsolationLevel::RepeatableRead);
        let rid = RecordId::new(5, 0);
        assert!(lm.lock_row(a, LockMode::IntentionShared, 1, rid).is_err());
    }

    #[test]
    fn test_unlock_table_before_rows_rejected() {
        let (lm, tm) = setup();
        let a = tm.lock().begin(IsolationLevel::RepeatableRead);
        let rid = RecordId::new(5, 0);
        lm.lock_table(a, LockMode::IntentionExclusive, 1).unwrap();
        lm.lock_row(a, LockMode::Exclusive, 1, rid).unwrap();
        assert!(lm.unlock_table(a, 1).is_err());
        lm.unlock_row(a, 1, rid, false).unwrap();
        assert!(lm.unlock_table(a, 1).unwrap());
    }

    #[test]
    fn test_read_uncommitted_rejects_shared() {
        let (lm, tm) = setup();
        let a = tm.lock().begin(IsolationLevel::ReadUncommitted);
        assert!(lm.lock_table(a, LockMode::Shared, 1).is_err());
        assert_eq!(tm.lock().get_transaction(a).unwrap().state(), TransactionState::Aborted);
    }

    #[test]
    fn test_shrinking_repeatable_read_rejects_any_lock() {
        let (lm, tm) = setup();
        let a = tm.lock().begin(IsolationLevel::RepeatableRead);
        lm.lock_table(a, LockMode::Shared, 1).unwrap();
        lm.unlock_table(a, 1).unwrap();
        assert_eq!(tm.lock().get_transaction(a).unwrap().state(), TransactionState::Shrinking);
        assert!(lm.lock_table(a, LockMode::Shared, 2).is_err());
    }

    #[test]
    fn test_upgrade_conflict_when_two_txns_try_to_upgrade() {
        let (lm, tm) = setup();
        let a = tm.lock().begin(IsolationLevel::RepeatableRead);
        let b = tm.lock().begin(IsolationLevel::RepeatableRead);
        lm.lock_table(a, LockMode::Shared, 1).unwrap();
        lm.lock_table(b, LockMode::Shared, 1).unwrap();

        // a's upgrade can't proceed yet (b still holds S), so it enters the
        // queue as upgrader; b attempting an upgrade concurrently while a's
        // upgrade is registered must see UpgradeConflict.
        let qstate = lm.inner.table_queue(1);
        qstate.inner.lock().upgrading = Some(a);
        assert!(lm.lock_table(b, LockMode::Exclusive, 1).is_err());
    }

    #[test]
    fn test_cycle_detection_picks_youngest_victim() {
        let mut graph = HashMap::new();
        graph.insert(1u64, HashSet::from([2u64]));
        graph.insert(2u64, HashSet::from([3u64]));
        graph.insert(3u64, HashSet::from([1u64]));
        let cycle = LockManager::find_cycle(&graph).unwrap();
        assert_eq!(*cycle.iter().max().unwrap(), 3);
    }

    #[test]
    fn test_no_cycle_returns_none() {
        let mut graph = HashMap::new();
        graph.insert(1u64, HashSet::from([2u64]));
        graph.insert(2u64, HashSet::new());
        assert!(LockManager::find_cycle(&graph).is_none());
    }
}
