//! A reader-writer latch with manual raw lock/unlock calls rather than scope
//! guards, so it can be driven from `Drop` impls on page guards that hold an
//! `Arc<Latch>` cloned out of a frame (an ordinary `RwLockReadGuard` can't
//! outlive the borrow of the `RwLock` it came from).

use parking_lot::lock_api::{RawRwLock, RawRwLockUpgrade};
use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct Latch {
    lock: RwLock<()>,
}

impl Latch {
    pub fn new() -> Self {
        Self {
            lock: RwLock::new(()),
        }
    }

    pub fn lock_shared(&self) {
        unsafe { self.lock.raw() }.lock_shared();
    }

    pub fn unlock_shared(&self) {
        unsafe { self.lock.raw().unlock_shared() };
    }

    pub fn lock_exclusive(&self) {
        unsafe { self.lock.raw() }.lock_exclusive();
    }

    pub fn try_lock_exclusive(&self) -> bool {
        unsafe { self.lock.raw() }.try_lock_exclusive()
    }

    pub fn unlock_exclusive(&self) {
        unsafe { self.lock.raw().unlock_exclusive() };
    }

    /// Crabbing latch-coupling: acquire shared, optionally upgrade.
    pub fn lock_upgradable(&self) {
        unsafe { self.lock.raw() }.lock_upgradable()
    }

    pub fn upgrade_to_exclusive(&self) {
        unsafe { self.lock.raw().upgrade() }
    }

    pub fn unlock_upgradable(&self) {
        unsafe { self.lock.raw().unlock_upgradable() }
    }

    #[allow(unused)]
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}
