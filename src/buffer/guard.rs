//! RAII page guards.
//!
//! Guards own `(bpm, page_id)` rather than `(bpm, frame)`: the page table
//! can remap a `page_id` to a different frame between fetches of *other*
//! pages, so a guard that outlives a single fetch call must name the page,
//! not the frame, to always refer to the same logical page.

use super::{ArcBufferPool, BufferPoolManager};
use crate::latch::Latch;
use crate::page::{Page, PageId};
use std::sync::Arc;

/// Pinned, but unlatched: safe to read snapshot-style fields like
/// `page_id`, not safe for concurrent content access across threads.
pub struct BasicPageGuard {
    bpm: ArcBufferPool,
    page_id: PageId,
}

impl BasicPageGuard {
    pub(super) fn new(bpm: ArcBufferPool, page_id: PageId) -> Self {
        Self { bpm, page_id }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn with_page<R>(&self, f: impl FnOnce(&Page) -> R) -> R {
        let pool = self.bpm.lock();
        f(pool.frame_for(self.page_id).page())
    }

    pub fn with_page_mut<R>(&mut self, f: impl FnOnce(&mut Page) -> R) -> R {
        let mut pool = self.bpm.lock();
        f(pool.frame_for_mut(self.page_id).page_mut())
    }

    pub fn upgrade_read(self) -> ReadPageGuard {
        ReadPageGuard::from_basic(self)
    }

    pub fn upgrade_write(self) -> WritePageGuard {
        WritePageGuard::from_basic(self)
    }
}

impl Drop for BasicPageGuard {
    fn drop(&mut self) {
        BufferPoolManager::unpin_page(&self.bpm, self.page_id, false);
    }
}

/// Pinned and shared-latched: any number of readers, no concurrent writer.
pub struct ReadPageGuard {
    inner: BasicPageGuard,
    latch: Arc<Latch>,
}

impl ReadPageGuard {
    pub(super) fn new(bpm: ArcBufferPool, page_id: PageId, latch: Arc<Latch>) -> Self {
        latch.lock_shared();
        Self {
            inner: BasicPageGuard::new(bpm, page_id),
            latch,
        }
    }

    fn from_basic(inner: BasicPageGuard) -> Self {
        let latch = inner.bpm.lock().frame_for(inner.page_id).latch();
        latch.lock_shared();
        Self { inner, latch }
    }

    pub fn page_id(&self) -> PageId {
        self.inner.page_id
    }

    pub fn with_page<R>(&self, f: impl FnOnce(&Page) -> R) -> R {
        self.inner.with_page(f)
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        self.latch.unlock_shared();
    }
}

/// Pinned and exclusive-latched: the sole reader or writer. Marks the page
/// dirty on acquisition since a write guard is only ever taken to mutate.
pub struct WritePageGuard {
    inner: BasicPageGuard,
    latch: Arc<Latch>,
}

impl WritePageGuard {
    pub(super) fn new(bpm: ArcBufferPool, page_id: PageId, latch: Arc<Latch>) -> Self {
        latch.lock_exclusive();
        let mut inner = BasicPageGuard::new(bpm, page_id);
        inner.with_page_mut(|p| p.mark_dirty());
        Self { inner, latch }
    }

    fn from_basic(mut inner: BasicPageGuard) -> Self {
        let latch = inner.bpm.lock().frame_for(inner.page_id).latch();
        latch.lock_exclusive();
        inner.with_page_mut(|p| p.mark_dirty());
        Self { inner, latch }
    }

    pub fn page_id(&self) -> PageId {
        self.inner.page_id
    }

    pub fn with_page<R>(&self, f: impl FnOnce(&Page) -> R) -> R {
        self.inner.with_page(f)
    }

    pub fn with_page_mut<R>(&mut self, f: impl FnOnce(&mut Page) -> R) -> R {
        self.inner.with_page_mut(f)
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.latch.unlock_exclusive();
    }
}
