//! Buffer pool manager: maps `page_id` to a resident frame, pinning it for
//! callers and writing dirty victims back to disk on eviction.
//!
//! `Arc<Mutex<..>>` handle shape, `printdbg!`/`get_caller_name!` tracing, and
//! free-list-then-replacer frame acquisition. Eviction is driven by
//! `LruKReplacer` rather than plain LRU, and the mutex is a single coarse
//! `parking_lot::Mutex` (no txn-scoped frame tables — that machinery belongs
//! to a WAL layer this crate does not implement).

mod frame;
mod guard;
mod replacer;

use crate::config::{Config, PAGE_SIZE};
use crate::error::{DbResult, Error};
use crate::page::{Page, PageId};
use crate::{get_caller_name, printdbg};
use frame::Frame;
pub use frame::FrameId;
pub use guard::{BasicPageGuard, ReadPageGuard, WritePageGuard};
use parking_lot::Mutex;
use replacer::LruKReplacer;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

pub type ArcBufferPool = Arc<Mutex<BufferPoolManager>>;

pub struct BufferPoolManager {
    disk: crate::disk::DiskManager,
    frames: Vec<Frame>,
    free_frames: VecDeque<FrameId>,
    page_table: HashMap<PageId, FrameId>,
    replacer: LruKReplacer,
}

impl BufferPoolManager {
    pub fn new(config: &Config) -> Self {
        let frames = (0..config.pool_size).map(Frame::new).collect();
        Self {
            disk: crate::disk::DiskManager::new(&config.storage_path),
            frames,
            free_frames: (0..config.pool_size).collect(),
            page_table: HashMap::new(),
            replacer: LruKReplacer::new(config.replacer_k, config.pool_size),
        }
    }

    pub fn shared(config: &Config) -> ArcBufferPool {
        Arc::new(Mutex::new(Self::new(config)))
    }

    fn frame_for(&self, page_id: PageId) -> &Frame {
        let frame_id = self.page_table[&page_id];
        &self.frames[frame_id]
    }

    fn frame_for_mut(&mut self, page_id: PageId) -> &mut Frame {
        let frame_id = self.page_table[&page_id];
        &mut self.frames[frame_id]
    }

    fn find_free_frame(&mut self) -> DbResult<FrameId> {
        if let Some(frame_id) = self.free_frames.pop_front() {
            return Ok(frame_id);
        }
        let frame_id = self.replacer.evict()?;
        self.flush_victim(frame_id)?;
        self.page_table.remove(&self.frames[frame_id].page().get_page_id());
        Ok(frame_id)
    }

    fn flush_victim(&mut self, frame_id: FrameId) -> DbResult<()> {
        let frame = &mut self.frames[frame_id];
        debug_assert_eq!(frame.pin_count(), 0, "evicting a pinned frame");
        let page = frame.page_mut();
        if page.is_dirty() {
            printdbg!(
                "flushing dirty page {} before eviction (frame {frame_id})",
                page.get_page_id()
            );
            self.disk.write_page(page.get_page_id(), page.raw_data())?;
            page.mark_clean();
        }
        Ok(())
    }

    fn install_fresh_page(&mut self, frame_id: FrameId, page_id: PageId) -> DbResult<()> {
        let mut page = Page::new();
        page.set_page_id(page_id);
        let frame = &mut self.frames[frame_id];
        frame.set_page(page);
        frame.pin();
        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false)?;
        Ok(())
    }

    fn new_page_frame(&mut self) -> DbResult<PageId> {
        let frame_id = self.find_free_frame()?;
        let page_id = self.disk.allocate_page_id();
        self.install_fresh_page(frame_id, page_id)?;
        printdbg!("{} created page {page_id} (frame {frame_id})", get_caller_name!());
        Ok(page_id)
    }

    pub fn new_page(&mut self) -> Option<PageId> {
        self.new_page_frame().ok()
    }

    pub fn new_page_guarded(bpm: &ArcBufferPool) -> Option<BasicPageGuard> {
        let page_id = bpm.lock().new_page_frame().ok()?;
        Some(BasicPageGuard::new(bpm.clone(), page_id))
    }

    fn fetch_page_frame(&mut self, page_id: PageId) -> DbResult<()> {
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            let frame = &mut self.frames[frame_id];
            frame.pin();
            self.replacer.record_access(frame_id)?;
            self.replacer.set_evictable(frame_id, false)?;
            return Ok(());
        }

        let frame_id = self.find_free_frame()?;
        let mut buf = [0u8; PAGE_SIZE];
        self.disk.read_page(page_id, &mut buf)?;

        let frame = &mut self.frames[frame_id];
        frame.page_mut().load_from_disk(page_id, buf);
        frame.pin();
        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false)?;

        printdbg!("{} fetched page {page_id} from disk (frame {frame_id})", get_caller_name!());
        Ok(())
    }

    pub fn fetch_page_basic(bpm: &ArcBufferPool, page_id: PageId) -> DbResult<BasicPageGuard> {
        bpm.lock().fetch_page_frame(page_id)?;
        Ok(BasicPageGuard::new(bpm.clone(), page_id))
    }

    pub fn fetch_page_read(bpm: &ArcBufferPool, page_id: PageId) -> DbResult<ReadPageGuard> {
        let latch = {
            let mut pool = bpm.lock();
            pool.fetch_page_frame(page_id)?;
            pool.frame_for(page_id).latch()
        };
        Ok(ReadPageGuard::new(bpm.clone(), page_id, latch))
    }

    pub fn fetch_page_write(bpm: &ArcBufferPool, page_id: PageId) -> DbResult<WritePageGuard> {
        let latch = {
            let mut pool = bpm.lock();
            pool.fetch_page_frame(page_id)?;
            pool.frame_for(page_id).latch()
        };
        Ok(WritePageGuard::new(bpm.clone(), page_id, latch))
    }

    /// Decrements pin count; returns `false` (never panics) if the page
    /// isn't resident or was already fully unpinned, since a caller's
    /// double-unpin is a logic error in *their* code, not an invariant
    /// violation of the pool.
    pub fn unpin(&mut self, page_id: PageId, dirty: bool) -> bool {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            return false;
        };
        let frame = &mut self.frames[frame_id];
        if frame.pin_count() == 0 {
            return false;
        }
        if dirty {
            frame.page_mut().mark_dirty();
        }
        let remaining = frame.unpin();
        printdbg!("{} unpinned page {page_id} (frame {frame_id}), pin count {remaining}", get_caller_name!());
        if remaining == 0 {
            let _ = self.replacer.set_evictable(frame_id, true);
        }
        true
    }

    pub fn unpin_page(bpm: &ArcBufferPool, page_id: PageId, dirty: bool) -> bool {
        bpm.lock().unpin(page_id, dirty)
    }

    pub fn flush_page(&mut self, page_id: PageId) -> DbResult<()> {
        let frame_id = *self.page_table.get(&page_id).ok_or(Error::PageNotResident(page_id))?;
        let page = self.frames[frame_id].page_mut();
        self.disk.write_page(page_id, page.raw_data())?;
        page.mark_clean();
        Ok(())
    }

    pub fn flush_all(&mut self) -> DbResult<()> {
        let page_ids: Vec<PageId> = self.page_table.keys().copied().collect();
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Removes a page entirely. Only valid when unpinned; writes back if
    /// dirty, then returns the frame to the free list.
    pub fn delete_page(&mut self, page_id: PageId) -> DbResult<bool> {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            return Ok(false);
        };
        if self.frames[frame_id].pin_count() > 0 {
            return Ok(false);
        }
        let page = self.frames[frame_id].page_mut();
        if page.is_dirty() {
            self.disk.write_page(page_id, page.raw_data())?;
        }
        page.reset();
        self.page_table.remove(&page_id);
        let _ = self.replacer.remove(frame_id);
        self.free_frames.push_back(frame_id);
        Ok(true)
    }

    #[cfg(test)]
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let frame_id = *self.page_table.get(&page_id)?;
        Some(self.frames[frame_id].pin_count())
    }

    /// Gives `f` simultaneous mutable access to two distinct resident pages.
    /// Needed by B+-tree split/merge, which must write both halves of a node
    /// pair at once. Callers already hold a `WritePageGuard` on each page, so
    /// this only needs a brief pool-mutex lock to turn the two page ids into
    /// disjoint `&mut Page` borrows via `split_at_mut` over the frame table.
    pub fn with_two_pages_mut<R>(bpm: &ArcBufferPool, a: PageId, b: PageId, f: impl FnOnce(&mut Page, &mut Page) -> R) -> R {
        let mut pool = bpm.lock();
        let frame_a = pool.page_table[&a];
        let frame_b = pool.page_table[&b];
        debug_assert_ne!(frame_a, frame_b, "with_two_pages_mut called with the same page twice");

        let (lo, hi, swapped) = if frame_a < frame_b { (frame_a, frame_b, false) } else { (frame_b, frame_a, true) };
        let (left, right) = pool.frames.split_at_mut(hi);
        let (pa, pb) = (left[lo].page_mut(), right[0].page_mut());
        if swapped {
            f(pb, pa)
        } else {
            f(pa, pb)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::test_path;

    fn test_config(pool_size: usize) -> Config {
        let mut c = Config::new(pool_size, 2);
        c.storage_path = test_path();
        c
    }

    #[test]
    fn test_new_page_then_fetch_round_trips() {
        let bpm = BufferPoolManager::shared(&test_config(3));
        let page_id = BufferPoolManager::new_page_guarded(&bpm).unwrap().page_id();

        {
            let mut guard = BufferPoolManager::fetch_page_write(&bpm, page_id).unwrap();
            guard.with_page_mut(|p| p.write_bytes(0, 4, &[1, 2, 3, 4]));
        }

        let guard = BufferPoolManager::fetch_page_read(&bpm, page_id).unwrap();
        assert_eq!(guard.with_page(|p| p.read_bytes(0, 4).to_vec()), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_pool_exhaustion_blocks_new_page_until_unpin() {
        let bpm = BufferPoolManager::shared(&test_config(2));
        let g1 = BufferPoolManager::new_page_guarded(&bpm).unwrap();
        let g2 = BufferPoolManager::new_page_guarded(&bpm).unwrap();

        assert!(BufferPoolManager::new_page_guarded(&bpm).is_none());

        let p1 = g1.page_id();
        drop(g1);
        assert!(BufferPoolManager::new_page_guarded(&bpm).is_some());
        assert_eq!(bpm.lock().pin_count(p1), Some(1));

        drop(g2);
    }

    #[test]
    fn test_delete_page_requires_unpinned() {
        let bpm = BufferPoolManager::shared(&test_config(2));
        let guard = BufferPoolManager::new_page_guarded(&bpm).unwrap();
        let page_id = guard.page_id();

        assert!(!bpm.lock().delete_page(page_id).unwrap());
        drop(guard);
        assert!(bpm.lock().delete_page(page_id).unwrap());
        assert_eq!(bpm.lock().pin_count(page_id), None);
    }

    #[test]
    fn test_write_guard_marks_page_dirty() {
        let bpm = BufferPoolManager::shared(&test_config(2));
        let page_id = BufferPoolManager::new_page_guarded(&bpm).unwrap().page_id();
        bpm.lock().unpin(page_id, false);

        let guard = BufferPoolManager::fetch_page_write(&bpm, page_id).unwrap();
        assert!(guard.with_page(|p| p.is_dirty()));
    }
}
