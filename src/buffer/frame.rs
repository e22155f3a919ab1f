use crate::latch::Latch;
use crate::page::Page;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub type FrameId = usize;

/// A frame's identity is the slot; its content (the resident page) changes
/// as the replacer evicts and the pool re-fetches. Pin count and the latch
/// live here rather than on `Page` so they survive eviction/refill of the
/// page that happens to sit in this frame.
pub struct Frame {
    id: FrameId,
    page: Page,
    pin_count: AtomicU32,
    latch: Arc<Latch>,
}

impl Frame {
    pub fn new(id: FrameId) -> Self {
        Self {
            id,
            page: Page::new(),
            pin_count: AtomicU32::new(0),
            latch: Arc::new(Latch::new()),
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns the pin count after decrementing.
    pub fn unpin(&self) -> u32 {
        self.pin_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                if c == 0 {
                    None
                } else {
                    Some(c - 1)
                }
            })
            .map(|prev| prev.saturating_sub(1))
            .unwrap_or(0)
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::SeqCst)
    }

    pub fn is_evictable(&self) -> bool {
        self.pin_count() == 0
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut Page {
        &mut self.page
    }

    pub fn set_page(&mut self, page: Page) {
        self.page = page;
    }

    pub fn latch(&self) -> Arc<Latch> {
        self.latch.clone()
    }
}
