//! Forward leaf-chain iterator.
//!
//! Holds one guard on the current leaf plus an index into it, and hops to
//! `next_page_id` once exhausted. Non-snapshot: a concurrent insert/delete
//! on a leaf this iterator has already passed, or hasn't reached yet, is
//! visible as soon as the iterator's read latch on that leaf is
//! (re-)acquired — there is no MVCC layer underneath to give point-in-time
//! consistency.

use crate::buffer::{ArcBufferPool, BufferPoolManager, ReadPageGuard};
use crate::page::{BTreeLeafPage, Key, RecordId, INVALID_PAGE};

pub struct BPlusTreeIterator {
    bpm: Option<ArcBufferPool>,
    leaf: Option<ReadPageGuard>,
    index: usize,
}

impl BPlusTreeIterator {
    pub(super) fn new(bpm: ArcBufferPool, leaf: ReadPageGuard, index: usize) -> Self {
        Self {
            bpm: Some(bpm),
            leaf: Some(leaf),
            index,
        }
    }

    pub(super) fn empty() -> Self {
        Self {
            bpm: None,
            leaf: None,
            index: 0,
        }
    }
}

impl Iterator for BPlusTreeIterator {
    type Item = (Key, RecordId);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let leaf = self.leaf.as_ref()?;
            let size = leaf.with_page(|p| BTreeLeafPage::from(p).size());

            if self.index < size {
                let pair = leaf.with_page(|p| {
                    let view = BTreeLeafPage::from(p);
                    (view.key_at(self.index), view.value_at(self.index))
                });
                self.index += 1;
                return Some(pair);
            }

            let next_page_id = leaf.with_page(|p| BTreeLeafPage::from(p).get_next_page_id());
            if next_page_id == INVALID_PAGE {
                self.leaf = None;
                return None;
            }

            let bpm = self.bpm.as_ref().expect("bpm set whenever leaf is");
            self.leaf = Some(BufferPoolManager::fetch_page_read(bpm, next_page_id).ok()?);
            self.index = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::disk::test_path;
    use crate::index::BPlusTree;

    #[test]
    fn test_iterator_crosses_leaf_boundary() {
        let mut config = Config::new(32, 2);
        config.storage_path = test_path();
        let bpm = BufferPoolManager::shared(&config);
        let tree = BPlusTree::new(bpm, 4, 4).unwrap();

        for k in 0..12 {
            tree.insert(k, RecordId::new(k, 0)).unwrap();
        }

        let collected: Vec<Key> = tree.iter().unwrap().map(|(k, _)| k).collect();
        assert_eq!(collected, (0..12).collect::<Vec<_>>());
    }
}
