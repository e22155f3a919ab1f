//! Concurrent B+-tree: ordered `Key -> RecordId` map under latch coupling,
//! fan-out configurable independently for internal and leaf nodes.
//!
//! A thin struct wrapping `ArcBufferPool` plus a root/header page id, with
//! recursive insert/delete helpers that fetch a child, recurse, then fix up
//! the parent on the way back. Descent uses pessimistic crabbing over the
//! `ReadPageGuard`/`WritePageGuard` RAII types, built on the typed page
//! views in `crate::page::btree_page`.

mod iterator;

pub use iterator::BPlusTreeIterator;

use crate::buffer::{ArcBufferPool, BufferPoolManager, WritePageGuard};
use crate::error::{DbResult, Error};
use crate::page::{
    page_type_of, BTreeHeaderPage, BTreeInternalPage, BTreeLeafPage, BTreePageType, Key, PageId, RecordId,
    INVALID_PAGE,
};

/// Ordered map over a buffer-pooled set of pages. Cheap to clone the handle
/// (an `Arc` underneath); every operation re-derives its guards from
/// `header_page_id`, so concurrent trees sharing a `bpm` stay consistent.
pub struct BPlusTree {
    bpm: ArcBufferPool,
    header_page_id: PageId,
    internal_max_size: usize,
    /// `leaf_max_size` is the configured fan-out; a leaf's actual pair
    /// capacity is `leaf_max_size - 1`, see [`Self::leaf_capacity`].
    leaf_max_size: usize,
}

impl BPlusTree {
    /// Allocates a fresh header page and an empty tree under it.
    pub fn new(bpm: ArcBufferPool, internal_max_size: usize, leaf_max_size: usize) -> DbResult<Self> {
        let header = BufferPoolManager::new_page_guarded(&bpm).ok_or(Error::NoFrameAvailable)?;
        let header_page_id = header.page_id();
        let mut header = header.upgrade_write();
        header.with_page_mut(|p| BTreeHeaderPage::from(p).init());

        Ok(Self {
            bpm,
            header_page_id,
            internal_max_size,
            leaf_max_size,
        })
    }

    /// Wraps an existing header page, e.g. after a catalog lookup.
    pub fn fetch(bpm: ArcBufferPool, header_page_id: PageId, internal_max_size: usize, leaf_max_size: usize) -> Self {
        Self {
            bpm,
            header_page_id,
            internal_max_size,
            leaf_max_size,
        }
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    fn root_page_id(&self) -> DbResult<PageId> {
        let header = BufferPoolManager::fetch_page_read(&self.bpm, self.header_page_id)?;
        Ok(header.with_page(|p| BTreeHeaderPage::from(p).get_root_page_id()))
    }

    pub fn is_empty(&self) -> DbResult<bool> {
        Ok(self.root_page_id()? == INVALID_PAGE)
    }

    fn leaf_capacity(&self) -> usize {
        self.leaf_max_size - 1
    }

    fn alloc_leaf(&self) -> DbResult<WritePageGuard> {
        let basic = BufferPoolManager::new_page_guarded(&self.bpm).ok_or(Error::NoFrameAvailable)?;
        let mut guard = basic.upgrade_write();
        guard.with_page_mut(|p| BTreeLeafPage::from(p).init(self.leaf_capacity()));
        Ok(guard)
    }

    fn alloc_internal(&self) -> DbResult<WritePageGuard> {
        let basic = BufferPoolManager::new_page_guarded(&self.bpm).ok_or(Error::NoFrameAvailable)?;
        let mut guard = basic.upgrade_write();
        guard.with_page_mut(|p| BTreeInternalPage::from(p).init(self.internal_max_size));
        Ok(guard)
    }

    /// Read-latch descent, releasing each ancestor as soon as its
    /// child is latched.
    pub fn get_value(&self, key: Key) -> DbResult<Option<RecordId>> {
        let root_page_id = self.root_page_id()?;
        if root_page_id == INVALID_PAGE {
            return Ok(None);
        }

        let mut guard = BufferPoolManager::fetch_page_read(&self.bpm, root_page_id)?;
        loop {
            let page_type = guard.with_page(page_type_of);
            match page_type {
                BTreePageType::Leaf => {
                    return Ok(guard.with_page(|p| BTreeLeafPage::from(p).lookup(key)));
                }
                BTreePageType::Internal => {
                    let child_id = guard.with_page(|p| BTreeInternalPage::from(p).child_for(key));
                    guard = BufferPoolManager::fetch_page_read(&self.bpm, child_id)?;
                }
                BTreePageType::Header | BTreePageType::Invalid => unreachable!("corrupt page type in tree body"),
            }
        }
    }

    /// Pessimistic crabbing insert with safety-release.
    pub fn insert(&self, key: Key, value: RecordId) -> DbResult<()> {
        let mut write_set = vec![BufferPoolManager::fetch_page_write(&self.bpm, self.header_page_id)?];

        let root_page_id = write_set[0].with_page(|p| BTreeHeaderPage::from(p).get_root_page_id());
        let root_guard = if root_page_id == INVALID_PAGE {
            let leaf = self.alloc_leaf()?;
            let new_root_id = leaf.page_id();
            write_set[0].with_page_mut(|p| BTreeHeaderPage::from(p).set_root_page_id(new_root_id));
            leaf
        } else {
            BufferPoolManager::fetch_page_write(&self.bpm, root_page_id)?
        };
        write_set.push(root_guard);

        loop {
            let page_type = write_set.last().unwrap().with_page(page_type_of);
            if page_type == BTreePageType::Leaf {
                break;
            }
            let (child_id, safe) = write_set.last().unwrap().with_page(|p| {
                let node = BTreeInternalPage::from(p);
                (node.child_for(key), node.size() < node.max_size() - 1)
            });
            if safe {
                let current = write_set.pop().unwrap();
                write_set.clear();
                write_set.push(current);
            }
            write_set.push(BufferPoolManager::fetch_page_write(&self.bpm, child_id)?);
        }

        let mut leaf = write_set.pop().unwrap();
        if leaf.with_page(|p| BTreeLeafPage::from(p).lookup(key).is_some()) {
            return Err(Error::Duplicate);
        }

        if !leaf.with_page(|p| BTreeLeafPage::from(p).is_full()) {
            leaf.with_page_mut(|p| {
                BTreeLeafPage::from(p).insert(key, value);
            });
            return Ok(());
        }

        let new_leaf = self.alloc_leaf()?;
        let new_leaf_id = new_leaf.page_id();
        let leaf_id = leaf.page_id();
        let median = BufferPoolManager::with_two_pages_mut(&self.bpm, leaf_id, new_leaf_id, |pa, pb| {
            let mut left = BTreeLeafPage::from(pa);
            let mut right = BTreeLeafPage::from(pb);
            left.insert(key, value);
            left.split_into(&mut right, self.leaf_capacity())
        });
        drop(leaf);
        drop(new_leaf);

        self.propagate_split(write_set, leaf_id, median, new_leaf_id)
    }

    /// Inserts `(sep_key, new_child_id)` into the parent chain above a node
    /// that just split; `left_child_id` is the (unchanged) page id of the
    /// half that stayed in place, used to find where in the parent to
    /// insert. Cascades upward, allocating new roots / splitting ancestors
    /// as needed.
    fn propagate_split(
        &self,
        mut write_set: Vec<WritePageGuard>,
        mut left_child_id: PageId,
        mut sep_key: Key,
        mut new_child_id: PageId,
    ) -> DbResult<()> {
        loop {
            let top_is_header = write_set.last().unwrap().with_page(|p| page_type_of(p) == BTreePageType::Header);
            if top_is_header {
                let mut new_root = self.alloc_internal()?;
                let new_root_id = new_root.page_id();
                new_root.with_page_mut(|p| {
                    BTreeInternalPage::from(p).init_as_root(left_child_id, sep_key, new_child_id, self.internal_max_size);
                });
                write_set
                    .last_mut()
                    .unwrap()
                    .with_page_mut(|p| BTreeHeaderPage::from(p).set_root_page_id(new_root_id));
                return Ok(());
            }

            let mut parent = write_set.pop().unwrap();
            let is_full = parent.with_page(|p| BTreeInternalPage::from(p).is_full());

            if !is_full {
                let after_index = parent.with_page(|p| BTreeInternalPage::from(p).index_of_child(left_child_id).unwrap());
                parent.with_page_mut(|p| BTreeInternalPage::from(p).insert_after(after_index, sep_key, new_child_id));
                return Ok(());
            }

            let new_sibling = self.alloc_internal()?;
            let new_sibling_id = new_sibling.page_id();
            let parent_id = parent.page_id();
            let median = BufferPoolManager::with_two_pages_mut(&self.bpm, parent_id, new_sibling_id, |pa, pb| {
                let mut left = BTreeInternalPage::from(pa);
                let mut right = BTreeInternalPage::from(pb);
                let after_index = left.index_of_child(left_child_id).unwrap();
                left.insert_after(after_index, sep_key, new_child_id);
                left.split_into(&mut right, self.internal_max_size)
            });
            drop(parent);
            drop(new_sibling);

            left_child_id = parent_id;
            sep_key = median;
            new_child_id = new_sibling_id;
        }
    }

    /// Tolerant delete — absent key is a no-op, not an error.
    pub fn remove(&self, key: Key) -> DbResult<()> {
        let mut write_set = vec![BufferPoolManager::fetch_page_write(&self.bpm, self.header_page_id)?];
        let root_page_id = write_set[0].with_page(|p| BTreeHeaderPage::from(p).get_root_page_id());
        if root_page_id == INVALID_PAGE {
            return Ok(());
        }
        write_set.push(BufferPoolManager::fetch_page_write(&self.bpm, root_page_id)?);

        loop {
            let page_type = write_set.last().unwrap().with_page(page_type_of);
            if page_type == BTreePageType::Leaf {
                break;
            }
            let (child_id, safe) = write_set.last().unwrap().with_page(|p| {
                let node = BTreeInternalPage::from(p);
                (node.child_for(key), node.size() > node.min_size())
            });
            if safe {
                let current = write_set.pop().unwrap();
                write_set.clear();
                write_set.push(current);
            }
            write_set.push(BufferPoolManager::fetch_page_write(&self.bpm, child_id)?);
        }

        let mut leaf = write_set.pop().unwrap();
        let removed = leaf.with_page_mut(|p| BTreeLeafPage::from(p).remove(key));
        if !removed {
            return Ok(());
        }

        let underflow = leaf.with_page(|p| BTreeLeafPage::from(p).is_underflow());
        if !underflow {
            return Ok(());
        }
        self.fix_leaf_underflow(write_set, leaf)
    }

    fn fix_leaf_underflow(&self, mut write_set: Vec<WritePageGuard>, mut leaf: WritePageGuard) -> DbResult<()> {
        let is_header = write_set.last().unwrap().with_page(|p| page_type_of(p) == BTreePageType::Header);
        if is_header {
            // leaf is the root: no minimum enforced on it.
            return Ok(());
        }

        let mut parent = write_set.pop().unwrap();
        let leaf_id = leaf.page_id();
        let idx = parent.with_page(|p| BTreeInternalPage::from(p).index_of_child(leaf_id).unwrap());
        let parent_size = parent.with_page(|p| BTreeInternalPage::from(p).size());

        let right_id = (idx + 1 < parent_size).then(|| parent.with_page(|p| BTreeInternalPage::from(p).child_at(idx + 1)));
        let left_id = (idx > 0).then(|| parent.with_page(|p| BTreeInternalPage::from(p).child_at(idx - 1)));

        if let Some(right_id) = right_id {
            let mut right = BufferPoolManager::fetch_page_write(&self.bpm, right_id)?;
            let above_min = right.with_page(|p| {
                let n = BTreeLeafPage::from(p);
                n.size() > n.min_size()
            });
            if above_min {
                let (k, v) = right.with_page_mut(|p| BTreeLeafPage::from(p).remove_first());
                leaf.with_page_mut(|p| BTreeLeafPage::from(p).push_back(k, v));
                let new_key = right.with_page(|p| BTreeLeafPage::from(p).key_at(0));
                parent.with_page_mut(|p| BTreeInternalPage::from(p).set_key_at(idx + 1, new_key));
                return Ok(());
            }
        }

        if let Some(left_id) = left_id {
            let mut left = BufferPoolManager::fetch_page_write(&self.bpm, left_id)?;
            let above_min = left.with_page(|p| {
                let n = BTreeLeafPage::from(p);
                n.size() > n.min_size()
            });
            if above_min {
                let (k, v) = left.with_page_mut(|p| BTreeLeafPage::from(p).remove_last());
                leaf.with_page_mut(|p| BTreeLeafPage::from(p).push_front(k, v));
                parent.with_page_mut(|p| BTreeInternalPage::from(p).set_key_at(idx, k));
                return Ok(());
            }
        }

        if let Some(left_id) = left_id {
            let mut left = BufferPoolManager::fetch_page_write(&self.bpm, left_id)?;
            BufferPoolManager::with_two_pages_mut(&self.bpm, left_id, leaf_id, |pa, pb| {
                let mut left_view = BTreeLeafPage::from(pa);
                let right_view = BTreeLeafPage::from(pb);
                left_view.absorb(&right_view);
            });
            drop(left);
            drop(leaf);
            self.bpm.lock().delete_page(leaf_id)?;
            parent.with_page_mut(|p| BTreeInternalPage::from(p).remove_at(idx));
            return self.fix_internal_underflow(write_set, parent);
        }

        if let Some(right_id) = right_id {
            let right = BufferPoolManager::fetch_page_write(&self.bpm, right_id)?;
            BufferPoolManager::with_two_pages_mut(&self.bpm, leaf_id, right_id, |pa, pb| {
                let mut left_view = BTreeLeafPage::from(pa);
                let right_view = BTreeLeafPage::from(pb);
                left_view.absorb(&right_view);
            });
            drop(right);
            drop(leaf);
            self.bpm.lock().delete_page(right_id)?;
            parent.with_page_mut(|p| BTreeInternalPage::from(p).remove_at(idx + 1));
            return self.fix_internal_underflow(write_set, parent);
        }

        // Only child of its parent, no siblings: can't happen once a parent
        // exists (an internal node always has >= 2 children), but tolerate it.
        Ok(())
    }

    fn fix_internal_underflow(&self, mut write_set: Vec<WritePageGuard>, mut node: WritePageGuard) -> DbResult<()> {
        if !node.with_page(|p| BTreeInternalPage::from(p).is_underflow()) {
            return Ok(());
        }

        let is_header = write_set.last().unwrap().with_page(|p| page_type_of(p) == BTreePageType::Header);
        if is_header {
            let size = node.with_page(|p| BTreeInternalPage::from(p).size());
            let node_id = node.page_id();
            if size <= 1 {
                let new_root = if size == 1 {
                    node.with_page(|p| BTreeInternalPage::from(p).child_at(0))
                } else {
                    INVALID_PAGE
                };
                write_set
                    .last_mut()
                    .unwrap()
                    .with_page_mut(|p| BTreeHeaderPage::from(p).set_root_page_id(new_root));
                drop(node);
                self.bpm.lock().delete_page(node_id)?;
            }
            return Ok(());
        }

        let mut parent = write_set.pop().unwrap();
        let node_id = node.page_id();
        let idx = parent.with_page(|p| BTreeInternalPage::from(p).index_of_child(node_id).unwrap());
        let parent_size = parent.with_page(|p| BTreeInternalPage::from(p).size());

        let right_id = (idx + 1 < parent_size).then(|| parent.with_page(|p| BTreeInternalPage::from(p).child_at(idx + 1)));
        let left_id = (idx > 0).then(|| parent.with_page(|p| BTreeInternalPage::from(p).child_at(idx - 1)));

        if let Some(right_id) = right_id {
            let mut right = BufferPoolManager::fetch_page_write(&self.bpm, right_id)?;
            let above_min = right.with_page(|p| {
                let n = BTreeInternalPage::from(p);
                n.size() > n.min_size()
            });
            if above_min {
                let sep = parent.with_page(|p| BTreeInternalPage::from(p).key_at(idx + 1));
                let (right_new_sep, right_first_child) = right.with_page(|p| {
                    let n = BTreeInternalPage::from(p);
                    (n.key_at(1), n.child_at(0))
                });
                node.with_page_mut(|p| {
                    let mut n = BTreeInternalPage::from(p);
                    let last = n.size() - 1;
                    n.insert_after(last, sep, right_first_child);
                });
                right.with_page_mut(|p| BTreeInternalPage::from(p).remove_at(0));
                parent.with_page_mut(|p| BTreeInternalPage::from(p).set_key_at(idx + 1, right_new_sep));
                return Ok(());
            }
        }

        if let Some(left_id) = left_id {
            let mut left = BufferPoolManager::fetch_page_write(&self.bpm, left_id)?;
            let above_min = left.with_page(|p| {
                let n = BTreeInternalPage::from(p);
                n.size() > n.min_size()
            });
            if above_min {
                let sep = parent.with_page(|p| BTreeInternalPage::from(p).key_at(idx));
                let (left_new_sep, left_last_child) = left.with_page(|p| {
                    let n = BTreeInternalPage::from(p);
                    let last = n.size() - 1;
                    (n.key_at(last), n.child_at(last))
                });
                left.with_page_mut(|p| {
                    let mut n = BTreeInternalPage::from(p);
                    let last = n.size() - 1;
                    n.remove_at(last);
                });
                node.with_page_mut(|p| {
                    let mut n = BTreeInternalPage::from(p);
                    n.insert_at(0, 0, left_last_child);
                    n.set_key_at(1, sep);
                });
                parent.with_page_mut(|p| BTreeInternalPage::from(p).set_key_at(idx, left_new_sep));
                return Ok(());
            }
        }

        if let Some(left_id) = left_id {
            let mut left = BufferPoolManager::fetch_page_write(&self.bpm, left_id)?;
            let sep = parent.with_page(|p| BTreeInternalPage::from(p).key_at(idx));
            let node_id = node.page_id();
            BufferPoolManager::with_two_pages_mut(&self.bpm, left_id, node_id, |pa, pb| {
                let mut left_view = BTreeInternalPage::from(pa);
                let right_view = BTreeInternalPage::from(pb);
                left_view.absorb(&right_view, sep);
            });
            drop(left);
            drop(node);
            self.bpm.lock().delete_page(node_id)?;
            parent.with_page_mut(|p| BTreeInternalPage::from(p).remove_at(idx));
            return self.fix_internal_underflow(write_set, parent);
        }

        if let Some(right_id) = right_id {
            let right = BufferPoolManager::fetch_page_write(&self.bpm, right_id)?;
            let sep = parent.with_page(|p| BTreeInternalPage::from(p).key_at(idx + 1));
            BufferPoolManager::with_two_pages_mut(&self.bpm, node_id, right_id, |pa, pb| {
                let mut left_view = BTreeInternalPage::from(pa);
                let right_view = BTreeInternalPage::from(pb);
                left_view.absorb(&right_view, sep);
            });
            drop(right);
            drop(node);
            self.bpm.lock().delete_page(right_id)?;
            parent.with_page_mut(|p| BTreeInternalPage::from(p).remove_at(idx + 1));
            return self.fix_internal_underflow(write_set, parent);
        }

        Ok(())
    }

    /// Forward iterator starting at the leftmost leaf.
    pub fn iter(&self) -> DbResult<BPlusTreeIterator> {
        let root_page_id = self.root_page_id()?;
        if root_page_id == INVALID_PAGE {
            return Ok(BPlusTreeIterator::empty());
        }

        let mut guard = BufferPoolManager::fetch_page_read(&self.bpm, root_page_id)?;
        loop {
            let page_type = guard.with_page(page_type_of);
            if page_type == BTreePageType::Leaf {
                return Ok(BPlusTreeIterator::new(self.bpm.clone(), guard, 0));
            }
            let first_child = guard.with_page(|p| BTreeInternalPage::from(p).child_at(0));
            guard = BufferPoolManager::fetch_page_read(&self.bpm, first_child)?;
        }
    }

    /// Forward iterator starting at the first key `>= key`.
    pub fn scan_from(&self, key: Key) -> DbResult<BPlusTreeIterator> {
        let root_page_id = self.root_page_id()?;
        if root_page_id == INVALID_PAGE {
            return Ok(BPlusTreeIterator::empty());
        }

        let mut guard = BufferPoolManager::fetch_page_read(&self.bpm, root_page_id)?;
        loop {
            let page_type = guard.with_page(page_type_of);
            match page_type {
                BTreePageType::Leaf => {
                    let index = guard.with_page(|p| match BTreeLeafPage::from(p).find(key) {
                        Ok(pos) | Err(pos) => pos,
                    });
                    return Ok(BPlusTreeIterator::new(self.bpm.clone(), guard, index));
                }
                BTreePageType::Internal => {
                    let child_id = guard.with_page(|p| BTreeInternalPage::from(p).child_for(key));
                    guard = BufferPoolManager::fetch_page_read(&self.bpm, child_id)?;
                }
                BTreePageType::Header | BTreePageType::Invalid => unreachable!("corrupt page type in tree body"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::disk::test_path;

    fn test_tree(pool_size: usize, internal_max: usize, leaf_max: usize) -> BPlusTree {
        let mut config = Config::new(pool_size, 2);
        config.storage_path = test_path();
        let bpm = BufferPoolManager::shared(&config);
        BPlusTree::new(bpm, internal_max, leaf_max).unwrap()
    }

    #[test]
    fn test_insert_then_get_value_round_trips() {
        let tree = test_tree(16, 5, 5);
        tree.insert(42, RecordId::new(42, 0)).unwrap();
        assert_eq!(tree.get_value(42).unwrap(), Some(RecordId::new(42, 0)));
        assert_eq!(tree.get_value(1).unwrap(), None);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let tree = test_tree(16, 5, 5);
        tree.insert(1, RecordId::new(1, 0)).unwrap();
        assert!(matches!(tree.insert(1, RecordId::new(2, 0)), Err(Error::Duplicate)));
    }

    #[test]
    fn test_leaf_split_grows_tree_past_one_node() {
        let tree = test_tree(32, 4, 4);
        for i in 0..20 {
            tree.insert(i, RecordId::new(i, 0)).unwrap();
        }
        for i in 0..20 {
            assert_eq!(tree.get_value(i).unwrap(), Some(RecordId::new(i, 0)));
        }
    }

    /// Splitting a full leaf must balance both halves to at least
    /// `min_size`, not just stash the new key wherever it lands after an
    /// uneven pre-insertion split.
    #[test]
    fn test_leaf_split_balances_both_halves() {
        let tree = test_tree(16, 4, 4);
        for k in [10, 20, 30, 40] {
            tree.insert(k, RecordId::new(k, 0)).unwrap();
        }

        let root_id = tree.root_page_id().unwrap();
        let root = BufferPoolManager::fetch_page_read(&tree.bpm, root_id).unwrap();
        let (sep, left_id, right_id) = root.with_page(|p| {
            let node = BTreeInternalPage::from(p);
            (node.key_at(1), node.child_at(0), node.child_at(1))
        });
        assert_eq!(sep, 30);

        let left = BufferPoolManager::fetch_page_read(&tree.bpm, left_id).unwrap();
        let right = BufferPoolManager::fetch_page_read(&tree.bpm, right_id).unwrap();
        let left_size = left.with_page(|p| BTreeLeafPage::from(p).size());
        let right_size = right.with_page(|p| BTreeLeafPage::from(p).size());
        assert_eq!(left_size, 2);
        assert_eq!(right_size, 2);
        assert!(left_size >= left.with_page(|p| BTreeLeafPage::from(p).min_size()));
        assert!(right_size >= right.with_page(|p| BTreeLeafPage::from(p).min_size()));
    }

    #[test]
    fn test_insert_many_keys_out_of_order() {
        let tree = test_tree(64, 4, 4);
        let keys = [50, 10, 90, 30, 70, 20, 80, 40, 60, 0, 100];
        for &k in &keys {
            tree.insert(k, RecordId::new(k, 0)).unwrap();
        }
        for &k in &keys {
            assert_eq!(tree.get_value(k).unwrap(), Some(RecordId::new(k, 0)));
        }
    }

    #[test]
    fn test_remove_absent_key_is_noop() {
        let tree = test_tree(16, 5, 5);
        tree.insert(1, RecordId::new(1, 0)).unwrap();
        assert!(tree.remove(99).is_ok());
        assert_eq!(tree.get_value(1).unwrap(), Some(RecordId::new(1, 0)));
    }

    #[test]
    fn test_insert_then_remove_all_keys() {
        let tree = test_tree(32, 4, 4);
        let keys: Vec<i64> = (0..30).collect();
        for &k in &keys {
            tree.insert(k, RecordId::new(k, 0)).unwrap();
        }
        for &k in &keys {
            tree.remove(k).unwrap();
            assert_eq!(tree.get_value(k).unwrap(), None);
        }
        assert!(tree.is_empty().unwrap());
    }

    #[test]
    fn test_remove_triggers_merge_and_borrow() {
        let tree = test_tree(32, 3, 3);
        let keys: Vec<i64> = (0..15).collect();
        for &k in &keys {
            tree.insert(k, RecordId::new(k, 0)).unwrap();
        }
        // Delete every other key, forcing leaves below minimum occupancy to
        // borrow from or merge with siblings.
        for k in (0..15).step_by(2) {
            tree.remove(k).unwrap();
        }
        for k in (0..15).step_by(2) {
            assert_eq!(tree.get_value(k).unwrap(), None);
        }
        for k in (1..15).step_by(2) {
            assert_eq!(tree.get_value(k).unwrap(), Some(RecordId::new(k, 0)));
        }
    }

    #[test]
    fn test_iter_yields_keys_in_order() {
        let tree = test_tree(32, 4, 4);
        let keys = [5, 1, 4, 2, 3];
        for &k in &keys {
            tree.insert(k, RecordId::new(k, 0)).unwrap();
        }
        let collected: Vec<Key> = tree.iter().unwrap().map(|(k, _)| k).collect();
        assert_eq!(collected, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_scan_from_starts_at_first_key_gte() {
        let tree = test_tree(32, 4, 4);
        for k in [1, 3, 5, 7, 9] {
            tree.insert(k, RecordId::new(k, 0)).unwrap();
        }
        let collected: Vec<Key> = tree.scan_from(4).unwrap().map(|(k, _)| k).collect();
        assert_eq!(collected, vec![5, 7, 9]);
    }

    #[test]
    fn test_empty_tree_iteration_yields_nothing() {
        let tree = test_tree(16, 5, 5);
        assert_eq!(tree.iter().unwrap().count(), 0);
    }
}
