use log::debug;

use crate::common::types::{PageId, PageWriteGuard, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::key::IndexKey;
use crate::storage::page::btree_page::{self, BTreePageView, IndexPageType, OperationType};
use crate::storage::page::internal_page::{InternalMut, InternalRef, InternalView};
use crate::storage::page::leaf_page::LeafMut;
use crate::transaction::concurrency::transaction::Transaction;

use super::base::{BPlusTree, RootIdGuard};

impl<K: IndexKey> BPlusTree<K> {
    /// Delete `key` from the index. Removing an absent key is a no-op.
    pub fn remove(&self, key: &K, txn: &mut Transaction) -> Result<(), BTreeError> {
        let (leaf_id, mut root_guard) = match self.find_leaf(Some(key), OperationType::Delete, txn)?
        {
            Some(found) => found,
            None => return Ok(()),
        };

        let underflow = {
            let buf = txn
                .write_buf(leaf_id)
                .ok_or(BTreeError::PageNotLatched(leaf_id))?;
            let mut leaf = LeafMut::<K>::new(buf);
            let size_after = leaf.remove(key);
            size_after < leaf.min_size()
        };

        if underflow {
            self.coalesce_or_redistribute(leaf_id, txn, &mut root_guard)?;
        }

        self.release_latches(txn, OperationType::Delete)?;
        drop(root_guard);
        Ok(())
    }

    /// Repair an under-full node by merging with or borrowing from a
    /// sibling. The node is write-latched in the transaction's queue and
    /// so is its parent (the descent kept ancestors because the node was
    /// unsafe for deletion); the sibling is latched here.
    fn coalesce_or_redistribute(
        &self,
        node_id: PageId,
        txn: &mut Transaction,
        root_guard: &mut Option<RootIdGuard>,
    ) -> Result<(), BTreeError> {
        let parent_id = {
            let buf = txn
                .read_buf(node_id)
                .ok_or(BTreeError::PageNotLatched(node_id))?;
            btree_page::node_parent(&buf.data)
        };
        if parent_id == INVALID_PAGE_ID {
            return self.adjust_root(node_id, txn, root_guard);
        }

        // The leftmost child borrows from its right neighbour; every other
        // child from its left neighbour.
        let (node_index, sibling_id, is_left_sibling) = {
            let buf = txn
                .read_buf(parent_id)
                .ok_or(BTreeError::PageNotLatched(parent_id))?;
            let parent = InternalRef::<K>::new(buf);
            let index = parent.value_index(node_id).ok_or(BTreeError::ChildMissing {
                parent: parent_id,
                child: node_id,
            })?;
            if index == 0 {
                (index, parent.value_at(1), false)
            } else {
                (index, parent.value_at(index - 1), true)
            }
        };

        let sibling_handle = self.fetch(sibling_id)?;
        let sibling_guard = sibling_handle.write();

        let (node_size, node_max, node_is_leaf) = {
            let buf = txn
                .read_buf(node_id)
                .ok_or(BTreeError::PageNotLatched(node_id))?;
            (
                btree_page::node_size(&buf.data),
                btree_page::node_max_size(&buf.data),
                btree_page::page_type(&buf.data) == Some(IndexPageType::Leaf),
            )
        };
        let sibling_size = btree_page::node_size(&sibling_guard.data);

        if node_size + sibling_size <= node_max {
            self.coalesce(
                node_id,
                sibling_guard,
                sibling_id,
                parent_id,
                node_index,
                is_left_sibling,
                node_is_leaf,
                txn,
                root_guard,
            )
        } else {
            self.redistribute(
                node_id,
                sibling_guard,
                sibling_id,
                parent_id,
                node_index,
                is_left_sibling,
                node_is_leaf,
                txn,
            )
        }
    }

    /// Merge node and sibling into the lower-keyed of the two, delete the
    /// drained page, drop its separator from the parent, and recurse if
    /// that under-fills the parent.
    #[allow(clippy::too_many_arguments)]
    fn coalesce(
        &self,
        node_id: PageId,
        mut sibling_guard: PageWriteGuard,
        sibling_id: PageId,
        parent_id: PageId,
        node_index: usize,
        is_left_sibling: bool,
        is_leaf: bool,
        txn: &mut Transaction,
        root_guard: &mut Option<RootIdGuard>,
    ) -> Result<(), BTreeError> {
        // Parent entry of the page about to drain: the separator there is
        // pulled down into internal merges and removed afterwards.
        let removed_index = if is_left_sibling {
            node_index
        } else {
            node_index + 1
        };
        let separator: K = {
            let buf = txn
                .read_buf(parent_id)
                .ok_or(BTreeError::PageNotLatched(parent_id))?;
            InternalRef::<K>::new(buf).key_at(removed_index)
        };

        let moved_children = {
            let buf = txn
                .write_buf(node_id)
                .ok_or(BTreeError::PageNotLatched(node_id))?;
            if is_leaf {
                let mut node = LeafMut::<K>::new(buf);
                let mut sibling = LeafMut::<K>::new(&mut sibling_guard);
                if is_left_sibling {
                    node.move_all_to(&mut sibling);
                } else {
                    sibling.move_all_to(&mut node);
                }
                Vec::new()
            } else {
                let mut node = InternalMut::<K>::new(buf);
                let mut sibling = InternalMut::<K>::new(&mut sibling_guard);
                if is_left_sibling {
                    node.move_all_to(&mut sibling, &separator)
                } else {
                    sibling.move_all_to(&mut node, &separator)
                }
            }
        };

        let survivor_id = if is_left_sibling { sibling_id } else { node_id };
        for child_id in moved_children {
            self.set_parent(child_id, survivor_id, txn)?;
        }

        drop(sibling_guard);
        if is_left_sibling {
            // The node itself drained; pull its latch out of the queue so
            // the page can be deleted, and unpin the surviving sibling.
            if let Some(latch) = txn.take_latched_page(node_id) {
                drop(latch);
            }
            self.buffer_pool.unpin_page(node_id, true)?;
            self.buffer_pool.delete_page(node_id)?;
            self.buffer_pool.unpin_page(sibling_id, true)?;
        } else {
            self.buffer_pool.unpin_page(sibling_id, true)?;
            self.buffer_pool.delete_page(sibling_id)?;
        }
        debug!(
            "coalesced page {} into page {}",
            if is_left_sibling { node_id } else { sibling_id },
            survivor_id
        );

        let parent_underflow = {
            let buf = txn
                .write_buf(parent_id)
                .ok_or(BTreeError::PageNotLatched(parent_id))?;
            let mut parent = InternalMut::<K>::new(buf);
            parent.remove(removed_index);
            parent.size() < parent.min_size()
        };
        if parent_underflow {
            self.coalesce_or_redistribute(parent_id, txn, root_guard)?;
        }
        Ok(())
    }

    /// Borrow one entry from the sibling and fix the separator between the
    /// two pages. For internal nodes the entry rotates through the parent's
    /// separator; the moved child's parent pointer follows it.
    #[allow(clippy::too_many_arguments)]
    fn redistribute(
        &self,
        node_id: PageId,
        mut sibling_guard: PageWriteGuard,
        sibling_id: PageId,
        parent_id: PageId,
        node_index: usize,
        is_left_sibling: bool,
        is_leaf: bool,
        txn: &mut Transaction,
    ) -> Result<(), BTreeError> {
        let separator_index = if is_left_sibling {
            node_index
        } else {
            node_index + 1
        };

        if is_leaf {
            let new_separator = {
                let buf = txn
                    .write_buf(node_id)
                    .ok_or(BTreeError::PageNotLatched(node_id))?;
                let mut node = LeafMut::<K>::new(buf);
                let mut sibling = LeafMut::<K>::new(&mut sibling_guard);
                if is_left_sibling {
                    sibling.move_last_to_front_of(&mut node)
                } else {
                    sibling.move_first_to_end_of(&mut node)
                }
            };
            let buf = txn
                .write_buf(parent_id)
                .ok_or(BTreeError::PageNotLatched(parent_id))?;
            InternalMut::<K>::new(buf).set_key_at(separator_index, &new_separator);
        } else {
            let separator: K = {
                let buf = txn
                    .read_buf(parent_id)
                    .ok_or(BTreeError::PageNotLatched(parent_id))?;
                InternalRef::<K>::new(buf).key_at(separator_index)
            };
            let (up_key, moved_child) = {
                let buf = txn
                    .write_buf(node_id)
                    .ok_or(BTreeError::PageNotLatched(node_id))?;
                let mut node = InternalMut::<K>::new(buf);
                let mut sibling = InternalMut::<K>::new(&mut sibling_guard);
                if is_left_sibling {
                    sibling.move_last_to_front_of(&mut node, &separator)
                } else {
                    sibling.move_first_to_end_of(&mut node, &separator)
                }
            };
            {
                let buf = txn
                    .write_buf(parent_id)
                    .ok_or(BTreeError::PageNotLatched(parent_id))?;
                InternalMut::<K>::new(buf).set_key_at(separator_index, &up_key);
            }
            self.set_parent(moved_child, node_id, txn)?;
        }

        drop(sibling_guard);
        self.buffer_pool.unpin_page(sibling_id, true)?;
        Ok(())
    }

    /// The root under-filled. Either the tree is now empty (root was a leaf
    /// whose last pair was deleted) or an internal root is down to a single
    /// child, which becomes the new root. The old root page is deleted.
    fn adjust_root(
        &self,
        old_root_id: PageId,
        txn: &mut Transaction,
        root_guard: &mut Option<RootIdGuard>,
    ) -> Result<(), BTreeError> {
        let (is_leaf, size) = {
            let buf = txn
                .read_buf(old_root_id)
                .ok_or(BTreeError::PageNotLatched(old_root_id))?;
            (
                btree_page::page_type(&buf.data) == Some(IndexPageType::Leaf),
                btree_page::node_size(&buf.data),
            )
        };

        if is_leaf {
            debug_assert_eq!(size, 0);
            {
                let guard = root_guard.as_mut().ok_or(BTreeError::RootLockNotHeld)?;
                **guard = INVALID_PAGE_ID;
            }
            self.delete_root_record()?;
            *root_guard = None;
            debug!("deleted last entry, tree is now empty");
        } else {
            debug_assert_eq!(size, 1);
            let child_id = {
                let buf = txn
                    .read_buf(old_root_id)
                    .ok_or(BTreeError::PageNotLatched(old_root_id))?;
                InternalRef::<K>::new(buf).value_at(0)
            };
            self.set_parent(child_id, INVALID_PAGE_ID, txn)?;
            {
                let guard = root_guard.as_mut().ok_or(BTreeError::RootLockNotHeld)?;
                **guard = child_id;
            }
            self.update_root_record(child_id)?;
            *root_guard = None;
            debug!("promoted page {} to root", child_id);
        }

        if let Some(latch) = txn.take_latched_page(old_root_id) {
            drop(latch);
        }
        self.buffer_pool.unpin_page(old_root_id, true)?;
        self.buffer_pool.delete_page(old_root_id)?;
        Ok(())
    }
}
