use log::debug;

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::key::IndexKey;
use crate::storage::page::btree_page::{self, BTreePageView, OperationType};
use crate::storage::page::internal_page::{InternalMut, InternalView};
use crate::storage::page::leaf_page::{LeafMut, LeafView};
use crate::transaction::concurrency::transaction::{PageLatch, Transaction};

use super::base::{BPlusTree, RootIdGuard};

impl<K: IndexKey> BPlusTree<K> {
    /// Insert a key/RID pair. Keys are unique: inserting a key that is
    /// already present changes nothing and returns `false`.
    pub fn insert(&self, key: &K, value: Rid, txn: &mut Transaction) -> Result<bool, BTreeError> {
        loop {
            {
                let root_guard = self.root_page_id.lock_arc();
                if *root_guard == INVALID_PAGE_ID {
                    self.start_new_tree(root_guard)?;
                }
            }
            match self.find_leaf(Some(key), OperationType::Insert, txn)? {
                // The tree was emptied between publishing the root and the
                // descent; start over.
                None => continue,
                Some((leaf_id, root_guard)) => {
                    return self.insert_into_leaf(key, value, leaf_id, root_guard, txn)
                }
            }
        }
    }

    /// Create a single empty leaf as the root of a previously empty tree
    /// and publish it to the header page. The caller holds the root guard.
    fn start_new_tree(&self, mut root_guard: RootIdGuard) -> Result<(), BTreeError> {
        let (handle, page_id) = self.buffer_pool.new_page()?;
        {
            let mut guard = handle.write();
            LeafMut::<K>::init(&mut guard, page_id, INVALID_PAGE_ID, self.leaf_max_size);
        }
        self.buffer_pool.unpin_page(page_id, true)?;

        *root_guard = page_id;
        self.insert_root_record(page_id)?;
        debug!("started new tree with root page {}", page_id);
        Ok(())
    }

    /// Insert into the leaf located by `find_leaf`, splitting upward as
    /// needed, then drain every latch held by the operation.
    fn insert_into_leaf(
        &self,
        key: &K,
        value: Rid,
        leaf_id: PageId,
        mut root_guard: Option<RootIdGuard>,
        txn: &mut Transaction,
    ) -> Result<bool, BTreeError> {
        let (duplicate, overflow) = {
            let buf = txn
                .write_buf(leaf_id)
                .ok_or(BTreeError::PageNotLatched(leaf_id))?;
            let mut leaf = LeafMut::<K>::new(buf);
            if leaf.lookup(key).is_some() {
                (true, false)
            } else {
                let new_size = leaf.insert(key, value);
                (false, new_size > leaf.max_size())
            }
        };

        if duplicate {
            self.release_latches(txn, OperationType::Insert)?;
            drop(root_guard);
            return Ok(false);
        }

        if overflow {
            let (new_leaf_id, separator) = self.split_leaf(leaf_id, txn)?;
            self.insert_into_parent(leaf_id, separator, new_leaf_id, txn, &mut root_guard)?;
        }

        self.release_latches(txn, OperationType::Insert)?;
        drop(root_guard);
        Ok(true)
    }

    /// Split an over-full leaf: allocate a new right sibling, move the
    /// upper half of the pairs into it, and splice it into the leaf chain.
    /// The new leaf's latch joins the transaction's queue. Returns the new
    /// page id and the separator key to push into the parent.
    fn split_leaf(&self, leaf_id: PageId, txn: &mut Transaction) -> Result<(PageId, K), BTreeError> {
        let (handle, new_page_id) = self.buffer_pool.new_page()?;
        let mut new_guard = handle.write();

        let separator = {
            let buf = txn
                .write_buf(leaf_id)
                .ok_or(BTreeError::PageNotLatched(leaf_id))?;
            let mut leaf = LeafMut::<K>::new(buf);
            let parent_id = leaf.parent_page_id();
            let mut new_leaf =
                LeafMut::<K>::init(&mut new_guard, new_page_id, parent_id, self.leaf_max_size);
            leaf.move_half_to(&mut new_leaf);
            new_leaf.key_at(0)
        };

        debug!("split leaf {} into new leaf {}", leaf_id, new_page_id);
        txn.add_latched_page(new_page_id, PageLatch::Write(new_guard));
        Ok((new_page_id, separator))
    }

    /// Split an over-full internal node. The children that moved to the new
    /// node get their parent pointers rewritten. Returns the new page id
    /// and the separator key (the new node's slot-0 key) to push up.
    fn split_internal(
        &self,
        page_id: PageId,
        txn: &mut Transaction,
    ) -> Result<(PageId, K), BTreeError> {
        let (handle, new_page_id) = self.buffer_pool.new_page()?;
        let mut new_guard = handle.write();

        let (separator, moved_children) = {
            let buf = txn
                .write_buf(page_id)
                .ok_or(BTreeError::PageNotLatched(page_id))?;
            let mut node = InternalMut::<K>::new(buf);
            let parent_id = node.parent_page_id();
            let mut new_node = InternalMut::<K>::init(
                &mut new_guard,
                new_page_id,
                parent_id,
                self.internal_max_size,
            );
            let moved = node.move_half_to(&mut new_node);
            (new_node.key_at(0), moved)
        };

        debug!("split internal {} into new internal {}", page_id, new_page_id);
        txn.add_latched_page(new_page_id, PageLatch::Write(new_guard));
        for child_id in moved_children {
            self.set_parent(child_id, new_page_id, txn)?;
        }
        Ok((new_page_id, separator))
    }

    /// Register a freshly split-off node with its parent: either grow a new
    /// root above the old one, or insert `(key, new_id)` after `old_id` in
    /// the existing parent, splitting it too if that overflows.
    fn insert_into_parent(
        &self,
        old_id: PageId,
        key: K,
        new_id: PageId,
        txn: &mut Transaction,
        root_guard: &mut Option<RootIdGuard>,
    ) -> Result<(), BTreeError> {
        let parent_id = {
            let buf = txn
                .read_buf(old_id)
                .ok_or(BTreeError::PageNotLatched(old_id))?;
            btree_page::node_parent(&buf.data)
        };

        if parent_id == INVALID_PAGE_ID {
            // The old node was the root; grow the tree by one level.
            let (handle, new_root_id) = self.buffer_pool.new_page()?;
            {
                let mut guard = handle.write();
                let mut new_root = InternalMut::<K>::init(
                    &mut guard,
                    new_root_id,
                    INVALID_PAGE_ID,
                    self.internal_max_size,
                );
                new_root.populate_new_root(old_id, &key, new_id);
            }
            self.buffer_pool.unpin_page(new_root_id, true)?;

            self.set_parent(old_id, new_root_id, txn)?;
            self.set_parent(new_id, new_root_id, txn)?;

            {
                let guard = root_guard.as_mut().ok_or(BTreeError::RootLockNotHeld)?;
                **guard = new_root_id;
            }
            self.update_root_record(new_root_id)?;
            // The root cannot move again within this operation.
            *root_guard = None;
            debug!("grew new root {}", new_root_id);
            return Ok(());
        }

        let needs_split = {
            let buf = txn
                .write_buf(parent_id)
                .ok_or(BTreeError::PageNotLatched(parent_id))?;
            let mut parent = InternalMut::<K>::new(buf);
            let index = parent
                .value_index(old_id)
                .ok_or(BTreeError::ChildMissing {
                    parent: parent_id,
                    child: old_id,
                })?;
            parent.insert_at(index + 1, &key, new_id);
            parent.size() > parent.max_size()
        };
        self.set_parent(new_id, parent_id, txn)?;

        if needs_split {
            let (new_internal_id, promoted) = self.split_internal(parent_id, txn)?;
            self.insert_into_parent(parent_id, promoted, new_internal_id, txn, root_guard)?;
        }
        Ok(())
    }
}
