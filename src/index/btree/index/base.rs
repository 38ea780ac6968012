use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

use crate::common::types::{PageHandle, PageId, Rid, HEADER_PAGE_ID, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::key::IndexKey;
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::btree_page::{self, IndexPageType, OperationType};
use crate::storage::page::header_page::{HeaderPageMut, HeaderPageRef};
use crate::storage::page::internal_page::{internal_max_size, InternalRef, InternalView};
use crate::storage::page::leaf_page::{leaf_max_size, LeafRef, LeafView};
use crate::transaction::concurrency::transaction::{PageLatch, Transaction};

/// Owned guard over the root page id. Held from the start of an operation
/// until the descent proves the root cannot change underneath it.
pub(crate) type RootIdGuard = ArcMutexGuard<RawMutex, PageId>;

/// Disk-resident B+Tree index over unique keys, mapping each key to the RID
/// of the indexed tuple. All node access goes through the buffer pool;
/// concurrent operations coordinate with latch crabbing (see `find_leaf`)
/// plus a dedicated mutex around the root page id.
pub struct BPlusTree<K: IndexKey> {
    index_name: String,
    pub(crate) buffer_pool: Arc<BufferPoolManager>,
    pub(crate) root_page_id: Arc<Mutex<PageId>>,
    pub(crate) leaf_max_size: usize,
    pub(crate) internal_max_size: usize,
    pub(crate) _marker: PhantomData<K>,
}

impl<K: IndexKey> BPlusTree<K> {
    /// Open the index named `name`, recovering its root page id from the
    /// header page if it was created before.
    pub fn new(
        name: impl Into<String>,
        buffer_pool: Arc<BufferPoolManager>,
    ) -> Result<Self, BTreeError> {
        Self::new_with_max_sizes(
            name,
            buffer_pool,
            leaf_max_size::<K>(),
            internal_max_size::<K>(),
        )
    }

    /// Open the index with explicit node capacities. Small capacities make
    /// split and merge behaviour observable with a handful of keys.
    pub fn new_with_max_sizes(
        name: impl Into<String>,
        buffer_pool: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self, BTreeError> {
        let index_name = name.into();

        let header = buffer_pool.fetch_page(HEADER_PAGE_ID)?;
        let root_page_id = {
            let guard = header.read();
            HeaderPageRef::new(&guard)
                .get_root_id(&index_name)
                .unwrap_or(INVALID_PAGE_ID)
        };
        buffer_pool.unpin_page(HEADER_PAGE_ID, false)?;

        Ok(Self {
            index_name,
            buffer_pool,
            root_page_id: Arc::new(Mutex::new(root_page_id)),
            leaf_max_size,
            internal_max_size,
            _marker: PhantomData,
        })
    }

    pub fn is_empty(&self) -> bool {
        *self.root_page_id.lock() == INVALID_PAGE_ID
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.lock()
    }

    /// Point lookup. Returns the RIDs associated with `key` — at most one,
    /// since keys are unique.
    pub fn get_value(&self, key: &K, txn: &mut Transaction) -> Result<Vec<Rid>, BTreeError> {
        let (leaf_id, root_guard) = match self.find_leaf(Some(key), OperationType::Get, txn)? {
            Some(found) => found,
            None => return Ok(Vec::new()),
        };

        let result = {
            let buf = txn
                .read_buf(leaf_id)
                .ok_or(BTreeError::PageNotLatched(leaf_id))?;
            let leaf = LeafRef::<K>::new(buf);
            leaf.lookup(key).map(|rid| vec![rid]).unwrap_or_default()
        };

        self.release_latches(txn, OperationType::Get)?;
        drop(root_guard);
        Ok(result)
    }

    /// Walk from the root to the leaf responsible for `key` (the leftmost
    /// leaf when `key` is `None`), latch-crabbing on the way down.
    ///
    /// Reads release each parent as soon as the child is latched. Writes
    /// keep every ancestor latched until the child is safe for the
    /// operation, at which point all held ancestors (and the root id guard)
    /// are released. Latches accumulate in the transaction's queue; the leaf
    /// is at the back of the queue on return.
    ///
    /// Returns `None` when the tree is empty, otherwise the leaf's page id
    /// and the root id guard if it is still held.
    pub(crate) fn find_leaf(
        &self,
        key: Option<&K>,
        op: OperationType,
        txn: &mut Transaction,
    ) -> Result<Option<(PageId, Option<RootIdGuard>)>, BTreeError> {
        let root_guard = self.root_page_id.lock_arc();
        if *root_guard == INVALID_PAGE_ID {
            return Ok(None);
        }
        let mut page_id = *root_guard;
        let mut root_guard = Some(root_guard);
        let handle = self.buffer_pool.fetch_page(page_id)?;
        let latch = match op {
            OperationType::Get => PageLatch::Read(handle.read()),
            _ => PageLatch::Write(handle.write()),
        };
        txn.add_latched_page(page_id, latch);

        loop {
            let child_id = {
                let buf = txn
                    .read_buf(page_id)
                    .ok_or(BTreeError::PageNotLatched(page_id))?;
                match btree_page::page_type(&buf.data) {
                    Some(IndexPageType::Leaf) => break,
                    Some(IndexPageType::Internal) => {
                        let node = InternalRef::<K>::new(buf);
                        match key {
                            Some(k) => node.lookup(k),
                            None => node.value_at(0),
                        }
                    }
                    _ => return Err(BTreeError::UnexpectedPageType(page_id)),
                }
            };

            let child_handle = match self.buffer_pool.fetch_page(child_id) {
                Ok(handle) => handle,
                Err(e) => {
                    self.release_latches(txn, op)?;
                    return Err(e.into());
                }
            };
            let child_latch = match op {
                OperationType::Get => PageLatch::Read(child_handle.read()),
                _ => PageLatch::Write(child_handle.write()),
            };

            let child_safe = {
                let data: &[u8] = match &child_latch {
                    PageLatch::Read(guard) => &guard.data,
                    PageLatch::Write(guard) => &guard.data,
                };
                btree_page::node_is_safe(data, op)
            };
            if child_safe {
                // Nothing below can propagate past this child: every held
                // ancestor, and the root id, is now immutable to us.
                self.release_latches(txn, op)?;
                root_guard = None;
            }

            txn.add_latched_page(child_id, child_latch);
            page_id = child_id;
        }

        Ok(Some((page_id, root_guard)))
    }

    /// Drain the transaction's latch queue in FIFO order, unlatching and
    /// unpinning each page. Every exit path of a tree operation ends here.
    pub(crate) fn release_latches(
        &self,
        txn: &mut Transaction,
        op: OperationType,
    ) -> Result<(), BTreeError> {
        while let Some((page_id, latch)) = txn.pop_latched_page() {
            drop(latch);
            self.buffer_pool
                .unpin_page(page_id, op != OperationType::Get)?;
        }
        Ok(())
    }

    /// Rewrite a child's parent pointer, going through the latch this
    /// transaction already holds on it when there is one.
    pub(crate) fn set_parent(
        &self,
        child_id: PageId,
        parent_id: PageId,
        txn: &mut Transaction,
    ) -> Result<(), BTreeError> {
        if let Some(buf) = txn.write_buf(child_id) {
            btree_page::set_node_parent(&mut buf.data, parent_id);
            return Ok(());
        }
        let handle = self.buffer_pool.fetch_page(child_id)?;
        {
            let mut guard = handle.write();
            btree_page::set_node_parent(&mut guard.data, parent_id);
        }
        self.buffer_pool.unpin_page(child_id, true)?;
        Ok(())
    }

    pub(crate) fn fetch(&self, page_id: PageId) -> Result<PageHandle, BTreeError> {
        Ok(self.buffer_pool.fetch_page(page_id)?)
    }

    /// Record this index's root in the header page, first publication.
    pub(crate) fn insert_root_record(&self, root_page_id: PageId) -> Result<(), BTreeError> {
        let handle = self.buffer_pool.fetch_page(HEADER_PAGE_ID)?;
        let result = {
            let mut guard = handle.write();
            HeaderPageMut::new(&mut guard).insert_record(&self.index_name, root_page_id)
        };
        self.buffer_pool.unpin_page(HEADER_PAGE_ID, true)?;
        result.map_err(Into::into)
    }

    /// Rewrite this index's root in the header page after the root moved.
    pub(crate) fn update_root_record(&self, root_page_id: PageId) -> Result<(), BTreeError> {
        let handle = self.buffer_pool.fetch_page(HEADER_PAGE_ID)?;
        let result = {
            let mut guard = handle.write();
            HeaderPageMut::new(&mut guard).update_record(&self.index_name, root_page_id)
        };
        self.buffer_pool.unpin_page(HEADER_PAGE_ID, true)?;
        result.map_err(Into::into)
    }

    /// Drop this index's record entirely; the tree has become empty.
    pub(crate) fn delete_root_record(&self) -> Result<(), BTreeError> {
        let handle = self.buffer_pool.fetch_page(HEADER_PAGE_ID)?;
        let result = {
            let mut guard = handle.write();
            HeaderPageMut::new(&mut guard).delete_record(&self.index_name)
        };
        self.buffer_pool.unpin_page(HEADER_PAGE_ID, true)?;
        result.map_err(Into::into)
    }
}
