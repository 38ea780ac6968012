use std::marker::PhantomData;
use std::sync::Arc;

use log::warn;

use crate::common::types::{PageId, PageReadGuard, Rid, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::key::IndexKey;
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::btree_page::{self, BTreePageView, IndexPageType};
use crate::storage::page::internal_page::{InternalRef, InternalView};
use crate::storage::page::leaf_page::{LeafRef, LeafView};

use super::base::BPlusTree;

impl<K: IndexKey> BPlusTree<K> {
    /// Ordered scan over the whole index, starting at the leftmost leaf.
    pub fn iter(&self) -> Result<TreeIterator<K>, BTreeError> {
        self.make_iter(None)
    }

    /// Ordered scan starting at `key`. When `key` is present in its leaf
    /// the scan starts there; otherwise it starts at the following leaf.
    pub fn iter_from(&self, key: &K) -> Result<TreeIterator<K>, BTreeError> {
        self.make_iter(Some(key))
    }

    fn make_iter(&self, key: Option<&K>) -> Result<TreeIterator<K>, BTreeError> {
        let root_guard = self.root_page_id.lock_arc();
        if *root_guard == INVALID_PAGE_ID {
            return Ok(TreeIterator::empty(self.buffer_pool.clone()));
        }
        let mut page_id = *root_guard;
        let handle = self.fetch(page_id)?;
        let mut guard = handle.read();
        // The root cannot move while its page stays read-latched.
        drop(root_guard);

        loop {
            let child_id = match btree_page::page_type(&guard.data) {
                Some(IndexPageType::Leaf) => break,
                Some(IndexPageType::Internal) => {
                    let node = InternalRef::<K>::new(&guard);
                    match key {
                        Some(k) => node.lookup(k),
                        None => node.value_at(0),
                    }
                }
                _ => {
                    drop(guard);
                    self.buffer_pool.unpin_page(page_id, false)?;
                    return Err(BTreeError::UnexpectedPageType(page_id));
                }
            };

            let child_handle = match self.fetch(child_id) {
                Ok(handle) => handle,
                Err(e) => {
                    drop(guard);
                    self.buffer_pool.unpin_page(page_id, false)?;
                    return Err(e);
                }
            };
            let child_guard = child_handle.read();
            drop(guard);
            self.buffer_pool.unpin_page(page_id, false)?;
            page_id = child_id;
            guard = child_guard;
        }

        let start_index = match key {
            None => 0,
            Some(k) => {
                let leaf = LeafRef::<K>::new(&guard);
                let index = leaf.key_index(k);
                if leaf.size() > 0 && index < leaf.size() && leaf.key_at(index) == *k {
                    index
                } else {
                    // Not in this leaf: park one past the end so the first
                    // advance moves to the next leaf.
                    leaf.size()
                }
            }
        };

        Ok(TreeIterator {
            buffer_pool: self.buffer_pool.clone(),
            leaf: Some((page_id, guard)),
            index: start_index,
            _marker: PhantomData,
        })
    }
}

/// Single-reader iterator over the leaf chain. Holds the current leaf
/// pinned and read-latched; stepping to the next leaf latches it before the
/// current one is released, so a scan never observes a half-applied split.
pub struct TreeIterator<K: IndexKey> {
    buffer_pool: Arc<BufferPoolManager>,
    leaf: Option<(PageId, PageReadGuard)>,
    index: usize,
    _marker: PhantomData<K>,
}

impl<K: IndexKey> TreeIterator<K> {
    fn empty(buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self {
            buffer_pool,
            leaf: None,
            index: 0,
            _marker: PhantomData,
        }
    }

    fn release_current(&mut self) {
        if let Some((page_id, guard)) = self.leaf.take() {
            drop(guard);
            if let Err(e) = self.buffer_pool.unpin_page(page_id, false) {
                warn!("failed to unpin page {} at end of scan: {}", page_id, e);
            }
        }
    }
}

impl<K: IndexKey> Iterator for TreeIterator<K> {
    type Item = (K, Rid);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (item, next_id) = match self.leaf.as_ref() {
                None => return None,
                Some((_, guard)) => {
                    let leaf = LeafRef::<K>::new(guard);
                    if self.index < leaf.size() {
                        (Some(leaf.item_at(self.index)), INVALID_PAGE_ID)
                    } else {
                        (None, leaf.next_page_id())
                    }
                }
            };

            if let Some(item) = item {
                self.index += 1;
                return Some(item);
            }
            if next_id == INVALID_PAGE_ID {
                self.release_current();
                return None;
            }

            let next_guard = match self.buffer_pool.fetch_page(next_id) {
                Ok(handle) => handle.read(),
                Err(e) => {
                    warn!("range scan stopped at page {}: {}", next_id, e);
                    self.release_current();
                    return None;
                }
            };
            self.release_current();
            self.leaf = Some((next_id, next_guard));
            self.index = 0;
        }
    }
}

impl<K: IndexKey> Drop for TreeIterator<K> {
    fn drop(&mut self) {
        self.release_current();
    }
}
