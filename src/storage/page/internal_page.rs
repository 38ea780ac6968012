use std::cmp::Ordering;
use std::marker::PhantomData;

use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{PageBuf, PageId, PAGE_SIZE};
use crate::index::key::IndexKey;
use crate::storage::page::btree_page::{
    BTreePageView, BTreePageViewMut, IndexPageType, NODE_HEADER_SIZE,
};

const PAGE_ID_SIZE: usize = 4;

/// Natural capacity of an internal node; as with leaves, one slot is
/// reserved for the overflow pair held briefly before a split.
pub fn internal_max_size<K: IndexKey>() -> usize {
    (PAGE_SIZE - NODE_HEADER_SIZE) / (K::ENCODED_SIZE + PAGE_ID_SIZE) - 1
}

fn pair_size<K: IndexKey>() -> usize {
    K::ENCODED_SIZE + PAGE_ID_SIZE
}

fn pair_offset<K: IndexKey>(index: usize) -> usize {
    NODE_HEADER_SIZE + index * pair_size::<K>()
}

/// Read-only view of an internal node. Slot 0's key is unused: a node with
/// `size` entries separates `size` children with `size - 1` live keys, and
/// every key in the subtree under `value[i]` (for `i >= 1`) is >= `key[i]`.
pub struct InternalRef<'a, K> {
    data: &'a [u8],
    _marker: PhantomData<K>,
}

/// Mutable view of an internal node.
pub struct InternalMut<'a, K> {
    data: &'a mut [u8],
    _marker: PhantomData<K>,
}

impl<K: IndexKey> BTreePageView for InternalRef<'_, K> {
    fn data(&self) -> &[u8] {
        self.data
    }
}

impl<K: IndexKey> BTreePageView for InternalMut<'_, K> {
    fn data(&self) -> &[u8] {
        self.data
    }
}

impl<K: IndexKey> BTreePageViewMut for InternalMut<'_, K> {
    fn data_mut(&mut self) -> &mut [u8] {
        self.data
    }
}

pub trait InternalView<K: IndexKey>: BTreePageView {
    fn key_at(&self, index: usize) -> K {
        debug_assert!(index < self.size());
        let off = pair_offset::<K>(index);
        K::decode(&self.data()[off..off + K::ENCODED_SIZE])
    }

    fn value_at(&self, index: usize) -> PageId {
        debug_assert!(index < self.size());
        let off = pair_offset::<K>(index) + K::ENCODED_SIZE;
        LittleEndian::read_i32(&self.data()[off..off + PAGE_ID_SIZE])
    }

    /// Index of the entry holding child `value`, if any.
    fn value_index(&self, value: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.value_at(i) == value)
    }

    /// Child to descend into for `key`: the largest `i >= 1` with
    /// `key_at(i) <= key`, falling back to the slot-0 child.
    fn lookup(&self, key: &K) -> PageId {
        debug_assert!(self.size() >= 2);
        let mut left = 1i64;
        let mut right = self.size() as i64 - 1;
        while left <= right {
            let mid = left + (right - left) / 2;
            match self.key_at(mid as usize).cmp(key) {
                Ordering::Equal => {
                    left = mid;
                    break;
                }
                Ordering::Less => left = mid + 1,
                Ordering::Greater => right = mid - 1,
            }
        }
        let target = left as usize;

        if target >= self.size() {
            return self.value_at(self.size() - 1);
        }
        if self.key_at(target) == *key {
            self.value_at(target)
        } else {
            self.value_at(target - 1)
        }
    }

    /// Collect every child page id. Used when a split or merge has to
    /// re-parent the children it moved.
    fn child_page_ids(&self) -> Vec<PageId> {
        (0..self.size()).map(|i| self.value_at(i)).collect()
    }
}

impl<K: IndexKey> InternalView<K> for InternalRef<'_, K> {}
impl<K: IndexKey> InternalView<K> for InternalMut<'_, K> {}

impl<'a, K: IndexKey> InternalRef<'a, K> {
    pub fn new(page: &'a PageBuf) -> Self {
        debug_assert_eq!(
            super::btree_page::page_type(&page.data),
            Some(IndexPageType::Internal)
        );
        Self {
            data: &page.data,
            _marker: PhantomData,
        }
    }
}

impl<'a, K: IndexKey> InternalMut<'a, K> {
    pub fn new(page: &'a mut PageBuf) -> Self {
        debug_assert_eq!(
            super::btree_page::page_type(&page.data),
            Some(IndexPageType::Internal)
        );
        Self {
            data: &mut page.data,
            _marker: PhantomData,
        }
    }

    pub fn init(page: &'a mut PageBuf, page_id: PageId, parent_id: PageId, max_size: usize) -> Self {
        let mut node = Self {
            data: &mut page.data,
            _marker: PhantomData,
        };
        node.set_page_type(IndexPageType::Internal);
        node.set_lsn(0);
        node.set_size(0);
        node.set_max_size(max_size);
        node.set_parent_page_id(parent_id);
        node.set_page_id(page_id);
        node
    }

    pub fn set_key_at(&mut self, index: usize, key: &K) {
        let off = pair_offset::<K>(index);
        key.encode(&mut self.data[off..off + K::ENCODED_SIZE]);
    }

    pub fn set_value_at(&mut self, index: usize, value: PageId) {
        let off = pair_offset::<K>(index) + K::ENCODED_SIZE;
        LittleEndian::write_i32(&mut self.data[off..off + PAGE_ID_SIZE], value);
    }

    fn set_pair(&mut self, index: usize, key: &K, value: PageId) {
        self.set_key_at(index, key);
        self.set_value_at(index, value);
    }

    /// Turn an empty page into the root produced by splitting the old root:
    /// `[(invalid, old_child), (key, new_child)]`.
    pub fn populate_new_root(&mut self, old_child: PageId, key: &K, new_child: PageId) {
        debug_assert_eq!(self.size(), 0);
        self.set_size(2);
        self.set_value_at(0, old_child);
        self.set_pair(1, key, new_child);
    }

    /// Insert a pair at `index`, shifting the tail right.
    pub fn insert_at(&mut self, index: usize, key: &K, value: PageId) {
        debug_assert!(index <= self.size());
        let start = pair_offset::<K>(index);
        let end = pair_offset::<K>(self.size());
        self.data.copy_within(start..end, start + pair_size::<K>());
        self.set_pair(index, key, value);
        self.increase_size(1);
    }

    /// Remove the pair at `index`, shifting the tail left.
    pub fn remove(&mut self, index: usize) {
        debug_assert!(index < self.size());
        let start = pair_offset::<K>(index);
        let end = pair_offset::<K>(self.size());
        self.data.copy_within(start + pair_size::<K>()..end, start);
        self.increase_size(-1);
    }

    /// Split: move the upper half to an empty `recipient` and return the
    /// moved children, whose parent pointers the caller must rewrite. The
    /// recipient's slot-0 key carries the separator to push up.
    pub fn move_half_to(&mut self, recipient: &mut InternalMut<'_, K>) -> Vec<PageId> {
        debug_assert_eq!(self.size(), self.max_size() + 1);
        debug_assert_eq!(recipient.size(), 0);

        let last = self.size() - 1;
        let start = last / 2 + 1;
        let moved = self.size() - start;
        recipient.data[pair_offset::<K>(0)..pair_offset::<K>(moved)]
            .copy_from_slice(&self.data[pair_offset::<K>(start)..pair_offset::<K>(self.size())]);
        recipient.set_size(moved);
        self.set_size(start);

        recipient.child_page_ids()
    }

    /// Coalesce: pull `separator` down into slot 0, drain every pair into
    /// `recipient` (the lower-keyed sibling), and return the moved children
    /// for re-parenting.
    pub fn move_all_to(&mut self, recipient: &mut InternalMut<'_, K>, separator: &K) -> Vec<PageId> {
        debug_assert!(self.size() + recipient.size() <= self.max_size());

        self.set_key_at(0, separator);
        let dst_start = pair_offset::<K>(recipient.size());
        let dst_end = dst_start + self.size() * pair_size::<K>();
        recipient.data[dst_start..dst_end]
            .copy_from_slice(&self.data[pair_offset::<K>(0)..pair_offset::<K>(self.size())]);
        recipient.increase_size(self.size() as i32);

        let moved = self.child_page_ids();
        self.set_size(0);
        moved
    }

    /// Redistribute to the left: rotate this page's first child into the
    /// tail of `recipient` through `separator`. Returns the key to install
    /// as the new separator and the child that moved.
    pub fn move_first_to_end_of(
        &mut self,
        recipient: &mut InternalMut<'_, K>,
        separator: &K,
    ) -> (K, PageId) {
        let up_key = self.key_at(1);
        let child = self.value_at(0);

        let size = recipient.size();
        recipient.set_pair(size, separator, child);
        recipient.increase_size(1);

        let second_child = self.value_at(1);
        self.set_value_at(0, second_child);
        self.remove(1);

        (up_key, child)
    }

    /// Redistribute to the right: rotate this page's last child into the
    /// head of `recipient` through `separator`. Returns the key to install
    /// as the new separator and the child that moved.
    pub fn move_last_to_front_of(
        &mut self,
        recipient: &mut InternalMut<'_, K>,
        separator: &K,
    ) -> (K, PageId) {
        let last = self.size() - 1;
        let up_key = self.key_at(last);
        let child = self.value_at(last);
        self.increase_size(-1);

        let old_first_child = recipient.value_at(0);
        recipient.insert_at(1, separator, old_first_child);
        recipient.set_value_at(0, child);

        (up_key, child)
    }
}
