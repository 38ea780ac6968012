use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Lsn, PageId, INVALID_PAGE_ID};

/// Size of the header shared by internal and leaf nodes:
///
/// ```text
/// | PageType (4) | LSN (4) | CurrentSize (4) | MaxSize (4) |
/// | ParentPageId (4) | PageId (4) |
/// ```
pub const NODE_HEADER_SIZE: usize = 24;

const PAGE_TYPE_OFFSET: usize = 0;
const LSN_OFFSET: usize = 4;
const SIZE_OFFSET: usize = 8;
const MAX_SIZE_OFFSET: usize = 12;
const PARENT_PAGE_ID_OFFSET: usize = 16;
const PAGE_ID_OFFSET: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPageType {
    Invalid = 0,
    Leaf = 1,
    Internal = 2,
}

impl IndexPageType {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(IndexPageType::Invalid),
            1 => Some(IndexPageType::Leaf),
            2 => Some(IndexPageType::Internal),
            _ => None,
        }
    }
}

/// The tree operation a traversal is performing; decides both the latch mode
/// taken during the descent and the node-safety predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Get,
    Insert,
    Delete,
}

pub(crate) fn page_type(data: &[u8]) -> Option<IndexPageType> {
    IndexPageType::from_tag(LittleEndian::read_u32(&data[PAGE_TYPE_OFFSET..]))
}

pub(crate) fn node_size(data: &[u8]) -> usize {
    LittleEndian::read_u32(&data[SIZE_OFFSET..]) as usize
}

pub(crate) fn node_max_size(data: &[u8]) -> usize {
    LittleEndian::read_u32(&data[MAX_SIZE_OFFSET..]) as usize
}

pub(crate) fn node_parent(data: &[u8]) -> PageId {
    LittleEndian::read_i32(&data[PARENT_PAGE_ID_OFFSET..])
}

pub(crate) fn set_node_parent(data: &mut [u8], parent_page_id: PageId) {
    LittleEndian::write_i32(&mut data[PARENT_PAGE_ID_OFFSET..PARENT_PAGE_ID_OFFSET + 4], parent_page_id);
}

pub(crate) fn node_is_safe(data: &[u8], op: OperationType) -> bool {
    let size = node_size(data);
    match op {
        OperationType::Get => true,
        OperationType::Insert => size < node_max_size(data),
        OperationType::Delete => size > node_min_size(data),
    }
}

fn node_min_size(data: &[u8]) -> usize {
    let is_root = node_parent(data) == INVALID_PAGE_ID;
    let is_leaf = page_type(data) == Some(IndexPageType::Leaf);
    min_size_for(node_max_size(data), is_root, is_leaf)
}

/// The underflow threshold. Only the root may shrink below half occupancy:
/// a root leaf must keep one entry, a root internal node two children.
pub(crate) fn min_size_for(max_size: usize, is_root: bool, is_leaf: bool) -> usize {
    if is_root {
        if is_leaf {
            1
        } else {
            2
        }
    } else {
        (max_size + 1) / 2
    }
}

/// Read access to the shared node header.
pub trait BTreePageView {
    fn data(&self) -> &[u8];

    fn page_type(&self) -> Option<IndexPageType> {
        page_type(self.data())
    }

    fn is_leaf(&self) -> bool {
        self.page_type() == Some(IndexPageType::Leaf)
    }

    fn is_root(&self) -> bool {
        self.parent_page_id() == INVALID_PAGE_ID
    }

    fn lsn(&self) -> Lsn {
        LittleEndian::read_u32(&self.data()[LSN_OFFSET..])
    }

    fn size(&self) -> usize {
        node_size(self.data())
    }

    fn max_size(&self) -> usize {
        node_max_size(self.data())
    }

    fn min_size(&self) -> usize {
        min_size_for(self.max_size(), self.is_root(), self.is_leaf())
    }

    fn parent_page_id(&self) -> PageId {
        node_parent(self.data())
    }

    fn page_id(&self) -> PageId {
        LittleEndian::read_i32(&self.data()[PAGE_ID_OFFSET..])
    }

    /// A node is safe for an operation when the operation cannot propagate
    /// past it: an insert below leaves room for a pushed-up separator, a
    /// delete below cannot drive it under its minimum.
    fn is_safe(&self, op: OperationType) -> bool {
        node_is_safe(self.data(), op)
    }
}

/// Write access to the shared node header.
pub trait BTreePageViewMut: BTreePageView {
    fn data_mut(&mut self) -> &mut [u8];

    fn set_page_type(&mut self, page_type: IndexPageType) {
        LittleEndian::write_u32(
            &mut self.data_mut()[PAGE_TYPE_OFFSET..PAGE_TYPE_OFFSET + 4],
            page_type as u32,
        );
    }

    fn set_lsn(&mut self, lsn: Lsn) {
        LittleEndian::write_u32(&mut self.data_mut()[LSN_OFFSET..LSN_OFFSET + 4], lsn);
    }

    fn set_size(&mut self, size: usize) {
        LittleEndian::write_u32(&mut self.data_mut()[SIZE_OFFSET..SIZE_OFFSET + 4], size as u32);
    }

    fn increase_size(&mut self, amount: i32) {
        let new_size = self.size() as i32 + amount;
        debug_assert!(new_size >= 0);
        self.set_size(new_size as usize);
    }

    fn set_max_size(&mut self, max_size: usize) {
        LittleEndian::write_u32(
            &mut self.data_mut()[MAX_SIZE_OFFSET..MAX_SIZE_OFFSET + 4],
            max_size as u32,
        );
    }

    fn set_parent_page_id(&mut self, parent_page_id: PageId) {
        set_node_parent(self.data_mut(), parent_page_id);
    }

    fn set_page_id(&mut self, page_id: PageId) {
        LittleEndian::write_i32(&mut self.data_mut()[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4], page_id);
    }
}
