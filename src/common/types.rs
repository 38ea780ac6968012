use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page ID type
pub type PageId = i32;

/// Sentinel for "no page"
pub const INVALID_PAGE_ID: PageId = -1;

/// Page 0 holds the index directory
pub const HEADER_PAGE_ID: PageId = 0;

/// Buffer pool frame ID type: a dense index into the frame array
pub type FrameId = usize;

/// Transaction ID type
pub type TxnId = u32;

/// LSN (Log Sequence Number) type
pub type Lsn = u32;

/// Record ID: the page holding a tuple and the tuple's slot within it.
/// Doubles as the lock manager's lockable unit and the B+Tree leaf value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rid {
    page_id: PageId,
    slot_num: u32,
}

impl Rid {
    pub const ENCODED_SIZE: usize = 8;

    pub fn new(page_id: PageId, slot_num: u32) -> Self {
        Self { page_id, slot_num }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn slot_num(&self) -> u32 {
        self.slot_num
    }

    pub fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(&mut buf[0..4], self.page_id);
        LittleEndian::write_u32(&mut buf[4..8], self.slot_num);
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self {
            page_id: LittleEndian::read_i32(&buf[0..4]),
            slot_num: LittleEndian::read_u32(&buf[4..8]),
        }
    }
}

/// Raw content of one page-sized buffer. The per-frame reader/writer latch
/// wraps this type; frame metadata (pin count, dirty flag) lives in the
/// buffer pool and is guarded by the pool's own mutex.
pub struct PageBuf {
    pub data: [u8; PAGE_SIZE],
}

impl PageBuf {
    pub fn new() -> Self {
        Self {
            data: [0; PAGE_SIZE],
        }
    }

    pub fn reset(&mut self) {
        self.data.fill(0);
    }
}

impl Default for PageBuf {
    fn default() -> Self {
        Self::new()
    }
}

/// Smart pointer to a latched page buffer
pub type PagePtr = Arc<RwLock<PageBuf>>;

/// Owned read latch on a page's contents
pub type PageReadGuard = ArcRwLockReadGuard<RawRwLock, PageBuf>;

/// Owned write latch on a page's contents
pub type PageWriteGuard = ArcRwLockWriteGuard<RawRwLock, PageBuf>;

/// A pinned page handed out by the buffer pool. Latching goes through the
/// handle; dropping it does NOT unpin — callers pair every fetch with an
/// `unpin_page` call, exactly as many times as they fetched.
pub struct PageHandle {
    page_id: PageId,
    buf: PagePtr,
}

impl PageHandle {
    pub(crate) fn new(page_id: PageId, buf: PagePtr) -> Self {
        Self { page_id, buf }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Acquire the page's read latch.
    pub fn read(&self) -> PageReadGuard {
        self.buf.read_arc()
    }

    /// Acquire the page's write latch.
    pub fn write(&self) -> PageWriteGuard {
        self.buf.write_arc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rid_roundtrip() {
        let rid = Rid::new(42, 7);
        let mut buf = [0u8; Rid::ENCODED_SIZE];
        rid.encode(&mut buf);
        assert_eq!(Rid::decode(&buf), rid);
    }

    #[test]
    fn test_rid_ordering() {
        assert!(Rid::new(1, 0) < Rid::new(2, 0));
        assert!(Rid::new(1, 3) < Rid::new(1, 4));
    }
}
