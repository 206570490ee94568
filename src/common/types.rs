use std::sync::Arc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page ID type
pub type PageId = u32;

/// Sentinel for "no page". Real page ids start at 0 and are partitioned
/// across buffer pool instances, so the sentinel lives at the top of the range.
pub const INVALID_PAGE_ID: PageId = u32::MAX;

/// Transaction ID type. Smaller ids are older transactions.
pub type TxnId = u32;

/// Buffer pool frame ID type
pub type FrameId = u32;

/// LSN (Log Sequence Number) type. LSNs are assigned from 1 upward;
/// 0 means "no log record" (fresh page, or no previous record in a chain).
pub type Lsn = u32;

/// Record identifier: which page, which slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rid {
    pub page_id: PageId,
    pub slot: u32,
}

impl Rid {
    /// Serialized width on disk and in log records.
    pub const SIZE: usize = 8;

    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot)
    }
}

/// Page structure: a fixed-size byte container plus identity and recovery metadata.
#[derive(Debug, Clone)]
pub struct Page {
    pub data: [u8; PAGE_SIZE],
    pub page_id: PageId,
    pub lsn: Lsn,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            data: [0; PAGE_SIZE],
            page_id,
            lsn: 0,
        }
    }

    /// Zero the backing bytes; identity and LSN are the caller's business.
    pub fn reset_memory(&mut self) {
        self.data = [0; PAGE_SIZE];
    }
}

/// Smart pointer to a page. The RwLock doubles as the per-page read/write latch.
pub type PagePtr = Arc<RwLock<Page>>;

/// Buffer pool frame structure
#[derive(Debug)]
pub struct Frame {
    pub page: PagePtr,
    pub frame_id: FrameId,
    pub is_dirty: bool,
    pub pin_count: u32,
}

impl Frame {
    pub fn new(frame_id: FrameId, page: PagePtr) -> Self {
        Self {
            page,
            frame_id,
            is_dirty: false,
            pin_count: 0,
        }
    }
}

/// Smart pointer to a frame
pub type FramePtr = Arc<RwLock<Frame>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_new_is_zeroed() {
        let page = Page::new(7);
        assert_eq!(page.page_id, 7);
        assert_eq!(page.lsn, 0);
        assert!(page.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_rid_ordering() {
        let a = Rid::new(1, 5);
        let b = Rid::new(2, 0);
        let c = Rid::new(1, 6);
        assert!(a < b);
        assert!(a < c);
        assert_eq!(a, Rid::new(1, 5));
    }
}
