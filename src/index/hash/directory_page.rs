use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, PageId, INVALID_PAGE_ID};

/// Directory slots never exceed this, bounding global depth at 9.
pub const DIRECTORY_ARRAY_SIZE: usize = 512;

const GLOBAL_DEPTH_OFFSET: usize = 4; // bytes 0..4 hold the page LSN
const BUCKET_IDS_OFFSET: usize = 8;
const LOCAL_DEPTHS_OFFSET: usize = BUCKET_IDS_OFFSET + DIRECTORY_ARRAY_SIZE * 4;

/// View over the extendible hash table's directory page: a global depth
/// plus `(bucket_page_id, local_depth)` per slot. All accessors parse and
/// serialize through explicit offsets; the page is just bytes.
pub struct DirectoryPage;

impl DirectoryPage {
    pub fn init(page: &mut Page) {
        page.reset_memory();
        Self::set_global_depth(page, 0);
        for i in 0..DIRECTORY_ARRAY_SIZE {
            Self::set_bucket_page_id(page, i as u32, INVALID_PAGE_ID);
        }
    }

    pub fn global_depth(page: &Page) -> u32 {
        LittleEndian::read_u32(&page.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4])
    }

    pub fn set_global_depth(page: &mut Page, depth: u32) {
        LittleEndian::write_u32(
            &mut page.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4],
            depth,
        );
    }

    pub fn incr_global_depth(page: &mut Page) {
        let depth = Self::global_depth(page);
        Self::set_global_depth(page, depth + 1);
    }

    pub fn decr_global_depth(page: &mut Page) {
        let depth = Self::global_depth(page);
        Self::set_global_depth(page, depth - 1);
    }

    /// Low-bit mask selecting a directory slot for a hash.
    pub fn global_depth_mask(page: &Page) -> u32 {
        (1u32 << Self::global_depth(page)) - 1
    }

    /// Number of live directory slots.
    pub fn size(page: &Page) -> u32 {
        1u32 << Self::global_depth(page)
    }

    pub fn bucket_page_id(page: &Page, idx: u32) -> PageId {
        let off = BUCKET_IDS_OFFSET + idx as usize * 4;
        LittleEndian::read_u32(&page.data[off..off + 4])
    }

    pub fn set_bucket_page_id(page: &mut Page, idx: u32, page_id: PageId) {
        let off = BUCKET_IDS_OFFSET + idx as usize * 4;
        LittleEndian::write_u32(&mut page.data[off..off + 4], page_id);
    }

    pub fn local_depth(page: &Page, idx: u32) -> u32 {
        page.data[LOCAL_DEPTHS_OFFSET + idx as usize] as u32
    }

    pub fn set_local_depth(page: &mut Page, idx: u32, depth: u32) {
        page.data[LOCAL_DEPTHS_OFFSET + idx as usize] = depth as u8;
    }

    pub fn incr_local_depth(page: &mut Page, idx: u32) {
        let depth = Self::local_depth(page, idx);
        Self::set_local_depth(page, idx, depth + 1);
    }

    pub fn decr_local_depth(page: &mut Page, idx: u32) {
        let depth = Self::local_depth(page, idx);
        Self::set_local_depth(page, idx, depth - 1);
    }

    pub fn local_depth_mask(page: &Page, idx: u32) -> u32 {
        (1u32 << Self::local_depth(page, idx)) - 1
    }

    /// The slot differing from `idx` only in its highest local-depth bit.
    pub fn split_image_index(page: &Page, idx: u32) -> u32 {
        let depth = Self::local_depth(page, idx);
        if depth == 0 {
            return idx;
        }
        idx ^ (1u32 << (depth - 1))
    }

    /// True when no slot needs the full global depth any more.
    pub fn can_shrink(page: &Page) -> bool {
        let global = Self::global_depth(page);
        (0..Self::size(page)).all(|i| Self::local_depth(page, i) < global)
    }

    /// Check the directory invariants: every local depth is bounded by the
    /// global depth, and all slots agreeing on the low local-depth bits
    /// point at the same bucket with the same local depth.
    pub fn verify_integrity(page: &Page) -> Result<(), String> {
        let size = Self::size(page);
        let global = Self::global_depth(page);

        for i in 0..size {
            let depth = Self::local_depth(page, i);
            if depth > global {
                return Err(format!(
                    "slot {} has local depth {} above global depth {}",
                    i, depth, global
                ));
            }

            let mask = Self::local_depth_mask(page, i);
            let bucket = Self::bucket_page_id(page, i);
            for j in 0..size {
                if j & mask == i & mask {
                    if Self::bucket_page_id(page, j) != bucket {
                        return Err(format!(
                            "slots {} and {} share low bits but point at different buckets",
                            i, j
                        ));
                    }
                    if Self::local_depth(page, j) != depth {
                        return Err(format!(
                            "slots {} and {} share a bucket but disagree on local depth",
                            i, j
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_bookkeeping() {
        let mut page = Page::new(0);
        DirectoryPage::init(&mut page);
        assert_eq!(DirectoryPage::global_depth(&page), 0);
        assert_eq!(DirectoryPage::size(&page), 1);

        DirectoryPage::incr_global_depth(&mut page);
        assert_eq!(DirectoryPage::size(&page), 2);
        assert_eq!(DirectoryPage::global_depth_mask(&page), 0b1);

        DirectoryPage::set_local_depth(&mut page, 0, 1);
        DirectoryPage::set_local_depth(&mut page, 1, 1);
        assert_eq!(DirectoryPage::split_image_index(&page, 0), 1);
        assert_eq!(DirectoryPage::split_image_index(&page, 1), 0);
    }

    #[test]
    fn test_verify_integrity_flags_mismatch() {
        let mut page = Page::new(0);
        DirectoryPage::init(&mut page);
        DirectoryPage::incr_global_depth(&mut page);
        DirectoryPage::set_local_depth(&mut page, 0, 1);
        DirectoryPage::set_local_depth(&mut page, 1, 1);
        DirectoryPage::set_bucket_page_id(&mut page, 0, 10);
        DirectoryPage::set_bucket_page_id(&mut page, 1, 11);
        assert!(DirectoryPage::verify_integrity(&page).is_ok());

        // Local depth 0 means both slots must share one bucket; they don't.
        DirectoryPage::set_local_depth(&mut page, 0, 0);
        DirectoryPage::set_local_depth(&mut page, 1, 0);
        assert!(DirectoryPage::verify_integrity(&page).is_err());
    }
}
