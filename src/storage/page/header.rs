use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Lsn, PageId};
use crate::storage::page::layout::{HEADER_SIZE, PAGE_CONSTANTS};

/// Header of a slotted table page. The LSN sits at byte 0 (the common
/// page-LSN position); slot entries grow from the end of the page while
/// record data grows from just past this header.
#[derive(Debug, Clone, Copy)]
pub struct TablePageHeader {
    pub lsn: Lsn,
    pub prev_page_id: Option<PageId>,
    pub next_page_id: Option<PageId>,
    pub free_space_offset: u32,
    pub free_space_size: u32,
    pub slot_count: u32,
}

impl Default for TablePageHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl TablePageHeader {
    pub fn new() -> Self {
        Self {
            lsn: 0,
            prev_page_id: None,
            next_page_id: None,
            free_space_offset: HEADER_SIZE as u32,
            free_space_size: (PAGE_CONSTANTS.page_size - HEADER_SIZE) as u32,
            slot_count: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];

        LittleEndian::write_u32(&mut bytes[0..4], self.lsn);

        let prev_id = self.prev_page_id.unwrap_or(u32::MAX);
        LittleEndian::write_u32(&mut bytes[4..8], prev_id);

        let next_id = self.next_page_id.unwrap_or(u32::MAX);
        LittleEndian::write_u32(&mut bytes[8..12], next_id);

        LittleEndian::write_u32(&mut bytes[12..16], self.free_space_offset);
        LittleEndian::write_u32(&mut bytes[16..20], self.free_space_size);
        LittleEndian::write_u32(&mut bytes[20..24], self.slot_count);

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let lsn = LittleEndian::read_u32(&bytes[0..4]);

        let prev_id = LittleEndian::read_u32(&bytes[4..8]);
        let prev_page_id = if prev_id == u32::MAX { None } else { Some(prev_id) };

        let next_id = LittleEndian::read_u32(&bytes[8..12]);
        let next_page_id = if next_id == u32::MAX { None } else { Some(next_id) };

        let free_space_offset = LittleEndian::read_u32(&bytes[12..16]);
        let free_space_size = LittleEndian::read_u32(&bytes[16..20]);
        let slot_count = LittleEndian::read_u32(&bytes[20..24]);

        Self {
            lsn,
            prev_page_id,
            next_page_id,
            free_space_offset,
            free_space_size,
            slot_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = TablePageHeader {
            lsn: 17,
            prev_page_id: Some(3),
            next_page_id: None,
            free_space_offset: 100,
            free_space_size: 3900,
            slot_count: 2,
        };
        let decoded = TablePageHeader::from_bytes(&header.to_bytes());
        assert_eq!(decoded.lsn, 17);
        assert_eq!(decoded.prev_page_id, Some(3));
        assert_eq!(decoded.next_page_id, None);
        assert_eq!(decoded.free_space_offset, 100);
        assert_eq!(decoded.free_space_size, 3900);
        assert_eq!(decoded.slot_count, 2);
    }
}
