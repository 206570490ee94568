use crate::common::types::{Lsn, Page, PageId};
use crate::storage::page::error::PageError;
use crate::storage::page::header::TablePageHeader;
use crate::storage::page::layout::{
    RecordLocation, DELETE_MASK, HEADER_SIZE, PAGE_CONSTANTS, SLOT_SIZE,
};

/// Stateless view over slotted table pages.
///
/// Slot entries are stored from the end of the page; record data grows
/// forward from just past the header. Slots are never reclaimed, so a
/// record id stays valid for the lifetime of the page: an empty slot
/// (length 0) is a physically deleted record, a mark-deleted slot keeps
/// its bytes until the delete is applied or rolled back.
pub struct PageManager {}

impl Default for PageManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PageManager {
    pub fn new() -> Self {
        Self {}
    }

    pub fn init_page(&self, page: &mut Page) {
        let header = TablePageHeader::new();
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        page.lsn = 0;
    }

    /// Insert a record into the first free slot, or append a new slot.
    /// Returns the slot index.
    pub fn insert_record(&self, page: &mut Page, data: &[u8]) -> Result<u32, PageError> {
        let mut header = self.get_header(page);
        let record_size = data.len() as u32;

        // Reuse an emptied slot before growing the slot array.
        for slot in 0..header.slot_count {
            let slot_pos = self.slot_position(slot);
            let loc = self.get_record_location(page, slot_pos);
            if loc.is_empty() {
                if header.free_space_size < record_size {
                    return Err(PageError::InsufficientSpace);
                }
                self.write_record(page, &mut header, slot_pos, data);
                page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
                return Ok(slot);
            }
        }

        let total_space_needed = record_size + SLOT_SIZE as u32;
        if header.free_space_size < total_space_needed {
            return Err(PageError::InsufficientSpace);
        }

        let slot = header.slot_count;
        let slot_pos = self.slot_position(slot);
        self.write_record(page, &mut header, slot_pos, data);
        header.free_space_size -= SLOT_SIZE as u32;
        header.slot_count += 1;

        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        Ok(slot)
    }

    /// Restore a record into a specific, currently empty slot. Used when a
    /// physical delete is undone and the record must reappear at its old id.
    pub fn insert_record_at(&self, page: &mut Page, slot: u32, data: &[u8]) -> Result<(), PageError> {
        let mut header = self.get_header(page);

        if slot >= header.slot_count {
            return Err(PageError::InvalidRecordId);
        }

        let slot_pos = self.slot_position(slot);
        let loc = self.get_record_location(page, slot_pos);
        if !loc.is_empty() {
            return Err(PageError::DuplicateRecord);
        }

        let record_size = data.len() as u32;
        if header.free_space_size < record_size {
            return Err(PageError::InsufficientSpace);
        }

        self.write_record(page, &mut header, slot_pos, data);
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        Ok(())
    }

    /// Read a live record. Empty and mark-deleted slots are not visible.
    pub fn get_record(&self, page: &Page, slot: u32) -> Result<Vec<u8>, PageError> {
        let loc = self.live_location(page, slot)?;
        let start = loc.offset as usize;
        let end = start + loc.record_length() as usize;
        Ok(page.data[start..end].to_vec())
    }

    /// Read a record's bytes whether or not it is marked deleted. Used
    /// when a pending delete is finally applied and the pre-image must be
    /// captured for the log.
    pub fn get_record_raw(&self, page: &Page, slot: u32) -> Result<Vec<u8>, PageError> {
        let header = self.get_header(page);
        if slot >= header.slot_count {
            return Err(PageError::InvalidRecordId);
        }
        let loc = self.get_record_location(page, self.slot_position(slot));
        if loc.is_empty() {
            return Err(PageError::RecordNotFound);
        }
        let start = loc.offset as usize;
        let end = start + loc.record_length() as usize;
        Ok(page.data[start..end].to_vec())
    }

    /// Logically delete a record: the bytes stay put so the delete can be
    /// rolled back, but scans no longer see the slot.
    pub fn mark_delete(&self, page: &mut Page, slot: u32) -> Result<(), PageError> {
        let mut loc = self.live_location(page, slot)?;
        loc.length |= DELETE_MASK;
        let slot_pos = self.slot_position(slot);
        page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&loc.to_bytes());
        Ok(())
    }

    /// Undo a mark-delete, making the record visible again.
    pub fn rollback_delete(&self, page: &mut Page, slot: u32) -> Result<(), PageError> {
        let header = self.get_header(page);
        if slot >= header.slot_count {
            return Err(PageError::InvalidRecordId);
        }

        let slot_pos = self.slot_position(slot);
        let mut loc = self.get_record_location(page, slot_pos);
        if loc.is_empty() {
            return Err(PageError::RecordNotFound);
        }
        if !loc.is_marked_deleted() {
            return Err(PageError::NotMarkedDeleted);
        }

        loc.length &= !DELETE_MASK;
        page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&loc.to_bytes());
        Ok(())
    }

    /// Physically delete a record. Works on live or mark-deleted slots; the
    /// slot itself survives so later record ids keep their meaning.
    pub fn apply_delete(&self, page: &mut Page, slot: u32) -> Result<(), PageError> {
        let mut header = self.get_header(page);
        if slot >= header.slot_count {
            return Err(PageError::InvalidRecordId);
        }

        let slot_pos = self.slot_position(slot);
        let loc = self.get_record_location(page, slot_pos);
        if loc.is_empty() {
            return Err(PageError::RecordNotFound);
        }

        let emptied = RecordLocation { offset: 0, length: 0 };
        page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&emptied.to_bytes());

        // The record bytes become dead space until compaction; only the
        // lost length is credited back.
        header.free_space_size += loc.record_length();
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        Ok(())
    }

    /// Overwrite a live record in place, relocating within the page when it grows.
    pub fn update_record(&self, page: &mut Page, slot: u32, data: &[u8]) -> Result<(), PageError> {
        let loc = self.live_location(page, slot)?;
        let slot_pos = self.slot_position(slot);
        let new_size = data.len() as u32;

        if new_size > loc.record_length() {
            let space_needed = new_size - loc.record_length();
            let mut header = self.get_header(page);
            if header.free_space_size < space_needed {
                return Err(PageError::InsufficientSpace);
            }

            let new_offset = header.free_space_offset;
            let new_end = new_offset as usize + data.len();
            page.data[new_offset as usize..new_end].copy_from_slice(data);

            let new_loc = RecordLocation { offset: new_offset, length: new_size };
            page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&new_loc.to_bytes());

            header.free_space_offset += new_size;
            header.free_space_size -= space_needed;
            page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
            return Ok(());
        }

        page.data[loc.offset as usize..loc.offset as usize + data.len()].copy_from_slice(data);

        if new_size < loc.record_length() {
            let new_loc = RecordLocation { offset: loc.offset, length: new_size };
            page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&new_loc.to_bytes());
        }

        Ok(())
    }

    /// Record the LSN of the latest log record applied to this page, both
    /// in the on-disk header and the in-memory page metadata.
    pub fn set_lsn(&self, page: &mut Page, lsn: Lsn) {
        let mut header = self.get_header(page);
        header.lsn = lsn;
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        page.lsn = lsn;
    }

    pub fn set_next_page_id(&self, page: &mut Page, next: Option<PageId>) {
        let mut header = self.get_header(page);
        header.next_page_id = next;
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    pub fn set_prev_page_id(&self, page: &mut Page, prev: Option<PageId>) {
        let mut header = self.get_header(page);
        header.prev_page_id = prev;
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    pub fn get_header(&self, page: &Page) -> TablePageHeader {
        TablePageHeader::from_bytes(&page.data[0..HEADER_SIZE])
    }

    pub fn get_free_space(&self, page: &Page) -> u32 {
        self.get_header(page).free_space_size
    }

    /// Whether the slot holds a live (visible) record.
    pub fn is_live(&self, page: &Page, slot: u32) -> bool {
        let header = self.get_header(page);
        if slot >= header.slot_count {
            return false;
        }
        let loc = self.get_record_location(page, self.slot_position(slot));
        !loc.is_empty() && !loc.is_marked_deleted()
    }

    fn write_record(&self, page: &mut Page, header: &mut TablePageHeader, slot_pos: usize, data: &[u8]) {
        let record_size = data.len() as u32;
        let loc = RecordLocation {
            offset: header.free_space_offset,
            length: record_size,
        };

        let data_end = header.free_space_offset as usize + data.len();
        page.data[header.free_space_offset as usize..data_end].copy_from_slice(data);
        page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&loc.to_bytes());

        header.free_space_offset += record_size;
        header.free_space_size -= record_size;
    }

    fn live_location(&self, page: &Page, slot: u32) -> Result<RecordLocation, PageError> {
        let header = self.get_header(page);
        if slot >= header.slot_count {
            return Err(PageError::InvalidRecordId);
        }
        let loc = self.get_record_location(page, self.slot_position(slot));
        if loc.is_empty() || loc.is_marked_deleted() {
            return Err(PageError::RecordNotFound);
        }
        Ok(loc)
    }

    fn slot_position(&self, slot: u32) -> usize {
        PAGE_CONSTANTS.page_size - SLOT_SIZE * (slot as usize + 1)
    }

    fn get_record_location(&self, page: &Page, slot_pos: usize) -> RecordLocation {
        RecordLocation::from_bytes(&page.data[slot_pos..slot_pos + SLOT_SIZE])
    }
}
