use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::common::types::{Lsn, PageId, Rid, TxnId};
use crate::storage::table::tuple::Tuple;

/// Error type for log record operations
#[derive(Error, Debug)]
pub enum LogRecordError {
    #[error("Failed to serialize log record: {0}")]
    SerializationError(String),
    #[error("Invalid log record format")]
    InvalidFormat,
}

pub type Result<T> = std::result::Result<T, LogRecordError>;

/// Fixed 20-byte record header: size, lsn, txn_id, prev_lsn, type.
pub const HEADER_SIZE: usize = 20;

/// Types of log records supported by the WAL system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LogRecordType {
    Invalid = 0,
    Insert = 1,
    MarkDelete = 2,
    ApplyDelete = 3,
    RollbackDelete = 4,
    Update = 5,
    Begin = 6,
    Commit = 7,
    Abort = 8,
    NewPage = 9,
}

impl LogRecordType {
    fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::Insert),
            2 => Some(Self::MarkDelete),
            3 => Some(Self::ApplyDelete),
            4 => Some(Self::RollbackDelete),
            5 => Some(Self::Update),
            6 => Some(Self::Begin),
            7 => Some(Self::Commit),
            8 => Some(Self::Abort),
            9 => Some(Self::NewPage),
            _ => None,
        }
    }
}

/// Type-specific payload following the record header
#[derive(Debug, Clone, PartialEq)]
pub enum LogPayload {
    Begin,
    Commit,
    Abort,
    Insert { rid: Rid, tuple: Tuple },
    MarkDelete { rid: Rid, tuple: Tuple },
    ApplyDelete { rid: Rid, tuple: Tuple },
    RollbackDelete { rid: Rid, tuple: Tuple },
    Update { rid: Rid, old_tuple: Tuple, new_tuple: Tuple },
    NewPage { prev_page_id: PageId, page_id: PageId },
}

/// A write-ahead log record. The LSN is assigned by the log manager at
/// append time; until then it is 0.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub lsn: Lsn,
    pub txn_id: TxnId,
    pub prev_lsn: Lsn,
    pub payload: LogPayload,
}

impl LogRecord {
    pub fn new(txn_id: TxnId, prev_lsn: Lsn, payload: LogPayload) -> Self {
        Self {
            lsn: 0,
            txn_id,
            prev_lsn,
            payload,
        }
    }

    pub fn new_begin(txn_id: TxnId) -> Self {
        Self::new(txn_id, 0, LogPayload::Begin)
    }

    pub fn new_commit(txn_id: TxnId, prev_lsn: Lsn) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::Commit)
    }

    pub fn new_abort(txn_id: TxnId, prev_lsn: Lsn) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::Abort)
    }

    pub fn new_insert(txn_id: TxnId, prev_lsn: Lsn, rid: Rid, tuple: Tuple) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::Insert { rid, tuple })
    }

    pub fn new_mark_delete(txn_id: TxnId, prev_lsn: Lsn, rid: Rid, tuple: Tuple) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::MarkDelete { rid, tuple })
    }

    pub fn new_apply_delete(txn_id: TxnId, prev_lsn: Lsn, rid: Rid, tuple: Tuple) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::ApplyDelete { rid, tuple })
    }

    pub fn new_rollback_delete(txn_id: TxnId, prev_lsn: Lsn, rid: Rid, tuple: Tuple) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::RollbackDelete { rid, tuple })
    }

    pub fn new_update(txn_id: TxnId, prev_lsn: Lsn, rid: Rid, old_tuple: Tuple, new_tuple: Tuple) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::Update { rid, old_tuple, new_tuple })
    }

    pub fn new_page(txn_id: TxnId, prev_lsn: Lsn, prev_page_id: PageId, page_id: PageId) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::NewPage { prev_page_id, page_id })
    }

    pub fn record_type(&self) -> LogRecordType {
        match &self.payload {
            LogPayload::Begin => LogRecordType::Begin,
            LogPayload::Commit => LogRecordType::Commit,
            LogPayload::Abort => LogRecordType::Abort,
            LogPayload::Insert { .. } => LogRecordType::Insert,
            LogPayload::MarkDelete { .. } => LogRecordType::MarkDelete,
            LogPayload::ApplyDelete { .. } => LogRecordType::ApplyDelete,
            LogPayload::RollbackDelete { .. } => LogRecordType::RollbackDelete,
            LogPayload::Update { .. } => LogRecordType::Update,
            LogPayload::NewPage { .. } => LogRecordType::NewPage,
        }
    }

    /// Total serialized size: header plus type-specific payload.
    pub fn size(&self) -> Result<usize> {
        let payload = match &self.payload {
            LogPayload::Begin | LogPayload::Commit | LogPayload::Abort => 0,
            LogPayload::Insert { tuple, .. }
            | LogPayload::MarkDelete { tuple, .. }
            | LogPayload::ApplyDelete { tuple, .. }
            | LogPayload::RollbackDelete { tuple, .. } => Rid::SIZE + 4 + tuple_len(tuple)?,
            LogPayload::Update { old_tuple, new_tuple, .. } => {
                Rid::SIZE + 4 + tuple_len(old_tuple)? + 4 + tuple_len(new_tuple)?
            }
            LogPayload::NewPage { .. } => 8,
        };
        Ok(HEADER_SIZE + payload)
    }

    /// Serialize the full record (header + payload) to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let size = self.size()?;
        let mut bytes = Vec::with_capacity(size);
        bytes.resize(HEADER_SIZE, 0);

        LittleEndian::write_u32(&mut bytes[0..4], size as u32);
        LittleEndian::write_u32(&mut bytes[4..8], self.lsn);
        LittleEndian::write_u32(&mut bytes[8..12], self.txn_id);
        LittleEndian::write_u32(&mut bytes[12..16], self.prev_lsn);
        LittleEndian::write_u32(&mut bytes[16..20], self.record_type() as u32);

        match &self.payload {
            LogPayload::Begin | LogPayload::Commit | LogPayload::Abort => {}
            LogPayload::Insert { rid, tuple }
            | LogPayload::MarkDelete { rid, tuple }
            | LogPayload::ApplyDelete { rid, tuple }
            | LogPayload::RollbackDelete { rid, tuple } => {
                write_rid(&mut bytes, rid);
                write_tuple(&mut bytes, tuple)?;
            }
            LogPayload::Update { rid, old_tuple, new_tuple } => {
                write_rid(&mut bytes, rid);
                write_tuple(&mut bytes, old_tuple)?;
                write_tuple(&mut bytes, new_tuple)?;
            }
            LogPayload::NewPage { prev_page_id, page_id } => {
                let mut buf = [0u8; 8];
                LittleEndian::write_u32(&mut buf[0..4], *prev_page_id);
                LittleEndian::write_u32(&mut buf[4..8], *page_id);
                bytes.extend_from_slice(&buf);
            }
        }

        debug_assert_eq!(bytes.len(), size);
        Ok(bytes)
    }

    /// Deserialize one record from the front of `data`. Returns None when
    /// the bytes do not hold a complete, well-formed record (the normal
    /// end-of-buffer condition while scanning the log).
    pub fn deserialize(data: &[u8]) -> Option<LogRecord> {
        if data.len() < HEADER_SIZE {
            return None;
        }

        let size = LittleEndian::read_u32(&data[0..4]) as usize;
        if size < HEADER_SIZE || size > data.len() {
            return None;
        }

        let lsn = LittleEndian::read_u32(&data[4..8]);
        let txn_id = LittleEndian::read_u32(&data[8..12]);
        let prev_lsn = LittleEndian::read_u32(&data[12..16]);
        let record_type = LogRecordType::from_u32(LittleEndian::read_u32(&data[16..20]))?;

        let mut cursor = &data[HEADER_SIZE..size];
        let payload = match record_type {
            LogRecordType::Invalid => return None,
            LogRecordType::Begin => LogPayload::Begin,
            LogRecordType::Commit => LogPayload::Commit,
            LogRecordType::Abort => LogPayload::Abort,
            LogRecordType::Insert => {
                let rid = read_rid(&mut cursor)?;
                let tuple = read_tuple(&mut cursor)?;
                LogPayload::Insert { rid, tuple }
            }
            LogRecordType::MarkDelete => {
                let rid = read_rid(&mut cursor)?;
                let tuple = read_tuple(&mut cursor)?;
                LogPayload::MarkDelete { rid, tuple }
            }
            LogRecordType::ApplyDelete => {
                let rid = read_rid(&mut cursor)?;
                let tuple = read_tuple(&mut cursor)?;
                LogPayload::ApplyDelete { rid, tuple }
            }
            LogRecordType::RollbackDelete => {
                let rid = read_rid(&mut cursor)?;
                let tuple = read_tuple(&mut cursor)?;
                LogPayload::RollbackDelete { rid, tuple }
            }
            LogRecordType::Update => {
                let rid = read_rid(&mut cursor)?;
                let old_tuple = read_tuple(&mut cursor)?;
                let new_tuple = read_tuple(&mut cursor)?;
                LogPayload::Update { rid, old_tuple, new_tuple }
            }
            LogRecordType::NewPage => {
                if cursor.len() < 8 {
                    return None;
                }
                let prev_page_id = LittleEndian::read_u32(&cursor[0..4]);
                let page_id = LittleEndian::read_u32(&cursor[4..8]);
                LogPayload::NewPage { prev_page_id, page_id }
            }
        };

        Some(LogRecord {
            lsn,
            txn_id,
            prev_lsn,
            payload,
        })
    }
}

fn tuple_len(tuple: &Tuple) -> Result<usize> {
    tuple
        .to_bytes()
        .map(|b| b.len())
        .map_err(|e| LogRecordError::SerializationError(e.to_string()))
}

fn write_rid(bytes: &mut Vec<u8>, rid: &Rid) {
    let mut buf = [0u8; Rid::SIZE];
    LittleEndian::write_u32(&mut buf[0..4], rid.page_id);
    LittleEndian::write_u32(&mut buf[4..8], rid.slot);
    bytes.extend_from_slice(&buf);
}

fn write_tuple(bytes: &mut Vec<u8>, tuple: &Tuple) -> Result<()> {
    let data = tuple
        .to_bytes()
        .map_err(|e| LogRecordError::SerializationError(e.to_string()))?;
    let mut len = [0u8; 4];
    LittleEndian::write_u32(&mut len, data.len() as u32);
    bytes.extend_from_slice(&len);
    bytes.extend_from_slice(&data);
    Ok(())
}

fn read_rid(cursor: &mut &[u8]) -> Option<Rid> {
    if cursor.len() < Rid::SIZE {
        return None;
    }
    let page_id = LittleEndian::read_u32(&cursor[0..4]);
    let slot = LittleEndian::read_u32(&cursor[4..8]);
    *cursor = &cursor[Rid::SIZE..];
    Some(Rid::new(page_id, slot))
}

fn read_tuple(cursor: &mut &[u8]) -> Option<Tuple> {
    if cursor.len() < 4 {
        return None;
    }
    let len = LittleEndian::read_u32(&cursor[0..4]) as usize;
    if cursor.len() < 4 + len {
        return None;
    }
    let tuple = Tuple::from_bytes(&cursor[4..4 + len]).ok()?;
    *cursor = &cursor[4 + len..];
    Some(tuple)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::value::DataValue;

    fn sample_tuple() -> Tuple {
        Tuple::new(vec![DataValue::Integer(7), DataValue::Text("abc".into())])
    }

    #[test]
    fn test_begin_roundtrip() {
        let mut record = LogRecord::new_begin(3);
        record.lsn = 1;
        let bytes = record.to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);

        let decoded = LogRecord::deserialize(&bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_insert_roundtrip() {
        let mut record = LogRecord::new_insert(5, 9, Rid::new(2, 4), sample_tuple());
        record.lsn = 10;
        let bytes = record.to_bytes().unwrap();
        assert_eq!(bytes.len() as u32, LittleEndian::read_u32(&bytes[0..4]));

        let decoded = LogRecord::deserialize(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.record_type(), LogRecordType::Insert);
    }

    #[test]
    fn test_update_roundtrip() {
        let old_tuple = sample_tuple();
        let new_tuple = Tuple::new(vec![DataValue::Integer(8), DataValue::Text("xyz".into())]);
        let mut record = LogRecord::new_update(1, 2, Rid::new(5, 1), old_tuple, new_tuple);
        record.lsn = 3;

        let bytes = record.to_bytes().unwrap();
        let decoded = LogRecord::deserialize(&bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_new_page_roundtrip() {
        let mut record = LogRecord::new_page(2, 6, crate::common::types::INVALID_PAGE_ID, 12);
        record.lsn = 7;
        let bytes = record.to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 8);

        let decoded = LogRecord::deserialize(&bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_deserialize_rejects_garbage() {
        // Too short for a header.
        assert!(LogRecord::deserialize(&[0u8; 10]).is_none());
        // Zeroed header has size 0, which is invalid.
        assert!(LogRecord::deserialize(&[0u8; 64]).is_none());
        // Truncated payload.
        let mut record = LogRecord::new_insert(1, 0, Rid::new(0, 0), sample_tuple());
        record.lsn = 1;
        let bytes = record.to_bytes().unwrap();
        assert!(LogRecord::deserialize(&bytes[..bytes.len() - 3]).is_none());
    }
}
