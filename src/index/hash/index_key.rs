use crate::index::hash::storable::Storable;
use crate::storage::table::tuple::Tuple;

/// Fixed-width key built from a tuple's key columns. Serialized column
/// values are truncated (or zero-padded) to the key width, so very long
/// text prefixes can alias; acceptable for an index that re-checks tuples
/// against the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexKey {
    data: [u8; Self::WIDTH],
}

impl IndexKey {
    pub const WIDTH: usize = 16;

    pub fn from_tuple(tuple: &Tuple) -> Self {
        let bytes = tuple.to_bytes().unwrap_or_default();
        let mut data = [0u8; Self::WIDTH];
        let n = bytes.len().min(Self::WIDTH);
        data[..n].copy_from_slice(&bytes[..n]);
        Self { data }
    }
}

impl Storable for IndexKey {
    const SIZE: usize = Self::WIDTH;

    fn write_to(&self, buf: &mut [u8]) {
        buf[..Self::WIDTH].copy_from_slice(&self.data);
    }

    fn read_from(buf: &[u8]) -> Self {
        let mut data = [0u8; Self::WIDTH];
        data.copy_from_slice(&buf[..Self::WIDTH]);
        Self { data }
    }
}
