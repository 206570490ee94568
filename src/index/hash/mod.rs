pub mod bucket_page;
pub mod directory_page;
pub mod extendible_hash_table;
pub mod index_key;
pub mod storable;

pub use extendible_hash_table::{ExtendibleHashTable, IndexError};
pub use index_key::IndexKey;
pub use storable::Storable;

use crate::common::types::Rid;

/// The executor-facing index instantiation: fixed-width composite keys
/// mapping to record ids.
pub type HashIndex = ExtendibleHashTable<IndexKey, Rid>;
