use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::catalog::schema::Schema;
use crate::index::hash::{HashIndex, IndexError, IndexKey};
use crate::storage::buffer::manager::BufferPool;
use crate::storage::table::table_heap::{TableHeap, TableHeapError};
use crate::transaction::concurrency::transaction::Transaction;
use crate::transaction::wal::log_manager::LogManager;

pub type TableOid = u32;
pub type IndexOid = u32;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Table {0} already exists")]
    TableExists(String),

    #[error("Table heap error: {0}")]
    Heap(#[from] TableHeapError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

/// Metadata for one table.
pub struct TableInfo {
    pub name: String,
    pub oid: TableOid,
    pub schema: Schema,
    pub table: Arc<TableHeap>,
}

/// Metadata for one index over a table's key columns.
pub struct IndexInfo {
    pub name: String,
    pub index_oid: IndexOid,
    pub table_name: String,
    pub key_schema: Schema,
    pub key_attrs: Vec<usize>,
    pub index: Arc<HashIndex>,
}

/// In-memory catalog mapping names and oids to table heaps and indexes.
pub struct Catalog {
    buffer_pool: Arc<dyn BufferPool>,
    log_manager: Option<Arc<LogManager>>,
    next_table_oid: AtomicU32,
    next_index_oid: AtomicU32,
    tables: RwLock<HashMap<TableOid, Arc<TableInfo>>>,
    table_names: RwLock<HashMap<String, TableOid>>,
    indexes: RwLock<HashMap<String, Vec<Arc<IndexInfo>>>>,
}

impl Catalog {
    pub fn new(buffer_pool: Arc<dyn BufferPool>, log_manager: Option<Arc<LogManager>>) -> Self {
        Self {
            buffer_pool,
            log_manager,
            next_table_oid: AtomicU32::new(0),
            next_index_oid: AtomicU32::new(0),
            tables: RwLock::new(HashMap::new()),
            table_names: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
        }
    }

    /// Create a table with a fresh heap.
    pub fn create_table(
        &self,
        name: &str,
        schema: Schema,
        txn: Option<&Transaction>,
    ) -> Result<Arc<TableInfo>, CatalogError> {
        if self.table_names.read().contains_key(name) {
            return Err(CatalogError::TableExists(name.to_string()));
        }

        let heap = Arc::new(TableHeap::new(
            Arc::clone(&self.buffer_pool),
            self.log_manager.clone(),
            txn,
        )?);

        let oid = self.next_table_oid.fetch_add(1, Ordering::SeqCst);
        let info = Arc::new(TableInfo {
            name: name.to_string(),
            oid,
            schema,
            table: heap,
        });

        self.tables.write().insert(oid, Arc::clone(&info));
        self.table_names.write().insert(name.to_string(), oid);
        Ok(info)
    }

    pub fn get_table(&self, oid: TableOid) -> Option<Arc<TableInfo>> {
        self.tables.read().get(&oid).cloned()
    }

    pub fn get_table_by_name(&self, name: &str) -> Option<Arc<TableInfo>> {
        let oid = *self.table_names.read().get(name)?;
        self.get_table(oid)
    }

    /// Create a hash index over `key_attrs` of an existing table and
    /// backfill it from the current heap contents.
    pub fn create_index(
        &self,
        index_name: &str,
        table_name: &str,
        key_attrs: Vec<usize>,
    ) -> Result<Arc<IndexInfo>, CatalogError> {
        let table_info = self
            .get_table_by_name(table_name)
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_string()))?;

        let index = Arc::new(HashIndex::for_table(Arc::clone(&self.buffer_pool))?);
        for (rid, tuple) in table_info.table.iter() {
            let key = IndexKey::from_tuple(&tuple.key_from_tuple(&key_attrs));
            index.insert(key, rid)?;
        }

        let info = Arc::new(IndexInfo {
            name: index_name.to_string(),
            index_oid: self.next_index_oid.fetch_add(1, Ordering::SeqCst),
            table_name: table_name.to_string(),
            key_schema: table_info.schema.project(&key_attrs),
            key_attrs,
            index,
        });

        self.indexes
            .write()
            .entry(table_name.to_string())
            .or_default()
            .push(Arc::clone(&info));
        Ok(info)
    }

    /// Every index declared over `table_name`.
    pub fn get_table_indexes(&self, table_name: &str) -> Vec<Arc<IndexInfo>> {
        self.indexes
            .read()
            .get(table_name)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema::{Column, DataType};
    use crate::catalog::value::DataValue;
    use crate::storage::buffer::BufferPoolManager;
    use crate::storage::disk::DiskManager;
    use crate::storage::table::tuple::Tuple;
    use tempfile::TempDir;

    fn test_catalog() -> (Catalog, TempDir) {
        let dir = TempDir::new().unwrap();
        let disk = Arc::new(DiskManager::new(dir.path().join("test.db")).unwrap());
        let pool: Arc<dyn BufferPool> = Arc::new(BufferPoolManager::new(64, disk));
        (Catalog::new(pool, None), dir)
    }

    fn people_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Integer),
            Column::new("name", DataType::Text),
        ])
    }

    #[test]
    fn test_create_and_lookup_table() {
        let (catalog, _dir) = test_catalog();
        let info = catalog.create_table("people", people_schema(), None).unwrap();

        assert_eq!(catalog.get_table(info.oid).unwrap().name, "people");
        assert_eq!(catalog.get_table_by_name("people").unwrap().oid, info.oid);
        assert!(catalog.get_table_by_name("missing").is_none());
        assert!(matches!(
            catalog.create_table("people", people_schema(), None),
            Err(CatalogError::TableExists(_))
        ));
    }

    #[test]
    fn test_create_index_backfills_existing_rows() {
        let (catalog, _dir) = test_catalog();
        let info = catalog.create_table("people", people_schema(), None).unwrap();

        let tuple = Tuple::new(vec![DataValue::Integer(1), DataValue::Text("ada".into())]);
        let rid = info.table.insert_tuple(&tuple, None).unwrap();

        let index_info = catalog.create_index("people_id", "people", vec![0]).unwrap();
        let key = IndexKey::from_tuple(&tuple.key_from_tuple(&[0]));
        assert_eq!(index_info.index.get_value(&key).unwrap(), vec![rid]);

        assert_eq!(catalog.get_table_indexes("people").len(), 1);
        assert!(catalog.get_table_indexes("nothing").is_empty());
    }
}
