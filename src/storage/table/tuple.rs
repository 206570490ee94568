use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::schema::Schema;
use crate::catalog::value::DataValue;

#[derive(Error, Debug)]
pub enum TupleError {
    #[error("Failed to serialize tuple: {0}")]
    SerializationError(String),
    #[error("Failed to deserialize tuple: {0}")]
    DeserializationError(String),
}

/// A row of values. Tuples are stored in table pages and log records as
/// their serialized bytes; the schema travels separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuple {
    values: Vec<DataValue>,
}

impl Tuple {
    pub fn new(values: Vec<DataValue>) -> Self {
        Self { values }
    }

    pub fn empty() -> Self {
        Self { values: Vec::new() }
    }

    pub fn values(&self) -> &[DataValue] {
        &self.values
    }

    pub fn value(&self, idx: usize) -> &DataValue {
        &self.values[idx]
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Serialize to the byte form stored in table pages.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TupleError> {
        bincode::serialize(&self.values).map_err(|e| TupleError::SerializationError(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TupleError> {
        let values = bincode::deserialize(bytes)
            .map_err(|e| TupleError::DeserializationError(e.to_string()))?;
        Ok(Self { values })
    }

    /// Build an index key tuple by projecting the key columns.
    pub fn key_from_tuple(&self, key_attrs: &[usize]) -> Tuple {
        Tuple::new(key_attrs.iter().map(|&i| self.values[i].clone()).collect())
    }

    /// Project this tuple onto a narrower output schema, resolving output
    /// columns against the source schema by name.
    pub fn project(&self, source: &Schema, output: &Schema) -> Tuple {
        let values = output
            .columns()
            .iter()
            .map(|col| {
                source
                    .column_index(&col.name)
                    .map(|i| self.values[i].clone())
                    .unwrap_or(DataValue::Null)
            })
            .collect();
        Tuple::new(values)
    }
}
