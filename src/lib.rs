// Export public modules
pub mod catalog;
pub mod common;
pub mod execution;
pub mod index;
pub mod storage;
pub mod transaction;

// Re-export key items for convenient access
pub use catalog::Catalog;
pub use execution::{ExecutionError, Executor, ExecutorContext};
pub use index::hash::{ExtendibleHashTable, HashIndex};
pub use storage::buffer::{BufferPool, BufferPoolError, BufferPoolManager, ParallelBufferPoolManager};
pub use storage::disk::DiskManager;
pub use storage::table::TableHeap;
pub use transaction::{LockManager, LogManager, LogRecovery, Transaction, TransactionManager};
