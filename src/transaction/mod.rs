pub mod concurrency;
pub mod wal;

pub use concurrency::lock_manager::LockManager;
pub use concurrency::transaction::{
    AbortReason, IsolationLevel, Transaction, TransactionError, TransactionState,
};
pub use concurrency::transaction_manager::TransactionManager;
pub use wal::log_manager::LogManager;
pub use wal::log_record::{LogPayload, LogRecord, LogRecordType};
pub use wal::recovery::LogRecovery;
