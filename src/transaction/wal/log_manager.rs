use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error};
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::common::types::{Lsn, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskManagerError};
use crate::transaction::wal::log_record::{LogRecord, LogRecordError};

/// Size of each of the two in-memory log buffers.
pub const LOG_BUFFER_SIZE: usize = PAGE_SIZE * 8;

/// How long the flush thread sleeps before flushing on its own.
pub const DEFAULT_LOG_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum LogError {
    #[error("Disk manager error: {0}")]
    DiskError(#[from] DiskManagerError),
    #[error("Log record error: {0}")]
    RecordError(#[from] LogRecordError),
    #[error("Log record of {0} bytes cannot fit the log buffer")]
    RecordTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, LogError>;

/// State guarded by the single log latch: the fill buffer, the flush
/// buffer, and LSN allocation.
struct LogCore {
    log_buffer: Vec<u8>,
    buffer_offset: usize,
    flush_buffer: Vec<u8>,
    next_lsn: Lsn,
    persistent_lsn: Lsn,
    need_flush: bool,
}

/// Write-ahead log manager.
///
/// Appenders fill `log_buffer`; a background worker swaps it with
/// `flush_buffer` and writes the latter out, waking on a timeout or when
/// an appender runs out of space. `persistent_lsn` trails `next_lsn` and
/// is what the buffer pool checks before evicting a dirty page.
pub struct LogManager {
    core: Mutex<LogCore>,
    /// Wakes the flush worker.
    flush_cv: Condvar,
    /// Wakes appenders and force-flush waiters.
    append_cv: Condvar,
    enable_logging: AtomicBool,
    log_timeout: Duration,
    disk_manager: Arc<DiskManager>,
    flush_thread: Mutex<Option<JoinHandle<()>>>,
}

impl LogManager {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        Self::with_timeout(disk_manager, DEFAULT_LOG_TIMEOUT)
    }

    pub fn with_timeout(disk_manager: Arc<DiskManager>, log_timeout: Duration) -> Self {
        Self {
            core: Mutex::new(LogCore {
                log_buffer: vec![0; LOG_BUFFER_SIZE],
                buffer_offset: 0,
                flush_buffer: vec![0; LOG_BUFFER_SIZE],
                next_lsn: 1,
                persistent_lsn: 0,
                need_flush: false,
            }),
            flush_cv: Condvar::new(),
            append_cv: Condvar::new(),
            enable_logging: AtomicBool::new(false),
            log_timeout,
            disk_manager,
            flush_thread: Mutex::new(None),
        }
    }

    /// Append a log record, assigning its LSN. Blocks while the buffer is
    /// too full to take the record, kicking the flush worker first.
    pub fn append_log_record(&self, record: &mut LogRecord) -> Result<Lsn> {
        let size = record.size()?;
        if size >= LOG_BUFFER_SIZE {
            return Err(LogError::RecordTooLarge(size));
        }

        let mut core = self.core.lock();
        while core.buffer_offset + size >= LOG_BUFFER_SIZE {
            core.need_flush = true;
            self.flush_cv.notify_one();
            self.append_cv.wait(&mut core);
        }

        record.lsn = core.next_lsn;
        core.next_lsn += 1;

        let bytes = record.to_bytes()?;
        let offset = core.buffer_offset;
        core.log_buffer[offset..offset + size].copy_from_slice(&bytes);
        core.buffer_offset += size;

        Ok(record.lsn)
    }

    /// Start the background flush worker and enable logging.
    pub fn run_flush_thread(self: &Arc<Self>) {
        if self.enable_logging.swap(true, Ordering::SeqCst) {
            return;
        }

        let manager = Arc::clone(self);
        let handle = std::thread::spawn(move || {
            debug!("log flush thread started");
            while manager.enable_logging.load(Ordering::SeqCst) {
                let mut core = manager.core.lock();
                if !core.need_flush {
                    let timeout = manager.log_timeout;
                    let _ = manager.flush_cv.wait_for(&mut core, timeout);
                }
                manager.flush_locked(&mut core);
                core.need_flush = false;
                manager.append_cv.notify_all();
            }
            // Final drain so nothing appended before shutdown is lost.
            let mut core = manager.core.lock();
            manager.flush_locked(&mut core);
            core.need_flush = false;
            manager.append_cv.notify_all();
            debug!("log flush thread stopped");
        });

        *self.flush_thread.lock() = Some(handle);
    }

    /// Stop and join the flush worker; logging is disabled afterwards.
    pub fn stop_flush_thread(&self) {
        if !self.enable_logging.swap(false, Ordering::SeqCst) {
            return;
        }
        {
            let mut core = self.core.lock();
            core.need_flush = true;
        }
        self.flush_cv.notify_all();
        if let Some(handle) = self.flush_thread.lock().take() {
            let _ = handle.join();
        }
    }

    /// Wait for log persistence. With `force`, demand a flush and wait for
    /// it to complete; otherwise wait for one flush cycle to pass.
    pub fn flush(&self, force: bool) {
        if !self.enable_logging.load(Ordering::SeqCst) {
            return;
        }
        let mut core = self.core.lock();
        if force {
            core.need_flush = true;
            self.flush_cv.notify_one();
            while core.need_flush {
                self.append_cv.wait(&mut core);
            }
        } else {
            self.append_cv.wait(&mut core);
        }
    }

    /// LSN of the last record known to be on disk (0 if none).
    pub fn persistent_lsn(&self) -> Lsn {
        self.core.lock().persistent_lsn
    }

    /// The LSN the next appended record will receive.
    pub fn next_lsn(&self) -> Lsn {
        self.core.lock().next_lsn
    }

    pub fn logging_enabled(&self) -> bool {
        self.enable_logging.load(Ordering::SeqCst)
    }

    /// Swap buffers and write the filled one out. Called with the log
    /// latch held; the WAL rule depends on `persistent_lsn` not advancing
    /// past records that are actually on disk.
    fn flush_locked(&self, core: &mut LogCore) {
        if core.buffer_offset == 0 {
            return;
        }

        let flush_size = core.buffer_offset;
        core.buffer_offset = 0;
        std::mem::swap(&mut core.log_buffer, &mut core.flush_buffer);

        if let Err(e) = self.disk_manager.write_log(&core.flush_buffer[..flush_size]) {
            // Keep persistent_lsn where it was; the WAL rule stays intact
            // and the next cycle retries with newly appended records.
            error!("failed to write log: {}", e);
            return;
        }
        core.flush_buffer[..flush_size].fill(0);
        core.persistent_lsn = core.next_lsn - 1;
    }
}

impl Drop for LogManager {
    fn drop(&mut self) {
        self.stop_flush_thread();
    }
}
