//! Mutation log — the write batch byte buffer.
//!
//! The log is a compact, append-only buffer of encoded mutation records,
//! the exact bytes a store would consume to commit the batch. It starts
//! with a fixed 12-byte header and grows one record at a time:
//!
//! ```text
//! [SEQUENCE u64 LE][COUNT u32 LE]
//! [RECORD][RECORD][RECORD]...
//! ```
//!
//! `COUNT` counts **keyed** records only (put, delete, single-delete,
//! delete-range, merge); meta records (log-data, prepare markers, no-op)
//! ride along without incrementing it.
//!
//! # Offsets are stable
//!
//! Each record's starting byte offset is assigned once and never moves:
//! the buffer only grows at the tail, and growth preserves content at the
//! same offsets. Components above the log address records — and the key
//! bytes inside them — purely by offset, so buffer reallocation is
//! harmless. Offsets are only invalidated by [`MutationLog::clear`] and by
//! savepoint rollback, both of which the owner pairs with an index rebuild.
//!
//! # Savepoints
//!
//! [`MutationLog::set_savepoint`] pushes the current `(size, count)` onto a
//! stack; [`MutationLog::rollback_to_savepoint`] truncates the buffer back
//! to the top entry and pops it; [`MutationLog::pop_savepoint`] discards
//! the top entry without touching the bytes. Rollback is byte-exact: the
//! buffer after rollback is identical to the buffer when the savepoint was
//! taken.
//!
//! # Size cap
//!
//! With a non-zero `max_bytes`, any append that would grow the buffer past
//! the cap fails with [`LogError::MemoryLimit`] before writing anything,
//! leaving the log byte-identical to its state before the call.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use thiserror::Error;
use tracing::{info, trace};

use crate::record::{self, RecordError, RecordRef};

/// Fixed header size: `u64` sequence + `u32` keyed-record count.
pub const LOG_HEADER_SIZE: usize = 12;

const COUNT_OFFSET: usize = 8;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by mutation log operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogError {
    /// A record failed to decode while walking the log.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// Appending would grow the log past its configured cap.
    #[error("memory limit reached (would grow to {required} bytes, limit {limit})")]
    MemoryLimit {
        /// Size the buffer would have reached.
        required: usize,
        /// Configured cap.
        limit: usize,
    },

    /// Rollback or pop was called with an empty savepoint stack.
    #[error("no savepoint set")]
    NoSavepoint,
}

// ------------------------------------------------------------------------------------------------
// Savepoint
// ------------------------------------------------------------------------------------------------

/// Captured log position: buffer size and keyed-record count at capture
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Savepoint {
    size: usize,
    count: u32,
}

// ------------------------------------------------------------------------------------------------
// Mutation Log
// ------------------------------------------------------------------------------------------------

/// Append-only byte log of encoded mutation records with a savepoint stack.
///
/// See the [module-level documentation](self) for format and guarantees.
#[derive(Debug, Clone)]
pub struct MutationLog {
    /// Header followed by encoded records.
    data: Vec<u8>,

    /// Size cap in bytes; 0 means unlimited.
    max_bytes: usize,

    /// Stack of captured positions for rollback.
    savepoints: Vec<Savepoint>,
}

impl MutationLog {
    /// Create an empty log.
    ///
    /// `reserved_bytes` is a capacity hint for the expected batch size;
    /// `max_bytes` caps the buffer (0 = unlimited).
    pub fn new(reserved_bytes: usize, max_bytes: usize) -> Self {
        let mut data = Vec::with_capacity(reserved_bytes.max(LOG_HEADER_SIZE));
        data.resize(LOG_HEADER_SIZE, 0);
        Self {
            data,
            max_bytes,
            savepoints: Vec::new(),
        }
    }

    /// The full log bytes, header included.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Current size in bytes, header included.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Whether the log holds no records at all (meta included).
    pub fn is_empty(&self) -> bool {
        self.data.len() == LOG_HEADER_SIZE
    }

    /// Offset of the first record.
    pub fn first_record_offset(&self) -> usize {
        LOG_HEADER_SIZE
    }

    /// Number of keyed records, read from the header.
    pub fn count(&self) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.data[COUNT_OFFSET..COUNT_OFFSET + 4]);
        u32::from_le_bytes(raw)
    }

    pub(crate) fn set_count(&mut self, count: u32) {
        self.data[COUNT_OFFSET..COUNT_OFFSET + 4].copy_from_slice(&count.to_le_bytes());
    }

    /// Sequence number from the header.
    pub fn sequence(&self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.data[..8]);
        u64::from_le_bytes(raw)
    }

    /// Stamp the header sequence number.
    pub fn set_sequence(&mut self, sequence: u64) {
        self.data[..8].copy_from_slice(&sequence.to_le_bytes());
    }

    /// Replace the size cap. Takes effect on the next append.
    pub fn set_max_bytes(&mut self, max_bytes: usize) {
        self.max_bytes = max_bytes;
    }

    /// Reset to an empty log, dropping all records and savepoints.
    pub fn clear(&mut self) {
        self.data.truncate(LOG_HEADER_SIZE);
        self.data[..LOG_HEADER_SIZE].fill(0);
        self.savepoints.clear();
        info!("mutation log cleared");
    }

    // --------------------------------------------------------------------------------------------
    // Appends
    // --------------------------------------------------------------------------------------------

    /// Append a put record for `(key, value)` under family `cf`.
    pub fn append_put(&mut self, cf: u32, key: &[u8], value: &[u8]) -> Result<(), LogError> {
        let mut rec = Vec::with_capacity(1 + 4 + 4 + key.len() + 4 + value.len());
        record::encode_put(&mut rec, cf, key, value);
        self.append_keyed(&rec)
    }

    /// Append a point-delete record for `key` under family `cf`.
    pub fn append_delete(&mut self, cf: u32, key: &[u8]) -> Result<(), LogError> {
        let mut rec = Vec::with_capacity(1 + 4 + 4 + key.len());
        record::encode_delete(&mut rec, cf, key);
        self.append_keyed(&rec)
    }

    /// Append a single-delete record for `key` under family `cf`.
    pub fn append_single_delete(&mut self, cf: u32, key: &[u8]) -> Result<(), LogError> {
        let mut rec = Vec::with_capacity(1 + 4 + 4 + key.len());
        record::encode_single_delete(&mut rec, cf, key);
        self.append_keyed(&rec)
    }

    /// Append a range tombstone for `[begin, end)` under family `cf`.
    pub fn append_delete_range(
        &mut self,
        cf: u32,
        begin: &[u8],
        end: &[u8],
    ) -> Result<(), LogError> {
        let mut rec = Vec::with_capacity(1 + 4 + 4 + begin.len() + 4 + end.len());
        record::encode_delete_range(&mut rec, cf, begin, end);
        self.append_keyed(&rec)
    }

    /// Append a merge record for `(key, operand)` under family `cf`.
    pub fn append_merge(&mut self, cf: u32, key: &[u8], operand: &[u8]) -> Result<(), LogError> {
        let mut rec = Vec::with_capacity(1 + 4 + 4 + key.len() + 4 + operand.len());
        record::encode_merge(&mut rec, cf, key, operand);
        self.append_keyed(&rec)
    }

    /// Append an opaque blob. Not counted, not indexed.
    pub fn append_log_data(&mut self, blob: &[u8]) -> Result<(), LogError> {
        let mut rec = Vec::with_capacity(1 + 4 + blob.len());
        record::encode_log_data(&mut rec, blob);
        self.append_meta(&rec)
    }

    /// Append a begin-prepare marker.
    pub fn append_begin_prepare(&mut self) -> Result<(), LogError> {
        let mut rec = Vec::with_capacity(1);
        record::encode_begin_prepare(&mut rec);
        self.append_meta(&rec)
    }

    /// Append an end-prepare marker for transaction `xid`.
    pub fn append_end_prepare(&mut self, xid: &[u8]) -> Result<(), LogError> {
        let mut rec = Vec::with_capacity(1 + 4 + xid.len());
        record::encode_end_prepare(&mut rec, xid);
        self.append_meta(&rec)
    }

    /// Append a commit marker for transaction `xid`.
    pub fn append_commit(&mut self, xid: &[u8]) -> Result<(), LogError> {
        let mut rec = Vec::with_capacity(1 + 4 + xid.len());
        record::encode_commit(&mut rec, xid);
        self.append_meta(&rec)
    }

    /// Append a rollback marker for transaction `xid`.
    pub fn append_rollback(&mut self, xid: &[u8]) -> Result<(), LogError> {
        let mut rec = Vec::with_capacity(1 + 4 + xid.len());
        record::encode_rollback(&mut rec, xid);
        self.append_meta(&rec)
    }

    /// Append a no-op record.
    pub fn append_noop(&mut self) -> Result<(), LogError> {
        let mut rec = Vec::with_capacity(1);
        record::encode_noop(&mut rec);
        self.append_meta(&rec)
    }

    fn append_keyed(&mut self, rec: &[u8]) -> Result<(), LogError> {
        self.check_limit(rec.len())?;
        self.data.extend_from_slice(rec);
        let count = self.count() + 1;
        self.set_count(count);
        trace!(len = rec.len(), count, "appended keyed record");
        Ok(())
    }

    fn append_meta(&mut self, rec: &[u8]) -> Result<(), LogError> {
        self.check_limit(rec.len())?;
        self.data.extend_from_slice(rec);
        trace!(len = rec.len(), "appended meta record");
        Ok(())
    }

    fn check_limit(&self, additional: usize) -> Result<(), LogError> {
        if self.max_bytes == 0 {
            return Ok(());
        }
        let required = self.data.len() + additional;
        if required > self.max_bytes {
            return Err(LogError::MemoryLimit {
                required,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Savepoints
    // --------------------------------------------------------------------------------------------

    /// Push the current position onto the savepoint stack.
    pub fn set_savepoint(&mut self) {
        let sp = Savepoint {
            size: self.data.len(),
            count: self.count(),
        };
        trace!(size = sp.size, count = sp.count, "savepoint set");
        self.savepoints.push(sp);
    }

    /// Truncate back to the most recent savepoint and pop it.
    pub fn rollback_to_savepoint(&mut self) -> Result<(), LogError> {
        let sp = self.savepoints.pop().ok_or(LogError::NoSavepoint)?;
        self.data.truncate(sp.size);
        self.set_count(sp.count);
        info!(size = sp.size, count = sp.count, "rolled back to savepoint");
        Ok(())
    }

    /// Pop the most recent savepoint without truncating.
    pub fn pop_savepoint(&mut self) -> Result<(), LogError> {
        self.savepoints.pop().ok_or(LogError::NoSavepoint)?;
        Ok(())
    }

    /// Number of outstanding savepoints.
    pub fn savepoint_depth(&self) -> usize {
        self.savepoints.len()
    }

    // --------------------------------------------------------------------------------------------
    // Rewrite (collapse support)
    // --------------------------------------------------------------------------------------------

    /// Swap in a rewritten buffer with a corrected keyed-record count.
    ///
    /// `data` must be a well-formed log (header + records). Outstanding
    /// savepoints describe the old buffer and are dropped.
    pub(crate) fn replace_data(&mut self, data: Vec<u8>, count: u32) {
        debug_assert!(data.len() >= LOG_HEADER_SIZE);
        self.data = data;
        self.set_count(count);
        self.savepoints.clear();
    }

    // --------------------------------------------------------------------------------------------
    // Record cursor
    // --------------------------------------------------------------------------------------------

    /// Cursor over all records in the log, in append order.
    pub fn records(&self) -> LogCursor<'_> {
        LogCursor {
            data: &self.data,
            pos: LOG_HEADER_SIZE,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// LogCursor
// ------------------------------------------------------------------------------------------------

/// One decoded record together with its starting offset.
#[derive(Debug, Clone, Copy)]
pub struct LogRecord<'a> {
    /// Byte offset of the record within the log.
    pub offset: usize,
    /// Decoded view of the record.
    pub record: RecordRef<'a>,
}

/// Streaming cursor over the log's records.
///
/// Yields each record with its offset; stops at the first decode failure
/// after yielding the error.
pub struct LogCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for LogCursor<'a> {
    type Item = Result<LogRecord<'a>, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        match record::read_record(self.data, self.pos) {
            Ok((record, next)) => {
                let offset = self.pos;
                self.pos = next;
                Some(Ok(LogRecord { offset, record }))
            }
            Err(e) => {
                self.pos = self.data.len();
                Some(Err(e))
            }
        }
    }
}
