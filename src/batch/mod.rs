//! The indexed batch — a write batch you can read.
//!
//! [`IndexedBatch`] accumulates mutations destined for an ordered
//! key-value store while keeping an ordered in-memory index over them, so
//! the pending state can be queried and iterated before it is ever
//! committed. Every mutation goes to two places:
//!
//! 1. the [mutation log](crate::log) — the exact bytes a store consumes to
//!    commit the batch, and
//! 2. the [ordered index](crate::index) — an entry per keyed record,
//!    addressing the record and its key by byte offset.
//!
//! # Overwrite mode
//!
//! With `overwrite_key = false` the index is a stable multiset: every
//! write of a key adds an entry and duplicates iterate in write order.
//! With `overwrite_key = true` the index keeps at most one live entry per
//! `(family, key)`: a repeated write redirects the existing entry to the
//! new record in place and remembers the superseded record's offset in the
//! *obsolete* ledger, which [`IndexedBatch::collapse`] can later use to
//! drop dead bytes from the log. Overwrite mode is what makes base+delta
//! iteration possible (see
//! [`new_iterator_with_base`](IndexedBatch::new_iterator_with_base)), at
//! the price of refusing to stack merge operands
//! ([`BatchError::NotSupported`]).
//!
//! # Savepoints and rebuild
//!
//! Savepoints capture a log position; rolling back truncates the log and
//! rebuilds the index from the surviving bytes. A rebuild that decodes a
//! different number of keyed records than the log header claims is
//! corruption.
//!
//! # Reading
//!
//! [`get_from_batch`](IndexedBatch::get_from_batch) answers a point lookup
//! from the buffer alone, walking a key's pending history newest-first and
//! collecting merge operands until a put or delete settles the matter.
//! [`get_from_batch_and_db`](IndexedBatch::get_from_batch_and_db) overlays
//! that on a store lookup, folding pending operands over the store's value
//! through the family's merge operator.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

pub mod iterator;

use std::cmp::Ordering;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, trace, warn};

use crate::cf::ColumnFamilyHandle;
use crate::comparator::UserComparator;
use crate::index::{
    new_entry_index, EntryArena, EntryComparator, EntryId, EntryIndex, IndexEntry, IndexView,
    SeekTarget,
};
use crate::log::{LogError, MutationLog};
use crate::merge::MergeOperator;
use crate::record::{self, RecordError, WriteOpKind};

pub use iterator::{BaseDeltaIterator, DeltaIterator, StoreIterator, WriteEntry};

/// Id of the default column family.
pub const DEFAULT_COLUMN_FAMILY: u32 = 0;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors reported by the external store behind
/// [`get_from_batch_and_db`](IndexedBatch::get_from_batch_and_db).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

/// Errors returned by batch operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// Error from the mutation log (size cap, savepoint stack).
    #[error("log error: {0}")]
    Log(#[from] LogError),

    /// A record failed to decode.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// The log and index disagree in a way only corruption explains.
    #[error("corruption: {0}")]
    Corruption(String),

    /// The operation is not supported in the batch's configuration.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A required collaborator is missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The external store failed a lookup.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ------------------------------------------------------------------------------------------------
// External store seam
// ------------------------------------------------------------------------------------------------

/// Point-lookup interface of the underlying store.
///
/// The buffer never scans the store through this trait; combined lookups
/// ask for exactly one key. Range access goes through
/// [`StoreIterator`] instead.
pub trait BaseStore {
    /// Fetch the current value of `key` in family `column_family`, or
    /// `None` when the store has no live value for it.
    fn get(&self, column_family: u32, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
}

// ------------------------------------------------------------------------------------------------
// Options and results
// ------------------------------------------------------------------------------------------------

/// Construction options for an [`IndexedBatch`].
pub struct BatchOptions {
    /// Initial log capacity hint in bytes.
    pub reserved_bytes: usize,

    /// Log size cap in bytes; 0 = unlimited.
    pub max_bytes: usize,

    /// Keep at most one live index entry per `(family, key)`.
    pub overwrite_key: bool,

    /// Index back-end: `"rbtree"` (default) or `"skiplist"`; unrecognized
    /// strings fall back to the skiplist.
    pub index_type: String,

    /// Permit a merge to overwrite an existing entry for its key when
    /// `overwrite_key` is set. Off by default: silently dropping part of a
    /// merge chain changes results.
    pub allow_dup_merge: bool,

    /// Merge operator for the default column family.
    pub merge_operator: Option<Arc<dyn MergeOperator>>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            reserved_bytes: 0,
            max_bytes: 0,
            overwrite_key: false,
            index_type: "rbtree".to_string(),
            allow_dup_merge: false,
            merge_operator: None,
        }
    }
}

/// Outcome of a point lookup against the buffer (and optionally the
/// store).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchGetResult {
    /// A live value, merge chain already folded.
    Found(Vec<u8>),
    /// The buffer says nothing about the key (and, for combined lookups,
    /// neither does the store).
    NotFound,
    /// The key's newest pending mutation is a delete.
    Deleted,
    /// Merge operands are pending and no base value is available to fold
    /// them over.
    MergeInProgress,
}

/// What the newest-first history walk found below any merge operands.
enum LookupFloor {
    /// A put; its value is the fold base.
    Base(Vec<u8>),
    /// A delete or single-delete.
    Deleted,
    /// The history ran out.
    Nothing,
}

// ------------------------------------------------------------------------------------------------
// Indexed batch
// ------------------------------------------------------------------------------------------------

/// An indexed write buffer over a mutation log.
///
/// Owned by exactly one logical writer; all reads borrow it immutably, so
/// the borrow checker rules out mutation during iteration. See the
/// [module-level documentation](self) for the full model.
pub struct IndexedBatch {
    log: MutationLog,
    comparator: EntryComparator,
    arena: EntryArena,
    index: Box<dyn EntryIndex>,
    index_type: String,
    overwrite_key: bool,
    allow_dup_merge: bool,
    merge_operator: Option<Arc<dyn MergeOperator>>,
    last_entry_offset: usize,
    next_sequence: u64,
    obsolete_offsets: Vec<usize>,
}

impl IndexedBatch {
    /// Create a batch ordering default-family keys with `comparator`.
    pub fn new(comparator: Arc<dyn UserComparator>, options: BatchOptions) -> Self {
        Self {
            log: MutationLog::new(options.reserved_bytes, options.max_bytes),
            comparator: EntryComparator::new(comparator),
            arena: EntryArena::new(),
            index: new_entry_index(&options.index_type),
            index_type: options.index_type,
            overwrite_key: options.overwrite_key,
            allow_dup_merge: options.allow_dup_merge,
            merge_operator: options.merge_operator,
            last_entry_offset: 0,
            next_sequence: 0,
            obsolete_offsets: Vec::new(),
        }
    }

    // --------------------------------------------------------------------------------------------
    // Accessors
    // --------------------------------------------------------------------------------------------

    /// The underlying write batch, ready for direct commit by the store.
    pub fn write_batch(&self) -> &MutationLog {
        &self.log
    }

    /// Number of keyed records in the log.
    pub fn count(&self) -> u32 {
        self.log.count()
    }

    /// Number of live index entries. Equals [`count`](Self::count) in
    /// multiset mode; at most it in overwrite mode.
    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    /// Whether overwrite mode is on.
    pub fn overwrite_key(&self) -> bool {
        self.overwrite_key
    }

    /// Offsets of records superseded in place under overwrite mode.
    pub fn obsolete_offsets(&self) -> &[usize] {
        &self.obsolete_offsets
    }

    /// Replace the log size cap.
    pub fn set_max_bytes(&mut self, max_bytes: usize) {
        self.log.set_max_bytes(max_bytes);
    }

    pub(crate) fn view(&self) -> IndexView<'_> {
        IndexView {
            log: self.log.data(),
            arena: &self.arena,
            comparator: &self.comparator,
        }
    }

    pub(crate) fn index(&self) -> &dyn EntryIndex {
        self.index.as_ref()
    }

    pub(crate) fn arena(&self) -> &EntryArena {
        &self.arena
    }

    pub(crate) fn log(&self) -> &MutationLog {
        &self.log
    }

    #[cfg(test)]
    pub(crate) fn log_mut_for_tests(&mut self) -> &mut MutationLog {
        &mut self.log
    }

    // --------------------------------------------------------------------------------------------
    // Mutations — default family
    // --------------------------------------------------------------------------------------------

    /// Buffer a put of `(key, value)` in the default family.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), BatchError> {
        trace!(key = %HexKey(key), "put");
        self.last_entry_offset = self.log.size();
        self.log.append_put(DEFAULT_COLUMN_FAMILY, key, value)?;
        self.add_or_update_index(DEFAULT_COLUMN_FAMILY, key)
    }

    /// Buffer a point delete of `key` in the default family.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), BatchError> {
        trace!(key = %HexKey(key), "delete");
        self.last_entry_offset = self.log.size();
        self.log.append_delete(DEFAULT_COLUMN_FAMILY, key)?;
        self.add_or_update_index(DEFAULT_COLUMN_FAMILY, key)
    }

    /// Buffer a single-delete of `key` in the default family.
    pub fn single_delete(&mut self, key: &[u8]) -> Result<(), BatchError> {
        trace!(key = %HexKey(key), "single_delete");
        self.last_entry_offset = self.log.size();
        self.log.append_single_delete(DEFAULT_COLUMN_FAMILY, key)?;
        self.add_or_update_index(DEFAULT_COLUMN_FAMILY, key)
    }

    /// Buffer a range tombstone for `[begin, end)` in the default family.
    ///
    /// Only the begin key is indexed; readers own the range semantics.
    pub fn delete_range(&mut self, begin: &[u8], end: &[u8]) -> Result<(), BatchError> {
        trace!(begin = %HexKey(begin), end = %HexKey(end), "delete_range");
        self.last_entry_offset = self.log.size();
        self.log
            .append_delete_range(DEFAULT_COLUMN_FAMILY, begin, end)?;
        self.add_or_update_index(DEFAULT_COLUMN_FAMILY, begin)
    }

    /// Buffer a merge operand for `key` in the default family.
    pub fn merge(&mut self, key: &[u8], operand: &[u8]) -> Result<(), BatchError> {
        trace!(key = %HexKey(key), "merge");
        self.last_entry_offset = self.log.size();
        self.log.append_merge(DEFAULT_COLUMN_FAMILY, key, operand)?;
        self.finish_merge_index(DEFAULT_COLUMN_FAMILY, key)
    }

    // --------------------------------------------------------------------------------------------
    // Mutations — explicit family
    // --------------------------------------------------------------------------------------------

    /// Buffer a put in `cf`.
    pub fn put_cf(
        &mut self,
        cf: &dyn ColumnFamilyHandle,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), BatchError> {
        trace!(cf = cf.id(), key = %HexKey(key), "put");
        self.last_entry_offset = self.log.size();
        self.log.append_put(cf.id(), key, value)?;
        self.register_column_family(cf);
        self.add_or_update_index(cf.id(), key)
    }

    /// Buffer a point delete in `cf`.
    pub fn delete_cf(&mut self, cf: &dyn ColumnFamilyHandle, key: &[u8]) -> Result<(), BatchError> {
        trace!(cf = cf.id(), key = %HexKey(key), "delete");
        self.last_entry_offset = self.log.size();
        self.log.append_delete(cf.id(), key)?;
        self.register_column_family(cf);
        self.add_or_update_index(cf.id(), key)
    }

    /// Buffer a single-delete in `cf`.
    pub fn single_delete_cf(
        &mut self,
        cf: &dyn ColumnFamilyHandle,
        key: &[u8],
    ) -> Result<(), BatchError> {
        trace!(cf = cf.id(), key = %HexKey(key), "single_delete");
        self.last_entry_offset = self.log.size();
        self.log.append_single_delete(cf.id(), key)?;
        self.register_column_family(cf);
        self.add_or_update_index(cf.id(), key)
    }

    /// Buffer a range tombstone for `[begin, end)` in `cf`.
    pub fn delete_range_cf(
        &mut self,
        cf: &dyn ColumnFamilyHandle,
        begin: &[u8],
        end: &[u8],
    ) -> Result<(), BatchError> {
        trace!(cf = cf.id(), begin = %HexKey(begin), end = %HexKey(end), "delete_range");
        self.last_entry_offset = self.log.size();
        self.log.append_delete_range(cf.id(), begin, end)?;
        self.register_column_family(cf);
        self.add_or_update_index(cf.id(), begin)
    }

    /// Buffer a merge operand in `cf`.
    pub fn merge_cf(
        &mut self,
        cf: &dyn ColumnFamilyHandle,
        key: &[u8],
        operand: &[u8],
    ) -> Result<(), BatchError> {
        trace!(cf = cf.id(), key = %HexKey(key), "merge");
        self.last_entry_offset = self.log.size();
        self.log.append_merge(cf.id(), key, operand)?;
        self.register_column_family(cf);
        self.finish_merge_index(cf.id(), key)
    }

    /// Ride an opaque blob along in the log. Never counted or indexed.
    pub fn put_log_data(&mut self, blob: &[u8]) -> Result<(), BatchError> {
        self.log.append_log_data(blob)?;
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Lifecycle
    // --------------------------------------------------------------------------------------------

    /// Drop every buffered mutation and start over.
    pub fn clear(&mut self) {
        self.log.clear();
        self.reset_index();
        info!("batch cleared");
    }

    /// Push a savepoint.
    pub fn set_savepoint(&mut self) {
        self.log.set_savepoint();
    }

    /// Truncate back to the most recent savepoint and rebuild the index
    /// from the surviving log bytes.
    pub fn rollback_to_savepoint(&mut self) -> Result<(), BatchError> {
        self.log.rollback_to_savepoint()?;
        self.rebuild_index()?;
        self.obsolete_offsets.clear();
        info!(count = self.log.count(), "rolled back to savepoint");
        Ok(())
    }

    /// Pop the most recent savepoint without rolling back.
    pub fn pop_savepoint(&mut self) -> Result<(), BatchError> {
        self.log.pop_savepoint()?;
        Ok(())
    }

    /// Rewrite the log without records superseded under overwrite mode.
    ///
    /// Returns `false` when there was nothing to collapse. The index is
    /// rebuilt over the rewritten log and outstanding savepoints are
    /// dropped, since their byte positions no longer exist.
    pub fn collapse(&mut self) -> Result<bool, BatchError> {
        if self.obsolete_offsets.is_empty() {
            return Ok(false);
        }
        self.obsolete_offsets.sort_unstable();

        let mut collapsed = Vec::with_capacity(self.log.size());
        collapsed.extend_from_slice(&self.log.data()[..self.log.first_record_offset()]);
        let mut kept: u32 = 0;
        {
            let data = self.log.data();
            let mut drop_iter = self.obsolete_offsets.iter().peekable();
            let mut pos = self.log.first_record_offset();
            while pos < data.len() {
                let (rec, next) = record::read_record(data, pos)?;
                if drop_iter.peek() == Some(&&pos) {
                    drop_iter.next();
                } else {
                    if rec.tag.is_keyed() {
                        kept += 1;
                    }
                    collapsed.extend_from_slice(&data[pos..next]);
                }
                pos = next;
            }
        }

        let dropped = self.log.count() - kept;
        self.log.replace_data(collapsed, kept);
        self.obsolete_offsets.clear();
        self.rebuild_index()?;
        info!(kept, dropped, "collapsed write batch");
        Ok(true)
    }

    fn reset_index(&mut self) {
        self.arena = EntryArena::new();
        self.index = new_entry_index(&self.index_type);
        self.last_entry_offset = 0;
        self.next_sequence = 0;
        self.obsolete_offsets.clear();
    }

    /// Re-derive the index from the log, replaying each keyed record
    /// through the normal insert-or-overwrite pipeline.
    fn rebuild_index(&mut self) -> Result<(), BatchError> {
        self.reset_index();

        if self.log.count() == 0 {
            return Ok(());
        }

        let mut found: u32 = 0;
        let mut pos = self.log.first_record_offset();
        while pos < self.log.size() {
            let (tag, cf, key, next) = {
                let (rec, next) = record::read_record(self.log.data(), pos)?;
                (rec.tag, rec.column_family, rec.key.to_vec(), next)
            };
            self.last_entry_offset = pos;
            if tag.is_keyed() {
                found += 1;
                self.add_or_update_index(cf, &key)?;
            }
            pos = next;
        }

        if found != self.log.count() {
            warn!(found, header = self.log.count(), "count mismatch during rebuild");
            return Err(BatchError::Corruption(
                "write batch has wrong count".to_string(),
            ));
        }
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Indexing pipeline
    // --------------------------------------------------------------------------------------------

    fn register_column_family(&mut self, cf: &dyn ColumnFamilyHandle) {
        if cf.id() != DEFAULT_COLUMN_FAMILY {
            self.comparator
                .set_comparator_for_cf(cf.id(), cf.user_comparator());
        }
    }

    fn add_or_update_index(&mut self, cf: u32, key: &[u8]) -> Result<(), BatchError> {
        if !self.update_existing_entry(cf, key) {
            self.add_new_entry(cf)?;
        }
        Ok(())
    }

    /// The merge variant of the pipeline: indexes like any other mutation,
    /// then refuses the overwrite it just performed if stacked merges are
    /// not allowed.
    fn finish_merge_index(&mut self, cf: u32, key: &[u8]) -> Result<(), BatchError> {
        let overwrites_before = self.obsolete_offsets.len();
        self.add_or_update_index(cf, key)?;
        let duplicate = self.obsolete_offsets.len() != overwrites_before;
        if duplicate && !self.allow_dup_merge {
            return Err(BatchError::NotSupported(
                "duplicate key with merge value is not supported yet".to_string(),
            ));
        }
        Ok(())
    }

    /// In overwrite mode, redirect the live entry for `(cf, key)` — if one
    /// exists — to the record at `last_entry_offset`, recording the old
    /// offset as obsolete. Returns whether a redirect happened.
    fn update_existing_entry(&mut self, cf: u32, key: &[u8]) -> bool {
        if !self.overwrite_key {
            return false;
        }

        let found: Option<EntryId> = {
            let view = self.view();
            let target = SeekTarget::First {
                column_family: cf,
                key,
            };
            self.index.lower_bound(&target, &view).and_then(|cursor| {
                let id = self.index.entry_id(cursor);
                let entry = self.arena.get(id);
                if entry.column_family != cf {
                    return None;
                }
                let entry_key = entry.key(self.log.data());
                (self.comparator.compare_keys(cf, entry_key, key) == Ordering::Equal).then_some(id)
            })
        };

        match found {
            Some(id) => {
                let entry = self.arena.get_mut(id);
                let old_offset = entry.offset;
                entry.offset = self.last_entry_offset;
                self.obsolete_offsets.push(old_offset);
                trace!(old_offset, new_offset = self.last_entry_offset, "overwrote index entry");
                true
            }
            None => false,
        }
    }

    /// Allocate an index entry for the record at `last_entry_offset` and
    /// insert it.
    fn add_new_entry(&mut self, cf: u32) -> Result<(), BatchError> {
        let (key_offset, key_len) = {
            let (rec, _) = record::read_record(self.log.data(), self.last_entry_offset)?;
            (rec.key_offset, rec.key.len())
        };

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let id = self.arena.push(IndexEntry {
            column_family: cf,
            offset: self.last_entry_offset,
            key_offset,
            key_len,
            sequence,
        });

        let Self {
            index,
            arena,
            comparator,
            log,
            ..
        } = self;
        let view = IndexView {
            log: log.data(),
            arena,
            comparator,
        };
        index.insert(id, &view);
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Point lookups
    // --------------------------------------------------------------------------------------------

    /// Answer a point lookup from the buffer alone, default family.
    pub fn get_from_batch(&self, key: &[u8]) -> Result<BatchGetResult, BatchError> {
        self.get_from_batch_inner(DEFAULT_COLUMN_FAMILY, key, self.merge_operator.as_deref())
    }

    /// Answer a point lookup from the buffer alone, explicit family.
    pub fn get_from_batch_cf(
        &self,
        cf: &dyn ColumnFamilyHandle,
        key: &[u8],
    ) -> Result<BatchGetResult, BatchError> {
        let operator = cf.merge_operator();
        self.get_from_batch_inner(cf.id(), key, operator.as_deref())
    }

    fn get_from_batch_inner(
        &self,
        cf: u32,
        key: &[u8],
        operator: Option<&dyn MergeOperator>,
    ) -> Result<BatchGetResult, BatchError> {
        let mut operands = Vec::new();
        let floor = self.walk_key_history(cf, key, &mut operands)?;
        match floor {
            LookupFloor::Base(value) => {
                if operands.is_empty() {
                    Ok(BatchGetResult::Found(value))
                } else {
                    let folded = fold_operands(operator, key, Some(value.as_slice()), operands)?;
                    Ok(BatchGetResult::Found(folded))
                }
            }
            LookupFloor::Deleted => Ok(BatchGetResult::Deleted),
            LookupFloor::Nothing if operands.is_empty() => Ok(BatchGetResult::NotFound),
            LookupFloor::Nothing => Ok(BatchGetResult::MergeInProgress),
        }
    }

    /// Answer a point lookup from the buffer overlaid on `store`, default
    /// family.
    ///
    /// `Deleted` collapses to `NotFound`; pending merge operands are folded
    /// over the store's value (or over no value) through the merge
    /// operator. In overwrite mode pending merges cannot be resolved —
    /// part of the chain may have been discarded — so `MergeInProgress` is
    /// returned without consulting the store.
    pub fn get_from_batch_and_db(
        &self,
        store: &dyn BaseStore,
        key: &[u8],
    ) -> Result<BatchGetResult, BatchError> {
        self.get_from_batch_and_db_inner(
            store,
            DEFAULT_COLUMN_FAMILY,
            key,
            self.merge_operator.as_deref(),
        )
    }

    /// Answer a combined lookup for an explicit family.
    pub fn get_from_batch_and_db_cf(
        &self,
        store: &dyn BaseStore,
        cf: &dyn ColumnFamilyHandle,
        key: &[u8],
    ) -> Result<BatchGetResult, BatchError> {
        let operator = cf.merge_operator();
        self.get_from_batch_and_db_inner(store, cf.id(), key, operator.as_deref())
    }

    fn get_from_batch_and_db_inner(
        &self,
        store: &dyn BaseStore,
        cf: u32,
        key: &[u8],
        operator: Option<&dyn MergeOperator>,
    ) -> Result<BatchGetResult, BatchError> {
        let mut operands = Vec::new();
        let floor = self.walk_key_history(cf, key, &mut operands)?;

        match floor {
            LookupFloor::Base(value) => {
                if operands.is_empty() {
                    return Ok(BatchGetResult::Found(value));
                }
                let folded = fold_operands(operator, key, Some(value.as_slice()), operands)?;
                return Ok(BatchGetResult::Found(folded));
            }
            LookupFloor::Deleted => return Ok(BatchGetResult::NotFound),
            LookupFloor::Nothing => {}
        }

        if !operands.is_empty() && self.overwrite_key {
            // part of the chain may have been overwritten away; the
            // operands cannot be trusted to be complete
            return Ok(BatchGetResult::MergeInProgress);
        }

        let base = store.get(cf, key)?;
        if operands.is_empty() {
            return Ok(match base {
                Some(value) => BatchGetResult::Found(value),
                None => BatchGetResult::NotFound,
            });
        }
        let folded = fold_operands(operator, key, base.as_deref(), operands)?;
        Ok(BatchGetResult::Found(folded))
    }

    /// Walk `(cf, key)`'s pending history newest-first, pushing merge
    /// operands (newest first) until something settles the lookup.
    fn walk_key_history(
        &self,
        cf: u32,
        key: &[u8],
        operands: &mut Vec<Vec<u8>>,
    ) -> Result<LookupFloor, BatchError> {
        let view = self.view();
        let target = SeekTarget::Last {
            column_family: cf,
            key,
        };
        let mut cursor = self.index.floor(&target, &view);

        while let Some(c) = cursor {
            let entry = self.arena.get(self.index.entry_id(c));
            if entry.column_family != cf {
                break;
            }
            let entry_key = entry.key(self.log.data());
            if self.comparator.compare_keys(cf, entry_key, key) != Ordering::Equal {
                break;
            }

            let (rec, _) = record::read_record(self.log.data(), entry.offset)?;
            match rec.tag.write_op() {
                Some(WriteOpKind::Merge) => operands.push(rec.value.to_vec()),
                Some(WriteOpKind::Put) => return Ok(LookupFloor::Base(rec.value.to_vec())),
                Some(WriteOpKind::Delete) | Some(WriteOpKind::SingleDelete) => {
                    return Ok(LookupFloor::Deleted)
                }
                Some(WriteOpKind::DeleteRange) | None => {
                    return Err(BatchError::Corruption(format!(
                        "unexpected record in batch index: {:?}",
                        rec.tag
                    )))
                }
            }

            cursor = self.index.prev(c, &view);
        }

        Ok(LookupFloor::Nothing)
    }

    // --------------------------------------------------------------------------------------------
    // Iterators
    // --------------------------------------------------------------------------------------------

    /// Cursor over the pending mutations of the default family.
    pub fn new_iterator(&self) -> DeltaIterator<'_> {
        DeltaIterator::new(self, DEFAULT_COLUMN_FAMILY)
    }

    /// Cursor over the pending mutations of `cf`.
    pub fn new_iterator_cf(&self, cf: &dyn ColumnFamilyHandle) -> DeltaIterator<'_> {
        DeltaIterator::new(self, cf.id())
    }

    /// Overlay the default family's pending mutations on a base store
    /// iterator. Requires overwrite mode.
    pub fn new_iterator_with_base<B: StoreIterator>(
        &self,
        base: B,
    ) -> Result<BaseDeltaIterator<'_, B>, BatchError> {
        self.check_base_delta_supported()?;
        Ok(BaseDeltaIterator::new(
            base,
            self.new_iterator(),
            Arc::clone(self.comparator.default_comparator()),
        ))
    }

    /// Overlay `cf`'s pending mutations on a base store iterator.
    /// Requires overwrite mode.
    pub fn new_iterator_with_base_cf<B: StoreIterator>(
        &self,
        cf: &dyn ColumnFamilyHandle,
        base: B,
    ) -> Result<BaseDeltaIterator<'_, B>, BatchError> {
        self.check_base_delta_supported()?;
        Ok(BaseDeltaIterator::new(
            base,
            self.new_iterator_cf(cf),
            cf.user_comparator(),
        ))
    }

    fn check_base_delta_supported(&self) -> Result<(), BatchError> {
        if !self.overwrite_key {
            return Err(BatchError::NotSupported(
                "base+delta iteration requires a batch with overwrite_key".to_string(),
            ));
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

/// Fold merge operands (collected newest-first) over an optional base
/// value.
fn fold_operands(
    operator: Option<&dyn MergeOperator>,
    key: &[u8],
    base: Option<&[u8]>,
    mut operands: Vec<Vec<u8>>,
) -> Result<Vec<u8>, BatchError> {
    let operator = operator.ok_or_else(|| {
        BatchError::InvalidArgument("merge operator must be set".to_string())
    })?;
    operands.reverse(); // oldest first, the order operators expect
    operator
        .full_merge(key, base, &operands)
        .ok_or_else(|| BatchError::Corruption(format!("merge operator '{}' failed", operator.name())))
}

// ------------------------------------------------------------------------------------------------
// Tracing Helper
// ------------------------------------------------------------------------------------------------

pub(crate) struct HexKey<'a>(pub &'a [u8]);

impl std::fmt::Display for HexKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.len() <= 32 {
            for byte in self.0 {
                write!(f, "{byte:02x}")?;
            }
        } else {
            for byte in &self.0[..16] {
                write!(f, "{byte:02x}")?;
            }
            write!(f, "...[{} bytes]", self.0.len())?;
        }
        Ok(())
    }
}
