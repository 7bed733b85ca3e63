//! Delta and base+delta iterators.
//!
//! [`DeltaIterator`] is a column-family-scoped cursor over the batch's
//! ordered index: it walks the pending mutations of one family in key
//! order, decoding each entry's record at its stable log offset.
//!
//! [`BaseDeltaIterator`] overlays a delta iterator on a snapshot iterator
//! of the underlying store (any [`StoreIterator`]), producing one
//! correctly-ordered stream in which pending puts mask base values,
//! pending deletes suppress base keys, and direction can reverse at any
//! position. It is a two-cursor merge driven by three flags:
//!
//! - `forward` — the direction of travel,
//! - `current_at_base` — which cursor the composite currently exposes,
//! - `equal_keys` — whether both cursors sit on the same user key.
//!
//! All positioning funnels through one `update_current` routine; `next`
//! and `prev` only decide how to advance, never which side wins.
//!
//! Base+delta iteration requires the batch to run in overwrite mode: with
//! a multiset index a key may carry a merge chain, and a single-cursor
//! overlay cannot fold operands into base values on the fly.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::error;

use crate::comparator::UserComparator;
use crate::index::{IndexCursor, SeekTarget};
use crate::record::{self, WriteOpKind};

use super::{BatchError, IndexedBatch, StoreError};

// ------------------------------------------------------------------------------------------------
// Store iterator seam
// ------------------------------------------------------------------------------------------------

/// Snapshot iterator over the underlying store, as the composite consumes
/// it.
///
/// The contract mirrors the delta side: after any seek or step, `valid`
/// says whether the cursor rests on an entry, and `key`/`value` are only
/// meaningful while it does. [`BaseDeltaIterator`] itself satisfies the
/// same shape, so composites can stack.
pub trait StoreIterator {
    /// Whether the cursor rests on an entry.
    fn valid(&self) -> bool;

    /// Position at the first entry.
    fn seek_to_first(&mut self);

    /// Position at the last entry.
    fn seek_to_last(&mut self);

    /// Position at the first entry with key ≥ `key`.
    fn seek(&mut self, key: &[u8]);

    /// Position at the last entry with key ≤ `key`.
    fn seek_for_prev(&mut self, key: &[u8]);

    /// Step forward.
    fn next(&mut self);

    /// Step backward.
    fn prev(&mut self);

    /// Current key. Only meaningful while `valid`.
    fn key(&self) -> &[u8];

    /// Current value. Only meaningful while `valid`.
    fn value(&self) -> &[u8];

    /// First error the iterator has encountered, if any.
    fn status(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Delta iterator
// ------------------------------------------------------------------------------------------------

/// One decoded pending mutation, as seen through a [`DeltaIterator`].
///
/// For range tombstones `key` is the begin bound and `value` the end
/// bound, exactly as the record stores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteEntry<'a> {
    /// The kind of mutation.
    pub op: WriteOpKind,
    /// User key the mutation addresses.
    pub key: &'a [u8],
    /// Value, merge operand, or range end bound; empty for deletes.
    pub value: &'a [u8],
}

/// Decoded spans of the entry under the cursor, refreshed at every
/// reposition.
#[derive(Clone, Copy)]
struct CurrentEntry {
    op: WriteOpKind,
    key: (usize, usize),
    value: (usize, usize),
}

/// Column-family-scoped cursor over a batch's pending mutations.
///
/// Borrows the batch immutably, so the batch cannot be mutated while the
/// iterator lives. A record that fails to decode — possible only through
/// memory corruption — poisons the iterator: it becomes invalid and the
/// failure is reported by [`status`](DeltaIterator::status).
pub struct DeltaIterator<'a> {
    batch: &'a IndexedBatch,
    column_family: u32,
    cursor: Option<IndexCursor>,
    current: Option<CurrentEntry>,
    error: Option<BatchError>,
}

impl<'a> DeltaIterator<'a> {
    pub(crate) fn new(batch: &'a IndexedBatch, column_family: u32) -> Self {
        Self {
            batch,
            column_family,
            cursor: None,
            current: None,
            error: None,
        }
    }

    /// Whether the cursor rests on an entry of this iterator's family.
    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    /// The family this iterator is scoped to.
    pub fn column_family(&self) -> u32 {
        self.column_family
    }

    /// Position at the family's first pending mutation.
    pub fn seek_to_first(&mut self) {
        let view = self.batch.view();
        let target = SeekTarget::Min {
            column_family: self.column_family,
        };
        self.cursor = self.batch.index().lower_bound(&target, &view);
        self.refresh();
    }

    /// Position at the family's last pending mutation.
    pub fn seek_to_last(&mut self) {
        let view = self.batch.view();
        self.cursor = match self.column_family.checked_add(1) {
            Some(next_family) => {
                let target = SeekTarget::Min {
                    column_family: next_family,
                };
                self.batch.index().floor(&target, &view)
            }
            // the last family: the index tail is the family tail
            None => self.batch.index().last(),
        };
        self.refresh();
    }

    /// Position at the first pending mutation with key ≥ `key`.
    pub fn seek(&mut self, key: &[u8]) {
        let view = self.batch.view();
        let target = SeekTarget::First {
            column_family: self.column_family,
            key,
        };
        self.cursor = self.batch.index().lower_bound(&target, &view);
        self.refresh();
    }

    /// Position at the last pending mutation with key ≤ `key`.
    pub fn seek_for_prev(&mut self, key: &[u8]) {
        let view = self.batch.view();
        let target = SeekTarget::Last {
            column_family: self.column_family,
            key,
        };
        self.cursor = self.batch.index().floor(&target, &view);
        self.refresh();
    }

    /// Step to the next pending mutation.
    pub fn next(&mut self) {
        if let Some(cursor) = self.cursor {
            let view = self.batch.view();
            self.cursor = self.batch.index().next(cursor, &view);
            self.refresh();
        }
    }

    /// Step to the previous pending mutation.
    pub fn prev(&mut self) {
        if let Some(cursor) = self.cursor {
            let view = self.batch.view();
            self.cursor = self.batch.index().prev(cursor, &view);
            self.refresh();
        }
    }

    /// The mutation under the cursor.
    ///
    /// Must only be called while [`valid`](Self::valid); the returned
    /// slices borrow from the batch and outlive the iterator's next
    /// reposition.
    pub fn entry(&self) -> WriteEntry<'a> {
        let current = self
            .current
            .as_ref()
            .expect("entry() called on invalid iterator");
        let data = self.batch.log().data();
        WriteEntry {
            op: current.op,
            key: &data[current.key.0..current.key.0 + current.key.1],
            value: &data[current.value.0..current.value.0 + current.value.1],
        }
    }

    /// First decode failure this iterator has hit, if any.
    pub fn status(&self) -> Result<(), BatchError> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Re-decode the record under the cursor, clearing `current` when the
    /// cursor left the family or the index.
    fn refresh(&mut self) {
        self.current = None;
        let Some(cursor) = self.cursor else {
            return;
        };
        let entry = self.batch.arena().get(self.batch.index().entry_id(cursor));
        if entry.column_family != self.column_family {
            return;
        }

        match record::read_record(self.batch.log().data(), entry.offset) {
            Ok((rec, _)) => match rec.tag.write_op() {
                Some(op) => {
                    self.current = Some(CurrentEntry {
                        op,
                        key: (rec.key_offset, rec.key.len()),
                        value: (
                            // value bytes also live in the log; recover the
                            // span from the slice's position within it
                            span_of(self.batch.log().data(), rec.value),
                            rec.value.len(),
                        ),
                    });
                }
                None => {
                    error!(offset = entry.offset, tag = ?rec.tag, "meta record reached the index");
                    self.error = Some(BatchError::Corruption(format!(
                        "unexpected record in batch index: {:?}",
                        rec.tag
                    )));
                    self.cursor = None;
                }
            },
            Err(e) => {
                error!(offset = entry.offset, error = %e, "failed to decode indexed record");
                self.error = Some(BatchError::Record(e));
                self.cursor = None;
            }
        }
    }
}

/// Offset of `slice` within `buf`. `slice` must be derived from `buf`,
/// which decoding guarantees.
fn span_of(buf: &[u8], slice: &[u8]) -> usize {
    if slice.is_empty() {
        return 0;
    }
    slice.as_ptr() as usize - buf.as_ptr() as usize
}

// ------------------------------------------------------------------------------------------------
// Base+delta iterator
// ------------------------------------------------------------------------------------------------

/// Two-cursor merge of a base store iterator and a delta iterator.
///
/// See the [module-level documentation](self) for the state model.
pub struct BaseDeltaIterator<'a, B: StoreIterator> {
    forward: bool,
    current_at_base: bool,
    equal_keys: bool,
    status: Option<BatchError>,
    base: B,
    delta: DeltaIterator<'a>,
    comparator: Arc<dyn UserComparator>,
}

impl<'a, B: StoreIterator> BaseDeltaIterator<'a, B> {
    pub(crate) fn new(
        base: B,
        delta: DeltaIterator<'a>,
        comparator: Arc<dyn UserComparator>,
    ) -> Self {
        Self {
            forward: true,
            current_at_base: true,
            equal_keys: false,
            status: None,
            base,
            delta,
            comparator,
        }
    }

    /// Whether the composite rests on an entry.
    pub fn valid(&self) -> bool {
        if self.current_at_base {
            self.base.valid()
        } else {
            self.delta.valid()
        }
    }

    /// Position at the smallest live key.
    pub fn seek_to_first(&mut self) {
        self.forward = true;
        self.base.seek_to_first();
        self.delta.seek_to_first();
        self.update_current();
    }

    /// Position at the largest live key.
    pub fn seek_to_last(&mut self) {
        self.forward = false;
        self.base.seek_to_last();
        self.delta.seek_to_last();
        self.update_current();
    }

    /// Position at the first live key ≥ `key`.
    pub fn seek(&mut self, key: &[u8]) {
        self.forward = true;
        self.base.seek(key);
        self.delta.seek(key);
        self.update_current();
    }

    /// Position at the last live key ≤ `key`.
    pub fn seek_for_prev(&mut self, key: &[u8]) {
        self.forward = false;
        self.base.seek_for_prev(key);
        self.delta.seek_for_prev(key);
        self.update_current();
    }

    /// Step toward larger keys, reversing direction if needed.
    pub fn next(&mut self) {
        if !self.valid() {
            self.status = Some(BatchError::NotSupported(
                "next() on invalid iterator".to_string(),
            ));
            return;
        }

        if !self.forward {
            // Direction change. When only one cursor is live the other
            // must restart from the front; when both are live the one the
            // composite was not exposing sits behind and must catch up.
            self.forward = true;
            self.equal_keys = false;
            if !self.base.valid() {
                self.base.seek_to_first();
            } else if !self.delta.valid() {
                self.delta.seek_to_first();
            } else if self.current_at_base {
                self.advance_delta();
            } else {
                self.advance_base();
            }
            self.recheck_equal_keys();
        }

        self.advance();
    }

    /// Step toward smaller keys, reversing direction if needed.
    pub fn prev(&mut self) {
        if !self.valid() {
            self.status = Some(BatchError::NotSupported(
                "prev() on invalid iterator".to_string(),
            ));
            return;
        }

        if self.forward {
            self.forward = false;
            self.equal_keys = false;
            if !self.base.valid() {
                self.base.seek_to_last();
            } else if !self.delta.valid() {
                self.delta.seek_to_last();
            } else if self.current_at_base {
                self.advance_delta();
            } else {
                self.advance_base();
            }
            self.recheck_equal_keys();
        }

        self.advance();
    }

    /// Current key. Only meaningful while [`valid`](Self::valid).
    pub fn key(&self) -> &[u8] {
        if self.current_at_base {
            self.base.key()
        } else {
            self.delta.entry().key
        }
    }

    /// Current value. Only meaningful while [`valid`](Self::valid).
    pub fn value(&self) -> &[u8] {
        if self.current_at_base {
            self.base.value()
        } else {
            self.delta.entry().value
        }
    }

    /// First error in precedence order: the composite's own, then the
    /// base's, then the delta's.
    pub fn status(&self) -> Result<(), BatchError> {
        if let Some(e) = &self.status {
            return Err(e.clone());
        }
        self.base.status()?;
        self.delta.status()
    }

    fn advance(&mut self) {
        if self.equal_keys {
            self.advance_base();
            self.advance_delta();
        } else if self.current_at_base {
            self.advance_base();
        } else {
            self.advance_delta();
        }
        self.update_current();
    }

    fn advance_delta(&mut self) {
        if self.forward {
            self.delta.next();
        } else {
            self.delta.prev();
        }
    }

    fn advance_base(&mut self) {
        if self.forward {
            self.base.next();
        } else {
            self.base.prev();
        }
    }

    fn recheck_equal_keys(&mut self) {
        if self.base.valid() && self.delta.valid() {
            let delta_key = self.delta.entry().key;
            if self.comparator.compare(delta_key, self.base.key()) == Ordering::Equal {
                self.equal_keys = true;
            }
        }
    }

    /// Decide which cursor the composite exposes, skipping delta
    /// tombstones (and the base keys they cover) along the way.
    fn update_current(&mut self) {
        loop {
            self.equal_keys = false;

            if !self.base.valid() {
                if !self.delta.valid() {
                    // both exhausted
                    return;
                }
                let op = self.delta.entry().op;
                if is_tombstone(op) {
                    self.advance_delta();
                    continue;
                }
                self.current_at_base = false;
                self.assert_invariants();
                return;
            }

            if !self.delta.valid() {
                self.current_at_base = true;
                self.assert_invariants();
                return;
            }

            let entry = self.delta.entry();
            let mut cmp = self.comparator.compare(entry.key, self.base.key());
            if !self.forward {
                cmp = cmp.reverse();
            }

            if cmp == Ordering::Greater {
                // delta is ahead in travel order
                self.current_at_base = true;
                self.assert_invariants();
                return;
            }

            if cmp == Ordering::Equal {
                self.equal_keys = true;
            }
            if !is_tombstone(entry.op) {
                self.current_at_base = false;
                self.assert_invariants();
                return;
            }

            // delta tombstone: swallow it, and the base key it covers
            let covered = self.equal_keys;
            self.advance_delta();
            if covered {
                self.advance_base();
            }
        }
    }

    #[cfg(debug_assertions)]
    fn assert_invariants(&self) {
        if !self.valid() {
            return;
        }
        if !self.base.valid() {
            debug_assert!(!self.current_at_base && self.delta.valid());
            return;
        }
        if !self.delta.valid() {
            debug_assert!(self.current_at_base);
            return;
        }
        let mut cmp = self
            .comparator
            .compare(self.delta.entry().key, self.base.key());
        if !self.forward {
            cmp = cmp.reverse();
        }
        // exposing base means delta is strictly ahead in travel order;
        // exposing delta means delta is at or behind base
        debug_assert!(!self.current_at_base || cmp == Ordering::Greater);
        debug_assert!(self.current_at_base || cmp != Ordering::Greater);
        debug_assert_eq!(self.equal_keys, cmp == Ordering::Equal);
    }

    #[cfg(not(debug_assertions))]
    fn assert_invariants(&self) {}
}

/// The composite satisfies the same contract it consumes, so a base+delta
/// iterator can itself serve as the base of another overlay.
impl<B: StoreIterator> StoreIterator for BaseDeltaIterator<'_, B> {
    fn valid(&self) -> bool {
        BaseDeltaIterator::valid(self)
    }

    fn seek_to_first(&mut self) {
        BaseDeltaIterator::seek_to_first(self);
    }

    fn seek_to_last(&mut self) {
        BaseDeltaIterator::seek_to_last(self);
    }

    fn seek(&mut self, key: &[u8]) {
        BaseDeltaIterator::seek(self, key);
    }

    fn seek_for_prev(&mut self, key: &[u8]) {
        BaseDeltaIterator::seek_for_prev(self, key);
    }

    fn next(&mut self) {
        BaseDeltaIterator::next(self);
    }

    fn prev(&mut self) {
        BaseDeltaIterator::prev(self);
    }

    fn key(&self) -> &[u8] {
        BaseDeltaIterator::key(self)
    }

    fn value(&self) -> &[u8] {
        BaseDeltaIterator::value(self)
    }

    fn status(&self) -> Result<(), StoreError> {
        BaseDeltaIterator::status(self).map_err(|e| StoreError(e.to_string()))
    }
}

fn is_tombstone(op: WriteOpKind) -> bool {
    matches!(op, WriteOpKind::Delete | WriteOpKind::SingleDelete)
}
