//! Ordered index over the mutation log.
//!
//! The index is an in-memory ordered multiset of lightweight entries, one
//! per keyed record in the log (or one per live key in overwrite mode).
//! An entry does not own its key: it records *where in the log* the key
//! bytes live, and every comparison resolves them on the fly. That keeps
//! an entry at five machine words regardless of key size and makes the
//! index trivially rebuildable from the log.
//!
//! ## Ordering
//!
//! Entries are ordered by `(column_family ascending, user key under the
//! family's comparator ascending, insertion sequence ascending)`. The
//! insertion-sequence tie-break makes the index a *stable* multiset:
//! duplicate keys iterate in the order they were written.
//!
//! ## Views
//!
//! Index operations that compare entries take an [`IndexView`] — the log
//! bytes, the entry arena, and the [`EntryComparator`] — because the index
//! structure itself stores only entry ids. The owning batch materializes a
//! view per operation from its own fields.
//!
//! ## Back-ends
//!
//! Two interchangeable [`EntryIndex`] implementations, selected by a
//! configuration string at construction:
//!
//! - [`skiplist::SkipListIndex`] (`"skiplist"`, and the fallback for
//!   unrecognized strings) — probabilistic ordered list, cheap appends.
//! - [`rbtree::RbTreeIndex`] (`"rbtree"`, the default) — deterministic
//!   red-black tree with parent links, cache-friendly traversal.
//!
//! Both hand out `u32` node cursors that stay valid across later inserts;
//! the index never removes nodes (overwrite mode rewrites an entry's
//! record offset in place instead).

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

pub mod rbtree;
pub mod skiplist;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::comparator::UserComparator;

pub use rbtree::RbTreeIndex;
pub use skiplist::SkipListIndex;

/// Identifier of an entry within the [`EntryArena`].
pub type EntryId = u32;

/// Opaque node handle inside a back-end's node pool.
pub type IndexCursor = u32;

// ------------------------------------------------------------------------------------------------
// Entries and arena
// ------------------------------------------------------------------------------------------------

/// Descriptor of one indexed record.
///
/// `offset` is the record's starting byte in the log; it is the only field
/// that ever changes after insertion (overwrite mode redirects an entry to
/// a newer record for the same key). `key_offset`/`key_len` locate the key
/// bytes and are fixed because an overwrite by definition carries an equal
/// key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Column family the record belongs to.
    pub column_family: u32,
    /// Byte offset of the record in the log.
    pub offset: usize,
    /// Byte offset of the key inside the log.
    pub key_offset: usize,
    /// Key length in bytes.
    pub key_len: usize,
    /// Monotonic insertion counter; orders duplicate keys.
    pub sequence: u64,
}

impl IndexEntry {
    /// The key bytes this entry describes, resolved against the log.
    pub fn key<'a>(&self, log: &'a [u8]) -> &'a [u8] {
        &log[self.key_offset..self.key_offset + self.key_len]
    }
}

/// Bump allocator for index entries.
///
/// Entries are appended for the life of the index and addressed by dense
/// `u32` ids; nothing is ever freed individually. Discarding the arena and
/// starting fresh is how `clear` and rebuild recycle memory.
#[derive(Debug, Default)]
pub struct EntryArena {
    entries: Vec<IndexEntry>,
}

impl EntryArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an entry, returning its id.
    pub fn push(&mut self, entry: IndexEntry) -> EntryId {
        let id = self.entries.len() as EntryId;
        self.entries.push(entry);
        id
    }

    /// Borrow an entry.
    pub fn get(&self, id: EntryId) -> &IndexEntry {
        &self.entries[id as usize]
    }

    /// Mutably borrow an entry (overwrite-mode offset rewrite).
    pub fn get_mut(&mut self, id: EntryId) -> &mut IndexEntry {
        &mut self.entries[id as usize]
    }

    /// Number of allocated entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the arena holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ------------------------------------------------------------------------------------------------
// Seek targets
// ------------------------------------------------------------------------------------------------

/// Sentinel bounds used to position index cursors.
///
/// Targets are never stored; they exist only for the duration of a seek.
/// No real entry ever compares equal to a target, which pins both ends of
/// a duplicate-key run:
///
/// - `Min` sorts before every entry of its family.
/// - `First` sorts after every entry with a smaller key and before every
///   entry with an equal or greater key — a lower bound on it lands on the
///   *oldest* duplicate.
/// - `Last` sorts after every entry with an equal or smaller key — the
///   floor of it lands on the *newest* duplicate.
#[derive(Debug, Clone, Copy)]
pub enum SeekTarget<'a> {
    /// Before all entries of `column_family`.
    Min {
        /// Family bound.
        column_family: u32,
    },
    /// Before all entries with exactly `(column_family, key)`.
    First {
        /// Family bound.
        column_family: u32,
        /// External key slice to compare against.
        key: &'a [u8],
    },
    /// After all entries with exactly `(column_family, key)`.
    Last {
        /// Family bound.
        column_family: u32,
        /// External key slice to compare against.
        key: &'a [u8],
    },
}

// ------------------------------------------------------------------------------------------------
// Entry comparator
// ------------------------------------------------------------------------------------------------

/// Orders index entries per the scheme in the module docs.
///
/// Key bytes of real entries are resolved against the log buffer supplied
/// through the [`IndexView`]; the comparator itself only knows which user
/// comparator governs which column family.
pub struct EntryComparator {
    default_comparator: Arc<dyn UserComparator>,
    overrides: HashMap<u32, Arc<dyn UserComparator>>,
}

impl EntryComparator {
    /// Create a comparator with the given default-family user comparator.
    pub fn new(default_comparator: Arc<dyn UserComparator>) -> Self {
        Self {
            default_comparator,
            overrides: HashMap::new(),
        }
    }

    /// Register a user comparator for a non-default family.
    pub fn set_comparator_for_cf(&mut self, cf: u32, comparator: Arc<dyn UserComparator>) {
        self.overrides.insert(cf, comparator);
    }

    /// The user comparator governing `cf`.
    pub fn user_comparator(&self, cf: u32) -> &dyn UserComparator {
        self.overrides
            .get(&cf)
            .map(|c| c.as_ref())
            .unwrap_or(self.default_comparator.as_ref())
    }

    /// The default-family user comparator.
    pub fn default_comparator(&self) -> &Arc<dyn UserComparator> {
        &self.default_comparator
    }

    /// Compare two user keys under `cf`'s comparator.
    pub fn compare_keys(&self, cf: u32, a: &[u8], b: &[u8]) -> Ordering {
        self.user_comparator(cf).compare(a, b)
    }

    /// Full three-level comparison of two real entries.
    pub fn compare_entries(&self, log: &[u8], a: &IndexEntry, b: &IndexEntry) -> Ordering {
        a.column_family
            .cmp(&b.column_family)
            .then_with(|| self.compare_keys(a.column_family, a.key(log), b.key(log)))
            .then_with(|| a.sequence.cmp(&b.sequence))
    }

    /// Compare a real entry against a seek target.
    pub fn compare_entry_to_target(
        &self,
        log: &[u8],
        entry: &IndexEntry,
        target: &SeekTarget<'_>,
    ) -> Ordering {
        match *target {
            SeekTarget::Min { column_family } => entry
                .column_family
                .cmp(&column_family)
                // any real entry of the family follows its Min sentinel
                .then(Ordering::Greater),
            SeekTarget::First { column_family, key } => entry
                .column_family
                .cmp(&column_family)
                .then_with(|| self.compare_keys(column_family, entry.key(log), key))
                .then(Ordering::Greater),
            SeekTarget::Last { column_family, key } => entry
                .column_family
                .cmp(&column_family)
                .then_with(|| self.compare_keys(column_family, entry.key(log), key))
                .then(Ordering::Less),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Index view
// ------------------------------------------------------------------------------------------------

/// Everything an index operation needs to compare entries: the log bytes,
/// the arena the entry ids resolve through, and the comparator.
#[derive(Clone, Copy)]
pub struct IndexView<'a> {
    /// Full log bytes, header included (offsets are absolute).
    pub log: &'a [u8],
    /// Arena resolving entry ids.
    pub arena: &'a EntryArena,
    /// The entry comparator.
    pub comparator: &'a EntryComparator,
}

impl IndexView<'_> {
    /// Compare two entries by id.
    pub fn compare_ids(&self, a: EntryId, b: EntryId) -> Ordering {
        self.comparator
            .compare_entries(self.log, self.arena.get(a), self.arena.get(b))
    }

    /// Compare an entry (by id) against a seek target.
    pub fn compare_id_to_target(&self, id: EntryId, target: &SeekTarget<'_>) -> Ordering {
        self.comparator
            .compare_entry_to_target(self.log, self.arena.get(id), target)
    }
}

// ------------------------------------------------------------------------------------------------
// Index trait
// ------------------------------------------------------------------------------------------------

/// Pluggable ordered container of index entries.
///
/// Implementations hand out `u32` cursors that remain valid across
/// subsequent inserts. All positioning respects the total order defined by
/// [`EntryComparator`].
pub trait EntryIndex: Send {
    /// Insert an entry. The entry's full ordering key (family, key bytes,
    /// sequence) must be distinct from every entry already present, which
    /// the insertion-sequence counter guarantees.
    fn insert(&mut self, id: EntryId, view: &IndexView<'_>);

    /// Number of entries.
    fn len(&self) -> usize;

    /// Whether the index holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cursor at the smallest entry.
    fn first(&self) -> Option<IndexCursor>;

    /// Cursor at the largest entry.
    fn last(&self) -> Option<IndexCursor>;

    /// Cursor at the first entry ordered after `target` (no entry ever
    /// equals a target).
    fn lower_bound(&self, target: &SeekTarget<'_>, view: &IndexView<'_>) -> Option<IndexCursor>;

    /// Cursor at the entry following `cursor`.
    fn next(&self, cursor: IndexCursor, view: &IndexView<'_>) -> Option<IndexCursor>;

    /// Cursor at the entry preceding `cursor`.
    fn prev(&self, cursor: IndexCursor, view: &IndexView<'_>) -> Option<IndexCursor>;

    /// The entry id a cursor points at.
    fn entry_id(&self, cursor: IndexCursor) -> EntryId;

    /// Cursor at the last entry ordered before `target`: the predecessor
    /// of the lower bound, or the overall last entry when the lower bound
    /// is exhausted.
    fn floor(&self, target: &SeekTarget<'_>, view: &IndexView<'_>) -> Option<IndexCursor> {
        match self.lower_bound(target, view) {
            Some(cursor) => self.prev(cursor, view),
            None => self.last(),
        }
    }
}

/// Construct a back-end by configuration string: `"rbtree"` selects the
/// red-black tree, anything else falls back to the skiplist.
pub fn new_entry_index(index_type: &str) -> Box<dyn EntryIndex> {
    if index_type == "rbtree" {
        Box::new(RbTreeIndex::new())
    } else {
        Box::new(SkipListIndex::new())
    }
}
