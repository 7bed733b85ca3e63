//! # TabulaDB
//!
//! An **indexed write buffer** for ordered key-value stores: a write batch
//! that stays readable. Mutations (put, delete, single-delete,
//! delete-range, merge) accumulate in a compact append-only byte log —
//! the exact bytes a store commits — while an in-memory ordered index over
//! that log keeps the pending state queryable, iterable, and mergeable
//! with a snapshot of the underlying store.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                     IndexedBatch                       │
//! │                                                        │
//! │  put/delete/merge ──► ┌──────────────┐                 │
//! │                       │ MutationLog  │  append-only    │
//! │                       │ (byte log)   │  record bytes   │
//! │                       └──────┬───────┘                 │
//! │                              │ offset                  │
//! │                       ┌──────▼───────┐                 │
//! │                       │ EntryIndex   │  ordered by     │
//! │                       │ (skiplist /  │  (cf, key, seq) │
//! │                       │  rbtree)     │                 │
//! │                       └──────┬───────┘                 │
//! │                              │                         │
//! │   get_from_batch ◄───────────┤                         │
//! │   DeltaIterator  ◄───────────┘                         │
//! │                                                        │
//! │   BaseDeltaIterator = StoreIterator ⊕ DeltaIterator    │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`batch`] | The indexed batch, point lookups, delta and base+delta iterators |
//! | [`log`] | Append-only mutation log with savepoints and a size cap |
//! | [`index`] | Ordered entry index: arena, comparator, skiplist and rbtree back-ends |
//! | [`record`] | Mutation record tags and codec |
//! | [`comparator`] | User-key comparators |
//! | [`cf`] | Column family descriptors |
//! | [`merge`] | Merge operator seam |
//!
//! ## Key Features
//!
//! - **Readable batches** — point lookups and ordered iteration over
//!   pending, uncommitted mutations.
//! - **Base+delta iteration** — overlay the buffer on a store snapshot:
//!   pending puts mask base values, pending deletes suppress base keys,
//!   and direction can reverse at any position.
//! - **Savepoints** — byte-exact rollback of the log with automatic index
//!   rebuild, nestable to any depth.
//! - **Overwrite mode** — keep one live entry per key, track superseded
//!   records, and reclaim their bytes with `collapse`.
//! - **Pluggable ordering** — per-column-family user comparators; two
//!   index back-ends (`"rbtree"`, `"skiplist"`) behind one trait.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tabuladb::{BatchGetResult, BatchOptions, BytewiseComparator, IndexedBatch};
//!
//! let mut batch = IndexedBatch::new(
//!     Arc::new(BytewiseComparator),
//!     BatchOptions::default(),
//! );
//!
//! // Write
//! batch.put(b"hello", b"world").unwrap();
//! batch.delete(b"stale").unwrap();
//!
//! // Read the pending state back
//! assert_eq!(
//!     batch.get_from_batch(b"hello").unwrap(),
//!     BatchGetResult::Found(b"world".to_vec()),
//! );
//! assert_eq!(
//!     batch.get_from_batch(b"stale").unwrap(),
//!     BatchGetResult::Deleted,
//! );
//!
//! // Iterate pending mutations in key order
//! let mut iter = batch.new_iterator();
//! iter.seek_to_first();
//! while iter.valid() {
//!     let entry = iter.entry();
//!     println!("{:?} {:?}", entry.op, entry.key);
//!     iter.next();
//! }
//!
//! // Roll back everything after a savepoint
//! batch.set_savepoint();
//! batch.put(b"oops", b"!").unwrap();
//! batch.rollback_to_savepoint().unwrap();
//! assert_eq!(batch.get_from_batch(b"oops").unwrap(), BatchGetResult::NotFound);
//!
//! // Hand the raw bytes to the store for commit
//! let _committed: &[u8] = batch.write_batch().data();
//! ```

pub mod batch;
pub mod cf;
pub mod comparator;
pub mod index;
pub mod log;
pub mod merge;
pub mod record;

pub use batch::{
    BaseDeltaIterator, BaseStore, BatchError, BatchGetResult, BatchOptions, DeltaIterator,
    IndexedBatch, StoreError, StoreIterator, WriteEntry, DEFAULT_COLUMN_FAMILY,
};
pub use cf::{ColumnFamily, ColumnFamilyHandle};
pub use comparator::{BytewiseComparator, ReverseBytewiseComparator, UserComparator};
pub use merge::MergeOperator;
pub use record::{RecordTag, WriteOpKind};
