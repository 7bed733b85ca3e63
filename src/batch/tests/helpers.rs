//! Shared fixtures for batch tests: an in-memory store with a snapshot
//! iterator, a concatenating merge operator, and option shorthands.
#![cfg(test)]

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::Subscriber;

use crate::batch::{BaseStore, BatchOptions, StoreError, StoreIterator};
use crate::merge::MergeOperator;

pub fn init_tracing() {
    let _ = Subscriber::builder()
        .with_max_level(Level::TRACE)
        .try_init();
}

/// Options shorthand: multiset index on the chosen back-end.
pub fn options(index_type: &str) -> BatchOptions {
    BatchOptions {
        index_type: index_type.to_string(),
        ..BatchOptions::default()
    }
}

/// Options shorthand: overwrite mode on the chosen back-end.
pub fn overwrite_options(index_type: &str) -> BatchOptions {
    BatchOptions {
        overwrite_key: true,
        index_type: index_type.to_string(),
        ..BatchOptions::default()
    }
}

/// Both back-end names, for tests that must hold on either.
pub const BACKENDS: [&str; 2] = ["rbtree", "skiplist"];

// ------------------------------------------------------------------------------------------------
// Merge operator
// ------------------------------------------------------------------------------------------------

/// Joins base and operands with `,`; the classic append operator.
pub struct ConcatOperator;

impl MergeOperator for ConcatOperator {
    fn name(&self) -> &'static str {
        "test.ConcatOperator"
    }

    fn full_merge(
        &self,
        _key: &[u8],
        existing: Option<&[u8]>,
        operands: &[Vec<u8>],
    ) -> Option<Vec<u8>> {
        let mut parts: Vec<&[u8]> = Vec::new();
        if let Some(base) = existing {
            parts.push(base);
        }
        for operand in operands {
            parts.push(operand);
        }
        Some(parts.join(&b","[..]))
    }
}

pub fn concat_operator() -> Arc<dyn MergeOperator> {
    Arc::new(ConcatOperator)
}

// ------------------------------------------------------------------------------------------------
// In-memory store
// ------------------------------------------------------------------------------------------------

/// A store snapshot: one ordered map per column family.
#[derive(Default)]
pub struct MemStore {
    families: BTreeMap<u32, BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cf: u32, key: &[u8], value: &[u8]) {
        self.families
            .entry(cf)
            .or_default()
            .insert(key.to_vec(), value.to_vec());
    }

    pub fn with_entries(cf: u32, entries: &[(&[u8], &[u8])]) -> Self {
        let mut store = Self::new();
        for (key, value) in entries {
            store.insert(cf, key, value);
        }
        store
    }

    /// Snapshot iterator over one family.
    pub fn iter(&self, cf: u32) -> MemStoreIterator {
        let entries = self
            .families
            .get(&cf)
            .map(|map| {
                map.iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        MemStoreIterator {
            entries,
            position: None,
        }
    }
}

impl BaseStore for MemStore {
    fn get(&self, column_family: u32, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .families
            .get(&column_family)
            .and_then(|map| map.get(key))
            .cloned())
    }
}

/// A store that fails every lookup, for error propagation tests.
pub struct FailingStore;

impl BaseStore for FailingStore {
    fn get(&self, _column_family: u32, _key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Err(StoreError("disk on fire".to_string()))
    }
}

/// Vec-backed snapshot iterator; `position == None` means invalid.
pub struct MemStoreIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    position: Option<usize>,
}

impl StoreIterator for MemStoreIterator {
    fn valid(&self) -> bool {
        self.position.is_some()
    }

    fn seek_to_first(&mut self) {
        self.position = if self.entries.is_empty() { None } else { Some(0) };
    }

    fn seek_to_last(&mut self) {
        self.position = self.entries.len().checked_sub(1);
    }

    fn seek(&mut self, key: &[u8]) {
        self.position = self
            .entries
            .iter()
            .position(|(k, _)| k.as_slice() >= key);
    }

    fn seek_for_prev(&mut self, key: &[u8]) {
        self.position = self
            .entries
            .iter()
            .rposition(|(k, _)| k.as_slice() <= key);
    }

    fn next(&mut self) {
        self.position = match self.position {
            Some(i) if i + 1 < self.entries.len() => Some(i + 1),
            _ => None,
        };
    }

    fn prev(&mut self) {
        self.position = match self.position {
            Some(i) => i.checked_sub(1),
            None => None,
        };
    }

    fn key(&self) -> &[u8] {
        let i = self.position.expect("key() on invalid iterator");
        &self.entries[i].0
    }

    fn value(&self) -> &[u8] {
        let i = self.position.expect("value() on invalid iterator");
        &self.entries[i].1
    }
}
