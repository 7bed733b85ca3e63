//! Column family descriptors.
//!
//! The buffer partitions its entries by column family id. Everything it
//! needs to know about a family — its numeric id and the per-family
//! comparator and merge operator — comes through the [`ColumnFamilyHandle`]
//! trait, so any store-side handle type can plug in. [`ColumnFamily`] is the
//! plain descriptor used by tests and embedders without their own handle
//! type.
//!
//! Family id 0 is the default family; its comparator is the one the batch
//! was constructed with.

use std::sync::Arc;

use crate::comparator::{BytewiseComparator, UserComparator};
use crate::merge::MergeOperator;

// ------------------------------------------------------------------------------------------------
// Handle trait
// ------------------------------------------------------------------------------------------------

/// Store-side column family handle, as seen by the buffer.
pub trait ColumnFamilyHandle {
    /// Numeric id of the family. Id 0 is the default family.
    fn id(&self) -> u32;

    /// Human-readable family name, used in diagnostics.
    fn name(&self) -> &str;

    /// The comparator ordering this family's user keys.
    fn user_comparator(&self) -> Arc<dyn UserComparator>;

    /// The family's merge operator, if one is configured.
    fn merge_operator(&self) -> Option<Arc<dyn MergeOperator>> {
        None
    }
}

// ------------------------------------------------------------------------------------------------
// Plain descriptor
// ------------------------------------------------------------------------------------------------

/// A self-contained column family descriptor.
///
/// Defaults to bytewise key order and no merge operator; both can be
/// replaced with the builder methods.
#[derive(Clone)]
pub struct ColumnFamily {
    id: u32,
    name: String,
    comparator: Arc<dyn UserComparator>,
    merge_operator: Option<Arc<dyn MergeOperator>>,
}

impl ColumnFamily {
    /// Create a descriptor with bytewise ordering and no merge operator.
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            comparator: Arc::new(BytewiseComparator),
            merge_operator: None,
        }
    }

    /// Replace the family's comparator.
    pub fn with_comparator(mut self, comparator: Arc<dyn UserComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Attach a merge operator.
    pub fn with_merge_operator(mut self, operator: Arc<dyn MergeOperator>) -> Self {
        self.merge_operator = Some(operator);
        self
    }
}

impl ColumnFamilyHandle for ColumnFamily {
    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn user_comparator(&self) -> Arc<dyn UserComparator> {
        Arc::clone(&self.comparator)
    }

    fn merge_operator(&self) -> Option<Arc<dyn MergeOperator>> {
        self.merge_operator.clone()
    }
}
