//! Merge operator seam.
//!
//! A merge record does not store a final value; it stores an *operand* that
//! the store combines with the key's existing value at read or compaction
//! time. The buffer accumulates operand chains and, when a read needs a
//! concrete value, folds the chain through the column family's
//! [`MergeOperator`].

/// Folds a chain of merge operands into a single value.
///
/// `operands` are ordered oldest first. `existing` is the base value the
/// chain applies on top of, or `None` when the key had no value (never
/// written, or last written by a delete).
///
/// Returning `None` signals that the operator could not combine the inputs;
/// readers surface that as corruption.
pub trait MergeOperator: Send + Sync {
    /// Stable identifying name, used in diagnostics.
    fn name(&self) -> &'static str;

    /// Compute `existing ⊕ operands[0] ⊕ operands[1] ⊕ …`.
    fn full_merge(
        &self,
        key: &[u8],
        existing: Option<&[u8]>,
        operands: &[Vec<u8>],
    ) -> Option<Vec<u8>>;
}
