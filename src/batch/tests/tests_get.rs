#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::batch::tests::helpers::{
        concat_operator, init_tracing, options, overwrite_options, FailingStore, MemStore,
        BACKENDS,
    };
    use crate::batch::{BatchError, BatchGetResult, BatchOptions, IndexedBatch};
    use crate::cf::ColumnFamily;
    use crate::comparator::BytewiseComparator;

    fn new_batch(index_type: &str) -> IndexedBatch {
        IndexedBatch::new(Arc::new(BytewiseComparator), options(index_type))
    }

    fn batch_with_operator() -> IndexedBatch {
        IndexedBatch::new(
            Arc::new(BytewiseComparator),
            BatchOptions {
                merge_operator: Some(concat_operator()),
                ..BatchOptions::default()
            },
        )
    }

    // --------------------------------------------------------------------------------------------
    // Batch-only lookups
    // --------------------------------------------------------------------------------------------

    #[test]
    fn test_latest_write_wins() {
        init_tracing();
        for backend in BACKENDS {
            let mut batch = new_batch(backend);
            batch.put(b"k", b"1").unwrap();
            batch.put(b"k", b"2").unwrap();
            assert_eq!(
                batch.get_from_batch(b"k").unwrap(),
                BatchGetResult::Found(b"2".to_vec()),
                "{backend}"
            );

            batch.delete(b"k").unwrap();
            assert_eq!(
                batch.get_from_batch(b"k").unwrap(),
                BatchGetResult::Deleted,
                "{backend}"
            );

            batch.put(b"k", b"3").unwrap();
            assert_eq!(
                batch.get_from_batch(b"k").unwrap(),
                BatchGetResult::Found(b"3".to_vec()),
                "{backend}"
            );
        }
    }

    #[test]
    fn test_single_delete_reads_as_deleted() {
        let mut batch = new_batch("rbtree");
        batch.put(b"k", b"1").unwrap();
        batch.single_delete(b"k").unwrap();
        assert_eq!(batch.get_from_batch(b"k").unwrap(), BatchGetResult::Deleted);
    }

    #[test]
    fn test_merge_chain_without_base_stays_in_progress() {
        let mut batch = batch_with_operator();
        batch.merge(b"k", b"x").unwrap();
        batch.merge(b"k", b"y").unwrap();
        assert_eq!(
            batch.get_from_batch(b"k").unwrap(),
            BatchGetResult::MergeInProgress
        );
    }

    #[test]
    fn test_merge_chain_folds_over_put() {
        let mut batch = batch_with_operator();
        batch.put(b"k", b"base").unwrap();
        batch.merge(b"k", b"x").unwrap();
        batch.merge(b"k", b"y").unwrap();
        assert_eq!(
            batch.get_from_batch(b"k").unwrap(),
            BatchGetResult::Found(b"base,x,y".to_vec())
        );
    }

    #[test]
    fn test_merge_chain_stops_at_delete() {
        let mut batch = batch_with_operator();
        batch.put(b"k", b"base").unwrap();
        batch.delete(b"k").unwrap();
        batch.merge(b"k", b"x").unwrap();
        // the walk hits the delete below the operand chain
        assert_eq!(batch.get_from_batch(b"k").unwrap(), BatchGetResult::Deleted);
    }

    #[test]
    fn test_fold_without_operator_is_invalid_argument() {
        let mut batch = new_batch("rbtree"); // no operator configured
        batch.put(b"k", b"base").unwrap();
        batch.merge(b"k", b"x").unwrap();
        assert!(matches!(
            batch.get_from_batch(b"k"),
            Err(BatchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_delete_range_begin_key_lookup_is_an_error() {
        let mut batch = new_batch("rbtree");
        batch.delete_range(b"b", b"d").unwrap();
        // only the begin bound is indexed, and point lookups refuse it
        assert!(matches!(
            batch.get_from_batch(b"b"),
            Err(BatchError::Corruption(_))
        ));
        // keys inside the range are untouched by the index
        assert_eq!(batch.get_from_batch(b"c").unwrap(), BatchGetResult::NotFound);
    }

    // --------------------------------------------------------------------------------------------
    // Combined lookups
    // --------------------------------------------------------------------------------------------

    #[test]
    fn test_batch_shadows_store() {
        let store = MemStore::with_entries(0, &[(b"a", b"A"), (b"b", b"B")]);
        let mut batch = new_batch("rbtree");
        batch.put(b"a", b"patched").unwrap();
        batch.delete(b"b").unwrap();

        assert_eq!(
            batch.get_from_batch_and_db(&store, b"a").unwrap(),
            BatchGetResult::Found(b"patched".to_vec())
        );
        // a pending delete hides the store's value
        assert_eq!(
            batch.get_from_batch_and_db(&store, b"b").unwrap(),
            BatchGetResult::NotFound
        );
    }

    #[test]
    fn test_fallthrough_to_store() {
        let store = MemStore::with_entries(0, &[(b"present", b"V")]);
        let batch = new_batch("rbtree");

        assert_eq!(
            batch.get_from_batch_and_db(&store, b"present").unwrap(),
            BatchGetResult::Found(b"V".to_vec())
        );
        assert_eq!(
            batch.get_from_batch_and_db(&store, b"absent").unwrap(),
            BatchGetResult::NotFound
        );
    }

    #[test]
    fn test_pending_merges_fold_over_store_value() {
        let store = MemStore::with_entries(0, &[(b"k", b"stored")]);
        let mut batch = batch_with_operator();
        batch.merge(b"k", b"x").unwrap();
        batch.merge(b"k", b"y").unwrap();

        assert_eq!(
            batch.get_from_batch_and_db(&store, b"k").unwrap(),
            BatchGetResult::Found(b"stored,x,y".to_vec())
        );
    }

    #[test]
    fn test_pending_merges_fold_over_missing_base() {
        let store = MemStore::new();
        let mut batch = batch_with_operator();
        batch.merge(b"k", b"x").unwrap();

        assert_eq!(
            batch.get_from_batch_and_db(&store, b"k").unwrap(),
            BatchGetResult::Found(b"x".to_vec())
        );
    }

    #[test]
    fn test_pending_merges_without_operator_fail_combined_lookup() {
        let store = MemStore::with_entries(0, &[(b"k", b"stored")]);
        let mut batch = new_batch("rbtree");
        batch.merge(b"k", b"x").unwrap();

        assert!(matches!(
            batch.get_from_batch_and_db(&store, b"k"),
            Err(BatchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_overwrite_mode_does_not_consult_store_for_merges() {
        // in overwrite mode a merge may have displaced part of the chain,
        // so the result cannot be reconstructed even with the store's help
        let store = MemStore::with_entries(0, &[(b"k", b"stored")]);
        let mut batch = IndexedBatch::new(
            Arc::new(BytewiseComparator),
            BatchOptions {
                merge_operator: Some(concat_operator()),
                ..overwrite_options("rbtree")
            },
        );
        batch.merge(b"k", b"x").unwrap();

        assert_eq!(
            batch.get_from_batch_and_db(&store, b"k").unwrap(),
            BatchGetResult::MergeInProgress
        );
    }

    #[test]
    fn test_store_errors_propagate() {
        let mut batch = new_batch("rbtree");
        batch.put(b"hit", b"1").unwrap();

        // a batch hit never touches the store
        assert_eq!(
            batch.get_from_batch_and_db(&FailingStore, b"hit").unwrap(),
            BatchGetResult::Found(b"1".to_vec())
        );
        // a miss does, and the failure comes through unchanged
        assert!(matches!(
            batch.get_from_batch_and_db(&FailingStore, b"miss"),
            Err(BatchError::Store(_))
        ));
    }

    #[test]
    fn test_combined_lookup_with_family_operator() {
        let counters = ColumnFamily::new(4, "counters").with_merge_operator(concat_operator());
        let mut store = MemStore::new();
        store.insert(4, b"k", b"base");

        let mut batch = new_batch("rbtree");
        batch.merge_cf(&counters, b"k", b"x").unwrap();

        assert_eq!(
            batch
                .get_from_batch_and_db_cf(&store, &counters, b"k")
                .unwrap(),
            BatchGetResult::Found(b"base,x".to_vec())
        );
    }
}
