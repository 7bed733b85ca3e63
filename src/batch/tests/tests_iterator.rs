#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::batch::tests::helpers::{
        init_tracing, options, overwrite_options, MemStore, BACKENDS,
    };
    use crate::batch::{BatchError, BatchOptions, IndexedBatch, StoreIterator};
    use crate::cf::ColumnFamily;
    use crate::comparator::BytewiseComparator;
    use crate::record::WriteOpKind;

    fn overwrite_batch(index_type: &str) -> IndexedBatch {
        IndexedBatch::new(Arc::new(BytewiseComparator), overwrite_options(index_type))
    }

    /// Drain a composite iterator forward from seek_to_first.
    fn collect_forward<B: StoreIterator>(
        iter: &mut crate::batch::BaseDeltaIterator<'_, B>,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        iter.seek_to_first();
        let mut out = Vec::new();
        while iter.valid() {
            out.push((iter.key().to_vec(), iter.value().to_vec()));
            iter.next();
        }
        out
    }

    /// Drain a composite iterator backward from seek_to_last.
    fn collect_backward<B: StoreIterator>(
        iter: &mut crate::batch::BaseDeltaIterator<'_, B>,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        iter.seek_to_last();
        let mut out = Vec::new();
        while iter.valid() {
            out.push((iter.key().to_vec(), iter.value().to_vec()));
            iter.prev();
        }
        out
    }

    fn pair(key: &[u8], value: &[u8]) -> (Vec<u8>, Vec<u8>) {
        (key.to_vec(), value.to_vec())
    }

    // --------------------------------------------------------------------------------------------
    // Delta iterator
    // --------------------------------------------------------------------------------------------

    #[test]
    fn test_delta_seek_and_seek_for_prev() {
        let mut batch =
            IndexedBatch::new(Arc::new(BytewiseComparator), options("rbtree"));
        batch.put(b"b", b"1").unwrap();
        batch.put(b"d", b"2").unwrap();
        batch.put(b"f", b"3").unwrap();

        let mut iter = batch.new_iterator();

        iter.seek(b"c");
        assert!(iter.valid());
        assert_eq!(iter.entry().key, b"d");

        iter.seek(b"d");
        assert_eq!(iter.entry().key, b"d");

        iter.seek(b"g");
        assert!(!iter.valid());

        iter.seek_for_prev(b"c");
        assert_eq!(iter.entry().key, b"b");

        iter.seek_for_prev(b"d");
        assert_eq!(iter.entry().key, b"d");

        iter.seek_for_prev(b"a");
        assert!(!iter.valid());
    }

    #[test]
    fn test_delta_duplicate_run_traversal() {
        let mut batch =
            IndexedBatch::new(Arc::new(BytewiseComparator), options("skiplist"));
        batch.put(b"k", b"v1").unwrap();
        batch.merge(b"k", b"v2").unwrap();
        batch.delete(b"k").unwrap();

        // seek lands on the oldest duplicate
        let mut iter = batch.new_iterator();
        iter.seek(b"k");
        assert_eq!(iter.entry().op, WriteOpKind::Put);

        // seek_for_prev lands on the newest
        iter.seek_for_prev(b"k");
        assert_eq!(iter.entry().op, WriteOpKind::Delete);
        iter.prev();
        assert_eq!(iter.entry().op, WriteOpKind::Merge);
        iter.prev();
        assert_eq!(iter.entry().op, WriteOpKind::Put);
        iter.prev();
        assert!(!iter.valid());
    }

    #[test]
    fn test_delta_scopes_to_family() {
        let other = ColumnFamily::new(2, "other");
        let mut batch =
            IndexedBatch::new(Arc::new(BytewiseComparator), options("rbtree"));
        batch.put(b"a", b"default").unwrap();
        batch.put_cf(&other, b"z", b"other").unwrap();

        let mut iter = batch.new_iterator_cf(&other);
        iter.seek_to_first();
        assert!(iter.valid());
        assert_eq!(iter.entry().key, b"z");
        iter.next();
        assert!(!iter.valid());

        iter.seek_to_last();
        assert_eq!(iter.entry().key, b"z");
        iter.prev();
        assert!(!iter.valid());
    }

    #[test]
    fn test_delta_entry_slices_outlive_repositioning() {
        let mut batch =
            IndexedBatch::new(Arc::new(BytewiseComparator), options("rbtree"));
        batch.put(b"a", b"first").unwrap();
        batch.put(b"b", b"second").unwrap();

        let mut iter = batch.new_iterator();
        iter.seek_to_first();
        let pinned = iter.entry();
        iter.next();
        // the slice from before the step still reads the log
        assert_eq!(pinned.key, b"a");
        assert_eq!(pinned.value, b"first");
    }

    // --------------------------------------------------------------------------------------------
    // Base+delta: construction and overlay
    // --------------------------------------------------------------------------------------------

    #[test]
    fn test_base_delta_requires_overwrite_mode() {
        let batch = IndexedBatch::new(Arc::new(BytewiseComparator), options("rbtree"));
        let store = MemStore::new();
        match batch.new_iterator_with_base(store.iter(0)) {
            Err(BatchError::NotSupported(_)) => {}
            other => panic!("expected NotSupported, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn test_overlay_masks_and_suppresses() {
        init_tracing();
        let store = MemStore::with_entries(0, &[(b"a", b"A"), (b"b", b"B"), (b"c", b"C")]);
        for backend in BACKENDS {
            let mut batch = overwrite_batch(backend);
            batch.put(b"b", b"B2").unwrap();
            batch.delete(b"c").unwrap();

            let mut iter = batch.new_iterator_with_base(store.iter(0)).unwrap();
            assert_eq!(
                collect_forward(&mut iter),
                vec![pair(b"a", b"A"), pair(b"b", b"B2")],
                "{backend}"
            );
            assert_eq!(
                collect_backward(&mut iter),
                vec![pair(b"b", b"B2"), pair(b"a", b"A")],
                "{backend}"
            );
        }
    }

    #[test]
    fn test_delta_only_and_base_only_keys_interleave() {
        let store = MemStore::with_entries(0, &[(b"b", b"B"), (b"d", b"D")]);
        let mut batch = overwrite_batch("rbtree");
        batch.put(b"a", b"A").unwrap();
        batch.put(b"c", b"C").unwrap();
        batch.put(b"e", b"E").unwrap();

        let mut iter = batch.new_iterator_with_base(store.iter(0)).unwrap();
        let forward = collect_forward(&mut iter);
        assert_eq!(
            forward,
            vec![
                pair(b"a", b"A"),
                pair(b"b", b"B"),
                pair(b"c", b"C"),
                pair(b"d", b"D"),
                pair(b"e", b"E"),
            ]
        );

        let mut backward = collect_backward(&mut iter);
        backward.reverse();
        assert_eq!(backward, forward);
    }

    #[test]
    fn test_tombstones_at_the_edges() {
        let store = MemStore::with_entries(0, &[(b"a", b"A"), (b"m", b"M"), (b"z", b"Z")]);
        let mut batch = overwrite_batch("rbtree");
        batch.delete(b"a").unwrap();
        batch.delete(b"z").unwrap();

        let mut iter = batch.new_iterator_with_base(store.iter(0)).unwrap();
        assert_eq!(collect_forward(&mut iter), vec![pair(b"m", b"M")]);
        assert_eq!(collect_backward(&mut iter), vec![pair(b"m", b"M")]);
    }

    #[test]
    fn test_everything_deleted_is_an_empty_iterator() {
        let store = MemStore::with_entries(0, &[(b"a", b"A"), (b"b", b"B")]);
        let mut batch = overwrite_batch("rbtree");
        batch.delete(b"a").unwrap();
        batch.delete(b"b").unwrap();

        let mut iter = batch.new_iterator_with_base(store.iter(0)).unwrap();
        iter.seek_to_first();
        assert!(!iter.valid());
        iter.seek_to_last();
        assert!(!iter.valid());
    }

    #[test]
    fn test_delete_of_absent_key_is_invisible() {
        let store = MemStore::with_entries(0, &[(b"b", b"B")]);
        let mut batch = overwrite_batch("rbtree");
        batch.delete(b"a").unwrap(); // nothing in base to suppress
        batch.delete(b"c").unwrap();

        let mut iter = batch.new_iterator_with_base(store.iter(0)).unwrap();
        assert_eq!(collect_forward(&mut iter), vec![pair(b"b", b"B")]);
        assert_eq!(collect_backward(&mut iter), vec![pair(b"b", b"B")]);
    }

    #[test]
    fn test_empty_base_shows_pending_puts_only() {
        let store = MemStore::new();
        let mut batch = overwrite_batch("skiplist");
        batch.put(b"x", b"1").unwrap();
        batch.delete(b"y").unwrap();
        batch.put(b"z", b"2").unwrap();

        let mut iter = batch.new_iterator_with_base(store.iter(0)).unwrap();
        assert_eq!(
            collect_forward(&mut iter),
            vec![pair(b"x", b"1"), pair(b"z", b"2")]
        );
        assert_eq!(
            collect_backward(&mut iter),
            vec![pair(b"z", b"2"), pair(b"x", b"1")]
        );
    }

    #[test]
    fn test_empty_base_and_empty_batch() {
        let store = MemStore::new();
        let batch = overwrite_batch("rbtree");
        let mut iter = batch.new_iterator_with_base(store.iter(0)).unwrap();
        iter.seek_to_first();
        assert!(!iter.valid());
    }

    // --------------------------------------------------------------------------------------------
    // Base+delta: seeks and direction changes
    // --------------------------------------------------------------------------------------------

    #[test]
    fn test_seek_lands_on_merged_view() {
        let store = MemStore::with_entries(0, &[(b"a", b"A"), (b"c", b"C"), (b"e", b"E")]);
        let mut batch = overwrite_batch("rbtree");
        batch.put(b"b", b"B").unwrap();
        batch.delete(b"c").unwrap();

        let mut iter = batch.new_iterator_with_base(store.iter(0)).unwrap();

        iter.seek(b"b");
        assert_eq!((iter.key(), iter.value()), (&b"b"[..], &b"B"[..]));

        // seeking at a suppressed key skips to the next live one
        iter.seek(b"c");
        assert_eq!(iter.key(), b"e");

        iter.seek_for_prev(b"d");
        assert_eq!(iter.key(), b"b");

        iter.seek_for_prev(b"a");
        assert_eq!(iter.key(), b"a");
    }

    #[test]
    fn test_direction_reversal_round_trip() {
        let store = MemStore::with_entries(0, &[(b"a", b"A"), (b"c", b"C")]);
        for backend in BACKENDS {
            let mut batch = overwrite_batch(backend);
            batch.put(b"b", b"B").unwrap();
            batch.put(b"d", b"D").unwrap();

            let mut iter = batch.new_iterator_with_base(store.iter(0)).unwrap();

            // from every position: prev-then-next and next-then-prev both
            // return to the same (key, value)
            let keys: [&[u8]; 4] = [b"a", b"b", b"c", b"d"];
            for key in keys {
                iter.seek(key);
                let here = (iter.key().to_vec(), iter.value().to_vec());

                if key != *keys.first().unwrap() {
                    iter.prev();
                    iter.next();
                    assert_eq!(
                        (iter.key().to_vec(), iter.value().to_vec()),
                        here,
                        "prev/next at {key:?} ({backend})"
                    );
                }
                if key != *keys.last().unwrap() {
                    iter.next();
                    iter.prev();
                    assert_eq!(
                        (iter.key().to_vec(), iter.value().to_vec()),
                        here,
                        "next/prev at {key:?} ({backend})"
                    );
                }
            }
        }
    }

    #[test]
    fn test_reversal_when_one_cursor_is_exhausted() {
        let store = MemStore::with_entries(0, &[(b"a", b"A")]);
        let mut batch = overwrite_batch("rbtree");
        batch.put(b"z", b"Z").unwrap();

        let mut iter = batch.new_iterator_with_base(store.iter(0)).unwrap();

        // walk to the last entry: base is exhausted there
        iter.seek_to_last();
        assert_eq!(iter.key(), b"z");
        // reversing must revive the base cursor
        iter.prev();
        assert_eq!(iter.key(), b"a");
        iter.next();
        assert_eq!(iter.key(), b"z");
    }

    #[test]
    fn test_advancing_invalid_iterator_sets_not_supported() {
        let store = MemStore::new();
        let batch = overwrite_batch("rbtree");
        let mut iter = batch.new_iterator_with_base(store.iter(0)).unwrap();

        iter.seek_to_first();
        assert!(!iter.valid());
        assert!(iter.status().is_ok());

        iter.next();
        assert!(matches!(
            iter.status(),
            Err(BatchError::NotSupported(_))
        ));
    }

    // --------------------------------------------------------------------------------------------
    // Base+delta: observed oddities, pinned
    // --------------------------------------------------------------------------------------------

    #[test]
    fn test_delete_range_masks_begin_key_only() {
        // only the begin bound of a range tombstone is indexed: iteration
        // surfaces the tombstone as an entry at the begin key (value =
        // end bound) and keys inside the range leak through untouched
        let store = MemStore::with_entries(0, &[(b"b", b"B"), (b"c", b"C")]);
        let mut batch = overwrite_batch("rbtree");
        batch.delete_range(b"b", b"d").unwrap();

        let mut iter = batch.new_iterator_with_base(store.iter(0)).unwrap();
        assert_eq!(
            collect_forward(&mut iter),
            vec![pair(b"b", b"d"), pair(b"c", b"C")]
        );
    }

    #[test]
    fn test_merge_entries_surface_their_operand() {
        // the composite cannot fold merge chains mid-iteration; the
        // operand itself is exposed as the value
        let store = MemStore::with_entries(0, &[(b"k", b"base")]);
        let mut batch = IndexedBatch::new(
            Arc::new(BytewiseComparator),
            BatchOptions {
                overwrite_key: true,
                ..BatchOptions::default()
            },
        );
        batch.merge(b"k", b"operand").unwrap();

        let mut iter = batch.new_iterator_with_base(store.iter(0)).unwrap();
        assert_eq!(collect_forward(&mut iter), vec![pair(b"k", b"operand")]);
    }

    #[test]
    fn test_family_scoped_base_delta() {
        let other = ColumnFamily::new(7, "other");
        let mut store = MemStore::new();
        store.insert(7, b"a", b"A");
        store.insert(7, b"b", b"B");
        store.insert(0, b"x", b"default-family");

        let mut batch = overwrite_batch("rbtree");
        batch.put_cf(&other, b"c", b"C").unwrap();
        batch.delete_cf(&other, b"a").unwrap();

        let mut iter = batch
            .new_iterator_with_base_cf(&other, store.iter(7))
            .unwrap();
        assert_eq!(
            collect_forward(&mut iter),
            vec![pair(b"b", b"B"), pair(b"c", b"C")]
        );
    }
}
