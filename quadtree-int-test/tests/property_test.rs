use quadtree_index::{BoundingBox, IndexConfig, QueryMode};
use quadtree_int_test::test_util::{
    brute_force, cleanup, create_test_context, random_queries, random_records, record_id, run_test,
    test_config,
};
use std::collections::BTreeSet;

#[ctor::ctor]
fn init() {
    colog::init();
}

const EXTENT: BoundingBox = BoundingBox {
    min_x: -500.0,
    min_y: -500.0,
    max_x: 500.0,
    max_y: 500.0,
};

#[test]
fn test_queries_are_complete_and_sound() {
    for (seed, max_depth, split_threshold) in [(31, 4, 2), (32, 8, 8), (33, 12, 1), (34, 0, 4)] {
        run_test(
            create_test_context,
            move |ctx| {
                let records = random_records(1_500, seed, EXTENT);
                let index = ctx.build(&records, test_config(max_depth, split_threshold))?;

                for query in random_queries(60, seed + 1_000, EXTENT) {
                    let mut cursor = index.open_cursor(query)?;
                    let mut found = BTreeSet::new();
                    while let Some((_, payload)) = cursor.next_record()? {
                        assert!(found.insert(record_id(&payload)), "duplicate in {}", query);
                    }
                    assert_eq!(found, brute_force(&records, &query), "query {}", query);
                }
                Ok(())
            },
            cleanup,
        );
    }
}

#[test]
fn test_within_matches_brute_force() {
    run_test(
        create_test_context,
        |ctx| {
            let records = random_records(1_000, 41, EXTENT);
            let index = ctx.build(&records, test_config(8, 4))?;

            for query in random_queries(40, 42, EXTENT) {
                let mut cursor = index.open_cursor_with_mode(query, QueryMode::Within)?;
                let mut found = BTreeSet::new();
                while let Some((_, payload)) = cursor.next_record()? {
                    found.insert(record_id(&payload));
                }
                let expected: BTreeSet<u64> = records
                    .iter()
                    .enumerate()
                    .filter(|(_, (bbox, _))| query.contains(bbox))
                    .map(|(i, _)| i as u64)
                    .collect();
                assert_eq!(found, expected, "query {}", query);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_containment_invariant_holds_after_build() {
    run_test(
        create_test_context,
        |ctx| {
            let records = random_records(3_000, 51, EXTENT);
            let index = ctx.build(&records, test_config(9, 3))?;
            let report = index.check_integrity(false)?;
            assert!(report.is_valid, "{:?}", report.errors);
            assert!(report.misplaced_entries.is_empty());
            assert_eq!(report.entries_checked, 3_000);

            let stats = index.stats();
            assert!(stats.tree_depth <= 9);
            assert_eq!(stats.total_entries, 3_000);
            assert_eq!(stats.entries_per_depth.iter().sum::<u64>(), 3_000);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_query_past_the_root_bounds() {
    run_test(
        create_test_context,
        |ctx| {
            let records = random_records(500, 61, EXTENT);
            let config = IndexConfig::builder()
                .root_bounds(EXTENT)
                .split_threshold(4)
                .sync_on_finish(false)
                .build()?;
            let index = ctx.build(&records, config)?;

            let all = index.find_intersecting(&EXTENT.expand_by(1_000.0))?;
            assert_eq!(all.len(), 500);
            let outside = index.find_intersecting(&BoundingBox::new(600.0, 600.0, 700.0, 700.0))?;
            assert!(outside.is_empty());
            Ok(())
        },
        cleanup,
    )
}
