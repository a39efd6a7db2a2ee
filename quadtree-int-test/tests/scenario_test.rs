use quadtree_index::{
    BoundingBox, ByteOrder, CursorState, IndexBuilder, IndexConfig, Point, QueryMode, SpatialError,
};
use quadtree_int_test::test_util::{cleanup, create_test_context, run_test, test_config};
use std::collections::BTreeSet;

#[ctor::ctor]
fn init() {
    colog::init();
}

fn labelled(records: &[(&str, BoundingBox)]) -> Vec<(BoundingBox, Vec<u8>)> {
    records
        .iter()
        .map(|(label, bbox)| (*bbox, label.as_bytes().to_vec()))
        .collect()
}

#[test]
fn test_small_index_queries() {
    run_test(
        create_test_context,
        |ctx| {
            let records = labelled(&[
                ("A", BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
                ("B", BoundingBox::new(20.0, 20.0, 30.0, 30.0)),
                ("C", BoundingBox::new(5.0, 5.0, 8.0, 8.0)),
            ]);
            let index = ctx.build(&records, test_config(4, 2))?;

            let mut cursor = index.open_cursor(BoundingBox::new(0.0, 0.0, 9.0, 9.0))?;
            let mut labels = BTreeSet::new();
            while let Some((_, payload)) = cursor.next_record()? {
                labels.insert(String::from_utf8_lossy(&payload).into_owned());
            }
            assert_eq!(labels, ["A", "C"].iter().map(|s| s.to_string()).collect());

            let mut empty = index.open_cursor(BoundingBox::new(100.0, 100.0, 200.0, 200.0))?;
            assert!(empty.next()?.is_none());
            assert_eq!(empty.state(), CursorState::Closed);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_straddling_record_found_by_any_overlapping_query() {
    run_test(
        create_test_context,
        |ctx| {
            let config = IndexConfig::builder()
                .max_depth(5)
                .split_threshold(2)
                .root_bounds(BoundingBox::new(0.0, 0.0, 100.0, 100.0))
                .sync_on_finish(false)
                .build()?;
            let mut builder = IndexBuilder::create(ctx.store_path(), config)?;
            for (i, (x, y)) in [(10.0, 10.0), (70.0, 70.0), (20.0, 80.0), (80.0, 20.0)]
                .into_iter()
                .enumerate()
            {
                builder.insert_geometry(&Point::new(x, y), format!("p{}", i).as_bytes())?;
            }
            let wide = builder.insert(BoundingBox::new(-1.0, -1.0, 51.0, 51.0), b"wide")?;
            let index = builder.finish(ctx.index_path())?;

            let root = index.root_bounds();
            assert_eq!(root, BoundingBox::new(0.0, 0.0, 100.0, 100.0));
            assert!(index.stats().node_count > 1);
            assert_eq!(index.stats().entries_per_depth[0], 1);

            for query in [
                root,
                BoundingBox::new(50.0, 50.0, 60.0, 60.0),
                BoundingBox::new(0.0, 0.0, 0.0, 0.0),
                BoundingBox::new(-1.0, 30.0, 0.0, 40.0),
            ] {
                assert!(index.find_intersecting(&query)?.contains(&wide), "{}", query);
            }
            assert!(!index
                .find_intersecting(&BoundingBox::new(52.0, 52.0, 60.0, 60.0))?
                .contains(&wide));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_touching_boxes_overlap() {
    run_test(
        create_test_context,
        |ctx| {
            let records = labelled(&[
                ("edge", BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
                ("corner", BoundingBox::new(10.0, 10.0, 20.0, 20.0)),
            ]);
            let index = ctx.build(&records, test_config(4, 1))?;

            let hits = index.find_intersecting(&BoundingBox::new(10.0, 10.0, 10.0, 10.0))?;
            assert_eq!(hits.len(), 2);
            let within = index.find_within(&BoundingBox::new(0.0, 0.0, 10.0, 10.0))?;
            assert_eq!(within.len(), 1);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_little_endian_store() {
    run_test(
        create_test_context,
        |ctx| {
            let config = IndexConfig::builder()
                .byte_order(ByteOrder::Little)
                .sync_on_finish(false)
                .build()?;
            let records = labelled(&[("xyz", BoundingBox::new(1.0, 2.0, 3.0, 4.0))]);
            let index = ctx.build(&records, config)?;
            drop(index);

            let bytes = std::fs::read(ctx.store_path())?;
            assert_eq!(bytes, vec![3, 0, 0, 0, b'x', b'y', b'z']);

            let index = ctx.open(ByteOrder::Little)?;
            let mut cursor = index.open_cursor_with_mode(index.root_bounds(), QueryMode::Within)?;
            let (record, payload) = cursor.next_record()?.unwrap();
            assert_eq!(record.offset, 0);
            assert_eq!(payload, b"xyz");
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_cursor_reopen_is_rejected() {
    run_test(
        create_test_context,
        |ctx| {
            let records = labelled(&[("A", BoundingBox::new(0.0, 0.0, 1.0, 1.0))]);
            let index = ctx.build(&records, test_config(4, 2))?;

            let mut cursor = index.open_cursor(BoundingBox::new(0.0, 0.0, 1.0, 1.0))?;
            let err = cursor.open(BoundingBox::new(0.0, 0.0, 1.0, 1.0)).unwrap_err();
            assert!(matches!(err, SpatialError::InvalidState(_)));

            // the failed reopen leaves the search untouched
            assert!(cursor.next()?.is_some());
            assert!(cursor.next()?.is_none());
            Ok(())
        },
        cleanup,
    )
}
