use quadtree_index::{BoundingBox, ByteOrder};
use quadtree_int_test::test_util::{
    brute_force, cleanup, create_test_context, random_queries, random_records, record_id, run_test,
    test_config,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;

#[ctor::ctor]
fn init() {
    colog::init();
}

const EXTENT: BoundingBox = BoundingBox {
    min_x: 0.0,
    min_y: 0.0,
    max_x: 10_000.0,
    max_y: 10_000.0,
};

#[test]
fn test_concurrent_cursors_share_one_index() {
    run_test(
        create_test_context,
        |ctx| {
            let records = Arc::new(random_records(5_000, 21, EXTENT));
            ctx.build(&records, test_config(10, 16))?;
            let index = ctx.open(ByteOrder::Big)?;

            let num_threads = 8;
            let queries_per_thread = 25;
            let barrier = Arc::new(Barrier::new(num_threads));
            let mut handles = vec![];

            for thread_id in 0..num_threads {
                let index = index.clone();
                let records = Arc::clone(&records);
                let barrier = Arc::clone(&barrier);

                handles.push(thread::spawn(move || {
                    barrier.wait();
                    let queries = random_queries(queries_per_thread, 100 + thread_id as u64, EXTENT);
                    let mut bytes = 0u64;
                    for query in queries {
                        let mut cursor = index.open_cursor(query).unwrap();
                        let mut found = BTreeSet::new();
                        while let Some((_, payload)) = cursor.next_record().unwrap() {
                            bytes += payload.len() as u64;
                            assert!(found.insert(record_id(&payload)));
                        }
                        assert_eq!(found, brute_force(&records, &query), "{}", query);
                    }
                    bytes
                }));
            }

            let mut total_bytes = 0;
            for handle in handles {
                total_bytes += handle.join().unwrap();
            }

            let stats = index.stats();
            assert_eq!(stats.open_cursors, 0);
            assert_eq!(stats.bytes_read, total_bytes);
            assert_eq!(stats.records_read, total_bytes / 8);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_cursors_abandoned_midway() {
    run_test(
        create_test_context,
        |ctx| {
            let records = random_records(2_000, 22, EXTENT);
            let index = ctx.build(&records, test_config(8, 8))?;

            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let index = index.clone();
                    thread::spawn(move || {
                        let mut cursors: Vec<_> = (0..10)
                            .map(|_| index.open_cursor(EXTENT).unwrap())
                            .collect();
                        for cursor in cursors.iter_mut() {
                            cursor.next().unwrap();
                        }
                        // half are closed explicitly, the rest on drop
                        for cursor in cursors.iter_mut().step_by(2) {
                            cursor.close();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(index.stats().open_cursors, 0);
            Ok(())
        },
        cleanup,
    )
}
