use quadtree_index::{BoundingBox, ByteOrder, SpatialResult};
use quadtree_int_test::test_util::{cleanup, create_test_context, random_queries, random_records, test_config};

fn main() -> SpatialResult<()> {
    colog::init();
    println!("Starting stress test...");
    let ctx = create_test_context()?;

    let count = 1_000_000;
    let extent = BoundingBox::new(-180.0, -90.0, 180.0, 90.0);
    let records = random_records(count, 2024, extent);

    let start = std::time::Instant::now();
    let index = ctx.build(&records, test_config(16, 32))?;
    println!("Indexed {} records in {:?}", count, start.elapsed());
    let stats = index.stats();
    println!(
        "Tree has {} nodes ({} leaves), depth {}",
        stats.node_count, stats.leaf_count, stats.tree_depth
    );
    drop(index);

    let start = std::time::Instant::now();
    let index = ctx.open(ByteOrder::Big)?;
    println!("Opened index in {:?}", start.elapsed());

    let start = std::time::Instant::now();
    let mut hits = 0;
    let mut bytes = 0;
    for query in random_queries(1_000, 7, extent) {
        let mut cursor = index.open_cursor(query)?;
        while let Some((_, payload)) = cursor.next_record()? {
            hits += 1;
            bytes += payload.len();
        }
    }
    println!("Read {} records ({} bytes) for 1000 queries in {:?}", hits, bytes, start.elapsed());

    let start = std::time::Instant::now();
    let report = index.check_integrity(true)?;
    println!(
        "Integrity check of {} entries in {:?}: valid={}",
        report.entries_checked,
        start.elapsed(),
        report.is_valid
    );

    drop(index);
    cleanup(ctx)
}
