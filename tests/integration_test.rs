//! End-to-end tests exercising the storage core through its public
//! surface: transactions, the buffer pool, heap files, and operators.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use minirel::access::tuple::{Tuple, TupleDesc};
use minirel::access::value::{DataType, Value};
use minirel::catalog::TableId;
use minirel::concurrency::lock::LockMode;
use minirel::config::DbConfig;
use minirel::database::Database;
use minirel::error::DbError;
use minirel::executor::{Aggregate, AggregateOp, Executor, SeqScan};
use minirel::storage::page::PageId;

const PAGE_SIZE: usize = 256;

fn test_desc() -> Arc<TupleDesc> {
    Arc::new(TupleDesc::new(vec![
        (DataType::Int, "id".into()),
        (DataType::Str(8), "name".into()),
    ]))
}

fn make_tuple(id: i32, name: &str) -> Tuple {
    Tuple::new(test_desc(), vec![Value::Int(id), Value::Str(name.into())]).unwrap()
}

fn setup(pool_pages: usize) -> (TempDir, Arc<Database>, TableId) {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    let db = Database::with_config(DbConfig {
        page_size: PAGE_SIZE,
        buffer_pool_pages: pool_pages,
    });
    let table = db
        .create_table("t", &dir.path().join("t.tbl"), test_desc())
        .unwrap();
    (dir, Arc::new(db), table)
}

fn scan_ids(db: &Database, table: TableId) -> Vec<i32> {
    let txn = db.begin();
    let mut scan = SeqScan::new(
        Arc::clone(db.buffer_pool()),
        db.catalog(),
        txn.id(),
        table,
    )
    .unwrap();
    scan.open().unwrap();
    let mut ids = Vec::new();
    while let Some(tuple) = scan.next().unwrap() {
        match tuple.value(0) {
            Value::Int(i) => ids.push(*i),
            _ => unreachable!(),
        }
    }
    txn.commit().unwrap();
    ids
}

#[test]
fn committed_insert_is_visible_to_later_reader() -> Result<()> {
    let (_dir, db, table) = setup(8);

    let writer = db.begin();
    let mut tuple = make_tuple(1, "hello");
    db.buffer_pool().insert_tuple(writer.id(), table, &mut tuple)?;
    writer.commit()?;

    let reader = db.begin();
    let mut scan = SeqScan::new(
        Arc::clone(db.buffer_pool()),
        db.catalog(),
        reader.id(),
        table,
    )?;
    scan.open()?;
    let found = scan.next()?.expect("committed tuple must be visible");
    assert_eq!(found.value(0), &Value::Int(1));
    assert_eq!(found.value(1), &Value::Str("hello".into()));
    assert!(scan.next()?.is_none());
    reader.commit()?;
    Ok(())
}

#[test]
fn uncommitted_insert_blocks_reader_and_vanishes_on_abort() -> Result<()> {
    let (_dir, db, table) = setup(8);

    // Establish the page with one committed row.
    let seeder = db.begin();
    let mut seed = make_tuple(1, "seed");
    db.buffer_pool().insert_tuple(seeder.id(), table, &mut seed)?;
    seeder.commit()?;

    let writer = db.begin();
    let mut tuple = make_tuple(2, "x");
    db.buffer_pool().insert_tuple(writer.id(), table, &mut tuple)?;
    let pid = tuple.record_id().unwrap().pid;

    // The reader blocks behind the writer's exclusive lock.
    let db2 = Arc::clone(&db);
    let reader = thread::spawn(move || {
        let txn = db2.begin();
        let page = db2
            .buffer_pool()
            .get_page(txn.id(), pid, LockMode::Shared)
            .unwrap();
        let count = page.read().iter().count();
        txn.commit().unwrap();
        count
    });

    thread::sleep(Duration::from_millis(100));
    assert!(!reader.is_finished(), "reader must block on the page lock");

    // Abort unblocks the reader, which sees only the seed row.
    writer.abort()?;
    assert_eq!(reader.join().unwrap(), 1);
    Ok(())
}

#[test]
fn shared_lock_upgrades_when_sole_holder() -> Result<()> {
    let (_dir, db, table) = setup(8);
    let seeder = db.begin();
    let mut seed = make_tuple(1, "seed");
    db.buffer_pool().insert_tuple(seeder.id(), table, &mut seed)?;
    seeder.commit()?;

    let txn = db.begin();
    let pid = PageId::new(db.catalog().file(table)?.table_id(), 0);
    db.buffer_pool().get_page(txn.id(), pid, LockMode::Shared)?;

    // No other transaction holds the page, so the upgrade is immediate,
    // and the insert lands on the now-exclusive page.
    let mut tuple = make_tuple(2, "more");
    db.buffer_pool().insert_tuple(txn.id(), table, &mut tuple)?;
    txn.commit()?;

    assert_eq!(scan_ids(&db, table), vec![1, 2]);
    // Commit forced the page to disk.
    let on_disk = db.catalog().file(table)?.read_page(pid)?;
    assert_eq!(on_disk.iter().count(), 2);
    Ok(())
}

#[test]
fn crossed_writers_produce_exactly_one_deadlock_victim() -> Result<()> {
    let (_dir, db, table) = setup(8);

    // Two committed pages.
    let seeder = db.begin();
    let per_page =
        minirel::storage::page::HeapPage::slots_per_page(PAGE_SIZE, test_desc().tuple_size());
    for i in 0..(per_page + 1) {
        let mut t = make_tuple(i as i32, "seed");
        db.buffer_pool().insert_tuple(seeder.id(), table, &mut t)?;
    }
    seeder.commit()?;
    let file = db.catalog().file(table)?;
    assert_eq!(file.num_pages()?, 2);
    let p1 = PageId::new(file.table_id(), 0);
    let p2 = PageId::new(file.table_id(), 1);

    let barrier = Arc::new(Barrier::new(2));
    let mut handles = Vec::new();
    for (first, second) in [(p1, p2), (p2, p1)] {
        let db = Arc::clone(&db);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            let txn = db.begin();
            db.buffer_pool()
                .get_page(txn.id(), first, LockMode::Exclusive)
                .unwrap();
            barrier.wait();
            let result = db.buffer_pool().get_page(txn.id(), second, LockMode::Exclusive);
            match result {
                Ok(_) => {
                    txn.commit().unwrap();
                    false
                }
                Err(e) => {
                    assert!(e.aborts_transaction(), "unexpected error: {}", e);
                    txn.abort().unwrap();
                    true
                }
            }
        }));
    }

    let aborted: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(
        aborted.iter().filter(|&&a| a).count(),
        1,
        "exactly one transaction observes the deadlock"
    );
    Ok(())
}

#[test]
fn all_dirty_cache_fails_reader_until_commit() -> Result<()> {
    let (_dir, db, table) = setup(2);

    // Three committed pages on disk. Each seeding transaction dirties at
    // most one new page, staying within the two-frame pool.
    let per_page =
        minirel::storage::page::HeapPage::slots_per_page(PAGE_SIZE, test_desc().tuple_size());
    for (chunk, rows) in [per_page, per_page, 1].into_iter().enumerate() {
        let seeder = db.begin();
        for i in 0..rows {
            let mut t = make_tuple((chunk * per_page + i) as i32, "seed");
            db.buffer_pool().insert_tuple(seeder.id(), table, &mut t)?;
        }
        seeder.commit()?;
    }
    let file = db.catalog().file(table)?;
    assert_eq!(file.num_pages()?, 3);

    // A writer dirties pages 0 and 1, filling the two-frame pool. The
    // deleted tuples are resolved purely by record id.
    let writer = db.begin();
    for page_no in 0..2 {
        let mut victim = make_tuple(page_no as i32, "seed");
        victim.set_record_id(Some(minirel::storage::page::RecordId::new(
            PageId::new(file.table_id(), page_no),
            0,
        )));
        db.buffer_pool().delete_tuple(writer.id(), &victim)?;
    }

    // Both cached frames are dirty; a third page cannot be brought in.
    let table_id = file.table_id();
    let db2 = Arc::clone(&db);
    let reader = thread::spawn(move || {
        let txn = db2.begin();
        let result = db2.buffer_pool().get_page(
            txn.id(),
            PageId::new(table_id, 2),
            LockMode::Shared,
        );
        let failed = matches!(result, Err(DbError::NoCleanPage));
        txn.abort().unwrap();
        failed
    });
    assert!(
        reader.join().unwrap(),
        "reader must fail fast when every frame is dirty"
    );

    // After the writer commits, the same read succeeds.
    writer.commit()?;
    let txn = db.begin();
    db.buffer_pool().get_page(
        txn.id(),
        PageId::new(db.catalog().file(table)?.table_id(), 2),
        LockMode::Shared,
    )?;
    txn.commit()?;
    Ok(())
}

#[test]
fn abort_restores_on_disk_byte_image() -> Result<()> {
    let (_dir, db, table) = setup(8);

    // One committed row so page 0 exists on disk.
    let seeder = db.begin();
    let mut seed = make_tuple(0, "seed");
    db.buffer_pool().insert_tuple(seeder.id(), table, &mut seed)?;
    seeder.commit()?;

    let file = db.catalog().file(table)?;
    let pid = PageId::new(file.table_id(), 0);
    let image_before = file.read_page(pid)?.serialize();

    let txn = db.begin();
    for i in 1..=10 {
        let mut t = make_tuple(i, "gone");
        db.buffer_pool().insert_tuple(txn.id(), table, &mut t)?;
    }
    txn.abort()?;

    assert_eq!(scan_ids(&db, table), vec![0]);
    assert_eq!(
        file.read_page(pid)?.serialize(),
        image_before,
        "aborted writes must never reach disk"
    );
    Ok(())
}

#[test]
fn aggregate_over_committed_rows() -> Result<()> {
    let (_dir, db, table) = setup(8);

    let writer = db.begin();
    for (id, name) in [(1, "a"), (2, "a"), (3, "b"), (4, "b"), (5, "b")] {
        let mut t = make_tuple(id, name);
        db.buffer_pool().insert_tuple(writer.id(), table, &mut t)?;
    }
    writer.commit()?;

    let txn = db.begin();
    let scan = SeqScan::new(
        Arc::clone(db.buffer_pool()),
        db.catalog(),
        txn.id(),
        table,
    )?;
    let mut agg = Aggregate::new(Box::new(scan), AggregateOp::Count, 0, Some(1))?;
    agg.open()?;

    let mut counts = Vec::new();
    while let Some(row) = agg.next()? {
        counts.push((row.value(0).clone(), row.value(1).clone()));
    }
    assert_eq!(
        counts,
        vec![
            (Value::Str("a".into()), Value::Int(2)),
            (Value::Str("b".into()), Value::Int(3)),
        ]
    );
    txn.commit()?;
    Ok(())
}

/// Concurrent writers each insert distinct rows; after all commit, every
/// row is present exactly once and no locks or waiters are left behind.
#[test]
fn concurrent_writers_all_commit() -> Result<()> {
    use rand::Rng;

    let (_dir, db, table) = setup(16);
    let threads = 4;
    let rows_per_thread = 20;

    let barrier = Arc::new(Barrier::new(threads));
    let mut handles = Vec::new();
    for t in 0..threads {
        let db = Arc::clone(&db);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            barrier.wait();
            let mut inserted = Vec::new();
            for i in 0..rows_per_thread {
                let id = (t * rows_per_thread + i) as i32;
                loop {
                    let txn = db.begin();
                    let mut tuple = make_tuple(id, "w");
                    match db.buffer_pool().insert_tuple(txn.id(), table, &mut tuple) {
                        Ok(()) => {
                            txn.commit().unwrap();
                            inserted.push(id);
                            break;
                        }
                        Err(e) if e.aborts_transaction() => {
                            // Deadlock victim: roll back and retry.
                            txn.abort().unwrap();
                            thread::sleep(Duration::from_millis(rng.gen_range(1..10)));
                        }
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            }
            inserted
        }));
    }

    let mut all: Vec<i32> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort();

    let mut seen = scan_ids(&db, table);
    seen.sort();
    assert_eq!(seen, all);
    assert_eq!(seen.len(), threads * rows_per_thread);
    Ok(())
}
