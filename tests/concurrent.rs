use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use sable::{Config, Gid, PropertyValue, Result, Storage, StorageError, View};

const NUM_THREADS: usize = 8;
const OPERATIONS_PER_THREAD: usize = 50;

#[test]
fn concurrent_writers_exactly_one_wins() -> Result<()> {
    let storage = Arc::new(Storage::open(Config::single_threaded())?);
    let gid = Gid::new(0, 1);
    {
        let setup = storage.access();
        setup.insert_vertex(Some(gid))?;
        setup.commit()?;
    }

    let barrier = Arc::new(Barrier::new(NUM_THREADS));
    let mut handles = Vec::new();
    for i in 0..NUM_THREADS {
        let storage = Arc::clone(&storage);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || -> Result<bool> {
            let tx = storage.access();
            let prop = tx.property("x");
            let vertex = tx.find_vertex(gid, View::New).expect("setup committed");
            // Everyone holds a transaction before anyone writes, so all
            // writers race on the same version.
            barrier.wait();
            match vertex.set_property(prop, PropertyValue::Int(i as i64)) {
                Ok(_) => {
                    tx.commit()?;
                    Ok(true)
                }
                Err(StorageError::Serialization) => {
                    tx.abort()?;
                    Ok(false)
                }
                Err(err) => Err(err),
            }
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.join().unwrap()? {
            winners += 1;
        }
    }
    assert_eq!(winners, 1, "exactly one concurrent writer may commit");
    Ok(())
}

#[test]
fn concurrent_inserts_are_all_visible() -> Result<()> {
    let storage = Arc::new(Storage::open(Config::single_threaded())?);
    let barrier = Arc::new(Barrier::new(NUM_THREADS));
    let mut handles = Vec::new();
    for _ in 0..NUM_THREADS {
        let storage = Arc::clone(&storage);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || -> Result<Vec<Gid>> {
            barrier.wait();
            let mut gids = Vec::new();
            for _ in 0..OPERATIONS_PER_THREAD {
                let tx = storage.access();
                gids.push(tx.insert_vertex(None)?.gid());
                tx.commit()?;
            }
            Ok(gids)
        }));
    }

    let mut all_gids = HashSet::new();
    for handle in handles {
        for gid in handle.join().unwrap()? {
            assert!(all_gids.insert(gid), "gids must never repeat");
        }
    }
    assert_eq!(all_gids.len(), NUM_THREADS * OPERATIONS_PER_THREAD);

    let check = storage.access();
    assert_eq!(
        check.vertices(View::New).len(),
        NUM_THREADS * OPERATIONS_PER_THREAD
    );
    check.commit()?;
    Ok(())
}

#[test]
fn readers_are_stable_while_writers_commit() -> Result<()> {
    let storage = Arc::new(Storage::open(Config::single_threaded())?);
    let gid = Gid::new(0, 1);
    {
        let setup = storage.access();
        let vertex = setup.insert_vertex(Some(gid))?;
        let prop = setup.property("x");
        vertex.set_property(prop, PropertyValue::Int(0))?;
        setup.commit()?;
    }

    let reader = storage.access();
    let prop = reader.property("x");

    let writer_storage = Arc::clone(&storage);
    let writer = thread::spawn(move || -> Result<()> {
        for i in 1..=20i64 {
            let tx = writer_storage.access();
            let prop = tx.property("x");
            let vertex = tx.find_vertex(gid, View::New).unwrap();
            vertex.set_property(prop, PropertyValue::Int(i))?;
            tx.commit()?;
        }
        Ok(())
    });

    // Whatever the writers do, this transaction keeps seeing its snapshot.
    let vertex = reader.find_vertex(gid, View::New).unwrap();
    for _ in 0..50 {
        assert_eq!(vertex.property(prop, View::New)?, PropertyValue::Int(0));
    }
    writer.join().unwrap()?;
    assert_eq!(vertex.property(prop, View::New)?, PropertyValue::Int(0));
    reader.commit()?;

    let check = storage.access();
    let vertex = check.find_vertex(gid, View::New).unwrap();
    assert_eq!(vertex.property(prop, View::New)?, PropertyValue::Int(20));
    check.commit()?;
    Ok(())
}

#[test]
fn garbage_collection_runs_under_load() -> Result<()> {
    let mut config = Config::single_threaded();
    config.gc_interval = Some(std::time::Duration::from_millis(10));
    let storage = Arc::new(Storage::open(config)?);
    let gid = Gid::new(0, 1);
    {
        let setup = storage.access();
        setup.insert_vertex(Some(gid))?;
        setup.commit()?;
    }

    let mut handles = Vec::new();
    for t in 0..4 {
        let storage = Arc::clone(&storage);
        handles.push(thread::spawn(move || -> Result<()> {
            for i in 0..100i64 {
                let tx = storage.access();
                let prop = tx.property("x");
                let vertex = tx.find_vertex(gid, View::New).unwrap();
                match vertex.set_property(prop, PropertyValue::Int(t * 1000 + i)) {
                    Ok(_) => tx.commit()?,
                    Err(StorageError::Serialization) => tx.abort()?,
                    Err(err) => return Err(err),
                }
            }
            Ok(())
        }));
    }
    for handle in handles {
        handle.join().unwrap()?;
    }

    storage.collect_garbage();
    let check = storage.access();
    let vertex = check.find_vertex(gid, View::New).expect("vertex survives GC");
    assert!(matches!(
        vertex.property(check.property("x"), View::New)?,
        PropertyValue::Int(_)
    ));
    check.commit()?;
    Ok(())
}
