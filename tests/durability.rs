use std::fs;
use std::path::Path;

use sable::{Config, Gid, PropertyValue, Result, Storage, View};

fn durable_config(dir: &Path) -> Config {
    let mut config = Config::durable(dir);
    config.gc_interval = None;
    config
}

#[test]
fn crash_recovery_keeps_committed_drops_uncommitted() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (v1, v2, v3) = (Gid::new(0, 1), Gid::new(0, 2), Gid::new(0, 3));
    {
        let storage = Storage::open(durable_config(dir.path()))?;
        {
            let tx = storage.access();
            tx.insert_vertex(Some(v1))?;
            tx.commit()?;
        }
        {
            let tx = storage.access();
            tx.insert_vertex(Some(v2))?;
            tx.commit()?;
        }
        {
            let tx = storage.access();
            let vertex = tx.insert_vertex(Some(v3))?;
            let prop = tx.property("x");
            vertex.set_property(prop, PropertyValue::Int(3))?;
            // Simulate a crash: the transaction never commits nor aborts,
            // but its data deltas reach the log.
            std::mem::forget(tx);
        }
        storage.flush_wal()?;
        // Dropping the storage stands in for the process dying; the WAL
        // already holds everything that was flushed.
    }

    let storage = Storage::open(durable_config(dir.path()))?;
    let tx = storage.access();
    assert!(tx.find_vertex(v1, View::New).is_some());
    assert!(tx.find_vertex(v2, View::New).is_some());
    assert!(tx.find_vertex(v3, View::New).is_none());

    // Generators resume past every recovered gid.
    let fresh = tx.insert_vertex(None)?;
    assert!(fresh.gid().local() > v3.local());
    tx.commit()?;
    Ok(())
}

#[test]
fn snapshot_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let vertex_count = 5u64;
    {
        let storage = Storage::open(durable_config(dir.path()))?;
        {
            let tx = storage.access();
            let person = tx.label("Person");
            let age = tx.property("age");
            let knows = tx.edge_type("KNOWS");
            let mut vertices = Vec::new();
            for i in 0..vertex_count {
                let vertex = tx.insert_vertex(None)?;
                vertex.add_label(person)?;
                vertex.set_property(age, PropertyValue::Int(i as i64))?;
                vertices.push(vertex);
            }
            for pair in vertices.windows(2) {
                let edge = tx.insert_edge(&pair[0], &pair[1], knows, None)?;
                edge.set_property(tx.property("weight"), PropertyValue::Double(0.5))?;
            }
            tx.commit()?;
        }
        {
            let tx = storage.access();
            let person = tx.label("Person");
            let age = tx.property("age");
            tx.build_index(person, age)?;
            tx.commit()?;
        }
        storage.snapshot()?;
    }

    let storage = Storage::open(durable_config(dir.path()))?;
    let tx = storage.access();
    let person = tx.label("Person");
    let age = tx.property("age");
    assert_eq!(tx.vertices(View::New).len() as u64, vertex_count);
    assert_eq!(tx.edges(View::New).len() as u64, vertex_count - 1);
    for i in 0..vertex_count {
        let found = tx.vertices_with_label_property(
            person,
            age,
            &PropertyValue::Int(i as i64),
            View::New,
        );
        assert_eq!(found.len(), 1, "age {i} must be found through the index");
        assert!(found[0].has_label(person, View::New)?);
    }
    for edge in tx.edges(View::New) {
        assert_eq!(
            edge.property(tx.property("weight"), View::New)?,
            PropertyValue::Double(0.5)
        );
    }
    assert!(tx.index_info().contains(&":Person(age)".to_owned()));
    assert_eq!(tx.vertices_count_with_label_property(person, age), vertex_count);
    tx.commit()?;
    Ok(())
}

#[test]
fn partial_wal_tail_is_tolerated() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (v1, v2) = (Gid::new(0, 1), Gid::new(0, 2));
    {
        let storage = Storage::open(durable_config(dir.path()))?;
        {
            let tx = storage.access();
            tx.insert_vertex(Some(v1))?;
            tx.commit()?;
        }
        {
            let tx = storage.access();
            tx.insert_vertex(Some(v2))?;
            tx.commit()?;
        }
        storage.flush_wal()?;
    }

    // Chop bytes off the log tail; the last commit frame is destroyed.
    let wal_path = dir.path().join("wal").join("current.wal");
    let data = fs::read(&wal_path)?;
    fs::write(&wal_path, &data[..data.len() - 4])?;

    let storage = Storage::open(durable_config(dir.path()))?;
    let tx = storage.access();
    assert!(tx.find_vertex(v1, View::New).is_some());
    assert!(tx.find_vertex(v2, View::New).is_none());
    tx.commit()?;
    Ok(())
}

#[test]
fn corrupt_snapshot_falls_back_to_older_one() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (v1, v2) = (Gid::new(0, 1), Gid::new(0, 2));
    {
        let storage = Storage::open(durable_config(dir.path()))?;
        {
            let tx = storage.access();
            tx.insert_vertex(Some(v1))?;
            tx.commit()?;
        }
        storage.snapshot()?;
        {
            let tx = storage.access();
            tx.insert_vertex(Some(v2))?;
            tx.commit()?;
        }
        let second = storage.snapshot()?;
        storage.flush_wal()?;

        // Flip a byte in the middle of the newest snapshot.
        let mut bytes = fs::read(&second)?;
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0xff;
        fs::write(&second, bytes)?;
    }

    // The newest snapshot fails its hash; the older one plus the WAL still
    // reconstruct the full graph.
    let storage = Storage::open(durable_config(dir.path()))?;
    let tx = storage.access();
    assert!(tx.find_vertex(v1, View::New).is_some());
    assert!(tx.find_vertex(v2, View::New).is_some());
    tx.commit()?;
    Ok(())
}

#[test]
fn restart_twice_is_stable() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let gid = Gid::new(0, 1);
    {
        let storage = Storage::open(durable_config(dir.path()))?;
        let tx = storage.access();
        let vertex = tx.insert_vertex(Some(gid))?;
        let label = tx.label("A");
        vertex.add_label(label)?;
        tx.commit()?;
        storage.flush_wal()?;
    }
    for _ in 0..2 {
        let storage = Storage::open(durable_config(dir.path()))?;
        let tx = storage.access();
        let vertex = tx.find_vertex(gid, View::New).expect("vertex survives restarts");
        let label = tx.label("A");
        assert!(vertex.has_label(label, View::New)?);
        assert_eq!(tx.vertices_count(), 1);
        tx.commit()?;
        storage.flush_wal()?;
    }
    Ok(())
}

#[test]
fn aborted_transactions_do_not_recover() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let gid = Gid::new(0, 7);
    {
        let storage = Storage::open(durable_config(dir.path()))?;
        {
            let tx = storage.access();
            tx.insert_vertex(Some(gid))?;
            tx.abort()?;
        }
        storage.flush_wal()?;
    }
    let storage = Storage::open(durable_config(dir.path()))?;
    let tx = storage.access();
    assert!(tx.find_vertex(gid, View::New).is_none());
    tx.commit()?;
    Ok(())
}
