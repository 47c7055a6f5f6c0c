//! Snapshot writer: the full committed graph in one hashed file, plus the
//! retention pass that prunes snapshots and WAL segments it covers.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::Result;
use crate::mvcc::View;
use crate::storage::Storage;
use crate::tx::TxId;

use super::encoding::{
    write_edge, write_i64, write_string, write_u32, write_u64, write_vertex, DecodedEdge,
    DecodedVertex,
};
use super::hashed_file::HashedFileWriter;
use super::paths;

pub(crate) const MAGIC: [u8; 4] = *b"SBLS";
pub(crate) const VERSION: i64 = 1;

/// Writes a snapshot under a fresh transaction and commits it. Returns the
/// snapshot file path.
///
/// Layout: MAGIC ‖ VERSION ‖ generator high-water marks ‖ snapshotter tx id
/// ‖ its snapshot set ‖ index keys (label/property interleaved) ‖ vertices
/// ‖ edges ‖ (vertex_count, edge_count, hash). The hash covers everything
/// before it, the trailing counts included.
pub fn take_snapshot(storage: &Storage, dir: &Path) -> Result<PathBuf> {
    paths::ensure_layout(dir)?;
    let inner = storage.inner();
    let accessor = storage.access();
    let tx_id = accessor.transaction_id();

    let path = paths::snapshot_dir(dir).join(paths::snapshot_filename(tx_id));
    let mut writer = HashedFileWriter::create(&path)?;
    let mut buf = Vec::new();

    buf.extend_from_slice(&MAGIC);
    write_i64(&mut buf, VERSION);
    write_u64(&mut buf, inner.vertex_generator.high_water());
    write_u64(&mut buf, inner.edge_generator.high_water());
    write_i64(&mut buf, tx_id as i64);

    let snapshot_set: Vec<TxId> = accessor_snapshot(storage, tx_id);
    write_u32(&mut buf, snapshot_set.len() as u32);
    for id in &snapshot_set {
        write_i64(&mut buf, *id as i64);
    }

    let index_keys = inner.label_property_index.keys();
    write_u32(&mut buf, (index_keys.len() * 2) as u32);
    for key in &index_keys {
        write_string(&mut buf, &inner.labels.id_to_name(key.label));
        write_string(&mut buf, &inner.properties.id_to_name(key.property));
    }
    writer.write_hashed(&buf)?;

    let mut vertex_count = 0i64;
    for vertex in accessor.vertices(View::Old) {
        let record = DecodedVertex {
            gid: vertex.gid(),
            labels: vertex
                .labels(View::Old)?
                .into_iter()
                .map(|label| inner.labels.id_to_name(label))
                .collect(),
            properties: vertex
                .properties(View::Old)?
                .into_iter()
                .map(|(key, value)| (inner.properties.id_to_name(key), value))
                .collect(),
        };
        buf.clear();
        write_vertex(&mut buf, &record);
        writer.write_hashed(&buf)?;
        vertex_count += 1;
    }

    let mut edge_count = 0i64;
    for edge in accessor.edges(View::Old) {
        let from = edge.from(View::Old)?.gid();
        let to = edge.to(View::Old)?.gid();
        let record = DecodedEdge {
            gid: edge.gid(),
            from,
            to,
            edge_type: inner.edge_types.id_to_name(edge.edge_type(View::Old)?),
            properties: edge
                .properties(View::Old)?
                .into_iter()
                .map(|(key, value)| (inner.properties.id_to_name(key), value))
                .collect(),
        };
        buf.clear();
        write_edge(&mut buf, &record);
        writer.write_hashed(&buf)?;
        edge_count += 1;
    }

    buf.clear();
    write_i64(&mut buf, vertex_count);
    write_i64(&mut buf, edge_count);
    writer.write_hashed(&buf)?;
    let hash = writer.hash();
    writer.write_raw(&hash.to_be_bytes())?;
    writer.finish()?;
    accessor.commit()?;
    info!(
        path = %path.display(),
        vertices = vertex_count,
        edges = edge_count,
        "snapshot written"
    );

    prune_snapshots(dir, inner.config.snapshot_retention_count)?;
    if let Some(wal) = &inner.wal {
        let first_needed = match snapshot_set.first() {
            Some(front) => *front,
            None => tx_id + 1,
        };
        wal.prune_finalized(first_needed)?;
    }
    Ok(path)
}

/// The snapshotting transaction's own snapshot set, needed by recovery to
/// decide which WAL transactions the snapshot already covers.
fn accessor_snapshot(storage: &Storage, tx_id: TxId) -> Vec<TxId> {
    use crate::tx::Engine;
    let mut ids = Vec::new();
    storage.inner().engine.for_each_active(&mut |tx| {
        if tx.id() == tx_id {
            ids.extend(tx.snapshot().iter());
        }
    });
    ids
}

fn prune_snapshots(dir: &Path, keep: usize) -> Result<()> {
    let files = paths::sorted_files(&paths::snapshot_dir(dir))?;
    if files.len() <= keep.max(1) {
        return Ok(());
    }
    let excess = files.len() - keep.max(1);
    for path in files.into_iter().take(excess) {
        debug!(path = %path.display(), "pruning old snapshot");
        fs::remove_file(&path)?;
    }
    Ok(())
}

/// Encoding and hashing are shared with the WAL codec; decode lives in
/// `recovery`.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn snapshot_file_is_written_and_pruned() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut config = Config::durable(dir.path());
        config.gc_interval = None;
        config.snapshot_retention_count = 2;
        let storage = Storage::open(config)?;
        {
            let accessor = storage.access();
            let v = accessor.insert_vertex(None)?;
            let person = accessor.label("Person");
            v.add_label(person)?;
            accessor.commit()?;
        }
        let first = storage.snapshot()?;
        let second = storage.snapshot()?;
        let third = storage.snapshot()?;
        assert!(!first.exists());
        assert!(second.exists() && third.exists());
        Ok(())
    }
}
