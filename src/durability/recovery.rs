//! Startup recovery: replay the newest valid snapshot, then the WAL
//! segments, then rebuild indexes.
//!
//! Recovery is strict on snapshots (the full hash must validate, otherwise
//! the next older one is tried) and lenient on the WAL (a truncated or
//! corrupt tail ends replay without failing it).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{info, warn};

use crate::error::{Result, StorageError};
use crate::mvcc::View;
use crate::storage::{Accessor, Storage};
use crate::tx::TxId;

use super::encoding::{read_edge, read_i64, read_string, read_u32, read_u64, read_vertex};
use super::hashed_file::{read_summary, HashedFileReader};
use super::paths;
use super::snapshot::{MAGIC, VERSION};
use super::state_delta::StateDelta;
use super::wal::{read_wal_file, WalFileEnd};

/// How much of the WAL could be replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalStatus {
    /// Every segment read back completely.
    Fully,
    /// Replay ended at a truncated or unreadable tail.
    Partial,
    /// There was no WAL to replay.
    Nothing,
}

#[derive(Debug)]
pub struct RecoveryReport {
    /// Transaction id of the recovered snapshot, if one validated.
    pub snapshot_tx: Option<TxId>,
    pub wal: WalStatus,
    pub deltas_applied: u64,
}

#[derive(Debug, Default)]
struct RecoveryData {
    snapshotter_tx_id: TxId,
    snapshotter_snapshot: Vec<TxId>,
    /// (label, property) indexes to rebuild after replay.
    indexes: Vec<(String, String)>,
}

impl RecoveryData {
    fn clear(&mut self) {
        self.snapshotter_tx_id = 0;
        self.snapshotter_snapshot.clear();
        self.indexes.clear();
    }
}

pub fn recover(dir: &Path, storage: &Storage) -> Result<RecoveryReport> {
    let mut data = RecoveryData::default();

    let mut snapshot_files = paths::sorted_files(&paths::snapshot_dir(dir))?;
    snapshot_files.reverse();
    let mut snapshot_tx = None;
    for file in snapshot_files {
        info!(path = %file.display(), "starting snapshot recovery");
        match recover_snapshot(&file, storage, &mut data) {
            Ok(()) => {
                info!("snapshot recovery successful");
                snapshot_tx = Some(data.snapshotter_tx_id);
                break;
            }
            Err(err) => {
                warn!(error = %err, "snapshot recovery failed, trying older snapshot");
                data.clear();
                // Aborted partial replay leaves only invisible versions;
                // collect them so an older snapshot can reuse the gids.
                storage.collect_garbage();
            }
        }
    }

    let (wal_status, deltas_applied, max_tx_seen) = recover_wal(dir, storage, &mut data)?;

    // Index rebuild under one final accessor.
    let mut seen = HashSet::new();
    let accessor = storage.access();
    for (label, property) in &data.indexes {
        if !seen.insert((label.clone(), property.clone())) {
            continue;
        }
        let label_id = accessor.label(label);
        let property_id = accessor.property(property);
        match accessor.build_index(label_id, property_id) {
            Ok(()) | Err(StorageError::IndexExists) => {}
            Err(err) => return Err(err),
        }
    }
    accessor.commit()?;

    storage
        .inner()
        .engine
        .ensure_next_tx_id(max_tx_seen.max(data.snapshotter_tx_id) + 1);

    Ok(RecoveryReport {
        snapshot_tx,
        wal: wal_status,
        deltas_applied,
    })
}

fn recover_snapshot(file: &Path, storage: &Storage, data: &mut RecoveryData) -> Result<()> {
    let (vertex_count, edge_count, expected_hash) = read_summary(file)?;
    if vertex_count < 0 || edge_count < 0 {
        return Err(StorageError::Corruption("negative snapshot counts".into()));
    }
    let mut reader = HashedFileReader::open(file)?;

    let mut magic = [0u8; 4];
    reader.read_hashed(&mut magic)?;
    if magic != MAGIC {
        return Err(StorageError::Corruption("bad snapshot magic".into()));
    }
    if read_i64(&mut reader)? != VERSION {
        return Err(StorageError::Corruption("unsupported snapshot version".into()));
    }

    let inner = storage.inner();
    let vertex_high = read_u64(&mut reader)?;
    let edge_high = read_u64(&mut reader)?;
    inner.vertex_generator.set_floor(vertex_high);
    inner.edge_generator.set_floor(edge_high);

    data.snapshotter_tx_id = read_i64(&mut reader)? as TxId;
    let snapshot_len = read_u32(&mut reader)?;
    for _ in 0..snapshot_len {
        data.snapshotter_snapshot.push(read_i64(&mut reader)? as TxId);
    }

    let index_len = read_u32(&mut reader)?;
    if index_len % 2 != 0 {
        return Err(StorageError::Durability("odd index name count".into()));
    }
    for _ in 0..index_len / 2 {
        let label = read_string(&mut reader)?;
        let property = read_string(&mut reader)?;
        data.indexes.push((label, property));
    }

    let accessor = storage.access();
    for _ in 0..vertex_count {
        let decoded = read_vertex(&mut reader)?;
        let vertex = accessor.insert_vertex(Some(decoded.gid))?;
        for label in &decoded.labels {
            vertex.add_label(accessor.label(label))?;
        }
        for (key, value) in decoded.properties {
            vertex.set_property(accessor.property(&key), value)?;
        }
    }
    for _ in 0..edge_count {
        let decoded = read_edge(&mut reader)?;
        let from = accessor
            .find_vertex(decoded.from, View::New)
            .ok_or_else(|| StorageError::Durability("edge endpoint missing in snapshot".into()))?;
        let to = accessor
            .find_vertex(decoded.to, View::New)
            .ok_or_else(|| StorageError::Durability("edge endpoint missing in snapshot".into()))?;
        let edge = accessor.insert_edge(
            &from,
            &to,
            accessor.edge_type(&decoded.edge_type),
            Some(decoded.gid),
        )?;
        for (key, value) in decoded.properties {
            edge.set_property(accessor.property(&key), value)?;
        }
    }

    // The trailing counts are part of the hash; read them back through the
    // hashing reader before comparing.
    let stored_vertex_count = read_i64(&mut reader)?;
    let stored_edge_count = read_i64(&mut reader)?;
    if stored_vertex_count != vertex_count || stored_edge_count != edge_count {
        return Err(StorageError::Corruption("snapshot summary mismatch".into()));
    }
    if reader.hash() != expected_hash {
        return Err(StorageError::Corruption("snapshot hash mismatch".into()));
    }
    accessor.commit()?;
    Ok(())
}

fn recover_wal(
    dir: &Path,
    storage: &Storage,
    data: &mut RecoveryData,
) -> Result<(WalStatus, u64, TxId)> {
    let files = paths::sorted_files(&paths::wal_dir(dir))?;
    if files.is_empty() {
        return Ok((WalStatus::Nothing, 0, 0));
    }

    let first_to_recover = if data.snapshotter_snapshot.is_empty() {
        data.snapshotter_tx_id + 1
    } else {
        *data
            .snapshotter_snapshot
            .iter()
            .min()
            .expect("snapshot set not empty")
    };
    let snapshotter_tx_id = data.snapshotter_tx_id;
    let snapshot_set = data.snapshotter_snapshot.clone();
    let should_skip = |tx: TxId| {
        tx < first_to_recover || (tx < snapshotter_tx_id && !snapshot_set.contains(&tx))
    };

    let mut status = WalStatus::Fully;
    let mut applied = 0u64;
    let mut max_tx_seen: TxId = 0;
    let mut accessors: HashMap<TxId, Accessor<'_>> = HashMap::new();

    for file in files {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_owned();
        if let Some(max_tx) = paths::max_tx_from_wal_filename(&name) {
            if max_tx < first_to_recover {
                continue;
            }
        }
        let (deltas, end) = match read_wal_file(&file) {
            Ok(result) => result,
            Err(err) => {
                warn!(file = name, error = %err, "unreadable WAL segment, stopping replay");
                status = WalStatus::Partial;
                break;
            }
        };
        if end == WalFileEnd::Truncated {
            warn!(file = name, "WAL segment has a truncated tail");
            status = WalStatus::Partial;
        }
        for delta in deltas {
            max_tx_seen = max_tx_seen.max(delta.tx());
            if should_skip(delta.tx()) {
                continue;
            }
            match delta {
                StateDelta::TxBegin { tx } => {
                    let previous = accessors.insert(tx, storage.access());
                    assert!(previous.is_none(), "double transaction begin in WAL: {tx}");
                }
                StateDelta::TxCommit { tx } => {
                    replay_accessor(&mut accessors, tx).commit()?;
                    accessors.remove(&tx);
                }
                StateDelta::TxAbort { tx } => {
                    replay_accessor(&mut accessors, tx).abort()?;
                    accessors.remove(&tx);
                }
                StateDelta::BuildIndex {
                    label, property, ..
                } => {
                    data.indexes.push((label, property));
                }
                delta => {
                    let accessor = replay_accessor(&mut accessors, delta.tx());
                    match delta.apply(accessor) {
                        Ok(()) => applied += 1,
                        Err(err) => {
                            warn!(error = %err, tx = delta.tx(), "skipping unreplayable delta");
                            status = WalStatus::Partial;
                        }
                    }
                }
            }
        }
    }

    // Transactions with no terminal delta in the log stay uncommitted.
    for (_, accessor) in accessors.drain() {
        let _ = accessor.abort();
    }
    Ok((status, applied, max_tx_seen))
}

fn replay_accessor<'a, 's>(
    accessors: &'a mut HashMap<TxId, Accessor<'s>>,
    tx: TxId,
) -> &'a Accessor<'s> {
    accessors
        .get(&tx)
        .unwrap_or_else(|| panic!("accessor does not exist for transaction {tx}"))
}
