use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::tx::TxId;

pub const SNAPSHOT_DIR: &str = "snapshots";
pub const WAL_DIR: &str = "wal";
/// The active, not yet sealed WAL segment.
pub const CURRENT_WAL: &str = "current.wal";

const SNAPSHOT_SUFFIX: &str = ".snapshot";
const WAL_SUFFIX: &str = ".wal";

pub fn snapshot_dir(root: &Path) -> PathBuf {
    root.join(SNAPSHOT_DIR)
}

pub fn wal_dir(root: &Path) -> PathBuf {
    root.join(WAL_DIR)
}

pub fn ensure_layout(root: &Path) -> Result<()> {
    fs::create_dir_all(snapshot_dir(root))?;
    fs::create_dir_all(wal_dir(root))?;
    Ok(())
}

/// Zero-padded so that lexicographic order is chronological order.
pub fn snapshot_filename(tx_id: TxId) -> String {
    format!("{tx_id:020}{SNAPSHOT_SUFFIX}")
}

/// Sealed WAL segments carry the largest transaction id they contain.
pub fn wal_filename(max_tx: TxId) -> String {
    format!("{max_tx:020}{WAL_SUFFIX}")
}

pub fn tx_id_from_snapshot_filename(name: &str) -> Option<TxId> {
    name.strip_suffix(SNAPSHOT_SUFFIX)?.parse().ok()
}

pub fn max_tx_from_wal_filename(name: &str) -> Option<TxId> {
    if name == CURRENT_WAL {
        return None;
    }
    name.strip_suffix(WAL_SUFFIX)?.parse().ok()
}

/// Files in `dir` with the given parser applied, sorted by filename.
pub fn sorted_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_round_trip_and_sort() {
        let a = wal_filename(9);
        let b = wal_filename(123);
        assert!(a < b);
        assert_eq!(max_tx_from_wal_filename(&b), Some(123));
        assert_eq!(max_tx_from_wal_filename(CURRENT_WAL), None);
        assert_eq!(
            tx_id_from_snapshot_filename(&snapshot_filename(7)),
            Some(7)
        );
    }
}
