//! Durability pipeline: state deltas, the segmented write-ahead log, the
//! hashed snapshot format and startup recovery.

pub(crate) mod encoding;
mod hashed_file;
mod paths;
mod recovery;
mod snapshot;
mod state_delta;
mod wal;

pub use recovery::{recover, RecoveryReport, WalStatus};
pub use snapshot::take_snapshot;
pub use state_delta::StateDelta;
pub use wal::{read_wal_file, Wal, WalFileEnd};

pub(crate) use paths::{ensure_layout, wal_dir};
