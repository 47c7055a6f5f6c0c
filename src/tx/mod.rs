//! Transaction engine: id allocation, active-set tracking, per-transaction
//! command counters, the commit log and global GC snapshots.

mod commit_log;
mod engine;
mod snapshot;
mod transaction;

pub use commit_log::{CommitLog, TxInfo};
pub use engine::{Engine, SingleNodeEngine};
pub use snapshot::Snapshot;
pub use transaction::Transaction;

/// Transaction id. Monotonically increasing, never reused; 0 means "none".
pub type TxId = u64;

/// Per-transaction command id. Strictly increases within a transaction;
/// overflow is a fatal transaction error.
pub type CmdId = u64;

/// The "no transaction" sentinel used in version stamps.
pub const NO_TX: TxId = 0;
