use std::path::PathBuf;
use std::time::Duration;

/// Engine-wide configuration, constructed once at startup and threaded
/// through explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for durability files (`<dir>/snapshots`, `<dir>/wal`).
    /// `None` disables durability entirely.
    pub durability_dir: Option<PathBuf>,
    /// Worker id packed into the high bits of every generated gid.
    pub worker_id: u16,
    /// How often the WAL flusher drains the delta queue to disk.
    pub wal_flush_interval: Duration,
    /// Number of deltas after which the active WAL segment is sealed.
    pub wal_rotate_deltas: usize,
    /// fsync the WAL file on every flush.
    pub sync_on_flush: bool,
    /// Number of snapshot files kept after a successful snapshot.
    pub snapshot_retention_count: usize,
    /// Interval between garbage collection passes. `None` disables the
    /// background collector.
    pub gc_interval: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            durability_dir: None,
            worker_id: 0,
            wal_flush_interval: Duration::from_millis(20),
            wal_rotate_deltas: 100_000,
            sync_on_flush: true,
            snapshot_retention_count: 3,
            gc_interval: Some(Duration::from_millis(500)),
        }
    }
}

impl Config {
    /// Fully in-memory configuration: no durability, background GC on.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Durable configuration rooted at `dir`.
    pub fn durable(dir: impl Into<PathBuf>) -> Self {
        Self {
            durability_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Configuration for deterministic tests: durability optional, no
    /// background threads waking up mid-assertion.
    pub fn single_threaded() -> Self {
        Self {
            gc_interval: None,
            wal_flush_interval: Duration::from_millis(5),
            ..Self::default()
        }
    }
}
