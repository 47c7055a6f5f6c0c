//! The storage façade: concurrent vertex/edge maps keyed by gid, name
//! registries, gid generators, indexes, the transaction engine and the
//! durability pipeline, glued together behind [`Accessor`].

mod accessor;
mod gc;

pub use accessor::{Accessor, EdgeAccessor, VertexAccessor};

use std::path::PathBuf;
use std::sync::atomic::AtomicI64;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use tracing::info;

use crate::config::Config;
use crate::durability::{self, Wal};
use crate::error::{Result, StorageError};
use crate::ids::{Gid, GidGenerator, NameIdMapper};
use crate::index::{LabelIndex, LabelPropertyIndex};
use crate::model::{Edge, Vertex};
use crate::mvcc::VersionList;
use crate::tx::{SingleNodeEngine, TxId};

pub(crate) struct StorageInner {
    pub(crate) config: Config,
    pub(crate) engine: SingleNodeEngine,
    pub(crate) wal: Option<Arc<Wal>>,
    pub(crate) vertices: DashMap<Gid, Arc<VersionList<Vertex>>>,
    pub(crate) edges: DashMap<Gid, Arc<VersionList<Edge>>>,
    pub(crate) labels: NameIdMapper,
    pub(crate) edge_types: NameIdMapper,
    pub(crate) properties: NameIdMapper,
    pub(crate) vertex_generator: GidGenerator,
    pub(crate) edge_generator: GidGenerator,
    pub(crate) label_index: LabelIndex,
    pub(crate) label_property_index: LabelPropertyIndex,
    pub(crate) index_build_in_progress: DashSet<TxId>,
    pub(crate) counters: DashMap<String, AtomicI64>,
}

/// An embedded MVCC property-graph store.
///
/// All reads and writes go through an [`Accessor`] obtained from
/// [`Storage::access`], each bound to one transaction.
pub struct Storage {
    inner: Arc<StorageInner>,
    gc: Mutex<Option<gc::GcHandle>>,
}

impl Storage {
    /// Opens the store. When the configuration carries a durability
    /// directory, existing snapshots and WAL segments are recovered before
    /// the store accepts transactions.
    pub fn open(config: Config) -> Result<Self> {
        let wal = match &config.durability_dir {
            Some(dir) => {
                durability::ensure_layout(dir)?;
                Some(Wal::open(
                    durability::wal_dir(dir),
                    config.sync_on_flush,
                    config.wal_rotate_deltas,
                    config.wal_flush_interval,
                )?)
            }
            None => None,
        };
        let engine = SingleNodeEngine::new(wal.clone());
        let worker_id = config.worker_id;
        let gc_interval = config.gc_interval;
        let inner = Arc::new(StorageInner {
            config,
            engine,
            wal,
            vertices: DashMap::new(),
            edges: DashMap::new(),
            labels: NameIdMapper::new(),
            edge_types: NameIdMapper::new(),
            properties: NameIdMapper::new(),
            vertex_generator: GidGenerator::new(worker_id),
            edge_generator: GidGenerator::new(worker_id),
            label_index: LabelIndex::new(),
            label_property_index: LabelPropertyIndex::new(),
            index_build_in_progress: DashSet::new(),
            counters: DashMap::new(),
        });
        let storage = Self {
            inner,
            gc: Mutex::new(None),
        };

        if let Some(dir) = storage.inner.config.durability_dir.clone() {
            let report = durability::recover(&dir, &storage)?;
            info!(
                snapshot_tx = report.snapshot_tx,
                wal = ?report.wal,
                deltas_applied = report.deltas_applied,
                "recovery finished"
            );
        }
        if let Some(wal) = &storage.inner.wal {
            wal.enable();
        }
        if let Some(interval) = gc_interval {
            *storage.gc.lock() = Some(gc::spawn(Arc::clone(&storage.inner), interval));
        }
        Ok(storage)
    }

    /// Begins a transaction and returns its accessor.
    pub fn access(&self) -> Accessor<'_> {
        Accessor::new(&self.inner)
    }

    /// Writes a snapshot of the currently committed state and prunes
    /// snapshots and WAL segments it makes redundant.
    pub fn snapshot(&self) -> Result<PathBuf> {
        let dir = self
            .inner
            .config
            .durability_dir
            .clone()
            .ok_or_else(|| StorageError::Durability("durability is disabled".into()))?;
        durability::take_snapshot(self, &dir)
    }

    /// One synchronous garbage-collection pass; the background collector
    /// does the same on its own schedule.
    pub fn collect_garbage(&self) {
        gc::run_pass(&self.inner);
    }

    /// Forces queued WAL deltas to disk.
    pub fn flush_wal(&self) -> Result<()> {
        match &self.inner.wal {
            Some(wal) => wal.flush(),
            None => Ok(()),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<StorageInner> {
        &self.inner
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if let Some(handle) = self.gc.lock().take() {
            handle.stop();
        }
        if let Some(wal) = &self.inner.wal {
            let _ = wal.flush();
        }
    }
}
