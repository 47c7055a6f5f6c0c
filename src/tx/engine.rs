use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::durability::{StateDelta, Wal};
use crate::error::Result;

use super::{CmdId, CommitLog, Snapshot, Transaction, TxId, TxInfo};

/// The transaction engine seam. Single-node deployments use
/// [`SingleNodeEngine`]; a distributed variant would delegate these calls to
/// a remote engine over RPC while leaving the local code path unchanged.
pub trait Engine: Send + Sync {
    /// Starts a transaction. The returned object is owned by the engine
    /// until it commits or aborts.
    fn begin(&self) -> Arc<Transaction>;

    /// Advances the command counter of an active transaction and returns
    /// the new command id.
    fn advance(&self, tx_id: TxId) -> Result<CmdId>;

    /// Returns the current command id of an active transaction.
    fn update_command(&self, tx_id: TxId) -> Result<CmdId>;

    fn commit(&self, tx: &Transaction);

    fn abort(&self, tx: &Transaction);

    fn info(&self, tx_id: TxId) -> TxInfo;

    /// Ids of all currently active transactions.
    fn global_active_transactions(&self) -> Snapshot;

    fn global_is_active(&self, tx_id: TxId) -> bool;

    /// The snapshot below which no current or future reader can see a
    /// version: the oldest active transaction's own snapshot plus that
    /// transaction, or `{counter + 1}` when nothing is active.
    fn global_gc_snapshot(&self) -> Snapshot;

    /// The last transaction id issued.
    fn local_last(&self) -> TxId;

    fn for_each_active(&self, f: &mut dyn FnMut(&Transaction));

    /// Registers a callback invoked (outside the engine lock) whenever a
    /// transaction reaches a terminal state.
    fn register_listener(&self, listener: Box<dyn Fn(TxId) + Send + Sync>);
}

struct EngineInner {
    active: Snapshot,
    store: HashMap<TxId, Arc<Transaction>>,
}

/// Complete single-node transaction engine.
///
/// One short lock protects the id counter, the active set, the transaction
/// store, commit-log writes and the WAL append for begin/commit/abort
/// deltas, so the ordering of those deltas in the log is always a legal
/// serialization. No user code runs under the lock.
pub struct SingleNodeEngine {
    counter: AtomicU64,
    clog: Arc<CommitLog>,
    inner: Mutex<EngineInner>,
    wal: Option<Arc<Wal>>,
    listeners: RwLock<Vec<Box<dyn Fn(TxId) + Send + Sync>>>,
}

impl SingleNodeEngine {
    /// With a WAL, the engine writes `TxBegin`/`TxCommit`/`TxAbort` deltas
    /// atomically with the active-set update.
    pub fn new(wal: Option<Arc<Wal>>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            clog: Arc::new(CommitLog::new()),
            inner: Mutex::new(EngineInner {
                active: Snapshot::new(),
                store: HashMap::new(),
            }),
            wal,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// The commit log, shared read-only with the visibility layer.
    pub fn clog(&self) -> &Arc<CommitLog> {
        &self.clog
    }

    /// Raises the id counter so the next transaction id is at least
    /// `floor`. Used after recovery to keep ids monotonic across restarts.
    pub fn ensure_next_tx_id(&self, floor: TxId) {
        self.counter.fetch_max(floor.saturating_sub(1), Ordering::AcqRel);
    }

    fn notify_listeners(&self, tx_id: TxId) {
        for listener in self.listeners.read().iter() {
            listener(tx_id);
        }
    }

    fn with_active<R>(&self, tx_id: TxId, f: impl FnOnce(&Transaction) -> R) -> R {
        let inner = self.inner.lock();
        let tx = inner
            .store
            .get(&tx_id)
            .unwrap_or_else(|| panic!("operation on a transaction the engine does not own: {tx_id}"));
        f(tx)
    }
}

impl Engine for SingleNodeEngine {
    fn begin(&self) -> Arc<Transaction> {
        let mut inner = self.inner.lock();
        let id = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
        let tx = Arc::new(Transaction::new(id, inner.active.clone()));
        inner.active.insert(id);
        inner.store.insert(id, Arc::clone(&tx));
        if let Some(wal) = &self.wal {
            wal.emplace(StateDelta::TxBegin { tx: id });
        }
        drop(inner);
        debug!(tx_id = id, "transaction began");
        tx
    }

    fn advance(&self, tx_id: TxId) -> Result<CmdId> {
        self.with_active(tx_id, |tx| tx.advance())
    }

    fn update_command(&self, tx_id: TxId) -> Result<CmdId> {
        Ok(self.with_active(tx_id, |tx| tx.cmd()))
    }

    fn commit(&self, tx: &Transaction) {
        let tx_id = tx.id();
        {
            let mut inner = self.inner.lock();
            self.clog.set_committed(tx_id);
            inner.active.remove(tx_id);
            if let Some(wal) = &self.wal {
                wal.emplace(StateDelta::TxCommit { tx: tx_id });
            }
            inner.store.remove(&tx_id);
        }
        debug!(tx_id, "transaction committed");
        self.notify_listeners(tx_id);
    }

    fn abort(&self, tx: &Transaction) {
        let tx_id = tx.id();
        {
            let mut inner = self.inner.lock();
            self.clog.set_aborted(tx_id);
            inner.active.remove(tx_id);
            if let Some(wal) = &self.wal {
                wal.emplace(StateDelta::TxAbort { tx: tx_id });
            }
            inner.store.remove(&tx_id);
        }
        debug!(tx_id, "transaction aborted");
        self.notify_listeners(tx_id);
    }

    fn info(&self, tx_id: TxId) -> TxInfo {
        self.clog.info(tx_id)
    }

    fn global_active_transactions(&self) -> Snapshot {
        self.inner.lock().active.clone()
    }

    fn global_is_active(&self, tx_id: TxId) -> bool {
        self.clog.info(tx_id).is_active() && tx_id <= self.local_last()
    }

    fn global_gc_snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        match inner.active.front() {
            None => {
                let mut snapshot = inner.active.clone();
                snapshot.insert(self.counter.load(Ordering::Acquire) + 1);
                snapshot
            }
            Some(oldest) => {
                let tx = inner
                    .store
                    .get(&oldest)
                    .expect("oldest active transaction must be in the store");
                let mut snapshot = tx.snapshot().clone();
                snapshot.insert(oldest);
                snapshot
            }
        }
    }

    fn local_last(&self) -> TxId {
        self.counter.load(Ordering::Acquire)
    }

    fn for_each_active(&self, f: &mut dyn FnMut(&Transaction)) {
        let inner = self.inner.lock();
        for id in inner.active.iter() {
            if let Some(tx) = inner.store.get(&id) {
                f(tx);
            }
        }
    }

    fn register_listener(&self, listener: Box<dyn Fn(TxId) + Send + Sync>) {
        self.listeners.write().push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_captures_active_set_as_snapshot() {
        let engine = SingleNodeEngine::new(None);
        let t1 = engine.begin();
        let t2 = engine.begin();
        assert!(t1.snapshot().is_empty());
        assert_eq!(t2.snapshot().iter().collect::<Vec<_>>(), vec![t1.id()]);
        assert_eq!(engine.local_last(), t2.id());
    }

    #[test]
    fn commit_and_abort_update_log_and_active_set() {
        let engine = SingleNodeEngine::new(None);
        let t1 = engine.begin();
        let t2 = engine.begin();
        engine.commit(&t1);
        engine.abort(&t2);
        assert!(engine.info(t1.id()).committed);
        assert!(engine.info(t2.id()).aborted);
        assert!(engine.global_active_transactions().is_empty());
    }

    #[test]
    fn gc_snapshot_without_active_transactions() {
        let engine = SingleNodeEngine::new(None);
        let t1 = engine.begin();
        engine.commit(&t1);
        let gc = engine.global_gc_snapshot();
        assert_eq!(gc.iter().collect::<Vec<_>>(), vec![t1.id() + 1]);
    }

    #[test]
    fn gc_snapshot_uses_oldest_active_snapshot() {
        let engine = SingleNodeEngine::new(None);
        let t1 = engine.begin();
        let t2 = engine.begin();
        let gc = engine.global_gc_snapshot();
        // t1's snapshot was empty; the gc snapshot is {t1}.
        assert_eq!(gc.iter().collect::<Vec<_>>(), vec![t1.id()]);
        engine.commit(&t1);
        let gc = engine.global_gc_snapshot();
        // Now t2 is oldest: its snapshot {t1} plus itself.
        assert_eq!(gc.iter().collect::<Vec<_>>(), vec![t1.id(), t2.id()]);
        engine.commit(&t2);
    }

    #[test]
    fn listeners_fire_on_terminal_states() {
        use std::sync::atomic::{AtomicU64, Ordering};
        let engine = SingleNodeEngine::new(None);
        let seen = Arc::new(AtomicU64::new(0));
        let seen_clone = Arc::clone(&seen);
        engine.register_listener(Box::new(move |tx_id| {
            seen_clone.store(tx_id, Ordering::SeqCst);
        }));
        let t1 = engine.begin();
        engine.commit(&t1);
        assert_eq!(seen.load(Ordering::SeqCst), t1.id());
    }

    #[test]
    fn tx_id_floor_survives_recovery() {
        let engine = SingleNodeEngine::new(None);
        engine.ensure_next_tx_id(100);
        assert_eq!(engine.begin().id(), 100);
    }
}
