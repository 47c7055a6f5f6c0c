//! Per-record version chains and the snapshot-isolation visibility rule.
//!
//! A [`VersionList`] is the single mutation point for one vertex or edge.
//! Every chain node carries the creating and expiring transaction/command
//! stamps; expiration stamps are installed by compare-and-swap, which is
//! the serialization tie-break between concurrent writers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, StorageError};
use crate::ids::Gid;
use crate::tx::{CmdId, CommitLog, Snapshot, Transaction, TxId, NO_TX};

/// Which state of the record a reader wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// The state as of transaction begin: the reader's own uncommitted
    /// changes are ignored.
    Old,
    /// The current state including the reader's own changes up to its
    /// current command.
    New,
}

/// One immutable published version of a record.
#[derive(Debug)]
pub struct Version<R> {
    record: R,
    tx_created: TxId,
    cmd_created: CmdId,
    tx_expired: AtomicU64,
    cmd_expired: AtomicU64,
    next: RwLock<Option<Arc<Version<R>>>>,
}

impl<R> Version<R> {
    fn new(record: R, tx: &Transaction, next: Option<Arc<Version<R>>>) -> Self {
        Self {
            record,
            tx_created: tx.id(),
            cmd_created: tx.cmd(),
            tx_expired: AtomicU64::new(NO_TX),
            cmd_expired: AtomicU64::new(0),
            next: RwLock::new(next),
        }
    }

    pub fn record(&self) -> &R {
        &self.record
    }

    pub fn tx_created(&self) -> TxId {
        self.tx_created
    }

    pub fn tx_expired(&self) -> TxId {
        self.tx_expired.load(Ordering::Acquire)
    }

    /// Whether this version was expired by the given transaction.
    pub fn is_expired_by(&self, tx: &Transaction) -> bool {
        self.tx_expired() == tx.id()
    }

    fn next(&self) -> Option<Arc<Version<R>>> {
        self.next.read().clone()
    }

    /// Installs the expiration stamp, retrying over stamps left behind by
    /// aborted transactions. The first live transaction to land its CAS
    /// wins; the loser gets a serialization error.
    fn expire(&self, tx: &Transaction, clog: &CommitLog) -> Result<()> {
        let mut expected = NO_TX;
        loop {
            match self.tx_expired.compare_exchange(
                expected,
                tx.id(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.cmd_expired.store(tx.cmd(), Ordering::Release);
                    return Ok(());
                }
                Err(current) if current == tx.id() => {
                    // Already expired by us at an earlier command.
                    return Ok(());
                }
                Err(current) if clog.is_aborted(current) => expected = current,
                Err(_) => return Err(StorageError::Serialization),
            }
        }
    }
}

/// Whether a `(tx, cmd)` stamp takes effect for the given reader: either
/// the reader's own stamp up to its current command, or a stamp from a
/// transaction that committed before the reader began and is not in the
/// reader's snapshot.
fn stamp_effective(
    stamp_tx: TxId,
    stamp_cmd: CmdId,
    tx: &Transaction,
    clog: &CommitLog,
    view: View,
) -> bool {
    if stamp_tx == NO_TX {
        return false;
    }
    if stamp_tx == tx.id() {
        return view == View::New && stamp_cmd <= tx.cmd();
    }
    clog.is_committed(stamp_tx) && stamp_tx < tx.id() && !tx.in_snapshot(stamp_tx)
}

/// The visibility rule: the creation stamp is effective and the expiration
/// stamp is not.
pub fn visible<R>(version: &Version<R>, tx: &Transaction, clog: &CommitLog, view: View) -> bool {
    stamp_effective(version.tx_created, version.cmd_created, tx, clog, view)
        && !stamp_effective(
            version.tx_expired.load(Ordering::Acquire),
            version.cmd_expired.load(Ordering::Acquire),
            tx,
            clog,
            view,
        )
}

/// Outcome of one garbage-collection pass over a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcOutcome {
    Live,
    /// Every remaining version is invisible to every current and future
    /// reader; the owner may drop the whole list.
    Dead,
}

/// Singly linked chain of record versions, newest first.
pub struct VersionList<R> {
    gid: Gid,
    head: RwLock<Arc<Version<R>>>,
}

impl<R: Clone> VersionList<R> {
    /// Creates the list with its first version stamped by `tx`.
    pub fn new(tx: &Transaction, gid: Gid, record: R) -> Self {
        Self {
            gid,
            head: RwLock::new(Arc::new(Version::new(record, tx, None))),
        }
    }

    pub fn gid(&self) -> Gid {
        self.gid
    }

    /// The version visible to `tx` under `view`, if any.
    pub fn find(
        &self,
        tx: &Transaction,
        clog: &CommitLog,
        view: View,
    ) -> Option<Arc<Version<R>>> {
        let mut current = Some(self.head.read().clone());
        while let Some(version) = current {
            if visible(&version, tx, clog, view) {
                return Some(version);
            }
            current = version.next();
        }
        None
    }

    /// The version this transaction would mutate: the newest one whose
    /// creation stamp is effective for it, regardless of expiration.
    fn find_updatable(&self, tx: &Transaction, clog: &CommitLog) -> Option<Arc<Version<R>>> {
        let mut current = Some(self.head.read().clone());
        while let Some(version) = current {
            if stamp_effective(version.tx_created, version.cmd_created, tx, clog, View::New) {
                return Some(version);
            }
            current = version.next();
        }
        None
    }

    /// Installs a new head version produced by `mutate` from the currently
    /// visible record.
    ///
    /// When the visible version is the transaction's own uncommitted head
    /// the chain does not grow: the head is replaced in place (new-new
    /// coalesce). Otherwise the visible version's expiration stamp is
    /// claimed by CAS; losing that race is a serialization failure.
    pub fn update(
        &self,
        tx: &Transaction,
        clog: &CommitLog,
        mutate: impl FnOnce(&mut R),
    ) -> Result<Arc<Version<R>>> {
        let target = self
            .find_updatable(tx, clog)
            .ok_or(StorageError::Serialization)?;
        if target.is_expired_by(tx) {
            return Err(StorageError::RecordDeleted);
        }

        let mut record = target.record.clone();
        mutate(&mut record);

        if target.tx_created == tx.id() {
            // Our own uncommitted version is necessarily the head: any
            // other writer would have to expire the version below it and
            // fail the CAS against our stamp.
            let replacement = Arc::new(Version::new(record, tx, target.next()));
            let mut head = self.head.write();
            debug_assert!(Arc::ptr_eq(&head, &target));
            *head = Arc::clone(&replacement);
            return Ok(replacement);
        }

        target.expire(tx, clog)?;
        let mut head = self.head.write();
        let new_head = Arc::new(Version::new(record, tx, Some(head.clone())));
        *head = Arc::clone(&new_head);
        Ok(new_head)
    }

    /// Logical removal: an expiration with no successor. Idempotent within
    /// the owning transaction.
    pub fn remove(&self, tx: &Transaction, clog: &CommitLog) -> Result<()> {
        let target = self
            .find_updatable(tx, clog)
            .ok_or(StorageError::Serialization)?;
        target.expire(tx, clog)
    }

    /// Prunes versions no current or future reader can see. `gc_snapshot`
    /// is the engine's global GC snapshot; any stamp below its front is
    /// stable for every reader.
    pub fn collect(&self, gc_snapshot: &Snapshot, clog: &CommitLog) -> GcOutcome {
        let front = gc_snapshot.front().unwrap_or(TxId::MAX);
        let older_than_all = |t: TxId| t != NO_TX && t < front;

        let mut head = self.head.write();

        // Drop aborted creations from the front of the chain.
        loop {
            let current = head.clone();
            if !clog.is_aborted(current.tx_created) {
                break;
            }
            match current.next() {
                Some(next) => *head = next,
                None => return GcOutcome::Dead,
            }
        }

        // Splice out aborted creations further down, and cut the chain
        // below the first version whose creation every reader observes.
        let mut cursor = head.clone();
        loop {
            let committed_anchor = clog.is_committed(cursor.tx_created)
                && older_than_all(cursor.tx_created);
            if committed_anchor {
                *cursor.next.write() = None;
                break;
            }
            let below = cursor.next();
            match below {
                None => break,
                Some(next) if clog.is_aborted(next.tx_created) => {
                    *cursor.next.write() = next.next();
                }
                Some(next) => cursor = next,
            }
        }

        // The list is dead when every surviving version is expired beyond
        // the reach of any reader.
        let mut current = Some(head.clone());
        while let Some(version) = current {
            let exp = version.tx_expired.load(Ordering::Acquire);
            let gone = clog.is_committed(exp) && older_than_all(exp);
            if !gone {
                return GcOutcome::Live;
            }
            current = version.next();
        }
        GcOutcome::Dead
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::{Engine, SingleNodeEngine};

    fn gid(local: u64) -> Gid {
        Gid::new(0, local)
    }

    #[test]
    fn own_writes_visible_from_their_command() {
        let engine = SingleNodeEngine::new(None);
        let tx = engine.begin();
        let list = VersionList::new(&tx, gid(1), 10u32);
        assert!(list.find(&tx, engine.clog(), View::New).is_some());
        assert!(list.find(&tx, engine.clog(), View::Old).is_none());
        engine.commit(&tx);
    }

    #[test]
    fn committed_writes_visible_to_later_transactions_only() {
        let engine = SingleNodeEngine::new(None);
        let writer = engine.begin();
        let reader_before = engine.begin();
        let list = VersionList::new(&writer, gid(1), 10u32);
        engine.commit(&writer);

        // reader_before has writer in its snapshot.
        assert!(list.find(&reader_before, engine.clog(), View::New).is_none());

        let reader_after = engine.begin();
        let version = list.find(&reader_after, engine.clog(), View::New).unwrap();
        assert_eq!(*version.record(), 10);
        engine.commit(&reader_before);
        engine.commit(&reader_after);
    }

    #[test]
    fn uncommitted_writes_invisible_to_others() {
        let engine = SingleNodeEngine::new(None);
        let writer = engine.begin();
        let list = VersionList::new(&writer, gid(1), 10u32);
        let reader = engine.begin();
        assert!(list.find(&reader, engine.clog(), View::New).is_none());
        engine.abort(&writer);
        // Aborted writes stay invisible forever.
        let late_reader = engine.begin();
        assert!(list.find(&late_reader, engine.clog(), View::New).is_none());
        engine.commit(&reader);
        engine.commit(&late_reader);
    }

    #[test]
    fn update_installs_new_version_and_expires_old() {
        let engine = SingleNodeEngine::new(None);
        let creator = engine.begin();
        let list = VersionList::new(&creator, gid(1), 1u32);
        engine.commit(&creator);

        let updater = engine.begin();
        list.update(&updater, engine.clog(), |v| *v = 2).unwrap();
        // The updater sees the new record, a concurrent reader the old one.
        let reader = engine.begin();
        assert_eq!(
            *list.find(&updater, engine.clog(), View::New).unwrap().record(),
            2
        );
        assert_eq!(
            *list.find(&reader, engine.clog(), View::New).unwrap().record(),
            1
        );
        engine.commit(&updater);
        engine.commit(&reader);
    }

    #[test]
    fn concurrent_writers_serialize() {
        let engine = SingleNodeEngine::new(None);
        let creator = engine.begin();
        let list = VersionList::new(&creator, gid(1), 1u32);
        engine.commit(&creator);

        let t1 = engine.begin();
        let t2 = engine.begin();
        list.update(&t1, engine.clog(), |v| *v = 2).unwrap();
        let err = list.update(&t2, engine.clog(), |v| *v = 3).unwrap_err();
        assert!(matches!(err, StorageError::Serialization));
        engine.commit(&t1);
        engine.abort(&t2);
    }

    #[test]
    fn loser_can_write_after_winner_aborts() {
        let engine = SingleNodeEngine::new(None);
        let creator = engine.begin();
        let list = VersionList::new(&creator, gid(1), 1u32);
        engine.commit(&creator);

        let t1 = engine.begin();
        let t2 = engine.begin();
        list.update(&t1, engine.clog(), |v| *v = 2).unwrap();
        engine.abort(&t1);
        list.update(&t2, engine.clog(), |v| *v = 3).unwrap();
        assert_eq!(
            *list.find(&t2, engine.clog(), View::New).unwrap().record(),
            3
        );
        engine.commit(&t2);
    }

    #[test]
    fn new_new_coalesce_keeps_chain_flat() {
        let engine = SingleNodeEngine::new(None);
        let tx = engine.begin();
        let list = VersionList::new(&tx, gid(1), 0u32);
        for i in 1..=100u32 {
            list.update(&tx, engine.clog(), |v| *v = i).unwrap();
        }
        let head = list.find(&tx, engine.clog(), View::New).unwrap();
        assert_eq!(*head.record(), 100);
        assert!(head.next().is_none());
        engine.commit(&tx);
    }

    #[test]
    fn command_boundary_controls_own_visibility() {
        let engine = SingleNodeEngine::new(None);
        let creator = engine.begin();
        let list = VersionList::new(&creator, gid(1), 1u32);
        engine.commit(&creator);

        let tx = engine.begin();
        engine.advance(tx.id()).unwrap();
        list.remove(&tx, engine.clog()).unwrap();
        // Removed at command 2: still visible through View::Old, gone in New.
        assert!(list.find(&tx, engine.clog(), View::New).is_none());
        assert!(list.find(&tx, engine.clog(), View::Old).is_some());
        engine.commit(&tx);
    }

    #[test]
    fn update_after_own_remove_reports_deleted() {
        let engine = SingleNodeEngine::new(None);
        let tx = engine.begin();
        let list = VersionList::new(&tx, gid(1), 1u32);
        list.remove(&tx, engine.clog()).unwrap();
        let err = list.update(&tx, engine.clog(), |v| *v = 2).unwrap_err();
        assert!(matches!(err, StorageError::RecordDeleted));
        // Removing again is idempotent.
        list.remove(&tx, engine.clog()).unwrap();
        engine.abort(&tx);
    }

    #[test]
    fn collect_prunes_old_versions() {
        let engine = SingleNodeEngine::new(None);
        let creator = engine.begin();
        let list = VersionList::new(&creator, gid(1), 1u32);
        engine.commit(&creator);
        for i in 2..=4u32 {
            let tx = engine.begin();
            list.update(&tx, engine.clog(), |v| *v = i).unwrap();
            engine.commit(&tx);
        }
        assert_eq!(
            list.collect(&engine.global_gc_snapshot(), engine.clog()),
            GcOutcome::Live
        );
        let reader = engine.begin();
        let head = list.find(&reader, engine.clog(), View::New).unwrap();
        assert_eq!(*head.record(), 4);
        assert!(head.next().is_none());
        engine.commit(&reader);
    }

    #[test]
    fn collect_reports_dead_after_remove() {
        let engine = SingleNodeEngine::new(None);
        let creator = engine.begin();
        let list = VersionList::new(&creator, gid(1), 1u32);
        engine.commit(&creator);
        let remover = engine.begin();
        list.remove(&remover, engine.clog()).unwrap();
        engine.commit(&remover);
        assert_eq!(
            list.collect(&engine.global_gc_snapshot(), engine.clog()),
            GcOutcome::Dead
        );
    }

    #[test]
    fn collect_keeps_versions_active_readers_need() {
        let engine = SingleNodeEngine::new(None);
        let creator = engine.begin();
        let list = VersionList::new(&creator, gid(1), 1u32);
        engine.commit(&creator);

        let reader = engine.begin();
        let remover = engine.begin();
        list.remove(&remover, engine.clog()).unwrap();
        engine.commit(&remover);

        // The reader began before the remove committed and must keep seeing
        // the record.
        assert_eq!(
            list.collect(&engine.global_gc_snapshot(), engine.clog()),
            GcOutcome::Live
        );
        assert!(list.find(&reader, engine.clog(), View::New).is_some());
        engine.commit(&reader);
    }
}
