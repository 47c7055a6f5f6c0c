use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{Result, StorageError};

use super::{CmdId, Snapshot, TxId};

/// One running transaction, owned by the engine from `begin` to
/// `commit`/`abort`. Accessors hold a non-owning `Arc` clone.
#[derive(Debug)]
pub struct Transaction {
    id: TxId,
    snapshot: Snapshot,
    cmd: AtomicU64,
    should_abort: AtomicBool,
}

impl Transaction {
    pub(super) fn new(id: TxId, snapshot: Snapshot) -> Self {
        Self {
            id,
            snapshot,
            cmd: AtomicU64::new(1),
            should_abort: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    /// Current command id. Versions stamped at earlier commands are visible
    /// at later commands of the same transaction.
    pub fn cmd(&self) -> CmdId {
        self.cmd.load(Ordering::Acquire)
    }

    /// The set of transactions that were active when this one began.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn in_snapshot(&self, id: TxId) -> bool {
        self.snapshot.contains(id)
    }

    pub(super) fn advance(&self) -> Result<CmdId> {
        let current = self.cmd.load(Ordering::Acquire);
        if current == CmdId::MAX {
            return Err(StorageError::Transaction(
                "reached maximum number of commands in this transaction".into(),
            ));
        }
        Ok(self.cmd.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Cooperative cancellation, observed at command boundaries.
    pub fn set_should_abort(&self) {
        self.should_abort.store(true, Ordering::Release);
    }

    pub fn should_abort(&self) -> bool {
        self.should_abort.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_strictly_increase() {
        let tx = Transaction::new(1, Snapshot::new());
        assert_eq!(tx.cmd(), 1);
        assert_eq!(tx.advance().unwrap(), 2);
        assert_eq!(tx.advance().unwrap(), 3);
        assert_eq!(tx.cmd(), 3);
    }

    #[test]
    fn command_overflow_is_a_transaction_error() {
        let tx = Transaction::new(1, Snapshot::new());
        tx.cmd.store(CmdId::MAX, Ordering::Release);
        assert!(matches!(
            tx.advance(),
            Err(StorageError::Transaction(_))
        ));
        // The counter did not move; the transaction stays abortable.
        assert_eq!(tx.cmd(), CmdId::MAX);
    }
}
