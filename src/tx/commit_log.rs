use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{TxId, NO_TX};

const COMMITTED: u64 = 0b01;
const ABORTED: u64 = 0b10;

/// Transactions tracked per chunk; 2 bits each in 64-bit words.
const TXS_PER_CHUNK: u64 = 4096;
const TXS_PER_WORD: u64 = 32;
const WORDS_PER_CHUNK: usize = (TXS_PER_CHUNK / TXS_PER_WORD) as usize;

/// Terminal-state view of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxInfo {
    pub committed: bool,
    pub aborted: bool,
}

impl TxInfo {
    /// Neither committed nor aborted. Unknown ids report active as well;
    /// callers only ask about ids the engine has issued.
    pub fn is_active(self) -> bool {
        !self.committed && !self.aborted
    }
}

struct Chunk {
    words: [AtomicU64; WORDS_PER_CHUNK],
}

impl Chunk {
    fn new() -> Self {
        Self {
            words: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

/// Per-transaction 2-bit terminal-state log.
///
/// States are monotonic: once a transaction is recorded committed or
/// aborted it never changes. Reads are wait-free; growing the chunk spine
/// takes a short write lock.
pub struct CommitLog {
    chunks: RwLock<Vec<Arc<Chunk>>>,
}

impl Default for CommitLog {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitLog {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
        }
    }

    pub fn set_committed(&self, tx: TxId) {
        self.set_bits(tx, COMMITTED);
    }

    pub fn set_aborted(&self, tx: TxId) {
        self.set_bits(tx, ABORTED);
    }

    pub fn is_committed(&self, tx: TxId) -> bool {
        self.info(tx).committed
    }

    pub fn is_aborted(&self, tx: TxId) -> bool {
        self.info(tx).aborted
    }

    pub fn info(&self, tx: TxId) -> TxInfo {
        debug_assert_ne!(tx, NO_TX, "commit log queried for the null tx");
        let chunk_index = (tx / TXS_PER_CHUNK) as usize;
        let chunk = {
            let chunks = self.chunks.read();
            match chunks.get(chunk_index) {
                Some(chunk) => Arc::clone(chunk),
                None => {
                    return TxInfo {
                        committed: false,
                        aborted: false,
                    }
                }
            }
        };
        let slot = tx % TXS_PER_CHUNK;
        let word = chunk.words[(slot / TXS_PER_WORD) as usize].load(Ordering::Acquire);
        let bits = (word >> ((slot % TXS_PER_WORD) * 2)) & 0b11;
        TxInfo {
            committed: bits & COMMITTED != 0,
            aborted: bits & ABORTED != 0,
        }
    }

    fn set_bits(&self, tx: TxId, bits: u64) {
        debug_assert_ne!(tx, NO_TX, "commit log written for the null tx");
        let chunk_index = (tx / TXS_PER_CHUNK) as usize;
        let chunk = self.ensure_chunk(chunk_index);
        let slot = tx % TXS_PER_CHUNK;
        let shifted = bits << ((slot % TXS_PER_WORD) * 2);
        chunk.words[(slot / TXS_PER_WORD) as usize].fetch_or(shifted, Ordering::AcqRel);
    }

    fn ensure_chunk(&self, index: usize) -> Arc<Chunk> {
        {
            let chunks = self.chunks.read();
            if let Some(chunk) = chunks.get(index) {
                return Arc::clone(chunk);
            }
        }
        let mut chunks = self.chunks.write();
        while chunks.len() <= index {
            chunks.push(Arc::new(Chunk::new()));
        }
        Arc::clone(&chunks[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_transactions_are_active() {
        let clog = CommitLog::new();
        assert!(clog.info(42).is_active());
    }

    #[test]
    fn terminal_states_stick() {
        let clog = CommitLog::new();
        clog.set_committed(1);
        clog.set_aborted(2);
        assert!(clog.is_committed(1));
        assert!(!clog.is_aborted(1));
        assert!(clog.is_aborted(2));
        assert!(!clog.info(2).is_active());
    }

    #[test]
    fn spans_chunk_boundaries() {
        let clog = CommitLog::new();
        let far = TXS_PER_CHUNK * 3 + 17;
        clog.set_committed(far);
        assert!(clog.is_committed(far));
        assert!(clog.info(far - 1).is_active());
    }
}
