//! Append-only, segmented write-ahead log.
//!
//! `emplace` only queues the delta under a short lock, so the engine can
//! call it while holding its own lock; a background flusher thread drains
//! the queue to the active segment and seals segments under a filename
//! carrying the highest transaction id seen so far.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::tx::{TxId, NO_TX};

use super::encoding::SliceSource;
use super::paths::{self, CURRENT_WAL};
use super::state_delta::StateDelta;

const FRAME_HEADER_LEN: usize = 8;
const MAX_FRAME_LEN: u32 = 1 << 26;

/// How a WAL file ended during reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalFileEnd {
    Clean,
    /// The tail was truncated or corrupt past the last complete delta.
    Truncated,
}

struct SegmentState {
    file: Option<File>,
    deltas_in_segment: usize,
    /// Highest tx id seen across the whole log, monotone over rotations.
    max_tx: TxId,
}

struct WalInner {
    dir: PathBuf,
    sync_on_flush: bool,
    rotate_deltas: usize,
    flush_interval: Duration,
    enabled: AtomicBool,
    shutdown: AtomicBool,
    queue: Mutex<VecDeque<StateDelta>>,
    segment: Mutex<SegmentState>,
}

pub struct Wal {
    inner: Arc<WalInner>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl Wal {
    /// Opens the log in `dir`. The log starts disabled so recovery replay
    /// does not re-log itself; call [`Wal::enable`] afterwards.
    pub fn open(
        dir: PathBuf,
        sync_on_flush: bool,
        rotate_deltas: usize,
        flush_interval: Duration,
    ) -> Result<Arc<Self>> {
        fs::create_dir_all(&dir)?;
        let recovered_max = seal_leftover_segment(&dir)?;
        let inner = Arc::new(WalInner {
            dir,
            sync_on_flush,
            rotate_deltas: rotate_deltas.max(1),
            flush_interval,
            enabled: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            queue: Mutex::new(VecDeque::new()),
            segment: Mutex::new(SegmentState {
                file: None,
                deltas_in_segment: 0,
                max_tx: recovered_max,
            }),
        });
        let flusher_inner = Arc::clone(&inner);
        let flusher = std::thread::Builder::new()
            .name("sable-wal".into())
            .spawn(move || {
                while !flusher_inner.shutdown.load(Ordering::Acquire) {
                    std::thread::sleep(flusher_inner.flush_interval);
                    if let Err(err) = flush_queue(&flusher_inner) {
                        warn!(error = %err, "WAL flush failed");
                    }
                }
            })?;
        Ok(Arc::new(Self {
            inner,
            flusher: Mutex::new(Some(flusher)),
        }))
    }

    /// Starts accepting deltas. Anything emplaced before this is dropped.
    pub fn enable(&self) {
        self.inner.enabled.store(true, Ordering::Release);
    }

    /// Queues one delta. Cheap enough to call under the engine lock.
    pub fn emplace(&self, delta: StateDelta) {
        if !self.inner.enabled.load(Ordering::Acquire) {
            return;
        }
        self.inner.queue.lock().push_back(delta);
    }

    /// Synchronously drains the queue to disk.
    pub fn flush(&self) -> Result<()> {
        flush_queue(&self.inner)
    }

    /// Deletes sealed segments that only contain transactions below
    /// `first_needed` (their filename records the highest id they held).
    pub fn prune_finalized(&self, first_needed: TxId) -> Result<()> {
        for path in paths::sorted_files(&self.inner.dir)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(max_tx) = paths::max_tx_from_wal_filename(name) {
                if max_tx < first_needed {
                    debug!(file = name, "pruning covered WAL segment");
                    fs::remove_file(&path)?;
                }
            }
        }
        Ok(())
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.flusher.lock().take() {
            let _ = handle.join();
        }
        if let Err(err) = flush_queue(&self.inner) {
            warn!(error = %err, "final WAL flush failed");
        }
    }
}

/// Seals a `current.wal` left behind by a previous process under its max
/// transaction id, so new deltas never land behind a possibly truncated
/// tail. Returns the highest tx id observed in the log directory.
fn seal_leftover_segment(dir: &std::path::Path) -> Result<TxId> {
    let mut max_tx = NO_TX;
    for path in paths::sorted_files(dir)? {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if let Some(tx) = paths::max_tx_from_wal_filename(name) {
                max_tx = max_tx.max(tx);
            }
        }
    }
    let current = dir.join(CURRENT_WAL);
    if current.exists() {
        let (deltas, _) = read_wal_file(&current)?;
        match deltas.iter().map(|d| d.tx()).max() {
            None => fs::remove_file(&current)?,
            Some(segment_max) => {
                max_tx = max_tx.max(segment_max);
                let sealed = dir.join(paths::wal_filename(segment_max));
                if sealed.exists() {
                    warn!(
                        "leftover WAL segment collides with {}; leaving it in place",
                        sealed.display()
                    );
                } else {
                    fs::rename(&current, &sealed)?;
                    debug!(file = %sealed.display(), "sealed leftover WAL segment");
                }
            }
        }
    }
    Ok(max_tx)
}

fn flush_queue(inner: &WalInner) -> Result<()> {
    let drained: Vec<StateDelta> = {
        let mut queue = inner.queue.lock();
        queue.drain(..).collect()
    };
    if drained.is_empty() {
        return Ok(());
    }

    let mut segment = inner.segment.lock();
    if segment.file.is_none() {
        segment.file = Some(
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(inner.dir.join(CURRENT_WAL))?,
        );
    }

    let mut buf = Vec::new();
    for delta in &drained {
        segment.max_tx = segment.max_tx.max(delta.tx());
        let mut payload = Vec::new();
        delta.encode(&mut payload);
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&crc32fast::hash(&payload).to_be_bytes());
        buf.extend_from_slice(&payload);
    }
    let file = segment.file.as_mut().expect("segment file just opened");
    file.write_all(&buf)?;
    if inner.sync_on_flush {
        file.sync_data()?;
    }
    segment.deltas_in_segment += drained.len();

    if segment.deltas_in_segment >= inner.rotate_deltas {
        let sealed_name = paths::wal_filename(segment.max_tx);
        let sealed_path = inner.dir.join(&sealed_name);
        // The name is derived from a monotone id; if it is already taken the
        // segment has seen no newer transaction, so keep appending.
        if !sealed_path.exists() {
            let file = segment.file.take().expect("segment file open");
            file.sync_all()?;
            drop(file);
            fs::rename(inner.dir.join(CURRENT_WAL), &sealed_path)?;
            segment.deltas_in_segment = 0;
            debug!(file = sealed_name, "sealed WAL segment");
        }
    }
    Ok(())
}

/// Reads every complete delta frame of one WAL file. Truncated or corrupt
/// tails, including unknown tags, end the read without failing it.
pub fn read_wal_file(path: &std::path::Path) -> Result<(Vec<StateDelta>, WalFileEnd)> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;

    let mut deltas = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        if pos + FRAME_HEADER_LEN > data.len() {
            return Ok((deltas, WalFileEnd::Truncated));
        }
        let len = u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap());
        let crc = u32::from_be_bytes(data[pos + 4..pos + 8].try_into().unwrap());
        if len > MAX_FRAME_LEN {
            return Ok((deltas, WalFileEnd::Truncated));
        }
        let start = pos + FRAME_HEADER_LEN;
        let end = start + len as usize;
        if end > data.len() {
            return Ok((deltas, WalFileEnd::Truncated));
        }
        let payload = &data[start..end];
        if crc32fast::hash(payload) != crc {
            return Ok((deltas, WalFileEnd::Truncated));
        }
        match StateDelta::decode(&mut SliceSource::new(payload)) {
            Ok(delta) => deltas.push(delta),
            Err(_) => return Ok((deltas, WalFileEnd::Truncated)),
        }
        pos = end;
    }
    Ok((deltas, WalFileEnd::Clean))
}
