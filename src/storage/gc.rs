//! Background garbage collection: prune version chains below the global GC
//! snapshot, drop dead version lists from the maps, then clear index
//! entries whose backing list is gone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::debug;

use crate::mvcc::GcOutcome;
use crate::tx::Engine;

use super::StorageInner;

const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

pub(crate) struct GcHandle {
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl GcHandle {
    pub(crate) fn stop(self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.handle.join();
    }
}

pub(crate) fn spawn(inner: Arc<StorageInner>, interval: Duration) -> GcHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let handle = std::thread::Builder::new()
        .name("sable-gc".into())
        .spawn(move || {
            let mut waited = Duration::ZERO;
            loop {
                if flag.load(Ordering::Acquire) {
                    return;
                }
                std::thread::sleep(SHUTDOWN_POLL);
                waited += SHUTDOWN_POLL;
                if waited < interval {
                    continue;
                }
                waited = Duration::ZERO;
                run_pass(&inner);
            }
        })
        .expect("failed to spawn garbage collector thread");
    GcHandle { shutdown, handle }
}

pub(crate) fn run_pass(inner: &StorageInner) {
    let snapshot = inner.engine.global_gc_snapshot();
    let clog = inner.engine.clog();

    let mut dead_vertices = Vec::new();
    for entry in inner.vertices.iter() {
        if entry.value().collect(&snapshot, clog) == GcOutcome::Dead {
            dead_vertices.push(*entry.key());
        }
    }
    for gid in &dead_vertices {
        inner
            .vertices
            .remove_if(gid, |_, list| list.collect(&snapshot, clog) == GcOutcome::Dead);
    }

    let mut dead_edges = Vec::new();
    for entry in inner.edges.iter() {
        if entry.value().collect(&snapshot, clog) == GcOutcome::Dead {
            dead_edges.push(*entry.key());
        }
    }
    for gid in &dead_edges {
        inner
            .edges
            .remove_if(gid, |_, list| list.collect(&snapshot, clog) == GcOutcome::Dead);
    }

    inner
        .label_index
        .clean(|gid| inner.vertices.contains_key(&gid));
    inner
        .label_property_index
        .clean(|gid| inner.vertices.contains_key(&gid));

    if !dead_vertices.is_empty() || !dead_edges.is_empty() {
        debug!(
            vertices = dead_vertices.len(),
            edges = dead_edges.len(),
            "collected dead version lists"
        );
    }
}
