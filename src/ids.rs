use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use dashmap::DashMap;

/// Dense id for an interned label name.
pub type LabelId = u32;
/// Dense id for an interned edge type name.
pub type EdgeTypeId = u32;
/// Dense id for an interned property key name.
pub type PropertyId = u32;

const WORKER_BITS: u32 = 10;
const LOCAL_BITS: u32 = 64 - WORKER_BITS;
const LOCAL_MASK: u64 = (1 << LOCAL_BITS) - 1;

/// Cluster-unique entity id: a worker id in the top 10 bits and a
/// per-generator monotonic local id in the remaining 54.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Gid(u64);

impl Gid {
    pub fn new(worker_id: u16, local: u64) -> Self {
        debug_assert!(u32::from(worker_id) < (1 << WORKER_BITS));
        debug_assert!(local <= LOCAL_MASK);
        Self((u64::from(worker_id) << LOCAL_BITS) | (local & LOCAL_MASK))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }

    pub fn worker_id(self) -> u16 {
        (self.0 >> LOCAL_BITS) as u16
    }

    pub fn local(self) -> u64 {
        self.0 & LOCAL_MASK
    }
}

impl std::fmt::Display for Gid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocates gids for one worker. Explicit allocation (recovery, replay)
/// bumps the high-water mark so implicit allocation never collides.
#[derive(Debug)]
pub struct GidGenerator {
    worker_id: u16,
    next: AtomicU64,
}

impl GidGenerator {
    pub fn new(worker_id: u16) -> Self {
        Self {
            worker_id,
            next: AtomicU64::new(0),
        }
    }

    /// Returns the next gid. With `Some(local)` the given local id is used
    /// verbatim and the generator's floor is raised past it.
    pub fn next(&self, requested: Option<u64>) -> Gid {
        let local = match requested {
            Some(local) => {
                self.set_floor(local + 1);
                local
            }
            None => self.next.fetch_add(1, Ordering::AcqRel),
        };
        Gid::new(self.worker_id, local)
    }

    /// Raises the first implicitly allocated local id to at least `floor`.
    pub fn set_floor(&self, floor: u64) {
        let mut current = self.next.load(Ordering::Acquire);
        while current < floor {
            match self.next.compare_exchange_weak(
                current,
                floor,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    /// The next local id that would be handed out implicitly.
    pub fn high_water(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }

    pub fn worker_id(&self) -> u16 {
        self.worker_id
    }
}

/// Bidirectional, monotonically growing name↔id registry for labels, edge
/// types and property keys.
///
/// Insertion is lock-free: when two threads race to intern the same name the
/// loser's freshly drawn id is wasted, but both observe the same winning id
/// and both directions of the mapping exist before either call returns.
/// Names are never removed, so ids stay valid forever.
#[derive(Debug, Default)]
pub struct NameIdMapper {
    counter: AtomicU32,
    name_to_id: DashMap<String, u32>,
    id_to_name: DashMap<u32, String>,
}

impl NameIdMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name_to_id(&self, name: &str) -> u32 {
        let id = match self.name_to_id.get(name) {
            Some(existing) => *existing,
            None => {
                let new_id = self.counter.fetch_add(1, Ordering::AcqRel);
                *self
                    .name_to_id
                    .entry(name.to_owned())
                    .or_insert(new_id)
                    .value()
            }
        };
        // Both directions must exist once this returns, even when another
        // thread assigned the id.
        self.id_to_name.entry(id).or_insert_with(|| name.to_owned());
        id
    }

    pub fn id_to_name(&self, id: u32) -> String {
        self.id_to_name
            .get(&id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| panic!("name requested for unassigned id {id}"))
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.name_to_id.get(name).map(|entry| *entry.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn gid_packs_worker_and_local() {
        let gid = Gid::new(5, 123_456);
        assert_eq!(gid.worker_id(), 5);
        assert_eq!(gid.local(), 123_456);
        assert_eq!(Gid::from_raw(gid.as_raw()), gid);
    }

    #[test]
    fn generator_is_monotonic() {
        let generator = GidGenerator::new(1);
        let a = generator.next(None);
        let b = generator.next(None);
        assert!(b.local() > a.local());
        assert_eq!(a.worker_id(), 1);
    }

    #[test]
    fn explicit_id_raises_floor() {
        let generator = GidGenerator::new(0);
        let explicit = generator.next(Some(41));
        assert_eq!(explicit.local(), 41);
        assert_eq!(generator.next(None).local(), 42);
    }

    #[test]
    fn name_id_round_trip() {
        let mapper = NameIdMapper::new();
        let id = mapper.name_to_id("Person");
        assert_eq!(mapper.name_to_id("Person"), id);
        assert_eq!(mapper.id_to_name(id), "Person");
        assert_ne!(mapper.name_to_id("City"), id);
    }

    #[test]
    fn concurrent_interning_never_double_assigns() {
        let mapper = Arc::new(NameIdMapper::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let mapper = Arc::clone(&mapper);
            handles.push(thread::spawn(move || {
                (0..100)
                    .map(|i| mapper.name_to_id(&format!("name-{}", i % 10)))
                    .collect::<Vec<_>>()
            }));
        }
        let results: Vec<Vec<u32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for i in 0..10 {
            let id = mapper.name_to_id(&format!("name-{i}"));
            for run in &results {
                assert!(run.iter().enumerate().all(|(j, &got)| j % 10 != i || got == id));
            }
            assert_eq!(mapper.id_to_name(id), format!("name-{i}"));
        }
    }
}
