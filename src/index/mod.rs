//! Label and label-property indexes.
//!
//! Both indexes are updated in the write path with the *new* current
//! version of a vertex and tolerate stale entries: readers resolve the gid
//! through the vertex map and re-check visibility, label membership and the
//! property value on the visible version. A background cleaner drops
//! entries whose backing version list is gone.

use std::collections::BTreeSet;
use std::ops;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;

use crate::ids::{Gid, LabelId, PropertyId};
use crate::model::{OrderedValue, PropertyValue, Vertex};

/// Label → set of gids of vertices that have carried the label in some
/// uncollected version.
#[derive(Debug, Default)]
pub struct LabelIndex {
    map: DashMap<LabelId, Arc<DashSet<Gid>>>,
}

impl LabelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, label: LabelId, gid: Gid) {
        self.map
            .entry(label)
            .or_insert_with(|| Arc::new(DashSet::new()))
            .insert(gid);
    }

    /// Entry count, stale entries included.
    pub fn count(&self, label: LabelId) -> u64 {
        self.map
            .get(&label)
            .map(|set| set.len() as u64)
            .unwrap_or(0)
    }

    pub fn gids(&self, label: LabelId) -> Vec<Gid> {
        self.map
            .get(&label)
            .map(|set| set.iter().map(|entry| *entry).collect())
            .unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<LabelId> {
        self.map.iter().map(|entry| *entry.key()).collect()
    }

    /// Drops entries whose backing record no longer exists.
    pub fn clean(&self, alive: impl Fn(Gid) -> bool) {
        for entry in self.map.iter() {
            let dead: Vec<Gid> = entry
                .value()
                .iter()
                .filter(|gid| !alive(**gid))
                .map(|gid| *gid)
                .collect();
            for gid in dead {
                entry.value().remove(&gid);
            }
        }
    }
}

/// A (label, property) index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey {
    pub label: LabelId,
    pub property: PropertyId,
}

/// An inclusive or exclusive range bound over property values.
#[derive(Debug, Clone)]
pub struct Bound {
    pub value: PropertyValue,
    pub inclusive: bool,
}

impl Bound {
    pub fn inclusive(value: impl Into<PropertyValue>) -> Self {
        Self {
            value: value.into(),
            inclusive: true,
        }
    }

    pub fn exclusive(value: impl Into<PropertyValue>) -> Self {
        Self {
            value: value.into(),
            inclusive: false,
        }
    }

    fn ordered(&self) -> OrderedValue {
        OrderedValue::new(self.value.clone())
            .expect("null is not a valid index bound")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct IndexEntry {
    value: OrderedValue,
    gid: Gid,
}

#[derive(Debug, Default)]
struct PropertyIndexStore {
    entries: RwLock<BTreeSet<IndexEntry>>,
    ready: AtomicBool,
}

/// (label, property) → ordered container of (value, gid).
///
/// Nulls are never indexed. Indexes are created but not dropped.
#[derive(Debug, Default)]
pub struct LabelPropertyIndex {
    indexes: DashMap<IndexKey, Arc<PropertyIndexStore>>,
}

impl LabelPropertyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs an empty, not-yet-ready index. Returns false when the key
    /// already exists (possibly still being built by another transaction).
    pub fn create(&self, key: IndexKey) -> bool {
        match self.indexes.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(PropertyIndexStore::default()));
                true
            }
        }
    }

    pub fn mark_ready(&self, key: IndexKey) {
        if let Some(store) = self.indexes.get(&key) {
            store.ready.store(true, Ordering::Release);
        }
    }

    pub fn exists(&self, key: IndexKey) -> bool {
        self.indexes.contains_key(&key)
    }

    /// Whether the index finished its online build.
    pub fn is_ready(&self, key: IndexKey) -> bool {
        self.indexes
            .get(&key)
            .map(|store| store.ready.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub fn keys(&self) -> Vec<IndexKey> {
        self.indexes.iter().map(|entry| *entry.key()).collect()
    }

    pub fn insert(&self, key: IndexKey, value: OrderedValue, gid: Gid) {
        if let Some(store) = self.indexes.get(&key) {
            store.entries.write().insert(IndexEntry { value, gid });
        }
    }

    /// Called when `label` was added to the vertex.
    pub fn update_on_label(&self, label: LabelId, vertex: &Vertex, gid: Gid) {
        for entry in self.indexes.iter() {
            let key = *entry.key();
            if key.label != label {
                continue;
            }
            if let Some(value) = OrderedValue::new(vertex.property(key.property)) {
                entry.value().entries.write().insert(IndexEntry { value, gid });
            }
        }
    }

    /// Called when `property` was set on the vertex.
    pub fn update_on_property(&self, property: PropertyId, vertex: &Vertex, gid: Gid) {
        for entry in self.indexes.iter() {
            let key = *entry.key();
            if key.property != property || !vertex.has_label(key.label) {
                continue;
            }
            if let Some(value) = OrderedValue::new(vertex.property(key.property)) {
                entry.value().entries.write().insert(IndexEntry { value, gid });
            }
        }
    }

    /// Entry count, stale entries included.
    pub fn count(&self, key: IndexKey) -> u64 {
        self.indexes
            .get(&key)
            .map(|store| store.entries.read().len() as u64)
            .unwrap_or(0)
    }

    /// `(lower_bound_position, equal_run_length)` of `value` within the
    /// ordered entries.
    pub fn position_and_count(&self, key: IndexKey, value: &PropertyValue) -> (u64, u64) {
        let ordered = OrderedValue::new(value.clone())
            .expect("null has no position in an index");
        let Some(store) = self.indexes.get(&key) else {
            return (0, 0);
        };
        let entries = store.entries.read();
        let mut position = 0u64;
        let mut count = 0u64;
        for entry in entries.iter() {
            match entry.value.cmp(&ordered) {
                std::cmp::Ordering::Less => position += 1,
                std::cmp::Ordering::Equal => count += 1,
                std::cmp::Ordering::Greater => break,
            }
        }
        (position, count)
    }

    /// Number of entries within the given bounds, computed from positions
    /// and equal-run lengths. At least one bound must be present; null
    /// bounds are rejected by `Bound::ordered`.
    pub fn count_in_range(
        &self,
        key: IndexKey,
        lower: Option<&Bound>,
        upper: Option<&Bound>,
    ) -> u64 {
        assert!(
            lower.is_some() || upper.is_some(),
            "at least one bound must be provided"
        );
        let total = self.count(key) as i64;
        let result = match (lower, upper) {
            (Some(lower), None) => {
                let (pos, count) = self.position_and_count(key, &lower.value);
                total - pos as i64 - if lower.inclusive { 0 } else { count as i64 }
            }
            (None, Some(upper)) => {
                let (pos, count) = self.position_and_count(key, &upper.value);
                if upper.inclusive {
                    (pos + count) as i64
                } else {
                    pos as i64
                }
            }
            (Some(lower), Some(upper)) => {
                let (lower_pos, lower_count) = self.position_and_count(key, &lower.value);
                let (upper_pos, upper_count) = self.position_and_count(key, &upper.value);
                let mut result = upper_pos as i64 - lower_pos as i64;
                if !lower.inclusive {
                    result -= lower_count as i64;
                }
                if upper.inclusive {
                    result += upper_count as i64;
                }
                result
            }
            (None, None) => unreachable!(),
        };
        result.max(0) as u64
    }

    /// Gids of entries within the bounds, in value order.
    pub fn gids_in_range(
        &self,
        key: IndexKey,
        lower: Option<&Bound>,
        upper: Option<&Bound>,
    ) -> Vec<Gid> {
        let Some(store) = self.indexes.get(&key) else {
            return Vec::new();
        };
        let lower_bound = match lower {
            None => ops::Bound::Unbounded,
            Some(bound) if bound.inclusive => ops::Bound::Included(IndexEntry {
                value: bound.ordered(),
                gid: Gid::from_raw(0),
            }),
            Some(bound) => ops::Bound::Excluded(IndexEntry {
                value: bound.ordered(),
                gid: Gid::from_raw(u64::MAX),
            }),
        };
        let upper_bound = match upper {
            None => ops::Bound::Unbounded,
            Some(bound) if bound.inclusive => ops::Bound::Included(IndexEntry {
                value: bound.ordered(),
                gid: Gid::from_raw(u64::MAX),
            }),
            Some(bound) => ops::Bound::Excluded(IndexEntry {
                value: bound.ordered(),
                gid: Gid::from_raw(0),
            }),
        };
        let result = store
            .entries
            .read()
            .range((lower_bound, upper_bound))
            .map(|entry| entry.gid)
            .collect();
        result
    }

    /// Gids of entries equal to `value`.
    pub fn gids_for_value(&self, key: IndexKey, value: &PropertyValue) -> Vec<Gid> {
        let bound = Bound::inclusive(value.clone());
        self.gids_in_range(key, Some(&bound), Some(&bound))
    }

    /// Drops entries whose backing record no longer exists.
    pub fn clean(&self, alive: impl Fn(Gid) -> bool) {
        for entry in self.indexes.iter() {
            let mut entries = entry.value().entries.write();
            entries.retain(|e| alive(e.gid));
        }
    }
}
