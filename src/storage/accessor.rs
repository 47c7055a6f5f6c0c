use std::cell::Cell;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::durability::StateDelta;
use crate::error::{Result, StorageError};
use crate::ids::{EdgeTypeId, Gid, LabelId, PropertyId};
use crate::index::{Bound, IndexKey};
use crate::model::{set_map_property, Edge, EdgeEntry, OrderedValue, PropertyMap, PropertyValue, Vertex};
use crate::mvcc::{Version, VersionList, View};
use crate::tx::{CmdId, CommitLog, Engine, Transaction, TxId};

use super::StorageInner;

/// How long the index builder sleeps between polls while waiting for
/// pre-existing transactions to finish.
const INDEX_BUILD_POLL: Duration = Duration::from_micros(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessorState {
    Active,
    Committed,
    Aborted,
}

/// The sole vehicle for reads and writes: a short-lived handle binding one
/// transaction to the storage.
///
/// Dropping an accessor that was neither committed nor aborted aborts its
/// transaction.
pub struct Accessor<'s> {
    storage: &'s StorageInner,
    tx: Arc<Transaction>,
    state: Cell<AccessorState>,
}

impl<'s> Accessor<'s> {
    pub(crate) fn new(storage: &'s StorageInner) -> Self {
        Self {
            storage,
            tx: storage.engine.begin(),
            state: Cell::new(AccessorState::Active),
        }
    }

    fn check_live(&self) {
        assert!(
            self.state.get() == AccessorState::Active,
            "accessor used after commit or abort"
        );
    }

    fn clog(&self) -> &CommitLog {
        self.storage.engine.clog()
    }

    fn emplace_wal(&self, delta: StateDelta) {
        if let Some(wal) = &self.storage.wal {
            wal.emplace(delta);
        }
    }

    pub fn transaction_id(&self) -> TxId {
        self.tx.id()
    }

    /// Cooperative cancellation flag of the underlying transaction.
    pub fn should_abort(&self) -> bool {
        self.tx.should_abort()
    }

    pub fn set_should_abort(&self) {
        self.tx.set_should_abort();
    }

    /// Makes this transaction's earlier writes visible to its later reads.
    pub fn advance_command(&self) -> Result<CmdId> {
        self.check_live();
        self.storage.engine.advance(self.tx.id())
    }

    pub fn commit(&self) -> Result<()> {
        self.check_live();
        self.storage.engine.commit(&self.tx);
        self.state.set(AccessorState::Committed);
        Ok(())
    }

    pub fn abort(&self) -> Result<()> {
        self.check_live();
        self.storage.engine.abort(&self.tx);
        self.state.set(AccessorState::Aborted);
        Ok(())
    }

    // ---- vertices ----

    /// Inserts a vertex. An explicit gid must carry this worker's id and
    /// must be fresh; colliding with an existing gid is a fatal invariant
    /// violation.
    pub fn insert_vertex(&self, requested: Option<Gid>) -> Result<VertexAccessor<'_>> {
        self.check_live();
        let requested_local = match requested {
            Some(gid) if gid.worker_id() != self.storage.config.worker_id => {
                return Err(StorageError::NotYetImplemented("remote vertex insertion"));
            }
            Some(gid) => Some(gid.local()),
            None => None,
        };
        let gid = self.storage.vertex_generator.next(requested_local);
        let vlist = Arc::new(VersionList::new(&self.tx, gid, Vertex::default()));
        match self.storage.vertices.entry(gid) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                panic!("attempting to insert a vertex with an existing gid: {gid}")
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&vlist));
            }
        }
        self.emplace_wal(StateDelta::CreateVertex {
            tx: self.tx.id(),
            gid,
        });
        Ok(VertexAccessor { acc: self, vlist })
    }

    pub fn find_vertex(&self, gid: Gid, view: View) -> Option<VertexAccessor<'_>> {
        self.check_live();
        let vlist = Arc::clone(self.storage.vertices.get(&gid)?.value());
        vlist.find(&self.tx, self.clog(), view)?;
        Some(VertexAccessor { acc: self, vlist })
    }

    /// All vertices visible under `view`.
    pub fn vertices(&self, view: View) -> Vec<VertexAccessor<'_>> {
        self.check_live();
        let lists: Vec<Arc<VersionList<Vertex>>> = self
            .storage
            .vertices
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        lists
            .into_iter()
            .filter(|vlist| vlist.find(&self.tx, self.clog(), view).is_some())
            .map(|vlist| VertexAccessor { acc: self, vlist })
            .collect()
    }

    /// Vertices with the label, through the label index with a visibility
    /// re-check on the visible version.
    pub fn vertices_with_label(&self, label: LabelId, view: View) -> Vec<VertexAccessor<'_>> {
        self.check_live();
        self.storage
            .label_index
            .gids(label)
            .into_iter()
            .filter_map(|gid| {
                let vlist = Arc::clone(self.storage.vertices.get(&gid)?.value());
                let version = vlist.find(&self.tx, self.clog(), view)?;
                version
                    .record()
                    .has_label(label)
                    .then(|| VertexAccessor { acc: self, vlist })
            })
            .collect()
    }

    /// Vertices whose indexed `property` equals `value`.
    pub fn vertices_with_label_property(
        &self,
        label: LabelId,
        property: PropertyId,
        value: &PropertyValue,
        view: View,
    ) -> Vec<VertexAccessor<'_>> {
        self.check_live();
        let key = IndexKey { label, property };
        assert!(
            self.storage.label_property_index.exists(key),
            "label-property index does not exist"
        );
        self.storage
            .label_property_index
            .gids_for_value(key, value)
            .into_iter()
            .filter_map(|gid| self.indexed_vertex(gid, label, property, view))
            .filter(|(_, current)| {
                matches!(current.cmp_typed(value), Ok(std::cmp::Ordering::Equal))
            })
            .map(|(accessor, _)| accessor)
            .collect()
    }

    /// Vertices whose indexed `property` falls within the bounds. At least
    /// one bound must be given; null bounds are an invariant violation.
    pub fn vertices_with_label_property_in_range(
        &self,
        label: LabelId,
        property: PropertyId,
        lower: Option<&Bound>,
        upper: Option<&Bound>,
        view: View,
    ) -> Vec<VertexAccessor<'_>> {
        self.check_live();
        assert!(
            lower.is_some() || upper.is_some(),
            "at least one bound must be provided"
        );
        let key = IndexKey { label, property };
        assert!(
            self.storage.label_property_index.exists(key),
            "label-property index does not exist"
        );
        let lower_ordered = lower.map(|b| {
            (
                OrderedValue::new(b.value.clone()).expect("null is not a valid index bound"),
                b.inclusive,
            )
        });
        let upper_ordered = upper.map(|b| {
            (
                OrderedValue::new(b.value.clone()).expect("null is not a valid index bound"),
                b.inclusive,
            )
        });
        self.storage
            .label_property_index
            .gids_in_range(key, lower, upper)
            .into_iter()
            .filter_map(|gid| self.indexed_vertex(gid, label, property, view))
            .filter(|(_, current)| {
                let Some(current) = OrderedValue::new(current.clone()) else {
                    return false;
                };
                let above = lower_ordered.as_ref().map_or(true, |(bound, inclusive)| {
                    if *inclusive {
                        current >= *bound
                    } else {
                        current > *bound
                    }
                });
                let below = upper_ordered.as_ref().map_or(true, |(bound, inclusive)| {
                    if *inclusive {
                        current <= *bound
                    } else {
                        current < *bound
                    }
                });
                above && below
            })
            .map(|(accessor, _)| accessor)
            .collect()
    }

    fn indexed_vertex(
        &self,
        gid: Gid,
        label: LabelId,
        property: PropertyId,
        view: View,
    ) -> Option<(VertexAccessor<'_>, PropertyValue)> {
        let vlist = Arc::clone(self.storage.vertices.get(&gid)?.value());
        let version = vlist.find(&self.tx, self.clog(), view)?;
        if !version.record().has_label(label) {
            return None;
        }
        let current = version.record().property(property);
        if current.is_null() {
            return None;
        }
        Some((VertexAccessor { acc: self, vlist }, current))
    }

    /// Removes a vertex. Refused (returning `false`, with no mutation) when
    /// any incident edge is still visible; removing an already removed
    /// vertex is idempotent.
    pub fn remove_vertex(&self, vertex: &VertexAccessor<'_>) -> Result<bool> {
        self.check_live();
        let Some(current) = vertex.vlist.find(&self.tx, self.clog(), View::New) else {
            // Already removed within this transaction.
            return Ok(true);
        };
        if !current.record().out_edges.is_empty() || !current.record().in_edges.is_empty() {
            return Ok(false);
        }
        self.emplace_wal(StateDelta::RemoveVertex {
            tx: self.tx.id(),
            gid: vertex.gid(),
        });
        vertex.vlist.remove(&self.tx, self.clog())?;
        Ok(true)
    }

    /// Removes a vertex together with all its incident edges.
    pub fn detach_remove_vertex(&self, vertex: &VertexAccessor<'_>) -> Result<()> {
        self.check_live();
        if let Some(current) = vertex.vlist.find(&self.tx, self.clog(), View::New) {
            for entry in current.record().in_edges.clone() {
                if let Some(edge) = self.find_edge(entry.edge, View::New) {
                    self.remove_edge(&edge, true, false)?;
                }
            }
        }
        if let Some(current) = vertex.vlist.find(&self.tx, self.clog(), View::New) {
            for entry in current.record().out_edges.clone() {
                if let Some(edge) = self.find_edge(entry.edge, View::New) {
                    self.remove_edge(&edge, false, true)?;
                }
            }
        }
        let Some(current) = vertex.vlist.find(&self.tx, self.clog(), View::New) else {
            return Ok(());
        };
        if current.is_expired_by(&self.tx) {
            return Ok(());
        }
        self.emplace_wal(StateDelta::RemoveVertex {
            tx: self.tx.id(),
            gid: vertex.gid(),
        });
        vertex.vlist.remove(&self.tx, self.clog())?;
        Ok(())
    }

    // ---- edges ----

    /// Inserts an edge and records it in the adjacency of both endpoints
    /// ("from" first, which also makes self-loops safe).
    pub fn insert_edge(
        &self,
        from: &VertexAccessor<'_>,
        to: &VertexAccessor<'_>,
        edge_type: EdgeTypeId,
        requested: Option<Gid>,
    ) -> Result<EdgeAccessor<'_>> {
        self.check_live();
        let requested_local = match requested {
            Some(gid) if gid.worker_id() != self.storage.config.worker_id => {
                return Err(StorageError::NotYetImplemented("remote edge insertion"));
            }
            Some(gid) => Some(gid.local()),
            None => None,
        };
        let gid = self.storage.edge_generator.next(requested_local);
        let record = Edge::new(from.gid(), to.gid(), edge_type);
        let vlist = Arc::new(VersionList::new(&self.tx, gid, record));
        // The list must be reachable through the map before the endpoint
        // updates below, so a failed update leaves it collectable.
        match self.storage.edges.entry(gid) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                panic!("attempting to insert an edge with an existing gid: {gid}")
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&vlist));
            }
        }

        let out_entry = EdgeEntry {
            edge: gid,
            vertex: to.gid(),
            edge_type,
        };
        from.vlist
            .update(&self.tx, self.clog(), |v| v.out_edges.push(out_entry))?;
        let in_entry = EdgeEntry {
            edge: gid,
            vertex: from.gid(),
            edge_type,
        };
        to.vlist
            .update(&self.tx, self.clog(), |v| v.in_edges.push(in_entry))?;

        self.emplace_wal(StateDelta::CreateEdge {
            tx: self.tx.id(),
            gid,
            from: from.gid(),
            to: to.gid(),
            edge_type: self.storage.edge_types.id_to_name(edge_type),
        });
        Ok(EdgeAccessor { acc: self, vlist })
    }

    pub fn find_edge(&self, gid: Gid, view: View) -> Option<EdgeAccessor<'_>> {
        self.check_live();
        let vlist = Arc::clone(self.storage.edges.get(&gid)?.value());
        vlist.find(&self.tx, self.clog(), view)?;
        Some(EdgeAccessor { acc: self, vlist })
    }

    pub fn edges(&self, view: View) -> Vec<EdgeAccessor<'_>> {
        self.check_live();
        let lists: Vec<Arc<VersionList<Edge>>> = self
            .storage
            .edges
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        lists
            .into_iter()
            .filter(|vlist| vlist.find(&self.tx, self.clog(), view).is_some())
            .map(|vlist| EdgeAccessor { acc: self, vlist })
            .collect()
    }

    /// Removes an edge, dropping it from the adjacency of the sides asked
    /// for. Removing an already removed edge is idempotent.
    pub fn remove_edge(
        &self,
        edge: &EdgeAccessor<'_>,
        remove_from_from: bool,
        remove_from_to: bool,
    ) -> Result<()> {
        self.check_live();
        let Some(current) = edge.vlist.find(&self.tx, self.clog(), View::New) else {
            return Ok(());
        };
        if current.is_expired_by(&self.tx) {
            return Ok(());
        }
        let gid = edge.gid();
        let record = current.record().clone();
        if remove_from_from {
            let from = self.vertex_list(record.from);
            from.update(&self.tx, self.clog(), |v| {
                v.out_edges.retain(|entry| entry.edge != gid)
            })?;
        }
        if remove_from_to {
            let to = self.vertex_list(record.to);
            to.update(&self.tx, self.clog(), |v| {
                v.in_edges.retain(|entry| entry.edge != gid)
            })?;
        }
        edge.vlist.remove(&self.tx, self.clog())?;
        self.emplace_wal(StateDelta::RemoveEdge {
            tx: self.tx.id(),
            gid,
        });
        Ok(())
    }

    fn vertex_list(&self, gid: Gid) -> Arc<VersionList<Vertex>> {
        Arc::clone(
            self.storage
                .vertices
                .get(&gid)
                .unwrap_or_else(|| panic!("edge endpoint vertex {gid} missing from the store"))
                .value(),
        )
    }

    // ---- counts ----

    /// Total vertex count, uncollected versions included.
    pub fn vertices_count(&self) -> u64 {
        self.check_live();
        self.storage.vertices.len() as u64
    }

    pub fn vertices_count_with_label(&self, label: LabelId) -> u64 {
        self.check_live();
        self.storage.label_index.count(label)
    }

    pub fn vertices_count_with_label_property(&self, label: LabelId, property: PropertyId) -> u64 {
        self.check_live();
        let key = IndexKey { label, property };
        assert!(
            self.storage.label_property_index.exists(key),
            "label-property index does not exist"
        );
        self.storage.label_property_index.count(key)
    }

    pub fn vertices_count_for_value(
        &self,
        label: LabelId,
        property: PropertyId,
        value: &PropertyValue,
    ) -> u64 {
        self.check_live();
        let key = IndexKey { label, property };
        assert!(
            self.storage.label_property_index.exists(key),
            "label-property index does not exist"
        );
        self.storage
            .label_property_index
            .position_and_count(key, value)
            .1
    }

    pub fn vertices_count_in_range(
        &self,
        label: LabelId,
        property: PropertyId,
        lower: Option<&Bound>,
        upper: Option<&Bound>,
    ) -> u64 {
        self.check_live();
        let key = IndexKey { label, property };
        assert!(
            self.storage.label_property_index.exists(key),
            "label-property index does not exist"
        );
        self.storage
            .label_property_index
            .count_in_range(key, lower, upper)
    }

    pub fn edges_count(&self) -> u64 {
        self.check_live();
        self.storage.edges.len() as u64
    }

    // ---- indexes ----

    /// Builds a (label, property) index online, while writers keep running.
    ///
    /// The index is installed first so concurrent writers immediately feed
    /// it; pre-existing transactions are waited out, then a fresh reader
    /// backfills everything it can see.
    pub fn build_index(&self, label: LabelId, property: PropertyId) -> Result<()> {
        self.check_live();
        let _guard = BuildGuard::register(&self.storage.index_build_in_progress, self.tx.id());

        let key = IndexKey { label, property };
        if !self.storage.label_property_index.create(key) {
            return Err(StorageError::IndexExists);
        }

        // Wait for every transaction that may have written before the index
        // became visible to it. Other index builders are exempt, they write
        // no data.
        let wait_for = self.storage.engine.global_active_transactions();
        for id in wait_for.iter() {
            if id == self.tx.id() || self.storage.index_build_in_progress.contains(&id) {
                continue;
            }
            while self.storage.engine.global_is_active(id) {
                if self.storage.index_build_in_progress.contains(&id) {
                    break;
                }
                std::thread::sleep(INDEX_BUILD_POLL);
            }
        }

        // This reader surely sees everything that committed before the
        // index was installed; writers past that point insert on their own.
        let reader = Accessor::new(self.storage);
        let _reader_guard =
            BuildGuard::register(&self.storage.index_build_in_progress, reader.tx.id());
        for gid in self.storage.label_index.gids(label) {
            let Some((_, value)) = reader.indexed_vertex(gid, label, property, View::New) else {
                continue;
            };
            if let Some(ordered) = OrderedValue::new(value) {
                self.storage.label_property_index.insert(key, ordered, gid);
            }
        }
        let reader_tx_id = reader.transaction_id();
        reader.commit()?;
        self.emplace_wal(StateDelta::BuildIndex {
            tx: reader_tx_id,
            label: self.storage.labels.id_to_name(label),
            property: self.storage.properties.id_to_name(property),
        });
        self.storage.label_property_index.mark_ready(key);
        debug!(label, property, "index finished building");
        Ok(())
    }

    /// Human-readable descriptions of all indexes: `:Label` and
    /// `:Label(property)`.
    pub fn index_info(&self) -> Vec<String> {
        self.check_live();
        let mut info: Vec<String> = self
            .storage
            .label_index
            .keys()
            .into_iter()
            .map(|label| format!(":{}", self.storage.labels.id_to_name(label)))
            .collect();
        info.extend(self.storage.label_property_index.keys().into_iter().map(|key| {
            format!(
                ":{}({})",
                self.storage.labels.id_to_name(key.label),
                self.storage.properties.id_to_name(key.property)
            )
        }));
        info.sort();
        info
    }

    // ---- registries & counters ----

    pub fn label(&self, name: &str) -> LabelId {
        self.check_live();
        self.storage.labels.name_to_id(name)
    }

    pub fn label_name(&self, label: LabelId) -> String {
        self.check_live();
        self.storage.labels.id_to_name(label)
    }

    pub fn edge_type(&self, name: &str) -> EdgeTypeId {
        self.check_live();
        self.storage.edge_types.name_to_id(name)
    }

    pub fn edge_type_name(&self, edge_type: EdgeTypeId) -> String {
        self.check_live();
        self.storage.edge_types.id_to_name(edge_type)
    }

    pub fn property(&self, name: &str) -> PropertyId {
        self.check_live();
        self.storage.properties.name_to_id(name)
    }

    pub fn property_name(&self, property: PropertyId) -> String {
        self.check_live();
        self.storage.properties.id_to_name(property)
    }

    /// Returns the current value of the named counter and increments it.
    /// Unknown counters start at zero.
    pub fn counter(&self, name: &str) -> i64 {
        self.storage
            .counters
            .entry(name.to_owned())
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(1, Ordering::SeqCst)
    }

    pub fn counter_set(&self, name: &str, value: i64) {
        self.storage
            .counters
            .entry(name.to_owned())
            .or_insert_with(|| AtomicI64::new(0))
            .store(value, Ordering::SeqCst);
    }
}

impl Drop for Accessor<'_> {
    fn drop(&mut self) {
        if self.state.get() == AccessorState::Active {
            self.storage.engine.abort(&self.tx);
        }
    }
}

struct BuildGuard<'g> {
    set: &'g dashmap::DashSet<TxId>,
    id: TxId,
}

impl<'g> BuildGuard<'g> {
    fn register(set: &'g dashmap::DashSet<TxId>, id: TxId) -> Self {
        set.insert(id);
        Self { set, id }
    }
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

/// A vertex as seen through one accessor.
#[derive(Clone)]
pub struct VertexAccessor<'a> {
    acc: &'a Accessor<'a>,
    vlist: Arc<VersionList<Vertex>>,
}

impl<'a> VertexAccessor<'a> {
    pub fn gid(&self) -> Gid {
        self.vlist.gid()
    }

    fn resolve(&self, view: View) -> Result<Arc<Version<Vertex>>> {
        self.vlist
            .find(&self.acc.tx, self.acc.clog(), view)
            .ok_or(StorageError::RecordDeleted)
    }

    pub fn labels(&self, view: View) -> Result<Vec<LabelId>> {
        Ok(self.resolve(view)?.record().labels.to_vec())
    }

    pub fn has_label(&self, label: LabelId, view: View) -> Result<bool> {
        Ok(self.resolve(view)?.record().has_label(label))
    }

    pub fn property(&self, property: PropertyId, view: View) -> Result<PropertyValue> {
        Ok(self.resolve(view)?.record().property(property))
    }

    pub fn properties(&self, view: View) -> Result<PropertyMap> {
        Ok(self.resolve(view)?.record().properties.clone())
    }

    pub fn out_edges(&self, view: View) -> Result<Vec<EdgeEntry>> {
        Ok(self.resolve(view)?.record().out_edges.clone())
    }

    pub fn in_edges(&self, view: View) -> Result<Vec<EdgeEntry>> {
        Ok(self.resolve(view)?.record().in_edges.clone())
    }

    pub fn out_degree(&self, view: View) -> Result<usize> {
        Ok(self.resolve(view)?.record().out_edges.len())
    }

    pub fn in_degree(&self, view: View) -> Result<usize> {
        Ok(self.resolve(view)?.record().in_edges.len())
    }

    /// Adds a label, feeding both indexes with the new version. Returns
    /// false when the label was already present.
    pub fn add_label(&self, label: LabelId) -> Result<bool> {
        self.acc.check_live();
        if self.resolve(View::New)?.record().has_label(label) {
            return Ok(false);
        }
        let new_version = self
            .vlist
            .update(&self.acc.tx, self.acc.clog(), |v| v.labels.push(label))?;
        self.acc.storage.label_index.update(label, self.gid());
        self.acc.storage.label_property_index.update_on_label(
            label,
            new_version.record(),
            self.gid(),
        );
        self.acc.emplace_wal(StateDelta::AddLabel {
            tx: self.acc.tx.id(),
            gid: self.gid(),
            label: self.acc.storage.labels.id_to_name(label),
        });
        Ok(true)
    }

    /// Removes a label. Returns false when it was not present. Index
    /// entries are left behind and filtered by readers until collected.
    pub fn remove_label(&self, label: LabelId) -> Result<bool> {
        self.acc.check_live();
        if !self.resolve(View::New)?.record().has_label(label) {
            return Ok(false);
        }
        self.vlist.update(&self.acc.tx, self.acc.clog(), |v| {
            v.labels.retain(|l| *l != label)
        })?;
        self.acc.emplace_wal(StateDelta::RemoveLabel {
            tx: self.acc.tx.id(),
            gid: self.gid(),
            label: self.acc.storage.labels.id_to_name(label),
        });
        Ok(true)
    }

    /// Sets a property (`Null` removes it) and returns the previous value.
    pub fn set_property(&self, property: PropertyId, value: PropertyValue) -> Result<PropertyValue> {
        self.acc.check_live();
        let mut old = PropertyValue::Null;
        let written = value.clone();
        let new_version = self.vlist.update(&self.acc.tx, self.acc.clog(), |v| {
            old = set_map_property(&mut v.properties, property, value);
        })?;
        self.acc.storage.label_property_index.update_on_property(
            property,
            new_version.record(),
            self.gid(),
        );
        self.acc.emplace_wal(StateDelta::SetProperty {
            tx: self.acc.tx.id(),
            gid: self.gid(),
            on_edge: false,
            property: self.acc.storage.properties.id_to_name(property),
            value: written,
        });
        Ok(old)
    }
}

/// An edge as seen through one accessor.
#[derive(Clone)]
pub struct EdgeAccessor<'a> {
    acc: &'a Accessor<'a>,
    vlist: Arc<VersionList<Edge>>,
}

impl<'a> EdgeAccessor<'a> {
    pub fn gid(&self) -> Gid {
        self.vlist.gid()
    }

    fn resolve(&self, view: View) -> Result<Arc<Version<Edge>>> {
        self.vlist
            .find(&self.acc.tx, self.acc.clog(), view)
            .ok_or(StorageError::RecordDeleted)
    }

    pub fn edge_type(&self, view: View) -> Result<EdgeTypeId> {
        Ok(self.resolve(view)?.record().edge_type)
    }

    pub fn from(&self, view: View) -> Result<VertexAccessor<'a>> {
        let gid = self.resolve(view)?.record().from;
        Ok(VertexAccessor {
            acc: self.acc,
            vlist: self.acc.vertex_list(gid),
        })
    }

    pub fn to(&self, view: View) -> Result<VertexAccessor<'a>> {
        let gid = self.resolve(view)?.record().to;
        Ok(VertexAccessor {
            acc: self.acc,
            vlist: self.acc.vertex_list(gid),
        })
    }

    pub fn property(&self, property: PropertyId, view: View) -> Result<PropertyValue> {
        Ok(self.resolve(view)?.record().property(property))
    }

    pub fn properties(&self, view: View) -> Result<PropertyMap> {
        Ok(self.resolve(view)?.record().properties.clone())
    }

    /// Sets an edge property (`Null` removes it) and returns the previous
    /// value. Edges are not indexed.
    pub fn set_property(&self, property: PropertyId, value: PropertyValue) -> Result<PropertyValue> {
        self.acc.check_live();
        let mut old = PropertyValue::Null;
        let written = value.clone();
        self.vlist.update(&self.acc.tx, self.acc.clog(), |e| {
            old = set_map_property(&mut e.properties, property, value);
        })?;
        self.acc.emplace_wal(StateDelta::SetProperty {
            tx: self.acc.tx.id(),
            gid: self.gid(),
            on_edge: true,
            property: self.acc.storage.properties.id_to_name(property),
            value: written,
        });
        Ok(old)
    }
}
