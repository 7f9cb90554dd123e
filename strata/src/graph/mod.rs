//! Defines [`InMemoryGraph`], a complete in-process graph store the computer can run on.
//!
//! Vertices are stored as rows keyed by [`VID`]. Each row keeps its own properties and the edges
//! incident to it, so an edge is stored twice: as an outgoing edge on its source row and as an
//! incoming edge on its destination row. A partitioned vertex is a set of rows sharing one
//! canonical id; the canonical row holds the properties, edges may live on any row.
//!
//! # Examples
//!
//! ```rust
//! use strata::graph::InMemoryGraph;
//! use strata::prelude::*;
//!
//! let graph = InMemoryGraph::new();
//! graph.add_vertex(1, [("name", "Alice")]);
//! graph.add_edge(1, 2, "knows");
//! assert_eq!(graph.num_vertices(), 2);
//! assert_eq!(graph.property(VID(1), "name"), Some(Prop::str("Alice")));
//! ```

pub mod transaction;

use crate::{
    db::{
        api::{
            backend::{ComputeGraph, SchemaManagement},
            scan::{ScanConfig, ScanJob, ScanMetrics, StandardScanner, VertexSource},
            vertex::{PreloadedVertex, SliceQuery},
        },
        task::DEFAULT_WORKERS,
    },
    errors::BackendError,
};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::{
    collections::BTreeMap,
    fmt::{self, Debug, Formatter},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use strata_api::core::{
    entities::{
        edges::edge_ref::EdgeRef,
        properties::{prop::Prop, LoadedProperties},
        IdManager, VID,
    },
    storage::arc_str::ArcStr,
};
pub use transaction::{InMemorySchema, InMemoryTransaction};

#[derive(Debug, Default, Clone)]
pub(crate) struct VertexStore {
    pub(crate) properties: BTreeMap<ArcStr, Prop>,
    pub(crate) edges: Vec<EdgeRef>,
}

impl VertexStore {
    fn loaded_properties(&self) -> LoadedProperties {
        LoadedProperties::new(
            self.properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        )
    }
}

#[derive(Debug)]
pub(crate) struct GraphStorage {
    pub(crate) vertices: RwLock<BTreeMap<VID, VertexStore>>,
    pub(crate) property_keys: RwLock<FxHashSet<ArcStr>>,
    /// Maps every row of a partitioned vertex to its canonical row
    partitions: RwLock<FxHashMap<VID, VID>>,
    max_workers: usize,
    failing_commits: AtomicUsize,
}

impl GraphStorage {
    /// Consumes one injected commit failure if any are left
    pub(crate) fn take_commit_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Rows stored for `canonical`, in id order; a plain vertex is its own single row
    pub(crate) fn rows_of(&self, canonical: VID) -> Vec<VID> {
        let mut rows: Vec<VID> = self
            .partitions
            .read()
            .iter()
            .filter(|(_, c)| **c == canonical)
            .map(|(row, _)| *row)
            .collect();
        if rows.is_empty() {
            rows.push(canonical);
        }
        rows.sort();
        rows
    }
}

impl IdManager for GraphStorage {
    fn is_partitioned(&self, vid: VID) -> bool {
        self.partitions.read().contains_key(&vid)
    }

    fn is_canonical(&self, vid: VID) -> bool {
        self.partitions
            .read()
            .get(&vid)
            .map_or(true, |canonical| *canonical == vid)
    }

    fn canonical(&self, vid: VID) -> VID {
        self.partitions.read().get(&vid).copied().unwrap_or(vid)
    }
}

/// A graph held entirely in memory.
///
/// Cloning is cheap and clones share the same storage.
#[derive(Clone)]
pub struct InMemoryGraph {
    inner: Arc<GraphStorage>,
}

impl Debug for InMemoryGraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryGraph")
            .field("num_vertices", &self.num_vertices())
            .field("max_workers", &self.inner.max_workers)
            .finish()
    }
}

impl Default for InMemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGraph {
    /// An empty graph serving up to as many workers as the machine has cores
    pub fn new() -> Self {
        Self::with_max_workers(*DEFAULT_WORKERS)
    }

    pub fn with_max_workers(max_workers: usize) -> Self {
        Self {
            inner: Arc::new(GraphStorage {
                vertices: RwLock::new(BTreeMap::new()),
                property_keys: RwLock::new(FxHashSet::default()),
                partitions: RwLock::new(FxHashMap::default()),
                max_workers: max_workers.max(1),
                failing_commits: AtomicUsize::new(0),
            }),
        }
    }

    /// Adds a vertex row or merges `props` into an existing one
    pub fn add_vertex<K: Into<ArcStr>, V: Into<Prop>>(
        &self,
        vid: u64,
        props: impl IntoIterator<Item = (K, V)>,
    ) {
        let props: Vec<(ArcStr, Prop)> = props
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        {
            let mut keys = self.inner.property_keys.write();
            for (key, _) in &props {
                keys.insert(key.clone());
            }
        }
        let mut vertices = self.inner.vertices.write();
        let store = vertices.entry(VID(vid)).or_default();
        store.properties.extend(props);
    }

    /// Adds a directed edge, creating missing endpoints
    pub fn add_edge(&self, src: u64, dst: u64, label: &str) {
        let (src, dst) = (VID(src), VID(dst));
        let label = ArcStr::from(label);
        let mut vertices = self.inner.vertices.write();
        vertices
            .entry(src)
            .or_default()
            .edges
            .push(EdgeRef::new_outgoing(src, dst, label.clone()));
        vertices
            .entry(dst)
            .or_default()
            .edges
            .push(EdgeRef::new_incoming(src, dst, label));
    }

    /// Declares `rows` (and `canonical` itself) as the physical rows of one partitioned vertex
    pub fn add_partitioned_vertex(&self, canonical: u64, rows: impl IntoIterator<Item = u64>) {
        let canonical = VID(canonical);
        let mut vertices = self.inner.vertices.write();
        let mut partitions = self.inner.partitions.write();
        vertices.entry(canonical).or_default();
        partitions.insert(canonical, canonical);
        for row in rows.into_iter().map(VID) {
            vertices.entry(row).or_default();
            partitions.insert(row, canonical);
        }
    }

    /// Committed value of a property on a vertex row
    pub fn property(&self, vid: VID, key: &str) -> Option<Prop> {
        self.inner
            .vertices
            .read()
            .get(&vid)
            .and_then(|v| v.properties.get(key).cloned())
    }

    pub fn contains_vertex(&self, vid: VID) -> bool {
        self.inner.vertices.read().contains_key(&vid)
    }

    pub fn remove_vertex(&self, vid: VID) -> bool {
        self.inner.vertices.write().remove(&vid).is_some()
    }

    pub fn contains_property_key(&self, key: &str) -> bool {
        self.inner.property_keys.read().contains(key)
    }

    /// Number of vertex rows
    pub fn num_vertices(&self) -> usize {
        self.inner.vertices.read().len()
    }

    /// Makes the next `n` commits of write transactions fail
    pub fn fail_next_commits(&self, n: usize) {
        self.inner.failing_commits.store(n, Ordering::Release);
    }
}

impl VertexSource for InMemoryGraph {
    fn vertex_ids(&self) -> Vec<VID> {
        self.inner.vertices.read().keys().copied().collect()
    }

    fn load_vertex(
        &self,
        vid: VID,
        queries: &[SliceQuery],
    ) -> Result<Option<PreloadedVertex>, BackendError> {
        let vertices = self.inner.vertices.read();
        let Some(store) = vertices.get(&vid) else {
            return Ok(None);
        };
        let properties = queries
            .contains(&SliceQuery::Properties)
            .then(|| store.loaded_properties());
        let edge_slices: Vec<SliceQuery> = queries
            .iter()
            .filter(|q| matches!(q, SliceQuery::Edges { .. }))
            .cloned()
            .collect();
        let edges = store
            .edges
            .iter()
            .filter(|edge| {
                edge_slices.iter().any(|slice| match slice {
                    SliceQuery::Edges { direction, labels } => edge.matches(*direction, labels),
                    SliceQuery::Properties => false,
                })
            })
            .cloned()
            .collect();
        Ok(Some(PreloadedVertex::new(vid, properties, edges, edge_slices)))
    }
}

impl ComputeGraph for InMemoryGraph {
    type Tx = InMemoryTransaction;

    fn id_manager(&self) -> Arc<dyn IdManager> {
        self.inner.clone()
    }

    fn max_workers(&self) -> usize {
        self.inner.max_workers
    }

    fn scan(&self, job: &dyn ScanJob, config: &ScanConfig) -> Result<ScanMetrics, BackendError> {
        StandardScanner::new(self).execute(job, config)
    }

    fn read_only_tx(&self) -> Result<Self::Tx, BackendError> {
        Ok(InMemoryTransaction::new(self.inner.clone(), true))
    }

    fn batch_loading_tx(&self) -> Result<Self::Tx, BackendError> {
        Ok(InMemoryTransaction::new(self.inner.clone(), false))
    }

    fn new_tx(&self) -> Result<Self::Tx, BackendError> {
        Ok(InMemoryTransaction::new(self.inner.clone(), false))
    }

    fn management(&self) -> Result<Box<dyn SchemaManagement + '_>, BackendError> {
        Ok(Box::new(InMemorySchema::new(&self.inner)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::api::backend::ComputeTransaction;
    use pretty_assertions::assert_eq;
    use strata_api::core::{entities::properties::LoadedProperties, Direction};
    use strata_core::entities::compute_keys::Cardinality;

    #[test]
    fn edges_are_stored_on_both_endpoints() {
        let g = InMemoryGraph::new();
        g.add_edge(1, 2, "a");
        g.add_edge(3, 1, "b");
        let v = g
            .load_vertex(VID(1), &[SliceQuery::all_edges()])
            .unwrap()
            .unwrap();
        let out: Vec<_> = v.edges(Direction::OUT, &[]).unwrap().map(|e| e.remote()).collect();
        let into: Vec<_> = v.edges(Direction::IN, &[]).unwrap().map(|e| e.remote()).collect();
        assert_eq!(out, vec![VID(2)]);
        assert_eq!(into, vec![VID(3)]);
        assert!(v.property("x").is_err());
    }

    #[test]
    fn only_requested_slices_are_loaded() {
        let g = InMemoryGraph::new();
        g.add_vertex(1, [("x", 1i64)]);
        g.add_edge(1, 2, "a");
        g.add_edge(1, 3, "b");
        let labels: Arc<[ArcStr]> = Arc::from(vec![ArcStr::from("a")]);
        let v = g
            .load_vertex(
                VID(1),
                &[SliceQuery::Properties, SliceQuery::edges(Direction::OUT, labels.clone())],
            )
            .unwrap()
            .unwrap();
        assert_eq!(v.property("x").unwrap(), Some(&Prop::I64(1)));
        let out: Vec<_> = v.edges(Direction::OUT, &labels).unwrap().map(|e| e.dst()).collect();
        assert_eq!(out, vec![VID(2)]);
        assert!(v.edges(Direction::OUT, &[]).is_err());
        assert!(v.edges(Direction::IN, &labels).is_err());
        assert!(g.load_vertex(VID(9), &[]).unwrap().is_none());
    }

    #[test]
    fn partitioned_rows_resolve_to_canonical() {
        let g = InMemoryGraph::new();
        g.add_partitioned_vertex(4, [5, 6]);
        g.add_vertex(7, [("x", 1i64)]);
        let ids = g.id_manager();
        assert!(ids.is_partitioned(VID(5)));
        assert!(ids.is_partitioned(VID(4)));
        assert!(!ids.is_partitioned(VID(7)));
        assert!(ids.is_canonical(VID(4)));
        assert!(!ids.is_canonical(VID(6)));
        assert!(ids.is_canonical(VID(7)));
        assert_eq!(ids.canonical(VID(6)), VID(4));
        assert_eq!(ids.canonical(VID(7)), VID(7));
        assert_eq!(g.num_vertices(), 4);
    }

    #[test]
    fn preloaded_partitioned_vertex_carries_edges_of_all_rows() {
        let g = InMemoryGraph::new();
        g.add_partitioned_vertex(4, [5, 6]);
        g.add_edge(4, 1, "a");
        g.add_edge(5, 2, "a");
        g.add_edge(6, 3, "a");
        g.add_edge(9, 6, "a");
        let tx = g.read_only_tx().unwrap();
        let v = tx
            .preloaded_vertex(VID(4), LoadedProperties::default())
            .unwrap();
        let out: Vec<_> = v.edges(Direction::OUT, &[]).unwrap().map(|e| e.dst()).collect();
        let into: Vec<_> = v.edges(Direction::IN, &[]).unwrap().map(|e| e.src()).collect();
        assert_eq!(out, vec![VID(1), VID(2), VID(3)]);
        assert_eq!(into, vec![VID(9)]);

        let plain = tx
            .preloaded_vertex(VID(9), LoadedProperties::default())
            .unwrap();
        assert_eq!(plain.edges(Direction::BOTH, &[]).unwrap().count(), 1);
        assert_eq!(
            tx.preloaded_vertex(VID(8), LoadedProperties::default())
                .err(),
            Some(BackendError::VertexNotFound(VID(8)))
        );
    }

    #[test]
    fn transactions_overlay_and_commit() {
        let g = InMemoryGraph::new();
        g.add_vertex(1, [("x", 1i64)]);
        let mut tx = g.new_tx().unwrap();
        assert!(!tx.is_read_only());
        tx.set_property(VID(1), Cardinality::Single, "x", Prop::I64(2))
            .unwrap();
        tx.set_property(VID(1), Cardinality::List, "l", Prop::I64(1))
            .unwrap();
        tx.set_property(VID(1), Cardinality::List, "l", Prop::I64(2))
            .unwrap();
        assert_eq!(tx.num_pending(), 2);
        assert_eq!(tx.property(VID(1), "x").unwrap(), Some(Prop::I64(2)));
        assert_eq!(g.property(VID(1), "x"), Some(Prop::I64(1)));
        assert_eq!(
            tx.set_property(VID(8), Cardinality::Single, "x", Prop::I64(2)),
            Err(BackendError::VertexNotFound(VID(8)))
        );
        tx.commit().unwrap();
        assert!(!tx.is_open());
        assert_eq!(tx.num_pending(), 0);
        assert_eq!(g.property(VID(1), "x"), Some(Prop::I64(2)));
        assert_eq!(g.property(VID(1), "l"), Some(Prop::list([1i64, 2])));
        assert_eq!(tx.commit(), Err(BackendError::TransactionClosed));
    }

    #[test]
    fn read_only_transactions_reject_writes() {
        let g = InMemoryGraph::new();
        g.add_vertex(1, [("x", 1i64)]);
        let mut tx = g.read_only_tx().unwrap();
        assert!(tx.is_read_only());
        assert_eq!(
            tx.set_property(VID(1), Cardinality::Single, "x", Prop::I64(2)),
            Err(BackendError::ReadOnlyTransaction)
        );
        assert_eq!(tx.num_pending(), 0);
    }

    #[test]
    fn injected_commit_failures_are_consumed() {
        let g = InMemoryGraph::new();
        g.add_vertex(1, [("x", 1i64)]);
        g.fail_next_commits(1);
        let mut tx = g.batch_loading_tx().unwrap();
        tx.set_property(VID(1), Cardinality::Single, "x", Prop::I64(5))
            .unwrap();
        assert!(tx.commit().is_err());
        assert!(tx.is_open());
        tx.rollback();
        assert!(!tx.is_open());
        assert_eq!(g.property(VID(1), "x"), Some(Prop::I64(1)));

        let mut tx = g.batch_loading_tx().unwrap();
        tx.set_property(VID(1), Cardinality::Single, "x", Prop::I64(5))
            .unwrap();
        tx.commit().unwrap();
        assert_eq!(g.property(VID(1), "x"), Some(Prop::I64(5)));
    }

    #[test]
    fn schema_keys_are_created_on_commit() {
        let g = InMemoryGraph::new();
        let mut schema = g.management().unwrap();
        assert!(!schema.contains_property_key("degree"));
        schema.get_or_create_property_key("degree").unwrap();
        assert!(schema.contains_property_key("degree"));
        assert!(!g.contains_property_key("degree"));
        schema.commit().unwrap();
        assert!(g.contains_property_key("degree"));
    }
}
