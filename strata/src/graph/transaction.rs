use crate::{
    db::api::{
        backend::{ComputeTransaction, SchemaManagement},
        vertex::{PreloadedVertex, SliceQuery},
    },
    errors::BackendError,
    graph::GraphStorage,
};
use std::{collections::BTreeMap, sync::Arc};
use strata_api::core::{
    entities::{
        properties::{prop::Prop, LoadedProperties},
        VID,
    },
    storage::arc_str::ArcStr,
};
use strata_core::entities::compute_keys::Cardinality;
use tracing::trace;

/// A transaction over an [`InMemoryGraph`](crate::graph::InMemoryGraph).
///
/// Writes are buffered in an overlay that reads see immediately; committing applies the overlay
/// to the graph atomically.
#[derive(Debug)]
pub struct InMemoryTransaction {
    storage: Arc<GraphStorage>,
    overlay: BTreeMap<(VID, ArcStr), Prop>,
    read_only: bool,
    open: bool,
}

impl InMemoryTransaction {
    pub(crate) fn new(storage: Arc<GraphStorage>, read_only: bool) -> Self {
        Self {
            storage,
            overlay: BTreeMap::new(),
            read_only,
            open: true,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Number of pending property writes
    pub fn num_pending(&self) -> usize {
        self.overlay.len()
    }

    fn check_open(&self) -> Result<(), BackendError> {
        if self.open {
            Ok(())
        } else {
            Err(BackendError::TransactionClosed)
        }
    }
}

impl ComputeTransaction for InMemoryTransaction {
    fn contains_vertex(&self, vid: VID) -> Result<bool, BackendError> {
        self.check_open()?;
        Ok(self.storage.vertices.read().contains_key(&vid))
    }

    fn preloaded_vertex(
        &self,
        vid: VID,
        properties: LoadedProperties,
    ) -> Result<PreloadedVertex, BackendError> {
        self.check_open()?;
        let rows = self.storage.rows_of(vid);
        let vertices = self.storage.vertices.read();
        if !vertices.contains_key(&vid) {
            return Err(BackendError::VertexNotFound(vid));
        }
        // a partitioned vertex carries the edges of all its rows
        let edges = rows
            .iter()
            .filter_map(|row| vertices.get(row))
            .flat_map(|store| store.edges.iter().cloned())
            .collect();
        Ok(PreloadedVertex::new(
            vid,
            Some(properties),
            edges,
            vec![SliceQuery::all_edges()],
        ))
    }

    fn property(&self, vid: VID, key: &str) -> Result<Option<Prop>, BackendError> {
        self.check_open()?;
        if let Some(value) = self.overlay.get(&(vid, ArcStr::from(key))) {
            return Ok(Some(value.clone()));
        }
        Ok(self
            .storage
            .vertices
            .read()
            .get(&vid)
            .and_then(|v| v.properties.get(key).cloned()))
    }

    fn set_property(
        &mut self,
        vid: VID,
        cardinality: Cardinality,
        key: &str,
        value: Prop,
    ) -> Result<(), BackendError> {
        self.check_open()?;
        if self.read_only {
            return Err(BackendError::ReadOnlyTransaction);
        }
        if !self.contains_vertex(vid)? {
            return Err(BackendError::VertexNotFound(vid));
        }
        let value = match cardinality {
            Cardinality::Single => value,
            Cardinality::List => Prop::append(self.property(vid, key)?, value),
        };
        self.overlay.insert((vid, ArcStr::from(key)), value);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), BackendError> {
        self.check_open()?;
        if !self.read_only && !self.overlay.is_empty() {
            if self.storage.take_commit_failure() {
                return Err(BackendError::Storage("commit rejected by storage".to_string()));
            }
            let mut vertices = self.storage.vertices.write();
            for ((vid, key), value) in std::mem::take(&mut self.overlay) {
                // vertices removed since the write are skipped
                if let Some(store) = vertices.get_mut(&vid) {
                    store.properties.insert(key, value);
                }
            }
        }
        self.open = false;
        trace!(read_only = self.read_only, "transaction committed");
        Ok(())
    }

    fn rollback(&mut self) {
        self.overlay.clear();
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Schema changes to an [`InMemoryGraph`](crate::graph::InMemoryGraph), applied on commit.
#[derive(Debug)]
pub struct InMemorySchema<'a> {
    storage: &'a GraphStorage,
    pending: Vec<ArcStr>,
}

impl<'a> InMemorySchema<'a> {
    pub(crate) fn new(storage: &'a GraphStorage) -> Self {
        Self {
            storage,
            pending: Vec::new(),
        }
    }
}

impl SchemaManagement for InMemorySchema<'_> {
    fn contains_property_key(&self, key: &str) -> bool {
        self.pending.iter().any(|k| k == key) || self.storage.property_keys.read().contains(key)
    }

    fn get_or_create_property_key(&mut self, key: &str) -> Result<(), BackendError> {
        if !self.contains_property_key(key) {
            self.pending.push(ArcStr::from(key));
        }
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), BackendError> {
        self.storage.property_keys.write().extend(self.pending);
        Ok(())
    }

    fn rollback(self: Box<Self>) {}
}
