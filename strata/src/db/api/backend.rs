use crate::{
    db::api::{
        scan::{ScanConfig, ScanJob, ScanMetrics},
        vertex::PreloadedVertex,
    },
    errors::BackendError,
};
use std::sync::Arc;
use strata_api::core::entities::{
    properties::{prop::Prop, LoadedProperties},
    IdManager, VID,
};
use strata_core::entities::compute_keys::Cardinality;

/// A graph store the computer can run on.
pub trait ComputeGraph: Send + Sync + 'static {
    type Tx: ComputeTransaction;

    fn id_manager(&self) -> Arc<dyn IdManager>;

    /// Upper bound on the number of workers the store can serve concurrently
    fn max_workers(&self) -> usize;

    /// Runs `job` once for every vertex row
    fn scan(&self, job: &dyn ScanJob, config: &ScanConfig) -> Result<ScanMetrics, BackendError>;

    fn read_only_tx(&self) -> Result<Self::Tx, BackendError>;

    /// A transaction for bulk writes; consistency checks may be relaxed
    fn batch_loading_tx(&self) -> Result<Self::Tx, BackendError>;

    fn new_tx(&self) -> Result<Self::Tx, BackendError>;

    fn management(&self) -> Result<Box<dyn SchemaManagement + '_>, BackendError>;
}

pub trait ComputeTransaction: Send {
    fn contains_vertex(&self, vid: VID) -> Result<bool, BackendError>;

    /// Builds a fully loaded vertex from its row and the given persisted properties
    fn preloaded_vertex(
        &self,
        vid: VID,
        properties: LoadedProperties,
    ) -> Result<PreloadedVertex, BackendError>;

    fn property(&self, vid: VID, key: &str) -> Result<Option<Prop>, BackendError>;

    fn set_property(
        &mut self,
        vid: VID,
        cardinality: Cardinality,
        key: &str,
        value: Prop,
    ) -> Result<(), BackendError>;

    fn commit(&mut self) -> Result<(), BackendError>;

    fn rollback(&mut self);

    fn is_open(&self) -> bool;
}

pub trait SchemaManagement {
    fn contains_property_key(&self, key: &str) -> bool;

    fn get_or_create_property_key(&mut self, key: &str) -> Result<(), BackendError>;

    fn commit(self: Box<Self>) -> Result<(), BackendError>;

    fn rollback(self: Box<Self>);
}
