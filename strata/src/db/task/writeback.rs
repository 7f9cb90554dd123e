use crate::{
    db::{
        api::backend::{ComputeGraph, ComputeTransaction},
        task::{
            custom_pool,
            program::{Persist, ResultGraph},
            result::ResultGraphView,
        },
    },
    errors::{BackendError, ComputerError},
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use strata_api::core::{
    entities::{properties::prop::Prop, VID},
    storage::arc_str::ArcStr,
};
use strata_core::{entities::compute_keys::Cardinality, state::vertex_memory::VertexMemory};
use tracing::{debug, error, info, warn};

type VertexProperties = (VID, Vec<(ArcStr, Prop)>);

/// Writes the non-transient compute-key values of a finished computation back to the graph.
pub(crate) struct ResultWriter<'a, G> {
    graph: &'a Arc<G>,
    num_threads: usize,
    write_batch_size: usize,
}

impl<'a, G: ComputeGraph> ResultWriter<'a, G> {
    pub(crate) fn new(graph: &'a Arc<G>, num_threads: usize, write_batch_size: usize) -> Self {
        Self {
            graph,
            num_threads,
            write_batch_size: write_batch_size.max(1),
        }
    }

    pub(crate) fn write<M: Clone + Send + Sync + 'static>(
        &self,
        result_graph: ResultGraph,
        persist: Persist,
        vertex_memory: Option<&VertexMemory<M>>,
    ) -> Result<ResultGraphView<G>, ComputerError> {
        if persist == Persist::Nothing && result_graph == ResultGraph::New {
            return Ok(ResultGraphView::Empty);
        }
        let vertex_memory = match vertex_memory {
            Some(vm) if persist != Persist::Nothing && vm.keys().has_persistent() => vm,
            _ => return Ok(ResultGraphView::Original(self.graph.clone())),
        };

        let keys: Vec<&ArcStr> = vertex_memory
            .keys()
            .persistent()
            .map(|(_, key)| key.key())
            .collect();
        self.ensure_schema(&keys)?;

        let mut mutated: Vec<VertexProperties> =
            vertex_memory.mutable_vertex_properties().into_iter().collect();
        mutated.sort_by_key(|(vid, _)| *vid);
        info!(
            num_vertices = mutated.len(),
            result_graph = ?result_graph,
            "writing back vertex properties"
        );

        match result_graph {
            ResultGraph::Original => {
                self.write_original(mutated)?;
                Ok(ResultGraphView::Original(self.graph.clone()))
            }
            ResultGraph::New => Ok(ResultGraphView::Transaction(self.write_new(mutated)?)),
        }
    }

    fn ensure_schema(&self, keys: &[&ArcStr]) -> Result<(), BackendError> {
        let mut management = self.graph.management()?;
        for key in keys {
            if !management.contains_property_key(key) {
                warn!(key = %key, "Property key is not declared in the schema, creating it");
                if let Err(err) = management.get_or_create_property_key(key) {
                    management.rollback();
                    return Err(err);
                }
            }
        }
        management.commit()
    }

    fn batches(&self, mutated: Vec<VertexProperties>) -> Vec<Vec<VertexProperties>> {
        let mut batches = Vec::new();
        let mut batch = Vec::new();
        let mut elements = 0;
        for entry in mutated {
            elements += entry.1.len();
            batch.push(entry);
            if elements >= self.write_batch_size {
                batches.push(std::mem::take(&mut batch));
                elements = 0;
            }
        }
        if !batch.is_empty() {
            batches.push(batch);
        }
        batches
    }

    fn write_original(&self, mutated: Vec<VertexProperties>) -> Result<(), ComputerError> {
        let batches = self.batches(mutated);
        debug!(num_batches = batches.len(), "writing back to original graph");
        let failures = AtomicUsize::new(0);
        let pool = custom_pool(self.num_threads, "writeback")
            .map_err(|e| BackendError::WorkerPool(e.to_string()))?;
        let failures_ref = &failures;
        pool.scope(|s| {
            for batch in batches {
                s.spawn(move |_| {
                    let mut tx = None;
                    if let Err(err) = self.write_batch(&batch, &mut tx) {
                        failures_ref.fetch_add(1, Ordering::Relaxed);
                        error!(
                            batch_size = batch.len(),
                            "Could not commit transaction during write-back: {err}"
                        );
                        if let Some(tx) = tx.as_mut().filter(|tx| tx.is_open()) {
                            tx.rollback();
                        }
                    }
                });
            }
        });
        let failures = failures.into_inner();
        if failures > 0 {
            return Err(ComputerError::WriteBackFailure { failures });
        }
        Ok(())
    }

    fn write_batch(
        &self,
        batch: &[VertexProperties],
        tx_slot: &mut Option<G::Tx>,
    ) -> Result<(), BackendError> {
        let tx = tx_slot.insert(self.graph.batch_loading_tx()?);
        for (vid, properties) in batch {
            // the vertex may have been removed concurrently
            if !tx.contains_vertex(*vid)? {
                continue;
            }
            for (key, value) in properties {
                tx.set_property(*vid, Cardinality::Single, key, value.clone())?;
            }
        }
        tx.commit()
    }

    fn write_new(&self, mutated: Vec<VertexProperties>) -> Result<G::Tx, ComputerError> {
        let mut tx = self.graph.new_tx()?;
        for (vid, properties) in mutated {
            if !tx.contains_vertex(vid)? {
                tx.rollback();
                return Err(BackendError::VertexNotFound(vid).into());
            }
            for (key, value) in properties {
                match value {
                    Prop::List(values) => {
                        for v in values.iter() {
                            tx.set_property(vid, Cardinality::List, &key, v.clone())?;
                        }
                    }
                    value => tx.set_property(vid, Cardinality::Single, &key, value)?,
                }
            }
        }
        Ok(tx)
    }
}
