use crate::{
    db::{
        api::{
            scan::{ScanJob, ScanMetrics},
            vertex::{PreloadedVertex, SliceQuery},
        },
        task::{eval_vertex::EvalVertexView, program::VertexProgram},
    },
    errors::ProgramError,
};
use std::sync::Arc;
use strata_api::core::{entities::IdManager, Direction};
use strata_core::{
    entities::{combiner::fold_messages, scope::MessageScope},
    state::{memory::ComputerMemory, vertex_memory::VertexMemory},
};

/// Runs one superstep of a vertex program as a scan over all vertex rows.
///
/// Rows of partitioned vertices do not execute here. They only contribute to the vertex's
/// partition aggregate: the canonical row its persisted properties, every row the combined
/// messages it received. The aggregate is executed once all rows were scanned.
pub(crate) struct VertexProgramScanJob<'a, M> {
    id_manager: Arc<dyn IdManager>,
    memory: &'a ComputerMemory,
    vertex_memory: &'a VertexMemory<M>,
    program: &'a dyn VertexProgram<M>,
}

impl<'a, M: Clone + Send + Sync + 'static> VertexProgramScanJob<'a, M> {
    pub(crate) fn new(
        id_manager: Arc<dyn IdManager>,
        memory: &'a ComputerMemory,
        vertex_memory: &'a VertexMemory<M>,
        program: &'a dyn VertexProgram<M>,
    ) -> Self {
        Self {
            id_manager,
            memory,
            vertex_memory,
            program,
        }
    }

    fn aggregate_partition_row(&self, vertex: &PreloadedVertex) -> Result<(), ProgramError> {
        let vid = vertex.id();
        let canonical = self.id_manager.canonical(vid);
        if self.id_manager.is_canonical(vid) {
            self.vertex_memory.set_loaded_properties(
                canonical,
                vertex.loaded_properties().cloned().unwrap_or_default(),
            );
        }
        let view = EvalVertexView::new(vertex, canonical, self.vertex_memory);
        for scope in self.vertex_memory.previous_scopes().iter() {
            if !scope.is_local() {
                continue;
            }
            let received = view.receive_messages(scope)?;
            if let Some(msg) = fold_messages(self.vertex_memory.combiner(), received)? {
                self.vertex_memory
                    .aggregate_message(canonical, msg, &scope.id())?;
            }
        }
        Ok(())
    }
}

impl<M: Clone + Send + Sync + 'static> ScanJob for VertexProgramScanJob<'_, M> {
    fn worker_iteration_start(&self, _metrics: &ScanMetrics) {
        self.program.worker_iteration_start(self.memory);
    }

    fn worker_iteration_end(&self, _metrics: &ScanMetrics) {
        self.program.worker_iteration_end(self.memory);
    }

    fn process(
        &self,
        vertex: &PreloadedVertex,
        _metrics: &ScanMetrics,
    ) -> Result<(), ProgramError> {
        let vid = vertex.id();
        if self.id_manager.is_partitioned(vid) {
            self.aggregate_partition_row(vertex)
        } else {
            let view = EvalVertexView::new(vertex, vid, self.vertex_memory);
            self.program.execute(&view, self.memory)
        }
    }

    fn queries(&self) -> Vec<SliceQuery> {
        let mut queries = vec![SliceQuery::Properties];
        for scope in self.vertex_memory.previous_scopes().iter() {
            let query = match scope {
                MessageScope::Global(_) => SliceQuery::all_edges(),
                MessageScope::Local(local) => {
                    SliceQuery::edges(local.direction().reverse(), local.labels().to_vec())
                }
            };
            if !queries.contains(&query) {
                queries.push(query);
            }
        }
        queries
    }
}

/// The slices a program needs when it can read its edges in any direction
pub(crate) fn full_vertex_queries() -> Vec<SliceQuery> {
    vec![
        SliceQuery::Properties,
        SliceQuery::edges(Direction::BOTH, Vec::new()),
    ]
}
