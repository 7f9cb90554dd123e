use crate::{
    db::{
        api::{
            backend::{ComputeGraph, ComputeTransaction},
            scan::ScanMetrics,
        },
        task::{catch_failure, custom_pool, eval_vertex::EvalVertexView, program::VertexProgram},
    },
    errors::{BackendError, ComputerError},
};
use strata_api::core::entities::{properties::LoadedProperties, VID};
use strata_core::state::{memory::ComputerMemory, vertex_memory::VertexMemory};
use tracing::{debug, error, warn};

pub const GHOST_PARTITION_VERTEX: &str = "partition-ghost";
pub const PARTITION_VERTEX_POSTSUCCESS: &str = "partition-success";
pub const PARTITION_VERTEX_POSTFAIL: &str = "partition-fail";

/// Executes the program once for every partitioned vertex after all of its rows were scanned.
pub(crate) struct PartitionedVertexProgramExecutor<'a, G, M> {
    graph: &'a G,
    memory: &'a ComputerMemory,
    vertex_memory: &'a VertexMemory<M>,
    program: &'a dyn VertexProgram<M>,
}

impl<'a, G: ComputeGraph, M: Clone + Send + Sync + 'static>
    PartitionedVertexProgramExecutor<'a, G, M>
{
    pub(crate) fn new(
        graph: &'a G,
        memory: &'a ComputerMemory,
        vertex_memory: &'a VertexMemory<M>,
        program: &'a dyn VertexProgram<M>,
    ) -> Self {
        Self {
            graph,
            memory,
            vertex_memory,
            program,
        }
    }

    /// Processes every partition aggregate of the running superstep. Outcomes are tallied in
    /// `metrics`; the caller decides whether failures are fatal.
    pub(crate) fn run(
        &self,
        num_threads: usize,
        metrics: &ScanMetrics,
    ) -> Result<(), ComputerError> {
        if !self.vertex_memory.has_partition_aggregates() {
            return Ok(());
        }
        let aggregates = self.vertex_memory.partition_aggregates();
        debug!(
            num_partitioned = aggregates.len(),
            "post-processing partitioned vertices"
        );
        let pool = custom_pool(num_threads, "partition")
            .map_err(|e| BackendError::WorkerPool(e.to_string()))?;
        pool.scope(|s| {
            for (vid, loaded) in aggregates {
                match loaded {
                    None => {
                        metrics.increment_custom(GHOST_PARTITION_VERTEX);
                        warn!(
                            vertex = %vid,
                            "Partitioned vertex has messages but its canonical row was not loaded"
                        );
                    }
                    Some(properties) => s.spawn(move |_| self.process(vid, properties, metrics)),
                }
            }
        });
        Ok(())
    }

    fn process(&self, vid: VID, properties: LoadedProperties, metrics: &ScanMetrics) {
        let result = catch_failure(|| {
            let tx = self.graph.read_only_tx()?;
            let vertex = tx.preloaded_vertex(vid, properties)?;
            let view = EvalVertexView::partition(&vertex, vid, self.vertex_memory);
            self.program.execute(&view, self.memory)
        });
        match result {
            Ok(()) => metrics.increment_custom(PARTITION_VERTEX_POSTSUCCESS),
            Err(err) => {
                metrics.increment_custom(PARTITION_VERTEX_POSTFAIL);
                error!(vertex = %vid, "Exception while post-processing partitioned vertex: {err}");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{errors::ProgramError, graph::InMemoryGraph};
    use std::sync::Arc;
    use strata_api::core::Direction;
    use strata_core::entities::{
        compute_keys::{ComputeKeys, VertexComputeKey},
        scope::MessageScope,
    };

    struct Noop;

    impl VertexProgram<u64> for Noop {
        fn execute(
            &self,
            _vertex: &EvalVertexView<'_, u64>,
            _memory: &ComputerMemory,
        ) -> Result<(), ProgramError> {
            Ok(())
        }

        fn terminate(&self, _memory: &ComputerMemory) -> Result<bool, ProgramError> {
            Ok(true)
        }

        fn message_scopes(&self, _memory: &ComputerMemory) -> Vec<MessageScope<u64>> {
            vec![MessageScope::local(Direction::OUT)]
        }
    }

    #[test]
    fn ghost_and_loaded_aggregates_are_counted() {
        let graph = InMemoryGraph::new();
        graph.add_partitioned_vertex(1, [1, 2]);
        graph.add_partitioned_vertex(5, [5, 6]);
        let memory = ComputerMemory::new([]);
        let vertex_memory: VertexMemory<u64> = VertexMemory::new(
            graph.id_manager(),
            ComputeKeys::new([VertexComputeKey::persistent("x")]),
            Some(Arc::new(|a: u64, b: u64| a + b)),
        );
        vertex_memory.advance_superstep(Noop.message_scopes(&memory));
        vertex_memory.complete_superstep();
        vertex_memory.advance_superstep(Noop.message_scopes(&memory));

        let scope = MessageScope::<u64>::local(Direction::OUT).id();
        vertex_memory.set_loaded_properties(VID(1), LoadedProperties::default());
        vertex_memory.aggregate_message(VID(2), 1, &scope).unwrap();
        vertex_memory.aggregate_message(VID(6), 1, &scope).unwrap();

        let metrics = ScanMetrics::default();
        PartitionedVertexProgramExecutor::new(&graph, &memory, &vertex_memory, &Noop)
            .run(2, &metrics)
            .unwrap();
        assert_eq!(metrics.get_custom(PARTITION_VERTEX_POSTSUCCESS), 1);
        assert_eq!(metrics.get_custom(GHOST_PARTITION_VERTEX), 1);
        assert_eq!(metrics.get_custom(PARTITION_VERTEX_POSTFAIL), 0);
    }
}
