use crate::{
    db::task::{
        eval_vertex::{EvalVertexView, VertexViewOps},
        program::{Persist, ResultGraph, VertexProgram},
    },
    errors::ProgramError,
};
use std::sync::Arc;
use strata_api::core::{entities::VID, storage::arc_str::ArcStr, Direction};
use strata_core::{
    entities::{
        combiner::MessageCombiner,
        compute_keys::{Cardinality, VertexComputeKey},
        scope::{LocalScope, MessageScope},
    },
    state::memory::{ComputerMemory, MemoryComputeKey, MemoryOperator},
};

/// Compute key holding the hop distance from the source
pub const DISTANCE: &str = "distance";

const ACTIVE: &str = "active";

/// Single-source hop distances along out-edges.
///
/// Vertices that cannot be reached from the source get no distance. The program stops as soon
/// as a superstep improves no distance.
#[derive(Debug, Clone)]
pub struct ShortestDistance {
    source: VID,
    scope: MessageScope<u64>,
}

impl ShortestDistance {
    pub fn new(source: VID) -> Self {
        let scope = LocalScope::new(Direction::OUT).with_edge_function(|d: u64, _| d + 1);
        Self {
            source,
            scope: scope.into(),
        }
    }

    pub fn with_labels<L: Into<ArcStr>>(source: VID, labels: impl IntoIterator<Item = L>) -> Self {
        let scope = LocalScope::new(Direction::OUT)
            .with_labels(labels)
            .with_edge_function(|d: u64, _| d + 1);
        Self {
            source,
            scope: scope.into(),
        }
    }

    fn update(
        &self,
        vertex: &EvalVertexView<'_, u64>,
        memory: &ComputerMemory,
        distance: u64,
    ) -> Result<(), ProgramError> {
        vertex.set_property(Cardinality::Single, DISTANCE, distance)?;
        vertex.send_message(&self.scope, distance)?;
        memory.add(ACTIVE, true)?;
        Ok(())
    }
}

impl VertexProgram<u64> for ShortestDistance {
    fn setup(&self, memory: &ComputerMemory) -> Result<(), ProgramError> {
        memory.set(ACTIVE, false)?;
        Ok(())
    }

    fn execute(
        &self,
        vertex: &EvalVertexView<'_, u64>,
        memory: &ComputerMemory,
    ) -> Result<(), ProgramError> {
        if memory.is_initial_iteration() {
            if vertex.id() == self.source {
                self.update(vertex, memory, 0)?;
            }
            return Ok(());
        }
        let Some(candidate) = vertex.receive_messages(&self.scope)?.into_iter().min() else {
            return Ok(());
        };
        let current = vertex.property(DISTANCE)?.and_then(|d| d.as_u64());
        if current.map_or(true, |d| candidate < d) {
            self.update(vertex, memory, candidate)?;
        }
        Ok(())
    }

    fn terminate(&self, memory: &ComputerMemory) -> Result<bool, ProgramError> {
        let active = memory
            .get(ACTIVE)?
            .and_then(|a| a.as_bool())
            .unwrap_or(false);
        memory.set(ACTIVE, false)?;
        Ok(!active)
    }

    fn vertex_compute_keys(&self) -> Vec<VertexComputeKey> {
        vec![VertexComputeKey::persistent(DISTANCE)]
    }

    fn memory_compute_keys(&self) -> Vec<MemoryComputeKey> {
        vec![MemoryComputeKey::new(ACTIVE, MemoryOperator::Or, true)]
    }

    fn message_scopes(&self, _memory: &ComputerMemory) -> Vec<MessageScope<u64>> {
        vec![self.scope.clone()]
    }

    fn message_combiner(&self) -> Option<Arc<dyn MessageCombiner<u64>>> {
        Some(Arc::new(|a: u64, b: u64| a.min(b)))
    }

    fn preferred_result_graph(&self) -> ResultGraph {
        ResultGraph::Original
    }

    fn preferred_persist(&self) -> Persist {
        Persist::VertexProperties
    }
}

#[cfg(test)]
mod sd_test {
    use super::*;
    use crate::prelude::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn distances_follow_out_edges() {
        let graph = InMemoryGraph::new();
        for (src, dst, label) in [
            (1, 2, "road"),
            (2, 3, "road"),
            (1, 4, "road"),
            (4, 3, "rail"),
            (3, 5, "road"),
            (6, 1, "road"),
        ] {
            graph.add_edge(src, dst, label);
        }
        let factory = ComputerFactory::new(Arc::new(graph.clone()), ComputerConfig::default());

        let mut computer = factory.compute();
        computer.program(ShortestDistance::new(VID(1))).unwrap();
        let result = computer.submit().unwrap();
        assert!(result.graph().original().is_some());
        let distances: Vec<_> = (1..=6)
            .map(|v| graph.property(VID(v), DISTANCE).and_then(|d| d.as_u64()))
            .collect();
        assert_eq!(distances, vec![Some(0), Some(1), Some(2), Some(1), Some(3), None]);

        let graph = InMemoryGraph::new();
        graph.add_edge(1, 2, "road");
        graph.add_edge(1, 3, "rail");
        let factory = ComputerFactory::new(Arc::new(graph.clone()), ComputerConfig::default());
        let mut computer = factory.compute();
        computer
            .program(ShortestDistance::with_labels(VID(1), ["road"]))
            .unwrap();
        computer.submit().unwrap();
        assert_eq!(graph.property(VID(2), DISTANCE), Some(Prop::U64(1)));
        assert_eq!(graph.property(VID(3), DISTANCE), None);
    }
}
