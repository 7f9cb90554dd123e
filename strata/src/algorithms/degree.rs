use crate::{
    db::task::{
        eval_vertex::{EvalVertexView, VertexViewOps},
        map_reduce::{KeyComparator, MapEmitter, MapReduce, Stage},
        program::VertexProgram,
    },
    errors::ProgramError,
};
use std::sync::Arc;
use strata_api::core::{entities::properties::prop::Prop, storage::arc_str::ArcStr, Direction};
use strata_core::{
    entities::{
        combiner::MessageCombiner,
        compute_keys::{Cardinality, VertexComputeKey},
        scope::MessageScope,
    },
    state::memory::ComputerMemory,
};

/// Compute key holding the result of [`DegreeCounter`]
pub const DEGREE: &str = "degree";

/// Memory key holding the result of [`DegreeMapper`]
pub const DEGREES: &str = "degrees";

/// Sums out-degrees over `length` hops.
///
/// With `length == 1` every vertex ends up with its out-degree. With `length == k` a vertex
/// holds the number of out-paths of length `k` starting at it.
#[derive(Debug, Clone)]
pub struct DegreeCounter {
    length: usize,
    scope: MessageScope<i64>,
}

impl DegreeCounter {
    pub fn new(length: usize) -> Self {
        Self {
            length,
            scope: MessageScope::local(Direction::IN),
        }
    }
}

impl VertexProgram<i64> for DegreeCounter {
    fn execute(
        &self,
        vertex: &EvalVertexView<'_, i64>,
        memory: &ComputerMemory,
    ) -> Result<(), ProgramError> {
        if memory.is_initial_iteration() {
            vertex.send_message(&self.scope, 1)?;
        } else {
            let degree: i64 = vertex.receive_messages(&self.scope)?.into_iter().sum();
            vertex.set_property(Cardinality::Single, DEGREE, degree)?;
            if memory.iteration() < self.length {
                vertex.send_message(&self.scope, degree)?;
            }
        }
        Ok(())
    }

    fn terminate(&self, memory: &ComputerMemory) -> Result<bool, ProgramError> {
        Ok(memory.iteration() >= self.length)
    }

    fn vertex_compute_keys(&self) -> Vec<VertexComputeKey> {
        vec![VertexComputeKey::persistent(DEGREE)]
    }

    fn message_scopes(&self, memory: &ComputerMemory) -> Vec<MessageScope<i64>> {
        if memory.iteration() < self.length {
            vec![self.scope.clone()]
        } else {
            vec![]
        }
    }

    fn message_combiner(&self) -> Option<Arc<dyn MessageCombiner<i64>>> {
        Some(Arc::new(|a: i64, b: i64| a + b))
    }
}

/// Collects the degree of every vertex into the memory, ordered by vertex id.
#[derive(Debug, Clone, Copy, Default)]
pub struct DegreeMapper;

impl MapReduce for DegreeMapper {
    fn do_stage(&self, stage: Stage) -> bool {
        stage == Stage::Map
    }

    fn map(&self, vertex: &dyn VertexViewOps, emitter: &MapEmitter) -> Result<(), ProgramError> {
        if let Some(degree) = vertex.property(DEGREE)? {
            emitter.emit(vertex.id().as_u64(), degree);
        }
        Ok(())
    }

    fn map_key_sort(&self) -> Option<KeyComparator> {
        Some(Arc::new(|a: &Prop, b: &Prop| a.as_u64().cmp(&b.as_u64())))
    }

    fn memory_key(&self) -> ArcStr {
        DEGREES.into()
    }
}

#[cfg(test)]
mod degree_test {
    use super::*;
    use crate::prelude::*;
    use pretty_assertions::assert_eq;

    fn star() -> InMemoryGraph {
        let graph = InMemoryGraph::new();
        for dst in 2..=5 {
            graph.add_edge(1, dst, "knows");
        }
        graph.add_edge(2, 3, "knows");
        graph.add_edge(3, 1, "knows");
        graph
    }

    #[test]
    fn counts_out_degrees() {
        let graph = star();
        let factory = ComputerFactory::new(Arc::new(graph.clone()), ComputerConfig::default());
        let mut computer = factory.compute();
        computer
            .program(DegreeCounter::new(1))
            .unwrap()
            .result_mode(ResultMode::Persist);
        let result = computer.submit().unwrap();
        assert_eq!(result.memory().iteration(), 1);
        let degrees: Vec<_> = (1..=5)
            .map(|v| graph.property(VID(v), DEGREE))
            .collect();
        assert_eq!(
            degrees,
            vec![
                Some(Prop::I64(4)),
                Some(Prop::I64(1)),
                Some(Prop::I64(1)),
                Some(Prop::I64(0)),
                Some(Prop::I64(0)),
            ]
        );
    }

    #[test]
    fn counts_two_hop_paths() {
        let graph = star();
        let factory = ComputerFactory::new(Arc::new(graph.clone()), ComputerConfig::default());
        let mut computer = factory.compute();
        computer
            .program(DegreeCounter::new(2))
            .unwrap()
            .result_mode(ResultMode::Persist);
        let result = computer.submit().unwrap();
        assert_eq!(result.memory().iteration(), 2);
        // 1 -> {2, 3, 4, 5}: 1 + 1 + 0 + 0
        assert_eq!(graph.property(VID(1), DEGREE), Some(Prop::I64(2)));
        // 2 -> 3 -> 1
        assert_eq!(graph.property(VID(2), DEGREE), Some(Prop::I64(1)));
        // 3 -> 1 -> {2, 3, 4, 5}
        assert_eq!(graph.property(VID(3), DEGREE), Some(Prop::I64(4)));
    }

    #[test]
    fn mapper_collects_sorted_degrees() {
        let graph = star();
        let factory = ComputerFactory::new(Arc::new(graph), ComputerConfig::default());
        let mut computer = factory.compute();
        computer
            .program(DegreeCounter::new(1))
            .unwrap()
            .map_reduce(Arc::new(DegreeMapper));
        let result = computer.submit().unwrap();
        assert!(result.graph().is_empty());
        let expected = Prop::list(
            [(1u64, 4i64), (2, 1), (3, 1), (4, 0), (5, 0)]
                .into_iter()
                .map(|(v, d)| Prop::list([Prop::U64(v), Prop::I64(d)])),
        );
        assert_eq!(result.memory().get(DEGREES), Some(&expected));
    }
}
