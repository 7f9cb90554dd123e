use crate::{
    db::task::{
        eval_vertex::{EvalVertexView, VertexViewOps},
        program::VertexProgram,
    },
    errors::ProgramError,
};
use std::sync::Arc;
use strata_api::core::Direction;
use strata_core::{
    entities::{
        combiner::MessageCombiner,
        compute_keys::{Cardinality, VertexComputeKey},
        scope::MessageScope,
    },
    state::memory::{ComputerMemory, MemoryComputeKey, MemoryOperator},
};

/// Compute key holding the component id of a vertex
pub const COMPONENT: &str = "component";

const CHANGED: &str = "changed";

/// Labels every vertex with the smallest vertex id of its weakly connected component.
///
/// Every vertex starts out as its own component and keeps adopting the smallest label among its
/// neighbours, in both edge directions, until no label changes in a superstep.
#[derive(Debug, Clone)]
pub struct ConnectedComponents {
    scope: MessageScope<u64>,
}

impl Default for ConnectedComponents {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectedComponents {
    pub fn new() -> Self {
        Self {
            scope: MessageScope::local(Direction::BOTH),
        }
    }
}

impl VertexProgram<u64> for ConnectedComponents {
    fn setup(&self, memory: &ComputerMemory) -> Result<(), ProgramError> {
        memory.set(CHANGED, false)?;
        Ok(())
    }

    fn execute(
        &self,
        vertex: &EvalVertexView<'_, u64>,
        memory: &ComputerMemory,
    ) -> Result<(), ProgramError> {
        if memory.is_initial_iteration() {
            let id = vertex.id().as_u64();
            vertex.set_property(Cardinality::Single, COMPONENT, id)?;
            vertex.send_message(&self.scope, id)?;
            memory.add(CHANGED, true)?;
            return Ok(());
        }
        let Some(candidate) = vertex.receive_messages(&self.scope)?.into_iter().min() else {
            return Ok(());
        };
        let current = vertex
            .property(COMPONENT)?
            .and_then(|c| c.as_u64())
            .unwrap_or(u64::MAX);
        if candidate < current {
            vertex.set_property(Cardinality::Single, COMPONENT, candidate)?;
            vertex.send_message(&self.scope, candidate)?;
            memory.add(CHANGED, true)?;
        }
        Ok(())
    }

    fn terminate(&self, memory: &ComputerMemory) -> Result<bool, ProgramError> {
        let changed = memory
            .get(CHANGED)?
            .and_then(|c| c.as_bool())
            .unwrap_or(false);
        memory.set(CHANGED, false)?;
        Ok(!changed)
    }

    fn vertex_compute_keys(&self) -> Vec<VertexComputeKey> {
        vec![VertexComputeKey::persistent(COMPONENT)]
    }

    fn memory_compute_keys(&self) -> Vec<MemoryComputeKey> {
        vec![MemoryComputeKey::new(CHANGED, MemoryOperator::Or, true)]
    }

    fn message_scopes(&self, _memory: &ComputerMemory) -> Vec<MessageScope<u64>> {
        vec![self.scope.clone()]
    }

    fn message_combiner(&self) -> Option<Arc<dyn MessageCombiner<u64>>> {
        Some(Arc::new(|a: u64, b: u64| a.min(b)))
    }
}
