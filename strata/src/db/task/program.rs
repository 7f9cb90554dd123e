use crate::{
    db::task::{eval_vertex::EvalVertexView, map_reduce::MapReduce},
    errors::ProgramError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strata_core::{
    entities::{combiner::MessageCombiner, compute_keys::VertexComputeKey, scope::MessageScope},
    state::memory::{ComputerMemory, MemoryComputeKey},
};

/// Which graph the result of a computation refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultGraph {
    /// Computed values are written into the original graph
    Original,
    /// Computed values are written into a fresh transaction handed back to the caller
    New,
}

/// What is persisted after the computation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Persist {
    Nothing,
    VertexProperties,
    Edges,
}

/// Shortcut for common result graph / persist combinations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultMode {
    /// Nothing is written
    None,
    /// Vertex properties are written back to the original graph
    Persist,
    /// Vertex properties are written into a fresh transaction
    LocalTx,
}

impl ResultMode {
    pub fn settings(&self) -> (ResultGraph, Persist) {
        match self {
            ResultMode::None => (ResultGraph::New, Persist::Nothing),
            ResultMode::Persist => (ResultGraph::Original, Persist::VertexProperties),
            ResultMode::LocalTx => (ResultGraph::New, Persist::VertexProperties),
        }
    }
}

/// A vertex-centric program run in supersteps.
///
/// Every superstep calls [`VertexProgram::execute`] once for every vertex, concurrently. A vertex
/// sees the messages that were sent to it in the previous superstep and the global memory as of
/// the start of the superstep. After all vertices ran, [`VertexProgram::terminate`] decides
/// whether another superstep follows.
///
/// `M` is the message type.
pub trait VertexProgram<M>: Send + Sync {
    /// Called once before the first superstep, typically to initialise memory keys
    fn setup(&self, _memory: &ComputerMemory) -> Result<(), ProgramError> {
        Ok(())
    }

    fn execute(&self, vertex: &EvalVertexView<'_, M>, memory: &ComputerMemory)
        -> Result<(), ProgramError>;

    /// Called after every superstep; `true` stops the computation
    fn terminate(&self, memory: &ComputerMemory) -> Result<bool, ProgramError>;

    fn vertex_compute_keys(&self) -> Vec<VertexComputeKey> {
        Vec::new()
    }

    fn memory_compute_keys(&self) -> Vec<MemoryComputeKey> {
        Vec::new()
    }

    /// The scopes messages may be sent through in the next superstep
    fn message_scopes(&self, memory: &ComputerMemory) -> Vec<MessageScope<M>>;

    /// Required whenever a vertex can receive more than one message through the same scope
    fn message_combiner(&self) -> Option<Arc<dyn MessageCombiner<M>>> {
        None
    }

    /// Map/reduce jobs run over the result of this program
    fn map_reducers(&self) -> Vec<Arc<dyn MapReduce>> {
        Vec::new()
    }

    fn preferred_result_graph(&self) -> ResultGraph {
        ResultGraph::New
    }

    fn preferred_persist(&self) -> Persist {
        Persist::Nothing
    }

    /// Called by a worker before it processes a batch of vertices
    fn worker_iteration_start(&self, _memory: &ComputerMemory) {}

    /// Called by a worker after it processed a batch of vertices
    fn worker_iteration_end(&self, _memory: &ComputerMemory) {}
}
