use crate::db::api::backend::ComputeGraph;
use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
};
use strata_core::state::memory::MemorySnapshot;

/// The graph a computation result refers to.
pub enum ResultGraphView<G: ComputeGraph> {
    /// The graph the computation ran on
    Original(Arc<G>),
    /// An open transaction holding the computed values; the caller commits or drops it
    Transaction(G::Tx),
    /// Nothing was written
    Empty,
}

impl<G: ComputeGraph> ResultGraphView<G> {
    pub fn is_empty(&self) -> bool {
        matches!(self, ResultGraphView::Empty)
    }

    pub fn original(&self) -> Option<&Arc<G>> {
        match self {
            ResultGraphView::Original(graph) => Some(graph),
            _ => None,
        }
    }

    pub fn transaction(&self) -> Option<&G::Tx> {
        match self {
            ResultGraphView::Transaction(tx) => Some(tx),
            _ => None,
        }
    }

    pub fn into_transaction(self) -> Option<G::Tx> {
        match self {
            ResultGraphView::Transaction(tx) => Some(tx),
            _ => None,
        }
    }
}

impl<G: ComputeGraph> Debug for ResultGraphView<G> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ResultGraphView::Original(_) => f.write_str("ResultGraphView::Original"),
            ResultGraphView::Transaction(_) => f.write_str("ResultGraphView::Transaction"),
            ResultGraphView::Empty => f.write_str("ResultGraphView::Empty"),
        }
    }
}

/// Outcome of a successful submission.
#[derive(Debug)]
pub struct ComputerResult<G: ComputeGraph> {
    graph: ResultGraphView<G>,
    memory: MemorySnapshot,
}

impl<G: ComputeGraph> ComputerResult<G> {
    pub(crate) fn new(graph: ResultGraphView<G>, memory: MemorySnapshot) -> Self {
        Self { graph, memory }
    }

    pub fn graph(&self) -> &ResultGraphView<G> {
        &self.graph
    }

    pub fn memory(&self) -> &MemorySnapshot {
        &self.memory
    }

    pub fn into_parts(self) -> (ResultGraphView<G>, MemorySnapshot) {
        (self.graph, self.memory)
    }
}
