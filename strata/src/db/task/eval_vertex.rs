use crate::{db::api::vertex::PreloadedVertex, errors::ComputerError};
use strata_api::core::{
    entities::{edges::edge_ref::EdgeRef, properties::prop::Prop, VID},
    storage::arc_str::ArcStr,
    Direction,
};
use strata_core::{
    entities::{compute_keys::Cardinality, scope::MessageScope},
    state::vertex_memory::VertexMemory,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ExecutionMode {
    /// A vertex executing in a superstep
    Normal,
    /// A partitioned vertex executing against its aggregated messages
    Partition,
    /// A vertex visited by a map job; nothing can be written
    Map,
}

/// Read access to a vertex shared by vertex programs and map jobs.
pub trait VertexViewOps {
    /// Id of the logical vertex; all rows of a partitioned vertex report their canonical id
    fn id(&self) -> VID;

    /// A compute-key value if `key` is a declared compute key, the stored property otherwise
    fn property(&self, key: &str) -> Result<Option<Prop>, ComputerError>;

    /// Values of the requested compute keys, or of all non-transient compute keys if `keys` is
    /// empty. Undeclared keys and keys without a value are skipped.
    fn properties(&self, keys: &[&str]) -> Result<Vec<(ArcStr, Prop)>, ComputerError>;

    fn edges(&self, direction: Direction, labels: &[ArcStr])
        -> Result<Vec<EdgeRef>, ComputerError>;
}

/// The view of a vertex a [`VertexProgram`](crate::db::task::program::VertexProgram) executes
/// against.
///
/// Compute keys are backed by the vertex memory, all other properties come from the row the scan
/// preloaded. Messages are routed by scope: global messages go straight to their targets, local
/// messages are kept with the sender and pulled by the receivers over their edges.
pub struct EvalVertexView<'a, M> {
    vertex: &'a PreloadedVertex,
    canonical: VID,
    vertex_memory: Option<&'a VertexMemory<M>>,
    mode: ExecutionMode,
}

impl<'a, M: Clone + Send + Sync + 'static> EvalVertexView<'a, M> {
    pub(crate) fn new(
        vertex: &'a PreloadedVertex,
        canonical: VID,
        vertex_memory: &'a VertexMemory<M>,
    ) -> Self {
        Self {
            vertex,
            canonical,
            vertex_memory: Some(vertex_memory),
            mode: ExecutionMode::Normal,
        }
    }

    pub(crate) fn partition(
        vertex: &'a PreloadedVertex,
        canonical: VID,
        vertex_memory: &'a VertexMemory<M>,
    ) -> Self {
        Self {
            vertex,
            canonical,
            vertex_memory: Some(vertex_memory),
            mode: ExecutionMode::Partition,
        }
    }

    pub(crate) fn read_only(
        vertex: &'a PreloadedVertex,
        canonical: VID,
        vertex_memory: Option<&'a VertexMemory<M>>,
    ) -> Self {
        Self {
            vertex,
            canonical,
            vertex_memory,
            mode: ExecutionMode::Map,
        }
    }

    /// Physical id of the row this view was loaded from
    pub fn row_id(&self) -> VID {
        self.vertex.id()
    }

    fn memory(&self) -> Result<&'a VertexMemory<M>, ComputerError> {
        self.vertex_memory.ok_or(ComputerError::NoVertexMemory)
    }

    fn writable_memory(&self) -> Result<&'a VertexMemory<M>, ComputerError> {
        match self.mode {
            ExecutionMode::Map => Err(ComputerError::ReadOnlyView),
            _ => self.memory(),
        }
    }

    /// Iterator over the loaded edges; during post-processing a partitioned vertex carries
    /// the edges of all of its rows
    pub fn edge_iter(
        &self,
        direction: Direction,
        labels: &'a [ArcStr],
    ) -> Result<impl Iterator<Item = &'a EdgeRef> + 'a, ComputerError> {
        Ok(self.vertex.edges(direction, labels)?)
    }

    /// Writes a compute-key value of this vertex
    pub fn set_property(
        &self,
        cardinality: Cardinality,
        key: &str,
        value: impl Into<Prop>,
    ) -> Result<(), ComputerError> {
        let memory = self.writable_memory()?;
        memory.set_property(self.canonical, cardinality, key, value.into())?;
        Ok(())
    }

    /// Messages sent to this vertex through `scope` in the previous superstep.
    ///
    /// For a local scope this walks the edges in the reverse of the scope direction and applies
    /// the scope's edge function to every message found. A partitioned vertex reads the
    /// message already aggregated over all of its rows instead.
    pub fn receive_messages(&self, scope: &MessageScope<M>) -> Result<Vec<M>, ComputerError> {
        let memory = self.writable_memory()?;
        let scope_id = scope.id();
        match scope {
            MessageScope::Global(_) => Ok(memory
                .receive_message(self.canonical, &scope_id)
                .into_iter()
                .collect()),
            MessageScope::Local(_) if self.mode == ExecutionMode::Partition => Ok(memory
                .aggregate_message_of(self.canonical, &scope_id)
                .into_iter()
                .collect()),
            MessageScope::Local(local) => {
                let messages = self
                    .vertex
                    .edges(local.direction().reverse(), local.labels())?
                    .filter_map(|edge| {
                        memory
                            .receive_message(edge.remote(), &scope_id)
                            .map(|msg| local.apply_edge(msg, edge))
                    })
                    .collect();
                Ok(messages)
            }
        }
    }

    /// Sends `msg` through `scope`; it is readable by the receivers in the next superstep.
    pub fn send_message(&self, scope: &MessageScope<M>, msg: M) -> Result<(), ComputerError> {
        let memory = self.writable_memory()?;
        let scope_id = scope.id();
        match scope {
            MessageScope::Global(global) => {
                for target in global.targets() {
                    memory.send_message(*target, msg.clone(), &scope_id)?;
                }
            }
            MessageScope::Local(_) => memory.send_message(self.canonical, msg, &scope_id)?,
        }
        Ok(())
    }
}

impl<M: Clone + Send + Sync + 'static> VertexViewOps for EvalVertexView<'_, M> {
    fn id(&self) -> VID {
        self.canonical
    }

    fn property(&self, key: &str) -> Result<Option<Prop>, ComputerError> {
        if let Some(memory) = self.vertex_memory {
            if memory.keys().contains(key) {
                return Ok(memory.property(self.canonical, key)?);
            }
        }
        Ok(self.vertex.property(key)?.cloned())
    }

    fn properties(&self, keys: &[&str]) -> Result<Vec<(ArcStr, Prop)>, ComputerError> {
        let Some(memory) = self.vertex_memory else {
            return Ok(Vec::new());
        };
        let compute_keys = memory.keys();
        let requested: Vec<&ArcStr> = if keys.is_empty() {
            compute_keys.persistent().map(|(_, key)| key.key()).collect()
        } else {
            keys.iter()
                .filter_map(|key| compute_keys.slot(key).and_then(|s| compute_keys.key(s)))
                .map(|key| key.key())
                .collect()
        };
        let mut values = Vec::with_capacity(requested.len());
        for key in requested {
            if let Some(value) = memory.property(self.canonical, key)? {
                values.push((key.clone(), value));
            }
        }
        Ok(values)
    }

    fn edges(
        &self,
        direction: Direction,
        labels: &[ArcStr],
    ) -> Result<Vec<EdgeRef>, ComputerError> {
        Ok(self.vertex.edges(direction, labels)?.cloned().collect())
    }
}
