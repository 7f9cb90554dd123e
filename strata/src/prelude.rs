pub use crate::{
    config::{ComputerConfig, ComputerConfigBuilder, LoggingConfig},
    db::{
        api::{
            backend::{ComputeGraph, ComputeTransaction, SchemaManagement},
            scan::{Metric, ScanMetrics},
            vertex::{PreloadedVertex, SliceQuery},
        },
        task::{
            computer::{ComputerFactory, GraphComputer},
            eval_vertex::{EvalVertexView, VertexViewOps},
            map_reduce::{KeyComparator, KeyValue, MapEmitter, MapReduce, ReduceEmitter, Stage},
            program::{Persist, ResultGraph, ResultMode, VertexProgram},
            result::{ComputerResult, ResultGraphView},
        },
    },
    errors::{BackendError, ComputerError, ProgramError},
    graph::InMemoryGraph,
};
pub use strata_api::core::{
    entities::{edges::edge_ref::EdgeRef, properties::prop::Prop, IdManager, VID},
    storage::arc_str::ArcStr,
    Direction,
};
pub use strata_core::{
    entities::{
        combiner::MessageCombiner,
        compute_keys::{Cardinality, VertexComputeKey},
        scope::{GlobalScope, LocalScope, MessageScope},
    },
    state::memory::{ComputerMemory, MemoryComputeKey, MemoryOperator, MemorySnapshot},
    StateError,
};
