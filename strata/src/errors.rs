use config::ConfigError;
use strata_api::core::entities::VID;
use strata_core::StateError;

/// Errors raised by user code (vertex programs, map/reduce jobs) and by anything that runs it.
pub type ProgramError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Vertex {0} does not exist")]
    VertexNotFound(VID),
    #[error("The {slice} slice of vertex {vid} was not loaded by the scan")]
    SliceNotLoaded { vid: VID, slice: String },
    #[error("Transaction is read-only")]
    ReadOnlyTransaction,
    #[error("Transaction has already been closed")]
    TransactionClosed,
    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),
    #[error("Storage failure: {0}")]
    Storage(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ComputerError {
    #[error("This graph computer has already been used")]
    AlreadyExecuted,
    #[error("A vertex program has already been set for this computer")]
    ProgramAlreadySet,
    #[error("Must specify a vertex program or a map/reduce job")]
    NothingToExecute,
    #[error("Requested {requested} workers but the backend supports at most {max}")]
    TooManyWorkers { requested: usize, max: usize },
    #[error("Number of workers must be positive")]
    NoWorkers,
    #[error("Persisting {persist:?} is not supported for a {result_graph:?} result graph")]
    UnsupportedResult {
        result_graph: crate::db::task::program::ResultGraph,
        persist: crate::db::task::program::Persist,
    },
    #[error("Vertex program setup failed: {0}")]
    Setup(ProgramError),
    #[error("Vertex program terminate failed in iteration {iteration}: {error}")]
    Terminate { iteration: usize, error: ProgramError },
    #[error("Failed to process {failures} vertices in vertex program iteration [{iteration}]")]
    VertexProgramFailure { iteration: usize, failures: u64 },
    #[error("Failed to post-process {failures} partitioned vertices in iteration [{iteration}]")]
    PartitionFailure { iteration: usize, failures: u64 },
    #[error("Failed to process {failures} vertices in map phase")]
    MapFailure { failures: u64 },
    #[error("Failed to execute {failures} map calls in map phase")]
    MapJobFailure { failures: u64 },
    #[error("Failed to reduce {failures} keys of job [{job}]")]
    ReduceFailure { job: String, failures: usize },
    #[error("Failed to write back {failures} batches of vertex properties")]
    WriteBackFailure { failures: usize },
    #[error("Vertex memory is not available outside of vertex program execution")]
    NoVertexMemory,
    #[error("The vertex view is read-only in this phase")]
    ReadOnlyView,
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("State error: {0}")]
    State(#[from] StateError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
