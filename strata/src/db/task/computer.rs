use crate::{
    config::ComputerConfig,
    db::{
        api::{
            backend::ComputeGraph,
            scan::{Metric, ScanConfig},
        },
        task::{
            map_reduce::{complete_job, MapReduce, VertexMapJob, MAP_JOB_FAILURE},
            partition::{PartitionedVertexProgramExecutor, PARTITION_VERTEX_POSTFAIL},
            program::{Persist, ResultGraph, ResultMode, VertexProgram},
            result::ComputerResult,
            scan_job::VertexProgramScanJob,
            writeback::ResultWriter,
        },
    },
    errors::ComputerError,
};
use std::{
    fmt::{self, Debug, Formatter},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};
use strata_core::{
    entities::compute_keys::ComputeKeys,
    state::{
        memory::{ComputerMemory, MemoryComputeKey, MemoryOperator},
        vertex_memory::VertexMemory,
    },
};
use tracing::{debug, error, info};

/// Creates graph computers for one graph and hands each of them a unique name.
pub struct ComputerFactory<G> {
    graph: Arc<G>,
    config: ComputerConfig,
    counter: AtomicUsize,
}

impl<G: ComputeGraph> ComputerFactory<G> {
    /// Creates the factory and installs the global logger at the configured level unless one
    /// is already installed.
    pub fn new(graph: Arc<G>, config: ComputerConfig) -> Self {
        config.logging.init();
        Self {
            graph,
            config,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn graph(&self) -> &Arc<G> {
        &self.graph
    }

    pub fn config(&self) -> &ComputerConfig {
        &self.config
    }

    /// A fresh computer with message type `M`, configured with the factory's defaults
    pub fn compute<M: Clone + Send + Sync + 'static>(&self) -> GraphComputer<G, M> {
        let id = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        GraphComputer::new(
            format!("compute{id}"),
            self.graph.clone(),
            self.config.clone(),
        )
    }
}

/// Runs one vertex program and/or a set of map/reduce jobs over a graph.
///
/// A computer is configured through its builder methods and then submitted exactly once.
pub struct GraphComputer<G, M> {
    name: String,
    graph: Arc<G>,
    config: ComputerConfig,
    program: Option<Box<dyn VertexProgram<M>>>,
    map_reduces: Vec<Arc<dyn MapReduce>>,
    workers: usize,
    result_graph: Option<ResultGraph>,
    persist: Option<Persist>,
    executed: bool,
}

impl<G, M> Debug for GraphComputer<G, M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphComputer")
            .field("name", &self.name)
            .field("has_program", &self.program.is_some())
            .field("num_map_reduces", &self.map_reduces.len())
            .field("workers", &self.workers)
            .field("result_graph", &self.result_graph)
            .field("persist", &self.persist)
            .field("executed", &self.executed)
            .finish()
    }
}

impl<G: ComputeGraph, M: Clone + Send + Sync + 'static> GraphComputer<G, M> {
    pub(crate) fn new(name: String, graph: Arc<G>, config: ComputerConfig) -> Self {
        let workers = config.workers;
        Self {
            name,
            graph,
            config,
            program: None,
            map_reduces: Vec::new(),
            workers,
            result_graph: None,
            persist: None,
            executed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(
        &mut self,
        program: impl VertexProgram<M> + 'static,
    ) -> Result<&mut Self, ComputerError> {
        if self.program.is_some() {
            return Err(ComputerError::ProgramAlreadySet);
        }
        self.program = Some(Box::new(program));
        Ok(self)
    }

    /// Registers a map/reduce job; registering the same job twice has no effect
    pub fn map_reduce(&mut self, job: Arc<dyn MapReduce>) -> &mut Self {
        if !self.map_reduces.iter().any(|j| Arc::ptr_eq(j, &job)) {
            self.map_reduces.push(job);
        }
        self
    }

    pub fn workers(&mut self, workers: usize) -> Result<&mut Self, ComputerError> {
        self.check_workers(workers)?;
        self.workers = workers;
        Ok(self)
    }

    pub fn result(&mut self, result_graph: ResultGraph) -> &mut Self {
        self.result_graph = Some(result_graph);
        self
    }

    pub fn persist(&mut self, persist: Persist) -> &mut Self {
        self.persist = Some(persist);
        self
    }

    pub fn result_mode(&mut self, mode: ResultMode) -> &mut Self {
        let (result_graph, persist) = mode.settings();
        self.result(result_graph).persist(persist)
    }

    fn check_workers(&self, workers: usize) -> Result<(), ComputerError> {
        if workers == 0 {
            return Err(ComputerError::NoWorkers);
        }
        let max = self.graph.max_workers();
        if workers > max {
            return Err(ComputerError::TooManyWorkers {
                requested: workers,
                max,
            });
        }
        Ok(())
    }

    /// Explicit choices win, then the program's preferences
    fn resolve_settings(&self, program: Option<&dyn VertexProgram<M>>) -> (ResultGraph, Persist) {
        let result_graph = self.result_graph.unwrap_or_else(|| {
            program.map_or(ResultGraph::Original, |p| p.preferred_result_graph())
        });
        let persist = self
            .persist
            .unwrap_or_else(|| program.map_or(Persist::Nothing, |p| p.preferred_persist()));
        (result_graph, persist)
    }

    /// Runs the computation to completion.
    ///
    /// Any failure of a vertex, a partitioned vertex, a map call, a reduce call or a write-back
    /// batch fails the whole submission once the phase it happened in has finished.
    pub fn submit(&mut self) -> Result<ComputerResult<G>, ComputerError> {
        if self.executed {
            return Err(ComputerError::AlreadyExecuted);
        }
        self.executed = true;
        let start = Instant::now();

        let program = self.program.take();
        let mut map_reduces = self.map_reduces.clone();
        if let Some(program) = &program {
            for job in program.map_reducers() {
                if !map_reduces.iter().any(|j| Arc::ptr_eq(j, &job)) {
                    map_reduces.push(job);
                }
            }
        }
        if program.is_none() && map_reduces.is_empty() {
            return Err(ComputerError::NothingToExecute);
        }

        let (result_graph, persist) = self.resolve_settings(program.as_deref());
        if persist == Persist::Edges {
            return Err(ComputerError::UnsupportedResult {
                result_graph,
                persist,
            });
        }
        self.check_workers(self.workers)?;

        let memory_keys = program
            .iter()
            .flat_map(|p| p.memory_compute_keys())
            .chain(map_reduces.iter().map(|job| {
                MemoryComputeKey::new(job.memory_key(), MemoryOperator::Assign, false)
            }));
        let memory = ComputerMemory::new(memory_keys);
        let vertex_memory = program.as_ref().map(|p| {
            VertexMemory::new(
                self.graph.id_manager(),
                ComputeKeys::new(p.vertex_compute_keys()),
                p.message_combiner(),
            )
        });

        info!(
            name = %self.name,
            workers = self.workers,
            has_program = program.is_some(),
            num_map_reduces = map_reduces.len(),
            "starting graph computer"
        );

        if let (Some(program), Some(vertex_memory)) = (program.as_deref(), vertex_memory.as_ref())
        {
            self.run_program(program, &memory, vertex_memory)?;
        }

        if !map_reduces.is_empty() {
            self.run_map_reduce(map_reduces, &memory, vertex_memory.as_ref())?;
        }

        let graph = ResultWriter::new(&self.graph, self.workers, self.config.write_batch_size)
            .write(result_graph, persist, vertex_memory.as_ref())?;

        memory.set_runtime(start.elapsed());
        let memory = memory.complete();
        info!(
            name = %self.name,
            iterations = memory.iteration(),
            runtime_ms = memory.runtime(),
            "graph computer finished"
        );
        Ok(ComputerResult::new(graph, memory))
    }

    fn run_program(
        &self,
        program: &dyn VertexProgram<M>,
        memory: &ComputerMemory,
        vertex_memory: &VertexMemory<M>,
    ) -> Result<(), ComputerError> {
        program.setup(memory).map_err(ComputerError::Setup)?;
        let id_manager = self.graph.id_manager();
        loop {
            memory.complete_sub_round();
            vertex_memory.advance_superstep(program.message_scopes(memory));
            let iteration = memory.iteration();

            let job = VertexProgramScanJob::new(id_manager.clone(), memory, vertex_memory, program);
            let scan_config = ScanConfig {
                job_id: format!("{}#{}", self.name, iteration),
                num_threads: self.workers,
                batch_size: self.config.read_batch_size(),
            };
            let metrics = self.graph.scan(&job, &scan_config)?;
            let failures = metrics.get(Metric::Failure);
            if failures > 0 {
                error!(iteration, failures, "vertex program iteration failed");
                return Err(ComputerError::VertexProgramFailure {
                    iteration,
                    failures,
                });
            }

            PartitionedVertexProgramExecutor::new(
                self.graph.as_ref(),
                memory,
                vertex_memory,
                program,
            )
            .run(self.workers, &metrics)?;
            let failures = metrics.get_custom(PARTITION_VERTEX_POSTFAIL);
            if failures > 0 {
                error!(iteration, failures, "partitioned vertex post-processing failed");
                return Err(ComputerError::PartitionFailure {
                    iteration,
                    failures,
                });
            }

            vertex_memory.complete_superstep();
            memory.complete_sub_round();
            let terminate = program
                .terminate(memory)
                .map_err(|error| ComputerError::Terminate { iteration, error })?;
            memory.incr_iteration();
            debug!(
                iteration,
                success = metrics.get(Metric::Success),
                terminate,
                "completed superstep"
            );
            if terminate {
                info!(name = %self.name, supersteps = iteration + 1, "vertex program terminated");
                return Ok(());
            }
        }
    }

    fn run_map_reduce(
        &self,
        map_reduces: Vec<Arc<dyn MapReduce>>,
        memory: &ComputerMemory,
        vertex_memory: Option<&VertexMemory<M>>,
    ) -> Result<(), ComputerError> {
        let job = VertexMapJob::new(self.graph.id_manager(), vertex_memory, map_reduces);
        if job.is_empty() {
            return Ok(());
        }
        let scan_config = ScanConfig {
            job_id: format!("{}#map", self.name),
            num_threads: self.workers,
            batch_size: self.config.read_batch_size(),
        };
        let metrics = self.graph.scan(&job, &scan_config)?;
        let failures = metrics.get(Metric::Failure);
        if failures > 0 {
            return Err(ComputerError::MapFailure { failures });
        }
        let failures = metrics.get_custom(MAP_JOB_FAILURE);
        if failures > 0 {
            return Err(ComputerError::MapJobFailure { failures });
        }

        for (job, emitter) in job.into_outputs() {
            let result = complete_job(job.as_ref(), emitter, self.workers)?;
            memory.set(&job.memory_key(), result)?;
        }
        Ok(())
    }
}
