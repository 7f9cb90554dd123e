use crate::{
    db::{
        api::{
            scan::{ScanJob, ScanMetrics},
            vertex::{PreloadedVertex, SliceQuery},
        },
        task::{
            catch_failure, custom_pool,
            eval_vertex::{EvalVertexView, VertexViewOps},
            scan_job::full_vertex_queries,
        },
    },
    errors::{BackendError, ComputerError, ProgramError},
};
use dashmap::DashMap;
use itertools::Itertools;
use parking_lot::Mutex;
use rustc_hash::FxBuildHasher;
use std::{
    cmp::Ordering,
    fmt::{self, Debug, Formatter},
    sync::{
        atomic::{AtomicUsize, Ordering as AtomicOrdering},
        Arc,
    },
};
use strata_api::core::{
    entities::{properties::prop::Prop, IdManager},
    storage::arc_str::ArcStr,
};
use strata_core::state::vertex_memory::VertexMemory;
use tracing::{debug, error};

/// Custom scan metric counting failed calls to [`MapReduce::map`]
pub const MAP_JOB_FAILURE: &str = "map-job-failure";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Map,
    Reduce,
}

pub type KeyValue = (Prop, Prop);

/// Orders emitted keys
pub type KeyComparator = Arc<dyn Fn(&Prop, &Prop) -> Ordering + Send + Sync>;

/// A map/reduce job run over the vertices after the vertex program finished.
///
/// The map stage visits every logical vertex once. If the job also does the reduce stage, the
/// emitted values are grouped by key and every key is reduced on its own. The final output is
/// turned into a single value by [`MapReduce::generate_final_result`] and stored in the global
/// memory under [`MapReduce::memory_key`].
pub trait MapReduce: Send + Sync {
    fn do_stage(&self, stage: Stage) -> bool;

    /// Called by a worker before it runs `stage` for a batch of vertices or keys
    fn worker_start(&self, _stage: Stage) {}

    /// Called by a worker after it ran `stage` for a batch of vertices or keys
    fn worker_end(&self, _stage: Stage) {}

    fn map(&self, vertex: &dyn VertexViewOps, emitter: &MapEmitter) -> Result<(), ProgramError>;

    fn reduce(
        &self,
        _key: Prop,
        _values: &mut dyn Iterator<Item = Prop>,
        _emitter: &ReduceEmitter,
    ) -> Result<(), ProgramError> {
        Err(format!("job [{}] does not implement the reduce stage", self.memory_key()).into())
    }

    /// Sorts the map output by key when set
    fn map_key_sort(&self) -> Option<KeyComparator> {
        None
    }

    /// Sorts the reduce output by key when set
    fn reduce_key_sort(&self) -> Option<KeyComparator> {
        None
    }

    fn memory_key(&self) -> ArcStr;

    /// By default the output as a list of `[key, value]` lists
    fn generate_final_result(&self, key_values: Vec<KeyValue>) -> Prop {
        Prop::list(key_values.into_iter().map(|(k, v)| Prop::list([k, v])))
    }
}

enum MapOutput {
    /// Values grouped by key, for jobs that reduce
    Grouped(DashMap<Prop, Vec<Prop>, FxBuildHasher>),
    /// Pairs in emission order, for map-only jobs
    Flat(Mutex<Vec<KeyValue>>),
}

/// Collects the output of the map stage.
pub struct MapEmitter {
    output: MapOutput,
}

impl MapEmitter {
    pub(crate) fn for_job(job: &dyn MapReduce) -> Self {
        let output = if job.do_stage(Stage::Reduce) {
            MapOutput::Grouped(DashMap::with_hasher(FxBuildHasher))
        } else {
            MapOutput::Flat(Mutex::new(Vec::new()))
        };
        Self { output }
    }

    pub fn emit(&self, key: impl Into<Prop>, value: impl Into<Prop>) {
        match &self.output {
            MapOutput::Grouped(groups) => groups.entry(key.into()).or_default().push(value.into()),
            MapOutput::Flat(pairs) => pairs.lock().push((key.into(), value.into())),
        }
    }

    fn into_groups(self) -> Vec<(Prop, Vec<Prop>)> {
        match self.output {
            MapOutput::Grouped(groups) => groups.into_iter().collect(),
            MapOutput::Flat(pairs) => pairs
                .into_inner()
                .into_iter()
                .into_group_map()
                .into_iter()
                .collect(),
        }
    }

    fn into_key_values(self) -> Vec<KeyValue> {
        match self.output {
            MapOutput::Grouped(groups) => groups
                .into_iter()
                .flat_map(|(k, vs)| vs.into_iter().map(move |v| (k.clone(), v)))
                .collect(),
            MapOutput::Flat(pairs) => pairs.into_inner(),
        }
    }
}

impl Debug for MapEmitter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.output {
            MapOutput::Grouped(groups) => write!(f, "MapEmitter::Grouped({} keys)", groups.len()),
            MapOutput::Flat(pairs) => write!(f, "MapEmitter::Flat({} pairs)", pairs.lock().len()),
        }
    }
}

/// Collects the output of the reduce stage.
#[derive(Debug, Default)]
pub struct ReduceEmitter {
    pairs: Mutex<Vec<KeyValue>>,
}

impl ReduceEmitter {
    pub fn emit(&self, key: impl Into<Prop>, value: impl Into<Prop>) {
        self.pairs.lock().push((key.into(), value.into()));
    }

    fn into_key_values(self) -> Vec<KeyValue> {
        self.pairs.into_inner()
    }
}

fn sort_by_key<V>(pairs: &mut [(Prop, V)], comparator: Option<KeyComparator>) {
    if let Some(cmp) = comparator {
        pairs.sort_by(|(a, _), (b, _)| cmp(a, b));
    }
}

/// Runs the map stage of several jobs in one scan over the vertices.
///
/// Rows of a partitioned vertex other than the canonical one are skipped, so every logical vertex
/// is mapped exactly once.
pub(crate) struct VertexMapJob<'a, M> {
    id_manager: Arc<dyn IdManager>,
    vertex_memory: Option<&'a VertexMemory<M>>,
    jobs: Vec<(Arc<dyn MapReduce>, MapEmitter)>,
}

impl<'a, M: Clone + Send + Sync + 'static> VertexMapJob<'a, M> {
    pub(crate) fn new(
        id_manager: Arc<dyn IdManager>,
        vertex_memory: Option<&'a VertexMemory<M>>,
        jobs: impl IntoIterator<Item = Arc<dyn MapReduce>>,
    ) -> Self {
        let jobs = jobs
            .into_iter()
            .filter(|job| job.do_stage(Stage::Map))
            .map(|job| {
                let emitter = MapEmitter::for_job(job.as_ref());
                (job, emitter)
            })
            .collect();
        Self {
            id_manager,
            vertex_memory,
            jobs,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub(crate) fn into_outputs(self) -> Vec<(Arc<dyn MapReduce>, MapEmitter)> {
        self.jobs
    }
}

impl<M: Clone + Send + Sync + 'static> ScanJob for VertexMapJob<'_, M> {
    fn worker_iteration_start(&self, _metrics: &ScanMetrics) {
        for (job, _) in &self.jobs {
            job.worker_start(Stage::Map);
        }
    }

    fn worker_iteration_end(&self, _metrics: &ScanMetrics) {
        for (job, _) in &self.jobs {
            job.worker_end(Stage::Map);
        }
    }

    fn process(
        &self,
        vertex: &PreloadedVertex,
        metrics: &ScanMetrics,
    ) -> Result<(), ProgramError> {
        let vid = vertex.id();
        if self.id_manager.is_partitioned(vid) && !self.id_manager.is_canonical(vid) {
            return Ok(());
        }
        let view = EvalVertexView::read_only(vertex, vid, self.vertex_memory);
        for (job, emitter) in &self.jobs {
            if let Err(err) = catch_failure(|| job.map(&view, emitter)) {
                metrics.increment_custom(MAP_JOB_FAILURE);
                error!(
                    vertex = %vid,
                    job = %job.memory_key(),
                    "Encountered exception executing map job: {err}"
                );
            }
        }
        Ok(())
    }

    fn queries(&self) -> Vec<SliceQuery> {
        full_vertex_queries()
    }
}

/// Finishes a job after its map stage: reduces if the job asks for it, sorts and builds the
/// final result.
pub(crate) fn complete_job(
    job: &dyn MapReduce,
    emitter: MapEmitter,
    num_threads: usize,
) -> Result<Prop, ComputerError> {
    let key_values = if job.do_stage(Stage::Reduce) {
        let mut groups = emitter.into_groups();
        sort_by_key(&mut groups, job.map_key_sort());
        let mut reduced = reduce(job, groups, num_threads)?;
        sort_by_key(&mut reduced, job.reduce_key_sort());
        reduced
    } else {
        let mut key_values = emitter.into_key_values();
        sort_by_key(&mut key_values, job.map_key_sort());
        key_values
    };
    debug!(
        job = %job.memory_key(),
        num_results = key_values.len(),
        "completed map/reduce job"
    );
    Ok(job.generate_final_result(key_values))
}

fn reduce(
    job: &dyn MapReduce,
    groups: Vec<(Prop, Vec<Prop>)>,
    num_threads: usize,
) -> Result<Vec<KeyValue>, ComputerError> {
    let emitter = ReduceEmitter::default();
    let failures = AtomicUsize::new(0);
    if !groups.is_empty() {
        let pool = custom_pool(num_threads, "reduce")
            .map_err(|e| BackendError::WorkerPool(e.to_string()))?;
        let chunk_size = groups.len().div_ceil(num_threads.max(1));
        let mut groups = groups.into_iter();
        let emitter = &emitter;
        let failures = &failures;
        pool.scope(|s| loop {
            let chunk: Vec<_> = groups.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            s.spawn(move |_| {
                job.worker_start(Stage::Reduce);
                for (key, values) in chunk {
                    let result = catch_failure(|| {
                        job.reduce(key.clone(), &mut values.into_iter(), emitter)
                    });
                    if let Err(err) = result {
                        failures.fetch_add(1, AtomicOrdering::Relaxed);
                        error!(key = %key, "Encountered exception executing reduce job: {err}");
                    }
                }
                job.worker_end(Stage::Reduce);
            });
        });
    }
    let failures = failures.into_inner();
    if failures > 0 {
        error!(job = %job.memory_key(), failures, "reduce stage failed");
        return Err(ComputerError::ReduceFailure {
            job: job.memory_key().to_string(),
            failures,
        });
    }
    Ok(emitter.into_key_values())
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    struct CountByParity {
        reduce: bool,
    }

    impl MapReduce for CountByParity {
        fn do_stage(&self, stage: Stage) -> bool {
            stage == Stage::Map || self.reduce
        }

        fn map(
            &self,
            vertex: &dyn VertexViewOps,
            emitter: &MapEmitter,
        ) -> Result<(), ProgramError> {
            emitter.emit(vertex.id().as_u64() % 2, 1u64);
            Ok(())
        }

        fn reduce(
            &self,
            key: Prop,
            values: &mut dyn Iterator<Item = Prop>,
            emitter: &ReduceEmitter,
        ) -> Result<(), ProgramError> {
            if key == Prop::U64(7) {
                return Err("unlucky".into());
            }
            let total: u64 = values.filter_map(|v| v.as_u64()).sum();
            emitter.emit(key, total);
            Ok(())
        }

        fn map_key_sort(&self) -> Option<KeyComparator> {
            Some(Arc::new(|a: &Prop, b: &Prop| a.partial_cmp(b).unwrap_or(Ordering::Equal)))
        }

        fn reduce_key_sort(&self) -> Option<KeyComparator> {
            Some(Arc::new(|a: &Prop, b: &Prop| b.partial_cmp(a).unwrap_or(Ordering::Equal)))
        }

        fn memory_key(&self) -> ArcStr {
            "parity".into()
        }
    }

    #[test]
    fn map_only_output_is_sorted_by_key() {
        let job = CountByParity { reduce: false };
        let emitter = MapEmitter::for_job(&job);
        for k in [3u64, 1, 2, 1, 0] {
            emitter.emit(k, k * 10);
        }
        let result = complete_job(&job, emitter, 2).unwrap();
        let expected = Prop::list([
            Prop::list([0u64, 0]),
            Prop::list([1u64, 10]),
            Prop::list([1u64, 10]),
            Prop::list([2u64, 20]),
            Prop::list([3u64, 30]),
        ]);
        assert_eq!(result, expected);
    }

    #[test]
    fn reduce_groups_by_key_and_sorts_output() {
        let job = CountByParity { reduce: true };
        let emitter = MapEmitter::for_job(&job);
        for k in 0..10u64 {
            emitter.emit(k % 3, 1u64);
        }
        let result = complete_job(&job, emitter, 3).unwrap();
        let expected = Prop::list([
            Prop::list([2u64, 3]),
            Prop::list([1u64, 3]),
            Prop::list([0u64, 4]),
        ]);
        assert_eq!(result, expected);
    }

    #[test]
    fn failing_reduce_keys_are_counted() {
        let job = CountByParity { reduce: true };
        let emitter = MapEmitter::for_job(&job);
        emitter.emit(7u64, 1u64);
        emitter.emit(1u64, 1u64);
        match complete_job(&job, emitter, 2) {
            Err(ComputerError::ReduceFailure { job, failures }) => {
                assert_eq!(job, "parity");
                assert_eq!(failures, 1);
            }
            other => panic!("expected reduce failure, got {other:?}"),
        }
    }
}
