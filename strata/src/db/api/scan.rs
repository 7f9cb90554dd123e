use crate::{
    db::{
        api::vertex::{PreloadedVertex, SliceQuery},
        task::{catch_failure, custom_pool},
    },
    errors::{BackendError, ProgramError},
};
use dashmap::DashMap;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_api::core::entities::VID;
use tracing::{debug, error};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Metric {
    Success,
    Failure,
}

/// Counters collected while a scan job runs.
#[derive(Debug, Default)]
pub struct ScanMetrics {
    success: AtomicU64,
    failure: AtomicU64,
    custom: DashMap<String, AtomicU64>,
}

impl ScanMetrics {
    pub fn get(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Success => self.success.load(Ordering::Acquire),
            Metric::Failure => self.failure.load(Ordering::Acquire),
        }
    }

    pub fn increment(&self, metric: Metric) {
        match metric {
            Metric::Success => self.success.fetch_add(1, Ordering::AcqRel),
            Metric::Failure => self.failure.fetch_add(1, Ordering::AcqRel),
        };
    }

    pub fn get_custom(&self, name: &str) -> u64 {
        self.custom
            .get(name)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn increment_custom(&self, name: &str) {
        self.increment_custom_by(name, 1)
    }

    pub fn increment_custom_by(&self, name: &str, delta: u64) {
        if let Some(counter) = self.custom.get(name) {
            counter.fetch_add(delta, Ordering::AcqRel);
            return;
        }
        self.custom
            .entry(name.to_string())
            .or_default()
            .fetch_add(delta, Ordering::AcqRel);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanConfig {
    pub job_id: String,
    pub num_threads: usize,
    pub batch_size: usize,
}

/// A job run once for every vertex row of the graph.
pub trait ScanJob: Send + Sync {
    /// Called by a worker before it processes a batch of vertices
    fn worker_iteration_start(&self, _metrics: &ScanMetrics) {}

    /// Called by a worker after it processed a batch of vertices
    fn worker_iteration_end(&self, _metrics: &ScanMetrics) {}

    fn process(&self, vertex: &PreloadedVertex, metrics: &ScanMetrics)
        -> Result<(), ProgramError>;

    /// The slices every vertex needs preloaded. Queried once per scan.
    fn queries(&self) -> Vec<SliceQuery>;
}

/// The vertex rows of a store and a way to load them.
pub trait VertexSource: Send + Sync {
    fn vertex_ids(&self) -> Vec<VID>;

    /// Loads the requested slices of a row, `None` if the row no longer exists
    fn load_vertex(
        &self,
        vid: VID,
        queries: &[SliceQuery],
    ) -> Result<Option<PreloadedVertex>, BackendError>;
}

/// Runs scan jobs over a [`VertexSource`] on a bounded worker pool.
///
/// Failures of individual vertices (errors as well as panics) never abort the scan; they are
/// logged and tallied under [`Metric::Failure`] for the caller to act on.
pub struct StandardScanner<'a, S: VertexSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: VertexSource + ?Sized> StandardScanner<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    pub fn execute(
        &self,
        job: &dyn ScanJob,
        config: &ScanConfig,
    ) -> Result<ScanMetrics, BackendError> {
        let pool = custom_pool(config.num_threads, &config.job_id)
            .map_err(|e| BackendError::WorkerPool(e.to_string()))?;
        let queries = job.queries();
        let ids = self.source.vertex_ids();
        let metrics = ScanMetrics::default();
        debug!(
            job_id = %config.job_id,
            num_vertices = ids.len(),
            num_threads = config.num_threads,
            "starting scan"
        );

        pool.install(|| {
            ids.par_chunks(config.batch_size.max(1)).for_each(|batch| {
                job.worker_iteration_start(&metrics);
                for vid in batch {
                    self.process_vertex(job, *vid, &queries, &metrics);
                }
                job.worker_iteration_end(&metrics);
            })
        });

        debug!(
            job_id = %config.job_id,
            success = metrics.get(Metric::Success),
            failure = metrics.get(Metric::Failure),
            "finished scan"
        );
        Ok(metrics)
    }

    fn process_vertex(
        &self,
        job: &dyn ScanJob,
        vid: VID,
        queries: &[SliceQuery],
        metrics: &ScanMetrics,
    ) {
        let result = catch_failure(|| match self.source.load_vertex(vid, queries)? {
            Some(vertex) => job.process(&vertex, metrics).map(|_| true),
            None => Ok(false),
        });
        match result {
            Ok(true) => metrics.increment(Metric::Success),
            Ok(false) => {}
            Err(err) => {
                error!(vertex = %vid, "Exception while processing vertex: {err}");
                metrics.increment(Metric::Failure);
            }
        }
    }
}
