use crate::errors::ProgramError;
use once_cell::sync::Lazy;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
};

pub mod computer;
pub mod eval_vertex;
pub mod map_reduce;
pub(crate) mod partition;
pub mod program;
pub mod result;
pub(crate) mod scan_job;
pub(crate) mod writeback;

/// Default worker count when none is configured
pub static DEFAULT_WORKERS: Lazy<usize> = Lazy::new(|| {
    std::env::var("STRATA_MAX_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
});

/// A dedicated pool for one phase of a computation
pub fn custom_pool(n_threads: usize, name: &str) -> Result<ThreadPool, ThreadPoolBuildError> {
    let name = name.to_string();
    ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .thread_name(move |i| format!("{name}-{i}"))
        .build()
}

/// Runs user code, turning panics into errors so one bad vertex does not take a worker down.
pub(crate) fn catch_failure<T, F>(f: F) -> Result<T, ProgramError>
where
    F: FnOnce() -> Result<T, ProgramError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(panic_message(payload).into()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(msg) => *msg,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(msg) => msg.to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn panics_become_errors() {
        let result: Result<(), _> = catch_failure(|| panic!("boom {}", 1));
        assert_eq!(result.unwrap_err().to_string(), "boom 1");
        let result: Result<(), _> = catch_failure(|| panic!("static"));
        assert_eq!(result.unwrap_err().to_string(), "static");
        assert_eq!(catch_failure(|| Ok(3)).unwrap(), 3);
    }
}
