use crate::StateError;
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::RwLock;
use rustc_hash::{FxBuildHasher, FxHashMap};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use strata_api::core::{entities::properties::prop::Prop, storage::arc_str::ArcStr};
use tracing::debug;

/// How concurrent additions to a memory key are reduced.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryOperator {
    Sum,
    And,
    Or,
    Assign,
    Min,
    Max,
}

impl MemoryOperator {
    pub fn apply(&self, key: &str, current: Prop, value: Prop) -> Result<Prop, StateError> {
        let mismatch = |current: &Prop, value: &Prop| StateError::OperatorTypeMismatch {
            key: key.to_string(),
            operator: *self,
            current: current.dtype(),
            value: value.dtype(),
        };
        match self {
            MemoryOperator::Assign => return Ok(value),
            MemoryOperator::Min | MemoryOperator::Max => {
                let ordering = current
                    .partial_cmp(&value)
                    .ok_or_else(|| mismatch(&current, &value))?;
                let keep_current = match self {
                    MemoryOperator::Min => ordering.is_le(),
                    _ => ordering.is_ge(),
                };
                return Ok(if keep_current { current } else { value });
            }
            _ => {}
        }
        let result = match (self, current, value) {
            (MemoryOperator::Sum, Prop::I64(a), Prop::I64(b)) => Prop::I64(a.wrapping_add(b)),
            (MemoryOperator::Sum, Prop::U64(a), Prop::U64(b)) => Prop::U64(a.wrapping_add(b)),
            (MemoryOperator::Sum, Prop::F64(a), Prop::F64(b)) => Prop::F64(a + b),
            (MemoryOperator::And, Prop::Bool(a), Prop::Bool(b)) => Prop::Bool(a && b),
            (MemoryOperator::Or, Prop::Bool(a), Prop::Bool(b)) => Prop::Bool(a || b),
            (_, a, b) => return Err(mismatch(&a, &b)),
        };
        Ok(result)
    }
}

/// A declared global memory key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryComputeKey {
    key: ArcStr,
    operator: MemoryOperator,
    transient: bool,
}

impl MemoryComputeKey {
    pub fn new(key: impl Into<ArcStr>, operator: MemoryOperator, transient: bool) -> Self {
        Self {
            key: key.into(),
            operator,
            transient,
        }
    }

    pub fn key(&self) -> &ArcStr {
        &self.key
    }

    pub fn operator(&self) -> MemoryOperator {
        self.operator
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }
}

/// Global memory shared by all vertices of a computation.
///
/// Values live in two maps. Reads always see the previous map, i.e. the state as of the last
/// sub-round boundary, while writes go to the current map: `add` reduces with the key's operator
/// and is only allowed while vertices execute, `set` overwrites and is only allowed outside of
/// vertex execution (setup, terminate, map/reduce results).
#[derive(Debug)]
pub struct ComputerMemory {
    keys: FxHashMap<ArcStr, MemoryComputeKey>,
    current: DashMap<ArcStr, Prop, FxBuildHasher>,
    previous: RwLock<Arc<FxHashMap<ArcStr, Prop>>>,
    in_execution: AtomicBool,
    iteration: AtomicUsize,
    runtime: AtomicU64,
}

impl ComputerMemory {
    pub fn new(keys: impl IntoIterator<Item = MemoryComputeKey>) -> Self {
        Self {
            keys: keys.into_iter().map(|k| (k.key().clone(), k)).collect(),
            current: DashMap::with_hasher(FxBuildHasher::default()),
            previous: RwLock::new(Arc::new(FxHashMap::default())),
            in_execution: AtomicBool::new(false),
            iteration: AtomicUsize::new(0),
            runtime: AtomicU64::new(0),
        }
    }

    fn declared(&self, key: &str) -> Result<&MemoryComputeKey, StateError> {
        self.keys
            .get(key)
            .ok_or_else(|| StateError::UndeclaredMemoryKey(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &MemoryComputeKey> + '_ {
        self.keys.values()
    }

    /// Value of `key` as of the last sub-round boundary
    pub fn get(&self, key: &str) -> Result<Option<Prop>, StateError> {
        self.declared(key)?;
        Ok(self.previous.read().get(key).cloned())
    }

    pub fn exists(&self, key: &str) -> bool {
        self.previous.read().contains_key(key)
    }

    /// Reduces `value` into `key` with the key's operator. Only valid while vertices execute.
    pub fn add(&self, key: &str, value: impl Into<Prop>) -> Result<(), StateError> {
        let declared = self.declared(key)?;
        if !self.in_execution.load(Ordering::Acquire) {
            return Err(StateError::AddOutsideExecution(key.to_string()));
        }
        match self.current.entry(declared.key().clone()) {
            Entry::Occupied(mut entry) => {
                let merged = declared
                    .operator()
                    .apply(key, entry.get().clone(), value.into())?;
                entry.insert(merged);
            }
            Entry::Vacant(entry) => {
                entry.insert(value.into());
            }
        }
        Ok(())
    }

    /// Overwrites `key`. Not allowed while vertices execute.
    pub fn set(&self, key: &str, value: impl Into<Prop>) -> Result<(), StateError> {
        let declared = self.declared(key)?;
        if self.in_execution.load(Ordering::Acquire) {
            return Err(StateError::SetDuringExecution(key.to_string()));
        }
        self.current.insert(declared.key().clone(), value.into());
        Ok(())
    }

    /// Publishes the current values to readers and toggles between the execute and the
    /// setup/terminate sub-round. Called once before and once after every superstep.
    pub fn complete_sub_round(&self) {
        self.publish();
        let executing = !self.in_execution.load(Ordering::Acquire);
        self.in_execution.store(executing, Ordering::Release);
    }

    fn publish(&self) {
        let snapshot: FxHashMap<ArcStr, Prop> = self
            .current
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        *self.previous.write() = Arc::new(snapshot);
    }

    pub fn is_in_execution(&self) -> bool {
        self.in_execution.load(Ordering::Acquire)
    }

    /// Index of the running superstep, starting at 0
    pub fn iteration(&self) -> usize {
        self.iteration.load(Ordering::Acquire)
    }

    pub fn is_initial_iteration(&self) -> bool {
        self.iteration() == 0
    }

    pub fn incr_iteration(&self) {
        self.iteration.fetch_add(1, Ordering::AcqRel);
    }

    pub fn set_runtime(&self, runtime: Duration) {
        self.runtime
            .store(runtime.as_millis() as u64, Ordering::Release);
    }

    /// Elapsed time in milliseconds, set once the computation finished
    pub fn runtime(&self) -> u64 {
        self.runtime.load(Ordering::Acquire)
    }

    /// Ends the computation: publishes pending values, drops transient keys and freezes the
    /// memory into a snapshot reporting the last executed superstep as its iteration.
    pub fn complete(self) -> MemorySnapshot {
        self.publish();
        let mut values = Arc::unwrap_or_clone(self.previous.into_inner());
        values.retain(|key, _| {
            self.keys
                .get(key)
                .map(|k| !k.is_transient())
                .unwrap_or(true)
        });
        let iteration = self.iteration.into_inner().saturating_sub(1);
        let runtime = self.runtime.into_inner();
        debug!(iteration, runtime, num_values = values.len(), "memory completed");
        MemorySnapshot {
            values,
            iteration,
            runtime,
        }
    }
}

/// Final, immutable state of the global memory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemorySnapshot {
    values: FxHashMap<ArcStr, Prop>,
    iteration: usize,
    runtime: u64,
}

impl MemorySnapshot {
    pub fn get(&self, key: &str) -> Option<&Prop> {
        self.values.get(key)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ArcStr> + '_ {
        self.values.keys()
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Runtime in milliseconds
    pub fn runtime(&self) -> u64 {
        self.runtime
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn memory() -> ComputerMemory {
        ComputerMemory::new([
            MemoryComputeKey::new("count", MemoryOperator::Sum, false),
            MemoryComputeKey::new("changed", MemoryOperator::Or, true),
            MemoryComputeKey::new("result", MemoryOperator::Assign, false),
        ])
    }

    #[test]
    fn reads_see_previous_sub_round() {
        let memory = memory();
        memory.set("count", 0i64).unwrap();
        assert_eq!(memory.get("count"), Ok(None));
        memory.complete_sub_round();
        assert!(memory.is_in_execution());
        assert_eq!(memory.get("count"), Ok(Some(Prop::I64(0))));
        memory.add("count", 2i64).unwrap();
        memory.add("count", 3i64).unwrap();
        assert_eq!(memory.get("count"), Ok(Some(Prop::I64(0))));
        memory.complete_sub_round();
        assert!(!memory.is_in_execution());
        assert_eq!(memory.get("count"), Ok(Some(Prop::I64(5))));
    }

    #[test]
    fn add_and_set_are_phase_checked() {
        let memory = memory();
        assert_eq!(
            memory.add("count", 1i64),
            Err(StateError::AddOutsideExecution("count".to_string()))
        );
        memory.complete_sub_round();
        assert_eq!(
            memory.set("count", 1i64),
            Err(StateError::SetDuringExecution("count".to_string()))
        );
        assert_eq!(
            memory.add("missing", 1i64),
            Err(StateError::UndeclaredMemoryKey("missing".to_string()))
        );
    }

    #[test]
    fn complete_drops_transient_keys() {
        let memory = memory();
        memory.complete_sub_round();
        memory.add("changed", true).unwrap();
        memory.add("count", 1i64).unwrap();
        memory.complete_sub_round();
        memory.incr_iteration();
        memory.set("result", "done").unwrap();
        let snapshot = memory.complete();
        assert!(!snapshot.exists("changed"));
        assert_eq!(snapshot.get("count"), Some(&Prop::I64(1)));
        assert_eq!(snapshot.get("result"), Some(&Prop::str("done")));
        assert_eq!(snapshot.iteration(), 0);
    }

    #[test]
    fn type_mismatch_is_reported() {
        let result = MemoryOperator::Sum.apply("count", Prop::I64(1), Prop::Bool(true));
        assert!(matches!(
            result,
            Err(StateError::OperatorTypeMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn sum_is_order_independent(values in proptest::collection::vec(any::<i32>(), 1..20)) {
            let forward = values.iter().try_fold(Prop::I64(0), |acc, v| {
                MemoryOperator::Sum.apply("k", acc, Prop::I64(*v as i64))
            });
            let backward = values.iter().rev().try_fold(Prop::I64(0), |acc, v| {
                MemoryOperator::Sum.apply("k", acc, Prop::I64(*v as i64))
            });
            prop_assert_eq!(forward, backward);
        }

        #[test]
        fn min_max_pick_extremes(values in proptest::collection::vec(any::<u64>(), 1..20)) {
            let min = values.iter().skip(1).try_fold(Prop::U64(values[0]), |acc, v| {
                MemoryOperator::Min.apply("k", acc, Prop::U64(*v))
            });
            let max = values.iter().skip(1).try_fold(Prop::U64(values[0]), |acc, v| {
                MemoryOperator::Max.apply("k", acc, Prop::U64(*v))
            });
            prop_assert_eq!(min, Ok(Prop::U64(*values.iter().min().unwrap())));
            prop_assert_eq!(max, Ok(Prop::U64(*values.iter().max().unwrap())));
        }

        #[test]
        fn assign_keeps_last(a in any::<i64>(), b in any::<i64>()) {
            prop_assert_eq!(
                MemoryOperator::Assign.apply("k", Prop::I64(a), Prop::I64(b)),
                Ok(Prop::I64(b))
            );
        }
    }
}
