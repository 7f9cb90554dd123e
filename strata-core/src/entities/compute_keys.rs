use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strata_api::core::storage::arc_str::ArcStr;

/// A per-vertex property that only exists for the lifetime of a computation.
///
/// Transient keys are scratch space for the program and are never written back to the graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexComputeKey {
    key: ArcStr,
    transient: bool,
}

impl VertexComputeKey {
    pub fn new(key: impl Into<ArcStr>, transient: bool) -> Self {
        Self {
            key: key.into(),
            transient,
        }
    }

    pub fn persistent(key: impl Into<ArcStr>) -> Self {
        Self::new(key, false)
    }

    pub fn transient(key: impl Into<ArcStr>) -> Self {
        Self::new(key, true)
    }

    pub fn key(&self) -> &ArcStr {
        &self.key
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    #[default]
    Single,
    List,
}

/// The declared compute keys of a program with a stable slot index per key.
#[derive(Clone, Debug)]
pub struct ComputeKeys {
    keys: Arc<[VertexComputeKey]>,
    index: Arc<FxHashMap<ArcStr, usize>>,
}

impl Default for ComputeKeys {
    fn default() -> Self {
        Self::new([])
    }
}

impl ComputeKeys {
    /// Duplicate names keep the first declaration.
    pub fn new(keys: impl IntoIterator<Item = VertexComputeKey>) -> Self {
        let mut index = FxHashMap::default();
        let mut unique = vec![];
        for key in keys {
            if !index.contains_key(key.key()) {
                index.insert(key.key().clone(), unique.len());
                unique.push(key);
            }
        }
        Self {
            keys: unique.into(),
            index: Arc::new(index),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[inline]
    pub fn slot(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn key(&self, slot: usize) -> Option<&VertexComputeKey> {
        self.keys.get(slot)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VertexComputeKey> + '_ {
        self.keys.iter()
    }

    /// `(slot, key)` for every key that survives the computation
    pub fn persistent(&self) -> impl Iterator<Item = (usize, &VertexComputeKey)> + '_ {
        self.keys.iter().enumerate().filter(|(_, k)| !k.is_transient())
    }

    pub fn has_persistent(&self) -> bool {
        self.keys.iter().any(|k| !k.is_transient())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn slots_are_stable_and_deduplicated() {
        let keys = ComputeKeys::new([
            VertexComputeKey::persistent("degree"),
            VertexComputeKey::transient("scratch"),
            VertexComputeKey::transient("degree"),
        ]);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys.slot("degree"), Some(0));
        assert_eq!(keys.slot("scratch"), Some(1));
        assert_eq!(keys.slot("missing"), None);
        assert!(!keys.key(0).unwrap().is_transient());
        assert_eq!(
            keys.persistent().map(|(i, _)| i).collect::<Vec<_>>(),
            vec![0]
        );
    }
}
