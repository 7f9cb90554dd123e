use crate::core::{entities::properties::prop::Prop, storage::arc_str::ArcStr};
use std::sync::Arc;

pub mod prop;

/// The persisted properties of a vertex row as preloaded by a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedProperties(Arc<[(ArcStr, Prop)]>);

impl LoadedProperties {
    pub fn new(props: impl IntoIterator<Item = (ArcStr, Prop)>) -> Self {
        Self(props.into_iter().collect())
    }

    pub fn get(&self, key: &str) -> Option<&Prop> {
        self.0
            .iter()
            .find_map(|(k, v)| (&*k.0 == key).then_some(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArcStr, &Prop)> + '_ {
        self.0.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for LoadedProperties {
    fn default() -> Self {
        Self::new([])
    }
}

impl<K: Into<ArcStr>, V: Into<Prop>> FromIterator<(K, V)> for LoadedProperties {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())))
    }
}
