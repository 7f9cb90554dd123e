use crate::errors::BackendError;
use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
};
use strata_api::core::{
    entities::{
        edges::edge_ref::EdgeRef,
        properties::{prop::Prop, LoadedProperties},
        VID,
    },
    storage::arc_str::ArcStr,
    Direction,
};

/// A slice of a vertex row a scan job wants preloaded.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SliceQuery {
    Properties,
    Edges {
        direction: Direction,
        labels: Arc<[ArcStr]>,
    },
}

impl SliceQuery {
    pub fn edges(direction: Direction, labels: impl Into<Arc<[ArcStr]>>) -> Self {
        SliceQuery::Edges {
            direction,
            labels: labels.into(),
        }
    }

    pub fn all_edges() -> Self {
        Self::edges(Direction::BOTH, Vec::new())
    }

    /// `true` if loading `self` also loads every edge selected by `direction` and `labels`
    pub fn covers(&self, direction: Direction, labels: &[ArcStr]) -> bool {
        match self {
            SliceQuery::Properties => false,
            SliceQuery::Edges {
                direction: loaded_dir,
                labels: loaded_labels,
            } => {
                loaded_dir.covers(direction)
                    && (loaded_labels.is_empty()
                        || (!labels.is_empty() && labels.iter().all(|l| loaded_labels.contains(l))))
            }
        }
    }
}

impl Display for SliceQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SliceQuery::Properties => f.write_str("properties"),
            SliceQuery::Edges { direction, labels } if labels.is_empty() => {
                write!(f, "{direction} edges")
            }
            SliceQuery::Edges { direction, labels } => {
                write!(f, "{direction} edges [")?;
                for (i, label) in labels.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{label}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A vertex row together with the slices a scan preloaded for it.
///
/// Accessing a slice that was not loaded is an error rather than an empty result.
#[derive(Clone, Debug)]
pub struct PreloadedVertex {
    id: VID,
    properties: Option<LoadedProperties>,
    edges: Vec<EdgeRef>,
    edge_slices: Vec<SliceQuery>,
}

impl PreloadedVertex {
    pub fn new(
        id: VID,
        properties: Option<LoadedProperties>,
        edges: Vec<EdgeRef>,
        edge_slices: Vec<SliceQuery>,
    ) -> Self {
        Self {
            id,
            properties,
            edges,
            edge_slices,
        }
    }

    pub fn id(&self) -> VID {
        self.id
    }

    pub fn loaded_properties(&self) -> Option<&LoadedProperties> {
        self.properties.as_ref()
    }

    pub fn property(&self, key: &str) -> Result<Option<&Prop>, BackendError> {
        let properties = self
            .properties
            .as_ref()
            .ok_or_else(|| BackendError::SliceNotLoaded {
                vid: self.id,
                slice: SliceQuery::Properties.to_string(),
            })?;
        Ok(properties.get(key))
    }

    pub fn edges<'a>(
        &'a self,
        direction: Direction,
        labels: &'a [ArcStr],
    ) -> Result<impl Iterator<Item = &'a EdgeRef> + 'a, BackendError> {
        if !self
            .edge_slices
            .iter()
            .any(|slice| slice.covers(direction, labels))
        {
            return Err(BackendError::SliceNotLoaded {
                vid: self.id,
                slice: SliceQuery::edges(direction, labels.to_vec()).to_string(),
            });
        }
        Ok(self
            .edges
            .iter()
            .filter(move |edge| edge.matches(direction, labels)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn vertex(slices: Vec<SliceQuery>) -> PreloadedVertex {
        PreloadedVertex::new(
            VID(1),
            None,
            vec![
                EdgeRef::new_outgoing(VID(1), VID(2), "knows"),
                EdgeRef::new_incoming(VID(3), VID(1), "created"),
            ],
            slices,
        )
    }

    #[test]
    fn unloaded_slices_fail() {
        let v = vertex(vec![SliceQuery::edges(Direction::OUT, Vec::new())]);
        assert!(v.property("name").is_err());
        assert!(v.edges(Direction::IN, &[]).is_err());
        assert_eq!(v.edges(Direction::OUT, &[]).unwrap().count(), 1);
    }

    #[test]
    fn label_restricted_slices() {
        let v = vertex(vec![SliceQuery::edges(
            Direction::BOTH,
            vec![ArcStr::from("created")],
        )]);
        let created = [ArcStr::from("created")];
        assert_eq!(v.edges(Direction::IN, &created).unwrap().count(), 1);
        assert!(v.edges(Direction::IN, &[]).is_err());
        assert!(v.edges(Direction::OUT, &[ArcStr::from("knows")]).is_err());
    }
}
