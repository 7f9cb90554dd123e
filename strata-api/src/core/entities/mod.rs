use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

pub mod edges;
pub mod properties;

/// Physical id of a vertex row in the backing store.
///
/// A partitioned vertex is stored as several rows, each with its own `VID`; one of them is the
/// canonical row that stands in for the logical vertex.
#[repr(transparent)]
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize, Default,
)]
pub struct VID(pub u64);

impl VID {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for VID {
    fn from(id: u64) -> Self {
        VID(id)
    }
}

impl From<VID> for u64 {
    fn from(id: VID) -> Self {
        id.0
    }
}

impl Display for VID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolves physical vertex rows to the logical vertex they belong to.
pub trait IdManager: Send + Sync {
    /// `true` if the row is one of several rows of a partitioned vertex
    fn is_partitioned(&self, vid: VID) -> bool;

    /// `true` if the row is the representative row of its vertex. Rows of
    /// non-partitioned vertices are always canonical.
    fn is_canonical(&self, vid: VID) -> bool;

    /// The representative row for `vid` (identity for non-partitioned vertices)
    fn canonical(&self, vid: VID) -> VID;
}
