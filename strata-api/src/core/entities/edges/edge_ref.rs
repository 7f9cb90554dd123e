use crate::core::{entities::VID, storage::arc_str::ArcStr, Direction};

/// A labelled edge as seen from one of its endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeRef {
    src_pid: VID,
    dst_pid: VID,
    label: ArcStr,
    e_type: Dir,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Dir {
    Into,
    Out,
}

impl EdgeRef {
    #[inline]
    pub fn new_outgoing(src_pid: VID, dst_pid: VID, label: impl Into<ArcStr>) -> Self {
        EdgeRef {
            src_pid,
            dst_pid,
            label: label.into(),
            e_type: Dir::Out,
        }
    }

    #[inline]
    pub fn new_incoming(src_pid: VID, dst_pid: VID, label: impl Into<ArcStr>) -> Self {
        EdgeRef {
            src_pid,
            dst_pid,
            label: label.into(),
            e_type: Dir::Into,
        }
    }

    #[inline(always)]
    pub fn src(&self) -> VID {
        self.src_pid
    }

    #[inline(always)]
    pub fn dst(&self) -> VID {
        self.dst_pid
    }

    #[inline(always)]
    pub fn label(&self) -> &ArcStr {
        &self.label
    }

    #[inline(always)]
    pub fn dir(&self) -> Dir {
        self.e_type
    }

    /// The endpoint the edge was loaded from
    #[inline]
    pub fn local(&self) -> VID {
        match self.e_type {
            Dir::Into => self.dst(),
            Dir::Out => self.src(),
        }
    }

    /// The opposite endpoint
    #[inline]
    pub fn remote(&self) -> VID {
        match self.e_type {
            Dir::Into => self.src(),
            Dir::Out => self.dst(),
        }
    }

    /// `true` if the edge is selected when walking `direction` from its local endpoint and its
    /// label is one of `labels` (an empty label set selects every label)
    pub fn matches(&self, direction: Direction, labels: &[ArcStr]) -> bool {
        let dir_ok = match direction {
            Direction::OUT => self.e_type == Dir::Out,
            Direction::IN => self.e_type == Dir::Into,
            Direction::BOTH => true,
        };
        dir_ok && (labels.is_empty() || labels.contains(&self.label))
    }
}
