use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

pub mod entities;
pub mod storage;
pub mod utils;

/// Denotes the direction of an edge. Can be incoming, outgoing or both.
#[derive(Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Debug, Default, Serialize, Deserialize)]
pub enum Direction {
    OUT,
    IN,
    #[default]
    BOTH,
}

impl Direction {
    /// The direction a message travels back along, i.e. the edges a receiver has to walk to find
    /// the senders of a message that was sent along `self`.
    pub fn reverse(&self) -> Direction {
        match self {
            Direction::OUT => Direction::IN,
            Direction::IN => Direction::OUT,
            Direction::BOTH => Direction::BOTH,
        }
    }

    /// `true` if every edge selected by `other` is also selected by `self`
    pub fn covers(&self, other: Direction) -> bool {
        *self == Direction::BOTH || *self == other
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let dir = match self {
            Direction::OUT => "out",
            Direction::IN => "in",
            Direction::BOTH => "both",
        };
        f.write_str(dir)
    }
}
