use crate::core::storage::arc_str::ArcStr;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt::{self, Display, Formatter},
    hash::{Hash, Hasher},
    sync::Arc,
};

/// Denotes the types of properties allowed to be stored in the graph and in memory.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Prop {
    Str(ArcStr),
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    List(Arc<Vec<Prop>>),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub enum PropType {
    Str,
    Bool,
    I64,
    U64,
    F64,
    List,
}

impl Display for PropType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let type_str = match self {
            PropType::Str => "Str",
            PropType::Bool => "Bool",
            PropType::I64 => "I64",
            PropType::U64 => "U64",
            PropType::F64 => "F64",
            PropType::List => "List",
        };
        f.write_str(type_str)
    }
}

// Floats are compared and hashed by their bit pattern so props can be used as map keys
impl PartialEq for Prop {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Prop::Str(a), Prop::Str(b)) => a == b,
            (Prop::Bool(a), Prop::Bool(b)) => a == b,
            (Prop::I64(a), Prop::I64(b)) => a == b,
            (Prop::U64(a), Prop::U64(b)) => a == b,
            (Prop::F64(a), Prop::F64(b)) => a.to_bits() == b.to_bits(),
            (Prop::List(a), Prop::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Prop {}

impl Hash for Prop {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Prop::Str(s) => s.hash(state),
            Prop::Bool(b) => b.hash(state),
            Prop::I64(i) => i.hash(state),
            Prop::U64(u) => u.hash(state),
            Prop::F64(f) => f.to_bits().hash(state),
            Prop::List(values) => values.hash(state),
        }
    }
}

impl PartialOrd for Prop {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Prop::Str(a), Prop::Str(b)) => a.partial_cmp(b),
            (Prop::Bool(a), Prop::Bool(b)) => a.partial_cmp(b),
            (Prop::I64(a), Prop::I64(b)) => a.partial_cmp(b),
            (Prop::U64(a), Prop::U64(b)) => a.partial_cmp(b),
            (Prop::F64(a), Prop::F64(b)) => Some(a.total_cmp(b)),
            (Prop::List(a), Prop::List(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl Display for Prop {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Prop::Str(value) => write!(f, "{}", value),
            Prop::Bool(value) => write!(f, "{}", value),
            Prop::I64(value) => write!(f, "{}", value),
            Prop::U64(value) => write!(f, "{}", value),
            Prop::F64(value) => write!(f, "{}", value),
            Prop::List(value) => write!(f, "[{}]", value.iter().join(", ")),
        }
    }
}

impl Prop {
    pub fn str(s: impl Into<ArcStr>) -> Prop {
        Prop::Str(s.into())
    }

    pub fn list<P: Into<Prop>, I: IntoIterator<Item = P>>(values: I) -> Prop {
        Prop::List(Arc::new(values.into_iter().map_into().collect()))
    }

    pub fn dtype(&self) -> PropType {
        match self {
            Prop::Str(_) => PropType::Str,
            Prop::Bool(_) => PropType::Bool,
            Prop::I64(_) => PropType::I64,
            Prop::U64(_) => PropType::U64,
            Prop::F64(_) => PropType::F64,
            Prop::List(_) => PropType::List,
        }
    }

    /// Appends `value` to a list-valued property.
    ///
    /// A missing value starts a new list and a scalar value is promoted to a one element list
    /// before appending.
    pub fn append(existing: Option<Prop>, value: Prop) -> Prop {
        match existing {
            None => Prop::List(Arc::new(vec![value])),
            Some(Prop::List(mut values)) => {
                Arc::make_mut(&mut values).push(value);
                Prop::List(values)
            }
            Some(scalar) => Prop::List(Arc::new(vec![scalar, value])),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Prop::Str(s) => Some(s.0.as_ref()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Prop::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Prop::I64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Prop::U64(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Prop::F64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Prop]> {
        match self {
            Prop::List(values) => Some(values.as_slice()),
            _ => None,
        }
    }
}

impl From<&str> for Prop {
    fn from(value: &str) -> Self {
        Prop::Str(value.into())
    }
}

impl From<String> for Prop {
    fn from(value: String) -> Self {
        Prop::Str(value.into())
    }
}

impl From<ArcStr> for Prop {
    fn from(value: ArcStr) -> Self {
        Prop::Str(value)
    }
}

impl From<bool> for Prop {
    fn from(value: bool) -> Self {
        Prop::Bool(value)
    }
}

impl From<i64> for Prop {
    fn from(value: i64) -> Self {
        Prop::I64(value)
    }
}

impl From<u64> for Prop {
    fn from(value: u64) -> Self {
        Prop::U64(value)
    }
}

impl From<f64> for Prop {
    fn from(value: f64) -> Self {
        Prop::F64(value)
    }
}

impl From<Vec<Prop>> for Prop {
    fn from(value: Vec<Prop>) -> Self {
        Prop::List(Arc::new(value))
    }
}
