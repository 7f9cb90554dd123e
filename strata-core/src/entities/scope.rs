use rustc_hash::FxHashMap;
use std::{
    fmt::{self, Debug, Display, Formatter},
    sync::Arc,
};
use strata_api::core::{
    entities::{edges::edge_ref::EdgeRef, VID},
    storage::arc_str::ArcStr,
    Direction,
};

/// Transforms a message as it travels along an edge.
pub type EdgeFunction<M> = Arc<dyn Fn(M, &EdgeRef) -> M + Send + Sync>;

/// Where messages sent by a vertex are delivered.
///
/// A global scope addresses an explicit set of vertices. A local scope addresses the neighbours
/// reached by walking `direction` over edges with the given labels; receivers pull messages back
/// along the reverse direction, optionally transforming each one with the scope's edge function.
pub enum MessageScope<M> {
    Global(GlobalScope),
    Local(LocalScope<M>),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GlobalScope {
    targets: Arc<[VID]>,
}

pub struct LocalScope<M> {
    direction: Direction,
    labels: Arc<[ArcStr]>,
    edge_fn: Option<EdgeFunction<M>>,
}

/// Identity of a scope for slot assignment. Edge functions do not take part in identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScopeId {
    Global,
    Local {
        direction: Direction,
        labels: Arc<[ArcStr]>,
    },
}

impl Display for ScopeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScopeId::Global => f.write_str("global"),
            ScopeId::Local { direction, labels } => {
                write!(f, "local({direction}")?;
                for label in labels.iter() {
                    write!(f, ", {label}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl GlobalScope {
    pub fn new(targets: impl IntoIterator<Item = VID>) -> Self {
        Self {
            targets: targets.into_iter().collect(),
        }
    }

    pub fn targets(&self) -> &[VID] {
        &self.targets
    }
}

impl<M> LocalScope<M> {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            labels: Arc::new([]),
            edge_fn: None,
        }
    }

    pub fn with_labels<L: Into<ArcStr>>(mut self, labels: impl IntoIterator<Item = L>) -> Self {
        let mut labels: Vec<ArcStr> = labels.into_iter().map(|l| l.into()).collect();
        labels.sort();
        labels.dedup();
        self.labels = labels.into();
        self
    }

    pub fn with_edge_function<F>(mut self, edge_fn: F) -> Self
    where
        F: Fn(M, &EdgeRef) -> M + Send + Sync + 'static,
    {
        self.edge_fn = Some(Arc::new(edge_fn));
        self
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn labels(&self) -> &[ArcStr] {
        &self.labels
    }

    /// Applies the edge function, if any, to a message pulled over `edge`
    pub fn apply_edge(&self, msg: M, edge: &EdgeRef) -> M {
        match &self.edge_fn {
            Some(f) => f(msg, edge),
            None => msg,
        }
    }
}

impl<M> Clone for LocalScope<M> {
    fn clone(&self) -> Self {
        Self {
            direction: self.direction,
            labels: self.labels.clone(),
            edge_fn: self.edge_fn.clone(),
        }
    }
}

impl<M> Debug for LocalScope<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalScope")
            .field("direction", &self.direction)
            .field("labels", &self.labels)
            .field("edge_fn", &self.edge_fn.is_some())
            .finish()
    }
}

impl<M> MessageScope<M> {
    pub fn global(targets: impl IntoIterator<Item = VID>) -> Self {
        MessageScope::Global(GlobalScope::new(targets))
    }

    pub fn local(direction: Direction) -> Self {
        MessageScope::Local(LocalScope::new(direction))
    }

    pub fn id(&self) -> ScopeId {
        match self {
            MessageScope::Global(_) => ScopeId::Global,
            MessageScope::Local(local) => ScopeId::Local {
                direction: local.direction,
                labels: local.labels.clone(),
            },
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, MessageScope::Local(_))
    }
}

impl<M> Clone for MessageScope<M> {
    fn clone(&self) -> Self {
        match self {
            MessageScope::Global(global) => MessageScope::Global(global.clone()),
            MessageScope::Local(local) => MessageScope::Local(local.clone()),
        }
    }
}

impl<M> Debug for MessageScope<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MessageScope::Global(global) => f.debug_tuple("Global").field(global).finish(),
            MessageScope::Local(local) => f.debug_tuple("Local").field(local).finish(),
        }
    }
}

impl<M> From<LocalScope<M>> for MessageScope<M> {
    fn from(value: LocalScope<M>) -> Self {
        MessageScope::Local(value)
    }
}

impl<M> From<GlobalScope> for MessageScope<M> {
    fn from(value: GlobalScope) -> Self {
        MessageScope::Global(value)
    }
}

/// Slot assignment for the scopes active in one superstep.
///
/// Slot 0 is reserved for global messages, local scopes take slots `1..=n` in declaration
/// order. The assignment is rebuilt every superstep because the declared scopes may change.
#[derive(Clone, Debug, Default)]
pub struct ScopeSlots {
    local: FxHashMap<ScopeId, usize>,
    global: bool,
}

impl ScopeSlots {
    pub const GLOBAL_SLOT: usize = 0;

    pub fn new<'a, M: 'a>(scopes: impl IntoIterator<Item = &'a MessageScope<M>>) -> Self {
        let mut slots = Self::default();
        for scope in scopes {
            match scope.id() {
                ScopeId::Global => slots.global = true,
                id => {
                    let next = slots.local.len() + 1;
                    slots.local.entry(id).or_insert(next);
                }
            }
        }
        slots
    }

    pub fn slot(&self, id: &ScopeId) -> Option<usize> {
        match id {
            ScopeId::Global => self.global.then_some(Self::GLOBAL_SLOT),
            local => self.local.get(local).copied(),
        }
    }

    /// Number of message slots a vertex needs, including the reserved global slot
    pub fn len(&self) -> usize {
        self.local.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        !self.global && self.local.is_empty()
    }
}
