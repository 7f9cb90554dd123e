use crate::{
    entities::{
        combiner::MessageCombiner,
        compute_keys::{Cardinality, ComputeKeys},
        scope::{MessageScope, ScopeId, ScopeSlots},
    },
    state::{partition::PartitionVertexAggregate, vertex_state::VertexState},
    StateError,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxBuildHasher, FxHashMap};
use std::{
    fmt::{self, Debug, Formatter},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use strata_api::core::{
    entities::{
        properties::{prop::Prop, LoadedProperties},
        IdManager, VID,
    },
    storage::arc_str::ArcStr,
};
use tracing::trace;

type Cell<T> = Arc<Mutex<T>>;

/// The scopes declared for a superstep together with their slot assignment.
struct ActiveScopes<M> {
    scopes: Arc<[MessageScope<M>]>,
    slots: ScopeSlots,
}

impl<M> ActiveScopes<M> {
    fn new(scopes: Vec<MessageScope<M>>) -> Self {
        let slots = ScopeSlots::new(&scopes);
        Self {
            scopes: scopes.into(),
            slots,
        }
    }
}

impl<M> Default for ActiveScopes<M> {
    fn default() -> Self {
        Self::new(vec![])
    }
}

struct ScopeRegistry<M> {
    current: ActiveScopes<M>,
    previous: ActiveScopes<M>,
}

/// Read access to a vertex's state cell for phases that must not mutate it.
pub struct ReadOnlyState<M> {
    cell: Option<Cell<VertexState<M>>>,
}

impl<M: Clone> ReadOnlyState<M> {
    pub fn property(&self, slot: usize) -> Option<Prop> {
        self.cell
            .as_ref()
            .and_then(|cell| cell.lock().property(slot).cloned())
    }

    pub fn message(&self, slot: usize) -> Option<M> {
        self.cell
            .as_ref()
            .and_then(|cell| cell.lock().message(slot).cloned())
    }

    pub fn is_empty(&self) -> bool {
        self.cell.is_none()
    }
}

/// Concurrent table of per-vertex compute state for one computation.
///
/// Every operation resolves rows of partitioned vertices to their canonical id first, so all
/// rows of a vertex share one state cell. Cells are created lazily and each one is guarded by its
/// own lock; the table itself is sharded so different vertices never contend.
pub struct VertexMemory<M> {
    id_manager: Arc<dyn IdManager>,
    keys: ComputeKeys,
    combiner: Option<Arc<dyn MessageCombiner<M>>>,
    states: DashMap<VID, Cell<VertexState<M>>, FxBuildHasher>,
    partitions: DashMap<VID, Cell<PartitionVertexAggregate<M>>, FxBuildHasher>,
    scopes: RwLock<ScopeRegistry<M>>,
    in_execution: AtomicBool,
}

impl<M> Debug for VertexMemory<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexMemory")
            .field("keys", &self.keys)
            .field("num_states", &self.states.len())
            .field("num_partitions", &self.partitions.len())
            .field("in_execution", &self.in_execution.load(Ordering::Relaxed))
            .finish()
    }
}

impl<M: Clone + Send + Sync + 'static> VertexMemory<M> {
    pub fn new(
        id_manager: Arc<dyn IdManager>,
        keys: ComputeKeys,
        combiner: Option<Arc<dyn MessageCombiner<M>>>,
    ) -> Self {
        Self {
            id_manager,
            keys,
            combiner,
            states: DashMap::with_hasher(FxBuildHasher::default()),
            partitions: DashMap::with_hasher(FxBuildHasher::default()),
            scopes: RwLock::new(ScopeRegistry {
                current: ActiveScopes::default(),
                previous: ActiveScopes::default(),
            }),
            in_execution: AtomicBool::new(false),
        }
    }

    pub fn keys(&self) -> &ComputeKeys {
        &self.keys
    }

    pub fn combiner(&self) -> Option<&dyn MessageCombiner<M>> {
        self.combiner.as_deref()
    }

    #[inline]
    fn canonical(&self, vid: VID) -> VID {
        self.id_manager.canonical(vid)
    }

    /// `true` between [`Self::advance_superstep`] and [`Self::complete_superstep`]
    pub fn is_in_execution(&self) -> bool {
        self.in_execution.load(Ordering::Acquire)
    }

    /// The state cell of `vid`, created on first use
    pub fn get_or_create(&self, vid: VID) -> Cell<VertexState<M>> {
        let vid = self.canonical(vid);
        if let Some(cell) = self.states.get(&vid) {
            return Arc::clone(cell.value());
        }
        let entry = self.states.entry(vid).or_default();
        Arc::clone(entry.value())
    }

    /// Read-only view of the state of `vid`. Vertices without state read as empty.
    pub fn get_read_only(&self, vid: VID) -> ReadOnlyState<M> {
        let vid = self.canonical(vid);
        ReadOnlyState {
            cell: self.states.get(&vid).map(|cell| Arc::clone(cell.value())),
        }
    }

    /// Installs the scopes for the next superstep.
    ///
    /// The scopes of the superstep that just finished become the previous scopes, which are the
    /// ones messages are read through. Partition aggregates of the last superstep are dropped.
    pub fn advance_superstep(&self, scopes: Vec<MessageScope<M>>) {
        let mut registry = self.scopes.write();
        let current = std::mem::replace(&mut registry.current, ActiveScopes::new(scopes));
        registry.previous = current;
        self.partitions.clear();
        self.in_execution.store(true, Ordering::Release);
        trace!(
            num_scopes = registry.current.scopes.len(),
            "advanced vertex memory to next superstep"
        );
    }

    /// Swaps message buffers in every state cell so this superstep's messages can be read in
    /// the next one. Partition aggregates only live for the superstep they were built in.
    pub fn complete_superstep(&self) {
        for cell in self.states.iter() {
            cell.value().lock().complete_iteration();
        }
        self.partitions.clear();
        self.in_execution.store(false, Ordering::Release);
    }

    /// Scopes declared for the running superstep
    pub fn current_scopes(&self) -> Arc<[MessageScope<M>]> {
        self.scopes.read().current.scopes.clone()
    }

    /// Scopes declared in the superstep before; incoming messages are laid out by these
    pub fn previous_scopes(&self) -> Arc<[MessageScope<M>]> {
        self.scopes.read().previous.scopes.clone()
    }

    fn current_slot(&self, scope: &ScopeId) -> Result<(usize, usize), StateError> {
        let registry = self.scopes.read();
        let slot = registry
            .current
            .slots
            .slot(scope)
            .ok_or_else(|| StateError::UndeclaredScope(scope.to_string()))?;
        Ok((slot, registry.current.slots.len()))
    }

    fn previous_slot(&self, scope: &ScopeId) -> Option<(usize, usize)> {
        let registry = self.scopes.read();
        let slot = registry.previous.slots.slot(scope)?;
        Some((slot, registry.previous.slots.len()))
    }

    /// Buffers `msg` for `vid` under the slot of `scope` in the running superstep.
    pub fn send_message(&self, vid: VID, msg: M, scope: &ScopeId) -> Result<(), StateError> {
        let (slot, num_slots) = self.current_slot(scope)?;
        let cell = self.get_or_create(vid);
        let mut state = cell.lock();
        state.add_message(msg, slot, num_slots, self.combiner())
    }

    /// The message `vid` holds for `scope` from the previous superstep. Scopes that were not
    /// active in the previous superstep carry no messages.
    pub fn receive_message(&self, vid: VID, scope: &ScopeId) -> Option<M> {
        let (slot, _) = self.previous_slot(scope)?;
        self.get_read_only(vid).message(slot)
    }

    pub fn property(&self, vid: VID, key: &str) -> Result<Option<Prop>, StateError> {
        let slot = self
            .keys
            .slot(key)
            .ok_or_else(|| StateError::UndeclaredComputeKey(key.to_string()))?;
        Ok(self.get_read_only(vid).property(slot))
    }

    pub fn set_property(
        &self,
        vid: VID,
        cardinality: Cardinality,
        key: &str,
        value: Prop,
    ) -> Result<(), StateError> {
        let slot = self
            .keys
            .slot(key)
            .ok_or_else(|| StateError::UndeclaredComputeKey(key.to_string()))?;
        let cell = self.get_or_create(vid);
        cell.lock()
            .set_property(slot, self.keys.len(), cardinality, value);
        Ok(())
    }

    fn partition_aggregate(&self, vid: VID) -> Cell<PartitionVertexAggregate<M>> {
        let vid = self.canonical(vid);
        if let Some(cell) = self.partitions.get(&vid) {
            return Arc::clone(cell.value());
        }
        let entry = self.partitions.entry(vid).or_default();
        Arc::clone(entry.value())
    }

    /// Records the persisted properties of the canonical row of a partitioned vertex
    pub fn set_loaded_properties(&self, vid: VID, properties: LoadedProperties) {
        self.partition_aggregate(vid)
            .lock()
            .set_loaded_properties(properties);
    }

    /// Merges a message one row of a partitioned vertex received into the vertex's aggregate
    pub fn aggregate_message(&self, vid: VID, msg: M, scope: &ScopeId) -> Result<(), StateError> {
        let (slot, num_slots) = self
            .previous_slot(scope)
            .ok_or_else(|| StateError::UndeclaredScope(scope.to_string()))?;
        let cell = self.partition_aggregate(vid);
        let mut aggregate = cell.lock();
        aggregate.add_message(msg, slot, num_slots, self.combiner())
    }

    /// The aggregated message of a partitioned vertex for `scope`
    pub fn aggregate_message_of(&self, vid: VID, scope: &ScopeId) -> Option<M> {
        let (slot, _) = self.previous_slot(scope)?;
        let vid = self.canonical(vid);
        let cell = self.partitions.get(&vid).map(|cell| Arc::clone(cell.value()))?;
        let aggregate = cell.lock();
        aggregate.message(slot).cloned()
    }

    pub fn has_partition_aggregates(&self) -> bool {
        !self.partitions.is_empty()
    }

    /// Canonical ids of all partitioned vertices seen in this superstep with the properties of
    /// their canonical row, `None` if that row was never scanned.
    pub fn partition_aggregates(&self) -> Vec<(VID, Option<LoadedProperties>)> {
        let mut aggregates: Vec<_> = self
            .partitions
            .iter()
            .map(|entry| (*entry.key(), entry.value().lock().loaded_properties().cloned()))
            .collect();
        aggregates.sort_by_key(|(vid, _)| *vid);
        aggregates
    }

    /// Non-transient compute-key values of every vertex that has at least one
    pub fn mutable_vertex_properties(&self) -> FxHashMap<VID, Vec<(ArcStr, Prop)>> {
        self.states
            .iter()
            .filter_map(|entry| {
                let props = entry.value().lock().persistent_properties(&self.keys);
                (!props.is_empty()).then(|| (*entry.key(), props))
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entities::{compute_keys::VertexComputeKey, scope::LocalScope};
    use pretty_assertions::assert_eq;
    use strata_api::core::Direction;

    /// Rows 10 and 11 are partitions of vertex 10.
    struct TestIds;

    impl IdManager for TestIds {
        fn is_partitioned(&self, vid: VID) -> bool {
            vid == VID(10) || vid == VID(11)
        }

        fn is_canonical(&self, vid: VID) -> bool {
            vid != VID(11)
        }

        fn canonical(&self, vid: VID) -> VID {
            if vid == VID(11) {
                VID(10)
            } else {
                vid
            }
        }
    }

    fn memory(combiner: Option<Arc<dyn MessageCombiner<i64>>>) -> VertexMemory<i64> {
        VertexMemory::new(
            Arc::new(TestIds),
            ComputeKeys::new([
                VertexComputeKey::persistent("degree"),
                VertexComputeKey::transient("seen"),
            ]),
            combiner,
        )
    }

    fn out_scope() -> MessageScope<i64> {
        MessageScope::local(Direction::OUT)
    }

    #[test]
    fn messages_are_read_through_previous_scopes() {
        let memory = memory(None);
        memory.advance_superstep(vec![out_scope()]);
        memory.send_message(VID(1), 4, &out_scope().id()).unwrap();
        assert_eq!(memory.receive_message(VID(1), &out_scope().id()), None);
        memory.complete_superstep();

        // the next superstep declares a different scope first; slot lookups must still use
        // the layout the message was written with
        let other: MessageScope<i64> =
            LocalScope::new(Direction::IN).with_labels(["knows"]).into();
        memory.advance_superstep(vec![other.clone(), out_scope()]);
        assert_eq!(memory.receive_message(VID(1), &out_scope().id()), Some(4));
        assert_eq!(memory.receive_message(VID(1), &other.id()), None);
        memory.complete_superstep();

        memory.advance_superstep(vec![]);
        assert_eq!(memory.receive_message(VID(1), &out_scope().id()), None);
    }

    #[test]
    fn undeclared_scope_is_rejected() {
        let memory = memory(None);
        memory.advance_superstep(vec![out_scope()]);
        assert!(matches!(
            memory.send_message(VID(1), 1, &ScopeId::Global),
            Err(StateError::UndeclaredScope(_))
        ));
    }

    #[test]
    fn rows_share_canonical_state() {
        let sum: Arc<dyn MessageCombiner<i64>> = Arc::new(|a: i64, b: i64| a + b);
        let memory = memory(Some(sum));
        memory.advance_superstep(vec![MessageScope::global([])]);
        memory.send_message(VID(11), 2, &ScopeId::Global).unwrap();
        memory.send_message(VID(10), 3, &ScopeId::Global).unwrap();
        memory
            .set_property(VID(11), Cardinality::Single, "degree", Prop::I64(1))
            .unwrap();
        memory.complete_superstep();
        assert!(!memory.get_read_only(VID(11)).is_empty());
        // cells are only created on first write
        assert!(memory.get_read_only(VID(2)).is_empty());
        memory.advance_superstep(vec![]);
        assert_eq!(memory.receive_message(VID(10), &ScopeId::Global), Some(5));
        assert_eq!(memory.property(VID(10), "degree"), Ok(Some(Prop::I64(1))));
    }

    #[test]
    fn undeclared_compute_key_is_rejected() {
        let memory = memory(None);
        assert_eq!(
            memory.set_property(VID(1), Cardinality::Single, "rank", Prop::I64(1)),
            Err(StateError::UndeclaredComputeKey("rank".to_string()))
        );
    }

    #[test]
    fn only_persistent_values_are_reported() {
        let memory = memory(None);
        memory
            .set_property(VID(1), Cardinality::Single, "degree", Prop::I64(2))
            .unwrap();
        memory
            .set_property(VID(1), Cardinality::Single, "seen", Prop::Bool(true))
            .unwrap();
        memory
            .set_property(VID(2), Cardinality::Single, "seen", Prop::Bool(true))
            .unwrap();
        let props = memory.mutable_vertex_properties();
        assert_eq!(props.len(), 1);
        assert_eq!(props[&VID(1)], vec![("degree".into(), Prop::I64(2))]);
    }

    #[test]
    fn partition_aggregates_are_keyed_by_canonical_id() {
        let sum: Arc<dyn MessageCombiner<i64>> = Arc::new(|a: i64, b: i64| a + b);
        let memory = memory(Some(sum));
        memory.advance_superstep(vec![out_scope()]);
        memory.complete_superstep();
        memory.advance_superstep(vec![out_scope()]);
        assert!(!memory.has_partition_aggregates());
        memory
            .aggregate_message(VID(11), 2, &out_scope().id())
            .unwrap();
        memory
            .aggregate_message(VID(10), 5, &out_scope().id())
            .unwrap();
        memory.set_loaded_properties(VID(10), LoadedProperties::default());
        assert_eq!(
            memory.aggregate_message_of(VID(11), &out_scope().id()),
            Some(7)
        );
        assert_eq!(
            memory.partition_aggregates(),
            vec![(VID(10), Some(LoadedProperties::default()))]
        );
        memory.complete_superstep();
        assert!(!memory.has_partition_aggregates());
        assert!(memory.partition_aggregates().is_empty());
    }
}
