use crate::{
    entities::{
        combiner::{combine_into, MessageCombiner},
        compute_keys::{Cardinality, ComputeKeys},
    },
    StateError,
};
use strata_api::core::{entities::properties::prop::Prop, storage::arc_str::ArcStr};

/// Compute-key values of one vertex.
///
/// Programs with a single compute key store the value unboxed; programs with more keys get a
/// slot array sized to the key count on first write.
#[derive(Debug, Clone, Default, PartialEq)]
enum PropertySlots {
    #[default]
    Empty,
    Single(Prop),
    Many(Box<[Option<Prop>]>),
}

impl PropertySlots {
    fn get(&self, slot: usize) -> Option<&Prop> {
        match self {
            PropertySlots::Empty => None,
            PropertySlots::Single(value) => (slot == 0).then_some(value),
            PropertySlots::Many(values) => values.get(slot).and_then(Option::as_ref),
        }
    }

    fn set(&mut self, slot: usize, num_keys: usize, value: Prop) {
        if num_keys <= 1 {
            *self = PropertySlots::Single(value);
            return;
        }
        match self {
            PropertySlots::Many(values) => values[slot] = Some(value),
            _ => {
                let mut values = vec![None; num_keys].into_boxed_slice();
                values[slot] = Some(value);
                *self = PropertySlots::Many(values);
            }
        }
    }

    fn take(&mut self, slot: usize) -> Option<Prop> {
        match self {
            PropertySlots::Empty => None,
            PropertySlots::Single(_) if slot == 0 => match std::mem::take(self) {
                PropertySlots::Single(value) => Some(value),
                _ => None,
            },
            PropertySlots::Single(_) => None,
            PropertySlots::Many(values) => values.get_mut(slot).and_then(Option::take),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            PropertySlots::Empty => true,
            PropertySlots::Single(_) => false,
            PropertySlots::Many(values) => values.iter().all(Option::is_none),
        }
    }
}

type MessageSlots<M> = Option<Box<[Option<M>]>>;

/// The per-vertex State Cell: compute-key values plus double buffered messages.
///
/// Messages written during superstep `n` go to the current buffer and only become readable in
/// superstep `n + 1` after [`VertexState::complete_iteration`] swaps them into the previous
/// buffer.
#[derive(Debug)]
pub struct VertexState<M> {
    properties: PropertySlots,
    current: MessageSlots<M>,
    previous: MessageSlots<M>,
}

impl<M> Default for VertexState<M> {
    fn default() -> Self {
        Self {
            properties: PropertySlots::Empty,
            current: None,
            previous: None,
        }
    }
}

impl<M> VertexState<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(&self, slot: usize) -> Option<&Prop> {
        self.properties.get(slot)
    }

    /// Writes a compute-key value. List cardinality appends to the existing value.
    pub fn set_property(
        &mut self,
        slot: usize,
        num_keys: usize,
        cardinality: Cardinality,
        value: Prop,
    ) {
        let value = match cardinality {
            Cardinality::Single => value,
            Cardinality::List => Prop::append(self.properties.take(slot), value),
        };
        self.properties.set(slot, num_keys, value);
    }

    pub fn has_properties(&self) -> bool {
        !self.properties.is_empty()
    }

    /// Non-transient compute-key values, in key order
    pub fn persistent_properties(&self, keys: &ComputeKeys) -> Vec<(ArcStr, Prop)> {
        keys.persistent()
            .filter_map(|(slot, key)| {
                self.properties
                    .get(slot)
                    .map(|value| (key.key().clone(), value.clone()))
            })
            .collect()
    }

    /// Buffers a message for the next superstep, merging with an already buffered message for
    /// the same slot.
    pub fn add_message(
        &mut self,
        msg: M,
        slot: usize,
        num_slots: usize,
        combiner: Option<&dyn MessageCombiner<M>>,
    ) -> Result<(), StateError> {
        let slots = self.current.get_or_insert_with(|| {
            std::iter::repeat_with(|| None)
                .take(num_slots)
                .collect::<Vec<_>>()
                .into_boxed_slice()
        });
        let existing = slots[slot].take();
        slots[slot] = Some(combine_into(combiner, existing, msg)?);
        Ok(())
    }

    /// A message received in the previous superstep
    pub fn message(&self, slot: usize) -> Option<&M> {
        self.previous
            .as_ref()
            .and_then(|slots| slots.get(slot))
            .and_then(Option::as_ref)
    }

    /// Promotes the messages of this superstep to the previous buffer and drops the ones that
    /// were read in it.
    pub fn complete_iteration(&mut self) {
        self.previous = self.current.take();
    }
}
