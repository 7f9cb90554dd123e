use crate::{
    entities::combiner::{combine_into, MessageCombiner},
    StateError,
};
use strata_api::core::entities::properties::LoadedProperties;

/// Per-superstep aggregate of a partitioned vertex, keyed by its canonical id.
///
/// Collects the persisted properties of the canonical row and the combined messages every row
/// of the vertex received, so the program can run once against the whole vertex afterwards.
#[derive(Debug)]
pub struct PartitionVertexAggregate<M> {
    loaded: Option<LoadedProperties>,
    messages: Option<Box<[Option<M>]>>,
}

impl<M> Default for PartitionVertexAggregate<M> {
    fn default() -> Self {
        Self {
            loaded: None,
            messages: None,
        }
    }
}

impl<M> PartitionVertexAggregate<M> {
    pub fn set_loaded_properties(&mut self, properties: LoadedProperties) {
        self.loaded = Some(properties);
    }

    /// `None` until the canonical row was scanned in this superstep
    pub fn loaded_properties(&self) -> Option<&LoadedProperties> {
        self.loaded.as_ref()
    }

    pub fn add_message(
        &mut self,
        msg: M,
        slot: usize,
        num_slots: usize,
        combiner: Option<&dyn MessageCombiner<M>>,
    ) -> Result<(), StateError> {
        let slots = self.messages.get_or_insert_with(|| {
            std::iter::repeat_with(|| None)
                .take(num_slots)
                .collect::<Vec<_>>()
                .into_boxed_slice()
        });
        let existing = slots[slot].take();
        slots[slot] = Some(combine_into(combiner, existing, msg)?);
        Ok(())
    }

    pub fn message(&self, slot: usize) -> Option<&M> {
        self.messages
            .as_ref()
            .and_then(|slots| slots.get(slot))
            .and_then(Option::as_ref)
    }
}
