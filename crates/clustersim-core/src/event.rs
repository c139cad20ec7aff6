//! Simulation events.

use std::cmp::Ordering;

use downcast_rs::{impl_downcast, Downcast};
use serde::ser::Serialize;

use crate::component::Id;

/// Identifier of simulation event.
pub type EventId = u64;

/// Logical simulation time.
pub type Tick = u64;

/// Trait that should be implemented by event payload.
pub trait EventData: Downcast + erased_serde::Serialize {}

impl_downcast!(EventData);

erased_serde::serialize_trait_object!(EventData);

impl<T: Serialize + 'static> EventData for T {}

/// Representation of event.
pub struct Event {
    /// Unique event identifier, also the emission sequence number.
    pub id: EventId,
    /// Time of event occurrence.
    pub time: Tick,
    /// Identifier of event source.
    pub src: Id,
    /// Identifier of event destination.
    pub dst: Id,
    /// Event payload.
    pub data: Box<dyn EventData>,
}

impl Eq for Event {}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

// Inverted for use in max-heap: earlier time first, then the component registered first,
// then the event emitted first.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.dst.cmp(&self.dst))
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
