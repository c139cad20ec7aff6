//! Accessing simulation from components.

use std::cell::RefCell;
use std::rc::Rc;

use rand::distributions::uniform::{SampleRange, SampleUniform};

use crate::component::Id;
use crate::event::{EventData, EventId, Tick};
use crate::state::SimulationState;

/// A facade for accessing the simulation state and producing events from simulation components.
pub struct SimulationContext {
    id: Id,
    name: String,
    sim_state: Rc<RefCell<SimulationState>>,
    names: Rc<RefCell<Vec<String>>>,
}

impl SimulationContext {
    pub(crate) fn new(
        id: Id,
        name: &str,
        sim_state: Rc<RefCell<SimulationState>>,
        names: Rc<RefCell<Vec<String>>>,
    ) -> Self {
        Self {
            id,
            name: name.to_owned(),
            sim_state,
            names,
        }
    }

    /// Returns the identifier of component associated with this context.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Returns the name of component associated with this context.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> Tick {
        self.sim_state.borrow().time()
    }

    /// Returns a random value in the specified range
    /// using the simulation-wide random number generator.
    pub fn gen_range<T, R>(&self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.sim_state.borrow_mut().gen_range(range)
    }

    /// Shuffles the slice in place using the simulation-wide random number generator.
    pub fn shuffle<T>(&self, items: &mut [T]) {
        self.sim_state.borrow_mut().shuffle(items)
    }

    /// Creates new event with specified payload, destination and delay.
    pub fn emit<T>(&self, data: T, dst: Id, delay: Tick) -> EventId
    where
        T: EventData,
    {
        self.sim_state.borrow_mut().add_event(data, self.id, dst, delay)
    }

    /// Creates new immediate (zero-delay) event with specified payload and destination.
    pub fn emit_now<T>(&self, data: T, dst: Id) -> EventId
    where
        T: EventData,
    {
        self.sim_state.borrow_mut().add_event(data, self.id, dst, 0)
    }

    /// Creates new event for itself with specified payload and delay.
    pub fn emit_self<T>(&self, data: T, delay: Tick) -> EventId
    where
        T: EventData,
    {
        self.sim_state.borrow_mut().add_event(data, self.id, self.id, delay)
    }

    /// Creates new immediate event for itself with specified payload.
    pub fn emit_self_now<T>(&self, data: T) -> EventId
    where
        T: EventData,
    {
        self.sim_state.borrow_mut().add_event(data, self.id, self.id, 0)
    }

    /// Cancels the specified event.
    pub fn cancel_event(&self, id: EventId) {
        self.sim_state.borrow_mut().cancel_event(id);
    }

    /// Lookup component name by its identifier.
    pub fn lookup_name(&self, id: Id) -> String {
        self.names.borrow()[id as usize].clone()
    }
}
