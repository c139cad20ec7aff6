//! Simulation configuration and execution.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, log_enabled, trace, Level};
use serde_json::json;

use crate::component::Id;
use crate::context::SimulationContext;
use crate::event::Tick;
use crate::handler::EventHandler;
use crate::log::{describe, log_undelivered_event, prefix};
use crate::state::SimulationState;

/// Represents a simulation, provides methods for its configuration and execution.
///
/// The simulation owns a single logical clock measured in ticks. Components registered via
/// [`create_context`](Self::create_context) or [`add_handler`](Self::add_handler) receive sequential identifiers,
/// and events scheduled for the same tick are delivered in the order of their destination registration.
pub struct Simulation {
    sim_state: Rc<RefCell<SimulationState>>,
    name_to_id: HashMap<String, Id>,
    names: Rc<RefCell<Vec<String>>>,
    handlers: Vec<Option<Rc<RefCell<dyn EventHandler>>>>,
}

impl Simulation {
    /// Creates a new simulation with specified random seed.
    pub fn new(seed: u64) -> Self {
        Self {
            sim_state: Rc::new(RefCell::new(SimulationState::new(seed))),
            name_to_id: HashMap::new(),
            names: Rc::new(RefCell::new(Vec::new())),
            handlers: Vec::new(),
        }
    }

    fn register(&mut self, name: &str) -> Id {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = self.name_to_id.len() as Id;
        self.name_to_id.insert(name.to_owned(), id);
        self.names.borrow_mut().push(name.to_owned());
        self.handlers.push(None);
        id
    }

    /// Returns the name of component by its identifier.
    ///
    /// Panics if component with such Id does not exist.
    pub fn lookup_name(&self, id: Id) -> String {
        self.names.borrow()[id as usize].clone()
    }

    /// Creates a new simulation context with specified name.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use clustersim_core::Simulation;
    ///
    /// let mut sim = Simulation::new(123);
    /// let comp_ctx = sim.create_context("comp");
    /// assert_eq!(comp_ctx.id(), 0); // component ids are assigned sequentially starting from 0
    /// assert_eq!(comp_ctx.name(), "comp");
    /// ```
    pub fn create_context<S>(&mut self, name: S) -> SimulationContext
    where
        S: AsRef<str>,
    {
        let ctx = SimulationContext::new(
            self.register(name.as_ref()),
            name.as_ref(),
            self.sim_state.clone(),
            self.names.clone(),
        );
        debug!(
            target: "simulation",
            "{} Created context: {}",
            prefix(self.time(), Level::Debug, "simulation"),
            json!({"name": ctx.name(), "id": ctx.id()})
        );
        ctx
    }

    /// Registers the event handler implementation for component with specified name, returns the component Id.
    ///
    /// When the handler is registered for component with existing context,
    /// the component Id assigned in [`create_context`](Self::create_context) is reused.
    pub fn add_handler<S>(&mut self, name: S, handler: Rc<RefCell<dyn EventHandler>>) -> Id
    where
        S: AsRef<str>,
    {
        let id = self.register(name.as_ref());
        self.handlers[id as usize] = Some(handler);
        debug!(
            target: "simulation",
            "{} Added handler: {}",
            prefix(self.time(), Level::Debug, "simulation"),
            json!({"name": name.as_ref(), "id": id})
        );
        id
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> Tick {
        self.sim_state.borrow().time()
    }

    /// Returns the time of the next pending event, if any.
    pub fn peek_time(&self) -> Option<Tick> {
        self.sim_state.borrow_mut().peek_event().map(|e| e.time)
    }

    /// Performs a single step through the simulation.
    ///
    /// Takes the next event from the queue, advances the simulation time to event time and tries to process it
    /// by invoking the [`EventHandler::on`] method of the corresponding event handler.
    /// If there is no handler registered for component with Id `event.dst`, logs the undelivered event and discards it.
    ///
    /// Returns `true` if some pending event was found (no matter was it properly processed or not) and `false`
    /// otherwise. The latter means that there are no pending events, so no progress can be made.
    pub fn step(&mut self) -> bool {
        let next = self.sim_state.borrow_mut().next_event();
        if let Some(event) = next {
            if let Some(Some(handler)) = self.handlers.get(event.dst as usize) {
                if log_enabled!(Level::Trace) {
                    let dst_name = self.lookup_name(event.dst);
                    trace!(
                        target: &dst_name,
                        "{} {}",
                        prefix(event.time, Level::Trace, &dst_name),
                        describe(&event, &self.lookup_name(event.src))
                    );
                }
                handler.clone().borrow_mut().on(event);
            } else {
                log_undelivered_event(event);
            }
            true
        } else {
            false
        }
    }

    /// Steps through the simulation until there are no pending events left.
    pub fn step_until_no_events(&mut self) {
        while self.step() {}
    }

    /// Steps through the simulation processing every event scheduled at or before `time`,
    /// then moves the clock to `time`.
    ///
    /// Events scheduled later stay in the queue untouched.
    /// Returns `true` if there could be more pending events and `false` otherwise.
    pub fn step_until(&mut self, time: Tick) -> bool {
        loop {
            match self.peek_time() {
                Some(next) if next <= time => {
                    self.step();
                }
                Some(_) => {
                    self.sim_state.borrow_mut().advance_to(time);
                    return true;
                }
                None => {
                    self.sim_state.borrow_mut().advance_to(time);
                    return false;
                }
            }
        }
    }

    /// Returns a random float in the range _[0, 1)_
    /// using the simulation-wide random number generator.
    pub fn rand(&mut self) -> f64 {
        self.sim_state.borrow_mut().rand()
    }

    /// Returns the total number of created events.
    ///
    /// Note that cancelled events are also counted here.
    pub fn event_count(&self) -> u64 {
        self.sim_state.borrow().event_count()
    }

    /// Returns the number of events still waiting in the queue.
    pub fn pending_event_count(&self) -> usize {
        self.sim_state.borrow().pending_event_count()
    }
}
