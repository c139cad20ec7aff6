//! Event handling.

use crate::event::Event;

/// Trait for consuming events in simulation components.
pub trait EventHandler {
    /// Processes event.
    ///
    /// A component suspends itself by emitting an event to itself with the required delay
    /// and resumes when this event is delivered here.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    /// use serde::Serialize;
    /// use clustersim_core::{cast, Event, EventHandler, Simulation, SimulationContext};
    ///
    /// #[derive(Clone, Serialize)]
    /// pub struct Wakeup {
    ///     round: u32,
    /// }
    ///
    /// pub struct Sleeper {
    ///     rounds: u32,
    ///     ctx: SimulationContext,
    /// }
    ///
    /// impl EventHandler for Sleeper {
    ///     fn on(&mut self, event: Event) {
    ///         cast!(match event.data {
    ///             Wakeup { round } => {
    ///                 self.rounds = round;
    ///                 self.ctx.emit_self(Wakeup { round: round + 1 }, 10);
    ///             }
    ///         })
    ///     }
    /// }
    ///
    /// let mut sim = Simulation::new(123);
    /// let ctx = sim.create_context("sleeper");
    /// ctx.emit_self_now(Wakeup { round: 1 });
    /// let sleeper = Rc::new(RefCell::new(Sleeper { rounds: 0, ctx }));
    /// sim.add_handler("sleeper", sleeper.clone());
    /// sim.step_until(25);
    /// assert_eq!(sleeper.borrow().rounds, 3);
    /// assert_eq!(sim.time(), 25);
    /// ```
    fn on(&mut self, event: Event);
}

/// Enables the use of pattern matching syntax for processing different types of events
/// by downcasting the event payload from [`EventData`](crate::event::EventData) to user-defined types.
///
/// Note that match arms need not be exhaustive. However, if the event payload does not match any of specified arms,
/// the macro will log the event as unhandled under `ERROR` level.
#[macro_export]
macro_rules! cast {
    ( match $event:ident.data { $( $type:ident { $($tt:tt)* } => { $($expr:tt)* } )+ } ) => {
        $(
            if $event.data.is::<$type>() {
                if let Ok(__value) = $event.data.downcast::<$type>() {
                    let $type { $($tt)* } = *__value;
                    $($expr)*
                }
            } else
        )*
        {
            $crate::log::log_unhandled_event($event);
        }
    }
}
