use std::collections::{BinaryHeap, HashSet};

use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::prelude::*;
use rand_pcg::Pcg64;

use crate::component::Id;
use crate::event::{Event, EventData, EventId, Tick};

pub struct SimulationState {
    clock: Tick,
    rand: Pcg64,
    events: BinaryHeap<Event>,
    canceled_events: HashSet<EventId>,
    event_count: u64,
}

impl SimulationState {
    pub fn new(seed: u64) -> Self {
        Self {
            clock: 0,
            rand: Pcg64::seed_from_u64(seed),
            events: BinaryHeap::new(),
            canceled_events: HashSet::new(),
            event_count: 0,
        }
    }

    pub fn time(&self) -> Tick {
        self.clock
    }

    pub fn advance_to(&mut self, time: Tick) {
        self.clock = self.clock.max(time);
    }

    pub fn rand(&mut self) -> f64 {
        self.rand.gen_range(0.0..1.0)
    }

    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.rand.gen_range(range)
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rand);
    }

    pub fn add_event<T>(&mut self, data: T, src: Id, dst: Id, delay: Tick) -> EventId
    where
        T: EventData,
    {
        let event_id = self.event_count;
        self.events.push(Event {
            id: event_id,
            time: self.clock + delay,
            src,
            dst,
            data: Box::new(data),
        });
        self.event_count += 1;
        event_id
    }

    pub fn next_event(&mut self) -> Option<Event> {
        while let Some(event) = self.events.pop() {
            if !self.canceled_events.remove(&event.id) {
                self.clock = event.time;
                return Some(event);
            }
        }
        None
    }

    pub fn peek_event(&mut self) -> Option<&Event> {
        loop {
            let event_id = self.events.peek()?.id;
            if self.canceled_events.remove(&event_id) {
                self.events.pop();
            } else {
                return self.events.peek();
            }
        }
    }

    pub fn cancel_event(&mut self, id: EventId) {
        self.canceled_events.insert(id);
    }

    pub fn pending_event_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| !self.canceled_events.contains(&e.id))
            .count()
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }
}
