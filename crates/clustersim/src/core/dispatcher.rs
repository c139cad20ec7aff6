//! Component routing generated jobs to schedulers.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use clustersim_core::cast;
use clustersim_core::context::SimulationContext;
use clustersim_core::event::Event;
use clustersim_core::handler::EventHandler;
use clustersim_core::{log_debug, log_error, Id};

use crate::core::error::ConfigurationError;
use crate::core::events::dispatching::WorkReady;
use crate::core::scheduler::Scheduler;
use crate::core::task::Job;
use crate::core::workload::Workload;

/// Rule for choosing the scheduler that receives a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPolicy {
    /// Uniform choice among all registered schedulers.
    Random,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        RoutingPolicy::Random
    }
}

impl fmt::Display for RoutingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RoutingPolicy::Random => write!(f, "random"),
        }
    }
}

impl FromStr for RoutingPolicy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" | "Random" => Ok(RoutingPolicy::Random),
            _ => Err(ConfigurationError::UnknownType {
                what: "routing policy",
                value: s.to_string(),
            }),
        }
    }
}

/// Dispatcher drains workload queues and submits every job to one scheduler.
pub struct Dispatcher {
    pub id: Id,
    routing_policy: RoutingPolicy,
    workloads: BTreeMap<Id, Rc<RefCell<Workload>>>,
    schedulers: Vec<Rc<RefCell<Scheduler>>>,
    dispatched: u64,
    ctx: SimulationContext,
}

impl Dispatcher {
    pub fn new(routing_policy: RoutingPolicy, ctx: SimulationContext) -> Self {
        Self {
            id: ctx.id(),
            routing_policy,
            workloads: BTreeMap::new(),
            schedulers: Vec::new(),
            dispatched: 0,
            ctx,
        }
    }

    pub fn add_workload(&mut self, workload: Rc<RefCell<Workload>>) {
        let id = workload.borrow().id;
        self.workloads.insert(id, workload);
    }

    pub fn add_scheduler(&mut self, scheduler: Rc<RefCell<Scheduler>>) {
        self.schedulers.push(scheduler);
    }

    pub fn routing_policy(&self) -> RoutingPolicy {
        self.routing_policy
    }

    pub fn dispatched_count(&self) -> u64 {
        self.dispatched
    }

    /// Submits the job to the scheduler chosen by the routing policy.
    pub fn dispatch(&mut self, job: Job) {
        let scheduler = match self.select_scheduler() {
            Some(scheduler) => scheduler,
            None => {
                log_error!(self.ctx, "no scheduler to route job {} to", job.id);
                return;
            }
        };
        log_debug!(
            self.ctx,
            "routing job {} to {}",
            job.id,
            self.ctx.lookup_name(scheduler.borrow().id)
        );
        scheduler.borrow_mut().submit(job);
        self.dispatched += 1;
    }

    fn select_scheduler(&self) -> Option<Rc<RefCell<Scheduler>>> {
        if self.schedulers.is_empty() {
            return None;
        }
        match self.routing_policy {
            RoutingPolicy::Random => {
                let index = self.ctx.gen_range(0..self.schedulers.len());
                Some(self.schedulers[index].clone())
            }
        }
    }

    fn on_work_ready(&mut self, workload_id: Id) {
        let jobs = match self.workloads.get(&workload_id) {
            Some(workload) => workload.borrow_mut().take_pending(),
            None => {
                log_error!(self.ctx, "work ready from unknown workload {}", workload_id);
                return;
            }
        };
        for job in jobs {
            self.dispatch(job);
        }
    }
}

impl EventHandler for Dispatcher {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            WorkReady { workload_id } => {
                self.on_work_ready(workload_id);
            }
        })
    }
}
