//! Simulation facade wiring nodes, schedulers, the dispatcher and workloads together.

use std::cell::{Cell, Ref, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use serde::Serialize;
use serde_json::json;
use sugars::{rc, refcell};

use clustersim_core::context::SimulationContext;
use clustersim_core::simulation::Simulation;
use clustersim_core::{log_error, log_info, Id, Tick};

use crate::core::config::SimulationConfig;
use crate::core::dispatcher::{Dispatcher, RoutingPolicy};
use crate::core::error::{ConfigurationError, FaultSlot, SimulationError};
use crate::core::node::{NodeId, NodePool};
use crate::core::packing_algorithm::PackingScheme;
use crate::core::resources::Resource;
use crate::core::scheduler::Scheduler;
use crate::core::task::TaskId;
use crate::core::workload::{Workload, WorkloadConfig};

/// Counters describing the state of the simulation after a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub time: Tick,
    pub generated: u64,
    pub dispatched: u64,
    pub completed: u64,
    pub queued: usize,
    /// Queue length of every scheduler.
    pub backlog: BTreeMap<Id, usize>,
    pub running: usize,
    pub events: u64,
}

enum Startable {
    Scheduler(Id),
    Workload(Id),
}

pub struct ClusterSimulation {
    nodes: Rc<RefCell<NodePool>>,
    dispatcher: Rc<RefCell<Dispatcher>>,
    dispatcher_id: Id,
    schedulers: BTreeMap<Id, Rc<RefCell<Scheduler>>>,
    workloads: BTreeMap<Id, Rc<RefCell<Workload>>>,
    names: HashSet<String>,
    task_ids: Rc<Cell<TaskId>>,
    fault: FaultSlot,
    unstarted: Vec<Startable>,
    started: bool,
    sim: Simulation,
    ctx: SimulationContext,
}

impl ClusterSimulation {
    pub fn new(mut sim: Simulation, routing_policy: RoutingPolicy) -> Self {
        let dispatcher = rc!(refcell!(Dispatcher::new(routing_policy, sim.create_context("dispatcher"))));
        let dispatcher_id = sim.add_handler("dispatcher", dispatcher.clone());
        let ctx = sim.create_context("simulation");
        let mut names = HashSet::new();
        names.insert("dispatcher".to_string());
        names.insert("simulation".to_string());
        Self {
            nodes: rc!(refcell!(NodePool::new())),
            dispatcher,
            dispatcher_id,
            schedulers: BTreeMap::new(),
            workloads: BTreeMap::new(),
            names,
            task_ids: rc!(Cell::new(0)),
            fault: rc!(refcell!(None)),
            unstarted: Vec::new(),
            started: false,
            sim,
            ctx,
        }
    }

    /// Builds the whole cluster described by the config. Unnamed entries get `node-<i>`, `scheduler-<i>` and
    /// `workload-<i>` names, numbered across all entries of the same kind.
    pub fn from_config(config: &SimulationConfig) -> Result<Self, ConfigurationError> {
        let mut cluster = Self::new(Simulation::new(config.seed), config.routing_policy);

        for node in &config.nodes {
            for i in 0..node.names.count {
                let name = node
                    .names
                    .instance_name(i)
                    .unwrap_or_else(|| format!("node-{}", cluster.nodes.borrow().len()));
                cluster.add_node(&name, node.build_resources()?);
            }
        }

        let mut scheduler_index = 0;
        for scheduler in &config.schedulers {
            for i in 0..scheduler.names.count {
                let name = scheduler
                    .names
                    .instance_name(i)
                    .unwrap_or_else(|| format!("scheduler-{}", scheduler_index));
                match &scheduler.nodes {
                    Some(node_ids) => {
                        cluster.add_scheduler_on_nodes(&name, scheduler.packing_scheme, node_ids.clone())?
                    }
                    None => cluster.add_scheduler(&name, scheduler.packing_scheme)?,
                };
                scheduler_index += 1;
            }
        }

        let mut workload_index = 0;
        for workload in &config.workloads {
            for i in 0..workload.names.count {
                let name = workload
                    .names
                    .instance_name(i)
                    .unwrap_or_else(|| format!("workload-{}", workload_index));
                cluster.add_workload(&name, workload.workload.clone())?;
                workload_index += 1;
            }
        }

        Ok(cluster)
    }

    /// Adds node to the shared pool and returns its id.
    pub fn add_node(&mut self, name: &str, resources: Vec<Resource>) -> NodeId {
        let id = self.nodes.borrow_mut().add_node(name, resources);
        log_info!(self.ctx, "added node {} ({})", id, name);
        id
    }

    /// Adds scheduler placing tasks on all nodes added so far.
    pub fn add_scheduler(&mut self, name: &str, packing_scheme: PackingScheme) -> Result<Id, ConfigurationError> {
        let node_ids = self.nodes.borrow().ids();
        self.add_scheduler_on_nodes(name, packing_scheme, node_ids)
    }

    /// Adds scheduler placing tasks on the given nodes, tried in the given order.
    pub fn add_scheduler_on_nodes(
        &mut self,
        name: &str,
        packing_scheme: PackingScheme,
        node_ids: Vec<NodeId>,
    ) -> Result<Id, ConfigurationError> {
        if let Some(id) = node_ids.iter().find(|id| self.nodes.borrow().get(**id).is_none()) {
            return Err(ConfigurationError::invalid(
                "scheduler nodes",
                format!("node {} does not exist", id),
            ));
        }
        self.claim_name(name)?;
        let scheduler = rc!(refcell!(Scheduler::new(
            self.nodes.clone(),
            node_ids,
            packing_scheme,
            self.fault.clone(),
            self.sim.create_context(name),
        )));
        let id = self.sim.add_handler(name, scheduler.clone());
        self.dispatcher.borrow_mut().add_scheduler(scheduler.clone());
        self.schedulers.insert(id, scheduler);
        self.enqueue_start(Startable::Scheduler(id));
        log_info!(self.ctx, "added scheduler {} with {} packing", name, packing_scheme);
        Ok(id)
    }

    pub fn add_workload(&mut self, name: &str, config: WorkloadConfig) -> Result<Id, ConfigurationError> {
        config.validate()?;
        self.claim_name(name)?;
        let workload = rc!(refcell!(Workload::new(
            config,
            self.dispatcher_id,
            self.task_ids.clone(),
            self.sim.create_context(name),
        )?));
        let id = self.sim.add_handler(name, workload.clone());
        self.dispatcher.borrow_mut().add_workload(workload.clone());
        self.workloads.insert(id, workload);
        self.enqueue_start(Startable::Workload(id));
        log_info!(self.ctx, "added workload {}", name);
        Ok(id)
    }

    /// Processes every event scheduled at or before `horizon`, then moves the clock to `horizon`.
    ///
    /// Components are started on the first call. The run stops at the first fatal error.
    pub fn run(&mut self, horizon: Tick) -> Result<RunSummary, SimulationError> {
        if !self.workloads.is_empty() && self.schedulers.is_empty() {
            return Err(ConfigurationError::invalid("schedulers", "workloads are added but there is no scheduler").into());
        }
        if !self.started {
            self.started = true;
            log_info!(self.ctx, "starting simulation");
            self.start_pending();
        }

        while let Some(time) = self.sim.peek_time() {
            if time > horizon {
                break;
            }
            self.sim.step();
            let fault = self.fault.borrow_mut().take();
            if let Some(err) = fault {
                log_error!(self.ctx, "simulation aborted: {}", err);
                return Err(err);
            }
        }
        self.sim.step_until(horizon);

        let summary = self.summary();
        log_info!(self.ctx, "reached tick {}: {}", horizon, json!(summary));
        Ok(summary)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            time: self.sim.time(),
            generated: self.workloads.values().map(|w| w.borrow().generated_count()).sum(),
            dispatched: self.dispatcher.borrow().dispatched_count(),
            completed: self.schedulers.values().map(|s| s.borrow().completed_count()).sum(),
            queued: self.schedulers.values().map(|s| s.borrow().queue_len()).sum(),
            backlog: self
                .schedulers
                .iter()
                .map(|(id, s)| (*id, s.borrow().queue_len()))
                .collect(),
            running: self.schedulers.values().map(|s| s.borrow().running_count()).sum(),
            events: self.sim.event_count(),
        }
    }

    pub fn nodes(&self) -> Ref<'_, NodePool> {
        self.nodes.borrow()
    }

    /// Shared handle to the node pool.
    pub fn node_pool(&self) -> Rc<RefCell<NodePool>> {
        self.nodes.clone()
    }

    pub fn scheduler(&self, id: Id) -> Option<Rc<RefCell<Scheduler>>> {
        self.schedulers.get(&id).cloned()
    }

    pub fn scheduler_ids(&self) -> Vec<Id> {
        self.schedulers.keys().copied().collect()
    }

    pub fn workload(&self, id: Id) -> Option<Rc<RefCell<Workload>>> {
        self.workloads.get(&id).cloned()
    }

    pub fn workload_ids(&self) -> Vec<Id> {
        self.workloads.keys().copied().collect()
    }

    pub fn dispatcher(&self) -> Rc<RefCell<Dispatcher>> {
        self.dispatcher.clone()
    }

    pub fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    pub fn current_time(&self) -> Tick {
        self.sim.time()
    }

    pub fn event_count(&self) -> u64 {
        self.sim.event_count()
    }

    fn claim_name(&mut self, name: &str) -> Result<(), ConfigurationError> {
        if !self.names.insert(name.to_string()) {
            return Err(ConfigurationError::invalid("component name", format!("{} is already taken", name)));
        }
        Ok(())
    }

    fn enqueue_start(&mut self, component: Startable) {
        self.unstarted.push(component);
        if self.started {
            self.start_pending();
        }
    }

    fn start_pending(&mut self) {
        for component in std::mem::take(&mut self.unstarted) {
            match component {
                Startable::Scheduler(id) => {
                    if let Some(scheduler) = self.schedulers.get(&id) {
                        scheduler.borrow_mut().start();
                    }
                }
                Startable::Workload(id) => {
                    if let Some(workload) = self.workloads.get(&id) {
                        workload.borrow_mut().start();
                    }
                }
            }
        }
    }
}
