//! Task generators.

use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use clustersim_core::cast;
use clustersim_core::context::SimulationContext;
use clustersim_core::event::Event;
use clustersim_core::handler::EventHandler;
use clustersim_core::{log_debug, log_warn, Id, Tick};

use crate::core::error::ConfigurationError;
use crate::core::events::dispatching::WorkReady;
use crate::core::events::workload::{NextArrival, TaskCompleted};
use crate::core::resources::{validate_demand, ResourceMap};
use crate::core::task::{Job, Task, TaskId};

/// Generation discipline of a workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadType {
    /// Open loop: a new task arrives after every sampled interval, regardless of completions.
    Open,
    /// Closed loop: one task is outstanding at a time; the next one is generated after the previous completes.
    Closed,
}

impl fmt::Display for WorkloadType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WorkloadType::Open => write!(f, "unified_random"),
            WorkloadType::Closed => write!(f, "closed_random"),
        }
    }
}

impl FromStr for WorkloadType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unified_random" | "open" => Ok(WorkloadType::Open),
            "closed_random" | "closed" => Ok(WorkloadType::Closed),
            _ => Err(ConfigurationError::UnknownType {
                what: "workload",
                value: s.to_string(),
            }),
        }
    }
}

/// Parameters of a workload generator. Ranges are inclusive.
///
/// For closed-loop workloads the arrival interval range is the think time between a completion and the next
/// generation, so `(0, 0)` resubmits immediately.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorkloadConfig {
    pub workload_type: WorkloadType,
    pub arrival_interval_range: (Tick, Tick),
    pub runtime_range: (Tick, Tick),
    pub resource_demand: ResourceMap,
}

impl WorkloadConfig {
    pub fn open(arrival_interval_range: (Tick, Tick), runtime_range: (Tick, Tick), resource_demand: ResourceMap) -> Self {
        Self {
            workload_type: WorkloadType::Open,
            arrival_interval_range,
            runtime_range,
            resource_demand,
        }
    }

    pub fn closed(runtime_range: (Tick, Tick), resource_demand: ResourceMap) -> Self {
        Self {
            workload_type: WorkloadType::Closed,
            arrival_interval_range: (0, 0),
            runtime_range,
            resource_demand,
        }
    }

    pub fn with_think_time(mut self, think_time_range: (Tick, Tick)) -> Self {
        self.arrival_interval_range = think_time_range;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let (min_interval, max_interval) = self.arrival_interval_range;
        let (min_runtime, max_runtime) = self.runtime_range;
        if min_interval > max_interval {
            return Err(ConfigurationError::invalid(
                "arrival_interval_range",
                format!("min {} exceeds max {}", min_interval, max_interval),
            ));
        }
        if self.workload_type == WorkloadType::Open && min_interval < 1 {
            return Err(ConfigurationError::invalid(
                "arrival_interval_range",
                "open-loop arrivals need an interval of at least 1 tick",
            ));
        }
        if min_runtime > max_runtime {
            return Err(ConfigurationError::invalid(
                "runtime_range",
                format!("min {} exceeds max {}", min_runtime, max_runtime),
            ));
        }
        for (kind, amount) in &self.resource_demand {
            validate_demand(*kind, amount)?;
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Generates single-task jobs and hands them to the dispatcher.
///
/// Generated jobs wait in the workload queue until the dispatcher drains it.
pub struct Workload {
    pub id: Id,
    config: WorkloadConfig,
    queue: VecDeque<Job>,
    dispatcher_id: Id,
    task_ids: Rc<Cell<TaskId>>,
    outstanding: Option<TaskId>,
    generated: u64,
    completed: u64,
    ctx: SimulationContext,
}

impl Workload {
    /// Creates workload drawing task ids from the shared counter.
    pub fn new(
        config: WorkloadConfig,
        dispatcher_id: Id,
        task_ids: Rc<Cell<TaskId>>,
        ctx: SimulationContext,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            id: ctx.id(),
            config,
            queue: VecDeque::new(),
            dispatcher_id,
            task_ids,
            outstanding: None,
            generated: 0,
            completed: 0,
            ctx,
        })
    }

    /// Begins generation: open-loop workloads arm the first arrival, closed-loop ones submit right away.
    pub fn start(&mut self) {
        match self.config.workload_type {
            WorkloadType::Open => self.schedule_arrival(),
            WorkloadType::Closed => self.produce(),
        }
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    pub fn generated_count(&self) -> u64 {
        self.generated
    }

    pub fn completed_count(&self) -> u64 {
        self.completed
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Removes and returns all generated jobs not yet taken by the dispatcher.
    pub fn take_pending(&mut self) -> Vec<Job> {
        self.queue.drain(..).collect()
    }

    /// Builds a single-task job with a runtime sampled from the configured range.
    pub fn generate(&mut self) -> Job {
        let task_id = self.task_ids.get();
        self.task_ids.set(task_id + 1);
        let (min_runtime, max_runtime) = self.config.runtime_range;
        let runtime = self.ctx.gen_range(min_runtime..=max_runtime);
        let task = Task::new(
            task_id,
            task_id,
            self.id,
            self.config.resource_demand.clone(),
            runtime,
            self.ctx.time(),
        );
        self.generated += 1;
        Job::single(task)
    }

    fn produce(&mut self) {
        let job = self.generate();
        log_debug!(self.ctx, "generated job {} with runtime {}", job.id, job.tasks[0].runtime);
        if self.config.workload_type == WorkloadType::Closed {
            self.outstanding = Some(job.id);
        }
        self.queue.push_back(job);
        self.ctx.emit_now(WorkReady { workload_id: self.id }, self.dispatcher_id);
    }

    fn sample_interval(&self) -> Tick {
        let (min_interval, max_interval) = self.config.arrival_interval_range;
        self.ctx.gen_range(min_interval..=max_interval)
    }

    fn schedule_arrival(&mut self) {
        let interval = self.sample_interval();
        self.ctx.emit_self(NextArrival {}, interval);
    }

    fn on_next_arrival(&mut self) {
        self.produce();
        if self.config.workload_type == WorkloadType::Open {
            self.schedule_arrival();
        }
    }

    fn on_task_completed(&mut self, task_id: TaskId) {
        self.completed += 1;
        if self.config.workload_type != WorkloadType::Closed {
            return;
        }
        if self.outstanding != Some(task_id) {
            log_warn!(self.ctx, "completion of unexpected task {}", task_id);
            return;
        }
        self.outstanding = None;
        match self.sample_interval() {
            0 => self.produce(),
            think_time => {
                self.ctx.emit_self(NextArrival {}, think_time);
            }
        }
    }
}

impl EventHandler for Workload {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            NextArrival {} => {
                self.on_next_arrival();
            }
            TaskCompleted { task_id } => {
                self.on_task_completed(task_id);
            }
        })
    }
}
