//! Component placing queued tasks onto cluster nodes.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use serde_json::json;

use clustersim_core::cast;
use clustersim_core::context::SimulationContext;
use clustersim_core::event::Event;
use clustersim_core::handler::EventHandler;
use clustersim_core::{log_debug, log_error, Id};

use crate::core::error::{FaultSlot, SimulationError};
use crate::core::events::scheduling::{SchedulingTick, TaskFinished};
use crate::core::events::workload::TaskCompleted;
use crate::core::node::{NodeId, NodePool};
use crate::core::packing_algorithm::{PackingAlgorithm, PackingScheme};
use crate::core::records::Records;
use crate::core::resources::ResourceKind;
use crate::core::task::{Job, Placement, Task, TaskId, TaskStatus};

/// Scheduler keeps a FIFO queue of submitted tasks and places them once per tick.
///
/// On every tick the whole queue is scanned in arrival order. A task becomes visible to the scan one tick after it
/// was queued. Each visible task goes to the first node (in node order) that satisfies its demand, with GPU devices
/// visited in the order chosen by the packing algorithm. Tasks that fit nowhere stay queued for the next tick and
/// do not block later tasks.
///
/// Placed tasks run for their runtime; on completion the scheduler records `task_runtime`, `task_waittime` and
/// `task_total`, releases the allocation and notifies the originating workload.
///
/// Several schedulers may share the same nodes. A resource error stops the scheduler and is reported through the
/// fault slot.
pub struct Scheduler {
    pub id: Id,
    queue: VecDeque<Task>,
    running: BTreeMap<TaskId, Task>,
    nodes: Rc<RefCell<NodePool>>,
    node_ids: Vec<NodeId>,
    packing_scheme: PackingScheme,
    packing_algorithm: Box<dyn PackingAlgorithm>,
    records: Records,
    fault: FaultSlot,
    halted: bool,
    submitted: u64,
    completed: u64,
    ctx: SimulationContext,
}

impl Scheduler {
    /// Creates scheduler working on the given subset of nodes.
    pub fn new(
        nodes: Rc<RefCell<NodePool>>,
        node_ids: Vec<NodeId>,
        packing_scheme: PackingScheme,
        fault: FaultSlot,
        ctx: SimulationContext,
    ) -> Self {
        Self {
            id: ctx.id(),
            queue: VecDeque::new(),
            running: BTreeMap::new(),
            nodes,
            node_ids,
            packing_scheme,
            packing_algorithm: packing_scheme.build(),
            records: Records::new(),
            fault,
            halted: false,
            submitted: 0,
            completed: 0,
            ctx,
        }
    }

    /// Starts the periodic scheduling ticks at the current time.
    pub fn start(&mut self) {
        self.ctx.emit_self_now(SchedulingTick {});
    }

    /// Appends all tasks of the job to the tail of the queue.
    pub fn submit(&mut self, job: Job) {
        for mut task in job.into_tasks() {
            log_debug!(self.ctx, "queued task {} of job {}", task.id, task.job_id);
            task.status = TaskStatus::Queued;
            self.submitted += 1;
            self.queue.push_back(task);
        }
    }

    pub fn packing_scheme(&self) -> PackingScheme {
        self.packing_scheme
    }

    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    pub fn queued_tasks(&self) -> impl Iterator<Item = &Task> {
        self.queue.iter()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn running_tasks(&self) -> impl Iterator<Item = &Task> {
        self.running.values()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn submitted_count(&self) -> u64 {
        self.submitted
    }

    pub fn completed_count(&self) -> u64 {
        self.completed
    }

    /// Per-task timing samples keyed by `task_runtime`, `task_waittime` and `task_total`.
    pub fn records(&self) -> &Records {
        &self.records
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    fn on_scheduling_tick(&mut self) {
        if let Err(err) = self.schedule_queued() {
            self.fail(err);
            return;
        }
        self.ctx.emit_self(SchedulingTick {}, 1);
    }

    fn schedule_queued(&mut self) -> Result<(), SimulationError> {
        let now = self.ctx.time();
        let mut matched: Vec<(usize, Placement)> = Vec::new();

        {
            let mut pool = self.nodes.borrow_mut();
            for (index, task) in self.queue.iter_mut().enumerate() {
                if task.queued_time >= now {
                    continue;
                }
                let node_id = self
                    .node_ids
                    .iter()
                    .copied()
                    .find(|id| pool.get(*id).map_or(false, |node| node.satisfy(&task.resources)));
                let (node_id, node) = match node_id.and_then(|id| pool.get_mut(id).map(|node| (id, node))) {
                    Some(found) => found,
                    None => continue,
                };
                let device_order = match node.resource(ResourceKind::Gpu).and_then(|r| r.device_remaining()) {
                    Some(remaining) => self.packing_algorithm.device_order(remaining, &self.ctx),
                    None => Vec::new(),
                };
                let allocation = node
                    .alloc(&task.resources, &device_order, now)
                    .map_err(|source| SimulationError::Resource {
                        tick: now,
                        node_id,
                        task_id: task.id,
                        source,
                    })?;
                task.status = TaskStatus::Matched;
                matched.push((index, Placement { node_id, allocation }));
            }
        }

        if matched.is_empty() {
            return Ok(());
        }

        let mut placements = matched.into_iter().peekable();
        let mut waiting = VecDeque::with_capacity(self.queue.len());
        for (index, mut task) in self.queue.drain(..).enumerate() {
            match placements.next_if(|(matched_index, _)| *matched_index == index) {
                Some((_, placement)) => {
                    log_debug!(
                        self.ctx,
                        "placed task {} on node {}: {}",
                        task.id,
                        placement.node_id,
                        json!(placement.allocation)
                    );
                    task.run(now, placement);
                    self.ctx.emit_self(TaskFinished { task_id: task.id }, task.runtime);
                    self.running.insert(task.id, task);
                }
                None => waiting.push_back(task),
            }
        }
        self.queue = waiting;
        Ok(())
    }

    fn on_task_finished(&mut self, task_id: TaskId) -> Result<(), SimulationError> {
        let now = self.ctx.time();
        let mut task = self
            .running
            .remove(&task_id)
            .ok_or(SimulationError::UnknownTask { tick: now, task_id })?;
        let stats = task.finish(now);
        self.records.append("task_runtime", now, stats.runtime as f64);
        self.records.append("task_waittime", now, stats.wait_time as f64);
        self.records.append("task_total", now, stats.total_time as f64);

        if let Some(placement) = task.placement.as_ref() {
            let mut pool = self.nodes.borrow_mut();
            let node = pool.get_mut(placement.node_id).ok_or(SimulationError::UnknownNode {
                tick: now,
                node_id: placement.node_id,
                task_id,
            })?;
            node.dealloc(&placement.allocation, now)
                .map_err(|source| SimulationError::Resource {
                    tick: now,
                    node_id: placement.node_id,
                    task_id,
                    source,
                })?;
        }

        log_debug!(
            self.ctx,
            "task {} finished: {}",
            task_id,
            json!({"runtime": stats.runtime, "wait": stats.wait_time, "total": stats.total_time})
        );
        self.ctx.emit_now(TaskCompleted { task_id }, task.origin);
        self.completed += 1;
        Ok(())
    }

    fn fail(&mut self, err: SimulationError) {
        log_error!(self.ctx, "scheduler stopped: {}", err);
        self.halted = true;
        let mut fault = self.fault.borrow_mut();
        if fault.is_none() {
            *fault = Some(err);
        }
    }
}

impl EventHandler for Scheduler {
    fn on(&mut self, event: Event) {
        if self.halted {
            return;
        }
        cast!(match event.data {
            SchedulingTick {} => {
                self.on_scheduling_tick();
            }
            TaskFinished { task_id } => {
                if let Err(err) = self.on_task_finished(task_id) {
                    self.fail(err);
                }
            }
        })
    }
}
