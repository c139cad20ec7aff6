//! Units of work: tasks and jobs.

use serde::Serialize;

use clustersim_core::{Id, Tick};

use crate::core::node::NodeId;
use crate::core::resources::ResourceMap;

pub type TaskId = u64;
pub type JobId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    Queued,
    Matched,
    Running,
    Finished,
}

/// Where a task was placed and what it was granted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Placement {
    pub node_id: NodeId,
    pub allocation: ResourceMap,
}

/// Timing of a finished task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub runtime: Tick,
    pub wait_time: Tick,
    pub total_time: Tick,
}

/// Observable lifecycle shared by tasks and jobs.
pub trait Work {
    fn job_id(&self) -> JobId;
    fn status(&self) -> TaskStatus;
    fn queued_time(&self) -> Tick;
    fn scheduled_time(&self) -> Option<Tick>;
    fn finished_time(&self) -> Option<Tick>;
}

/// Indivisible unit of work with a fixed resource demand and runtime.
#[derive(Clone, Debug, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: JobId,
    /// Workload component that generated the task and is notified on completion.
    pub origin: Id,
    pub resources: ResourceMap,
    pub runtime: Tick,
    pub queued_time: Tick,
    pub scheduled_time: Option<Tick>,
    pub finished_time: Option<Tick>,
    pub status: TaskStatus,
    pub placement: Option<Placement>,
}

impl Task {
    pub fn new(id: TaskId, job_id: JobId, origin: Id, resources: ResourceMap, runtime: Tick, queued_time: Tick) -> Self {
        Self {
            id,
            job_id,
            origin,
            resources,
            runtime,
            queued_time,
            scheduled_time: None,
            finished_time: None,
            status: TaskStatus::Queued,
            placement: None,
        }
    }

    /// Starts the task on the given placement and returns its completion tick.
    pub fn run(&mut self, now: Tick, placement: Placement) -> Tick {
        self.scheduled_time = Some(now);
        self.placement = Some(placement);
        self.status = TaskStatus::Running;
        now + self.runtime
    }

    /// Stamps the finish time and returns the task timing.
    pub fn finish(&mut self, now: Tick) -> TaskStats {
        debug_assert!(now >= self.queued_time + self.runtime);
        self.finished_time = Some(now);
        self.status = TaskStatus::Finished;
        let scheduled = self.scheduled_time.unwrap_or(self.queued_time);
        TaskStats {
            runtime: self.runtime,
            wait_time: scheduled - self.queued_time,
            total_time: now - self.queued_time,
        }
    }
}

impl Work for Task {
    fn job_id(&self) -> JobId {
        self.job_id
    }

    fn status(&self) -> TaskStatus {
        self.status
    }

    fn queued_time(&self) -> Tick {
        self.queued_time
    }

    fn scheduled_time(&self) -> Option<Tick> {
        self.scheduled_time
    }

    fn finished_time(&self) -> Option<Tick> {
        self.finished_time
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Group of tasks submitted together.
#[derive(Clone, Debug, Serialize)]
pub struct Job {
    pub id: JobId,
    pub tasks: Vec<Task>,
}

impl Job {
    pub fn new(id: JobId, tasks: Vec<Task>) -> Self {
        Self { id, tasks }
    }

    pub fn single(task: Task) -> Self {
        Self {
            id: task.job_id,
            tasks: vec![task],
        }
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }

    /// Starts every task on its placement, in order, and returns the tick the last one completes.
    pub fn run(&mut self, now: Tick, placements: Vec<Placement>) -> Tick {
        debug_assert_eq!(placements.len(), self.tasks.len());
        self.tasks
            .iter_mut()
            .zip(placements)
            .map(|(task, placement)| task.run(now, placement))
            .max()
            .unwrap_or(now)
    }
}

impl Work for Job {
    fn job_id(&self) -> JobId {
        self.id
    }

    fn status(&self) -> TaskStatus {
        let statuses: Vec<TaskStatus> = self.tasks.iter().map(|t| t.status).collect();
        if statuses.iter().all(|s| *s == TaskStatus::Finished) {
            TaskStatus::Finished
        } else if statuses.iter().any(|s| *s == TaskStatus::Running || *s == TaskStatus::Finished) {
            TaskStatus::Running
        } else if statuses.iter().any(|s| *s == TaskStatus::Matched) {
            TaskStatus::Matched
        } else {
            TaskStatus::Queued
        }
    }

    fn queued_time(&self) -> Tick {
        self.tasks.iter().map(|t| t.queued_time).min().unwrap_or(0)
    }

    fn scheduled_time(&self) -> Option<Tick> {
        self.tasks.iter().filter_map(|t| t.scheduled_time).min()
    }

    fn finished_time(&self) -> Option<Tick> {
        if self.status() != TaskStatus::Finished {
            return None;
        }
        self.tasks.iter().filter_map(|t| t.finished_time).max()
    }
}
