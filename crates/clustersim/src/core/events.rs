//! Simulation events.

// WORKLOAD EVENTS /////////////////////////////////////////////////////////////////////////////////

pub mod workload {
    use serde::Serialize;

    use crate::core::task::TaskId;

    /// Timer of an open-loop arrival or the end of a closed-loop think time.
    #[derive(Serialize, Clone)]
    pub struct NextArrival {}

    /// Sent by a scheduler to the workload that generated a finished task.
    #[derive(Serialize, Clone)]
    pub struct TaskCompleted {
        pub task_id: TaskId,
    }
}

// DISPATCHING EVENTS //////////////////////////////////////////////////////////////////////////////

pub mod dispatching {
    use serde::Serialize;

    use clustersim_core::Id;

    /// A workload has generated jobs waiting to be routed.
    #[derive(Serialize, Clone)]
    pub struct WorkReady {
        pub workload_id: Id,
    }
}

// SCHEDULING EVENTS ///////////////////////////////////////////////////////////////////////////////

pub mod scheduling {
    use serde::Serialize;

    use crate::core::task::TaskId;

    /// Periodic scan of the scheduler queue.
    #[derive(Serialize, Clone)]
    pub struct SchedulingTick {}

    /// A running task has reached the end of its runtime.
    #[derive(Serialize, Clone)]
    pub struct TaskFinished {
        pub task_id: TaskId,
    }
}
