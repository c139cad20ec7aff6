//! Error taxonomy of the scheduling model.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use clustersim_core::Tick;

use crate::core::node::NodeId;
use crate::core::resources::{Amount, ResourceKind};
use crate::core::task::TaskId;

/// Failure of a single resource operation.
///
/// Every variant signals either a caller bug or an accounting bug, so none of them is meant to be retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    #[error("{kind} exhausted: requested {requested}, remaining {remaining}")]
    Exhausted {
        kind: ResourceKind,
        requested: Amount,
        remaining: Amount,
    },
    #[error("{kind} overflow: releasing {released} on top of {remaining} exceeds capacity {capacity}")]
    Overflow {
        kind: ResourceKind,
        released: Amount,
        remaining: Amount,
        capacity: Amount,
    },
    #[error("{kind} demand {demand} passed the feasibility test but could not be seated on {remaining}")]
    SchedulingInconsistency {
        kind: ResourceKind,
        demand: Amount,
        remaining: Amount,
    },
    #[error("{kind} amounts must be finite and non-negative, got {amount}")]
    InvalidAmount { kind: ResourceKind, amount: Amount },
    #[error("node has no {0} resource")]
    UnknownResource(ResourceKind),
    #[error("{kind} expects {expected} amount, got {got}")]
    ShapeMismatch {
        kind: ResourceKind,
        expected: &'static str,
        got: Amount,
    },
}

/// Invalid simulation setup, reported before the run begins.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("unknown {what} type: {value}")]
    UnknownType { what: &'static str, value: String },
    #[error("invalid {what}: {reason}")]
    Invalid { what: String, reason: String },
    #[error("can't read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("can't parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

impl ConfigurationError {
    pub(crate) fn invalid(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            what: what.into(),
            reason: reason.into(),
        }
    }
}

/// Fatal error that aborts a simulation run.
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("tick {tick}: node {node_id}: task {task_id}: {source}")]
    Resource {
        tick: Tick,
        node_id: NodeId,
        task_id: TaskId,
        #[source]
        source: ResourceError,
    },
    #[error("tick {tick}: task {task_id} refers to unknown node {node_id}")]
    UnknownNode { tick: Tick, node_id: NodeId, task_id: TaskId },
    #[error("tick {tick}: task {task_id} finished but is not running")]
    UnknownTask { tick: Tick, task_id: TaskId },
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Slot where components deposit the first fatal error; the run loop checks it after every step.
pub type FaultSlot = Rc<RefCell<Option<SimulationError>>>;
