//! Cluster model: resources, nodes, tasks and the components operating on them.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod node;
pub mod packing_algorithm;
pub mod packing_algorithms;
pub mod records;
pub mod resources;
pub mod scheduler;
pub mod task;
pub mod workload;
