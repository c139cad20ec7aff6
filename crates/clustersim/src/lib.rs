#![doc = include_str!("../readme.md")]

pub mod core;
pub mod simulation;

pub use crate::core::config::SimulationConfig;
pub use crate::core::error::{ConfigurationError, ResourceError, SimulationError};
pub use crate::simulation::{ClusterSimulation, RunSummary};
