//! GPU packing algorithms.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use clustersim_core::SimulationContext;

use crate::core::error::ConfigurationError;
use crate::core::packing_algorithms::best_fit::BestFit;
use crate::core::packing_algorithms::random::RandomFit;
use crate::core::packing_algorithms::worst_fit::WorstFit;

/// Trait for implementation of GPU packing algorithms.
///
/// Given the remaining amount of each device on the chosen node, the algorithm returns device indices in the order
/// they should be tried. The allocation then seats each demanded amount on the first unclaimed device of this order
/// that can hold it.
///
/// The context is passed so that randomized algorithms draw from the simulation-wide generator.
pub trait PackingAlgorithm {
    fn device_order(&self, remaining: &[f64], ctx: &SimulationContext) -> Vec<usize>;
}

/// Names of the supported packing algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackingScheme {
    WorstFit,
    BestFit,
    Random,
}

impl PackingScheme {
    pub fn build(&self) -> Box<dyn PackingAlgorithm> {
        match self {
            PackingScheme::WorstFit => Box::new(WorstFit::new()),
            PackingScheme::BestFit => Box::new(BestFit::new()),
            PackingScheme::Random => Box::new(RandomFit::new()),
        }
    }
}

impl Default for PackingScheme {
    fn default() -> Self {
        PackingScheme::WorstFit
    }
}

impl fmt::Display for PackingScheme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            PackingScheme::WorstFit => "worst_fit",
            PackingScheme::BestFit => "best_fit",
            PackingScheme::Random => "random",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for PackingScheme {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "worst_fit" | "WorstFit" => Ok(PackingScheme::WorstFit),
            "best_fit" | "BestFit" => Ok(PackingScheme::BestFit),
            "random" | "Random" => Ok(PackingScheme::Random),
            _ => Err(ConfigurationError::UnknownType {
                what: "packing scheme",
                value: s.to_string(),
            }),
        }
    }
}
