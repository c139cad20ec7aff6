//! Random placement.

use clustersim_core::SimulationContext;

use crate::core::packing_algorithm::PackingAlgorithm;

/// Tries devices in a uniformly random order drawn from the simulation generator.
pub struct RandomFit;

impl RandomFit {
    pub fn new() -> Self {
        Self {}
    }
}

impl PackingAlgorithm for RandomFit {
    fn device_order(&self, remaining: &[f64], ctx: &SimulationContext) -> Vec<usize> {
        let mut order: Vec<usize> = (0..remaining.len()).collect();
        ctx.shuffle(&mut order);
        order
    }
}
