//! Best Fit algorithm.

use clustersim_core::SimulationContext;

use crate::core::packing_algorithm::PackingAlgorithm;

/// Tries devices with the least remaining capacity first, so partially used devices fill up before free ones.
pub struct BestFit;

impl BestFit {
    pub fn new() -> Self {
        Self {}
    }
}

impl PackingAlgorithm for BestFit {
    fn device_order(&self, remaining: &[f64], _ctx: &SimulationContext) -> Vec<usize> {
        let mut order: Vec<usize> = (0..remaining.len()).collect();
        order.sort_by(|&a, &b| remaining[a].total_cmp(&remaining[b]));
        order
    }
}
