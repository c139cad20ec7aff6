//! Worst Fit algorithm.

use clustersim_core::SimulationContext;

use crate::core::packing_algorithm::PackingAlgorithm;

/// Tries devices with the most remaining capacity first, spreading load across devices.
pub struct WorstFit;

impl WorstFit {
    pub fn new() -> Self {
        Self {}
    }
}

impl PackingAlgorithm for WorstFit {
    fn device_order(&self, remaining: &[f64], _ctx: &SimulationContext) -> Vec<usize> {
        let mut order: Vec<usize> = (0..remaining.len()).collect();
        order.sort_by(|&a, &b| remaining[b].total_cmp(&remaining[a]));
        order
    }
}
