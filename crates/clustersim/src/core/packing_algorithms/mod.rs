pub mod best_fit;
pub mod random;
pub mod worst_fit;
