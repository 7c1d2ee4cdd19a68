//! Optimizers and learning-rate schedules for the embedding phases.

mod adam;
mod optimizer;
mod scheduler;

pub use adam::Adam;
pub use optimizer::Optimizer;
pub use scheduler::{LRScheduler, WarmupCosineDecayLR};
