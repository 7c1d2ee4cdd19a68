//! Learning rate schedules for the optimization phases.

use std::f32::consts::PI;

use super::Optimizer;

/// Learning rate scheduler trait.
pub trait LRScheduler {
    /// Learning rate at the current step.
    fn get_lr(&self) -> f32;

    /// Advance the schedule by one step.
    fn step(&mut self);
}

/// Linear warm-up followed by cosine decay.
///
/// The warm-up ramp absorbs the large early gradients of a poor
/// initialization; the cosine tail settles the search. One instance is
/// created per optimization phase with that phase's step budget.
pub struct WarmupCosineDecayLR {
    lr_max: f32,
    lr_min: f32,
    warmup_steps: usize,
    total_steps: usize,
    current_step: usize,
}

impl WarmupCosineDecayLR {
    /// Create a schedule over `total_steps`, warming up for `warmup_steps`.
    pub fn new(lr_max: f32, lr_min: f32, warmup_steps: usize, total_steps: usize) -> Self {
        Self {
            lr_max,
            lr_min,
            warmup_steps,
            total_steps,
            current_step: 0,
        }
    }

    /// Schedule with the warm-up sized as a fraction of the step budget.
    pub fn with_warmup_fraction(lr_max: f32, lr_min: f32, fraction: f32, total_steps: usize) -> Self {
        let warmup_steps = ((total_steps as f32) * fraction).round() as usize;
        Self::new(lr_max, lr_min, warmup_steps, total_steps)
    }

    /// Push the current learning rate into an optimizer.
    pub fn apply(&self, optimizer: &mut dyn Optimizer) {
        optimizer.set_lr(self.get_lr());
    }
}

impl LRScheduler for WarmupCosineDecayLR {
    fn get_lr(&self) -> f32 {
        if self.current_step < self.warmup_steps {
            if self.warmup_steps == 0 {
                return self.lr_max;
            }
            let progress = self.current_step as f32 / self.warmup_steps as f32;
            return self.lr_max * progress;
        }

        let decay_steps = self.total_steps.saturating_sub(self.warmup_steps);
        if decay_steps == 0 {
            return self.lr_min;
        }

        let decay_step = self.current_step - self.warmup_steps;
        if decay_step >= decay_steps {
            return self.lr_min;
        }

        let progress = decay_step as f32 / decay_steps as f32;
        let cosine = 0.5 * (1.0 + (PI * progress).cos());
        self.lr_min + (self.lr_max - self.lr_min) * cosine
    }

    fn step(&mut self) {
        self.current_step += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_warmup_ramps_linearly() {
        let mut sched = WarmupCosineDecayLR::new(1.0, 0.0, 10, 100);
        assert_abs_diff_eq!(sched.get_lr(), 0.0);
        for _ in 0..5 {
            sched.step();
        }
        assert_abs_diff_eq!(sched.get_lr(), 0.5);
        for _ in 0..5 {
            sched.step();
        }
        assert_abs_diff_eq!(sched.get_lr(), 1.0);
    }

    #[test]
    fn test_cosine_decays_to_min() {
        let mut sched = WarmupCosineDecayLR::new(1.0, 0.1, 0, 100);
        assert_abs_diff_eq!(sched.get_lr(), 1.0);
        for _ in 0..100 {
            sched.step();
        }
        assert_abs_diff_eq!(sched.get_lr(), 0.1);
        // Past the end the rate stays pinned at the floor
        sched.step();
        assert_abs_diff_eq!(sched.get_lr(), 0.1);
    }

    #[test]
    fn test_decay_is_monotonic_after_warmup() {
        let mut sched = WarmupCosineDecayLR::with_warmup_fraction(0.01, 0.0, 0.05, 200);
        for _ in 0..10 {
            sched.step();
        }
        let mut prev = sched.get_lr();
        for _ in 10..200 {
            sched.step();
            let lr = sched.get_lr();
            assert!(lr <= prev + 1e-9, "lr increased after warmup: {prev} -> {lr}");
            prev = lr;
        }
    }

    #[test]
    fn test_zero_warmup_starts_at_max() {
        let sched = WarmupCosineDecayLR::new(0.5, 0.0, 0, 10);
        assert_abs_diff_eq!(sched.get_lr(), 0.5);
    }
}
