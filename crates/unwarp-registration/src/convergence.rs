//! Convergence monitoring over a sliding loss window.

use std::collections::VecDeque;

/// Sliding-window convergence monitor.
///
/// Tracks the most recent loss values; the registration is considered
/// converged when the window is full and the mean per-iteration change,
/// relative to the loss magnitude at the start of the window, drops below
/// the tolerance.
#[derive(Debug, Clone)]
pub struct ConvergenceMonitor {
    tolerance: f64,
    window: usize,
    values: VecDeque<f64>,
}

impl ConvergenceMonitor {
    /// Create a monitor with the given tolerance and window length.
    pub fn new(tolerance: f64, window: usize) -> Self {
        Self {
            tolerance,
            window: window.max(2),
            values: VecDeque::with_capacity(window.max(2)),
        }
    }

    /// Record a loss value; returns true once converged.
    pub fn push(&mut self, loss: f64) -> bool {
        if self.values.len() == self.window {
            self.values.pop_front();
        }
        self.values.push_back(loss);

        if self.values.len() < self.window {
            return false;
        }
        let first = self.values.front().copied().unwrap_or(0.0);
        let last = self.values.back().copied().unwrap_or(0.0);
        let mean_change = (first - last).abs() / (self.window - 1) as f64;
        let reference = first.abs().max(f64::EPSILON);
        mean_change / reference < self.tolerance
    }

    /// Forget all recorded values.
    pub fn reset(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_converged_before_window_fills() {
        let mut monitor = ConvergenceMonitor::new(1e-6, 5);
        for _ in 0..4 {
            assert!(!monitor.push(1.0));
        }
    }

    #[test]
    fn test_flat_losses_converge() {
        let mut monitor = ConvergenceMonitor::new(1e-6, 5);
        let mut converged = false;
        for _ in 0..5 {
            converged = monitor.push(-3.2);
        }
        assert!(converged);
    }

    #[test]
    fn test_decreasing_losses_do_not_converge() {
        let mut monitor = ConvergenceMonitor::new(1e-6, 5);
        let mut converged = false;
        for i in 0..10 {
            converged = monitor.push(-(i as f64));
        }
        assert!(!converged);
    }

    #[test]
    fn test_improvement_is_measured_relative_to_loss_magnitude() {
        // Absolute drift of 1e-4 per step on a loss near 1000 is a relative
        // change of 1e-7, below a 1e-6 tolerance.
        let mut monitor = ConvergenceMonitor::new(1e-6, 5);
        let mut converged = false;
        for i in 0..5 {
            converged = monitor.push(-1000.0 + i as f64 * 1e-4);
        }
        assert!(converged);

        // The same absolute drift on a loss near 0.01 is relative 1e-2.
        let mut monitor = ConvergenceMonitor::new(1e-6, 5);
        let mut converged = false;
        for i in 0..5 {
            converged = monitor.push(-0.01 + i as f64 * 1e-4);
        }
        assert!(!converged);
    }

    #[test]
    fn test_reset_clears_window() {
        let mut monitor = ConvergenceMonitor::new(1e-6, 3);
        for _ in 0..3 {
            monitor.push(1.0);
        }
        monitor.reset();
        assert!(!monitor.push(1.0));
    }
}
