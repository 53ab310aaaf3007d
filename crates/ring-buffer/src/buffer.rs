//! Rolling Window Implementation

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default window capacity (most recent 100 samples)
pub const DEFAULT_CAPACITY: usize = 100;

/// Fixed-capacity FIFO window of recent samples
///
/// Not internally synchronized: owners wrap it in the lock that protects the
/// rest of their statistics so a snapshot never observes a window mid-eviction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingWindow<T> {
    /// Samples, oldest at the front
    samples: VecDeque<T>,
    /// Maximum number of samples retained
    capacity: usize,
}

impl<T> RollingWindow<T> {
    /// Create a new window holding at most `capacity` samples
    ///
    /// A capacity of zero is bumped to one; an empty window that can never
    /// hold anything is not a useful statistic.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Create a window with default capacity (100 samples)
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Push a sample, returning the evicted oldest sample if the window was full
    pub fn push(&mut self, sample: T) -> Option<T> {
        let evicted = if self.samples.len() == self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
    }

    /// Number of samples currently held
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently pushed sample
    pub fn latest(&self) -> Option<&T> {
        self.samples.back()
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.samples.iter()
    }

    /// Drop every sample, keeping the capacity
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl<T: Clone> RollingWindow<T> {
    /// Copy the samples out, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.samples.iter().cloned().collect()
    }
}

impl RollingWindow<f64> {
    /// Arithmetic mean, or 0.0 when empty
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Population variance, or 0.0 with fewer than two samples
    pub fn variance(&self) -> f64 {
        if self.samples.len() < 2 {
            return 0.0;
        }
        let mean = self.mean();
        self.samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
            / self.samples.len() as f64
    }

    /// Smallest sample, or 0.0 when empty
    pub fn min(&self) -> f64 {
        self.samples
            .iter()
            .cloned()
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    /// Largest sample, or 0.0 when empty
    pub fn max(&self) -> f64 {
        self.samples
            .iter()
            .cloned()
            .reduce(f64::max)
            .unwrap_or(0.0)
    }
}

impl<T> Default for RollingWindow<T> {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_push_until_full() {
        let mut window = RollingWindow::new(3);

        assert_eq!(window.push(1), None);
        assert_eq!(window.push(2), None);
        assert_eq!(window.push(3), None);

        assert!(window.is_full());
        assert_eq!(window.len(), 3);
        assert_eq!(window.latest(), Some(&3));
    }

    #[test]
    fn test_evicts_exactly_the_oldest() {
        let mut window = RollingWindow::new(4);
        for i in 0..4 {
            window.push(i);
        }

        // N+1 insertions into a capacity-N window
        assert_eq!(window.push(4), Some(0));
        assert_eq!(window.to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_statistics() {
        let mut window = RollingWindow::new(10);
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            window.push(v);
        }

        assert!((window.mean() - 5.0).abs() < 1e-9);
        assert!((window.variance() - 4.0).abs() < 1e-9);
        assert_eq!(window.min(), 2.0);
        assert_eq!(window.max(), 9.0);
    }

    #[test]
    fn test_empty_statistics_are_zero() {
        let window: RollingWindow<f64> = RollingWindow::new(5);
        assert_eq!(window.mean(), 0.0);
        assert_eq!(window.variance(), 0.0);
        assert_eq!(window.min(), 0.0);
        assert_eq!(window.max(), 0.0);
    }

    #[test]
    fn test_single_sample_has_no_variance() {
        let mut window = RollingWindow::new(5);
        window.push(0.9);
        assert_eq!(window.variance(), 0.0);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut window = RollingWindow::new(2);
        window.push(1.0);
        window.push(2.0);
        window.clear();

        assert!(window.is_empty());
        assert_eq!(window.capacity(), 2);
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_capacity(capacity in 1usize..64, values in prop::collection::vec(any::<i32>(), 0..256)) {
            let mut window = RollingWindow::new(capacity);
            for v in &values {
                window.push(*v);
                prop_assert!(window.len() <= capacity);
            }

            let expected: Vec<i32> = values
                .iter()
                .skip(values.len().saturating_sub(capacity))
                .cloned()
                .collect();
            prop_assert_eq!(window.to_vec(), expected);
        }
    }
}
