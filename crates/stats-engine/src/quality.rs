//! Detection quality score

use ring_buffer::RollingWindow;

/// Weight of the mean-confidence term
const CONFIDENCE_WEIGHT: f64 = 0.5;
/// Weight of the consistency (low variance) term
const CONSISTENCY_WEIGHT: f64 = 0.5;

/// Score in [0, 100] rewarding high mean confidence and low variance equally
///
/// `0.5 * 100 * mean + 0.5 * max(0, 100 - 100 * variance)`, and exactly 0 for
/// an empty window.
pub fn quality_score(confidences: &RollingWindow<f64>) -> f64 {
    if confidences.is_empty() {
        return 0.0;
    }

    let consistency = (100.0 - confidences.variance() * 100.0).max(0.0);
    let quality = confidences.mean() * 100.0 * CONFIDENCE_WEIGHT + consistency * CONSISTENCY_WEIGHT;
    if quality.is_nan() {
        return 0.0;
    }
    quality.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_window_scores_zero() {
        let window = RollingWindow::new(100);
        assert_eq!(quality_score(&window), 0.0);
    }

    #[test]
    fn test_perfectly_consistent_confidence() {
        let mut window = RollingWindow::new(100);
        for _ in 0..10 {
            window.push(0.8);
        }
        // 0.5 * 80 + 0.5 * 100
        assert!((quality_score(&window) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_variance_lowers_the_score() {
        let mut steady = RollingWindow::new(100);
        let mut jittery = RollingWindow::new(100);
        for i in 0..10 {
            steady.push(0.5);
            jittery.push(if i % 2 == 0 { 0.0 } else { 1.0 });
        }
        // same mean, variance 0.25 costs 12.5 points
        assert!((quality_score(&steady) - 75.0).abs() < 1e-9);
        assert!((quality_score(&jittery) - 62.5).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_score_in_range(values in prop::collection::vec(0.0f64..=1.0, 0..150)) {
            let mut window = RollingWindow::new(100);
            for v in values {
                window.push(v);
            }
            let score = quality_score(&window);
            prop_assert!((0.0..=100.0).contains(&score));
        }
    }
}
