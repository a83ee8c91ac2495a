//! Significance gating of a completed feature set.

use crate::features::FeatureSet;
use crate::fixed::{abs_q15, Q15};

/// Aggregation policy for the significance decision. All modes derive one
/// corrected threshold from the same configured base value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThresholdMode {
    /// Every set is significant.
    Disabled,
    /// Sum of absolute values over the whole set vs base * n_vectors * length.
    FullSum,
    /// Sum of absolute values of any single vector vs base * length.
    PerVectorSum,
    /// Largest absolute coefficient of any single vector vs base.
    PerVectorMax,
}

pub struct ThresholdGate {
    mode: ThresholdMode,
    base: Q15,
}

impl ThresholdGate {
    pub fn new(mode: ThresholdMode, base: Q15) -> Self {
        Self { mode, base }
    }

    pub fn mode(&self) -> ThresholdMode {
        self.mode
    }

    /// Pure decision over a completed set; scanning stops as soon as the
    /// mode's condition is met.
    pub fn is_significant(&self, set: &FeatureSet) -> bool {
        match self.mode {
            ThresholdMode::Disabled => true,
            ThresholdMode::FullSum => {
                let corrected =
                    self.base as i64 * set.num_vectors() as i64 * set.vector_length() as i64;
                let mut total: i64 = 0;
                for vector in set.vectors() {
                    total += vector.iter().map(|&c| abs_q15(c) as i64).sum::<i64>();
                    if total > corrected {
                        return true;
                    }
                }
                false
            }
            ThresholdMode::PerVectorSum => {
                let corrected = self.base as i64 * set.vector_length() as i64;
                set.vectors().any(|vector| {
                    vector.iter().map(|&c| abs_q15(c) as i64).sum::<i64>() > corrected
                })
            }
            ThresholdMode::PerVectorMax => set
                .vectors()
                .any(|vector| vector.iter().any(|&c| abs_q15(c) > self.base)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_with(values: &[&[i16]]) -> FeatureSet {
        let mut set = FeatureSet::new(values.len(), values[0].len());
        for v in values {
            set.next_vector_mut().copy_from_slice(v);
            set.advance();
        }
        set
    }

    #[test]
    fn disabled_always_passes() {
        let gate = ThresholdGate::new(ThresholdMode::Disabled, 32_767);
        let set = set_with(&[&[0, 0, 0], &[0, 0, 0]]);
        assert!(gate.is_significant(&set));
    }

    #[test]
    fn per_vector_max_is_strict() {
        let base = 100;
        let gate = ThresholdGate::new(ThresholdMode::PerVectorMax, base);

        let mut quiet = FeatureSet::new(2, 3);
        for _ in 0..2 {
            quiet.next_vector_mut().fill(base);
            quiet.advance();
        }
        assert!(!gate.is_significant(&quiet), "coefficients at base must not pass");

        let loud = set_with(&[&[0, 0, 0], &[0, base + 1, 0]]);
        assert!(gate.is_significant(&loud));

        // Negative excursions count through their absolute value.
        let negative = set_with(&[&[0, 0, 0], &[0, -(base + 1), 0]]);
        assert!(gate.is_significant(&negative));
    }

    #[test]
    fn per_vector_sum_needs_one_hot_vector() {
        let gate = ThresholdGate::new(ThresholdMode::PerVectorSum, 10);
        // Corrected threshold: 10 * 3 = 30 per vector.
        let spread = set_with(&[&[10, 10, 10], &[10, 10, 10]]);
        assert!(!gate.is_significant(&spread), "30 is not > 30");
        let hot = set_with(&[&[10, 10, 10], &[10, 11, 10]]);
        assert!(gate.is_significant(&hot));
    }

    #[test]
    fn full_sum_aggregates_across_vectors() {
        let gate = ThresholdGate::new(ThresholdMode::FullSum, 10);
        // Corrected threshold: 10 * 2 * 3 = 60 over the whole set.
        let spread = set_with(&[&[15, 15, 0], &[15, 15, 0]]);
        assert!(!gate.is_significant(&spread), "60 is not > 60");
        let hot = set_with(&[&[15, 15, 0], &[15, 16, 0]]);
        assert!(gate.is_significant(&hot));
    }
}
