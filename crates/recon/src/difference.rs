//! Creator ↔ verifier bunch-count differences.
//!
//! Differences are signed `verifier - creator`: a positive value means the
//! verifier counted more than the clerk. The total is the sum of the signed
//! field values, not of their absolute values.

use std::collections::BTreeMap;

use crate::model::{BunchField, Magnitude, TransactionRecord};

/// Total difference above which a transaction is flagged as significant.
/// Strictly greater: a difference of exactly 5 bunches is minor.
pub const SIGNIFICANCE_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifferenceCalculator {
    pub significance_threshold: f64,
    /// Absolute differences at or below this are treated as no difference.
    /// Zero keeps exact comparison.
    pub tolerance: f64,
}

impl Default for DifferenceCalculator {
    fn default() -> Self {
        Self {
            significance_threshold: SIGNIFICANCE_THRESHOLD,
            tolerance: 0.0,
        }
    }
}

impl DifferenceCalculator {
    pub fn new(significance_threshold: f64, tolerance: f64) -> Self {
        Self {
            significance_threshold,
            tolerance,
        }
    }

    /// Signed per-field difference for all seven bunch fields.
    pub fn compute(
        &self,
        creator: &TransactionRecord,
        verifier: &TransactionRecord,
    ) -> BTreeMap<BunchField, f64> {
        BunchField::ALL
            .iter()
            .map(|f| (*f, verifier.bunches.get(*f) - creator.bunches.get(*f)))
            .collect()
    }

    pub fn total_difference(&self, diffs: &BTreeMap<BunchField, f64>) -> f64 {
        diffs.values().sum()
    }

    pub fn count_differing_fields(&self, diffs: &BTreeMap<BunchField, f64>) -> usize {
        diffs.values().filter(|d| !self.is_equal(**d)).count()
    }

    pub fn classify_magnitude(&self, total_difference: f64) -> Magnitude {
        if self.is_equal(total_difference) {
            Magnitude::None
        } else if total_difference.abs() > self.significance_threshold {
            Magnitude::Significant
        } else {
            Magnitude::Minor
        }
    }

    fn is_equal(&self, diff: f64) -> bool {
        if self.tolerance == 0.0 {
            diff == 0.0
        } else {
            diff.abs() <= self.tolerance
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Bunches;
    use chrono::NaiveDate;

    fn rec(tag: &str, bunches: Bunches) -> TransactionRecord {
        TransactionRecord::new("T1", NaiveDate::from_ymd_opt(2025, 5, 10).unwrap(), "u", tag, "731")
            .with_bunches(bunches)
    }

    fn ripe(n: f64) -> Bunches {
        Bunches {
            ripe: n,
            ..Bunches::default()
        }
    }

    #[test]
    fn signed_per_field() {
        let calc = DifferenceCalculator::default();
        let creator = rec(
            "PM",
            Bunches {
                ripe: 50.0,
                unripe: 4.0,
                ..Bunches::default()
            },
        );
        let verifier = rec(
            "P1",
            Bunches {
                ripe: 48.0,
                unripe: 6.0,
                loose_fruit: 1.0,
                ..Bunches::default()
            },
        );
        let diffs = calc.compute(&creator, &verifier);
        assert_eq!(diffs.len(), 7);
        assert_eq!(diffs[&BunchField::Ripe], -2.0);
        assert_eq!(diffs[&BunchField::Unripe], 2.0);
        assert_eq!(diffs[&BunchField::LooseFruit], 1.0);
        assert_eq!(diffs[&BunchField::Black], 0.0);
        // signed sum, not sum of absolutes
        assert_eq!(calc.total_difference(&diffs), 1.0);
        assert_eq!(calc.count_differing_fields(&diffs), 3);
    }

    #[test]
    fn total_equals_difference_of_totals() {
        let calc = DifferenceCalculator::default();
        let creator = rec("PM", ripe(100.0));
        let verifier = rec(
            "P5",
            Bunches {
                ripe: 100.0,
                rotten: 3.0,
                rat_damaged: 4.0,
                ..Bunches::default()
            },
        );
        let diffs = calc.compute(&creator, &verifier);
        let total = calc.total_difference(&diffs);
        assert_eq!(total, verifier.bunches.total() - creator.bunches.total());
        assert_eq!(total, 7.0);
        assert_eq!(calc.classify_magnitude(total), Magnitude::Significant);
    }

    #[test]
    fn threshold_is_strict() {
        let calc = DifferenceCalculator::default();
        assert_eq!(calc.classify_magnitude(5.0), Magnitude::Minor);
        assert_eq!(calc.classify_magnitude(-5.0), Magnitude::Minor);
        assert_eq!(calc.classify_magnitude(5.5), Magnitude::Significant);
        assert_eq!(calc.classify_magnitude(-6.0), Magnitude::Significant);
        assert_eq!(calc.classify_magnitude(0.0), Magnitude::None);
        assert_eq!(calc.classify_magnitude(0.25), Magnitude::Minor);
    }

    #[test]
    fn tolerance_absorbs_noise() {
        let calc = DifferenceCalculator::new(SIGNIFICANCE_THRESHOLD, 0.5);
        assert_eq!(calc.classify_magnitude(0.25), Magnitude::None);
        assert_eq!(calc.classify_magnitude(0.75), Magnitude::Minor);

        let creator = rec("PM", ripe(10.0));
        let verifier = rec("P1", ripe(10.3));
        let diffs = calc.compute(&creator, &verifier);
        assert_eq!(calc.count_differing_fields(&diffs), 0);
    }

    #[test]
    fn custom_threshold() {
        let calc = DifferenceCalculator::new(10.0, 0.0);
        assert_eq!(calc.classify_magnitude(7.0), Magnitude::Minor);
        assert_eq!(calc.classify_magnitude(10.5), Magnitude::Significant);
    }
}
