use std::collections::BTreeMap;

use crate::difference::DifferenceCalculator;
use crate::group::TransactionGroup;
use crate::model::{Magnitude, VerificationOutcome};

/// Verifier status code required while a status gate is active.
pub const VERIFIED_STATUS: &str = "704";

/// Decides whether a group counts as verified, and by how much the verifier
/// disagreed with the creator.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationClassifier {
    pub calculator: DifferenceCalculator,
    pub required_status: String,
}

impl Default for VerificationClassifier {
    fn default() -> Self {
        Self {
            calculator: DifferenceCalculator::default(),
            required_status: VERIFIED_STATUS.to_string(),
        }
    }
}

impl VerificationClassifier {
    pub fn new(calculator: DifferenceCalculator, required_status: impl Into<String>) -> Self {
        Self {
            calculator,
            required_status: required_status.into(),
        }
    }

    /// Classify one group.
    ///
    /// A group is verified iff it has a creator record and a qualifying
    /// verifier record. With `require_status_filter`, a verifier qualifies
    /// only when its status equals `required_status`.
    pub fn classify(&self, group: &TransactionGroup, require_status_filter: bool) -> VerificationOutcome {
        let creator = group.creator();
        let verifier = creator.and_then(|_| {
            group.best_verifier(require_status_filter.then_some(self.required_status.as_str()))
        });

        let (field_differences, total_difference, differing_fields, magnitude) = match (creator, verifier) {
            (Some(c), Some(v)) => {
                let diffs = self.calculator.compute(c, v);
                let total = self.calculator.total_difference(&diffs);
                let differing = self.calculator.count_differing_fields(&diffs);
                (diffs, total, differing, self.calculator.classify_magnitude(total))
            }
            _ => (BTreeMap::new(), 0.0, 0, Magnitude::None),
        };

        let anchor = creator.or_else(|| group.records().first());

        VerificationOutcome {
            transaction_key: group.key().clone(),
            transaction_date: group.date().unwrap_or_default(),
            division: anchor.and_then(|r| r.division_label()).map(str::to_string),
            estate: anchor.and_then(|r| r.estate.clone()),
            is_verified: creator.is_some() && verifier.is_some(),
            creator_user_id: creator.map(|r| r.creator_user_id.clone()),
            creator_status: creator.map(|r| r.status_code.clone()),
            verifier_user_id: verifier.map(|r| r.creator_user_id.clone()),
            verifier_role: verifier.map(|r| r.role()),
            verifier_status: verifier.map(|r| r.status_code.clone()),
            status_gate_applied: require_status_filter,
            field_differences,
            total_difference,
            differing_fields,
            is_significant: magnitude == Magnitude::Significant,
            magnitude,
        }
    }
}
