use std::collections::BTreeMap;

use crate::model::{percentage, Magnitude, RunTotals, VerificationOutcome};

/// Dataset-level counts for one run.
pub fn compute_totals(outcomes: &[VerificationOutcome], total_records: usize) -> RunTotals {
    let mut magnitude_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut totals = RunTotals {
        total_records,
        total_groups: outcomes.len(),
        ..RunTotals::default()
    };

    for o in outcomes {
        if o.creator_user_id.is_none() {
            totals.groups_without_creator += 1;
        }

        if !o.is_verified {
            totals.unverified_groups += 1;
            if o.creator_user_id.is_some() {
                totals.groups_without_verifier += 1;
            }
            continue;
        }

        totals.verified_groups += 1;
        *magnitude_counts.entry(o.magnitude.to_string()).or_insert(0) += 1;
        match o.magnitude {
            Magnitude::None => totals.no_difference += 1,
            Magnitude::Minor => totals.minor_differences += 1,
            Magnitude::Significant => totals.significant_differences += 1,
        }
    }

    let creator_groups = totals.total_groups - totals.groups_without_creator;
    totals.verification_rate = percentage(totals.verified_groups, creator_groups);
    totals.magnitude_counts = magnitude_counts;
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransactionKey;
    use chrono::NaiveDate;

    fn outcome(creator: bool, verified: bool, magnitude: Magnitude) -> VerificationOutcome {
        VerificationOutcome {
            transaction_key: TransactionKey {
                transaction_no: "T".into(),
                transaction_date: None,
            },
            transaction_date: NaiveDate::from_ymd_opt(2025, 5, 10).unwrap(),
            division: None,
            estate: None,
            is_verified: verified,
            creator_user_id: creator.then(|| "101".to_string()),
            creator_status: None,
            verifier_user_id: verified.then(|| "202".to_string()),
            verifier_role: None,
            verifier_status: None,
            status_gate_applied: false,
            field_differences: BTreeMap::new(),
            total_difference: 0.0,
            differing_fields: 0,
            is_significant: magnitude == Magnitude::Significant,
            magnitude,
        }
    }

    #[test]
    fn totals_counts() {
        let outcomes = vec![
            outcome(true, true, Magnitude::None),
            outcome(true, true, Magnitude::Minor),
            outcome(true, true, Magnitude::Significant),
            outcome(true, false, Magnitude::None),
            outcome(false, false, Magnitude::None),
        ];
        let t = compute_totals(&outcomes, 9);
        assert_eq!(t.total_records, 9);
        assert_eq!(t.total_groups, 5);
        assert_eq!(t.verified_groups, 3);
        assert_eq!(t.unverified_groups, 2);
        assert_eq!(t.groups_without_creator, 1);
        assert_eq!(t.groups_without_verifier, 1);
        assert_eq!(t.no_difference, 1);
        assert_eq!(t.minor_differences, 1);
        assert_eq!(t.significant_differences, 1);
        assert_eq!(t.verification_rate, 75.0);
        assert_eq!(t.magnitude_counts["significant"], 1);
    }

    #[test]
    fn empty_run_is_all_zero() {
        let t = compute_totals(&[], 0);
        assert_eq!(t, RunTotals::default());
    }
}
