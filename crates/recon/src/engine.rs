use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::classify::VerificationClassifier;
use crate::config::Policy;
use crate::difference::DifferenceCalculator;
use crate::error::ReconError;
use crate::group::{group_by_key, TransactionGroup};
use crate::model::{
    EmployeeAggregate, ReconInput, ReconMeta, ReconResult, ReconWarning, WarningKind,
};
use crate::role::Role;
use crate::totals::compute_totals;

/// Run reconciliation under `policy`. The policy's status gate decides, per
/// group, whether the verifier must carry the gate status.
pub fn run(
    input: &ReconInput,
    employees: &HashMap<String, String>,
    policy: &Policy,
) -> Result<ReconResult, ReconError> {
    let gate = policy.status_gate.clone();
    run_with_gate(input, employees, policy, |group| match gate {
        Some(ref g) => group.date().is_some_and(|d| g.applies_to(d)),
        None => false,
    })
}

/// Run reconciliation with a caller-supplied status-gate predicate.
///
/// `gate(group)` returning true means the group's verifier only qualifies
/// with `policy.required_status()`.
pub fn run_with_gate<F>(
    input: &ReconInput,
    employees: &HashMap<String, String>,
    policy: &Policy,
    gate: F,
) -> Result<ReconResult, ReconError>
where
    F: Fn(&TransactionGroup) -> bool,
{
    policy.validate()?;

    let mut warnings = input.warnings.clone();
    let mut excluded_records = input.excluded_rows;

    // Period filter
    let mut records = Vec::with_capacity(input.records.len());
    for record in &input.records {
        if let Some(ref period) = policy.period {
            if !period.contains(record.transaction_date) {
                warnings.push(ReconWarning {
                    source: None,
                    row: (record.source_row > 0).then_some(record.source_row),
                    transaction_no: Some(record.transaction_no.clone()).filter(|s| !s.is_empty()),
                    kind: WarningKind::OutOfPeriod {
                        date: record.transaction_date,
                    },
                });
                excluded_records += 1;
                continue;
            }
        }
        records.push(record.clone());
    }

    let total_records = records.len();
    let grouping = group_by_key(records, policy.key_scheme);
    let unkeyed_records = grouping.unkeyed.len();

    log::debug!(
        "reconciling {} records in {} groups ({} unkeyed, {} excluded)",
        total_records,
        grouping.groups.len(),
        unkeyed_records,
        excluded_records
    );

    let classifier = VerificationClassifier::new(
        DifferenceCalculator::new(policy.significance_threshold, policy.difference_tolerance),
        policy.required_status(),
    );

    let mut aggregates: BTreeMap<String, EmployeeAggregate> = BTreeMap::new();
    let mut outcomes = Vec::with_capacity(grouping.groups.len());
    let mut observed_from = None;
    let mut observed_to = None;

    for group in grouping.groups.values() {
        let outcome = classifier.classify(group, gate(group));

        for record in group.records() {
            let date = record.transaction_date;
            observed_from = Some(observed_from.map_or(date, |d: NaiveDate| d.min(date)));
            observed_to = Some(observed_to.map_or(date, |d: NaiveDate| d.max(date)));

            let Some(agg) = employee_entry(&mut aggregates, &record.creator_user_id, employees) else {
                continue;
            };
            *agg.role_tag_counts.entry(record.role()).or_insert(0) += 1;
            if let Some(division) = record.division_label() {
                *agg.division_counts.entry(division.to_string()).or_insert(0) += 1;
            }
            if let Some(ref estate) = record.estate {
                *agg.estate_counts.entry(estate.clone()).or_insert(0) += 1;
            }
            if record.role() == Role::Creator {
                agg.created_count += 1;
                agg.unique_keys.insert(group.key().clone());
                *agg.status_breakdown.entry(record.status_code.clone()).or_insert(0) += 1;
            }
        }

        if let Some(kept) = group.creator() {
            for extra in group.creators().skip(1) {
                log::warn!(
                    "transaction {}: duplicate creator record from '{}', keeping '{}'",
                    group.key(),
                    extra.creator_user_id,
                    kept.creator_user_id
                );
                warnings.push(ReconWarning {
                    source: None,
                    row: (extra.source_row > 0).then_some(extra.source_row),
                    transaction_no: Some(group.key().transaction_no.clone()),
                    kind: WarningKind::DuplicateCreator {
                        transaction_key: group.key().to_string(),
                        kept_user_id: kept.creator_user_id.clone(),
                        ignored_user_id: extra.creator_user_id.clone(),
                    },
                });
            }
        }

        if outcome.is_verified {
            if let Some(ref creator_id) = outcome.creator_user_id {
                if let Some(agg) = employee_entry(&mut aggregates, creator_id, employees) {
                    agg.verified_count += 1;
                    if outcome.is_significant {
                        agg.difference_count += 1;
                    }
                }
            }
            if let Some(ref verifier_id) = outcome.verifier_user_id {
                if let Some(agg) = employee_entry(&mut aggregates, verifier_id, employees) {
                    agg.verifications_performed += 1;
                }
            }
        }

        outcomes.push(outcome);
    }

    for agg in aggregates.values_mut() {
        agg.unique_transaction_count = agg.unique_keys.len();
        agg.role = majority(&agg.role_tag_counts).unwrap_or(Role::Unknown);
        agg.division = majority(&agg.division_counts);
        agg.estate = majority(&agg.estate_counts);
    }

    let totals = compute_totals(&outcomes, total_records);

    log::debug!(
        "reconciled {} groups: {} verified, {} significant differences, {} employees",
        totals.total_groups,
        totals.verified_groups,
        totals.significant_differences,
        aggregates.len()
    );

    Ok(ReconResult {
        meta: ReconMeta {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            key_scheme: policy.key_scheme,
            status_gate: policy.status_gate.clone(),
            significance_threshold: policy.significance_threshold,
            difference_tolerance: policy.difference_tolerance,
            period: policy.period,
            observed_from,
            observed_to,
        },
        totals,
        employees: aggregates,
        outcomes,
        warnings,
        unkeyed_records,
        excluded_records,
    })
}

/// Aggregate for `id`, created on first sight. Blank ids are not tracked.
fn employee_entry<'a>(
    aggregates: &'a mut BTreeMap<String, EmployeeAggregate>,
    id: &str,
    employees: &HashMap<String, String>,
) -> Option<&'a mut EmployeeAggregate> {
    let id = id.trim();
    if id.is_empty() {
        return None;
    }
    Some(
        aggregates
            .entry(id.to_string())
            .or_insert_with(|| EmployeeAggregate::new(id, employees.get(id).cloned())),
    )
}

/// Most frequent key; ties go to the smallest key.
fn majority<K: Ord + Clone>(counts: &BTreeMap<K, usize>) -> Option<K> {
    let mut best: Option<(&K, usize)> = None;
    for (key, &count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((key, count));
        }
    }
    best.map(|(k, _)| k.clone())
}
