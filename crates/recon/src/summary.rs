//! Roll-ups of per-employee statistics to role, division and estate level.
//!
//! Two rates are reported side by side because reports use both:
//! - `total_*_rate`: recomputed from summed counts (the "grand totals" row).
//! - `avg_*_rate`: unweighted mean of member employees' own rates.
//!
//! Averages only include employees that created at least one record; a pure
//! verifier has no verification rate of its own to contribute.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{percentage, EmployeeAggregate, ReconResult};
use crate::role::Role;

/// Label for employees with no division or estate on any of their rows.
pub const UNASSIGNED: &str = "UNASSIGNED";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Rollup {
    pub employee_count: usize,
    pub created_count: usize,
    pub verified_count: usize,
    pub difference_count: usize,
    pub verifications_performed: usize,
    /// Mean over members with `created_count > 0`.
    pub avg_verification_rate: f64,
    pub avg_difference_rate: f64,
    pub total_verification_rate: f64,
    pub total_difference_rate: f64,
}

pub type RoleAggregate = Rollup;
pub type DivisionAggregate = Rollup;
pub type EstateAggregate = Rollup;

impl Rollup {
    fn from_members<'a>(members: impl IntoIterator<Item = &'a EmployeeAggregate>) -> Self {
        let mut rollup = Rollup::default();
        let mut verification_rates = Vec::new();
        let mut difference_rates = Vec::new();

        for emp in members {
            rollup.employee_count += 1;
            rollup.created_count += emp.created_count;
            rollup.verified_count += emp.verified_count;
            rollup.difference_count += emp.difference_count;
            rollup.verifications_performed += emp.verifications_performed;
            if emp.created_count > 0 {
                verification_rates.push(emp.verification_rate());
                difference_rates.push(emp.difference_rate());
            }
        }

        rollup.avg_verification_rate = mean(&verification_rates);
        rollup.avg_difference_rate = mean(&difference_rates);
        rollup.total_verification_rate = percentage(rollup.verified_count, rollup.created_count);
        rollup.total_difference_rate = percentage(rollup.difference_count, rollup.verified_count);
        rollup
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn rollup_by<K, F>(employees: &BTreeMap<String, EmployeeAggregate>, key: F) -> BTreeMap<K, Rollup>
where
    K: Ord,
    F: Fn(&EmployeeAggregate) -> K,
{
    let mut members: BTreeMap<K, Vec<&EmployeeAggregate>> = BTreeMap::new();
    for emp in employees.values() {
        members.entry(key(emp)).or_default().push(emp);
    }
    members
        .into_iter()
        .map(|(k, emps)| (k, Rollup::from_members(emps)))
        .collect()
}

pub fn by_role(employees: &BTreeMap<String, EmployeeAggregate>) -> BTreeMap<Role, RoleAggregate> {
    rollup_by(employees, |e| e.role)
}

pub fn by_division(employees: &BTreeMap<String, EmployeeAggregate>) -> BTreeMap<String, DivisionAggregate> {
    rollup_by(employees, |e| e.division.clone().unwrap_or_else(|| UNASSIGNED.to_string()))
}

pub fn by_estate(employees: &BTreeMap<String, EmployeeAggregate>) -> BTreeMap<String, EstateAggregate> {
    rollup_by(employees, |e| e.estate.clone().unwrap_or_else(|| UNASSIGNED.to_string()))
}

pub fn grand_total(employees: &BTreeMap<String, EmployeeAggregate>) -> Rollup {
    Rollup::from_members(employees.values())
}

/// One finalized employee row, rates materialized for renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeSummary {
    pub employee_id: String,
    pub employee_name: Option<String>,
    pub role: Role,
    pub division: Option<String>,
    pub estate: Option<String>,
    pub created_count: usize,
    pub verified_count: usize,
    pub difference_count: usize,
    pub verifications_performed: usize,
    pub unique_transaction_count: usize,
    pub verification_rate: f64,
    pub difference_rate: f64,
    pub status_breakdown: BTreeMap<String, usize>,
}

impl From<&EmployeeAggregate> for EmployeeSummary {
    fn from(e: &EmployeeAggregate) -> Self {
        Self {
            employee_id: e.employee_id.clone(),
            employee_name: e.employee_name.clone(),
            role: e.role,
            division: e.division.clone(),
            estate: e.estate.clone(),
            created_count: e.created_count,
            verified_count: e.verified_count,
            difference_count: e.difference_count,
            verifications_performed: e.verifications_performed,
            unique_transaction_count: e.unique_transaction_count,
            verification_rate: e.verification_rate(),
            difference_rate: e.difference_rate(),
            status_breakdown: e.status_breakdown.clone(),
        }
    }
}

/// Employee rows ordered by role, then id.
pub fn employee_summaries(result: &ReconResult) -> Vec<EmployeeSummary> {
    let mut rows: Vec<EmployeeSummary> = result.employees.values().map(EmployeeSummary::from).collect();
    rows.sort_by(|a, b| a.role.cmp(&b.role).then_with(|| a.employee_id.cmp(&b.employee_id)));
    rows
}
