use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::config::KeyScheme;
use crate::error::ReconError;
use crate::model::{TransactionKey, TransactionRecord};
use crate::role::Role;

/// All records sharing one transaction key, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionGroup {
    key: TransactionKey,
    scheme: KeyScheme,
    records: Vec<TransactionRecord>,
}

impl TransactionGroup {
    pub fn new(key: TransactionKey, scheme: KeyScheme) -> Self {
        Self {
            key,
            scheme,
            records: Vec::new(),
        }
    }

    /// Append a record. Fails when the record's key differs from the group's.
    pub fn push(&mut self, record: TransactionRecord) -> Result<(), ReconError> {
        let key = TransactionKey::for_record(&record, self.scheme);
        if key != self.key {
            return Err(ReconError::KeyMismatch {
                expected: self.key.to_string(),
                found: key.to_string(),
            });
        }
        self.records.push(record);
        Ok(())
    }

    pub fn key(&self) -> &TransactionKey {
        &self.key
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    /// Date the group is evaluated under: the keyed date, else the canonical
    /// creator's date, else the first record's.
    pub fn date(&self) -> Option<NaiveDate> {
        self.key
            .transaction_date
            .or_else(|| self.creator().map(|r| r.transaction_date))
            .or_else(|| self.records.first().map(|r| r.transaction_date))
    }

    /// First creator record; later ones are duplicates.
    pub fn creator(&self) -> Option<&TransactionRecord> {
        self.records.iter().find(|r| r.role() == Role::Creator)
    }

    pub fn creators(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.records.iter().filter(|r| r.role() == Role::Creator)
    }

    pub fn verifiers(&self) -> Vec<&TransactionRecord> {
        self.records.iter().filter(|r| r.role().is_verifier()).collect()
    }

    /// Highest-priority verifier, optionally restricted to one status code.
    /// Status codes compare with surrounding whitespace ignored on both sides.
    ///
    /// Ties go to the earliest `transaction_time` (records without a time sort
    /// after those with one), then to input order.
    pub fn best_verifier(&self, require_status: Option<&str>) -> Option<&TransactionRecord> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.role().is_verifier())
            .filter(|(_, r)| match require_status {
                Some(status) => r.status_code.trim() == status.trim(),
                None => true,
            })
            .min_by_key(|(idx, r)| {
                (
                    std::cmp::Reverse(r.role().verifier_priority()),
                    r.transaction_time.is_none(),
                    r.transaction_time,
                    *idx,
                )
            })
            .map(|(_, r)| r)
    }
}

/// Output of a grouping pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grouping {
    pub groups: BTreeMap<TransactionKey, TransactionGroup>,
    /// Records with a blank transaction number. Never grouped, never dropped.
    pub unkeyed: Vec<TransactionRecord>,
}

/// Group records by transaction key under `scheme`.
pub fn group_by_key(records: Vec<TransactionRecord>, scheme: KeyScheme) -> Grouping {
    let mut grouping = Grouping::default();

    for record in records {
        if !record.is_keyed() {
            grouping.unkeyed.push(record);
            continue;
        }
        let key = TransactionKey::for_record(&record, scheme);
        grouping
            .groups
            .entry(key.clone())
            .or_insert_with(|| TransactionGroup::new(key, scheme))
            .records
            .push(record);
    }

    grouping
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, day).unwrap()
    }

    fn rec(no: &str, day: u32, user: &str, tag: &str, status: &str) -> TransactionRecord {
        TransactionRecord::new(no, d(day), user, tag, status)
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn date_in_key_separates_same_number() {
        let records = vec![
            rec("T1", 10, "101", "PM", "731"),
            rec("T1", 11, "102", "PM", "731"),
            rec("T1", 10, "202", "P1", "704"),
        ];
        let g = group_by_key(records.clone(), KeyScheme::NumberAndDate);
        assert_eq!(g.groups.len(), 2);
        let first = g.groups.values().next().unwrap();
        assert_eq!(first.records().len(), 2);
        assert_eq!(first.date(), Some(d(10)));

        let g = group_by_key(records, KeyScheme::Number);
        assert_eq!(g.groups.len(), 1);
        assert_eq!(g.groups.values().next().unwrap().records().len(), 3);
    }

    #[test]
    fn blank_numbers_are_unkeyed() {
        let records = vec![
            rec("", 10, "101", "PM", "731"),
            rec("   ", 10, "101", "PM", "731"),
            rec("T2", 10, "101", "PM", "731"),
        ];
        let g = group_by_key(records, KeyScheme::NumberAndDate);
        assert_eq!(g.groups.len(), 1);
        assert_eq!(g.unkeyed.len(), 2);
    }

    #[test]
    fn push_rejects_foreign_key() {
        let first = rec("T1", 10, "101", "PM", "731");
        let key = TransactionKey::for_record(&first, KeyScheme::NumberAndDate);
        let mut group = TransactionGroup::new(key, KeyScheme::NumberAndDate);
        group.push(first).unwrap();
        group.push(rec("T1", 10, "202", "P1", "704")).unwrap();

        let err = group.push(rec("T1", 11, "203", "P5", "704")).unwrap_err();
        assert_eq!(
            err,
            ReconError::KeyMismatch {
                expected: "T1@2025-05-10".into(),
                found: "T1@2025-05-11".into(),
            }
        );
        assert_eq!(group.records().len(), 2);
    }

    #[test]
    fn first_creator_wins() {
        let records = vec![
            rec("T1", 10, "202", "P1", "704"),
            rec("T1", 10, "101", "PM", "731"),
            rec("T1", 10, "102", "PM", "731"),
        ];
        let g = group_by_key(records, KeyScheme::NumberAndDate);
        let group = g.groups.values().next().unwrap();
        assert_eq!(group.creator().unwrap().creator_user_id, "101");
        assert_eq!(group.creators().count(), 2);
        assert_eq!(group.verifiers().len(), 1);
    }

    #[test]
    fn assistant_beats_supervisor() {
        let records = vec![
            rec("T1", 10, "101", "PM", "731"),
            rec("T1", 10, "301", "P5", "704"),
            rec("T1", 10, "202", "P1", "704"),
        ];
        let g = group_by_key(records, KeyScheme::NumberAndDate);
        let best = g.groups.values().next().unwrap().best_verifier(None).unwrap();
        assert_eq!(best.creator_user_id, "202");
    }

    #[test]
    fn status_filter_narrows_candidates() {
        let records = vec![
            rec("T1", 10, "101", "PM", "731"),
            rec("T1", 10, "202", "P1", "732"),
            rec("T1", 10, "301", "P5", "704"),
        ];
        let g = group_by_key(records, KeyScheme::NumberAndDate);
        let group = g.groups.values().next().unwrap();
        assert_eq!(group.best_verifier(Some("704")).unwrap().creator_user_id, "301");
        assert_eq!(group.best_verifier(None).unwrap().creator_user_id, "202");
        assert!(group.best_verifier(Some("999")).is_none());
    }

    #[test]
    fn status_filter_ignores_padding() {
        let records = vec![
            rec("T1", 10, "101", "PM", "731"),
            rec("T1", 10, "202", "P1", " 704 "),
        ];
        let g = group_by_key(records, KeyScheme::NumberAndDate);
        let group = g.groups.values().next().unwrap();
        assert_eq!(group.best_verifier(Some(" 704")).unwrap().creator_user_id, "202");
        assert_eq!(group.best_verifier(Some("704 ")).unwrap().creator_user_id, "202");
    }

    #[test]
    fn ties_break_on_time_then_order() {
        let records = vec![
            rec("T1", 10, "101", "PM", "731"),
            rec("T1", 10, "201", "P1", "704"),
            rec("T1", 10, "202", "P1", "704").with_time(t(9, 30)),
            rec("T1", 10, "203", "P1", "704").with_time(t(8, 15)),
            rec("T1", 10, "204", "P1", "704").with_time(t(8, 15)),
        ];
        let g = group_by_key(records, KeyScheme::NumberAndDate);
        let best = g.groups.values().next().unwrap().best_verifier(None).unwrap();
        assert_eq!(best.creator_user_id, "203");

        let untimed = vec![
            rec("T2", 10, "201", "P5", "704"),
            rec("T2", 10, "202", "P5", "704"),
        ];
        let g = group_by_key(untimed, KeyScheme::NumberAndDate);
        let best = g.groups.values().next().unwrap().best_verifier(None).unwrap();
        assert_eq!(best.creator_user_id, "201");
    }

    #[test]
    fn creators_and_unknown_never_verify() {
        let records = vec![
            rec("T1", 10, "101", "PM", "704"),
            rec("T1", 10, "102", "ZZ", "704"),
        ];
        let g = group_by_key(records, KeyScheme::NumberAndDate);
        assert!(g.groups.values().next().unwrap().best_verifier(None).is_none());
    }
}
