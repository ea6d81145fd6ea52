use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::config::{KeyScheme, Period, StatusGate};
use crate::role::Role;

// ---------------------------------------------------------------------------
// Bunch counts
// ---------------------------------------------------------------------------

/// The seven bunch-count measurements compared between creator and verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BunchField {
    Ripe,
    Unripe,
    Black,
    Rotten,
    LongStalk,
    RatDamaged,
    LooseFruit,
}

impl BunchField {
    pub const ALL: [BunchField; 7] = [
        Self::Ripe,
        Self::Unripe,
        Self::Black,
        Self::Rotten,
        Self::LongStalk,
        Self::RatDamaged,
        Self::LooseFruit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ripe => "ripe",
            Self::Unripe => "unripe",
            Self::Black => "black",
            Self::Rotten => "rotten",
            Self::LongStalk => "long_stalk",
            Self::RatDamaged => "rat_damaged",
            Self::LooseFruit => "loose_fruit",
        }
    }
}

impl std::fmt::Display for BunchField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Bunches {
    pub ripe: f64,
    pub unripe: f64,
    pub black: f64,
    pub rotten: f64,
    pub long_stalk: f64,
    pub rat_damaged: f64,
    pub loose_fruit: f64,
}

impl Bunches {
    pub fn get(&self, field: BunchField) -> f64 {
        match field {
            BunchField::Ripe => self.ripe,
            BunchField::Unripe => self.unripe,
            BunchField::Black => self.black,
            BunchField::Rotten => self.rotten,
            BunchField::LongStalk => self.long_stalk,
            BunchField::RatDamaged => self.rat_damaged,
            BunchField::LooseFruit => self.loose_fruit,
        }
    }

    pub fn set(&mut self, field: BunchField, value: f64) {
        match field {
            BunchField::Ripe => self.ripe = value,
            BunchField::Unripe => self.unripe = value,
            BunchField::Black => self.black = value,
            BunchField::Rotten => self.rotten = value,
            BunchField::LongStalk => self.long_stalk = value,
            BunchField::RatDamaged => self.rat_damaged = value,
            BunchField::LooseFruit => self.loose_fruit = value,
        }
    }

    pub fn total(&self) -> f64 {
        BunchField::ALL.iter().map(|f| self.get(*f)).sum()
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One normalized harvest entry.
///
/// The role is derived from the raw tag in [`TransactionRecord::new`] and has
/// no setter, so it cannot drift from the tag it was built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub transaction_no: String,
    pub transaction_date: NaiveDate,
    pub transaction_time: Option<NaiveTime>,
    pub creator_user_id: String,
    role: Role,
    raw_tag: String,
    pub status_code: String,
    pub division_id: Option<String>,
    pub division_name: Option<String>,
    pub estate: Option<String>,
    pub bunches: Bunches,
    /// 1-based data row within the originating source (0 when built in memory).
    pub source_row: usize,
}

impl TransactionRecord {
    pub fn new(
        transaction_no: impl Into<String>,
        transaction_date: NaiveDate,
        creator_user_id: impl Into<String>,
        raw_tag: impl Into<String>,
        status_code: impl Into<String>,
    ) -> Self {
        let raw_tag = raw_tag.into();
        Self {
            transaction_no: transaction_no.into(),
            transaction_date,
            transaction_time: None,
            creator_user_id: creator_user_id.into(),
            role: Role::classify(&raw_tag),
            raw_tag,
            status_code: status_code.into(),
            division_id: None,
            division_name: None,
            estate: None,
            bunches: Bunches::default(),
            source_row: 0,
        }
    }

    pub fn with_time(mut self, time: NaiveTime) -> Self {
        self.transaction_time = Some(time);
        self
    }

    pub fn with_division(mut self, id: Option<String>, name: Option<String>) -> Self {
        self.division_id = id;
        self.division_name = name;
        self
    }

    pub fn with_estate(mut self, estate: impl Into<String>) -> Self {
        self.estate = Some(estate.into());
        self
    }

    pub fn with_bunches(mut self, bunches: Bunches) -> Self {
        self.bunches = bunches;
        self
    }

    pub fn with_source_row(mut self, row: usize) -> Self {
        self.source_row = row;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn raw_tag(&self) -> &str {
        &self.raw_tag
    }

    /// Division label for roll-ups: name when present, otherwise the id.
    pub fn division_label(&self) -> Option<&str> {
        self.division_name
            .as_deref()
            .or(self.division_id.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn is_keyed(&self) -> bool {
        !self.transaction_no.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Grouping key
// ---------------------------------------------------------------------------

/// Key shared by a creator record and its verifier records.
///
/// `transaction_date` is populated only under [`KeyScheme::NumberAndDate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TransactionKey {
    pub transaction_no: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_date: Option<NaiveDate>,
}

impl TransactionKey {
    pub fn for_record(record: &TransactionRecord, scheme: KeyScheme) -> Self {
        Self {
            transaction_no: record.transaction_no.trim().to_string(),
            transaction_date: match scheme {
                KeyScheme::Number => None,
                KeyScheme::NumberAndDate => Some(record.transaction_date),
            },
        }
    }
}

impl std::fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.transaction_date {
            Some(date) => write!(f, "{}@{}", self.transaction_no, date),
            None => write!(f, "{}", self.transaction_no),
        }
    }
}

// ---------------------------------------------------------------------------
// Verification outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Magnitude {
    None,
    Minor,
    Significant,
}

impl std::fmt::Display for Magnitude {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Minor => write!(f, "minor"),
            Self::Significant => write!(f, "significant"),
        }
    }
}

/// Classification of one transaction group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationOutcome {
    pub transaction_key: TransactionKey,
    pub transaction_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estate: Option<String>,
    pub is_verified: bool,
    pub creator_user_id: Option<String>,
    pub creator_status: Option<String>,
    pub verifier_user_id: Option<String>,
    pub verifier_role: Option<Role>,
    pub verifier_status: Option<String>,
    /// Whether the verifier had to carry the gate status to qualify.
    pub status_gate_applied: bool,
    pub field_differences: BTreeMap<BunchField, f64>,
    pub total_difference: f64,
    pub differing_fields: usize,
    pub magnitude: Magnitude,
    pub is_significant: bool,
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// A recoverable data-quality problem. The run continues with a safe default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconWarning {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_no: Option<String>,
    #[serde(flatten)]
    pub kind: WarningKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WarningKind {
    /// Record excluded from grouping and counted as unkeyed.
    MissingTransactionNo,
    /// Record excluded: no date to key or period-filter on.
    MissingDate,
    /// Record excluded: date present but unreadable.
    UnparseableDate { value: String },
    /// Time dropped, record kept.
    UnparseableTime { value: String },
    /// Field coerced to 0.
    UnparseableNumber { field: BunchField, value: String },
    /// Negative or non-finite value coerced to 0.
    InvalidNumber { field: BunchField, value: String },
    /// Record kept with `Role::Unknown`; it never creates nor verifies.
    UnknownRoleTag { tag: String },
    /// Record excluded: outside the requested period.
    OutOfPeriod { date: NaiveDate },
    /// Record excluded: the CSV row could not be split into the header's fields.
    MalformedRow { message: String },
    /// More than one creator record in a group; the first one is canonical.
    DuplicateCreator {
        transaction_key: String,
        kept_user_id: String,
        ignored_user_id: String,
    },
}

impl std::fmt::Display for ReconWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref source) = self.source {
            write!(f, "{source}")?;
            if let Some(row) = self.row {
                write!(f, ":{row}")?;
            }
            write!(f, ": ")?;
        }
        match &self.kind {
            WarningKind::MissingTransactionNo => write!(f, "missing transaction number, record not grouped"),
            WarningKind::MissingDate => write!(f, "missing transaction date, record excluded"),
            WarningKind::UnparseableDate { value } => {
                write!(f, "cannot parse date '{value}', record excluded")
            }
            WarningKind::UnparseableTime { value } => write!(f, "cannot parse time '{value}', time ignored"),
            WarningKind::UnparseableNumber { field, value } => {
                write!(f, "cannot parse {field} '{value}', using 0")
            }
            WarningKind::InvalidNumber { field, value } => write!(f, "invalid {field} '{value}', using 0"),
            WarningKind::UnknownRoleTag { tag } => write!(f, "unknown role tag '{tag}'"),
            WarningKind::MalformedRow { message } => write!(f, "malformed row ({message}), record excluded"),
            WarningKind::OutOfPeriod { date } => write!(f, "date {date} outside period, record excluded"),
            WarningKind::DuplicateCreator {
                transaction_key,
                kept_user_id,
                ignored_user_id,
            } => write!(
                f,
                "transaction {transaction_key}: duplicate creator record from '{ignored_user_id}', keeping '{kept_user_id}'"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Records ready for reconciliation, with whatever ingestion had to say about them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconInput {
    pub records: Vec<TransactionRecord>,
    pub warnings: Vec<ReconWarning>,
    /// Rows dropped during ingestion (unusable date).
    pub excluded_rows: usize,
}

impl ReconInput {
    pub fn from_records(records: Vec<TransactionRecord>) -> Self {
        Self {
            records,
            warnings: Vec::new(),
            excluded_rows: 0,
        }
    }

    /// Append another source's rows.
    pub fn extend(&mut self, other: ReconInput) {
        self.records.extend(other.records);
        self.warnings.extend(other.warnings);
        self.excluded_rows += other.excluded_rows;
    }
}

// ---------------------------------------------------------------------------
// Employee aggregate
// ---------------------------------------------------------------------------

/// Per-employee statistics accumulated over one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeAggregate {
    pub employee_id: String,
    /// `None` when the id is missing from the lookup; callers pick the fallback label.
    pub employee_name: Option<String>,
    /// Majority role over every row the employee entered, so a pure verifier
    /// reports its verifier role rather than `Unknown`.
    pub role: Role,
    pub division: Option<String>,
    pub estate: Option<String>,
    /// Creator records entered by this employee.
    pub created_count: usize,
    /// Groups this employee created that were verified.
    pub verified_count: usize,
    /// Verified groups this employee created whose difference was significant.
    pub difference_count: usize,
    /// Groups in which this employee was the selected verifier.
    pub verifications_performed: usize,
    pub unique_transaction_count: usize,
    /// Status codes over this employee's creator records.
    pub status_breakdown: BTreeMap<String, usize>,
    /// Tags over every row this employee entered.
    pub role_tag_counts: BTreeMap<Role, usize>,
    #[serde(skip)]
    pub(crate) unique_keys: BTreeSet<TransactionKey>,
    #[serde(skip)]
    pub(crate) division_counts: BTreeMap<String, usize>,
    #[serde(skip)]
    pub(crate) estate_counts: BTreeMap<String, usize>,
}

impl EmployeeAggregate {
    pub fn new(employee_id: impl Into<String>, employee_name: Option<String>) -> Self {
        Self {
            employee_id: employee_id.into(),
            employee_name,
            role: Role::Unknown,
            division: None,
            estate: None,
            created_count: 0,
            verified_count: 0,
            difference_count: 0,
            verifications_performed: 0,
            unique_transaction_count: 0,
            status_breakdown: BTreeMap::new(),
            role_tag_counts: BTreeMap::new(),
            unique_keys: BTreeSet::new(),
            division_counts: BTreeMap::new(),
            estate_counts: BTreeMap::new(),
        }
    }

    /// `verified / created * 100`, 0.0 when nothing was created.
    pub fn verification_rate(&self) -> f64 {
        percentage(self.verified_count, self.created_count)
    }

    /// `difference / verified * 100`, 0.0 when nothing was verified.
    pub fn difference_rate(&self) -> f64 {
        percentage(self.difference_count, self.verified_count)
    }
}

/// `part / whole * 100`, defined as 0.0 on an empty denominator.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

// ---------------------------------------------------------------------------
// Totals + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunTotals {
    pub total_records: usize,
    pub total_groups: usize,
    pub verified_groups: usize,
    pub unverified_groups: usize,
    pub groups_without_creator: usize,
    pub groups_without_verifier: usize,
    pub no_difference: usize,
    pub minor_differences: usize,
    pub significant_differences: usize,
    pub verification_rate: f64,
    pub magnitude_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconMeta {
    pub engine_version: String,
    pub key_scheme: KeyScheme,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_gate: Option<StatusGate>,
    pub significance_threshold: f64,
    pub difference_tolerance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,
    /// Earliest and latest transaction dates that took part in grouping.
    pub observed_from: Option<NaiveDate>,
    pub observed_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub totals: RunTotals,
    pub employees: BTreeMap<String, EmployeeAggregate>,
    pub outcomes: Vec<VerificationOutcome>,
    pub warnings: Vec<ReconWarning>,
    pub unkeyed_records: usize,
    pub excluded_records: usize,
}
