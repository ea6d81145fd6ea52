use std::path::Path;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::classify::VERIFIED_STATUS;
use crate::difference::SIGNIFICANCE_THRESHOLD;
use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    pub name: String,
    #[serde(default)]
    pub policy: Policy,
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub employees: Option<EmployeeSourceConfig>,
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Rules a reconciliation run is evaluated under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    #[serde(default)]
    pub key_scheme: KeyScheme,
    /// When present, verifiers must carry the gate status to count.
    #[serde(default)]
    pub status_gate: Option<StatusGate>,
    #[serde(default = "default_threshold")]
    pub significance_threshold: f64,
    /// Differences with an absolute value at or below this count as equal.
    #[serde(default)]
    pub difference_tolerance: f64,
    #[serde(default)]
    pub period: Option<Period>,
}

fn default_threshold() -> f64 {
    SIGNIFICANCE_THRESHOLD
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            key_scheme: KeyScheme::default(),
            status_gate: None,
            significance_threshold: SIGNIFICANCE_THRESHOLD,
            difference_tolerance: 0.0,
            period: None,
        }
    }
}

impl Policy {
    /// Default policy with the 704 gate switched on for every month, or off.
    pub fn with_status_filter(enabled: bool) -> Self {
        Self {
            status_gate: enabled.then(StatusGate::default),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if !self.significance_threshold.is_finite() || self.significance_threshold < 0.0 {
            return Err(ReconError::InvalidPolicy(format!(
                "significance_threshold must be a finite, non-negative number, got {}",
                self.significance_threshold
            )));
        }
        if !self.difference_tolerance.is_finite() || self.difference_tolerance < 0.0 {
            return Err(ReconError::InvalidPolicy(format!(
                "difference_tolerance must be a finite, non-negative number, got {}",
                self.difference_tolerance
            )));
        }
        if self.difference_tolerance > self.significance_threshold {
            return Err(ReconError::InvalidPolicy(format!(
                "difference_tolerance ({}) exceeds significance_threshold ({})",
                self.difference_tolerance, self.significance_threshold
            )));
        }
        if let Some(ref gate) = self.status_gate {
            gate.validate()?;
        }
        if let Some(ref period) = self.period {
            if period.start > period.end {
                return Err(ReconError::InvalidPolicy(format!(
                    "period start {} is after end {}",
                    period.start, period.end
                )));
            }
        }
        Ok(())
    }

    /// Status a verifier must carry when the gate is active, trimmed.
    pub fn required_status(&self) -> &str {
        self.status_gate
            .as_ref()
            .map(|g| g.status.trim())
            .unwrap_or(VERIFIED_STATUS)
    }
}

/// How records are keyed into groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScheme {
    /// Transaction number only.
    Number,
    /// Transaction number plus transaction date.
    #[default]
    NumberAndDate,
}

impl std::fmt::Display for KeyScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number => write!(f, "number"),
            Self::NumberAndDate => write!(f, "number_and_date"),
        }
    }
}

/// Extra verification requirement on the verifier's status code.
///
/// With `months` set, the gate only applies to transactions dated in one of
/// those calendar months (1-12); otherwise it applies to every transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusGate {
    #[serde(default = "default_gate_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub months: Option<Vec<u32>>,
}

fn default_gate_status() -> String {
    VERIFIED_STATUS.to_string()
}

impl Default for StatusGate {
    fn default() -> Self {
        Self {
            status: default_gate_status(),
            months: None,
        }
    }
}

impl StatusGate {
    pub fn for_months(months: impl Into<Vec<u32>>) -> Self {
        Self {
            months: Some(months.into()),
            ..Self::default()
        }
    }

    pub fn applies_to(&self, date: NaiveDate) -> bool {
        match self.months {
            Some(ref months) => months.contains(&date.month()),
            None => true,
        }
    }

    fn validate(&self) -> Result<(), ReconError> {
        if self.status.trim().is_empty() {
            return Err(ReconError::InvalidPolicy("status_gate.status must not be empty".into()));
        }
        if let Some(ref months) = self.months {
            if months.is_empty() {
                return Err(ReconError::InvalidPolicy(
                    "status_gate.months must list at least one month (omit it to gate every month)".into(),
                ));
            }
            if let Some(bad) = months.iter().find(|m| !(1..=12).contains(*m)) {
                return Err(ReconError::InvalidPolicy(format!(
                    "status_gate.months: {bad} is not a month (1-12)"
                )));
            }
        }
        Ok(())
    }
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub file: String,
    /// Label used in warnings; defaults to the file name.
    #[serde(default)]
    pub name: Option<String>,
    /// Estate assigned to rows that carry no estate column value.
    #[serde(default)]
    pub estate: Option<String>,
    #[serde(default)]
    pub columns: ColumnMapping,
}

impl SourceConfig {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.file)
    }
}

/// Header names for each logical field. Defaults follow the scanner export.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub transaction_no: String,
    pub transaction_date: String,
    pub transaction_time: String,
    pub user_id: String,
    pub role_tag: String,
    pub status: String,
    pub division_id: String,
    pub division_name: String,
    pub estate: String,
    pub ripe: String,
    pub unripe: String,
    pub black: String,
    pub rotten: String,
    pub long_stalk: String,
    pub rat_damaged: String,
    pub loose_fruit: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            transaction_no: "TRANSNO".into(),
            transaction_date: "TRANSDATE".into(),
            transaction_time: "TRANSTIME".into(),
            user_id: "SCANUSERID".into(),
            role_tag: "RECORDTAG".into(),
            status: "TRANSSTATUS".into(),
            division_id: "DIVID".into(),
            division_name: "DIVNAME".into(),
            estate: "ESTATE".into(),
            ripe: "RIPEBCH".into(),
            unripe: "UNRIPEBCH".into(),
            black: "BLACKBCH".into(),
            rotten: "ROTTENBCH".into(),
            long_stalk: "LONGSTALKBCH".into(),
            rat_damaged: "RATDMGBCH".into(),
            loose_fruit: "LOOSEFRUIT".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmployeeSourceConfig {
    pub file: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_name_column")]
    pub name_column: String,
}

fn default_id_column() -> String {
    "EMPID".into()
}

fn default_name_column() -> String {
    "EMPNAME".into()
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ReconError> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| ReconError::Io(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&input)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.name.trim().is_empty() {
            return Err(ReconError::ConfigValidation("name must not be empty".into()));
        }

        if self.sources.is_empty() {
            return Err(ReconError::ConfigValidation(
                "at least one [[sources]] entry is required".into(),
            ));
        }

        for (i, source) in self.sources.iter().enumerate() {
            if source.file.trim().is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "sources[{i}]: file must not be empty"
                )));
            }
        }

        if let Some(ref employees) = self.employees {
            if employees.file.trim().is_empty() {
                return Err(ReconError::ConfigValidation(
                    "employees.file must not be empty".into(),
                ));
            }
        }

        self.policy.validate()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
