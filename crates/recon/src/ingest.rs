//! Ingestion boundary: raw rows in, [`TransactionRecord`]s and warnings out.
//!
//! Rows are read through [`RowAccess`], a named-field accessor, so the engine
//! never depends on a particular column order or storage format. Per-row data
//! problems never fail ingestion; they become [`ReconWarning`]s and the value
//! falls back to a safe default. Only structural problems (a required column
//! missing from a CSV header, unreadable CSV) are errors.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::config::ColumnMapping;
use crate::error::ReconError;
use crate::model::{BunchField, Bunches, ReconInput, ReconWarning, TransactionRecord, WarningKind};
use crate::role::Role;

// ---------------------------------------------------------------------------
// Row access
// ---------------------------------------------------------------------------

/// Logical fields the engine reads from a raw row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowField {
    TransactionNo,
    TransactionDate,
    TransactionTime,
    UserId,
    RoleTag,
    Status,
    DivisionId,
    DivisionName,
    Estate,
    Bunch(BunchField),
}

/// Named-field access to one raw row. `None` means the field is absent.
pub trait RowAccess {
    fn field(&self, field: RowField) -> Option<&str>;
}

/// Owned row, for in-memory fixtures and database adapters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    values: HashMap<RowField, String>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: RowField, value: impl Into<String>) -> Self {
        self.values.insert(field, value.into());
        self
    }

    pub fn bunch(self, field: BunchField, value: impl Into<String>) -> Self {
        self.set(RowField::Bunch(field), value)
    }
}

impl RowAccess for RawRow {
    fn field(&self, field: RowField) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }
}

/// A CSV record viewed through resolved header positions.
struct CsvRow<'a> {
    record: &'a csv::StringRecord,
    positions: &'a HashMap<RowField, usize>,
}

impl RowAccess for CsvRow<'_> {
    fn field(&self, field: RowField) -> Option<&str> {
        self.positions.get(&field).and_then(|&i| self.record.get(i))
    }
}

// ---------------------------------------------------------------------------
// Row → record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Label attached to warnings.
    pub source: String,
    /// Estate for rows that carry none of their own.
    pub default_estate: Option<String>,
}

/// Convert raw rows to records. Never fails.
pub fn ingest_rows<I, R>(rows: I, options: &IngestOptions) -> ReconInput
where
    I: IntoIterator<Item = R>,
    R: RowAccess,
{
    let mut input = ReconInput::default();
    for (i, row) in rows.into_iter().enumerate() {
        push_row(&mut input, &row, i + 1, options);
    }
    log_ingested(&input, options);
    input
}

fn push_row<R: RowAccess>(input: &mut ReconInput, row: &R, row_no: usize, options: &IngestOptions) {
    let mut ctx = RowContext {
        options,
        row: row_no,
        transaction_no: None,
        warnings: &mut input.warnings,
    };
    match ingest_row(row, &mut ctx) {
        Some(record) => input.records.push(record),
        None => input.excluded_rows += 1,
    }
}

fn log_ingested(input: &ReconInput, options: &IngestOptions) {
    log::debug!(
        "{}: ingested {} records, {} excluded, {} warnings",
        options.source,
        input.records.len(),
        input.excluded_rows,
        input.warnings.len()
    );
}

struct RowContext<'a> {
    options: &'a IngestOptions,
    row: usize,
    transaction_no: Option<String>,
    warnings: &'a mut Vec<ReconWarning>,
}

impl RowContext<'_> {
    fn warn(&mut self, kind: WarningKind) {
        self.warnings.push(ReconWarning {
            source: Some(self.options.source.clone()).filter(|s| !s.is_empty()),
            row: Some(self.row),
            transaction_no: self.transaction_no.clone(),
            kind,
        });
    }
}

fn ingest_row<R: RowAccess>(row: &R, ctx: &mut RowContext<'_>) -> Option<TransactionRecord> {
    let text = |field: RowField| row.field(field).map(str::trim).unwrap_or("");
    let optional = |field: RowField| {
        row.field(field)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let transaction_no = text(RowField::TransactionNo).to_string();
    if transaction_no.is_empty() {
        ctx.warn(WarningKind::MissingTransactionNo);
    } else {
        ctx.transaction_no = Some(transaction_no.clone());
    }

    let date_text = text(RowField::TransactionDate);
    if date_text.is_empty() {
        ctx.warn(WarningKind::MissingDate);
        return None;
    }
    let Some((transaction_date, time_from_date)) = parse_date(date_text) else {
        ctx.warn(WarningKind::UnparseableDate {
            value: date_text.to_string(),
        });
        return None;
    };

    let time_text = text(RowField::TransactionTime);
    let transaction_time = if time_text.is_empty() {
        time_from_date
    } else {
        match parse_time(time_text) {
            Some(t) => Some(t),
            None => {
                ctx.warn(WarningKind::UnparseableTime {
                    value: time_text.to_string(),
                });
                time_from_date
            }
        }
    };

    let raw_tag = text(RowField::RoleTag);
    if Role::classify(raw_tag) == Role::Unknown {
        ctx.warn(WarningKind::UnknownRoleTag {
            tag: raw_tag.to_string(),
        });
    }

    let mut bunches = Bunches::default();
    for field in BunchField::ALL {
        bunches.set(field, parse_count(text(RowField::Bunch(field)), field, ctx));
    }

    let mut record = TransactionRecord::new(
        transaction_no,
        transaction_date,
        text(RowField::UserId),
        raw_tag,
        text(RowField::Status),
    )
    .with_division(optional(RowField::DivisionId), optional(RowField::DivisionName))
    .with_bunches(bunches)
    .with_source_row(ctx.row);

    record.transaction_time = transaction_time;
    record.estate = optional(RowField::Estate).or_else(|| ctx.options.default_estate.clone());

    Some(record)
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
];
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S%.f", "%H:%M"];

/// Parse a date, or a timestamp whose time part is returned alongside.
fn parse_date(value: &str) -> Option<(NaiveDate, Option<NaiveTime>)> {
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(value, f).ok())
        .map(|d| (d, None))
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
                .map(|dt| (dt.date(), Some(dt.time())))
        })
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(value, f).ok())
        .or_else(|| parse_date(value).and_then(|(_, t)| t))
}

/// Bunch count; blanks are 0, anything unusable is 0 with a warning.
fn parse_count(value: &str, field: BunchField, ctx: &mut RowContext<'_>) -> f64 {
    if value.is_empty() {
        return 0.0;
    }
    match value.parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 => n,
        Ok(_) => {
            ctx.warn(WarningKind::InvalidNumber {
                field,
                value: value.to_string(),
            });
            0.0
        }
        Err(_) => {
            ctx.warn(WarningKind::UnparseableNumber {
                field,
                value: value.to_string(),
            });
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Load a scanner CSV export, resolving columns by header name.
///
/// Header matching ignores case and surrounding whitespace. Time, division and
/// estate columns are optional; every other mapped column must be present.
/// A data row whose field count differs from the header's is excluded with a
/// [`WarningKind::MalformedRow`]; only an unreadable header is an error.
pub fn load_csv_rows(
    source: &str,
    csv_data: &str,
    columns: &ColumnMapping,
    default_estate: Option<&str>,
) -> Result<ReconInput, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());

    let csv_err = |e: csv::Error| ReconError::Csv {
        source: source.into(),
        message: e.to_string(),
    };

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_ascii_uppercase())
        .collect();

    let find = |name: &str| {
        let wanted = name.trim().to_ascii_uppercase();
        headers.iter().position(|h| *h == wanted)
    };

    let mut required: Vec<(RowField, &str)> = vec![
        (RowField::TransactionNo, columns.transaction_no.as_str()),
        (RowField::TransactionDate, columns.transaction_date.as_str()),
        (RowField::UserId, columns.user_id.as_str()),
        (RowField::RoleTag, columns.role_tag.as_str()),
        (RowField::Status, columns.status.as_str()),
    ];
    for field in BunchField::ALL {
        required.push((RowField::Bunch(field), bunch_column(columns, field)));
    }
    let optional: [(RowField, &str); 4] = [
        (RowField::TransactionTime, columns.transaction_time.as_str()),
        (RowField::DivisionId, columns.division_id.as_str()),
        (RowField::DivisionName, columns.division_name.as_str()),
        (RowField::Estate, columns.estate.as_str()),
    ];

    let mut positions = HashMap::new();
    for (field, name) in required {
        let idx = find(name).ok_or_else(|| ReconError::MissingColumn {
            source: source.into(),
            column: name.into(),
        })?;
        positions.insert(field, idx);
    }
    for (field, name) in optional {
        if let Some(idx) = find(name) {
            positions.insert(field, idx);
        }
    }

    let options = IngestOptions {
        source: source.into(),
        default_estate: default_estate.map(str::to_string),
    };

    let mut input = ReconInput::default();
    for (i, result) in reader.records().enumerate() {
        let row_no = i + 1;
        let (message, transaction_no) = match result {
            Ok(record) if record.len() == headers.len() => {
                let row = CsvRow {
                    record: &record,
                    positions: &positions,
                };
                push_row(&mut input, &row, row_no, &options);
                continue;
            }
            Ok(record) => {
                let row = CsvRow {
                    record: &record,
                    positions: &positions,
                };
                let transaction_no = row
                    .field(RowField::TransactionNo)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                (
                    format!("expected {} fields, found {}", headers.len(), record.len()),
                    transaction_no,
                )
            }
            Err(e) => (e.to_string(), None),
        };

        input.warnings.push(ReconWarning {
            source: Some(options.source.clone()).filter(|s| !s.is_empty()),
            row: Some(row_no),
            transaction_no,
            kind: WarningKind::MalformedRow { message },
        });
        input.excluded_rows += 1;
    }

    log_ingested(&input, &options);
    Ok(input)
}

fn bunch_column(columns: &ColumnMapping, field: BunchField) -> &str {
    match field {
        BunchField::Ripe => columns.ripe.as_str(),
        BunchField::Unripe => columns.unripe.as_str(),
        BunchField::Black => columns.black.as_str(),
        BunchField::Rotten => columns.rotten.as_str(),
        BunchField::LongStalk => columns.long_stalk.as_str(),
        BunchField::RatDamaged => columns.rat_damaged.as_str(),
        BunchField::LooseFruit => columns.loose_fruit.as_str(),
    }
}

/// Load an employee id → display name lookup. Rows with a blank id are skipped;
/// a blank or missing name leaves the id out so callers fall back to their
/// placeholder.
pub fn load_employee_csv(
    source: &str,
    csv_data: &str,
    id_column: &str,
    name_column: &str,
) -> Result<HashMap<String, String>, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());

    let csv_err = |e: csv::Error| ReconError::Csv {
        source: source.into(),
        message: e.to_string(),
    };

    let headers = reader.headers().map_err(csv_err)?.clone();
    let idx = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| ReconError::MissingColumn {
                source: source.into(),
                column: name.into(),
            })
    };
    let id_idx = idx(id_column)?;
    let name_idx = idx(name_column)?;

    let mut lookup = HashMap::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let id = record.get(id_idx).unwrap_or("").trim();
        let name = record.get(name_idx).unwrap_or("").trim();
        if id.is_empty() || name.is_empty() {
            continue;
        }
        lookup.insert(id.to_string(), name.to_string());
    }

    Ok(lookup)
}
