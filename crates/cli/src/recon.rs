//! `ffbrecon run` / `ffbrecon validate` — config-driven harvest reconciliation.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use clap::{Subcommand, ValueEnum};
use serde::Serialize;

use ffb_recon::ingest::{load_csv_rows, load_employee_csv};
use ffb_recon::summary::{self, EmployeeSummary, Rollup};
use ffb_recon::{ReconConfig, ReconError, ReconInput, ReconResult, Role};

use crate::exit_codes::{EXIT_RECON_RUNTIME, EXIT_SIGNIFICANT_DIFFS};
use crate::CliError;

#[derive(Subcommand)]
pub enum ReconCommands {
    /// Run reconciliation from a TOML config file
    #[command(after_help = "\
Examples:
  ffbrecon run may.recon.toml
  ffbrecon run may.recon.toml --json
  ffbrecon run may.recon.toml --output result.json
  ffbrecon run may.recon.toml --group-by division --strict")]
    Run {
        /// Path to the .recon.toml config file
        config: PathBuf,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print a roll-up table grouped by role, division or estate
        #[arg(long, value_enum)]
        group_by: Option<GroupBy>,

        /// Exit 5 when any verified transaction has a significant difference
        #[arg(long)]
        strict: bool,
    },

    /// Validate a recon config without running
    #[command(after_help = "\
Examples:
  ffbrecon validate may.recon.toml")]
    Validate {
        /// Path to the .recon.toml config file
        config: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum GroupBy {
    Role,
    Division,
    Estate,
}

pub fn cmd_recon(cmd: ReconCommands) -> Result<(), CliError> {
    match cmd {
        ReconCommands::Run { config, json, output, group_by, strict } => {
            cmd_recon_run(config, json, output, group_by, strict)
        }
        ReconCommands::Validate { config } => cmd_recon_validate(config),
    }
}

/// JSON document written by `run --json` / `--output`.
#[derive(Serialize)]
struct RunOutput<'a> {
    result: &'a ReconResult,
    employees: Vec<EmployeeSummary>,
    rollups: Rollups,
}

#[derive(Serialize)]
struct Rollups {
    by_role: BTreeMap<Role, Rollup>,
    by_division: BTreeMap<String, Rollup>,
    by_estate: BTreeMap<String, Rollup>,
    grand_total: Rollup,
}

impl Rollups {
    fn from_result(result: &ReconResult) -> Self {
        Self {
            by_role: summary::by_role(&result.employees),
            by_division: summary::by_division(&result.employees),
            by_estate: summary::by_estate(&result.employees),
            grand_total: summary::grand_total(&result.employees),
        }
    }
}

fn read_file(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path)
        .map_err(|e| CliError::new(EXIT_RECON_RUNTIME, format!("cannot read {}: {e}", path.display())))
}

/// Load every configured source into one dataset, plus the employee lookup.
/// Relative paths resolve against the config file's directory.
fn load_sources(
    config: &ReconConfig,
    base_dir: &Path,
) -> Result<(ReconInput, HashMap<String, String>), CliError> {
    let mut input = ReconInput::default();
    for source in &config.sources {
        let csv_path = base_dir.join(&source.file);
        let csv_data = read_file(&csv_path)?;
        let rows = load_csv_rows(source.label(), &csv_data, &source.columns, source.estate.as_deref())
            .map_err(|e| {
                let missing_column = matches!(e, ReconError::MissingColumn { .. });
                let err = CliError::from(e);
                if missing_column {
                    err.with_hint("map the header name under [sources.columns] in the config")
                } else {
                    err
                }
            })?;
        tracing::debug!(
            source = source.label(),
            records = rows.records.len(),
            warnings = rows.warnings.len(),
            "loaded source"
        );
        input.extend(rows);
    }

    let employees = match config.employees {
        Some(ref emp) => {
            let path = base_dir.join(&emp.file);
            let data = read_file(&path)?;
            let lookup = load_employee_csv(&emp.file, &data, &emp.id_column, &emp.name_column)?;
            tracing::debug!(employees = lookup.len(), "loaded employee names");
            lookup
        }
        None => HashMap::new(),
    };

    Ok((input, employees))
}

fn cmd_recon_run(
    config_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
    group_by: Option<GroupBy>,
    strict: bool,
) -> Result<(), CliError> {
    let config = ReconConfig::load(&config_path)?;
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    let (input, employees) = load_sources(&config, base_dir)?;
    let result = ffb_recon::run(&input, &employees, &config.policy)?;

    if json_output || output_file.is_some() {
        let doc = RunOutput {
            result: &result,
            employees: summary::employee_summaries(&result),
            rollups: Rollups::from_result(&result),
        };
        let json_str = serde_json::to_string_pretty(&doc)
            .map_err(|e| CliError::new(EXIT_RECON_RUNTIME, format!("JSON serialization error: {e}")))?;

        if let Some(ref path) = output_file {
            std::fs::write(path, &json_str)
                .map_err(|e| CliError::new(EXIT_RECON_RUNTIME, format!("cannot write output: {e}")))?;
            eprintln!("wrote {}", path.display());
        }

        if json_output {
            println!("{json_str}");
        }
    }

    // Human summary to stderr
    print_summary(&config.name, &result);
    print_employees(&result);
    if let Some(group_by) = group_by {
        print_rollups(&result, group_by);
    }

    let significant = result.totals.significant_differences;
    if strict && significant > 0 {
        return Err(CliError::new(
            EXIT_SIGNIFICANT_DIFFS,
            format!("{significant} transaction(s) with significant differences"),
        ));
    }

    Ok(())
}

fn print_summary(name: &str, result: &ReconResult) {
    let t = &result.totals;
    let period = match (result.meta.observed_from, result.meta.observed_to) {
        (Some(from), Some(to)) => format!(" ({from} to {to})"),
        _ => String::new(),
    };
    eprintln!(
        "{name}{period}: {} transactions from {} records, {} verified ({:.2}%), {} unverified",
        t.total_groups, t.total_records, t.verified_groups, t.verification_rate, t.unverified_groups,
    );
    eprintln!(
        "differences: {} none, {} minor, {} significant (threshold {})",
        t.no_difference, t.minor_differences, t.significant_differences, result.meta.significance_threshold,
    );
    if !result.warnings.is_empty() || result.unkeyed_records > 0 || result.excluded_records > 0 {
        eprintln!(
            "data: {} warning(s), {} record(s) without transaction number, {} row(s) excluded",
            result.warnings.len(),
            result.unkeyed_records,
            result.excluded_records,
        );
    }
    for warning in &result.warnings {
        tracing::debug!("{warning}");
    }
}

/// Name shown in reports; unknown employees get a stable placeholder.
fn display_name(row: &EmployeeSummary) -> String {
    row.employee_name
        .clone()
        .unwrap_or_else(|| format!("KARYAWAN-{}", row.employee_id))
}

fn print_employees(result: &ReconResult) {
    let rows = summary::employee_summaries(result);
    if rows.is_empty() {
        return;
    }

    eprintln!();
    eprintln!(
        "{:<10} {:<20} {:<8} {:<12} {:>7} {:>8} {:>7} {:>6} {:>8} {:>7}",
        "ID", "NAME", "ROLE", "DIVISION", "CREATED", "VERIFIED", "RATE%", "DIFF", "DIFF%", "CHECKS"
    );
    for row in &rows {
        eprintln!(
            "{:<10} {:<20} {:<8} {:<12} {:>7} {:>8} {:>7.2} {:>6} {:>8.2} {:>7}",
            row.employee_id,
            display_name(row),
            row.role.title(),
            row.division.as_deref().unwrap_or(summary::UNASSIGNED),
            row.created_count,
            row.verified_count,
            row.verification_rate,
            row.difference_count,
            row.difference_rate,
            row.verifications_performed,
        );
    }
}

fn print_rollups(result: &ReconResult, group_by: GroupBy) {
    let mut table: Vec<(String, Rollup)> = match group_by {
        GroupBy::Role => summary::by_role(&result.employees)
            .into_iter()
            .map(|(role, r)| (role.title().to_string(), r))
            .collect(),
        GroupBy::Division => summary::by_division(&result.employees).into_iter().collect(),
        GroupBy::Estate => summary::by_estate(&result.employees).into_iter().collect(),
    };

    eprintln!();
    eprintln!(
        "{:<14} {:>5} {:>7} {:>8} {:>6} {:>7} {:>8} {:>8}",
        "GROUP", "EMP", "CREATED", "VERIFIED", "DIFF", "CHECKS", "RATE%", "AVG%"
    );
    table.push(("TOTAL".to_string(), summary::grand_total(&result.employees)));
    for (label, r) in &table {
        eprintln!(
            "{:<14} {:>5} {:>7} {:>8} {:>6} {:>7} {:>8.2} {:>8.2}",
            label,
            r.employee_count,
            r.created_count,
            r.verified_count,
            r.difference_count,
            r.verifications_performed,
            r.total_verification_rate,
            r.avg_verification_rate,
        );
    }
}

fn cmd_recon_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = ReconConfig::load(&config_path)?;

    let gate = match config.policy.status_gate {
        Some(ref gate) => match gate.months {
            Some(ref months) => format!("status {} in months {months:?}", gate.status),
            None => format!("status {} in every month", gate.status),
        },
        None => "off".to_string(),
    };

    eprintln!(
        "valid: recon '{}' with {} source(s), key {}, status gate {}",
        config.name,
        config.sources.len(),
        config.policy.key_scheme,
        gate,
    );
    Ok(())
}
