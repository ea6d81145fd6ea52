// End-to-end tests for `ffbrecon run` / `ffbrecon validate`.
// Run with: cargo test -p ffb-recon-cli --test cli_tests -- --nocapture
//
// Uses the engine crate's May fixture (6 transactions, 1 significant difference).

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn ffbrecon() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ffbrecon"));
    cmd.current_dir(env!("CARGO_MANIFEST_DIR"));
    cmd
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(format!("../recon/tests/fixtures/{}", name))
}

fn run(args: &[&str]) -> Output {
    ffbrecon().args(args).output().expect("spawn ffbrecon")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Assert stdout is a single, parseable JSON value.
fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let trimmed = stdout.trim();
    assert!(!trimmed.is_empty(), "stdout should not be empty");
    serde_json::from_str(trimmed)
        .unwrap_or_else(|e| panic!("stdout must be valid JSON.\nParse error: {}\nstdout:\n{}", e, trimmed))
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("test.recon.toml");
    std::fs::write(&path, body).unwrap();
    path
}

// ===========================================================================
// ffbrecon run
// ===========================================================================

#[test]
fn run_json_has_result_employees_and_rollups() {
    let config = fixture("may.recon.toml");
    let output = run(&["run", config.to_str().unwrap(), "--json"]);
    assert!(output.status.success(), "exit: {:?}\nstderr: {}", output.status, stderr(&output));

    let val = stdout_json(&output);
    assert_eq!(val["result"]["totals"]["total_groups"], 6);
    assert_eq!(val["result"]["totals"]["verified_groups"], 4);
    assert_eq!(val["result"]["totals"]["significant_differences"], 1);
    assert_eq!(val["result"]["meta"]["key_scheme"], "number_and_date");

    let employees = val["employees"].as_array().unwrap();
    assert_eq!(employees.len(), 4);
    assert_eq!(employees[0]["employee_id"], "101");
    assert_eq!(employees[0]["employee_name"], "ANI");
    assert_eq!(employees[0]["created_count"], 3);

    assert_eq!(val["rollups"]["by_role"]["creator"]["created_count"], 6);
    assert_eq!(val["rollups"]["by_division"]["AFD 2"]["employee_count"], 2);
    assert_eq!(val["rollups"]["by_estate"]["PGE 2B"]["employee_count"], 4);
    assert_eq!(val["rollups"]["grand_total"]["verifications_performed"], 4);
}

#[test]
fn run_prints_human_summary_to_stderr() {
    let config = fixture("may.recon.toml");
    let output = run(&["run", config.to_str().unwrap(), "--group-by", "division"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(output.stdout.is_empty(), "no JSON without --json");

    let err = stderr(&output);
    assert!(err.contains("PGE 2B May 2025 (2025-05-02 to 2025-05-04)"), "stderr: {err}");
    assert!(err.contains("6 transactions from 12 records, 4 verified (66.67%)"), "stderr: {err}");
    assert!(err.contains("2 none, 1 minor, 1 significant"), "stderr: {err}");
    assert!(err.contains("KARYAWAN-303"), "unnamed employee placeholder: {err}");
    assert!(err.contains("CAHYO"));
    assert!(err.contains("AFD 1"));
    assert!(err.contains("TOTAL"));
}

#[test]
fn run_strict_fails_on_significant_differences() {
    let config = fixture("may.recon.toml");
    let output = run(&["run", config.to_str().unwrap(), "--strict"]);
    assert_eq!(output.status.code(), Some(5), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("1 transaction(s) with significant differences"));
}

#[test]
fn run_writes_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("result.json");
    let config = fixture("may.recon.toml");
    let output = run(&["run", config.to_str().unwrap(), "--output", out.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("wrote"));

    let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written["result"]["totals"]["total_records"], 12);
    assert_eq!(written["result"]["unkeyed_records"], 1);
}

#[test]
fn run_merges_sources_and_resolves_paths_from_config_dir() {
    let dir = tempfile::tempdir().unwrap();
    let header = "TRANSNO,TRANSDATE,SCANUSERID,RECORDTAG,TRANSSTATUS,DIVNAME,RIPEBCH,UNRIPEBCH,BLACKBCH,ROTTENBCH,LONGSTALKBCH,RATDMGBCH,LOOSEFRUIT";
    std::fs::write(
        dir.path().join("a.csv"),
        format!("{header}\nT1,2025-06-01,101,PM,731,AFD 1,50,0,0,0,0,0,0\n"),
    )
    .unwrap();
    std::fs::write(
        dir.path().join("b.csv"),
        format!("{header}\nT1,2025-06-01,202,P1,704,AFD 1,57,0,0,0,0,0,0\n"),
    )
    .unwrap();
    let config = write_config(
        dir.path(),
        r#"
name = "June"

[[sources]]
file = "a.csv"
estate = "PGE 1A"

[[sources]]
file = "b.csv"
estate = "PGE 1A"
"#,
    );

    let output = run(&["run", config.to_str().unwrap(), "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let val = stdout_json(&output);
    assert_eq!(val["result"]["totals"]["total_groups"], 1);
    assert_eq!(val["result"]["outcomes"][0]["total_difference"], 7.0);
    assert_eq!(val["result"]["outcomes"][0]["magnitude"], "significant");
    assert_eq!(val["result"]["outcomes"][0]["estate"], "PGE 1A");
}

#[test]
fn run_survives_ragged_rows() {
    let dir = tempfile::tempdir().unwrap();
    let header = "TRANSNO,TRANSDATE,SCANUSERID,RECORDTAG,TRANSSTATUS,RIPEBCH,UNRIPEBCH,BLACKBCH,ROTTENBCH,LONGSTALKBCH,RATDMGBCH,LOOSEFRUIT";
    std::fs::write(
        dir.path().join("ragged.csv"),
        format!(
            "{header}\nT1,2025-06-01,101,PM,731,50,0,0,0,0,0,0\nT1,2025-06-01,202,P1,704,50,0,0,0,0,0,0\nT2,2025-06-01,101,PM,731,40\n"
        ),
    )
    .unwrap();
    let config = write_config(dir.path(), "name = \"ragged\"\n[[sources]]\nfile = \"ragged.csv\"\n");

    let output = run(&["run", config.to_str().unwrap(), "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let val = stdout_json(&output);
    assert_eq!(val["result"]["totals"]["verified_groups"], 1);
    assert_eq!(val["result"]["excluded_records"], 1);
    assert_eq!(val["result"]["warnings"][0]["kind"], "malformed_row");
    assert_eq!(val["result"]["warnings"][0]["transaction_no"], "T2");
}

// ===========================================================================
// Errors and exit codes
// ===========================================================================

#[test]
fn invalid_policy_exits_3() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
name = "bad"
[policy]
significance_threshold = -1.0
[[sources]]
file = "x.csv"
"#,
    );
    let output = run(&["run", config.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(3), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("significance_threshold"));
}

#[test]
fn unknown_policy_key_exits_3() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "name = \"x\"\n[policy]\nthreshold = 5\n[[sources]]\nfile = \"x.csv\"\n");
    let output = run(&["validate", config.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(3), "stderr: {}", stderr(&output));
}

#[test]
fn missing_source_file_exits_4() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "name = \"x\"\n[[sources]]\nfile = \"nope.csv\"\n");
    let output = run(&["run", config.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(4), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("nope.csv"));
}

#[test]
fn missing_column_exits_4_with_hint() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("short.csv"), "TRANSNO,TRANSDATE\nT1,2025-06-01\n").unwrap();
    let config = write_config(dir.path(), "name = \"x\"\n[[sources]]\nfile = \"short.csv\"\n");
    let output = run(&["run", config.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(4), "stderr: {}", stderr(&output));
    let err = stderr(&output);
    assert!(err.contains("SCANUSERID"), "stderr: {err}");
    assert!(err.contains("hint:"), "stderr: {err}");
}

#[test]
fn bad_group_by_is_a_usage_error() {
    let config = fixture("may.recon.toml");
    let output = run(&["run", config.to_str().unwrap(), "--group-by", "mandor"]);
    assert_eq!(output.status.code(), Some(2));
}

// ===========================================================================
// ffbrecon validate
// ===========================================================================

#[test]
fn validate_reports_config_shape() {
    let config = fixture("may.recon.toml");
    let output = run(&["validate", config.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let err = stderr(&output);
    assert!(err.contains("valid: recon 'PGE 2B May 2025' with 1 source(s)"), "stderr: {err}");
    assert!(err.contains("status 704 in months [5]"), "stderr: {err}");
}
