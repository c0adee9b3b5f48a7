//! Integration tests for the axis CLI
//!
//! These tests exercise the CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper to get an axis command isolated from the user's config
fn axis(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("axis").unwrap();
    cmd.current_dir(tmp.path())
        .env("XDG_CONFIG_HOME", tmp.path().join(".config"))
        .env("AXIS_AUTHOR", "qa")
        .env_remove("AXIS_LOG")
        .env_remove("AXIS_BALLOON_RADIUS")
        .env_remove("AXIS_MIN_PICK_SIZE")
        .env_remove("AXIS_UNDO_DEPTH");
    cmd
}

fn drawing(tmp: &TempDir) -> PathBuf {
    tmp.path().join("part.pdf")
}

/// Helper to add a feature and return nothing; ids are sequential from 001
fn add_feature(tmp: &TempDir, rect: &str, tol: Option<&str>, method: &str) {
    let mut cmd = axis(tmp);
    cmd.arg("feat")
        .arg("add")
        .arg(drawing(tmp))
        .args(["--rect", rect, "--method", method]);
    if let Some(tol) = tol {
        cmd.args(["--tol", tol]);
    }
    cmd.assert().success();
}

fn record(tmp: &TempDir, wo: &str, id: &str, value: &str) {
    axis(tmp)
        .arg("rslt")
        .arg("set")
        .arg(drawing(tmp))
        .args(["--wo", wo, id, value])
        .assert()
        .success();
}

// ============================================================================
// CLI Basic Tests
// ============================================================================

#[test]
fn test_help_displays() {
    let tmp = TempDir::new().unwrap();
    axis(&tmp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("inspection results"))
        .stdout(predicate::str::contains("session"));
}

#[test]
fn test_tol_prints_limits() {
    let tmp = TempDir::new().unwrap();
    axis(&tmp)
        .args(["tol", "10 +0.1/-0.05"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nominal\t10\n"))
        .stdout(predicate::str::contains("lsl\t9.95\n"))
        .stdout(predicate::str::contains("usl\t10.1\n"));
}

#[test]
fn test_tol_rejects_garbage() {
    let tmp = TempDir::new().unwrap();
    axis(&tmp)
        .args(["tol", "ten-ish"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized tolerance expression"));
}

#[test]
fn test_completions_generate() {
    let tmp = TempDir::new().unwrap();
    axis(&tmp)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("axis"));
}

// ============================================================================
// Store lifecycle
// ============================================================================

#[test]
fn test_init_creates_store() {
    let tmp = TempDir::new().unwrap();
    axis(&tmp)
        .arg("init")
        .arg(drawing(&tmp))
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"))
        .stdout(predicate::str::contains("0 feature(s)"));
    assert!(tmp.path().join("part.pdf.axis.db").is_file());

    axis(&tmp)
        .arg("init")
        .arg(drawing(&tmp))
        .assert()
        .success()
        .stdout(predicate::str::contains("already present"));

    let conn = rusqlite::Connection::open(tmp.path().join("part.pdf.axis.db")).unwrap();
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap();
    assert_eq!(version, axis::core::store::SCHEMA_VERSION);
}

#[test]
fn test_init_imports_legacy_files_once() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("part.pdf.balloons.csv"),
        "id,page,x,y,w,h,method,nominal,lsl,usl\n\
         007,1,10,10,20,20,Caliper,5,4.9,5.1\n\
         009,2,40,40,20,20,CMM,,,\n",
    )
    .unwrap();
    fs::write(
        tmp.path().join("part.pdf.WO1.csv"),
        "id,result\n007,5.05\n042,1.0\n",
    )
    .unwrap();

    axis(&tmp)
        .arg("init")
        .arg(drawing(&tmp))
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported legacy"))
        .stdout(predicate::str::contains("2 feature(s), 1 work order(s)"))
        .stdout(predicate::str::contains("1 legacy result row(s)"));

    axis(&tmp)
        .args(["feat", "list", "-f", "id"])
        .arg(drawing(&tmp))
        .assert()
        .success()
        .stdout("007\n009\n");

    // new ids continue after the highest legacy id
    add_feature(&tmp, "0,0,10,10", None, "Visual");
    axis(&tmp)
        .args(["feat", "list", "--page", "1", "-f", "id"])
        .arg(drawing(&tmp))
        .assert()
        .success()
        .stdout("007\n010\n");

    // legacy files are not read again once the store exists
    fs::write(
        tmp.path().join("part.pdf.WO2.csv"),
        "id,result\n007,5.0\n",
    )
    .unwrap();
    axis(&tmp)
        .args(["rslt", "orders", "-f", "id"])
        .arg(drawing(&tmp))
        .assert()
        .success()
        .stdout("WO1\n");
}

#[test]
fn test_malformed_legacy_file_leaves_no_store() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("part.pdf.balloons.csv"),
        "id,page,x,y,w,h\n001,1,ten,0,10,10\n",
    )
    .unwrap();

    axis(&tmp)
        .arg("init")
        .arg(drawing(&tmp))
        .assert()
        .failure()
        .stderr(predicate::str::contains("legacy import failed"));
    assert!(!tmp.path().join("part.pdf.axis.db").exists());
    assert!(!tmp.path().join("part.pdf.axis.db.partial").exists());
}

// ============================================================================
// Features and results
// ============================================================================

#[test]
fn test_feature_crud() {
    let tmp = TempDir::new().unwrap();
    add_feature(&tmp, "10,10,20,20", Some("1.25 ±0.05"), "Caliper");

    axis(&tmp)
        .args(["feat", "show", "-f", "json"])
        .arg(drawing(&tmp))
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"lsl\": 1.2"))
        .stdout(predicate::str::contains("\"author\": \"qa\""));

    axis(&tmp)
        .args(["feat", "set"])
        .arg(drawing(&tmp))
        .args(["001", "--usl", "1.4", "--method", "CMM"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1.25 [1.2 .. 1.4]"));

    axis(&tmp)
        .args(["feat", "set"])
        .arg(drawing(&tmp))
        .arg("1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to change"));

    record(&tmp, "WO1", "1", "1.3");
    axis(&tmp)
        .args(["feat", "delete", "--yes"])
        .arg(drawing(&tmp))
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted feature 001 (1 result(s))"));

    axis(&tmp)
        .args(["feat", "list", "--count"])
        .arg(drawing(&tmp))
        .assert()
        .success()
        .stdout("0\n");

    // ids are never reused
    add_feature(&tmp, "10,10,20,20", None, "Caliper");
    axis(&tmp)
        .args(["feat", "list", "-f", "id"])
        .arg(drawing(&tmp))
        .assert()
        .success()
        .stdout("002\n");
}

#[test]
fn test_local_default_format_applies_to_listings() {
    let tmp = TempDir::new().unwrap();
    add_feature(&tmp, "10,10,20,20", Some("1.25 ±0.05"), "Caliper");
    fs::write(tmp.path().join("axis.yaml"), "default_format: json\n").unwrap();

    axis(&tmp)
        .args(["feat", "list"])
        .arg(drawing(&tmp))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"lsl\": 1.2"));

    // an explicit flag still wins
    axis(&tmp)
        .args(["feat", "list", "-f", "id"])
        .arg(drawing(&tmp))
        .assert()
        .success()
        .stdout(predicate::str::diff("001\n"));
}

#[test]
fn test_small_pick_is_rejected() {
    let tmp = TempDir::new().unwrap();
    axis(&tmp)
        .args(["feat", "add"])
        .arg(drawing(&tmp))
        .args(["--rect", "0,0,2,2"])
        .assert()
        .failure();
    axis(&tmp)
        .args(["feat", "list", "--count"])
        .arg(drawing(&tmp))
        .assert()
        .success()
        .stdout("0\n");
}

#[test]
fn test_result_for_unknown_feature_fails() {
    let tmp = TempDir::new().unwrap();
    axis(&tmp)
        .args(["rslt", "set"])
        .arg(drawing(&tmp))
        .args(["--wo", "WO1", "5", "1.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("feature 005 not found"));
}

#[test]
fn test_result_history_keeps_superseded_values() {
    let tmp = TempDir::new().unwrap();
    add_feature(&tmp, "10,10,20,20", Some("5 ±0.1"), "Caliper");
    record(&tmp, "WO1", "1", "5.3");
    record(&tmp, "WO1", "1", "5.05");

    axis(&tmp)
        .args(["rslt", "history"])
        .arg(drawing(&tmp))
        .args(["--wo", "WO1", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("001 = 5.05 PASS"))
        .stdout(predicate::str::contains("5.3"));
}

#[test]
fn test_reset_work_order() {
    let tmp = TempDir::new().unwrap();
    add_feature(&tmp, "10,10,20,20", None, "Visual");
    record(&tmp, "SN-7", "1", "p");

    axis(&tmp)
        .args(["rslt", "reset", "--yes"])
        .arg(drawing(&tmp))
        .args(["--wo", "SN-7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 result(s)"));

    axis(&tmp)
        .args(["rslt", "reset", "--yes"])
        .arg(drawing(&tmp))
        .args(["--wo", "SN-7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no results"));
}

// ============================================================================
// Exports and reports
// ============================================================================

#[test]
fn test_export_filtered_rows() {
    let tmp = TempDir::new().unwrap();
    add_feature(&tmp, "10,10,20,20", Some("1.25 ±0.05"), "Caliper");
    add_feature(&tmp, "40,10,20,20", None, "CMM");
    add_feature(&tmp, "70,10,20,20", Some("3 +0.2/-0.1"), "Caliper");
    record(&tmp, "WO1", "1", "1.22");
    record(&tmp, "WO1", "2", "f");
    record(&tmp, "WO1", "3", "3.5");

    let output = axis(&tmp)
        .arg("export")
        .arg(drawing(&tmp))
        .args(["--wo", "WO1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    insta::assert_snapshot!(String::from_utf8_lossy(&output.stdout), @r"
    ID,Page,Method,Result,Nominal,LSL,USL,Status
    001,1,Caliper,1.22,1.25,1.2,1.3,PASS
    002,1,CMM,Fail,,,,FAIL
    003,1,Caliper,3.5,3,2.9,3.2,FAIL
    ");

    let out_file = tmp.path().join("fails.csv");
    axis(&tmp)
        .arg("export")
        .arg(drawing(&tmp))
        .args(["--wo", "WO1", "--status", "fail", "--method", "calip", "-o"])
        .arg(&out_file)
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(&out_file).unwrap(),
        "ID,Page,Method,Result,Nominal,LSL,USL,Status\n003,1,Caliper,3.5,3,2.9,3.2,FAIL\n"
    );
}

#[test]
fn test_export_all_results() {
    let tmp = TempDir::new().unwrap();
    add_feature(&tmp, "10,10,20,20", Some("5 ±0.1"), "Caliper");
    record(&tmp, "WO2", "1", "5.2");
    record(&tmp, "WO1", "1", "5.0");

    let output = axis(&tmp)
        .arg("export")
        .arg(drawing(&tmp))
        .arg("--all")
        .output()
        .unwrap();
    assert!(output.status.success());
    let csv = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("Work Order,ID,Page"));
    assert!(lines[1].starts_with("WO1,001,1,Caliper,5.0,5,4.9,5.1,PASS,"));
    assert!(lines[2].starts_with("WO2,001,1,Caliper,5.2,5,4.9,5.1,FAIL,"));
}

#[test]
fn test_export_requires_work_order_or_all() {
    let tmp = TempDir::new().unwrap();
    axis(&tmp)
        .arg("export")
        .arg(drawing(&tmp))
        .assert()
        .failure();
}

#[test]
fn test_spc_report() {
    let tmp = TempDir::new().unwrap();
    add_feature(&tmp, "10,10,20,20", Some("5 ±0.3"), "Caliper");
    record(&tmp, "WO1", "1", "5.0");
    record(&tmp, "WO2", "1", "5.1");
    record(&tmp, "WO3", "1", "4.9");

    axis(&tmp)
        .arg("spc")
        .arg(drawing(&tmp))
        .assert()
        .success()
        .stdout(predicate::str::contains("# SPC Report: part.pdf"))
        .stdout(predicate::str::contains("| 001"))
        .stdout(predicate::str::contains("1 feature(s) with data"));
}

// ============================================================================
// Session
// ============================================================================

#[test]
fn test_session_script_with_undo() {
    let tmp = TempDir::new().unwrap();
    axis(&tmp)
        .arg("session")
        .arg(drawing(&tmp))
        .write_stdin(
            "pick 1 10,10,20,20\n\
             tol 1 5 ±0.1\n\
             method 1 Caliper\n\
             undo\n\
             undo\n\
             redo\n\
             mode inspect WO1\n\
             result 1 5.3\n\
             frobnicate\n\
             rows\n",
        )
        .assert()
        .success()
        .stdout(predicate::str::contains("created 001 on page 1"))
        .stdout(predicate::str::contains("undid edit feature 001"))
        .stdout(predicate::str::contains("redid edit feature 001"))
        .stdout(predicate::str::contains("001 = 5.3 FAIL"))
        .stdout(predicate::str::contains("unknown command 'frobnicate'"));

    // the session's edits are committed to the store
    axis(&tmp)
        .args(["feat", "show", "-f", "json"])
        .arg(drawing(&tmp))
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"usl\": 5.1"))
        .stdout(predicate::str::contains("\"method\": \"\""));
}
