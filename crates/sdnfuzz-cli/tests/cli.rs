//! Integration tests for CLI commands.
//!
//! Each test writes a superlog into a temp directory and runs the binary
//! against it, with that directory as the project so no stray
//! `sdnfuzz.toml` is picked up.

#![allow(deprecated)] // Command::cargo_bin is deprecated but replacement requires newer assert_cmd

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use test_case::test_case;

const SUPERLOG: &str = concat!(
    r#"{"class":"SwitchFailure","label":"e1","time":[100,0],"dpid":8}"#,
    "\n",
    r#"{"class":"ControlMessageReceive","label":"i2","time":[101,0],"dependent_labels":["e1"],"#,
    r#""dpid":8,"controller_id":["127.0.0.1",6633],"fingerprint":["OFFingerprint",{"type":"echo_request"}]}"#,
    "\n",
    r#"{"class":"WaitTime","label":"e3","time":[102,0],"wait_time":2.5}"#,
    "\n",
    r#"{"class":"SwitchRecovery","label":"e4","time":[105,0],"dpid":8}"#,
    "\n",
    r#"{"class":"CheckInvariants","label":"e5","time":[106,0],"invariant_name":"check_loops"}"#,
    "\n",
);

struct Project {
    dir: TempDir,
}

impl Project {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("Failed to write file");
        path
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn sdnfuzz(&self) -> Command {
        let mut cmd = Command::cargo_bin("sdnfuzz").unwrap();
        cmd.env_remove("RUST_LOG").arg("--project").arg(self.path());
        cmd
    }
}

// ============================================================================
// show / validate
// ============================================================================

#[test]
fn show_counts_families_and_classes() {
    let project = Project::new();
    let superlog = project.file("superlog.json", SUPERLOG);

    project
        .sdnfuzz()
        .arg("show")
        .arg(&superlog)
        .assert()
        .success()
        .stdout(predicate::str::contains("5 event(s): 4 input, 1 internal, 0 report"))
        .stdout(predicate::str::contains("ControlMessageReceive"))
        .stdout(predicate::str::contains("1 event(s) with dependencies"));
}

#[test]
fn show_lists_events_with_dependencies() {
    let project = Project::new();
    let superlog = project.file("superlog.json", SUPERLOG);

    project
        .sdnfuzz()
        .args(["show", "--events"])
        .arg(&superlog)
        .assert()
        .success()
        .stdout(predicate::str::contains("<- e1"));
}

#[test]
fn show_json_is_machine_readable() {
    let project = Project::new();
    let superlog = project.file("superlog.json", SUPERLOG);

    let output = project
        .sdnfuzz()
        .args(["show", "--json"])
        .arg(&superlog)
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["total"], 5);
    assert_eq!(summary["per_class"]["SwitchFailure"], 1);
    assert_eq!(summary["first_time"], serde_json::json!([100, 0]));
}

#[test]
fn validate_accepts_a_well_formed_superlog() {
    let project = Project::new();
    let superlog = project.file("superlog.json", SUPERLOG);

    project
        .sdnfuzz()
        .arg("validate")
        .arg(&superlog)
        .assert()
        .success()
        .stdout(predicate::str::contains("5 event(s)"));
}

#[test]
fn validate_reports_the_malformed_line() {
    let project = Project::new();
    let superlog = project.file(
        "broken.json",
        concat!(
            r#"{"class":"SwitchFailure","label":"e1","time":[1,0],"dpid":8}"#,
            "\n",
            r#"{"class":"LinkFailure","label":"e2","time":[1,0],"start_dpid":8,"start_port_no":3,"end_dpid":15}"#,
            "\n",
        ),
    );

    project
        .sdnfuzz()
        .arg("validate")
        .arg(&superlog)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("line 2"))
        .stderr(predicate::str::contains("end_port_no"));
}

#[test_case("Teleport", "unknown event class" ; "unknown class")]
#[test_case("CheckInvariants", "check_nothing" ; "unknown invariant")]
fn validate_rejects_unknown_names(class: &str, expected: &str) {
    let project = Project::new();
    let record = format!(
        r#"{{"class":"{class}","label":"e1","time":[1,0],"invariant_name":"check_nothing"}}"#
    );
    let superlog = project.file("bad.json", &record);

    project
        .sdnfuzz()
        .arg("validate")
        .arg(&superlog)
        .assert()
        .failure()
        .stderr(predicate::str::contains(expected));
}

// ============================================================================
// prune
// ============================================================================

#[test]
fn prune_writes_the_remaining_events() {
    let project = Project::new();
    let superlog = project.file("superlog.json", SUPERLOG);
    let output = project.path().join("pruned.json");

    project
        .sdnfuzz()
        .arg("prune")
        .arg(&superlog)
        .args(["--drop", "e3,e5", "-o"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("dropped 2 event(s)"));

    let pruned = fs::read_to_string(&output).unwrap();
    assert_eq!(pruned.lines().count(), 3);
    assert!(!pruned.contains("WaitTime"));
    assert!(pruned.contains(r#""label":"e4""#));
}

#[test]
fn prune_refuses_a_depended_upon_event() {
    let project = Project::new();
    let superlog = project.file("superlog.json", SUPERLOG);
    let output = project.path().join("pruned.json");

    project
        .sdnfuzz()
        .arg("prune")
        .arg(&superlog)
        .args(["--drop", "e1", "-o"])
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("i2 depends on it"));

    assert!(!output.exists());
}

#[test]
fn prune_requires_labels() {
    let project = Project::new();
    let superlog = project.file("superlog.json", SUPERLOG);

    project
        .sdnfuzz()
        .arg("prune")
        .arg(&superlog)
        .args(["-o", "out.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

// ============================================================================
// dry-run
// ============================================================================

#[test]
fn dry_run_replays_every_event() {
    let project = Project::new();
    let superlog = project.file("superlog.json", SUPERLOG);

    project
        .sdnfuzz()
        .arg("dry-run")
        .arg(&superlog)
        .assert()
        .success()
        .stdout(predicate::str::contains("replayed 5 event(s)"))
        .stdout(predicate::str::contains("crash_switch"))
        .stdout(predicate::str::contains("skipped 2.5s of waiting"));
}

#[test]
fn dry_run_zero_max_attempts_is_unbounded() {
    let project = Project::new();
    let superlog = project.file("superlog.json", SUPERLOG);

    project
        .sdnfuzz()
        .args(["dry-run", "--max-attempts", "0"])
        .arg(&superlog)
        .assert()
        .success()
        .stdout(predicate::str::contains("replayed 5 event(s)"));
}

#[test]
fn dry_run_fails_on_protocol_violation() {
    let project = Project::new();
    let superlog = project.file(
        "double_block.json",
        concat!(
            r#"{"class":"ControlChannelBlock","label":"e1","time":[1,0],"dpid":3,"controller_id":["127.0.0.1",6633]}"#,
            "\n",
            r#"{"class":"ControlChannelBlock","label":"e2","time":[2,0],"dpid":3,"controller_id":["127.0.0.1",6633]}"#,
            "\n",
        ),
    );

    project
        .sdnfuzz()
        .arg("dry-run")
        .arg(&superlog)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ControlChannelBlock e2"))
        .stderr(predicate::str::contains("protocol violation"));
}

// ============================================================================
// config
// ============================================================================

#[test]
fn config_prints_defaults() {
    let project = Project::new();

    project
        .sdnfuzz()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[replay]"))
        .stdout(predicate::str::contains("retry_interval_ms = 10"));
}

#[test]
fn config_reads_project_file() {
    let project = Project::new();
    project.file("sdnfuzz.toml", "[replay]\nmax_attempts = 12\n");

    project
        .sdnfuzz()
        .args(["config", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""max_attempts": 12"#));
}

#[test]
fn explicit_config_file_is_validated() {
    let project = Project::new();
    let config = project.file("custom.toml", "[replay]\nretry_interval_ms = 0\n");

    project
        .sdnfuzz()
        .arg("--config")
        .arg(&config)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("retry_interval_ms"));
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("sdnfuzz")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dry-run"))
        .stdout(predicate::str::contains("prune"));
}
