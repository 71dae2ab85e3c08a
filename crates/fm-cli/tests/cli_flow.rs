//! End-to-end tests driving the `fm` binary.
//!
//! Each test writes a config pointing at a temp database and a reading file,
//! then runs commands the way a scheduler or shell pipeline would.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use serde_json::Value;
use tempfile::TempDir;

fn fm_binary() -> String {
    env!("CARGO_BIN_EXE_fm").to_string()
}

struct Setup {
    temp: TempDir,
    config: PathBuf,
    reading: PathBuf,
}

impl Setup {
    fn new(extra: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let reading = temp.path().join("reading");
        let config = temp.path().join("config.toml");
        let toml = format!(
            r#"
name = "office"
database_path = "{db}"
timezone = "Europe/Amsterdam"

[source]
type = "file"
path = "{reading}"

[[meters]]
name = "year"
period = "year"
{extra}
"#,
            db = temp.path().join("data").join("fm.db").display(),
            reading = reading.display(),
        );
        std::fs::write(&config, toml).unwrap();
        Self {
            temp,
            config,
            reading,
        }
    }

    fn set_reading(&self, value: &str) {
        std::fs::write(&self.reading, format!("{value}\n")).unwrap();
    }

    fn command(&self) -> Command {
        let mut command = Command::new(fm_binary());
        command
            .env("HOME", self.temp.path())
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(&self.config);
        command
    }

    fn run(&self, args: &[&str]) -> Output {
        let output = self.command().args(args).output().unwrap();
        assert!(
            output.status.success(),
            "fm {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        output
    }

    fn status_json(&self) -> Value {
        let output = self.run(&["status", "--json"]);
        serde_json::from_slice(&output.stdout).unwrap()
    }

    fn path(&self) -> &Path {
        self.temp.path()
    }
}

#[test]
fn test_ticks_accumulate_and_persist() {
    let setup = Setup::new("");

    // Nothing readable yet: the update is skipped and nothing is stored.
    let output = setup.run(&["tick"]);
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("update skipped"));
    assert_eq!(setup.status_json(), Value::Null);

    setup.set_reading("100");
    setup.run(&["tick"]);
    setup.set_reading("107.5");
    let output = setup.run(&["tick"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("office_year: 7.500 [measuring]"), "{stdout}");

    let state = setup.status_json();
    assert_eq!(state["version"], 1);
    assert_eq!(state["status"], "measuring");
    assert_eq!(state["office_year"]["measured_value"], 7.5);
    assert_eq!(state["office_year"]["session_start_input_value"], 100.0);
    assert!(setup.path().join("data").join("fm.db.office.lock").exists());

    // A fresh process has no earlier reading to fall back on, so the update
    // is skipped and the stored totals stay as they were.
    setup.set_reading("unavailable");
    setup.run(&["tick"]);
    assert_eq!(setup.status_json()["office_year"]["measured_value"], 7.5);
}

#[test]
fn test_condition_command_gates_measuring() {
    let setup = Setup::new("");
    let output = setup.command().args(["condition", "on"]).output().unwrap();
    assert!(
        !output.status.success(),
        "condition should be rejected without a configured condition"
    );

    let setup = Setup::new("");
    std::fs::write(
        &setup.config,
        std::fs::read_to_string(&setup.config)
            .unwrap()
            .replacen("[source]", "condition = true\n\n[source]", 1),
    )
    .unwrap();

    setup.set_reading("10");
    setup.run(&["condition", "on"]);
    setup.set_reading("14");
    let output = setup.run(&["condition", "off"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("office (inactive)"), "{stdout}");

    setup.set_reading("20");
    setup.run(&["tick"]);

    let state = setup.status_json();
    assert_eq!(state["status"], "inactive");
    assert_eq!(state["office_year"]["state"], "waiting_for_condition");
    assert_eq!(state["office_year"]["measured_value"], 4.0);
}

#[test]
fn test_run_reads_conditions_until_eof() {
    let setup = Setup::new("");
    std::fs::write(
        &setup.config,
        std::fs::read_to_string(&setup.config)
            .unwrap()
            .replacen("[source]", "condition = true\nheartbeat_secs = 3600\n\n[source]", 1),
    )
    .unwrap();
    setup.set_reading("5");

    let mut child = setup
        .command()
        .arg("run")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"on\noff\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(
        output.status.success(),
        "fm run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let state = setup.status_json();
    assert_eq!(state["status"], "inactive");
    assert_eq!(state["office_year"]["state"], "waiting_for_condition");
}

#[test]
fn test_status_text_and_periods() {
    let setup = Setup::new(
        r#"
[[meters]]
name = "morning"
cron = "0 6 * * *"
duration = { hours = 4 }
"#,
    );
    setup.set_reading("1");
    setup.run(&["tick"]);

    let output = setup.run(&["status"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Instance: office\nStatus: measuring\nMeters:\n"));
    assert!(stdout.contains("- office_morning: 0.000"));
    assert!(stdout.contains("- office_year: 0.000 [measuring]"));

    let output = setup.run(&["periods"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 6);
    assert!(stdout.contains("week   0 0 * * 1"));
}

#[test]
fn test_invalid_config_fails_fast() {
    let setup = Setup::new(
        r#"
[[meters]]
name = "broken"
period = "hour"
duration = { hours = 2 }
"#,
    );
    setup.set_reading("1");
    let output = setup.command().arg("tick").output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("broken"));
}
