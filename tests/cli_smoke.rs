mod support;

use assert_cmd::Command;
use bootcfg::error::exit_codes;
use bootcfg::lock::FileLock;
use predicates::str::contains;
use serde_json::Value;

use support::{TestBoot, SAMPLE_CONFIG};

fn bootcfg(boot: &TestBoot, lock_timeout_ms: u64) -> Command {
    let settings = boot.write_settings_file(lock_timeout_ms);
    let mut cmd = Command::cargo_bin("bootcfg").expect("binary");
    cmd.env_remove("BOOTCFG_TARGET")
        .env("BOOTCFG_SETTINGS", settings);
    cmd
}

#[test]
fn help_works() {
    Command::cargo_bin("bootcfg")
        .expect("binary")
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("transactional boot config"));
}

#[test]
fn subcommand_help_works() {
    for cmd in ["get", "set", "unset", "comment", "check", "noobs", "copy-to", "copy-from"] {
        Command::cargo_bin("bootcfg")
            .expect("binary")
            .arg(cmd)
            .arg("--help")
            .assert()
            .success();
    }
}

#[test]
fn set_then_get() {
    let boot = TestBoot::with_target(SAMPLE_CONFIG);

    bootcfg(&boot, 1000)
        .args(["set", "hdmi_group", "2"])
        .assert()
        .success()
        .stdout(contains("written"));
    assert!(boot.read_target().contains("hdmi_group=2"));

    bootcfg(&boot, 1000)
        .args(["get", "hdmi_group"])
        .assert()
        .success()
        .stdout(contains("- value: 2"));
}

#[test]
fn get_json_reports_lookup() {
    let boot = TestBoot::with_target(SAMPLE_CONFIG);

    let output = bootcfg(&boot, 1000)
        .args(["--json", "get", "dtparam:audio"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let json: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(json["schema_version"], "bootcfg.v1");
    assert_eq!(json["data"]["lookup"]["status"], "found");
    assert_eq!(json["data"]["lookup"]["value"], "on");
}

#[test]
fn unset_comments_out_line() {
    let boot = TestBoot::with_target(SAMPLE_CONFIG);

    bootcfg(&boot, 1000)
        .args(["unset", "hdmi_mode"])
        .assert()
        .success();
    assert!(boot.read_target().lines().any(|line| line == "#hdmi_mode=4"));
}

#[test]
fn dry_run_leaves_target_alone() {
    let boot = TestBoot::with_target(SAMPLE_CONFIG);

    bootcfg(&boot, 1000)
        .args(["--dry-run", "set", "hdmi_group", "2"])
        .assert()
        .success()
        .stdout(contains("dry run"));

    assert_eq!(boot.read_target(), SAMPLE_CONFIG);
    assert_eq!(boot.staged_files().len(), 1);
}

#[test]
fn noobs_reports_reboot() {
    let boot = TestBoot::with_target("A\nB\n# NOOBS Auto-generated Settings:\nC\n");

    let output = bootcfg(&boot, 1000)
        .args(["--json", "noobs"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let json: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(json["data"]["removed"], true);
    assert_eq!(json["data"]["reboot_required"], true);
    assert_eq!(boot.read_target(), "A\nB\n");
}

#[test]
fn check_restores_default() {
    let boot = TestBoot::with_target("garbage\n");

    bootcfg(&boot, 1000)
        .arg("check")
        .assert()
        .success()
        .stdout(contains("corrupt: true"));
    assert_eq!(boot.read_target(), support::DEFAULT_CONFIG);
}

#[test]
fn model_backup_is_separate_file() {
    let boot = TestBoot::with_target(SAMPLE_CONFIG);
    let source = boot.path().join("src.txt");
    std::fs::write(&source, "dtparam=audio=off\n").expect("write source");

    bootcfg(&boot, 1000)
        .args(["--model", "RPi 3", "copy-from"])
        .arg(&source)
        .assert()
        .success();

    let backup = boot.boot_dir().join("config_rpi3_backup.txt");
    assert_eq!(std::fs::read_to_string(backup).expect("backup"), "dtparam=audio=off\n");
    assert_eq!(boot.read_target(), SAMPLE_CONFIG);
}

#[test]
fn lock_timeout_exits_blocked() {
    let boot = TestBoot::with_target(SAMPLE_CONFIG);
    let _held = FileLock::acquire(boot.lock_path(), 1000).expect("hold lock");

    bootcfg(&boot, 100)
        .args(["set", "hdmi_group", "2"])
        .assert()
        .code(exit_codes::BLOCKED)
        .stderr(contains("Timed out waiting for config lock"));

    assert_eq!(boot.read_target(), SAMPLE_CONFIG);
    assert!(boot.staged_files().is_empty());
}

#[test]
fn invalid_settings_file_fails_the_command() {
    let boot = TestBoot::with_target(SAMPLE_CONFIG);
    let settings = boot.path().join("bad.toml");
    std::fs::write(&settings, "lock_timeout_ms = \"soon\"").expect("write settings");

    Command::cargo_bin("bootcfg")
        .expect("binary")
        .env("BOOTCFG_SETTINGS", &settings)
        .args(["get", "hdmi_group"])
        .assert()
        .code(exit_codes::OPERATION_FAILED)
        .stderr(contains("TOML parse error"));
}

#[test]
fn multi_line_value_is_a_user_error() {
    let boot = TestBoot::with_target(SAMPLE_CONFIG);
    let settings = boot.write_settings_file(1000);

    let output = Command::cargo_bin("bootcfg")
        .expect("binary")
        .env_remove("BOOTCFG_SETTINGS")
        .env_remove("BOOTCFG_TARGET")
        .arg("--json")
        .arg("--settings")
        .arg(&settings)
        .args(["set", "hdmi_group", "1\nhdmi_mode=4"])
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(exit_codes::USER_ERROR));

    let json: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(json["command"], "set");
    assert_eq!(json["error"]["kind"], "invalid_argument");

    assert_eq!(boot.read_target(), SAMPLE_CONFIG);
    assert!(boot.staged_files().is_empty());
}
