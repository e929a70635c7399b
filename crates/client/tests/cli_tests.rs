//! Command-line tests for the usb-dm binary
//!
//! Runs the built binary with one-shot commands against temporary config
//! files. Nothing here needs a reachable monitor.
//!
//! Run with: `cargo test -p client --test cli_tests`

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

const CONFIG: &str = "\
log-level: warn
usb-devices:
  flash:
    id: 0781:5567
host-machine:
  hostname: cli-test-host
virtual-machines:
  windows:
    monitor: 127.0.0.1:4444
  linux:
    monitor: 127.0.0.1:4445
";

fn usb_dm(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_usb-dm"))
        .args(args)
        .current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join("config"))
        .env_remove("QEMU_USB_DEVICE_MANAGER_CONFIG")
        .env_remove("QEMU_USB_DEVICE_MANAGER_LOG")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run usb-dm")
}

#[test]
fn test_one_shot_commands() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("machines.yml");
    fs::write(&config, CONFIG).unwrap();

    let output = usb_dm(
        dir.path(),
        &["--config", config.to_str().unwrap(), "-c", "version", "set windows", "set"],
    );
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(">version"));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
    assert!(stdout.contains("'windows' set as active virtual machine."));
    assert!(stdout.contains("- windows [Active]"));
    assert!(stdout.contains("- linux"));
}

#[test]
fn test_exit_stops_command_list() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("usb_dm_config.yml"), CONFIG).unwrap();

    let output = usb_dm(dir.path(), &["-c", "exit", "version"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(">exit"));
    assert!(!stdout.contains(">version"));
}

#[test]
fn test_name_selects_machine() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("usb_dm_config.yml"), CONFIG).unwrap();

    let output = usb_dm(dir.path(), &["--set", "linux", "-c", "monitor"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Host: 127.0.0.1:4445"));
}

#[test]
fn test_long_config_name_in_home() {
    let dir = tempdir().unwrap();
    let home = dir.path().join("home");
    let work = dir.path().join("work");
    fs::create_dir_all(&home).unwrap();
    fs::create_dir_all(&work).unwrap();
    fs::write(home.join("qemu_usb_device_manager_config.yaml"), CONFIG).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_usb-dm"))
        .args(["-c", "set"])
        .current_dir(&work)
        .env("HOME", &home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("QEMU_USB_DEVICE_MANAGER_CONFIG")
        .output()
        .expect("Failed to run usb-dm");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("- windows"));
}

#[test]
fn test_missing_config_fails() {
    let dir = tempdir().unwrap();

    let output = usb_dm(dir.path(), &["-c", "version"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("usb_dm_config"));
    assert!(stderr.contains("No configuration file found"));
}

#[test]
fn test_log_file() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("usb_dm_config.toml"), "").unwrap();
    let log = dir.path().join("usb-dm.log");

    let output = usb_dm(
        dir.path(),
        &["--log", log.to_str().unwrap(), "-l", "info", "-c", "version"],
    );
    assert!(output.status.success());

    // The empty config gained its required sections
    let config = fs::read_to_string(dir.path().join("usb_dm_config.toml")).unwrap();
    assert!(config.contains("usb-devices"));

    let logged = fs::read_to_string(&log).unwrap();
    assert!(logged.contains("usb-dm v"));
    assert!(output.stderr.is_empty());
}
