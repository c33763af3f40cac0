//! Integration tests for the command line front end
//!
//! Runs the built binary; nothing here needs a remote host.

use std::process::{Command, Output};
use tempfile::TempDir;

fn pullbox(args: &[&str]) -> Output {
	Command::new(env!("CARGO_BIN_EXE_pullbox"))
		.args(args)
		.env_remove("PULLBOX_REMOTE")
		.env_remove("PULLBOX_LOCAL_DIR")
		.env_remove("PULLBOX_DEBOUNCE_MS")
		.env_remove("PULLBOX_LOG_LEVEL")
		.output()
		.expect("Failed to run pullbox")
}

#[test]
fn test_subcommand_required() {
	let out = pullbox(&[]);
	assert!(!out.status.success());
}

#[test]
fn test_config_shows_resolved_pair() {
	let out = pullbox(&["config", "/home/me/box", "backup"]);
	assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

	let stdout = String::from_utf8_lossy(&out.stdout);
	assert!(stdout.contains("localDir = \"/home/me/box\""), "{}", stdout);
	assert!(stdout.contains("remote = \"backup:box\""), "{}", stdout);
	assert!(stdout.contains("[retry]"), "{}", stdout);
}

#[test]
fn test_config_file_and_env_layering() {
	let dir = TempDir::new().unwrap();
	let path = dir.path().join("pullbox.toml");
	std::fs::write(&path, "branch = \"main\"\ndebounceMs = 500\n").unwrap();

	let out = Command::new(env!("CARGO_BIN_EXE_pullbox"))
		.args(["--config", path.to_str().unwrap(), "config"])
		.env("PULLBOX_DEBOUNCE_MS", "750")
		.output()
		.unwrap();
	assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

	let stdout = String::from_utf8_lossy(&out.stdout);
	assert!(stdout.contains("branch = \"main\""), "{}", stdout);
	assert!(stdout.contains("debounceMs = 750"), "{}", stdout);
}

#[test]
fn test_run_rejects_invalid_config() {
	let dir = TempDir::new().unwrap();
	let path = dir.path().join("bad.toml");
	std::fs::write(&path, "debounceMs = 0\n").unwrap();
	let lock = dir.path().join("pullbox.lock");

	let out = pullbox(&[
		"--config",
		path.to_str().unwrap(),
		"run",
		dir.path().to_str().unwrap(),
		"backup",
		"--lock-file",
		lock.to_str().unwrap(),
	]);
	assert!(!out.status.success());
	assert!(String::from_utf8_lossy(&out.stderr).contains("debounceMs"));
}

#[test]
fn test_status_outside_repository_fails() {
	let dir = TempDir::new().unwrap();
	let out = pullbox(&["status", dir.path().to_str().unwrap()]);
	assert!(!out.status.success());
}

// vim: ts=4
