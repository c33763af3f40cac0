use clap::{Arg, ArgMatches, Command};
use std::error::Error;
use std::path::{Path, PathBuf};

use pullbox::bootstrap;
use pullbox::lock::InstanceLock;
use pullbox::logging::{self, *};
use pullbox::utils::setup_signal_handlers;
use pullbox::{Config, GitRepository, Repository, SshExec, SyncDaemon};

///////////////////////
// Utility functions //
///////////////////////

/// `host:dir` stays as is; a bare host gets the local directory's name
fn resolve_remote(path: &Path, server: &str) -> String {
	if server.contains(':') {
		return server.to_string();
	}
	let dirname = path
		.components()
		.last()
		.map(|c| c.as_os_str().to_string_lossy().into_owned())
		.unwrap_or_default();
	format!("{}:{}", server, dirname)
}

/// CLI positional arguments override whatever the file/env said
fn apply_pair(config: &mut Config, matches: &ArgMatches) {
	if let Some(path) = matches.try_get_one::<String>("path").ok().flatten() {
		config.local_dir = PathBuf::from(path);
	}
	if let Some(server) = matches.try_get_one::<String>("server").ok().flatten() {
		config.remote = resolve_remote(&config.local_dir, server);
	}
}

fn cli() -> Command {
	Command::new("pullbox")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Keep a directory in sync with a remote host using git")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.help("Config file (.toml or .json)"),
		)
		.arg(
			Arg::new("log-level")
				.long("log-level")
				.value_name("LEVEL")
				.help("trace, debug, info, warn or error"),
		)
		.subcommand(
			Command::new("run")
				.about("Run the sync daemon")
				.arg(Arg::new("path").required(true).help("Local data directory"))
				.arg(Arg::new("server").required(true).help("Remote as host or host:dir"))
				.arg(
					Arg::new("lock-file")
						.long("lock-file")
						.value_name("FILE")
						.help("Lock file preventing multiple instances"),
				),
		)
		.subcommand(
			Command::new("status")
				.about("Print repository state as JSON")
				.arg(Arg::new("path").required(true).help("Local data directory")),
		)
		.subcommand(
			Command::new("config")
				.about("Print the effective configuration")
				.arg(Arg::new("path"))
				.arg(Arg::new("server")),
		)
}

async fn run(config: Config) -> Result<(), Box<dyn Error>> {
	config.validate()?;
	let _lock = InstanceLock::acquire(&config.lock_file)?;

	let remote = config.remote_spec()?;
	let exec = SshExec::new(&config.ssh.ssh_command, &remote.host);
	let repo = GitRepository::new(&config.local_dir, &config.remote_name, &config.branch);
	bootstrap::prepare(&config, &exec, &repo).await?;

	let daemon = SyncDaemon::from_config(config)?;
	daemon.run(setup_signal_handlers()).await?;
	info!("stopped");
	Ok(())
}

async fn status(config: Config) -> Result<(), Box<dyn Error>> {
	let mut repo = GitRepository::new(&config.local_dir, &config.remote_name, &config.branch);
	let state = repo.state().await?;
	println!("{}", serde_json::to_string_pretty(&state)?);
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let matches = cli().get_matches();

	let mut config = match matches.get_one::<String>("config") {
		Some(path) => Config::load(Path::new(path))?,
		None => Config::default(),
	};
	config.apply_env()?;
	if let Some(level) = matches.get_one::<String>("log-level") {
		config.log_level = level.clone();
	}
	logging::init_tracing(&config.log_level);

	match matches.subcommand() {
		Some(("run", sub)) => {
			apply_pair(&mut config, sub);
			if let Some(lock_file) = sub.get_one::<String>("lock-file") {
				config.lock_file = PathBuf::from(lock_file);
			}
			run(config).await
		}
		Some(("status", sub)) => {
			apply_pair(&mut config, sub);
			status(config).await
		}
		Some(("config", sub)) => {
			apply_pair(&mut config, sub);
			print!("{}", toml::to_string_pretty(&config)?);
			Ok(())
		}
		_ => Err("a subcommand is required".into()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_resolve_remote_bare_host() {
		assert_eq!(resolve_remote(Path::new("/home/me/box"), "backup"), "backup:box");
		assert_eq!(resolve_remote(Path::new("/home/me/box/"), "backup"), "backup:box");
	}

	#[test]
	fn test_resolve_remote_explicit_dir() {
		assert_eq!(resolve_remote(Path::new("/home/me/box"), "backup:srv/other"), "backup:srv/other");
	}

	#[test]
	fn test_cli_parses_run() {
		let matches = cli().try_get_matches_from(["pullbox", "run", "/home/me/box", "backup"]).unwrap();
		let (name, sub) = matches.subcommand().unwrap();
		assert_eq!(name, "run");

		let mut config = Config::default();
		apply_pair(&mut config, sub);
		assert_eq!(config.local_dir, PathBuf::from("/home/me/box"));
		assert_eq!(config.remote, "backup:box");
	}

	#[test]
	fn test_cli_requires_subcommand() {
		assert!(cli().try_get_matches_from(["pullbox"]).is_err());
	}
}

// vim: ts=4
