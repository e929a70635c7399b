//! usb-dm
//!
//! Limited wrapper around a QEMU monitor for attaching host USB devices to
//! a virtual machine and detaching them again.

mod config;
mod host;
mod messages;
mod shell;
mod update;

use anyhow::{Context, Result, bail};
use clap::Parser;
use common::setup_logging;
use config::{ClientConfig, LONG_NAME, SHORT_NAME, expand_path, find_config_file, search_directories};
use shell::{Flow, Shell};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

/// Environment variable naming a log file
const LOG_ENV: &str = "QEMU_USB_DEVICE_MANAGER_LOG";

#[derive(Parser, Debug)]
#[command(name = "usb-dm")]
#[command(author, version, about = "Limited QEMU Monitor Wrapper for USB management")]
#[command(long_about = "
Attach host USB devices to a QEMU virtual machine, and detach them again,
through the machine's monitor socket.

EXAMPLES:
    # Interactive shell for the machine matching this hostname
    usb-dm

    # Attach every configured device to 'windows' and exit
    usb-dm --name windows --command add

    # Several commands in a row
    usb-dm -n windows -c hostlist 'remove mouse' list

CONFIGURATION:
    Without --config the client looks for, in order:
    1. usb_dm_config.{yml,yaml,toml} in the current directory
    2. qemu_usb_device_manager_config.{yml,yaml,toml} in the current
       directory, the usb-dm config directory and the home directory
    3. The file named by QEMU_USB_DEVICE_MANAGER_CONFIG
")]
struct Args {
    /// Virtual machine to manage
    #[arg(short, long, visible_alias = "set", short_alias = 's', value_name = "NAME")]
    name: Option<String>,

    /// Run these commands and exit instead of starting the shell
    #[arg(short, long = "command", value_name = "COMMAND", num_args = 1..)]
    command: Vec<String>,

    /// Path to configuration file
    #[arg(long, visible_alias = "conf", value_name = "PATH")]
    config: Option<String>,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

/// Config file named on the command line, or the first one found
fn locate_config(args: &Args) -> Result<PathBuf> {
    if let Some(path) = args.config.as_deref().map(expand_path) {
        if path.is_file() {
            return Ok(path);
        }
        eprintln!("Configuration file ({}) does not exist.", path.display());
    }

    if let Some(path) = find_config_file() {
        return Ok(path);
    }

    eprintln!("{} {} or {}:", messages::CONFIG_LOOKED_FOR, SHORT_NAME, LONG_NAME);
    for (label, directory) in search_directories() {
        eprintln!("- {}: {}", label, directory.display());
    }
    bail!("No configuration file found")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = locate_config(&args)?;

    // Log level from the CLI, then the config, then the default
    let log_level = match args.log_level.clone() {
        Some(level) => level,
        None => ClientConfig::load(&config_path)
            .ok()
            .and_then(|config| config.log_level)
            .unwrap_or_else(|| "info".to_string()),
    };
    let log_file = args
        .log
        .clone()
        .or_else(|| std::env::var(LOG_ENV).ok())
        .map(|path| expand_path(&path));

    setup_logging(&log_level, log_file.as_deref()).context("Failed to setup logging")?;

    info!("usb-dm v{}", env!("CARGO_PKG_VERSION"));
    debug!("Log level: {}", log_level);

    let mut stdout = std::io::stdout();
    let mut shell = Shell::open(config_path, args.name.clone(), &mut stdout)
        .context("Failed to load configuration")?;
    info!(
        "Using {} ({} virtual machines)",
        shell.config_path().display(),
        shell.config().machine_names().len()
    );
    writeln!(stdout, "{}", messages::WELCOME)?;

    if !args.command.is_empty() {
        for command in &args.command {
            writeln!(stdout, ">{}", command)?;
            if shell.execute(command, &mut stdout).await? == Flow::Exit {
                break;
            }
        }
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        write!(stdout, ">")?;
        stdout.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(stdout)?;
            break;
        };
        if shell.execute(&line, &mut stdout).await? == Flow::Exit {
            break;
        }
    }

    info!("usb-dm shutting down");
    Ok(())
}
