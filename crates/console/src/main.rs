//! LPIC Console
//!
//! Runs a training script on a pseudo-terminal and streams it to stdout.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use lpic_console::config::{default_config_path, Config};
use lpic_console::logging;
use lpic_console::{Command, ConsoleBridge, ConsoleLog, LogTail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{Instant, MissedTickBehavior};

/// Exit status when the command could not be started.
const EXIT_SPAWN_FAILED: i32 = 127;

/// Exit status when interrupted before the exit code was delivered.
const EXIT_INTERRUPTED: i32 = 130;

/// How long to keep draining after Ctrl-C before giving up on the exit event.
const INTERRUPT_DRAIN: Duration = Duration::from_secs(2);

/// LPIC Console - run training scripts on a pseudo-terminal.
#[derive(Parser, Debug)]
#[command(name = "lpic-console")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a command and stream its output; stdin lines are sent as input
    Run {
        /// Working directory for the command
        #[arg(long, value_name = "DIR")]
        cwd: Option<PathBuf>,

        /// Environment override (repeatable)
        #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,

        /// Start from an empty environment
        #[arg(long)]
        clear_env: bool,

        /// Program and arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
    },

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    let env_overrides = config.apply_env_overrides();

    match cli.command {
        Commands::Config(cmd) => handle_config(cmd, &config, &config_path),
        Commands::Run {
            cwd,
            env,
            clear_env,
            argv,
        } => {
            config.validate()?;
            let guard = logging::init(&config.logging, cli.verbose)?;
            if config_path.exists() {
                tracing::info!("Using config file: {:?}", config_path);
            } else {
                tracing::info!("Config file not found at {:?}, using defaults", config_path);
            }
            for variable in env_overrides {
                tracing::info!(variable, "Configuration overridden from environment");
            }

            let command = build_command(argv, cwd, env, clear_env);
            let code = run_console(&config, &command).await?;

            // Flush the log file before exiting without unwinding.
            drop(guard);
            std::process::exit(code);
        }
    }
}

fn handle_config(cmd: ConfigCommands, config: &Config, path: &Path) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Show => print!("{}", config.to_toml()?),
        ConfigCommands::Path => println!("{}", path.display()),
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists: {} (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default().save(path)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }
    Ok(())
}

/// Parse a `KEY=VALUE` environment override.
fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", s)),
    }
}

fn build_command(
    argv: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    clear_env: bool,
) -> Command {
    let mut command = Command::from_argv(argv);
    if let Some(dir) = cwd {
        command = command.cwd(dir);
    }
    if clear_env {
        command = command.env_clear();
    }
    for (key, value) in env {
        command = command.env(key, value);
    }
    command
}

/// Drives a bridge from a tick-based display loop until the command ends.
///
/// Returns the exit code to report for this process.
async fn run_console(config: &Config, command: &Command) -> anyhow::Result<i32> {
    let mut bridge = ConsoleBridge::from_config(config);
    let mut tail = LogTail::new();

    if bridge.run(command).is_err() {
        print_tail(&mut tail, bridge.log())?;
        return Ok(EXIT_SPAWN_FAILED);
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(config.console.tick_rate_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;
    let mut interrupted_at: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                bridge.pump();
                print_tail(&mut tail, bridge.log())?;

                let drained = bridge.last_exit_code().is_some()
                    || interrupted_at.map_or(true, |at| at.elapsed() >= INTERRUPT_DRAIN);
                if !bridge.running() && drained {
                    break;
                }
            }
            line = input.next_line(), if input_open => match line {
                Ok(Some(line)) => bridge.submit_input(&line),
                Ok(None) => {
                    tracing::debug!("stdin closed");
                    input_open = false;
                }
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    input_open = false;
                }
            },
            result = tokio::signal::ctrl_c(), if interrupted_at.is_none() => {
                if let Err(e) = result {
                    tracing::warn!("Failed to listen for Ctrl-C: {}", e);
                }
                tracing::info!("Interrupted, stopping command");
                bridge.stop();
                interrupted_at = Some(Instant::now());
            }
        }
    }

    Ok(bridge.last_exit_code().unwrap_or(EXIT_INTERRUPTED))
}

fn print_tail(tail: &mut LogTail, log: &ConsoleLog) -> std::io::Result<()> {
    let text = tail.render(log);
    if text.is_empty() {
        return Ok(());
    }
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()
}
