//! # Profile Tool
//!
//! Inspects and edits the stored user profile from the command line.
//! Every mutation goes through the same validated save path the game uses.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use profile_store::prelude::*;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "profile-tool")]
#[command(about = "Inspect and edit the local user profile", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory from the configuration
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load the profile and print it as JSON
    Show,
    /// Add coins (negative amounts spend)
    AddCoins {
        #[arg(allow_negative_numbers = true)]
        amount: i64,
    },
    /// Add experience points
    AddXp { amount: i64 },
    /// Record a finished game
    RecordGame {
        score: i64,
        #[arg(long)]
        won: bool,
        #[arg(long, default_value_t = 0.0)]
        seconds: f64,
    },
    /// Unlock an achievement
    Unlock { id: String },
    /// Change the nickname
    Rename { nickname: String },
    /// Delete the profile and its backup and start over
    Reset,
    /// Print the decrypted primary file without loading it
    Inspect,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("profile=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli);
    info!("Using data directory {}", config.data_dir.display());

    let mut store = ProfileStore::with_system_defaults(config);
    let log = EventLog::new();
    store.subscribe(log.clone());

    match cli.command {
        Command::Inspect => {
            let raw = store
                .read_raw()
                .with_context(|| format!("failed to read {}", store.primary_path().display()))?;
            match serde_json::from_slice::<serde_json::Value>(&raw) {
                Ok(doc) => println!("{}", serde_json::to_string_pretty(&doc)?),
                Err(_) => println!("{}", String::from_utf8_lossy(&raw)),
            }
            return Ok(());
        },
        Command::Show => {
            if let Some(stats) = store.load().stats() {
                info!(
                    "{} games played, win rate {:.1}%",
                    stats.total_games,
                    stats.win_rate() * 100.0
                );
            }
        },
        Command::AddCoins { amount } => {
            store.load();
            ensure_applied(store.add_coins(amount), &log, "add coins")?;
        },
        Command::AddXp { amount } => {
            store.load();
            ensure_applied(store.add_experience(amount), &log, "add experience")?;
        },
        Command::RecordGame {
            score,
            won,
            seconds,
        } => {
            store.load();
            ensure_applied(store.record_game(score, won, seconds), &log, "record game")?;
        },
        Command::Unlock { id } => {
            store.load();
            ensure_applied(store.unlock_achievement(&id), &log, "unlock achievement")?;
        },
        Command::Rename { nickname } => {
            store.load();
            ensure_applied(store.set_nickname(&nickname), &log, "rename")?;
        },
        Command::Reset => {
            ensure_applied(store.reset(), &log, "reset")?;
        },
    }

    let json =
        serde_json::to_string_pretty(store.profile()).context("failed to serialize profile")?;
    println!("{json}");
    Ok(())
}

fn resolve_config(cli: &Cli) -> StoreConfig {
    let path = cli.config.clone().unwrap_or_else(StoreConfig::config_path);
    let mut config = StoreConfig::load_from(path);
    if let Some(dir) = &cli.data_dir {
        config.data_dir.clone_from(dir);
    }
    config
}

/// Turns a rejected store operation into an error carrying the last reported reason.
fn ensure_applied(applied: bool, log: &EventLog, action: &str) -> Result<()> {
    if applied {
        return Ok(());
    }
    let reason = log.events().into_iter().rev().find_map(|event| match event {
        ProfileEvent::DataError { kind, reason } => Some(format!("{kind}: {reason}")),
        _ => None,
    });
    match reason {
        Some(reason) => bail!("{action} failed: {reason}"),
        None => bail!("{action} had no effect"),
    }
}
