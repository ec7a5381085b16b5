mod bridge;
mod commands;
mod config;
mod event_pump;
mod ipc;
mod state;
mod tabs;
mod title;
mod window;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tabmux_pty::SessionManager;
use tokio::sync::mpsc;

use config::AppConfig;
use state::AppState;

/// Tabbed PTY session host. Speaks JSON lines on stdin/stdout; logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "tabmux", version, about)]
struct Cli {
    /// Directory for the database and config file (default: ~/.tabmux).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Config file (default: <data-dir>/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Shell for new sessions, overriding the config file.
    #[arg(long)]
    shell: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol, so logs must stay on stderr.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    let data_dir = cli.data_dir.unwrap_or_else(config::default_data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    let config_path = cli
        .config
        .unwrap_or_else(|| data_dir.join(config::CONFIG_FILE));
    let mut config = AppConfig::load(&config_path)?;
    if let Some(shell) = cli.shell {
        config.shell = Some(shell);
    }

    let db_path = data_dir.join(config::DB_FILE);
    let db = tabmux_db::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let pump = event_pump::start_event_pump(events_rx, tokio::io::stdout());

    let manager = Arc::new(SessionManager::native(config.manager_config()));
    let state = Arc::new(AppState::new(manager, db, config, events_tx));
    log::info!("tabmux ready, data in {}", data_dir.display());

    let lines = bridge::spawn_stdin_reader().context("failed to start stdin reader")?;
    let report = bridge::run(Arc::clone(&state), lines).await;
    log::info!(
        "{} sessions hung up, {} killed",
        report.terminated,
        report.killed
    );

    // Dropping the last sender lets the pump flush and finish.
    drop(state);
    if let Err(e) = pump.await {
        log::warn!("event pump failed: {e}");
    }
    Ok(())
}
