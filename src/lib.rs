pub mod db;
pub mod settings;
pub mod timer;
pub mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context};
use db::Database;
use log::{info, warn};
use settings::SettingsStore;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
    task::JoinHandle,
};
use timer::{
    commands::{self, Command, Reply},
    LogOutcome, TimerController, TimerEvent,
};

pub struct AppState {
    pub(crate) db: Database,
    pub(crate) timer: TimerController,
    pub(crate) settings: Arc<SettingsStore>,
}

/// `PACEKEEPER_HOME` when set, otherwise the platform data directory.
fn app_data_dir() -> anyhow::Result<PathBuf> {
    if let Some(home) = std::env::var_os("PACEKEEPER_HOME") {
        return Ok(PathBuf::from(home));
    }
    dirs::data_dir()
        .map(|dir| dir.join("pacekeeper"))
        .ok_or_else(|| anyhow!("could not determine a data directory; set PACEKEEPER_HOME"))
}

pub async fn run() -> anyhow::Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("PaceKeeper starting up...");

    let app_data_dir = app_data_dir()?;
    std::fs::create_dir_all(&app_data_dir)
        .with_context(|| format!("Failed to create {}", app_data_dir.display()))?;

    let database = Database::new(app_data_dir.join("pacekeeper.sqlite3"))?;
    let settings_store = Arc::new(SettingsStore::new(app_data_dir.join("settings.json"))?);
    let timer_controller = TimerController::new(database.clone(), settings_store.clone());

    let state = AppState {
        db: database,
        timer: timer_controller,
        settings: settings_store,
    };

    let timer = state.settings.timer();
    info!(
        "Timer settings: study {}m, short break {}m, long break {}m, long break every {}",
        timer.study_time, timer.short_break_time, timer.long_break_time, timer.pomodoro_cycles
    );

    let printer = spawn_event_printer(state.timer.subscribe());

    println!("{}", commands::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        // EOF or Ctrl-C
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };

        match commands::execute(&state, command).await {
            Ok(Reply::Text(text)) => println!("{text}"),
            Ok(Reply::Quit) => break,
            Err(err) => println!("Error: {err}"),
        }
    }

    state.timer.shutdown().await;
    printer.abort();
    info!("PaceKeeper shut down");
    Ok(())
}

fn spawn_event_printer(mut rx: mpsc::UnboundedReceiver<TimerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                // Once a minute, then every second near the end.
                TimerEvent::TickUpdated {
                    phase,
                    remaining_secs,
                    display,
                    ..
                } if remaining_secs % 60 == 0 || remaining_secs <= 5 => {
                    println!("[{}] {display}", phase.as_str());
                }
                TimerEvent::TickUpdated { .. } => {}
                TimerEvent::PhaseChanged { state } => println!("-> {state:?}"),
                TimerEvent::SessionFinished {
                    phase,
                    outcome,
                    elapsed_secs,
                    log,
                    ..
                } => {
                    println!(
                        "{} {:?} after {}",
                        phase.as_str(),
                        outcome,
                        timer::format_mmss(elapsed_secs)
                    );
                    match log {
                        LogOutcome::Saved(id) => println!("Saved log #{id}"),
                        LogOutcome::Failed(err) => {
                            warn!("Log not saved: {err}");
                            println!("Log not saved: {err}");
                        }
                        LogOutcome::NotRequired => {}
                    }
                }
            }
        }
    })
}
