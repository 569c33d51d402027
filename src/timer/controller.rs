use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::{
    db::{Database, LogEntry, NewLogEntry},
    settings::SettingsStore,
    utils::extract_tags,
};

use super::{
    countdown::{format_mmss, Countdown, CountdownConfig, FinishCallback, TickCallback},
    cycle::{CycleState, PomodoroCycle},
    events::{EventBus, LogOutcome, SessionOutcome, TimerEvent},
    Phase, TimerSession, TimerStatus,
};

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub session: TimerSession,
    pub cycle: CycleState,
    pub cycle_counter: u32,
    pub pending_message: String,
}

struct ControllerState {
    session: TimerSession,
    cycle: PomodoroCycle,
    countdown: Option<Countdown>,
    /// Text the user typed for the running study phase.
    pending_message: String,
}

impl ControllerState {
    fn sync_remaining(&mut self) {
        if let Some(countdown) = &self.countdown {
            self.session.remaining_secs = countdown.remaining_secs();
        }
    }
}

/// Drives the Pomodoro cycle: owns the active session, starts countdowns,
/// persists study logs, and publishes every change on the event bus.
#[derive(Clone)]
pub struct TimerController {
    state: Arc<Mutex<ControllerState>>,
    db: Database,
    settings: Arc<SettingsStore>,
    events: EventBus,
}

impl TimerController {
    pub fn new(db: Database, settings: Arc<SettingsStore>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ControllerState {
                session: TimerSession::new(),
                cycle: PomodoroCycle::new(),
                countdown: None,
                pending_message: String::new(),
            })),
            db,
            settings,
            events: EventBus::new(),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TimerEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        let mut state = self.state.lock().await;
        state.sync_remaining();
        TimerSnapshot {
            session: state.session.clone(),
            cycle: state.cycle.state(),
            cycle_counter: state.cycle.counter(),
            pending_message: state.pending_message.clone(),
        }
    }

    /// True while a phase is counting down, paused or not.
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.session.is_active()
    }

    pub async fn is_paused(&self) -> bool {
        self.state.lock().await.session.status == TimerStatus::Paused
    }

    pub async fn set_log_message(&self, message: impl Into<String>) {
        self.state.lock().await.pending_message = message.into();
    }

    /// Saves `message` as a zero-length log stamped now.
    pub async fn log_now(&self, message: &str) -> Result<LogEntry> {
        if message.trim().is_empty() {
            bail!("log message is empty");
        }
        let now = Utc::now();
        let saved = self
            .db
            .save_log(new_log_entry(message, now, now))
            .await
            .context("failed to save log")?;
        info!("Saved manual log {}", saved.id);
        Ok(saved)
    }

    /// Logs `message` right away when idle; during a session it becomes the
    /// pending message saved when the study phase ends.
    pub async fn submit_message(&self, message: &str) -> Result<Option<LogEntry>> {
        if message.trim().is_empty() {
            bail!("log message is empty");
        }

        {
            let mut state = self.state.lock().await;
            if state.session.is_active() {
                state.pending_message = message.to_string();
                return Ok(None);
            }
        }

        self.log_now(message).await.map(Some)
    }

    /// Starts the pending phase (Study when idle).
    pub async fn start_session(&self) -> Result<TimerSession> {
        let mut state = self.state.lock().await;
        if state.session.is_active() {
            bail!("a session is already running");
        }
        self.begin_phase(&mut state)
    }

    /// Stops whatever is running and returns to Idle. A stopped study phase
    /// is logged when a message is pending.
    pub async fn stop_session(&self) -> LogOutcome {
        let mut state = self.state.lock().await;

        let mut elapsed_secs = 0;
        if let Some(countdown) = state.countdown.take() {
            countdown.stop().await;
            elapsed_secs = countdown.elapsed().as_secs();
        }

        if !state.session.is_active() {
            if state.cycle.state() != CycleState::Idle {
                state.cycle.stop();
                state.session.reset();
                self.events.emit(TimerEvent::PhaseChanged {
                    state: CycleState::Idle,
                });
            }
            return LogOutcome::NotRequired;
        }

        let ended_at = Utc::now();
        let phase = state.session.phase;
        let session_id = state.session.session_id.clone().unwrap_or_default();
        let started_at = state.session.started_at.unwrap_or(ended_at);

        state.cycle.stop();
        state.session.reset();

        let log = if phase == Phase::Study && !state.pending_message.trim().is_empty() {
            let message = std::mem::take(&mut state.pending_message);
            let outcome = self.persist_log(&message, started_at, ended_at).await;
            if matches!(outcome, LogOutcome::Failed(_)) {
                state.pending_message = message;
            }
            outcome
        } else {
            LogOutcome::NotRequired
        };

        info!(
            "Stopped {} session {} after {}s",
            phase.as_str(),
            session_id,
            elapsed_secs
        );

        self.events.emit(TimerEvent::SessionFinished {
            session_id,
            phase,
            outcome: SessionOutcome::Stopped,
            elapsed_secs,
            log: log.clone(),
        });
        self.events.emit(TimerEvent::PhaseChanged {
            state: CycleState::Idle,
        });

        log
    }

    pub async fn pause(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.session.status != TimerStatus::Running {
            return false;
        }
        let paused = state.countdown.as_ref().is_some_and(Countdown::pause);
        if paused {
            state.session.mark_paused(Utc::now());
        }
        paused
    }

    pub async fn resume(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.session.status != TimerStatus::Paused {
            return false;
        }
        let resumed = state.countdown.as_ref().is_some_and(Countdown::resume);
        if resumed {
            state.session.mark_resumed();
        }
        resumed
    }

    /// Returns the new paused state, or `None` when no session is active.
    pub async fn toggle_pause(&self) -> Option<bool> {
        let status = self.state.lock().await.session.status;
        match status {
            TimerStatus::Running => {
                self.pause().await;
                Some(self.is_paused().await)
            }
            TimerStatus::Paused => {
                self.resume().await;
                Some(self.is_paused().await)
            }
            TimerStatus::Idle | TimerStatus::Finished => None,
        }
    }

    /// Stops any running session before the application exits.
    pub async fn shutdown(&self) {
        match self.stop_session().await {
            LogOutcome::Failed(err) => warn!("Log lost during shutdown: {err}"),
            LogOutcome::Saved(id) => info!("Saved log {id} during shutdown"),
            LogOutcome::NotRequired => {}
        }
    }

    fn begin_phase(&self, state: &mut ControllerState) -> Result<TimerSession> {
        let settings = self.settings.timer();
        let phase = state.cycle.next_phase();
        let total_secs = phase.duration_secs(&settings);
        let session_id = Uuid::new_v4().to_string();

        let countdown = Countdown::start(
            CountdownConfig {
                total_secs,
                pauseable: true,
            },
            self.tick_callback(session_id.clone(), phase),
            Some(self.finish_callback(session_id.clone())),
        )?;

        state.cycle.begin();
        state
            .session
            .begin(session_id.clone(), phase, total_secs, Utc::now());
        state.countdown = Some(countdown);

        info!(
            "Started {} session {} ({}s)",
            phase.as_str(),
            session_id,
            total_secs
        );
        self.events.emit(TimerEvent::PhaseChanged {
            state: state.cycle.state(),
        });

        Ok(state.session.clone())
    }

    fn tick_callback(&self, session_id: String, phase: Phase) -> TickCallback {
        let events = self.events.clone();
        Box::new(move |remaining_secs| {
            events.emit(TimerEvent::TickUpdated {
                session_id: session_id.clone(),
                phase,
                remaining_secs,
                display: format_mmss(remaining_secs),
            });
        })
    }

    fn finish_callback(&self, session_id: String) -> FinishCallback {
        let controller = self.clone();
        Box::new(move || {
            tokio::spawn(async move {
                if let Err(err) = controller.complete_phase(&session_id).await {
                    error!("Failed to complete session {session_id}: {err:#}");
                }
            });
        })
    }

    /// Natural completion of the countdown belonging to `session_id`.
    async fn complete_phase(&self, session_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;

        // The session may have been stopped while this task was queued.
        if state.session.session_id.as_deref() != Some(session_id)
            || !state.session.is_active()
        {
            return Ok(());
        }
        let Some(countdown) = state.countdown.take() else {
            return Ok(());
        };
        countdown.stop().await;

        let ended_at = Utc::now();
        let phase = state.session.phase;
        let started_at = state.session.started_at.unwrap_or(ended_at);
        let elapsed_secs = countdown.total_secs();
        state.session.finish();

        let settings = self.settings.timer();
        let next = state.cycle.complete(settings.pomodoro_cycles);

        let log = if phase == Phase::Study && !state.pending_message.trim().is_empty() {
            let message = std::mem::take(&mut state.pending_message);
            let outcome = self.persist_log(&message, started_at, ended_at).await;
            if matches!(outcome, LogOutcome::Failed(_)) {
                state.pending_message = message;
            }
            outcome
        } else {
            LogOutcome::NotRequired
        };

        info!("Completed {} session {}", phase.as_str(), session_id);

        self.events.emit(TimerEvent::SessionFinished {
            session_id: session_id.to_string(),
            phase,
            outcome: SessionOutcome::Completed,
            elapsed_secs,
            log,
        });
        self.events.emit(TimerEvent::PhaseChanged {
            state: state.cycle.state(),
        });

        let auto_start = match next {
            Some(next) if next.is_break() => settings.auto_start_breaks,
            Some(_) => settings.auto_start_pomodoros,
            None => false,
        };
        if auto_start {
            self.begin_phase(&mut state)?;
        }

        Ok(())
    }

    async fn persist_log(
        &self,
        message: &str,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> LogOutcome {
        match self
            .db
            .save_log(new_log_entry(message, started_at, ended_at))
            .await
        {
            Ok(saved) => {
                info!("Saved log {} with tags {:?}", saved.id, saved.tag_names());
                LogOutcome::Saved(saved.id)
            }
            Err(err) => {
                error!("Failed to save log: {err:#}");
                LogOutcome::Failed(err.to_string())
            }
        }
    }
}

fn new_log_entry(message: &str, start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> NewLogEntry {
    NewLogEntry {
        message: message.trim().to_string(),
        tags: extract_tags(message),
        start_date,
        end_date,
    }
}
