use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;

use super::{cycle::CycleState, state::Phase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionOutcome {
    /// The countdown reached zero.
    Completed,
    /// The user stopped it.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "detail")]
pub enum LogOutcome {
    NotRequired,
    Saved(i64),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum TimerEvent {
    #[serde(rename_all = "camelCase")]
    TickUpdated {
        session_id: String,
        phase: Phase,
        remaining_secs: u64,
        display: String,
    },
    PhaseChanged { state: CycleState },
    #[serde(rename_all = "camelCase")]
    SessionFinished {
        session_id: String,
        phase: Phase,
        outcome: SessionOutcome,
        elapsed_secs: u64,
        log: LogOutcome,
    },
}

/// Fan-out of timer events to any number of UI subscribers.
///
/// Each subscriber owns an unbounded queue, so a slow reader never stalls the
/// countdown task and never loses ticks. Closed receivers are dropped lazily.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<TimerEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TimerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    pub fn emit(&self, event: TimerEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
