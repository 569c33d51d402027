//! Pomodoro cycle: which phase comes next, and when the long break lands.

use serde::{Deserialize, Serialize};

use super::state::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "phase")]
pub enum CycleState {
    Idle,
    /// A phase is counting down.
    Active(Phase),
    /// The previous phase finished; this one is next but not started.
    Awaiting(Phase),
}

#[derive(Debug, Clone)]
pub struct PomodoroCycle {
    /// 1-based index of the current study interval.
    counter: u32,
    state: CycleState,
}

impl Default for PomodoroCycle {
    fn default() -> Self {
        Self::new()
    }
}

impl PomodoroCycle {
    pub fn new() -> Self {
        Self {
            counter: 1,
            state: CycleState::Idle,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn current(&self) -> Option<Phase> {
        match self.state {
            CycleState::Active(phase) => Some(phase),
            _ => None,
        }
    }

    /// Phase that `begin` would start.
    pub fn next_phase(&self) -> Phase {
        match self.state {
            CycleState::Idle => Phase::Study,
            CycleState::Active(phase) | CycleState::Awaiting(phase) => phase,
        }
    }

    /// Starts the pending phase. Returns `None` if one is already active.
    pub fn begin(&mut self) -> Option<Phase> {
        if let CycleState::Active(_) = self.state {
            return None;
        }
        let phase = self.next_phase();
        self.state = CycleState::Active(phase);
        Some(phase)
    }

    /// Natural completion of the active phase; returns the phase that follows.
    pub fn complete(&mut self, cycle_length: u32) -> Option<Phase> {
        let CycleState::Active(finished) = self.state else {
            return None;
        };
        let next = match finished {
            Phase::Study => {
                let long = cycle_length > 0 && self.counter % cycle_length == 0;
                self.counter = self.counter.saturating_add(1);
                if long {
                    Phase::LongBreak
                } else {
                    Phase::ShortBreak
                }
            }
            Phase::ShortBreak | Phase::LongBreak => Phase::Study,
        };
        self.state = CycleState::Awaiting(next);
        Some(next)
    }

    /// Manual stop from any state.
    pub fn stop(&mut self) {
        self.state = CycleState::Idle;
        self.counter = 1;
    }
}
