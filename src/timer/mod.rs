pub mod commands;
pub mod controller;
pub mod countdown;
pub mod cycle;
pub mod events;
pub mod pause;
pub mod state;

pub use controller::{TimerController, TimerSnapshot};
pub use countdown::{format_mmss, Countdown, CountdownConfig};
pub use cycle::{CycleState, PomodoroCycle};
pub use events::{EventBus, LogOutcome, SessionOutcome, TimerEvent};
pub use pause::PauseClock;
pub use state::{Phase, TimerSession, TimerStatus};
