use std::{
    any::Any,
    ops::ControlFlow,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use anyhow::{bail, Context, Result};
use tokio::{
    runtime::Handle,
    sync::watch,
    task::JoinHandle,
    time::{self, Duration, Instant},
};
use tokio_util::sync::CancellationToken;

use super::pause::PauseClock;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// How long `stop()` waits for the ticking task before aborting it.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

pub type TickCallback = Box<dyn Fn(u64) + Send + Sync + 'static>;
pub type FinishCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy)]
pub struct CountdownConfig {
    pub total_secs: u64,
    pub pauseable: bool,
}

pub fn format_mmss(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

struct Progress {
    clock: PauseClock,
    ticks: u64,
}

struct Shared {
    total_secs: u64,
    progress: Mutex<Progress>,
    /// Checked before every callback; `stop()` sets it before joining.
    cancelled: AtomicBool,
    finished: AtomicBool,
}

impl Shared {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Single-shot countdown running on its own tokio task.
///
/// Tick `k` fires once `k` seconds of un-paused time have passed and reports
/// `total - k` seconds remaining. After the tick reporting zero the finish
/// callback runs exactly once, unless the countdown was stopped first.
///
/// Callbacks run on the countdown task. They may query the countdown or
/// pause it, but must not await `stop()` on it.
pub struct Countdown {
    shared: Arc<Shared>,
    pauseable: bool,
    cancel_token: CancellationToken,
    pause_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Countdown {
    pub fn start(
        config: CountdownConfig,
        on_tick: TickCallback,
        on_finish: Option<FinishCallback>,
    ) -> Result<Self> {
        if config.total_secs == 0 {
            bail!("countdown duration must be greater than zero");
        }
        let runtime = Handle::try_current().context("countdown requires a tokio runtime")?;

        let shared = Arc::new(Shared {
            total_secs: config.total_secs,
            progress: Mutex::new(Progress {
                clock: PauseClock::started_at(Instant::now()),
                ticks: 0,
            }),
            cancelled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        });

        let cancel_token = CancellationToken::new();
        let (pause_tx, pause_rx) = watch::channel(false);

        let handle = runtime.spawn(countdown_loop(
            shared.clone(),
            cancel_token.clone(),
            pause_rx,
            on_tick,
            on_finish,
        ));

        log_info!(
            "countdown started: {}s (pauseable: {})",
            config.total_secs,
            config.pauseable
        );

        Ok(Self {
            shared,
            pauseable: config.pauseable,
            cancel_token,
            pause_tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn total_secs(&self) -> u64 {
        self.shared.total_secs
    }

    pub fn remaining_secs(&self) -> u64 {
        let ticks = self.shared.progress().ticks;
        self.shared.total_secs.saturating_sub(ticks)
    }

    /// Un-paused time since the countdown started, capped at its total.
    pub fn elapsed(&self) -> Duration {
        let elapsed = self.shared.progress().clock.elapsed(Instant::now());
        elapsed.min(Duration::from_secs(self.shared.total_secs))
    }

    pub fn is_paused(&self) -> bool {
        self.shared.progress().clock.is_paused()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst)
    }

    fn is_done(&self) -> bool {
        self.is_finished() || self.shared.is_cancelled()
    }

    /// Freezes the countdown. Returns `false` when nothing changed.
    pub fn pause(&self) -> bool {
        if !self.pauseable || self.is_done() {
            return false;
        }
        let paused = self.shared.progress().clock.pause(Instant::now());
        if paused {
            self.pause_tx.send_replace(true);
            log_info!("countdown paused at {}s remaining", self.remaining_secs());
        }
        paused
    }

    /// Resumes a paused countdown. Returns `false` when it was not paused.
    pub fn resume(&self) -> bool {
        if !self.pauseable || self.is_done() {
            return false;
        }
        let resumed = self.shared.progress().clock.resume(Instant::now());
        match resumed {
            Some(paused_for) => {
                self.pause_tx.send_replace(false);
                log_info!("countdown resumed after {}ms paused", paused_for.as_millis());
                true
            }
            None => false,
        }
    }

    /// Cancels the countdown and waits up to `JOIN_TIMEOUT` for its task to
    /// exit. No callback starts after this returns. If a callback is stuck
    /// past the timeout the task is aborted and that one call may still be
    /// running, but nothing follows it.
    pub async fn stop(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        self.cancel_token.cancel();

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(mut handle) = handle else {
            return;
        };

        match time::timeout(JOIN_TIMEOUT, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log_error!("countdown task failed to join: {err}"),
            Err(_) => {
                log_warn!(
                    "countdown task did not stop within {}ms; aborting",
                    JOIN_TIMEOUT.as_millis()
                );
                handle.abort();
            }
        }
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        self.cancel_token.cancel();
    }
}

async fn countdown_loop(
    shared: Arc<Shared>,
    cancel_token: CancellationToken,
    mut pause_rx: watch::Receiver<bool>,
    on_tick: TickCallback,
    mut on_finish: Option<FinishCallback>,
) {
    loop {
        let (deadline, paused) = {
            let progress = shared.progress();
            (
                progress.clock.deadline_after(progress.ticks + 1),
                progress.clock.is_paused(),
            )
        };

        if paused {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                changed = pause_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
        }

        tokio::select! {
            _ = cancel_token.cancelled() => break,
            changed = pause_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = time::sleep_until(deadline) => {}
        }

        let Some(remaining) = advance(&shared) else {
            continue;
        };

        if emit(&shared, remaining, &on_tick, &mut on_finish).is_break() {
            break;
        }
    }

    log_info!("countdown task exiting");
}

/// Counts one tick if its deadline has really passed on an un-paused clock.
fn advance(shared: &Shared) -> Option<u64> {
    let mut progress = shared.progress();
    if progress.clock.is_paused()
        || Instant::now() < progress.clock.deadline_after(progress.ticks + 1)
    {
        return None;
    }
    progress.ticks += 1;
    Some(shared.total_secs.saturating_sub(progress.ticks))
}

fn emit(
    shared: &Shared,
    remaining: u64,
    on_tick: &TickCallback,
    on_finish: &mut Option<FinishCallback>,
) -> ControlFlow<()> {
    if shared.is_cancelled() {
        return ControlFlow::Break(());
    }

    log_debug!("countdown tick: {remaining}s remaining");
    guarded("tick", || on_tick(remaining));

    if remaining == 0 {
        if shared.is_cancelled() {
            return ControlFlow::Break(());
        }
        shared.finished.store(true, Ordering::SeqCst);
        if let Some(finish) = on_finish.take() {
            guarded("finish", finish);
        }
        return ControlFlow::Break(());
    }
    ControlFlow::Continue(())
}

fn guarded<F: FnOnce()>(label: &str, callback: F) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
        log_error!(
            "countdown {label} callback panicked: {}",
            panic_message(payload.as_ref())
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use tokio::sync::mpsc;

    #[derive(Debug, PartialEq)]
    enum Seen {
        Tick(u64),
        Finish,
    }

    fn recording(
        total_secs: u64,
        pauseable: bool,
    ) -> (Countdown, mpsc::UnboundedReceiver<Seen>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let tick_tx = tx.clone();
        let countdown = Countdown::start(
            CountdownConfig {
                total_secs,
                pauseable,
            },
            Box::new(move |remaining| {
                let _ = tick_tx.send(Seen::Tick(remaining));
            }),
            Some(Box::new(move || {
                let _ = tx.send(Seen::Finish);
            })),
        )
        .unwrap();
        (countdown, rx)
    }

    async fn drain(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Vec<Seen> {
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event);
        }
        seen
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_mmss(1500), "25:00");
        assert_eq!(format_mmss(61), "01:01");
        assert_eq!(format_mmss(0), "00:00");
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_every_tick_then_one_finish() {
        let (countdown, mut rx) = recording(5, false);

        let seen = drain(&mut rx).await;

        assert_eq!(
            seen,
            vec![
                Seen::Tick(4),
                Seen::Tick(3),
                Seen::Tick(2),
                Seen::Tick(1),
                Seen::Tick(0),
                Seen::Finish,
            ]
        );
        assert!(countdown.is_finished());
        assert_eq!(countdown.remaining_secs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_follow_the_monotonic_clock() {
        let started = Instant::now();
        let (_countdown, mut rx) = recording(3, false);

        assert_eq!(rx.recv().await, Some(Seen::Tick(2)));
        assert_eq!(Instant::now() - started, Duration::from_secs(1));
        assert_eq!(rx.recv().await, Some(Seen::Tick(1)));
        assert_eq!(Instant::now() - started, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_finish() {
        let (countdown, mut rx) = recording(10, false);

        for expected in [9, 8, 7] {
            assert_eq!(rx.recv().await, Some(Seen::Tick(expected)));
        }
        countdown.stop().await;

        let rest = drain(&mut rx).await;
        assert!(rest.is_empty(), "unexpected callbacks after stop: {rest:?}");
        assert!(!countdown.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_excludes_paused_time() {
        let (countdown, mut rx) = recording(1500, true);

        for expected in (1495..1500).rev() {
            assert_eq!(rx.recv().await, Some(Seen::Tick(expected)));
        }
        assert!(countdown.pause());
        assert!(countdown.is_paused());

        time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err(), "ticked while paused");
        assert_eq!(countdown.remaining_secs(), 1495);
        assert_eq!(countdown.elapsed(), Duration::from_secs(5));

        let resumed_at = Instant::now();
        assert!(countdown.resume());
        assert_eq!(countdown.remaining_secs(), 1495);

        assert_eq!(rx.recv().await, Some(Seen::Tick(1494)));
        assert_eq!(Instant::now() - resumed_at, Duration::from_secs(1));

        countdown.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_pause_resume_without_time_is_neutral() {
        let (countdown, mut rx) = recording(30, true);

        assert_eq!(rx.recv().await, Some(Seen::Tick(29)));
        let before = countdown.elapsed();
        for _ in 0..5 {
            assert!(countdown.pause());
            assert!(!countdown.pause());
            assert!(countdown.resume());
            assert!(!countdown.resume());
        }
        assert_eq!(countdown.elapsed(), before);
        assert_eq!(countdown.remaining_secs(), 29);

        countdown.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn non_pauseable_ignores_pause() {
        let (countdown, mut rx) = recording(3, false);

        assert!(!countdown.pause());
        assert!(!countdown.is_paused());
        assert!(!countdown.resume());

        let seen = drain(&mut rx).await;
        assert_eq!(seen.last(), Some(&Seen::Finish));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_paused_terminates_task() {
        let (countdown, mut rx) = recording(60, true);

        assert_eq!(rx.recv().await, Some(Seen::Tick(59)));
        countdown.pause();
        countdown.stop().await;

        assert!(drain(&mut rx).await.is_empty());
        assert!(!countdown.pause());
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_tick_callback_does_not_kill_countdown() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tick_tx = tx.clone();
        let _countdown = Countdown::start(
            CountdownConfig {
                total_secs: 3,
                pauseable: false,
            },
            Box::new(move |remaining| {
                let _ = tick_tx.send(Seen::Tick(remaining));
                if remaining == 1 {
                    panic!("bad tick handler");
                }
            }),
            Some(Box::new(move || {
                let _ = tx.send(Seen::Finish);
            })),
        )
        .unwrap();

        let seen = drain(&mut rx).await;
        assert_eq!(
            seen,
            vec![Seen::Tick(2), Seen::Tick(1), Seen::Tick(0), Seen::Finish]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_gives_up_on_stuck_tick_callback() {
        let release = Arc::new(Barrier::new(2));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tick_tx = tx.clone();
        let tick_release = release.clone();
        let countdown = Countdown::start(
            CountdownConfig {
                total_secs: 1,
                pauseable: false,
            },
            Box::new(move |remaining| {
                let _ = tick_tx.send(Seen::Tick(remaining));
                tick_release.wait();
            }),
            Some(Box::new(move || {
                let _ = tx.send(Seen::Finish);
            })),
        )
        .unwrap();

        assert_eq!(rx.recv().await, Some(Seen::Tick(0)));

        let stopping = Instant::now();
        countdown.stop().await;
        let waited = stopping.elapsed();
        assert!(waited >= JOIN_TIMEOUT, "returned early: {waited:?}");
        assert!(
            waited < JOIN_TIMEOUT + Duration::from_secs(1),
            "join not bounded: {waited:?}"
        );

        // Let the stuck call return; the finish must not follow it.
        release.wait();
        assert!(drain(&mut rx).await.is_empty());
        assert!(!countdown.is_finished());
    }

    #[tokio::test]
    async fn zero_duration_is_rejected() {
        let result = Countdown::start(
            CountdownConfig {
                total_secs: 0,
                pauseable: true,
            },
            Box::new(|_| {}),
            None,
        );
        assert!(result.is_err());
    }
}
