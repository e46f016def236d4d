//! Deferred work: autofocus, dropdown settling, async validation.
//!
//! Fields never sleep or spawn on their own; they hand work to an injected
//! [`Scheduler`]. [`TokioScheduler`] runs it on a tokio runtime,
//! [`ManualScheduler`] keeps a virtual clock that the host (or a test)
//! advances explicitly.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::BoxFuture;
use futures::task::noop_waker_ref;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Scheduler: Send + Sync {
    /// Run `task` once `delay` has elapsed.
    fn after(&self, delay: Duration, task: Task);

    /// Drive `future` to completion in the background.
    fn spawn(&self, future: BoxFuture<'static, ()>);

    /// Future that resolves once `delay` has elapsed.
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel();
        self.after(
            delay,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        async move {
            let _ = rx.await;
        }
        .boxed()
    }
}

/// Delays used by fields and the form, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Focus after the first configuration, outlasting layout settling.
    pub autofocus_ms: u64,
    /// `set_focus` / `select_all` requests on text inputs.
    pub focus_ms: u64,
    /// How long a save flow waits for async validators.
    pub settle_ms: u64,
    /// Dropdown open animation.
    pub dropdown_settle_ms: u64,
    /// Temporary dropdown styling is removed this long after closing.
    pub dropdown_close_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            autofocus_ms: 400,
            focus_ms: 200,
            settle_ms: 300,
            dropdown_settle_ms: 100,
            dropdown_close_ms: 200,
        }
    }
}

impl Timing {
    pub fn autofocus(&self) -> Duration {
        Duration::from_millis(self.autofocus_ms)
    }

    pub fn focus(&self) -> Duration {
        Duration::from_millis(self.focus_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn dropdown_settle(&self) -> Duration {
        Duration::from_millis(self.dropdown_settle_ms)
    }

    pub fn dropdown_close(&self) -> Duration {
        Duration::from_millis(self.dropdown_close_ms)
    }
}

/// Scheduler backed by a tokio runtime handle.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Scheduler for the runtime the caller is running on, if any.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn after(&self, delay: Duration, task: Task) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }

    fn spawn(&self, future: BoxFuture<'static, ()>) {
        self.handle.spawn(future);
    }

    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()> {
        let _guard = self.handle.enter();
        tokio::time::sleep(delay).boxed()
    }
}

struct Timer {
    due: Duration,
    seq: u64,
    task: Task,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    seq: u64,
    timers: Vec<Timer>,
    futures: Vec<BoxFuture<'static, ()>>,
}

/// Host-driven scheduler with a virtual clock.
///
/// Nothing runs until [`ManualScheduler::advance`] or
/// [`ManualScheduler::run_pending`] is called. Timers fire in due order
/// (insertion order for equal deadlines); spawned futures are polled until
/// they stop making progress.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.lock().now
    }

    pub fn pending_timers(&self) -> usize {
        self.lock().timers.len()
    }

    pub fn pending_futures(&self) -> usize {
        self.lock().futures.len()
    }

    /// Move the clock forward, firing every timer that becomes due and
    /// polling spawned futures in between.
    pub fn advance(&self, by: Duration) {
        let target = self.lock().now + by;
        self.run_pending();
        while let Some(timer) = self.take_due(target) {
            self.lock().now = timer.due;
            (timer.task)();
            self.run_pending();
        }
        self.lock().now = target;
    }

    /// Poll spawned futures until none of them makes progress.
    pub fn run_pending(&self) {
        let mut cx = Context::from_waker(noop_waker_ref());
        loop {
            let batch = std::mem::take(&mut self.lock().futures);
            if batch.is_empty() {
                return;
            }
            let before = batch.len();
            let mut still_pending = Vec::new();
            for mut future in batch {
                if let Poll::Pending = future.poll_unpin(&mut cx) {
                    still_pending.push(future);
                }
            }
            let progressed = still_pending.len() < before;
            let mut state = self.lock();
            // futures spawned while polling were queued meanwhile
            let spawned = !state.futures.is_empty();
            still_pending.append(&mut state.futures);
            state.futures = still_pending;
            if !progressed && !spawned {
                return;
            }
        }
    }

    fn take_due(&self, limit: Duration) -> Option<Timer> {
        let mut state = self.lock();
        let index = state
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= limit)
            .min_by_key(|(_, t)| (t.due, t.seq))
            .map(|(i, _)| i)?;
        Some(state.timers.remove(index))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for ManualScheduler {
    fn after(&self, delay: Duration, task: Task) {
        let mut state = self.lock();
        let due = state.now + delay;
        let seq = state.seq;
        state.seq += 1;
        state.timers.push(Timer { due, seq, task });
    }

    fn spawn(&self, future: BoxFuture<'static, ()>) {
        self.lock().futures.push(future);
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("timers", &state.timers.len())
            .field("futures", &state.futures.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn log_task(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Task {
        let log = log.clone();
        Box::new(move || log.lock().unwrap().push(name))
    }

    #[test]
    fn timers_fire_in_due_order() {
        let scheduler = ManualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        scheduler.after(Duration::from_millis(400), log_task(&log, "focus"));
        scheduler.after(Duration::from_millis(100), log_task(&log, "dropdown"));
        scheduler.after(Duration::from_millis(100), log_task(&log, "dropdown-2"));

        scheduler.advance(Duration::from_millis(99));
        assert!(log.lock().unwrap().is_empty());
        scheduler.advance(Duration::from_millis(1));
        assert_eq!(*log.lock().unwrap(), vec!["dropdown", "dropdown-2"]);
        scheduler.advance(Duration::from_millis(300));
        assert_eq!(*log.lock().unwrap(), vec!["dropdown", "dropdown-2", "focus"]);
        assert_eq!(scheduler.now(), Duration::from_millis(400));
    }

    #[test]
    fn timers_scheduled_by_timers_respect_the_clock() {
        let scheduler = ManualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner = scheduler.clone();
        let nested = log_task(&log, "nested");
        scheduler.after(
            Duration::from_millis(10),
            Box::new(move || inner.after(Duration::from_millis(10), nested)),
        );
        scheduler.advance(Duration::from_millis(15));
        assert!(log.lock().unwrap().is_empty());
        scheduler.advance(Duration::from_millis(5));
        assert_eq!(*log.lock().unwrap(), vec!["nested"]);
    }

    #[test]
    fn sleep_resolves_after_advance() {
        let scheduler = ManualScheduler::new();
        let done = Arc::new(AtomicBool::new(false));
        let sleep = scheduler.sleep(Duration::from_millis(300));
        {
            let done = done.clone();
            scheduler.spawn(
                async move {
                    sleep.await;
                    done.store(true, Ordering::SeqCst);
                }
                .boxed(),
            );
        }
        scheduler.advance(Duration::from_millis(299));
        assert!(!done.load(Ordering::SeqCst));
        scheduler.advance(Duration::from_millis(1));
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(scheduler.pending_futures(), 0);
    }

    #[test]
    fn default_timing() {
        let timing = Timing::default();
        assert_eq!(timing.autofocus(), Duration::from_millis(400));
        assert_eq!(timing.settle(), Duration::from_millis(300));
        assert_eq!(timing.dropdown_settle(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_runs_timers() {
        let scheduler = TokioScheduler::current().expect("inside runtime");
        let (tx, rx) = oneshot::channel();
        scheduler.after(
            Duration::from_millis(50),
            Box::new(move || {
                let _ = tx.send(7);
            }),
        );
        assert_eq!(rx.await.unwrap(), 7);
    }
}
