//! Debounce scheduler.
//!
//! Turns a burst of change notifications into one run of a job, started once
//! the notifications have been quiet for `D` (the quiet window), and never
//! runs two jobs at once.
//!
//! ```text
//!           trigger                 timer fires
//!   Idle ─────────────▶ Pending ─────────────────▶ Running
//!    ▲                  │  ▲ trigger (re-arm)       │    │ trigger
//!    │                  └──┘                        │    ▼
//!    │            job done, no rerun                │  RunningWithRerun
//!    └──────────────────────────────────────────────┘    │ job done
//!                       Pending ◀─────────────────────────┘
//! ```
//!
//! Each armed timer is a tokio task tagged with a generation number. Arming a
//! new timer aborts the previous one and bumps the generation, so a timer that
//! wakes up after it was superseded finds a stale generation and does nothing.
//! All state sits behind one lock, held only across synchronous transitions.
//!
//! `trigger()` never arms a timer while a run is in flight; it only records
//! the rerun. A timer that still fires during a run re-arms instead of
//! starting a second job.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Job = Arc<dyn Fn() -> JobFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    /// A timer is armed.
    Pending,
    Running,
    /// Running, and at least one trigger arrived since the run started.
    RunningWithRerun,
}

struct Timer {
    generation: u64,
    task: AbortHandle,
}

#[derive(Default)]
struct State {
    running: bool,
    rerun_requested: bool,
    timer: Option<Timer>,
    generation: u64,
}

struct Inner {
    quiet_window: Duration,
    job: Job,
    handle: Handle,
    state: Mutex<State>,
}

/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Timers (and therefore the job) are spawned on `handle`.
    pub fn new<F, Fut>(handle: Handle, quiet_window: Duration, job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job: Job = Arc::new(move || -> JobFuture { Box::pin(job()) });
        Self {
            inner: Arc::new(Inner {
                quiet_window,
                job,
                handle,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn quiet_window(&self) -> Duration {
        self.inner.quiet_window
    }

    /// Note that the source changed. Safe to call from any thread.
    pub fn trigger(&self) {
        let mut state = self.inner.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.task.abort();
        }
        if state.running {
            if !state.rerun_requested {
                tracing::debug!("change during sync, one more run queued");
            }
            state.rerun_requested = true;
            return;
        }
        self.arm(&mut state);
    }

    pub fn state(&self) -> SchedulerState {
        let state = self.inner.state.lock();
        match (state.running, state.rerun_requested, state.timer.is_some()) {
            (true, true, _) => SchedulerState::RunningWithRerun,
            (true, false, _) => SchedulerState::Running,
            (false, _, true) => SchedulerState::Pending,
            (false, _, false) => SchedulerState::Idle,
        }
    }

    fn arm(&self, state: &mut State) {
        state.generation += 1;
        let generation = state.generation;
        let delay = self.inner.quiet_window;
        let scheduler = self.clone();
        let task = self.inner.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.fire(generation).await;
        });
        state.timer = Some(Timer {
            generation,
            task: task.abort_handle(),
        });
        tracing::debug!(delay_ms = delay.as_millis() as u64, generation, "sync scheduled");
    }

    async fn fire(self, generation: u64) {
        {
            let mut state = self.inner.state.lock();
            match &state.timer {
                Some(timer) if timer.generation == generation => {}
                _ => return,
            }
            // From here on the task runs the job and must not be aborted.
            state.timer = None;
            if state.running {
                self.arm(&mut state);
                return;
            }
            state.running = true;
        }

        (self.inner.job)().await;

        let mut state = self.inner.state.lock();
        state.running = false;
        if state.rerun_requested {
            state.rerun_requested = false;
            self.arm(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::{sleep, Instant};

    use super::*;

    /// Records the start instant of every run; each run takes `run_time`.
    struct Recorder {
        starts: Arc<Mutex<Vec<Instant>>>,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
    }

    fn recording_scheduler(quiet_window: Duration, run_time: Duration) -> (Scheduler, Recorder) {
        let recorder = Recorder {
            starts: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        };
        let starts = recorder.starts.clone();
        let active = recorder.active.clone();
        let max_active = recorder.max_active.clone();
        let scheduler = Scheduler::new(Handle::current(), quiet_window, move || {
            let starts = starts.clone();
            let active = active.clone();
            let max_active = max_active.clone();
            async move {
                starts.lock().push(Instant::now());
                let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now_active, Ordering::SeqCst);
                sleep(run_time).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }
        });
        (scheduler, recorder)
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[tokio::test(start_paused = true)]
    async fn triggers_within_the_window_coalesce() {
        let (scheduler, recorder) = recording_scheduler(secs(5.0), Duration::ZERO);
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        scheduler.trigger();
        sleep(secs(1.0)).await;
        scheduler.trigger();
        sleep(secs(1.0)).await;
        scheduler.trigger();
        assert_eq!(scheduler.state(), SchedulerState::Pending);

        // Last trigger at t=2, so the run starts at t=7.
        sleep(secs(4.9)).await;
        assert!(recorder.starts.lock().is_empty());

        sleep(secs(0.2)).await;
        assert_eq!(recorder.starts.lock().len(), 1);

        sleep(secs(30.0)).await;
        assert_eq!(recorder.starts.lock().len(), 1);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn triggers_during_a_run_queue_exactly_one_more() {
        let (scheduler, recorder) = recording_scheduler(secs(1.0), secs(4.0));

        scheduler.trigger();
        sleep(secs(1.5)).await;
        assert_eq!(scheduler.state(), SchedulerState::Running);

        // The first run lasts from t=1 to t=5.
        for _ in 0..3 {
            scheduler.trigger();
            sleep(secs(0.5)).await;
        }
        assert_eq!(scheduler.state(), SchedulerState::RunningWithRerun);
        assert_eq!(recorder.starts.lock().len(), 1);

        sleep(secs(2.5)).await; // t=5.5
        assert_eq!(scheduler.state(), SchedulerState::Pending);

        sleep(secs(1.0)).await; // t=6.5
        assert_eq!(scheduler.state(), SchedulerState::Running);

        sleep(secs(30.0)).await;
        let starts = recorder.starts.lock().clone();
        assert_eq!(starts.len(), 2);
        let gap = starts[1] - starts[0];
        assert!(gap >= secs(4.9) && gap <= secs(5.1), "second run starts D after the first ends, gap {gap:?}");
        assert_eq!(recorder.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_firing_during_a_run_waits_for_it() {
        let (scheduler, recorder) = recording_scheduler(secs(5.0), secs(20.0));

        scheduler.trigger();
        sleep(secs(6.0)).await; // the run lasts from t=5 to t=25
        assert_eq!(scheduler.state(), SchedulerState::Running);
        {
            let mut state = scheduler.inner.state.lock();
            scheduler.arm(&mut state);
        }

        // Fires at t=11, 16 and 21 while the run is in flight, then at t=26.
        sleep(secs(18.0)).await; // t=24
        assert_eq!(recorder.starts.lock().len(), 1);
        assert_eq!(recorder.max_active.load(Ordering::SeqCst), 1);

        sleep(secs(3.0)).await; // t=27
        let starts = recorder.starts.lock().clone();
        assert_eq!(starts.len(), 2);
        let gap = starts[1] - starts[0];
        assert!(gap >= secs(20.9) && gap <= secs(21.1), "gap {gap:?}");
        assert_eq!(recorder.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_scheduler_never_runs() {
        let (_scheduler, recorder) = recording_scheduler(secs(1.0), Duration::ZERO);
        sleep(secs(60.0)).await;
        assert!(recorder.starts.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn separate_bursts_run_separately() {
        let (scheduler, recorder) = recording_scheduler(secs(2.0), secs(0.5));

        scheduler.trigger();
        sleep(secs(10.0)).await;
        scheduler.trigger();
        scheduler.trigger();
        sleep(secs(10.0)).await;

        assert_eq!(recorder.starts.lock().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn trigger_from_a_plain_thread() {
        let (scheduler, recorder) = recording_scheduler(Duration::from_millis(20), Duration::ZERO);

        let remote = scheduler.clone();
        std::thread::spawn(move || remote.trigger())
            .join()
            .expect("trigger thread");

        let deadline = Instant::now() + Duration::from_secs(5);
        while recorder.starts.lock().is_empty() && Instant::now() < deadline {
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(recorder.starts.lock().len(), 1);
    }
}
