use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::{
    runtime::Handle,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use stagehand_model::SweepSpec;

use crate::{
    context::RuntimeContext,
    error::CoreError,
    metrics::MetricsHandle,
    panic::panic_message,
    sweep::{BusyFlag, SweepFrame, Waveform},
};

/// Callback invoked with every frame a sweeper dispatches.
pub trait SweepJob: Send + Sync + 'static {
    fn on_frame(&self, frame: &SweepFrame);
}

impl<F> SweepJob for F
where
    F: Fn(&SweepFrame) + Send + Sync + 'static,
{
    fn on_frame(&self, frame: &SweepFrame) {
        self(frame)
    }
}

/// What a single [`Sweeper::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Jobs ran with a fresh frame.
    Dispatched,
    /// Previous dispatch still running; this tick was dropped.
    Missed,
    /// One-shot cycle ended: final frame sent and the sweeper paused.
    Finalized,
}

type IterationHook = Arc<dyn Fn(u64) + Send + Sync>;

struct Cursors {
    idx: [usize; 3],
    hits: usize,
    ticks: u64,
    iterations: u64,
    ended: bool,
}

impl Cursors {
    fn at_start(points: usize, iterations: u64) -> Self {
        Self {
            idx: [0, points / 4, points / 2],
            hits: 0,
            ticks: 0,
            iterations,
            ended: false,
        }
    }
}

enum Step {
    Final(SweepFrame),
    Regular {
        frame: SweepFrame,
        completed: Option<u64>,
    },
}

struct Shared {
    name: String,
    spec: SweepSpec,
    cursors: Mutex<Cursors>,
    jobs: Mutex<Vec<Arc<dyn SweepJob>>>,
    dispatch: BusyFlag,
    missed: AtomicU64,
    one_shot: AtomicBool,
    /// Bumped by every pause; a timer tick only dispatches for the run it was started in.
    run: AtomicU64,
    on_iteration: Mutex<Option<IterationHook>>,
    timer: Mutex<Option<CancellationToken>>,
    runtime: Option<Handle>,
    metrics: MetricsHandle,
}

/// Fixed-interval tick generator.
///
/// Cloning yields another handle to the same sweeper. The timer only keeps a
/// weak reference, so dropping every handle stops it.
#[derive(Clone)]
pub struct Sweeper {
    shared: Arc<Shared>,
}

impl Sweeper {
    /// Build a sweeper from `spec`.
    ///
    /// Fails when `spec` has fewer than two points or a zero interval, or
    /// when `start_running` is set outside a tokio runtime.
    pub fn new(
        name: impl Into<String>,
        spec: SweepSpec,
        ctx: &RuntimeContext,
    ) -> Result<Self, CoreError> {
        spec.validate()?;
        let points = spec.points as usize;
        let sweeper = Self {
            shared: Arc::new(Shared {
                name: name.into(),
                spec,
                cursors: Mutex::new(Cursors::at_start(points, 0)),
                jobs: Mutex::new(Vec::new()),
                dispatch: BusyFlag::new(),
                missed: AtomicU64::new(0),
                one_shot: AtomicBool::new(spec.one_shot),
                run: AtomicU64::new(0),
                on_iteration: Mutex::new(None),
                timer: Mutex::new(None),
                runtime: Handle::try_current().ok(),
                metrics: ctx.metrics().clone(),
            }),
        };
        debug!(
            sweeper = %sweeper.shared.name,
            interval_ms = spec.interval_ms,
            points,
            one_shot = spec.one_shot,
            "sweeper created"
        );

        if spec.start_running {
            sweeper.resume()?;
        }
        Ok(sweeper)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn spec(&self) -> &SweepSpec {
        &self.shared.spec
    }

    /// Switch one-shot mode on or off.
    pub fn one_shot(&self, one_shot: bool) -> &Self {
        self.shared.one_shot.store(one_shot, Ordering::Relaxed);
        self
    }

    /// Add a job. Takes effect from the next dispatch.
    pub fn register(&self, job: Arc<dyn SweepJob>) -> &Self {
        self.shared.jobs.lock().push(job);
        self
    }

    pub fn register_fn<F>(&self, f: F) -> &Self
    where
        F: Fn(&SweepFrame) + Send + Sync + 'static,
    {
        self.register(Arc::new(f))
    }

    /// Install a hook called with the iteration count after every full cycle.
    pub fn on_iteration<F>(&self, hook: F) -> &Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        *self.shared.on_iteration.lock() = Some(Arc::new(hook));
        self
    }

    /// Start the timer. The first tick fires immediately.
    pub fn resume(&self) -> Result<(), CoreError> {
        let mut timer = self.shared.timer.lock();
        if timer.is_some() {
            return Ok(());
        }

        let handle = match &self.shared.runtime {
            Some(h) => h.clone(),
            None => Handle::try_current().map_err(|_| CoreError::NoRuntime)?,
        };
        let token = CancellationToken::new();
        let period = Duration::from_millis(self.shared.spec.interval_ms);
        let run = self.shared.run.load(Ordering::Acquire);
        handle.spawn(run_timer(
            Arc::downgrade(&self.shared),
            token.clone(),
            period,
            run,
        ));
        *timer = Some(token);

        debug!(sweeper = %self.shared.name, "sweeper resumed");
        Ok(())
    }

    /// Stop the timer.
    ///
    /// A timer tick that has not dispatched yet is dropped; one already
    /// dispatching finishes first for anyone who then takes the dispatch flag.
    pub fn pause(&self) {
        let mut timer = self.shared.timer.lock();
        if let Some(token) = timer.take() {
            self.shared.run.fetch_add(1, Ordering::AcqRel);
            token.cancel();
            debug!(sweeper = %self.shared.name, "sweeper paused");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.timer.lock().is_some()
    }

    /// Put the cursors back at their starting phases and zero the tick count.
    ///
    /// Leaves the timer running or paused as it was.
    pub fn reset(&self) {
        let points = self.points();
        let mut c = self.shared.cursors.lock();
        *c = Cursors::at_start(points, c.iterations);
    }

    /// Pause, reset and push the starting frame once without advancing.
    pub fn prime(&self) -> TickOutcome {
        self.pause();
        self.reset();

        let frame = self.current_frame();
        self.try_dispatch(frame)
    }

    /// Send explicit values to every job, waiting for any running dispatch.
    pub fn force_value(
        &self,
        zero_to_one: f64,
        negative_one_to_one: f64,
        zero_to_one_to_zero: f64,
        total_ticks: u64,
    ) {
        let mut frame = SweepFrame::forced(
            zero_to_one,
            negative_one_to_one,
            zero_to_one_to_zero,
            total_ticks,
        );
        frame.position = self.shared.cursors.lock().idx[0];

        let _busy = self.shared.dispatch.acquire();
        self.dispatch(&frame);
    }

    /// Run one tick now.
    ///
    /// The timer calls this on every interval; tests and manual drivers may
    /// call it directly.
    pub fn tick(&self) -> TickOutcome {
        match self.step() {
            Step::Final(frame) => {
                self.pause();
                let _busy = self.shared.dispatch.acquire();
                self.finish(&frame)
            }
            Step::Regular { frame, completed } => {
                let outcome = self.try_dispatch(frame);
                self.completed(completed);
                outcome
            }
        }
    }

    /// Tick on behalf of the timer started for `run`.
    ///
    /// Returns `None` without touching anything once that run was paused.
    /// The run is checked again after the dispatch flag is taken, so a frame
    /// can never follow a `pause` plus `force_value` issued in between.
    fn timer_tick(&self, run: u64) -> Option<TickOutcome> {
        if !self.in_run(run) {
            return None;
        }
        match self.step() {
            Step::Final(frame) => {
                let _busy = self.shared.dispatch.acquire();
                if !self.end_run(run) {
                    return None;
                }
                Some(self.finish(&frame))
            }
            Step::Regular { frame, completed } => {
                let outcome = match self.shared.dispatch.try_acquire() {
                    Some(_busy) if self.in_run(run) => {
                        self.dispatch(&frame);
                        TickOutcome::Dispatched
                    }
                    Some(_) => return None,
                    None => self.missed(&frame),
                };
                self.completed(completed);
                Some(outcome)
            }
        }
    }

    fn in_run(&self, run: u64) -> bool {
        self.shared.run.load(Ordering::Acquire) == run
    }

    /// Pause from inside `run`'s own timer. `false` if something else paused it first.
    fn end_run(&self, run: u64) -> bool {
        let mut timer = self.shared.timer.lock();
        if !self.in_run(run) {
            return false;
        }
        if let Some(token) = timer.take() {
            self.shared.run.fetch_add(1, Ordering::AcqRel);
            token.cancel();
        }
        true
    }

    /// Caller must hold the dispatch flag.
    fn finish(&self, frame: &SweepFrame) -> TickOutcome {
        self.dispatch(frame);
        debug!(sweeper = %self.shared.name, "one-shot sweep finished");
        TickOutcome::Finalized
    }

    fn completed(&self, completed: Option<u64>) {
        if let Some(iteration) = completed {
            let hook = self.shared.on_iteration.lock().clone();
            if let Some(hook) = hook {
                hook(iteration);
            }
        }
    }

    /// Snapshot the frame for this tick and advance, in one critical section.
    fn step(&self) -> Step {
        let points = self.points();
        let mut c = self.shared.cursors.lock();

        if c.ended {
            c.ended = false;
            return Step::Final(SweepFrame {
                zero_to_one: Waveform::Ramp.end(),
                negative_one_to_one: Waveform::Sine.end(),
                zero_to_one_to_zero: Waveform::Hump.end(),
                forced: false,
                total_ticks: c.ticks,
                is_final: true,
                position: points,
            });
        }

        let frame = frame_at(&c, points);

        for idx in c.idx.iter_mut() {
            *idx = (*idx + 1) % points;
        }
        c.ticks += 1;
        c.hits += 1;

        let mut completed = None;
        if c.hits >= points {
            c.hits = 0;
            c.iterations += 1;
            if self.shared.one_shot.load(Ordering::Relaxed) {
                c.ended = true;
            }
            completed = Some(c.iterations);
        }
        Step::Regular { frame, completed }
    }

    fn try_dispatch(&self, frame: SweepFrame) -> TickOutcome {
        match self.shared.dispatch.try_acquire() {
            Some(_busy) => {
                self.dispatch(&frame);
                TickOutcome::Dispatched
            }
            None => self.missed(&frame),
        }
    }

    fn missed(&self, frame: &SweepFrame) -> TickOutcome {
        let missed = self.shared.missed.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            sweeper = %self.shared.name,
            total_ticks = frame.total_ticks,
            missed,
            "missed tick: previous dispatch still running"
        );
        self.shared.metrics.record_missed_tick(&self.shared.name);
        TickOutcome::Missed
    }

    /// Caller must hold the dispatch flag.
    fn dispatch(&self, frame: &SweepFrame) {
        let jobs = self.shared.jobs.lock().clone();
        for job in &jobs {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| job.on_frame(frame))) {
                error!(
                    sweeper = %self.shared.name,
                    reason = %panic_message(panic.as_ref()),
                    "sweep job panicked"
                );
            }
        }
    }

    fn current_frame(&self) -> SweepFrame {
        let c = self.shared.cursors.lock();
        frame_at(&c, self.points())
    }

    fn points(&self) -> usize {
        self.shared.spec.points as usize
    }

    pub fn missed_ticks(&self) -> u64 {
        self.shared.missed.load(Ordering::Relaxed)
    }

    pub fn total_ticks(&self) -> u64 {
        self.shared.cursors.lock().ticks
    }

    pub fn iterations(&self) -> u64 {
        self.shared.cursors.lock().iterations
    }

    /// Current position of the three cursors.
    pub fn positions(&self) -> [usize; 3] {
        self.shared.cursors.lock().idx
    }
}

fn frame_at(c: &Cursors, points: usize) -> SweepFrame {
    SweepFrame {
        zero_to_one: Waveform::Ramp.sample(c.idx[0], points),
        negative_one_to_one: Waveform::Sine.sample(c.idx[1], points),
        zero_to_one_to_zero: Waveform::Hump.sample(c.idx[2], points),
        forced: false,
        total_ticks: c.ticks,
        is_final: false,
        position: c.idx[0],
    }
}

async fn run_timer(
    shared: Weak<Shared>,
    token: CancellationToken,
    period: Duration,
    run: u64,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                let sweeper = Sweeper { shared };
                // jobs may block; keep them off the timer task
                tokio::task::spawn_blocking(move || {
                    sweeper.timer_tick(run);
                });
            }
        }
    }
}

impl fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sweeper")
            .field("name", &self.shared.name)
            .field("spec", &self.shared.spec)
            .field("running", &self.is_running())
            .field("missed", &self.missed_ticks())
            .finish()
    }
}
