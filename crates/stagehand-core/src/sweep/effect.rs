use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use parking_lot::Mutex;
use tracing::{debug, info};

use stagehand_model::SweepSpec;

use crate::{
    cell::BroadcastCell,
    context::RuntimeContext,
    error::CoreError,
    executor::Effect,
    sweep::{SweepFrame, Sweeper},
};

type Output = Arc<dyn Fn(f64) + Send + Sync>;

/// Maps a frame onto the single value an effect emits.
#[derive(Clone)]
pub enum SweepShape {
    Ramp,
    Sine,
    Hump,
    Custom(Arc<dyn Fn(&SweepFrame) -> f64 + Send + Sync>),
}

impl SweepShape {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&SweepFrame) -> f64 + Send + Sync + 'static,
    {
        SweepShape::Custom(Arc::new(f))
    }

    pub fn value(&self, frame: &SweepFrame) -> f64 {
        match self {
            SweepShape::Ramp => frame.zero_to_one,
            SweepShape::Sine => frame.negative_one_to_one,
            SweepShape::Hump => frame.zero_to_one_to_zero,
            SweepShape::Custom(f) => f(frame),
        }
    }
}

impl fmt::Debug for SweepShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepShape::Ramp => f.write_str("Ramp"),
            SweepShape::Sine => f.write_str("Sine"),
            SweepShape::Hump => f.write_str("Hump"),
            SweepShape::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Effect driven by its own sweeper.
///
/// Every frame is reduced to one value through a [`SweepShape`] and written
/// to all connected outputs. Stopping pauses the sweeper and forces zero.
pub struct SweepEffect {
    name: String,
    sweeper: Sweeper,
    outputs: Arc<Mutex<Vec<Output>>>,
    running: AtomicBool,
}

impl SweepEffect {
    pub fn new(
        name: impl Into<String>,
        spec: SweepSpec,
        shape: SweepShape,
        ctx: &RuntimeContext,
    ) -> Result<Arc<Self>, CoreError> {
        let name = name.into();
        let sweeper = Sweeper::new(name.clone(), spec.start_running(false), ctx)?;
        // fan-out slower than one master tick is worth a log line
        let slow_output = ctx.config().tick_interval();
        let outputs: Arc<Mutex<Vec<Output>>> = Arc::new(Mutex::new(Vec::new()));

        {
            let outputs = outputs.clone();
            let name = name.clone();
            sweeper.register_fn(move |frame: &SweepFrame| {
                let value = shape.value(frame);
                let targets = outputs.lock().clone();

                let started = Instant::now();
                for out in &targets {
                    out(value);
                }
                let elapsed = started.elapsed();
                if elapsed > slow_output {
                    info!(
                        effect = %name,
                        outputs = targets.len(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "slow effect output"
                    );
                }
            });
        }

        let effect = Arc::new(Self {
            name,
            sweeper,
            outputs,
            running: AtomicBool::new(false),
        });
        if spec.start_running {
            effect.start()?;
        }
        Ok(effect)
    }

    /// Effect on the configured default sweep.
    pub fn with_default_sweep(
        name: impl Into<String>,
        shape: SweepShape,
        ctx: &RuntimeContext,
    ) -> Result<Arc<Self>, CoreError> {
        Self::new(name, ctx.config().sweep, shape, ctx)
    }

    /// Feed every emitted value into `cell`.
    pub fn connect_to(&self, cell: BroadcastCell<f64>) -> &Self {
        let name = self.name.clone();
        self.connect_fn(move |v| {
            if let Err(e) = cell.set(v) {
                debug!(effect = %name, error = %e, "effect output rejected");
            }
        })
    }

    pub fn connect_fn<F>(&self, f: F) -> &Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.outputs.lock().push(Arc::new(f));
        self
    }

    pub fn start(&self) -> Result<(), CoreError> {
        self.sweeper.resume()?;
        self.running.store(true, Ordering::Release);
        debug!(effect = %self.name, "effect started");
        Ok(())
    }

    /// Push the starting value without running.
    pub fn prime(&self) {
        self.sweeper.prime();
    }

    /// Rewind to the start of the cycle and run.
    pub fn restart(&self) -> Result<(), CoreError> {
        self.sweeper.reset();
        self.start()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn sweeper(&self) -> &Sweeper {
        &self.sweeper
    }
}

impl Effect for SweepEffect {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop(&self) {
        self.sweeper.pause();
        self.sweeper.force_value(0.0, 0.0, 0.0, 0);
        self.running.store(false, Ordering::Release);
        debug!(effect = %self.name, "effect stopped");
    }
}

impl fmt::Debug for SweepEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SweepEffect")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("outputs", &self.outputs.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn effect(shape: SweepShape) -> Arc<SweepEffect> {
        let spec = SweepSpec::from_duration(400, 4).unwrap();
        SweepEffect::new("fader", spec, shape, &RuntimeContext::default()).unwrap()
    }

    #[test]
    fn ticks_flow_into_connected_cells() {
        let fx = effect(SweepShape::Ramp);
        let out = BroadcastCell::new(-1.0);
        fx.connect_to(out.clone());

        fx.sweeper().tick();
        assert_eq!(out.read().unwrap(), 0.0);
        fx.sweeper().tick();
        assert_eq!(out.read().unwrap(), 0.25);
    }

    #[test]
    fn stop_forces_outputs_to_zero() {
        let fx = effect(SweepShape::custom(|f| f.zero_to_one * 10.0 + 1.0));
        let out = BroadcastCell::new(0.0);
        fx.connect_to(out.clone());

        fx.sweeper().tick();
        fx.sweeper().tick();
        assert_eq!(out.read().unwrap(), 3.5);

        fx.stop();
        assert_eq!(out.read().unwrap(), 1.0);
        assert!(!fx.is_running());
        assert!(!fx.sweeper().is_running());
    }

    #[test]
    fn disposed_output_does_not_break_the_others() {
        let fx = effect(SweepShape::Hump);
        let dead = BroadcastCell::new(0.0);
        let live = BroadcastCell::new(0.0);
        fx.connect_to(dead.clone()).connect_to(live.clone());
        dead.dispose();

        // the hump cursor starts half a cycle in, at the peak
        fx.sweeper().tick();
        assert!((live.read().unwrap() - 1.0).abs() < 1e-9);
        assert!(dead.is_disposed());
    }

    #[tokio::test]
    async fn start_and_restart_run_the_sweeper() {
        let fx = effect(SweepShape::Sine);
        fx.start().unwrap();
        assert!(fx.is_running());
        assert!(fx.sweeper().is_running());

        fx.stop();
        fx.restart().unwrap();
        assert!(fx.sweeper().is_running());
        fx.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn nothing_reaches_outputs_after_stop() {
        let spec = SweepSpec {
            interval_ms: 1,
            points: 50,
            ..SweepSpec::default()
        };
        for run in 0..40u64 {
            let shape = SweepShape::custom(|f| if f.forced { 0.0 } else { 1.0 + f.zero_to_one });
            let fx = SweepEffect::new("strobe", spec, shape, &RuntimeContext::default()).unwrap();
            let out = BroadcastCell::new(-1.0);
            fx.connect_to(out.clone());

            fx.start().unwrap();
            tokio::time::sleep(Duration::from_millis(2 + run % 5)).await;
            fx.stop();
            tokio::time::sleep(Duration::from_millis(10)).await;

            assert_eq!(out.read().unwrap(), 0.0, "run {run}");
        }
    }

    #[test]
    fn default_sweep_comes_from_config() {
        let mut config = stagehand_model::RuntimeConfig::default();
        config.sweep = SweepSpec::from_duration(300, 3).unwrap();
        let ctx = RuntimeContext::default().with_config(config);

        let fx = SweepEffect::with_default_sweep("house", SweepShape::Ramp, &ctx).unwrap();
        assert_eq!(fx.sweeper().spec().points, 3);
        assert_eq!(fx.sweeper().spec().interval_ms, 100);
        assert!(!fx.is_running());
    }
}
