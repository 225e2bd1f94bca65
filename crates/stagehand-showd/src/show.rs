//! The demo show: a dimmer fade that a blackout cue briefly overrides,
//! and a pan sweep running alongside.
use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use stagehand_core::prelude::*;
use stagehand_model::{Priority, RunnableKind};

pub const FADE_PRIORITY: u32 = 5;
pub const BLACKOUT_PRIORITY: u32 = 10;

const FADE_TIME: Duration = Duration::from_secs(3);

/// Ramp the dimmer to full while holding control of it.
pub fn fade_in(dimmer: Arc<OwnedDevice<f64>>, ctx: &RuntimeContext) -> JobRef {
    Fade::new(dimmer, 0.0, 1.0, FADE_TIME, ctx)
        .named("fade-in")
        .priority(Priority::new(FADE_PRIORITY))
        .into_job()
}

/// Take the dimmer to zero for `hold`, then hand it back.
pub fn blackout(dimmer: Arc<OwnedDevice<f64>>, hold: Duration) -> JobRef {
    JobFn::arc("blackout", move |ctx: JobContext| {
        let dimmer = dimmer.clone();
        async move {
            let token = dimmer.take_control(Priority::new(BLACKOUT_PRIORITY), ctx.job());
            if let Err(e) = dimmer.push(0.0, Some(&token)) {
                warn!(error = %e, "blackout write failed");
            }
            let held = ctx.sleep(hold).await;
            token.release();
            held
        }
    })
}

/// Opening scene: start the fade and the pan sweep.
pub struct Opening {
    pub executor: Executor,
    pub fade: JobRef,
    pub sweep: Arc<SweepEffect>,
}

impl Scene for Opening {
    fn name(&self) -> &str {
        "opening"
    }

    fn run(&self) {
        if self.executor.execute(&self.fade).is_none() {
            warn!("fade already running");
        }
        if let Err(e) = self.sweep.start() {
            warn!(error = %e, "pan sweep did not start");
        }
    }

    fn stop(&self) {
        debug!("opening scene stopped");
    }
}

/// Stand-in for an output universe: logs what the dimmer would send.
pub struct ConsoleUniverse {
    dimmer: Arc<OwnedDevice<f64>>,
    feed: Mutex<Option<Subscription>>,
}

impl ConsoleUniverse {
    pub fn new(dimmer: Arc<OwnedDevice<f64>>) -> Self {
        Self {
            dimmer,
            feed: Mutex::new(None),
        }
    }
}

impl Runnable for ConsoleUniverse {
    fn name(&self) -> &str {
        "console-universe"
    }

    fn kind(&self) -> RunnableKind {
        RunnableKind::OutputHardware
    }

    fn start(&self) {
        let device = self.dimmer.name().to_string();
        match self
            .dimmer
            .subscribe_fn(move |level| debug!(device = %device, level, "dimmer out"))
        {
            Ok(sub) => *self.feed.lock() = Some(sub),
            Err(e) => warn!(error = %e, "dimmer feed unavailable"),
        }
        info!("console universe online");
    }

    fn stop(&self) {
        if let Some(sub) = self.feed.lock().take() {
            sub.unsubscribe();
        }
        info!("console universe offline");
    }
}
