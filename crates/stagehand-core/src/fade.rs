//! Timed fades on owned devices.
use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, trace};

use stagehand_model::Priority;

use crate::{
    arbiter::{ControlToken, OwnedDevice},
    context::RuntimeContext,
    executor::{Device, Job, JobContext, JobError, JobRef},
};

/// Job that moves a device linearly from one level to another.
///
/// Writes happen on every master tick, with the level computed from the time
/// elapsed rather than the number of ticks, so a late tick catches up instead
/// of stretching the fade. The last write is always the target level.
///
/// With a caller-supplied token the fade writes under it and leaves it held.
/// Without one it claims the device at its priority for the duration and
/// releases that claim when it ends, cancelled or not. While a higher claim
/// holds the device the fade's writes are rejected and the fade keeps running,
/// so it picks up again once that claim goes away.
pub struct Fade {
    name: String,
    device: Arc<OwnedDevice<f64>>,
    from: f64,
    to: f64,
    duration: Duration,
    priority: Priority,
    tick: Duration,
    token: Option<ControlToken>,
}

impl Fade {
    /// Fade `device` from `from` to `to` over `duration`, at the configured
    /// default priority and master tick.
    pub fn new(
        device: Arc<OwnedDevice<f64>>,
        from: f64,
        to: f64,
        duration: Duration,
        ctx: &RuntimeContext,
    ) -> Self {
        let name = format!("fade:{}", device.name());
        Self {
            name,
            device,
            from,
            to,
            duration,
            priority: ctx.config().default_priority,
            tick: ctx.config().tick_interval(),
            token: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Write under an existing claim instead of taking one.
    pub fn with_token(mut self, token: ControlToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn into_job(self) -> JobRef {
        Arc::new(self)
    }

    /// Level `elapsed` into the fade.
    pub fn level_at(&self, elapsed: Duration) -> f64 {
        if self.duration.is_zero() || elapsed >= self.duration {
            return self.to;
        }
        let pos = elapsed.as_secs_f64() / self.duration.as_secs_f64();
        self.from + pos * (self.to - self.from)
    }

    async fn drive(&self, ctx: &JobContext, token: &ControlToken) -> Result<(), JobError> {
        let started = Instant::now();
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(JobError::Canceled),
                _ = ticker.tick() => {
                    let elapsed = started.elapsed();
                    let level = self.level_at(elapsed);
                    let accepted = self
                        .device
                        .push(level, Some(token))
                        .map_err(|e| JobError::fail(e.to_string()))?;
                    if !accepted {
                        trace!(fade = %self.name, level, "fade step rejected: device held");
                    }
                    if elapsed >= self.duration {
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Job for Fade {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: JobContext) -> Result<(), JobError> {
        let (token, claimed) = match &self.token {
            Some(token) => (token.clone(), false),
            None => (self.device.take_control(self.priority, &self.name), true),
        };
        if token.is_inert() {
            debug!(
                fade = %self.name,
                priority = %self.priority,
                "fade is outranked; writes land only while the device is free"
            );
        }

        let result = self.drive(&ctx, &token).await;
        if claimed {
            token.release();
        }
        result
    }
}

impl fmt::Debug for Fade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fade")
            .field("name", &self.name)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("duration", &self.duration)
            .field("priority", &self.priority)
            .finish()
    }
}
