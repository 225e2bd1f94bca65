mod show;

use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use stagehand_core::prelude::*;
use stagehand_model::SweepSpec;
use stagehand_observe::{
    JobEventLogger, LoggerConfig, LoggerLevel, LoggerTimeZone, OwnerChangeLogger, init_local_offset,
    init_logger, timezone_sync,
};
use stagehand_prometheus::PrometheusMetrics;

use show::{ConsoleUniverse, Opening, blackout, fade_in};

/// How long the demo runs before shutting itself down.
const SHOW_LENGTH: Duration = Duration::from_secs(8);

fn main() -> anyhow::Result<()> {
    // 1) offset detection must happen before any runtime thread exists
    init_local_offset();

    // 2) logger
    let cfg = LoggerConfig {
        level: LoggerLevel::new("info")?,
        tz: LoggerTimeZone::Local,
        ..Default::default()
    };
    init_logger(&cfg)?;
    info!("logger initialized");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("stagehand-worker")
        .build()?
        .block_on(run_show())
}

async fn run_show() -> anyhow::Result<()> {
    // 3) metrics + runtime context
    let metrics = PrometheusMetrics::new()?;
    let ctx = RuntimeContext::default().with_metrics(Arc::new(metrics.clone()));
    info!(%ctx, "runtime context ready");

    // 4) executor, arbiter and their loggers
    let executor = Executor::new(ctx.clone())?;
    let arbiter = OwnershipArbiter::new();
    let _job_log = JobEventLogger::attach(&executor)?;
    let _owner_log = OwnerChangeLogger::attach(&arbiter)?;

    // 5) devices
    let dimmer = Arc::new(OwnedDevice::new(&arbiter, "front-dimmer", 0.0_f64).with_master_power());
    let pan = Arc::new(OwnedDevice::new(&arbiter, "spot-pan", 0.5_f64));
    executor.register(Entity::Device(dimmer.clone()))?;
    executor.register(Entity::Device(pan.clone()))?;
    executor.register(Entity::Runnable(Arc::new(ConsoleUniverse::new(dimmer.clone()))))?;

    // 6) pan sweep, 2s per cycle, mapped onto 0..1
    let sweep = SweepEffect::new(
        "pan-sweep",
        SweepSpec::auto(2_000)?,
        SweepShape::custom(|f| (f.negative_one_to_one + 1.0) / 2.0),
        &ctx,
    )?;
    {
        let pan = pan.clone();
        sweep.connect_fn(move |v| {
            if let Err(e) = pan.push(v, None) {
                debug!(error = %e, "pan write dropped");
            }
        });
    }
    executor.register(Entity::Effect(sweep.clone()))?;

    // 7) scene
    executor.register(Entity::Scene(Arc::new(Opening {
        executor: executor.clone(),
        fade: fade_in(dimmer.clone(), &ctx),
        sweep: sweep.clone(),
    })))?;

    // 8) internal timezone sync
    let tz = timezone_sync();
    executor.execute(&tz);

    executor.run();

    // 9) blackout cue overrides the fade for a second, owned by this thread
    {
        let runner = executor.clone();
        let cue = blackout(dimmer.clone(), Duration::from_secs(1));
        executor.spawn_managed("blackout-cue", move |ctx| async move {
            ctx.sleep(Duration::from_millis(1_200)).await?;
            runner.execute_and_wait(&cue).await;
            Ok(())
        });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        _ = tokio::time::sleep(SHOW_LENGTH) => info!("show length reached"),
    }

    let cues = executor.wait_for_managed_tasks(true).await;
    debug!(cues, "managed cues collected");

    if !executor.shutdown().await {
        warn!(stuck = ?executor.active_jobs(), "some jobs outlived the stop budget");
    }
    info!(
        missed_ticks = sweep.sweeper().missed_ticks(),
        dimmer = dimmer.value().unwrap_or_default(),
        "show over"
    );
    debug!(metrics = %metrics.encode_text()?, "final metrics");
    Ok(())
}
