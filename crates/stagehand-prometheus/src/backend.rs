use std::sync::Arc;

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};

use stagehand_core::{JobOutcome, MetricsBackend};

const NAMESPACE: &str = "stagehand";

/// Show jobs range from a one-frame cue to a fade lasting minutes.
const DURATION_BUCKETS: &[f64] = &[0.005, 0.025, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0];

/// Prometheus implementation of [`MetricsBackend`].
///
/// ## Label cardinality
/// - `job`, `sweeper`: names chosen by the show author, bounded per show
/// - `outcome`: "completed", "faulted", "cancelled"
#[derive(Clone)]
pub struct PrometheusMetrics {
    jobs_started: CounterVec,
    jobs_completed: CounterVec,
    job_duration: HistogramVec,
    missed_ticks: CounterVec,
    registry: Arc<Registry>,
}

impl PrometheusMetrics {
    /// Register the stagehand metrics in `registry`.
    pub fn new_with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let jobs_started = CounterVec::new(
            Opts::new("jobs_started_total", "Job instances that entered Running").namespace(NAMESPACE),
            &["job"],
        )?;
        registry.register(Box::new(jobs_started.clone()))?;

        let jobs_completed = CounterVec::new(
            Opts::new("jobs_completed_total", "Job instances that reached a terminal state")
                .namespace(NAMESPACE),
            &["job", "outcome"],
        )?;
        registry.register(Box::new(jobs_completed.clone()))?;

        let job_duration = HistogramVec::new(
            HistogramOpts::new("job_duration_seconds", "Time job instances spent running")
                .namespace(NAMESPACE)
                .buckets(DURATION_BUCKETS.to_vec()),
            &["job"],
        )?;
        registry.register(Box::new(job_duration.clone()))?;

        let missed_ticks = CounterVec::new(
            Opts::new(
                "sweeper_missed_ticks_total",
                "Ticks skipped because the previous dispatch was still running",
            )
            .namespace(NAMESPACE),
            &["sweeper"],
        )?;
        registry.register(Box::new(missed_ticks.clone()))?;

        Ok(Self {
            jobs_started,
            jobs_completed,
            job_duration,
            missed_ticks,
            registry,
        })
    }

    /// Backend with a private registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::new_with_registry(Arc::new(Registry::new()))
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Current metrics in the text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_job_started(&self, job: &str) {
        self.jobs_started.with_label_values(&[job]).inc();
    }

    fn record_job_completed(&self, job: &str, outcome: JobOutcome, duration_ms: u64) {
        self.jobs_completed
            .with_label_values(&[job, outcome.as_label()])
            .inc();
        self.job_duration
            .with_label_values(&[job])
            .observe(duration_ms as f64 / 1000.0);
    }

    fn record_missed_tick(&self, sweeper: &str) {
        self.missed_ticks.with_label_values(&[sweeper]).inc();
    }
}
