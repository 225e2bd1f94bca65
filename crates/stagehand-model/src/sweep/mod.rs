use serde::{Deserialize, Serialize};

use crate::domain::{DEFAULT_TICK_INTERVAL_MS, IntervalMs, MIN_SWEEP_POINTS};
use crate::error::{ModelError, ModelResult};

/// Sweeps longer than this use the coarse auto resolution.
const AUTO_COARSE_THRESHOLD_MS: u64 = 500;
/// Milliseconds per point for long sweeps.
const AUTO_COARSE_STEP_MS: u64 = 50;
/// Milliseconds per point for short sweeps.
const AUTO_FINE_STEP_MS: u64 = 25;

/// Timing and resolution of a sweeper.
///
/// One full cycle lasts `interval_ms * points`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SweepSpec {
    /// Time between two ticks.
    pub interval_ms: IntervalMs,
    /// Number of logical positions in one cycle (minimum 2).
    pub points: u32,
    /// Halt after one cycle instead of looping.
    pub one_shot: bool,
    /// Start the timer immediately on construction.
    pub start_running: bool,
}

impl Default for SweepSpec {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_TICK_INTERVAL_MS,
            points: 40,
            one_shot: false,
            start_running: false,
        }
    }
}

impl SweepSpec {
    /// Spread `points` ticks evenly over `duration_ms`.
    pub fn from_duration(duration_ms: u64, points: u32) -> ModelResult<Self> {
        if points < MIN_SWEEP_POINTS {
            return Err(ModelError::OutOfRange(format!(
                "points must be at least {MIN_SWEEP_POINTS}, got {points}"
            )));
        }
        let spec = Self {
            interval_ms: duration_ms / u64::from(points),
            points,
            ..Self::default()
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Pick a resolution for `duration_ms` automatically.
    ///
    /// Long sweeps get one point every 50 ms, short ones one every 25 ms.
    pub fn auto(duration_ms: u64) -> ModelResult<Self> {
        Self::from_duration(duration_ms, Self::auto_points(duration_ms))
    }

    /// Point count [`SweepSpec::auto`] would use.
    pub fn auto_points(duration_ms: u64) -> u32 {
        let step = if duration_ms > AUTO_COARSE_THRESHOLD_MS {
            AUTO_COARSE_STEP_MS
        } else {
            AUTO_FINE_STEP_MS
        };
        let points = u32::try_from(duration_ms / step).unwrap_or(u32::MAX);
        points.max(MIN_SWEEP_POINTS)
    }

    pub fn one_shot(mut self, one_shot: bool) -> Self {
        self.one_shot = one_shot;
        self
    }

    pub fn start_running(mut self, start: bool) -> Self {
        self.start_running = start;
        self
    }

    /// Total length of one cycle.
    pub fn cycle_ms(&self) -> u64 {
        self.interval_ms.saturating_mul(u64::from(self.points))
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.points < MIN_SWEEP_POINTS {
            return Err(ModelError::OutOfRange(format!(
                "points must be at least {MIN_SWEEP_POINTS}, got {}",
                self.points
            )));
        }
        if self.interval_ms == 0 {
            return Err(ModelError::OutOfRange(
                "tick interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_duration_divides_evenly() {
        let spec = SweepSpec::from_duration(400, 4).unwrap();
        assert_eq!(spec.interval_ms, 100);
        assert_eq!(spec.points, 4);
        assert_eq!(spec.cycle_ms(), 400);
    }

    #[test]
    fn rejects_single_point() {
        assert!(matches!(
            SweepSpec::from_duration(1000, 1),
            Err(ModelError::OutOfRange(_))
        ));
    }

    #[test]
    fn rejects_zero_interval() {
        assert!(SweepSpec::from_duration(3, 4).is_err());
    }

    #[test]
    fn auto_points_switches_resolution() {
        assert_eq!(SweepSpec::auto_points(2_000), 40);
        assert_eq!(SweepSpec::auto_points(500), 20);
        assert_eq!(SweepSpec::auto_points(10), MIN_SWEEP_POINTS);

        let spec = SweepSpec::auto(2_000).unwrap();
        assert_eq!(spec.interval_ms, 50);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let spec: SweepSpec = serde_json::from_str(r#"{"points": 8, "oneShot": true}"#).unwrap();
        assert_eq!(spec.points, 8);
        assert!(spec.one_shot);
        assert_eq!(spec.interval_ms, DEFAULT_TICK_INTERVAL_MS);
        assert!(!spec.start_running);
    }
}
