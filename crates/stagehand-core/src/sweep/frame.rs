/// Values handed to sweep jobs on every dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepFrame {
    /// Ramp sampled at the first cursor.
    pub zero_to_one: f64,
    /// Sine sampled at the second cursor (a quarter cycle ahead).
    pub negative_one_to_one: f64,
    /// Hump sampled at the third cursor (half a cycle ahead).
    pub zero_to_one_to_zero: f64,
    /// Produced by `force_value` rather than the timer.
    pub forced: bool,
    /// Ticks elapsed since the last reset.
    pub total_ticks: u64,
    /// Last frame of a one-shot cycle, or a forced frame.
    pub is_final: bool,
    /// First cursor position; equals the point count on the one-shot final frame.
    pub position: usize,
}

impl SweepFrame {
    /// Frame carrying explicit values.
    pub fn forced(v1: f64, v2: f64, v3: f64, total_ticks: u64) -> Self {
        Self {
            zero_to_one: v1,
            negative_one_to_one: v2,
            zero_to_one_to_zero: v3,
            forced: true,
            total_ticks,
            is_final: true,
            position: 0,
        }
    }
}
