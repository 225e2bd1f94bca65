use std::{f64::consts::TAU, sync::OnceLock};

/// Number of segments in each lookup table. Tables hold one extra sample so
/// the end of the cycle can be read directly.
pub const TABLE_RESOLUTION: usize = 1000;

/// Curves a sweeper reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    /// Linear 0 → 1.
    Ramp,
    /// One sine period, -1 → 1 → -1 around 0.
    Sine,
    /// Raised cosine, 0 → 1 → 0.
    Hump,
}

struct Tables {
    ramp: Vec<f64>,
    sine: Vec<f64>,
    hump: Vec<f64>,
}

static TABLES: OnceLock<Tables> = OnceLock::new();

fn tables() -> &'static Tables {
    TABLES.get_or_init(|| {
        let x = |i: usize| i as f64 / TABLE_RESOLUTION as f64;
        Tables {
            ramp: (0..=TABLE_RESOLUTION).map(x).collect(),
            sine: (0..=TABLE_RESOLUTION).map(|i| (TAU * x(i)).sin()).collect(),
            hump: (0..=TABLE_RESOLUTION)
                .map(|i| (1.0 - (TAU * x(i)).cos()) / 2.0)
                .collect(),
        }
    })
}

impl Waveform {
    fn table(self) -> &'static [f64] {
        let t = tables();
        match self {
            Waveform::Ramp => &t.ramp,
            Waveform::Sine => &t.sine,
            Waveform::Hump => &t.hump,
        }
    }

    /// Sample at `position` out of `points`, interpolating between table entries.
    ///
    /// `position == points` reads the final sample.
    pub fn sample(self, position: usize, points: usize) -> f64 {
        if points == 0 {
            return self.at_fraction(0.0);
        }
        self.at_fraction(position.min(points) as f64 / points as f64)
    }

    /// Sample at `fraction` of the cycle, clamped to `[0, 1]`.
    pub fn at_fraction(self, fraction: f64) -> f64 {
        let table = self.table();
        let scaled = fraction.clamp(0.0, 1.0) * TABLE_RESOLUTION as f64;
        let lo = scaled.floor() as usize;
        if lo >= TABLE_RESOLUTION {
            return table[TABLE_RESOLUTION];
        }
        let frac = scaled - lo as f64;
        table[lo] + (table[lo + 1] - table[lo]) * frac
    }

    /// Value at the very end of the cycle.
    pub fn end(self) -> f64 {
        self.table()[TABLE_RESOLUTION]
    }
}
