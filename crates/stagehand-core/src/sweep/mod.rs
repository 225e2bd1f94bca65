//! Fixed-interval sweep generator.
//!
//! A [`Sweeper`] walks three phase-shifted cursors over a shared table and,
//! on every tick, hands the interpolated values to its registered jobs as a
//! [`SweepFrame`]. Dispatch is guarded by a [`BusyFlag`]: if the previous
//! tick's jobs are still running the tick is counted as missed and dropped.
//!
//! [`SweepEffect`] is the usual consumer: it turns frames into a single
//! output value and fans it out to connected cells.
mod busy;
pub use busy::{BusyFlag, BusyGuard};

mod effect;
pub use effect::{SweepEffect, SweepShape};

mod frame;
pub use frame::SweepFrame;

mod sweeper;
pub use sweeper::{SweepJob, Sweeper, TickOutcome};

mod table;
pub use table::{TABLE_RESOLUTION, Waveform};
