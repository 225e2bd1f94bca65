//! Last-value cells with observers.
//!
//! [`BroadcastCell`] holds one current value and pushes every change to the
//! observers subscribed at that moment. New subscribers only see future
//! changes; the current value is never replayed on subscribe. Once the cell
//! is completed or failed it stops delivering, and a late subscriber gets the
//! terminal signal immediately instead of a live subscription.
//!
//! [`ControlCell`] adds an optional gate that decides, per write, whether the
//! caller's context is allowed to change the value.
mod broadcast;
pub use broadcast::{BroadcastCell, Subscription};

mod control;
pub use control::{ControlCell, Gate, WriteGate};

mod error;
pub use error::{CellError, CellFailure};

mod observer;
pub use observer::{FnObserver, Observer, observer_fn};
