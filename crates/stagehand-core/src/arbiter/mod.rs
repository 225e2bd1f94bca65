//! Priority-based exclusive ownership of output devices.
//!
//! Each device keeps a stack of claims. The top claim is the current owner;
//! a new claim only lands on the stack when it strictly outranks the top,
//! otherwise the caller gets an inert token. Releasing the owner hands the
//! device back to the next claim down, or leaves it unowned.
mod stack;
pub use stack::{DeviceId, OwnershipArbiter};

mod device;
pub use device::OwnedDevice;

mod registry;
pub use registry::{OwnerChange, OwnerInfo, OwnerRegistry};

mod token;
pub use token::ControlToken;
