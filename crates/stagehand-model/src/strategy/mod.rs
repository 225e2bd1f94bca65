mod instance;
pub use instance::InstancePolicy;
