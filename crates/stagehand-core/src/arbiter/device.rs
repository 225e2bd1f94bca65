use std::{fmt, sync::Arc};

use tracing::{error, trace};

use stagehand_model::Priority;

use crate::{
    arbiter::{ControlToken, DeviceId, OwnershipArbiter},
    cell::{BroadcastCell, CellError, ControlCell, Observer, Subscription},
    executor::Device,
};

/// Output device whose value may only be written by its current owner.
///
/// Writes go through a [`ControlCell`] gated by [`OwnershipArbiter::gate`]:
/// while nobody holds the device anyone may write, once a claim is granted
/// only its token is accepted. The ownership check and the store happen under
/// the device lock, so a write never lands after a higher claim took over.
pub struct OwnedDevice<T> {
    id: DeviceId,
    name: String,
    arbiter: OwnershipArbiter,
    value: ControlCell<T, Option<ControlToken>>,
    initial: T,
    master_power: Option<BroadcastCell<bool>>,
}

impl<T> OwnedDevice<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(arbiter: &OwnershipArbiter, name: impl Into<String>, initial: T) -> Self {
        let name = name.into();
        let id = arbiter.register_device(&name);

        let value = ControlCell::with_gate(initial.clone(), arbiter.gate(id));

        Self {
            id,
            name,
            arbiter: arbiter.clone(),
            value,
            initial,
            master_power: None,
        }
    }

    /// Give the device a master power switch, on by default.
    pub fn with_master_power(mut self) -> Self {
        self.master_power = Some(BroadcastCell::new(true));
        self
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn take_control(&self, priority: Priority, name: impl Into<String>) -> ControlToken {
        self.arbiter.acquire(self.id, priority, name)
    }

    pub fn has_control(&self, token: Option<&ControlToken>) -> bool {
        self.arbiter.has_control(self.id, token)
    }

    pub fn owner(&self) -> Option<ControlToken> {
        self.arbiter.current_owner(self.id)
    }

    /// Write `value` on behalf of `token`. Returns whether it was accepted.
    pub fn push(&self, value: T, token: Option<&ControlToken>) -> Result<bool, CellError> {
        let accepted = self.value.set_with(value, &token.cloned())?;
        if !accepted {
            trace!(
                device = %self.name,
                token = token.map(|t| t.to_string()).unwrap_or_else(|| "-".into()),
                "write rejected: caller does not own the device"
            );
        }
        Ok(accepted)
    }

    pub fn value(&self) -> Result<T, CellError> {
        self.value.read()
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer<T>>) -> Result<Subscription, CellError> {
        self.value.subscribe(observer)
    }

    pub fn subscribe_fn<F>(&self, f: F) -> Result<Subscription, CellError>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.value.cell().subscribe_fn(f)
    }

    pub fn cell(&self) -> &BroadcastCell<T> {
        self.value.cell()
    }
}

impl<T> Device for OwnedDevice<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn set_initial_state(&self) {
        if let Err(e) = self.value.set(self.initial.clone()) {
            error!(device = %self.name, error = %e, "failed to push initial state");
        }
    }

    fn master_power(&self) -> Option<&BroadcastCell<bool>> {
        self.master_power.as_ref()
    }
}

impl<T> fmt::Debug for OwnedDevice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedDevice")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("master_power", &self.master_power.is_some())
            .finish()
    }
}
