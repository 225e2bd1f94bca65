use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use stagehand_model::Priority;

use crate::{
    arbiter::{ControlToken, DeviceId},
    cell::BroadcastCell,
};

/// Who holds a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerInfo {
    pub token_id: u64,
    pub name: String,
    pub priority: Priority,
}

impl OwnerInfo {
    pub(crate) fn of(token: &ControlToken) -> Self {
        Self {
            token_id: token.id(),
            name: token.name().to_string(),
            priority: token.priority(),
        }
    }
}

/// One current-owner transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerChange {
    pub device: DeviceId,
    pub device_name: String,
    pub previous: Option<OwnerInfo>,
    pub current: Option<OwnerInfo>,
}

/// Current owner of every device, plus a feed of transitions.
///
/// The map is updated and the transition queued under the device's stack
/// lock, so both follow stack order. Feed observers run after that lock is
/// dropped.
pub struct OwnerRegistry {
    owners: RwLock<HashMap<DeviceId, OwnerInfo>>,
    changes: BroadcastCell<OwnerChange>,
}

impl OwnerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            owners: RwLock::new(HashMap::new()),
            changes: BroadcastCell::empty(),
        }
    }

    pub fn owner(&self, device: DeviceId) -> Option<OwnerInfo> {
        self.owners.read().get(&device).cloned()
    }

    /// Every owned device, in no particular order.
    pub fn snapshot(&self) -> Vec<(DeviceId, OwnerInfo)> {
        self.owners
            .read()
            .iter()
            .map(|(d, o)| (*d, o.clone()))
            .collect()
    }

    /// Feed of ownership transitions.
    pub fn changes(&self) -> &BroadcastCell<OwnerChange> {
        &self.changes
    }

    pub(crate) fn record(
        &self,
        device: DeviceId,
        device_name: &str,
        current: Option<OwnerInfo>,
    ) -> OwnerChange {
        let mut owners = self.owners.write();
        let previous = match &current {
            Some(info) => owners.insert(device, info.clone()),
            None => owners.remove(&device),
        };
        let change = OwnerChange {
            device,
            device_name: device_name.to_string(),
            previous,
            current,
        };
        if let Err(e) = self.changes.stage(change.clone()) {
            debug!(error = %e, "owner change feed closed");
        }
        change
    }

    /// Deliver queued transitions. Call with no device lock held.
    pub(crate) fn publish(&self, change: &OwnerChange) {
        debug!(
            device = %change.device_name,
            from = change.previous.as_ref().map(|o| o.name.as_str()).unwrap_or("-"),
            to = change.current.as_ref().map(|o| o.name.as_str()).unwrap_or("-"),
            "device owner changed"
        );
        self.changes.flush();
    }
}
