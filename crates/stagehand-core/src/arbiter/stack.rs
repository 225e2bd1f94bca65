use std::{fmt, sync::Arc};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use stagehand_model::Priority;

use crate::{
    arbiter::{ControlToken, OwnerInfo, OwnerRegistry},
    cell::{Gate, WriteGate},
};

/// Index of a device in the arbiter's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(usize);

impl DeviceId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

struct DeviceSlot {
    name: String,
    /// Claims in acquisition order; the last one owns the device.
    stack: Mutex<Vec<ControlToken>>,
}

pub(crate) struct ArbiterShared {
    devices: RwLock<Vec<Arc<DeviceSlot>>>,
    registry: OwnerRegistry,
}

/// Per-device claim stacks.
///
/// Cloning yields another handle to the same arbiter. Transitions on one
/// device are serialized by that device's lock.
#[derive(Clone)]
pub struct OwnershipArbiter {
    shared: Arc<ArbiterShared>,
}

impl Default for OwnershipArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl OwnershipArbiter {
    pub fn new() -> Self {
        Self::from_shared(Arc::new(ArbiterShared {
            devices: RwLock::new(Vec::new()),
            registry: OwnerRegistry::new(),
        }))
    }

    pub(crate) fn from_shared(shared: Arc<ArbiterShared>) -> Self {
        Self { shared }
    }

    /// Register a device by name. Registering the same name again returns the existing id.
    pub fn register_device(&self, name: &str) -> DeviceId {
        let mut devices = self.shared.devices.write();
        if let Some(idx) = devices.iter().position(|d| d.name == name) {
            return DeviceId(idx);
        }
        devices.push(Arc::new(DeviceSlot {
            name: name.to_string(),
            stack: Mutex::new(Vec::new()),
        }));
        let id = DeviceId(devices.len() - 1);
        debug!(device = name, id = %id, "device registered with arbiter");
        id
    }

    pub fn device_name(&self, device: DeviceId) -> Option<String> {
        self.slot(device).map(|s| s.name.clone())
    }

    fn slot(&self, device: DeviceId) -> Option<Arc<DeviceSlot>> {
        self.shared.devices.read().get(device.0).cloned()
    }

    /// Claim `device` at `priority`.
    ///
    /// The claim becomes the owner when the device is unowned or `priority`
    /// is strictly higher than the current owner's. Otherwise an inert token
    /// comes back and nothing changes.
    pub fn acquire(
        &self,
        device: DeviceId,
        priority: Priority,
        name: impl Into<String>,
    ) -> ControlToken {
        let name = name.into();
        let Some(slot) = self.slot(device) else {
            warn!(device = %device, claim = %name, "claim on unknown device; token is inert");
            return ControlToken::inert(device, priority, name);
        };

        let (token, change) = {
            let mut stack = slot.stack.lock();
            if let Some(top) = stack.last() {
                if priority <= top.priority() {
                    debug!(
                        device = %slot.name,
                        claim = %name,
                        priority = %priority,
                        owner = %top,
                        "claim does not outrank owner; token is inert"
                    );
                    return ControlToken::inert(device, priority, name);
                }
            }

            let token =
                ControlToken::live(device, priority, name, Arc::downgrade(&self.shared));
            stack.push(token.clone());
            let change =
                self.shared
                    .registry
                    .record(device, &slot.name, Some(OwnerInfo::of(&token)));
            (token, change)
        };

        self.shared.registry.publish(&change);
        token
    }

    /// Drop `token`'s claim.
    ///
    /// Releasing the owner hands the device to the next claim down. Releasing
    /// a buried claim only removes it. Returns `false` when nothing changed:
    /// inert or foreign tokens, and repeated releases.
    pub fn release(&self, token: &ControlToken) -> bool {
        if token.is_inert() || !token.issued_by(&self.shared) {
            return false;
        }
        if !token.mark_released() {
            return false;
        }
        let Some(slot) = self.slot(token.device()) else {
            return false;
        };

        let change = {
            let mut stack = slot.stack.lock();
            let Some(pos) = stack.iter().position(|t| t == token) else {
                return false;
            };
            let was_owner = pos + 1 == stack.len();
            stack.remove(pos);

            if !was_owner {
                debug!(device = %slot.name, claim = %token, "buried claim released");
                return true;
            }
            let next = stack.last().map(OwnerInfo::of);
            self.shared.registry.record(token.device(), &slot.name, next)
        };

        self.shared.registry.publish(&change);
        true
    }

    /// Whether a write carrying `token` may touch `device`.
    ///
    /// Unowned devices accept anyone, including callers without a token.
    pub fn has_control(&self, device: DeviceId, token: Option<&ControlToken>) -> bool {
        self.while_in_control(device, token, &mut || {})
    }

    /// Run `commit` if `token` may write to `device`, holding the device lock
    /// throughout so no claim can land in between.
    pub(crate) fn while_in_control(
        &self,
        device: DeviceId,
        token: Option<&ControlToken>,
        commit: &mut dyn FnMut(),
    ) -> bool {
        let Some(slot) = self.slot(device) else {
            commit();
            return true;
        };
        let stack = slot.stack.lock();
        let allowed = match stack.last() {
            None => true,
            Some(owner) => token.is_some_and(|t| t == owner),
        };
        if allowed {
            commit();
        }
        allowed
    }

    /// Write gate for cells that only the owner of `device` may change.
    pub fn gate(&self, device: DeviceId) -> Gate<Option<ControlToken>> {
        Arc::new(OwnerGate {
            arbiter: self.clone(),
            device,
        })
    }

    pub fn current_owner(&self, device: DeviceId) -> Option<ControlToken> {
        self.slot(device)
            .and_then(|slot| slot.stack.lock().last().cloned())
    }

    /// Number of live claims stacked on `device`.
    pub fn claims(&self, device: DeviceId) -> usize {
        self.slot(device).map_or(0, |slot| slot.stack.lock().len())
    }

    pub fn registry(&self) -> &OwnerRegistry {
        &self.shared.registry
    }
}

struct OwnerGate {
    arbiter: OwnershipArbiter,
    device: DeviceId,
}

impl WriteGate<Option<ControlToken>> for OwnerGate {
    fn admit(&self, token: &Option<ControlToken>, commit: &mut dyn FnMut()) -> bool {
        self.arbiter.while_in_control(self.device, token.as_ref(), commit)
    }
}

impl fmt::Debug for OwnershipArbiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnershipArbiter")
            .field("devices", &self.shared.devices.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::{OwnerChange, OwnerInfo};

    fn p(level: u32) -> Priority {
        Priority::new(level)
    }

    fn owner_name(arb: &OwnershipArbiter, dev: DeviceId) -> Option<String> {
        arb.current_owner(dev).map(|t| t.name().to_string())
    }

    #[test]
    fn higher_claim_preempts_and_release_restores() {
        let arb = OwnershipArbiter::new();
        let dev = arb.register_device("spot");

        let a = arb.acquire(dev, p(1), "A");
        assert!(a.is_valid());
        assert_eq!(owner_name(&arb, dev).as_deref(), Some("A"));

        let b = arb.acquire(dev, p(5), "B");
        assert!(b.is_valid());
        assert_eq!(owner_name(&arb, dev).as_deref(), Some("B"));
        assert!(!arb.has_control(dev, Some(&a)));
        assert!(arb.has_control(dev, Some(&b)));

        assert!(arb.release(&b));
        assert_eq!(owner_name(&arb, dev).as_deref(), Some("A"));
        assert!(arb.has_control(dev, Some(&a)));

        assert!(a.release());
        assert_eq!(owner_name(&arb, dev), None);
        assert!(arb.has_control(dev, None));
    }

    #[test]
    fn equal_or_lower_claims_get_inert_tokens() {
        let arb = OwnershipArbiter::new();
        let dev = arb.register_device("motor");
        let owner = arb.acquire(dev, p(3), "owner");

        let tie = arb.acquire(dev, p(3), "tie");
        let low = arb.acquire(dev, p(2), "low");
        assert!(tie.is_inert());
        assert!(low.is_inert());
        assert_eq!(arb.current_owner(dev), Some(owner.clone()));
        assert_eq!(arb.claims(dev), 1);

        assert!(!tie.release());
        assert!(!arb.has_control(dev, Some(&tie)));
        assert_eq!(arb.current_owner(dev), Some(owner));
    }

    #[test]
    fn releasing_a_buried_claim_keeps_the_owner() {
        let arb = OwnershipArbiter::new();
        let dev = arb.register_device("relay");
        let a = arb.acquire(dev, p(1), "A");
        let b = arb.acquire(dev, p(5), "B");

        assert!(arb.release(&a));
        assert_eq!(owner_name(&arb, dev).as_deref(), Some("B"));

        assert!(arb.release(&b));
        assert_eq!(owner_name(&arb, dev), None);
    }

    #[test]
    fn release_is_idempotent() {
        let arb = OwnershipArbiter::new();
        let dev = arb.register_device("relay");
        let a = arb.acquire(dev, p(1), "A");
        let b = arb.acquire(dev, p(2), "B");

        assert!(arb.release(&b));
        assert!(!arb.release(&b));
        assert!(!b.release());
        assert!(b.is_released());
        assert_eq!(owner_name(&arb, dev).as_deref(), Some("A"));
        assert!(a.is_valid());
    }

    #[test]
    fn owner_follows_stack_order() {
        let arb = OwnershipArbiter::new();
        let dev = arb.register_device("strip");
        let a = arb.acquire(dev, p(1), "A");
        let b = arb.acquire(dev, p(2), "B");
        let c = arb.acquire(dev, p(3), "C");

        arb.release(&c);
        assert_eq!(owner_name(&arb, dev).as_deref(), Some("B"));
        arb.release(&b);
        assert_eq!(owner_name(&arb, dev).as_deref(), Some("A"));
        arb.release(&a);
        assert_eq!(arb.claims(dev), 0);
    }

    #[test]
    fn registry_tracks_and_publishes_owner_changes() {
        let arb = OwnershipArbiter::new();
        let dev = arb.register_device("spot");
        let seen: Arc<Mutex<Vec<OwnerChange>>> = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            arb.registry()
                .changes()
                .subscribe_fn(move |c| seen.lock().push(c.clone()))
                .unwrap();
        }

        let a = arb.acquire(dev, p(1), "A");
        let b = arb.acquire(dev, p(5), "B");
        let _inert = arb.acquire(dev, p(5), "C");
        assert_eq!(arb.registry().owner(dev).map(|o| o.name), Some("B".into()));

        arb.release(&b);
        arb.release(&a);
        assert_eq!(arb.registry().owner(dev), None);

        let path: Vec<_> = seen
            .lock()
            .iter()
            .map(|c| c.current.as_ref().map(|o| o.name.clone()))
            .collect();
        assert_eq!(
            path,
            vec![Some("A".into()), Some("B".into()), Some("A".into()), None]
        );
        assert!(seen.lock().iter().all(|c| c.device_name == "spot"));
    }

    #[test]
    fn unknown_device_is_unowned_and_claims_are_inert() {
        let arb = OwnershipArbiter::new();
        let ghost = DeviceId(42);

        let t = arb.acquire(ghost, p(9), "ghost");
        assert!(t.is_inert());
        assert!(arb.has_control(ghost, None));
        assert_eq!(arb.current_owner(ghost), None);
    }

    #[test]
    fn tokens_from_another_arbiter_are_ignored() {
        let one = OwnershipArbiter::new();
        let two = OwnershipArbiter::new();
        let d1 = one.register_device("x");
        let d2 = two.register_device("x");
        assert_eq!(d1, d2);

        let t = one.acquire(d1, p(1), "mine");
        assert!(!two.release(&t));
        assert!(t.is_valid());
        assert!(one.release(&t));
    }

    #[test]
    fn same_name_registers_once() {
        let arb = OwnershipArbiter::new();
        let a = arb.register_device("spot");
        let b = arb.register_device("spot");
        let c = arb.register_device("wash");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(arb.device_name(c).as_deref(), Some("wash"));
    }

    #[test]
    fn concurrent_claims_leave_the_highest_priority_owner() {
        let arb = OwnershipArbiter::new();
        let dev = arb.register_device("shared");

        let handles: Vec<_> = (1..=16u32)
            .map(|level| {
                let arb = arb.clone();
                std::thread::spawn(move || {
                    arb.acquire(dev, Priority::new(level), format!("t{level}"))
                })
            })
            .collect();
        let tokens: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let owner = arb.current_owner(dev).unwrap();
        assert_eq!(owner.priority(), p(16));

        // release everything live; the device must end up unowned
        for t in tokens.iter().filter(|t| !t.is_inert()) {
            assert!(arb.release(t));
        }
        assert_eq!(arb.claims(dev), 0);
    }

    #[test]
    fn owner_feed_chains_transitions_under_contention() {
        let arb = OwnershipArbiter::new();
        let dev = arb.register_device("contested");
        let seen: Arc<Mutex<Vec<OwnerChange>>> = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            arb.registry()
                .changes()
                .subscribe_fn(move |c| seen.lock().push(c.clone()))
                .unwrap();
        }

        let handles: Vec<_> = (1..=8u32)
            .map(|level| {
                let arb = arb.clone();
                std::thread::spawn(move || {
                    for round in 0..50 {
                        let t = arb.acquire(dev, p(level), format!("t{level}-{round}"));
                        arb.release(&t);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // every transition starts where the previous one ended
        let seen = seen.lock();
        assert!(!seen.is_empty());
        let mut owner: Option<OwnerInfo> = None;
        for change in seen.iter() {
            assert_eq!(change.previous, owner);
            owner = change.current.clone();
        }
        assert_eq!(owner, None);
        assert_eq!(arb.claims(dev), 0);
        assert_eq!(arb.registry().owner(dev), None);
    }
}
