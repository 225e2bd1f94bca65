use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use stagehand_model::Priority;

use crate::arbiter::{DeviceId, OwnershipArbiter, stack::ArbiterShared};

/// Process-wide token sequence.
static TOKEN_SEQ: AtomicU64 = AtomicU64::new(1);

fn next_token_id() -> u64 {
    TOKEN_SEQ.fetch_add(1, Ordering::Relaxed)
}

struct TokenInner {
    id: u64,
    device: DeviceId,
    priority: Priority,
    name: String,
    inert: bool,
    released: AtomicBool,
    arbiter: Weak<ArbiterShared>,
}

/// Claim on a device, as returned by [`OwnershipArbiter::acquire`].
///
/// Inert tokens are valid objects that never own anything; releasing them
/// is a no-op. Release is explicit: dropping a live token keeps the claim.
#[derive(Clone)]
pub struct ControlToken {
    inner: Arc<TokenInner>,
}

impl ControlToken {
    pub(crate) fn live(
        device: DeviceId,
        priority: Priority,
        name: String,
        arbiter: Weak<ArbiterShared>,
    ) -> Self {
        Self::build(device, priority, name, false, arbiter)
    }

    pub(crate) fn inert(device: DeviceId, priority: Priority, name: String) -> Self {
        Self::build(device, priority, name, true, Weak::new())
    }

    fn build(
        device: DeviceId,
        priority: Priority,
        name: String,
        inert: bool,
        arbiter: Weak<ArbiterShared>,
    ) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                id: next_token_id(),
                device,
                priority,
                name,
                inert,
                released: AtomicBool::new(false),
                arbiter,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn device(&self) -> DeviceId {
        self.inner.device
    }

    pub fn priority(&self) -> Priority {
        self.inner.priority
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_inert(&self) -> bool {
        self.inner.inert
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Live and not yet released.
    pub fn is_valid(&self) -> bool {
        !self.is_inert() && !self.is_released()
    }

    /// Release through the arbiter that issued this token.
    ///
    /// Returns `false` for inert tokens, repeated releases, or when the
    /// arbiter is gone.
    pub fn release(&self) -> bool {
        match self.inner.arbiter.upgrade() {
            Some(shared) => OwnershipArbiter::from_shared(shared).release(self),
            None => false,
        }
    }

    pub(crate) fn issued_by(&self, shared: &Arc<ArbiterShared>) -> bool {
        std::ptr::eq(self.inner.arbiter.as_ptr(), Arc::as_ptr(shared))
    }

    /// Flip to released. `true` only for the first caller.
    pub(crate) fn mark_released(&self) -> bool {
        !self.inner.released.swap(true, Ordering::AcqRel)
    }
}

impl PartialEq for ControlToken {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ControlToken {}

impl Hash for ControlToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for ControlToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlToken")
            .field("id", &self.inner.id)
            .field("device", &self.inner.device)
            .field("priority", &self.inner.priority)
            .field("name", &self.inner.name)
            .field("inert", &self.inner.inert)
            .field("released", &self.is_released())
            .finish()
    }
}

impl fmt::Display for ControlToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}@{}",
            self.inner.name, self.inner.id, self.inner.priority
        )
    }
}
