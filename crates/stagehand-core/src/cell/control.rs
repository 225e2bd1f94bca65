use std::{fmt, sync::Arc};

use crate::cell::{BroadcastCell, CellError, Observer, Subscription};

/// Decides whether a write carrying context `C` may land.
///
/// `admit` runs `commit` only when the write is allowed, and does both under
/// whatever lock makes the decision hold, so a concurrent change of the
/// gate's inputs cannot slip between the check and the store.
pub trait WriteGate<C>: Send + Sync {
    fn admit(&self, ctx: &C, commit: &mut dyn FnMut()) -> bool;
}

/// Shared gate handle.
pub type Gate<C> = Arc<dyn WriteGate<C>>;

/// Gate built from a plain predicate.
struct Predicate<F>(F);

impl<C, F> WriteGate<C> for Predicate<F>
where
    F: Fn(&C) -> bool + Send + Sync,
{
    fn admit(&self, ctx: &C, commit: &mut dyn FnMut()) -> bool {
        if (self.0)(ctx) {
            commit();
            true
        } else {
            false
        }
    }
}

/// [`BroadcastCell`] whose writes can be gated on a caller-supplied context.
///
/// A rejected write is not an error: [`ControlCell::set_with`] returns
/// `Ok(false)` and nothing is stored or delivered. Accepted values are stored
/// inside the gate and delivered after it returns.
pub struct ControlCell<T, C> {
    cell: BroadcastCell<T>,
    gate: Option<Gate<C>>,
}

impl<T, C> Clone for ControlCell<T, C> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<T, C> ControlCell<T, C>
where
    T: Clone + Send + 'static,
    C: 'static,
{
    /// Cell that accepts every write.
    pub fn open(initial: T) -> Self {
        Self {
            cell: BroadcastCell::new(initial),
            gate: None,
        }
    }

    /// Cell that consults the predicate `gate` on every [`ControlCell::set_with`].
    pub fn gated<F>(initial: T, gate: F) -> Self
    where
        F: Fn(&C) -> bool + Send + Sync + 'static,
    {
        Self::with_gate(initial, Arc::new(Predicate(gate)))
    }

    pub fn with_gate(initial: T, gate: Gate<C>) -> Self {
        Self {
            cell: BroadcastCell::new(initial),
            gate: Some(gate),
        }
    }

    /// Write `value` if `ctx` passes the gate.
    ///
    /// Returns whether the write was accepted.
    pub fn set_with(&self, value: T, ctx: &C) -> Result<bool, CellError> {
        let Some(gate) = &self.gate else {
            self.cell.set(value)?;
            return Ok(true);
        };

        let mut value = Some(value);
        let mut stored = Ok(());
        let accepted = gate.admit(ctx, &mut || {
            if let Some(v) = value.take() {
                stored = self.cell.stage(v);
            }
        });
        if !accepted {
            return Ok(false);
        }
        stored?;
        self.cell.flush();
        Ok(true)
    }

    /// Write without consulting the gate.
    pub fn set(&self, value: T) -> Result<(), CellError> {
        self.cell.set(value)
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer<T>>) -> Result<Subscription, CellError> {
        self.cell.subscribe(observer)
    }

    pub fn read(&self) -> Result<T, CellError> {
        self.cell.read()
    }

    pub fn complete(&self) -> Result<(), CellError> {
        self.cell.complete()
    }

    pub fn dispose(&self) {
        self.cell.dispose()
    }

    pub fn is_gated(&self) -> bool {
        self.gate.is_some()
    }

    /// Underlying broadcast cell.
    pub fn cell(&self) -> &BroadcastCell<T> {
        &self.cell
    }
}

impl<T, C> fmt::Debug for ControlCell<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlCell")
            .field("cell", &self.cell)
            .field("gated", &self.gate.is_some())
            .finish()
    }
}
