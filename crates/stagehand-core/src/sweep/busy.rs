use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

/// Spins before falling back to short sleeps in [`BusyFlag::acquire`].
const SPIN_LIMIT: u32 = 64;
const BACKOFF: Duration = Duration::from_micros(200);

/// Compare-and-swap "dispatch in progress" flag.
///
/// Periodic dispatch uses [`BusyFlag::try_acquire`] and drops the tick on
/// contention; forced dispatch uses [`BusyFlag::acquire`] and waits.
/// Not re-entrant.
#[derive(Debug, Default)]
pub struct BusyFlag {
    busy: AtomicBool,
}

impl BusyFlag {
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    pub fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| BusyGuard { flag: self })
    }

    /// Block the current thread until the flag is free.
    pub fn acquire(&self) -> BusyGuard<'_> {
        let mut spins = 0u32;
        loop {
            if let Some(guard) = self.try_acquire() {
                return guard;
            }
            if spins < SPIN_LIMIT {
                spins += 1;
                std::hint::spin_loop();
            } else {
                std::thread::sleep(BACKOFF);
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Clears the flag on drop.
#[derive(Debug)]
pub struct BusyGuard<'a> {
    flag: &'a BusyFlag,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.busy.store(false, Ordering::Release);
    }
}
