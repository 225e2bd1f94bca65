use std::{
    collections::VecDeque,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tracing::error;

use crate::{
    cell::{CellError, CellFailure, Observer},
    panic::panic_message,
};

type Observers<T> = Vec<Arc<dyn Observer<T>>>;

#[derive(Clone)]
enum Terminal {
    Completed,
    Failed(CellFailure),
}

impl Terminal {
    fn notify<T>(&self, observer: &dyn Observer<T>) {
        match self {
            Terminal::Completed => guarded("on_completed", || observer.on_completed()),
            Terminal::Failed(err) => guarded("on_error", || observer.on_error(err)),
        }
    }
}

/// One queued notification plus the observers that were attached when it was stored.
enum Delivery<T> {
    Next(T, Observers<T>),
    Stop(Terminal, Observers<T>),
}

impl<T> Delivery<T> {
    fn deliver(self) {
        match self {
            Delivery::Next(value, observers) => {
                for observer in &observers {
                    guarded("on_next", || observer.on_next(&value));
                }
            }
            Delivery::Stop(terminal, observers) => {
                for observer in &observers {
                    terminal.notify(observer.as_ref());
                }
            }
        }
    }
}

/// Run one observer callback; a panic is logged and does not reach the writer.
fn guarded(callback: &'static str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        error!(
            callback,
            reason = %panic_message(panic.as_ref()),
            "cell observer panicked"
        );
    }
}

struct State<T> {
    value: Option<T>,
    observers: Vec<(u64, Arc<dyn Observer<T>>)>,
    next_id: u64,
    terminal: Option<Terminal>,
    disposed: bool,
    /// Stored but not yet delivered, in store order.
    pending: VecDeque<Delivery<T>>,
    /// Some thread is draining `pending`.
    delivering: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
}

/// Thread-safe last value plus the observers interested in it.
///
/// Cloning yields another handle to the same cell. Observers are called with
/// no lock held. Notifications reach every observer in the order the values
/// were stored: a write that lands while another thread is delivering is
/// queued and handed over by that thread, so `set` never waits on a callback
/// running elsewhere.
pub struct BroadcastCell<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BroadcastCell<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> BroadcastCell<T>
where
    T: Clone + Send + 'static,
{
    /// Create a cell holding `initial`.
    pub fn new(initial: T) -> Self {
        Self::with_value(Some(initial))
    }

    /// Create a cell with no value yet. `read` fails with [`CellError::Empty`] until the first `set`.
    pub fn empty() -> Self {
        Self::with_value(None)
    }

    fn with_value(value: Option<T>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    value,
                    observers: Vec::new(),
                    next_id: 0,
                    terminal: None,
                    disposed: false,
                    pending: VecDeque::new(),
                    delivering: false,
                }),
            }),
        }
    }

    /// Store `value` and push it to the current observers.
    ///
    /// A stopped cell ignores the write.
    pub fn set(&self, value: T) -> Result<(), CellError> {
        self.stage(value)?;
        self.flush();
        Ok(())
    }

    /// Store `value` and queue it for the current observers without delivering.
    ///
    /// Lets a caller store under its own lock and [`BroadcastCell::flush`]
    /// once that lock is released.
    pub(crate) fn stage(&self, value: T) -> Result<(), CellError> {
        let mut st = self.shared.state.lock();
        if st.disposed {
            return Err(CellError::Disposed);
        }
        if st.terminal.is_some() {
            return Ok(());
        }
        st.value = Some(value.clone());
        let observers = st.observers.iter().map(|(_, o)| Arc::clone(o)).collect();
        st.pending.push_back(Delivery::Next(value, observers));
        Ok(())
    }

    /// Deliver everything queued, unless another thread is already at it.
    pub(crate) fn flush(&self) {
        {
            let mut st = self.shared.state.lock();
            if st.delivering || st.pending.is_empty() {
                return;
            }
            st.delivering = true;
        }

        loop {
            let next = {
                let mut st = self.shared.state.lock();
                match st.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        st.delivering = false;
                        return;
                    }
                }
            };
            next.deliver();
        }
    }

    /// Stop the cell and signal completion to every observer.
    pub fn complete(&self) -> Result<(), CellError> {
        self.stop(Terminal::Completed)
    }

    /// Stop the cell, record `error` and signal it to every observer.
    pub fn fail(&self, error: CellFailure) -> Result<(), CellError> {
        self.stop(Terminal::Failed(error))
    }

    fn stop(&self, terminal: Terminal) -> Result<(), CellError> {
        {
            let mut st = self.shared.state.lock();
            if st.disposed {
                return Err(CellError::Disposed);
            }
            if st.terminal.is_some() {
                return Ok(());
            }
            st.terminal = Some(terminal.clone());
            let observers = std::mem::take(&mut st.observers)
                .into_iter()
                .map(|(_, o)| o)
                .collect();
            st.pending.push_back(Delivery::Stop(terminal, observers));
        }
        self.flush();
        Ok(())
    }

    /// Attach `observer` for future changes.
    ///
    /// On a stopped cell the terminal signal is delivered right away and the
    /// returned handle is inert.
    pub fn subscribe(&self, observer: Arc<dyn Observer<T>>) -> Result<Subscription, CellError> {
        let replay = {
            let mut st = self.shared.state.lock();
            if st.disposed {
                return Err(CellError::Disposed);
            }
            match &st.terminal {
                Some(terminal) => terminal.clone(),
                None => {
                    let id = st.next_id;
                    st.next_id += 1;
                    st.observers.push((id, observer));
                    return Ok(Subscription::live(Arc::downgrade(&self.shared), id));
                }
            }
        };

        replay.notify(observer.as_ref());
        Ok(Subscription::inert())
    }

    /// Shorthand for subscribing a value-only closure.
    pub fn subscribe_fn<F>(&self, f: F) -> Result<Subscription, CellError>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe(crate::cell::observer_fn(f))
    }

    /// Current value, or the recorded failure.
    pub fn read(&self) -> Result<T, CellError> {
        let st = self.shared.state.lock();
        if st.disposed {
            return Err(CellError::Disposed);
        }
        if let Some(Terminal::Failed(err)) = &st.terminal {
            return Err(CellError::Failed(err.clone()));
        }
        st.value.clone().ok_or(CellError::Empty)
    }

    /// Tear the cell down. Safe to call more than once.
    ///
    /// Notifications still queued are dropped.
    pub fn dispose(&self) {
        let dropped = {
            let mut st = self.shared.state.lock();
            st.disposed = true;
            st.value = None;
            (
                std::mem::take(&mut st.observers),
                std::mem::take(&mut st.pending),
            )
        };
        drop(dropped);
    }

    pub fn has_observers(&self) -> bool {
        !self.shared.state.lock().observers.is_empty()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.state.lock().terminal.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.state.lock().disposed
    }
}

impl<T> fmt::Debug for BroadcastCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.shared.state.lock();
        f.debug_struct("BroadcastCell")
            .field("has_value", &st.value.is_some())
            .field("observers", &st.observers.len())
            .field("stopped", &st.terminal.is_some())
            .field("disposed", &st.disposed)
            .finish()
    }
}

type Release = Box<dyn FnOnce() + Send>;

/// Handle returned by [`BroadcastCell::subscribe`].
///
/// Dropping the handle leaves the observer attached; call
/// [`Subscription::unsubscribe`] to detach it.
pub struct Subscription {
    release: Mutex<Option<Release>>,
}

impl Subscription {
    fn live<T>(cell: Weak<Shared<T>>, id: u64) -> Self
    where
        T: Send + 'static,
    {
        let release: Release = Box::new(move || {
            if let Some(shared) = cell.upgrade() {
                shared.state.lock().observers.retain(|(i, _)| *i != id);
            }
        });
        Self {
            release: Mutex::new(Some(release)),
        }
    }

    /// Handle that is already released.
    pub fn inert() -> Self {
        Self {
            release: Mutex::new(None),
        }
    }

    /// Detach the observer. Later calls do nothing.
    pub fn unsubscribe(&self) {
        let release = self.release.lock().take();
        if let Some(release) = release {
            release();
        }
    }

    pub fn is_active(&self) -> bool {
        self.release.lock().is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Next(i32),
        Error(String),
        Completed,
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Seen>>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<Seen> {
            self.seen.lock().clone()
        }
    }

    impl Observer<i32> for Recorder {
        fn on_next(&self, value: &i32) {
            self.seen.lock().push(Seen::Next(*value));
        }

        fn on_error(&self, error: &CellFailure) {
            self.seen.lock().push(Seen::Error(error.to_string()));
        }

        fn on_completed(&self) {
            self.seen.lock().push(Seen::Completed);
        }
    }

    #[test]
    fn values_then_completion_then_late_subscriber() {
        let cell = BroadcastCell::new(0);
        let early = Arc::new(Recorder::default());
        cell.subscribe(early.clone()).unwrap();

        cell.set(5).unwrap();
        cell.set(7).unwrap();
        cell.complete().unwrap();

        assert_eq!(
            early.seen(),
            vec![Seen::Next(5), Seen::Next(7), Seen::Completed]
        );

        let late = Arc::new(Recorder::default());
        let sub = cell.subscribe(late.clone()).unwrap();
        assert_eq!(late.seen(), vec![Seen::Completed]);
        assert!(!sub.is_active());
    }

    #[test]
    fn subscribe_does_not_replay_current_value() {
        let cell = BroadcastCell::new(42);
        let rec = Arc::new(Recorder::default());
        cell.subscribe(rec.clone()).unwrap();

        assert!(rec.seen().is_empty());
        assert_eq!(cell.read().unwrap(), 42);
    }

    #[test]
    fn writes_after_stop_are_ignored() {
        let cell = BroadcastCell::new(1);
        let rec = Arc::new(Recorder::default());
        cell.subscribe(rec.clone()).unwrap();

        cell.complete().unwrap();
        cell.set(2).unwrap();
        cell.complete().unwrap();

        assert_eq!(rec.seen(), vec![Seen::Completed]);
        assert_eq!(cell.read().unwrap(), 1);
        assert!(!cell.has_observers());
    }

    #[test]
    fn failure_is_replayed_and_reraised() {
        let cell = BroadcastCell::new(1);
        cell.fail(CellFailure::msg("sensor lost")).unwrap();

        let late = Arc::new(Recorder::default());
        cell.subscribe(late.clone()).unwrap();
        assert_eq!(late.seen(), vec![Seen::Error("sensor lost".into())]);

        match cell.read() {
            Err(CellError::Failed(e)) => assert_eq!(e.to_string(), "sensor lost"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let cell = BroadcastCell::new(0);
        let rec = Arc::new(Recorder::default());
        let sub = cell.subscribe(rec.clone()).unwrap();

        cell.set(1).unwrap();
        sub.unsubscribe();
        sub.unsubscribe();
        cell.set(2).unwrap();

        assert_eq!(rec.seen(), vec![Seen::Next(1)]);
        assert!(!sub.is_active());
    }

    #[test]
    fn dispose_twice_is_safe_and_blocks_reuse() {
        let cell = BroadcastCell::new(3);
        cell.dispose();
        cell.dispose();

        assert!(cell.is_disposed());
        assert!(matches!(cell.read(), Err(CellError::Disposed)));
        assert!(matches!(cell.set(4), Err(CellError::Disposed)));
        assert!(matches!(cell.complete(), Err(CellError::Disposed)));
        assert!(matches!(
            cell.subscribe(Arc::new(Recorder::default())),
            Err(CellError::Disposed)
        ));
    }

    #[test]
    fn empty_cell_reports_empty_until_set() {
        let cell: BroadcastCell<i32> = BroadcastCell::empty();
        assert!(matches!(cell.read(), Err(CellError::Empty)));

        cell.set(9).unwrap();
        assert_eq!(cell.read().unwrap(), 9);
    }

    #[test]
    fn observer_may_unsubscribe_itself_during_delivery() {
        let cell = BroadcastCell::new(0);
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(Mutex::new(0));

        let sub = {
            let slot = slot.clone();
            let hits = hits.clone();
            cell.subscribe_fn(move |_| {
                *hits.lock() += 1;
                if let Some(sub) = slot.lock().as_ref() {
                    sub.unsubscribe();
                }
            })
            .unwrap()
        };
        *slot.lock() = Some(sub);

        cell.set(1).unwrap();
        cell.set(2).unwrap();
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn observer_may_write_back_into_the_cell() {
        let cell = BroadcastCell::new(0);
        let writer = cell.clone();
        cell.subscribe_fn(move |v| {
            if *v < 3 {
                writer.set(v + 1).unwrap();
            }
        })
        .unwrap();

        cell.set(1).unwrap();
        assert_eq!(cell.read().unwrap(), 3);
    }

    #[test]
    fn concurrent_sets_leave_a_whole_value() {
        let cell = BroadcastCell::new((0u64, 0u64));
        let handles: Vec<_> = (1..=8u64)
            .map(|n| {
                let cell = cell.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        cell.set((n, n * 10)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let (a, b) = cell.read().unwrap();
        assert_eq!(b, a * 10);
    }

    #[test]
    fn cells_writing_into_each_other_from_two_threads_both_return() {
        let x = BroadcastCell::new(0);
        let y = BroadcastCell::new(0);
        let both_inside = Arc::new(std::sync::Barrier::new(2));

        for (watched, target) in [(x.clone(), y.clone()), (y.clone(), x.clone())] {
            let both_inside = both_inside.clone();
            watched
                .subscribe_fn(move |v| {
                    if *v == 1 {
                        both_inside.wait();
                        target.set(100).unwrap();
                    }
                })
                .unwrap();
        }

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        for cell in [x.clone(), y.clone()] {
            let done_tx = done_tx.clone();
            std::thread::spawn(move || {
                cell.set(1).unwrap();
                done_tx.send(()).unwrap();
            });
        }
        for _ in 0..2 {
            done_rx
                .recv_timeout(std::time::Duration::from_secs(3))
                .expect("setter did not return");
        }

        assert_eq!(x.read().unwrap(), 100);
        assert_eq!(y.read().unwrap(), 100);
    }

    #[test]
    fn concurrent_writers_are_seen_in_store_order() {
        const WRITERS: u64 = 4;
        const WRITES: u64 = 500;

        let cell = BroadcastCell::new((0u64, 0u64));
        let seen: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            cell.subscribe_fn(move |v| seen.lock().push(*v)).unwrap();
        }

        let handles: Vec<_> = (1..=WRITERS)
            .map(|writer| {
                let cell = cell.clone();
                std::thread::spawn(move || {
                    for seq in 0..WRITES {
                        cell.set((writer, seq)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let seen = seen.lock();
        assert_eq!(seen.len() as u64, WRITERS * WRITES);
        for writer in 1..=WRITERS {
            let seqs: Vec<u64> = seen
                .iter()
                .filter(|(w, _)| *w == writer)
                .map(|(_, s)| *s)
                .collect();
            assert_eq!(seqs, (0..WRITES).collect::<Vec<_>>());
        }
        assert_eq!(seen.last().copied(), Some(cell.read().unwrap()));
    }

    #[test]
    fn panicking_observer_does_not_starve_the_others() {
        let cell = BroadcastCell::new(0);
        cell.subscribe_fn(|_| panic!("broken fixture")).unwrap();
        let rec = Arc::new(Recorder::default());
        cell.subscribe(rec.clone()).unwrap();

        cell.set(5).unwrap();
        cell.set(6).unwrap();
        cell.complete().unwrap();

        assert_eq!(
            rec.seen(),
            vec![Seen::Next(5), Seen::Next(6), Seen::Completed]
        );
    }
}
