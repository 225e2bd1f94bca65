use std::{marker::PhantomData, sync::Arc};

use crate::cell::CellFailure;

/// Receiver of cell notifications.
///
/// Calls arrive with no cell lock held, so an observer may subscribe,
/// unsubscribe or write to any cell from inside a callback. A panic inside a
/// callback is logged and does not reach the writer or the other observers.
pub trait Observer<T>: Send + Sync {
    fn on_next(&self, value: &T);

    fn on_error(&self, _error: &CellFailure) {}

    fn on_completed(&self) {}
}

/// Observer backed by a closure that only cares about values.
pub struct FnObserver<T, F> {
    f: F,
    _marker: PhantomData<fn(&T)>,
}

impl<T, F> Observer<T> for FnObserver<T, F>
where
    F: Fn(&T) + Send + Sync,
{
    fn on_next(&self, value: &T) {
        (self.f)(value)
    }
}

/// Wrap a closure as a shareable observer.
pub fn observer_fn<T, F>(f: F) -> Arc<dyn Observer<T>>
where
    T: 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    Arc::new(FnObserver {
        f,
        _marker: PhantomData,
    })
}
