use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A value paired with the lock that guards it.
///
/// Every access goes through a short critical section; the raw value and the
/// lock are never handed out. Compound read-modify-write sequences must use
/// [`ThreadSafe::update`] so they happen under a single acquisition.
pub(crate) struct ThreadSafe<T> {
    value: Mutex<T>,
}

impl<T> ThreadSafe<T> {
    pub(crate) fn new(value: T) -> Self {
        ThreadSafe {
            value: Mutex::new(value),
        }
    }

    /// Replaces the guarded value.
    pub(crate) fn set(&self, value: T) {
        *self.lock() = value;
    }

    /// Runs `f` with exclusive access to the guarded value.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }

    // A panic while holding the lock cannot leave `T` half-written since
    // every writer replaces or mutates it in one step.
    fn lock(&self) -> MutexGuard<'_, T> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> ThreadSafe<T> {
    /// Returns a copy of the guarded value.
    pub(crate) fn get(&self) -> T {
        self.lock().clone()
    }
}

impl<T: Default> Default for ThreadSafe<T> {
    fn default() -> Self {
        ThreadSafe::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for ThreadSafe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadSafe").field(&*self.lock()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::ThreadSafe;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn get_and_set_round_trip() {
        let value = ThreadSafe::new(String::from("a"));
        value.set(String::from("b"));
        assert_eq!(value.get(), "b");
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let counter = Arc::new(ThreadSafe::new(0u64));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        counter.update(|value| *value += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.get(), 8_000);
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let value = Arc::new(ThreadSafe::new(1u32));
        let poisoner = value.clone();
        let _ = thread::spawn(move || {
            poisoner.update(|_| panic!("poison the lock"));
        })
        .join();

        value.set(2);
        assert_eq!(value.get(), 2);
    }
}
