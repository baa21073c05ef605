use std::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

use crossbeam_utils::Backoff;

/// A test-and-set spinlock with an RAII guard.
///
/// The queues it guards are only ever touched for index arithmetic, so the
/// critical sections are sub-microsecond; a full mutex with parking would
/// cost more than the work it protects. Contended acquires spin with
/// exponential backoff, eventually yielding the thread.
#[derive(Debug)]
pub(crate) struct SpinLock<T> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

// SAFETY: the lock protocol guarantees exclusive access to `value` while a
// guard is live, so the container is as thread-safe as a mutex over `T`.
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    pub(crate) fn lock(&self) -> SpinGuard<'_, T> {
        let backoff = Backoff::new();
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            // Spin on a plain load until the lock looks free; re-running the
            // compare-exchange in a tight loop would bounce the cache line.
            while self.locked.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }

        SpinGuard { lock: self }
    }
}

pub(crate) struct SpinGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the lock, so no other reference exists.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the lock, so no other reference exists.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::SpinLock;

    #[test]
    fn guard_gives_exclusive_access() {
        let lock = SpinLock::new(41);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        assert_eq!(*lock.lock(), 42);
    }

    #[test]
    fn concurrent_increments_do_not_race() {
        const THREADS: usize = 4;
        const INCREMENTS: usize = 10_000;

        let lock = Arc::new(SpinLock::new(0_usize));
        let mut handles = Vec::new();
        for _ in 0..THREADS {
            let lock = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                for _ in 0..INCREMENTS {
                    *lock.lock() += 1;
                }
            }));
        }
        for handle in handles {
            handle.join().expect("incrementer thread panicked");
        }

        assert_eq!(*lock.lock(), THREADS * INCREMENTS);
    }
}
