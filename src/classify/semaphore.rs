use std::sync::{Condvar, Mutex, MutexGuard};

/// Counting semaphore that caps how many jobs run at once.
#[derive(Debug)]
pub struct Semaphore {
    available: Mutex<usize>,
    released: Condvar,
    capacity: usize,
}

/// Slot held by a running job; dropping it frees the slot.
#[derive(Debug)]
pub struct Permit<'a> {
    semaphore: &'a Semaphore,
}

impl Semaphore {
    /// Create a semaphore with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            available: Mutex::new(capacity),
            released: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until a slot is free and take it.
    pub fn acquire(&self) -> Permit<'_> {
        let mut available = self.lock();
        while *available == 0 {
            available = self
                .released
                .wait(available)
                .unwrap_or_else(|err| err.into_inner());
        }
        *available -= 1;
        Permit { semaphore: self }
    }

    /// Take a slot if one is free right now.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut available = self.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(Permit { semaphore: self })
    }

    pub fn available(&self) -> usize {
        *self.lock()
    }

    fn release(&self) {
        let mut available = self.lock();
        *available = (*available + 1).min(self.capacity);
        self.released.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.available.lock().unwrap_or_else(|err| err.into_inner())
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn permits_are_returned_on_drop() {
        let semaphore = Semaphore::new(2);
        let a = semaphore.acquire();
        let _b = semaphore.acquire();
        assert!(semaphore.try_acquire().is_none());
        drop(a);
        assert_eq!(semaphore.available(), 1);
        assert!(semaphore.try_acquire().is_some());
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let semaphore = Semaphore::new(0);
        assert_eq!(semaphore.capacity(), 1);
        assert!(semaphore.try_acquire().is_some());
    }

    #[test]
    fn never_exceeds_capacity_under_contention() {
        let semaphore = Semaphore::new(3);
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        thread::scope(|scope| {
            for _ in 0..12 {
                scope.spawn(|| {
                    let _permit = semaphore.acquire();
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    running.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(semaphore.available(), 3);
    }
}
