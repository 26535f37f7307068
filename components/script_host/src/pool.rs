//! Free list of reusable objects

use parking_lot::{Mutex, MutexGuard};

/// Bounded free list; objects are taken out for exclusive use and put back
/// when done
#[derive(Debug)]
pub struct ObjectPool<T> {
    idle: Mutex<Vec<T>>,
    max_idle: usize,
}

impl<T> ObjectPool<T> {
    /// Pool keeping at most `max_idle` objects
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Take the most recently returned object
    pub fn take(&self) -> Option<T> {
        self.idle.lock().pop()
    }

    /// Return an object; gives it back when the pool is full
    pub fn put(&self, item: T) -> Result<(), T> {
        let mut idle = self.idle.lock();
        if idle.len() >= self.max_idle {
            return Err(item);
        }
        idle.push(item);
        Ok(())
    }

    /// Drop every idle object; returns how many were dropped
    pub fn clear(&self) -> usize {
        let drained: Vec<T> = self.idle.lock().drain(..).collect();
        drained.len()
    }

    /// Exclusive access to the idle objects; `take` and `put` block while
    /// the guard lives
    pub fn idle(&self) -> MutexGuard<'_, Vec<T>> {
        self.idle.lock()
    }

    /// Number of idle objects
    pub fn len(&self) -> usize {
        self.idle.lock().len()
    }

    /// True when no object is idle
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of idle objects
    pub fn max_idle(&self) -> usize {
        self.max_idle
    }
}
