//! Atomic reference counting
//!
//! A component object carries exactly one [`RefCount`], shared by every
//! interface view of it. Counts returned by [`RefCount::retain`] and
//! [`RefCount::release`] are the exact result of the atomic operation that
//! produced them, but another thread may change the count immediately
//! afterwards, so callers must treat them as advisory.

use std::sync::atomic::{self, AtomicU32, Ordering};

/// Counts above this abort the process, like `Arc` does, so a leaked
/// retain loop cannot wrap the counter back to zero.
const MAX_REFCOUNT: u32 = i32::MAX as u32;

/// Shared, object-wide reference count
#[derive(Debug)]
pub struct RefCount(AtomicU32);

impl RefCount {
    /// Create a count holding `initial` references
    pub const fn new(initial: u32) -> Self {
        Self(AtomicU32::new(initial))
    }

    /// Add one reference and return the new count
    pub fn retain(&self) -> u32 {
        // A new reference is always made from an existing one, so no
        // synchronization with other threads is needed here.
        let previous = self.0.fetch_add(1, Ordering::Relaxed);
        if previous > MAX_REFCOUNT {
            tracing::error!(count = previous, "reference count overflow");
            std::process::abort();
        }
        previous + 1
    }

    /// Drop one reference and return the new count.
    ///
    /// When this returns zero the caller observed the last reference and
    /// every write made through other references happens-before the return.
    ///
    /// # Panics
    ///
    /// Releasing a count that is already zero is an invariant violation.
    pub fn release(&self) -> u32 {
        let previous = self.0.fetch_sub(1, Ordering::Release);
        if previous == 0 {
            self.0.store(0, Ordering::Relaxed);
            underflow();
        }
        if previous == 1 {
            atomic::fence(Ordering::Acquire);
        }
        previous - 1
    }

    /// Current count (a snapshot)
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cold]
#[inline(never)]
fn underflow() -> ! {
    tracing::error!("reference count released below zero");
    panic!("reference count underflow: released more references than were held");
}
