//! Two-slot double buffer for glitch-free live state updates.
//!
//! [`DoubleBuffer`] holds two complete instances of a state value and one
//! atomic index naming the current one. The control path always writes into
//! the instance *not* currently referenced, filling it completely before
//! publication; publication is a single atomic index store. The real-time
//! path copies the current instance out once per call and uses that snapshot
//! for the entire call, so it can never observe a half-updated value.
//!
//! The same abstraction is reused for every independently swapped state
//! family (EQ, limiter, crossover) instead of duplicating the swap logic.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Two slots plus one atomic current-index.
///
/// # Contract
///
/// - Exactly one context (the control path) calls [`publish()`](Self::publish)
///   or [`update()`](Self::update).
/// - Readers call [`snapshot()`](Self::snapshot); a snapshot is a copy, so
///   the control path may publish again while a reader still uses the copy.
/// - The control path must not publish twice within one real-time callback;
///   the host invokes coefficient updates far slower than the block rate.
pub struct DoubleBuffer<T> {
    slots: [UnsafeCell<T>; 2],
    current: AtomicUsize,
}

// SAFETY: All shared access is mediated by `current`. The single-writer
// contract guarantees the inactive slot is only ever mutated by one context,
// and readers copy the active slot out instead of holding references into it.
unsafe impl<T: Copy + Send> Sync for DoubleBuffer<T> {}

impl<T: Copy> DoubleBuffer<T> {
    /// Create a double buffer with both slots holding `initial`.
    pub fn new(initial: T) -> Self {
        DoubleBuffer {
            slots: [UnsafeCell::new(initial), UnsafeCell::new(initial)],
            current: AtomicUsize::new(0),
        }
    }

    /// Copy the current instance out (real-time path).
    #[inline]
    pub fn snapshot(&self) -> T {
        let idx = self.current.load(Ordering::Acquire);
        // SAFETY: `idx` names the published slot. The writer only mutates
        // the other slot, and `Acquire` pairs with the `Release` store in
        // `publish` so the slot's contents are fully visible.
        unsafe { core::ptr::read(self.slots[idx].get()) }
    }

    /// Replace the inactive instance with `value` and publish it.
    pub fn publish(&self, value: T) {
        let inactive = 1 - self.current.load(Ordering::Relaxed);
        // SAFETY: single-writer contract; readers never touch the inactive
        // slot, so this write is exclusive until the store below.
        unsafe {
            core::ptr::write(self.slots[inactive].get(), value);
        }
        self.current.store(inactive, Ordering::Release);
    }

    /// Copy the current instance into the inactive slot, let `f` mutate it,
    /// then publish. Used for partial updates (e.g. one filter bank) that
    /// must still publish a complete instance.
    pub fn update<F: FnOnce(&mut T)>(&self, f: F) {
        let mut staged = self.snapshot();
        f(&mut staged);
        self.publish(staged);
    }
}
