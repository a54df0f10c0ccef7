//! Disk Quota Lock
//!
//! A write-preferring shared/exclusive lock. Deliverers hold it shared
//! while writing KV pairs; the quota checker takes it exclusively while it
//! flushes and imports engines.
//!
//! ## State
//! ```text
//! ┌─────────────┬──────────────────┬────────────────┐
//! │ readers     │ writers_pending  │ writer_active  │
//! └─────────────┴──────────────────┴────────────────┘
//!  shared grant:    writers_pending == 0 && !writer_active
//!  exclusive grant: readers == 0 && !writer_active
//! ```
//!
//! Once an exclusive request is pending no new shared holds are granted,
//! so a stream of deliverers cannot starve the quota pass.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct State {
    readers: usize,
    writers_pending: usize,
    writer_active: bool,
}

impl State {
    fn can_share(&self) -> bool {
        self.writers_pending == 0 && !self.writer_active
    }
}

/// Write-preferring shared/exclusive lock
#[derive(Default)]
pub struct DiskQuotaLock {
    state: Mutex<State>,
    cond: Condvar,
}

impl DiskQuotaLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a shared hold without blocking
    pub fn try_acquire_shared(&self) -> bool {
        let mut state = self.state.lock();
        if state.can_share() {
            state.readers += 1;
            true
        } else {
            false
        }
    }

    /// Acquire a shared hold, blocking while a writer is active or pending
    pub fn acquire_shared(&self) {
        let mut state = self.state.lock();
        while !state.can_share() {
            self.cond.wait(&mut state);
        }
        state.readers += 1;
    }

    pub fn release_shared(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.readers > 0, "release_shared without a shared hold");
        state.readers = state.readers.saturating_sub(1);
        if state.readers == 0 {
            self.cond.notify_all();
        }
    }

    /// Acquire the exclusive hold. New shared requests are refused from the
    /// moment this call starts waiting.
    pub fn acquire_exclusive(&self) {
        let mut state = self.state.lock();
        state.writers_pending += 1;
        while state.readers > 0 || state.writer_active {
            self.cond.wait(&mut state);
        }
        state.writers_pending -= 1;
        state.writer_active = true;
    }

    pub fn release_exclusive(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.writer_active, "release_exclusive without the exclusive hold");
        state.writer_active = false;
        self.cond.notify_all();
    }

    /// Number of shared holders (for testing/debugging)
    pub fn shared_count(&self) -> usize {
        self.state.lock().readers
    }

    /// True while an exclusive hold is active or requested
    pub fn is_exclusive_requested(&self) -> bool {
        let state = self.state.lock();
        state.writer_active || state.writers_pending > 0
    }

    // =========================================================================
    // RAII Guards
    // =========================================================================

    pub fn try_read(&self) -> Option<QuotaReadGuard<'_>> {
        if self.try_acquire_shared() {
            Some(QuotaReadGuard { lock: self })
        } else {
            None
        }
    }

    pub fn read(&self) -> QuotaReadGuard<'_> {
        self.acquire_shared();
        QuotaReadGuard { lock: self }
    }

    pub fn write(&self) -> QuotaWriteGuard<'_> {
        self.acquire_exclusive();
        QuotaWriteGuard { lock: self }
    }
}

/// Shared hold, released on drop
pub struct QuotaReadGuard<'a> {
    lock: &'a DiskQuotaLock,
}

impl Drop for QuotaReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_shared();
    }
}

/// Exclusive hold, released on drop
pub struct QuotaWriteGuard<'a> {
    lock: &'a DiskQuotaLock,
}

impl Drop for QuotaWriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_exclusive();
    }
}
