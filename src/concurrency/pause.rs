//! Pause Gate
//!
//! Two-state machine (`Running` / `Paused`). Encoders call `wait` before
//! every row and block while paused.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::CancelToken;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Paused,
}

/// Running/Paused gate with a blocking, cancellable wait
pub struct Pauser {
    state: Mutex<State>,
    cond: Condvar,
}

impl Pauser {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Running),
            cond: Condvar::new(),
        }
    }

    pub fn pause(&self) {
        *self.state.lock() = State::Paused;
        tracing::info!("pipeline paused");
    }

    pub fn resume(&self) {
        *self.state.lock() = State::Running;
        self.cond.notify_all();
        tracing::info!("pipeline resumed");
    }

    pub fn is_paused(&self) -> bool {
        *self.state.lock() == State::Paused
    }

    /// Block until running, or fail with `Canceled`
    pub fn wait(&self, cancel: &CancelToken) -> Result<()> {
        let mut state = self.state.lock();
        while *state == State::Paused {
            cancel.check()?;
            // Cancellation does not notify the condvar, so poll it.
            self.cond.wait_for(&mut state, Duration::from_millis(10));
        }
        Ok(())
    }
}

impl Default for Pauser {
    fn default() -> Self {
        Self::new()
    }
}
