//! Cancellation Token
//!
//! One token per run. Cancelling drops the internal sender, so every
//! `select!` waiting on `done()` wakes up at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{LoadError, Result};

/// Shared, cloneable cancellation token
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    canceled: AtomicBool,
    /// Dropped on cancel; never used to send
    sender: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, done) = channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                canceled: AtomicBool::new(false),
                sender: Mutex::new(Some(sender)),
                done,
            }),
        }
    }

    /// Cancel the run. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.canceled.swap(true, Ordering::SeqCst) {
            tracing::debug!("cancellation requested");
        }
        self.inner.sender.lock().take();
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    /// `Err(Canceled)` once the token is cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(LoadError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Receiver that becomes disconnected on cancel, for use in `select!`
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }

    /// Sleep for `dur`, returning early with `Canceled` on cancellation
    pub fn sleep(&self, dur: Duration) -> Result<()> {
        crossbeam::select! {
            recv(self.done()) -> _ => Err(LoadError::Canceled),
            default(dur) => self.check(),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}
