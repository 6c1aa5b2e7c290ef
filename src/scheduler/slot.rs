//! Pending pass coalescing
//!
//! Emitted passes are recorded here and consumed by the render job at drain
//! time. A final request is never downgraded by a later responsive one, and
//! a job that finds the slot empty was superseded and skips.

use std::sync::{Arc, Mutex, PoisonError};

use crate::engine::Fidelity;

#[derive(Clone, Debug, Default)]
pub struct PassSlot {
    pending: Arc<Mutex<Option<Fidelity>>>,
}

impl PassSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&self, fidelity: Fidelity) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = match (*pending, fidelity) {
            (Some(Fidelity::Final), Fidelity::Responsive) => Some(Fidelity::Final),
            (_, next) => Some(next),
        };
    }

    /// Take the pending pass, leaving the slot empty.
    pub fn take(&self) -> Option<Fidelity> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    #[must_use]
    pub fn peek(&self) -> Option<Fidelity> {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
