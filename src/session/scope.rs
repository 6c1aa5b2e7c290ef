//! Per-load navigation state
//!
//! Labels and the hover set belong to exactly one artifact load. A reload
//! swaps in a fresh scope before anything else happens, so stale labels are
//! never consulted once a reload has begun.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::hover::HoverSet;
use crate::labels::LabelSet;
use crate::surface::Surface;

#[derive(Debug)]
pub struct SessionScope {
    generation: u64,
    labels: LabelSet,
    hover: Mutex<HoverSet>,
    fragment_jump_pending: AtomicBool,
}

impl SessionScope {
    #[must_use]
    pub fn new(generation: u64, labels: LabelSet) -> Self {
        Self {
            generation,
            labels,
            hover: Mutex::new(HoverSet::new()),
            fragment_jump_pending: AtomicBool::new(true),
        }
    }

    /// Placeholder installed while a load is in progress.
    #[must_use]
    pub fn loading(generation: u64) -> Self {
        let scope = Self::new(generation, LabelSet::default());
        scope.fragment_jump_pending.store(false, Ordering::SeqCst);
        scope
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn hover(&self) -> MutexGuard<'_, HoverSet> {
        self.hover.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the once-per-load fragment jump. Only the first caller gets `true`.
    pub fn take_fragment_jump(&self) -> bool {
        self.fragment_jump_pending.swap(false, Ordering::SeqCst)
    }
}

/// Shared pointer to the current scope
#[derive(Clone, Debug)]
pub struct ScopeCell {
    current: Arc<RwLock<Arc<SessionScope>>>,
}

impl Default for ScopeCell {
    fn default() -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(SessionScope::loading(0)))),
        }
    }
}

impl ScopeCell {
    #[must_use]
    pub fn current(&self) -> Arc<SessionScope> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install `next`, clearing the highlight owned by the previous scope.
    pub fn replace(&self, next: SessionScope, surface: &dyn Surface) -> Arc<SessionScope> {
        let previous = {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, Arc::new(next))
        };
        previous.hover().clear(surface);
        previous
    }
}
