//! Serialized operation chain
//!
//! Every operation touching the session runs on one worker thread, strictly
//! in submission order and one at a time. A job owns the [`SessionSlot`] for
//! its whole duration, so a reload can never interleave with a render.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use flume::{Receiver, Sender};
use log::{debug, error, warn};

use crate::engine::{Artifact, SessionHandle};
use crate::error::{Result, ViewerError};

/// Session state guarded by the chain
#[derive(Debug, Default)]
pub struct SessionSlot {
    pub session: Option<SessionHandle>,
    pub artifact: Option<Artifact>,
}

type Job = Box<dyn FnOnce(&mut SessionSlot) -> Result<()> + Send>;

enum ChainMessage {
    Run {
        name: &'static str,
        job: Job,
        done: PendingCompletion,
    },
    Shutdown,
}

/// Settles its completion with `ChainClosed` if dropped unfinished, e.g. when
/// the worker exits with messages still queued.
struct PendingCompletion(Completion);

impl PendingCompletion {
    fn finish(self, outcome: Result<()>) {
        self.0.settle(outcome);
    }
}

impl Drop for PendingCompletion {
    fn drop(&mut self) {
        self.0.settle(Err(ViewerError::ChainClosed));
    }
}

struct CompletionState {
    outcome: Mutex<Option<Result<()>>>,
    settled: Condvar,
}

/// Shareable outcome of a chained operation.
///
/// Clones observe the same outcome; waiting on a settled completion returns
/// immediately.
#[derive(Clone)]
pub struct Completion {
    state: Arc<CompletionState>,
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl Completion {
    fn pending() -> Self {
        Self {
            state: Arc::new(CompletionState {
                outcome: Mutex::new(None),
                settled: Condvar::new(),
            }),
        }
    }

    /// A completion that is already settled with `outcome`.
    #[must_use]
    pub fn settled(outcome: Result<()>) -> Self {
        let completion = Self::pending();
        completion.settle(outcome);
        completion
    }

    fn settle(&self, outcome: Result<()>) {
        let mut slot = self
            .state
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(outcome);
            self.state.settled.notify_all();
        }
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.state
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Block until the operation finished. Must not be called from a chain job.
    pub fn wait(&self) -> Result<()> {
        let mut slot = self
            .state
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = self
                .state
                .settled
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`Completion::wait`], giving up after `timeout`.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<()>> {
        let slot = self
            .state
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (slot, _) = self
            .state
            .settled
            .wait_timeout_while(slot, timeout, |outcome| outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.clone()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Completion) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

struct ChainInner {
    tx: Sender<ChainMessage>,
    tail: Mutex<Completion>,
}

impl Drop for ChainInner {
    fn drop(&mut self) {
        let _ = self.tx.send(ChainMessage::Shutdown);
    }
}

/// FIFO chain of session operations, shared by every viewer component.
#[derive(Clone)]
pub struct OperationChain {
    inner: Arc<ChainInner>,
}

impl OperationChain {
    /// Spawn the chain worker.
    #[must_use]
    pub fn spawn() -> Self {
        let (tx, rx) = flume::unbounded();

        thread::Builder::new()
            .name("bookweave-chain".to_string())
            .spawn(move || chain_worker(rx))
            .map_err(|e| error!("Failed to spawn operation chain: {e}"))
            .ok();

        Self {
            inner: Arc::new(ChainInner {
                tx,
                tail: Mutex::new(Completion::settled(Ok(()))),
            }),
        }
    }

    /// Append a job. The returned completion settles once the job ran.
    pub fn enqueue<F>(&self, name: &'static str, job: F) -> Completion
    where
        F: FnOnce(&mut SessionSlot) -> Result<()> + Send + 'static,
    {
        let done = Completion::pending();
        let message = ChainMessage::Run {
            name,
            job: Box::new(job),
            done: PendingCompletion(done.clone()),
        };

        // send and tail update must appear atomic to concurrent enqueuers
        let mut tail = self
            .inner
            .tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.inner.tx.send(message).is_err() {
            debug!("Chain closed, dropping {name}");
        }
        *tail = done.clone();
        done
    }

    /// Completion of the most recently enqueued job.
    #[must_use]
    pub fn tail(&self) -> Completion {
        self.inner
            .tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop the worker after already queued jobs ran.
    pub fn shutdown(&self) {
        let _ = self.inner.tx.send(ChainMessage::Shutdown);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.tx.is_disconnected()
    }
}

fn chain_worker(messages: Receiver<ChainMessage>) {
    let mut slot = SessionSlot::default();

    for message in messages.iter() {
        match message {
            ChainMessage::Run { name, job, done } => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&mut slot)))
                    .unwrap_or_else(|_| {
                        error!("Chain job {name} panicked");
                        Err(ViewerError::Abandoned)
                    });
                if let Err(e) = &outcome {
                    warn!("Chain job {name} failed: {e}");
                }
                done.finish(outcome);
            }
            ChainMessage::Shutdown => break,
        }
    }

    // Queued jobs are dropped unrun; their completions settle as closed.
    for message in messages.drain() {
        drop(message);
    }
    debug!("Operation chain stopped");
}
