//! Timer thread driving the render scheduler

use std::thread;
use std::time::Instant;

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, trace};

use super::state::{RenderScheduler, ViewportEvent};
use crate::engine::Fidelity;

enum DriverMessage {
    Viewport(ViewportEvent),
    Shutdown,
}

/// Owns the scheduler on a dedicated thread and forwards every emitted pass
/// to `sink`.
pub struct SchedulerDriver {
    tx: Sender<DriverMessage>,
}

impl SchedulerDriver {
    pub fn spawn<F>(scheduler: RenderScheduler, sink: F) -> Self
    where
        F: FnMut(Fidelity) + Send + 'static,
    {
        let (tx, rx) = flume::unbounded();

        thread::Builder::new()
            .name("bookweave-scheduler".to_string())
            .spawn(move || drive(scheduler, rx, sink))
            .map_err(|e| error!("Failed to spawn render scheduler: {e}"))
            .ok();

        Self { tx }
    }

    pub fn notify(&self, event: ViewportEvent) {
        if self.tx.send(DriverMessage::Viewport(event)).is_err() {
            debug!("Scheduler stopped, ignoring {event:?}");
        }
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(DriverMessage::Shutdown);
    }
}

impl Drop for SchedulerDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn drive<F>(mut scheduler: RenderScheduler, messages: Receiver<DriverMessage>, mut sink: F)
where
    F: FnMut(Fidelity),
{
    loop {
        let message = match scheduler.next_deadline() {
            Some(deadline) => messages.recv_deadline(deadline),
            None => messages.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match message {
            Ok(DriverMessage::Viewport(event)) => {
                trace!("Viewport event {event:?}");
                scheduler.on_event(event, Instant::now());
            }
            Ok(DriverMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        for fidelity in scheduler.poll(Instant::now()) {
            debug!("Emitting {fidelity} render");
            sink(fidelity);
        }
    }
    debug!("Render scheduler stopped");
}
