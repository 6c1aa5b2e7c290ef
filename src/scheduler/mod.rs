//! Render scheduling: coalescing viewport events into chained render passes

mod driver;
mod slot;
mod state;

pub use driver::SchedulerDriver;
pub use slot::PassSlot;
pub use state::{RenderScheduler, SchedulerState, ViewportEvent};

use std::sync::Arc;

use log::{debug, trace};

use crate::engine::{Fidelity, IncrementalRender, RenderEngine};
use crate::session::{Completion, OperationChain};
use crate::surface::Surface;

/// Appends render passes to the operation chain.
///
/// The visible rectangle is computed when the job runs, against whatever
/// session is current at that point.
#[derive(Clone)]
pub struct RenderQueue {
    engine: Arc<dyn RenderEngine>,
    surface: Arc<dyn Surface>,
    chain: OperationChain,
    slot: PassSlot,
}

impl RenderQueue {
    pub fn new(
        engine: Arc<dyn RenderEngine>,
        surface: Arc<dyn Surface>,
        chain: OperationChain,
    ) -> Self {
        Self {
            engine,
            surface,
            chain,
            slot: PassSlot::new(),
        }
    }

    #[must_use]
    pub fn slot(&self) -> &PassSlot {
        &self.slot
    }

    pub fn submit(&self, fidelity: Fidelity) -> Completion {
        self.slot.offer(fidelity);

        let engine = self.engine.clone();
        let surface = self.surface.clone();
        let slot = self.slot.clone();
        self.chain.enqueue("render", move |session_slot| {
            let Some(fidelity) = slot.take() else {
                trace!("Render superseded, skipping");
                return Ok(());
            };
            let Some(session) = session_slot.session else {
                debug!("No live session, dropping {fidelity} render");
                return Ok(());
            };

            let container = surface.bounding_rect(surface.container());
            let viewport = surface.viewport().intersect(&container);
            engine.render_incremental(session, &IncrementalRender { fidelity, viewport })?;
            Ok(())
        })
    }
}
