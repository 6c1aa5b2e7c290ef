//! Composition root: one viewer per rendered page

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};

use crate::engine::{Fidelity, RenderEngine};
use crate::error::Result;
use crate::geometry::Point;
use crate::links::CrossLinkResolver;
use crate::navigator::SemanticNavigator;
use crate::scheduler::{RenderQueue, RenderScheduler, SchedulerDriver, ViewportEvent};
use crate::session::{Completion, OperationChain, ScopeCell, SessionManager, SessionScope, ThemeSource};
use crate::settings::ViewerSettings;
use crate::surface::{ElementId, Surface};

/// Wires the session manager, render scheduler, cross-link resolver and
/// navigator around a single operation chain.
///
/// Every operation touching the engine session is queued on that chain, so
/// loads, renders and label focus never interleave.
pub struct Viewer {
    chain: OperationChain,
    scope: ScopeCell,
    settings: Arc<ViewerSettings>,
    sessions: SessionManager,
    renders: RenderQueue,
    driver: SchedulerDriver,
    navigator: Arc<SemanticNavigator>,
}

impl Viewer {
    pub fn new(
        engine: Arc<dyn RenderEngine>,
        surface: Arc<dyn Surface>,
        doc_path: impl Into<String>,
        theme_source: ThemeSource,
        settings: ViewerSettings,
    ) -> Self {
        let settings = Arc::new(settings);
        let chain = OperationChain::spawn();
        let scope = ScopeCell::default();

        let sessions = SessionManager::new(
            engine.clone(),
            surface.clone(),
            chain.clone(),
            scope.clone(),
            settings.clone(),
            doc_path,
            theme_source,
        );

        let renders = RenderQueue::new(engine.clone(), surface.clone(), chain.clone());
        let scheduler = RenderScheduler::new(&settings.scheduler, surface.supports_scroll_end());
        let sink = renders.clone();
        let driver = SchedulerDriver::spawn(scheduler, move |fidelity| {
            sink.submit(fidelity);
        });

        let navigator = Arc::new(SemanticNavigator::new(
            engine,
            surface.clone(),
            chain.clone(),
            scope.clone(),
            settings.navigation.clone(),
        ));
        let resolver = Arc::new(CrossLinkResolver::new(
            surface,
            chain.clone(),
            scope.clone(),
            settings.clone(),
            navigator.clone(),
        ));
        sessions.on_content_ready(move |ready| resolver.on_content_ready(ready));

        info!("Viewer created for {}", sessions.doc_path());
        Self {
            chain,
            scope,
            settings,
            sessions,
            renders,
            driver,
            navigator,
        }
    }

    /// Initial load under the ambient theme.
    pub fn open(&self) -> Completion {
        self.sessions.change_theme()
    }

    pub fn change_theme(&self) -> Completion {
        self.sessions.change_theme()
    }

    pub fn reload(&self, theme: &str) -> Completion {
        self.sessions.reload(theme)
    }

    /// Feed a viewport event to the render scheduler.
    pub fn on_viewport_event(&self, event: ViewportEvent) {
        self.driver.notify(event);
    }

    /// Queue a render pass right away, bypassing the debounce timers.
    pub fn rerender(&self, fidelity: Fidelity) -> Completion {
        self.renders.submit(fidelity)
    }

    /// [`Viewer::rerender`] from a raw flag; an unknown flag is a caller bug
    /// and is rejected before anything is queued.
    pub fn request_render(&self, flag: &str) -> Result<Completion> {
        let fidelity = flag.parse::<Fidelity>()?;
        Ok(self.rerender(fidelity))
    }

    pub fn on_content_click(&self, unit: u32, x: f64, y: f64) -> Completion {
        self.navigator.on_content_click(unit, x, y)
    }

    /// The address fragment changed: jump to it once pending work settled.
    pub fn on_hash_change(&self) -> Completion {
        let navigator = self.navigator.clone();
        let scope = self.scope.clone();
        self.chain.enqueue("hash-jump", move |_| {
            if !navigator.jump_to_fragment(&scope.current()) {
                debug!("Address fragment did not resolve to a location");
            }
            Ok(())
        })
    }

    /// Report the source span behind a clicked element, if any.
    pub fn on_element_click(&self, element: ElementId, at: Point) -> Option<String> {
        self.navigator.on_element_click(element, at)
    }

    pub fn on_link_hover(&self, element: ElementId) {
        self.navigator.on_link_hover(element, Instant::now());
    }

    pub fn on_link_leave(&self, element: ElementId) {
        self.navigator.on_link_leave(element);
    }

    /// Labels and highlight of the current load.
    #[must_use]
    pub fn scope(&self) -> Arc<SessionScope> {
        self.scope.current()
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub fn navigator(&self) -> &Arc<SemanticNavigator> {
        &self.navigator
    }

    #[must_use]
    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    /// Settles once everything queued so far has run.
    pub fn idle(&self) -> Completion {
        self.chain.tail()
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.driver.shutdown();
        self.chain.shutdown();
    }
}
