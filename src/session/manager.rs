//! Session lifecycle: theme-driven artifact reloads

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use log::{debug, info, warn};

use super::chain::{Completion, OperationChain, SessionSlot};
use super::scope::{ScopeCell, SessionScope};
use crate::engine::{Artifact, ArtifactKey, LABEL_METADATA_KEY, RenderEngine, RenderResult, SessionHandle};
use crate::error::Result;
use crate::labels::LabelSet;
use crate::settings::ViewerSettings;
use crate::surface::{ElementId, Surface, dom};
use crate::units;

/// Ambient theme preference
pub type ThemeSource = Arc<dyn Fn() -> String + Send + Sync>;

/// Delivered to listeners once freshly loaded content is visible
#[derive(Clone, Debug)]
pub struct ContentReady {
    pub generation: u64,
    pub session: SessionHandle,
    pub key: ArtifactKey,
    pub scope: Arc<SessionScope>,
}

type ContentListener = Arc<dyn Fn(&ContentReady) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<(ListenerId, ContentListener)>,
}

pub struct SessionManager {
    engine: Arc<dyn RenderEngine>,
    surface: Arc<dyn Surface>,
    chain: OperationChain,
    scope: ScopeCell,
    settings: Arc<ViewerSettings>,
    doc_path: String,
    theme_source: ThemeSource,
    theme: Mutex<Option<String>>,
    generation: AtomicU64,
    listeners: Arc<Mutex<ListenerRegistry>>,
}

impl SessionManager {
    pub fn new(
        engine: Arc<dyn RenderEngine>,
        surface: Arc<dyn Surface>,
        chain: OperationChain,
        scope: ScopeCell,
        settings: Arc<ViewerSettings>,
        doc_path: impl Into<String>,
        theme_source: ThemeSource,
    ) -> Self {
        Self {
            engine,
            surface,
            chain,
            scope,
            settings,
            doc_path: doc_path.into(),
            theme_source,
            theme: Mutex::new(None),
            generation: AtomicU64::new(0),
            listeners: Arc::new(Mutex::new(ListenerRegistry::default())),
        }
    }

    /// Theme of the latest requested load.
    #[must_use]
    pub fn current_theme(&self) -> Option<String> {
        self.theme
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn doc_path(&self) -> &str {
        &self.doc_path
    }

    /// Register a post-render hook, invoked on the chain after every
    /// successful load.
    pub fn on_content_ready<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ContentReady) + Send + Sync + 'static,
    {
        let mut registry = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);
        registry.listeners.push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut registry = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = registry.listeners.len();
        registry.listeners.retain(|(existing, _)| *existing != id);
        registry.listeners.len() != before
    }

    /// Re-read the theme preference and reload if it changed. An unchanged
    /// theme returns the latest queued operation instead.
    pub fn change_theme(&self) -> Completion {
        let next = (self.theme_source)();
        let mut theme = self.theme.lock().unwrap_or_else(PoisonError::into_inner);
        if theme.as_deref() == Some(next.as_str()) {
            debug!("Theme unchanged ({next}), no reload");
            return self.chain.tail();
        }

        *theme = Some(next.clone());
        self.enqueue_reload(next)
    }

    /// Unconditionally load the artifact for `theme`, queued behind all
    /// pending work.
    pub fn reload(&self, theme: &str) -> Completion {
        let mut current = self.theme.lock().unwrap_or_else(PoisonError::into_inner);
        *current = Some(theme.to_string());
        self.enqueue_reload(theme.to_string())
    }

    fn enqueue_reload(&self, theme: String) -> Completion {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let job = ReloadJob {
            engine: self.engine.clone(),
            surface: self.surface.clone(),
            scope: self.scope.clone(),
            settings: self.settings.clone(),
            listeners: self.listeners.clone(),
            key: ArtifactKey::new(self.doc_path.clone(), theme),
            generation,
        };
        self.chain.enqueue("reload", move |slot| job.run(slot))
    }
}

struct ReloadJob {
    engine: Arc<dyn RenderEngine>,
    surface: Arc<dyn Surface>,
    scope: ScopeCell,
    settings: Arc<ViewerSettings>,
    listeners: Arc<Mutex<ListenerRegistry>>,
    key: ArtifactKey,
    generation: u64,
}

impl ReloadJob {
    fn run(self, slot: &mut SessionSlot) -> Result<()> {
        let surface = self.surface.as_ref();
        self.scope
            .replace(SessionScope::loading(self.generation), surface);
        self.dispose(slot);

        let container = surface.container();
        surface.clear_children(container);
        surface.remove_attribute(container, dom::APPLIED_WIDTH_ATTR);

        let resource = self.key.resource_name(&self.settings.artifact_extension);
        let started = Instant::now();
        let bytes = self.engine.fetch_artifact(&self.key, &resource)?;
        let fetched = Instant::now();
        let artifact = Artifact::new(self.key.clone(), bytes);
        let session = self.engine.create_session(&artifact)?;
        let created = Instant::now();
        info!(
            "theme = {}, load artifact took {:?}, create session took {:?} ({} bytes)",
            self.key.theme,
            fetched - started,
            created - fetched,
            artifact.len()
        );
        slot.session = Some(session);
        slot.artifact = Some(artifact);

        surface.set_horizontal_margin(container, 0.0);
        let result = self
            .engine
            .render_full(session, container, self.settings.render_density)?;
        self.center(container, &result);
        debug!("Full render took {:?}", created.elapsed());

        let labels = self.load_labels(session, container);
        debug!("Loaded {} labels for {}", labels.len(), resource);
        self.scope
            .replace(SessionScope::new(self.generation, labels), surface);

        let ready = ContentReady {
            generation: self.generation,
            session,
            key: self.key.clone(),
            scope: self.scope.current(),
        };
        let listeners: Vec<ContentListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&ready);
        }

        Ok(())
    }

    /// Best-effort disposal of the previous session.
    fn dispose(&self, slot: &mut SessionSlot) {
        slot.artifact = None;
        if let Some(previous) = slot.session.take() {
            if let Err(e) = self.engine.dispose_session(previous) {
                warn!("Ignoring failure to dispose {previous:?}: {e}");
            }
        }
    }

    fn center(&self, container: ElementId, result: &RenderResult) {
        let surface = self.surface.as_ref();
        let Some(applied) = result.applied_width else {
            return;
        };
        surface.set_attribute(container, dom::APPLIED_WIDTH_ATTR, &format!("{applied}px"));

        let Some(parent) = surface.parent(container) else {
            return;
        };
        let margin = (surface.bounding_rect(parent).width - applied) / 2.0;
        surface.set_horizontal_margin(container, margin.max(0.0));
    }

    fn load_labels(&self, session: SessionHandle, container: ElementId) -> LabelSet {
        let mut labels = match self.engine.metadata(session, LABEL_METADATA_KEY) {
            Ok(Some(bytes)) => LabelSet::from_metadata(&bytes).unwrap_or_else(|e| {
                warn!("Ignoring label table: {e}");
                LabelSet::default()
            }),
            Ok(None) => LabelSet::default(),
            Err(e) => {
                warn!("Label table unavailable: {e}");
                LabelSet::default()
            }
        };

        let surface = self.surface.as_ref();
        if let Some(doc_root) = units::first_doc_root(surface, container) {
            labels.bind_roots(|unit| units::visual_root_for_unit(surface, doc_root, unit));
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineFault;
    use crate::error::ViewerError;
    use crate::test_utils::{FakeEngine, FakeSurface};

    fn manager(
        engine: &Arc<FakeEngine>,
        surface: &Arc<FakeSurface>,
        theme: &'static str,
    ) -> (SessionManager, ScopeCell) {
        let scope = ScopeCell::default();
        let manager = SessionManager::new(
            engine.clone(),
            surface.clone(),
            OperationChain::spawn(),
            scope.clone(),
            Arc::new(ViewerSettings::default()),
            "doc.a",
            Arc::new(move || theme.to_string()),
        );
        (manager, scope)
    }

    fn fixture() -> (Arc<FakeEngine>, Arc<FakeSurface>) {
        let surface = Arc::new(FakeSurface::new());
        let engine = Arc::new(FakeEngine::with_surface(surface.clone()));
        (engine, surface)
    }

    #[test]
    fn unchanged_theme_loads_once() {
        let (engine, surface) = fixture();
        let (manager, _) = manager(&engine, &surface, "light");

        manager.change_theme().wait().unwrap();
        manager.change_theme().wait().unwrap();
        manager.change_theme().wait().unwrap();

        assert_eq!(engine.fetches(), vec!["doc.a.light.multi.sir.in".to_string()]);
        assert_eq!(engine.created_sessions().len(), 1);
        assert_eq!(manager.current_theme().as_deref(), Some("light"));
    }

    #[test]
    fn reload_disposes_previous_session() {
        let (engine, surface) = fixture();
        let (manager, _) = manager(&engine, &surface, "light");

        manager.change_theme().wait().unwrap();
        manager.reload("dark").wait().unwrap();

        let sessions = engine.created_sessions();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[1].1, ArtifactKey::new("doc.a", "dark"));
        assert_eq!(engine.disposed(), vec![sessions[0].0]);
        assert!(engine.violations().is_empty());
        // the first document was cleared before the second render
        let docs = engine.documents();
        assert!(!surface.contains_element(docs[0].root));
        assert!(surface.contains_element(docs[1].root));
    }

    #[test]
    fn disposal_failure_is_swallowed() {
        let (engine, surface) = fixture();
        let (manager, _) = manager(&engine, &surface, "light");
        engine.fail_disposals(true);

        manager.change_theme().wait().unwrap();
        assert_eq!(manager.reload("dark").wait(), Ok(()));
        assert_eq!(engine.created_sessions().len(), 2);
    }

    #[test]
    fn fetch_failure_rejects_the_reload() {
        let (engine, surface) = fixture();
        let (manager, _) = manager(&engine, &surface, "light");
        engine.fail_fetches(true);

        let outcome = manager.change_theme().wait();
        assert!(matches!(
            outcome,
            Err(ViewerError::Engine(EngineFault::Fetch { .. }))
        ));
        assert!(engine.created_sessions().is_empty());
    }

    #[test]
    fn centers_container_on_applied_width() {
        let (engine, surface) = fixture();
        engine.set_applied_width(Some(600.0));
        let (manager, _) = manager(&engine, &surface, "light");

        manager.change_theme().wait().unwrap();

        let container = surface.container();
        assert_eq!(
            surface.attribute(container, dom::APPLIED_WIDTH_ATTR).as_deref(),
            Some("600px")
        );
        assert_eq!(surface.margin(container), 200.0);
    }

    #[test]
    fn wide_content_gets_no_negative_margin() {
        let (engine, surface) = fixture();
        engine.set_applied_width(Some(1600.0));
        let (manager, _) = manager(&engine, &surface, "light");

        manager.change_theme().wait().unwrap();
        assert_eq!(surface.margin(surface.container()), 0.0);
    }

    #[test]
    fn labels_are_bound_to_visual_roots() {
        let (engine, surface) = fixture();
        engine.set_units(2);
        engine.set_labels(&[("intro", "p1x0.5y0.2"), ("outro", "p2x0.1y0.9")]);
        let (manager, scope) = manager(&engine, &surface, "light");

        manager.change_theme().wait().unwrap();

        let doc = &engine.documents()[0];
        let scope = scope.current();
        assert_eq!(scope.generation(), 1);
        assert_eq!(scope.labels().len(), 2);
        assert_eq!(
            scope.labels().by_name("outro").and_then(|l| l.root),
            Some(doc.visual_roots[1])
        );
    }

    #[test]
    fn malformed_label_table_yields_empty_set() {
        let (engine, surface) = fixture();
        engine.set_raw_label_table(b"not json");
        let (manager, scope) = manager(&engine, &surface, "light");

        assert_eq!(manager.change_theme().wait(), Ok(()));
        assert!(scope.current().labels().is_empty());
    }

    #[test]
    fn listeners_see_every_load() {
        let (engine, surface) = fixture();
        let (manager, _) = manager(&engine, &surface, "light");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let id = manager.on_content_ready(move |ready| {
            sink.lock().unwrap().push((ready.generation, ready.key.theme.clone()));
        });
        manager.change_theme().wait().unwrap();
        manager.reload("dark").wait().unwrap();
        assert!(manager.remove_listener(id));
        manager.reload("light").wait().unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(1, "light".to_string()), (2, "dark".to_string())]
        );
        assert!(!manager.remove_listener(id));
    }
}
