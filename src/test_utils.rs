//! In-memory engine and surface doubles for tests

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::engine::{
    Artifact, ArtifactKey, EngineFault, IncrementalRender, Motion, RenderEngine, RenderResult,
    SessionHandle,
};
use crate::geometry::{Point, Rect};
use crate::surface::{ElementId, RippleKind, Surface, dom};

const UNIT_HEIGHT: f64 = 1000.0;

#[derive(Clone, Debug, Default)]
struct Node {
    tag: String,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    classes: BTreeSet<String>,
    attributes: BTreeMap<String, String>,
    rect: Rect,
    margin: f64,
}

#[derive(Debug)]
struct SurfaceState {
    nodes: HashMap<ElementId, Node>,
    next_id: u64,
    hash: Option<String>,
    hash_history: Vec<String>,
    viewport: Rect,
    ripples: Vec<(Point, RippleKind)>,
}

/// Elements of a document built by [`FakeSurface::add_document`]
#[derive(Clone, Debug)]
pub struct FakeDocument {
    pub root: ElementId,
    pub units: Vec<ElementId>,
    pub visual_roots: Vec<ElementId>,
}

/// Element arena standing in for a browser page.
///
/// The page body is 1000px wide, the render container spans x 100..900,
/// and every unit is 1000px tall.
#[derive(Debug)]
pub struct FakeSurface {
    state: Mutex<SurfaceState>,
    container: ElementId,
    scroll_end: bool,
}

impl Default for FakeSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSurface {
    pub fn new() -> Self {
        let body = ElementId(0);
        let container = ElementId(1);
        let mut nodes = HashMap::new();
        nodes.insert(
            body,
            Node {
                tag: "body".to_string(),
                children: vec![container],
                rect: Rect::new(0.0, 0.0, 1000.0, 10_000.0),
                ..Node::default()
            },
        );
        nodes.insert(
            container,
            Node {
                tag: "div".to_string(),
                parent: Some(body),
                classes: BTreeSet::from(["typst-app".to_string()]),
                rect: Rect::new(100.0, 0.0, 800.0, 10_000.0),
                ..Node::default()
            },
        );

        Self {
            state: Mutex::new(SurfaceState {
                nodes,
                next_id: 2,
                hash: None,
                hash_history: Vec::new(),
                viewport: Rect::new(0.0, 0.0, 1000.0, 800.0),
                ripples: Vec::new(),
            }),
            container,
            scroll_end: false,
        }
    }

    pub fn with_scroll_end(mut self, supported: bool) -> Self {
        self.scroll_end = supported;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_element(&self, parent: ElementId, tag: &str) -> ElementId {
        let mut state = self.lock();
        let id = ElementId(state.next_id);
        state.next_id += 1;
        let rect = state
            .nodes
            .get(&parent)
            .map(|p| p.rect)
            .unwrap_or_default();
        state.nodes.insert(
            id,
            Node {
                tag: tag.to_string(),
                parent: Some(parent),
                rect,
                ..Node::default()
            },
        );
        if let Some(p) = state.nodes.get_mut(&parent) {
            p.children.push(id);
        }
        id
    }

    /// Build a document with `units` pages under the container.
    pub fn add_document(&self, units: u32) -> FakeDocument {
        let root = self.add_element(self.container, "svg");
        self.add_class(root, dom::DOC_ROOT_CLASS);

        let mut doc = FakeDocument {
            root,
            units: Vec::new(),
            visual_roots: Vec::new(),
        };
        for index in 0..units {
            let rect = Rect::new(100.0, f64::from(index) * UNIT_HEIGHT, 800.0, UNIT_HEIGHT);
            let unit = self.add_element(root, "g");
            self.add_class(unit, dom::UNIT_CLASS);
            self.set_attribute(unit, dom::UNIT_INDEX_ATTR, &index.to_string());
            self.set_rect(unit, rect);

            let visual = self.add_element(unit, "g");
            self.add_class(visual, dom::VISUAL_ROOT_CLASS);
            self.set_rect(visual, rect);

            doc.units.push(unit);
            doc.visual_roots.push(visual);
        }
        doc
    }

    /// Add an anchor with `attributes` occupying `rect`.
    pub fn add_anchor(&self, parent: ElementId, attributes: &[(&str, &str)], rect: Rect) -> ElementId {
        let anchor = self.add_element(parent, dom::ANCHOR_TAG);
        for (name, value) in attributes {
            self.set_attribute(anchor, name, value);
        }
        self.set_rect(anchor, rect);
        anchor
    }

    pub fn set_rect(&self, element: ElementId, rect: Rect) {
        if let Some(node) = self.lock().nodes.get_mut(&element) {
            node.rect = rect;
        }
    }

    pub fn set_viewport(&self, rect: Rect) {
        self.lock().viewport = rect;
    }

    pub fn set_hash(&self, hash: &str) {
        self.lock().hash = Some(hash.trim_start_matches('#').to_string());
    }

    pub fn hash_history(&self) -> Vec<String> {
        self.lock().hash_history.clone()
    }

    pub fn ripples(&self) -> Vec<(Point, RippleKind)> {
        self.lock().ripples.clone()
    }

    pub fn margin(&self, element: ElementId) -> f64 {
        self.lock()
            .nodes
            .get(&element)
            .map(|n| n.margin)
            .unwrap_or_default()
    }

    pub fn contains_element(&self, element: ElementId) -> bool {
        self.lock().nodes.contains_key(&element)
    }

    /// Elements currently carrying the highlight class.
    pub fn highlighted(&self) -> Vec<ElementId> {
        let state = self.lock();
        let mut out: Vec<_> = state
            .nodes
            .iter()
            .filter(|(_, n)| n.classes.contains(dom::HIGHLIGHT_CLASS))
            .map(|(id, _)| *id)
            .collect();
        out.sort();
        out
    }

    /// Anchors anywhere on the page.
    pub fn anchors(&self) -> Vec<ElementId> {
        self.descendants(self.container)
            .into_iter()
            .filter(|&e| self.tag_name(e) == dom::ANCHOR_TAG)
            .collect()
    }
}

impl Surface for FakeSurface {
    fn container(&self) -> ElementId {
        self.container
    }

    fn parent(&self, element: ElementId) -> Option<ElementId> {
        self.lock().nodes.get(&element).and_then(|n| n.parent)
    }

    fn children(&self, element: ElementId) -> Vec<ElementId> {
        self.lock()
            .nodes
            .get(&element)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn tag_name(&self, element: ElementId) -> String {
        self.lock()
            .nodes
            .get(&element)
            .map(|n| n.tag.clone())
            .unwrap_or_default()
    }

    fn has_class(&self, element: ElementId, class: &str) -> bool {
        self.lock()
            .nodes
            .get(&element)
            .is_some_and(|n| n.classes.contains(class))
    }

    fn add_class(&self, element: ElementId, class: &str) {
        if let Some(node) = self.lock().nodes.get_mut(&element) {
            node.classes.insert(class.to_string());
        }
    }

    fn remove_class(&self, element: ElementId, class: &str) {
        if let Some(node) = self.lock().nodes.get_mut(&element) {
            node.classes.remove(class);
        }
    }

    fn attribute(&self, element: ElementId, name: &str) -> Option<String> {
        self.lock()
            .nodes
            .get(&element)
            .and_then(|n| n.attributes.get(name).cloned())
    }

    fn set_attribute(&self, element: ElementId, name: &str, value: &str) {
        if let Some(node) = self.lock().nodes.get_mut(&element) {
            node.attributes.insert(name.to_string(), value.to_string());
        }
    }

    fn remove_attribute(&self, element: ElementId, name: &str) {
        if let Some(node) = self.lock().nodes.get_mut(&element) {
            node.attributes.remove(name);
        }
    }

    fn bounding_rect(&self, element: ElementId) -> Rect {
        self.lock()
            .nodes
            .get(&element)
            .map(|n| n.rect)
            .unwrap_or_default()
    }

    fn viewport(&self) -> Rect {
        self.lock().viewport
    }

    fn clear_children(&self, element: ElementId) {
        let mut state = self.lock();
        let mut doomed = state
            .nodes
            .get_mut(&element)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default();
        while let Some(id) = doomed.pop() {
            if let Some(node) = state.nodes.remove(&id) {
                doomed.extend(node.children);
            }
        }
    }

    fn set_horizontal_margin(&self, element: ElementId, margin: f64) {
        if let Some(node) = self.lock().nodes.get_mut(&element) {
            node.margin = margin;
        }
    }

    fn location_hash(&self) -> Option<String> {
        self.lock().hash.clone()
    }

    fn set_location_hash(&self, hash: &str) {
        let mut state = self.lock();
        state.hash = Some(hash.to_string());
        state.hash_history.push(hash.to_string());
    }

    fn supports_scroll_end(&self) -> bool {
        self.scroll_end
    }

    fn trigger_ripple(&self, at: Point, kind: RippleKind) {
        self.lock().ripples.push((at, kind));
    }
}

/// Every call the viewer issued to the engine
#[derive(Clone, Debug, PartialEq)]
pub enum EngineCall {
    Fetch { resource: String },
    Create { session: SessionHandle, key: ArtifactKey },
    Dispose(SessionHandle),
    RenderFull(SessionHandle),
    RenderIncremental(SessionHandle, IncrementalRender),
    Metadata(SessionHandle),
    ScrollTo {
        root: ElementId,
        x: f64,
        y: f64,
        motion: Motion,
    },
}

/// Anchor the fake engine paints into a unit on every full render
#[derive(Clone, Debug)]
pub struct AnchorSpec {
    pub unit: u32,
    pub attributes: Vec<(String, String)>,
    pub rect: Rect,
}

#[derive(Debug, Default)]
struct EngineState {
    calls: Vec<EngineCall>,
    next_session: u64,
    live: HashSet<SessionHandle>,
    violations: Vec<String>,
    label_table: Option<Vec<u8>>,
    fail_fetch: bool,
    fail_dispose: bool,
    applied_width: Option<f64>,
    units: u32,
    anchors: Vec<AnchorSpec>,
    related: HashMap<ElementId, Vec<ElementId>>,
    documents: Vec<FakeDocument>,
}

#[derive(Debug, Default)]
struct GateState {
    closed: bool,
    waiting: usize,
}

/// Scripted rendering engine.
///
/// Records every call, paints a [`FakeDocument`] into the attached surface
/// on full renders, and flags any call against a session that is not live.
#[derive(Debug)]
pub struct FakeEngine {
    state: Mutex<EngineState>,
    gate: Mutex<GateState>,
    gate_changed: Condvar,
    surface: Option<Arc<FakeSurface>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState {
                next_session: 1,
                units: 1,
                ..EngineState::default()
            }),
            gate: Mutex::new(GateState::default()),
            gate_changed: Condvar::new(),
            surface: None,
        }
    }

    /// Paint documents into `surface` on every full render.
    pub fn with_surface(surface: Arc<FakeSurface>) -> Self {
        Self {
            surface: Some(surface),
            ..Self::new()
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_units(&self, units: u32) {
        self.lock().units = units;
    }

    /// Label table as `(name, "p<unit>x<x>y<y>")` pairs.
    pub fn set_labels(&self, labels: &[(&str, &str)]) {
        let pairs: Vec<(&str, &str)> = labels.to_vec();
        self.lock().label_table = serde_json::to_vec(&pairs).ok();
    }

    pub fn set_raw_label_table(&self, bytes: &[u8]) {
        self.lock().label_table = Some(bytes.to_vec());
    }

    pub fn add_anchor(&self, unit: u32, attributes: &[(&str, &str)], rect: Rect) {
        self.lock().anchors.push(AnchorSpec {
            unit,
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            rect,
        });
    }

    pub fn set_related(&self, element: ElementId, related: Vec<ElementId>) {
        self.lock().related.insert(element, related);
    }

    pub fn set_applied_width(&self, width: Option<f64>) {
        self.lock().applied_width = width;
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.lock().fail_fetch = fail;
    }

    pub fn fail_disposals(&self, fail: bool) {
        self.lock().fail_dispose = fail;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Fetch { resource } => Some(resource),
                _ => None,
            })
            .collect()
    }

    pub fn created_sessions(&self) -> Vec<(SessionHandle, ArtifactKey)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Create { session, key } => Some((session, key)),
                _ => None,
            })
            .collect()
    }

    pub fn incremental_renders(&self) -> Vec<(SessionHandle, IncrementalRender)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::RenderIncremental(session, request) => Some((session, request)),
                _ => None,
            })
            .collect()
    }

    pub fn disposed(&self) -> Vec<SessionHandle> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Dispose(session) => Some(session),
                _ => None,
            })
            .collect()
    }

    /// Calls made against sessions that were not live.
    pub fn violations(&self) -> Vec<String> {
        self.lock().violations.clone()
    }

    /// Documents painted by full renders, latest last.
    pub fn documents(&self) -> Vec<FakeDocument> {
        self.lock().documents.clone()
    }

    /// Hold every fetch until [`FakeEngine::open_fetches`].
    pub fn close_fetches(&self) {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner).closed = true;
    }

    pub fn open_fetches(&self) {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner).closed = false;
        self.gate_changed.notify_all();
    }

    /// Block until `count` fetches are held at the gate.
    pub fn wait_for_held_fetches(&self, count: usize, timeout: Duration) -> bool {
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        let (gate, _) = self
            .gate_changed
            .wait_timeout_while(gate, timeout, |g| g.waiting < count)
            .unwrap_or_else(PoisonError::into_inner);
        gate.waiting >= count
    }

    fn pass_gate(&self) {
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        gate.waiting += 1;
        self.gate_changed.notify_all();
        while gate.closed {
            gate = self
                .gate_changed
                .wait(gate)
                .unwrap_or_else(PoisonError::into_inner);
        }
        gate.waiting -= 1;
    }

    fn check_live(state: &mut EngineState, session: SessionHandle, what: &str) -> bool {
        if state.live.contains(&session) {
            true
        } else {
            state
                .violations
                .push(format!("{what} against non-live {session:?}"));
            false
        }
    }

    fn paint(&self, state: &mut EngineState, container: ElementId) {
        let Some(surface) = &self.surface else {
            return;
        };
        if container != surface.container() {
            return;
        }
        let doc = surface.add_document(state.units);
        for spec in &state.anchors {
            let Some(&parent) = doc.visual_roots.get(spec.unit.saturating_sub(1) as usize) else {
                continue;
            };
            let attributes: Vec<(&str, &str)> = spec
                .attributes
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            surface.add_anchor(parent, &attributes, spec.rect);
        }
        state.documents.push(doc);
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderEngine for FakeEngine {
    fn fetch_artifact(&self, _key: &ArtifactKey, resource: &str) -> Result<Vec<u8>, EngineFault> {
        self.lock().calls.push(EngineCall::Fetch {
            resource: resource.to_string(),
        });
        self.pass_gate();

        if self.lock().fail_fetch {
            return Err(EngineFault::Fetch {
                resource: resource.to_string(),
                detail: "404 Not Found".to_string(),
            });
        }
        Ok(resource.as_bytes().to_vec())
    }

    fn create_session(&self, artifact: &Artifact) -> Result<SessionHandle, EngineFault> {
        let mut state = self.lock();
        let session = SessionHandle(state.next_session);
        state.next_session += 1;
        state.live.insert(session);
        state.calls.push(EngineCall::Create {
            session,
            key: artifact.key.clone(),
        });
        Ok(session)
    }

    fn dispose_session(&self, session: SessionHandle) -> Result<(), EngineFault> {
        let mut state = self.lock();
        state.calls.push(EngineCall::Dispose(session));
        state.live.remove(&session);
        if state.fail_dispose {
            return Err(EngineFault::Session {
                detail: "already freed".to_string(),
            });
        }
        Ok(())
    }

    fn render_full(
        &self,
        session: SessionHandle,
        container: ElementId,
        _density: f64,
    ) -> Result<RenderResult, EngineFault> {
        let mut state = self.lock();
        state.calls.push(EngineCall::RenderFull(session));
        if !Self::check_live(&mut state, session, "full render") {
            return Err(EngineFault::Render {
                detail: "session disposed".to_string(),
            });
        }
        self.paint(&mut state, container);
        Ok(RenderResult {
            applied_width: state.applied_width,
        })
    }

    fn render_incremental(
        &self,
        session: SessionHandle,
        request: &IncrementalRender,
    ) -> Result<(), EngineFault> {
        let mut state = self.lock();
        state
            .calls
            .push(EngineCall::RenderIncremental(session, request.clone()));
        if !Self::check_live(&mut state, session, "incremental render") {
            return Err(EngineFault::Render {
                detail: "session disposed".to_string(),
            });
        }
        Ok(())
    }

    fn metadata(&self, session: SessionHandle, _key: &str) -> Result<Option<Vec<u8>>, EngineFault> {
        let mut state = self.lock();
        state.calls.push(EngineCall::Metadata(session));
        if !Self::check_live(&mut state, session, "metadata") {
            return Err(EngineFault::generic("no such session"));
        }
        Ok(state.label_table.clone())
    }

    fn related_elements(&self, element: ElementId) -> Vec<ElementId> {
        self.lock()
            .related
            .get(&element)
            .cloned()
            .unwrap_or_default()
    }

    fn scroll_to(
        &self,
        visual_root: ElementId,
        x: f64,
        y: f64,
        motion: Motion,
    ) -> Result<(), EngineFault> {
        self.lock().calls.push(EngineCall::ScrollTo {
            root: visual_root,
            x,
            y,
            motion,
        });
        Ok(())
    }
}
