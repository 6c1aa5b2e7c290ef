//! Semantic navigation: clicks to stable labels, fragments to location jumps

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::engine::{Motion, RenderEngine};
use crate::fragment::{Fragment, label_hash};
use crate::geometry::Point;
use crate::hover::{self, HoverThrottle};
use crate::labels::{Position, SemanticLabel};
use crate::session::{Completion, OperationChain, ScopeCell, SessionScope};
use crate::settings::NavigationSettings;
use crate::surface::{ElementId, RippleKind, Surface, dom};
use crate::units;

const HOVER_EVENT: &str = "mouse-move";

pub struct SemanticNavigator {
    engine: Arc<dyn RenderEngine>,
    surface: Arc<dyn Surface>,
    chain: OperationChain,
    scope: ScopeCell,
    settings: NavigationSettings,
    has_jumped: AtomicBool,
    throttle: Mutex<HoverThrottle>,
}

impl SemanticNavigator {
    pub fn new(
        engine: Arc<dyn RenderEngine>,
        surface: Arc<dyn Surface>,
        chain: OperationChain,
        scope: ScopeCell,
        settings: NavigationSettings,
    ) -> Self {
        let throttle = HoverThrottle::new(Duration::from_millis(settings.hover_throttle_ms));
        Self {
            engine,
            surface,
            chain,
            scope,
            settings,
            has_jumped: AtomicBool::new(false),
            throttle: Mutex::new(throttle),
        }
    }

    /// Handle a click at document-unit coordinates.
    ///
    /// A nearby label becomes the address fragment and, once pending renders
    /// settled, its clickable element is highlighted. Otherwise the highlight
    /// is cleared and a raw coordinate fragment is recorded.
    pub fn on_content_click(self: &Arc<Self>, unit: u32, x: f64, y: f64) -> Completion {
        let scope = self.scope.current();
        let position = Position::new(unit, x, y);

        let Some(label) = scope
            .labels()
            .find_at(&position, self.settings.match_tolerance)
            .cloned()
        else {
            scope.hover().clear(self.surface.as_ref());
            let fragment = Fragment::Location(position);
            debug!("No label near {position:?}, recording {fragment}");
            self.surface.set_location_hash(&fragment.to_hash());
            return Completion::settled(Ok(()));
        };

        self.surface.set_location_hash(&label_hash(&label.name));
        let this = Arc::clone(self);
        self.chain.enqueue("focus-label", move |_| {
            this.focus_label(&scope, &label);
            Ok(())
        })
    }

    fn focus_label(&self, scope: &SessionScope, label: &SemanticLabel) {
        if self.scope.current().generation() != scope.generation() {
            debug!("Label {} belongs to a replaced load", label.name);
            return;
        }
        let Some(root) = label.root else {
            debug!("Label {} is not bound to rendered content", label.name);
            return;
        };

        let point = units::screen_point(
            self.surface.as_ref(),
            root,
            label.position.x,
            label.position.y,
        );
        let Some(clickable) = self.locate_clickable(root, point) else {
            debug!("No clickable element near label {} at {point:?}", label.name);
            return;
        };

        let related = self.related_elements(clickable);
        scope.hover().replace(self.surface.as_ref(), related);
    }

    /// Clickable element nearest `point` below `root`. Subtrees whose box
    /// does not contain the point are pruned; the walk is iterative and
    /// bounded by `max_search_nodes`.
    #[must_use]
    pub fn locate_clickable(&self, root: ElementId, point: Point) -> Option<ElementId> {
        let surface = self.surface.as_ref();
        let tolerance = self.settings.hit_tolerance_px;

        let mut stack = vec![root];
        let mut visited = 0usize;
        let mut best: Option<(f64, ElementId)> = None;

        while let Some(element) = stack.pop() {
            visited += 1;
            if visited > self.settings.max_search_nodes {
                warn!("Clickable search stopped after {visited} elements");
                break;
            }

            let rect = surface.bounding_rect(element);
            if !rect.contains(point, tolerance) {
                continue;
            }

            if self.is_clickable(element) {
                let distance = rect.center().distance_to(point);
                if best.is_none_or(|(d, _)| distance < d) {
                    best = Some((distance, element));
                }
            }

            stack.extend(surface.children(element).into_iter().rev());
        }

        best.map(|(_, element)| element)
    }

    fn is_clickable(&self, element: ElementId) -> bool {
        self.surface.tag_name(element) == dom::ANCHOR_TAG
            || self.surface.has_class(element, dom::PSEUDO_LINK_CLASS)
    }

    fn related_elements(&self, element: ElementId) -> Vec<ElementId> {
        let related = self.engine.related_elements(element);
        if !related.is_empty() {
            return related;
        }
        let related = hover::overlapping_siblings(self.surface.as_ref(), element);
        if related.is_empty() {
            vec![element]
        } else {
            related
        }
    }

    /// Jump to `(unit, x, y)` in the document owning `element`.
    ///
    /// Returns `false` on a navigation miss, which is logged and otherwise
    /// ignored.
    pub fn resolve_location(
        &self,
        element: ElementId,
        unit: u32,
        x: f64,
        y: f64,
        motion: Motion,
    ) -> bool {
        let surface = self.surface.as_ref();
        let Some(doc_root) = units::owning_doc_root(surface, element) else {
            warn!("No document root above {element:?}, cannot jump to unit {unit}");
            return false;
        };
        let Some(visual_root) = units::visual_root_for_unit(surface, doc_root, unit) else {
            warn!("Unit {unit} has no visual root");
            return false;
        };

        if let Err(e) = self.engine.scroll_to(visual_root, x, y, motion) {
            warn!("Jump to unit {unit} ({x}, {y}) failed: {e}");
            return false;
        }
        let point = units::screen_point(surface, visual_root, x, y);
        surface.trigger_ripple(point, RippleKind::Jump);
        true
    }

    /// Jump to the location named by the address fragment, if any.
    pub fn jump_to_fragment(&self, scope: &SessionScope) -> bool {
        let Some(fragment) = self.current_fragment() else {
            return false;
        };
        self.jump_to(scope, &fragment)
    }

    /// Fragment jump performed at most once per load.
    pub fn consume_fragment_jump(&self, scope: &SessionScope) -> bool {
        let Some(fragment) = self.current_fragment() else {
            return false;
        };
        if !scope.take_fragment_jump() {
            return false;
        }
        self.jump_to(scope, &fragment)
    }

    fn current_fragment(&self) -> Option<Fragment> {
        self.surface
            .location_hash()
            .and_then(|hash| Fragment::parse(&hash))
    }

    fn jump_to(&self, scope: &SessionScope, fragment: &Fragment) -> bool {
        let surface = self.surface.as_ref();
        let fallback = units::first_doc_root(surface, surface.container());

        let (element, position) = match fragment {
            Fragment::Label(name) => {
                let Some(label) = scope.labels().by_name(name) else {
                    debug!("Fragment names unknown label {name:?}");
                    return false;
                };
                (label.root.or(fallback), label.position)
            }
            Fragment::Location(position) => (fallback, *position),
        };
        let Some(element) = element else {
            debug!("No rendered document to jump in");
            return false;
        };

        let motion = if self.has_jumped.swap(true, Ordering::SeqCst) {
            Motion::Instant
        } else {
            Motion::Smooth
        };
        self.resolve_location(element, position.unit, position.x, position.y, motion)
    }

    /// Source span of the nearest element at or above a clicked `element`.
    /// A found span is logged and acknowledged with a ripple at `at`.
    pub fn on_element_click(&self, element: ElementId, at: Point) -> Option<String> {
        let surface = self.surface.as_ref();
        let span = surface
            .ancestors(element)
            .into_iter()
            .find_map(|e| surface.attribute(e, dom::SPAN_ATTR));
        let Some(span) = span else {
            debug!("No source span above {element:?}");
            return None;
        };

        debug!("Clicked source span {span}");
        surface.trigger_ripple(at, RippleKind::Debug);
        Some(span)
    }

    /// Highlight the elements related to a hovered link.
    pub fn on_link_hover(&self, element: ElementId, now: Instant) {
        let admitted = self
            .throttle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .admit(HOVER_EVENT, now);
        if !admitted {
            return;
        }

        let related = self.related_elements(element);
        self.scope
            .current()
            .hover()
            .replace(self.surface.as_ref(), related);
    }

    pub fn on_link_leave(&self, element: ElementId) {
        let related = self.related_elements(element);
        let scope = self.scope.current();
        let mut hover = scope.hover();
        if related.iter().any(|&e| hover.contains(e)) {
            hover.clear(self.surface.as_ref());
        }
    }
}
