//! Anchor pass over freshly rendered content

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Weak};
use std::thread;

use log::{debug, info, warn};
use regex::Regex;

use super::codec::{self, CrossLink};
use crate::fragment::label_hash;
use crate::labels::Position;
use crate::navigator::SemanticNavigator;
use crate::session::{ContentReady, OperationChain, ScopeCell, SessionScope};
use crate::settings::ViewerSettings;
use crate::surface::{ElementId, Surface, dom};

/// Arguments of an inline location-jump handler: `(this, unit, x, y)`
static LOCATION_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*this\s*,\s*(\d+)\s*,\s*([-+0-9.eE]+)\s*,\s*([-+0-9.eE]+)\s*\)")
        .expect("Failed to compile location handler regex")
});

const NEW_CONTEXT_TARGET: &str = "_blank";

/// Counters for one anchor pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub anchors: usize,
    pub labelled: usize,
    pub cross_links: usize,
    pub targets_stripped: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// Content has not streamed in yet
    NoAnchors,
    Processed(PassReport),
}

/// Rewrites anchors of rendered content once per load.
///
/// Location-jump anchors that land on a semantic label are bound to it,
/// virtual cross-links are resolved to real corpus paths, and a pending
/// address fragment is jumped to. When no anchors exist yet the pass is
/// polled again after a growing delay.
pub struct CrossLinkResolver {
    surface: Arc<dyn Surface>,
    chain: OperationChain,
    scope: ScopeCell,
    settings: Arc<ViewerSettings>,
    navigator: Arc<SemanticNavigator>,
}

impl CrossLinkResolver {
    pub fn new(
        surface: Arc<dyn Surface>,
        chain: OperationChain,
        scope: ScopeCell,
        settings: Arc<ViewerSettings>,
        navigator: Arc<SemanticNavigator>,
    ) -> Self {
        Self {
            surface,
            chain,
            scope,
            settings,
            navigator,
        }
    }

    /// Post-render hook: first pass and the load's fragment jump run
    /// immediately, only the anchor rewrite is polled.
    pub fn on_content_ready(self: &Arc<Self>, ready: &ContentReady) {
        let outcome = self.run_pass(&ready.scope);
        if self.navigator.consume_fragment_jump(&ready.scope) {
            debug!("Jumped to address fragment of load {}", ready.generation);
        }
        if outcome == PassOutcome::NoAnchors {
            self.schedule_retry(ready.generation, 0);
        }
    }

    pub fn run_pass(&self, scope: &SessionScope) -> PassOutcome {
        let surface = self.surface.as_ref();
        let anchors: Vec<ElementId> = surface
            .descendants(surface.container())
            .into_iter()
            .filter(|&e| surface.tag_name(e) == dom::ANCHOR_TAG)
            .collect();
        if anchors.is_empty() {
            return PassOutcome::NoAnchors;
        }

        let mut report = PassReport {
            anchors: anchors.len(),
            ..PassReport::default()
        };
        let mut bound = HashMap::new();
        for anchor in anchors {
            self.rewrite_anchor(scope, anchor, &mut bound, &mut report);
        }

        debug!(
            "Anchor pass for load {}: {report:?}",
            scope.generation()
        );
        PassOutcome::Processed(report)
    }

    fn rewrite_anchor(
        &self,
        scope: &SessionScope,
        anchor: ElementId,
        bound: &mut HashMap<String, usize>,
        report: &mut PassReport,
    ) {
        let surface = self.surface.as_ref();

        match surface.attribute(anchor, dom::ONCLICK_ATTR) {
            Some(handler) => {
                if self.bind_label(scope, anchor, &handler, bound) {
                    report.labelled += 1;
                }
            }
            None => {
                if surface.attribute(anchor, dom::TARGET_ATTR).as_deref() == Some(NEW_CONTEXT_TARGET) {
                    surface.remove_attribute(anchor, dom::TARGET_ATTR);
                    report.targets_stripped += 1;
                }
            }
        }

        let Some(href) = link_target(surface, anchor) else {
            return;
        };
        if !codec::is_cross_link(&href) {
            return;
        }
        match CrossLink::parse(&href) {
            Ok(link) => {
                let resolved = link.resolve(
                    &self.settings.path_to_root,
                    &self.settings.source_extension,
                    &self.settings.target_extension,
                );
                set_link_target(surface, anchor, &resolved);
                report.cross_links += 1;
            }
            Err(e) => warn!("Leaving anchor {anchor:?} untouched: {e}"),
        }
    }

    /// Element ids stay unique: later anchors bound to an already bound
    /// label get a numeric suffix, all of them link to the label itself.
    fn bind_label(
        &self,
        scope: &SessionScope,
        anchor: ElementId,
        handler: &str,
        bound: &mut HashMap<String, usize>,
    ) -> bool {
        let Some(position) = parse_location_handler(handler) else {
            return false;
        };
        let Some(label) = scope
            .labels()
            .find_at(&position, self.settings.navigation.match_tolerance)
        else {
            return false;
        };

        let hash = label_hash(&label.name);
        let seen = bound.entry(hash.clone()).or_default();
        *seen += 1;
        let id = match *seen {
            1 => hash.clone(),
            n => format!("{hash}-{n}"),
        };
        self.surface.set_attribute(anchor, dom::ID_ATTR, &id);
        set_link_target(self.surface.as_ref(), anchor, &format!("#{hash}"));
        true
    }

    fn schedule_retry(self: &Arc<Self>, generation: u64, attempt: u32) {
        let delay = self.settings.links.retry_delay(attempt);
        let resolver: Weak<Self> = Arc::downgrade(self);

        let spawned = thread::Builder::new()
            .name("bookweave-link-retry".to_string())
            .spawn(move || {
                thread::sleep(delay);
                let Some(resolver) = resolver.upgrade() else {
                    return;
                };
                if resolver.chain.is_closed() {
                    return;
                }
                let this = Arc::clone(&resolver);
                resolver.chain.enqueue("link-pass", move |_| {
                    this.retry_pass(generation, attempt);
                    Ok(())
                });
            });
        if let Err(e) = spawned {
            warn!("Failed to schedule anchor pass retry: {e}");
        }
    }

    fn retry_pass(self: &Arc<Self>, generation: u64, attempt: u32) {
        let scope = self.scope.current();
        if scope.generation() != generation {
            debug!("Load {generation} superseded, stopping anchor polling");
            return;
        }
        match self.run_pass(&scope) {
            PassOutcome::NoAnchors => self.schedule_retry(generation, attempt + 1),
            PassOutcome::Processed(_) => {
                info!("Anchors appeared after {} retries", attempt + 1);
            }
        }
    }
}

/// `(unit, x, y)` embedded in an inline location-jump handler.
#[must_use]
pub fn parse_location_handler(handler: &str) -> Option<Position> {
    let captures = LOCATION_HANDLER.captures(handler)?;
    let unit = captures.get(1)?.as_str().parse::<u32>().ok()?;
    let x = captures.get(2)?.as_str().parse::<f64>().ok()?;
    let y = captures.get(3)?.as_str().parse::<f64>().ok()?;
    Some(Position::new(unit, x, y))
}

fn link_target(surface: &dyn Surface, anchor: ElementId) -> Option<String> {
    surface
        .attribute(anchor, dom::HREF_ATTR)
        .or_else(|| surface.attribute(anchor, dom::XLINK_HREF_ATTR))
}

fn set_link_target(surface: &dyn Surface, anchor: ElementId, href: &str) {
    surface.set_attribute(anchor, dom::HREF_ATTR, href);
    if surface.attribute(anchor, dom::XLINK_HREF_ATTR).is_some() {
        surface.set_attribute(anchor, dom::XLINK_HREF_ATTR, href);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::labels::{LabelSet, SemanticLabel};
    use crate::settings::NavigationSettings;
    use crate::test_utils::{FakeEngine, FakeSurface};

    struct Fixture {
        surface: Arc<FakeSurface>,
        resolver: Arc<CrossLinkResolver>,
        chain: OperationChain,
    }

    fn fixture(settings: ViewerSettings) -> Fixture {
        let surface = Arc::new(FakeSurface::new());
        let engine = Arc::new(FakeEngine::new());
        let chain = OperationChain::spawn();
        let scope = ScopeCell::default();
        let settings = Arc::new(settings);
        let navigator = Arc::new(SemanticNavigator::new(
            engine,
            surface.clone(),
            chain.clone(),
            scope.clone(),
            NavigationSettings::default(),
        ));
        let resolver = Arc::new(CrossLinkResolver::new(
            surface.clone(),
            chain.clone(),
            scope,
            settings,
            navigator,
        ));
        Fixture {
            surface,
            resolver,
            chain,
        }
    }

    fn intro_scope() -> SessionScope {
        SessionScope::new(
            1,
            LabelSet::new(vec![SemanticLabel {
                name: "intro".to_string(),
                root: None,
                position: Position::new(1, 0.5, 0.2),
            }]),
        )
    }

    fn processed(outcome: PassOutcome) -> PassReport {
        match outcome {
            PassOutcome::Processed(report) => report,
            PassOutcome::NoAnchors => panic!("expected anchors"),
        }
    }

    #[test]
    fn parses_handler_arguments() {
        assert_eq!(
            parse_location_handler("handleTypstLocation(this, 2, 0.25, 1e-1)"),
            Some(Position::new(2, 0.25, 0.1))
        );
        assert_eq!(parse_location_handler("handleTypstLocation(this, x, 1, 2)"), None);
        assert_eq!(parse_location_handler("alert(1)"), None);
    }

    #[test]
    fn empty_content_reports_no_anchors() {
        let f = fixture(ViewerSettings::default());
        f.surface.add_document(1);
        assert_eq!(f.resolver.run_pass(&intro_scope()), PassOutcome::NoAnchors);
    }

    #[test]
    fn binds_location_anchor_to_label() {
        let f = fixture(ViewerSettings::default());
        let doc = f.surface.add_document(1);
        let anchor = f.surface.add_anchor(
            doc.visual_roots[0],
            &[
                (dom::ONCLICK_ATTR, "handleTypstLocation(this, 1, 0.505, 0.2)"),
                (dom::XLINK_HREF_ATTR, "#"),
                (dom::TARGET_ATTR, "_blank"),
            ],
            Rect::new(0.0, 0.0, 10.0, 10.0),
        );

        let report = processed(f.resolver.run_pass(&intro_scope()));

        assert_eq!(report.labelled, 1);
        assert_eq!(f.surface.attribute(anchor, dom::ID_ATTR).as_deref(), Some("label-intro"));
        assert_eq!(f.surface.attribute(anchor, dom::HREF_ATTR).as_deref(), Some("#label-intro"));
        assert_eq!(
            f.surface.attribute(anchor, dom::XLINK_HREF_ATTR).as_deref(),
            Some("#label-intro")
        );
        // handlers keep their target
        assert_eq!(f.surface.attribute(anchor, dom::TARGET_ATTR).as_deref(), Some("_blank"));
    }

    #[test]
    fn anchors_sharing_a_label_get_distinct_ids() {
        let f = fixture(ViewerSettings::default());
        let doc = f.surface.add_document(1);
        let handler = [(dom::ONCLICK_ATTR, "handleTypstLocation(this, 1, 0.5, 0.2)")];
        let first = f.surface.add_anchor(doc.visual_roots[0], &handler, Rect::default());
        let second = f.surface.add_anchor(doc.visual_roots[0], &handler, Rect::default());
        let third = f.surface.add_anchor(doc.visual_roots[0], &handler, Rect::default());

        let report = processed(f.resolver.run_pass(&intro_scope()));

        assert_eq!(report.labelled, 3);
        let ids: Vec<_> = [first, second, third]
            .iter()
            .map(|&a| f.surface.attribute(a, dom::ID_ATTR).unwrap())
            .collect();
        assert_eq!(ids, vec!["label-intro", "label-intro-2", "label-intro-3"]);
        for anchor in [first, second, third] {
            assert_eq!(
                f.surface.attribute(anchor, dom::HREF_ATTR).as_deref(),
                Some("#label-intro")
            );
        }
    }

    #[test]
    fn far_handler_is_left_alone() {
        let f = fixture(ViewerSettings::default());
        let doc = f.surface.add_document(1);
        let anchor = f.surface.add_anchor(
            doc.visual_roots[0],
            &[(dom::ONCLICK_ATTR, "handleTypstLocation(this, 1, 0.51, 0.2)")],
            Rect::default(),
        );

        let report = processed(f.resolver.run_pass(&intro_scope()));
        assert_eq!(report.labelled, 0);
        assert_eq!(f.surface.attribute(anchor, dom::ID_ATTR), None);
    }

    #[test]
    fn resolves_cross_links_against_root() {
        let settings = ViewerSettings {
            path_to_root: "../".to_string(),
            ..ViewerSettings::default()
        };
        let f = fixture(settings);
        let doc = f.surface.add_document(1);
        let href = format!(
            "cross-link?path-label={}&label=108-97-98",
            codec::encode("guide/setup.typ")
        );
        let anchor = f.surface.add_anchor(
            doc.visual_roots[0],
            &[(dom::HREF_ATTR, href.as_str()), (dom::TARGET_ATTR, "_blank")],
            Rect::default(),
        );

        let report = processed(f.resolver.run_pass(&intro_scope()));

        assert_eq!(report.cross_links, 1);
        assert_eq!(report.targets_stripped, 1);
        assert_eq!(
            f.surface.attribute(anchor, dom::HREF_ATTR).as_deref(),
            Some("../guide/setup.html#label-lab")
        );
        assert_eq!(f.surface.attribute(anchor, dom::TARGET_ATTR), None);
    }

    #[test]
    fn malformed_cross_link_is_skipped() {
        let f = fixture(ViewerSettings::default());
        let doc = f.surface.add_document(1);
        let anchor = f.surface.add_anchor(
            doc.visual_roots[0],
            &[(dom::HREF_ATTR, "cross-link?label=97")],
            Rect::default(),
        );

        let report = processed(f.resolver.run_pass(&intro_scope()));
        assert_eq!(report.cross_links, 0);
        assert_eq!(
            f.surface.attribute(anchor, dom::HREF_ATTR).as_deref(),
            Some("cross-link?label=97")
        );
    }

    #[test]
    fn retries_until_anchors_appear() {
        let mut settings = ViewerSettings::default();
        settings.links.retry_base_ms = 5;
        settings.links.retry_factor = 1.0;
        let f = fixture(settings);
        let doc = f.surface.add_document(1);

        let scope = f.resolver.scope.clone();
        scope.replace(intro_scope(), f.surface.as_ref());
        let ready = ContentReady {
            generation: 1,
            session: crate::engine::SessionHandle(1),
            key: crate::engine::ArtifactKey::new("doc", "light"),
            scope: scope.current(),
        };
        f.resolver.on_content_ready(&ready);

        let href = format!("cross-link?path-label={}", codec::encode("a.typ"));
        let anchor = f.surface.add_anchor(
            doc.visual_roots[0],
            &[(dom::HREF_ATTR, href.as_str())],
            Rect::default(),
        );

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while f.surface.attribute(anchor, dom::HREF_ATTR).as_deref() != Some("a.html") {
            assert!(std::time::Instant::now() < deadline, "anchor never rewritten");
            thread::sleep(std::time::Duration::from_millis(5));
        }
        f.chain.shutdown();
    }
}
