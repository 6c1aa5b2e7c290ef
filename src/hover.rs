//! Hover/focus highlighting
//!
//! Exactly one set of elements is highlighted at any time. Replacing the set
//! clears the previous highlight before the new one is applied.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::debug;

use crate::surface::{ElementId, Surface, dom};

#[derive(Debug, Default)]
pub struct HoverSet {
    elements: Vec<ElementId>,
}

impl HoverSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the current highlight, then highlight `elements`.
    pub fn replace(&mut self, surface: &dyn Surface, elements: Vec<ElementId>) {
        self.clear(surface);
        for &element in &elements {
            surface.add_class(element, dom::HIGHLIGHT_CLASS);
        }
        self.elements = elements;
    }

    pub fn clear(&mut self, surface: &dyn Surface) {
        for element in self.elements.drain(..) {
            surface.remove_class(element, dom::HIGHLIGHT_CLASS);
        }
    }

    #[must_use]
    pub fn elements(&self) -> &[ElementId] {
        &self.elements
    }

    #[must_use]
    pub fn contains(&self, element: ElementId) -> bool {
        self.elements.contains(&element)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Drops events arriving faster than `window` per event id.
#[derive(Debug)]
pub struct HoverThrottle {
    window: Duration,
    last: HashMap<&'static str, Instant>,
}

impl HoverThrottle {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: HashMap::new(),
        }
    }

    /// Whether an event with `id` at `now` should be handled.
    pub fn admit(&mut self, id: &'static str, now: Instant) -> bool {
        match self.last.get(id) {
            Some(&prev) if now.saturating_duration_since(prev) <= self.window => false,
            _ => {
                self.last.insert(id, now);
                true
            }
        }
    }
}

/// Siblings inside the nearest group ancestor that overlap `element`.
///
/// Used when the engine offers no spatial grouping for an element.
#[must_use]
pub fn overlapping_siblings(surface: &dyn Surface, element: ElementId) -> Vec<ElementId> {
    let Some(group) = surface
        .ancestors(element)
        .into_iter()
        .find(|&e| surface.has_class(e, dom::GROUP_CLASS))
    else {
        debug!("No group around {element:?}");
        return Vec::new();
    };

    let target = surface.bounding_rect(element);
    surface
        .children(group)
        .into_iter()
        .filter(|&child| surface.bounding_rect(child).overlaps_by_area(&target))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::test_utils::FakeSurface;

    #[test]
    fn replace_clears_previous_highlight() {
        let surface = FakeSurface::new();
        let root = surface.container();
        let a = surface.add_element(root, "path");
        let b = surface.add_element(root, "path");
        let c = surface.add_element(root, "path");

        let mut set = HoverSet::new();
        set.replace(&surface, vec![a, b]);
        assert!(surface.has_class(a, dom::HIGHLIGHT_CLASS));

        set.replace(&surface, vec![c]);
        assert!(!surface.has_class(a, dom::HIGHLIGHT_CLASS));
        assert!(!surface.has_class(b, dom::HIGHLIGHT_CLASS));
        assert!(surface.has_class(c, dom::HIGHLIGHT_CLASS));
        assert_eq!(set.elements(), &[c]);
    }

    #[test]
    fn clear_removes_everything() {
        let surface = FakeSurface::new();
        let a = surface.add_element(surface.container(), "path");

        let mut set = HoverSet::new();
        set.replace(&surface, vec![a]);
        set.clear(&surface);

        assert!(set.is_empty());
        assert!(!surface.has_class(a, dom::HIGHLIGHT_CLASS));
    }

    #[test]
    fn throttle_ignores_fast_repeats() {
        let mut throttle = HoverThrottle::new(Duration::from_millis(200));
        let t0 = Instant::now();

        assert!(throttle.admit("mouse-move", t0));
        assert!(!throttle.admit("mouse-move", t0 + Duration::from_millis(150)));
        assert!(throttle.admit("other", t0 + Duration::from_millis(150)));
        assert!(throttle.admit("mouse-move", t0 + Duration::from_millis(250)));
    }

    #[test]
    fn overlapping_siblings_groups_by_area() {
        let surface = FakeSurface::new();
        let group = surface.add_element(surface.container(), "g");
        surface.add_class(group, dom::GROUP_CLASS);
        let link = surface.add_element(group, "a");
        surface.set_rect(link, Rect::new(0.0, 0.0, 100.0, 20.0));
        let text = surface.add_element(group, "g");
        surface.set_rect(text, Rect::new(2.0, 1.0, 98.0, 19.0));
        let other = surface.add_element(group, "g");
        surface.set_rect(other, Rect::new(0.0, 300.0, 100.0, 20.0));

        let related = overlapping_siblings(&surface, link);
        assert_eq!(related, vec![link, text]);
    }
}
