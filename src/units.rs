use log::debug;

use crate::geometry::Point;
use crate::surface::{ElementId, Surface, dom};

/// Nearest document root at or above `element`.
#[must_use]
pub fn owning_doc_root(surface: &dyn Surface, element: ElementId) -> Option<ElementId> {
    surface
        .ancestors(element)
        .into_iter()
        .find(|&e| surface.has_class(e, dom::DOC_ROOT_CLASS))
}

/// First document root rendered below `container`.
#[must_use]
pub fn first_doc_root(surface: &dyn Surface, container: ElementId) -> Option<ElementId> {
    surface
        .descendants(container)
        .into_iter()
        .find(|&e| surface.has_class(e, dom::DOC_ROOT_CLASS))
}

/// Unit container whose declared zero-based index + 1 equals `unit`.
#[must_use]
pub fn unit_container(surface: &dyn Surface, doc_root: ElementId, unit: u32) -> Option<ElementId> {
    surface.children(doc_root).into_iter().find(|&child| {
        surface.has_class(child, dom::UNIT_CLASS)
            && surface
                .attribute(child, dom::UNIT_INDEX_ATTR)
                .and_then(|index| index.trim().parse::<u32>().ok())
                .is_some_and(|index| index + 1 == unit)
    })
}

/// Visual root embedded in a unit container.
#[must_use]
pub fn visual_root(surface: &dyn Surface, unit_container: ElementId) -> Option<ElementId> {
    surface
        .descendants(unit_container)
        .into_iter()
        .find(|&e| surface.has_class(e, dom::VISUAL_ROOT_CLASS))
}

#[must_use]
pub fn visual_root_for_unit(surface: &dyn Surface, doc_root: ElementId, unit: u32) -> Option<ElementId> {
    let container = unit_container(surface, doc_root, unit);
    if container.is_none() {
        debug!("No unit {unit} under {doc_root:?}");
    }
    visual_root(surface, container?)
}

/// Screen point of document-unit coordinates inside a visual root. The root
/// declares its extent in document units; without it coordinates are taken
/// as normalized.
#[must_use]
pub fn screen_point(surface: &dyn Surface, visual_root: ElementId, x: f64, y: f64) -> Point {
    let rect = surface.bounding_rect(visual_root);
    let extent = |name: &str| {
        surface
            .attribute(visual_root, name)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| *v > 0.0)
            .unwrap_or(1.0)
    };
    let width = extent(dom::UNIT_WIDTH_ATTR);
    let height = extent(dom::UNIT_HEIGHT_ATTR);

    Point::new(
        rect.left + x / width * rect.width,
        rect.top + y / height * rect.height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::test_utils::FakeSurface;

    #[test]
    fn finds_unit_by_one_based_number() {
        let surface = FakeSurface::new();
        let doc = surface.add_document(3);

        let root = visual_root_for_unit(&surface, doc.root, 2).unwrap();
        assert_eq!(root, doc.visual_roots[1]);
        assert!(visual_root_for_unit(&surface, doc.root, 4).is_none());
        assert!(visual_root_for_unit(&surface, doc.root, 0).is_none());
    }

    #[test]
    fn owning_doc_root_includes_self() {
        let surface = FakeSurface::new();
        let doc = surface.add_document(1);

        assert_eq!(owning_doc_root(&surface, doc.root), Some(doc.root));
        assert_eq!(owning_doc_root(&surface, doc.visual_roots[0]), Some(doc.root));
        assert_eq!(owning_doc_root(&surface, surface.container()), None);
        assert_eq!(first_doc_root(&surface, surface.container()), Some(doc.root));
    }

    #[test]
    fn screen_point_scales_by_declared_extent() {
        let surface = FakeSurface::new();
        let doc = surface.add_document(1);
        let root = doc.visual_roots[0];
        surface.set_rect(root, Rect::new(100.0, 50.0, 400.0, 800.0));
        surface.set_attribute(root, dom::UNIT_WIDTH_ATTR, "200");
        surface.set_attribute(root, dom::UNIT_HEIGHT_ATTR, "400");

        assert_eq!(
            screen_point(&surface, root, 100.0, 100.0),
            Point::new(300.0, 250.0)
        );
    }

    #[test]
    fn screen_point_defaults_to_normalized() {
        let surface = FakeSurface::new();
        let doc = surface.add_document(1);
        let root = doc.visual_roots[0];
        surface.set_rect(root, Rect::new(0.0, 0.0, 400.0, 800.0));
        surface.remove_attribute(root, dom::UNIT_WIDTH_ATTR);
        surface.remove_attribute(root, dom::UNIT_HEIGHT_ATTR);

        assert_eq!(screen_point(&surface, root, 0.5, 0.25), Point::new(200.0, 200.0));
    }
}
