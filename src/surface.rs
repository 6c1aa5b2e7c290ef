//! Host page abstraction
//!
//! The surface is the document the engine paints into: an element tree with
//! classes, attributes and bounding boxes, plus the page address fragment.
//! Implementations use interior mutability; all mutation is issued either from
//! the operation chain or from synchronous event handlers.

use crate::geometry::{Point, Rect};

/// Opaque handle to an element of the host page
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

/// Class and attribute names shared with the rendering engine's output.
pub mod dom {
    /// Root of one rendered document
    pub const DOC_ROOT_CLASS: &str = "typst-doc";
    /// Container of one unit (page)
    pub const UNIT_CLASS: &str = "typst-page";
    /// Visual root embedded in a unit container
    pub const VISUAL_ROOT_CLASS: &str = "typst-page-inner";
    /// Grouping node used by the overlap fallback for related elements
    pub const GROUP_CLASS: &str = "typst-group";
    pub const PSEUDO_LINK_CLASS: &str = "pseudo-link";
    pub const HIGHLIGHT_CLASS: &str = "hover";

    /// Zero-based unit index on a unit container
    pub const UNIT_INDEX_ATTR: &str = "data-index";
    pub const UNIT_WIDTH_ATTR: &str = "data-page-width";
    pub const UNIT_HEIGHT_ATTR: &str = "data-page-height";
    pub const APPLIED_WIDTH_ATTR: &str = "data-applied-width";
    /// Source span an element was produced from
    pub const SPAN_ATTR: &str = "data-span";

    pub const ANCHOR_TAG: &str = "a";
    pub const ONCLICK_ATTR: &str = "onclick";
    pub const HREF_ATTR: &str = "href";
    pub const XLINK_HREF_ATTR: &str = "xlink:href";
    pub const TARGET_ATTR: &str = "target";
    pub const ID_ATTR: &str = "id";
}

/// Transient visual effect kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RippleKind {
    /// Played where a location jump lands
    Jump,
    /// Played where a source-span click was handled
    Debug,
}

impl RippleKind {
    #[must_use]
    pub fn class_name(&self) -> &'static str {
        match self {
            RippleKind::Jump => "typst-jump-ripple",
            RippleKind::Debug => "typst-debug-react-ripple",
        }
    }
}

/// The page hosting rendered content.
pub trait Surface: Send + Sync {
    /// Element the engine renders into
    fn container(&self) -> ElementId;

    fn parent(&self, element: ElementId) -> Option<ElementId>;
    fn children(&self, element: ElementId) -> Vec<ElementId>;
    fn tag_name(&self, element: ElementId) -> String;

    fn has_class(&self, element: ElementId, class: &str) -> bool;
    fn add_class(&self, element: ElementId, class: &str);
    fn remove_class(&self, element: ElementId, class: &str);

    fn attribute(&self, element: ElementId, name: &str) -> Option<String>;
    fn set_attribute(&self, element: ElementId, name: &str, value: &str);
    fn remove_attribute(&self, element: ElementId, name: &str);

    fn bounding_rect(&self, element: ElementId) -> Rect;
    /// Visible window bounds
    fn viewport(&self) -> Rect;

    /// Remove every child of `element`.
    fn clear_children(&self, element: ElementId);
    /// Set a symmetric horizontal margin in CSS pixels.
    fn set_horizontal_margin(&self, element: ElementId, margin: f64);

    /// Address fragment without the leading `#`, if any.
    fn location_hash(&self) -> Option<String>;
    fn set_location_hash(&self, hash: &str);

    /// Whether the environment emits a distinct scroll-end event.
    fn supports_scroll_end(&self) -> bool;

    fn trigger_ripple(&self, at: Point, kind: RippleKind);

    /// `element` followed by its ancestors, nearest first.
    fn ancestors(&self, element: ElementId) -> Vec<ElementId> {
        let mut chain = vec![element];
        let mut current = element;
        while let Some(parent) = self.parent(current) {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Descendants of `root` in document order, excluding `root`.
    fn descendants(&self, root: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementId> = self.children(root).into_iter().rev().collect();
        while let Some(element) = stack.pop() {
            out.push(element);
            stack.extend(self.children(element).into_iter().rev());
        }
        out
    }
}
