/// A point in CSS pixels relative to the page.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance_to(&self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned bounding box, as reported by `getBoundingClientRect`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.left + self.width / 2.0, self.top + self.height / 2.0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Intersection of two rectangles. Disjoint inputs yield a zero-area
    /// rectangle anchored at the overlap origin, never a negative extent.
    #[must_use]
    pub fn intersect(&self, other: &Rect) -> Rect {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        Rect {
            left,
            top,
            width: (right - left).max(0.0),
            height: (bottom - top).max(0.0),
        }
    }

    /// Whether `point` lies inside the rectangle grown by `tolerance` on
    /// every side.
    #[must_use]
    pub fn contains(&self, point: Point, tolerance: f64) -> bool {
        point.x >= self.left - tolerance
            && point.x <= self.right() + tolerance
            && point.y >= self.top - tolerance
            && point.y <= self.bottom() + tolerance
    }

    /// Loose overlap used to group visual siblings: the boxes must touch and
    /// their edges must be close relative to the larger extent on both axes.
    #[must_use]
    pub fn overlaps_by_area(&self, other: &Rect) -> bool {
        let touching = !(self.right() < other.left
            || self.left > other.right()
            || self.bottom() < other.top
            || self.top > other.bottom());
        if !touching {
            return false;
        }

        let horizontal = ((self.left - other.left).abs() + (self.right() - other.right()).abs())
            / self.width.max(other.width);
        let vertical = ((self.bottom() - other.bottom()).abs() + (self.top - other.top).abs())
            / self.height.max(other.height);

        horizontal < 0.5 && vertical < 0.5
    }
}
