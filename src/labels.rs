//! Semantic labels: named, position-addressed anchors inside a document

use std::str::FromStr;

use log::warn;

use crate::error::{Result, ViewerError};
use crate::surface::ElementId;

/// Default absolute tolerance for coordinate matching
pub const MATCH_TOLERANCE: f64 = 0.01;

/// A location in document-unit coordinates
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Position {
    /// One-based unit (page) number
    pub unit: u32,
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[must_use]
    pub const fn new(unit: u32, x: f64, y: f64) -> Self {
        Self { unit, x, y }
    }

    /// Same unit and strictly closer than `tolerance` on both axes.
    #[must_use]
    pub fn matches(&self, other: &Position, tolerance: f64) -> bool {
        self.unit == other.unit
            && (self.x - other.x).abs() < tolerance
            && (self.y - other.y).abs() < tolerance
    }
}

/// Parses the engine's `p<unit>x<x>y<y>` position strings.
impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('p')
            .ok_or_else(|| format!("position {s:?} does not start with 'p'"))?;
        let (unit, rest) = rest
            .split_once('x')
            .ok_or_else(|| format!("position {s:?} has no x component"))?;
        let (x, y) = rest
            .split_once('y')
            .ok_or_else(|| format!("position {s:?} has no y component"))?;

        let unit = unit
            .parse::<u32>()
            .map_err(|e| format!("position {s:?}: unit: {e}"))?;
        let x = x
            .parse::<f64>()
            .map_err(|e| format!("position {s:?}: x: {e}"))?;
        let y = y
            .parse::<f64>()
            .map_err(|e| format!("position {s:?}: y: {e}"))?;

        Ok(Position { unit, x, y })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SemanticLabel {
    pub name: String,
    /// Visual root of the unit the label lives in, once bound to content
    pub root: Option<ElementId>,
    pub position: Position,
}

/// Ordered label table of one loaded artifact
#[derive(Clone, Debug, Default)]
pub struct LabelSet {
    labels: Vec<SemanticLabel>,
}

impl LabelSet {
    #[must_use]
    pub fn new(labels: Vec<SemanticLabel>) -> Self {
        Self { labels }
    }

    /// Decode the engine's label table: a JSON list of `[name, position]`
    /// pairs. Entries with an unreadable position are skipped.
    pub fn from_metadata(bytes: &[u8]) -> Result<Self> {
        let pairs: Vec<(String, String)> = serde_json::from_slice(bytes)
            .map_err(|e| ViewerError::LabelTable(e.to_string()))?;

        let labels = pairs
            .into_iter()
            .filter_map(|(name, position)| match position.parse::<Position>() {
                Ok(position) => Some(SemanticLabel {
                    name,
                    root: None,
                    position,
                }),
                Err(e) => {
                    warn!("Skipping label {name:?}: {e}");
                    None
                }
            })
            .collect();

        Ok(Self { labels })
    }

    /// Attach each label to the visual root of its unit.
    pub fn bind_roots(&mut self, mut root_of: impl FnMut(u32) -> Option<ElementId>) {
        for label in &mut self.labels {
            label.root = root_of(label.position.unit);
        }
    }

    /// First label (in table order) matching `position`.
    #[must_use]
    pub fn find_at(&self, position: &Position, tolerance: f64) -> Option<&SemanticLabel> {
        self.labels
            .iter()
            .find(|label| label.position.matches(position, tolerance))
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&SemanticLabel> {
        self.labels.iter().find(|label| label.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SemanticLabel> {
        self.labels.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LabelSet {
        LabelSet::from_metadata(
            br#"[["intro", "p1x0.5y0.2"], ["fig-1", "p2x0.25y0.75"], ["broken", "q1"], ["intro-dup", "p1x0.5y0.2"]]"#,
        )
        .expect("valid table")
    }

    #[test]
    fn parses_position_strings() {
        assert_eq!(
            "p3x0.125y10".parse::<Position>(),
            Ok(Position::new(3, 0.125, 10.0))
        );
        assert!("p3x0.1".parse::<Position>().is_err());
        assert!("3x0.1y0.2".parse::<Position>().is_err());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let labels = table();
        assert_eq!(labels.len(), 3);
        assert!(labels.by_name("broken").is_none());
    }

    #[test]
    fn malformed_table_is_an_error() {
        assert!(matches!(
            LabelSet::from_metadata(b"not json"),
            Err(ViewerError::LabelTable(_))
        ));
    }

    #[test]
    fn first_match_wins() {
        let labels = table();
        let hit = labels.find_at(&Position::new(1, 0.505, 0.195), MATCH_TOLERANCE);
        assert_eq!(hit.map(|l| l.name.as_str()), Some("intro"));
    }

    #[test]
    fn tolerance_boundary_is_exclusive() {
        let origin = Position::new(1, 0.0, 0.0);

        assert!(!origin.matches(&Position::new(1, 0.01, 0.0), 0.01));
        assert!(!origin.matches(&Position::new(1, 0.0, 0.01), 0.01));
        assert!(origin.matches(&Position::new(1, 0.0099, 0.0), 0.01));
        assert!(origin.matches(&Position::new(1, 0.0, 0.0099), 0.01));
    }

    #[test]
    fn different_units_never_match() {
        let labels = table();
        assert!(
            labels
                .find_at(&Position::new(2, 0.5, 0.2), MATCH_TOLERANCE)
                .is_none()
        );
    }

    #[test]
    fn bind_roots_uses_unit_lookup() {
        let mut labels = table();
        labels.bind_roots(|unit| (unit == 1).then_some(ElementId(42)));

        assert_eq!(labels.by_name("intro").and_then(|l| l.root), Some(ElementId(42)));
        assert_eq!(labels.by_name("fig-1").and_then(|l| l.root), None);
    }
}
