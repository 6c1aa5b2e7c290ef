use std::fmt;

use crate::labels::Position;

const LABEL_PREFIX: &str = "label-";
const LOCATION_PREFIX: &str = "loc-";

/// `label-<percent-encoded name>` or `loc-<unit>x<x>x<y>` with two decimals.
#[derive(Clone, Debug, PartialEq)]
pub enum Fragment {
    Label(String),
    Location(Position),
}

impl Fragment {
    /// Parse a fragment, with or without the leading `#`.
    #[must_use]
    pub fn parse(hash: &str) -> Option<Self> {
        let hash = hash.strip_prefix('#').unwrap_or(hash);

        if let Some(encoded) = hash.strip_prefix(LABEL_PREFIX) {
            if encoded.is_empty() {
                return None;
            }
            let name = urlencoding::decode(encoded).ok()?;
            return Some(Fragment::Label(name.into_owned()));
        }

        let coords = hash.strip_prefix(LOCATION_PREFIX)?;
        let mut parts = coords.split('x');
        let unit = parts.next()?.parse::<u32>().ok()?;
        let x = parts.next()?.parse::<f64>().ok()?;
        let y = parts.next()?.parse::<f64>().ok()?;
        if parts.next().is_some() {
            return None;
        }

        Some(Fragment::Location(Position::new(unit, x, y)))
    }

    /// Fragment text without the leading `#`.
    #[must_use]
    pub fn to_hash(&self) -> String {
        match self {
            Fragment::Label(name) => label_hash(name),
            Fragment::Location(pos) => {
                format!("{LOCATION_PREFIX}{}x{:.2}x{:.2}", pos.unit, pos.x, pos.y)
            }
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.to_hash())
    }
}

/// `label-<percent-encoded name>`, also used as the element id of anchors
/// bound to that label.
#[must_use]
pub fn label_hash(name: &str) -> String {
    format!("{LABEL_PREFIX}{}", urlencoding::encode(name))
}
