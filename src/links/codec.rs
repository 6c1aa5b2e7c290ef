//! Virtual cross-link encoding
//!
//! A virtual cross-link references another document of the same corpus:
//! `cross-link?path-label=<tokens>&label=<tokens>`. Each dash-separated token
//! is either a numeric character code or a literal segment; decoding joins
//! them back into one string.

use crate::error::{Result, ViewerError};

/// Scheme-like prefix marking a virtual cross-link target
pub const CROSS_LINK_PREFIX: &str = "cross-link";

const PATH_PARAM: &str = "path-label";
const LABEL_PARAM: &str = "label";

/// Encode every character as its code point, joined by `-`.
#[must_use]
pub fn encode(text: &str) -> String {
    text.chars()
        .map(|c| u32::from(c).to_string())
        .collect::<Vec<_>>()
        .join("-")
}

/// Decode a dash-separated token list.
pub fn decode(tokens: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(tokens.len() / 2);
    if tokens.is_empty() {
        return Ok(out);
    }

    for token in tokens.split('-') {
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            let code = token
                .parse::<u32>()
                .map_err(|e| format!("token {token:?}: {e}"))?;
            let c = char::from_u32(code)
                .ok_or_else(|| format!("token {token:?} is not a character code"))?;
            out.push(c);
        } else {
            out.push_str(token);
        }
    }

    Ok(out)
}

#[must_use]
pub fn is_cross_link(href: &str) -> bool {
    href.starts_with(CROSS_LINK_PREFIX)
}

/// A decoded cross-link target
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrossLink {
    pub path: String,
    pub label: Option<String>,
}

impl CrossLink {
    /// Decode a cross-link href. Callers check [`is_cross_link`] first.
    pub fn parse(href: &str) -> Result<Self> {
        let query = href
            .split_once('?')
            .map(|(_, query)| query)
            .ok_or_else(|| ViewerError::cross_link(href, "missing query"))?;

        let mut path = None;
        let mut label = None;
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let decoded = || decode(value).map_err(|e| ViewerError::cross_link(href, e));
            match key {
                PATH_PARAM => path = Some(decoded()?),
                LABEL_PARAM => label = Some(decoded()?),
                _ => {}
            }
        }

        let path = path.ok_or_else(|| ViewerError::cross_link(href, "missing path-label"))?;
        Ok(Self { path, label })
    }

    /// Resolvable href: the virtual extension swapped for the real one, the
    /// path joined onto the corpus root, plus a label fragment if present.
    #[must_use]
    pub fn resolve(&self, path_to_root: &str, virtual_ext: &str, real_ext: &str) -> String {
        let virtual_suffix = format!(".{virtual_ext}");
        let path = match self.path.strip_suffix(&virtual_suffix) {
            Some(stem) => format!("{stem}.{real_ext}"),
            None => self.path.clone(),
        };

        let mut href = if path_to_root.is_empty() {
            path
        } else {
            format!(
                "{}/{}",
                path_to_root.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        };

        if let Some(label) = &self.label {
            href.push('#');
            href.push_str(&crate::fragment::label_hash(label));
        }

        href
    }
}
