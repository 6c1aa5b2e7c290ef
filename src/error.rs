use crate::engine::EngineFault;

/// Errors surfaced by viewer operations.
///
/// Navigation misses (no label, no document root, no clickable element) are
/// not represented here: they are logged and fall back to a safe no-op.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ViewerError {
    #[error("rendering engine: {0}")]
    Engine(#[from] EngineFault),

    /// Caller passed a fidelity flag that is neither responsive nor final.
    #[error("invalid render fidelity flag {0:?}")]
    InvalidFidelity(String),

    #[error("unknown viewport event {0:?}")]
    InvalidViewportEvent(String),

    #[error("malformed label table: {0}")]
    LabelTable(String),

    #[error("malformed cross-link {href:?}: {detail}")]
    MalformedCrossLink { href: String, detail: String },

    #[error("operation chain is closed")]
    ChainClosed,

    #[error("operation abandoned before completion")]
    Abandoned,
}

impl ViewerError {
    pub fn cross_link(href: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedCrossLink {
            href: href.into(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ViewerError>;
