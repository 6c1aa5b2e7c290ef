//! Rendering engine contract
//!
//! The engine is an external black box: it fetches binary artifacts, owns
//! rendering sessions and paints into the host surface. Every call may take
//! non-trivial time and is only ever issued from the operation chain.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ViewerError;
use crate::geometry::Rect;
use crate::surface::ElementId;

/// Handle to a live engine session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub u64);

impl SessionHandle {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Identity of an artifact: one document path rendered under one theme
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub path: String,
    pub theme: String,
}

impl ArtifactKey {
    #[must_use]
    pub fn new(path: impl Into<String>, theme: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            theme: theme.into(),
        }
    }

    /// Resource name the artifact is served under, e.g. `doc.light.multi.sir.in`.
    #[must_use]
    pub fn resource_name(&self, extension: &str) -> String {
        format!("{}.{}.{}", self.path, self.theme, extension)
    }
}

/// Immutable artifact bytes together with their identity
#[derive(Clone, Debug)]
pub struct Artifact {
    pub key: ArtifactKey,
    pub bytes: Arc<[u8]>,
}

impl Artifact {
    #[must_use]
    pub fn new(key: ArtifactKey, bytes: Vec<u8>) -> Self {
        Self {
            key,
            bytes: bytes.into(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Render pass quality
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Fidelity {
    /// Cheap preview pass
    Responsive,
    /// High-fidelity pass
    Final,
}

impl Fidelity {
    #[must_use]
    pub fn is_responsive(self) -> bool {
        matches!(self, Fidelity::Responsive)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Fidelity::Responsive => "responsive",
            Fidelity::Final => "final",
        }
    }
}

impl fmt::Display for Fidelity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Fidelity {
    type Err = ViewerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "responsive" | "true" => Ok(Fidelity::Responsive),
            "final" | "false" => Ok(Fidelity::Final),
            other => Err(ViewerError::InvalidFidelity(other.to_string())),
        }
    }
}

/// Scroll motion for location jumps
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Motion {
    Smooth,
    Instant,
}

/// Parameters of an incremental update
#[derive(Clone, Debug, PartialEq)]
pub struct IncrementalRender {
    pub fidelity: Fidelity,
    /// Visible part of the document container
    pub viewport: Rect,
}

/// Outcome of a full paint
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderResult {
    /// Content width applied by the engine, in CSS pixels
    pub applied_width: Option<f64>,
}

/// Metadata key under which the engine exposes the label table
pub const LABEL_METADATA_KEY: &str = "labels";

/// Errors reported by the rendering engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineFault {
    #[error("fetch {resource}: {detail}")]
    Fetch { resource: String, detail: String },

    #[error("session: {detail}")]
    Session { detail: String },

    #[error("render: {detail}")]
    Render { detail: String },

    #[error("{detail}")]
    Generic { detail: String },
}

impl EngineFault {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// Capabilities the viewer needs from the rendering engine.
pub trait RenderEngine: Send + Sync {
    /// Retrieve the artifact bytes for `key`.
    fn fetch_artifact(&self, key: &ArtifactKey, resource: &str) -> Result<Vec<u8>, EngineFault>;

    fn create_session(&self, artifact: &Artifact) -> Result<SessionHandle, EngineFault>;

    /// Dispose a session. Must be safe to call while a render is in flight.
    fn dispose_session(&self, session: SessionHandle) -> Result<(), EngineFault>;

    /// Initial paint of the whole document into `container`.
    fn render_full(
        &self,
        session: SessionHandle,
        container: ElementId,
        density: f64,
    ) -> Result<RenderResult, EngineFault>;

    fn render_incremental(
        &self,
        session: SessionHandle,
        request: &IncrementalRender,
    ) -> Result<(), EngineFault>;

    /// Auxiliary per-document data, `None` when the key is absent.
    fn metadata(&self, session: SessionHandle, key: &str) -> Result<Option<Vec<u8>>, EngineFault>;

    /// Spatial grouping of visual elements around `element`.
    fn related_elements(&self, element: ElementId) -> Vec<ElementId>;

    /// Native scroll-to-coordinate primitive on a unit's visual root.
    fn scroll_to(
        &self,
        visual_root: ElementId,
        x: f64,
        y: f64,
        motion: Motion,
    ) -> Result<(), EngineFault>;
}
