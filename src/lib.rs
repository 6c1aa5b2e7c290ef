// Export modules for use in tests and the inspection binary
pub mod engine;
pub mod error;
pub mod fragment;
pub mod geometry;
pub mod hover;
pub mod labels;
pub mod links;
pub mod navigator;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod surface;
pub mod units;
pub mod viewer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export the viewer surface
pub use engine::{Fidelity, Motion, RenderEngine};
pub use error::{Result, ViewerError};
pub use settings::ViewerSettings;
pub use surface::{ElementId, Surface};
pub use viewer::Viewer;
