use anyhow::Context;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "bookweave";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Quiet period before a responsive (preview) pass
    pub responsive_delay_ms: u64,
    /// Quiet period before a final (high fidelity) pass
    pub final_delay_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            responsive_delay_ms: 100,
            final_delay_ms: 600,
        }
    }
}

impl SchedulerSettings {
    pub fn responsive_delay(&self) -> Duration {
        Duration::from_millis(self.responsive_delay_ms)
    }

    pub fn final_delay(&self) -> Duration {
        Duration::from_millis(self.final_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// First delay of the anchor polling loop
    pub retry_base_ms: u64,
    /// Growth factor applied after every empty pass
    pub retry_factor: f64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            retry_base_ms: 100,
            retry_factor: 1.5,
        }
    }
}

impl LinkSettings {
    /// Delay before retry number `attempt` (zero-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = self.retry_factor.max(1.0).powi(attempt.min(64) as i32);
        let millis = (self.retry_base_ms as f64 * factor).min(3_600_000.0);
        Duration::from_millis(millis.round() as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationSettings {
    /// Absolute tolerance for label position matches
    pub match_tolerance: f64,
    /// Pixel slack when hit-testing bounding boxes
    pub hit_tolerance_px: f64,
    /// Upper bound on elements visited by one clickable-element search
    pub max_search_nodes: usize,
    pub hover_throttle_ms: u64,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            match_tolerance: crate::labels::MATCH_TOLERANCE,
            hit_tolerance_px: 2.0,
            max_search_nodes: 65_536,
            hover_throttle_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub version: u32,
    /// Relative path from the current page to the corpus root
    pub path_to_root: String,
    pub artifact_extension: String,
    /// Extension used by virtual cross-links
    pub source_extension: String,
    /// Extension of the rendered pages cross-links resolve to
    pub target_extension: String,
    /// Pixels per document point for full renders
    pub render_density: f64,
    pub scheduler: SchedulerSettings,
    pub links: LinkSettings,
    pub navigation: NavigationSettings,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            path_to_root: String::new(),
            artifact_extension: "multi.sir.in".to_string(),
            source_extension: "typ".to_string(),
            target_extension: "html".to_string(),
            render_density: 3.0,
            scheduler: SchedulerSettings::default(),
            links: LinkSettings::default(),
            navigation: NavigationSettings::default(),
        }
    }
}

impl ViewerSettings {
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading settings file {path:?}"))?;
        let mut settings: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing settings file {path:?}"))?;
        debug!("Loaded settings from {path:?}");

        if settings.version < CURRENT_VERSION {
            migrate_settings(&mut settings);
        }
        Ok(settings)
    }

    /// Load from `path` (or the user config file), falling back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => preferred_config_path().filter(|p| p.exists()),
        };

        let Some(path) = path else {
            info!("No settings file found, using defaults");
            return Self::default();
        };

        Self::load_from_path(&path).unwrap_or_else(|e| {
            error!("Failed to load settings: {e:#}");
            Self::default()
        })
    }

    pub fn save_to_path(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating config directory {parent:?}"))?;
            }
        }
        fs::write(path, serde_yaml::to_string(self)?)
            .with_context(|| format!("writing settings to {path:?}"))?;
        debug!("Saved settings to {path:?}");
        Ok(())
    }
}

pub fn preferred_config_path() -> Option<PathBuf> {
    let path = dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME));
    if path.is_none() {
        warn!("Could not determine config directory");
    }
    path
}

fn migrate_settings(settings: &mut ViewerSettings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    // Version 0 files predate the nested navigation block and stored a
    // zero tolerance, which would make every label match impossible.
    if settings.navigation.match_tolerance <= 0.0 {
        settings.navigation.match_tolerance = crate::labels::MATCH_TOLERANCE;
    }

    settings.version = CURRENT_VERSION;
}
