//! Persisted settings for the blurred wallpaper.
//!
//! Settings live in `XDG_CONFIG_HOME/wallblur/settings.json`. A missing file
//! means defaults. The blur radius preference is re-read from disk on every
//! update so edits take effect without restarting the host.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BlurError, Result};
use crate::platform::PreferenceStore;

/// Default blur radius preference, in full-resolution pixels.
pub const DEFAULT_BLUR_RADIUS_PREF: f32 = 75.0;

/// Default divisor applied before blurring.
pub const DEFAULT_DOWNSAMPLE_FACTOR: u32 = 8;

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Feature switch. Off until the user opts in.
    pub enabled: bool,
    /// Lighten the wallpaper with the tint colour before blurring.
    pub vibrancy: bool,
    /// Blur radius preference before downsampling.
    pub blur_radius: f32,
    pub downsample_factor: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: false,
            vibrancy: false,
            blur_radius: DEFAULT_BLUR_RADIUS_PREF,
            downsample_factor: DEFAULT_DOWNSAMPLE_FACTOR,
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(?path, "No settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(BlurError::Settings(format!("{}: {e}", path.display()))),
        };

        serde_json::from_str(&data)
            .map_err(|e| BlurError::Settings(format!("{}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BlurError::Settings(format!("{}: {e}", parent.display())))?;
        }
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| BlurError::Settings(e.to_string()))?;
        std::fs::write(path, data)
            .map_err(|e| BlurError::Settings(format!("{}: {e}", path.display())))
    }

    /// Get the default settings file path.
    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("", "", "wallblur").ok_or_else(|| {
            BlurError::Settings("failed to determine project directories".into())
        })?;
        Ok(proj_dirs.config_dir().join(SETTINGS_FILE))
    }
}

/// File-backed preference store.
///
/// Reads the settings file on every query; a broken or missing file yields the
/// default radius rather than failing the update.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Settings::default_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Settings {
        match Settings::load(&self.path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Failed to read settings, using defaults");
                Settings::default()
            }
        }
    }
}

impl PreferenceStore for SettingsStore {
    fn blur_radius_pref(&self) -> f32 {
        self.load().blur_radius
    }
}
