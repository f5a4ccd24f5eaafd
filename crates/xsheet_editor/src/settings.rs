// SPDX-License-Identifier: MIT OR Apache-2.0
//! Animation settings.
//!
//! Persisted as RON next to the user's other preferences:
//! - Playback rate and lightbox mode
//! - Onion-skin weights, toggles and global factor
//! - Undo depth and default canvas size

use crate::history::MAX_HISTORY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use xsheet_timeline::{CategoryTable, NextPrev, OpacityConfig};

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE_NAME: &str = "animation.ron";

/// Settings errors
#[derive(Debug, Error)]
pub enum SettingsError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed RON
    #[error("Parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    RonSer(#[from] ron::Error),

    /// File written by a newer version
    #[error("Settings version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Highest version understood
        supported: u32,
    },
}

/// Animation preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationSettings {
    /// Format version
    pub version: u32,
    /// Frames per second
    pub framerate: f64,
    /// Base onion-skin weights
    pub opacities: CategoryTable<f32>,
    /// Which categories are shown
    pub active_cels: CategoryTable<bool>,
    /// Which directions are shown
    pub nextprev: NextPrev,
    /// Global onion-skin factor
    pub opacity_factor: f32,
    /// Keep the onion skin while playing
    pub play_lightbox: bool,
    /// Undo depth
    pub history_depth: usize,
    /// Canvas size for new documents
    pub canvas_size: (u32, u32),
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            framerate: 24.0,
            opacities: CategoryTable {
                cel: 0.5,
                key: 0.4,
                inbetweens: 0.2,
                other_keys: 0.3,
                other: 0.0,
            },
            active_cels: CategoryTable::default_active(),
            nextprev: NextPrev::default(),
            opacity_factor: 1.0,
            play_lightbox: false,
            history_depth: MAX_HISTORY,
            canvas_size: (640, 480),
        }
    }
}

impl AnimationSettings {
    /// Onion-skin configuration described by these settings
    pub fn opacity_config(&self) -> OpacityConfig {
        let mut config = OpacityConfig::new(self.opacities, self.active_cels, self.nextprev);
        config.set_factor(self.opacity_factor);
        config
    }

    /// Parse settings from RON
    pub fn from_ron_str(content: &str) -> Result<Self, SettingsError> {
        let settings: AnimationSettings = ron::from_str(content)?;
        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(SettingsError::UnsupportedVersion {
                found: settings.version,
                supported: SETTINGS_FORMAT_VERSION,
            });
        }
        Ok(settings)
    }

    /// Render settings as RON
    pub fn to_ron_string(&self) -> Result<String, SettingsError> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_ron_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded animation settings");
        Ok(settings)
    }

    /// Load settings, falling back to defaults when the file is missing
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No animation settings, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        std::fs::write(path, self.to_ron_string()?)?;
        Ok(())
    }

    /// Settings file path inside a configuration directory
    pub fn settings_file_path(config_dir: &Path) -> PathBuf {
        config_dir.join(SETTINGS_FILE_NAME)
    }
}
