use std::{fs, path::Path};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::spawn::{DEFAULT_FALLBACK_RADIUS, FallbackLayout};

pub const DEFAULT_MAX_TRAINING_TROOPS: usize = 5;
pub const DEFAULT_DEATH_DELAY_SECS: f32 = 3.0;
pub const DEFAULT_VICTORY_BANNER_MS: u32 = 3000;
pub const DEFAULT_ALLY_RADIUS: f32 = 2.0;

/// Scene tags the resolver looks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct MarkerTags {
    pub player: String,
    pub opponent: String,
    pub generic: String,
}

impl Default for MarkerTags {
    fn default() -> Self {
        Self {
            player: "sp_arena_player".to_string(),
            opponent: "sp_arena_opponent".to_string(),
            generic: "sp_arena".to_string(),
        }
    }
}

/// Who has to land the blow for an enemy removal to count as a defeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribution {
    /// Only the player's own agent.
    #[default]
    PlayerOnly,
    /// The player or any companion.
    PlayerTeam,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct DuelSettings {
    pub max_training_troops: usize,
    pub death_delay_secs: f32,
    pub victory_banner_ms: u32,
    pub victory_text: String,
    pub fallback_layout: FallbackLayout,
    pub fallback_radius: f32,
    pub ally_radius: f32,
    pub attribution: Attribution,
    pub return_menu: String,
    pub markers: MarkerTags,
}

impl Default for DuelSettings {
    fn default() -> Self {
        Self {
            max_training_troops: DEFAULT_MAX_TRAINING_TROOPS,
            death_delay_secs: DEFAULT_DEATH_DELAY_SECS,
            victory_banner_ms: DEFAULT_VICTORY_BANNER_MS,
            victory_text: "Victory! Hold Tab to leave".to_string(),
            fallback_layout: FallbackLayout::default(),
            fallback_radius: DEFAULT_FALLBACK_RADIUS,
            ally_radius: DEFAULT_ALLY_RADIUS,
            attribution: Attribution::default(),
            return_menu: "town".to_string(),
            markers: MarkerTags::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Yaml,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => Ok(FileFormat::Json),
            Some("yaml" | "yml") => Ok(FileFormat::Yaml),
            _ => bail!("unsupported file extension: {}", path.display()),
        }
    }

    pub fn parse<T: serde::de::DeserializeOwned>(self, text: &str) -> Result<T> {
        match self {
            FileFormat::Json => Ok(serde_json::from_str(text)?),
            FileFormat::Yaml => Ok(serde_yaml::from_str(text)?),
        }
    }

    pub fn render<T: Serialize>(self, value: &T) -> Result<String> {
        match self {
            FileFormat::Json => Ok(serde_json::to_string_pretty(value)?),
            FileFormat::Yaml => Ok(serde_yaml::to_string(value)?),
        }
    }
}

impl DuelSettings {
    /// Strict load: any I/O or parse problem is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let format = FileFormat::from_path(path)?;
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        format
            .parse(&text)
            .with_context(|| format!("failed to parse settings: {}", path.display()))
    }

    /// Lenient load used at game start. A missing file is created with defaults; an unreadable
    /// one falls back to defaults without touching the file.
    pub fn load_or_create(path: &Path) -> Self {
        if !path.exists() {
            let defaults = Self::default();
            if let Err(e) = defaults.save(path) {
                warn!(path = %path.display(), error = %e, "could not write default settings");
            }
            return defaults;
        }
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "using default settings");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let format = FileFormat::from_path(path)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let text = format.render(self)?;
        fs::write(path, text)
            .with_context(|| format!("failed to write settings: {}", path.display()))
    }
}
