use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// Every field is defaulted, so the file may be absent or partial.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Library root holding `songs/`, `audio/` and the moves file (overrides XDG default).
    pub library_dir: Option<PathBuf>,
    /// Custom database path (overrides `<library>/choreo.db`).
    pub db_path: Option<PathBuf>,
    /// Custom moves file (overrides `<library>/all.moves`).
    pub moves_file: Option<PathBuf>,
    /// External beat detection and probing tools.
    pub beats: BeatConfig,
    /// Ollama description suggestions.
    pub suggest: SuggestConfig,
}

/// External tool settings for song import.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BeatConfig {
    /// Command printing `{"bpm": .., "beats": [..]}`; the audio path is appended.
    pub command: Vec<String>,
    /// ffprobe executable used for durations.
    pub ffprobe: String,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            command: vec!["python3".to_string(), "beat_detect.py".to_string()],
            ffprobe: "ffprobe".to_string(),
        }
    }
}

/// Ollama API configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SuggestConfig {
    /// Base URL of the Ollama server.
    pub url: String,
    /// Models used in rotation, one per request.
    pub models: Vec<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            models: vec!["llama3.2".to_string()],
            timeout_secs: 60,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/choreo/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Library root: explicit override, then config, then XDG data dir.
    pub fn resolve_library_dir(&self, cli: Option<PathBuf>) -> PathBuf {
        cli.or_else(|| self.library_dir.clone())
            .unwrap_or_else(default_library_dir)
    }

    pub fn resolve_db_path(&self, cli: Option<PathBuf>, library: &std::path::Path) -> PathBuf {
        cli.or_else(|| self.db_path.clone())
            .unwrap_or_else(|| library.join("choreo.db"))
    }

    pub fn resolve_moves_file(&self, library: &std::path::Path) -> PathBuf {
        self.moves_file
            .clone()
            .unwrap_or_else(|| library.join(crate::MOVES_FILE_NAME))
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default library directory using XDG data directory.
pub fn default_library_dir() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        dirs.data_dir().to_path_buf()
    } else {
        // Fallback: current directory
        PathBuf::from("choreo-library")
    }
}
