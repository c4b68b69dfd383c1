use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Persisted user defaults for the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub default_output_directory: PathBuf,
    pub default_interval: f64,
    pub default_columns: u32,
    pub default_preset: usize,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub last_video_directory: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_output_directory: PathBuf::from("./frames"),
            default_interval: 1.0,
            default_columns: 3,
            default_preset: 1,
            ffmpeg_path: None,
            ffprobe_path: None,
            last_video_directory: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to read config file at {}: {}",
                    config_path.display(),
                    e
                )
            })?;

            // A config written by an older version may be missing fields;
            // fall back to defaults rather than refusing to start.
            match serde_json::from_str::<Self>(&content) {
                Ok(config) => {
                    log::info!("Loaded existing config from {}", config_path.display());
                    Ok(config)
                }
                Err(e) => {
                    log::warn!(
                        "Config file exists but has issues ({}), creating new one with defaults",
                        e
                    );
                    let new_config = Self::default();
                    new_config.save()?;
                    Ok(new_config)
                }
            }
        } else {
            log::info!("No config file found, creating default config");
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("snapsheet")
            .join("config.json")
    }
}
