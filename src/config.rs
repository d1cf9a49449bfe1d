use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{model_download::default_pose_model_path, types::Activity};

pub const CONFIG_FILENAME: &str = "sports-coach.toml";
pub const SERVER_URL_ENV: &str = "SPORTS_COACH_SERVER_URL";

const DEFAULT_SERVER_URL: &str = "ws://localhost:8000/ws";
const DEFAULT_JPEG_QUALITY: f32 = 0.7;
const MIN_JPEG_QUALITY: f32 = 0.1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub index: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_url: String,
    pub jpeg_quality: f32,
    pub camera: CameraConfig,
    pub model_path: PathBuf,
    pub min_detection_confidence: f32,
    pub rules_enabled: bool,
    pub default_activity: Activity,
    /// Program plus leading arguments; the utterance is appended as the last argument.
    pub speech_command: Option<Vec<String>>,
    /// Replaces device playback: program plus leading arguments, the spooled
    /// clip path is appended.
    pub audio_player: Option<Vec<String>>,
    pub audio_spool_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            camera: CameraConfig::default(),
            model_path: default_pose_model_path(),
            min_detection_confidence: 0.5,
            rules_enabled: false,
            default_activity: Activity::default(),
            speech_command: default_speech_command(),
            audio_player: None,
            audio_spool_dir: std::env::temp_dir().join("sports-coach"),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config.normalized())
    }

    /// Reads `sports-coach.toml` from the working directory when present and
    /// applies the endpoint override from the environment.
    pub fn load_or_default() -> Self {
        let path = Path::new(CONFIG_FILENAME);
        let config = if path.exists() {
            match Self::load(path) {
                Ok(config) => {
                    log::info!("loaded config from {}", path.display());
                    config
                }
                Err(err) => {
                    log::warn!("ignoring invalid config: {err:#}");
                    Config::default()
                }
            }
        } else {
            Config::default()
        };

        config.with_server_override(std::env::var(SERVER_URL_ENV).ok())
    }

    pub fn with_server_override(mut self, server_url: Option<String>) -> Self {
        if let Some(url) = server_url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
            log::info!("feedback endpoint overridden to {url}");
            self.server_url = url;
        }
        self
    }

    fn normalized(mut self) -> Self {
        if !self.jpeg_quality.is_finite() {
            self.jpeg_quality = DEFAULT_JPEG_QUALITY;
        }
        self.jpeg_quality = self.jpeg_quality.clamp(MIN_JPEG_QUALITY, 1.0);
        self.min_detection_confidence = self.min_detection_confidence.clamp(0.0, 1.0);
        self.camera.width = self.camera.width.max(1);
        self.camera.height = self.camera.height.max(1);
        self
    }
}

fn default_speech_command() -> Option<Vec<String>> {
    if cfg!(target_os = "macos") {
        Some(vec!["say".to_string()])
    } else if cfg!(target_os = "linux") {
        Some(vec!["espeak".to_string()])
    } else {
        None
    }
}
