use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::timeline::TimelineSettings;

pub const DEFAULT_CONFIG_FILE: &str = "lingo-shorts.json";
pub const API_KEYS_ENV: &str = "GOOGLE_API_KEYS";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output_dir: PathBuf,
    pub db_file: PathBuf,
    pub models: Models,
    pub voices: VoiceSettings,
    pub delays: Delays,
    pub timeline: TimelineSettings,
    pub music: MusicSettings,
    pub render: RenderSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            db_file: PathBuf::from("output/projects.sqlite"),
            models: Models::default(),
            voices: VoiceSettings::default(),
            delays: Delays::default(),
            timeline: TimelineSettings::default(),
            music: MusicSettings::default(),
            render: RenderSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Models {
    pub planner: String,
    pub image: String,
    pub tts: String,
    pub music: String,
}

impl Default for Models {
    fn default() -> Self {
        Self {
            planner: "gemini-2.5-flash".to_string(),
            image: "gemini-2.0-flash-preview-image-generation".to_string(),
            tts: "gemini-2.5-flash-preview-tts".to_string(),
            music: "models/lyria-realtime-exp".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    /// Pick a voice from `pool` for every clip instead of always using `default_voice`.
    pub random: bool,
    pub default_voice: String,
    pub pool: Vec<String>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        let pool = [
            "Zephyr", "Puck", "Charon", "Kore", "Fenrir", "Leda", "Orus", "Aoede", "Callirrhoe",
            "Autonoe", "Enceladus", "Iapetus", "Umbriel", "Algieba", "Despina", "Erinome",
            "Algenib", "Rasalgethi", "Laomedeia", "Achernar", "Alnilam", "Schedar", "Gacrux",
            "Pulcherrima", "Achird", "Zubenelgenubi", "Vindemiatrix", "Sadachbia", "Sadaltager",
            "Sulafat",
        ];
        Self {
            random: true,
            default_voice: "Kore".to_string(),
            pool: pool.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Free-tier pacing, applied after each successful call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Delays {
    pub planner_s: f64,
    pub tts_s: f64,
    pub image_s: f64,
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            planner_s: 7.0,
            tts_s: 21.0,
            image_s: 7.0,
        }
    }
}

impl Delays {
    pub fn none() -> Self {
        Self {
            planner_s: 0.0,
            tts_s: 0.0,
            image_s: 0.0,
        }
    }

    pub fn planner(&self) -> Duration {
        secs(self.planner_s)
    }

    pub fn tts(&self) -> Duration {
        secs(self.tts_s)
    }

    pub fn image(&self) -> Duration {
        secs(self.image_s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicSettings {
    /// Added to the video length to get the music deadline.
    pub timeout_margin_s: f64,
    pub bpm: u32,
    pub temperature: f32,
}

impl Default for MusicSettings {
    fn default() -> Self {
        Self {
            timeout_margin_s: 60.0,
            bpm: 90,
            temperature: 1.0,
        }
    }
}

impl MusicSettings {
    pub fn deadline(&self, duration_s: f64) -> Duration {
        secs(duration_s + self.timeout_margin_s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub darken_opacity: f64,
    pub music_volume: f64,
    pub font_file: Option<PathBuf>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 24,
            darken_opacity: 0.4,
            music_volume: 0.15,
            font_file: None,
        }
    }
}

impl Config {
    /// Reads the JSON config. A missing file means all defaults.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config: {}", path.display()))?;

        if config.voices.default_voice.trim().is_empty() {
            anyhow::bail!("{}: voices.default_voice missing", path.display());
        }
        if config.voices.random && config.voices.pool.is_empty() {
            anyhow::bail!("{}: voices.random is set but voices.pool is empty", path.display());
        }

        Ok(config)
    }
}

/// Comma-separated keys from `GOOGLE_API_KEYS`.
pub fn api_keys_from_env() -> Result<Vec<String>> {
    let raw = std::env::var(API_KEYS_ENV)
        .with_context(|| format!("{API_KEYS_ENV} is not set (comma-separated Gemini API keys)"))?;
    Ok(split_keys(&raw))
}

pub fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}
