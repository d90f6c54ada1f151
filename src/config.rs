use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the PiP controller and its subtitle tooling
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Log level for the binary
    pub log_level: String,

    /// Persisted user preferences (extension storage keys)
    pub player: PlayerConfig,

    /// Video detection thresholds
    pub locator: LocatorConfig,

    /// Overlay polling and toast timing
    pub overlay: OverlayConfig,

    /// Keyboard control steps
    pub controls: ControlsConfig,

    /// Subtitle search service settings
    pub subtitles: SubtitleConfig,

    /// Audio transcription service settings
    pub transcription: TranscriptionConfig,
}

/// PiP player size preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlayerSize {
    Small,
    #[default]
    Medium,
    Large,
}

/// Concrete pixel dimensions for a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl PlayerSize {
    pub fn dimensions(self) -> Dimensions {
        match self {
            PlayerSize::Small => Dimensions { width: 300, height: 169 },
            PlayerSize::Medium => Dimensions { width: 400, height: 225 },
            PlayerSize::Large => Dimensions { width: 500, height: 281 },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlayerSize::Small => "small",
            PlayerSize::Medium => "medium",
            PlayerSize::Large => "large",
        }
    }
}

impl std::str::FromStr for PlayerSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "small" => Ok(PlayerSize::Small),
            "medium" => Ok(PlayerSize::Medium),
            "large" => Ok(PlayerSize::Large),
            other => Err(anyhow!("Unknown player size: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

/// Preferences as stored by the extension options page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerConfig {
    pub player_size: PlayerSize,
    pub auto_pip_enabled: bool,
    /// Hostnames excluded from all PiP behavior
    pub blocklist: Vec<String>,
    pub theme: Theme,
}

impl PlayerConfig {
    /// Parse the extension's storage JSON (`{"playerSize": "large", ...}`)
    pub fn from_storage_json(json: &str) -> Result<Self> {
        let mut config: PlayerConfig = serde_json::from_str(json)?;
        config.blocklist = config
            .blocklist
            .iter()
            .filter_map(|site| normalize_site(site))
            .collect();
        Ok(config)
    }

    /// Whether the page at `page_url` is on the blocklist
    pub fn is_blocked(&self, page_url: &str) -> bool {
        let host = match url::Url::parse(page_url) {
            Ok(url) => match url.host_str() {
                Some(host) => host.to_lowercase(),
                None => return false,
            },
            Err(_) => return false,
        };

        self.blocklist
            .iter()
            .filter_map(|site| normalize_site(site))
            .any(|site| {
                let site = site.split('/').next().unwrap_or_default();
                host == site || host.ends_with(&format!(".{}", site))
            })
    }
}

/// Normalise a blocklist entry the way the options page does
pub fn normalize_site(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    let stripped = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    let site = stripped.strip_suffix('/').unwrap_or(stripped);
    if site.is_empty() {
        None
    } else {
        Some(site.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Minimum rendered width for a significant video
    pub min_width: f64,

    /// Minimum rendered height for a significant video
    pub min_height: f64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            min_width: 200.0,
            min_height: 150.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Anchor reposition interval (milliseconds)
    pub poll_interval_ms: u64,

    /// Default toast display time (milliseconds)
    pub toast_duration_ms: u64,

    /// Status message display time for captions (milliseconds)
    pub status_duration_ms: u64,
}

impl OverlayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.toast_duration_ms)
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            toast_duration_ms: 2000,
            status_duration_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// Relative seek step in seconds
    pub seek_step: f64,

    /// Volume change per key press
    pub volume_step: f64,

    /// Speed ladder for Shift+< / Shift+>
    pub speed_ladder: Vec<f64>,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            seek_step: 5.0,
            volume_step: 0.1,
            speed_ladder: vec![0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleConfig {
    /// OpenSubtitles REST base url
    pub base_url: String,

    /// OpenSubtitles API key
    pub api_key: Option<String>,

    /// Comma separated language codes
    pub languages: String,

    /// OpenSubtitles requires `AppName vVersion`
    pub user_agent: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.opensubtitles.com/api/v1".to_string(),
            api_key: None,
            languages: "en,ja".to_string(),
            user_agent: "AISubtitleSearch v2.0.0".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// OpenAI REST base url
    pub base_url: String,

    /// OpenAI API key
    pub api_key: Option<String>,

    pub model: String,

    pub response_format: String,

    pub prompt: String,

    /// Audio chunk length for live transcription (seconds)
    pub chunk_interval_secs: u64,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl TranscriptionConfig {
    pub fn chunk_interval(&self) -> Duration {
        Duration::from_secs(self.chunk_interval_secs)
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "whisper-1".to_string(),
            response_format: "vtt".to_string(),
            prompt: "Transcribe the audio accurately as subtitles. Do not omit any words. \
                     Maintain correct punctuation and capitalization."
                .to_string(),
            chunk_interval_secs: 5,
            timeout_seconds: 120,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let mut config_paths = vec![
            PathBuf::from("stitch-pip.toml"),
            PathBuf::from("config/stitch-pip.toml"),
        ];
        if let Ok(home) = std::env::var("HOME") {
            config_paths.push(PathBuf::from(home).join(".config/stitch-pip/config.toml"));
        }

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(mut config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path.display());
                        config.player.blocklist = config
                            .player
                            .blocklist
                            .iter()
                            .filter_map(|site| normalize_site(site))
                            .collect();
                        return Ok(config.with_env_overrides());
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::default().with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(size) = std::env::var("STITCH_PIP_PLAYER_SIZE") {
            match size.parse() {
                Ok(size) => self.player.player_size = size,
                Err(e) => tracing::warn!("Ignoring STITCH_PIP_PLAYER_SIZE: {}", e),
            }
        }

        if let Ok(auto_pip) = std::env::var("STITCH_PIP_AUTO_PIP") {
            self.player.auto_pip_enabled = matches!(auto_pip.as_str(), "1" | "true" | "yes");
        }

        if let Ok(blocklist) = std::env::var("STITCH_PIP_BLOCKLIST") {
            self.player.blocklist = blocklist.split(',').filter_map(normalize_site).collect();
        }

        if let Ok(key) = std::env::var("STITCH_PIP_OPENAI_KEY") {
            self.transcription.api_key = Some(key);
        }

        if let Ok(key) = std::env::var("STITCH_PIP_OPENSUBTITLES_KEY") {
            self.subtitles.api_key = Some(key);
        }

        if let Ok(log_level) = std::env::var("STITCH_PIP_LOG_LEVEL") {
            self.log_level = log_level;
        }

        self
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.locator.min_width <= 0.0 || self.locator.min_height <= 0.0 {
            return Err(anyhow!("locator thresholds must be greater than 0"));
        }

        if self.overlay.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be greater than 0"));
        }

        if self.controls.speed_ladder.is_empty() {
            return Err(anyhow!("speed_ladder must not be empty"));
        }

        if self.controls.speed_ladder.windows(2).any(|w| w[0] >= w[1]) {
            return Err(anyhow!("speed_ladder must be strictly increasing"));
        }

        if !(0.0..=1.0).contains(&self.controls.volume_step) {
            return Err(anyhow!("volume_step must be within 0..1"));
        }

        if self.transcription.chunk_interval_secs == 0 {
            return Err(anyhow!("chunk_interval_secs must be greater than 0"));
        }

        tracing::info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Stitch PiP Configuration:\n\
            - Player Size: {}\n\
            - Auto PiP: {}\n\
            - Blocked Sites: {}\n\
            - Min Video Size: {}x{}\n\
            - Overlay Poll: {}ms\n\
            - OpenSubtitles Key: {}\n\
            - OpenAI Key: {}",
            self.player.player_size.as_str(),
            self.player.auto_pip_enabled,
            if self.player.blocklist.is_empty() {
                "none".to_string()
            } else {
                self.player.blocklist.join(", ")
            },
            self.locator.min_width,
            self.locator.min_height,
            self.overlay.poll_interval_ms,
            if self.subtitles.api_key.is_some() { "set" } else { "missing" },
            if self.transcription.api_key.is_some() { "set" } else { "missing" },
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_player_size(mut self, size: PlayerSize) -> Self {
        self.config.player.player_size = size;
        self
    }

    pub fn with_auto_pip(mut self, enabled: bool) -> Self {
        self.config.player.auto_pip_enabled = enabled;
        self
    }

    pub fn block_site(mut self, site: &str) -> Self {
        if let Some(site) = normalize_site(site) {
            self.config.player.blocklist.push(site);
        }
        self
    }

    pub fn with_min_video_size(mut self, width: f64, height: f64) -> Self {
        self.config.locator.min_width = width;
        self.config.locator.min_height = height;
        self
    }

    pub fn with_openai_key(mut self, key: String) -> Self {
        self.config.transcription.api_key = Some(key);
        self
    }

    pub fn with_opensubtitles_key(mut self, key: String) -> Self {
        self.config.subtitles.api_key = Some(key);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
