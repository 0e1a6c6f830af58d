use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// External binaries
    pub tools: ToolsConfig,

    /// Pipeline behaviour
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolsConfig {
    /// yt-dlp binary used as the media source
    pub yt_dlp: String,

    /// ffmpeg binary used for decoding and encoding
    pub ffmpeg: String,

    /// ffprobe binary used for stream inspection
    pub ffprobe: String,

    /// Netscape cookie file handed to yt-dlp
    pub cookies_file: Option<PathBuf>,

    /// yt-dlp format selector
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum concurrent per-item jobs within a stage
    pub workers: usize,

    /// Upper bound for a single extract or trim job
    pub item_timeout_secs: u64,

    /// Upper bound for the whole search-and-download batch
    pub acquire_timeout_secs: u64,

    /// Upper bound for the final concatenation
    pub merge_timeout_secs: u64,

    /// Base directory for run staging roots (system temp dir if unset)
    pub staging_dir: Option<PathBuf>,

    /// Word appended to every search query
    pub search_suffix: String,

    /// Bitrate used when encoding mp3 artifacts
    pub audio_bitrate: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tools: ToolsConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp: "yt-dlp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            cookies_file: None,
            format: "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            item_timeout_secs: 300,
            acquire_timeout_secs: 1800,
            merge_timeout_secs: 600,
            staging_dir: None,
            search_suffix: "song".to_string(),
            audio_bitrate: "192k".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            tracing::debug!("Loading configuration from {}", config_path.display());
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config = Self::from_yaml(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from YAML text; missing keys take their defaults
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("mashup-maker").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.workers == 0 {
            anyhow::bail!("pipeline.workers must be at least 1");
        }

        if self.pipeline.item_timeout_secs == 0
            || self.pipeline.acquire_timeout_secs == 0
            || self.pipeline.merge_timeout_secs == 0
        {
            anyhow::bail!("pipeline timeouts must be greater than zero");
        }

        Ok(())
    }

    /// Base directory under which run staging roots are created
    pub fn staging_base(&self) -> PathBuf {
        self.pipeline
            .staging_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.item_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.acquire_timeout_secs)
    }

    pub fn merge_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.merge_timeout_secs)
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  yt-dlp: {}", self.tools.yt_dlp);
        println!("  ffmpeg: {}", self.tools.ffmpeg);
        println!("  ffprobe: {}", self.tools.ffprobe);
        if let Some(cookies) = &self.tools.cookies_file {
            println!("  Cookies: {}", cookies.display());
        }
        println!("  Workers: {}", self.pipeline.workers);
        println!("  Item Timeout: {}s", self.pipeline.item_timeout_secs);
        println!("  Acquire Timeout: {}s", self.pipeline.acquire_timeout_secs);
        println!("  Merge Timeout: {}s", self.pipeline.merge_timeout_secs);
        println!("  Staging Dir: {}", self.staging_base().display());
        println!("  Search Suffix: {}", self.pipeline.search_suffix);
    }
}
