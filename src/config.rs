// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Startup settings for the window, the frame loop and the validation toggle.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default fence wait, in nanoseconds. Effectively unbounded for a single
/// frame, but finite so a lost signal cannot hang the loop forever.
pub const DEFAULT_FENCE_TIMEOUT_NS: u64 = u32::MAX as u64;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub shaders: ShaderConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Triangle".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    /// Fence wait bound per frame; `None` keeps the built-in default.
    pub fence_timeout_ms: Option<u64>,
    /// Exit after this many failed frames in a row. 0 never exits.
    pub max_consecutive_frame_failures: u32,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            fence_timeout_ms: None,
            max_consecutive_frame_failures: 0,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Paths of the pre-built SPIR-V blobs
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/triangle.vert.spv"),
            fragment: PathBuf::from("shaders/triangle.frag.spv"),
        }
    }
}

/// Where the active configuration came from. Loading happens before the
/// logger exists, so the outcome is reported afterwards through `log()`.
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    Missing(PathBuf),
    Fallback(anyhow::Error),
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            Self::File(path) => log::info!("Loaded configuration from {:?}", path),
            Self::Missing(path) => {
                log::info!("Config file not found at {:?}, using defaults", path)
            }
            Self::Fallback(e) => log::warn!("Failed to load config.toml: {:#}. Using defaults.", e),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults on any error
    pub fn load() -> (Self, ConfigSource) {
        Self::load_from_path("config.toml")
            .unwrap_or_else(|e| (Config::default(), ConfigSource::Fallback(e)))
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<(Self, ConfigSource)> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok((Config::default(), ConfigSource::Missing(path.to_path_buf())));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok((config, ConfigSource::File(path.to_path_buf())))
    }

    fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::FIFO
            }
        }
    }

    /// Fence wait bound in nanoseconds, as Vulkan expects it
    pub fn fence_timeout_ns(&self) -> u64 {
        self.graphics
            .fence_timeout_ms
            .map(|ms| u64::try_from(Duration::from_millis(ms).as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(DEFAULT_FENCE_TIMEOUT_NS)
    }
}
