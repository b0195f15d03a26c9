//! Configuration management

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::PlayerSettings;
use crate::playback::{
    BufferingConfig, EngineKind, EngineOverride, EngineTable, PlayerOptions, RetryPolicy,
    StreamKind, StreamQuality,
};

const APP_DIR: &str = "iptv_deck";

/// Default user agent sent with stream requests
pub const DEFAULT_USER_AGENT: &str = "VLC/3.0.20 LibVLC/3.0.20";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to write config {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Buffer depth presets by connection speed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum BufferProfile {
    Fast,
    #[default]
    Normal,
    Slow,
    VerySlow,
    Custom,
}

impl BufferProfile {
    pub const ALL: [BufferProfile; 5] = [
        BufferProfile::Fast,
        BufferProfile::Normal,
        BufferProfile::Slow,
        BufferProfile::VerySlow,
        BufferProfile::Custom,
    ];

    pub fn buffer_seconds(&self, custom: u32) -> u32 {
        match self {
            BufferProfile::Fast => 2,
            BufferProfile::Normal => 5,
            BufferProfile::Slow => 15,
            BufferProfile::VerySlow => 30,
            BufferProfile::Custom => custom,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BufferProfile::Fast => "Fast",
            BufferProfile::Normal => "Normal",
            BufferProfile::Slow => "Slow",
            BufferProfile::VerySlow => "Very slow",
            BufferProfile::Custom => "Custom",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // Engine selection
    #[serde(default = "default_engine")]
    pub preferred_engine: EngineKind,
    #[serde(default)]
    pub engine_routes: BTreeMap<StreamKind, EngineKind>,
    #[serde(default = "default_direct_fallback")]
    pub direct_fallback: Option<EngineKind>,
    #[serde(default)]
    pub engine_override: EngineOverride,
    /// Custom executable per external engine
    #[serde(default)]
    pub player_paths: HashMap<EngineKind, PathBuf>,
    // Buffering
    #[serde(default)]
    pub buffer_profile: BufferProfile,
    #[serde(default = "default_buffer")]
    pub buffer_seconds: u32,
    #[serde(default = "default_live_sync")]
    pub live_sync_secs: u32,
    #[serde(default = "default_network_timeout")]
    pub network_timeout_secs: u64,
    #[serde(default = "default_resource_retries")]
    pub resource_retries: u32,
    /// Variant choice for adaptive streams
    #[serde(default)]
    pub stream_quality: StreamQuality,
    // Retry
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_base_delay_ms: u64,
    // Player settings
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub muted: bool,
    #[serde(default = "default_true")]
    pub autoplay: bool,
    // Network
    #[serde(default)]
    pub user_agent: String,
    #[serde(default = "default_true")]
    pub pass_user_agent_to_player: bool,
    #[serde(default = "default_true")]
    pub hw_accel: bool,
    // Directory and appearance
    #[serde(default)]
    pub channels_path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub dark_mode: bool,
}

fn default_engine() -> EngineKind { EngineKind::Mpv }
fn default_direct_fallback() -> Option<EngineKind> { Some(EngineKind::Internal) }
fn default_buffer() -> u32 { 5 }
fn default_live_sync() -> u32 { 3 }
fn default_network_timeout() -> u64 { 15 }
fn default_resource_retries() -> u32 { 4 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_delay() -> u64 { 2000 }
fn default_volume() -> f32 { 1.0 }
fn default_true() -> bool { true }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            preferred_engine: EngineKind::Mpv,
            engine_routes: BTreeMap::new(),
            direct_fallback: Some(EngineKind::Internal),
            engine_override: EngineOverride::Auto,
            player_paths: HashMap::new(),
            buffer_profile: BufferProfile::Normal,
            buffer_seconds: 5,
            live_sync_secs: 3,
            network_timeout_secs: 15,
            resource_retries: 4,
            stream_quality: StreamQuality::Auto,
            max_retries: 3,
            retry_base_delay_ms: 2000,
            volume: 1.0,
            muted: false,
            autoplay: true,
            user_agent: String::new(),
            pass_user_agent_to_player: true,
            hw_accel: true,
            channels_path: None,
            dark_mode: true,
        }
    }
}

impl AppConfig {
    fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(APP_DIR);
        path.push("config.json");
        path
    }

    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        let parsed = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|content| Self::from_json(&content).map_err(|e| e.to_string()));
        match parsed {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable config, using defaults");
                Self::default()
            }
        }
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content).map_err(|source| ConfigError::Write { path, source })
    }

    pub fn effective_buffer(&self) -> u32 {
        self.buffer_profile.buffer_seconds(self.buffer_seconds)
    }

    pub fn effective_user_agent(&self) -> &str {
        if self.user_agent.trim().is_empty() {
            DEFAULT_USER_AGENT
        } else {
            self.user_agent.trim()
        }
    }

    pub fn engine_table(&self) -> EngineTable {
        EngineTable {
            preferred: self.preferred_engine,
            routes: self.engine_routes.clone(),
            direct_fallback: self.direct_fallback,
        }
    }

    pub fn buffering(&self) -> BufferingConfig {
        BufferingConfig {
            cache_secs: self.effective_buffer(),
            live_sync_secs: self.live_sync_secs,
            network_timeout: Duration::from_secs(self.network_timeout_secs),
            resource_retries: self.resource_retries,
        }
    }

    pub fn player_options(&self) -> PlayerOptions {
        PlayerOptions {
            table: self.engine_table(),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
            },
            buffering: self.buffering(),
            quality: self.stream_quality,
            user_agent: self
                .pass_user_agent_to_player
                .then(|| self.effective_user_agent().to_string()),
            hw_accel: self.hw_accel,
        }
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            volume: self.volume.clamp(0.0, 1.0),
            muted: self.muted,
            autoplay: self.autoplay,
            ..PlayerSettings::default()
        }
    }

    /// Copy the persisted subset of the live player settings
    pub fn store_settings(&mut self, settings: &PlayerSettings) {
        self.volume = settings.volume;
        self.muted = settings.muted;
        self.autoplay = settings.autoplay;
    }
}
