//! Data models for the IPTV player

use serde::{Deserialize, Serialize};

/// Channel directory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// User-adjustable playback preferences
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSettings {
    /// 0.0 - 1.0
    pub volume: f32,
    pub muted: bool,
    pub fullscreen: bool,
    pub picture_in_picture: bool,
    pub autoplay: bool,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            muted: false,
            fullscreen: false,
            picture_in_picture: false,
            autoplay: true,
        }
    }
}

/// Side panel selection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tab {
    Channels,
    Info,
    Console,
}
