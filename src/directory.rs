//! Channel directory: the built-in list or a user supplied file

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::m3u_parser;
use crate::models::Channel;

/// Category chip that matches every channel
pub const ALL_CATEGORIES: &str = "All";

const BUILTIN_CHANNELS: &str = include_str!("../assets/channels.json");

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid channel file {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("built-in channel list is invalid: {0}")]
    Builtin(#[source] serde_json::Error),

    #[error("unsupported channel file type: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("{} contains no channels", .0.display())]
    Empty(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct ChannelDirectory {
    channels: Vec<Channel>,
}

impl ChannelDirectory {
    pub fn from_channels(channels: Vec<Channel>) -> Self {
        Self { channels }
    }

    /// The list shipped with the application
    pub fn builtin() -> Result<Self, DirectoryError> {
        let channels = serde_json::from_str(BUILTIN_CHANNELS).map_err(DirectoryError::Builtin)?;
        Ok(Self { channels })
    }

    /// Load a `.json` channel list or an `.m3u`/`.m3u8` playlist
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if !matches!(extension.as_str(), "json" | "m3u" | "m3u8") {
            return Err(DirectoryError::UnsupportedFormat(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| DirectoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let channels: Vec<Channel> = if extension == "json" {
            serde_json::from_str(&content).map_err(|source| DirectoryError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            m3u_parser::parse_channels(&content)
        };

        if channels.is_empty() {
            return Err(DirectoryError::Empty(path.to_path_buf()));
        }
        info!(path = %path.display(), count = channels.len(), "loaded channel directory");
        Ok(Self { channels })
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn get(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// "All" followed by every category in first-seen order
    pub fn categories(&self) -> Vec<String> {
        let mut categories = vec![ALL_CATEGORIES.to_string()];
        for channel in &self.channels {
            if !categories.iter().any(|c| c == &channel.category) {
                categories.push(channel.category.clone());
            }
        }
        categories
    }

    /// Channels whose name or category contains `search` (case-insensitive) within `category`
    pub fn filter(&self, search: &str, category: &str) -> Vec<&Channel> {
        let needle = search.trim().to_lowercase();
        self.channels
            .iter()
            .filter(|c| category == ALL_CATEGORIES || c.category == category)
            .filter(|c| {
                needle.is_empty()
                    || c.name.to_lowercase().contains(&needle)
                    || c.category.to_lowercase().contains(&needle)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChannelDirectory {
        let channel = |id: &str, name: &str, category: &str| Channel {
            id: id.to_string(),
            name: name.to_string(),
            url: format!("https://example.com/{}.m3u8", id),
            logo: None,
            category: category.to_string(),
            country: String::new(),
            language: String::new(),
            description: None,
        };
        ChannelDirectory::from_channels(vec![
            channel("1", "Al Jazeera", "NEWS"),
            channel("2", "Arryadia", "Sports"),
            channel("3", "Sky News Arabia", "NEWS"),
            channel("4", "Rai 1", "ITALIA"),
        ])
    }

    #[test]
    fn test_builtin_directory_parses() {
        let directory = ChannelDirectory::builtin().unwrap();
        assert!(!directory.is_empty());
        assert_eq!(directory.categories()[0], ALL_CATEGORIES);
        assert!(directory.channels().iter().all(|c| !c.url.is_empty()));
    }

    #[test]
    fn test_categories_in_first_seen_order() {
        assert_eq!(sample().categories(), vec!["All", "NEWS", "Sports", "ITALIA"]);
    }

    #[test]
    fn test_filter_by_search_and_category() {
        let directory = sample();
        assert_eq!(directory.filter("", ALL_CATEGORIES).len(), 4);

        let names: Vec<_> = directory.filter("news", ALL_CATEGORIES).iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Al Jazeera", "Sky News Arabia"]);

        let sports = directory.filter("", "Sports");
        assert_eq!(sports.len(), 1);
        assert_eq!(sports[0].id, "2");

        assert!(directory.filter("rai", "NEWS").is_empty());
        assert_eq!(directory.get("4").map(|c| c.name.as_str()), Some("Rai 1"));
    }

    #[test]
    fn test_load_m3u_file() {
        let path = std::env::temp_dir().join(format!("iptv_deck_{}.m3u", std::process::id()));
        fs::write(
            &path,
            "#EXTM3U\n#EXTINF:-1 group-title=\"News\",Local News\nhttp://example.com/local.m3u8\n",
        )
        .unwrap();
        let directory = ChannelDirectory::load(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(directory.len(), 1);
        assert_eq!(directory.channels()[0].id, "1");
        assert_eq!(directory.categories(), vec!["All", "News"]);
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let err = ChannelDirectory::load(Path::new("channels.xml")).unwrap_err();
        assert!(matches!(err, DirectoryError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ChannelDirectory::load(Path::new("/nonexistent/iptv-deck/channels.json")).unwrap_err();
        assert!(matches!(err, DirectoryError::Io { .. }));
    }
}
