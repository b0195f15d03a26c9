//! M3U playlist parser for user channel directories

use std::collections::HashMap;

use crate::models::Channel;

/// Category used when a playlist entry has no `group-title`
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct M3uEntry {
    pub name: String,
    pub url: String,
    pub group: Option<String>,
    pub tvg_id: Option<String>,
    pub tvg_logo: Option<String>,
    pub tvg_country: Option<String>,
    pub tvg_language: Option<String>,
}

impl M3uEntry {
    /// Directory channel for the entry at 1-based `position`
    pub fn into_channel(self, position: usize) -> Channel {
        Channel {
            id: self
                .tvg_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| position.to_string()),
            name: self.name,
            url: self.url,
            logo: self.tvg_logo.filter(|logo| !logo.is_empty()),
            category: self
                .group
                .filter(|group| !group.is_empty())
                .unwrap_or_else(|| UNCATEGORIZED.to_string()),
            country: self.tvg_country.unwrap_or_default(),
            language: self.tvg_language.unwrap_or_default(),
            description: None,
        }
    }
}

/// Parse M3U content and extract entries
pub fn parse_m3u(content: &str) -> Vec<M3uEntry> {
    let mut entries = Vec::new();
    let mut current_attrs: HashMap<String, String> = HashMap::new();
    let mut current_name: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();

        // Some malformed playlists drop the leading '#'
        let info = line
            .strip_prefix("#EXTINF:")
            .or_else(|| line.strip_prefix("EXTINF:"));

        if let Some(info_part) = info {
            current_attrs.clear();
            extract_attrs(info_part, &mut current_attrs);

            // Channel name follows the last comma
            current_name = info_part
                .rfind(',')
                .map(|comma_pos| info_part[comma_pos + 1..].trim().to_string())
                .filter(|name| !name.is_empty());
        } else if !line.is_empty() && !line.starts_with('#') {
            // This is a URL line
            let name = current_name
                .take()
                .or_else(|| current_attrs.get("tvg-name").cloned())
                .unwrap_or_else(|| line.to_string());
            entries.push(M3uEntry {
                name,
                url: line.to_string(),
                group: current_attrs.remove("group-title"),
                tvg_id: current_attrs.remove("tvg-id"),
                tvg_logo: current_attrs.remove("tvg-logo"),
                tvg_country: current_attrs.remove("tvg-country"),
                tvg_language: current_attrs.remove("tvg-language"),
            });
            current_attrs.clear();
        }
    }

    entries
}

/// Parse M3U content straight into directory channels
pub fn parse_channels(content: &str) -> Vec<Channel> {
    parse_m3u(content)
        .into_iter()
        .enumerate()
        .map(|(index, entry)| entry.into_channel(index + 1))
        .collect()
}

/// Extract attributes from EXTINF line - handles quoted and unquoted values
fn extract_attrs(info: &str, attrs: &mut HashMap<String, String>) {
    let mut chars = info.chars().peekable();

    // Skip the duration number at the start (e.g., "-1")
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() || c == '-' || c == '.' {
            chars.next();
        } else {
            break;
        }
    }

    while chars.peek().is_some() {
        // Skip whitespace, commas and stray quotes between attributes
        while chars
            .peek()
            .is_some_and(|&c| c.is_whitespace() || c == ',' || c == '"')
        {
            chars.next();
        }

        // Collect key until '='
        let mut key = String::new();
        let mut found_equals = false;
        while let Some(c) = chars.next() {
            if c == '=' {
                found_equals = true;
                break;
            }
            if c == ',' {
                // No more attributes, rest is channel name
                return;
            }
            key.push(c);
        }
        if !found_equals {
            return;
        }

        let key = key.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next(); // consume opening quote
            while let Some(c) = chars.next() {
                if c == '"' {
                    break;
                }
                // Handle escaped quotes
                if c == '\\' && chars.peek() == Some(&'"') {
                    chars.next();
                    value.push('"');
                    continue;
                }
                value.push(c);
            }
            attrs.insert(key, value);
        } else {
            // Unquoted value - read until space or comma
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            if !value.is_empty() {
                attrs.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
#[path = "m3u_parser_tests.rs"]
mod tests;
