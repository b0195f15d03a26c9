//! Stream URL classification

use serde::{Deserialize, Serialize};

/// Protocol family of a stream URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Hls,
    Dash,
    Direct,
    Rtmp,
    Webrtc,
}

impl StreamKind {
    pub const ALL: [StreamKind; 5] = [
        StreamKind::Hls,
        StreamKind::Dash,
        StreamKind::Direct,
        StreamKind::Rtmp,
        StreamKind::Webrtc,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            StreamKind::Hls => "HLS",
            StreamKind::Dash => "DASH",
            StreamKind::Direct => "Direct",
            StreamKind::Rtmp => "RTMP",
            StreamKind::Webrtc => "WebRTC",
        }
    }

    /// Everything except plain files is treated as a live feed for the badge
    pub fn is_live_hint(&self) -> bool {
        !matches!(self, StreamKind::Direct)
    }
}

const DIRECT_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg", "avi", "mkv", "mov", "flv", "ts"];

/// Classify a stream URL. First match wins; unknown URLs are assumed to be HLS.
pub fn classify(url: &str) -> StreamKind {
    let url = url.trim().to_lowercase();

    if url.contains(".m3u8") || url.contains("hls") {
        return StreamKind::Hls;
    }

    if url.contains(".mpd") {
        return StreamKind::Dash;
    }

    if url.starts_with("webrtc://") || url.contains("webrtc") {
        return StreamKind::Webrtc;
    }

    if url.starts_with("rtmp://") || url.starts_with("rtmps://") {
        return StreamKind::Rtmp;
    }

    if has_direct_extension(&url) {
        return StreamKind::Direct;
    }

    StreamKind::Hls
}

/// `.ext` at the end of the URL or right before its query string
fn has_direct_extension(url: &str) -> bool {
    DIRECT_EXTENSIONS.iter().any(|ext| {
        let needle = format!(".{}", ext);
        url.match_indices(&needle).any(|(pos, _)| {
            let rest = &url[pos + needle.len()..];
            rest.is_empty() || rest.starts_with('?')
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_m3u8_is_hls() {
        assert_eq!(classify("https://live-hls-apps-aja-fa.getaj.net/AJA/index.m3u8"), StreamKind::Hls);
        assert_eq!(classify("http://example.com/live/1.m3u8?token=abc"), StreamKind::Hls);
    }

    #[test]
    fn test_m3u8_beats_other_markers() {
        assert_eq!(classify("http://example.com/movie.mkv/index.m3u8"), StreamKind::Hls);
        assert_eq!(classify("http://example.com/manifest.mpd?alt=index.m3u8"), StreamKind::Hls);
        assert_eq!(classify("rtmp://example.com/app/stream.m3u8"), StreamKind::Hls);
        assert_eq!(classify("webrtc://example.com/index.m3u8"), StreamKind::Hls);
    }

    #[test]
    fn test_hls_word_beats_extension() {
        assert_eq!(classify("https://cdn.example.com/hls/movie.mkv"), StreamKind::Hls);
        assert_eq!(classify("https://cdn.example.com/HLS/clip.mp4"), StreamKind::Hls);
    }

    #[test]
    fn test_mpd_is_dash() {
        assert_eq!(classify("https://dash.akamaized.net/akamai/bbb_30fps/bbb_30fps.mpd"), StreamKind::Dash);
        assert_eq!(classify("https://example.com/video.mpd?x=1"), StreamKind::Dash);
        assert_eq!(classify("https://example.com/video.mp4.mpd"), StreamKind::Dash);
    }

    #[test]
    fn test_webrtc() {
        assert_eq!(classify("webrtc://example.com/live/room"), StreamKind::Webrtc);
        assert_eq!(classify("https://example.com/webrtc/session"), StreamKind::Webrtc);
    }

    #[test]
    fn test_rtmp() {
        assert_eq!(classify("rtmp://example.com/live/key"), StreamKind::Rtmp);
        assert_eq!(classify("RTMPS://example.com/live/key"), StreamKind::Rtmp);
        assert_eq!(classify("rtmp://example.com/live/key.flv"), StreamKind::Rtmp);
    }

    #[test]
    fn test_direct_files() {
        assert_eq!(
            classify("https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/ElephantsDream.mp4"),
            StreamKind::Direct
        );
        assert_eq!(classify("http://example.com/clip.webm?download=1"), StreamKind::Direct);
        assert_eq!(classify("http://example.com/live/user/pass/1.ts"), StreamKind::Direct);
        assert_eq!(classify("http://example.com/Movie.MKV"), StreamKind::Direct);
    }

    #[test]
    fn test_extension_must_end_path() {
        // ".ts" in the middle of a path is not a file extension
        assert_eq!(classify("http://example.com/v.ts/feed"), StreamKind::Hls);
        assert_eq!(classify("http://example.com/file.mp4x"), StreamKind::Hls);
    }

    #[test]
    fn test_unknown_defaults_to_hls() {
        assert_eq!(classify("https://example.com/stream123"), StreamKind::Hls);
        assert_eq!(classify(""), StreamKind::Hls);
        assert_eq!(classify("udp://@233.50.230.1:5000"), StreamKind::Hls);
    }

    #[test]
    fn test_live_hint() {
        assert!(StreamKind::Hls.is_live_hint());
        assert!(StreamKind::Rtmp.is_live_hint());
        assert!(!StreamKind::Direct.is_live_hint());
    }
}
