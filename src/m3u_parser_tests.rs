//! Tests for M3U playlist parsing

#[cfg(test)]
mod tests {
    use crate::m3u_parser::*;

    #[test]
    fn test_parse_m3u() {
        let content = r#"
#EXTM3U
#EXTINF:-1 tvg-id="cnn" group-title="News",CNN
http://example.com/live/cnn/index.m3u8
#EXTINF:-1 tvg-id="bbc" group-title="News",BBC
http://example.com/live/bbc/index.m3u8
"#;
        let entries = parse_m3u(content);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "CNN");
        assert_eq!(entries[0].group, Some("News".to_string()));
        assert_eq!(entries[1].tvg_id, Some("bbc".to_string()));
    }

    #[test]
    fn test_country_and_language_attrs() {
        let content = r#"#EXTM3U
#EXTINF:-1 tvg-id="dw.de" tvg-logo="https://example.com/dw.png" tvg-country="DE" tvg-language="German" group-title="News",DW
https://example.com/dw/master.m3u8
"#;
        let channels = parse_channels(content);
        assert_eq!(channels.len(), 1);
        let dw = &channels[0];
        assert_eq!(dw.id, "dw.de");
        assert_eq!(dw.logo.as_deref(), Some("https://example.com/dw.png"));
        assert_eq!(dw.country, "DE");
        assert_eq!(dw.language, "German");
        assert_eq!(dw.category, "News");
    }

    #[test]
    fn test_ids_default_to_position() {
        let content = r#"#EXTM3U
#EXTINF:-1 group-title="Music",Radio One
http://example.com/radio1.mp3
#EXTINF:-1 tvg-id="" ,Movie Night
http://example.com/movie.mp4
"#;
        let channels = parse_channels(content);
        assert_eq!(channels[0].id, "1");
        assert_eq!(channels[1].id, "2");
        assert_eq!(channels[1].category, UNCATEGORIZED);
        assert_eq!(channels[1].name, "Movie Night");
    }

    #[test]
    fn test_parse_attrs_unquoted() {
        let content = r#"#EXTM3U
#EXTINF:-1 tvg-id=unquoted group-title="Quoted Group",Test Channel
http://example.com/stream.ts
"#;
        let entries = parse_m3u(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tvg_id, Some("unquoted".to_string()));
        assert_eq!(entries[0].group, Some("Quoted Group".to_string()));
    }

    #[test]
    fn test_parse_malformed_stray_quotes() {
        // Real-world format with stray quote before tvg-name
        let content = r#"#EXTM3U
#EXTINF:0 tvg-logo="https://example.com/logo.png" "tvg-name="SRF1.ch" group-title="Deutsch", SRF 1 FHD
udp://@233.50.230.1:5000
"#;
        let entries = parse_m3u(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "SRF 1 FHD");
        assert_eq!(entries[0].tvg_logo, Some("https://example.com/logo.png".to_string()));
        assert_eq!(entries[0].group, Some("Deutsch".to_string()));
        assert_eq!(entries[0].url, "udp://@233.50.230.1:5000");
    }

    #[test]
    fn test_parse_extinf_without_hash() {
        // Some malformed M3Us have EXTINF without # prefix
        let content = r#"#EXTM3U
#EXTINF:-1 group-title="Group",Channel 1
http://example.com/1.mp4
EXTINF:-1 group-title="Group",Channel 2
http://example.com/2.mp4
"#;
        let entries = parse_m3u(content);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].name, "Channel 2");
        assert_eq!(entries[1].group, Some("Group".to_string()));
    }

    #[test]
    fn test_parse_attrs_after_duration_comma() {
        // Alternate format: duration,attrs,name (attrs after first comma)
        let content = r#"#EXTM3U
#EXTINF:10.000000,TVG-ID="Channel1" tvg-logo="http://example.com/channel1.png" group-title="Entertainment",Channel 1
http://example.com/stream1.ts
"#;
        let entries = parse_m3u(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Channel 1");
        assert_eq!(entries[0].tvg_id, Some("Channel1".to_string()));
        assert_eq!(entries[0].group, Some("Entertainment".to_string()));
    }

    #[test]
    fn test_attributes_do_not_leak_between_entries() {
        let content = r#"#EXTM3U
#EXTINF:-1 tvg-logo="http://example.com/a.png" group-title="A",First
http://example.com/a.m3u8
http://example.com/bare.m3u8
"#;
        let entries = parse_m3u(content);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].name, "http://example.com/bare.m3u8");
        assert_eq!(entries[1].tvg_logo, None);
        assert_eq!(entries[1].group, None);
    }

    #[test]
    fn test_empty_playlist() {
        assert!(parse_m3u("#EXTM3U\n").is_empty());
        assert!(parse_m3u("").is_empty());
    }
}
