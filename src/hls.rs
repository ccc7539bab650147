//! Master-playlist parsing for ladder-based sources: `#EXT-X-STREAM-INF`
//! lines paired with the URI line that follows them become a quality ladder
//! sorted best-first.

use std::collections::HashMap;

use crate::types::QualityVariant;

/// Parses an HLS master playlist into its quality ladder. Variants are
/// labelled by resolution height ("1080p"); entries without a RESOLUTION
/// attribute fall back to a bandwidth label. Relative URIs are resolved
/// against the playlist URL. Returns an empty ladder for media playlists.
pub fn parse_master_playlist(content: &str, playlist_url: &str) -> Vec<QualityVariant> {
    let base_url = playlist_url.rsplit_once('/').map_or("", |(base, _)| base);

    let mut variants: Vec<(u64, u64, QualityVariant)> = Vec::new();
    let mut lines = content.lines();
    while let Some(line) = lines.next() {
        let Some(rest) = line.strip_prefix("#EXT-X-STREAM-INF:") else {
            continue;
        };
        let attrs = parse_attributes(rest);
        let bandwidth: u64 = attrs
            .get("BANDWIDTH")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let height: u64 = attrs
            .get("RESOLUTION")
            .and_then(|r| r.split('x').nth(1))
            .and_then(|h| h.parse().ok())
            .unwrap_or(0);

        let Some(uri) = lines.next() else { break };
        if uri.starts_with('#') || uri.trim().is_empty() {
            continue;
        }

        let label = if height > 0 {
            format!("{height}p")
        } else if bandwidth > 0 {
            format!("{}k", bandwidth / 1000)
        } else {
            String::from("auto")
        };
        variants.push((
            height,
            bandwidth,
            QualityVariant {
                label,
                url: resolve_uri(base_url, uri.trim()),
            },
        ));
    }

    variants.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
    variants.into_iter().map(|(_, _, v)| v).collect()
}

/// Splits an attribute list like `BANDWIDTH=800000,CODECS="avc1,mp4a"`,
/// honouring commas inside quoted values.
fn parse_attributes(raw: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut rest = raw;
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().to_string();
        rest = &rest[eq + 1..];
        let value;
        if let Some(stripped) = rest.strip_prefix('"') {
            let end = stripped.find('"').unwrap_or(stripped.len());
            value = stripped[..end].to_string();
            rest = stripped.get(end + 1..).unwrap_or("");
            rest = rest.strip_prefix(',').unwrap_or(rest);
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            value = rest[..end].to_string();
            rest = rest.get(end + 1..).unwrap_or("");
        }
        attrs.insert(key, value);
    }
    attrs
}

fn resolve_uri(base_url: &str, uri: &str) -> String {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        uri.to_string()
    } else if base_url.is_empty() {
        uri.to_string()
    } else {
        format!("{base_url}/{uri}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_is_sorted_best_first() {
        let playlist = "#EXTM3U\n\
            #EXT-X-STREAM-INF:BANDWIDTH=1400000,RESOLUTION=854x480\n\
            480.m3u8\n\
            #EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080\n\
            1080.m3u8\n";
        let ladder = parse_master_playlist(playlist, "https://cdn.example/hls/master.m3u8");
        let pairs: Vec<(&str, &str)> = ladder
            .iter()
            .map(|v| (v.label.as_str(), v.url.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("1080p", "https://cdn.example/hls/1080.m3u8"),
                ("480p", "https://cdn.example/hls/480.m3u8"),
            ]
        );
    }

    #[test]
    fn quoted_attribute_values_keep_their_commas() {
        let attrs = parse_attributes(r#"BANDWIDTH=800000,CODECS="avc1.4d401f,mp4a.40.2",NAME=x"#);
        assert_eq!(attrs.get("CODECS").unwrap(), "avc1.4d401f,mp4a.40.2");
        assert_eq!(attrs.get("NAME").unwrap(), "x");
    }

    #[test]
    fn media_playlist_yields_no_variants() {
        let playlist = "#EXTM3U\n#EXTINF:4.0,\nseg0.ts\n#EXTINF:4.0,\nseg1.ts\n";
        assert!(parse_master_playlist(playlist, "https://cdn.example/media.m3u8").is_empty());
    }

    #[test]
    fn bandwidth_only_entries_get_a_bitrate_label() {
        let playlist = "#EXT-X-STREAM-INF:BANDWIDTH=964000\nlow.m3u8\n";
        let ladder = parse_master_playlist(playlist, "https://cdn.example/hls/master.m3u8");
        assert_eq!(ladder[0].label, "964k");
    }
}
