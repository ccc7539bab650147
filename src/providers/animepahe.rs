//! AnimePahe-style source: a small JSON API for the catalogue, and playback
//! through an HLS master playlist. The play page exposes the master URL in
//! an inline script; its ladder gets parsed and narrowed to the preferred
//! quality.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{ProviderStrategy, StreamPrefs, absolutize, dedup_episodes};
use crate::error::SourceError;
use crate::fetch::HttpClient;
use crate::hls::parse_master_playlist;
use crate::registry::Provider;
use crate::select::{OptionChooser, pick_quality};
use crate::types::{Episode, ShowInfo, StreamCandidate, TitleDetail};

static MASTER_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"source\s*=\s*["']([^"']+\.m3u8[^"']*)["']"#).expect("valid regex")
});

pub struct AnimePahe {
    base: String,
}

impl AnimePahe {
    pub fn new(base: String) -> Self {
        Self { base }
    }
}

#[async_trait]
impl ProviderStrategy for AnimePahe {
    fn provider(&self) -> Provider {
        Provider::AnimePahe
    }

    async fn search(&self, http: &HttpClient, query: &str) -> Result<Vec<ShowInfo>, SourceError> {
        let url = format!(
            "{}/api?m=search&q={}",
            self.base,
            query.split_whitespace().collect::<Vec<_>>().join("+")
        );
        let response: SearchResponse = http.get_json(&url, Some(&self.base)).await?;
        Ok(response
            .data
            .into_iter()
            .map(|hit| ShowInfo {
                reference: hit.session,
                title: hit.title,
                episode_count: hit.episodes,
                thumbnail: hit.poster,
            })
            .collect())
    }

    async fn fetch_detail(
        &self,
        http: &HttpClient,
        reference: &str,
    ) -> Result<TitleDetail, SourceError> {
        let url = format!("{}/api?m=detail&id={reference}", self.base);
        let detail: DetailResponse = http.get_json(&url, Some(&self.base)).await?;

        let episodes = dedup_episodes(
            detail
                .episodes
                .into_iter()
                .map(|ep| Episode {
                    number: episode_label(&ep.episode),
                    href: format!("/play/{reference}/{}", ep.session),
                    download_url: None,
                })
                .collect(),
        );

        Ok(TitleDetail {
            title: detail.title,
            aliases: detail.alt_titles,
            synopsis: detail.synopsis.unwrap_or_default(),
            air_date: detail.aired.unwrap_or_default(),
            rating: detail
                .score
                .map(|s| s.to_string())
                .unwrap_or_default(),
            thumbnail: detail.poster,
            episodes,
        })
    }

    async fn resolve_stream(
        &self,
        http: &HttpClient,
        episode: &Episode,
        prefs: &StreamPrefs,
        chooser: &dyn OptionChooser,
    ) -> Result<StreamCandidate, SourceError> {
        let play_url = absolutize(&self.base, &episode.href);
        let html = http.get_text(&play_url, Some(&self.base)).await?;
        let Some(master_url) = MASTER_URL.captures(&html).map(|cap| cap[1].to_string()) else {
            return Err(SourceError::NoCandidates {
                episode: episode.number.clone(),
            });
        };

        let manifest = http.get_text(&master_url, Some(&self.base)).await?;
        let ladder = parse_master_playlist(&manifest, &master_url);
        let (url, variants) = if ladder.is_empty() {
            // already a media playlist: one quality, play it as-is
            debug!(%master_url, "manifest has no ladder, playing directly");
            (master_url, Vec::new())
        } else {
            let chosen = pick_quality(&prefs.quality, &ladder, chooser)?;
            (chosen.url.clone(), ladder.clone())
        };

        Ok(StreamCandidate {
            url,
            subtitle: None,
            variants,
            headers: std::collections::HashMap::from([(
                "Referer".to_string(),
                self.base.clone(),
            )]),
        })
    }
}

/// The release API reports episode numbers as bare JSON numbers, but
/// specials come through as strings; both become display labels.
fn episode_label(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    session: String,
    title: String,
    #[serde(default)]
    episodes: Option<usize>,
    #[serde(default)]
    poster: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    title: String,
    #[serde(default)]
    alt_titles: Vec<String>,
    #[serde(default)]
    synopsis: Option<String>,
    #[serde(default)]
    aired: Option<String>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    poster: Option<String>,
    #[serde(default)]
    episodes: Vec<DetailEpisode>,
}

#[derive(Debug, Deserialize)]
struct DetailEpisode {
    episode: Value,
    session: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::tests::CannedChooser;

    #[test]
    fn master_url_is_read_from_the_play_page() {
        let html = r#"<script>
            const source = 'https://vault.example/hls/master.m3u8';
            const player = setup(source);
        </script>"#;
        let cap = MASTER_URL.captures(html).unwrap();
        assert_eq!(&cap[1], "https://vault.example/hls/master.m3u8");
    }

    #[test]
    fn numeric_and_string_episode_labels_both_work() {
        assert_eq!(episode_label(&serde_json::json!(12)), "12");
        assert_eq!(episode_label(&serde_json::json!(13.5)), "13.5");
        assert_eq!(episode_label(&serde_json::json!("Special 1")), "Special 1");
    }

    #[test]
    fn detail_response_decodes_episode_sessions() {
        let body = r#"{
            "title": "Great Show",
            "alt_titles": ["Sugoi Show"],
            "synopsis": "Plot.",
            "aired": "2019",
            "score": 8.2,
            "episodes": [
                {"episode": 1, "session": "abc"},
                {"episode": "Special 1", "session": "def"}
            ]
        }"#;
        let detail: DetailResponse = serde_json::from_str(body).unwrap();
        assert_eq!(detail.episodes.len(), 2);
        assert_eq!(detail.episodes[1].session, "def");
    }

    #[test]
    fn ladder_narrowing_uses_the_preferred_quality() {
        let manifest = "#EXTM3U\n\
            #EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080\n\
            1080.m3u8\n\
            #EXT-X-STREAM-INF:BANDWIDTH=1400000,RESOLUTION=854x480\n\
            480.m3u8\n";
        let ladder = parse_master_playlist(manifest, "https://vault.example/hls/master.m3u8");
        let chosen = pick_quality("480p", &ladder, &CannedChooser::NeverAsked).unwrap();
        assert_eq!(chosen.url, "https://vault.example/hls/480.m3u8");
    }
}
