//! AniPlay-style source: a JSON REST API instead of scraped markup. Titles
//! with seasons need one secondary fetch per season; those run concurrently
//! and the merged list goes back unsorted like every other provider's.
//! Stream resolution is a two-hop call: a servers endpoint enumerating
//! audio categories and server names, then a sources endpoint for the
//! chosen pair.

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::Deserialize;
use tracing::debug;

use super::{ProviderStrategy, StreamPrefs, dedup_episodes};
use crate::error::SourceError;
use crate::fetch::HttpClient;
use crate::registry::Provider;
use crate::select::{OptionChooser, pick_option};
use crate::types::{Episode, ShowInfo, StreamCandidate, TitleDetail};

pub struct AniPlay {
    base: String,
}

impl AniPlay {
    pub fn new(base: String) -> Self {
        Self { base }
    }

    async fn fetch_season(
        &self,
        http: &HttpClient,
        anime_id: u64,
        season_id: u64,
    ) -> Result<Vec<ApiEpisode>, SourceError> {
        let url = format!("{}/api/anime/{anime_id}/season/{season_id}", self.base);
        let season: SeasonResponse = http.get_json(&url, Some(&self.base)).await?;
        Ok(season.episodes)
    }
}

#[async_trait]
impl ProviderStrategy for AniPlay {
    fn provider(&self) -> Provider {
        Provider::AniPlay
    }

    async fn search(&self, http: &HttpClient, query: &str) -> Result<Vec<ShowInfo>, SourceError> {
        let url = format!(
            "{}/api/anime/advanced-search?page=0&size=25&query={}",
            self.base,
            query.split_whitespace().collect::<Vec<_>>().join("+")
        );
        let hits: Vec<SearchHit> = http.get_json(&url, Some(&self.base)).await?;
        Ok(hits
            .into_iter()
            .map(|hit| ShowInfo {
                reference: hit.id.to_string(),
                title: hit.title,
                episode_count: hit.episodes_count,
                thumbnail: hit.vertical_image,
            })
            .collect())
    }

    async fn fetch_detail(
        &self,
        http: &HttpClient,
        reference: &str,
    ) -> Result<TitleDetail, SourceError> {
        let anime_id: u64 = reference
            .parse()
            .map_err(|_| SourceError::parse(reference, "numeric title identifier"))?;
        let url = format!("{}/api/anime/{anime_id}", self.base);
        let detail: DetailResponse = http.get_json(&url, Some(&self.base)).await?;

        let mut episodes = detail.episodes;
        if !detail.seasons.is_empty() {
            // concurrent gather: one fetch per season, merged once all land
            let fetched = try_join_all(
                detail
                    .seasons
                    .iter()
                    .map(|season| self.fetch_season(http, anime_id, season.id)),
            )
            .await?;
            episodes.extend(fetched.into_iter().flatten());
        }

        Ok(TitleDetail {
            title: detail.title,
            aliases: detail.alternative_titles,
            synopsis: detail.storyline.unwrap_or_default(),
            air_date: detail.start_date.unwrap_or_default(),
            rating: detail
                .score
                .map(|s| s.to_string())
                .unwrap_or_default(),
            thumbnail: detail.vertical_image,
            episodes: merge_episodes(episodes),
        })
    }

    async fn resolve_stream(
        &self,
        http: &HttpClient,
        episode: &Episode,
        prefs: &StreamPrefs,
        chooser: &dyn OptionChooser,
    ) -> Result<StreamCandidate, SourceError> {
        let servers_url = format!("{}/api/episode/{}/servers", self.base, episode.href);
        let servers: Vec<ApiServer> = http.get_json(&servers_url, Some(&self.base)).await?;
        if servers.is_empty() {
            return Err(SourceError::NoCandidates {
                episode: episode.number.clone(),
            });
        }

        let mut categories: Vec<String> = Vec::new();
        for server in &servers {
            if !categories.iter().any(|c| c.eq_ignore_ascii_case(&server.audio)) {
                categories.push(server.audio.clone());
            }
        }
        let category_idx = pick_option(
            "Select audio",
            Some(prefs.audio.as_str()),
            &categories,
            chooser,
        )?;
        let category = categories[category_idx].clone();

        let names: Vec<String> = servers
            .iter()
            .filter(|s| s.audio.eq_ignore_ascii_case(&category))
            .map(|s| s.name.clone())
            .collect();
        let server_idx = pick_option(
            "Select server",
            prefs.server.as_deref(),
            &names,
            chooser,
        )?;
        let server = names[server_idx].clone();
        debug!(%category, %server, "resolved source pair");

        let sources_url = format!(
            "{}/api/episode/{}/sources?audio={category}&server={server}",
            self.base, episode.href
        );
        let sources: SourcesResponse = http.get_json(&sources_url, Some(&self.base)).await?;
        let Some(url) = sources.url.filter(|u| !u.is_empty()) else {
            return Err(SourceError::NoCandidates {
                episode: episode.number.clone(),
            });
        };

        Ok(StreamCandidate {
            url,
            subtitle: pick_caption(&sources.captions),
            variants: Vec::new(),
            headers: std::collections::HashMap::from([(
                "Referer".to_string(),
                self.base.clone(),
            )]),
        })
    }
}

/// Flattens season pages into one list, deduplicated by episode identifier.
/// Ordering is left to the caller like every other detail strategy.
fn merge_episodes(episodes: Vec<ApiEpisode>) -> Vec<Episode> {
    dedup_episodes(
        episodes
            .into_iter()
            .map(|ep| Episode {
                number: ep.number,
                href: ep.id.to_string(),
                download_url: None,
            })
            .collect(),
    )
}

/// English captions when present, otherwise the first track.
fn pick_caption(captions: &[ApiCaption]) -> Option<String> {
    captions
        .iter()
        .find(|c| {
            c.label
                .as_deref()
                .is_some_and(|l| l.eq_ignore_ascii_case("english") || l.eq_ignore_ascii_case("en"))
        })
        .or_else(|| captions.first())
        .map(|c| c.file.clone())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchHit {
    id: u64,
    title: String,
    #[serde(default)]
    episodes_count: Option<usize>,
    #[serde(default)]
    vertical_image: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailResponse {
    title: String,
    #[serde(default)]
    alternative_titles: Vec<String>,
    #[serde(default)]
    storyline: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    vertical_image: Option<String>,
    #[serde(default)]
    episodes: Vec<ApiEpisode>,
    #[serde(default)]
    seasons: Vec<ApiSeason>,
}

#[derive(Debug, Deserialize)]
struct ApiSeason {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct SeasonResponse {
    #[serde(default)]
    episodes: Vec<ApiEpisode>,
}

#[derive(Debug, Deserialize)]
struct ApiEpisode {
    id: u64,
    number: String,
}

#[derive(Debug, Deserialize)]
struct ApiServer {
    name: String,
    audio: String,
}

#[derive(Debug, Deserialize)]
struct SourcesResponse {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    captions: Vec<ApiCaption>,
}

#[derive(Debug, Deserialize)]
struct ApiCaption {
    file: String,
    #[serde(default)]
    label: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_response_decodes_seasons_and_episodes() {
        let body = r#"{
            "title": "Great Show",
            "alternativeTitles": ["Sugoi Show"],
            "storyline": "Plot.",
            "startDate": "2019-01-12",
            "score": 8.7,
            "episodes": [{"id": 1, "number": "1"}],
            "seasons": [{"id": 10}, {"id": 11}]
        }"#;
        let detail: DetailResponse = serde_json::from_str(body).unwrap();
        assert_eq!(detail.seasons.len(), 2);
        assert_eq!(detail.episodes.len(), 1);
        assert_eq!(detail.score, Some(8.7));
    }

    #[test]
    fn merged_seasons_dedup_by_identifier() {
        let episodes = vec![
            ApiEpisode {
                id: 1,
                number: "1".into(),
            },
            ApiEpisode {
                id: 2,
                number: "2".into(),
            },
            // season page repeats the season opener
            ApiEpisode {
                id: 1,
                number: "1".into(),
            },
        ];
        let merged = merge_episodes(episodes);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].href, "1");
    }

    #[test]
    fn servers_response_decodes_audio_and_name() {
        let body = r#"[
            {"name": "Maria", "audio": "sub"},
            {"name": "Akari", "audio": "sub"},
            {"name": "Maria", "audio": "dub"}
        ]"#;
        let servers: Vec<ApiServer> = serde_json::from_str(body).unwrap();
        assert_eq!(servers.len(), 3);
        assert_eq!(servers[2].audio, "dub");
    }

    #[test]
    fn english_caption_wins_over_first() {
        let captions = vec![
            ApiCaption {
                file: "it.vtt".into(),
                label: Some("Italiano".into()),
            },
            ApiCaption {
                file: "en.vtt".into(),
                label: Some("English".into()),
            },
        ];
        assert_eq!(pick_caption(&captions).unwrap(), "en.vtt");
    }

    #[test]
    fn sources_without_a_url_count_as_empty() {
        let sources: SourcesResponse = serde_json::from_str(r#"{"captions": []}"#).unwrap();
        assert!(sources.url.is_none());
    }
}
