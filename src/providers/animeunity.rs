//! AnimeUnity-style source. The site is a single-page app that serialises
//! its state into element attributes: search results and the episode list
//! are JSON documents hanging off `records=` / `episodes=` attributes, and
//! the player page exposes the media URL as `data-video-src`.

use async_trait::async_trait;
use scraper::Html;
use serde::Deserialize;

use super::{
    ProviderStrategy, StreamPrefs, absolutize, dedup_episodes, first_attr,
};
use crate::error::SourceError;
use crate::fetch::HttpClient;
use crate::registry::Provider;
use crate::select::OptionChooser;
use crate::types::{Episode, ShowInfo, StreamCandidate, TitleDetail};

pub struct AnimeUnity {
    base: String,
}

impl AnimeUnity {
    pub fn new(base: String) -> Self {
        Self { base }
    }
}

#[async_trait]
impl ProviderStrategy for AnimeUnity {
    fn provider(&self) -> Provider {
        Provider::AnimeUnity
    }

    async fn search(&self, http: &HttpClient, query: &str) -> Result<Vec<ShowInfo>, SourceError> {
        let url = format!(
            "{}/archivio?title={}",
            self.base,
            query.split_whitespace().collect::<Vec<_>>().join("+")
        );
        let html = http.get_text(&url, Some(&self.base)).await?;
        parse_search(&html).ok_or_else(|| SourceError::parse(url, "archive records attribute"))
    }

    async fn fetch_detail(
        &self,
        http: &HttpClient,
        reference: &str,
    ) -> Result<TitleDetail, SourceError> {
        let url = absolutize(&self.base, reference);
        let html = http.get_text(&url, Some(&self.base)).await?;
        parse_detail(&html, reference)
            .ok_or_else(|| SourceError::parse(url, "player element attributes"))
    }

    async fn resolve_stream(
        &self,
        http: &HttpClient,
        episode: &Episode,
        _prefs: &StreamPrefs,
        _chooser: &dyn OptionChooser,
    ) -> Result<StreamCandidate, SourceError> {
        let url = absolutize(&self.base, &episode.href);
        let html = http.get_text(&url, Some(&self.base)).await?;
        let Some(media_url) = extract_video_src(&html) else {
            return Err(SourceError::NoCandidates {
                episode: episode.number.clone(),
            });
        };
        let mut candidate = StreamCandidate {
            url: media_url,
            ..Default::default()
        };
        candidate
            .headers
            .insert("Referer".to_string(), self.base.clone());
        Ok(candidate)
    }
}

#[derive(Debug, Deserialize)]
struct ArchiveRecord {
    id: u64,
    slug: String,
    #[serde(default)]
    title_eng: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    imageurl: Option<String>,
    #[serde(default)]
    episodes_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct AnimeMeta {
    #[serde(default)]
    title_eng: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    plot: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    score: Option<String>,
    #[serde(default)]
    imageurl: Option<String>,
    #[serde(default)]
    title_it: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EpisodeRecord {
    id: u64,
    number: String,
}

fn parse_search(html: &str) -> Option<Vec<ShowInfo>> {
    let records_json = {
        let doc = Html::parse_document(html);
        first_attr(&doc, "archivio", "records")?
    };
    let records: Vec<ArchiveRecord> = serde_json::from_str(&records_json).ok()?;
    Some(
        records
            .into_iter()
            .map(|r| ShowInfo {
                reference: format!("/anime/{}-{}", r.id, r.slug),
                title: r.title_eng.or(r.title).unwrap_or_else(|| r.slug.clone()),
                episode_count: r.episodes_count,
                thumbnail: r.imageurl,
            })
            .collect(),
    )
}

fn parse_detail(html: &str, reference: &str) -> Option<TitleDetail> {
    let (meta_json, episodes_json) = {
        let doc = Html::parse_document(html);
        (
            first_attr(&doc, "video-player", "anime")?,
            first_attr(&doc, "video-player", "episodes")?,
        )
    };
    let meta: AnimeMeta = serde_json::from_str(&meta_json).ok()?;
    let records: Vec<EpisodeRecord> = serde_json::from_str(&episodes_json).ok()?;

    let episodes = dedup_episodes(
        records
            .into_iter()
            .map(|ep| Episode {
                number: ep.number,
                href: format!("{}/{}", reference.trim_end_matches('/'), ep.id),
                download_url: None,
            })
            .collect(),
    );

    Some(TitleDetail {
        title: meta
            .title_eng
            .or(meta.title)
            .unwrap_or_else(|| reference.to_string()),
        aliases: meta.title_it.into_iter().collect(),
        synopsis: meta.plot.unwrap_or_default(),
        air_date: meta.date.unwrap_or_default(),
        rating: meta.score.unwrap_or_default(),
        thumbnail: meta.imageurl,
        episodes,
    })
}

fn extract_video_src(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    first_attr(&doc, "[data-video-src]", "data-video-src").filter(|src| !src.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn episode_array_is_decoded_out_of_the_attribute() {
        let html = r#"<video-player
            anime='{"title_eng":"Great Show","plot":"Plot.","date":"2019","score":"9.1"}'
            episodes='[{"id":101,"number":"1"},{"id":102,"number":"2"}]'>
        </video-player>"#;
        let detail = parse_detail(html, "/anime/42-great-show").unwrap();
        assert_eq!(detail.title, "Great Show");
        assert_eq!(detail.rating, "9.1");
        assert_eq!(detail.episodes.len(), 2);
        assert_eq!(detail.episodes[0].href, "/anime/42-great-show/101");
    }

    #[test]
    fn search_records_attribute_is_decoded() {
        let html = r#"<archivio records='[{"id":42,"slug":"great-show","title_eng":"Great Show","episodes_count":12}]'></archivio>"#;
        let shows = parse_search(html).unwrap();
        assert_eq!(shows.len(), 1);
        assert_eq!(shows[0].reference, "/anime/42-great-show");
        assert_eq!(shows[0].episode_count, Some(12));
    }

    #[test]
    fn video_src_attribute_is_scraped_directly() {
        let html = r#"<div id="player" data-video-src="https://cdn.example/ep1.m3u8"></div>"#;
        assert_eq!(
            extract_video_src(html).unwrap(),
            "https://cdn.example/ep1.m3u8"
        );
    }

    #[test]
    fn missing_player_attributes_are_a_parse_miss() {
        assert!(parse_detail("<html></html>", "/anime/42-x").is_none());
    }
}
