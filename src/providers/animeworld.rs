//! AnimeWorld-style source: episode list is mapped element-for-element off
//! the detail page, playback is a direct `<video><source>` scrape with a
//! regex fallback against the raw HTML, and dedicated download anchors are
//! scraped when the user asks for a file instead of a stream.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::Html;

use super::{
    ProviderStrategy, StreamPrefs, absolutize, dedup_episodes, element_text, first_attr,
    first_text, selector,
};
use crate::error::SourceError;
use crate::fetch::HttpClient;
use crate::registry::Provider;
use crate::select::OptionChooser;
use crate::types::{Episode, ShowInfo, StreamCandidate, TitleDetail};

/// Fallbacks for pages whose player markup the structured parse cannot
/// find. The page is often still usable via plain string search even when
/// its fragments are malformed.
static MP4_FALLBACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"src="(https?://[^"]+\.mp4[^"]*)""#).expect("valid regex"));
static M3U8_FALLBACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"file:\s*['"]([^'"]+\.m3u8[^'"]*)['"]"#).expect("valid regex"));
static DOWNLOAD_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^/]*(?:download|cdn)[^/]*/.+\.(?:mp4|mkv)(?:\?.*)?$")
        .expect("valid regex")
});

pub struct AnimeWorld {
    base: String,
}

impl AnimeWorld {
    pub fn new(base: String) -> Self {
        Self { base }
    }
}

#[async_trait]
impl ProviderStrategy for AnimeWorld {
    fn provider(&self) -> Provider {
        Provider::AnimeWorld
    }

    async fn search(&self, http: &HttpClient, query: &str) -> Result<Vec<ShowInfo>, SourceError> {
        let url = format!(
            "{}/search?keyword={}",
            self.base,
            query.split_whitespace().collect::<Vec<_>>().join("+")
        );
        let html = http.get_text(&url, Some(&self.base)).await?;
        Ok(parse_search(&html, &self.base))
    }

    async fn fetch_detail(
        &self,
        http: &HttpClient,
        reference: &str,
    ) -> Result<TitleDetail, SourceError> {
        let url = absolutize(&self.base, reference);
        let html = http.get_text(&url, Some(&self.base)).await?;
        parse_detail(&html).ok_or_else(|| SourceError::parse(url, "detail page markup"))
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
        let Some(media_url) = extract_media_url(&html) else {
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

    async fn resolve_download(
        &self,
        http: &HttpClient,
        episode: &Episode,
        prefs: &StreamPrefs,
        chooser: &dyn OptionChooser,
    ) -> Result<StreamCandidate, SourceError> {
        if let Some(direct) = &episode.download_url {
            return Ok(StreamCandidate {
                url: direct.clone(),
                ..Default::default()
            });
        }

        let url = absolutize(&self.base, &episode.href);
        let html = http.get_text(&url, Some(&self.base)).await?;
        let links = extract_download_links(&html);
        match links.len() {
            0 => self.resolve_stream(http, episode, prefs, chooser).await,
            1 => Ok(StreamCandidate {
                url: links.into_iter().next().map(|(_, url)| url).unwrap_or_default(),
                ..Default::default()
            }),
            _ => {
                let names: Vec<String> = links.iter().map(|(name, _)| name.clone()).collect();
                let idx = chooser
                    .choose("Select a file", &names)
                    .ok_or(SourceError::Cancelled)?;
                Ok(StreamCandidate {
                    url: links[idx].1.clone(),
                    ..Default::default()
                })
            }
        }
    }
}

fn parse_search(html: &str, base: &str) -> Vec<ShowInfo> {
    let doc = Html::parse_document(html);
    let item_sel = selector("div.film-list div.item");
    let name_sel = selector("a.name");
    let img_sel = selector("img");

    let mut shows = Vec::new();
    for item in doc.select(&item_sel) {
        let Some(link) = item.select(&name_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let title = element_text(link);
        if title.is_empty() {
            continue;
        }
        shows.push(ShowInfo {
            reference: href.to_string(),
            title,
            episode_count: None,
            thumbnail: item
                .select(&img_sel)
                .next()
                .and_then(|img| img.value().attr("src"))
                .map(|src| absolutize(base, src)),
        });
    }
    shows
}

fn parse_detail(html: &str) -> Option<TitleDetail> {
    let doc = Html::parse_document(html);
    let title = first_text(&doc, "h1.title")?;

    let mut air_date = String::new();
    let mut rating = String::new();
    let mut aliases = Vec::new();
    let row_sel = selector("div.info dl.meta dt");
    for dt in doc.select(&row_sel) {
        let label = element_text(dt);
        let value = dt
            .next_siblings()
            .filter_map(scraper::ElementRef::wrap)
            .next()
            .map(element_text)
            .unwrap_or_default();
        match label.trim_end_matches(':') {
            "Data di Uscita" | "Released" => air_date = value,
            "Voto" | "Rating" => rating = value,
            "Titolo alternativo" | "Other title" => {
                aliases = value
                    .split(',')
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect();
            }
            _ => {}
        }
    }

    // one anchor per episode, in page order
    let ep_sel = selector("div.server ul.episodes li a");
    let mut episodes = Vec::new();
    for anchor in doc.select(&ep_sel) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let number = anchor
            .value()
            .attr("data-episode-num")
            .map(|n| n.to_string())
            .unwrap_or_else(|| element_text(anchor));
        if number.is_empty() {
            continue;
        }
        episodes.push(Episode {
            number,
            href: href.to_string(),
            download_url: None,
        });
    }

    Some(TitleDetail {
        title,
        aliases,
        synopsis: first_text(&doc, "div.desc").unwrap_or_default(),
        air_date,
        rating,
        thumbnail: first_attr(&doc, "div.thumb img", "src"),
        episodes: dedup_episodes(episodes),
    })
}

/// Structured parse first, then the two regex fallbacks against raw HTML.
fn extract_media_url(html: &str) -> Option<String> {
    let structured = {
        let doc = Html::parse_document(html);
        first_attr(&doc, "video source", "src").or_else(|| first_attr(&doc, "video", "src"))
    };
    structured
        .filter(|src| !src.is_empty())
        .or_else(|| {
            MP4_FALLBACK
                .captures(html)
                .map(|cap| cap[1].to_string())
        })
        .or_else(|| {
            M3U8_FALLBACK
                .captures(html)
                .map(|cap| cap[1].to_string())
        })
}

/// Anchors pointing at known download hosts, paired with their file names
/// for disambiguation.
fn extract_download_links(html: &str) -> Vec<(String, String)> {
    let doc = Html::parse_document(html);
    let sel = selector("a[href]");
    let mut links = Vec::new();
    for anchor in doc.select(&sel) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !DOWNLOAD_HOST.is_match(href) {
            continue;
        }
        let name = href
            .split('?')
            .next()
            .unwrap_or(href)
            .rsplit('/')
            .next()
            .unwrap_or(href)
            .to_string();
        links.push((name, href.to_string()));
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_source_tag_wins_over_fallbacks() {
        let html = r#"<video id="player"><source src="https://cdn.example/ep1.mp4"></video>"#;
        assert_eq!(
            extract_media_url(html).unwrap(),
            "https://cdn.example/ep1.mp4"
        );
    }

    #[test]
    fn regex_fallback_survives_malformed_markup() {
        // broken fragment: unclosed tags, no <video> element to select
        let html = r#"<div class="player"><<!-- -->
            <script>var opts = { src="https://cdn.example/ep2.mp4?token=a" };</script>"#;
        assert_eq!(
            extract_media_url(html).unwrap(),
            "https://cdn.example/ep2.mp4?token=a"
        );
    }

    #[test]
    fn m3u8_fallback_reads_player_config() {
        let html = r#"<script>player.setup({ file: 'https://cdn.example/hls/master.m3u8' });</script>"#;
        assert_eq!(
            extract_media_url(html).unwrap(),
            "https://cdn.example/hls/master.m3u8"
        );
    }

    #[test]
    fn no_media_url_is_none() {
        assert!(extract_media_url("<html><body>soon</body></html>").is_none());
    }

    #[test]
    fn download_anchors_filter_by_host_and_extension() {
        let html = r#"
            <a href="https://download.cdn.example/Great.Show.E01.1080p.mp4">1080p</a>
            <a href="https://download.cdn.example/Great.Show.E01.480p.mp4">480p</a>
            <a href="https://www.animeworld.so/play/great-show/2">next episode</a>
        "#;
        let links = extract_download_links(html);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].0, "Great.Show.E01.1080p.mp4");
    }

    #[test]
    fn detail_maps_episode_anchors_directly() {
        let html = r#"
            <h1 class="title">Great Show</h1>
            <div class="desc">Plot.</div>
            <div class="info"><dl class="meta">
                <dt>Data di Uscita:</dt><dd>12 Gennaio 2019</dd>
                <dt>Voto:</dt><dd>8.9</dd>
            </dl></div>
            <div class="server"><ul class="episodes">
                <li><a data-episode-num="1" href="/play/great-show/1">1</a></li>
                <li><a data-episode-num="2" href="/play/great-show/2">2</a></li>
            </ul></div>"#;
        let detail = parse_detail(html).unwrap();
        assert_eq!(detail.rating, "8.9");
        assert_eq!(detail.air_date, "12 Gennaio 2019");
        assert_eq!(detail.episodes.len(), 2);
        assert_eq!(detail.episodes[1].href, "/play/great-show/2");
    }
}
