//! AnimeSaturn-style source. Episode labels mix numbered entries with films
//! and specials, which get their own running count. Resolution walks a
//! redirect chain: episode page → watch page → scripted `window.location`
//! redirect → base64-embedded manifest URL on the landing page.

use std::sync::LazyLock;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use regex::Regex;
use scraper::Html;
use tracing::debug;

use super::{
    ProviderStrategy, StreamPrefs, absolutize, dedup_episodes, element_text, first_attr,
    first_text, query_param, selector,
};
use crate::error::SourceError;
use crate::fetch::HttpClient;
use crate::registry::Provider;
use crate::select::OptionChooser;
use crate::types::{Episode, ShowInfo, StreamCandidate, TitleDetail};

static REDIRECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"window\.location(?:\.href)?\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});
static EMBEDDED_MANIFEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"atob\(["']([A-Za-z0-9+/=]+)["']\)"#).expect("valid regex"));
static INLINE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"file:\s*["']([^"']+\.m3u8[^"']*)["']"#).expect("valid regex"));

pub struct AnimeSaturn {
    base: String,
}

impl AnimeSaturn {
    pub fn new(base: String) -> Self {
        Self { base }
    }
}

#[async_trait]
impl ProviderStrategy for AnimeSaturn {
    fn provider(&self) -> Provider {
        Provider::AnimeSaturn
    }

    async fn search(&self, http: &HttpClient, query: &str) -> Result<Vec<ShowInfo>, SourceError> {
        let url = format!(
            "{}/animelist?search={}",
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
        let episode_url = absolutize(&self.base, &episode.href);
        let episode_html = http.get_text(&episode_url, Some(&self.base)).await?;
        let Some(watch_href) = extract_watch_href(&episode_html) else {
            return Err(SourceError::NoCandidates {
                episode: episode.number.clone(),
            });
        };
        let watch_url = absolutize(&self.base, &watch_href);

        // the `file=` marker sometimes carries the manifest URL outright
        if let Some(file) = query_param(&watch_url, "file") {
            if file.ends_with(".m3u8") || file.contains(".m3u8?") {
                debug!(%watch_url, "file marker already holds the manifest");
                return Ok(self.candidate(file));
            }
        }

        let watch_html = http.get_text(&watch_url, Some(&episode_url)).await?;
        if let Some(redirect) = REDIRECT
            .captures(&watch_html)
            .map(|cap| cap[1].to_string())
        {
            let landing_url = absolutize(&self.base, &redirect);
            let landing_html = http.get_text(&landing_url, Some(&watch_url)).await?;
            let manifest = decode_embedded_manifest(&landing_html)
                .ok_or_else(|| SourceError::parse(&landing_url, "embedded manifest script"))?;
            return Ok(self.candidate(manifest));
        }

        // no redirect hop: the watch page embeds the manifest itself
        if let Some(cap) = INLINE_FILE.captures(&watch_html) {
            return Ok(self.candidate(cap[1].to_string()));
        }

        Err(SourceError::NoCandidates {
            episode: episode.number.clone(),
        })
    }
}

impl AnimeSaturn {
    fn candidate(&self, url: String) -> StreamCandidate {
        let mut candidate = StreamCandidate {
            url,
            ..Default::default()
        };
        candidate
            .headers
            .insert("Referer".to_string(), self.base.clone());
        candidate
    }
}

fn parse_search(html: &str, base: &str) -> Vec<ShowInfo> {
    let doc = Html::parse_document(html);
    let item_sel = selector("ul.list-group li .item-archivio");
    let link_sel = selector("a.badge-archivio");
    let img_sel = selector("img.locandina-archivio");

    let mut shows = Vec::new();
    for item in doc.select(&item_sel) {
        let Some(link) = item.select(&link_sel).next() else {
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
    let title = first_text(&doc, "div.container .anime-title-as")?;

    let ep_sel = selector("a.bottone-ep");
    let raw: Vec<(String, String)> = doc
        .select(&ep_sel)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            Some((element_text(a), href.to_string()))
        })
        .collect();

    Some(TitleDetail {
        title,
        aliases: first_text(&doc, "div.box-trasparente-alternativo")
            .map(|t| {
                t.split(',')
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
        synopsis: first_text(&doc, "div#full-trama, div.trama").unwrap_or_default(),
        air_date: first_text(&doc, "span.anime-year").unwrap_or_default(),
        rating: first_text(&doc, "span.anime-rating").unwrap_or_default(),
        thumbnail: first_attr(&doc, "img.cover-anime", "src"),
        episodes: classify_episodes(raw),
    })
}

/// Numbered entries keep their number; films and specials carry no digits
/// and get a separate running count so they remain addressable.
fn classify_episodes(raw: Vec<(String, String)>) -> Vec<Episode> {
    let mut specials = 0u32;
    let mut episodes = Vec::new();
    for (label, href) in raw {
        let number = match label
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect::<String>()
        {
            digits if digits.is_empty() => {
                specials += 1;
                format!("Film {specials}")
            }
            digits => digits,
        };
        episodes.push(Episode {
            number,
            href,
            download_url: None,
        });
    }
    dedup_episodes(episodes)
}

fn extract_watch_href(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    first_attr(&doc, r#"a[href*="/watch?file="]"#, "href")
}

/// The landing page hides the manifest URL in an `atob("...")` call.
fn decode_embedded_manifest(html: &str) -> Option<String> {
    let encoded = EMBEDDED_MANIFEST.captures(html)?[1].to_string();
    let bytes = BASE64.decode(encoded).ok()?;
    let decoded = String::from_utf8(bytes).ok()?;
    decoded.starts_with("http").then_some(decoded)
}
