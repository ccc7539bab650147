//! GogoAnime-style source. The detail page carries the episode list as
//! `ep_start`/`ep_end` range markers that get expanded into one episode per
//! integer; playback goes through the embed iframe on the episode page.

use async_trait::async_trait;
use scraper::Html;

use super::{
    ProviderStrategy, StreamPrefs, absolutize, dedup_episodes, element_text, ensure_https,
    first_attr, first_text, selector,
};
use crate::error::SourceError;
use crate::fetch::HttpClient;
use crate::registry::Provider;
use crate::select::OptionChooser;
use crate::types::{Episode, ShowInfo, StreamCandidate, TitleDetail};

pub struct GogoAnime {
    base: String,
}

impl GogoAnime {
    pub fn new(base: String) -> Self {
        Self { base }
    }
}

#[async_trait]
impl ProviderStrategy for GogoAnime {
    fn provider(&self) -> Provider {
        Provider::GogoAnime
    }

    async fn search(&self, http: &HttpClient, query: &str) -> Result<Vec<ShowInfo>, SourceError> {
        let url = format!(
            "{}/search.html?keyword={}",
            self.base,
            urlencode(query)
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
        parse_detail(&html, reference).ok_or_else(|| SourceError::parse(url, "detail page markup"))
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
        let Some(embed) = extract_embed_src(&html) else {
            return Err(SourceError::NoCandidates {
                episode: episode.number.clone(),
            });
        };
        let mut candidate = StreamCandidate {
            url: ensure_https(&embed),
            ..Default::default()
        };
        candidate
            .headers
            .insert("Referer".to_string(), self.base.clone());
        Ok(candidate)
    }
}

fn urlencode(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join("+")
}

fn parse_search(html: &str, base: &str) -> Vec<ShowInfo> {
    let doc = Html::parse_document(html);
    let item_sel = selector("ul.items li");
    let name_sel = selector("p.name a");
    let img_sel = selector("div.img img");

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

fn parse_detail(html: &str, reference: &str) -> Option<TitleDetail> {
    let doc = Html::parse_document(html);
    let title = first_text(&doc, "div.anime_info_body_bg h1")?;

    let mut synopsis = String::new();
    let mut air_date = String::new();
    let mut aliases = Vec::new();
    let row_sel = selector("div.anime_info_body_bg p.type");
    let label_sel = selector("span");
    for row in doc.select(&row_sel) {
        let label = row
            .select(&label_sel)
            .next()
            .map(element_text)
            .unwrap_or_default();
        let text = element_text(row);
        let value = text
            .strip_prefix(&label)
            .unwrap_or(&text)
            .trim()
            .to_string();
        match label.trim_end_matches(':') {
            "Plot Summary" => synopsis = value,
            "Released" => air_date = value,
            "Other name" => {
                aliases = value
                    .split(',')
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect();
            }
            _ => {}
        }
    }

    let slug = reference
        .trim_start_matches('/')
        .trim_start_matches("category/")
        .to_string();
    let episodes = expand_episode_ranges(&doc, &slug);

    Some(TitleDetail {
        title,
        aliases,
        synopsis,
        air_date,
        // no rating on this source's detail pages
        rating: String::new(),
        thumbnail: first_attr(&doc, "div.anime_info_body_bg img", "src"),
        episodes,
    })
}

/// Expands `ep_start`/`ep_end` pagination markers into one episode per
/// integer. Range starts are clamped to 1 and an "episode 0" never makes it
/// into the list; the site emits "0-12" for shows that open with a special.
fn expand_episode_ranges(doc: &Html, slug: &str) -> Vec<Episode> {
    let range_sel = selector("ul#episode_page li a");
    let mut episodes = Vec::new();
    for range in doc.select(&range_sel) {
        let start: u32 = range
            .value()
            .attr("ep_start")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        let end: u32 = range
            .value()
            .attr("ep_end")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        for number in start.max(1)..=end {
            episodes.push(Episode {
                number: number.to_string(),
                href: format!("/{slug}-episode-{number}"),
                download_url: None,
            });
        }
    }
    dedup_episodes(episodes)
}

fn extract_embed_src(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    first_attr(&doc, "div.play-video iframe", "src")
        .or_else(|| first_attr(&doc, "iframe", "src"))
        .filter(|src| !src.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_expansion_skips_episode_zero() {
        let html = r#"<html><body>
            <ul id="episode_page">
              <li><a ep_start="0" ep_end="12">0-12</a></li>
            </ul>
        </body></html>"#;
        let doc = Html::parse_document(html);
        let episodes = expand_episode_ranges(&doc, "one-piece");

        let numbers: Vec<&str> = episodes.iter().map(|e| e.number.as_str()).collect();
        assert_eq!(numbers.first(), Some(&"1"));
        assert_eq!(numbers.last(), Some(&"12"));
        assert_eq!(episodes.len(), 12);
        assert!(!numbers.contains(&"0"));
        assert_eq!(episodes[0].href, "/one-piece-episode-1");
    }

    #[test]
    fn multiple_ranges_concatenate_and_dedup() {
        let html = r#"<ul id="episode_page">
            <li><a ep_start="1" ep_end="2"></a></li>
            <li><a ep_start="2" ep_end="4"></a></li>
        </ul>"#;
        let doc = Html::parse_document(html);
        let episodes = expand_episode_ranges(&doc, "slug");
        let numbers: Vec<&str> = episodes.iter().map(|e| e.number.as_str()).collect();
        assert_eq!(numbers, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn scheme_relative_embed_gains_https() {
        let html = r#"<div class="play-video">
            <iframe src="//cdn.example/embed/1"></iframe>
        </div>"#;
        let embed = extract_embed_src(html).unwrap();
        assert_eq!(ensure_https(&embed), "https://cdn.example/embed/1");
    }

    #[test]
    fn missing_embed_is_none() {
        assert!(extract_embed_src("<html><body>maintenance</body></html>").is_none());
    }

    #[test]
    fn detail_parses_metadata_rows() {
        let html = r#"<div class="anime_info_body_bg">
            <img src="/cover.png"/>
            <h1>Great Show</h1>
            <p class="type"><span>Plot Summary:</span> A show about things.</p>
            <p class="type"><span>Released:</span> 2019</p>
            <p class="type"><span>Other name:</span> Sugoi Show, GS</p>
        </div>
        <ul id="episode_page"><li><a ep_start="1" ep_end="3"></a></li></ul>"#;
        let detail = parse_detail(html, "/category/great-show").unwrap();
        assert_eq!(detail.title, "Great Show");
        assert_eq!(detail.synopsis, "A show about things.");
        assert_eq!(detail.air_date, "2019");
        assert_eq!(detail.aliases, vec!["Sugoi Show", "GS"]);
        assert_eq!(detail.episodes.len(), 3);
    }
}
