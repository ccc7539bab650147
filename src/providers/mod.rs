//! One strategy per source. A strategy knows how to search the catalogue,
//! fetch a title's detail + episode list, and turn an episode reference into
//! a playable URL. Adding a provider means adding a file here and a registry
//! entry; nothing else changes.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::error::SourceError;
use crate::fetch::HttpClient;
use crate::registry::Provider;
use crate::select::OptionChooser;
use crate::types::{Episode, ShowInfo, StreamCandidate, TitleDetail};

pub mod animepahe;
pub mod animesaturn;
pub mod animeunity;
pub mod animeworld;
pub mod aniplay;
pub mod gogoanime;

/// Ambient stream preferences, read once per user action and threaded
/// through explicitly.
#[derive(Debug, Clone)]
pub struct StreamPrefs {
    pub quality: String,
    pub audio: String,
    pub server: Option<String>,
}

#[async_trait]
pub trait ProviderStrategy: Send + Sync {
    fn provider(&self) -> Provider;

    async fn search(&self, http: &HttpClient, query: &str) -> Result<Vec<ShowInfo>, SourceError>;

    async fn fetch_detail(
        &self,
        http: &HttpClient,
        reference: &str,
    ) -> Result<TitleDetail, SourceError>;

    async fn resolve_stream(
        &self,
        http: &HttpClient,
        episode: &Episode,
        prefs: &StreamPrefs,
        chooser: &dyn OptionChooser,
    ) -> Result<StreamCandidate, SourceError>;

    /// Resolves a direct download target. Providers exposing dedicated
    /// download links override this; everyone else downloads the stream URL.
    async fn resolve_download(
        &self,
        http: &HttpClient,
        episode: &Episode,
        prefs: &StreamPrefs,
        chooser: &dyn OptionChooser,
    ) -> Result<StreamCandidate, SourceError> {
        self.resolve_stream(http, episode, prefs, chooser).await
    }
}

pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid CSS selector")
}

pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

pub(crate) fn first_text(doc: &Html, css: &str) -> Option<String> {
    let sel = selector(css);
    doc.select(&sel).next().map(element_text).filter(|t| !t.is_empty())
}

pub(crate) fn first_attr(doc: &Html, css: &str, attr: &str) -> Option<String> {
    let sel = selector(css);
    doc.select(&sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.to_string())
}

/// Prepends `https:` to scheme-relative URLs; embeds frequently come back as
/// `//cdn.example/...`.
pub(crate) fn ensure_https(raw: &str) -> String {
    if let Some(rest) = raw.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        raw.to_string()
    }
}

/// Joins a provider-relative href onto a base URL.
pub(crate) fn absolutize(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if href.starts_with("//") {
        return ensure_https(href);
    }
    match url::Url::parse(base).and_then(|b| b.join(href)) {
        Ok(joined) => joined.to_string(),
        Err(_) => format!("{}/{}", base.trim_end_matches('/'), href.trim_start_matches('/')),
    }
}

/// Reads a fixed query-parameter marker (`id=`, `file=`, `?ep=`) out of a
/// provider URL.
pub(crate) fn query_param(url: &str, key: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key && !v.is_empty()).then(|| v.to_string())
    })
}

/// Dedup by href, keeping first occurrence and input order.
pub(crate) fn dedup_episodes(episodes: Vec<Episode>) -> Vec<Episode> {
    let mut seen = std::collections::HashSet::new();
    episodes
        .into_iter()
        .filter(|ep| seen.insert(ep.href.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_relative_urls_gain_https() {
        assert_eq!(
            ensure_https("//cdn.example/embed/1"),
            "https://cdn.example/embed/1"
        );
        assert_eq!(
            ensure_https("https://cdn.example/embed/1"),
            "https://cdn.example/embed/1"
        );
    }

    #[test]
    fn absolutize_joins_relative_paths() {
        assert_eq!(
            absolutize("https://www.animeworld.so", "/play/slug"),
            "https://www.animeworld.so/play/slug"
        );
        assert_eq!(
            absolutize("https://a.example", "https://b.example/x"),
            "https://b.example/x"
        );
    }

    #[test]
    fn query_param_reads_fixed_markers() {
        assert_eq!(
            query_param("https://s.example/watch?file=tok-123&s=1", "file"),
            Some("tok-123".to_string())
        );
        assert_eq!(query_param("https://s.example/watch", "file"), None);
        assert_eq!(query_param("https://s.example/watch?file=", "file"), None);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let eps = vec![
            Episode {
                number: "1".into(),
                href: "/a".into(),
                download_url: None,
            },
            Episode {
                number: "1bis".into(),
                href: "/a".into(),
                download_url: None,
            },
            Episode {
                number: "2".into(),
                href: "/b".into(),
                download_url: None,
            },
        ];
        let deduped = dedup_episodes(eps);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].number, "1");
    }
}
