//! The registry of supported sources: identifiers, mirror base URLs and the
//! extraction strategy behind each one. Pure lookup; all mutable state lives
//! with the callers.

use std::fmt;
use std::str::FromStr;

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::providers::{
    ProviderStrategy, aniplay::AniPlay, animepahe::AnimePahe, animesaturn::AnimeSaturn,
    animeunity::AnimeUnity, animeworld::AnimeWorld, gogoanime::GogoAnime,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    GogoAnime,
    AnimeWorld,
    AnimeSaturn,
    AnimeUnity,
    AniPlay,
    AnimePahe,
}

/// How a provider's episode reference becomes a playable URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// `<video><source>` off the episode page, regex fallback on raw HTML.
    DirectScrape,
    /// An `<iframe src>` is the next hop.
    IframeFollow,
    /// A `[data-video-src]` attribute holds the URL directly.
    AttributeScrape,
    /// Servers endpoint, then a sources endpoint with the chosen
    /// category/server.
    JsonApi,
    /// An intermediate page redirects via script to a page embedding the
    /// manifest URL.
    RedirectChain,
    /// A master playlist is fetched and its ladder narrowed by preference.
    ManifestLadder,
}

impl Provider {
    pub const ALL: [Provider; 6] = [
        Provider::GogoAnime,
        Provider::AnimeWorld,
        Provider::AnimeSaturn,
        Provider::AnimeUnity,
        Provider::AniPlay,
        Provider::AnimePahe,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Provider::GogoAnime => "gogoanime",
            Provider::AnimeWorld => "animeworld",
            Provider::AnimeSaturn => "animesaturn",
            Provider::AnimeUnity => "animeunity",
            Provider::AniPlay => "aniplay",
            Provider::AnimePahe => "animepahe",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Provider::GogoAnime => "GogoAnime",
            Provider::AnimeWorld => "AnimeWorld",
            Provider::AnimeSaturn => "AnimeSaturn",
            Provider::AnimeUnity => "AnimeUnity",
            Provider::AniPlay => "AniPlay",
            Provider::AnimePahe => "AnimePahe",
        }
    }

    /// Configured base URLs. GogoAnime keeps a mirror list; the others run a
    /// single domain.
    pub fn base_urls(self) -> &'static [&'static str] {
        match self {
            Provider::GogoAnime => &["https://anitaku.to", "https://gogoanime3.cc"],
            Provider::AnimeWorld => &["https://www.animeworld.so"],
            Provider::AnimeSaturn => &["https://www.animesaturn.tv"],
            Provider::AnimeUnity => &["https://www.animeunity.to"],
            Provider::AniPlay => &["https://aniplay.co"],
            Provider::AnimePahe => &["https://animepahe.ru"],
        }
    }

    /// Picks one base URL for this action. Mirrored providers get a random
    /// choice to spread load across domains.
    pub fn resolve_base_url(self) -> &'static str {
        self.base_urls()
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(self.base_urls()[0])
    }

    pub fn strategy_kind(self) -> ExtractionStrategy {
        match self {
            Provider::GogoAnime => ExtractionStrategy::IframeFollow,
            Provider::AnimeWorld => ExtractionStrategy::DirectScrape,
            Provider::AnimeSaturn => ExtractionStrategy::RedirectChain,
            Provider::AnimeUnity => ExtractionStrategy::AttributeScrape,
            Provider::AniPlay => ExtractionStrategy::JsonApi,
            Provider::AnimePahe => ExtractionStrategy::ManifestLadder,
        }
    }

    /// Builds the strategy for this provider with its base URL resolved
    /// once, so a single user action never straddles two mirrors.
    pub fn strategy(self) -> Box<dyn ProviderStrategy> {
        let base = self.resolve_base_url().to_string();
        match self {
            Provider::GogoAnime => Box::new(GogoAnime::new(base)),
            Provider::AnimeWorld => Box::new(AnimeWorld::new(base)),
            Provider::AnimeSaturn => Box::new(AnimeSaturn::new(base)),
            Provider::AnimeUnity => Box::new(AnimeUnity::new(base)),
            Provider::AniPlay => Box::new(AniPlay::new(base)),
            Provider::AnimePahe => Box::new(AnimePahe::new(base)),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Provider {
    type Err = SourceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.id() == normalized)
            .ok_or_else(|| SourceError::UnknownSource(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_from_str() {
        for provider in Provider::ALL {
            assert_eq!(provider.id().parse::<Provider>().unwrap(), provider);
        }
    }

    #[test]
    fn unknown_source_is_an_error_not_a_default() {
        let err = "nyaa".parse::<Provider>().unwrap_err();
        assert!(matches!(err, SourceError::UnknownSource(_)));
    }

    #[test]
    fn mirror_choice_stays_inside_the_configured_set() {
        for _ in 0..20 {
            let base = Provider::GogoAnime.resolve_base_url();
            assert!(Provider::GogoAnime.base_urls().contains(&base));
        }
    }

    #[test]
    fn every_provider_declares_a_strategy() {
        assert_eq!(
            Provider::AnimePahe.strategy_kind(),
            ExtractionStrategy::ManifestLadder
        );
        assert_eq!(
            Provider::GogoAnime.strategy_kind(),
            ExtractionStrategy::IframeFollow
        );
    }
}
