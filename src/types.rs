use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One search hit from a provider's catalogue.
#[derive(Debug, Clone)]
pub struct ShowInfo {
    /// Provider-scoped reference for the title: a path fragment, a full URL
    /// or an API identifier depending on the source.
    pub reference: String,
    pub title: String,
    pub episode_count: Option<usize>,
    pub thumbnail: Option<String>,
}

/// Title metadata as fetched from a provider. Built fresh on every detail
/// fetch and replaced wholesale on refresh; nothing caches these.
#[derive(Debug, Clone)]
pub struct TitleDetail {
    pub title: String,
    pub aliases: Vec<String>,
    pub synopsis: String,
    pub air_date: String,
    pub rating: String,
    pub thumbnail: Option<String>,
    pub episodes: Vec<Episode>,
}

/// A single episode as parsed out of a provider's episode list. The number
/// is a display label and is not guaranteed numeric ("Film 1", "S2E03").
/// Identity within a title's list is the href.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub number: String,
    pub href: String,
    pub download_url: Option<String>,
}

impl PartialEq for Episode {
    fn eq(&self, other: &Self) -> bool {
        self.href == other.href
    }
}

impl Eq for Episode {}

/// A resolved, directly playable (or one-hop-from-playable) media reference.
/// Recomputed per playback request, never persisted. `variants` is only
/// populated by ladder strategies; `url` is always the narrowed choice.
#[derive(Debug, Clone, Default)]
pub struct StreamCandidate {
    pub url: String,
    pub subtitle: Option<String>,
    pub variants: Vec<QualityVariant>,
    pub headers: HashMap<String, String>,
}

/// One rung of a quality ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityVariant {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Sorts an episode list in place by the numeric portion of its labels.
/// Providers return lists in whatever order their markup happens to use;
/// the session coordinator depends on this order for next/previous
/// arithmetic, so every list goes through here before display.
pub fn sort_episodes(episodes: &mut [Episode], direction: SortDirection) {
    episodes.sort_by(|a, b| {
        let ordering = compare_episode_labels(&a.number, &b.number);
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
}

pub fn compare_episode_labels(left: &str, right: &str) -> Ordering {
    let l = episode_sort_key(left);
    let r = episode_sort_key(right);
    l.partial_cmp(&r)
        .unwrap_or(Ordering::Equal)
        .then_with(|| left.cmp(right))
}

/// Sort key for an episode label: the first numeric run, parsed as f64 so
/// half-episodes ("13.5") land between their neighbours. Labels without any
/// digits sort first.
pub fn episode_sort_key(label: &str) -> f64 {
    first_numeric_run(label)
        .and_then(|run| run.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// The episode number pushed to the tracking service: the last numeric run
/// in the label, so "S2E03" reports 3 and "Film 1" reports 1.
pub fn episode_sync_number(label: &str) -> Option<u32> {
    last_numeric_run(label).and_then(|run| run.parse::<u32>().ok())
}

fn first_numeric_run(label: &str) -> Option<&str> {
    let start = label.find(|c: char| c.is_ascii_digit())?;
    let rest = &label[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(rest.len());
    Some(rest[..end].trim_end_matches('.'))
}

fn last_numeric_run(label: &str) -> Option<&str> {
    let end = label.rfind(|c: char| c.is_ascii_digit())? + 1;
    let head = &label[..end];
    let start = head
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    Some(&head[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(number: &str) -> Episode {
        Episode {
            number: number.to_string(),
            href: format!("/ep/{number}"),
            download_url: None,
        }
    }

    #[test]
    fn sort_ascending_then_reversed_matches_descending() {
        let mut ascending: Vec<Episode> =
            ["3", "1", "12", "2"].iter().map(|n| episode(n)).collect();
        let mut descending = ascending.clone();

        sort_episodes(&mut ascending, SortDirection::Ascending);
        sort_episodes(&mut descending, SortDirection::Descending);
        ascending.reverse();

        assert_eq!(ascending, descending);
    }

    #[test]
    fn sort_key_reads_first_numeric_run() {
        assert_eq!(episode_sort_key("12"), 12.0);
        assert_eq!(episode_sort_key("13.5"), 13.5);
        assert_eq!(episode_sort_key("Film 2"), 2.0);
        assert_eq!(episode_sort_key("Special"), 0.0);
    }

    #[test]
    fn sync_number_reads_last_numeric_run() {
        assert_eq!(episode_sync_number("S2E03"), Some(3));
        assert_eq!(episode_sync_number("Film 1"), Some(1));
        assert_eq!(episode_sync_number("12"), Some(12));
        assert_eq!(episode_sync_number("Special"), None);
    }

    #[test]
    fn episode_identity_is_the_href() {
        let a = Episode {
            number: "1".into(),
            href: "/ep/1".into(),
            download_url: None,
        };
        let b = Episode {
            number: "Episode 1".into(),
            href: "/ep/1".into(),
            download_url: Some("https://cdn.example/1.mp4".into()),
        };
        assert_eq!(a, b);
    }
}
