//! Shared narrowing logic for quality ladders, audio categories and server
//! lists: exact preference match wins, a lone option is taken silently, a
//! numeric preference falls back to the closest numeric label, and anything
//! still ambiguous goes to the interactive chooser.

use crate::error::SourceError;
use crate::types::QualityVariant;

/// Interactive disambiguation owned by the UI layer. `None` means the user
/// cancelled. Implementations must not block the async runtime for anything
/// other than the user's answer.
pub trait OptionChooser: Send + Sync {
    fn choose(&self, prompt: &str, options: &[String]) -> Option<usize>;
}

/// Narrows `options` to one index.
pub fn pick_option(
    prompt: &str,
    preferred: Option<&str>,
    options: &[String],
    chooser: &dyn OptionChooser,
) -> Result<usize, SourceError> {
    if let Some(preferred) = preferred {
        if let Some(idx) = options
            .iter()
            .position(|o| o.eq_ignore_ascii_case(preferred))
        {
            return Ok(idx);
        }
    }
    if options.len() == 1 {
        return Ok(0);
    }
    if let Some(preferred) = preferred {
        if let Some(idx) = closest_numeric(preferred, options) {
            return Ok(idx);
        }
    }
    chooser
        .choose(prompt, options)
        .ok_or(SourceError::Cancelled)
}

/// Narrows a quality ladder using the preferred label ("1080p").
pub fn pick_quality<'a>(
    preferred: &str,
    variants: &'a [QualityVariant],
    chooser: &dyn OptionChooser,
) -> Result<&'a QualityVariant, SourceError> {
    let labels: Vec<String> = variants.iter().map(|v| v.label.clone()).collect();
    let idx = pick_option("Select quality", Some(preferred), &labels, chooser)?;
    Ok(&variants[idx])
}

/// Index of the option whose numeric portion is closest to the preferred
/// one. Only applies when the preference and at least one option carry a
/// number; category and server labels fall through to the chooser.
fn closest_numeric(preferred: &str, options: &[String]) -> Option<usize> {
    let target = numeric_part(preferred)?;
    options
        .iter()
        .enumerate()
        .filter_map(|(idx, option)| numeric_part(option).map(|n| (idx, (n - target).abs())))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(idx, _)| idx)
}

fn numeric_part(label: &str) -> Option<f64> {
    let start = label.find(|c: char| c.is_ascii_digit())?;
    let rest = &label[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(rest.len());
    rest[..end].trim_end_matches('.').parse().ok()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Chooser that always answers with a fixed index, or refuses to be
    /// consulted at all.
    pub(crate) enum CannedChooser {
        Pick(usize),
        NeverAsked,
        Cancel,
    }

    impl OptionChooser for CannedChooser {
        fn choose(&self, _prompt: &str, options: &[String]) -> Option<usize> {
            match self {
                CannedChooser::Pick(idx) => Some((*idx).min(options.len() - 1)),
                CannedChooser::NeverAsked => {
                    panic!("interactive chooser invoked for an auto-resolvable choice")
                }
                CannedChooser::Cancel => None,
            }
        }
    }

    fn labels(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exact_match_wins_without_prompting() {
        let options = labels(&["480p", "720p", "1080p"]);
        let idx = pick_option(
            "q",
            Some("720p"),
            &options,
            &CannedChooser::NeverAsked,
        )
        .unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn single_option_is_taken_regardless_of_preference() {
        let options = labels(&["VidStream"]);
        let idx = pick_option(
            "server",
            Some("StreamTape"),
            &options,
            &CannedChooser::NeverAsked,
        )
        .unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn closest_numeric_label_beats_farther_ones() {
        let options = labels(&["480p", "720p"]);
        let idx = pick_option("q", Some("1080p"), &options, &CannedChooser::NeverAsked).unwrap();
        assert_eq!(options[idx], "720p");
    }

    #[test]
    fn non_numeric_labels_fall_back_to_the_chooser() {
        let options = labels(&["AnimeWorld Server", "StreamTape"]);
        let idx = pick_option("server", Some("Doodstream"), &options, &CannedChooser::Pick(1))
            .unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn chooser_cancel_surfaces_as_cancelled() {
        let options = labels(&["sub", "dub"]);
        let err = pick_option("audio", None, &options, &CannedChooser::Cancel).unwrap_err();
        assert!(matches!(err, SourceError::Cancelled));
    }

    #[test]
    fn pick_quality_prefers_closest_rung() {
        let variants = vec![
            QualityVariant {
                label: "480p".into(),
                url: "480.m3u8".into(),
            },
            QualityVariant {
                label: "720p".into(),
                url: "720.m3u8".into(),
            },
        ];
        let chosen = pick_quality("1080p", &variants, &CannedChooser::NeverAsked).unwrap();
        assert_eq!(chosen.label, "720p");
    }
}
