use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use dirs_next::config_dir;
use serde::Deserialize;

use crate::types::SortDirection;

/// User preferences, read once per user action and passed around as values.
/// Keys map one-to-one onto `~/.config/anzu/config.toml`; any of them can
/// also come in through `ANZU_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Selected source. There is deliberately no fallback: resolution
    /// refuses to run without an explicit provider.
    pub provider: Option<String>,
    pub preferred_quality: String,
    pub preferred_audio: String,
    pub preferred_server: Option<String>,
    /// Show episode lists newest-first and navigate accordingly.
    pub reverse_sort: bool,
    /// Advance to the next episode when one finishes.
    pub autoplay: bool,
    /// Route playback requests to the download path instead.
    pub download_instead: bool,
    /// Push episode completion to the tracking service.
    pub push_sync: bool,
    pub tracking_token: Option<String>,
    /// Manual title → tracker id mappings, keyed by title string.
    pub tracking_overrides: HashMap<String, u32>,
    pub download_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: None,
            preferred_quality: String::from("1080p"),
            preferred_audio: String::from("sub"),
            preferred_server: None,
            reverse_sort: false,
            autoplay: true,
            download_instead: false,
            push_sync: false,
            tracking_token: None,
            tracking_overrides: HashMap::new(),
            download_dir: None,
        }
    }
}

impl Settings {
    pub fn load(path_override: Option<&Path>) -> Result<Self> {
        let path = match path_override {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path(),
        };

        let mut builder = Config::builder();
        if let Some(path) = &path {
            builder = builder.add_source(
                File::from(path.clone())
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }
        let config = builder
            .add_source(Environment::with_prefix("ANZU"))
            .build()
            .context("failed to read configuration")?;
        config
            .try_deserialize()
            .context("failed to parse configuration")
    }

    pub fn sort_direction(&self) -> SortDirection {
        if self.reverse_sort {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("anzu").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_require_an_explicit_provider() {
        let settings = Settings::default();
        assert!(settings.provider.is_none());
        assert_eq!(settings.preferred_quality, "1080p");
        assert_eq!(settings.preferred_audio, "sub");
        assert!(settings.autoplay);
        assert!(!settings.push_sync);
    }

    #[test]
    fn toml_settings_deserialize() {
        let toml = r#"
            provider = "gogoanime"
            preferred_quality = "720p"
            reverse_sort = true
            push_sync = true
            tracking_token = "tok"

            [tracking_overrides]
            "Great Show" = 4242
        "#;
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap();
        let settings: Settings = config.try_deserialize().unwrap();
        assert_eq!(settings.provider.as_deref(), Some("gogoanime"));
        assert_eq!(settings.preferred_quality, "720p");
        assert_eq!(settings.sort_direction(), SortDirection::Descending);
        assert_eq!(settings.tracking_overrides.get("Great Show"), Some(&4242));
    }
}
