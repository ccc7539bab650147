use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use dialoguer::{Select, theme::ColorfulTheme};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod download;
mod error;
mod fetch;
mod hls;
mod player;
mod progress;
mod providers;
mod registry;
mod select;
mod session;
mod settings;
mod sync;
mod types;

use settings::Settings;
use error::SourceError;
use fetch::HttpClient;
use player::MpvBackend;
use progress::ProgressStore;
use providers::{ProviderStrategy, StreamPrefs};
use registry::Provider;
use select::OptionChooser;
use session::{NavDirection, SessionCoordinator};
use sync::TrackerClient;
use types::TitleDetail;

#[derive(Debug, Parser)]
#[command(name = "anzu", about = "Stream anime from many sources via mpv.", version)]
struct Cli {
    /// Replay an entry from the continue-watching list.
    #[arg(long)]
    history: bool,

    /// Download the episode instead of playing it.
    #[arg(long)]
    download: bool,

    #[arg(long, value_name = "SOURCE")]
    provider: Option<String>,

    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(short = 'e', long, value_name = "EPISODE")]
    episode: Option<String>,

    #[arg(value_name = "QUERY")]
    query: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let result = run().await;
    if let Err(err) = &result {
        eprintln!("error: {err:?}");
    }
    result
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let store_path = progress::store_path()?;
    let store = ProgressStore::load(&store_path)?;

    let history_mode =
        cli.history || (cli.query.len() == 1 && cli.query[0].eq_ignore_ascii_case("history"));
    if history_mode {
        return replay_from_history(&cli, &settings, store, store_path).await;
    }

    if cli.query.is_empty() {
        println!("No query provided. Use `anzu <name>` or `anzu --history`.");
        return Ok(());
    }

    let provider = selected_provider(cli.provider.as_deref(), &settings)?;
    tracing::debug!(source = %provider, strategy = ?provider.strategy_kind(), "source selected");
    let strategy = provider.strategy();
    let http = HttpClient::new()?;

    let query = cli.query.join(" ");
    let shows = strategy.search(&http, &query).await?;
    if shows.is_empty() {
        bail!("No results for \"{}\" on {}", query, provider);
    }

    let options: Vec<String> = shows
        .iter()
        .map(|s| match s.episode_count {
            Some(count) => format!("{} [{} episodes]", s.title, count),
            None => s.title.clone(),
        })
        .collect();
    let selection = Select::with_theme(&theme())
        .with_prompt("Select a show (Esc to cancel)")
        .items(&options)
        .default(0)
        .interact_opt()?;
    let Some(idx) = selection else {
        println!("Cancelled.");
        return Ok(());
    };
    let show = shows[idx].clone();

    println!("Fetching details for {}...", show.title);
    let mut detail = strategy.fetch_detail(&http, &show.reference).await?;
    if detail.episodes.is_empty() {
        bail!("No episodes available for {}", detail.title);
    }
    if detail.thumbnail.is_none() {
        detail.thumbnail = show.thumbnail.clone();
    }
    println!("Found {} episodes.", detail.episodes.len());

    play_title(
        &cli,
        &settings,
        provider,
        strategy.as_ref(),
        &http,
        &detail,
        &show.reference,
        store,
        store_path,
        cli.episode.clone(),
        None,
    )
    .await
}

async fn replay_from_history(
    cli: &Cli,
    settings: &Settings,
    store: ProgressStore,
    store_path: PathBuf,
) -> Result<()> {
    if store.continue_watching.is_empty() {
        println!("Nothing to continue watching.");
        return Ok(());
    }

    let items: Vec<String> = store
        .continue_watching
        .iter()
        .map(|entry| {
            let remaining_mins =
                ((entry.total_secs - entry.last_played_secs).max(0.0) / 60.0).round() as u64;
            format!(
                "[{}] {} \u{00b7} episode {} \u{00b7} {} min left \u{00b7} {}",
                entry.source,
                entry.title,
                entry.episode,
                remaining_mins,
                entry.updated_at.format("%Y-%m-%d %H:%M")
            )
        })
        .collect();
    let selection = Select::with_theme(&theme())
        .with_prompt("Continue watching (Esc to cancel)")
        .items(&items)
        .default(0)
        .interact_opt()?;
    let Some(idx) = selection else {
        println!("Cancelled.");
        return Ok(());
    };
    let entry = store.continue_watching[idx].clone();

    let strategy = entry.source.strategy();
    let http = HttpClient::new()?;
    println!("Fetching details for {}...", entry.title);
    let detail = strategy.fetch_detail(&http, &entry.reference).await?;
    if detail.episodes.is_empty() {
        bail!("No episodes available for {}", detail.title);
    }

    play_title(
        cli,
        settings,
        entry.source,
        strategy.as_ref(),
        &http,
        &detail,
        &entry.reference,
        store,
        store_path,
        None,
        Some(entry.href),
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn play_title(
    cli: &Cli,
    settings: &Settings,
    provider: Provider,
    strategy: &dyn ProviderStrategy,
    http: &HttpClient,
    detail: &TitleDetail,
    reference: &str,
    store: ProgressStore,
    store_path: PathBuf,
    start_episode: Option<String>,
    start_href: Option<String>,
) -> Result<()> {
    let tracker = build_tracker(settings);
    let mut session = SessionCoordinator::new(
        provider,
        detail,
        reference,
        settings.sort_direction(),
        store,
        store_path,
        tracker,
        settings.push_sync,
    );

    // Jump straight into playback when the caller already knows the episode
    // (an --episode flag or a continue-watching entry).
    let mut skip_selection = false;
    if let Some(number) = &start_episode {
        if session.jump_to_number(number) {
            skip_selection = true;
        } else {
            println!(
                "Episode '{}' does not exist for '{}'. Showing episode list.",
                number, detail.title
            );
        }
    } else if let Some(href) = &start_href {
        skip_selection = session.jump_to_href(href);
    }

    let prefs = StreamPrefs {
        quality: settings.preferred_quality.clone(),
        audio: settings.preferred_audio.clone(),
        server: settings.preferred_server.clone(),
    };
    let chooser = TermChooser;
    let download_mode = cli.download || settings.download_instead;

    loop {
        if !skip_selection {
            let labels: Vec<String> = session
                .episodes()
                .iter()
                .map(|ep| ep.number.clone())
                .collect();
            let selection = Select::with_theme(&theme())
                .with_prompt("Episode to play (Enter to select, Esc to cancel)")
                .items(&labels)
                .default(session.current_index())
                .interact_opt()?;
            let Some(idx) = selection else {
                println!("Exiting playback loop.");
                return Ok(());
            };
            session.set_index(idx);
        }
        skip_selection = false;
        let episode = session.current().clone();

        if download_mode {
            println!("Resolving download for episode {}...", episode.number);
            let candidate = match strategy
                .resolve_download(http, &episode, &prefs, &chooser)
                .await
            {
                Ok(candidate) => candidate,
                Err(SourceError::Cancelled) => {
                    println!("Selection cancelled.");
                    continue;
                }
                Err(err) => {
                    println!("Could not resolve episode {}: {err}", episode.number);
                    continue;
                }
            };
            let dir = settings
                .download_dir
                .clone()
                .or_else(dirs_next::download_dir)
                .unwrap_or_else(|| PathBuf::from("."));
            let dest =
                download::download_dest(&dir, &detail.title, &episode.number, &candidate.url);
            println!("Downloading episode {} to {}...", episode.number, dest.display());
            download::download_to_file(&candidate, &dest)
                .await
                .with_context(|| format!("download failed for episode {}", episode.number))?;
            println!("Done.");
            continue;
        }

        println!("Fetching streams for episode {}...", episode.number);
        let candidate = match strategy
            .resolve_stream(http, &episode, &prefs, &chooser)
            .await
        {
            Ok(candidate) => candidate,
            Err(SourceError::Cancelled) => {
                println!("Selection cancelled.");
                continue;
            }
            Err(err) => {
                // failed resolution leaves the session where it was
                println!("Could not resolve episode {}: {err}", episode.number);
                continue;
            }
        };
        if !candidate.variants.is_empty() {
            let ladder: Vec<&str> = candidate.variants.iter().map(|v| v.label.as_str()).collect();
            println!("Available qualities: {}.", ladder.join(", "));
        }

        let mut backend = MpvBackend::new();
        if let Err(err) = session.drive(&mut backend, &candidate).await {
            println!("Playback failed: {err}");
            continue;
        }

        if settings.autoplay {
            if session.advance(NavDirection::Next) {
                println!("Continuing with episode {}...", session.current().number);
                skip_selection = true;
            } else {
                println!("No further episodes found. Exiting.");
                return Ok(());
            }
        }
    }
}

fn build_tracker(settings: &Settings) -> Option<TrackerClient> {
    if !settings.push_sync {
        return None;
    }
    let Some(token) = settings.tracking_token.clone() else {
        warn!("push_sync is on but tracking_token is unset; progress sync disabled");
        return None;
    };
    match TrackerClient::new(token, settings.tracking_overrides.clone()) {
        Ok(client) => Some(client),
        Err(err) => {
            warn!("could not initialise tracker client: {err}");
            None
        }
    }
}

/// The one provider policy: an explicit flag wins, the configured default
/// follows, and nothing is ever assumed beyond that.
fn selected_provider(
    cli_provider: Option<&str>,
    settings: &Settings,
) -> Result<Provider, SourceError> {
    cli_provider
        .or(settings.provider.as_deref())
        .ok_or(SourceError::NoSourceSelected)?
        .parse()
}

struct TermChooser;

impl OptionChooser for TermChooser {
    fn choose(&self, prompt: &str, options: &[String]) -> Option<usize> {
        Select::with_theme(&theme())
            .with_prompt(prompt)
            .items(options)
            .default(0)
            .interact_opt()
            .ok()
            .flatten()
    }
}

fn theme() -> ColorfulTheme {
    ColorfulTheme::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_provider_flag_wins_over_settings() {
        let settings = Settings {
            provider: Some("animeworld".into()),
            ..Settings::default()
        };
        let provider = selected_provider(Some("gogoanime"), &settings).unwrap();
        assert_eq!(provider, Provider::GogoAnime);
    }

    #[test]
    fn configured_provider_is_used_without_a_flag() {
        let settings = Settings {
            provider: Some("animepahe".into()),
            ..Settings::default()
        };
        assert_eq!(
            selected_provider(None, &settings).unwrap(),
            Provider::AnimePahe
        );
    }

    #[test]
    fn missing_provider_is_an_error_not_a_default() {
        let err = selected_provider(None, &Settings::default()).unwrap_err();
        assert!(matches!(err, SourceError::NoSourceSelected));
    }

    #[test]
    fn unknown_provider_name_is_rejected() {
        let err = selected_provider(Some("shruganime"), &Settings::default()).unwrap_err();
        assert!(matches!(err, SourceError::UnknownSource(_)));
    }
}
