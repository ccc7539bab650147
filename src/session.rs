//! The playback session coordinator: owns the current episode index, the
//! progress sampling loop, persistence of watch positions, and the
//! at-most-once remote-sync trigger. It does not care which backend renders
//! the video; anything that can report position and duration plugs in.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{PlayerError, SyncError};
use crate::progress::{ContinueWatchingEntry, ProgressStore};
use crate::registry::Provider;
use crate::types::{
    Episode, SortDirection, StreamCandidate, TitleDetail, episode_sync_number, sort_episodes,
};

/// Remote sync fires once the remaining time drops under this.
pub const REMOTE_SYNC_THRESHOLD_SECS: f64 = 120.0;

const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Everything a backend needs to start playing.
#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    pub url: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub headers: HashMap<String, String>,
    /// Seek target applied before steady playback begins.
    pub resume_from: Option<f64>,
}

/// One observation of the backend. `duration_secs` stays `None` until the
/// player reports a finite duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaybackStatus {
    pub position_secs: Option<f64>,
    pub duration_secs: Option<f64>,
    pub ended: bool,
}

pub trait PlayerBackend {
    async fn load(&mut self, request: PlaybackRequest) -> Result<(), PlayerError>;
    async fn status(&mut self) -> Result<PlaybackStatus, PlayerError>;
    async fn seek(&mut self, secs: f64) -> Result<(), PlayerError>;
    async fn stop(&mut self) -> Result<(), PlayerError>;
}

pub trait ProgressTracker {
    async fn push_progress(&self, title: &str, episode_number: u32) -> Result<(), SyncError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavDirection {
    Next,
    Previous,
}

/// A remote-sync request produced by the sampling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub title: String,
    pub episode_number: u32,
}

pub struct SessionCoordinator<T: ProgressTracker> {
    provider: Provider,
    title: String,
    reference: String,
    thumbnail: Option<String>,
    episodes: Vec<Episode>,
    sort: SortDirection,
    index: usize,
    store: ProgressStore,
    store_path: PathBuf,
    tracker: Option<T>,
    push_sync: bool,
    synced_this_session: bool,
    sample_interval: Duration,
}

impl<T: ProgressTracker> SessionCoordinator<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Provider,
        detail: &TitleDetail,
        reference: &str,
        sort: SortDirection,
        store: ProgressStore,
        store_path: PathBuf,
        tracker: Option<T>,
        push_sync: bool,
    ) -> Self {
        let mut episodes = detail.episodes.clone();
        sort_episodes(&mut episodes, sort);
        Self {
            provider,
            title: detail.title.clone(),
            reference: reference.to_string(),
            thumbnail: detail.thumbnail.clone(),
            episodes,
            sort,
            index: 0,
            store,
            store_path,
            tracker,
            push_sync,
            synced_this_session: false,
            sample_interval: SAMPLE_INTERVAL,
        }
    }

    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    pub fn current(&self) -> &Episode {
        &self.episodes[self.index]
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn set_index(&mut self, index: usize) {
        self.index = index.min(self.episodes.len().saturating_sub(1));
    }

    /// Jumps to the episode with this label, if present.
    pub fn jump_to_number(&mut self, number: &str) -> bool {
        match self.episodes.iter().position(|ep| ep.number == number) {
            Some(idx) => {
                self.index = idx;
                true
            }
            None => false,
        }
    }

    pub fn jump_to_href(&mut self, href: &str) -> bool {
        match self.episodes.iter().position(|ep| ep.href == href) {
            Some(idx) => {
                self.index = idx;
                true
            }
            None => false,
        }
    }

    /// Moves the index one episode over. "Next" means "the following
    /// episode in watch order": on a descending-sorted list that is the
    /// previous array slot. Clamps at either end and reports whether the
    /// index moved.
    pub fn advance(&mut self, direction: NavDirection) -> bool {
        let forward = matches!(
            (direction, self.sort),
            (NavDirection::Next, SortDirection::Ascending)
                | (NavDirection::Previous, SortDirection::Descending)
        );
        let next = if forward {
            (self.index + 1).min(self.episodes.len().saturating_sub(1))
        } else {
            self.index.saturating_sub(1)
        };
        let moved = next != self.index;
        self.index = next;
        moved
    }

    /// Stored resume position for the current episode.
    pub fn resume_position(&self) -> Option<f64> {
        self.store.resume_position(&self.current().href)
    }

    /// Resets the per-episode session state. Called whenever a new
    /// episode's playback begins so the remote-sync guard re-arms.
    pub fn begin_episode(&mut self) {
        self.synced_this_session = false;
    }

    /// Processes one progress sample. Ticks without a finite positive
    /// duration are skipped outright. Otherwise the clamped position is
    /// persisted under the episode's href and the remote-sync trigger is
    /// evaluated: remaining time under the threshold, push-sync on, and
    /// nothing sent yet this session.
    pub fn sample(&mut self, position_secs: f64, duration_secs: f64) -> Option<SyncRequest> {
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return None;
        }
        let position = position_secs.clamp(0.0, duration_secs);
        let episode = self.episodes[self.index].clone();

        self.store
            .upsert_record(&episode.href, position, duration_secs);
        self.store.upsert_continue_watching(ContinueWatchingEntry {
            title: self.title.clone(),
            episode: episode.number.clone(),
            href: episode.href.clone(),
            reference: self.reference.clone(),
            thumbnail: self.thumbnail.clone(),
            last_played_secs: position,
            total_secs: duration_secs,
            source: self.provider,
            updated_at: Utc::now(),
        });

        let remaining = duration_secs - position;
        if remaining < REMOTE_SYNC_THRESHOLD_SECS && self.push_sync && !self.synced_this_session {
            self.synced_this_session = true;
            match episode_sync_number(&episode.number) {
                Some(episode_number) => {
                    return Some(SyncRequest {
                        title: self.title.clone(),
                        episode_number,
                    });
                }
                None => {
                    debug!(label = %episode.number, "episode label has no number to report");
                }
            }
        }
        None
    }

    /// Plays the current episode on `backend` and samples it roughly once a
    /// second until end-of-media. A backend error mid-playback counts as
    /// end-of-media; it never brings the coordinator down.
    pub async fn drive<B: PlayerBackend>(
        &mut self,
        backend: &mut B,
        candidate: &StreamCandidate,
    ) -> Result<(), PlayerError> {
        self.begin_episode();
        let episode = self.current().clone();
        let request = PlaybackRequest {
            url: candidate.url.clone(),
            title: format!("{} - Episode {}", self.title, episode.number),
            subtitle: candidate.subtitle.clone(),
            headers: candidate.headers.clone(),
            resume_from: self.resume_position(),
        };
        backend.load(request).await?;

        let mut ticker = tokio::time::interval(self.sample_interval);
        loop {
            ticker.tick().await;
            let status = match backend.status().await {
                Ok(status) => status,
                Err(err) => {
                    warn!("playback backend dropped mid-episode: {err}");
                    break;
                }
            };
            if status.ended {
                break;
            }
            let (Some(position), Some(duration)) = (status.position_secs, status.duration_secs)
            else {
                continue;
            };
            let sync_request = self.sample(position, duration);
            if let Err(err) = self.store.save(&self.store_path) {
                warn!("failed to persist watch progress: {err:#}");
            }
            if let Some(request) = sync_request {
                if let Some(tracker) = &self.tracker {
                    if let Err(err) = tracker
                        .push_progress(&request.title, request.episode_number)
                        .await
                    {
                        warn!("progress sync failed: {err}");
                    }
                }
            }
        }

        backend.stop().await.ok();
        if let Err(err) = self.store.save(&self.store_path) {
            warn!("failed to persist watch progress: {err:#}");
        }
        Ok(())
    }
}
