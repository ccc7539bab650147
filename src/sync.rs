//! Push of episode-completion progress to the tracking service. Lookup goes
//! override-first, then title search; the update itself is a single GraphQL
//! mutation. Failures are logged and dropped, never retried, and nothing is
//! cached across sessions: the at-most-once guard in the session keeps the
//! call volume at one per playback.

use std::collections::HashMap;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::SyncError;
use crate::session::ProgressTracker;

const TRACKER_API_URL: &str = "https://graphql.anilist.co";

const SEARCH_QUERY: &str = r#"query($search: String) {
  Media(search: $search, type: ANIME) {
    id
  }
}"#;

const SAVE_PROGRESS_MUTATION: &str = r#"mutation($mediaId: Int, $progress: Int) {
  SaveMediaListEntry(mediaId: $mediaId, progress: $progress, status: CURRENT) {
    id
  }
}"#;

pub struct TrackerClient {
    client: Client,
    api_url: String,
    token: String,
    overrides: HashMap<String, u32>,
}

impl TrackerClient {
    pub fn new(token: String, overrides: HashMap<String, u32>) -> Result<Self, SyncError> {
        let client = Client::builder()
            .user_agent(concat!("anzu/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_url: TRACKER_API_URL.to_string(),
            token,
            overrides,
        })
    }

    /// Maps a local title to the tracker's numeric identifier: the
    /// user-entered override wins, otherwise the first search hit.
    async fn resolve_media_id(&self, title: &str) -> Result<u32, SyncError> {
        if let Some(id) = override_for(&self.overrides, title) {
            debug!(title, id, "using override tracker id");
            return Ok(id);
        }
        self.search_media_id(title).await
    }

    async fn search_media_id(&self, title: &str) -> Result<u32, SyncError> {
        let body = serde_json::json!({
            "query": SEARCH_QUERY,
            "variables": { "search": title }
        });
        let envelope: GraphQlEnvelope<SearchData> = self.execute(&body).await?;
        envelope
            .data
            .and_then(|data| data.media)
            .map(|media| media.id)
            .ok_or_else(|| SyncError::NotFound(title.to_string()))
    }

    async fn push(&self, media_id: u32, progress: u32) -> Result<(), SyncError> {
        let body = serde_json::json!({
            "query": SAVE_PROGRESS_MUTATION,
            "variables": { "mediaId": media_id, "progress": progress }
        });
        let _: GraphQlEnvelope<serde_json::Value> = self.execute(&body).await?;
        debug!(media_id, progress, "tracker progress updated");
        Ok(())
    }

    async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        body: &serde_json::Value,
    ) -> Result<GraphQlEnvelope<T>, SyncError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status(status));
        }
        let text = response.text().await?;
        let envelope: GraphQlEnvelope<T> =
            serde_json::from_str(&text).map_err(|e| SyncError::Shape(e.to_string()))?;
        if let Some(errors) = &envelope.errors {
            let joined = errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(SyncError::Shape(joined));
        }
        Ok(envelope)
    }
}

impl ProgressTracker for TrackerClient {
    async fn push_progress(&self, title: &str, episode_number: u32) -> Result<(), SyncError> {
        let media_id = self.resolve_media_id(title).await?;
        self.push(media_id, episode_number).await
    }
}

/// Case-insensitive override lookup keyed by title string.
pub(crate) fn override_for(overrides: &HashMap<String, u32>, title: &str) -> Option<u32> {
    let wanted = title.trim();
    overrides
        .iter()
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(wanted))
        .map(|(_, id)| *id)
}

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(rename = "Media")]
    media: Option<MediaId>,
}

#[derive(Debug, Deserialize)]
struct MediaId {
    id: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_response_yields_the_media_id() {
        let body = r#"{"data": {"Media": {"id": 20958}}}"#;
        let envelope: GraphQlEnvelope<SearchData> = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.data.unwrap().media.unwrap().id, 20958);
    }

    #[test]
    fn missing_media_means_not_found() {
        let body = r#"{"data": {"Media": null}}"#;
        let envelope: GraphQlEnvelope<SearchData> = serde_json::from_str(body).unwrap();
        assert!(envelope.data.unwrap().media.is_none());
    }

    #[test]
    fn graphql_errors_are_collected() {
        let body = r#"{"data": null, "errors": [{"message": "Invalid token"}]}"#;
        let envelope: GraphQlEnvelope<SearchData> = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.errors.unwrap()[0].message, "Invalid token");
    }

    #[test]
    fn override_lookup_ignores_case_and_padding() {
        let overrides = HashMap::from([(" Great Show ".to_string(), 4242u32)]);
        assert_eq!(override_for(&overrides, "great show"), Some(4242));
        assert_eq!(override_for(&overrides, "other show"), None);
    }
}
