use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::SourceError;

pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0 Safari/537.36";

/// Thin wrapper over a shared reqwest client. Every provider request goes
/// through here so the browser user agent and the per-provider referer are
/// applied uniformly. No retries; the first failure is terminal for the
/// resolution attempt that issued it.
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(SourceError::Client)?;
        Ok(Self { client })
    }

    pub async fn get_text(&self, url: &str, referer: Option<&str>) -> Result<String, SourceError> {
        debug!(url, "GET");
        let mut request = self.client.get(url);
        if let Some(referer) = referer {
            request = request.header("Referer", referer);
        }
        let response = request
            .send()
            .await
            .map_err(|e| SourceError::network(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status,
            });
        }
        response
            .text()
            .await
            .map_err(|e| SourceError::network(url, e))
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<T, SourceError> {
        let text = self.get_text(url, referer).await?;
        serde_json::from_str(&text).map_err(|e| SourceError::parse(url, format!("JSON shape: {e}")))
    }
}
